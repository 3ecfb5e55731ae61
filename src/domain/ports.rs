use crate::domain::model::{
    FetchBatch, OutcomeNotification, SubmitOutcome, TransportOrderRequest, VehicleSnapshot,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = Result<bool>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn source_endpoint(&self) -> &str;
    fn kernel_url(&self) -> &str;
    fn access_key(&self) -> Option<&str>;
    fn request_timeout(&self) -> Duration;
    fn poll_interval(&self) -> Duration;
    fn order_horizon(&self) -> Duration;
    fn retention(&self) -> Duration;
    fn tick_timeout(&self) -> Duration;
    fn state_dir(&self) -> &str;
}

/// 外部訂單來源
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// 取得 `since_marker` 之後尚未處理的訂單
    async fn fetch_pending(&self, since_marker: Option<&str>) -> Result<FetchBatch>;
}

/// fleet-control kernel：下單、車輛清單、訂單終態
#[async_trait]
pub trait KernelClient: Send + Sync {
    async fn submit(&self, request: &TransportOrderRequest) -> Result<SubmitOutcome>;

    async fn list_vehicles(&self) -> Result<Vec<VehicleSnapshot>>;

    /// 拉取已結束（完成或失敗）的訂單；僅支援推送的 kernel 可回傳空清單
    async fn poll_outcomes(&self) -> Result<Vec<OutcomeNotification>> {
        Ok(Vec::new())
    }
}

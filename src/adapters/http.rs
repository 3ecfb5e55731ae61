//! HTTP 介面：外部訂單來源與 kernel web API

use crate::domain::model::{
    Destination, FetchBatch, MalformedRecord, OrderOutcome, OutcomeNotification, Property,
    RawOrder, SubmitOutcome, TransportOrderRequest, VehicleSnapshot,
};
use crate::domain::ports::{ConfigProvider, KernelClient, OrderSource};
use crate::utils::error::{BridgeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// kernel 存取金鑰的 header 名稱
pub const HEADER_ACCESS_KEY: &str = "X-Api-Access-Key";

fn build_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| BridgeError::InvalidConfigValueError {
        field: field.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn with_access_key(request: RequestBuilder, access_key: Option<&str>) -> RequestBuilder {
    match access_key {
        Some(key) => request.header(HEADER_ACCESS_KEY, key),
        None => request,
    }
}

// 來源可能回傳 envelope、陣列或單一物件；紀錄先保留為 JSON，逐筆解碼
#[derive(Deserialize)]
#[serde(untagged)]
enum FetchResponse {
    Envelope {
        orders: Vec<serde_json::Value>,
        #[serde(default)]
        marker: Option<String>,
    },
    Many(Vec<serde_json::Value>),
    One(serde_json::Value),
}

fn record_id(record: &serde_json::Value) -> Option<String> {
    ["orderNum", "id"]
        .iter()
        .find_map(|key| record.get(*key)?.as_str())
        .map(str::to_string)
}

impl FetchResponse {
    fn into_batch(self) -> Result<FetchBatch> {
        let (records, marker) = match self {
            FetchResponse::Envelope { orders, marker } => (orders, marker),
            FetchResponse::Many(orders) => (orders, None),
            FetchResponse::One(order) if order.is_object() => (vec![order], None),
            FetchResponse::One(other) => {
                return Err(BridgeError::validation(format!(
                    "unexpected order source payload: {}",
                    other
                )))
            }
        };

        let mut batch = FetchBatch {
            next_marker: marker.or_else(|| records.iter().rev().find_map(record_id)),
            ..FetchBatch::default()
        };

        // 單筆壞資料不影響同批其他訂單
        for (position, record) in records.into_iter().enumerate() {
            let order_id = record_id(&record);
            match serde_json::from_value::<RawOrder>(record) {
                Ok(order) => batch.orders.push(order),
                Err(e) => {
                    let malformed = MalformedRecord {
                        position,
                        order_id,
                        reason: format!("malformed order record: {}", e),
                    };
                    tracing::warn!(
                        "⚠️ Order source record {} could not be decoded: {}",
                        malformed.label(),
                        e
                    );
                    batch.malformed.push(malformed);
                }
            }
        }
        Ok(batch)
    }
}

/// 以 `GET {endpoint}?since={marker}` 拉取待處理訂單
#[derive(Debug, Clone)]
pub struct HttpOrderSource {
    client: Client,
    endpoint: Url,
    access_key: Option<String>,
}

impl HttpOrderSource {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: parse_url("source.endpoint", endpoint)?,
            access_key: None,
        })
    }

    pub fn with_access_key(mut self, access_key: Option<String>) -> Self {
        self.access_key = access_key;
        self
    }

    pub fn from_config<C: ConfigProvider>(config: &C) -> Result<Self> {
        Self::new(config.source_endpoint(), config.request_timeout())
    }
}

#[async_trait]
impl OrderSource for HttpOrderSource {
    async fn fetch_pending(&self, since_marker: Option<&str>) -> Result<FetchBatch> {
        let mut request = self.client.get(self.endpoint.clone());
        if let Some(marker) = since_marker {
            request = request.query(&[("since", marker)]);
        }
        let request = with_access_key(request, self.access_key.as_deref());

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!("📡 Order source response status: {}", status);

        if !status.is_success() {
            return Err(BridgeError::transient(format!(
                "order source returned status {}",
                status
            )));
        }

        let body = response.text().await?;
        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(FetchBatch::default());
        }

        let parsed: FetchResponse = serde_json::from_str(trimmed)?;
        parsed.into_batch()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransportWire<'a> {
    deadline: DateTime<Utc>,
    intended_vehicle: Option<&'a str>,
    #[serde(rename = "type")]
    order_type: &'a str,
    destinations: &'a [Destination],
    properties: &'a [Property],
    dependencies: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wrapping_sequence: Option<&'a str>,
}

impl<'a> From<&'a TransportOrderRequest> for TransportWire<'a> {
    fn from(request: &'a TransportOrderRequest) -> Self {
        Self {
            deadline: request.deadline(),
            intended_vehicle: request.intended_vehicle(),
            order_type: request.order_type(),
            destinations: request.destinations(),
            properties: request.properties(),
            dependencies: request.dependencies().iter().map(String::as_str).collect(),
            wrapping_sequence: request.wrapping_sequence(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderStateWire {
    name: String,
    state: String,
}

fn outcome_of_state(state: &str) -> Option<OrderOutcome> {
    match state {
        "FINISHED" => Some(OrderOutcome::Finished),
        "FAILED" | "UNROUTABLE" => Some(OrderOutcome::Failed),
        _ => None,
    }
}

/// kernel web API 用戶端
#[derive(Debug, Clone)]
pub struct HttpKernelClient {
    client: Client,
    base_url: Url,
    access_key: Option<String>,
}

impl HttpKernelClient {
    pub fn new(base_url: &str, access_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: parse_url("kernel.base_url", base_url)?,
            access_key,
        })
    }

    pub fn from_config<C: ConfigProvider>(config: &C) -> Result<Self> {
        Self::new(
            config.kernel_url(),
            config.access_key().map(str::to_string),
            config.request_timeout(),
        )
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BridgeError::InvalidConfigValueError {
                field: "kernel.base_url".to_string(),
                value: self.base_url.to_string(),
                reason: "URL cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl KernelClient for HttpKernelClient {
    async fn submit(&self, request: &TransportOrderRequest) -> Result<SubmitOutcome> {
        let url = self.endpoint(&["v1", "transportOrders", request.order_id()])?;
        let body = TransportWire::from(request);

        tracing::debug!("📤 POST {}", url);
        let response = with_access_key(self.client.post(url), self.access_key.as_deref())
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        if status.is_success() || status == StatusCode::CONFLICT {
            if status == StatusCode::CONFLICT {
                tracing::info!(
                    "🔁 Kernel already knows order {}, treating as accepted",
                    request.order_id()
                );
            }
            return Ok(SubmitOutcome::Accepted(request.order_id().to_string()));
        }

        let text = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            let reason = if text.trim().is_empty() {
                format!("kernel rejected order with status {}", status)
            } else {
                text.trim().to_string()
            };
            return Ok(SubmitOutcome::Rejected(reason));
        }

        Err(BridgeError::transient(format!(
            "kernel returned status {}: {}",
            status,
            text.trim()
        )))
    }

    async fn list_vehicles(&self) -> Result<Vec<VehicleSnapshot>> {
        let url = self.endpoint(&["v1", "vehicles"])?;
        let response = with_access_key(self.client.get(url), self.access_key.as_deref())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::transient(format!(
                "vehicle list returned status {}",
                status
            )));
        }

        let items: Vec<serde_json::Value> = response.json().await?;
        let mut vehicles = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<VehicleSnapshot>(item) {
                Ok(vehicle) => vehicles.push(vehicle),
                Err(e) => tracing::warn!("⚠️ Skipping malformed vehicle snapshot: {}", e),
            }
        }
        Ok(vehicles)
    }

    async fn poll_outcomes(&self) -> Result<Vec<OutcomeNotification>> {
        let url = self.endpoint(&["v1", "transportOrders"])?;
        let response = with_access_key(self.client.get(url), self.access_key.as_deref())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::transient(format!(
                "transport order list returned status {}",
                status
            )));
        }

        let orders: Vec<OrderStateWire> = response.json().await?;
        Ok(orders
            .into_iter()
            .filter_map(|order| {
                outcome_of_state(&order.state)
                    .map(|outcome| OutcomeNotification::new(order.name, outcome))
            })
            .collect())
    }
}

use anyhow::Result;
use httpmock::prelude::*;
use order_bridge::domain::ports::ConfigProvider;
use order_bridge::domain::sequence::SequencePhase;
use order_bridge::utils::validation::Validate;
use order_bridge::{
    BridgeConfig, DispatchCoordinator, DispatchSettings, HttpKernelClient, HttpOrderSource,
    LocalStorage,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn write_config(dir: &TempDir, source_url: &str, kernel_url: &str) -> Result<std::path::PathBuf> {
    // Windows 路徑的反斜線轉為正斜線，避免 TOML 解析問題
    let state_dir = dir.path().join("state").display().to_string().replace('\\', "/");
    let content = format!(
        r#"
[source]
endpoint = "{}"

[kernel]
base_url = "{}"

[dispatch]
interval_seconds = 10
tick_timeout_seconds = 8

[storage]
state_dir = "{}"
"#,
        source_url, kernel_url, state_dir
    );
    let path = dir.path().join("order-bridge.toml");
    std::fs::write(&path, content)?;
    Ok(path)
}

async fn coordinator_from(config: &BridgeConfig) -> Result<DispatchCoordinator<LocalStorage>> {
    let coordinator = DispatchCoordinator::new(
        Arc::new(HttpOrderSource::from_config(config)?),
        Arc::new(HttpKernelClient::from_config(config)?),
        LocalStorage::new(config.state_dir()),
        DispatchSettings::from_config(config),
    )
    .await?;
    Ok(coordinator)
}

#[tokio::test]
async fn test_fatal_failure_cascades_and_persists() -> Result<()> {
    let source_server = MockServer::start();
    let kernel_server = MockServer::start();
    let dir = TempDir::new()?;

    let config_path = write_config(&dir, &source_server.url("/orders"), &kernel_server.base_url())?;
    let config = BridgeConfig::from_file(&config_path)?;
    config.validate()?;

    let mut first_batch = source_server.mock(|when, then| {
        when.method(GET).path("/orders");
        then.status(200).json_body(serde_json::json!({
            "orders": [
                {"orderNum": "A", "loadingLocation": "Point-0001", "unloadingLocation": "Point-0002",
                 "intendedVehicle": "Vehicle-01", "sequence": {"name": "Seq-7", "failureFatal": true}},
                {"orderNum": "B", "loadingLocation": "Point-0002", "unloadingLocation": "Point-0003",
                 "intendedVehicle": "Vehicle-01", "sequence": {"name": "Seq-7", "failureFatal": true}},
                {"orderNum": "C", "loadingLocation": "Point-0003", "unloadingLocation": "Point-0004",
                 "intendedVehicle": "Vehicle-01", "sequence": {"name": "Seq-7", "failureFatal": true}}
            ],
            "marker": "batch-1"
        }));
    });
    let submit_mock = kernel_server.mock(|when, then| {
        when.method(POST).path_contains("/v1/transportOrders/");
        then.status(200);
    });
    let mut no_outcomes = kernel_server.mock(|when, then| {
        when.method(GET).path("/v1/transportOrders");
        then.status(200).json_body(serde_json::json!([]));
    });

    let coordinator = coordinator_from(&config).await?;
    let cancel = CancellationToken::new();

    let submitted = coordinator.run_once(&cancel).await;
    assert_eq!(submitted.submitted.len(), 3, "{}", submitted);
    submit_mock.assert_hits(3);

    // kernel 回報 A 失敗，B 仍在執行
    no_outcomes.delete();
    kernel_server.mock(|when, then| {
        when.method(GET).path("/v1/transportOrders");
        then.status(200).json_body(serde_json::json!([
            {"name": "A", "state": "FAILED"},
            {"name": "B", "state": "BEING_PROCESSED"}
        ]));
    });
    first_batch.delete();
    let mut quiet_source = source_server.mock(|when, then| {
        when.method(GET).path("/orders").query_param("since", "batch-1");
        then.status(200).json_body(serde_json::json!({"orders": [], "marker": "batch-1"}));
    });

    let failed = coordinator.run_once(&cancel).await;
    assert_eq!(failed.outcomes_recorded, 1);
    let cascade = failed
        .sequence_transitions
        .iter()
        .find(|t| t.to == SequencePhase::FinishedViaFatalFailure)
        .expect("fatal transition");
    assert_eq!(cascade.cascaded, vec!["B".to_string(), "C".to_string()]);

    // 序列結束後才到的 D 被拒絕且不送出
    quiet_source.delete();
    source_server.mock(|when, then| {
        when.method(GET).path("/orders").query_param("since", "batch-1");
        then.status(200).json_body(serde_json::json!({
            "orders": [
                {"orderNum": "D", "loadingLocation": "Point-0004", "unloadingLocation": "Point-0005",
                 "intendedVehicle": "Vehicle-01", "sequence": {"name": "Seq-7", "failureFatal": true}}
            ],
            "marker": "batch-2"
        }));
    });

    let late = coordinator.run_once(&cancel).await;
    assert_eq!(late.rejected.len(), 1);
    assert_eq!(late.rejected[0].order_id, "D");
    submit_mock.assert_hits(3);

    drop(coordinator);
    let restarted = coordinator_from(&config).await?;
    let sequence = restarted.sequence("Seq-7").await.expect("sequence persisted");
    assert_eq!(sequence.phase(), SequencePhase::FinishedViaFatalFailure);
    assert_eq!(sequence.finished_index(), Some(2));
    assert_eq!(sequence.finished_index_raw(), 2);
    Ok(())
}

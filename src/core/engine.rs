use crate::core::coordinator::{DispatchCoordinator, TickSummary};
use crate::domain::ports::Storage;
use crate::utils::monitor::SystemMonitor;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// 定時觸發調度，每個 tick 呼叫一次 `run_once`
pub struct DispatchEngine<S: Storage> {
    coordinator: Arc<DispatchCoordinator<S>>,
    monitor: SystemMonitor,
}

impl<S: Storage> DispatchEngine<S> {
    pub fn new(coordinator: Arc<DispatchCoordinator<S>>) -> Self {
        Self::new_with_monitoring(coordinator, false)
    }

    pub fn new_with_monitoring(coordinator: Arc<DispatchCoordinator<S>>, monitor_enabled: bool) -> Self {
        Self {
            coordinator,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn coordinator(&self) -> &Arc<DispatchCoordinator<S>> {
        &self.coordinator
    }

    /// 執行單一輪（`--once`）
    pub async fn run_once(&self, cancel: &CancellationToken) -> TickSummary {
        let summary = self.coordinator.run_once(cancel).await;
        self.report(&summary);
        summary
    }

    /// 依 `interval` 週期執行，直到 `cancel` 被觸發；回傳已執行的 tick 數
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) -> usize {
        tracing::info!("🚀 Dispatch engine started (interval: {:?})", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    ticks += 1;
                    self.run_once(&cancel).await;
                }
            }
        }

        tracing::info!("🛑 Dispatch engine stopped after {} ticks", ticks);
        self.monitor.log_final_stats();
        ticks
    }

    fn report(&self, summary: &TickSummary) {
        if summary.skipped {
            tracing::debug!("⏭️ Tick skipped");
            return;
        }
        if summary.fetched == 0 && summary.outcomes_recorded == 0 && !summary.has_problems() {
            tracing::debug!("💤 Tick: {}", summary);
        } else if summary.has_problems() {
            tracing::warn!("⚠️ Tick: {}", summary);
        } else {
            tracing::info!("✅ Tick: {}", summary);
        }
        self.monitor.log_stats("Dispatch tick");
    }
}

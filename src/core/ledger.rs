use crate::domain::object::TcsObject;
use crate::domain::ports::Storage;
use crate::domain::sequence::OrderSequence;
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// 狀態檔名稱（相對於 Storage 根目錄）
pub const STATE_FILE: &str = "dispatch_state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// kernel 已確認收單
    Submitted,
    /// 永久拒絕，不再自動重試
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub disposition: Disposition,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// 以外部訂單編號為鍵的冪等紀錄，保留 `retention` 時間
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyLedger {
    entries: HashMap<String, LedgerEntry>,
}

impl IdempotencyLedger {
    pub fn get(&self, order_id: &str) -> Option<&LedgerEntry> {
        self.entries.get(order_id)
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.entries.contains_key(order_id)
    }

    pub fn is_submitted(&self, order_id: &str) -> bool {
        matches!(
            self.get(order_id),
            Some(LedgerEntry {
                disposition: Disposition::Submitted,
                ..
            })
        )
    }

    pub fn record_submitted(&mut self, order_id: &str, at: DateTime<Utc>) {
        self.entries.insert(
            order_id.to_string(),
            LedgerEntry {
                disposition: Disposition::Submitted,
                recorded_at: at,
                reason: None,
            },
        );
    }

    pub fn record_rejected(&mut self, order_id: &str, reason: &str, at: DateTime<Utc>) {
        self.entries.insert(
            order_id.to_string(),
            LedgerEntry {
                disposition: Disposition::Rejected,
                recorded_at: at,
                reason: Some(reason.to_string()),
            },
        );
    }

    /// 移除超過保留期限的紀錄，回傳移除筆數
    pub fn purge_expired(&mut self, now: DateTime<Utc>, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = now - retention;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.recorded_at > cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 已送出、尚待終態回報的序列成員
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub sequence: String,
    pub index: usize,
}

/// 需跨重啟保存的調度狀態
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchState {
    pub marker: Option<String>,
    #[serde(default)]
    pub ledger: IdempotencyLedger,
    #[serde(default)]
    pub sequences: BTreeMap<String, OrderSequence>,
    #[serde(default)]
    pub memberships: HashMap<String, Membership>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DispatchState {
    /// 讀取狀態檔；檔案不存在時回傳空狀態
    pub async fn load<S: Storage>(storage: &S) -> Result<Self> {
        if !storage.exists(STATE_FILE).await? {
            tracing::info!("🆕 No dispatch state found, starting fresh");
            return Ok(Self::default());
        }

        let bytes = storage.read_file(STATE_FILE).await?;
        let state: DispatchState = serde_json::from_slice(&bytes)?;
        tracing::info!(
            "📂 Loaded dispatch state: marker={:?}, ledger={} entries, sequences={}",
            state.marker,
            state.ledger.len(),
            state.sequences.len()
        );
        Ok(state)
    }

    pub async fn save<S: Storage>(&mut self, storage: &S) -> Result<()> {
        self.updated_at = Some(Utc::now());
        let json = serde_json::to_vec_pretty(&*self)?;
        storage.write_file(STATE_FILE, &json).await?;
        tracing::debug!("💾 Dispatch state saved ({} bytes)", json.len());
        Ok(())
    }

    /// 清掉過期的冪等紀錄與早已結束的序列
    pub fn purge_expired(&mut self, now: DateTime<Utc>, retention: Duration) -> usize {
        let purged_entries = self.ledger.purge_expired(now, retention);

        let Ok(window) = chrono::Duration::from_std(retention) else {
            return purged_entries;
        };
        let cutoff = now - window;
        let before = self.sequences.len();
        self.sequences.retain(|_, sequence| {
            !sequence.is_finished()
                || sequence
                    .history()
                    .last()
                    .map(|entry| entry.timestamp > cutoff)
                    .unwrap_or(true)
        });
        let purged_sequences = before - self.sequences.len();
        if purged_sequences > 0 {
            let sequences = &self.sequences;
            self.memberships
                .retain(|_, membership| sequences.contains_key(&membership.sequence));
        }

        purged_entries + purged_sequences
    }
}

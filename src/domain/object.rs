use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 具名、帶屬性、帶歷史的物件（取代繼承樹，以組合方式共用）
pub trait TcsObject {
    fn name(&self) -> &str;

    fn properties(&self) -> &BTreeMap<String, String>;

    fn history(&self) -> &ObjectHistory;

    fn property(&self, key: &str) -> Option<&str> {
        self.properties().get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub event_code: String,
    pub supplement: Option<String>,
}

/// 物件的事件紀錄，只能追加
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHistory {
    entries: Vec<HistoryEntry>,
}

impl ObjectHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event_code: impl Into<String>, supplement: Option<String>) {
        self.entries.push(HistoryEntry {
            timestamp: Utc::now(),
            event_code: event_code.into(),
            supplement,
        });
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_append_only_and_ordered() {
        let mut history = ObjectHistory::new();
        assert!(history.is_empty());

        history.record("SEQUENCE_CREATED", None);
        history.record("ORDER_APPENDED", Some("TO-1".to_string()));

        assert_eq!(history.len(), 2);
        assert_eq!(history.entries()[0].event_code, "SEQUENCE_CREATED");
        assert_eq!(history.last().unwrap().supplement.as_deref(), Some("TO-1"));
        assert!(history.entries()[0].timestamp <= history.entries()[1].timestamp);
    }
}

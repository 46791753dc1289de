use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lotkeeper_core::{LotId, Quantity, UserId};
use lotkeeper_events::Event;

/// Kind of lifecycle event recorded against a lot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Create,
    Split,
    Merge,
    Reserve,
    Release,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryKind::Create => "create",
            HistoryKind::Split => "split",
            HistoryKind::Merge => "merge",
            HistoryKind::Reserve => "reserve",
            HistoryKind::Release => "release",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(HistoryKind::Create),
            "split" => Some(HistoryKind::Split),
            "merge" => Some(HistoryKind::Merge),
            "reserve" => Some(HistoryKind::Reserve),
            "release" => Some(HistoryKind::Release),
            _ => None,
        }
    }
}

impl core::fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one lifecycle event. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotHistoryEntry {
    /// Store-assigned sequence; orders entries chronologically.
    pub id: u64,
    pub lot_id: LotId,
    pub kind: HistoryKind,
    pub timestamp: DateTime<Utc>,
    pub actor: UserId,
    pub quantity_before: Quantity,
    pub quantity_after: Quantity,
    pub note: Option<String>,
}

/// Committed history entries double as the lifecycle events published on the
/// bus once the store transaction has completed.
impl Event for LotHistoryEntry {
    fn event_type(&self) -> &'static str {
        match self.kind {
            HistoryKind::Create => "lot.created",
            HistoryKind::Split => "lot.split",
            HistoryKind::Merge => "lot.merged",
            HistoryKind::Reserve => "lot.reserved",
            HistoryKind::Release => "lot.released",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

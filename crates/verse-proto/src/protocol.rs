use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::item::{Item, ItemId};

/// Which corpora feed the infinite stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Local,
    #[default]
    Hybrid,
    Remote,
}

impl SourceMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Hybrid => "hybrid",
            Self::Remote => "remote",
        }
    }

    /// Whether this mode ever reaches for the remote corpus.
    pub fn uses_remote(&self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SourceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "hybrid" => Ok(Self::Hybrid),
            "remote" => Ok(Self::Remote),
            other => Err(format!("unknown source mode: {}", other)),
        }
    }
}

/// Health of the remote corpus as seen by the feed.
///
/// Transitions:
///   Healthy -> Degraded (after N consecutive failures) -> Healthy (on success)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceHealth {
    #[default]
    Healthy,
    /// Remote is being skipped; fills come from the local corpus.
    Degraded {
        consecutive_failures: u32,
        last_error: String,
    },
}

impl SourceHealth {
    /// Short label for an offline indicator.
    pub fn badge_label(&self) -> Option<&str> {
        match self {
            SourceHealth::Healthy => None,
            SourceHealth::Degraded { .. } => Some("OFFL"),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, SourceHealth::Degraded { .. })
    }
}

/// Messages sent from clients to the feed core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    MoveTo { position: usize },
    Next,
    Prev,
    SwitchSource { mode: SourceMode },
    /// Force a replenishment check outside the maintenance tick.
    Replenish,
    GetState,
}

/// Messages broadcast by the feed core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// The snapshot changed; receivers should re-read it.
    StateUpdated { rev: u64 },
    /// A slot went Empty -> Filled.
    SlotFilled { position: usize, item: Item },
    CursorMoved { position: usize },
    /// Pool and slots were rebuilt for a new source configuration.
    SourceSwitched { mode: SourceMode, generation: u64 },
    HealthChanged { health: SourceHealth },
    Log { message: String },
}

/// Client-facing view of one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SlotView {
    Empty,
    Loading,
    Filled { item: Item },
}

impl SlotView {
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            SlotView::Filled { item } => Some(item.id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionedSlot {
    pub position: usize,
    #[serde(flatten)]
    pub slot: SlotView,
}

/// Full state of the feed. `rev` increments on every published change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedSnapshot {
    #[serde(default)]
    pub rev: u64,
    /// Bumped on every source switch.
    pub generation: u64,
    pub mode: SourceMode,
    pub health: SourceHealth,
    pub cursor: usize,
    pub capacity: usize,
    pub pool_size: usize,
    pub unconsumed: usize,
    pub filled: usize,
    pub loading: usize,
    /// Slots in the prefetch range around the cursor.
    pub window: Vec<PositionedSlot>,
}

impl FeedSnapshot {
    pub fn slot_at(&self, position: usize) -> Option<&SlotView> {
        self.window
            .iter()
            .find(|s| s.position == position)
            .map(|s| &s.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_shape() {
        let json = serde_json::to_string(&Command::SwitchSource {
            mode: SourceMode::Remote,
        })
        .unwrap();
        assert_eq!(json, r#"{"cmd":"SwitchSource","mode":"remote"}"#);
    }

    #[test]
    fn test_slot_view_flattened() {
        let slot = PositionedSlot {
            position: 4,
            slot: SlotView::Loading,
        };
        let json = serde_json::to_value(&slot).unwrap();
        assert_eq!(json["position"], 4);
        assert_eq!(json["state"], "loading");
    }

    #[test]
    fn test_health_badge() {
        assert_eq!(SourceHealth::Healthy.badge_label(), None);
        let degraded = SourceHealth::Degraded {
            consecutive_failures: 3,
            last_error: "timeout".into(),
        };
        assert!(degraded.is_degraded());
        assert_eq!(degraded.badge_label(), Some("OFFL"));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Hybrid".parse::<SourceMode>(), Ok(SourceMode::Hybrid));
        assert!(!SourceMode::Local.uses_remote());
        assert!("cloud".parse::<SourceMode>().is_err());
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelType {
    Support,
    Resistance,
}

impl fmt::Display for LevelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelType::Support => f.write_str("support"),
            LevelType::Resistance => f.write_str("resistance"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotKind {
    High,
    Low,
}

impl PivotKind {
    /// A low pivot is price arriving from above and bouncing, i.e. support
    pub fn implied_level_type(&self) -> LevelType {
        match self {
            PivotKind::Low => LevelType::Support,
            PivotKind::High => LevelType::Resistance,
        }
    }
}

/// Local price extreme reported by the pivot detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotPoint {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub kind: PivotKind,
    pub volume: f64,
}

/// Price reaction at a level, as reported by the touch detector
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TouchEvent {
    #[validate(length(min = 1, max = 24))]
    pub symbol: String,
    #[validate(range(exclusive_min = 0.0))]
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    /// Size of the reaction away from the level, in percent
    #[validate(range(min = 0.0))]
    pub bounce_pct: f64,
    #[validate(range(min = 0.0))]
    pub volume: f64,
    #[serde(default)]
    pub volume_spike: bool,
    pub kind: PivotKind,
}

impl TouchEvent {
    /// Build a touch from a pivot, flagging a spike when volume reaches
    /// `spike_multiple` times the average
    pub fn from_pivot(
        symbol: impl Into<String>,
        pivot: &PivotPoint,
        bounce_pct: f64,
        avg_volume: f64,
        spike_multiple: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price: pivot.price,
            timestamp: pivot.timestamp,
            bounce_pct,
            volume: pivot.volume,
            volume_spike: avg_volume > 0.0 && pivot.volume >= avg_volume * spike_multiple,
            kind: pivot.kind,
        }
    }

    pub fn level_type(&self) -> LevelType {
        self.kind.implied_level_type()
    }
}

/// Identifier of a level within the catalog, e.g. `AAPL#3`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LevelKey {
    pub symbol: String,
    pub seq: u32,
}

impl fmt::Display for LevelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.symbol, self.seq)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupportResistanceLevel {
    pub key: LevelKey,
    pub price: f64,
    pub level_type: LevelType,
    pub strength: f64,
    pub touches: u32,
    pub first_touch: DateTime<Utc>,
    pub last_touch: DateTime<Utc>,
    pub volume_confirmed: bool,
    pub avg_bounce_pct: f64,
    pub avg_volume: f64,
    pub active: bool,
}

impl SupportResistanceLevel {
    pub fn symbol(&self) -> &str {
        &self.key.symbol
    }

    /// Hours since the last touch, never negative
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (now - self.last_touch).num_seconds().max(0);
        seconds as f64 / 3600.0
    }
}

/// Append-only record of one touch, linked to exactly one level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SRLevelTouch {
    pub level: LevelKey,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub bounce_pct: f64,
    pub volume: f64,
    pub volume_spike: bool,
}

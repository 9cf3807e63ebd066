use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::business_logic::lifecycle::Phase;
use crate::business_logic::schema::PatternFamily;
use crate::business_logic::thesis::ThesisComponent;
use crate::models::level::{LevelKey, LevelType, SupportResistanceLevel};
use crate::models::pattern::{PatternId, PatternStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternThesisSnapshot {
    pub pattern_id: PatternId,
    pub family: PatternFamily,
    pub status: PatternStatus,
    pub phase: Phase,
    pub completion_percent: f64,
    pub completed_count: usize,
    pub total_count: usize,
    /// `None` while the geometry needed for a projection is missing
    pub target_price: Option<f64>,
    pub pattern_height: Option<f64>,
    pub symmetry_score: Option<f64>,
    pub components: Vec<ThesisComponent>,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupportResistanceLevelSnapshot {
    pub key: LevelKey,
    pub price: f64,
    pub level_type: LevelType,
    pub strength: f64,
    pub touches: u32,
    pub volume_confirmed: bool,
    pub avg_bounce_pct: f64,
    pub last_touch: DateTime<Utc>,
    pub active: bool,
}

impl From<&SupportResistanceLevel> for SupportResistanceLevelSnapshot {
    fn from(level: &SupportResistanceLevel) -> Self {
        Self {
            key: level.key.clone(),
            price: level.price,
            level_type: level.level_type,
            strength: level.strength,
            touches: level.touches,
            volume_confirmed: level.volume_confirmed,
            avg_bounce_pct: level.avg_bounce_pct,
            last_touch: level.last_touch,
            active: level.active,
        }
    }
}

/// Closest active levels around a price
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NearestLevels {
    pub support: Option<SupportResistanceLevelSnapshot>,
    pub resistance: Option<SupportResistanceLevelSnapshot>,
}

/// Notifications published on the event hub
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    PhaseChanged {
        pattern_id: PatternId,
        family: PatternFamily,
        from: Phase,
        to: Phase,
        completion_percent: f64,
        target_price: Option<f64>,
        at: DateTime<Utc>,
    },
    PatternRetired {
        pattern_id: PatternId,
        status: PatternStatus,
        at: DateTime<Utc>,
    },
    LevelCreated {
        level: SupportResistanceLevelSnapshot,
    },
    LevelDeactivated {
        key: LevelKey,
        price: f64,
        level_type: LevelType,
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn symbol(&self) -> &str {
        match self {
            EngineEvent::PhaseChanged { pattern_id, .. }
            | EngineEvent::PatternRetired { pattern_id, .. } => &pattern_id.symbol,
            EngineEvent::LevelCreated { level } => &level.key.symbol,
            EngineEvent::LevelDeactivated { key, .. } => &key.symbol,
        }
    }
}

use chrono::{DateTime, Utc};

use crate::business_logic::config::{LevelConfig, StrengthWeights};
use crate::models::level::{LevelKey, LevelType, SRLevelTouch, SupportResistanceLevel, TouchEvent};

/// Deterministic strength from touch history and age at `now`
pub fn level_strength(
    level: &SupportResistanceLevel,
    weights: &StrengthWeights,
    now: DateTime<Utc>,
) -> f64 {
    let saturation = weights.touch_saturation.max(1) as f64;
    let touch_score = ((1.0 + level.touches as f64).ln() / (1.0 + saturation).ln()).min(1.0);
    let bounce_score = (level.avg_bounce_pct / weights.bounce_norm_pct).clamp(0.0, 1.0);
    let volume_score = if level.volume_confirmed { 1.0 } else { 0.0 };

    let total_weight = weights.touch_weight + weights.bounce_weight + weights.volume_weight;
    if total_weight <= 0.0 {
        return 0.0;
    }

    let base = 100.0
        * (weights.touch_weight * touch_score
            + weights.bounce_weight * bounce_score
            + weights.volume_weight * volume_score)
        / total_weight;
    let recency = 0.5_f64.powf(level.age_hours(now) / weights.recency_half_life_hours);

    base * recency
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    Attached,
    Created,
}

/// Result of matching a touch, ready to commit
#[derive(Debug, Clone, PartialEq)]
pub struct LevelUpdate {
    pub outcome: TouchOutcome,
    pub level: SupportResistanceLevel,
    pub touch: SRLevelTouch,
}

/// Support/resistance catalog for one symbol.
///
/// Matching and committing are split so a caller can persist the planned
/// update before applying it; both must happen under the same exclusive
/// borrow for match-or-create to stay atomic.
#[derive(Debug, Clone)]
pub struct LevelBook {
    symbol: String,
    levels: Vec<SupportResistanceLevel>,
    touches: Vec<SRLevelTouch>,
    next_seq: u32,
}

impl LevelBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            levels: Vec::new(),
            touches: Vec::new(),
            next_seq: 1,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn levels(&self) -> &[SupportResistanceLevel] {
        &self.levels
    }

    pub fn touches(&self) -> &[SRLevelTouch] {
        &self.touches
    }

    pub fn level(&self, key: &LevelKey) -> Option<&SupportResistanceLevel> {
        self.levels.iter().find(|level| &level.key == key)
    }

    /// Match the touch against active levels of its implied type, or plan a new level
    pub fn plan_touch(&self, touch: &TouchEvent, config: &LevelConfig) -> LevelUpdate {
        let level_type = touch.level_type();

        let matched = self
            .levels
            .iter()
            .filter(|level| level.active && level.level_type == level_type)
            .map(|level| (level, distance_pct(level.price, touch.price)))
            .filter(|(_, distance)| *distance <= config.tolerance_pct)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(level, _)| level);

        let (outcome, level) = match matched {
            Some(existing) => (TouchOutcome::Attached, attach(existing, touch, config)),
            None => (TouchOutcome::Created, self.seed(touch, level_type, config)),
        };

        let record = SRLevelTouch {
            level: level.key.clone(),
            price: touch.price,
            timestamp: touch.timestamp,
            bounce_pct: touch.bounce_pct,
            volume: touch.volume,
            volume_spike: touch.volume_spike,
        };

        LevelUpdate {
            outcome,
            level,
            touch: record,
        }
    }

    /// Apply a planned update from [`LevelBook::plan_touch`]
    pub fn commit(&mut self, update: LevelUpdate) {
        match self.levels.iter_mut().find(|level| level.key == update.level.key) {
            Some(slot) => *slot = update.level,
            None => {
                self.next_seq = self.next_seq.max(update.level.key.seq + 1);
                self.levels.push(update.level);
            }
        }
        self.touches.push(update.touch);
    }

    /// Highest active support strictly below and lowest active resistance strictly above
    pub fn find_nearest(
        &self,
        price: f64,
    ) -> (Option<&SupportResistanceLevel>, Option<&SupportResistanceLevel>) {
        let support = self
            .levels
            .iter()
            .filter(|level| {
                level.active && level.level_type == LevelType::Support && level.price < price
            })
            .max_by(|a, b| a.price.total_cmp(&b.price));

        let resistance = self
            .levels
            .iter()
            .filter(|level| {
                level.active && level.level_type == LevelType::Resistance && level.price > price
            })
            .min_by(|a, b| a.price.total_cmp(&b.price));

        (support, resistance)
    }

    /// Active levels whose last touch is older than `max_age_hours`
    pub fn stale_levels(&self, max_age_hours: f64, now: DateTime<Utc>) -> Vec<LevelKey> {
        self.levels
            .iter()
            .filter(|level| level.active && level.age_hours(now) > max_age_hours)
            .map(|level| level.key.clone())
            .collect()
    }

    /// Returns true if the level was active
    pub fn deactivate(&mut self, key: &LevelKey) -> bool {
        match self.levels.iter_mut().find(|level| &level.key == key) {
            Some(level) if level.active => {
                level.active = false;
                true
            }
            _ => false,
        }
    }

    /// Recency-discounted strength of every active level at `now`
    pub fn refreshed_strengths(
        &self,
        weights: &StrengthWeights,
        now: DateTime<Utc>,
    ) -> Vec<(LevelKey, f64)> {
        self.levels
            .iter()
            .filter(|level| level.active)
            .map(|level| (level.key.clone(), level_strength(level, weights, now)))
            .collect()
    }

    pub fn set_strength(&mut self, key: &LevelKey, strength: f64) -> bool {
        match self.levels.iter_mut().find(|level| &level.key == key) {
            Some(level) => {
                level.strength = strength;
                true
            }
            None => false,
        }
    }

    fn seed(
        &self,
        touch: &TouchEvent,
        level_type: LevelType,
        config: &LevelConfig,
    ) -> SupportResistanceLevel {
        let mut level = SupportResistanceLevel {
            key: LevelKey {
                symbol: self.symbol.clone(),
                seq: self.next_seq,
            },
            price: touch.price,
            level_type,
            strength: 0.0,
            touches: 1,
            first_touch: touch.timestamp,
            last_touch: touch.timestamp,
            volume_confirmed: touch.volume_spike,
            avg_bounce_pct: touch.bounce_pct,
            avg_volume: touch.volume,
            active: true,
        };
        level.strength = level_strength(&level, &config.strength, touch.timestamp);
        level
    }
}

fn attach(
    existing: &SupportResistanceLevel,
    touch: &TouchEvent,
    config: &LevelConfig,
) -> SupportResistanceLevel {
    let mut level = existing.clone();
    let n = level.touches as f64 + 1.0;

    level.touches += 1;
    level.avg_bounce_pct += (touch.bounce_pct - level.avg_bounce_pct) / n;
    level.avg_volume += (touch.volume - level.avg_volume) / n;
    level.volume_confirmed |= touch.volume_spike;
    level.first_touch = level.first_touch.min(touch.timestamp);
    level.last_touch = level.last_touch.max(touch.timestamp);
    level.strength = level_strength(&level, &config.strength, level.last_touch);
    level
}

fn distance_pct(level_price: f64, price: f64) -> f64 {
    (price - level_price).abs() / level_price * 100.0
}

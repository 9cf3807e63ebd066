use std::time::Duration;

use validator::{Validate, ValidationError};

/// Configuration parameters for support/resistance aggregation
#[derive(Debug, Clone, Validate)]
pub struct LevelConfig {
    /// Max % distance between a touch and a level for the touch to attach
    #[validate(range(exclusive_min = 0.0, max = 50.0))]
    pub tolerance_pct: f64,
    /// Hours without a touch before a sweep deactivates a level
    #[validate(range(exclusive_min = 0.0))]
    pub max_age_hours: f64,
    #[validate(nested)]
    pub strength: StrengthWeights,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            tolerance_pct: 0.5,
            max_age_hours: 168.0,
            strength: StrengthWeights::default(),
        }
    }
}

/// Tunable strength scoring.
///
/// strength = 100 * weighted mean of (touch score, bounce score, volume score),
/// discounted by half-life decay on hours since the last touch.
#[derive(Debug, Clone, Validate)]
#[validate(schema(function = "validate_weight_sum"))]
pub struct StrengthWeights {
    /// Weight of the touch-count score
    #[validate(range(min = 0.0))]
    pub touch_weight: f64,
    /// Weight of the average bounce score
    #[validate(range(min = 0.0))]
    pub bounce_weight: f64,
    /// Weight of volume confirmation
    #[validate(range(min = 0.0))]
    pub volume_weight: f64,
    /// Touch count at which the touch score saturates (log-scaled below it)
    #[validate(range(min = 1))]
    pub touch_saturation: u32,
    /// Average bounce % that earns a full bounce score
    #[validate(range(exclusive_min = 0.0))]
    pub bounce_norm_pct: f64,
    /// Hours for the recency discount to halve strength
    #[validate(range(exclusive_min = 0.0))]
    pub recency_half_life_hours: f64,
}

impl Default for StrengthWeights {
    fn default() -> Self {
        Self {
            touch_weight: 0.5,
            bounce_weight: 0.3,
            volume_weight: 0.2,
            touch_saturation: 5,
            bounce_norm_pct: 3.0,
            recency_half_life_hours: 168.0,
        }
    }
}

fn validate_weight_sum(weights: &StrengthWeights) -> Result<(), ValidationError> {
    let sum = weights.touch_weight + weights.bounce_weight + weights.volume_weight;
    if sum > 0.0 {
        return Ok(());
    }

    let mut error = ValidationError::new("zero_weight_sum");
    error.message = Some("strength weights must not all be zero".into());
    Err(error)
}

/// Configuration for the async trackers around the core
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Upper bound on a single store or alert call
    pub collaborator_timeout: Duration,
    /// Event hub buffer; slow subscribers skip lagged events
    pub event_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout: Duration::from_secs(5),
            event_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(LevelConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_tolerance() {
        let config = LevelConfig {
            tolerance_pct: 0.0,
            ..LevelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_all_zero_weights() {
        let config = LevelConfig {
            strength: StrengthWeights {
                touch_weight: 0.0,
                bounce_weight: 0.0,
                volume_weight: 0.0,
                ..StrengthWeights::default()
            },
            ..LevelConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::business_logic::lifecycle::Phase;
use crate::business_logic::schema::{PatternFamily, TARGET_REACHED};
use crate::business_logic::target::TargetProjector;
use crate::business_logic::thesis::{ComponentUpdate, PatternThesis};
use crate::errors::ThesisError;
use crate::models::snapshot::PatternThesisSnapshot;

/// Pattern instance identity: symbol plus detection time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternId {
    pub symbol: String,
    pub detected_at: DateTime<Utc>,
}

impl PatternId {
    pub fn new(symbol: impl Into<String>, detected_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            detected_at,
        }
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}",
            self.symbol,
            self.detected_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Finished geometry handed over by the detector.
///
/// Every point is optional: an absent point means "not formed yet", never a
/// zero price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternGeometry {
    pub left_shoulder: Option<PricePoint>,
    pub head: Option<PricePoint>,
    pub right_shoulder: Option<PricePoint>,
    pub upper_touches: Vec<PricePoint>,
    pub lower_touches: Vec<PricePoint>,
    pub neckline: Option<f64>,
    pub breakout_level: Option<f64>,
    pub upper_slope: Option<f64>,
    pub lower_slope: Option<f64>,
    /// Pattern width in bars
    pub width: Option<u32>,
    /// Caller-supplied height, used by wedges
    pub height: Option<f64>,
    /// Wedge convergence score, 0-100
    pub convergence: Option<f64>,
}

impl PatternGeometry {
    /// Level price must close through to trigger the breakout
    pub fn breakout_reference(&self, family: PatternFamily) -> Option<f64> {
        match family {
            PatternFamily::HeadAndShoulders | PatternFamily::InverseHeadAndShoulders => {
                self.neckline
            }
            PatternFamily::FallingWedge => self.breakout_level,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStatus {
    Active,
    Completed,
    Invalidated,
    Superseded,
}

impl PatternStatus {
    pub fn is_retired(&self) -> bool {
        !matches!(self, PatternStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertKind {
    PhaseChanged { from: Phase, to: Phase },
    Invalidated,
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternAlert {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: AlertKind,
    pub message: String,
}

/// What a price observation did to the pattern
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceReaction {
    pub transition: Option<PhaseTransition>,
    pub invalidated: bool,
    pub auto_completed: Vec<&'static str>,
}

/// A detected formation together with its thesis
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    id: PatternId,
    family: PatternFamily,
    geometry: PatternGeometry,
    thesis: PatternThesis,
    // last derived phase, kept only to detect transitions
    phase: Phase,
    status: PatternStatus,
    target_price: Option<f64>,
    alerts: Vec<PatternAlert>,
}

impl Pattern {
    pub fn new(id: PatternId, family: PatternFamily, geometry: PatternGeometry) -> Self {
        let mut pattern = Self {
            id,
            family,
            geometry,
            thesis: PatternThesis::new(family),
            phase: Phase::Formation,
            status: PatternStatus::Active,
            target_price: None,
            alerts: Vec::new(),
        };
        pattern.target_price = pattern.projector().target_price().ok();
        pattern
    }

    pub fn id(&self) -> &PatternId {
        &self.id
    }

    pub fn symbol(&self) -> &str {
        &self.id.symbol
    }

    pub fn family(&self) -> PatternFamily {
        self.family
    }

    pub fn geometry(&self) -> &PatternGeometry {
        &self.geometry
    }

    pub fn thesis(&self) -> &PatternThesis {
        &self.thesis
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> PatternStatus {
        self.status
    }

    pub fn target_price(&self) -> Option<f64> {
        self.target_price
    }

    pub fn alerts(&self) -> &[PatternAlert] {
        &self.alerts
    }

    pub fn projector(&self) -> TargetProjector<'_> {
        TargetProjector::new(self.family, &self.geometry)
    }

    pub fn apply_update(
        &mut self,
        update: &ComponentUpdate,
        at: DateTime<Utc>,
    ) -> Result<Option<PhaseTransition>, ThesisError> {
        self.thesis.update_component(update, at)?;
        Ok(self.refresh(at))
    }

    pub fn reset_component(
        &mut self,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PhaseTransition>, ThesisError> {
        self.thesis.reset_component(name, at)?;
        Ok(self.refresh(at))
    }

    pub fn update_geometry(
        &mut self,
        geometry: PatternGeometry,
        at: DateTime<Utc>,
    ) -> Option<PhaseTransition> {
        self.geometry = geometry;
        self.refresh(at)
    }

    /// React to a new close: invalidation, breakout trigger and target checks
    pub fn observe_price(
        &mut self,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<PriceReaction, ThesisError> {
        let mut reaction = PriceReaction::default();
        let bullish = self.family.is_bullish();
        let trigger = self.family.trigger_component();
        let triggered = self
            .thesis
            .component(trigger)
            .is_some_and(|component| component.completed());

        if !triggered {
            if let Some(head) = self.invalidation_level() {
                let beyond_head = if bullish { price < head } else { price > head };
                if beyond_head {
                    self.retire(
                        PatternStatus::Invalidated,
                        AlertKind::Invalidated,
                        format!("price {:.2} moved beyond the head at {:.2}", price, head),
                        at,
                    );
                    reaction.invalidated = true;
                    return Ok(reaction);
                }
            }

            if let Some(level) = self.geometry.breakout_reference(self.family) {
                let crossed = if bullish { price > level } else { price < level };
                if crossed {
                    let update = ComponentUpdate::completed(trigger, 100.0)
                        .with_evidence(format!("close {:.2} through {:.2}", price, level))
                        .auto();
                    self.thesis.update_component(&update, at)?;
                    reaction.auto_completed.push(trigger);
                }
            }
        }

        if self.thesis.derive_phase() == Phase::TargetPursuit {
            if let Some(target) = self.target_price {
                let reached = if bullish {
                    price >= target
                } else {
                    price <= target
                };
                if reached {
                    let update = ComponentUpdate::completed(TARGET_REACHED, 100.0)
                        .with_evidence(format!("price {:.2} reached target {:.2}", price, target))
                        .auto();
                    self.thesis.update_component(&update, at)?;
                    reaction.auto_completed.push(TARGET_REACHED);
                }
            }
        }

        reaction.transition = self.refresh(at);
        Ok(reaction)
    }

    pub fn invalidate(&mut self, reason: &str, at: DateTime<Utc>) {
        self.retire(
            PatternStatus::Invalidated,
            AlertKind::Invalidated,
            reason.to_string(),
            at,
        );
    }

    pub fn supersede(&mut self, by: &PatternId, at: DateTime<Utc>) {
        self.retire(
            PatternStatus::Superseded,
            AlertKind::Superseded,
            format!("superseded by {}", by),
            at,
        );
    }

    pub fn snapshot(&self, as_of: DateTime<Utc>) -> PatternThesisSnapshot {
        PatternThesisSnapshot {
            pattern_id: self.id.clone(),
            family: self.family,
            status: self.status,
            phase: self.thesis.derive_phase(),
            completion_percent: self.thesis.calculate_completion(),
            completed_count: self.thesis.completed_count(),
            total_count: self.thesis.total_count(),
            target_price: self.target_price,
            pattern_height: self.projector().pattern_height().ok(),
            symmetry_score: self.projector().symmetry_score().ok(),
            components: self.thesis.components().to_vec(),
            as_of,
        }
    }

    fn invalidation_level(&self) -> Option<f64> {
        match self.family {
            PatternFamily::HeadAndShoulders | PatternFamily::InverseHeadAndShoulders => {
                self.geometry.head.map(|head| head.price)
            }
            PatternFamily::FallingWedge => None,
        }
    }

    fn refresh(&mut self, at: DateTime<Utc>) -> Option<PhaseTransition> {
        self.target_price = self.projector().target_price().ok();

        let phase = self.thesis.derive_phase();
        if phase == self.phase {
            return None;
        }

        let transition = PhaseTransition {
            from: self.phase,
            to: phase,
        };
        self.phase = phase;

        tracing::info!(
            "[{}] {} moved {} -> {} ({:.1}% complete)",
            self.id.symbol,
            self.family,
            transition.from,
            transition.to,
            self.thesis.calculate_completion()
        );

        self.alerts.push(PatternAlert {
            at,
            kind: AlertKind::PhaseChanged {
                from: transition.from,
                to: transition.to,
            },
            message: format!(
                "{} {} entered {}",
                self.id.symbol, self.family, transition.to
            ),
        });

        if phase == Phase::Completed {
            self.status = PatternStatus::Completed;
        }

        Some(transition)
    }

    fn retire(&mut self, status: PatternStatus, kind: AlertKind, message: String, at: DateTime<Utc>) {
        tracing::info!("[{}] {} {:?}: {}", self.id.symbol, self.family, status, message);
        self.status = status;
        self.alerts.push(PatternAlert { at, kind, message });
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::business_logic::lifecycle::{self, Phase};
use crate::business_logic::schema::{ComponentSpec, PatternFamily, Tier};
use crate::errors::ThesisError;

/// A single weighted criterion of a pattern thesis.
///
/// Weight, required flag, tier and trigger come from the family table and
/// never change; only the completion state mutates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThesisComponent {
    name: &'static str,
    description: &'static str,
    weight: f64,
    required: bool,
    tier: Tier,
    #[serde(skip)]
    trigger: bool,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
    confidence: f64,
    evidence: Vec<String>,
    last_checked: Option<DateTime<Utc>>,
    auto_detected: bool,
}

impl ThesisComponent {
    fn from_spec(spec: &ComponentSpec) -> Self {
        Self {
            name: spec.name,
            description: spec.description,
            weight: spec.weight,
            required: spec.required,
            tier: spec.tier,
            trigger: spec.trigger,
            completed: false,
            completed_at: None,
            confidence: 0.0,
            evidence: Vec::new(),
            last_checked: None,
            auto_detected: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn is_trigger(&self) -> bool {
        self.trigger
    }

    pub fn completed(&self) -> bool {
        self.completed
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn evidence(&self) -> &[String] {
        &self.evidence
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }

    pub fn auto_detected(&self) -> bool {
        self.auto_detected
    }
}

/// Evidence update for one component, as emitted by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentUpdate {
    pub name: String,
    pub completed: bool,
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub auto_detected: bool,
}

impl ComponentUpdate {
    pub fn completed(name: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            completed: true,
            confidence,
            evidence: Vec::new(),
            auto_detected: false,
        }
    }

    pub fn pending(name: impl Into<String>, confidence: f64) -> Self {
        Self {
            completed: false,
            ..Self::completed(name, confidence)
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }

    pub fn auto(mut self) -> Self {
        self.auto_detected = true;
        self
    }
}

/// Checklist of weighted criteria for one pattern instance
#[derive(Debug, Clone, PartialEq)]
pub struct PatternThesis {
    family: PatternFamily,
    components: Vec<ThesisComponent>,
}

impl PatternThesis {
    /// Seed the family's component table with zeroed completion state
    pub fn new(family: PatternFamily) -> Self {
        Self {
            family,
            components: family.specs().iter().map(ThesisComponent::from_spec).collect(),
        }
    }

    /// Build a thesis from a family name coming off the wire
    pub fn initialize(family: &str) -> Result<Self, ThesisError> {
        Ok(Self::new(family.parse()?))
    }

    pub fn family(&self) -> PatternFamily {
        self.family
    }

    pub fn components(&self) -> &[ThesisComponent] {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&ThesisComponent> {
        self.components.iter().find(|component| component.name == name)
    }

    /// Apply an evidence update.
    ///
    /// Completion is sticky: an update with `completed = false` never clears a
    /// satisfied component, only [`PatternThesis::reset_component`] does.
    /// Evidence lines already recorded are not duplicated, so replaying the
    /// same update is a no-op. Returns true when the component became complete.
    pub fn update_component(
        &mut self,
        update: &ComponentUpdate,
        at: DateTime<Utc>,
    ) -> Result<bool, ThesisError> {
        if !(0.0..=100.0).contains(&update.confidence) {
            return Err(ThesisError::InvalidConfidence(update.confidence));
        }

        let family = self.family;
        let component = self
            .components
            .iter_mut()
            .find(|component| component.name == update.name)
            .ok_or_else(|| ThesisError::ComponentNotFound(update.name.clone()))?;

        let newly_completed = update.completed && !component.completed;
        if newly_completed {
            component.completed = true;
            component.completed_at = Some(at);
            component.auto_detected = update.auto_detected;
        }
        component.confidence = update.confidence;
        for line in &update.evidence {
            if !component.evidence.contains(line) {
                component.evidence.push(line.clone());
            }
        }
        component.last_checked = Some(at);

        tracing::debug!(
            "[{}] {} updated (completed: {}, confidence: {:.0})",
            family,
            component.name,
            component.completed,
            component.confidence
        );

        Ok(newly_completed)
    }

    /// Explicitly clear a component's completion, confidence and evidence
    pub fn reset_component(&mut self, name: &str, at: DateTime<Utc>) -> Result<(), ThesisError> {
        let component = self
            .components
            .iter_mut()
            .find(|component| component.name == name)
            .ok_or_else(|| ThesisError::ComponentNotFound(name.to_string()))?;

        component.completed = false;
        component.completed_at = None;
        component.confidence = 0.0;
        component.evidence.clear();
        component.auto_detected = false;
        component.last_checked = Some(at);
        Ok(())
    }

    pub fn completed_count(&self) -> usize {
        self.components.iter().filter(|c| c.completed).count()
    }

    pub fn total_count(&self) -> usize {
        self.components.len()
    }

    /// Weighted completion in percent
    pub fn calculate_completion(&self) -> f64 {
        let (done, total) = self
            .components
            .iter()
            .fold((0.0, 0.0), |(done, total), component| {
                let done = if component.completed {
                    done + component.weight
                } else {
                    done
                };
                (done, total + component.weight)
            });

        if total > 0.0 {
            100.0 * done / total
        } else {
            0.0
        }
    }

    /// Current phase, always re-derived from component state
    pub fn derive_phase(&self) -> Phase {
        lifecycle::derive_phase(&self.components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn make_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 14, 30, 0).unwrap()
    }

    fn weighted_completion(thesis: &PatternThesis) -> f64 {
        let total: f64 = thesis.components().iter().map(|c| c.weight()).sum();
        let done: f64 = thesis
            .components()
            .iter()
            .filter(|c| c.completed())
            .map(|c| c.weight())
            .sum();
        100.0 * done / total
    }

    #[test]
    fn initialize_seeds_zeroed_components() {
        let thesis = PatternThesis::initialize("falling_wedge").unwrap();
        assert_eq!(thesis.family(), PatternFamily::FallingWedge);
        assert_eq!(thesis.total_count(), PatternFamily::FallingWedge.specs().len());
        assert_eq!(thesis.completed_count(), 0);
        assert_eq!(thesis.calculate_completion(), 0.0);
        assert!(thesis
            .components()
            .iter()
            .all(|c| !c.completed() && c.evidence().is_empty() && c.completed_at().is_none()));
    }

    #[test]
    fn initialize_rejects_unknown_family() {
        let result = PatternThesis::initialize("cup_and_handle");
        assert_eq!(
            result.unwrap_err(),
            ThesisError::UnknownFamily("cup_and_handle".to_string())
        );
    }

    #[test]
    fn unknown_component_leaves_thesis_untouched() {
        let mut thesis = PatternThesis::new(PatternFamily::HeadAndShoulders);
        thesis
            .update_component(&ComponentUpdate::completed("head", 80.0), make_time())
            .unwrap();
        let before = thesis.clone();

        // wedge-only criterion applied to an H&S thesis
        let error = thesis
            .update_component(&ComponentUpdate::completed("convergence", 80.0), make_time())
            .unwrap_err();

        assert_eq!(error, ThesisError::ComponentNotFound("convergence".to_string()));
        assert_eq!(thesis, before);
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let mut thesis = PatternThesis::new(PatternFamily::HeadAndShoulders);
        let error = thesis
            .update_component(&ComponentUpdate::completed("head", 140.0), make_time())
            .unwrap_err();
        assert_eq!(error, ThesisError::InvalidConfidence(140.0));
        assert_eq!(thesis.completed_count(), 0);
    }

    #[test]
    fn completion_tracks_weights_after_every_update() {
        let mut thesis = PatternThesis::new(PatternFamily::HeadAndShoulders);
        let updates = [
            ComponentUpdate::completed("left_shoulder", 70.0),
            ComponentUpdate::pending("head", 40.0),
            ComponentUpdate::completed("head", 85.0),
            ComponentUpdate::completed("volume_profile", 60.0),
            ComponentUpdate::pending("left_shoulder", 10.0),
            ComponentUpdate::completed("neckline_break", 95.0),
        ];

        for update in &updates {
            thesis.update_component(update, make_time()).unwrap();
            assert!((thesis.calculate_completion() - weighted_completion(&thesis)).abs() < 1e-9);
        }

        // 10 + 15 + 5 + 15 out of 100
        assert!((thesis.calculate_completion() - 45.0).abs() < 1e-9);
        assert_eq!(thesis.completed_count(), 4);
    }

    #[test]
    fn completed_is_sticky_until_reset() {
        let mut thesis = PatternThesis::new(PatternFamily::FallingWedge);
        let first = make_time();
        assert!(thesis
            .update_component(&ComponentUpdate::completed("convergence", 90.0), first)
            .unwrap());

        let later = first + Duration::hours(4);
        let newly = thesis
            .update_component(
                &ComponentUpdate::pending("convergence", 30.0).with_evidence("lines diverged"),
                later,
            )
            .unwrap();

        let component = thesis.component("convergence").unwrap();
        assert!(!newly);
        assert!(component.completed());
        assert_eq!(component.completed_at(), Some(first));
        assert_eq!(component.confidence(), 30.0);
        assert_eq!(component.last_checked(), Some(later));

        thesis.reset_component("convergence", later).unwrap();
        let component = thesis.component("convergence").unwrap();
        assert!(!component.completed());
        assert!(component.evidence().is_empty());
    }

    #[test]
    fn repeated_update_is_idempotent() {
        let mut thesis = PatternThesis::new(PatternFamily::InverseHeadAndShoulders);
        let update = ComponentUpdate::completed("neckline", 75.0)
            .with_evidence("three reaction highs within 0.4%")
            .auto();

        thesis.update_component(&update, make_time()).unwrap();
        let once = thesis.clone();
        thesis.update_component(&update, make_time()).unwrap();

        assert_eq!(thesis, once);
        let component = thesis.component("neckline").unwrap();
        assert_eq!(component.evidence().len(), 1);
        assert!(component.auto_detected());
    }

    #[test]
    fn schema_fields_survive_updates() {
        let mut thesis = PatternThesis::new(PatternFamily::HeadAndShoulders);
        let before: Vec<_> = thesis
            .components()
            .iter()
            .map(|c| (c.name(), c.weight(), c.required(), c.tier()))
            .collect();

        thesis
            .update_component(&ComponentUpdate::completed("right_shoulder", 55.0), make_time())
            .unwrap();
        thesis.reset_component("right_shoulder", make_time()).unwrap();

        let after: Vec<_> = thesis
            .components()
            .iter()
            .map(|c| (c.name(), c.weight(), c.required(), c.tier()))
            .collect();
        assert_eq!(before, after);
    }
}

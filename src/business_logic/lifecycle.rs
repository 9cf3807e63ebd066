use std::fmt;

use serde::{Deserialize, Serialize};

use crate::business_logic::schema::Tier;
use crate::business_logic::thesis::ThesisComponent;

/// Lifecycle stage of a detected pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Structure still being confirmed
    Formation,
    /// Formation complete and the breakout trigger fired
    Breakout,
    /// Breakout confirmed, price travelling toward the target
    TargetPursuit,
    /// Target criteria satisfied
    Completed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Formation => "formation",
            Phase::Breakout => "breakout",
            Phase::TargetPursuit => "target_pursuit",
            Phase::Completed => "completed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the ordered phase table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseRule {
    pub phase: Phase,
    pub tier: Tier,
    pub include_trigger: bool,
}

/// Evaluated top to bottom; the first satisfied rule decides the phase.
pub const PHASE_RULES: [PhaseRule; 3] = [
    PhaseRule {
        phase: Phase::Completed,
        tier: Tier::Target,
        include_trigger: false,
    },
    PhaseRule {
        phase: Phase::TargetPursuit,
        tier: Tier::Breakout,
        include_trigger: false,
    },
    PhaseRule {
        phase: Phase::Breakout,
        tier: Tier::Formation,
        include_trigger: true,
    },
];

impl PhaseRule {
    /// A rule with no gating components is never satisfied, so an empty tier cannot skip phases.
    pub fn is_satisfied(&self, components: &[ThesisComponent]) -> bool {
        let (gating, all_complete) = components
            .iter()
            .filter(|component| self.gates_on(component))
            .fold((0usize, true), |(count, done), component| {
                (count + 1, done && component.completed())
            });

        gating > 0 && all_complete
    }

    fn gates_on(&self, component: &ThesisComponent) -> bool {
        (component.required() && component.tier() == self.tier)
            || (self.include_trigger && component.is_trigger())
    }
}

/// Pure phase derivation over the current component state
pub fn derive_phase(components: &[ThesisComponent]) -> Phase {
    PHASE_RULES
        .iter()
        .find(|rule| rule.is_satisfied(components))
        .map(|rule| rule.phase)
        .unwrap_or(Phase::Formation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business_logic::schema::PatternFamily;
    use crate::business_logic::thesis::{ComponentUpdate, PatternThesis};
    use chrono::{TimeZone, Utc};

    fn complete(thesis: &mut PatternThesis, names: &[&str]) {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        for name in names {
            thesis
                .update_component(&ComponentUpdate::completed(*name, 90.0), at)
                .unwrap();
        }
    }

    const HS_FORMATION: [&str; 4] = ["left_shoulder", "head", "right_shoulder", "neckline"];

    #[test]
    fn rule_order_is_target_then_breakout_then_formation() {
        let phases: Vec<_> = PHASE_RULES.iter().map(|rule| rule.phase).collect();
        assert_eq!(
            phases,
            vec![Phase::Completed, Phase::TargetPursuit, Phase::Breakout]
        );
        assert!(PHASE_RULES[2].include_trigger);
        assert!(!PHASE_RULES[0].include_trigger && !PHASE_RULES[1].include_trigger);
    }

    #[test]
    fn fresh_thesis_is_in_formation() {
        let thesis = PatternThesis::new(PatternFamily::HeadAndShoulders);
        assert_eq!(derive_phase(thesis.components()), Phase::Formation);
    }

    #[test]
    fn formation_alone_does_not_break_out() {
        let mut thesis = PatternThesis::new(PatternFamily::HeadAndShoulders);
        complete(&mut thesis, &HS_FORMATION);
        assert_eq!(thesis.derive_phase(), Phase::Formation);
    }

    #[test]
    fn formation_plus_trigger_is_breakout() {
        let mut thesis = PatternThesis::new(PatternFamily::HeadAndShoulders);
        complete(&mut thesis, &HS_FORMATION);
        complete(&mut thesis, &["neckline_break"]);
        assert_eq!(thesis.derive_phase(), Phase::Breakout);
    }

    #[test]
    fn required_breakout_tier_is_target_pursuit() {
        let mut thesis = PatternThesis::new(PatternFamily::HeadAndShoulders);
        complete(&mut thesis, &HS_FORMATION);
        complete(&mut thesis, &["neckline_break", "breakout_volume"]);
        assert_eq!(thesis.derive_phase(), Phase::TargetPursuit);
    }

    #[test]
    fn target_tier_wins_over_lower_tiers() {
        let mut thesis = PatternThesis::new(PatternFamily::FallingWedge);
        complete(&mut thesis, &["upper_trendline", "target_reached"]);
        assert_eq!(thesis.derive_phase(), Phase::Completed);
    }

    #[test]
    fn optional_components_do_not_gate_phases() {
        let mut thesis = PatternThesis::new(PatternFamily::FallingWedge);
        complete(
            &mut thesis,
            &[
                "upper_trendline",
                "lower_trendline",
                "convergence",
                "upper_trendline_break",
            ],
        );
        assert_eq!(thesis.derive_phase(), Phase::Breakout);
    }

    #[test]
    fn empty_component_set_stays_in_formation() {
        assert_eq!(derive_phase(&[]), Phase::Formation);
    }

    #[test]
    fn derivation_is_deterministic() {
        let mut thesis = PatternThesis::new(PatternFamily::InverseHeadAndShoulders);
        complete(&mut thesis, &HS_FORMATION);
        complete(&mut thesis, &["neckline_break"]);
        let first = thesis.derive_phase();
        let second = thesis.derive_phase();
        assert_eq!(first, second);
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ThesisError;

/// Chart formation families the thesis engine knows how to score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternFamily {
    /// Bearish reversal: head is the highest high
    HeadAndShoulders,
    /// Bullish reversal: head is the lowest low
    InverseHeadAndShoulders,
    /// Bullish reversal: two descending, converging trend lines
    FallingWedge,
}

impl PatternFamily {
    pub const ALL: [PatternFamily; 3] = [
        PatternFamily::HeadAndShoulders,
        PatternFamily::InverseHeadAndShoulders,
        PatternFamily::FallingWedge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternFamily::HeadAndShoulders => "head_and_shoulders",
            PatternFamily::InverseHeadAndShoulders => "inverse_head_and_shoulders",
            PatternFamily::FallingWedge => "falling_wedge",
        }
    }

    /// True when a completed pattern projects price upward
    pub fn is_bullish(&self) -> bool {
        !matches!(self, PatternFamily::HeadAndShoulders)
    }

    /// Component table for this family
    pub fn specs(&self) -> &'static [ComponentSpec] {
        match self {
            PatternFamily::HeadAndShoulders | PatternFamily::InverseHeadAndShoulders => {
                HEAD_AND_SHOULDERS_SPECS
            }
            PatternFamily::FallingWedge => FALLING_WEDGE_SPECS,
        }
    }

    /// The component whose completion marks the breakout itself
    pub fn trigger_component(&self) -> &'static str {
        self.specs()
            .iter()
            .find(|spec| spec.trigger)
            .map(|spec| spec.name)
            .unwrap_or(TARGET_REACHED)
    }
}

impl fmt::Display for PatternFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternFamily {
    type Err = ThesisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        PatternFamily::ALL
            .into_iter()
            .find(|family| family.as_str() == value)
            .ok_or_else(|| ThesisError::UnknownFamily(value.to_string()))
    }
}

/// Checklist tier a component belongs to; phase derivation is evaluated per tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Formation,
    Breakout,
    Target,
}

/// Declarative description of one thesis criterion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub weight: f64,
    pub required: bool,
    pub tier: Tier,
    /// Core breakout trigger; counted alongside the formation tier for the breakout phase
    pub trigger: bool,
}

impl ComponentSpec {
    const fn new(
        name: &'static str,
        description: &'static str,
        weight: f64,
        required: bool,
        tier: Tier,
    ) -> Self {
        Self {
            name,
            description,
            weight,
            required,
            tier,
            trigger: false,
        }
    }

    const fn trigger(mut self) -> Self {
        self.trigger = true;
        self
    }
}

pub const TARGET_REACHED: &str = "target_reached";

// Shared by regular and inverse head-and-shoulders; only the price direction differs.
static HEAD_AND_SHOULDERS_SPECS: &[ComponentSpec] = &[
    ComponentSpec::new(
        "left_shoulder",
        "Left shoulder extreme established after a prior trend",
        10.0,
        true,
        Tier::Formation,
    ),
    ComponentSpec::new(
        "head",
        "Head extends beyond both shoulders",
        15.0,
        true,
        Tier::Formation,
    ),
    ComponentSpec::new(
        "right_shoulder",
        "Right shoulder formed near the left shoulder level",
        15.0,
        true,
        Tier::Formation,
    ),
    ComponentSpec::new(
        "neckline",
        "Neckline drawn through the reactions between shoulders and head",
        10.0,
        true,
        Tier::Formation,
    ),
    ComponentSpec::new(
        "shoulder_symmetry",
        "Shoulders roughly symmetric in height and width",
        5.0,
        false,
        Tier::Formation,
    ),
    ComponentSpec::new(
        "volume_profile",
        "Volume fades from the left shoulder into the right shoulder",
        5.0,
        false,
        Tier::Formation,
    ),
    ComponentSpec::new(
        "neckline_break",
        "Close through the neckline",
        15.0,
        true,
        Tier::Breakout,
    )
    .trigger(),
    ComponentSpec::new(
        "breakout_volume",
        "Neckline break carried above-average volume",
        10.0,
        true,
        Tier::Breakout,
    ),
    ComponentSpec::new(
        "neckline_retest",
        "Neckline retested from the other side and held",
        5.0,
        false,
        Tier::Breakout,
    ),
    ComponentSpec::new(
        TARGET_REACHED,
        "Price reached the projected target",
        10.0,
        true,
        Tier::Target,
    ),
];

static FALLING_WEDGE_SPECS: &[ComponentSpec] = &[
    ComponentSpec::new(
        "upper_trendline",
        "Descending resistance line with at least two touches",
        15.0,
        true,
        Tier::Formation,
    ),
    ComponentSpec::new(
        "lower_trendline",
        "Descending support line with at least two touches",
        15.0,
        true,
        Tier::Formation,
    ),
    ComponentSpec::new(
        "convergence",
        "Trend lines converge with the support line falling slower",
        10.0,
        true,
        Tier::Formation,
    ),
    ComponentSpec::new(
        "declining_volume",
        "Volume contracts while the wedge forms",
        5.0,
        false,
        Tier::Formation,
    ),
    ComponentSpec::new(
        "prior_downtrend",
        "Wedge forms after an established downtrend",
        5.0,
        false,
        Tier::Formation,
    ),
    ComponentSpec::new(
        "upper_trendline_break",
        "Close above the upper trend line",
        20.0,
        true,
        Tier::Breakout,
    )
    .trigger(),
    ComponentSpec::new(
        "breakout_volume",
        "Breakout carried above-average volume",
        10.0,
        true,
        Tier::Breakout,
    ),
    ComponentSpec::new(
        "breakout_retest",
        "Broken trend line retested as support",
        5.0,
        false,
        Tier::Breakout,
    ),
    ComponentSpec::new(
        TARGET_REACHED,
        "Price reached the projected target",
        15.0,
        true,
        Tier::Target,
    ),
];

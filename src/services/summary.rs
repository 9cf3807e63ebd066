use crate::business_logic::lifecycle::Phase;
use crate::models::pattern::PatternStatus;
use crate::models::snapshot::{
    NearestLevels, PatternThesisSnapshot, SupportResistanceLevelSnapshot,
};

/// One-line human status for a pattern
pub fn build_summary(snapshot: &PatternThesisSnapshot) -> String {
    let symbol = &snapshot.pattern_id.symbol;
    let family = snapshot.family;
    let pct = snapshot.completion_percent;

    match snapshot.status {
        PatternStatus::Invalidated => {
            return format!("{symbol}: {family} invalidated at {pct:.0}% complete.");
        }
        PatternStatus::Superseded => {
            return format!("{symbol}: {family} superseded by a newer detection.");
        }
        PatternStatus::Active | PatternStatus::Completed => {}
    }

    match snapshot.phase {
        Phase::Formation => format!(
            "{symbol}: {family} forming, {}/{} criteria met ({pct:.0}%).",
            snapshot.completed_count, snapshot.total_count
        ),
        Phase::Breakout => match snapshot.target_price {
            Some(target) => format!(
                "{symbol}: {family} broke out ({pct:.0}%); target ${}.",
                format_price(target)
            ),
            None => format!("{symbol}: {family} broke out ({pct:.0}%); target not yet projected."),
        },
        Phase::TargetPursuit => match snapshot.target_price {
            Some(target) => format!(
                "{symbol}: {family} breakout confirmed; pursuing target ${}.",
                format_price(target)
            ),
            None => format!("{symbol}: {family} breakout confirmed; target not yet projected."),
        },
        Phase::Completed => match snapshot.target_price {
            Some(target) => format!(
                "{symbol}: {family} completed, target ${} reached.",
                format_price(target)
            ),
            None => format!("{symbol}: {family} completed."),
        },
    }
}

/// One-line description of the levels around a price
pub fn describe_nearest(symbol: &str, price: f64, nearest: &NearestLevels) -> String {
    format!(
        "{symbol} @ ${}: support {}, resistance {}",
        format_price(price),
        describe_level(nearest.support.as_ref()),
        describe_level(nearest.resistance.as_ref())
    )
}

fn describe_level(level: Option<&SupportResistanceLevelSnapshot>) -> String {
    match level {
        Some(level) => format!(
            "${} (strength {:.0})",
            format_price(level.price),
            level.strength
        ),
        None => "none".to_string(),
    }
}

fn format_price(price: f64) -> String {
    format!("{:.2}", price)
}

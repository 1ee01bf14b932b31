//! Category-wide surges of trigger and framework values for the weekly pulse.

use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregation;
use crate::radar::round_half_up;
use crate::window::{PULSE_BASELINE_DAYS, PULSE_RECENT_DAYS};

/// Minimum percent increase over the weekly baseline.
pub const SURGE_MIN_INCREASE: i64 = 30;
/// Minimum recent-window count.
pub const SURGE_MIN_COUNT: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Surge {
    pub field: String,
    pub label: String,
    pub value: String,
    pub recent_count: u32,
    pub baseline_count: u32,
    /// Baseline count scaled to a 7-day equivalent.
    pub baseline_weekly: f64,
    pub increase: i64,
}

/// Weekly-normalized percent increase of `recent` over `baseline`.
///
/// With no baseline the increase is `recent * 100`.
#[must_use]
pub fn weekly_increase(recent: u32, baseline: u32) -> (f64, i64) {
    #[allow(clippy::cast_precision_loss)]
    let weeks = PULSE_BASELINE_DAYS as f64 / PULSE_RECENT_DAYS as f64;
    let base_weekly = f64::from(baseline) / weeks;
    let increase = if baseline == 0 {
        i64::from(recent) * 100
    } else {
        round_half_up((f64::from(recent) - base_weekly) / base_weekly * 100.0)
    };
    (base_weekly, increase)
}

/// Every qualifying surge across the aggregated fields, in field then
/// first-seen order. Not ranked or truncated.
#[must_use]
pub fn detect_surges(aggregation: &Aggregation) -> Vec<Surge> {
    let mut surges = Vec::new();
    for field_tally in &aggregation.fields {
        for tally in field_tally.tallies() {
            let (baseline_weekly, increase) = weekly_increase(tally.recent, tally.baseline);
            if increase >= SURGE_MIN_INCREASE && tally.recent >= SURGE_MIN_COUNT {
                surges.push(Surge {
                    field: field_tally.field.key.to_string(),
                    label: field_tally.field.label.to_string(),
                    value: tally.value.clone(),
                    recent_count: tally.recent,
                    baseline_count: tally.baseline,
                    baseline_weekly,
                    increase,
                });
            }
        }
    }
    surges
}

//! Trend radar: rising and falling attribute values between two windows.

use adsignal_core::{Exemplar, FieldDescriptor, Record, RADAR_FIELDS};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{aggregate, AttributeTally, FieldTally, Totals};
use crate::error::EngineError;
use crate::store::{RecordQuery, RecordStore};
use crate::window::{clamp_radar_days, WindowPair, RADAR_DEFAULT_DAYS};

pub const TOP_MIN: usize = 3;
pub const TOP_MAX: usize = 10;
pub const TOP_DEFAULT: usize = 6;

/// Minimum count in the relevant window before a value may rise or fall.
pub const NOISE_FLOOR: u32 = 2;

/// Numeric stand-in for [`Shift::Emerged`] on the wire. Not a percentage.
pub const EMERGED_SHIFT: i64 = 999;

/// Change of a value's usage from baseline to recent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    /// Percent change, rounded half-up.
    Measured(i64),
    /// No baseline history but present in the recent window.
    Emerged,
}

impl Shift {
    #[must_use]
    pub fn between(recent: u32, baseline: u32) -> Self {
        if baseline == 0 {
            if recent > 0 {
                Shift::Emerged
            } else {
                Shift::Measured(0)
            }
        } else {
            let change =
                (f64::from(recent) - f64::from(baseline)) / f64::from(baseline) * 100.0;
            Shift::Measured(round_half_up(change))
        }
    }

    /// Sort key and wire value; `Emerged` maps to [`EMERGED_SHIFT`].
    #[must_use]
    pub fn percent(self) -> i64 {
        match self {
            Shift::Measured(p) => p,
            Shift::Emerged => EMERGED_SHIFT,
        }
    }

    #[must_use]
    pub fn is_emerged(self) -> bool {
        matches!(self, Shift::Emerged)
    }
}

/// Round to the nearest integer with halves going toward positive infinity.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// One ranked `(field, value)` entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub field: &'static str,
    pub label: &'static str,
    pub value: String,
    pub recent: u32,
    pub baseline: u32,
    /// Percent change; `999` when `emerging` is set.
    pub shift: i64,
    pub emerging: bool,
    pub exemplars_recent: Vec<Exemplar>,
    pub exemplars_baseline: Vec<Exemplar>,
}

impl Signal {
    fn from_tally(field: &FieldDescriptor, tally: &AttributeTally) -> Self {
        let shift = Shift::between(tally.recent, tally.baseline);
        Self {
            field: field.key,
            label: field.label,
            value: tally.value.clone(),
            recent: tally.recent,
            baseline: tally.baseline,
            shift: shift.percent(),
            emerging: shift.is_emerged(),
            exemplars_recent: tally.exemplars_recent.clone(),
            exemplars_baseline: tally.exemplars_baseline.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldRadar {
    pub field: &'static str,
    pub label: &'static str,
    pub rising: Vec<Signal>,
    pub falling: Vec<Signal>,
}

/// Rank one field's tallies.
///
/// Rising: `recent >= 2`, shift descending. Falling: `baseline >= 2`, shift
/// ascending. Both truncated to `top_n`; equal shifts keep first-seen order.
#[must_use]
pub fn rank_field(field_tally: &FieldTally, top_n: usize) -> FieldRadar {
    let field = &field_tally.field;
    let entries: Vec<Signal> = field_tally
        .tallies()
        .iter()
        .map(|t| Signal::from_tally(field, t))
        .collect();

    let mut rising: Vec<Signal> = entries
        .iter()
        .filter(|s| s.recent >= NOISE_FLOOR)
        .cloned()
        .collect();
    rising.sort_by(|a, b| b.shift.cmp(&a.shift));
    rising.truncate(top_n);

    let mut falling: Vec<Signal> = entries
        .into_iter()
        .filter(|s| s.baseline >= NOISE_FLOOR)
        .collect();
    falling.sort_by(|a, b| a.shift.cmp(&b.shift));
    falling.truncate(top_n);

    FieldRadar {
        field: field.key,
        label: field.label,
        rising,
        falling,
    }
}

/// Normalized radar request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadarParams {
    pub days: i64,
    pub category: Option<String>,
    pub top_n: usize,
}

impl RadarParams {
    /// Apply defaults and clamp; never fails.
    #[must_use]
    pub fn new(days: Option<i64>, category: Option<String>, top: Option<i64>) -> Self {
        let top_n = top.map_or(TOP_DEFAULT, |t| {
            usize::try_from(t.max(0)).unwrap_or(TOP_MAX).clamp(TOP_MIN, TOP_MAX)
        });
        Self {
            days: clamp_radar_days(days.unwrap_or(RADAR_DEFAULT_DAYS)),
            category: category.filter(|c| !c.trim().is_empty()),
            top_n,
        }
    }
}

impl Default for RadarParams {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RadarWindow {
    pub start: DateTime<Utc>,
    pub mid: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarReport {
    pub days: i64,
    pub category: Option<String>,
    pub sample_size: usize,
    pub window: RadarWindow,
    pub totals: Totals,
    pub radar: Vec<FieldRadar>,
}

/// Build the radar over already-fetched records. Pure and deterministic.
#[must_use]
pub fn build_radar(records: &[Record], params: &RadarParams, windows: &WindowPair) -> RadarReport {
    let aggregation = aggregate(records, &RADAR_FIELDS, windows);
    let radar = aggregation
        .fields
        .iter()
        .map(|f| rank_field(f, params.top_n))
        .collect();

    RadarReport {
        days: params.days,
        category: params.category.clone(),
        sample_size: aggregation.totals.total,
        window: RadarWindow {
            start: windows.start(),
            mid: windows.cutoff(),
        },
        totals: aggregation.totals,
        radar,
    }
}

/// Fetch the range from the store and build the radar.
///
/// # Errors
///
/// Returns [`EngineError::Store`] if the range read fails; no partial output.
pub async fn run_radar<S>(
    store: &S,
    params: &RadarParams,
    now: DateTime<Utc>,
) -> Result<RadarReport, EngineError>
where
    S: RecordStore + ?Sized,
{
    let windows = WindowPair::radar(now, params.days);
    let query = RecordQuery {
        since: windows.start(),
        until: windows.end(),
        category: params.category.clone(),
    };
    let records = store.processed_records(&query).await?;
    tracing::info!(
        days = params.days,
        category = params.category.as_deref().unwrap_or("*"),
        records = records.len(),
        "radar: aggregating"
    );
    Ok(build_radar(&records, params, &windows))
}

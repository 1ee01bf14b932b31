//! Splitting a trailing time range into `baseline` and `recent` windows.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

pub const RADAR_MIN_DAYS: i64 = 7;
pub const RADAR_MAX_DAYS: i64 = 180;
pub const RADAR_DEFAULT_DAYS: i64 = 30;

pub const PULSE_RECENT_DAYS: i64 = 7;
pub const PULSE_BASELINE_DAYS: i64 = 21;

/// A contiguous time range, `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Baseline,
    Recent,
}

/// Two adjacent windows sharing one cutoff: `baseline.end == recent.start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPair {
    pub baseline: Window,
    pub recent: Window,
}

impl WindowPair {
    /// Cover `[now - total, now]`, the last `recent` of it being the recent window.
    ///
    /// `recent` is clamped to `[0, total]` so the pair never overlaps or leaves a gap.
    #[must_use]
    pub fn split(now: DateTime<Utc>, total: Duration, recent: Duration) -> Self {
        let total = total.max(Duration::zero());
        let recent = recent.clamp(Duration::zero(), total);
        let start = now - total;
        let cutoff = now - recent;
        Self {
            baseline: Window { start, end: cutoff },
            recent: Window {
                start: cutoff,
                end: now,
            },
        }
    }

    /// Radar windows: `days` clamped to `[7, 180]`, cutoff at `now - floor(days / 2)`.
    #[must_use]
    pub fn radar(now: DateTime<Utc>, days: i64) -> Self {
        let days = clamp_radar_days(days);
        Self::split(now, Duration::days(days), Duration::days(days / 2))
    }

    /// Pulse windows: last 7 days against the 21 days before them.
    #[must_use]
    pub fn pulse(now: DateTime<Utc>) -> Self {
        Self::split(
            now,
            Duration::days(PULSE_RECENT_DAYS + PULSE_BASELINE_DAYS),
            Duration::days(PULSE_RECENT_DAYS),
        )
    }

    #[must_use]
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.recent.start
    }

    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        self.baseline.start
    }

    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.recent.end
    }

    /// Bucket for a timestamp; the cutoff itself belongs to `recent`.
    ///
    /// Timestamps outside the pair's overall range return `None`.
    #[must_use]
    pub fn bucket(&self, at: DateTime<Utc>) -> Option<Bucket> {
        if at < self.start() || at > self.end() {
            None
        } else if at >= self.cutoff() {
            Some(Bucket::Recent)
        } else {
            Some(Bucket::Baseline)
        }
    }
}

/// Out-of-range requests are clamped, never rejected.
#[must_use]
pub fn clamp_radar_days(days: i64) -> i64 {
    days.clamp(RADAR_MIN_DAYS, RADAR_MAX_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn split_windows_are_contiguous_and_cover_total() {
        for days in [7, 8, 30, 31, 90, 180] {
            let pair = WindowPair::radar(now(), days);
            assert_eq!(pair.baseline.end, pair.recent.start);
            assert_eq!((pair.recent.end - pair.baseline.start).num_days(), days);
        }
    }

    #[test]
    fn radar_days_are_clamped() {
        assert_eq!(clamp_radar_days(1), 7);
        assert_eq!(clamp_radar_days(-30), 7);
        assert_eq!(clamp_radar_days(365), 180);
        assert_eq!(clamp_radar_days(45), 45);

        let pair = WindowPair::radar(now(), 1_000);
        assert_eq!(pair.recent.end - pair.baseline.start, Duration::days(180));
    }

    #[test]
    fn radar_cutoff_uses_floor_of_half() {
        let pair = WindowPair::radar(now(), 31);
        assert_eq!(pair.recent.duration(), Duration::days(15));
        assert_eq!(pair.baseline.duration(), Duration::days(16));
    }

    #[test]
    fn pulse_windows_are_seven_and_twenty_one_days() {
        let pair = WindowPair::pulse(now());
        assert_eq!(pair.recent.duration(), Duration::days(7));
        assert_eq!(pair.baseline.duration(), Duration::days(21));
        assert_eq!(pair.baseline.end, pair.recent.start);
        assert_eq!(pair.end(), now());
    }

    #[test]
    fn cutoff_is_recent_and_baseline_exclusive() {
        let pair = WindowPair::radar(now(), 30);
        let cutoff = pair.cutoff();
        assert_eq!(pair.bucket(cutoff), Some(Bucket::Recent));
        assert_eq!(
            pair.bucket(cutoff - Duration::milliseconds(1)),
            Some(Bucket::Baseline)
        );
        assert_eq!(pair.bucket(pair.start()), Some(Bucket::Baseline));
        assert_eq!(pair.bucket(pair.end()), Some(Bucket::Recent));
    }

    #[test]
    fn out_of_range_timestamps_have_no_bucket() {
        let pair = WindowPair::pulse(now());
        assert_eq!(pair.bucket(pair.start() - Duration::seconds(1)), None);
        assert_eq!(pair.bucket(pair.end() + Duration::seconds(1)), None);
    }

    #[test]
    fn recent_longer_than_total_collapses_baseline() {
        let pair = WindowPair::split(now(), Duration::days(5), Duration::days(9));
        assert_eq!(pair.baseline.duration(), Duration::zero());
        assert_eq!(pair.recent.duration(), Duration::days(5));
    }
}

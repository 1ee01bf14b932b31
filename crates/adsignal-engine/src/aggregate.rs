//! Per-window occurrence counts of categorical attribute values.

use std::collections::HashMap;

use adsignal_core::{Exemplar, FieldDescriptor, Record};
use serde::Serialize;

use crate::window::{Bucket, WindowPair};

/// Exemplars kept per `(field, value, bucket)`; first seen, not best ranked.
pub const MAX_EXEMPLARS: usize = 5;

/// Counts and exemplars for one `(field, value)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeTally {
    pub value: String,
    pub recent: u32,
    pub baseline: u32,
    pub exemplars_recent: Vec<Exemplar>,
    pub exemplars_baseline: Vec<Exemplar>,
}

impl AttributeTally {
    fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
            recent: 0,
            baseline: 0,
            exemplars_recent: Vec::new(),
            exemplars_baseline: Vec::new(),
        }
    }

    fn observe(&mut self, bucket: Bucket, record: &Record) {
        let (count, exemplars) = match bucket {
            Bucket::Recent => (&mut self.recent, &mut self.exemplars_recent),
            Bucket::Baseline => (&mut self.baseline, &mut self.exemplars_baseline),
        };
        *count += 1;
        if exemplars.len() < MAX_EXEMPLARS {
            exemplars.push(record.exemplar());
        }
    }
}

/// All tallies for one field, in the order values were first observed.
#[derive(Debug, Clone)]
pub struct FieldTally {
    pub field: FieldDescriptor,
    tallies: Vec<AttributeTally>,
    index: HashMap<String, usize>,
}

impl FieldTally {
    fn new(field: FieldDescriptor) -> Self {
        Self {
            field,
            tallies: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn observe(&mut self, value: &str, bucket: Bucket, record: &Record) {
        let slot = match self.index.get(value) {
            Some(&slot) => slot,
            None => {
                self.tallies.push(AttributeTally::new(value));
                let slot = self.tallies.len() - 1;
                self.index.insert(value.to_string(), slot);
                slot
            }
        };
        self.tallies[slot].observe(bucket, record);
    }

    #[must_use]
    pub fn tallies(&self) -> &[AttributeTally] {
        &self.tallies
    }

    #[must_use]
    pub fn get(&self, value: &str) -> Option<&AttributeTally> {
        self.index.get(value).map(|&slot| &self.tallies[slot])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub total: usize,
    pub recent: usize,
    pub baseline: usize,
}

/// Result of one aggregation scan.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub totals: Totals,
    pub fields: Vec<FieldTally>,
}

impl Aggregation {
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldTally> {
        self.fields.iter().find(|f| f.field.key == key)
    }
}

/// Count every field value of every in-range record into its window bucket.
///
/// Records outside the window pair are ignored, including any stamped after
/// the pair's end. Store reads are already bounded by that end, so only
/// hand-built inputs are affected. Null, blank or wrongly typed
/// values produce no tally entry. Tallies are partitioned by field, so the
/// per-field state never shares a map with another field.
#[must_use]
pub fn aggregate(records: &[Record], fields: &[FieldDescriptor], windows: &WindowPair) -> Aggregation {
    let mut totals = Totals::default();
    let mut tallies: Vec<FieldTally> = fields.iter().copied().map(FieldTally::new).collect();

    for record in records {
        let Some(bucket) = windows.bucket(record.created_at) else {
            continue;
        };
        totals.total += 1;
        match bucket {
            Bucket::Recent => totals.recent += 1,
            Bucket::Baseline => totals.baseline += 1,
        }

        let classification = &record.digest.classification;
        for tally in &mut tallies {
            for value in tally.field.values(classification) {
                tally.observe(value, bucket, record);
            }
        }
    }

    Aggregation {
        totals,
        fields: tallies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record_at;
    use adsignal_core::fields::{EMOTION_TONE, TRIGGER_MECHANIC};
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn windows() -> WindowPair {
        WindowPair::radar(Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap(), 30)
    }

    #[test]
    fn records_are_bucketed_by_cutoff() {
        let w = windows();
        let records = vec![
            record_at(w.cutoff(), json!({ "classification": { "trigger_mechanic": "Authority" } })),
            record_at(
                w.cutoff() - Duration::seconds(1),
                json!({ "classification": { "trigger_mechanic": "Authority" } }),
            ),
        ];
        let agg = aggregate(&records, &[TRIGGER_MECHANIC], &w);
        let tally = agg.field("trigger_mechanic").unwrap().get("Authority").unwrap();
        assert_eq!((tally.recent, tally.baseline), (1, 1));
        assert_eq!(
            agg.totals,
            Totals {
                total: 2,
                recent: 1,
                baseline: 1
            }
        );
    }

    #[test]
    fn null_and_missing_values_are_skipped() {
        let w = windows();
        let at = w.end() - Duration::days(1);
        let records = vec![
            record_at(at, json!({ "classification": { "trigger_mechanic": null } })),
            record_at(at, json!({ "classification": {} })),
            record_at(at, json!("garbage")),
        ];
        let agg = aggregate(&records, &[TRIGGER_MECHANIC], &w);
        assert!(agg.field("trigger_mechanic").unwrap().tallies().is_empty());
        assert_eq!(agg.totals.total, 3);
    }

    #[test]
    fn array_values_count_once_per_record() {
        let w = windows();
        let at = w.end() - Duration::days(1);
        let records = vec![
            record_at(at, json!({ "classification": { "emotion_tone": ["Awe", "Awe", "Trust"] } })),
            record_at(at, json!({ "classification": { "emotion_tone": ["Awe"] } })),
        ];
        let agg = aggregate(&records, &[EMOTION_TONE], &w);
        let field = agg.field("emotion_tone").unwrap();
        assert_eq!(field.get("Awe").unwrap().recent, 2);
        assert_eq!(field.get("Trust").unwrap().recent, 1);
        let order: Vec<&str> = field.tallies().iter().map(|t| t.value.as_str()).collect();
        assert_eq!(order, vec!["Awe", "Trust"]);
    }

    #[test]
    fn exemplars_are_capped_and_keep_first_seen_order() {
        let w = windows();
        let records: Vec<Record> = (0..8)
            .map(|i| {
                record_at(
                    w.cutoff() + Duration::hours(i),
                    json!({ "classification": { "trigger_mechanic": "FOMO_Scarcity" } }),
                )
            })
            .collect();
        let agg = aggregate(&records, &[TRIGGER_MECHANIC], &w);
        let tally = agg.field("trigger_mechanic").unwrap().get("FOMO_Scarcity").unwrap();
        assert_eq!(tally.recent, 8);
        assert_eq!(tally.exemplars_recent.len(), MAX_EXEMPLARS);
        let ids: Vec<_> = tally.exemplars_recent.iter().map(|e| e.id).collect();
        let expected: Vec<_> = records.iter().take(MAX_EXEMPLARS).map(|r| r.id).collect();
        assert_eq!(ids, expected);
        assert!(tally.exemplars_baseline.is_empty());
    }

    #[test]
    fn out_of_window_records_are_ignored() {
        let w = windows();
        let records = vec![record_at(
            w.start() - Duration::days(2),
            json!({ "classification": { "trigger_mechanic": "Authority" } }),
        )];
        let agg = aggregate(&records, &[TRIGGER_MECHANIC], &w);
        assert_eq!(agg.totals.total, 0);
        assert!(agg.field("trigger_mechanic").unwrap().tallies().is_empty());
    }
}

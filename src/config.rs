//! Injected configuration snapshot (spec §6).
//!
//! Preference/configuration loading is an external collaborator (spec §1);
//! what the cache receives per load is a plain snapshot. The scalar fields
//! derive `Deserialize` — modelled on the teacher crate's `SlideMetadata`
//! (`format.rs`), a `serde`-deserialized data snapshot injected at load time
//! — so tests can build a snapshot from JSON the way an embedding viewer's
//! preferences layer would, even though that layer itself is out of scope.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::alignment::AlignmentRecord;

/// Bisulfite-sequencing context, passed through to the counts sink
/// untouched — the cache does not interpret it (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BisulfiteContext {
    None,
    Cg,
    Hcg,
    Gch,
    WgbsSeq,
}

impl Default for BisulfiteContext {
    fn default() -> Self {
        BisulfiteContext::None
    }
}

/// Per-load configuration snapshot (spec §6).
///
/// Generic over the record type so `read_group_filter` can be a predicate
/// on the caller's concrete alignment type without the cache knowing
/// anything else about it.
#[derive(Clone)]
pub struct ConfigSnapshot<R: AlignmentRecord> {
    /// Visibility window in kilobases; drives tile size (spec §3).
    pub max_visible_range_kb: f64,
    pub filter_failed_reads: bool,
    pub show_duplicates: bool,
    pub quality_threshold: u8,
    pub show_junction_track: bool,
    pub min_insert_size_percentile: f64,
    pub max_insert_size_percentile: f64,
    pub bisulfite_context: BisulfiteContext,
    /// Optional predicate rejecting records by read group. `None` admits
    /// every read group.
    pub read_group_filter: Option<Arc<dyn Fn(&R) -> bool + Send + Sync>>,
}

/// The plain-data subset of [`ConfigSnapshot`] that can round-trip through
/// JSON (the predicate closure cannot).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValues {
    pub max_visible_range_kb: f64,
    pub filter_failed_reads: bool,
    pub show_duplicates: bool,
    pub quality_threshold: u8,
    pub show_junction_track: bool,
    pub min_insert_size_percentile: f64,
    pub max_insert_size_percentile: f64,
    #[serde(default)]
    pub bisulfite_context: BisulfiteContext,
}

impl<R: AlignmentRecord> ConfigSnapshot<R> {
    /// Build a snapshot from its JSON-able values, with no read-group
    /// filter.
    pub fn from_values(values: ConfigValues) -> Self {
        Self {
            max_visible_range_kb: values.max_visible_range_kb,
            filter_failed_reads: values.filter_failed_reads,
            show_duplicates: values.show_duplicates,
            quality_threshold: values.quality_threshold,
            show_junction_track: values.show_junction_track,
            min_insert_size_percentile: values.min_insert_size_percentile,
            max_insert_size_percentile: values.max_insert_size_percentile,
            bisulfite_context: values.bisulfite_context,
            read_group_filter: None,
        }
    }

    /// Whether a record passes the read-group filter (vacuously true when
    /// no filter is configured).
    pub fn passes_read_group_filter(&self, record: &R) -> bool {
        match &self.read_group_filter {
            Some(f) => f(record),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockRecord;

    fn sample_json() -> &'static str {
        r#"{
            "max_visible_range_kb": 16.0,
            "filter_failed_reads": true,
            "show_duplicates": false,
            "quality_threshold": 20,
            "show_junction_track": true,
            "min_insert_size_percentile": 0.5,
            "max_insert_size_percentile": 99.5,
            "bisulfite_context": "Cg"
        }"#
    }

    #[test]
    fn config_values_round_trip_json() {
        let values: ConfigValues = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(values.max_visible_range_kb, 16.0);
        assert!(values.filter_failed_reads);
        assert_eq!(values.bisulfite_context, BisulfiteContext::Cg);

        let re_serialized = serde_json::to_string(&values).unwrap();
        let round_tripped: ConfigValues = serde_json::from_str(&re_serialized).unwrap();
        assert_eq!(round_tripped.quality_threshold, values.quality_threshold);
    }

    #[test]
    fn no_filter_admits_everything() {
        let values: ConfigValues = serde_json::from_str(sample_json()).unwrap();
        let snapshot: ConfigSnapshot<MockRecord> = ConfigSnapshot::from_values(values);
        let record = MockRecord::new("r1", 100, 150);
        assert!(snapshot.passes_read_group_filter(&record));
    }

    #[test]
    fn filter_rejects_by_predicate() {
        let values: ConfigValues = serde_json::from_str(sample_json()).unwrap();
        let mut snapshot: ConfigSnapshot<MockRecord> = ConfigSnapshot::from_values(values);
        snapshot.read_group_filter = Some(Arc::new(|r: &MockRecord| r.read_name() != "blocked"));

        let allowed = MockRecord::new("ok", 100, 150);
        let blocked = MockRecord::new("blocked", 100, 150);
        assert!(snapshot.passes_read_group_filter(&allowed));
        assert!(!snapshot.passes_read_group_filter(&blocked));
    }
}

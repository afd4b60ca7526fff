//! Paired-end insert-size statistics (spec §4.3).
//!
//! Every admitted proper pair contributes its insert size to a
//! per-library running sample; percentile bounds derived from that sample
//! feed the anomalous-insert-size classification an embedding viewer draws
//! on top of this cache's tiles. Libraries are keyed by name, with `None`
//! (spec: "the null library") bucketed under the literal key `"null"`.

use std::collections::HashMap;

/// The library key used for reads with no library tag.
pub const NULL_LIBRARY: &str = "null";

/// Running insert-size sample for one library.
#[derive(Debug, Clone, Default)]
pub struct PeStats {
    samples: Vec<i64>,
    /// `(min_percentile_size, max_percentile_size)`, computed on load
    /// completion from the configured percentile bounds (spec §4.3
    /// completion step). `None` until `finalize_bounds` has run.
    bounds: Option<(f64, f64)>,
}

impl PeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one proper pair's insert size.
    pub fn add(&mut self, insert_size: i64) {
        self.samples.push(insert_size.abs());
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Compute and cache the insert-size bounds at the configured
    /// `min_percentile`/`max_percentile` (spec §4.3: "compute per-library
    /// PE-stats percentiles using configured min/max percentile settings").
    /// These bounds are what an embedding viewer uses to flag anomalously
    /// short/long inserts against this library's own distribution.
    pub fn finalize_bounds(&mut self, min_percentile: f64, max_percentile: f64) {
        self.bounds = match (self.percentile(min_percentile), self.percentile(max_percentile)) {
            (Some(lo), Some(hi)) => Some((lo, hi)),
            _ => None,
        };
    }

    /// The bounds computed by the most recent `finalize_bounds` call, or
    /// `None` if it hasn't run yet (or the library has no samples).
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.bounds
    }

    /// The `percentile` (0-100) insert size, via linear interpolation
    /// between the two bracketing order statistics (DESIGN.md Open
    /// Question 4). Returns `None` with no samples.
    pub fn percentile(&self, percentile: f64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let n = sorted.len();
        if n == 1 {
            return Some(sorted[0] as f64);
        }
        let rank = (percentile / 100.0) * (n - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        if lo == hi {
            return Some(sorted[lo] as f64);
        }
        let frac = rank - lo as f64;
        Some(sorted[lo] as f64 * (1.0 - frac) + sorted[hi] as f64 * frac)
    }
}

/// Per-library insert-size statistics (spec §4.3).
#[derive(Debug, Clone, Default)]
pub struct PeStatsTable {
    by_library: HashMap<String, PeStats>,
}

impl PeStatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(library: Option<&str>) -> &str {
        library.unwrap_or(NULL_LIBRARY)
    }

    /// Record an insert size for `library` (`None` for the null library).
    pub fn record(&mut self, library: Option<&str>, insert_size: i64) {
        self.by_library
            .entry(Self::key(library).to_string())
            .or_default()
            .add(insert_size);
    }

    pub fn stats_for(&self, library: Option<&str>) -> Option<&PeStats> {
        self.by_library.get(Self::key(library))
    }

    pub fn libraries(&self) -> impl Iterator<Item = &str> {
        self.by_library.keys().map(|s| s.as_str())
    }

    /// Compute insert-size bounds for every library at once (spec §4.3
    /// completion step), run by the loader right before tiles are marked
    /// loaded.
    pub fn finalize_all(&mut self, min_percentile: f64, max_percentile: f64) {
        for stats in self.by_library.values_mut() {
            stats.finalize_bounds(min_percentile, max_percentile);
        }
    }
}

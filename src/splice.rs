//! Splice-junction feature accumulation (spec §6).
//!
//! Junction extraction from CIGAR strings is an external collaborator's
//! concern (spec §1 Non-goals) — the cache only owns a per-tile sink that
//! an embedding junction-caller feeds. [`NullSpliceSink`] is the default for
//! callers that don't enable the junction track (`show_junction_track` in
//! [`crate::config::ConfigSnapshot`]).

use std::sync::Arc;

use crate::alignment::AlignmentRecord;

/// A single splice-junction observation within a tile: a gapped-alignment
/// boundary and how many reads support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceJunctionFeature {
    pub start: i64,
    pub end: i64,
    pub depth: u32,
}

/// The splice-sink capability set (spec §6).
pub trait SpliceSink<R: AlignmentRecord>: Send + Sync {
    /// Offer a record for junction extraction; a sink that doesn't care
    /// about a given record (e.g. it has no gapped alignment) is free to
    /// ignore it.
    fn add(&mut self, record: &R);
    /// Finalize accumulation once a tile finishes loading. Idempotent.
    fn finish(&mut self);
    /// The junctions observed so far.
    fn features(&self) -> &[SpliceJunctionFeature];
}

/// The default sink: accepts every record, produces no features. Used when
/// `show_junction_track` is disabled so the loader has a sink to call
/// without branching on whether junctions are wanted.
#[derive(Default)]
pub struct NullSpliceSink {
    features: Vec<SpliceJunctionFeature>,
}

impl<R: AlignmentRecord> SpliceSink<R> for NullSpliceSink {
    fn add(&mut self, _record: &R) {}

    fn finish(&mut self) {}

    fn features(&self) -> &[SpliceJunctionFeature] {
        &self.features
    }
}

/// A factory for a tile's splice sink — a tile needs a fresh sink of its
/// own, not a shared one, so `AlignmentTile::new` takes a constructor
/// rather than a sink instance.
pub type SpliceSinkFactory<R> = Arc<dyn Fn() -> Box<dyn SpliceSink<R>> + Send + Sync>;

/// The default factory: one [`NullSpliceSink`] per tile.
pub fn null_splice_factory<R: AlignmentRecord>() -> SpliceSinkFactory<R> {
    Arc::new(|| Box::new(NullSpliceSink::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockRecord;

    #[test]
    fn null_sink_stays_empty() {
        let mut sink = NullSpliceSink::default();
        let record = MockRecord::new("a", 0, 10);
        SpliceSink::<MockRecord>::add(&mut sink, &record);
        SpliceSink::<MockRecord>::finish(&mut sink);
        assert!(sink.features().is_empty());
    }
}

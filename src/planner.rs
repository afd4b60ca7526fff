//! `QueryPlanner`: maps a user interval to a tile range, batches cache
//! misses into loader calls, and assembles the filtered result (spec
//! §4.2/§4.5).

use std::sync::atomic::AtomicBool;

use crate::alignment::{AlignmentRecord, AlignmentSource};
use crate::config::ConfigSnapshot;
use crate::counts::CountsSink;
use crate::error::CacheResult;
use crate::loader::{LoadOutcome, TileLoader};
use crate::pe_stats::PeStatsTable;
use crate::registry::Coordinator;
use crate::rng::SharedRng;
use crate::splice::{SpliceJunctionFeature, SpliceSinkFactory};
use crate::store::TileStore;
use crate::tile::AlignmentTile;

/// The assembled, caller-ready result of one [`QueryPlanner::query`] call.
pub struct QueryResult<R: AlignmentRecord> {
    /// Sorted, `[start, end)`-filtered records (spec §4.2 step 6).
    pub records: Vec<R>,
    pub splice_features: Vec<SpliceJunctionFeature>,
    /// True if a loader call was cancelled mid-query; `records` then holds
    /// only what had already been accumulated (spec §4.2 step 4).
    pub cancelled: bool,
}

/// Orchestrates [`TileStore`] hits and [`TileLoader`] misses for one
/// reference sequence (spec §4.2).
pub struct QueryPlanner<'a, Src: AlignmentSource> {
    source: &'a Src,
    store: &'a TileStore<Src::Record>,
    registry: &'a Coordinator,
    cancel_flag: &'a AtomicBool,
    rng: SharedRng,
    splice_factory: SpliceSinkFactory<Src::Record>,
    tile_size: i64,
}

impl<'a, Src: AlignmentSource> QueryPlanner<'a, Src> {
    pub fn new(
        source: &'a Src,
        store: &'a TileStore<Src::Record>,
        registry: &'a Coordinator,
        cancel_flag: &'a AtomicBool,
        rng: SharedRng,
        splice_factory: SpliceSinkFactory<Src::Record>,
        tile_size: i64,
    ) -> Self {
        Self {
            source,
            store,
            registry,
            cancel_flag,
            rng,
            splice_factory,
            tile_size,
        }
    }

    /// `query(sequence, start, end, counts_sink, splice_sink, max_read_depth,
    /// pe_stats, bisulfite_context)` (spec §4.2). `bisulfite_context` lives
    /// on `config` (spec §6) rather than as a separate parameter; `on_tile_counts`
    /// plays the role of "append counts from each tile to the caller's
    /// counts list" since a tile's counts sink lives behind the store's lock
    /// and can't be handed out as a borrowed reference.
    pub fn query(
        &self,
        sequence: &str,
        start: i64,
        end: i64,
        max_read_depth: u32,
        config: &ConfigSnapshot<Src::Record>,
        pe_stats: &mut PeStatsTable,
        mut on_tile_counts: impl FnMut(&dyn CountsSink<Src::Record>),
    ) -> CacheResult<QueryResult<Src::Record>> {
        if start >= end {
            return Ok(QueryResult {
                records: Vec::new(),
                splice_features: Vec::new(),
                cancelled: false,
            });
        }

        let sampler_depth = (1.1 * max_read_depth as f64).ceil().max(1.0) as u32;
        // `end` is exclusive (spec §3 half-open tiles), so the last tile
        // touched is the one containing base `end - 1`, not `end` itself —
        // see spec §8 scenario 1 (a 32,000-base query over 16,000-base
        // tiles uses only tiles 0 and 1, not a spurious third tile).
        let start_tile = (start + 1) / self.tile_size;
        let end_tile = (end - 1) / self.tile_size;

        let mut confirmed: Vec<i64> = Vec::new();
        let mut pending: Vec<i64> = Vec::new();
        let mut cancelled = false;

        let mut idx = start_tile;
        while idx <= end_tile {
            if self.store.contains(idx) {
                if !pending.is_empty() {
                    if self.flush(sequence, &pending, sampler_depth, config, pe_stats)? {
                        confirmed.extend(pending.drain(..));
                    } else {
                        cancelled = true;
                        break;
                    }
                }
                self.store.get(idx, |_| ());
                confirmed.push(idx);
            } else {
                pending.push(idx);
            }
            idx += 1;
        }

        if !cancelled && !pending.is_empty() {
            if self.flush(sequence, &pending, sampler_depth, config, pe_stats)? {
                confirmed.extend(pending.drain(..));
            } else {
                cancelled = true;
            }
        }

        let mut records = Vec::new();
        let mut splice_features = Vec::new();

        if let Some(&first) = confirmed.first() {
            self.store.get(first, |tile| {
                records.extend(tile.overlapping_records().iter().cloned());
                splice_features.extend(tile.splice_overlapping().iter().copied());
            });
        }
        for &i in &confirmed {
            self.store.get(i, |tile| {
                on_tile_counts(tile.counts());
                records.extend(tile.contained_records().iter().cloned());
                splice_features.extend(tile.splice_contained().iter().copied());
            });
        }

        records.sort_by_key(|r| r.start());
        let mut filtered = TiledIterator::new(records, start, end);
        let records: Vec<Src::Record> = filtered.by_ref().collect();
        filtered.close();

        Ok(QueryResult {
            records,
            splice_features,
            cancelled,
        })
    }

    /// Construct fresh tiles for a contiguous run of missing indices, load
    /// them via one [`TileLoader::load`] call, and publish them to the
    /// store on success. Returns `Ok(false)` if the load was cancelled, and
    /// propagates a genuine reader fault as `Err` (spec §7).
    fn flush(
        &self,
        sequence: &str,
        indices: &[i64],
        sampler_depth: u32,
        config: &ConfigSnapshot<Src::Record>,
        pe_stats: &mut PeStatsTable,
    ) -> CacheResult<bool> {
        let mut batch: Vec<AlignmentTile<Src::Record>> = indices
            .iter()
            .map(|&i| {
                AlignmentTile::new(
                    i * self.tile_size,
                    (i + 1) * self.tile_size,
                    sampler_depth,
                    self.rng.clone(),
                    (self.splice_factory)(),
                    config.bisulfite_context,
                )
            })
            .collect();

        let loader = TileLoader::new(self.source, config, self.registry, self.cancel_flag);
        let outcome = loader.load(sequence, &mut batch, pe_stats)?;

        if outcome == LoadOutcome::Cancelled {
            return Ok(false);
        }

        for (i, tile) in indices.iter().zip(batch) {
            self.store.put(*i, tile);
        }
        Ok(true)
    }
}

/// A single-pass, non-restartable iterator over an already-assembled,
/// sorted record list (spec §4.5). `close` is a no-op: it owns nothing
/// that needs releasing.
pub struct TiledIterator<R: AlignmentRecord> {
    records: std::vec::IntoIter<R>,
    query_start: i64,
    query_end: i64,
}

impl<R: AlignmentRecord> TiledIterator<R> {
    pub fn new(records: Vec<R>, query_start: i64, query_end: i64) -> Self {
        Self {
            records: records.into_iter(),
            query_start,
            query_end,
        }
    }

    /// A no-op, present for contract symmetry with the upstream reader's
    /// `close` (spec §4.5).
    pub fn close(&mut self) {}
}

impl<R: AlignmentRecord> Iterator for TiledIterator<R> {
    type Item = R;

    fn next(&mut self) -> Option<R> {
        for record in self.records.by_ref() {
            if record.start() < self.query_end && record.end() > self.query_start {
                return Some(record);
            }
        }
        None
    }
}

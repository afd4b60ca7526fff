//! `AlignmentCache`: the public façade over `TileStore`, `TileLoader`,
//! `QueryPlanner`, and the process-wide `Coordinator` (spec §3 tile-size
//! rule, §4.6).
//!
//! Field layout and lifecycle follow the teacher's `TileScheduler`
//! (`scheduler.rs`): a `RwLock`-guarded "current subject" (there, the open
//! slide; here, the active reference sequence and its tile size), an atomic
//! cancel/generation-style flag, and a `load`/`close` pair that invalidates
//! transient state before swapping in the new subject. Where the teacher
//! hands prefetch work to `rayon`, this cache has only one loader thread per
//! instance (spec §5) — invalidation here means rebuilding the `TileStore`,
//! not clearing a thread pool's queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::alignment::AlignmentSource;
use crate::config::ConfigSnapshot;
use crate::counts::CountsSink;
use crate::error::{CacheError, CacheResult};
use crate::pe_stats::PeStatsTable;
use crate::planner::{QueryPlanner, QueryResult};
use crate::registry::{Coordinator, RegisteredCache};
use crate::rng::{default_shared_rng, SharedRng};
use crate::splice::{null_splice_factory, SpliceSinkFactory};
use crate::store::TileStore;

/// Mitochondrial reference names fixed at a 1,000-base tile size regardless
/// of the visibility window (spec §3).
const MITOCHONDRIAL_NAMES: [&str; 4] = ["M", "chrM", "MT", "chrMT"];

/// Hysteresis bounds (spec §3/§4.6): a visibility-window change outside
/// `(0.5x, 2x)` of the window the current tile size was computed from
/// invalidates the entire cache.
const HYSTERESIS_GROW: f64 = 2.0;
const HYSTERESIS_SHRINK: f64 = 0.5;

fn tile_size_for(sequence: &str, max_visible_range_kb: f64) -> i64 {
    if MITOCHONDRIAL_NAMES.contains(&sequence) {
        return 1_000;
    }
    ((max_visible_range_kb * 1_000.0).round() as i64).max(1)
}

/// `query`'s outcome (spec §4.2/§4.3): a cancelled query is not an error
/// (spec §7) — it carries back whatever was accumulated before the cancel.
pub enum QueryOutcome<R> {
    Ok(QueryResult<R>),
    Cancelled(QueryResult<R>),
}

struct ActiveSequence {
    name: String,
    tile_size: i64,
    visible_range_kb: f64,
}

/// The public cache handle over one opened alignment source (spec §2 "Top-
/// level cache handle").
///
/// Generic over `Src: AlignmentSource` the same way every other component
/// in this crate is — see `alignment.rs`'s doc comment for the grounding.
pub struct AlignmentCache<Src: AlignmentSource> {
    source: Src,
    store: TileStore<Src::Record>,
    registry: Arc<Coordinator>,
    cancel_flag: AtomicBool,
    rng: SharedRng,
    splice_factory: SpliceSinkFactory<Src::Record>,
    active: RwLock<Option<ActiveSequence>>,
}

impl<Src: AlignmentSource + 'static> AlignmentCache<Src> {
    /// Open a cache over `source`, registering it with `registry` for
    /// cancellation/memory-pressure/visibility broadcasts (spec §9: the
    /// registry is constructed once by the embedding application and
    /// injected, never a singleton).
    pub fn new(source: Src, registry: Arc<Coordinator>) -> CacheResult<Arc<Self>> {
        Self::new_with_rng(source, registry, default_shared_rng())
    }

    /// As [`Self::new`], injecting a deterministic RNG for the reservoir
    /// sampler (spec §9); intended for tests and reproducible batch runs.
    pub fn new_with_rng(
        source: Src,
        registry: Arc<Coordinator>,
        rng: SharedRng,
    ) -> CacheResult<Arc<Self>> {
        Self::new_with_collaborators(source, registry, rng, null_splice_factory())
    }

    /// As [`Self::new`], additionally injecting the splice-junction sink
    /// factory (spec §1: junction extraction is an external collaborator).
    /// Queries only use it when `config.show_junction_track` is set; with no
    /// real extractor to inject, the two-argument constructors above default
    /// to [`null_splice_factory`] so the field is never dangling.
    pub fn new_with_collaborators(
        source: Src,
        registry: Arc<Coordinator>,
        rng: SharedRng,
        splice_factory: SpliceSinkFactory<Src::Record>,
    ) -> CacheResult<Arc<Self>> {
        if !source.has_index() {
            return Err(CacheError::MissingIndex(
                "alignment source has no index".to_string(),
            ));
        }
        let cache = Arc::new(Self {
            source,
            store: TileStore::new(),
            registry,
            cancel_flag: AtomicBool::new(false),
            rng,
            splice_factory,
            active: RwLock::new(None),
        });
        let dyn_self: Arc<dyn RegisteredCache> = cache.clone();
        cache.registry.register(&dyn_self);
        Ok(cache)
    }

    /// Switch the active reference sequence, clearing the store if this is
    /// the first sequence or recomputing tile size otherwise (spec §3
    /// invariant 6).
    fn ensure_sequence(&self, sequence: &str, config: &ConfigSnapshot<Src::Record>) {
        let new_size = tile_size_for(sequence, config.max_visible_range_kb);
        let mut active = self.active.write();
        let needs_switch = match active.as_ref() {
            Some(current) => current.name != sequence,
            None => true,
        };
        if needs_switch {
            self.store.clear();
            *active = Some(ActiveSequence {
                name: sequence.to_string(),
                tile_size: new_size,
                visible_range_kb: config.max_visible_range_kb,
            });
        }
    }

    fn tile_size(&self) -> i64 {
        self.active
            .read()
            .as_ref()
            .map(|a| a.tile_size)
            .unwrap_or(1)
    }

    /// `query(sequence, start, end, max_read_depth, config, pe_stats,
    /// on_tile_counts)` (spec §4.2), wired through the owning instance's
    /// store/loader/planner.
    #[allow(clippy::too_many_arguments)]
    pub fn query(
        &self,
        sequence: &str,
        start: i64,
        end: i64,
        max_read_depth: u32,
        config: &ConfigSnapshot<Src::Record>,
        pe_stats: &mut PeStatsTable,
        on_tile_counts: impl FnMut(&dyn CountsSink<Src::Record>),
    ) -> CacheResult<QueryOutcome<Src::Record>> {
        if self.registry.is_corrupt_index() {
            return Ok(QueryOutcome::Cancelled(QueryResult {
                records: Vec::new(),
                splice_features: Vec::new(),
                cancelled: true,
            }));
        }

        self.ensure_sequence(sequence, config);

        // Junction extraction is an external collaborator (spec §1); this
        // cache only ever owns a sink, never the extractor. Honor
        // `show_junction_track` by falling back to the no-op sink when the
        // viewer has the track turned off, regardless of what factory was
        // injected at construction.
        let splice_factory = if config.show_junction_track {
            self.splice_factory.clone()
        } else {
            null_splice_factory()
        };

        let planner = QueryPlanner::new(
            &self.source,
            &self.store,
            &self.registry,
            &self.cancel_flag,
            self.rng.clone(),
            splice_factory,
            self.tile_size(),
        );
        let result =
            planner.query(sequence, start, end, max_read_depth, config, pe_stats, on_tile_counts)?;

        if result.cancelled {
            Ok(QueryOutcome::Cancelled(result))
        } else {
            Ok(QueryOutcome::Ok(result))
        }
    }

    /// Release upstream reader resources (spec §5 resource discipline).
    pub fn close(&self) {
        self.source.close();
        self.store.clear();
    }

    pub fn tiles_cached(&self) -> usize {
        self.store.len()
    }
}

impl<Src: AlignmentSource + 'static> RegisteredCache for AlignmentCache<Src> {
    fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Release);
    }

    fn clear_store(&self) {
        self.store.clear();
    }

    /// `update_cache()` (spec §4.6): recompute tile size for the new
    /// visibility window; a change outside `(0.5x, 2x)` of the window the
    /// current tile size was derived from invalidates the entire cache.
    fn update_visible_range(&self, max_visible_range_kb: f64) {
        let mut active = self.active.write();
        let Some(current) = active.as_mut() else {
            return;
        };
        let ratio = if current.visible_range_kb > 0.0 {
            max_visible_range_kb / current.visible_range_kb
        } else {
            f64::INFINITY
        };
        if ratio > HYSTERESIS_GROW || ratio < HYSTERESIS_SHRINK {
            current.visible_range_kb = max_visible_range_kb;
            current.tile_size = tile_size_for(&current.name, max_visible_range_kb);
            drop(active);
            self.store.clear();
        }
    }
}

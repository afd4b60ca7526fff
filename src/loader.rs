//! `TileLoader`: streams one contiguous range query, fanning each record
//! out to every tile it overlaps (spec §4.3).
//!
//! The cancellation/progress cadence and the process-wide corrupt-index
//! latch mirror the teacher's `scheduler.rs` generation-guard discipline
//! (check the shared flag before doing work, after acquiring any lock, and
//! again after the expensive step) and `bulk_preload.rs`'s
//! cancel-flag-plus-`eprintln!` status reporting — adapted from guarding a
//! JPEG decode to guarding one record's admission.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::alignment::{AlignmentRecord, AlignmentSource, CloseableIterator, ReaderError};
use crate::config::ConfigSnapshot;
use crate::error::{CacheError, CacheResult};
use crate::pe_stats::PeStatsTable;
use crate::registry::Coordinator;
use crate::tile::AlignmentTile;

/// Cap on each of `mapped_mates` / `unmapped_mates` (spec §4.3/§5).
const MATE_MAP_CAPACITY: usize = 1_000;

/// Progress/cancellation/memory check cadence in normal operation (spec
/// §4.3).
const PROGRESS_INTERVAL: u64 = 1_000;

/// The same cadence in test mode, so tests don't need 100k records to
/// exercise the check.
const PROGRESS_INTERVAL_TEST_MODE: u64 = 100_000;

/// Outcome of a `TileLoader::load` call (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Ok,
    Cancelled,
}

/// A FIFO-evicted, capacity-bounded map keyed by read name (spec §4.3,
/// DESIGN.md Open Question 3: FIFO is an explicitly allowed substitute for
/// LRU here).
struct BoundedMateMap<R> {
    entries: HashMap<String, R>,
    order: VecDeque<String>,
    capacity: usize,
}

impl<R> BoundedMateMap<R> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn insert(&mut self, name: String, record: R) {
        if !self.entries.contains_key(&name) && self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        if !self.entries.contains_key(&name) {
            self.order.push_back(name.clone());
        }
        self.entries.insert(name, record);
    }

    fn remove(&mut self, name: &str) -> Option<R> {
        let removed = self.entries.remove(name);
        if removed.is_some() {
            self.order.retain(|n| n != name);
        }
        removed
    }

    fn drain(&mut self) -> impl Iterator<Item = (String, R)> + '_ {
        self.order.clear();
        self.entries.drain()
    }
}

/// Streams one contiguous reference range, populating a run of tiles
/// (spec §4.3).
///
/// `cancel_flag` is this loader's *owning cache instance's* own cancel
/// flag (spec §4.6: cancellation is broadcast per-instance); `registry` is
/// the process-wide coordinator holding the global corrupt-index latch and
/// memory probe.
pub struct TileLoader<'a, Src: AlignmentSource> {
    source: &'a Src,
    config: &'a ConfigSnapshot<Src::Record>,
    registry: &'a Coordinator,
    cancel_flag: &'a AtomicBool,
    test_mode: bool,
}

impl<'a, Src: AlignmentSource> TileLoader<'a, Src> {
    pub fn new(
        source: &'a Src,
        config: &'a ConfigSnapshot<Src::Record>,
        registry: &'a Coordinator,
        cancel_flag: &'a AtomicBool,
    ) -> Self {
        Self {
            source,
            config,
            registry,
            cancel_flag,
            test_mode: false,
        }
    }

    /// Switch to the coarser progress cadence used by a headless/batch run
    /// of the embedding viewer (spec §4.3: "100,000 in test mode") — not
    /// this crate's own unit tests, which use the default 1,000-record
    /// cadence. A batch run has no UI to keep responsive, so it checks in
    /// less often.
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    fn progress_interval(&self) -> u64 {
        if self.test_mode {
            PROGRESS_INTERVAL_TEST_MODE
        } else {
            PROGRESS_INTERVAL
        }
    }

    fn passes_filters(&self, record: &Src::Record) -> bool {
        if !record.is_mapped() {
            return false;
        }
        if record.is_duplicate() && !self.config.show_duplicates {
            return false;
        }
        if record.is_vendor_failed() && self.config.filter_failed_reads {
            return false;
        }
        if record.mapping_quality() < self.config.quality_threshold {
            return false;
        }
        if !self.config.passes_read_group_filter(record) {
            return false;
        }
        true
    }

    /// `load(sequence, tiles_in_order, pe_stats)` (spec §4.3). A corrupt
    /// index is sticky and reported as `Ok(LoadOutcome::Cancelled)` (spec
    /// §7: not an error, a latched short-circuit); any other reader fault
    /// is wrapped and re-raised as `Err(CacheError::ReaderFault)`.
    pub fn load(
        &self,
        sequence: &str,
        tiles: &mut [AlignmentTile<Src::Record>],
        pe_stats: &mut PeStatsTable,
    ) -> CacheResult<LoadOutcome> {
        if self.registry.is_corrupt_index() {
            return Ok(LoadOutcome::Cancelled);
        }
        if tiles.is_empty() {
            return Ok(LoadOutcome::Ok);
        }

        let range_start = tiles[0].start();
        let range_end = tiles[tiles.len() - 1].end();
        let last_tile = tiles.len() - 1;
        let tile_size = range_end_minus_start_per_tile(tiles);

        let mut reader = self
            .source
            .query(sequence, range_start + 1, range_end, false);

        let mut mapped_mates: BoundedMateMap<Src::Record> = BoundedMateMap::new(MATE_MAP_CAPACITY);
        let mut unmapped_mates: BoundedMateMap<Src::Record> = BoundedMateMap::new(MATE_MAP_CAPACITY);

        let mut processed: u64 = 0;
        let interval = self.progress_interval();
        let mut outcome = LoadOutcome::Ok;
        let mut fault: Option<CacheError> = None;

        loop {
            if self.cancel_flag.load(Ordering::Acquire) {
                outcome = LoadOutcome::Cancelled;
                break;
            }

            let next = reader.next();
            let mut record = match next {
                None => break,
                Some(Ok(record)) => record,
                Some(Err(err)) => {
                    if err.is_corrupt_index() {
                        eprintln!("[tiled-alignment-cache] corrupt index on {sequence}: {err}");
                        self.registry.set_corrupt_index();
                        outcome = LoadOutcome::Cancelled;
                    } else {
                        eprintln!("[tiled-alignment-cache] reader fault on {sequence}: {err}");
                        fault = Some(CacheError::ReaderFault(err.to_string()));
                    }
                    break;
                }
            };

            Self::reconstruct_mate_sequence(&mut record, &mut mapped_mates, &mut unmapped_mates);

            if self.passes_filters(&record) {
                let idx0 = ((record.start() - range_start) / tile_size).max(0) as usize;
                let idx1 = (((record.end() - range_start) / tile_size).max(0) as usize).min(last_tile);
                if idx0 <= idx1 {
                    for tile in tiles.iter_mut().take(idx1 + 1).skip(idx0) {
                        tile.add_record(record.clone());
                    }
                }

                if record.is_paired() && record.is_proper_pair() {
                    let insert_size = record.mate_start() - record.start();
                    pe_stats.record(record.library(), insert_size);
                }
            }

            processed += 1;
            if processed % interval == 0 {
                eprintln!(
                    "[tiled-alignment-cache] loading {sequence}: {processed} records processed"
                );
                if !self.registry.check_memory() {
                    self.registry.clear_all_caches();
                    if !self.registry.check_memory() {
                        self.registry.cancel_readers();
                        outcome = LoadOutcome::Cancelled;
                        break;
                    }
                }
            }
        }

        // Final pass over any still-pending mate sequences (spec §4.3):
        // walk mapped_mates once more and fill in any still-pending mate
        // sequences from unmapped_mates. Records with an unresolved mate at
        // this point have already been dispatched to their tiles without a
        // mate sequence, so resolving the name here patches the sequence
        // onto the copies each tile already holds, rather than discarding
        // the stored snapshots. Any name left unresolved (its mate never
        // streamed within this range) stays that way (spec §7: mate-sequence
        // misses recover silently).
        let unmapped_drained: Vec<(String, Src::Record)> = unmapped_mates.drain().collect();
        for (name, unmapped) in unmapped_drained {
            if let Some(mapped) = mapped_mates.remove(&name) {
                let unmapped_sequence = unmapped.read_sequence().to_vec();
                let mapped_sequence = mapped.read_sequence().to_vec();
                for tile in tiles.iter_mut() {
                    tile.patch_mate_sequence(&name, true, &unmapped_sequence);
                    tile.patch_mate_sequence(&name, false, &mapped_sequence);
                }
            }
        }
        let _ = mapped_mates.drain().count();

        reader.close();
        self.cancel_flag.store(false, Ordering::Release);

        if let Some(err) = fault {
            return Err(err);
        }

        if outcome == LoadOutcome::Ok {
            pe_stats.finalize_all(
                self.config.min_insert_size_percentile,
                self.config.max_insert_size_percentile,
            );
            for tile in tiles.iter_mut() {
                tile.set_loaded();
            }
        }

        Ok(outcome)
    }

    /// Paired-end mate-sequence reconstruction (spec §4.3). Resolves
    /// immediately when the complementary mate has already streamed past;
    /// otherwise stashes a clone for the mate to resolve against when (if)
    /// it arrives later in coordinate order.
    fn reconstruct_mate_sequence(
        record: &mut Src::Record,
        mapped_mates: &mut BoundedMateMap<Src::Record>,
        unmapped_mates: &mut BoundedMateMap<Src::Record>,
    ) {
        if !record.is_paired() {
            return;
        }
        let name = record.read_name().to_string();
        if record.is_mapped() && !record.mate_is_mapped() {
            match unmapped_mates.remove(&name) {
                Some(stored) => record.set_mate_sequence(stored.read_sequence().to_vec()),
                None => mapped_mates.insert(name, record.clone()),
            }
        } else if !record.is_mapped() && record.mate_is_mapped() {
            match mapped_mates.remove(&name) {
                Some(stored) => record.set_mate_sequence(stored.read_sequence().to_vec()),
                None => unmapped_mates.insert(name, record.clone()),
            }
        }
    }
}

fn range_end_minus_start_per_tile<R: AlignmentRecord>(tiles: &[AlignmentTile<R>]) -> i64 {
    tiles[0].end() - tiles[0].start()
}

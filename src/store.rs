//! `TileStore`: bounded LRU map from tile index to tile (spec §4.1).
//!
//! A hand-rolled `HashMap` + `VecDeque` LRU, following the teacher's `L1`
//! `TileCache` in `cache.rs` rather than reaching for `moka` — the fixed
//! 10-entry capacity here is far below the scale `moka`'s TinyLFU machinery
//! is built for (see DESIGN.md's dependency-change notes).

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::tile::AlignmentTile;

/// Fixed TileStore capacity (spec §4.1).
pub const CAPACITY: usize = 10;

struct Inner<R> {
    tiles: HashMap<i64, AlignmentTile<R>>,
    lru_order: VecDeque<i64>,
}

impl<R> Inner<R> {
    fn touch(&mut self, index: i64) {
        self.lru_order.retain(|i| *i != index);
        self.lru_order.push_back(index);
    }
}

/// Bounded-capacity mapping from tile index to tile (spec §4.1). Accessed
/// only by its owning cache instance (spec §5) — the internal mutex exists
/// for interior mutability on `get`'s LRU touch, not for cross-thread
/// sharing.
pub struct TileStore<R> {
    inner: Mutex<Inner<R>>,
}

impl<R> Default for TileStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> TileStore<R> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                tiles: HashMap::with_capacity(CAPACITY),
                lru_order: VecDeque::with_capacity(CAPACITY),
            }),
        }
    }

    /// `get(index)` (spec §4.1): run `f` against the stored tile, marking
    /// it most-recently-used first. Exposed as a callback rather than a
    /// borrowed reference since the tile lives behind this store's mutex.
    pub fn get<T>(&self, index: i64, f: impl FnOnce(&AlignmentTile<R>) -> T) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.tiles.contains_key(&index) {
            inner.touch(index);
        }
        inner.tiles.get(&index).map(f)
    }

    pub fn contains(&self, index: i64) -> bool {
        self.inner.lock().tiles.contains_key(&index)
    }

    /// Insert a freshly loaded tile, evicting the least-recently-used
    /// entry first if the store is at capacity.
    pub fn put(&self, index: i64, tile: AlignmentTile<R>) {
        let mut inner = self.inner.lock();
        if !inner.tiles.contains_key(&index) && inner.tiles.len() >= CAPACITY {
            if let Some(evict) = inner.lru_order.pop_front() {
                inner.tiles.remove(&evict);
            }
        }
        inner.tiles.insert(index, tile);
        inner.touch(index);
    }

    /// Clear this store (spec §3 invariant 6: on reference-sequence
    /// switch).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.tiles.clear();
        inner.lru_order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Process-wide coordinator: corrupt-index latch, memory-pressure probe,
//! and the weak-reference registry of live cache instances (spec §4.6/§5,
//! design note §9).
//!
//! A single `Coordinator` is constructed once by the embedding application
//! and shared (by reference or `Arc`) across every `AlignmentCache` it
//! opens — spec §9 explicitly rules out an ad-hoc singleton, so unlike the
//! teacher's per-process `TileScheduler` state this type takes no global
//! statics; the teacher's atomic-flag-plus-mutex style (`scheduler.rs`'s
//! `generation`/`active_slide_id`, `bulk_preload.rs`'s `cancelled`) is kept,
//! generalized to a registry instead of a single owner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// The capability a registered cache instance exposes to the coordinator's
/// broadcasts (spec §4.6): cooperative cancellation, a full store wipe
/// under memory pressure, and visibility-window reconfiguration.
pub trait RegisteredCache: Send + Sync {
    /// Set this instance's own cancel flag.
    fn cancel(&self);
    /// Clear this instance's `TileStore` (memory-pressure recovery).
    fn clear_store(&self);
    /// Recompute tile size for the new visibility window; rebuild the
    /// store if the change triggers the hysteresis threshold (spec §3).
    fn update_visible_range(&self, max_visible_range_kb: f64);
}

/// A probe over the host's memory pool (external collaborator, injected).
/// `free_fraction` returns the fraction still free, in `[0, 1]`.
pub trait MemoryProbe: Send + Sync {
    fn free_fraction(&self) -> f64;
}

/// A probe that always reports healthy; useful as a default for
/// embedders with no real memory pool to watch.
pub struct AlwaysHealthyProbe;

impl MemoryProbe for AlwaysHealthyProbe {
    fn free_fraction(&self) -> f64 {
        1.0
    }
}

/// Below this free fraction, the loader treats memory as under pressure
/// (spec §4.3).
const LOW_MEMORY_THRESHOLD: f64 = 0.20;

/// The process-wide coordinator object (spec §9).
pub struct Coordinator {
    corrupt_index: AtomicBool,
    instances: Mutex<Vec<Weak<dyn RegisteredCache>>>,
    memory_probe: Box<dyn MemoryProbe>,
    /// Serializes `check_memory` calls: "only one memory check may run at
    /// a time" (spec §5).
    memory_check_lock: Mutex<()>,
}

impl Coordinator {
    pub fn new(memory_probe: Box<dyn MemoryProbe>) -> Self {
        Self {
            corrupt_index: AtomicBool::new(false),
            instances: Mutex::new(Vec::new()),
            memory_probe,
            memory_check_lock: Mutex::new(()),
        }
    }

    pub fn with_default_probe() -> Self {
        Self::new(Box::new(AlwaysHealthyProbe))
    }

    /// Register a live cache instance. Held weakly: dropping the instance
    /// does not require deregistration, since broadcasts skip dead
    /// references (spec §9).
    pub fn register(&self, instance: &Arc<dyn RegisteredCache>) {
        self.instances.lock().push(Arc::downgrade(instance));
    }

    pub fn is_corrupt_index(&self) -> bool {
        self.corrupt_index.load(Ordering::Acquire)
    }

    /// Set the sticky corrupt-index flag (spec §7): persists until process
    /// restart.
    pub fn set_corrupt_index(&self) {
        self.corrupt_index.store(true, Ordering::Release);
    }

    /// `check_memory()` (spec §4.3): true if the pool is healthy (at or
    /// above the low-memory threshold).
    pub fn check_memory(&self) -> bool {
        let _guard = self.memory_check_lock.lock();
        self.memory_probe.free_fraction() >= LOW_MEMORY_THRESHOLD
    }

    /// `clear_all_caches()` (spec §4.1/§4.3): wipe every live instance's
    /// `TileStore`, pruning dead references as we go.
    pub fn clear_all_caches(&self) {
        let mut instances = self.instances.lock();
        instances.retain(|weak| {
            if let Some(instance) = weak.upgrade() {
                instance.clear_store();
                true
            } else {
                false
            }
        });
    }

    /// `cancel_readers()` (spec §4.6): set the cancel flag on every live
    /// instance, then clear the registry entirely.
    pub fn cancel_readers(&self) {
        let mut instances = self.instances.lock();
        for weak in instances.drain(..) {
            if let Some(instance) = weak.upgrade() {
                instance.cancel();
            }
        }
    }

    /// Broadcast a visibility-window change to every live instance (spec
    /// §4.6).
    pub fn broadcast_visibility_change(&self, max_visible_range_kb: f64) {
        let mut instances = self.instances.lock();
        instances.retain(|weak| {
            if let Some(instance) = weak.upgrade() {
                instance.update_visible_range(max_visible_range_kb);
                true
            } else {
                false
            }
        });
    }

    pub fn live_instance_count(&self) -> usize {
        let mut instances = self.instances.lock();
        instances.retain(|weak| weak.strong_count() > 0);
        instances.len()
    }
}

//! Tiled, depth-limited alignment cache for interactive genome browsers.
//!
//! This crate provides:
//! - A bounded-depth reservoir sampler that caps admitted reads per tile
//!   while keeping per-base coverage counts unbiased and mate pairs intact
//! - A fixed-capacity LRU tile store, invalidated on reference-sequence
//!   switch or a large visibility-window change
//! - A streaming loader with mate-sequence reconstruction, read filtering,
//!   and cooperative cancellation under memory pressure
//! - A process-wide registry broadcasting cancellation and visibility
//!   changes across every open cache instance
//!
//! The underlying alignment reader, the alignment record type, and splice-
//! junction extraction are external collaborators, modelled here as traits
//! (see [`alignment`] and [`splice`]) so the cache is generic over whatever
//! concrete reader an embedding viewer supplies.
//!
//! Usage sketch:
//! ```ignore
//! use std::sync::Arc;
//! use tiled_alignment_cache::cache::AlignmentCache;
//! use tiled_alignment_cache::registry::Coordinator;
//!
//! let registry = Arc::new(Coordinator::with_default_probe());
//! let cache = AlignmentCache::new(my_reader, registry)?;
//! let outcome = cache.query("chr1", 0, 16_000, 500, &config, &mut pe_stats, |_counts| {})?;
//! ```

pub mod alignment;
pub mod cache;
pub mod config;
pub mod counts;
pub mod error;
pub mod loader;
pub mod pe_stats;
pub mod planner;
pub mod registry;
pub mod rng;
pub mod splice;
pub mod store;
pub mod tile;

#[cfg(test)]
mod test_support;

pub use alignment::{AlignmentRecord, AlignmentSource, CloseableIterator, ReaderError};
pub use cache::{AlignmentCache, QueryOutcome};
pub use config::{BisulfiteContext, ConfigSnapshot, ConfigValues};
pub use error::{CacheError, CacheResult};
pub use pe_stats::{PeStats, PeStatsTable};
pub use planner::{QueryPlanner, QueryResult, TiledIterator};
pub use registry::{Coordinator, MemoryProbe, RegisteredCache};
pub use rng::{SamplingRng, SharedRng};
pub use splice::{SpliceJunctionFeature, SpliceSink, SpliceSinkFactory};
pub use store::TileStore;
pub use tile::AlignmentTile;

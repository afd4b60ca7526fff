//! External collaborator capability sets (spec §6).
//!
//! The alignment record type and the underlying reader are explicitly out
//! of scope (spec §1) — they are modelled here as traits so the cache is
//! generic over whatever concrete record/reader an embedding application
//! supplies, the same way the teacher crate's sibling `SlideSource` trait
//! (see `other_examples/86d7a7be_PABannier-WSIStreamer__src-slide-registry.rs.rs`)
//! abstracts the tile scheduler over a storage backend via an associated type.

use std::collections::HashSet;

/// The alignment capability set (spec §6): a single sequencing read mapped
/// to a reference, with position, mate, and flag information.
///
/// `Clone` is required because a record may be admitted into more than one
/// tile's `contained_records`/`overlapping_records` (spec §4.3 fan-out) and
/// because the query result is a fresh, caller-owned list (spec §4.5).
pub trait AlignmentRecord: Clone + Send + Sync + 'static {
    /// Start coordinate (0-based, inclusive).
    fn start(&self) -> i64;
    /// End coordinate (0-based, exclusive).
    fn end(&self) -> i64;
    /// Read name, used to pair mates and to drive the sampler's
    /// pair-preservation bookkeeping.
    fn read_name(&self) -> &str;
    fn is_paired(&self) -> bool;
    fn is_mapped(&self) -> bool;
    fn is_duplicate(&self) -> bool;
    fn is_vendor_failed(&self) -> bool;
    fn is_proper_pair(&self) -> bool;
    fn mapping_quality(&self) -> u8;
    fn mate_is_mapped(&self) -> bool;
    /// Mate's start coordinate; meaningless when `mate_is_mapped()` is false.
    fn mate_start(&self) -> i64;
    fn read_sequence(&self) -> &[u8];
    /// Sequencing library, or `None` for the null library (keyed as
    /// `"null"` in PE-stats bucketing, spec §4.3).
    fn library(&self) -> Option<&str>;
    /// Fill in a reconstructed mate sequence (spec §4.3 mate-sequence
    /// reconstruction). Called by the loader only; no-op for records that
    /// never need it.
    fn set_mate_sequence(&mut self, sequence: Vec<u8>);
}

/// Classifies a reader error without assuming anything else about its
/// concrete representation, so the loader can detect the one error class
/// that is policy-relevant (spec §7): a buffer-underflow-style corrupt
/// index, which is sticky for the process, versus every other fault, which
/// is wrapped and re-raised.
pub trait ReaderError: std::fmt::Display + Send + Sync + 'static {
    /// True for a buffer-underflow-class corruption of the index.
    fn is_corrupt_index(&self) -> bool;
}

/// A closeable, single-pass stream of alignment records — the "upstream
/// reader" half of spec §6's reader capability set.
///
/// `close` is always called by the loader on exit (success, cancel, or
/// fault — spec §5 resource discipline); it is separate from `Drop` so a
/// reader backed by a real file handle or network socket can distinguish a
/// graceful shutdown from a panic unwind.
pub trait CloseableIterator<R, E>: Iterator<Item = Result<R, E>> + Send {
    fn close(&mut self);
}

/// The upstream reader capability set (spec §6): a random-access reader
/// over a sorted, indexed alignment file keyed by reference sequence and
/// coordinate.
pub trait AlignmentSource: Send + Sync {
    type Record: AlignmentRecord;
    type Error: ReaderError;

    fn sequence_names(&self) -> HashSet<String>;
    /// Opaque header blob, passed through untouched.
    fn header(&self) -> serde_json::Value;
    fn has_index(&self) -> bool;
    /// Whole-file scan, coordinate-sorted by contract.
    fn iterator(&self) -> Box<dyn CloseableIterator<Self::Record, Self::Error>>;
    /// Range query over `[start_1based, end]` on `sequence`. `contained`
    /// mirrors htslib-style readers that can restrict to reads fully
    /// contained in the range; this cache always passes `false` since it
    /// needs the overlap semantics of spec §3 invariant 2.
    fn query(
        &self,
        sequence: &str,
        start_1based: i64,
        end: i64,
        contained: bool,
    ) -> Box<dyn CloseableIterator<Self::Record, Self::Error>>;
    fn close(&self);
}

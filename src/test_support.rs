//! Shared test fixtures, mirroring the teacher's inline `test_utils`-style
//! helpers (`slide_pool.rs`/`scheduler.rs` tests build throwaway slide
//! entries the same way `MockRecord`/`MockSource` are built here).
//!
//! Only compiled under `#[cfg(test)]`; never part of the public API.

#![cfg(test)]

use std::collections::HashSet;

use crate::alignment::{AlignmentRecord, AlignmentSource, CloseableIterator, ReaderError};
use crate::rng::SamplingRng;

/// A minimal in-memory alignment record for unit tests.
#[derive(Debug, Clone)]
pub struct MockRecord {
    pub name: String,
    pub start_pos: i64,
    pub end_pos: i64,
    pub paired: bool,
    pub mapped: bool,
    pub duplicate: bool,
    pub vendor_failed: bool,
    pub proper_pair: bool,
    pub mapq: u8,
    pub mate_mapped: bool,
    pub mate_start_pos: i64,
    pub sequence: Vec<u8>,
    pub library: Option<String>,
}

impl MockRecord {
    pub fn new(name: &str, start: i64, end: i64) -> Self {
        Self {
            name: name.to_string(),
            start_pos: start,
            end_pos: end,
            paired: false,
            mapped: true,
            duplicate: false,
            vendor_failed: false,
            proper_pair: false,
            mapq: 60,
            mate_mapped: false,
            mate_start_pos: 0,
            sequence: Vec::new(),
            library: None,
        }
    }
}

impl AlignmentRecord for MockRecord {
    fn start(&self) -> i64 {
        self.start_pos
    }

    fn end(&self) -> i64 {
        self.end_pos
    }

    fn read_name(&self) -> &str {
        &self.name
    }

    fn is_paired(&self) -> bool {
        self.paired
    }

    fn is_mapped(&self) -> bool {
        self.mapped
    }

    fn is_duplicate(&self) -> bool {
        self.duplicate
    }

    fn is_vendor_failed(&self) -> bool {
        self.vendor_failed
    }

    fn is_proper_pair(&self) -> bool {
        self.proper_pair
    }

    fn mapping_quality(&self) -> u8 {
        self.mapq
    }

    fn mate_is_mapped(&self) -> bool {
        self.mate_mapped
    }

    fn mate_start(&self) -> i64 {
        self.mate_start_pos
    }

    fn read_sequence(&self) -> &[u8] {
        &self.sequence
    }

    fn library(&self) -> Option<&str> {
        self.library.as_deref()
    }

    fn set_mate_sequence(&mut self, sequence: Vec<u8>) {
        self.sequence = sequence;
    }
}

/// A trivial reader error, distinguishing a corrupt-index fault from
/// everything else.
#[derive(Debug, Clone)]
pub struct MockReaderError {
    pub corrupt_index: bool,
    pub message: String,
}

impl std::fmt::Display for MockReaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ReaderError for MockReaderError {
    fn is_corrupt_index(&self) -> bool {
        self.corrupt_index
    }
}

/// An in-memory, pre-sorted collection of records standing in for a real
/// indexed reader.
pub struct MockIterator {
    records: std::vec::IntoIter<Result<MockRecord, MockReaderError>>,
    closed: bool,
}

impl Iterator for MockIterator {
    type Item = Result<MockRecord, MockReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }
}

impl CloseableIterator<MockRecord, MockReaderError> for MockIterator {
    fn close(&mut self) {
        self.closed = true;
    }
}

/// A fixed, coordinate-sorted in-memory alignment source.
pub struct MockSource {
    pub sequences: Vec<String>,
    pub records: Vec<MockRecord>,
    pub has_index: bool,
    pub fail_with_corrupt_index: bool,
    /// Injects a non-corrupt-index reader fault instead of streaming
    /// records, for exercising `CacheError::ReaderFault` propagation.
    pub fail_with_reader_fault: bool,
}

impl MockSource {
    pub fn new(sequences: &[&str], records: Vec<MockRecord>) -> Self {
        Self {
            sequences: sequences.iter().map(|s| s.to_string()).collect(),
            records,
            has_index: true,
            fail_with_corrupt_index: false,
            fail_with_reader_fault: false,
        }
    }

    fn boxed_iterator(
        &self,
        records: Vec<MockRecord>,
    ) -> Box<dyn CloseableIterator<MockRecord, MockReaderError>> {
        if self.fail_with_corrupt_index {
            return Box::new(MockIterator {
                records: vec![Err(MockReaderError {
                    corrupt_index: true,
                    message: "buffer underflow reading index".to_string(),
                })]
                .into_iter(),
                closed: false,
            });
        }
        if self.fail_with_reader_fault {
            return Box::new(MockIterator {
                records: vec![Err(MockReaderError {
                    corrupt_index: false,
                    message: "connection reset reading alignment block".to_string(),
                })]
                .into_iter(),
                closed: false,
            });
        }
        Box::new(MockIterator {
            records: records.into_iter().map(Ok).collect::<Vec<_>>().into_iter(),
            closed: false,
        })
    }
}

impl AlignmentSource for MockSource {
    type Record = MockRecord;
    type Error = MockReaderError;

    fn sequence_names(&self) -> HashSet<String> {
        self.sequences.iter().cloned().collect()
    }

    fn header(&self) -> serde_json::Value {
        serde_json::json!({ "mock": true })
    }

    fn has_index(&self) -> bool {
        self.has_index
    }

    fn iterator(&self) -> Box<dyn CloseableIterator<Self::Record, Self::Error>> {
        self.boxed_iterator(self.records.clone())
    }

    fn query(
        &self,
        _sequence: &str,
        start_1based: i64,
        end: i64,
        _contained: bool,
    ) -> Box<dyn CloseableIterator<Self::Record, Self::Error>> {
        let lo = start_1based - 1;
        let selected: Vec<MockRecord> = self
            .records
            .iter()
            .filter(|r| r.start() < end && r.end() > lo)
            .cloned()
            .collect();
        self.boxed_iterator(selected)
    }

    fn close(&self) {}
}

/// A deterministic RNG for tests that need exact sampler outcomes: cycles
/// through a fixed sequence of `f64`s and always picks a given index.
pub struct FixedRng {
    pub values: Vec<f64>,
    pub cursor: usize,
    pub fixed_index: usize,
}

impl FixedRng {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            cursor: 0,
            fixed_index: 0,
        }
    }
}

impl SamplingRng for FixedRng {
    fn next_f64(&mut self) -> f64 {
        let v = self.values[self.cursor % self.values.len()];
        self.cursor += 1;
        v
    }

    fn next_index(&mut self, bound: usize) -> usize {
        self.fixed_index.min(bound.saturating_sub(1))
    }
}

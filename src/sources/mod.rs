// src/sources/mod.rs - Ingestion adapters producing candidate batches
pub mod flat_listing;
pub mod osm;

use crate::models::{CandidateRecord, SourceTag};

/// Candidates from one source, in source order.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub source: SourceTag,
    pub candidates: Vec<CandidateRecord>,
    /// Input rows that could not be parsed at all.
    pub rejected: usize,
}

impl SourceBatch {
    pub fn new(source: SourceTag) -> Self {
        Self {
            source,
            candidates: Vec::new(),
            rejected: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

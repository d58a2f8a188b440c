// src/pipeline/context.rs - State owned by one reconciliation run
use std::collections::BTreeMap;

use crate::matching::engine::ReferenceSet;
use crate::models::stats_models::{ReviewItem, SourceSummary};
use crate::models::{Category, DirectoryRecord};

/// Everything a run mutates. Candidates are reconciled one at a time against
/// `references`, so later candidates see the merges of earlier ones.
#[derive(Debug)]
pub struct ReconciliationContext {
    run_id: String,
    references: ReferenceSet,
    existing_records: usize,
    summaries: Vec<SourceSummary>,
    review: Vec<ReviewItem>,
}

impl ReconciliationContext {
    pub fn new(run_id: impl Into<String>, existing: Vec<DirectoryRecord>) -> Self {
        let existing_records = existing.len();
        Self {
            run_id: run_id.into(),
            references: ReferenceSet::from_records(existing),
            existing_records,
            summaries: Vec::new(),
            review: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn references(&self) -> &ReferenceSet {
        &self.references
    }

    pub fn references_mut(&mut self) -> &mut ReferenceSet {
        &mut self.references
    }

    pub fn existing_records(&self) -> usize {
        self.existing_records
    }

    pub fn summaries(&self) -> &[SourceSummary] {
        &self.summaries
    }

    pub fn review(&self) -> &[ReviewItem] {
        &self.review
    }

    pub(crate) fn push_summary(&mut self, summary: SourceSummary) {
        self.summaries.push(summary);
    }

    pub(crate) fn push_review(&mut self, item: ReviewItem) {
        self.review.push(item);
    }

    pub fn into_parts(self) -> (Vec<DirectoryRecord>, Vec<SourceSummary>, Vec<ReviewItem>) {
        (self.references.into_records(), self.summaries, self.review)
    }
}

pub fn category_totals(records: &[DirectoryRecord]) -> BTreeMap<Category, usize> {
    let mut totals = BTreeMap::new();
    for record in records {
        *totals.entry(record.category).or_insert(0) += 1;
    }
    totals
}

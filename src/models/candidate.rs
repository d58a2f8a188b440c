// src/models/candidate.rs
use super::record::DirectoryRecord;

/// Source-specific attributes read by the exclusion filter and not persisted
/// in the directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceAttributes {
    pub alt_name: Option<String>,
    pub denomination: Option<String>,
    pub description: Option<String>,
    pub operator: Option<String>,
    pub multi_faith: bool,
    pub jumuah_only: bool,
}

/// An incoming record from one ingestion source.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    pub record: DirectoryRecord,
    pub attributes: SourceAttributes,
}

impl CandidateRecord {
    pub fn new(record: DirectoryRecord) -> Self {
        Self {
            record,
            attributes: SourceAttributes::default(),
        }
    }

    pub fn with_attributes(record: DirectoryRecord, attributes: SourceAttributes) -> Self {
        Self { record, attributes }
    }
}

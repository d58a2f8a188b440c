pub mod candidate;
pub mod record;
pub mod stats_models;

pub use candidate::{CandidateRecord, SourceAttributes};
pub use record::{Category, DirectoryFile, DirectoryRecord, GeoPoint, LocationPrecision, SourceTag};

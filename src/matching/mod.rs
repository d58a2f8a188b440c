// src/matching/mod.rs
pub mod distance;
pub mod engine;
pub mod exclusion;
pub mod normalize;

pub use engine::{find_match, MatchOutcome, MatchTiers, ReferenceSet};
pub use exclusion::{classify, Classification, ExclusionReason};

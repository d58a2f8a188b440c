// src/lib.rs
pub mod geocoding;
pub mod matching;
pub mod models;
pub mod pipeline;
pub mod sources;
pub mod utils;

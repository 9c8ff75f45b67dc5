pub mod classify;
pub mod engine;
pub mod rent;

pub use classify::{extract_candidates, Candidate};
pub use engine::{DiscoveryEngine, ScanOptions, ScanReport};
pub use rent::RentCache;

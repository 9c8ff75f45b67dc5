pub mod engine;
pub mod sweep;

pub use engine::{ReclaimEngine, ReclaimPolicy, ReclaimSummary};
pub use sweep::TreasurySweeper;

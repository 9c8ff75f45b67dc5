pub mod db;
pub mod models;

pub use db::Database;
pub use models::{
    AccountStatus, CheckpointUpdate, Cursor, FeeRecord, OperatorStats, ResourceKind,
    ScanCheckpoint, ScanStatus, SponsoredAccount, StatusChange, WhitelistEntry,
};

//! Command implementations

pub mod save_cache;
pub mod setup;
pub mod update_known_checksums;

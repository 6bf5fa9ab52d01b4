pub mod acquire;
pub mod cache;
pub mod cache_key;
pub mod checksum;
pub mod io;
pub mod paths;
pub mod platform;
pub mod sources;
pub mod tool_cache;
pub mod version;

pub use paths::*;
pub use sources::{SourceChain, VersionSource};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("setup-uv/", env!("CARGO_PKG_VERSION"));

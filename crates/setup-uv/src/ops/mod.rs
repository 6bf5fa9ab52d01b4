//! Step orchestration shared by the commands.

pub mod cache;
pub mod error;
pub mod outputs;
pub mod setup;

pub use error::SetupError;
pub use outputs::Outputs;

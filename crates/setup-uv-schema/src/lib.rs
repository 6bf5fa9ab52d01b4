//! Shared types for `setup-uv`: host enumerations, digests, artifact
//! descriptors and the version manifest wire format.

/// Architecture and platform enumerations.
pub mod arch;
/// SHA-256 digest newtype.
pub mod hash;
/// Version manifest documents.
pub mod manifest;
/// Artifact, archive and policy types.
pub mod types;

// Re-exports
pub use arch::*;
pub use hash::*;
pub use manifest::{Manifest, ManifestArtifact, ManifestError, VersionRecord};
pub use types::*;

/// Name of the tool being installed; also its tool-cache namespace.
pub const TOOL_NAME: &str = "uv";

/// Owner of the upstream release repository.
pub const OWNER: &str = "astral-sh";

/// Name of the upstream release repository.
pub const REPO: &str = "uv";

/// Default location of the NDJSON version manifest.
pub const DEFAULT_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/astral-sh/versions/main/v1/uv.ndjson";

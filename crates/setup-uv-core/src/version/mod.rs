//! Version resolution: specifier in, exactly one concrete version out.
//!
//! Order of operations:
//! 1. `latest` becomes the source's newest version.
//! 2. A bare lower bound (`>=X`) under the `highest` policy also takes the
//!    newest version, which must still satisfy the bound.
//! 3. An explicit version is returned as-is, known or not.
//! 4. Anything else is range-matched against the full version list.

pub mod discover;
pub mod matcher;

use setup_uv_schema::ResolutionStrategy;
use thiserror::Error;
use tracing::debug;

use crate::sources::{SourceError, VersionSource};
pub use matcher::{Pep440Matcher, SemverMatcher, VersionMatcher, default_matchers};

pub const LATEST: &str = "latest";

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("No version found for {0}")]
    NoMatch(String),

    #[error("The latest version {latest} does not satisfy {spec}")]
    LatestBelowMinimum { spec: String, latest: String },

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Exact version such as `0.3.0`, `v0.3.0` or `=0.3.0`.
pub fn is_explicit_version(spec: &str) -> bool {
    let s = spec.trim();
    let s = s.strip_prefix('=').unwrap_or(s).trim_start();
    let s = s.strip_prefix('v').unwrap_or(s);
    semver::Version::parse(s).is_ok()
}

/// A single `>=X` clause with no other constraint.
pub fn is_lower_bound_only(spec: &str) -> bool {
    let s = spec.trim();
    let Some(rest) = s.strip_prefix(">=") else {
        return false;
    };
    let rest = rest.trim();
    !rest.is_empty()
        && !rest.contains([',', ' ', '<', '>', '=', '|', '!', '~', '^'])
}

/// Ordered set of grammars plus the resolution algorithm.
pub struct Resolver {
    matchers: Vec<Box<dyn VersionMatcher>>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.matchers.iter().map(|m| m.name()).collect();
        f.debug_struct("Resolver").field("matchers", &names).finish()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(default_matchers())
    }
}

impl Resolver {
    pub fn new(matchers: Vec<Box<dyn VersionMatcher>>) -> Self {
        Self { matchers }
    }

    /// First grammar with a non-empty answer wins.
    pub fn select(
        &self,
        spec: &str,
        candidates: &[String],
        strategy: ResolutionStrategy,
    ) -> Option<String> {
        self.matchers
            .iter()
            .find_map(|m| m.select(spec, candidates, strategy))
    }

    pub fn satisfies(&self, spec: &str, version: &str) -> bool {
        self.matchers.iter().any(|m| m.satisfies(spec, version))
    }

    pub async fn resolve(
        &self,
        spec: &str,
        source: &dyn VersionSource,
        strategy: ResolutionStrategy,
    ) -> Result<String, ResolveError> {
        let spec = spec.trim();
        debug!("Resolving version: {spec}");

        let version = if spec == LATEST {
            let latest = source.latest_version().await?;
            debug!("Latest version: {latest}");
            latest
        } else if strategy == ResolutionStrategy::Highest && is_lower_bound_only(spec) {
            let latest = source.latest_version().await?;
            if !self.satisfies(spec, &latest) {
                return Err(ResolveError::LatestBelowMinimum {
                    spec: spec.to_string(),
                    latest,
                });
            }
            debug!("Latest version {latest} satisfies minimum {spec}");
            return Ok(latest);
        } else {
            spec.to_string()
        };

        if is_explicit_version(&version) {
            debug!("Version {version} is an explicit version.");
            return Ok(version);
        }

        let available = source.list_versions().await?;
        debug!("Available versions: {}", available.len());
        self.select(&version, &available, strategy)
            .ok_or(ResolveError::NoMatch(version))
    }
}

/// Resolve with the default grammars.
pub async fn resolve_version(
    spec: &str,
    source: &dyn VersionSource,
    strategy: ResolutionStrategy,
) -> Result<String, ResolveError> {
    Resolver::default().resolve(spec, source, strategy).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::fake::FakeSource;

    #[test]
    fn explicit_versions() {
        assert!(is_explicit_version("0.3.0"));
        assert!(is_explicit_version("v0.3.0"));
        assert!(is_explicit_version("=0.3.0"));
        assert!(is_explicit_version("0.4.0-alpha.1"));
        assert!(!is_explicit_version("0.3"));
        assert!(!is_explicit_version(">=0.3.0"));
        assert!(!is_explicit_version("latest"));
    }

    #[test]
    fn lower_bound_detection() {
        assert!(is_lower_bound_only(">=0.9.0"));
        assert!(is_lower_bound_only(" >= 0.9 "));
        assert!(!is_lower_bound_only(">=0.9.0,<1.0"));
        assert!(!is_lower_bound_only(">=0.9.0 <1.0"));
        assert!(!is_lower_bound_only(">0.9.0"));
        assert!(!is_lower_bound_only(">="));
    }

    #[tokio::test]
    async fn latest_takes_newest() {
        let src = FakeSource::new(&["0.9.26", "0.9.25"]);
        let v = resolve_version("latest", &src, ResolutionStrategy::Highest)
            .await
            .unwrap();
        assert_eq!(v, "0.9.26");
    }

    #[tokio::test]
    async fn minimum_bound_fast_path_revalidates() {
        let src = FakeSource::new(&["0.9.26", "0.9.25"]);
        let v = resolve_version(">=0.9.0", &src, ResolutionStrategy::Highest)
            .await
            .unwrap();
        assert_eq!(v, "0.9.26");

        let err = resolve_version(">=1.0.0", &src, ResolutionStrategy::Highest)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::LatestBelowMinimum { .. }));
    }

    #[tokio::test]
    async fn minimum_bound_under_lowest_range_matches() {
        let src = FakeSource::new(&["0.9.26", "0.9.25", "0.8.0"]);
        let v = resolve_version(">=0.9.0", &src, ResolutionStrategy::Lowest)
            .await
            .unwrap();
        assert_eq!(v, "0.9.25");
    }

    #[tokio::test]
    async fn explicit_pin_bypasses_membership() {
        let src = FakeSource::new(&["0.9.26"]);
        let v = resolve_version("0.3.0", &src, ResolutionStrategy::Highest)
            .await
            .unwrap();
        assert_eq!(v, "0.3.0");

        // No network needed at all for a pin.
        let offline = FakeSource::failing();
        let v = resolve_version("0.3.0", &offline, ResolutionStrategy::Lowest)
            .await
            .unwrap();
        assert_eq!(v, "0.3.0");
    }

    #[tokio::test]
    async fn ranges_pick_by_strategy_across_grammars() {
        let src = FakeSource::new(&["0.5.0", "0.4.30", "0.4.1", "0.3.0"]);
        let hi = resolve_version("0.4.x", &src, ResolutionStrategy::Highest)
            .await
            .unwrap();
        let lo = resolve_version("0.4.x", &src, ResolutionStrategy::Lowest)
            .await
            .unwrap();
        assert_eq!((hi.as_str(), lo.as_str()), ("0.4.30", "0.4.1"));

        let pep = resolve_version("~=0.4.1", &src, ResolutionStrategy::Highest)
            .await
            .unwrap();
        assert_eq!(pep, "0.4.30");
    }

    #[tokio::test]
    async fn no_match_names_the_specifier() {
        let src = FakeSource::new(&["0.5.0"]);
        let err = resolve_version("^2.0", &src, ResolutionStrategy::Highest)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No version found for ^2.0");
    }
}

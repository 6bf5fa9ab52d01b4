//! Range grammars, tried in order until one yields a match.

use std::str::FromStr;

use setup_uv_schema::ResolutionStrategy;
use tracing::debug;

/// One version-range dialect.
pub trait VersionMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `version` satisfies `spec`. Unparseable input never matches.
    fn satisfies(&self, spec: &str, version: &str) -> bool;

    /// Pick the highest or lowest candidate satisfying `spec`.
    fn select(
        &self,
        spec: &str,
        candidates: &[String],
        strategy: ResolutionStrategy,
    ) -> Option<String>;
}

/// The built-in grammars: SemVer ranges first, then PEP 440 specifiers.
pub fn default_matchers() -> Vec<Box<dyn VersionMatcher>> {
    vec![Box::new(SemverMatcher), Box::new(Pep440Matcher)]
}

fn pick<T: Ord>(matches: impl Iterator<Item = (T, String)>, strategy: ResolutionStrategy) -> Option<String> {
    let chosen = match strategy {
        ResolutionStrategy::Highest => matches.max_by(|a, b| a.0.cmp(&b.0)),
        ResolutionStrategy::Lowest => matches.min_by(|a, b| a.0.cmp(&b.0)),
    };
    chosen.map(|(_, raw)| raw)
}

/// npm-flavoured SemVer ranges (`^0.9`, `>=0.4.0 <0.5`, `0.9.x`, `a || b`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SemverMatcher;

/// Operators that only exist in PEP 440.
const PEP440_ONLY: [&str; 3] = ["==", "~=", "!="];

impl SemverMatcher {
    /// Translate an npm-style range into `semver` requirements, one per
    /// `||` alternative.
    pub fn parse_range(spec: &str) -> Option<Vec<semver::VersionReq>> {
        if PEP440_ONLY.iter().any(|op| spec.contains(op)) {
            return None;
        }
        spec.split("||")
            .map(|alt| {
                let comparators = normalize_comparators(alt)?;
                semver::VersionReq::parse(&comparators.join(", ")).ok()
            })
            .collect()
    }

    fn parse_version(raw: &str) -> Option<semver::Version> {
        semver::Version::parse(raw.trim().trim_start_matches(['v', '='])).ok()
    }
}

fn is_operator(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| matches!(c, '<' | '>' | '=' | '^' | '~'))
}

/// Split a whitespace- or comma-separated comparator list and make bare
/// versions behave like npm: `1.2.3` is exact, `1.2` means `1.2.*`.
fn normalize_comparators(alt: &str) -> Option<Vec<String>> {
    let mut out = Vec::new();
    let mut pending_op = String::new();

    for token in alt.split([' ', ',', '\t']).filter(|t| !t.is_empty()) {
        if is_operator(token) {
            pending_op.push_str(token);
            continue;
        }
        let joined = format!("{pending_op}{token}");
        pending_op.clear();

        let split = joined
            .find(|c: char| !matches!(c, '<' | '>' | '=' | '^' | '~'))
            .unwrap_or(joined.len());
        let (op, rest) = joined.split_at(split);
        let rest = rest.trim_start_matches('v');

        let has_wildcard = rest.contains(['*', 'x', 'X']);
        let normalized = if !op.is_empty() || has_wildcard {
            format!("{op}{rest}")
        } else if rest.split('.').count() >= 3 {
            format!("={rest}")
        } else {
            format!("{rest}.*")
        };
        out.push(normalized);
    }

    if !pending_op.is_empty() {
        return None;
    }
    if out.is_empty() {
        out.push("*".to_string());
    }
    Some(out)
}

impl VersionMatcher for SemverMatcher {
    fn name(&self) -> &'static str {
        "semver"
    }

    fn satisfies(&self, spec: &str, version: &str) -> bool {
        let (Some(reqs), Some(v)) = (Self::parse_range(spec), Self::parse_version(version)) else {
            return false;
        };
        reqs.iter().any(|r| r.matches(&v))
    }

    fn select(
        &self,
        spec: &str,
        candidates: &[String],
        strategy: ResolutionStrategy,
    ) -> Option<String> {
        let reqs = Self::parse_range(spec)?;
        let matches = candidates.iter().filter_map(|raw| {
            let v = Self::parse_version(raw)?;
            reqs.iter().any(|r| r.matches(&v)).then(|| (v, raw.clone()))
        });
        let found = pick(matches, strategy);
        if let Some(v) = &found {
            debug!("Found a version that satisfies the semver range: {v}");
        }
        found
    }
}

/// PEP 440 version specifiers (`>=0.4,<0.5`, `~=0.4.0`, `==0.5.*`).
#[derive(Debug, Clone, Copy, Default)]
pub struct Pep440Matcher;

impl Pep440Matcher {
    fn parse(spec: &str) -> Option<pep440_rs::VersionSpecifiers> {
        pep440_rs::VersionSpecifiers::from_str(spec.trim()).ok()
    }

    fn parse_version(raw: &str) -> Option<pep440_rs::Version> {
        pep440_rs::Version::from_str(raw.trim()).ok()
    }
}

impl VersionMatcher for Pep440Matcher {
    fn name(&self) -> &'static str {
        "pep440"
    }

    fn satisfies(&self, spec: &str, version: &str) -> bool {
        match (Self::parse(spec), Self::parse_version(version)) {
            (Some(specifiers), Some(v)) => specifiers.contains(&v),
            _ => false,
        }
    }

    fn select(
        &self,
        spec: &str,
        candidates: &[String],
        strategy: ResolutionStrategy,
    ) -> Option<String> {
        let specifiers = Self::parse(spec)?;
        let matches = candidates.iter().filter_map(|raw| {
            let v = Self::parse_version(raw)?;
            specifiers.contains(&v).then(|| (v, raw.clone()))
        });
        let found = pick(matches, strategy);
        if let Some(v) = &found {
            debug!("Found a version that satisfies the pep440 specifier: {v}");
        }
        found
    }
}

//! Find a version specifier in project files when none was given.

use std::path::Path;

use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};

use super::LATEST;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// Pick the version to resolve: explicit input, then `version_file`, then
/// `uv.toml` / `pyproject.toml` in `working_dir`, then `latest`.
pub fn discover_version(
    version_input: Option<&str>,
    version_file: Option<&Path>,
    working_dir: &Path,
) -> String {
    if let Some(v) = version_input.map(str::trim).filter(|v| !v.is_empty()) {
        return v.to_string();
    }

    if let Some(file) = version_file {
        return version_from_file(file).unwrap_or_else(|| {
            info!("Could not determine uv version from {}. Falling back to latest.", file.display());
            LATEST.to_string()
        });
    }

    for name in ["uv.toml", "pyproject.toml"] {
        let path = working_dir.join(name);
        if !path.exists() {
            continue;
        }
        match read_required_version(&path) {
            Ok(Some(v)) => {
                let v = strip_exact(&v);
                info!("Found required-version for uv in {}: {v}", path.display());
                return v;
            }
            Ok(None) => {}
            Err(e) => warn!("Error while parsing {}: {e}", path.display()),
        }
    }

    info!("Could not determine uv version from uv.toml or pyproject.toml. Falling back to latest.");
    LATEST.to_string()
}

/// Read a version from a `.tool-versions`, TOML or requirements file.
///
/// Parse failures are logged as warnings and yield `None`.
pub fn version_from_file(path: &Path) -> Option<String> {
    info!("Trying to find version for uv in: {}", path.display());
    if !path.exists() {
        info!("Could not find file: {}", path.display());
        return None;
    }

    match read_version(path) {
        Ok(Some(v)) => {
            let v = strip_exact(&v);
            info!("Found version for uv in {}: {v}", path.display());
            Some(v)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Error while parsing {}: {e}", path.display());
            None
        }
    }
}

fn read_version(path: &Path) -> Result<Option<String>, DiscoverError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let contents = std::fs::read_to_string(path)?;

    if name.ends_with(".tool-versions") {
        return version_from_tool_versions(&contents);
    }

    if name.ends_with(".txt") {
        return version_from_dependencies(contents.lines());
    }

    let is_pyproject = name.ends_with("pyproject.toml");
    let table: toml::Table = contents.parse()?;
    if name.ends_with(".toml") {
        if let Some(v) = required_version(&table, is_pyproject) {
            return Ok(Some(v));
        }
    }
    let deps = pyproject_dependencies(&table);
    version_from_dependencies(deps.iter().map(String::as_str))
}

fn read_required_version(path: &Path) -> Result<Option<String>, DiscoverError> {
    let contents = std::fs::read_to_string(path)?;
    let table: toml::Table = contents.parse()?;
    let is_pyproject = path
        .file_name()
        .is_some_and(|n| n.to_string_lossy().ends_with("pyproject.toml"));
    Ok(required_version(&table, is_pyproject))
}

fn strip_exact(v: &str) -> String {
    v.strip_prefix("==").unwrap_or(v).to_string()
}

/// First `uv <version>` line of a `.tool-versions` file.
pub fn version_from_tool_versions(contents: &str) -> Result<Option<String>, DiscoverError> {
    let re = Regex::new(r"^\s*uv\s*v?\s*(?P<version>[^\s]+)\s*$")?;
    for line in contents.lines() {
        if line.trim().starts_with('#') {
            continue;
        }
        if let Some(caps) = re.captures(line) {
            let version = caps["version"].trim();
            if version.starts_with("ref") {
                warn!("The ref syntax of .tool-versions is not supported. Please use a released version instead.");
                return Ok(None);
            }
            return Ok(Some(version.to_string()));
        }
    }
    Ok(None)
}

/// `required-version` at the top level, or under `[tool.uv]` for pyproject.
pub fn required_version(table: &toml::Table, is_pyproject: bool) -> Option<String> {
    let value = if is_pyproject {
        table.get("tool")?.get("uv")?.get("required-version")?
    } else {
        table.get("required-version")?
    };
    value.as_str().map(str::to_string)
}

/// Every string dependency declared in a pyproject: `project.dependencies`,
/// each `project.optional-dependencies` group, each `dependency-groups` group.
pub fn pyproject_dependencies(table: &toml::Table) -> Vec<String> {
    fn strings(v: Option<&toml::Value>) -> impl Iterator<Item = String> + '_ {
        v.and_then(toml::Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|d| d.as_str().map(str::to_string))
    }

    let project = table.get("project");
    let mut deps: Vec<String> = strings(project.and_then(|p| p.get("dependencies"))).collect();

    let groups = [
        project.and_then(|p| p.get("optional-dependencies")),
        table.get("dependency-groups"),
    ];
    for group in groups.into_iter().flatten() {
        if let Some(t) = group.as_table() {
            for value in t.values() {
                deps.extend(strings(Some(value)));
            }
        }
    }
    deps
}

/// Specifier of the first `uv` requirement, e.g. `uv==0.5.0` gives `==0.5.0`.
pub fn version_from_dependencies<'a>(
    deps: impl IntoIterator<Item = &'a str>,
) -> Result<Option<String>, DiscoverError> {
    let re = Regex::new(r"^uv([^A-Za-z0-9._-]+.*)$")?;
    Ok(deps.into_iter().find_map(|dep| {
        let caps = re.captures(dep.trim())?;
        let spec = caps[1]
            .split(';')
            .next()
            .unwrap_or_default()
            .split_whitespace()
            .next()?
            .trim_end_matches('\\')
            .to_string();
        (!spec.is_empty()).then_some(spec)
    }))
}

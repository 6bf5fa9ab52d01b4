//! CI runner command files.
//!
//! Outputs, exported variables, `PATH` entries and step state are appended to
//! the files named by `GITHUB_OUTPUT`, `GITHUB_ENV`, `GITHUB_PATH` and
//! `GITHUB_STATE`. Without a runner the values are only logged.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct Outputs {
    output: Option<PathBuf>,
    env: Option<PathBuf>,
    path: Option<PathBuf>,
    state: Option<PathBuf>,
}

impl Outputs {
    pub fn from_env() -> Self {
        let var = |name: &str| {
            std::env::var_os(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self {
            output: var("GITHUB_OUTPUT"),
            env: var("GITHUB_ENV"),
            path: var("GITHUB_PATH"),
            state: var("GITHUB_STATE"),
        }
    }

    /// Write everything into files under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            output: Some(dir.join("output")),
            env: Some(dir.join("env")),
            path: Some(dir.join("path")),
            state: Some(dir.join("state")),
        }
    }

    pub fn set_output(&self, name: &str, value: &str) -> std::io::Result<()> {
        info!("Output {name}={value}");
        append_pair(self.output.as_deref(), name, value)
    }

    /// Make `name` visible to later steps.
    pub fn export_variable(&self, name: &str, value: &str) -> std::io::Result<()> {
        info!("Set {name} to {value}");
        append_pair(self.env.as_deref(), name, value)
    }

    pub fn add_path(&self, dir: &Path) -> std::io::Result<()> {
        info!("Added {} to the path", dir.display());
        match self.path.as_deref() {
            Some(file) => append(file, &format!("{}\n", dir.display())),
            None => Ok(()),
        }
    }

    /// Record a value for the post-job step.
    pub fn save_state(&self, name: &str, value: &str) -> std::io::Result<()> {
        append_pair(self.state.as_deref(), name, value)
    }

    /// State recorded by the main step, exposed by the runner as `STATE_<name>`.
    pub fn get_state(name: &str) -> Option<String> {
        std::env::var(format!("STATE_{name}"))
            .ok()
            .filter(|v| !v.is_empty())
    }
}

fn append_pair(file: Option<&Path>, name: &str, value: &str) -> std::io::Result<()> {
    let Some(file) = file else {
        return Ok(());
    };
    if value.contains('\n') {
        let delimiter = format!("ghadelimiter_{}", std::process::id());
        append(file, &format!("{name}<<{delimiter}\n{value}\n{delimiter}\n"))
    } else {
        append(file, &format!("{name}={value}\n"))
    }
}

fn append(file: &Path, line: &str) -> std::io::Result<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(file)?;
    f.write_all(line.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn writes_command_files() {
        let dir = tempdir().unwrap();
        let out = Outputs::in_dir(dir.path());
        out.set_output("uv-version", "0.9.26").unwrap();
        out.set_output("cache-hit", "false").unwrap();
        out.export_variable("UV_CACHE_DIR", "/tmp/cache").unwrap();
        out.add_path(Path::new("/opt/uv")).unwrap();
        out.save_state("cache-key", "k").unwrap();

        let output = fs::read_to_string(dir.path().join("output")).unwrap();
        assert_eq!(output, "uv-version=0.9.26\ncache-hit=false\n");
        let env = fs::read_to_string(dir.path().join("env")).unwrap();
        assert_eq!(env, "UV_CACHE_DIR=/tmp/cache\n");
        assert_eq!(fs::read_to_string(dir.path().join("path")).unwrap(), "/opt/uv\n");
        assert_eq!(fs::read_to_string(dir.path().join("state")).unwrap(), "cache-key=k\n");
    }

    #[test]
    fn multiline_values_use_a_delimiter() {
        let dir = tempdir().unwrap();
        let out = Outputs::in_dir(dir.path());
        out.set_output("globs", "a\nb").unwrap();
        let output = fs::read_to_string(dir.path().join("output")).unwrap();
        assert!(output.starts_with("globs<<ghadelimiter_"));
        assert!(output.contains("\na\nb\n"));
    }

    #[test]
    fn without_files_nothing_is_written() {
        let out = Outputs::default();
        out.set_output("x", "y").unwrap();
        out.add_path(Path::new("/nowhere")).unwrap();
    }
}

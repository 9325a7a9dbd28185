//! Launching an external tool to compare two snapshots.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::info;
use thiserror::Error;

/// Diff launch failures.
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("no diff tool configured")]
    NotConfigured,

    #[error("snapshot not found: {0}")]
    MissingFile(PathBuf),

    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Opens two snapshot files side by side. Fire-and-forget.
pub trait DiffLauncher {
    fn launch(&self, left: &Path, right: &Path) -> Result<(), DiffError>;
}

/// Runs a configured program as `<tool> <left> <right>` and does not wait
/// for it.
#[derive(Debug, Clone)]
pub struct ExternalDiffTool {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalDiffTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// From the `diff_tool` setting, if any.
    pub fn from_config(program: Option<&Path>) -> Result<Self, DiffError> {
        program.map(Self::new).ok_or(DiffError::NotConfigured)
    }

    /// Extra arguments placed before the two paths.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl DiffLauncher for ExternalDiffTool {
    fn launch(&self, left: &Path, right: &Path) -> Result<(), DiffError> {
        for path in [left, right] {
            if !path.is_file() {
                return Err(DiffError::MissingFile(path.to_path_buf()));
            }
        }
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(left)
            .arg(right)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| DiffError::Spawn {
                tool: self.program.clone(),
                source,
            })?;
        info!(
            "started {} (pid {}) on {} and {}",
            self.program.display(),
            child.id(),
            left.display(),
            right.display()
        );
        Ok(())
    }
}

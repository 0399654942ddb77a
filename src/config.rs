//! On-disk configuration, loaded once at startup.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration, read from a TOML file named on the command
/// line (or at the default path).
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Directory containing one subdirectory per stratum, each rooted at
    /// that stratum's own `/`.
    pub strata_root: PathBuf,
    /// Where the unified namespace is mounted.
    pub mountpoint: PathBuf,
    /// Binary whose bytes the `bin` filter substitutes for a backing
    /// file's content.
    pub redirector_path: PathBuf,
    /// Binary inserted ahead of a rewritten `ini` exec line.
    pub launcher_path: PathBuf,
    /// Passed through to the FUSE mount as `-o allow_other`.
    #[serde(default)]
    pub allow_other: bool,
    /// Lines pre-applied to the routing table at startup, in the same
    /// syntax accepted by the control file.
    #[serde(default)]
    pub initial_routes: Vec<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }
}

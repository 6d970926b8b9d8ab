//! Layout of the persisted state directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Root of everything askweb writes between runs.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `explicit` if given, else the platform data directory.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        match explicit {
            Some(root) => Ok(Self::new(root)),
            None => dirs::data_dir()
                .map(|d| Self::new(d.join("askweb")))
                .context("no platform data directory; pass --data-dir"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn library(&self) -> PathBuf {
        self.root.join("library.json")
    }

    pub fn auth_info(&self) -> PathBuf {
        self.root.join("auth_info.json")
    }

    pub fn browser_state_dir(&self) -> PathBuf {
        self.root.join("browser_state")
    }

    pub fn state_file(&self) -> PathBuf {
        self.browser_state_dir().join("state.json")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }
}

//! The JSON graph-definition file `trnx run` loads: which plugin packages
//! to load and how to wire their ports together.
//!
//! Declarative end to end — `trnx` has no live API server to push wiring
//! commands to at runtime, so the whole topology is described up front and
//! handed to the control facade in one pass.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct EdgeSpec {
    pub producer: String,
    pub output: String,
    pub consumer: String,
    pub input: String,
}

#[derive(Debug, Deserialize)]
pub struct GraphSpec {
    /// Paths to `.plg` packages, resolved relative to the spec file's
    /// directory if not absolute.
    #[serde(default)]
    pub plugins: Vec<PathBuf>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

impl GraphSpec {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let mut spec: GraphSpec =
            serde_json::from_slice(&bytes).with_context(|| format!("malformed graph spec {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for plugin_path in &mut spec.plugins {
            if plugin_path.is_relative() {
                *plugin_path = base.join(&plugin_path);
            }
        }
        Ok(spec)
    }
}

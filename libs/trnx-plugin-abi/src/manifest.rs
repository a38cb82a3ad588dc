//! `plugin_manifest.json`: the metadata every `.plg` package carries
//! alongside its compiled library. `entry_point` uses a
//! `"<library-file-stem>:<exported-symbol>"` format naming the dynamic
//! library and the factory symbol it exports.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MANIFEST_FILE_NAME: &str = "plugin_manifest.json";

/// The kinds of plugin the original system distinguished by base class
/// (`ExchangeInterface`, data/feature/signal processors, strategies,
/// models). Purely descriptive — nothing in the loader branches on it —
/// but carried through so a plugin registry UI or `trnx-cli list` can
/// group installed plugins meaningfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginCategory {
    ExchangeInterface,
    DataProcessor,
    Indicator,
    Feature,
    Signal,
    Strategy,
    Model,
}

impl std::fmt::Display for PluginCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PluginCategory::ExchangeInterface => "exchange_interface",
            PluginCategory::DataProcessor => "data_processor",
            PluginCategory::Indicator => "indicator",
            PluginCategory::Feature => "feature",
            PluginCategory::Signal => "signal",
            PluginCategory::Strategy => "strategy",
            PluginCategory::Model => "model",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    /// `"<library-file-stem>:<exported-symbol>"`. The symbol is almost
    /// always `TRNX_PLUGIN` — the field stays free-form so a single `.plg`
    /// could in principle bundle more than one library in the future.
    pub entry_point: String,
    #[serde(default)]
    pub category: Option<PluginCategory>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    /// Advisory only — the loader never resolves these, same as the
    /// original system's `requirements.txt`.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("entry_point '{0}' is not of the form '<library-stem>:<symbol>'")]
    MalformedEntryPoint(String),
}

impl PluginManifest {
    /// Split `entry_point` into its library-stem and symbol components.
    pub fn entry_point_parts(&self) -> Result<(&str, &str), ManifestError> {
        self.entry_point
            .split_once(':')
            .filter(|(lib, sym)| !lib.is_empty() && !sym.is_empty())
            .ok_or_else(|| ManifestError::MalformedEntryPoint(self.entry_point.clone()))
    }
}

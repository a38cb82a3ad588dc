//! Resolves where the `new`/`pack` tooling commands write generated
//! artifacts when the caller doesn't name an explicit directory.
//!
//! Resolution order: `TRNX_HOME` environment variable (explicit override),
//! then `XDG_CONFIG_HOME/trnx` (XDG compliance), then `~/.trnx` (default).
//! This is config for the tooling only — the graph itself takes no
//! config file.

use std::path::PathBuf;

pub fn trnx_home() -> PathBuf {
    if let Ok(home) = std::env::var("TRNX_HOME") {
        return PathBuf::from(home);
    }

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("trnx");
    }

    let home = std::env::var("HOME").expect("could not determine home directory");
    PathBuf::from(home).join(".trnx")
}

/// Where `trnx new` writes a scaffold when `--output-dir` is omitted.
pub fn plugin_scaffold_dir() -> PathBuf {
    trnx_home().join("plugins")
}

/// Where `trnx pack` writes a `.plg` archive when `--output-dir` is omitted.
pub fn packaged_plugin_dir() -> PathBuf {
    trnx_home().join("packages")
}

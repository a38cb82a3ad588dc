//! `trnx pack`: zip a built plugin crate into a distributable `.plg`
//! archive. Thin wrapper over `trnx_plugin_abi::template::package_plugin`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use trnx_plugin_abi::home::packaged_plugin_dir;
use trnx_plugin_abi::template::package_plugin;

pub fn run(plugin_dir: &Path, output_dir: Option<&Path>) -> Result<()> {
    let output_dir: PathBuf = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => packaged_plugin_dir(),
    };
    std::fs::create_dir_all(&output_dir)?;
    let plg_path = package_plugin(plugin_dir, &output_dir)?;
    println!("Created: {}", plg_path.display());
    Ok(())
}

//! `trnx new`: scaffold a plugin crate. Thin wrapper over
//! `trnx_plugin_abi::template`; all the actual generation logic lives there
//! so library consumers get it without going through the CLI.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use trnx_plugin_abi::home::plugin_scaffold_dir;
use trnx_plugin_abi::manifest::PluginCategory;
use trnx_plugin_abi::template::create_template;

fn parse_category(s: &str) -> Result<PluginCategory> {
    Ok(match s {
        "exchange_interface" => PluginCategory::ExchangeInterface,
        "data_processor" => PluginCategory::DataProcessor,
        "indicator" => PluginCategory::Indicator,
        "feature" => PluginCategory::Feature,
        "signal" => PluginCategory::Signal,
        "strategy" => PluginCategory::Strategy,
        "model" => PluginCategory::Model,
        other => bail!(
            "unknown plugin category '{other}'; expected one of: exchange_interface, \
             data_processor, indicator, feature, signal, strategy, model"
        ),
    })
}

pub fn run(name: &str, category: &str, output_dir: Option<&Path>) -> Result<()> {
    let category = parse_category(category)?;
    let output_dir: PathBuf = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => plugin_scaffold_dir(),
    };
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let root = create_template(name, category, &output_dir)?;
    println!("Created plugin scaffold: {}", root.display());
    println!("  Category: {category}");
    println!("  Next: cargo build --release -p {name}, then `trnx pack {}`", root.display());
    Ok(())
}

//! Scaffolding for new plugins: generate a buildable cdylib crate and
//! package its compiled output into a `.plg`. The generated crate
//! implements `trnx_core::Plugin` and exports it with `export_plugin!`.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::manifest::PluginCategory;

/// Convert a snake_case plugin name to CamelCase for use as a Rust type
/// name, e.g. `"order_book_depth"` -> `"OrderBookDepth"`.
pub fn to_camel_case(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Create a new plugin crate scaffold under `output_dir/<name>/`: a
/// `Cargo.toml` configured as a `cdylib`, a `src/lib.rs` stub implementing
/// `trnx_core::Plugin` for the chosen category, and a `plugin_manifest.json`
/// ready to package once built. Returns the scaffold's root directory.
pub fn create_template(name: &str, category: PluginCategory, output_dir: &Path) -> Result<PathBuf> {
    let root = output_dir.join(name);
    std::fs::create_dir_all(root.join("src")).with_context(|| format!("failed to create {}", root.display()))?;

    let class_name = to_camel_case(name);

    let manifest = serde_json::json!({
        "name": name,
        "version": "0.1.0",
        "entry_point": format!("{name}:TRNX_PLUGIN"),
        "category": category,
        "description": format!("Template for a plugin of category {category}."),
    });
    std::fs::write(
        root.join(crate::manifest::MANIFEST_FILE_NAME),
        serde_json::to_vec_pretty(&manifest)?,
    )?;

    std::fs::write(root.join("Cargo.toml"), cargo_toml(name))?;
    std::fs::write(root.join("src/lib.rs"), lib_rs(&class_name, category))?;

    Ok(root)
}

fn cargo_toml(name: &str) -> String {
    format!(
        r#"[package]
name = "{name}"
version = "0.1.0"
edition = "2021"

[lib]
crate-type = ["cdylib"]

[dependencies]
trnx-core = {{ path = "../../libs/trnx-core" }}
trnx-plugin-abi = {{ path = "../../libs/trnx-plugin-abi" }}
anyhow = "1.0"
tracing = "0.1"
"#
    )
}

/// Generate the scaffold's `src/lib.rs`. The category distinguishes what
/// ports the stub pre-declares and what inherent stub methods it carries,
/// mirroring how the original system's factory branched on base class:
/// `ExchangeInterface` scaffolds pre-declare market-data fetch methods and a
/// `ticker` output, every other category gets the same generic empty-port
/// stub.
fn lib_rs(class_name: &str, category: PluginCategory) -> String {
    let (extra_imports, declare_outputs_body, extra_methods) = match category {
        PluginCategory::ExchangeInterface => (
            "use trnx_core::{Shape, ElemType};\n",
            r#"        let mut outputs = HashMap::new();
        outputs.insert("ticker".to_string(), PortDescriptor::new(Shape::new(vec![2]), ElemType::F64));
        outputs"#
                .to_string(),
            r#"
impl CLASS_NAME {
    fn fetch_ticker(&self) {
        tracing::info!("fetch_ticker not yet implemented");
        todo!("query the exchange for the latest ticker")
    }

    fn fetch_ohlcv(&self) {
        tracing::info!("fetch_ohlcv not yet implemented");
        todo!("query the exchange for OHLCV candles")
    }

    fn fetch_recent_trades(&self) {
        tracing::info!("fetch_recent_trades not yet implemented");
        todo!("query the exchange for the recent trade tape")
    }

    fn fetch_order_book(&self) {
        tracing::info!("fetch_order_book not yet implemented");
        todo!("query the exchange for order book depth")
    }

    fn fetch_market_status(&self) {
        tracing::info!("fetch_market_status not yet implemented");
        todo!("query the exchange for market/trading status")
    }

    fn fetch_24h_volume(&self) {
        tracing::info!("fetch_24h_volume not yet implemented");
        todo!("query the exchange for rolling 24h volume")
    }
}
"#
            .replace("CLASS_NAME", class_name),
        ),
        _ => (
            "",
            r#"        // Declare provided output ports here.
        HashMap::new()"#
                .to_string(),
            String::new(),
        ),
    };

    format!(
        r#"use std::any::Any;
use std::collections::HashMap;
use std::path::{{Path, PathBuf}};

use trnx_core::{{Plugin, PortDescriptor, Result, SharedRegion}};
use trnx_plugin_abi::export_plugin;
{extra_imports}
#[derive(Default)]
pub struct {class_name} {{
    bound_inputs: HashMap<String, SharedRegion>,
    bound_outputs: HashMap<String, SharedRegion>,
    source_path: Option<PathBuf>,
}}

impl Plugin for {class_name} {{
    fn class_name(&self) -> &str {{
        "{class_name}"
    }}

    fn declare_inputs(&self) -> HashMap<String, PortDescriptor> {{
        // Declare required input ports here.
        HashMap::new()
    }}

    fn declare_outputs(&self) -> HashMap<String, PortDescriptor> {{
{declare_outputs_body}
    }}

    fn bind_input(&mut self, name: &str, region: SharedRegion) -> Result<()> {{
        self.bound_inputs.insert(name.to_string(), region);
        Ok(())
    }}

    fn bind_output(&mut self, name: &str, region: SharedRegion) -> Result<()> {{
        self.bound_outputs.insert(name.to_string(), region);
        Ok(())
    }}

    fn verify(&self) -> Result<()> {{
        Ok(())
    }}

    fn process(&mut self) -> anyhow::Result<()> {{
        // Read bound_inputs, compute, write bound_outputs.
        Ok(())
    }}

    fn as_any_mut(&mut self) -> &mut dyn Any {{
        self
    }}

    fn set_source_path(&mut self, path: PathBuf) {{
        self.source_path = Some(path);
    }}

    fn source_path(&self) -> Option<&Path> {{
        self.source_path.as_deref()
    }}
}}
{extra_methods}
export_plugin!({class_name});
"#
    )
}

/// Zip `plugin_dir` (as produced by [`create_template`], after its
/// `cdylib` has been built) into a `.plg` at `output_dir`. The built
/// library file, if present, is expected alongside the manifest in
/// `plugin_dir` — callers typically copy
/// `target/release/lib<name>.{so,dylib,dll}` there before packaging.
pub fn package_plugin(plugin_dir: &Path, output_dir: &Path) -> Result<PathBuf> {
    let base_name = plugin_dir
        .file_name()
        .and_then(|n| n.to_str())
        .context("plugin directory has no usable name")?;
    let plg_path = output_dir.join(format!("{base_name}.plg"));

    let file = std::fs::File::create(&plg_path).with_context(|| format!("failed to create {}", plg_path.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in walk_files(plugin_dir)? {
        let relative = entry
            .strip_prefix(plugin_dir)
            .expect("walked entry is under plugin_dir")
            .to_string_lossy()
            .replace('\\', "/");
        let contents = std::fs::read(&entry).with_context(|| format!("failed to read {}", entry.display()))?;
        zip.start_file(&relative, options)?;
        zip.write_all(&contents)?;
    }
    zip.finish()?;

    Ok(plg_path)
}

fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            files.extend(walk_files(&path)?);
        } else {
            files.push(path);
        }
    }
    Ok(files)
}

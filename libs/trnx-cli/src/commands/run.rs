//! `trnx run`: load a graph spec, load its plugin packages, wire the
//! declared edges, build, and drive the runner until Ctrl+C. Maps
//! end-to-end onto the control facade's verbs: `start_new`, `load_plugin`
//! (once per package), `connect` (once per edge), `build`, `run`,
//! `shutdown`.

use std::path::Path;

use anyhow::{Context, Result};
use trnx_core::ControlFacade;
use trnx_plugin_abi::package::PluginLoader;

use crate::graph_spec::GraphSpec;

pub fn run(graph_file: &Path) -> Result<()> {
    let spec = GraphSpec::load(graph_file)?;

    // `loader` owns every loaded dynamic library for the lifetime of the
    // run — the plugin instances it hands to the facade hold vtable
    // pointers into those libraries, so it must outlive `facade.run()`.
    let mut loader = PluginLoader::new();
    let mut facade = ControlFacade::new();
    let graph_name = graph_file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("graph");
    facade.start_new(graph_name)?;

    for plugin_path in &spec.plugins {
        let loaded = loader
            .load(plugin_path)
            .with_context(|| format!("failed to load plugin package {}", plugin_path.display()))?;
        tracing::info!(plugin = %loaded.manifest.name, path = %plugin_path.display(), "loaded plugin");
        facade.load_plugin(loaded.plugin)?;
    }

    for edge in &spec.edges {
        facade.connect(&edge.producer, &edge.output, &edge.consumer, &edge.input)?;
    }

    facade.build()?;
    tracing::info!("graph built, starting runner");

    let cancel = facade.cancellation_token();
    ctrlc::set_handler(move || {
        tracing::info!("Ctrl+C received, stopping runner after the plugin currently executing");
        cancel.cancel();
    })
    .context("failed to install Ctrl+C handler")?;

    facade.run()?;
    facade.shutdown();
    tracing::info!("runner stopped, regions unlinked");
    Ok(())
}

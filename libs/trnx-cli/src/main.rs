//! `trnx`: the command-line front-end over the control facade.
//!
//! A thin request translator: every subcommand maps to one or more of the
//! control facade's verbs (`start_new`, `load_plugin`, `connect`, `build`,
//! `run`, `shutdown`) plus the two package-tooling conveniences (`new`,
//! `pack`) that never touch a live graph.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod graph_spec;

#[derive(Parser)]
#[command(name = "trnx")]
#[command(author, version, about = "Plugin-composed data-flow runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold a new plugin crate
    New {
        /// Plugin name, snake_case (e.g. "order_book_depth")
        name: String,

        /// Built-in plugin category to stub operations for
        #[arg(long, default_value = "indicator")]
        category: String,

        /// Directory the plugin crate scaffold is written into. Defaults to
        /// the TrnxHome plugin-scaffold directory (`trnx_plugin_abi::home`).
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Package a built plugin crate into a `.plg` archive
    Pack {
        /// Path to the plugin crate directory (containing plugin_manifest.json
        /// and the compiled cdylib alongside it)
        plugin_dir: PathBuf,

        /// Directory the `.plg` archive is written into. Defaults to the
        /// TrnxHome packaged-plugin directory (`trnx_plugin_abi::home`).
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Load a graph from a JSON spec, build it, and run it until Ctrl+C
    Run {
        /// Path to the graph spec file (see graph_spec::GraphSpec)
        graph_file: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::New {
            name,
            category,
            output_dir,
        } => commands::new::run(&name, &category, output_dir.as_deref()),
        Commands::Pack { plugin_dir, output_dir } => commands::pack::run(&plugin_dir, output_dir.as_deref()),
        Commands::Run { graph_file } => commands::run::run(&graph_file),
    }
}

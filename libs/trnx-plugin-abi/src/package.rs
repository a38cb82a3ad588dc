//! `.plg` package loading: unzip to a scratch directory, read the
//! manifest, load the compiled library, and hand back a ready plugin
//! instance. Every loaded `Library` is kept alive for the runtime's
//! lifetime; loading a whole directory of packages survives a single
//! file's failure without aborting the rest.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use libloading::Library;
use tempfile::TempDir;
use thiserror::Error;

use crate::manifest::{PluginManifest, MANIFEST_FILE_NAME};
use crate::{PluginDeclaration, Plugin, TRNX_ABI_VERSION};

/// Package-loading error kinds, surfaced as a stable `code()` tag the same
/// way `trnx_core::TrnxError` is, one layer up through `anyhow` since the
/// loader composes several fallible steps (archive I/O, JSON parsing,
/// dynamic loading) that each want their own `.context()`.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("{0} is not a valid .plg (zip) archive")]
    InvalidArchive(String),
    #[error("no {MANIFEST_FILE_NAME} found at the package root or in its sole top-level directory")]
    ManifestMissing,
    #[error("malformed {MANIFEST_FILE_NAME}: {0}")]
    ManifestInvalid(String),
    /// Spec's `EntryModuleMissing`, reinterpreted for a compiled target: the
    /// manifest names a library stem the package doesn't actually contain.
    #[error("entry_point names library '{0}' but it is not present in the package")]
    EntryModuleMissing(String),
    /// Spec's `EntryClassMissing`: the named exported symbol isn't in the
    /// library.
    #[error("library does not export the '{0}' symbol named by entry_point")]
    EntryClassMissing(String),
    /// Spec's `EntryClassNotAPlugin`: the symbol exists but doesn't satisfy
    /// the plugin contract — for a compiled target that's an ABI version
    /// mismatch rather than a missing trait impl, since the trait impl is
    /// checked by the host's own compiler at `export_plugin!` call sites.
    #[error("plugin was built against ABI v{0}, host expects v{1}")]
    EntryClassNotAPlugin(u32, u32),
}

impl PackageError {
    /// Stable string tag, independent of the human-readable message —
    /// matches `TrnxError::code`'s contract: identical inputs produce
    /// identical error tags.
    pub fn code(&self) -> &'static str {
        match self {
            PackageError::InvalidArchive(_) => "invalid_archive",
            PackageError::ManifestMissing => "manifest_missing",
            PackageError::ManifestInvalid(_) => "manifest_invalid",
            PackageError::EntryModuleMissing(_) => "entry_module_missing",
            PackageError::EntryClassMissing(_) => "entry_class_missing",
            PackageError::EntryClassNotAPlugin(..) => "entry_class_not_a_plugin",
        }
    }
}

/// A plugin loaded from a `.plg` package: its manifest plus a ready
/// instance constructed via the library's exported factory.
pub struct LoadedPlugin {
    pub manifest: PluginManifest,
    pub plugin: Box<dyn Plugin>,
    pub source_path: PathBuf,
}

/// Locate `plugin_manifest.json` under `extraction_root`: first directly in
/// it, then — if absent and the root contains exactly one subdirectory —
/// one level into that subdirectory (packaging tools commonly wrap a
/// project in a single top-level folder before zipping).
fn find_manifest_dir(extraction_root: &Path) -> Result<PathBuf, PackageError> {
    if extraction_root.join(MANIFEST_FILE_NAME).is_file() {
        return Ok(extraction_root.to_path_buf());
    }

    let mut subdirs = std::fs::read_dir(extraction_root)
        .ok()
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir());
    let Some(only) = subdirs.next() else {
        return Err(PackageError::ManifestMissing);
    };
    if subdirs.next().is_some() {
        return Err(PackageError::ManifestMissing);
    }
    if only.join(MANIFEST_FILE_NAME).is_file() {
        Ok(only)
    } else {
        Err(PackageError::ManifestMissing)
    }
}

/// Loads `.plg` packages and keeps their backing libraries (and the
/// scratch directories their compiled objects were extracted into) alive
/// for as long as the loader itself lives. Dropping a loaded plugin's
/// library while it's still in use would be a use-after-free.
#[derive(Default)]
pub struct PluginLoader {
    loaded_libraries: Vec<Library>,
    scratch_dirs: Vec<TempDir>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one `.plg` file: extract it to a fresh scratch directory, read
    /// its manifest, load its compiled library, verify the ABI version,
    /// and construct an instance via the exported factory.
    pub fn load(&mut self, plg_path: &Path) -> Result<LoadedPlugin> {
        let scratch = tempfile::tempdir().context("failed to create plugin scratch directory")?;

        let file = File::open(plg_path).with_context(|| format!("failed to open {}", plg_path.display()))?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|_| PackageError::InvalidArchive(plg_path.display().to_string()))
            .with_context(|| format!("failed to read {}", plg_path.display()))?;
        archive
            .extract(scratch.path())
            .with_context(|| format!("failed to extract {}", plg_path.display()))?;

        let manifest_dir = find_manifest_dir(scratch.path())?;
        let manifest_bytes = std::fs::read(manifest_dir.join(MANIFEST_FILE_NAME))
            .with_context(|| format!("failed to read {MANIFEST_FILE_NAME} in {}", plg_path.display()))?;
        let manifest: PluginManifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| PackageError::ManifestInvalid(e.to_string()))
            .with_context(|| format!("{} has a malformed {MANIFEST_FILE_NAME}", plg_path.display()))?;

        let (stem, symbol) = manifest
            .entry_point_parts()
            .map_err(|e| PackageError::ManifestInvalid(e.to_string()))
            .with_context(|| format!("plugin '{}' has an invalid entry_point", manifest.name))?;
        let lib_path = manifest_dir.join(platform_library_filename(stem));
        if !lib_path.exists() {
            return Err(PackageError::EntryModuleMissing(stem.to_string())).with_context(|| {
                format!(
                    "plugin '{}' manifest names library '{}', expected at {}",
                    manifest.name,
                    stem,
                    lib_path.display()
                )
            });
        }

        // Safety: the library is extracted from a package trusted by the
        // caller (plugins run with the host's full privileges, same as
        // the original's dynamic module import).
        let lib = unsafe {
            Library::new(&lib_path).with_context(|| format!("failed to load library {}", lib_path.display()))?
        };

        let symbol_name = format!("{symbol}\0");
        // Safety: `decl` is read immediately and not retained past this
        // call; the backing `Library` outlives it via `self.loaded_libraries`.
        let decl: PluginDeclaration = unsafe {
            let sym = match lib.get::<*const PluginDeclaration>(symbol_name.as_bytes()) {
                Ok(sym) => sym,
                Err(_) => {
                    return Err(PackageError::EntryClassMissing(symbol.to_string())).with_context(|| {
                        format!(
                            "plugin '{}' missing '{symbol}' symbol; was it built with export_plugin!?",
                            manifest.name
                        )
                    })
                }
            };
            std::ptr::read(*sym)
        };

        if decl.abi_version != TRNX_ABI_VERSION {
            return Err(PackageError::EntryClassNotAPlugin(decl.abi_version, TRNX_ABI_VERSION))
                .with_context(|| format!("plugin '{}' failed ABI version check", manifest.name));
        }

        let mut plugin = (decl.factory)();
        plugin.set_source_path(plg_path.to_path_buf());

        self.loaded_libraries.push(lib);
        self.scratch_dirs.push(scratch);

        Ok(LoadedPlugin {
            manifest,
            plugin,
            source_path: plg_path.to_path_buf(),
        })
    }

    /// Load every `.plg` file directly inside `dir`. One package failing
    /// to load is logged and skipped; it does not stop the rest.
    pub fn load_dir(&mut self, dir: &Path) -> Result<Vec<LoadedPlugin>> {
        let mut loaded = Vec::new();
        let entries = std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("plg") {
                continue;
            }
            match self.load(&path) {
                Ok(plugin) => {
                    tracing::info!(plugin = %plugin.manifest.name, path = %path.display(), "loaded plugin");
                    loaded.push(plugin);
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to load plugin package");
                }
            }
        }
        Ok(loaded)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded_libraries.len()
    }
}

/// The compiled library filename a manifest's library stem maps to on the
/// current platform.
fn platform_library_filename(stem: &str) -> String {
    if cfg!(target_os = "macos") {
        format!("lib{stem}.dylib")
    } else if cfg!(target_os = "windows") {
        format!("{stem}.dll")
    } else {
        format!("lib{stem}.so")
    }
}

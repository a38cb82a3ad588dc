//! ABI-stable plugin interface and `.plg` package format for dynamic
//! plugin loading. Each loaded library exports exactly one plugin
//! instance via a single boxed-trait-object factory, rather than a
//! family of registered types.

pub mod home;
pub mod manifest;
pub mod package;
pub mod template;

pub use trnx_core::Plugin;

/// Current ABI version. A `.plg`'s compiled library must report this
/// exact value in its `TRNX_PLUGIN` declaration or loading fails — there
/// is deliberately no forward/backward compatibility story, matching
/// `STREAMLIB_ABI_VERSION`'s exact-match requirement.
pub const TRNX_ABI_VERSION: u32 = 1;

/// Constructs a fresh boxed plugin instance. `extern "C"` here only fixes
/// the calling convention across the dylib boundary (same toolchain on
/// both sides, since `.plg` libraries are compiled against this exact
/// crate version); the `Box<dyn Plugin>` return value is not a portable
/// C type, which is why `export_plugin!` allows `improper_ctypes_definitions`
/// at the definition site.
pub type PluginFactoryFn = extern "C" fn() -> Box<dyn Plugin>;

/// Symbol every plugin dynamic library must export under the name
/// `TRNX_PLUGIN`. Use [`export_plugin!`] to generate it correctly.
#[repr(C)]
pub struct PluginDeclaration {
    pub abi_version: u32,
    pub factory: PluginFactoryFn,
}

// Safety: contains only a version number and a function pointer, both Send + Sync.
unsafe impl Send for PluginDeclaration {}
unsafe impl Sync for PluginDeclaration {}

/// Generate the `TRNX_PLUGIN` symbol a `.plg` library must export.
///
/// ```ignore
/// use trnx_plugin_abi::export_plugin;
///
/// export_plugin!(MyPlugin);
/// ```
///
/// `MyPlugin` must implement `Default` (the factory constructs it with no
/// arguments; ports and state are set up lazily in `declare_inputs`/
/// `declare_outputs`) and `trnx_core::Plugin`.
#[macro_export]
macro_rules! export_plugin {
    ($plugin_ty:ty) => {
        #[allow(improper_ctypes_definitions)]
        extern "C" fn __trnx_plugin_factory() -> Box<dyn $crate::Plugin> {
            Box::new(<$plugin_ty as ::std::default::Default>::default())
        }

        #[no_mangle]
        pub static TRNX_PLUGIN: $crate::PluginDeclaration = $crate::PluginDeclaration {
            abi_version: $crate::TRNX_ABI_VERSION,
            factory: __trnx_plugin_factory,
        };
    };
}

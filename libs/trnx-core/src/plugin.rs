//! The plugin contract: the capability set every loadable plugin must
//! implement.

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, TrnxError};
use crate::port::{PortDescriptor, Tensor};
use crate::region::SharedRegion;

/// A polymorphic unit of computation with typed input and output ports.
///
/// Implementors declare their ports once (idempotently) and are driven by
/// the runner one `process()` call per tick. `class_name` is the human
/// label used in wiring commands and region naming — it must be stable for
/// the lifetime of the instance.
pub trait Plugin: Send {
    /// Human label used in wiring commands and region naming.
    fn class_name(&self) -> &str;

    /// Populate and return this plugin's required input ports. Called once
    /// by the loader immediately after instantiation; implementations
    /// should be idempotent since nothing prevents a second call.
    fn declare_inputs(&self) -> HashMap<String, PortDescriptor>;

    /// Populate and return this plugin's provided output ports. See
    /// [`Plugin::declare_inputs`] for the idempotence note.
    fn declare_outputs(&self) -> HashMap<String, PortDescriptor>;

    /// Record that `name` is bound to `region`. Fails with `UnknownPort` if
    /// `name` is not a declared input.
    fn bind_input(&mut self, name: &str, region: SharedRegion) -> Result<()>;

    /// Record that `name` is bound to `region`. Fails with `UnknownPort` if
    /// `name` is not a declared output.
    fn bind_output(&mut self, name: &str, region: SharedRegion) -> Result<()>;

    /// Assert every required input is bound. Called once per plugin during
    /// build, after all regions for the graph have been materialized.
    fn verify(&self) -> Result<()>;

    /// Read bound inputs, compute, write bound outputs. Called once per
    /// tick by the runner, in topological order. Plugin-defined errors must
    /// not propagate past this call — the runner logs and continues (see
    /// [`crate::runner::Runner`]).
    fn process(&mut self) -> anyhow::Result<()>;

    /// Enable downcasting to a concrete plugin type for diagnostics.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Record where this instance was loaded from, for diagnostics. Called
    /// once by the package loader right after instantiation; plugins loaded
    /// by other means (native, in-process) may never receive this call.
    /// Default is a no-op so existing implementors aren't forced to track
    /// it.
    fn set_source_path(&mut self, _path: PathBuf) {}

    /// The path recorded by `set_source_path`, if any.
    fn source_path(&self) -> Option<&Path> {
        None
    }
}

/// Helper bookkeeping for the common case of a plugin with declared port
/// maps and bound-region maps: every bound name must be a key of the
/// corresponding descriptor map.
///
/// Native plugins can embed this and delegate `bind_input`/`bind_output`/
/// `verify` to it rather than re-implementing the bookkeeping themselves.
#[derive(Default)]
pub struct PluginPorts {
    required_inputs: HashMap<String, PortDescriptor>,
    provided_outputs: HashMap<String, PortDescriptor>,
    bound_inputs: HashMap<String, SharedRegion>,
    bound_outputs: HashMap<String, SharedRegion>,
    source_path: Option<PathBuf>,
}

impl PluginPorts {
    pub fn new(
        required_inputs: HashMap<String, PortDescriptor>,
        provided_outputs: HashMap<String, PortDescriptor>,
    ) -> Self {
        Self {
            required_inputs,
            provided_outputs,
            bound_inputs: HashMap::new(),
            bound_outputs: HashMap::new(),
            source_path: None,
        }
    }

    pub fn required_inputs(&self) -> &HashMap<String, PortDescriptor> {
        &self.required_inputs
    }

    pub fn provided_outputs(&self) -> &HashMap<String, PortDescriptor> {
        &self.provided_outputs
    }

    pub fn bind_input(&mut self, plugin_class: &str, name: &str, region: SharedRegion) -> Result<()> {
        if !self.required_inputs.contains_key(name) {
            return Err(TrnxError::UnknownPort {
                plugin: plugin_class.to_string(),
                port: name.to_string(),
            });
        }
        self.bound_inputs.insert(name.to_string(), region);
        Ok(())
    }

    pub fn bind_output(&mut self, plugin_class: &str, name: &str, region: SharedRegion) -> Result<()> {
        if !self.provided_outputs.contains_key(name) {
            return Err(TrnxError::UnknownPort {
                plugin: plugin_class.to_string(),
                port: name.to_string(),
            });
        }
        self.bound_outputs.insert(name.to_string(), region);
        Ok(())
    }

    /// Every key in `required_inputs` must appear in `bound_inputs`.
    /// `provided_outputs` keys may be unbound — an output with no declared
    /// consumer is legal and silently dropped.
    pub fn verify(&self, plugin_class: &str) -> Result<()> {
        for name in self.required_inputs.keys() {
            if !self.bound_inputs.contains_key(name) {
                return Err(TrnxError::UnboundInput {
                    plugin: plugin_class.to_string(),
                    port: name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn input_region(&self, name: &str) -> Option<&SharedRegion> {
        self.bound_inputs.get(name)
    }

    pub fn output_region(&self, name: &str) -> Option<&SharedRegion> {
        self.bound_outputs.get(name)
    }

    /// Convenience for a plugin's `process()`: read the current tensor on a
    /// bound input, or `None` if that input has no producer connected.
    pub fn read_input(&self, name: &str) -> Option<Tensor> {
        self.bound_inputs.get(name).map(SharedRegion::read)
    }

    /// Convenience for a plugin's `process()`: write a tensor to a bound
    /// output. A no-op (not an error) if nothing consumes that output, since
    /// unconsumed outputs never get a region in the first place.
    pub fn write_output(&self, name: &str, tensor: &Tensor) -> Result<()> {
        match self.bound_outputs.get(name) {
            Some(region) => region.write(tensor),
            None => Ok(()),
        }
    }

    pub fn set_source_path(&mut self, path: PathBuf) {
        self.source_path = Some(path);
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{ElemType, Shape};

    fn descriptor() -> PortDescriptor {
        PortDescriptor::new(Shape::new(vec![1]), ElemType::F64)
    }

    #[test]
    fn bind_input_rejects_unknown_port() {
        let mut ports = PluginPorts::new(HashMap::new(), HashMap::new());
        let region = SharedRegion::create("test_bind_unknown", Shape::new(vec![1]), ElemType::F64).unwrap();
        let err = ports.bind_input("Alpha", "missing", region).unwrap_err();
        assert_eq!(err.code(), "unknown_port");
    }

    #[test]
    fn verify_fails_when_required_input_unbound() {
        let mut required = HashMap::new();
        required.insert("data".to_string(), descriptor());
        let ports = PluginPorts::new(required, HashMap::new());
        let err = ports.verify("Beta").unwrap_err();
        assert_eq!(err.code(), "unbound_input");
    }

    #[test]
    fn verify_succeeds_once_all_required_inputs_bound() {
        let mut required = HashMap::new();
        required.insert("data".to_string(), descriptor());
        let mut ports = PluginPorts::new(required, HashMap::new());
        let region = SharedRegion::create("test_bind_ok", Shape::new(vec![1]), ElemType::F64).unwrap();
        ports.bind_input("Beta", "data", region).unwrap();
        assert!(ports.verify("Beta").is_ok());
    }

    #[test]
    fn unconsumed_outputs_stay_legally_unbound() {
        let mut provided = HashMap::new();
        provided.insert("data".to_string(), descriptor());
        let ports = PluginPorts::new(HashMap::new(), provided);
        assert!(ports.verify("Alpha").is_ok());
        assert!(ports.output_region("data").is_none());
    }
}

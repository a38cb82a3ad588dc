//! Graph assembly and execution engine for plugin-composed data-flow
//! pipelines: typed ports, shared-memory edges, a topologically ordered
//! build step, and a single-threaded tick-loop runner.

pub mod error;
pub mod facade;
pub mod graph;
pub mod identity;
pub mod plugin;
pub mod port;
pub mod region;
pub mod runner;

pub use error::{Result, TrnxError};
pub use facade::ControlFacade;
pub use graph::{ConnectionTopology, Edge, Graph, GraphState, NodeInfo};
pub use identity::IdentifierService;
pub use plugin::{Plugin, PluginPorts};
pub use port::{ElemType, PortDescriptor, Shape, Tensor};
pub use region::{region_name, region_os_name, SharedRegion};
pub use runner::{CancellationToken, Runner};

//! The graph assembler: a plugin registry plus a declarative edge list
//! that compiles, once, into a topologically ordered execution plan backed
//! by shared-memory regions. Ordering uses Kahn's algorithm with a
//! deterministic tie-break so a fixed load/connect sequence always
//! produces the same execution order.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{Result, TrnxError};
use crate::identity::IdentifierService;
use crate::plugin::Plugin;
use crate::region::{region_name, SharedRegion};

/// The assembler's lifecycle. A graph only accepts topology edits in
/// `Open`; `build()` is the one-way `Open -> Built` transition. There is no
/// `Built -> Open` transition — a graph that needs new wiring is discarded
/// and replaced (see [`crate::facade::ControlFacade`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Init,
    Open,
    Built,
}

/// One declared producer-output -> consumer-input wire.
#[derive(Debug, Clone)]
pub struct Edge {
    pub producer: String,
    pub output: String,
    pub consumer: String,
    pub input: String,
}

/// A single node's wiring, for diagnostics (`to_graphviz`, error messages).
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub class_name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Read-only view of a graph's declared topology, independent of whether it
/// has been built yet.
pub struct ConnectionTopology<'a> {
    nodes: Vec<NodeInfo>,
    edges: &'a [Edge],
}

impl<'a> ConnectionTopology<'a> {
    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        self.edges
    }

    /// Render as a Graphviz `digraph` for debugging.
    pub fn to_graphviz(&self) -> String {
        let mut out = String::from("digraph trnx {\n");
        for node in &self.nodes {
            out.push_str(&format!("  \"{}\";\n", node.class_name));
        }
        for edge in self.edges {
            out.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}.{}\"];\n",
                edge.producer, edge.consumer, edge.output, edge.input
            ));
        }
        out.push_str("}\n");
        out
    }
}

/// The graph assembler: plugin registry, declared edges, and — once built —
/// the materialized regions and execution order the runner drives.
pub struct Graph {
    state: GraphState,
    plugins: HashMap<String, Box<dyn Plugin>>,
    /// `class_name`s in `load_plugin` call order — a `HashMap` alone can't
    /// answer "which of these came first", and the execution-order tie-break
    /// needs that.
    load_order: Vec<String>,
    edges: Vec<Edge>,
    regions: HashMap<String, SharedRegion>,
    execution_order: Vec<String>,
    ids: IdentifierService,
    /// `class_name -> id` issued at `load_plugin` time. A plugin's identity
    /// is this opaque id plus its class name; the id has no meaning beyond
    /// distinguishing instances for diagnostics and logs.
    plugin_ids: HashMap<String, String>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            state: GraphState::Open,
            plugins: HashMap::new(),
            load_order: Vec::new(),
            edges: Vec::new(),
            regions: HashMap::new(),
            execution_order: Vec::new(),
            ids: IdentifierService::new(),
            plugin_ids: HashMap::new(),
        }
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    fn require_open(&self, operation: &str) -> Result<()> {
        if self.state != GraphState::Open {
            return Err(TrnxError::IllegalState {
                state: format!("{:?}", self.state),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Register a plugin under its own `class_name()`. Only legal while the
    /// graph is `Open`. Fails with `DuplicatePlugin` if that name is
    /// already registered.
    pub fn load_plugin(&mut self, plugin: Box<dyn Plugin>) -> Result<()> {
        self.require_open("load_plugin")?;
        let name = plugin.class_name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(TrnxError::DuplicatePlugin(name));
        }
        let id = self.ids.generate()?;
        self.plugin_ids.insert(name.clone(), id);
        self.load_order.push(name.clone());
        self.plugins.insert(name, plugin);
        Ok(())
    }

    pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
        self.load_order.iter().map(String::as_str)
    }

    /// The opaque id issued to a loaded plugin at `load_plugin` time. A
    /// plugin's full identity is this id plus its class name.
    pub fn plugin_id(&self, class_name: &str) -> Option<&str> {
        self.plugin_ids.get(class_name).map(String::as_str)
    }

    /// Declare an edge from `producer.output` to `consumer.input`. Only
    /// legal while the graph is `Open`. Validates both plugins and ports
    /// exist, that the port types are structurally compatible, and that
    /// `consumer.input` has no prior producer (fan-in is forbidden — a
    /// port may fan *out* to many consumers but may only ever be written
    /// by one producer).
    pub fn connect(&mut self, producer: &str, output: &str, consumer: &str, input: &str) -> Result<()> {
        self.require_open("connect")?;

        let producer_outputs = self
            .plugins
            .get(producer)
            .ok_or_else(|| TrnxError::UnknownPlugin(producer.to_string()))?
            .declare_outputs();
        let out_descriptor = producer_outputs.get(output).ok_or_else(|| TrnxError::UnknownPort {
            plugin: producer.to_string(),
            port: output.to_string(),
        })?;

        let consumer_inputs = self
            .plugins
            .get(consumer)
            .ok_or_else(|| TrnxError::UnknownPlugin(consumer.to_string()))?
            .declare_inputs();
        let in_descriptor = consumer_inputs.get(input).ok_or_else(|| TrnxError::UnknownPort {
            plugin: consumer.to_string(),
            port: input.to_string(),
        })?;

        if !out_descriptor.is_compatible_with(in_descriptor) {
            return Err(TrnxError::PortTypeMismatch {
                producer: producer.to_string(),
                output: output.to_string(),
                consumer: consumer.to_string(),
                input: input.to_string(),
            });
        }

        let already_fed = self
            .edges
            .iter()
            .any(|e| e.consumer == consumer && e.input == input);
        if already_fed {
            return Err(TrnxError::FanInForbidden {
                consumer: consumer.to_string(),
                input: input.to_string(),
            });
        }

        self.edges.push(Edge {
            producer: producer.to_string(),
            output: output.to_string(),
            consumer: consumer.to_string(),
            input: input.to_string(),
        });
        Ok(())
    }

    /// Read-only view of the currently declared topology, buildable or not.
    pub fn topology(&self) -> ConnectionTopology<'_> {
        let nodes = self
            .load_order
            .iter()
            .map(|name| {
                let plugin = &self.plugins[name];
                NodeInfo {
                    class_name: name.clone(),
                    inputs: plugin.declare_inputs().into_keys().collect(),
                    outputs: plugin.declare_outputs().into_keys().collect(),
                }
            })
            .collect();
        ConnectionTopology {
            nodes,
            edges: &self.edges,
        }
    }

    /// Materialize one shared region per distinct `(producer, output)` pair
    /// that feeds at least one edge, bind every plugin's inputs/outputs to
    /// its regions, compute the topological execution order via Kahn's
    /// algorithm, verify every plugin, and transition `Open -> Built`.
    ///
    /// Region materialization (step 1) and binding happen before ordering
    /// and verification can even run, so a failure past step 1 does not
    /// roll plugin bindings back — a plugin that failed build still holds
    /// `SharedRegion` handles bound during this attempt. What build() does
    /// guarantee is that every region *this attempt* created gets unlinked
    /// before the error is returned, and that the graph itself is left
    /// `Open`, never partially `Built`. Ordering runs before verification so
    /// a graph that is both cyclic and missing a required binding reports
    /// `CycleDetected`, not `BuildFailed`.
    pub fn build(&mut self) -> Result<()> {
        self.require_open("build")?;

        let mut regions: HashMap<String, SharedRegion> = HashMap::new();
        match self.bind_order_and_verify(&mut regions) {
            Ok(order) => {
                self.regions = regions;
                self.execution_order = order;
                self.state = GraphState::Built;
                tracing::info!(plugins = self.plugins.len(), edges = self.edges.len(), "graph built");
                Ok(())
            }
            Err(err) => {
                for region in regions.values() {
                    region.unlink();
                }
                Err(err)
            }
        }
    }

    /// Steps 1-3 of `build()`: materialize regions into `regions`, bind them
    /// onto the live plugins, order, then verify. Takes `regions` by
    /// mutable reference rather than returning it so the caller still has
    /// it to unlink on any `Err` path, including a failure partway through
    /// region materialization itself.
    fn bind_order_and_verify(&mut self, regions: &mut HashMap<String, SharedRegion>) -> Result<Vec<String>> {
        // 1. Materialize one region per distinct (producer, output) pair
        // that is actually used by an edge, then bind it to both its
        // producer's output and every consumer's input.
        for edge in &self.edges {
            let logical = region_name(&edge.producer, &edge.output);
            if regions.contains_key(&logical) {
                continue;
            }
            let out_descriptor = self.plugins[&edge.producer]
                .declare_outputs()
                .remove(&edge.output)
                .expect("validated at connect() time");
            let region = SharedRegion::create(&logical, out_descriptor.shape.clone(), out_descriptor.elem_type)
                .map_err(|e| TrnxError::BuildFailed(e.to_string()))?;
            regions.insert(logical, region);
        }

        // Collected per-plugin first so a bind failure partway through
        // never leaves some of one plugin's ports bound and others not.
        let mut output_binds: HashMap<String, Vec<(String, SharedRegion)>> = HashMap::new();
        let mut input_binds: HashMap<String, Vec<(String, SharedRegion)>> = HashMap::new();
        for edge in &self.edges {
            let logical = region_name(&edge.producer, &edge.output);
            let region = regions[&logical].clone();
            output_binds
                .entry(edge.producer.clone())
                .or_default()
                .push((edge.output.clone(), region.clone()));
            input_binds
                .entry(edge.consumer.clone())
                .or_default()
                .push((edge.input.clone(), region));
        }

        for (plugin_name, binds) in &output_binds {
            let plugin = self.plugins.get_mut(plugin_name).expect("validated at connect() time");
            for (port, region) in binds {
                plugin.bind_output(port, region.clone())?;
            }
        }
        for (plugin_name, binds) in &input_binds {
            let plugin = self.plugins.get_mut(plugin_name).expect("validated at connect() time");
            for (port, region) in binds {
                plugin.bind_input(port, region.clone())?;
            }
        }

        // 2. Kahn's algorithm for a stable topological order: a FIFO queue
        // preserves insertion order among nodes that become ready at the
        // same time, so the order is deterministic across runs for a fixed
        // load-plugin/connect sequence.
        let order = self.topological_order()?;

        // 3. Verify every plugin has all required inputs bound.
        for (name, plugin) in &self.plugins {
            plugin.verify().map_err(|e| {
                TrnxError::BuildFailed(format!("plugin '{name}' failed verification: {e}"))
            })?;
        }

        Ok(order)
    }

    fn topological_order(&self) -> Result<Vec<String>> {
        let mut indegree: HashMap<&str, usize> = self.plugins.keys().map(|k| (k.as_str(), 0)).collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = self.plugins.keys().map(|k| (k.as_str(), Vec::new())).collect();
        for edge in &self.edges {
            adjacency.get_mut(edge.producer.as_str()).unwrap().push(edge.consumer.as_str());
            *indegree.get_mut(edge.consumer.as_str()).unwrap() += 1;
        }

        // Position in load_plugin() call order — ties among nodes that
        // become ready at the same time resolve by this index, not by
        // HashMap iteration order.
        let position: HashMap<&str, usize> = self
            .load_order
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        let mut queue: VecDeque<&str> = self
            .load_order
            .iter()
            .map(String::as_str)
            .filter(|name| indegree[name] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.plugins.len());
        let mut visited: HashSet<&str> = HashSet::new();
        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            order.push(node.to_string());
            let mut newly_ready = Vec::new();
            for &next in &adjacency[node] {
                let d = indegree.get_mut(next).unwrap();
                *d -= 1;
                if *d == 0 {
                    newly_ready.push(next);
                }
            }
            newly_ready.sort_unstable_by_key(|n| position[n]);
            for next in newly_ready {
                queue.push_back(next);
            }
        }

        if order.len() != self.plugins.len() {
            let remaining: Vec<String> = self
                .load_order
                .iter()
                .filter(|name| !order.contains(name))
                .cloned()
                .collect();
            return Err(TrnxError::CycleDetected(remaining));
        }

        Ok(order)
    }

    /// The execution order computed by `build()`. Empty before the graph is
    /// built.
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    pub fn plugin_mut(&mut self, name: &str) -> Option<&mut Box<dyn Plugin>> {
        self.plugins.get_mut(name)
    }

    pub fn region(&self, logical_name: &str) -> Option<&SharedRegion> {
        self.regions.get(logical_name)
    }

    /// Unlink every region this graph materialized. Called once by the
    /// control facade's `shutdown()` verb; idempotent because
    /// `SharedRegion::unlink` is idempotent.
    pub fn teardown(&self) {
        for region in self.regions.values() {
            region.unlink();
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

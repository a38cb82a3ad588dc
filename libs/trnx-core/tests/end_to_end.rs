//! Multi-plugin scenarios exercising the graph, region, and runner together
//! rather than one module in isolation.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use trnx_core::{
    CancellationToken, ElemType, Graph, Plugin, PluginPorts, PortDescriptor, Result, Runner, Shape, SharedRegion,
    Tensor,
};

/// Unique-ish class name per call site so concurrently running test
/// binaries/threads don't collide on the same OS shared-memory object.
fn unique_name(tag: &str) -> String {
    format!("e2e_{tag}_{}", std::process::id().wrapping_add(line!()))
}

/// Writes a fixed constant tensor to its single output on every tick.
struct ConstantSource {
    class_name: String,
    ports: PluginPorts,
    value: f64,
}

impl ConstantSource {
    fn new(class_name: String, shape: Shape, value: f64) -> Self {
        let mut outputs = HashMap::new();
        outputs.insert("data".to_string(), PortDescriptor::new(shape, ElemType::F64));
        Self {
            class_name,
            ports: PluginPorts::new(HashMap::new(), outputs),
            value,
        }
    }
}

impl Plugin for ConstantSource {
    fn class_name(&self) -> &str {
        &self.class_name
    }
    fn declare_inputs(&self) -> HashMap<String, PortDescriptor> {
        self.ports.required_inputs().clone()
    }
    fn declare_outputs(&self) -> HashMap<String, PortDescriptor> {
        self.ports.provided_outputs().clone()
    }
    fn bind_input(&mut self, name: &str, region: SharedRegion) -> Result<()> {
        self.ports.bind_input(&self.class_name, name, region)
    }
    fn bind_output(&mut self, name: &str, region: SharedRegion) -> Result<()> {
        self.ports.bind_output(&self.class_name, name, region)
    }
    fn verify(&self) -> Result<()> {
        self.ports.verify(&self.class_name)
    }
    fn process(&mut self) -> anyhow::Result<()> {
        let shape = self.ports.provided_outputs()["data"].shape.clone();
        let values = vec![self.value; shape.element_count()];
        self.ports.write_output("data", &Tensor::from_f64(shape, &values))?;
        Ok(())
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Records every tensor it reads off its single input into a shared log,
/// then cancels once it has recorded `stop_after` ticks.
struct RecordingSink {
    class_name: String,
    ports: PluginPorts,
    log: Arc<Mutex<Vec<Vec<f64>>>>,
    ticks: Arc<AtomicUsize>,
    stop_after: usize,
    cancel: CancellationToken,
}

impl RecordingSink {
    fn new(
        class_name: String,
        shape: Shape,
        log: Arc<Mutex<Vec<Vec<f64>>>>,
        stop_after: usize,
        cancel: CancellationToken,
    ) -> Self {
        let mut inputs = HashMap::new();
        inputs.insert("data".to_string(), PortDescriptor::new(shape, ElemType::F64));
        Self {
            class_name,
            ports: PluginPorts::new(inputs, HashMap::new()),
            log,
            ticks: Arc::new(AtomicUsize::new(0)),
            stop_after,
            cancel,
        }
    }
}

impl Plugin for RecordingSink {
    fn class_name(&self) -> &str {
        &self.class_name
    }
    fn declare_inputs(&self) -> HashMap<String, PortDescriptor> {
        self.ports.required_inputs().clone()
    }
    fn declare_outputs(&self) -> HashMap<String, PortDescriptor> {
        self.ports.provided_outputs().clone()
    }
    fn bind_input(&mut self, name: &str, region: SharedRegion) -> Result<()> {
        self.ports.bind_input(&self.class_name, name, region)
    }
    fn bind_output(&mut self, name: &str, region: SharedRegion) -> Result<()> {
        self.ports.bind_output(&self.class_name, name, region)
    }
    fn verify(&self) -> Result<()> {
        self.ports.verify(&self.class_name)
    }
    fn process(&mut self) -> anyhow::Result<()> {
        if let Some(tensor) = self.ports.read_input("data") {
            self.log.lock().unwrap().push(tensor.as_f64());
        }
        let n = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if n >= self.stop_after {
            self.cancel.cancel();
        }
        Ok(())
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Writes one known tensor on its first tick, then fails on every
/// subsequent tick without writing again — used to pin down that a
/// downstream consumer keeps observing that one stale write.
struct FailsAfterFirstWrite {
    class_name: String,
    ports: PluginPorts,
    attempts: Arc<AtomicUsize>,
}

impl Plugin for FailsAfterFirstWrite {
    fn class_name(&self) -> &str {
        &self.class_name
    }
    fn declare_inputs(&self) -> HashMap<String, PortDescriptor> {
        self.ports.required_inputs().clone()
    }
    fn declare_outputs(&self) -> HashMap<String, PortDescriptor> {
        self.ports.provided_outputs().clone()
    }
    fn bind_input(&mut self, name: &str, region: SharedRegion) -> Result<()> {
        self.ports.bind_input(&self.class_name, name, region)
    }
    fn bind_output(&mut self, name: &str, region: SharedRegion) -> Result<()> {
        self.ports.bind_output(&self.class_name, name, region)
    }
    fn verify(&self) -> Result<()> {
        self.ports.verify(&self.class_name)
    }
    fn process(&mut self) -> anyhow::Result<()> {
        let n = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        if n == 1 {
            let shape = self.ports.provided_outputs()["data"].shape.clone();
            let values = vec![99.0; shape.element_count()];
            self.ports.write_output("data", &Tensor::from_f64(shape, &values))?;
            return Ok(());
        }
        anyhow::bail!("this plugin fails after its first successful write")
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn multi_tick_run_delivers_the_identical_tensor_every_tick() {
    let alpha = unique_name("alpha_src");
    let beta = unique_name("beta_sink");
    let shape = Shape::new(vec![100, 6]);
    let cancel = CancellationToken::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut graph = Graph::new();
    graph
        .load_plugin(Box::new(ConstantSource::new(alpha.clone(), shape.clone(), 3.0)))
        .unwrap();
    graph
        .load_plugin(Box::new(RecordingSink::new(
            beta.clone(),
            shape.clone(),
            log.clone(),
            3,
            cancel.clone(),
        )))
        .unwrap();
    graph.connect(&alpha, "data", &beta, "data").unwrap();
    graph.build().unwrap();

    Runner::new(cancel).run(&mut graph).unwrap();

    let recorded = log.lock().unwrap();
    assert_eq!(recorded.len(), 3);
    let expected = vec![3.0; shape.element_count()];
    for tick in recorded.iter() {
        assert_eq!(tick, &expected);
    }
}

#[test]
fn fan_out_binds_the_same_region_into_every_consumer() {
    let alpha = unique_name("alpha_fanout");
    let beta = unique_name("beta_fanout");
    let gamma = unique_name("gamma_fanout");
    let shape = Shape::new(vec![1]);
    let cancel_beta = CancellationToken::new();
    let cancel_gamma = CancellationToken::new();
    let log_beta = Arc::new(Mutex::new(Vec::new()));
    let log_gamma = Arc::new(Mutex::new(Vec::new()));

    let mut graph = Graph::new();
    graph
        .load_plugin(Box::new(ConstantSource::new(alpha.clone(), shape.clone(), 42.0)))
        .unwrap();
    graph
        .load_plugin(Box::new(RecordingSink::new(
            beta.clone(),
            shape.clone(),
            log_beta.clone(),
            1,
            cancel_beta.clone(),
        )))
        .unwrap();
    graph
        .load_plugin(Box::new(RecordingSink::new(
            gamma.clone(),
            shape.clone(),
            log_gamma.clone(),
            1,
            cancel_gamma.clone(),
        )))
        .unwrap();
    graph.connect(&alpha, "data", &beta, "data").unwrap();
    graph.connect(&alpha, "data", &gamma, "data").unwrap();
    graph.build().unwrap();

    let region_name = trnx_core::region_name(&alpha, "data");
    assert!(graph.region(&region_name).is_some());

    // Both consumers bound the one region materialized for Alpha's output.
    Runner::new(cancel_beta).run(&mut graph).unwrap();

    let beta_reads = log_beta.lock().unwrap();
    let gamma_reads = log_gamma.lock().unwrap();
    assert_eq!(beta_reads.len(), 1);
    assert_eq!(gamma_reads.len(), 1);
    assert_eq!(beta_reads[0], gamma_reads[0]);
    assert_eq!(beta_reads[0], vec![42.0]);
}

#[test]
fn failure_isolation_leaves_downstream_of_a_failing_plugin_stale_while_the_healthy_branch_stays_fresh() {
    let alpha = unique_name("alpha_iso");
    let beta = unique_name("beta_iso_fails");
    let gamma = unique_name("gamma_iso_healthy");
    let delta = unique_name("delta_iso_stale");
    let shape = Shape::new(vec![1]);
    let cancel = CancellationToken::new();
    let log_gamma = Arc::new(Mutex::new(Vec::new()));

    let mut graph = Graph::new();
    graph
        .load_plugin(Box::new(ConstantSource::new(alpha.clone(), shape.clone(), 1.0)))
        .unwrap();
    let beta_attempts = Arc::new(AtomicUsize::new(0));
    graph
        .load_plugin(Box::new(FailsAfterFirstWrite {
            class_name: beta.clone(),
            ports: {
                let mut inputs = HashMap::new();
                inputs.insert("data".to_string(), PortDescriptor::new(shape.clone(), ElemType::F64));
                let mut outputs = HashMap::new();
                outputs.insert("data".to_string(), PortDescriptor::new(shape.clone(), ElemType::F64));
                PluginPorts::new(inputs, outputs)
            },
            attempts: beta_attempts.clone(),
        }))
        .unwrap();
    graph
        .load_plugin(Box::new(RecordingSink::new(
            gamma.clone(),
            shape.clone(),
            log_gamma.clone(),
            5,
            cancel.clone(),
        )))
        .unwrap();
    // Delta only ever sees Beta's one successful write; every tick after
    // that Beta fails before writing again, so Delta keeps reading the
    // same stale tensor.
    let delta_log = Arc::new(Mutex::new(Vec::new()));
    graph
        .load_plugin(Box::new(RecordingSink::new(
            delta.clone(),
            shape.clone(),
            delta_log.clone(),
            // Delta has no bearing on cancellation; gamma drives the stop.
            usize::MAX,
            CancellationToken::new(),
        )))
        .unwrap();

    graph.connect(&alpha, "data", &beta, "data").unwrap();
    graph.connect(&alpha, "data", &gamma, "data").unwrap();
    graph.connect(&beta, "data", &delta, "data").unwrap();
    graph.build().unwrap();

    Runner::new(cancel).run(&mut graph).unwrap();

    assert!(beta_attempts.load(Ordering::Relaxed) >= 5);
    assert_eq!(log_gamma.lock().unwrap().len(), 5);
    for tick in log_gamma.lock().unwrap().iter() {
        assert_eq!(tick, &vec![1.0]);
    }
    // Delta's region was only ever written once, on Beta's first tick; every
    // read downstream of it stays pinned at that pre-failure value.
    for tick in delta_log.lock().unwrap().iter() {
        assert_eq!(tick, &vec![99.0]);
    }
}

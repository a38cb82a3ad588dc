//! The control facade: the single entry point external front-ends (the
//! CLI, a future RPC surface) drive through its verbs, one active graph at
//! a time. See DESIGN.md for why single-graph was chosen over a
//! multi-graph registry.

use crate::error::{Result, TrnxError};
use crate::graph::{Graph, GraphState};
use crate::plugin::Plugin;
use crate::runner::{CancellationToken, Runner};

/// Owns at most one active graph and the cancellation token for whatever
/// run is currently in flight against it, if any.
pub struct ControlFacade {
    graph: Option<Graph>,
    graph_name: Option<String>,
    cancel: Option<CancellationToken>,
}

impl ControlFacade {
    pub fn new() -> Self {
        Self {
            graph: None,
            graph_name: None,
            cancel: None,
        }
    }

    fn active_graph_mut(&mut self, operation: &str) -> Result<&mut Graph> {
        self.graph.as_mut().ok_or_else(|| TrnxError::IllegalState {
            state: "no active graph".to_string(),
            operation: operation.to_string(),
        })
    }

    /// Start a fresh, empty, `Open` graph under `name`. Only succeeds when
    /// no graph is currently active — callers must `shutdown()` the
    /// existing one first. `name` is stored for `graph_name()` and is not
    /// validated or checked for uniqueness: the single-graph variant has
    /// nothing to collide with, since only one graph is ever active.
    pub fn start_new(&mut self, name: &str) -> Result<()> {
        if self.graph.is_some() {
            return Err(TrnxError::IllegalState {
                state: "graph already active".to_string(),
                operation: "start_new".to_string(),
            });
        }
        self.graph = Some(Graph::new());
        self.graph_name = Some(name.to_string());
        self.cancel = None;
        Ok(())
    }

    /// The name passed to `start_new`, if a graph is active.
    pub fn graph_name(&self) -> Option<&str> {
        self.graph_name.as_deref()
    }

    /// Register a plugin on the active graph. Fails with `IllegalState` if
    /// there is no active graph.
    pub fn load_plugin(&mut self, plugin: Box<dyn Plugin>) -> Result<()> {
        self.active_graph_mut("load_plugin")?.load_plugin(plugin)
    }

    /// Declare an edge on the active graph. Fails with `IllegalState` if
    /// there is no active graph.
    pub fn connect(&mut self, producer: &str, output: &str, consumer: &str, input: &str) -> Result<()> {
        self.active_graph_mut("connect")?.connect(producer, output, consumer, input)
    }

    /// Build the active graph. Fails with `IllegalState` if there is no
    /// active graph.
    pub fn build(&mut self) -> Result<()> {
        self.active_graph_mut("build")?.build()
    }

    /// Borrow or lazily create the cancellation token for the active graph.
    /// Callers that need to interrupt an upcoming `run()` (a Ctrl+C handler,
    /// a supervising thread) should grab this *before* calling `run()`,
    /// since `run()` blocks the calling thread for its whole duration and
    /// the token is the only piece of facade state that's safe to touch
    /// concurrently with it.
    pub fn cancellation_token(&mut self) -> CancellationToken {
        self.cancel.get_or_insert_with(CancellationToken::new).clone()
    }

    /// Run the active graph's tick loop on the calling thread until its
    /// cancellation token is set (see [`Self::cancellation_token`]) or
    /// `shutdown()` is called from elsewhere. Blocks for the duration of the
    /// run. Fails with `IllegalState` if there is no active graph or it has
    /// not been built.
    pub fn run(&mut self) -> Result<()> {
        let cancel = self.cancellation_token();
        let graph = self.active_graph_mut("run")?;
        if graph.state() != GraphState::Built {
            return Err(TrnxError::IllegalState {
                state: format!("{:?}", graph.state()),
                operation: "run".to_string(),
            });
        }
        let runner = Runner::new(cancel);
        runner.run(graph)
    }

    /// Cancel the in-flight run (if any), unlink every shared region the
    /// active graph materialized, and drop the graph. A no-op if there is
    /// no active graph. Safe to call whether or not `run()` has returned
    /// yet — cancellation is the only part that can race with an in-flight
    /// run, and the `CancellationToken` is built for exactly that.
    pub fn shutdown(&mut self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
        if let Some(graph) = &self.graph {
            graph.teardown();
        }
        self.graph = None;
        self.graph_name = None;
        self.cancel = None;
    }

    pub fn has_active_graph(&self) -> bool {
        self.graph.is_some()
    }

    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_ref()
    }
}

impl Default for ControlFacade {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_fail_with_illegal_state_before_start_new() {
        let mut facade = ControlFacade::new();
        let err = facade.build().unwrap_err();
        assert_eq!(err.code(), "illegal_state");
    }

    #[test]
    fn start_new_makes_the_graph_active() {
        let mut facade = ControlFacade::new();
        facade.start_new("demo").unwrap();
        assert!(facade.has_active_graph());
        assert_eq!(facade.graph().unwrap().state(), GraphState::Open);
    }

    #[test]
    fn start_new_stores_the_graph_name() {
        let mut facade = ControlFacade::new();
        assert_eq!(facade.graph_name(), None);
        facade.start_new("demo").unwrap();
        assert_eq!(facade.graph_name(), Some("demo"));
        facade.shutdown();
        assert_eq!(facade.graph_name(), None);
    }

    #[test]
    fn start_new_rejects_a_second_call_while_a_graph_is_active() {
        let mut facade = ControlFacade::new();
        facade.start_new("demo").unwrap();
        let err = facade.start_new("other").unwrap_err();
        assert_eq!(err.code(), "illegal_state");
    }

    #[test]
    fn start_new_succeeds_again_after_shutdown() {
        let mut facade = ControlFacade::new();
        facade.start_new("demo").unwrap();
        facade.shutdown();
        facade.start_new("demo").unwrap();
        assert!(facade.has_active_graph());
    }

    #[test]
    fn shutdown_without_a_run_is_a_no_op() {
        let mut facade = ControlFacade::new();
        facade.start_new("demo").unwrap();
        facade.shutdown();
    }

    #[test]
    fn shutdown_drops_the_active_graph() {
        let mut facade = ControlFacade::new();
        facade.start_new("demo").unwrap();
        facade.shutdown();
        assert!(!facade.has_active_graph());
    }

    #[test]
    fn cancellation_token_obtained_before_run_can_stop_it() {
        let mut facade = ControlFacade::new();
        facade.start_new("demo").unwrap();
        facade.build().unwrap();
        let cancel = facade.cancellation_token();
        cancel.cancel();
        facade.run().unwrap();
    }
}

//! The tick-loop runner: drives a built graph's plugins in topological
//! order, once per tick, forever until cancelled.
//!
//! A tight loop over the precomputed execution order with no inter-tick
//! delay and no backpressure, cooperative cancellation via an explicit
//! token, and per-plugin failure isolation so one misbehaving plugin never
//! stops the others.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, TrnxError};
use crate::graph::{Graph, GraphState};

/// A shared flag the runner polls once per tick. Clone and hand one side to
/// whatever should be able to stop the run (a signal handler, a CLI
/// command, a test).
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drives a built graph's plugins one `process()` call per tick, in
/// topological order, until cancelled.
pub struct Runner {
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Run ticks until `cancel` is set. Fails immediately with
    /// `IllegalState` if `graph` has not been built. A plugin's `process()`
    /// error is logged and the tick continues with the next plugin — one
    /// misbehaving plugin never stops the others or aborts the run.
    ///
    /// Cancellation is checked before each tick *and* after each plugin's
    /// `process()` call within a tick, so a token set mid-tick stops the
    /// run right after the plugin that was running when it was set, rather
    /// than letting the rest of that tick's plugins run first.
    pub fn run(&self, graph: &mut Graph) -> Result<()> {
        if graph.state() != GraphState::Built {
            return Err(TrnxError::IllegalState {
                state: format!("{:?}", graph.state()),
                operation: "run".to_string(),
            });
        }

        let order: Vec<String> = graph.execution_order().to_vec();
        let mut tick: u64 = 0;
        'ticks: loop {
            if self.cancel.is_cancelled() {
                break;
            }
            for name in &order {
                let Some(plugin) = graph.plugin_mut(name) else {
                    continue;
                };
                if let Err(err) = plugin.process() {
                    tracing::error!(plugin = %name, tick, error = %err, "plugin process() failed; continuing");
                }
                if self.cancel.is_cancelled() {
                    break 'ticks;
                }
            }
            tick = tick.wrapping_add(1);
        }
        tracing::info!(ticks = tick, "runner cancelled");
        Ok(())
    }
}

//! The node contract.
//!
//! Concrete nodes (camera sources, shader filters, encoders, preview
//! sinks, ...) implement [`StreamNode`] and plug into the orchestrator.
//! The orchestrator owns when each hook runs; a node only ever sees its
//! own ports and the [`RuntimeContext`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::config::ConnectionConfig;
use crate::core::connection::{Connection, ConsumerHandle};
use crate::core::context::RuntimeContext;
use crate::core::error::{PipelineError, Result};
use crate::core::ports::{PortDescriptor, PortDirection, PortId};

/// Static description of a node: its name and declared ports. Used for
/// link validation before any data flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub name: String,
    pub ports: Vec<PortDescriptor>,
}

impl NodeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: Vec::new(),
        }
    }

    pub fn with_port(mut self, port: PortDescriptor) -> Self {
        self.ports.push(port);
        self
    }

    pub fn port(&self, id: &PortId, direction: PortDirection) -> Option<&PortDescriptor> {
        self.ports
            .iter()
            .find(|p| p.direction == direction && &p.id == id)
    }
}

/// A graph vertex.
///
/// # Lifecycle
///
/// Hooks run in this order, driven by the orchestrator:
///
/// 1. `create()` - acquire resources that do not depend on peers
///    (open a device, parse a header). No GPU work here.
/// 2. `create_output()` / `connect_input()` - port wiring.
/// 3. `initialize()` - resolve output configs (possibly awaiting
///    upstream configs through the input handles), prime output
///    connections, build GPU resources via `ctx.with_gpu`.
/// 4. `start()` - spawn the processing loop(s), normally one task per
///    input connection (or one fan-in loop, see `DebouncedJoin`).
/// 5. `stop()` - ask loops to end (preferably by letting EOS arrive)
///    and await their completion. Must be safe if `start()` never ran.
/// 6. `release()` - free GPU and platform resources. Idempotent, and
///    callable after a partial `initialize()` failure.
///
/// `on_connect`/`on_disconnect` fire for live graph edits and must only
/// touch the loop belonging to that single port. `on_pause`/`on_resume`
/// are for free-running sources and must be cheap and reversible.
#[async_trait]
pub trait StreamNode: Send + 'static {
    fn descriptor(&self) -> NodeDescriptor;

    async fn create(&mut self, ctx: &RuntimeContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    async fn initialize(&mut self, ctx: &RuntimeContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    async fn on_pause(&mut self) -> Result<()> {
        Ok(())
    }

    async fn on_resume(&mut self) -> Result<()> {
        Ok(())
    }

    /// A link touching `port` was added while the graph is live. Start
    /// the loop for that port without disturbing the others.
    async fn on_connect(&mut self, port: &PortId, direction: PortDirection) -> Result<()> {
        let _ = (port, direction);
        Ok(())
    }

    /// A link touching `port` was removed while the graph is live.
    async fn on_disconnect(&mut self, port: &PortId, direction: PortDirection) -> Result<()> {
        let _ = (port, direction);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    async fn release(&mut self, ctx: &RuntimeContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Resolve the negotiated config for an output port. May suspend on
    /// upstream configs; results are memoized in the connection's
    /// config cell, so repeated queries are free. The default reads the
    /// port's connection, which covers any node that negotiates during
    /// `initialize()`. Nodes whose config is known up front can answer
    /// without suspending.
    async fn resolve_config(&mut self, port: &PortId) -> Result<ConnectionConfig> {
        let conn = self.create_output(port)?;
        conn.config().await
    }

    /// Create (or return the already-created) connection for an output
    /// port. Called by the orchestrator while wiring links; repeat calls
    /// for the same port must return the same connection so one output
    /// can fan out to many consumers.
    fn create_output(&mut self, port: &PortId) -> Result<Connection> {
        Err(PipelineError::PortNotFound(format!(
            "{} has no output port {}",
            self.descriptor().name,
            port
        )))
    }

    /// Bind a consumer lane to an input port. The node keeps the handle
    /// and reads from it in its loop.
    fn connect_input(&mut self, port: &PortId, handle: ConsumerHandle) -> Result<()> {
        let _ = handle;
        Err(PipelineError::PortNotFound(format!(
            "{} has no input port {}",
            self.descriptor().name,
            port
        )))
    }

    /// Unbind an input port. Returns the handle if the node still holds
    /// it; `None` when a running loop owned it and will drop it on exit.
    fn disconnect_input(&mut self, port: &PortId) -> Result<Option<ConsumerHandle>> {
        let _ = port;
        Ok(None)
    }
}

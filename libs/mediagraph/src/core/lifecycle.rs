// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Node lifecycle enforcement.
//!
//! [`NodeHost`] owns one boxed node and drives its hooks in the legal
//! order. Out-of-order hooks are a [`LifecycleViolation`] and failures
//! are absorbed here: a failed node is marked [`NodeState::Failed`] and
//! its output connections are closed, so dependents observe
//! `ClosedConnection` instead of a crash.
//!
//! [`LifecycleViolation`]: crate::core::PipelineError::LifecycleViolation

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::connection::{Connection, ConsumerHandle};
use crate::core::context::RuntimeContext;
use crate::core::error::{PipelineError, Result};
use crate::core::graph::NodeId;
use crate::core::node::{NodeDescriptor, StreamNode};
use crate::core::observability::RuntimeMetrics;
use crate::core::ports::{PortDirection, PortId};

/// Lifecycle state of a node.
///
/// `Pending → Created → Initialized → Started ⇄ Paused → Stopped →
/// Released`, with `Failed` reachable from any hook error. `Released`
/// is terminal for an incarnation; a subgraph rebuild resets the host
/// to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeState {
    Pending,
    Created,
    Initialized,
    Started,
    Paused,
    Stopped,
    Released,
    Failed,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Owns one node and enforces its state machine.
pub struct NodeHost {
    id: NodeId,
    state: NodeState,
    descriptor: NodeDescriptor,
    node: Box<dyn StreamNode>,
    outputs: Vec<(PortId, Connection)>,
    metrics: Arc<dyn RuntimeMetrics>,
}

impl NodeHost {
    pub fn new(id: NodeId, node: Box<dyn StreamNode>, metrics: Arc<dyn RuntimeMetrics>) -> Self {
        let descriptor = node.descriptor();
        Self {
            id,
            state: NodeState::Pending,
            descriptor,
            node,
            outputs: Vec::new(),
            metrics,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    pub fn is_failed(&self) -> bool {
        self.state == NodeState::Failed
    }

    fn set_state(&mut self, state: NodeState) {
        tracing::debug!("[{}] {} -> {}", self.id, self.state, state);
        self.state = state;
        self.metrics.node_state_changed(&self.id, state);
    }

    fn violation(&self, hook: &str, expected: &str) -> PipelineError {
        PipelineError::LifecycleViolation(format!(
            "[{}] {hook}() called in state {} (must be {expected})",
            self.id, self.state
        ))
    }

    /// Mark the node failed and close its outputs so downstream nodes
    /// see `ClosedConnection` instead of hanging on config or data.
    fn fail(&mut self, error: &PipelineError) {
        tracing::error!("[{}] failed: {error}", self.id);
        self.metrics.node_failed(&self.id, error);
        self.close_outputs();
        self.set_state(NodeState::Failed);
    }

    pub fn close_outputs(&self) {
        for (_, conn) in &self.outputs {
            conn.close();
        }
    }

    pub async fn create(&mut self, ctx: &RuntimeContext) -> Result<()> {
        if self.state != NodeState::Pending {
            return Err(self.violation("create", "Pending"));
        }
        match self.node.create(ctx).await {
            Ok(()) => {
                self.set_state(NodeState::Created);
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    pub async fn initialize(&mut self, ctx: &RuntimeContext) -> Result<()> {
        if self.state != NodeState::Created {
            return Err(self.violation("initialize", "Created"));
        }
        match self.node.initialize(ctx).await {
            Ok(()) => {
                self.set_state(NodeState::Initialized);
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.state != NodeState::Initialized {
            return Err(self.violation("start", "Initialized"));
        }
        match self.node.start().await {
            Ok(()) => {
                self.set_state(NodeState::Started);
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    pub async fn pause(&mut self) -> Result<()> {
        if self.state != NodeState::Started {
            return Err(self.violation("pause", "Started"));
        }
        match self.node.on_pause().await {
            Ok(()) => {
                self.set_state(NodeState::Paused);
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    pub async fn resume(&mut self) -> Result<()> {
        if self.state != NodeState::Paused {
            return Err(self.violation("resume", "Paused"));
        }
        match self.node.on_resume().await {
            Ok(()) => {
                self.set_state(NodeState::Started);
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Stop the node's loops and await their completion. Legal from any
    /// state; a node that never started treats it as a no-op. Errors are
    /// logged, never propagated - teardown must keep going.
    pub async fn stop(&mut self) {
        match self.state {
            NodeState::Created | NodeState::Initialized | NodeState::Started | NodeState::Paused => {
                if let Err(e) = self.node.stop().await {
                    tracing::warn!("[{}] stop() reported: {e}", self.id);
                }
                self.set_state(NodeState::Stopped);
            }
            NodeState::Failed => {
                // Best effort; the node may have partially started.
                if let Err(e) = self.node.stop().await {
                    tracing::debug!("[{}] stop() on failed node: {e}", self.id);
                }
            }
            NodeState::Pending | NodeState::Stopped | NodeState::Released => {}
        }
    }

    /// Free the node's resources. Idempotent; runs exactly once per
    /// incarnation even after partial initialization failure.
    pub async fn release(&mut self, ctx: &RuntimeContext) {
        if self.state == NodeState::Released {
            return;
        }
        if self.state != NodeState::Pending {
            if let Err(e) = self.node.release(ctx).await {
                tracing::error!("[{}] release() reported: {e}", self.id);
            }
        }
        self.close_outputs();
        self.outputs.clear();
        self.set_state(NodeState::Released);
    }

    /// Prepare for a fresh incarnation after a config-affecting edit.
    pub fn reset(&mut self) -> Result<()> {
        match self.state {
            NodeState::Stopped | NodeState::Released | NodeState::Failed => {
                self.outputs.clear();
                self.set_state(NodeState::Pending);
                Ok(())
            }
            _ => Err(self.violation("reset", "Stopped, Released or Failed")),
        }
    }

    fn wiring_allowed(&self) -> bool {
        matches!(
            self.state,
            NodeState::Created | NodeState::Initialized | NodeState::Started | NodeState::Paused
        )
    }

    pub fn create_output(&mut self, port: &PortId) -> Result<Connection> {
        if !self.wiring_allowed() {
            return Err(self.violation("create_output", "Created..Paused"));
        }
        if self
            .descriptor
            .port(port, PortDirection::Output)
            .is_none()
        {
            return Err(PipelineError::PortNotFound(format!(
                "{}.{} (output)",
                self.id, port
            )));
        }
        let conn = self.node.create_output(port)?;
        if !self.outputs.iter().any(|(p, c)| p == port && c.id() == conn.id()) {
            self.outputs.push((port.clone(), conn.clone()));
        }
        Ok(conn)
    }

    pub fn connect_input(&mut self, port: &PortId, handle: ConsumerHandle) -> Result<()> {
        if !self.wiring_allowed() {
            return Err(self.violation("connect_input", "Created..Paused"));
        }
        if self.descriptor.port(port, PortDirection::Input).is_none() {
            return Err(PipelineError::PortNotFound(format!(
                "{}.{} (input)",
                self.id, port
            )));
        }
        self.node.connect_input(port, handle)
    }

    pub fn disconnect_input(&mut self, port: &PortId) -> Result<Option<ConsumerHandle>> {
        self.node.disconnect_input(port)
    }

    /// Forward a live-edit connect notification. Ignored for nodes that
    /// are not running (the port loop will start with the node).
    pub async fn on_connect(&mut self, port: &PortId, direction: PortDirection) -> Result<()> {
        match self.state {
            NodeState::Started | NodeState::Paused => self.node.on_connect(port, direction).await,
            _ => Ok(()),
        }
    }

    pub async fn on_disconnect(&mut self, port: &PortId, direction: PortDirection) -> Result<()> {
        match self.state {
            NodeState::Started | NodeState::Paused => {
                self.node.on_disconnect(port, direction).await
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for NodeHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHost")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

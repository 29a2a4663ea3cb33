// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use ahash::AHashMap;

use super::state::RuntimeState;
use crate::core::assets::{AssetLoader, StaticAssets};
use crate::core::clock::FrameClock;
use crate::core::context::RuntimeContext;
use crate::core::error::{PipelineError, Result};
use crate::core::gpu::{GpuBackend, GpuExecutor, HeadlessBackend};
use crate::core::graph::{Graph, Link, NodeId};
use crate::core::lifecycle::{NodeHost, NodeState};
use crate::core::node::StreamNode;
use crate::core::observability::{NoopMetrics, RuntimeMetrics};
use crate::core::ports::PortDirection;

/// Builder for [`GraphRuntime`]. The GPU backend and asset loader are
/// the two platform seams; everything else has defaults.
pub struct GraphRuntimeBuilder {
    backend: Option<Box<dyn GpuBackend>>,
    assets: Option<Arc<dyn AssetLoader>>,
    metrics: Arc<dyn RuntimeMetrics>,
    frame_rate: u32,
}

impl GraphRuntimeBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            assets: None,
            metrics: Arc::new(NoopMetrics),
            frame_rate: 30,
        }
    }

    pub fn with_backend(mut self, backend: Box<dyn GpuBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_assets(mut self, assets: Arc<dyn AssetLoader>) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn RuntimeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Spawn the GPU owner thread and assemble the runtime.
    pub fn build(self) -> Result<GraphRuntime> {
        let assets = self
            .assets
            .unwrap_or_else(|| Arc::new(StaticAssets::new()));
        let backend = self
            .backend
            .unwrap_or_else(|| Box::new(HeadlessBackend::new()));
        let gpu = GpuExecutor::spawn(backend, Arc::clone(&assets))?;
        let ctx = RuntimeContext::new(
            Arc::clone(&gpu),
            assets,
            FrameClock::new(self.frame_rate),
            Arc::clone(&self.metrics),
        );
        Ok(GraphRuntime {
            state: RuntimeState::Stopped,
            graph: Graph::new(),
            hosts: AHashMap::new(),
            ctx,
            metrics: self.metrics,
        })
    }
}

impl Default for GraphRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrates one pipeline graph.
pub struct GraphRuntime {
    pub(super) state: RuntimeState,
    pub(super) graph: Graph,
    pub(super) hosts: AHashMap<NodeId, NodeHost>,
    pub(super) ctx: RuntimeContext,
    pub(super) metrics: Arc<dyn RuntimeMetrics>,
}

impl GraphRuntime {
    pub fn builder() -> GraphRuntimeBuilder {
        GraphRuntimeBuilder::new()
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    pub fn node_state(&self, id: &NodeId) -> Option<NodeState> {
        self.hosts.get(id).map(|h| h.state())
    }

    pub(super) fn is_live(&self) -> bool {
        matches!(self.state, RuntimeState::Running | RuntimeState::Paused)
    }

    /// Add a node under the given id. On a live runtime the node is
    /// created, initialized and started immediately; otherwise it waits
    /// for the next [`GraphRuntime::start`].
    pub async fn add_node(
        &mut self,
        id: impl Into<NodeId>,
        node: impl StreamNode,
    ) -> Result<NodeId> {
        self.add_boxed_node(id, Box::new(node)).await
    }

    /// Boxed variant of [`GraphRuntime::add_node`] for callers holding
    /// trait objects (e.g. an editor-driven node registry).
    pub async fn add_boxed_node(
        &mut self,
        id: impl Into<NodeId>,
        node: Box<dyn StreamNode>,
    ) -> Result<NodeId> {
        let id = id.into();
        let host = NodeHost::new(id.clone(), node, Arc::clone(&self.metrics));
        self.graph.add_node(id.clone(), host.descriptor().clone())?;
        self.hosts.insert(id.clone(), host);
        tracing::info!("[{id}] node added");

        if self.is_live() {
            let ctx = self.ctx.clone();
            let host = self.hosts.get_mut(&id).expect("just inserted");
            host.create(&ctx).await?;
            host.initialize(&ctx).await?;
            host.start().await?;
        }
        Ok(id)
    }

    /// Wire one link: create (or reuse) the upstream connection, open a
    /// consumer lane, and bind it downstream.
    pub(super) fn wire_link(&mut self, link: &Link) -> Result<()> {
        let conn = {
            let from_host = self
                .hosts
                .get_mut(&link.from.node)
                .ok_or_else(|| PipelineError::NodeNotFound(link.from.node.to_string()))?;
            if from_host.is_failed() {
                tracing::debug!(
                    "[{}] upstream failed, leaving {} unwired",
                    link.from.node,
                    link.id
                );
                return Ok(());
            }
            from_host.create_output(&link.from.port)?
        };
        let handle = conn.add_consumer();
        let to_host = self
            .hosts
            .get_mut(&link.to.node)
            .ok_or_else(|| PipelineError::NodeNotFound(link.to.node.to_string()))?;
        if to_host.is_failed() {
            tracing::debug!(
                "[{}] downstream failed, leaving {} unwired",
                link.to.node,
                link.id
            );
            return Ok(());
        }
        to_host.connect_input(&link.to.port, handle)?;
        tracing::debug!("{} wired ({} -> {})", link.id, link.from, link.to);
        Ok(())
    }

    /// Unwire one link on a live graph: notify both endpoints, then drop
    /// the downstream handle so the lane detaches and its queued
    /// buffers return to the pool.
    pub(super) async fn unwire_link(&mut self, link: &Link) -> Result<()> {
        if let Some(to_host) = self.hosts.get_mut(&link.to.node) {
            to_host
                .on_disconnect(&link.to.port, PortDirection::Input)
                .await?;
            if let Some(handle) = to_host.disconnect_input(&link.to.port)? {
                drop(handle);
            }
        }
        if let Some(from_host) = self.hosts.get_mut(&link.from.node) {
            from_host
                .on_disconnect(&link.from.port, PortDirection::Output)
                .await?;
        }
        tracing::debug!("{} unwired", link.id);
        Ok(())
    }
}

impl std::fmt::Debug for GraphRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphRuntime")
            .field("state", &self.state)
            .field("graph", &self.graph)
            .finish()
    }
}

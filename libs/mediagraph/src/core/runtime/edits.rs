// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Live graph edits.
//!
//! Adding or removing a single link touches only the two affected
//! nodes (`on_connect`/`on_disconnect`); nothing else restarts. A
//! change that alters a negotiated config (a resize, a format switch)
//! goes through [`GraphRuntime::restart_nodes`], which rebuilds exactly
//! the downstream closure of the edited node while the rest of the
//! graph keeps running.

use futures::future::join_all;

use crate::core::error::{PipelineError, Result};
use crate::core::graph::{Link, LinkId, NodeId};
use crate::core::lifecycle::NodeState;
use crate::core::ports::{PortAddress, PortDirection};

use super::runtime::GraphRuntime;

impl GraphRuntime {
    /// Add a link. On a live runtime the connection is wired
    /// immediately and only the two endpoint nodes are notified.
    pub async fn add_link(&mut self, from: PortAddress, to: PortAddress) -> Result<LinkId> {
        let link = Link::new(from, to);
        self.graph.add_link(link.clone())?;
        let id = link.id.clone();

        if self.is_live() {
            if let Err(e) = self.wire_link(&link) {
                // Keep topology and wiring in sync.
                let _ = self.graph.remove_link(&id);
                return Err(e);
            }
            if let Some(host) = self.hosts.get_mut(&link.from.node) {
                host.on_connect(&link.from.port, PortDirection::Output)
                    .await?;
            }
            if let Some(host) = self.hosts.get_mut(&link.to.node) {
                host.on_connect(&link.to.port, PortDirection::Input).await?;
            }
        }

        self.metrics.link_added(&id);
        tracing::info!("{id} added ({} -> {})", link.from, link.to);
        Ok(id)
    }

    /// Remove a link. On a live runtime only the two endpoint nodes are
    /// notified; the detached lane's buffers return to the pool.
    pub async fn remove_link(&mut self, id: &LinkId) -> Result<()> {
        let link = self.graph.remove_link(id)?;
        if self.is_live() {
            self.unwire_link(&link).await?;
        }
        self.metrics.link_removed(id);
        tracing::info!("{id} removed");
        Ok(())
    }

    /// Remove a node and every link touching it. Works on a live graph:
    /// peers get `on_disconnect`, the node is stopped (cooperative
    /// cancellation if it never sees EOS) and released exactly once.
    pub async fn remove_node(&mut self, id: &NodeId) -> Result<()> {
        if !self.hosts.contains_key(id) {
            return Err(PipelineError::NodeNotFound(id.to_string()));
        }

        let incident: Vec<LinkId> = self
            .graph
            .links()
            .filter(|l| &l.from.node == id || &l.to.node == id)
            .map(|l| l.id.clone())
            .collect();
        for link_id in &incident {
            self.remove_link(link_id).await?;
        }

        self.graph.remove_node(id)?;
        let mut host = self.hosts.remove(id).expect("checked above");
        let ctx = self.ctx.clone();
        host.stop().await;
        host.release(&ctx).await;
        tracing::info!("[{id}] node removed");
        Ok(())
    }

    /// Rebuild the downstream closure of `root` after a config-altering
    /// change: stop → release → re-create → re-wire → re-initialize →
    /// re-start, for the affected nodes only.
    pub async fn restart_nodes(&mut self, root: &NodeId) -> Result<()> {
        if !self.is_live() {
            return Err(PipelineError::Runtime(format!(
                "cannot restart nodes from state {} (must be Running or Paused)",
                self.state
            )));
        }
        let affected = self.graph.downstream_of(root);
        if affected.is_empty() {
            return Err(PipelineError::NodeNotFound(root.to_string()));
        }
        tracing::info!(
            "restarting subgraph of [{root}]: {} node(s) affected",
            affected.len()
        );

        let ctx = self.ctx.clone();

        // Stop the whole affected set before releasing any of it.
        join_all(
            self.hosts
                .values_mut()
                .filter(|host| affected.contains(host.id()))
                .map(|host| host.stop()),
        )
        .await;

        for id in &affected {
            if let Some(host) = self.hosts.get_mut(id) {
                host.release(&ctx).await;
                host.reset()?;
            }
        }

        let created = join_all(
            self.hosts
                .values_mut()
                .filter(|host| affected.contains(host.id()))
                .map(|host| {
                    let ctx = ctx.clone();
                    async move { (host.id().clone(), host.create(&ctx).await) }
                }),
        )
        .await;
        for (id, result) in created {
            if let Err(e) = result {
                tracing::warn!("[{id}] create failed during restart: {e}");
            }
        }

        // Every link landing inside the affected set needs a fresh
        // lane; boundary links reuse the unaffected producer's
        // connection.
        let links: Vec<Link> = self
            .graph
            .links()
            .filter(|l| affected.contains(&l.to.node))
            .cloned()
            .collect();
        for link in &links {
            if let Err(e) = self.wire_link(link) {
                tracing::warn!("{} not rewired: {e}", link.id);
            }
        }

        let initialized = join_all(
            self.hosts
                .values_mut()
                .filter(|host| {
                    affected.contains(host.id()) && host.state() == NodeState::Created
                })
                .map(|host| {
                    let ctx = ctx.clone();
                    async move { (host.id().clone(), host.initialize(&ctx).await) }
                }),
        )
        .await;
        for (id, result) in initialized {
            if let Err(e) = result {
                tracing::warn!("[{id}] initialize failed during restart: {e}");
            }
        }

        let started = join_all(
            self.hosts
                .values_mut()
                .filter(|host| {
                    affected.contains(host.id()) && host.state() == NodeState::Initialized
                })
                .map(|host| async move { (host.id().clone(), host.start().await) }),
        )
        .await;
        for (id, result) in started {
            if let Err(e) = result {
                tracing::warn!("[{id}] start failed during restart: {e}");
            }
        }

        tracing::info!("subgraph of [{root}] restarted");
        Ok(())
    }
}

// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Runtime lifecycle management.
//!
//! - `start()` - create, wire, initialize and start all nodes
//! - `stop()` - stop every node, then release every node
//! - `pause()` / `resume()` - suspend free-running sources
//! - `shutdown()` - stop plus GPU owner teardown
//!
//! Per-node failures never unwind the graph: a failed node is disabled,
//! its outputs closed, and the rest keeps going.

use futures::future::join_all;

use super::state::RuntimeState;
use crate::core::error::{PipelineError, Result};
use crate::core::graph::Link;
use crate::core::lifecycle::NodeState;

use super::runtime::GraphRuntime;

impl GraphRuntime {
    /// Start the whole graph.
    ///
    /// Phases run graph-wide and concurrently within each phase:
    /// create → wire links → initialize → start. Initialization order
    /// between dependent nodes is not scheduled here - a node that
    /// needs an upstream config suspends on its input connection until
    /// the upstream node resolves it, and memoization in the connection
    /// makes repeated queries free. A node with zero links starts and
    /// is simply inert.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != RuntimeState::Stopped {
            return Err(PipelineError::Runtime(format!(
                "runtime cannot start from state {} (must be Stopped)",
                self.state
            )));
        }

        tracing::info!(
            "starting runtime: {} nodes, {} links",
            self.hosts.len(),
            self.graph.link_count()
        );
        self.state = RuntimeState::Starting;

        // Fresh incarnation for anything left from a previous run.
        for host in self.hosts.values_mut() {
            if matches!(
                host.state(),
                NodeState::Stopped | NodeState::Released | NodeState::Failed
            ) {
                host.reset()?;
            }
        }

        let ctx = self.ctx.clone();

        let created = join_all(self.hosts.values_mut().map(|host| {
            let ctx = ctx.clone();
            async move { (host.id().clone(), host.create(&ctx).await) }
        }))
        .await;
        for (id, result) in created {
            if let Err(e) = result {
                tracing::warn!("[{id}] create failed, node disabled: {e}");
            }
        }

        let links: Vec<Link> = self.graph.links().cloned().collect();
        for link in &links {
            if let Err(e) = self.wire_link(link) {
                tracing::warn!("{} not wired: {e}", link.id);
            }
        }

        let initialized = join_all(
            self.hosts
                .values_mut()
                .filter(|host| host.state() == NodeState::Created)
                .map(|host| {
                    let ctx = ctx.clone();
                    async move { (host.id().clone(), host.initialize(&ctx).await) }
                }),
        )
        .await;
        for (id, result) in initialized {
            if let Err(e) = result {
                tracing::warn!("[{id}] initialize failed, node disabled: {e}");
            }
        }

        let started = join_all(
            self.hosts
                .values_mut()
                .filter(|host| host.state() == NodeState::Initialized)
                .map(|host| async move { (host.id().clone(), host.start().await) }),
        )
        .await;
        for (id, result) in started {
            if let Err(e) = result {
                tracing::warn!("[{id}] start failed, node disabled: {e}");
            }
        }

        self.state = RuntimeState::Running;
        tracing::info!("runtime started");
        Ok(())
    }

    /// Stop the whole graph.
    ///
    /// Every node's `stop()` is awaited in a graph-wide join before any
    /// node's `release()` runs, so no release races a peer still
    /// draining EOS. Idempotent when not running.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_live() {
            return Ok(());
        }

        tracing::info!("stopping runtime...");
        self.state = RuntimeState::Stopping;

        join_all(self.hosts.values_mut().map(|host| host.stop())).await;

        let ctx = self.ctx.clone();
        join_all(self.hosts.values_mut().map(|host| {
            let ctx = ctx.clone();
            async move { host.release(&ctx).await }
        }))
        .await;

        self.state = RuntimeState::Stopped;
        tracing::info!("runtime stopped");
        Ok(())
    }

    /// Suspend free-running sources without releasing anything.
    pub async fn pause(&mut self) -> Result<()> {
        if self.state != RuntimeState::Running {
            return Err(PipelineError::Runtime(format!(
                "cannot pause from state {} (must be Running)",
                self.state
            )));
        }

        let paused = join_all(
            self.hosts
                .values_mut()
                .filter(|host| host.state() == NodeState::Started)
                .map(|host| async move { (host.id().clone(), host.pause().await) }),
        )
        .await;
        for (id, result) in paused {
            if let Err(e) = result {
                tracing::warn!("[{id}] pause failed: {e}");
            }
        }

        self.state = RuntimeState::Paused;
        tracing::info!("runtime paused");
        Ok(())
    }

    /// Resume from a paused state.
    pub async fn resume(&mut self) -> Result<()> {
        if self.state != RuntimeState::Paused {
            return Err(PipelineError::Runtime(format!(
                "cannot resume from state {} (must be Paused)",
                self.state
            )));
        }

        let resumed = join_all(
            self.hosts
                .values_mut()
                .filter(|host| host.state() == NodeState::Paused)
                .map(|host| async move { (host.id().clone(), host.resume().await) }),
        )
        .await;
        for (id, result) in resumed {
            if let Err(e) = result {
                tracing::warn!("[{id}] resume failed: {e}");
            }
        }

        self.state = RuntimeState::Running;
        tracing::info!("runtime resumed");
        Ok(())
    }

    /// Stop the graph and tear down the GPU owner thread.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stop().await?;
        self.ctx.gpu().shutdown().await;
        Ok(())
    }
}

// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Metrics hooks and log initialization.
//!
//! Observability is injected into the runtime rather than collected in
//! process-wide registries; anything that wants to watch the graph
//! implements [`RuntimeMetrics`] and hands it to the builder.

use crate::core::error::PipelineError;
use crate::core::graph::{LinkId, NodeId};
use crate::core::lifecycle::NodeState;

/// Hooks the orchestrator calls as the graph changes. All methods have
/// no-op defaults; implementations must be cheap and non-blocking.
pub trait RuntimeMetrics: Send + Sync + 'static {
    fn node_state_changed(&self, node: &NodeId, state: NodeState) {
        let _ = (node, state);
    }

    fn node_failed(&self, node: &NodeId, error: &PipelineError) {
        let _ = (node, error);
    }

    fn link_added(&self, link: &LinkId) {
        let _ = link;
    }

    fn link_removed(&self, link: &LinkId) {
        let _ = link;
    }
}

pub struct NoopMetrics;

impl RuntimeMetrics for NoopMetrics {}

/// Install a tracing subscriber reading `RUST_LOG`. Safe to call more
/// than once; later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

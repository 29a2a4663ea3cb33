// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Graph topology: nodes, links, and structural validation.
//!
//! The graph tracks descriptors only - live state lives in the runtime's
//! node hosts. Config resolution requires a DAG, so every link addition
//! is checked for cycles before it lands.

use std::fmt;

use ahash::AHashMap;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use serde::{Deserialize, Serialize};

use crate::core::error::{PipelineError, Result};
use crate::core::node::NodeDescriptor;
use crate::core::ports::{PortAddress, PortDirection, PortKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a collision-resistant id.
    pub fn generate() -> Self {
        Self(cuid2::create_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkId(String);

impl LinkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(cuid2::create_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LinkId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// One edge from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub from: PortAddress,
    pub to: PortAddress,
}

impl Link {
    pub fn new(from: PortAddress, to: PortAddress) -> Self {
        Self {
            id: LinkId::generate(),
            from,
            to,
        }
    }
}

/// Topology bookkeeping for one pipeline.
#[derive(Default)]
pub struct Graph {
    nodes: AHashMap<NodeId, NodeDescriptor>,
    links: AHashMap<LinkId, Link>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: NodeId, descriptor: NodeDescriptor) -> Result<()> {
        if self.nodes.contains_key(&id) {
            return Err(PipelineError::InvalidGraph(format!(
                "node {id} already exists"
            )));
        }
        self.nodes.insert(id, descriptor);
        Ok(())
    }

    /// Remove a node and every link touching it; returns the removed
    /// link ids so the runtime can unwire them.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<Vec<LinkId>> {
        if self.nodes.remove(id).is_none() {
            return Err(PipelineError::NodeNotFound(id.to_string()));
        }
        let incident: Vec<LinkId> = self
            .links
            .values()
            .filter(|l| &l.from.node == id || &l.to.node == id)
            .map(|l| l.id.clone())
            .collect();
        for link_id in &incident {
            self.links.remove(link_id);
        }
        Ok(incident)
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeDescriptor> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn link(&self, id: &LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_input_linked(&self, dest: &PortAddress) -> bool {
        self.links.values().any(|l| &l.to == dest)
    }

    /// Check a candidate edge against the topology: both endpoints must
    /// exist with matching kinds and directions, the input must be
    /// free, and the result must stay acyclic.
    pub fn validate_link(&self, from: &PortAddress, to: &PortAddress) -> Result<PortKind> {
        let from_node = self
            .nodes
            .get(&from.node)
            .ok_or_else(|| PipelineError::NodeNotFound(from.node.to_string()))?;
        let to_node = self
            .nodes
            .get(&to.node)
            .ok_or_else(|| PipelineError::NodeNotFound(to.node.to_string()))?;

        let out_port = from_node
            .port(&from.port, PortDirection::Output)
            .ok_or_else(|| PipelineError::PortNotFound(format!("{from} (output)")))?;
        let in_port = to_node
            .port(&to.port, PortDirection::Input)
            .ok_or_else(|| PipelineError::PortNotFound(format!("{to} (input)")))?;

        if !out_port.kind.compatible_with(&in_port.kind) {
            return Err(PipelineError::IncompatibleConfig(format!(
                "{from} carries {}, {to} expects {}",
                out_port.kind, in_port.kind
            )));
        }
        if self.is_input_linked(to) {
            return Err(PipelineError::LinkAlreadyExists(format!(
                "{to} is already linked"
            )));
        }
        if self.would_cycle(&from.node, &to.node) {
            return Err(PipelineError::InvalidGraph(format!(
                "link {from} -> {to} would create a cycle"
            )));
        }
        Ok(out_port.kind)
    }

    pub fn add_link(&mut self, link: Link) -> Result<()> {
        if self.links.contains_key(&link.id) {
            return Err(PipelineError::LinkAlreadyExists(link.id.to_string()));
        }
        self.validate_link(&link.from, &link.to)?;
        self.links.insert(link.id.clone(), link);
        Ok(())
    }

    pub fn remove_link(&mut self, id: &LinkId) -> Result<Link> {
        self.links
            .remove(id)
            .ok_or_else(|| PipelineError::LinkNotFound(id.to_string()))
    }

    fn digraph_with(
        &self,
        extra: Option<(&NodeId, &NodeId)>,
    ) -> (DiGraph<NodeId, ()>, AHashMap<NodeId, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index = AHashMap::new();
        for id in self.nodes.keys() {
            index.insert(id.clone(), graph.add_node(id.clone()));
        }
        for link in self.links.values() {
            if let (Some(&a), Some(&b)) = (index.get(&link.from.node), index.get(&link.to.node)) {
                graph.add_edge(a, b, ());
            }
        }
        if let Some((from, to)) = extra {
            if let (Some(&a), Some(&b)) = (index.get(from), index.get(to)) {
                graph.add_edge(a, b, ());
            }
        }
        (graph, index)
    }

    fn would_cycle(&self, from: &NodeId, to: &NodeId) -> bool {
        let (graph, _) = self.digraph_with(Some((from, to)));
        is_cyclic_directed(&graph)
    }

    /// The affected set of a config-altering change at `root`: the root
    /// itself plus everything reachable downstream.
    pub fn downstream_of(&self, root: &NodeId) -> Vec<NodeId> {
        let (graph, index) = self.digraph_with(None);
        let Some(&start) = index.get(root) else {
            return Vec::new();
        };
        let mut affected = Vec::new();
        let mut bfs = Bfs::new(&graph, start);
        while let Some(nx) = bfs.next(&graph) {
            affected.push(graph[nx].clone());
        }
        affected
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("links", &self.links.len())
            .finish()
    }
}

//! Port identity and typing for node inputs/outputs.
//!
//! Every node declares a set of named ports; each port carries a
//! [`PortKind`] so the orchestrator can reject mismatched links before
//! any data flows.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::graph::NodeId;

/// Type of data that flows through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    Video,
    Audio,
    Texture3d,
    Matrix,
}

impl PortKind {
    /// Default circulating pool depth for an edge of this kind.
    pub fn default_capacity(&self) -> usize {
        match self {
            PortKind::Video => 3,
            PortKind::Audio => 8,
            PortKind::Texture3d => 2,
            PortKind::Matrix => 2,
        }
    }

    pub fn compatible_with(&self, other: &PortKind) -> bool {
        self == other
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PortKind::Video => "video",
            PortKind::Audio => "audio",
            PortKind::Texture3d => "texture3d",
            PortKind::Matrix => "matrix",
        };
        f.write_str(name)
    }
}

/// Direction of a port relative to its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// Name of a port within a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortId(Cow<'static, str>);

impl PortId {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Build from a static string (zero allocation).
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PortId {
    fn from(name: &str) -> Self {
        Self(Cow::Owned(name.to_owned()))
    }
}

/// Strongly-typed port address combining node ID and port name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortAddress {
    pub node: NodeId,
    pub port: PortId,
}

impl PortAddress {
    pub fn new(node: impl Into<NodeId>, port: impl Into<PortId>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for PortAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.port)
    }
}

/// Declared port on a node descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub id: PortId,
    pub kind: PortKind,
    pub direction: PortDirection,
}

impl PortDescriptor {
    pub fn input(id: impl Into<PortId>, kind: PortKind) -> Self {
        Self {
            id: id.into(),
            kind,
            direction: PortDirection::Input,
        }
    }

    pub fn output(id: impl Into<PortId>, kind: PortKind) -> Self {
        Self {
            id: id.into(),
            kind,
            direction: PortDirection::Output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_kind_defaults() {
        assert_eq!(PortKind::Video.default_capacity(), 3);
        assert_eq!(PortKind::Audio.default_capacity(), 8);
        assert_eq!(PortKind::Texture3d.default_capacity(), 2);
        assert_eq!(PortKind::Matrix.default_capacity(), 2);
    }

    #[test]
    fn test_port_kind_compatibility() {
        assert!(PortKind::Video.compatible_with(&PortKind::Video));
        assert!(!PortKind::Video.compatible_with(&PortKind::Audio));
        assert!(!PortKind::Texture3d.compatible_with(&PortKind::Matrix));
    }

    #[test]
    fn test_port_address_display() {
        let addr = PortAddress::new(NodeId::new("camera"), "video");
        assert_eq!(addr.to_string(), "camera.video");
    }
}

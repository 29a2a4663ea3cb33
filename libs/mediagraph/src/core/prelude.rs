// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Convenience imports for node authors.

pub use crate::core::assets::AssetLoader;
pub use crate::core::clock::FrameClock;
pub use crate::core::config::{
    AudioChannelCount, AudioConfig, ConnectionConfig, PixelFormat, Texture3dConfig, VideoConfig,
};
pub use crate::core::connection::{Connection, ConsumerHandle};
pub use crate::core::context::RuntimeContext;
pub use crate::core::error::{PipelineError, Result};
pub use crate::core::event::{AudioBuffer, EventPayload, Mat4, PixelBuffer, SlotId, StreamEvent};
pub use crate::core::fanin::DebouncedJoin;
pub use crate::core::gpu::{GpuBackend, GpuContext, GpuExecutor, TextureDescriptor};
pub use crate::core::graph::{LinkId, NodeId};
pub use crate::core::lifecycle::NodeState;
pub use crate::core::node::{NodeDescriptor, StreamNode};
pub use crate::core::ports::{PortAddress, PortDescriptor, PortDirection, PortId, PortKind};
pub use crate::core::runtime::{GraphRuntime, RuntimeState};

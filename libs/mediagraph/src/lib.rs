// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Graph-structured real-time media pipeline engine.
//!
//! Nodes (camera sources, shader filters, audio endpoints, encoders,
//! preview sinks) compose into a directed graph; the runtime executes
//! every node concurrently, moving reusable event buffers over typed
//! connections with bounded memory, FIFO ordering per edge, and
//! EOS-driven shutdown. GPU work from any node funnels through a single
//! owner thread.

// Suppress pedantic clippy warnings that are intentional design choices
#![allow(clippy::type_complexity)] // Complex types are clear in context
#![allow(clippy::should_implement_trait)] // Method names like `default` are contextually clear

pub mod core;

pub use core::{
    AssetLoader,
    AudioBuffer,
    AudioChannelCount,
    AudioConfig,
    Connection,
    ConnectionConfig,
    ConsumerHandle,
    DebouncedJoin,
    EventPayload,
    FrameClock,
    FsAssetLoader,
    GpuBackend,
    GpuContext,
    GpuExecutor,
    GraphRuntime,
    GraphRuntimeBuilder,
    HeadlessBackend,
    LinkId,
    NodeDescriptor,
    NodeId,
    NodeState,
    PipelineError,
    PixelBuffer,
    PixelFormat,
    PortAddress,
    PortDescriptor,
    PortDirection,
    PortId,
    PortKind,
    Result,
    RuntimeContext,
    RuntimeMetrics,
    RuntimeState,
    SlotId,
    StaticAssets,
    StreamEvent,
    StreamNode,
    Texture3dConfig,
    TextureDescriptor,
    TextureHandle,
    VideoConfig,
};

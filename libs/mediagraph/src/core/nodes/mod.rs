// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Bundled endpoint nodes.
//!
//! Effect nodes (shaders, mixers, codecs) live outside the engine and
//! plug in through the [`StreamNode`] contract; these are the generic
//! endpoints every pipeline needs - a bridge from platform capture
//! callbacks into the graph, and a terminal sink driving an external
//! delegate.
//!
//! [`StreamNode`]: crate::core::node::StreamNode

mod capture;
mod sink;

pub use capture::{CaptureFeed, CaptureFrame, CaptureSource};
pub use sink::{FrameSink, SinkDelegate};

// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Reusable event buffers.
//!
//! A [`StreamEvent`] is a mutable, circulated unit of data: exactly one
//! side (producer or consumer) holds write access at any time, and
//! acquire/release transfers that access. Events are never allocated in
//! steady state - they are primed into a connection once and reused for
//! the life of the edge.

use std::sync::Arc;

use crate::core::gpu::TextureHandle;

/// Index of a primed buffer within its connection's pool.
///
/// Nodes that keep per-buffer side tables (e.g. one framebuffer per
/// output texture) key them by slot, never by payload identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub usize);

impl SlotId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// CPU-side pixel data, shared read-only across fan-out lanes.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    data: Arc<Vec<u8>>,
}

impl PixelBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access for the side currently holding the event.
    ///
    /// Falls back to clone-on-write if a fan-out clone is still alive,
    /// so a producer can never scribble over a frame a consumer is
    /// still reading.
    pub fn make_mut(&mut self) -> &mut Vec<u8> {
        Arc::make_mut(&mut self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// CPU-side audio samples, interleaved, shared read-only across lanes.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Arc<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples: Arc::new(samples),
        }
    }

    pub fn silence(len: usize) -> Self {
        Self::new(vec![0.0; len])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn make_mut(&mut self) -> &mut Vec<f32> {
        Arc::make_mut(&mut self.samples)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Column-major 4x4 matrix value.
pub type Mat4 = [[f32; 4]; 4];

pub const MAT4_IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Payload carried by one event.
///
/// Variants are capability-tagged so port wiring can be checked without
/// downcasts; GPU handles are plain ids the [`GpuBackend`] resolves on
/// the owner thread.
///
/// [`GpuBackend`]: crate::core::gpu::GpuBackend
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// No payload yet (freshly primed, or a bare EOS marker).
    Empty,
    Pixels(PixelBuffer),
    Audio(AudioBuffer),
    Texture(TextureHandle),
    Texture3d(TextureHandle),
    Matrix(Mat4),
}

/// One circulated buffer: payload plus delivery metadata.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    slot: SlotId,
    pub timestamp_ns: i64,
    pub sequence: u64,
    pub eos: bool,
    pub payload: EventPayload,
}

impl StreamEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            slot: SlotId(0),
            timestamp_ns: 0,
            sequence: 0,
            eos: false,
            payload,
        }
    }

    pub fn empty() -> Self {
        Self::new(EventPayload::Empty)
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub(crate) fn assign_slot(&mut self, slot: SlotId) {
        self.slot = slot;
    }

    /// Stamp delivery metadata before releasing downstream.
    pub fn stamp(&mut self, timestamp_ns: i64, sequence: u64) {
        self.timestamp_ns = timestamp_ns;
        self.sequence = sequence;
        self.eos = false;
    }

    /// Mark this event as the terminal end-of-stream marker.
    pub fn mark_eos(&mut self) {
        self.eos = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_clears_eos() {
        let mut event = StreamEvent::empty();
        event.mark_eos();
        assert!(event.eos);
        event.stamp(1_000, 7);
        assert!(!event.eos);
        assert_eq!(event.timestamp_ns, 1_000);
        assert_eq!(event.sequence, 7);
    }

    #[test]
    fn test_pixel_buffer_copy_on_write() {
        let mut buffer = PixelBuffer::zeroed(4);
        let shared = buffer.clone();
        buffer.make_mut()[0] = 0xff;
        // The clone kept the original bytes.
        assert_eq!(shared.as_slice()[0], 0);
        assert_eq!(buffer.as_slice()[0], 0xff);
    }

    #[test]
    fn test_exclusive_make_mut_does_not_copy() {
        let mut buffer = PixelBuffer::zeroed(16);
        let before = buffer.as_slice().as_ptr();
        buffer.make_mut()[3] = 1;
        assert_eq!(buffer.as_slice().as_ptr(), before);
    }
}

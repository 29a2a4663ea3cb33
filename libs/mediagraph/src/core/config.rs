// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Negotiated edge configuration.
//!
//! A [`ConnectionConfig`] is resolved once per connection (or once per
//! incarnation when a subgraph is rebuilt) and describes the shape of
//! every event flowing over that edge. Consumers must not read from a
//! connection until its config has resolved; resolution may itself await
//! an upstream config.

use serde::{Deserialize, Serialize};

use crate::core::ports::PortKind;

/// Pixel format for video and texture payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
    Rgb565,
    Nv12,
}

impl PixelFormat {
    /// Bytes per pixel for packed formats; planar formats report their
    /// average (NV12 is 12 bits per pixel).
    pub fn bytes_per_pixel(&self) -> f32 {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4.0,
            PixelFormat::Rgb565 => 2.0,
            PixelFormat::Nv12 => 1.5,
        }
    }
}

/// Channel layout for audio payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioChannelCount {
    One,
    Two,
}

impl AudioChannelCount {
    pub fn count(&self) -> usize {
        match self {
            AudioChannelCount::One => 1,
            AudioChannelCount::Two => 2,
        }
    }
}

/// Shape of video frames on an edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub frame_rate: u32,
    /// True when the edge hands off a platform surface instead of a
    /// value-backed buffer.
    pub surface_backed: bool,
}

impl VideoConfig {
    pub fn frame_bytes(&self) -> usize {
        (self.width as f32 * self.height as f32 * self.format.bytes_per_pixel()) as usize
    }
}

/// Shape of audio buffers on an edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: AudioChannelCount,
    /// Samples per channel per event.
    pub frame_samples: usize,
}

/// Shape of 3D textures (e.g. color LUTs) on an edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Texture3dConfig {
    /// Cube edge length in texels.
    pub size: u32,
    pub format: PixelFormat,
}

/// Immutable, negotiated description of the data flowing over one edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConnectionConfig {
    Video(VideoConfig),
    Audio(AudioConfig),
    Texture3d(Texture3dConfig),
    Matrix,
}

impl ConnectionConfig {
    pub fn kind(&self) -> PortKind {
        match self {
            ConnectionConfig::Video(_) => PortKind::Video,
            ConnectionConfig::Audio(_) => PortKind::Audio,
            ConnectionConfig::Texture3d(_) => PortKind::Texture3d,
            ConnectionConfig::Matrix => PortKind::Matrix,
        }
    }

    pub fn compatible_with(&self, other: &ConnectionConfig) -> bool {
        self.kind().compatible_with(&other.kind())
    }

    /// Unwrap a video config, or report the mismatch as a named error.
    pub fn as_video(&self) -> crate::core::Result<&VideoConfig> {
        match self {
            ConnectionConfig::Video(v) => Ok(v),
            other => Err(crate::core::PipelineError::IncompatibleConfig(format!(
                "expected video config, found {}",
                other.kind()
            ))),
        }
    }

    pub fn as_audio(&self) -> crate::core::Result<&AudioConfig> {
        match self {
            ConnectionConfig::Audio(a) => Ok(a),
            other => Err(crate::core::PipelineError::IncompatibleConfig(format!(
                "expected audio config, found {}",
                other.kind()
            ))),
        }
    }

    pub fn as_texture3d(&self) -> crate::core::Result<&Texture3dConfig> {
        match self {
            ConnectionConfig::Texture3d(t) => Ok(t),
            other => Err(crate::core::PipelineError::IncompatibleConfig(format!(
                "expected texture3d config, found {}",
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_kind() {
        let video = ConnectionConfig::Video(VideoConfig {
            width: 1280,
            height: 720,
            format: PixelFormat::Rgba8,
            frame_rate: 30,
            surface_backed: false,
        });
        assert_eq!(video.kind(), PortKind::Video);
        assert_eq!(ConnectionConfig::Matrix.kind(), PortKind::Matrix);
    }

    #[test]
    fn test_frame_bytes() {
        let config = VideoConfig {
            width: 640,
            height: 480,
            format: PixelFormat::Rgba8,
            frame_rate: 30,
            surface_backed: false,
        };
        assert_eq!(config.frame_bytes(), 640 * 480 * 4);
    }

    #[test]
    fn test_as_video_mismatch_is_named_error() {
        let config = ConnectionConfig::Matrix;
        let err = config.as_video().unwrap_err();
        assert!(err.to_string().contains("expected video config"));
    }
}

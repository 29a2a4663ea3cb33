// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Platform GPU capability.
//!
//! The engine never issues GPU calls directly; it sees an opaque
//! [`GpuBackend`] owned by the [`GpuExecutor`] thread. Handles are plain
//! ids that only mean something to the backend that produced them.
//!
//! [`GpuExecutor`]: super::GpuExecutor

use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;

use crate::core::config::PixelFormat;
use crate::core::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub u64);

/// Request descriptor for texture allocation. `depth == 1` is a 2D
/// texture; anything larger is a 3D texture (e.g. a color LUT cube).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: PixelFormat,
}

impl TextureDescriptor {
    pub fn two_d(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            depth: 1,
            format,
        }
    }

    pub fn three_d(size: u32, format: PixelFormat) -> Self {
        Self {
            width: size,
            height: size,
            depth: size,
            format,
        }
    }
}

/// The single chokepoint for GPU work. Implementations wrap a real
/// context (EGL, Metal, ...); all methods run on the owner thread only.
pub trait GpuBackend: Send + 'static {
    /// Bind the context to the owner thread. Called once before any
    /// other method.
    fn make_current(&mut self) -> Result<()>;

    fn create_program(&mut self, vertex_src: &str, fragment_src: &str) -> Result<ProgramHandle>;

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<TextureHandle>;

    fn create_framebuffer(&mut self, color: TextureHandle) -> Result<FramebufferHandle>;

    fn release_program(&mut self, program: ProgramHandle);

    fn release_texture(&mut self, texture: TextureHandle);

    fn release_framebuffer(&mut self, framebuffer: FramebufferHandle);
}

/// Backend with no device behind it: allocates handles and tracks
/// liveness. Used by tests and headless tooling.
#[derive(Default)]
pub struct HeadlessBackend {
    textures: AHashMap<u64, TextureDescriptor>,
    programs: AHashMap<u64, ()>,
    framebuffers: AHashMap<u64, TextureHandle>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }
}

fn next_handle() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

impl GpuBackend for HeadlessBackend {
    fn make_current(&mut self) -> Result<()> {
        Ok(())
    }

    fn create_program(&mut self, vertex_src: &str, fragment_src: &str) -> Result<ProgramHandle> {
        if vertex_src.is_empty() || fragment_src.is_empty() {
            return Err(PipelineError::ResourceInit(
                "empty shader source".to_string(),
            ));
        }
        let id = next_handle();
        self.programs.insert(id, ());
        Ok(ProgramHandle(id))
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<TextureHandle> {
        if desc.width == 0 || desc.height == 0 || desc.depth == 0 {
            return Err(PipelineError::ResourceInit(format!(
                "degenerate texture {}x{}x{}",
                desc.width, desc.height, desc.depth
            )));
        }
        let id = next_handle();
        self.textures.insert(id, *desc);
        Ok(TextureHandle(id))
    }

    fn create_framebuffer(&mut self, color: TextureHandle) -> Result<FramebufferHandle> {
        if !self.textures.contains_key(&color.0) {
            return Err(PipelineError::ResourceInit(format!(
                "framebuffer color attachment {:?} is not a live texture",
                color
            )));
        }
        let id = next_handle();
        self.framebuffers.insert(id, color);
        Ok(FramebufferHandle(id))
    }

    fn release_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn release_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_tracks_liveness() {
        let mut backend = HeadlessBackend::new();
        let tex = backend
            .create_texture(&TextureDescriptor::two_d(64, 64, PixelFormat::Rgba8))
            .unwrap();
        let fb = backend.create_framebuffer(tex).unwrap();
        assert_eq!(backend.live_textures(), 1);
        assert_eq!(backend.live_framebuffers(), 1);
        backend.release_framebuffer(fb);
        backend.release_texture(tex);
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(backend.live_framebuffers(), 0);
    }

    #[test]
    fn test_degenerate_texture_is_named_error() {
        let mut backend = HeadlessBackend::new();
        let err = backend
            .create_texture(&TextureDescriptor::two_d(0, 64, PixelFormat::Rgba8))
            .unwrap_err();
        assert!(matches!(err, PipelineError::ResourceInit(_)));
    }

    #[test]
    fn test_framebuffer_requires_live_texture() {
        let mut backend = HeadlessBackend::new();
        let err = backend.create_framebuffer(TextureHandle(999)).unwrap_err();
        assert!(matches!(err, PipelineError::ResourceInit(_)));
    }
}

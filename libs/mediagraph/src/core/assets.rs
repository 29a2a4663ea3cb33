// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Opaque text asset loading (shader sources and friends).

use std::path::PathBuf;

use ahash::AHashMap;

use crate::core::error::{PipelineError, Result};

/// Provider of text assets (shader programs, LUT definitions).
///
/// Treated as an opaque capability; the engine never interprets asset
/// contents.
pub trait AssetLoader: Send + Sync + 'static {
    fn read_text_asset(&self, path: &str) -> Result<String>;
}

/// Loads assets from a directory on disk.
pub struct FsAssetLoader {
    root: PathBuf,
}

impl FsAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetLoader for FsAssetLoader {
    fn read_text_asset(&self, path: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.root.join(path))?)
    }
}

/// In-memory asset table, mainly for tests and embedded defaults.
#[derive(Default)]
pub struct StaticAssets {
    assets: AHashMap<String, String>,
}

impl StaticAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.assets.insert(path.into(), text.into());
        self
    }
}

impl AssetLoader for StaticAssets {
    fn read_text_asset(&self, path: &str) -> Result<String> {
        self.assets
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::ResourceInit(format!("missing asset: {path}")))
    }
}

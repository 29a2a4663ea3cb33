// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Runtime context handed to every node lifecycle hook.

use std::sync::Arc;

use crate::core::assets::AssetLoader;
use crate::core::clock::FrameClock;
use crate::core::error::Result;
use crate::core::gpu::{GpuContext, GpuExecutor};
use crate::core::observability::RuntimeMetrics;

/// Shared services for nodes: the GPU owner, asset loading, the frame
/// clock, and metrics. Cloning is cheap.
#[derive(Clone)]
pub struct RuntimeContext {
    gpu: Arc<GpuExecutor>,
    assets: Arc<dyn AssetLoader>,
    clock: FrameClock,
    metrics: Arc<dyn RuntimeMetrics>,
}

impl RuntimeContext {
    pub fn new(
        gpu: Arc<GpuExecutor>,
        assets: Arc<dyn AssetLoader>,
        clock: FrameClock,
        metrics: Arc<dyn RuntimeMetrics>,
    ) -> Self {
        Self {
            gpu,
            assets,
            clock,
            metrics,
        }
    }

    pub fn gpu(&self) -> &Arc<GpuExecutor> {
        &self.gpu
    }

    pub fn assets(&self) -> &Arc<dyn AssetLoader> {
        &self.assets
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn metrics(&self) -> &Arc<dyn RuntimeMetrics> {
        &self.metrics
    }

    /// Run a unit of GPU work on the owner thread (see
    /// [`GpuExecutor::submit`]).
    pub async fn with_gpu<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut GpuContext) -> Result<T> + Send + 'static,
    {
        self.gpu.submit(job).await
    }
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("gpu", &self.gpu)
            .field("clock", &self.clock)
            .finish()
    }
}

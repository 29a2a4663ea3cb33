// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Single-owner GPU execution.
//!
//! Exactly one OS thread holds the GPU context; every GPU operation in
//! the graph is a closure submitted to that thread through
//! [`GpuExecutor::submit`]. Callers suspend until their job ran and get
//! its result back. Jobs compose by calling helpers that take the same
//! `&mut GpuContext`, so nested submission - and with it the re-entrancy
//! deadlock - is not expressible.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::backend::{GpuBackend, ProgramHandle};
use crate::core::assets::AssetLoader;
use crate::core::error::{PipelineError, Result};

const GPU_MAILBOX_DEPTH: usize = 64;

/// State owned by the GPU thread: the platform backend plus the asset
/// loader, so shader builds happen on the owner thread.
pub struct GpuContext {
    backend: Box<dyn GpuBackend>,
    assets: Arc<dyn AssetLoader>,
}

impl GpuContext {
    fn new(backend: Box<dyn GpuBackend>, assets: Arc<dyn AssetLoader>) -> Self {
        Self { backend, assets }
    }

    pub fn backend(&mut self) -> &mut dyn GpuBackend {
        self.backend.as_mut()
    }

    pub fn assets(&self) -> &dyn AssetLoader {
        self.assets.as_ref()
    }

    /// Read two shader assets and build a program from them.
    pub fn load_program(&mut self, vertex_asset: &str, fragment_asset: &str) -> Result<ProgramHandle> {
        let vertex_src = self.assets.read_text_asset(vertex_asset)?;
        let fragment_src = self.assets.read_text_asset(fragment_asset)?;
        self.backend.create_program(&vertex_src, &fragment_src)
    }
}

enum GpuCommand {
    Job(Box<dyn FnOnce(&mut GpuContext) + Send + 'static>),
    Shutdown,
}

/// Handle to the GPU owner thread.
pub struct GpuExecutor {
    tx: mpsc::Sender<GpuCommand>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl GpuExecutor {
    /// Start the owner thread, bind the context, and return the handle.
    /// Fails if the backend cannot be made current.
    pub fn spawn(backend: Box<dyn GpuBackend>, assets: Arc<dyn AssetLoader>) -> Result<Arc<Self>> {
        let (tx, mut rx) = mpsc::channel::<GpuCommand>(GPU_MAILBOX_DEPTH);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        let thread = std::thread::Builder::new()
            .name("mediagraph-gpu".to_string())
            .spawn(move || {
                let mut ctx = GpuContext::new(backend, assets);
                let bound = ctx.backend.make_current();
                let failed = bound.is_err();
                let _ = ready_tx.send(bound);
                if failed {
                    return;
                }
                tracing::debug!("GPU context bound, owner thread running");
                while let Some(command) = rx.blocking_recv() {
                    match command {
                        GpuCommand::Job(job) => job(&mut ctx),
                        GpuCommand::Shutdown => break,
                    }
                }
                tracing::debug!("GPU owner thread exiting");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(PipelineError::Gpu(
                    "GPU owner thread died during startup".to_string(),
                ));
            }
        }

        Ok(Arc::new(Self {
            tx,
            thread: Mutex::new(Some(thread)),
        }))
    }

    /// Run a unit of GPU work on the owner thread, suspending the caller
    /// until the result is back. Unrelated tasks keep running.
    pub async fn submit<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut GpuContext) -> Result<T> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let command = GpuCommand::Job(Box::new(move |ctx: &mut GpuContext| {
            let _ = done_tx.send(job(ctx));
        }));
        self.tx
            .send(command)
            .await
            .map_err(|_| PipelineError::Gpu("GPU executor is shut down".to_string()))?;
        done_rx
            .await
            .map_err(|_| PipelineError::Gpu("GPU job dropped before completion".to_string()))?
    }

    /// Drain outstanding jobs and join the owner thread. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(GpuCommand::Shutdown).await;
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }
    }
}

impl std::fmt::Debug for GpuExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuExecutor")
            .field("running", &self.thread.lock().is_some())
            .finish()
    }
}

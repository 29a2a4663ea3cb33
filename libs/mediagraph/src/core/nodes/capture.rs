// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Bridge from a platform capture callback into the graph.
//!
//! Camera and decoder drivers deliver buffers on their own threads. The
//! [`CaptureFeed`] is the synchronization boundary: callbacks push into
//! a bounded mailbox without blocking (a full mailbox drops the frame -
//! the graph is behind and a stale capture frame is worthless), and the
//! node's loop moves frames onto its output connection under normal
//! pool backpressure.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::config::{ConnectionConfig, VideoConfig};
use crate::core::connection::Connection;
use crate::core::context::RuntimeContext;
use crate::core::error::Result;
use crate::core::event::{EventPayload, PixelBuffer, StreamEvent};
use crate::core::node::{NodeDescriptor, StreamNode};
use crate::core::ports::{PortDescriptor, PortId, PortKind};

const FEED_DEPTH: usize = 8;

/// One frame delivered by the platform capture driver.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    pub pixels: PixelBuffer,
    pub timestamp_ns: i64,
}

enum FeedMsg {
    Frame(CaptureFrame),
    Eos,
}

/// Handle given to the platform callback. Cheap to clone; safe to use
/// from any thread.
#[derive(Clone)]
pub struct CaptureFeed {
    tx: mpsc::Sender<FeedMsg>,
}

impl CaptureFeed {
    /// Push one captured frame. Never blocks; returns `false` when the
    /// graph is behind and the frame was dropped.
    pub fn push(&self, frame: CaptureFrame) -> bool {
        self.tx.try_send(FeedMsg::Frame(frame)).is_ok()
    }

    /// Signal end of stream. The node emits one EOS event downstream
    /// and its loop ends.
    pub fn finish(&self) {
        let _ = self.tx.try_send(FeedMsg::Eos);
    }
}

/// Source node fed by a [`CaptureFeed`].
pub struct CaptureSource {
    config: VideoConfig,
    feed_tx: mpsc::Sender<FeedMsg>,
    /// Shared with the loop task so the mailbox survives restarts.
    feed_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<FeedMsg>>>,
    output: Option<Connection>,
    loop_task: Option<JoinHandle<()>>,
    pause_tx: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl CaptureSource {
    pub const VIDEO: PortId = PortId::from_static("video");

    pub fn new(config: VideoConfig) -> Self {
        let (feed_tx, feed_rx) = mpsc::channel(FEED_DEPTH);
        let (pause_tx, _) = watch::channel(false);
        Self {
            config,
            feed_tx,
            feed_rx: Arc::new(tokio::sync::Mutex::new(feed_rx)),
            output: None,
            loop_task: None,
            pause_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// The feed to hand to the platform callback. Stays valid across
    /// subgraph restarts.
    pub fn feed(&self) -> CaptureFeed {
        CaptureFeed {
            tx: self.feed_tx.clone(),
        }
    }
}

#[async_trait]
impl StreamNode for CaptureSource {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new("capture_source")
            .with_port(PortDescriptor::output("video", PortKind::Video))
    }

    async fn create(&mut self, _ctx: &RuntimeContext) -> Result<()> {
        self.cancel = CancellationToken::new();
        self.pause_tx.send_replace(false);
        Ok(())
    }

    fn create_output(&mut self, port: &PortId) -> Result<Connection> {
        if port != &Self::VIDEO {
            return Err(crate::core::PipelineError::PortNotFound(format!(
                "capture_source has no output port {port}"
            )));
        }
        let conn = self
            .output
            .get_or_insert_with(|| Connection::with_default_capacity(PortKind::Video));
        Ok(conn.clone())
    }

    async fn resolve_config(&mut self, port: &PortId) -> Result<ConnectionConfig> {
        if port != &Self::VIDEO {
            return Err(crate::core::PipelineError::PortNotFound(format!(
                "capture_source has no output port {port}"
            )));
        }
        // Known up front; no upstream to consult.
        Ok(ConnectionConfig::Video(self.config))
    }

    async fn initialize(&mut self, _ctx: &RuntimeContext) -> Result<()> {
        let Some(conn) = &self.output else {
            // No links; the node stays inert.
            return Ok(());
        };
        conn.set_config(ConnectionConfig::Video(self.config))?;
        let frame_bytes = self.config.frame_bytes();
        let events = (0..conn.capacity())
            .map(|_| StreamEvent::new(EventPayload::Pixels(PixelBuffer::zeroed(frame_bytes))))
            .collect();
        conn.prime(events)?;
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let Some(conn) = self.output.clone() else {
            return Ok(());
        };
        let feed_rx = Arc::clone(&self.feed_rx);
        let mut pause_rx = self.pause_tx.subscribe();
        let cancel = self.cancel.clone();

        self.loop_task = Some(tokio::spawn(async move {
            let mut feed_rx = feed_rx.lock().await;
            let mut sequence: u64 = 0;
            loop {
                while *pause_rx.borrow_and_update() {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        changed = pause_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                    }
                }

                let msg = tokio::select! {
                    _ = cancel.cancelled() => return,
                    changed = pause_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        // Re-evaluate the pause gate before reading more.
                        continue;
                    }
                    msg = feed_rx.recv() => msg,
                };
                match msg {
                    Some(FeedMsg::Frame(frame)) => {
                        let mut event = tokio::select! {
                            _ = cancel.cancelled() => return,
                            acquired = conn.acquire() => match acquired {
                                Ok(event) => event,
                                Err(_) => return,
                            },
                        };
                        event.stamp(frame.timestamp_ns, sequence);
                        sequence += 1;
                        event.payload = EventPayload::Pixels(frame.pixels);
                        if conn.release(event).await.is_err() {
                            return;
                        }
                    }
                    Some(FeedMsg::Eos) | None => {
                        let Ok(mut event) = conn.acquire().await else {
                            return;
                        };
                        event.sequence = sequence;
                        event.mark_eos();
                        let _ = conn.release(event).await;
                        return;
                    }
                }
            }
        }));
        Ok(())
    }

    async fn on_pause(&mut self) -> Result<()> {
        self.pause_tx.send_replace(true);
        Ok(())
    }

    async fn on_resume(&mut self) -> Result<()> {
        self.pause_tx.send_replace(false);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        // EOS-driven exit is the normal path; the token covers feeds
        // that never finish.
        self.cancel.cancel();
        if let Some(task) = self.loop_task.take() {
            let _ = task.await;
        }
        // Wait for downstream to hand every buffer back, so release()
        // can free them and stop() orders after the sink's last release.
        if let Some(conn) = &self.output {
            let recovered = conn.drain().await;
            tracing::debug!(
                "capture_source recovered {}/{} buffers",
                recovered.len(),
                conn.capacity()
            );
        }
        Ok(())
    }

    async fn release(&mut self, _ctx: &RuntimeContext) -> Result<()> {
        if let Some(conn) = self.output.take() {
            conn.close();
        }
        Ok(())
    }
}

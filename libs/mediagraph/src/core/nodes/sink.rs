// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Terminal sink driving an external delegate.
//!
//! The delegate stands in for whatever consumes frames outside the
//! graph - a preview surface, an encoder feed, a test recorder. The
//! sink reads events in order, hands a borrow to the delegate, and
//! releases every buffer back to the pool, including the EOS marker.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::connection::ConsumerHandle;
use crate::core::error::Result;
use crate::core::event::StreamEvent;
use crate::core::node::{NodeDescriptor, StreamNode};
use crate::core::ports::{PortDescriptor, PortDirection, PortId, PortKind};

/// External consumer of sink events. Callbacks run on the sink's loop
/// task and must not block.
pub trait SinkDelegate: Send + 'static {
    fn on_event(&mut self, event: &StreamEvent);

    fn on_eos(&mut self) {}
}

/// Terminal consumer node for one input of any kind.
pub struct FrameSink {
    kind: PortKind,
    delegate: Option<Box<dyn SinkDelegate>>,
    input: Option<ConsumerHandle>,
    loop_task: Option<JoinHandle<Box<dyn SinkDelegate>>>,
    cancel: CancellationToken,
}

impl FrameSink {
    pub const IN: PortId = PortId::from_static("in");

    pub fn new(kind: PortKind, delegate: impl SinkDelegate) -> Self {
        Self {
            kind,
            delegate: Some(Box::new(delegate)),
            input: None,
            loop_task: None,
            cancel: CancellationToken::new(),
        }
    }

    fn spawn_loop(&mut self) {
        let (Some(mut handle), Some(mut delegate)) = (self.input.take(), self.delegate.take())
        else {
            return;
        };
        let cancel = self.cancel.clone();
        self.loop_task = Some(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    acquired = handle.acquire() => match acquired {
                        Ok(event) => event,
                        // Abnormal upstream teardown; exit gracefully.
                        Err(_) => break,
                    },
                };
                delegate.on_event(&event);
                let eos = event.eos;
                handle.release(event);
                if eos {
                    delegate.on_eos();
                    break;
                }
            }
            delegate
        }));
    }

    async fn join_loop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.loop_task.take() {
            if let Ok(delegate) = task.await {
                // Keep the delegate so a restarted incarnation reuses it.
                self.delegate = Some(delegate);
            }
        }
        self.cancel = CancellationToken::new();
    }
}

#[async_trait]
impl StreamNode for FrameSink {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new("frame_sink").with_port(PortDescriptor::input("in", self.kind))
    }

    fn connect_input(&mut self, port: &PortId, handle: ConsumerHandle) -> Result<()> {
        if port != &Self::IN {
            return Err(crate::core::PipelineError::PortNotFound(format!(
                "frame_sink has no input port {port}"
            )));
        }
        self.input = Some(handle);
        Ok(())
    }

    fn disconnect_input(&mut self, port: &PortId) -> Result<Option<ConsumerHandle>> {
        if port != &Self::IN {
            return Ok(None);
        }
        Ok(self.input.take())
    }

    async fn start(&mut self) -> Result<()> {
        self.spawn_loop();
        Ok(())
    }

    async fn on_connect(&mut self, port: &PortId, direction: PortDirection) -> Result<()> {
        if port == &Self::IN && direction == PortDirection::Input && self.loop_task.is_none() {
            self.spawn_loop();
        }
        Ok(())
    }

    async fn on_disconnect(&mut self, port: &PortId, direction: PortDirection) -> Result<()> {
        if port == &Self::IN && direction == PortDirection::Input {
            self.join_loop();
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.join_loop();
        Ok(())
    }
}

//! Runtime lifecycle integration test.
//!
//! Verifies, through the public API only: hook ordering across a graph
//! (release never runs before the node's loop joined), transitive
//! config resolution during concurrent initialization, per-node failure
//! isolation with hard-dependency cascade, zero-link inertness, and
//! pause/resume of a free-running source.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mediagraph::core::nodes::{CaptureFrame, CaptureSource, FrameSink, SinkDelegate};
use mediagraph::{
    Connection, ConnectionConfig, ConsumerHandle, GraphRuntime, NodeDescriptor, NodeState,
    PipelineError, PixelBuffer, PixelFormat, PortAddress, PortDescriptor, PortId, PortKind,
    Result, RuntimeContext, RuntimeState, StreamEvent, StreamNode, TextureDescriptor, VideoConfig,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type HookLog = Arc<Mutex<Vec<String>>>;

fn log(log: &HookLog, entry: impl Into<String>) {
    log.lock().push(entry.into());
}

fn video_config(width: u32, height: u32) -> VideoConfig {
    VideoConfig {
        width,
        height,
        format: PixelFormat::Rgba8,
        frame_rate: 30,
        surface_backed: false,
    }
}

// -----------------------------------------------------------------------------
// Test-only nodes (not part of the engine)
// -----------------------------------------------------------------------------

/// Video in -> video out, output config derived from the upstream edge.
/// Renders through a framebuffer per pool slot, keyed by the event's
/// slot id.
struct Passthrough {
    hooks: HookLog,
    input: Option<ConsumerHandle>,
    output: Option<Connection>,
    task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    textures: Vec<mediagraph::TextureHandle>,
    framebuffers: Vec<mediagraph::core::gpu::FramebufferHandle>,
}

impl Passthrough {
    fn new(hooks: HookLog) -> Self {
        Self {
            hooks,
            input: None,
            output: None,
            task: None,
            cancel: CancellationToken::new(),
            textures: Vec::new(),
            framebuffers: Vec::new(),
        }
    }
}

#[async_trait]
impl StreamNode for Passthrough {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new("passthrough")
            .with_port(PortDescriptor::input("in", PortKind::Video))
            .with_port(PortDescriptor::output("out", PortKind::Video))
    }

    async fn create(&mut self, _ctx: &RuntimeContext) -> Result<()> {
        log(&self.hooks, "create");
        self.cancel = CancellationToken::new();
        Ok(())
    }

    fn create_output(&mut self, _port: &PortId) -> Result<Connection> {
        let conn = self
            .output
            .get_or_insert_with(|| Connection::new(PortKind::Video, 3));
        Ok(conn.clone())
    }

    fn connect_input(&mut self, _port: &PortId, handle: ConsumerHandle) -> Result<()> {
        self.input = Some(handle);
        Ok(())
    }

    async fn initialize(&mut self, ctx: &RuntimeContext) -> Result<()> {
        log(&self.hooks, "initialize");
        let (Some(input), Some(output)) = (&self.input, &self.output) else {
            return Ok(());
        };
        // Transitive resolution: suspend until upstream resolved.
        let config = input.config().await?;
        let ConnectionConfig::Video(video) = &config else {
            return Err(PipelineError::IncompatibleConfig(
                "passthrough expects a video edge".to_string(),
            ));
        };
        log(&self.hooks, format!("config {}x{}", video.width, video.height));

        // One render target per pool slot, keyed by slot id.
        let (width, height, format) = (video.width, video.height, video.format);
        for _ in 0..output.capacity() {
            let (texture, framebuffer) = ctx
                .with_gpu(move |gpu| {
                    let texture = gpu
                        .backend()
                        .create_texture(&TextureDescriptor::two_d(width, height, format))?;
                    let framebuffer = gpu.backend().create_framebuffer(texture)?;
                    Ok((texture, framebuffer))
                })
                .await?;
            self.textures.push(texture);
            self.framebuffers.push(framebuffer);
        }

        output.set_config(config)?;
        output.prime(
            self.textures
                .iter()
                .map(|texture| StreamEvent::new(mediagraph::EventPayload::Texture(*texture)))
                .collect(),
        )?;
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        log(&self.hooks, "start");
        let (Some(mut input), Some(output)) = (self.input.take(), self.output.clone()) else {
            return Ok(());
        };
        let hooks = Arc::clone(&self.hooks);
        let cancel = self.cancel.clone();
        let framebuffers = self.framebuffers.clone();
        self.task = Some(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    acquired = input.acquire() => match acquired {
                        Ok(event) => event,
                        Err(_) => break,
                    },
                };
                let eos = event.eos;
                let Ok(mut forwarded) = output.acquire().await else {
                    input.release(event);
                    break;
                };
                // The slot id picks the render target; no identity
                // comparison against primed payloads.
                let _target = framebuffers[forwarded.slot().index()];
                forwarded.stamp(event.timestamp_ns, event.sequence);
                if eos {
                    forwarded.mark_eos();
                }
                input.release(event);
                if output.release(forwarded).await.is_err() {
                    break;
                }
                if eos {
                    break;
                }
            }
            log(&hooks, "loop_exited");
        }));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        log(&self.hooks, "stop_begin");
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        if let Some(output) = &self.output {
            let _ = output.drain().await;
        }
        log(&self.hooks, "stop_end");
        Ok(())
    }

    async fn release(&mut self, ctx: &RuntimeContext) -> Result<()> {
        log(&self.hooks, "release");
        let textures = std::mem::take(&mut self.textures);
        let framebuffers = std::mem::take(&mut self.framebuffers);
        if !textures.is_empty() || !framebuffers.is_empty() {
            ctx.with_gpu(move |gpu| {
                for framebuffer in framebuffers {
                    gpu.backend().release_framebuffer(framebuffer);
                }
                for texture in textures {
                    gpu.backend().release_texture(texture);
                }
                Ok(())
            })
            .await?;
        }
        if let Some(output) = self.output.take() {
            output.close();
        }
        self.input = None;
        Ok(())
    }
}

/// Source whose initialize fails (camera permission denied, bad format,
/// ...). Its output connection exists but never resolves a config.
struct FailingSource {
    output: Option<Connection>,
}

#[async_trait]
impl StreamNode for FailingSource {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new("failing_source")
            .with_port(PortDescriptor::output("video", PortKind::Video))
    }

    fn create_output(&mut self, _port: &PortId) -> Result<Connection> {
        let conn = self
            .output
            .get_or_insert_with(|| Connection::new(PortKind::Video, 3));
        Ok(conn.clone())
    }

    async fn initialize(&mut self, _ctx: &RuntimeContext) -> Result<()> {
        Err(PipelineError::ResourceInit(
            "camera permission denied".to_string(),
        ))
    }
}

/// Node with no ports at all.
struct Inert;

impl StreamNode for Inert {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new("inert")
    }
}

#[derive(Default)]
struct CountingState {
    events: AtomicUsize,
    eos: AtomicUsize,
}

#[derive(Clone, Default)]
struct CountingSink {
    state: Arc<CountingState>,
}

impl SinkDelegate for CountingSink {
    fn on_event(&mut self, event: &StreamEvent) {
        if !event.eos {
            self.state.events.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn on_eos(&mut self) {
        self.state.eos.fetch_add(1, Ordering::SeqCst);
    }
}

async fn push_all(feed: &mediagraph::core::nodes::CaptureFeed, frames: usize, bytes: usize) {
    for seq in 0..frames {
        let frame = CaptureFrame {
            pixels: PixelBuffer::zeroed(bytes),
            timestamp_ns: seq as i64 * 33_000_000,
        };
        while !feed.push(frame.clone()) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[tokio::test]
async fn hooks_run_in_order_and_release_waits_for_loop_join() {
    mediagraph::core::observability::init_tracing();
    let hooks: HookLog = HookLog::default();
    let mut rt = GraphRuntime::builder().build().expect("build");

    let source = CaptureSource::new(video_config(400, 300));
    let feed = source.feed();
    let sink = CountingSink::default();
    let state = Arc::clone(&sink.state);

    rt.add_node("camera", source).await.unwrap();
    rt.add_node("filter", Passthrough::new(Arc::clone(&hooks)))
        .await
        .unwrap();
    rt.add_node("preview", FrameSink::new(PortKind::Video, sink))
        .await
        .unwrap();
    rt.add_link(
        PortAddress::new("camera", "video"),
        PortAddress::new("filter", "in"),
    )
    .await
    .unwrap();
    rt.add_link(
        PortAddress::new("filter", "out"),
        PortAddress::new("preview", "in"),
    )
    .await
    .unwrap();

    rt.start().await.expect("start");
    assert_eq!(rt.state(), RuntimeState::Running);

    push_all(&feed, 5, video_config(400, 300).frame_bytes()).await;
    feed.finish();
    tokio::time::timeout(Duration::from_secs(2), async {
        while state.eos.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("EOS flowed through the chain");

    rt.stop().await.expect("stop");

    let entries = hooks.lock().clone();
    // The derived config proves initialize awaited the upstream edge.
    assert!(entries.contains(&"config 400x300".to_string()));

    let position = |name: &str| {
        entries
            .iter()
            .position(|e| e == name)
            .unwrap_or_else(|| panic!("missing hook {name}: {entries:?}"))
    };
    assert!(position("create") < position("initialize"));
    assert!(position("initialize") < position("start"));
    assert!(position("start") < position("stop_begin"));
    // The loop fully joined inside stop(), and release came after.
    assert!(position("loop_exited") < position("stop_end"));
    assert!(position("stop_end") < position("release"));

    assert_eq!(state.events.load(Ordering::SeqCst), 5);
    assert_eq!(state.eos.load(Ordering::SeqCst), 1);
    rt.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn failing_node_disables_only_its_subgraph() {
    let hooks: HookLog = HookLog::default();
    let mut rt = GraphRuntime::builder().build().expect("build");

    // Broken chain: failing source -> passthrough -> sink.
    rt.add_node("broken_camera", FailingSource { output: None })
        .await
        .unwrap();
    rt.add_node("broken_filter", Passthrough::new(Arc::clone(&hooks)))
        .await
        .unwrap();
    rt.add_node(
        "broken_preview",
        FrameSink::new(PortKind::Video, CountingSink::default()),
    )
    .await
    .unwrap();
    rt.add_link(
        PortAddress::new("broken_camera", "video"),
        PortAddress::new("broken_filter", "in"),
    )
    .await
    .unwrap();
    rt.add_link(
        PortAddress::new("broken_filter", "out"),
        PortAddress::new("broken_preview", "in"),
    )
    .await
    .unwrap();

    // Healthy pair in the same graph.
    let source = CaptureSource::new(video_config(320, 240));
    let feed = source.feed();
    let sink = CountingSink::default();
    let state = Arc::clone(&sink.state);
    rt.add_node("camera", source).await.unwrap();
    rt.add_node("preview", FrameSink::new(PortKind::Video, sink))
        .await
        .unwrap();
    rt.add_link(
        PortAddress::new("camera", "video"),
        PortAddress::new("preview", "in"),
    )
    .await
    .unwrap();

    rt.start().await.expect("start succeeds despite failures");
    assert_eq!(rt.state(), RuntimeState::Running);

    // The failure is isolated; the hard dependency cascades.
    assert_eq!(
        rt.node_state(&"broken_camera".into()),
        Some(NodeState::Failed)
    );
    assert_eq!(
        rt.node_state(&"broken_filter".into()),
        Some(NodeState::Failed),
        "dependent awaiting the failed config is marked non-startable"
    );
    assert_eq!(rt.node_state(&"camera".into()), Some(NodeState::Started));
    assert_eq!(rt.node_state(&"preview".into()), Some(NodeState::Started));

    // The healthy chain still flows.
    push_all(&feed, 3, video_config(320, 240).frame_bytes()).await;
    feed.finish();
    tokio::time::timeout(Duration::from_secs(2), async {
        while state.eos.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("healthy chain unaffected");
    assert_eq!(state.events.load(Ordering::SeqCst), 3);

    rt.stop().await.expect("stop");
    rt.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn zero_link_node_is_inert_not_an_error() {
    let mut rt = GraphRuntime::builder().build().expect("build");
    rt.add_node("floater", Inert).await.unwrap();
    // An unlinked source is also legal: its output is never created.
    rt.add_node("camera", CaptureSource::new(video_config(64, 64)))
        .await
        .unwrap();

    rt.start().await.expect("start");
    assert_eq!(rt.node_state(&"floater".into()), Some(NodeState::Started));
    assert_eq!(rt.node_state(&"camera".into()), Some(NodeState::Started));
    rt.stop().await.expect("stop");
    rt.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn pause_suspends_source_and_resume_restores_it() {
    let mut rt = GraphRuntime::builder().build().expect("build");

    let source = CaptureSource::new(video_config(64, 64));
    let feed = source.feed();
    let sink = CountingSink::default();
    let state = Arc::clone(&sink.state);
    rt.add_node("camera", source).await.unwrap();
    rt.add_node("preview", FrameSink::new(PortKind::Video, sink))
        .await
        .unwrap();
    rt.add_link(
        PortAddress::new("camera", "video"),
        PortAddress::new("preview", "in"),
    )
    .await
    .unwrap();
    rt.start().await.expect("start");

    let bytes = video_config(64, 64).frame_bytes();
    push_all(&feed, 2, bytes).await;
    tokio::time::timeout(Duration::from_secs(2), async {
        while state.events.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("frames flow before pause");

    rt.pause().await.expect("pause");
    assert_eq!(rt.node_state(&"camera".into()), Some(NodeState::Paused));
    // Let in-flight buffers settle, then verify the tap is off.
    tokio::time::sleep(Duration::from_millis(30)).await;
    let at_pause = state.events.load(Ordering::SeqCst);
    for seq in 0..3 {
        let _ = feed.push(CaptureFrame {
            pixels: PixelBuffer::zeroed(bytes),
            timestamp_ns: seq * 1_000,
        });
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        state.events.load(Ordering::SeqCst),
        at_pause,
        "paused source must not emit"
    );

    rt.resume().await.expect("resume");
    tokio::time::timeout(Duration::from_secs(2), async {
        while state.events.load(Ordering::SeqCst) <= at_pause {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("frames flow after resume");

    feed.finish();
    rt.stop().await.expect("stop");
    rt.shutdown().await.expect("shutdown");
}

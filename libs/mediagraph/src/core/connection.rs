//! Typed connection between one producer port and its consumer lanes.
//!
//! A connection owns a fixed set of reusable [`StreamEvent`] buffers,
//! primed once at node initialization. The pool is the backpressure
//! mechanism: a producer that has published every primed buffer suspends
//! in [`Connection::acquire`] until a consumer returns one. Fan-out
//! duplicates the handoff path per consumer lane while the payload is
//! shared read-only; a slot re-enters the free pool only when every lane
//! has released its clone.
//!
//! Shutdown is a data-plane event: the producer marks one terminal event
//! `eos` and releases it like any other. [`Connection::close`] exists
//! for abnormal teardown only and fails waiters with
//! [`PipelineError::ClosedConnection`] so loops exit instead of hanging.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{Notify, mpsc, watch};

use crate::core::config::ConnectionConfig;
use crate::core::error::{PipelineError, Result};
use crate::core::event::{SlotId, StreamEvent};
use crate::core::ports::PortKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "connection-{}", self.0)
    }
}

#[derive(Clone)]
struct Lane {
    id: u64,
    tx: mpsc::Sender<StreamEvent>,
}

struct ConnectionInner {
    id: ConnectionId,
    kind: PortKind,
    capacity: usize,
    primed: AtomicBool,
    closed: AtomicBool,
    closed_notify: Notify,
    config_tx: watch::Sender<Option<ConnectionConfig>>,
    free_tx: mpsc::Sender<StreamEvent>,
    free_rx: tokio::sync::Mutex<mpsc::Receiver<StreamEvent>>,
    lanes: RwLock<Vec<Lane>>,
    /// Clones still out per slot; a slot is reclaimed at zero.
    outstanding: Mutex<AHashMap<usize, usize>>,
    next_lane_id: AtomicU64,
}

impl ConnectionInner {
    fn closed_error(&self) -> PipelineError {
        PipelineError::ClosedConnection(self.id.to_string())
    }

    /// Count down one returned clone; push the slot back to the free
    /// pool once every lane has released it.
    fn reclaim(&self, event: StreamEvent) {
        let remaining = {
            let mut outstanding = self.outstanding.lock();
            match outstanding.get_mut(&event.slot().index()) {
                Some(count) => {
                    *count -= 1;
                    let remaining = *count;
                    if remaining == 0 {
                        outstanding.remove(&event.slot().index());
                    }
                    remaining
                }
                // Not tracked: the slot never left the producer side.
                None => 0,
            }
        };
        if remaining == 0 {
            // Capacity equals the primed count, so the pool can never be full.
            let _ = self.free_tx.try_send(event);
        }
    }

    fn remove_lane(&self, lane_id: u64) {
        self.lanes.write().retain(|lane| lane.id != lane_id);
    }
}

/// Producer-side handle to an edge. Cheap to clone; all clones refer to
/// the same pool and lanes.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub fn new(kind: PortKind, capacity: usize) -> Self {
        assert!(capacity > 0, "connection capacity must be non-zero");
        let (free_tx, free_rx) = mpsc::channel(capacity);
        let (config_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(ConnectionInner {
                id: ConnectionId::new(),
                kind,
                capacity,
                primed: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                closed_notify: Notify::new(),
                config_tx,
                free_tx,
                free_rx: tokio::sync::Mutex::new(free_rx),
                lanes: RwLock::new(Vec::new()),
                outstanding: Mutex::new(AHashMap::new()),
                next_lane_id: AtomicU64::new(0),
            }),
        }
    }

    /// Create with the default pool depth for the port kind.
    pub fn with_default_capacity(kind: PortKind) -> Self {
        Self::new(kind, kind.default_capacity())
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn kind(&self) -> PortKind {
        self.inner.kind
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Seed the pool with its initial buffers. Called exactly once,
    /// during node initialization, with exactly `capacity` events.
    /// Slot ids are assigned 0..capacity here.
    pub fn prime(&self, events: Vec<StreamEvent>) -> Result<()> {
        if self.inner.primed.swap(true, Ordering::AcqRel) {
            return Err(PipelineError::LifecycleViolation(format!(
                "{} primed twice",
                self.inner.id
            )));
        }
        if events.len() != self.inner.capacity {
            return Err(PipelineError::LifecycleViolation(format!(
                "{} primed with {} events, capacity is {}",
                self.inner.id,
                events.len(),
                self.inner.capacity
            )));
        }
        for (index, mut event) in events.into_iter().enumerate() {
            event.assign_slot(SlotId(index));
            let _ = self.inner.free_tx.try_send(event);
        }
        tracing::debug!(
            "{} primed with {} buffers ({})",
            self.inner.id,
            self.inner.capacity,
            self.inner.kind
        );
        Ok(())
    }

    /// Resolve the negotiated config. Consumers suspended in
    /// [`Connection::config`] wake once this is called.
    pub fn set_config(&self, config: ConnectionConfig) -> Result<()> {
        if config.kind() != self.inner.kind {
            return Err(PipelineError::IncompatibleConfig(format!(
                "{} carries {}, config describes {}",
                self.inner.id,
                self.inner.kind,
                config.kind()
            )));
        }
        if self.inner.config_tx.borrow().is_some() {
            return Err(PipelineError::LifecycleViolation(format!(
                "{} config set twice",
                self.inner.id
            )));
        }
        // send_replace stores the value even with no subscribers yet.
        self.inner.config_tx.send_replace(Some(config));
        Ok(())
    }

    /// Await the negotiated config; fails with `ClosedConnection` if the
    /// producer is torn down before resolving it.
    pub async fn config(&self) -> Result<ConnectionConfig> {
        let mut rx = self.inner.config_tx.subscribe();
        loop {
            if let Some(config) = rx.borrow_and_update().clone() {
                return Ok(config);
            }
            let notified = self.inner.closed_notify.notified();
            if self.is_closed() {
                return Err(self.inner.closed_error());
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(self.inner.closed_error());
                    }
                }
                _ = notified => {}
            }
        }
    }

    /// Non-suspending config access.
    pub fn try_config(&self) -> Result<ConnectionConfig> {
        self.inner
            .config_tx
            .borrow()
            .clone()
            .ok_or_else(|| PipelineError::ConfigUnresolved(self.inner.id.to_string()))
    }

    /// Producer side: suspend until a free buffer returns from the pool.
    ///
    /// Cancel-safe: aborting a task parked here loses no event.
    pub async fn acquire(&self) -> Result<StreamEvent> {
        let mut rx = self.inner.free_rx.lock().await;
        loop {
            // Drain anything already queued, even after close, so
            // teardown paths can still recover buffers.
            match rx.try_recv() {
                Ok(event) => return Ok(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }
            let notified = self.inner.closed_notify.notified();
            if self.is_closed() {
                return Err(self.inner.closed_error());
            }
            tokio::select! {
                biased;
                event = rx.recv() => {
                    return event.ok_or_else(|| self.inner.closed_error());
                }
                _ = notified => {}
            }
        }
    }

    /// Producer side: publish a filled event to every consumer lane.
    ///
    /// The event is cloned for all lanes but the last, which takes the
    /// original; payload handles are shared read-only. With no lanes
    /// linked the event goes straight back to the pool, so an unlinked
    /// output is inert rather than an error.
    pub async fn release(&self, event: StreamEvent) -> Result<()> {
        if self.is_closed() {
            self.inner.reclaim(event);
            return Err(self.inner.closed_error());
        }
        let lanes: Vec<Lane> = self.inner.lanes.read().clone();
        if lanes.is_empty() {
            let _ = self.inner.free_tx.try_send(event);
            return Ok(());
        }
        self.inner
            .outstanding
            .lock()
            .insert(event.slot().index(), lanes.len());
        let (last, rest) = lanes.split_last().expect("lanes non-empty");
        for lane in rest {
            if let Err(send_error) = lane.tx.send(event.clone()).await {
                // Lane receiver went away mid-publish; count its clone
                // as already returned.
                self.inner.reclaim(send_error.0);
            }
        }
        if let Err(send_error) = last.tx.send(event).await {
            self.inner.reclaim(send_error.0);
        }
        Ok(())
    }

    /// Register a new consumer lane. Lanes added while running only see
    /// events published after registration.
    pub fn add_consumer(&self) -> ConsumerHandle {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_lane_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lanes.write().push(Lane { id, tx });
        ConsumerHandle {
            lane_id: id,
            rx,
            conn: self.clone(),
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.inner.lanes.read().len()
    }

    /// Producer-side teardown aid: wait until every primed buffer is
    /// back in the pool and take them all, so payload resources can be
    /// freed. After an abnormal [`Connection::close`] this returns
    /// whatever could still be recovered.
    pub async fn drain(&self) -> Vec<StreamEvent> {
        let mut recovered = Vec::with_capacity(self.inner.capacity);
        let mut rx = self.inner.free_rx.lock().await;
        while recovered.len() < self.inner.capacity {
            match rx.try_recv() {
                Ok(event) => {
                    recovered.push(event);
                    continue;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }
            let notified = self.inner.closed_notify.notified();
            if self.is_closed() {
                break;
            }
            tokio::select! {
                biased;
                event = rx.recv() => {
                    match event {
                        Some(event) => recovered.push(event),
                        None => break,
                    }
                }
                _ = notified => {}
            }
        }
        recovered
    }

    /// Abnormal teardown: fail all current and future waiters with
    /// `ClosedConnection`. Idempotent. Orderly shutdown should flow an
    /// EOS event instead.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("{} closed", self.inner.id);
        }
        self.inner.closed_notify.notify_waiters();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("capacity", &self.inner.capacity)
            .field("consumers", &self.consumer_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Consumer side of one fan-out lane.
///
/// Dropping the handle detaches the lane and reclaims anything still
/// queued on it, so an aborted consumer never shrinks the pool.
pub struct ConsumerHandle {
    lane_id: u64,
    rx: mpsc::Receiver<StreamEvent>,
    conn: Connection,
}

impl ConsumerHandle {
    pub fn kind(&self) -> PortKind {
        self.conn.kind()
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.conn.id()
    }

    /// Await the edge's negotiated config.
    pub async fn config(&self) -> Result<ConnectionConfig> {
        self.conn.config().await
    }

    pub fn try_config(&self) -> Result<ConnectionConfig> {
        self.conn.try_config()
    }

    /// Suspend until the producer publishes the next event.
    ///
    /// Events are delivered in submission order; EOS arrives after all
    /// data events. Cancel-safe.
    pub async fn acquire(&mut self) -> Result<StreamEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Ok(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }
            let notified = self.conn.inner.closed_notify.notified();
            if self.conn.is_closed() {
                return Err(self.conn.inner.closed_error());
            }
            tokio::select! {
                biased;
                event = self.rx.recv() => {
                    return event.ok_or_else(|| self.conn.inner.closed_error());
                }
                _ = notified => {}
            }
        }
    }

    /// Return an event toward the pool once this consumer is done with
    /// it. The slot becomes reusable when every lane has released it.
    pub fn release(&self, event: StreamEvent) {
        self.conn.inner.reclaim(event);
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.conn.inner.remove_lane(self.lane_id);
        // Reclaim everything still queued so the pool is made whole.
        while let Ok(event) = self.rx.try_recv() {
            self.conn.inner.reclaim(event);
        }
        self.rx.close();
        while let Ok(event) = self.rx.try_recv() {
            self.conn.inner.reclaim(event);
        }
    }
}

impl std::fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("lane", &self.lane_id)
            .field("connection", &self.conn.id())
            .finish()
    }
}

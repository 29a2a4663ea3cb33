// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Multi-input fan-in with coalesced, rate-bounded recomputation.
//!
//! Nodes with several independently-paced upstream edges (a LUT filter
//! fed by a video stream and a separately-updating 3D texture, a
//! feedback simulation fed by two textures) drive one computation from
//! the latest value of every input. [`DebouncedJoin`] keeps one
//! "last seen" event per input, recycles the previous one on arrival,
//! and paces recomputation: however many inputs update inside one
//! window, the caller runs exactly one recompute with the newest
//! values.

use std::time::Duration;

use tokio::time::Instant;

use crate::core::connection::ConsumerHandle;
use crate::core::error::{PipelineError, Result};
use crate::core::event::StreamEvent;

/// Index of an input within a join, as returned by
/// [`DebouncedJoin::add_input`].
pub type JoinIndex = usize;

struct JoinInput {
    handle: ConsumerHandle,
    latest: Option<StreamEvent>,
    eos: bool,
}

/// Merges N consumer handles into one "latest values" state.
///
/// Drive it poll-style:
///
/// ```ignore
/// while join.next().await?.is_some() {
///     let video = join.latest(video_in);
///     let lut = join.latest(lut_in);
///     // recompute with the freshest pair
/// }
/// join.finish();
/// // forward EOS on the node's own outputs
/// ```
pub struct DebouncedJoin {
    inputs: Vec<JoinInput>,
    min_interval: Duration,
    next_run: Instant,
    dirty: bool,
}

impl DebouncedJoin {
    /// `min_interval` is the floor between two recomputations, normally
    /// the frame clock's target frame duration.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            inputs: Vec::new(),
            min_interval,
            next_run: Instant::now(),
            dirty: false,
        }
    }

    /// Pace recomputation at the runtime's target frame rate.
    pub fn with_frame_clock(clock: &crate::core::clock::FrameClock) -> Self {
        Self::new(clock.frame_duration())
    }

    pub fn add_input(&mut self, handle: ConsumerHandle) -> JoinIndex {
        self.inputs.push(JoinInput {
            handle,
            latest: None,
            eos: false,
        });
        self.inputs.len() - 1
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Latest data event seen on an input. Stays valid after that input
    /// reached EOS, so late recomputes still have a full set of values.
    pub fn latest(&self, index: JoinIndex) -> Option<&StreamEvent> {
        self.inputs.get(index).and_then(|i| i.latest.as_ref())
    }

    pub fn all_eos(&self) -> bool {
        self.inputs.iter().all(|i| i.eos)
    }

    /// Suspend until the next recomputation is due.
    ///
    /// Returns `Some(())` when the caller should recompute with the
    /// current latest values, `None` once every input has delivered its
    /// EOS and no recompute is pending. No ordering between inputs is
    /// assumed; updates arriving while a recompute runs are merged into
    /// a single follow-up trigger.
    pub async fn next(&mut self) -> Result<Option<()>> {
        loop {
            if self.dirty && Instant::now() >= self.next_run {
                self.dirty = false;
                self.next_run = Instant::now() + self.min_interval;
                return Ok(Some(()));
            }

            let active = self.inputs.iter().filter(|i| !i.eos).count();
            if active == 0 {
                if self.dirty {
                    tokio::time::sleep_until(self.next_run).await;
                    continue;
                }
                return Ok(None);
            }

            let deadline = if self.dirty { Some(self.next_run) } else { None };
            let Some((index, outcome)) = self.poll_winner(deadline).await else {
                // Rate-limit window elapsed with a pending trigger.
                continue;
            };

            match outcome {
                Ok(event) => self.store(index, event),
                Err(PipelineError::ClosedConnection(_)) => {
                    // Abnormal upstream teardown counts as end of that
                    // input; keep its last value like a normal EOS.
                    self.inputs[index].eos = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Race the active inputs for the next arrival, bounded by an
    /// optional rate-limit deadline. Returns the winning input's index
    /// and its acquire outcome, or `None` if the deadline elapsed first.
    async fn poll_winner(
        &mut self,
        deadline: Option<Instant>,
    ) -> Option<(JoinIndex, Result<StreamEvent>)> {
        let arrivals: Vec<_> = self
            .inputs
            .iter_mut()
            .enumerate()
            .filter(|(_, input)| !input.eos)
            .map(|(index, input)| {
                Box::pin(async move { (index, input.handle.acquire().await) })
            })
            .collect();
        let race = futures::future::select_all(arrivals);

        match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, race).await {
                Ok(((index, outcome), _, _rest)) => Some((index, outcome)),
                Err(_) => None,
            },
            None => {
                let ((index, outcome), _, _rest) = race.await;
                Some((index, outcome))
            }
        }
    }

    fn store(&mut self, index: JoinIndex, event: StreamEvent) {
        let input = &mut self.inputs[index];
        if event.eos {
            input.eos = true;
            // The EOS marker itself carries no fresh data; hand it back
            // and keep the input's previous value live.
            input.handle.release(event);
            return;
        }
        if let Some(previous) = input.latest.replace(event) {
            input.handle.release(previous);
        }
        self.dirty = true;
    }

    /// Recycle every held event and drop the input handles. Call after
    /// [`DebouncedJoin::next`] returned `None` (or on abrupt teardown)
    /// and before forwarding EOS downstream.
    pub fn finish(&mut self) {
        for input in &mut self.inputs {
            if let Some(event) = input.latest.take() {
                input.handle.release(event);
            }
        }
        self.inputs.clear();
    }
}

impl Drop for DebouncedJoin {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for DebouncedJoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedJoin")
            .field("inputs", &self.inputs.len())
            .field("min_interval", &self.min_interval)
            .field("dirty", &self.dirty)
            .finish()
    }
}

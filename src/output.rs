use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::debug;
use tokio::time::Instant;

use crate::model::output::OutputMessage;

/// The result of [`OutputPipeline::enqueue`].
#[derive(Debug, PartialEq)]
pub(crate) enum Enqueued {
    /// An equal message was sent within the rolling window; the message was dropped.
    Discarded,
    /// The message waits for the next flush.
    Queued,
    /// The queue reached its maximum size and was drained into the contained batch.
    Full(Vec<OutputMessage>),
}

struct PipelineState {
    queue: Vec<OutputMessage>,
    sent: HashMap<String, Instant>,
}

/// Bounded, rate-limited queue of outgoing messages.
///
/// A message is discarded when a structurally equal one was accepted within
/// the rolling window. Messages are handed out in enqueue order.
pub(crate) struct OutputPipeline {
    max_messages: usize,
    rolling_window: Duration,
    state: Mutex<PipelineState>,
}

impl OutputPipeline {
    pub fn new(max_messages: usize, rolling_window: Duration) -> Self {
        Self {
            max_messages,
            rolling_window,
            state: Mutex::new(PipelineState {
                queue: Vec::new(),
                sent: HashMap::new(),
            }),
        }
    }

    pub fn enqueue(&self, message: OutputMessage) -> Enqueued {
        let identity = message.identity();
        let now = Instant::now();
        let mut state = self.state();

        if let Some(sent_at) = state.sent.get(&identity) {
            if now.saturating_duration_since(*sent_at) < self.rolling_window {
                debug!("Output message discarded by the rate limiter: {identity}");
                return Enqueued::Discarded;
            }
        }

        state.sent.insert(identity, now);
        state.queue.push(message);
        if state.queue.len() >= self.max_messages {
            return Enqueued::Full(self.drain(&mut state, now));
        }
        Enqueued::Queued
    }

    /// Swaps out the pending queue and forgets rate-limit entries older than the rolling window.
    pub fn take_batch(&self) -> Vec<OutputMessage> {
        let mut state = self.state();
        self.drain(&mut state, Instant::now())
    }

    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    fn drain(&self, state: &mut PipelineState, now: Instant) -> Vec<OutputMessage> {
        let window = self.rolling_window;
        state
            .sent
            .retain(|_, sent_at| now.saturating_duration_since(*sent_at) < window);
        std::mem::take(&mut state.queue)
    }

    fn state(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

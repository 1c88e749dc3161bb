//! Backpressure for per-subscriber outbound queues
//!
//! Each WebSocket session owns one bounded queue drained by its writer
//! task. When a queue is full the policy depends on what is being lost:
//! a stale price tick may be dropped, a private order or trade event may
//! not: the session is disconnected instead and the client resyncs on
//! reconnect.

use std::collections::VecDeque;

use thiserror::Error;

use crate::envelope::Envelope;
use crate::topics;

/// Default outbound queue capacity per session.
pub const DEFAULT_CAPACITY: usize = 256;

/// What to do with a frame that does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the oldest queued frame to make room.
    DropOldest,
    /// Refuse and disconnect the session.
    Disconnect,
}

impl OverflowPolicy {
    /// Policy for one envelope: price ticks are droppable, everything
    /// else (private events, confirmations) forces a disconnect.
    pub fn for_envelope(envelope: &Envelope) -> Self {
        match envelope.topic.as_deref() {
            Some(topic) if topic.starts_with(topics::PRICE_PREFIX) => OverflowPolicy::DropOldest,
            _ => OverflowPolicy::Disconnect,
        }
    }
}

/// The session must be disconnected: an undroppable frame did not fit.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("outbound queue full, session must disconnect")]
pub struct QueueOverflow;

/// Bounded FIFO of envelopes awaiting the writer task.
#[derive(Debug)]
pub struct OutboundQueue {
    frames: VecDeque<Envelope>,
    capacity: usize,
    dropped: u64,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Enqueue a frame under the given overflow policy.
    pub fn push(&mut self, envelope: Envelope, policy: OverflowPolicy) -> Result<(), QueueOverflow> {
        if self.frames.len() >= self.capacity {
            match policy {
                OverflowPolicy::Disconnect => return Err(QueueOverflow),
                OverflowPolicy::DropOldest => {
                    self.frames.pop_front();
                    self.dropped += 1;
                }
            }
        }
        self.frames.push_back(envelope);
        Ok(())
    }

    /// Take every queued frame for writing.
    pub fn drain(&mut self) -> Vec<Envelope> {
        self.frames.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total frames dropped to date.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

//! Ordered dispatch of synthesized audio segments.
//!
//! Synthesis requests are issued in strict left-to-right sentence order, but
//! their completions arrive whenever the TTS collaborator finishes — a later
//! sentence's audio routinely lands before an earlier one's. The
//! [`PlaybackQueue`] matches each completion to the position its *request*
//! was issued at, and releases segments only in that order: the queue, not
//! the network, determines playback order.
//!
//! It also reconciles "upstream stream ended" with "queue drained" into a
//! single terminal transition, so the session does not flash back to idle
//! while later sentences are still being synthesized.

use std::collections::BTreeMap;

/// One synthesized audio payload, tagged with its request position.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Position in request-issue order.
    pub seq: u64,
    /// Opaque encoded audio.
    pub audio: Vec<u8>,
}

#[derive(Debug)]
enum Slot {
    /// Synthesis in flight.
    Pending,
    /// Audio arrived, waiting for its predecessors.
    Ready(Vec<u8>),
    /// Synthesis failed; the slot is skipped so successors can play.
    Failed,
}

/// Request-order reorder buffer with exactly-once terminal arbitration.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    /// Next seq to assign to a registration.
    next_seq: u64,
    /// Next seq eligible for dispatch.
    next_dispatch: u64,
    slots: BTreeMap<u64, Slot>,
    /// Whether the upstream audio stream has been declared complete.
    ended: bool,
    /// Whether the terminal transition has been taken.
    terminal_fired: bool,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next position in playback order. Called at request-issue
    /// time, before the synthesis call is made.
    pub fn register(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(seq, Slot::Pending);
        seq
    }

    /// Records a completed synthesis and returns every segment that became
    /// dispatchable, strictly in seq order.
    ///
    /// Completions for unknown or already-dispatched positions are ignored.
    pub fn complete(&mut self, seq: u64, audio: Vec<u8>) -> Vec<AudioSegment> {
        match self.slots.get_mut(&seq) {
            Some(slot @ Slot::Pending) => *slot = Slot::Ready(audio),
            _ => {
                tracing::debug!(seq, "ignoring completion for unknown or settled slot");
                return Vec::new();
            }
        }
        self.drain_ready()
    }

    /// Records a failed synthesis. The slot is skipped — exactly that
    /// sentence's audio is absent — and any successors it was blocking are
    /// returned for dispatch.
    pub fn fail(&mut self, seq: u64) -> Vec<AudioSegment> {
        match self.slots.get_mut(&seq) {
            Some(slot @ Slot::Pending) => *slot = Slot::Failed,
            _ => return Vec::new(),
        }
        self.drain_ready()
    }

    /// Marks the upstream audio stream as complete: no further registrations
    /// belong to this turn.
    pub fn end_of_stream(&mut self) {
        self.ended = true;
    }

    /// Whether audio is still pending or waiting to dispatch. Used to
    /// suppress text-side status broadcasts while the character is speaking.
    pub fn is_active(&self) -> bool {
        self.next_dispatch < self.next_seq
    }

    /// Whether every registered position has been dispatched or skipped.
    pub fn is_drained(&self) -> bool {
        self.next_dispatch == self.next_seq
    }

    /// Takes the terminal transition. Returns `true` exactly once, and only
    /// when the queue is drained *and* the end-of-stream signal has been
    /// received.
    pub fn take_terminal(&mut self) -> bool {
        if self.ended && self.is_drained() && !self.terminal_fired {
            self.terminal_fired = true;
            true
        } else {
            false
        }
    }

    /// Advances past every contiguous Ready/Failed slot from the dispatch
    /// cursor, collecting the ready ones.
    fn drain_ready(&mut self) -> Vec<AudioSegment> {
        let mut out = Vec::new();
        while let Some(slot) = self.slots.get(&self.next_dispatch) {
            match slot {
                Slot::Pending => break,
                Slot::Ready(_) => {
                    let seq = self.next_dispatch;
                    if let Some(Slot::Ready(audio)) = self.slots.remove(&seq) {
                        out.push(AudioSegment { seq, audio });
                    }
                }
                Slot::Failed => {
                    self.slots.remove(&self.next_dispatch);
                }
            }
            self.next_dispatch += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests;

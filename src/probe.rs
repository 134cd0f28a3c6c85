//! Header accumulation ahead of the streaming transition.
//!
//! Until a stream's dimensions are known, no output buffer can exist and
//! no engine can run, so arriving chunks pile up here. Buffering is
//! cumulative — a chunk that does not complete the header stays buffered
//! and the next chunk is appended after it — and the whole backlog is
//! handed to the engine in one piece when the session switches to
//! streaming.

use alloc::vec::Vec;

use log::{debug, trace};

use crate::codec::{ProbeStatus, StreamCodec};
use crate::format::ImageFormat;

/// Accumulates leading stream bytes until a codec probe succeeds.
#[derive(Debug, Default)]
pub struct HeaderAccumulator {
    pending: Vec<u8>,
}

impl HeaderAccumulator {
    /// An empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes buffered so far.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing has been buffered yet.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Append a chunk and re-probe the accumulated bytes.
    ///
    /// The codec's probe is the authority on the outcome, with one
    /// override: a probe still reporting [`ProbeStatus::NotEnough`] after
    /// [`ImageFormat::RECOMMENDED_PROBE_BYTES`] of input can never
    /// succeed, and is reported as [`ProbeStatus::Invalid`] so the caller
    /// does not buffer an unparseable transfer forever.
    pub fn accumulate<C: StreamCodec>(&mut self, chunk: &[u8], codec: &C) -> ProbeStatus {
        self.pending.extend_from_slice(chunk);
        trace!("probing {} accumulated bytes", self.pending.len());

        match codec.probe(&self.pending) {
            ProbeStatus::NotEnough if self.pending.len() > ImageFormat::RECOMMENDED_PROBE_BYTES => {
                debug!(
                    "header unresolved after {} bytes, giving up",
                    self.pending.len()
                );
                ProbeStatus::Invalid
            }
            status => status,
        }
    }

    /// Take the buffered bytes, leaving the accumulator empty.
    ///
    /// Called on the transition to streaming; the returned backlog is the
    /// engine's first feed.
    pub fn into_pending(self) -> Vec<u8> {
        self.pending
    }
}

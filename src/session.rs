//! Decode session: the state machine driving one image to completion.
//!
//! A [`DecodeSession`] accepts compressed bytes in whatever chunks the
//! transport produces and moves through four phases:
//!
//! ```text
//! Accumulating ──header probed, buffer allocated, engine built──▶ Streaming
//!      │                                                             │
//!      │ corrupt header /                              engine fault  │
//!      │ allocation or init failure                                  │
//!      ▼                                                             ▼
//!    Failed ◀──────────────── abandon ───────────────────────────  Failed
//!                                                                    │
//!                                          decoded area covers image │
//!                                                                    ▼
//!                                                                Finished
//! ```
//!
//! The phases are encoded in the session's internal state, so the
//! structural invariants hold by construction: header bytes are buffered
//! only while accumulating, an engine exists only while streaming, and
//! the output buffer is reachable only once decoding finished. Terminal
//! phases are never left, and the engine is torn down exactly once —
//! on completion, on failure, on abandonment, or when the session is
//! dropped, whichever comes first.

use core::mem;

use enough::Stop;
use log::{debug, trace, warn};

use crate::buffer::{FrameBuffer, FrameBufferProvider, HeapAllocator, PixelDescriptor};
use crate::codec::{
    DecodeEngine, DecoderVariant, FeedStatus, ProbeStatus, StreamCodec, StreamInfo,
};
use crate::error::{FailureKind, SessionError};
use crate::limits::ResourceLimits;
use crate::probe::HeaderAccumulator;
use crate::source::ChunkSource;

/// Read granularity of [`DecodeSession::drive()`].
const DRIVE_CHUNK_BYTES: usize = 2048;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Session configuration.
///
/// # Example
///
/// ```
/// use zenstream::{DecoderVariant, PixelDescriptor, ResourceLimits, SessionConfig};
///
/// let config = SessionConfig::new()
///     .with_descriptor(PixelDescriptor::RGB8_SRGB)
///     .with_variant(DecoderVariant::WholeBuffer)
///     .with_limits(ResourceLimits::none().with_max_pixels(16_000_000));
/// ```
#[derive(Clone, Debug)]
pub struct SessionConfig {
    descriptor: PixelDescriptor,
    variant: DecoderVariant,
    limits: ResourceLimits,
    expected_len: Option<u64>,
}

impl SessionConfig {
    /// Default configuration: RGBA8 output, incremental decoding, no limits.
    pub fn new() -> Self {
        Self {
            descriptor: PixelDescriptor::RGBA8_SRGB,
            variant: DecoderVariant::Incremental,
            limits: ResourceLimits::none(),
            expected_len: None,
        }
    }

    /// Set the output pixel format. Fixed for the session's lifetime.
    pub fn with_descriptor(mut self, descriptor: PixelDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Set the decode strategy.
    pub fn with_variant(mut self, variant: DecoderVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Set resource limits.
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the advertised payload size, if the transport knows it.
    /// Purely informational; progress reporting uses it.
    pub fn with_expected_len(mut self, bytes: u64) -> Self {
        self.expected_len = Some(bytes);
        self
    }

    /// The configured output pixel format.
    pub fn descriptor(&self) -> PixelDescriptor {
        self.descriptor
    }

    /// The configured decode strategy.
    pub fn variant(&self) -> DecoderVariant {
        self.variant
    }

    /// The configured resource limits.
    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Phases and feed status
// ---------------------------------------------------------------------------

/// Externally visible session phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// Buffering leading bytes; dimensions not yet known.
    Accumulating,
    /// Engine active; chunks are decoded as they arrive.
    Streaming,
    /// Decode complete; the output buffer is available.
    Finished,
    /// Terminal failure; see [`DecodeSession::failure()`].
    Failed,
}

impl core::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Accumulating => "accumulating",
            Self::Streaming => "streaming",
            Self::Finished => "finished",
            Self::Failed => "failed",
        })
    }
}

/// Status returned from [`DecodeSession::feed()`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum StreamStatus {
    /// More data is needed before the decode can progress further.
    NeedMoreData,
    /// This feed determined the image dimensions and switched the
    /// session to streaming. Dimensions are now queryable.
    HeaderReady,
    /// The decoded area covers the full image. The session is finished
    /// and [`DecodeSession::into_output()`] releases the pixels.
    Complete,
}

enum State<E> {
    Accumulating { probe: HeaderAccumulator },
    Streaming { engine: E, width: u32, height: u32 },
    Finished { buffer: FrameBuffer },
    Failed { kind: FailureKind },
}

// ---------------------------------------------------------------------------
// DecodeSession
// ---------------------------------------------------------------------------

/// One image decode attempt over a chunked byte stream.
///
/// Single-threaded and cooperative: one logical caller alternates
/// "pull next chunk" and [`feed()`](DecodeSession::feed), or lets
/// [`drive()`](DecodeSession::drive) run that loop. Chunks must arrive
/// in transfer order; the session feeds each one to the codec exactly
/// once with no reordering.
///
/// ```
/// use zenstream::{DecodeSession, PnmCodec, SessionConfig, SliceSource, Unstoppable};
///
/// let image = {
///     let mut bytes = b"P6 2 1 255\n".to_vec();
///     bytes.extend([255, 0, 0, 0, 0, 255]);
///     bytes
/// };
///
/// let mut session = DecodeSession::new(PnmCodec::new(), SessionConfig::default());
/// let mut source = SliceSource::with_chunk_size(&image, 5);
/// session.drive(&mut source, &Unstoppable)?;
///
/// let buffer = session.into_output()?;
/// assert_eq!((buffer.width(), buffer.height()), (2, 1));
/// assert_eq!(&buffer.as_bytes()[..4], &[255, 0, 0, 255]);
/// # Ok::<(), zenstream::SessionError>(())
/// ```
pub struct DecodeSession<C: StreamCodec, P: FrameBufferProvider = HeapAllocator> {
    codec: C,
    provider: P,
    config: SessionConfig,
    state: State<C::Engine>,
    consumed: u64,
    expected: Option<u64>,
}

impl<C: StreamCodec> DecodeSession<C, HeapAllocator> {
    /// Create a session with heap-allocated output.
    pub fn new(codec: C, config: SessionConfig) -> Self {
        Self::with_provider(codec, config, HeapAllocator::new())
    }
}

impl<C: StreamCodec, P: FrameBufferProvider> DecodeSession<C, P> {
    /// Create a session with a custom frame buffer provider.
    pub fn with_provider(codec: C, config: SessionConfig, provider: P) -> Self {
        let expected = config.expected_len;
        Self {
            codec,
            provider,
            config,
            state: State::Accumulating {
                probe: HeaderAccumulator::new(),
            },
            consumed: 0,
            expected,
        }
    }

    /// Feed the next chunk of the transfer.
    ///
    /// Feeding a finished session is a no-op completion check; feeding a
    /// failed session returns the original failure kind as an error.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<StreamStatus, SessionError> {
        let state = mem::replace(
            &mut self.state,
            State::Failed {
                kind: FailureKind::Abandoned,
            },
        );
        let (state, result) = self.step(state, chunk);
        self.state = state;
        result
    }

    /// Pull chunks from `source` and feed them until the decode
    /// completes, fails, or `stop` fires.
    ///
    /// Empty reads that are not end-of-stream are retried — blocking
    /// belongs to the source. A source that ends before the decoded area
    /// covers the image fails the session with
    /// [`SessionError::TruncatedPayload`]; a partially filled buffer is
    /// never reported as success.
    pub fn drive<S: ChunkSource>(
        &mut self,
        source: &mut S,
        stop: &dyn Stop,
    ) -> Result<(), SessionError> {
        if self.expected.is_none() {
            self.expected = source.expected_len();
        }
        let mut buf = [0u8; DRIVE_CHUNK_BYTES];
        loop {
            if let Err(reason) = stop.check() {
                self.abandon();
                return Err(SessionError::Stopped(reason));
            }
            let (n, ended) = source.read_chunk(&mut buf);
            if n == 0 && !ended {
                continue;
            }
            if self.feed(&buf[..n])? == StreamStatus::Complete {
                return Ok(());
            }
            if ended {
                warn!(
                    "byte source ended after {} bytes without completing the image",
                    self.consumed
                );
                self.mark_failed(FailureKind::Truncated);
                return Err(SessionError::TruncatedPayload);
            }
        }
    }

    /// Abandon the session: teardown equivalent to a failure, without
    /// further I/O. A no-op on sessions already in a terminal phase.
    pub fn abandon(&mut self) {
        match self.state {
            State::Finished { .. } | State::Failed { .. } => {}
            State::Accumulating { .. } | State::Streaming { .. } => {
                debug!("decode session abandoned after {} bytes", self.consumed);
                self.mark_failed(FailureKind::Abandoned);
            }
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        match self.state {
            State::Accumulating { .. } => SessionPhase::Accumulating,
            State::Streaming { .. } => SessionPhase::Streaming,
            State::Finished { .. } => SessionPhase::Finished,
            State::Failed { .. } => SessionPhase::Failed,
        }
    }

    /// Whether the decode has completed successfully.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished { .. })
    }

    /// The failure kind, if the session is in the failed phase.
    pub fn failure(&self) -> Option<FailureKind> {
        match self.state {
            State::Failed { kind } => Some(kind),
            _ => None,
        }
    }

    /// Image dimensions, once known. Set exactly once, on the
    /// transition out of accumulation, and never changed afterwards.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match &self.state {
            State::Accumulating { .. } | State::Failed { .. } => None,
            State::Streaming { width, height, .. } => Some((*width, *height)),
            State::Finished { buffer } => Some((buffer.width(), buffer.height())),
        }
    }

    /// Total bytes accepted so far. Monotonically increasing.
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    /// Advertised payload size, if known.
    pub fn expected_len(&self) -> Option<u64> {
        self.expected
    }

    /// Bytes buffered while waiting for the header. Zero in every phase
    /// except accumulation.
    pub fn pending_len(&self) -> usize {
        match &self.state {
            State::Accumulating { probe } => probe.len(),
            _ => 0,
        }
    }

    /// Borrow the decoded pixels, if the session is finished.
    pub fn output(&self) -> Option<&FrameBuffer> {
        match &self.state {
            State::Finished { buffer } => Some(buffer),
            _ => None,
        }
    }

    /// Release the decoded pixels.
    ///
    /// Only a finished session gives up its buffer; until then the
    /// session (and its engine) hold exclusive access.
    pub fn into_output(self) -> Result<FrameBuffer, SessionError> {
        match self.state {
            State::Finished { buffer } => Ok(buffer),
            State::Failed { kind } => Err(SessionError::SessionFailed(kind)),
            State::Accumulating { .. } => Err(SessionError::Incomplete(SessionPhase::Accumulating)),
            State::Streaming { .. } => Err(SessionError::Incomplete(SessionPhase::Streaming)),
        }
    }

    // -- internals ----------------------------------------------------------

    fn step(
        &mut self,
        state: State<C::Engine>,
        chunk: &[u8],
    ) -> (State<C::Engine>, Result<StreamStatus, SessionError>) {
        match state {
            State::Failed { kind } => (
                State::Failed { kind },
                Err(SessionError::SessionFailed(kind)),
            ),
            State::Finished { buffer } => (State::Finished { buffer }, Ok(StreamStatus::Complete)),
            State::Accumulating { mut probe } => {
                if let Err(violation) = self.admit(chunk.len()) {
                    return Self::failed(
                        FailureKind::LimitExceeded,
                        SessionError::LimitExceeded(violation),
                    );
                }
                match probe.accumulate(chunk, &self.codec) {
                    ProbeStatus::NotEnough => {
                        (State::Accumulating { probe }, Ok(StreamStatus::NeedMoreData))
                    }
                    ProbeStatus::Invalid => {
                        Self::failed(FailureKind::CorruptHeader, SessionError::CorruptHeader)
                    }
                    ProbeStatus::Ready(info) => self.start_streaming(probe, info),
                }
            }
            State::Streaming {
                mut engine,
                width,
                height,
            } => {
                if let Err(violation) = self.admit(chunk.len()) {
                    return Self::failed(
                        FailureKind::LimitExceeded,
                        SessionError::LimitExceeded(violation),
                    );
                }
                match engine.append(chunk) {
                    Err(fault) => {
                        // The engine is destroyed here, before the error
                        // surfaces, and is never fed again.
                        Self::failed(FailureKind::Decode, SessionError::Decode(fault))
                    }
                    Ok(status) => {
                        if status == FeedStatus::Suspended {
                            trace!("engine suspended awaiting more data");
                        }
                        let (state, stream) = Self::completion_check(engine, width, height);
                        (state, Ok(stream))
                    }
                }
            }
        }
    }

    /// Accumulating → Streaming transition: allocate the output exactly
    /// once, build the engine, and replay the buffered header bytes as
    /// the engine's first feed.
    fn start_streaming(
        &mut self,
        probe: HeaderAccumulator,
        info: StreamInfo,
    ) -> (State<C::Engine>, Result<StreamStatus, SessionError>) {
        if info.width == 0 || info.height == 0 {
            return Self::failed(FailureKind::CorruptHeader, SessionError::CorruptHeader);
        }
        if let Err(violation) = self.config.limits.check_dimensions(info.width, info.height) {
            return Self::failed(
                FailureKind::LimitExceeded,
                SessionError::LimitExceeded(violation),
            );
        }
        debug!(
            "dimensions known after {} bytes: {}x{} {}",
            probe.len(),
            info.width,
            info.height,
            info.format
        );

        let descriptor = self.config.descriptor;
        let allocation_failed = || SessionError::OutputAllocationFailed {
            width: info.width,
            height: info.height,
        };
        let Some(buffer) = self.provider.allocate(info.width, info.height, descriptor) else {
            return Self::failed(FailureKind::OutputAllocationFailed, allocation_failed());
        };
        if buffer.width() != info.width
            || buffer.height() != info.height
            || buffer.descriptor() != descriptor
        {
            warn!("provider returned a mismatched buffer");
            return Self::failed(FailureKind::OutputAllocationFailed, allocation_failed());
        }

        self.codec.ensure_initialized();
        let mut engine = match self.codec.begin(&info, self.config.variant, buffer) {
            Ok(engine) => engine,
            Err(error) => return Self::failed(error.kind(), error),
        };

        let pending = probe.into_pending();
        match engine.append(&pending) {
            Err(fault) => Self::failed(FailureKind::Decode, SessionError::Decode(fault)),
            Ok(_) => {
                debug!("streaming started, initial feed of {} bytes", pending.len());
                let (state, status) = Self::completion_check(engine, info.width, info.height);
                let status = match status {
                    StreamStatus::Complete => StreamStatus::Complete,
                    _ => StreamStatus::HeaderReady,
                };
                (state, Ok(status))
            }
        }
    }

    /// Completion oracle: after every successful feed, the decode is
    /// complete exactly when the decoded area covers the full target
    /// rectangle. On completion the engine is torn down here and never
    /// queried again.
    fn completion_check(engine: C::Engine, width: u32, height: u32) -> (State<C::Engine>, StreamStatus) {
        let area = engine.decoded_area();
        if area.covers(width, height) {
            debug!("decode complete: {width}x{height}");
            (
                State::Finished {
                    buffer: engine.finish(),
                },
                StreamStatus::Complete,
            )
        } else {
            trace!(
                "decoded area {}x{} of {}x{}",
                area.width, area.height, width, height
            );
            (
                State::Streaming {
                    engine,
                    width,
                    height,
                },
                StreamStatus::NeedMoreData,
            )
        }
    }

    fn admit(&mut self, len: usize) -> Result<(), crate::limits::LimitExceeded> {
        let total = self.consumed.saturating_add(len as u64);
        self.config.limits.check_file_size(total)?;
        debug_assert!(
            self.expected.is_none_or(|expected| total <= expected),
            "transport delivered more bytes than advertised"
        );
        self.consumed = total;
        Ok(())
    }

    fn mark_failed(&mut self, kind: FailureKind) {
        // Replacing the state drops any live engine; teardown happens
        // exactly once because the engine moves out of the old state.
        self.state = State::Failed { kind };
    }

    fn failed(
        kind: FailureKind,
        error: SessionError,
    ) -> (State<C::Engine>, Result<StreamStatus, SessionError>) {
        warn!("decode session failed: {error}");
        (State::Failed { kind }, Err(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DecodeFault, DecodedArea};
    use crate::error::FailureKind;
    use crate::format::ImageFormat;
    use crate::limits::LimitExceeded;
    use crate::pnm::PnmCodec;
    use crate::source::SliceSource;
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use enough::Unstoppable;

    // -- mock codec ---------------------------------------------------------

    /// Header is `header_len` bytes; every later byte decodes one row.
    /// A first byte of `b'!'` is structurally invalid.
    #[derive(Clone)]
    struct MockCodec {
        width: u32,
        height: u32,
        header_len: usize,
        begin_fail: bool,
        fault_at_row: Option<u32>,
        begins: Rc<Cell<usize>>,
        inits: Rc<Cell<usize>>,
        drops: Rc<Cell<usize>>,
    }

    impl MockCodec {
        fn new(width: u32, height: u32, header_len: usize) -> Self {
            Self {
                width,
                height,
                header_len,
                begin_fail: false,
                fault_at_row: None,
                begins: Rc::new(Cell::new(0)),
                inits: Rc::new(Cell::new(0)),
                drops: Rc::new(Cell::new(0)),
            }
        }
    }

    struct MockEngine {
        buffer: Option<FrameBuffer>,
        width: u32,
        height: u32,
        header_len: usize,
        skipped: usize,
        rows: u32,
        fault_at_row: Option<u32>,
        drops: Rc<Cell<usize>>,
    }

    impl DecodeEngine for MockEngine {
        fn append(&mut self, data: &[u8]) -> Result<FeedStatus, DecodeFault> {
            let mut n = data.len();
            if self.skipped < self.header_len {
                let skip = (self.header_len - self.skipped).min(n);
                self.skipped += skip;
                n -= skip;
            }
            self.rows = (self.rows + n as u32).min(self.height);
            if let Some(at) = self.fault_at_row
                && self.rows >= at
            {
                return Err(DecodeFault::Malformed("mock fault"));
            }
            if self.rows == self.height {
                Ok(FeedStatus::Consumed(data.len()))
            } else {
                Ok(FeedStatus::Suspended)
            }
        }

        fn decoded_area(&self) -> DecodedArea {
            if self.rows == 0 {
                DecodedArea::EMPTY
            } else {
                DecodedArea::new(self.width, self.rows)
            }
        }

        fn finish(mut self) -> FrameBuffer {
            self.buffer.take().expect("buffer present")
        }
    }

    impl Drop for MockEngine {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    impl StreamCodec for MockCodec {
        type Engine = MockEngine;

        fn probe(&self, data: &[u8]) -> ProbeStatus {
            if data.first() == Some(&b'!') {
                return ProbeStatus::Invalid;
            }
            if data.len() < self.header_len {
                ProbeStatus::NotEnough
            } else {
                ProbeStatus::Ready(StreamInfo::new(
                    ImageFormat::Pnm,
                    self.width,
                    self.height,
                    3,
                ))
            }
        }

        fn begin(
            &self,
            _info: &StreamInfo,
            _variant: DecoderVariant,
            output: FrameBuffer,
        ) -> Result<MockEngine, SessionError> {
            self.begins.set(self.begins.get() + 1);
            if self.begin_fail {
                return Err(SessionError::EngineInitFailed("mock refuses"));
            }
            Ok(MockEngine {
                buffer: Some(output),
                width: self.width,
                height: self.height,
                header_len: self.header_len,
                skipped: 0,
                rows: 0,
                fault_at_row: self.fault_at_row,
                drops: Rc::clone(&self.drops),
            })
        }

        fn ensure_initialized(&self) {
            self.inits.set(self.inits.get() + 1);
        }
    }

    struct CountingProvider {
        allocs: Rc<Cell<usize>>,
        inner: HeapAllocator,
    }

    impl FrameBufferProvider for CountingProvider {
        fn allocate(
            &mut self,
            width: u32,
            height: u32,
            descriptor: PixelDescriptor,
        ) -> Option<FrameBuffer> {
            self.allocs.set(self.allocs.get() + 1);
            self.inner.allocate(width, height, descriptor)
        }
    }

    fn session_with(codec: MockCodec) -> DecodeSession<MockCodec> {
        DecodeSession::new(codec, SessionConfig::new())
    }

    // -- accumulation phase -------------------------------------------------

    #[test]
    fn short_chunks_keep_accumulating() {
        let codec = MockCodec::new(4, 3, 10);
        let mut session = session_with(codec);

        assert_eq!(session.feed(b"1234").unwrap(), StreamStatus::NeedMoreData);
        assert_eq!(session.phase(), SessionPhase::Accumulating);
        assert_eq!(session.pending_len(), 4);
        assert_eq!(session.dimensions(), None);
        assert_eq!(session.bytes_consumed(), 4);
    }

    #[test]
    fn corrupt_header_fails_terminally() {
        let codec = MockCodec::new(4, 3, 10);
        let begins = Rc::clone(&codec.begins);
        let mut session = session_with(codec);

        assert!(matches!(
            session.feed(b"!bad"),
            Err(SessionError::CorruptHeader)
        ));
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert_eq!(session.failure(), Some(FailureKind::CorruptHeader));
        assert_eq!(begins.get(), 0);

        // Terminal: later feeds report the original failure.
        assert!(matches!(
            session.feed(b"more"),
            Err(SessionError::SessionFailed(FailureKind::CorruptHeader))
        ));
    }

    #[test]
    fn allocation_failure_is_terminal_and_feeds_nothing() {
        let codec = MockCodec::new(4, 3, 4);
        let begins = Rc::clone(&codec.begins);
        let inits = Rc::clone(&codec.inits);
        let provider = HeapAllocator::with_max_bytes(0);
        let mut session = DecodeSession::with_provider(codec, SessionConfig::new(), provider);

        assert!(matches!(
            session.feed(b"head"),
            Err(SessionError::OutputAllocationFailed {
                width: 4,
                height: 3
            })
        ));
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert_eq!(session.failure(), Some(FailureKind::OutputAllocationFailed));
        // No engine was ever built, let alone fed.
        assert_eq!(begins.get(), 0);
        assert_eq!(inits.get(), 0);
    }

    #[test]
    fn zero_dimension_probe_never_streams() {
        let codec = MockCodec::new(0, 3, 4);
        let begins = Rc::clone(&codec.begins);
        let mut session = session_with(codec);

        assert!(matches!(
            session.feed(b"head"),
            Err(SessionError::CorruptHeader)
        ));
        assert_eq!(begins.get(), 0);
    }

    #[test]
    fn dimension_limits_fail_before_allocation() {
        let codec = MockCodec::new(4, 3, 4);
        let allocs = Rc::new(Cell::new(0));
        let provider = CountingProvider {
            allocs: Rc::clone(&allocs),
            inner: HeapAllocator::new(),
        };
        let config =
            SessionConfig::new().with_limits(ResourceLimits::none().with_max_width(2));
        let mut session = DecodeSession::with_provider(codec, config, provider);

        assert!(matches!(
            session.feed(b"head"),
            Err(SessionError::LimitExceeded(LimitExceeded::Width {
                actual: 4,
                max: 2
            }))
        ));
        assert_eq!(allocs.get(), 0);
    }

    #[test]
    fn file_size_limit_is_enforced_per_byte() {
        let codec = MockCodec::new(4, 3, 100);
        let config =
            SessionConfig::new().with_limits(ResourceLimits::none().with_max_file_size(5));
        let mut session = DecodeSession::new(codec, config);

        assert!(session.feed(b"1234").is_ok());
        assert!(matches!(
            session.feed(b"56"),
            Err(SessionError::LimitExceeded(LimitExceeded::FileSize { .. }))
        ));
        assert_eq!(session.phase(), SessionPhase::Failed);
    }

    // -- streaming phase ----------------------------------------------------

    #[test]
    fn header_ready_then_rows_then_complete() {
        let codec = MockCodec::new(4, 3, 2);
        let drops = Rc::clone(&codec.drops);
        let inits = Rc::clone(&codec.inits);
        let mut session = session_with(codec);

        assert_eq!(session.feed(b"hh").unwrap(), StreamStatus::HeaderReady);
        assert_eq!(session.phase(), SessionPhase::Streaming);
        assert_eq!(session.dimensions(), Some((4, 3)));
        // Buffered header bytes were handed to the engine and cleared.
        assert_eq!(session.pending_len(), 0);
        assert_eq!(inits.get(), 1);

        assert_eq!(session.feed(b"rr").unwrap(), StreamStatus::NeedMoreData);
        assert_eq!(session.feed(b"r").unwrap(), StreamStatus::Complete);
        assert_eq!(session.phase(), SessionPhase::Finished);
        assert!(session.is_finished());
        assert_eq!(drops.get(), 1);
        assert_eq!(inits.get(), 1);

        // Feeding a finished session is a harmless completion check.
        assert_eq!(session.feed(b"").unwrap(), StreamStatus::Complete);
        assert_eq!(session.feed(b"xx").unwrap(), StreamStatus::Complete);

        let buffer = session.into_output().unwrap();
        assert_eq!((buffer.width(), buffer.height()), (4, 3));
    }

    #[test]
    fn whole_image_in_one_chunk_completes_immediately() {
        let codec = MockCodec::new(4, 2, 3);
        let mut session = session_with(codec);
        // Header and both "rows" in a single feed.
        assert_eq!(session.feed(b"hhhrr").unwrap(), StreamStatus::Complete);
        assert!(session.is_finished());
    }

    #[test]
    fn engine_init_failure_is_terminal() {
        let mut codec = MockCodec::new(4, 3, 2);
        codec.begin_fail = true;
        let begins = Rc::clone(&codec.begins);
        let mut session = session_with(codec);

        assert!(matches!(
            session.feed(b"hh"),
            Err(SessionError::EngineInitFailed(_))
        ));
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert_eq!(session.failure(), Some(FailureKind::EngineInitFailed));
        assert_eq!(begins.get(), 1);
    }

    #[test]
    fn engine_fault_tears_down_exactly_once() {
        let mut codec = MockCodec::new(4, 3, 2);
        codec.fault_at_row = Some(2);
        let drops = Rc::clone(&codec.drops);
        let mut session = session_with(codec);

        assert_eq!(session.feed(b"hh").unwrap(), StreamStatus::HeaderReady);
        assert_eq!(session.feed(b"r").unwrap(), StreamStatus::NeedMoreData);
        assert!(matches!(
            session.feed(b"r"),
            Err(SessionError::Decode(DecodeFault::Malformed("mock fault")))
        ));
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert_eq!(session.failure(), Some(FailureKind::Decode));
        assert_eq!(drops.get(), 1);

        assert!(matches!(
            session.feed(b"r"),
            Err(SessionError::SessionFailed(FailureKind::Decode))
        ));
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn abandon_mid_stream_tears_down_exactly_once() {
        let codec = MockCodec::new(4, 3, 2);
        let drops = Rc::clone(&codec.drops);
        let mut session = session_with(codec);

        session.feed(b"hh").unwrap();
        assert_eq!(session.phase(), SessionPhase::Streaming);

        session.abandon();
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert_eq!(session.failure(), Some(FailureKind::Abandoned));
        assert_eq!(drops.get(), 1);

        // Abandoning again is a no-op.
        session.abandon();
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn dropping_a_streaming_session_tears_down_exactly_once() {
        let codec = MockCodec::new(4, 3, 2);
        let drops = Rc::clone(&codec.drops);
        let mut session = session_with(codec);
        session.feed(b"hh").unwrap();
        drop(session);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn abandon_during_accumulation_has_no_engine_to_drop() {
        let codec = MockCodec::new(4, 3, 10);
        let drops = Rc::clone(&codec.drops);
        let mut session = session_with(codec);
        session.feed(b"12").unwrap();
        session.abandon();
        assert_eq!(session.failure(), Some(FailureKind::Abandoned));
        assert_eq!(drops.get(), 0);
    }

    #[test]
    fn into_output_refuses_before_finish() {
        let codec = MockCodec::new(4, 3, 2);
        let mut session = session_with(codec);
        session.feed(b"hh").unwrap();
        assert!(matches!(
            session.into_output(),
            Err(SessionError::Incomplete(SessionPhase::Streaming))
        ));
    }

    // -- end-to-end over PNM ------------------------------------------------

    /// 8x8 P6 pixmap with raster bytes 0..192.
    fn pnm_8x8() -> Vec<u8> {
        let mut bytes = b"P6 8 8 255\n".to_vec();
        bytes.extend((0..192).map(|i| i as u8));
        bytes
    }

    /// The reference decode of [`pnm_8x8`] into RGBA8.
    fn pnm_8x8_rgba() -> Vec<u8> {
        let mut expected = Vec::with_capacity(64 * 4);
        for px in 0..64u32 {
            expected.extend([(3 * px) as u8, (3 * px + 1) as u8, (3 * px + 2) as u8, 255]);
        }
        expected
    }

    #[test]
    fn pnm_single_chunk_decodes_to_reference() {
        let image = pnm_8x8();
        let mut session = DecodeSession::new(PnmCodec::new(), SessionConfig::new());
        assert_eq!(session.feed(&image).unwrap(), StreamStatus::Complete);
        let buffer = session.into_output().unwrap();
        assert_eq!((buffer.width(), buffer.height()), (8, 8));
        assert_eq!(buffer.as_bytes(), pnm_8x8_rgba().as_slice());
        assert_eq!(buffer.as_rgba8().unwrap().pixels().count(), 64);
    }

    #[test]
    fn pnm_decode_is_partition_invariant() {
        let image = pnm_8x8();
        let reference = pnm_8x8_rgba();

        // From 1-byte chunks up to the whole payload in one piece
        // (chunk_len 12 splits the 203-byte payload into 17 chunks).
        for chunk_len in [1usize, 7, 12, 64, image.len()] {
            let mut session = DecodeSession::new(PnmCodec::new(), SessionConfig::new());
            let mut status = StreamStatus::NeedMoreData;
            for chunk in image.chunks(chunk_len) {
                status = session.feed(chunk).unwrap();
            }
            assert_eq!(status, StreamStatus::Complete, "chunk_len {chunk_len}");
            let buffer = session.into_output().unwrap();
            assert_eq!(
                buffer.as_bytes(),
                reference.as_slice(),
                "chunk_len {chunk_len}"
            );
        }
    }

    #[test]
    fn pnm_whole_buffer_variant_matches_incremental() {
        let image = pnm_8x8();
        let config = SessionConfig::new().with_variant(DecoderVariant::WholeBuffer);
        let mut session = DecodeSession::new(PnmCodec::new(), config);
        for chunk in image.chunks(17) {
            session.feed(chunk).unwrap();
        }
        let buffer = session.into_output().unwrap();
        assert_eq!(buffer.as_bytes(), pnm_8x8_rgba().as_slice());
    }

    #[test]
    fn drive_pulls_chunked_source_to_completion() {
        let image = pnm_8x8();
        let mut session = DecodeSession::new(PnmCodec::new(), SessionConfig::new());
        let mut source = SliceSource::with_chunk_size(&image, 8);

        session.drive(&mut source, &Unstoppable).unwrap();
        assert!(session.is_finished());
        assert_eq!(session.expected_len(), Some(image.len() as u64));
        assert_eq!(session.bytes_consumed(), image.len() as u64);
        assert_eq!(session.output().unwrap().as_bytes(), pnm_8x8_rgba().as_slice());
    }

    #[test]
    fn drive_fails_on_truncated_source() {
        let image = pnm_8x8();
        let truncated = &image[..image.len() / 2];
        let mut session = DecodeSession::new(PnmCodec::new(), SessionConfig::new());
        let mut source = SliceSource::with_chunk_size(truncated, 16);

        assert!(matches!(
            session.drive(&mut source, &Unstoppable),
            Err(SessionError::TruncatedPayload)
        ));
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert_eq!(session.failure(), Some(FailureKind::Truncated));
        assert!(matches!(
            session.into_output(),
            Err(SessionError::SessionFailed(FailureKind::Truncated))
        ));
    }

    #[test]
    fn truncated_header_alone_never_finishes() {
        // 4 bytes is not enough to finish the PNM header (scenario C).
        let mut session = DecodeSession::new(PnmCodec::new(), SessionConfig::new());
        assert_eq!(session.feed(b"P6 8").unwrap(), StreamStatus::NeedMoreData);
        assert_eq!(session.phase(), SessionPhase::Accumulating);
        assert_eq!(session.pending_len(), 4);
    }

    #[test]
    fn foreign_magic_fails_as_corrupt_not_need_more() {
        let mut session = DecodeSession::new(PnmCodec::new(), SessionConfig::new());
        assert!(matches!(
            session.feed(b"RIFF\x10\x00\x00\x00WEBPVP8 "),
            Err(SessionError::CorruptHeader)
        ));
        assert_eq!(session.failure(), Some(FailureKind::CorruptHeader));
    }

    #[test]
    fn bgra_descriptor_swaps_output_order() {
        let mut image = b"P6 1 1 255\n".to_vec();
        image.extend([10, 20, 30]);
        let config = SessionConfig::new().with_descriptor(PixelDescriptor::BGRA8_SRGB);
        let mut session = DecodeSession::new(PnmCodec::new(), config);
        session.feed(&image).unwrap();
        assert_eq!(
            session.into_output().unwrap().as_bytes(),
            &[30, 20, 10, 255]
        );
    }
}

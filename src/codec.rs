//! Codec seam for incremental decode engines.
//!
//! A [`StreamCodec`] is the format-specific half of a decode session. It
//! answers two questions the session cannot answer itself:
//!
//! - **Probe** — do the accumulated leading bytes contain enough header to
//!   know the image dimensions, and are they structurally valid at all?
//!   The codec's probe is the authority here: only it can tell a short
//!   header apart from one that can never parse.
//! - **Drive** — once dimensions are known and an output buffer exists,
//!   the codec produces a [`DecodeEngine`] that is fed every arriving
//!   chunk exactly once, in order, and writes decoded pixels into the
//!   buffer it owns for the session's duration.
//!
//! Engines never see the transport and sessions never touch pixel offsets;
//! the engine's bounded row writes are the only path into the output
//! buffer, because only the codec knows its format's structural units.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::buffer::FrameBuffer;
use crate::error::SessionError;
use crate::format::ImageFormat;

/// Decode strategy for a session.
///
/// Both variants share one engine interface; callers stay agnostic to
/// which is active. Incremental decoding keeps memory flat but not every
/// codec supports it; whole-buffer decoding holds the compressed payload
/// until it is complete and decodes in one pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DecoderVariant {
    /// Feed chunks into the codec as they arrive.
    #[default]
    Incremental,
    /// Buffer the compressed payload and decode once it is complete.
    WholeBuffer,
}

/// Stream facts learned from a successful header probe.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct StreamInfo {
    /// Detected container format.
    pub format: ImageFormat,
    /// Image width in pixels. Never zero.
    pub width: u32,
    /// Image height in pixels. Never zero.
    pub height: u32,
    /// Source channel count (1 = gray, 3 = RGB, 4 = RGBA).
    pub channels: u8,
}

impl StreamInfo {
    /// Create stream info for a probed header.
    pub fn new(format: ImageFormat, width: u32, height: u32, channels: u8) -> Self {
        Self {
            format,
            width,
            height,
            channels,
        }
    }
}

/// Outcome of a header probe over the accumulated leading bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProbeStatus {
    /// The bytes so far are a valid prefix, but dimensions are not yet
    /// determinable. Accumulate more and probe again.
    NotEnough,
    /// Header parsed; dimensions and layout are known.
    Ready(StreamInfo),
    /// The bytes can never form a valid header for this codec.
    Invalid,
}

/// Outcome of feeding one chunk to a [`DecodeEngine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum FeedStatus {
    /// The chunk was processed and the image is fully decoded. The count
    /// is the number of bytes the caller may consider delivered — not
    /// necessarily the number retained, since bytes past the end of the
    /// compressed payload are accepted and ignored.
    Consumed(usize),
    /// The engine needs more data. Its internal position is retained and
    /// the next [`append()`](DecodeEngine::append) resumes from it.
    Suspended,
}

/// Structural failure reported by a decode engine mid-stream.
///
/// Fatal: the session destroys the engine and will not feed it again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeFault {
    /// Compressed payload violates the container's declared layout.
    Malformed(&'static str),
    /// The payload's own framing declares an end inside a structural
    /// unit, so the engine can never resume.
    Truncated,
}

impl fmt::Display for DecodeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(detail) => write!(f, "malformed payload: {detail}"),
            Self::Truncated => write!(f, "payload framing ended inside a structural unit"),
        }
    }
}

impl core::error::Error for DecodeFault {}

/// Rectangle of pixels decoded so far, anchored at the top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodedArea {
    /// Width of the decoded region in pixels.
    pub width: u32,
    /// Height of the decoded region in pixels.
    pub height: u32,
}

impl DecodedArea {
    /// An empty region (nothing decoded yet).
    pub const EMPTY: Self = Self { width: 0, height: 0 };

    /// Create a decoded area.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether the region covers the full `width × height` target.
    ///
    /// Partial or clipped regions — top rows only, for instance — are
    /// never considered covering, even when non-empty.
    pub fn covers(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}

/// A stateful decoder driving one image to completion.
///
/// Created by [`StreamCodec::begin()`] with exclusive ownership of the
/// output [`FrameBuffer`]. Chunks arrive via [`append()`](Self::append)
/// in delivery order, with no reordering and no splitting beyond what the
/// transport produced. The engine is torn down exactly once: either by
/// [`finish()`](Self::finish) when decoding completes, or by being
/// dropped when the session fails or is abandoned.
pub trait DecodeEngine {
    /// Feed the next chunk of compressed bytes.
    ///
    /// The first call a session makes carries everything accumulated
    /// during header probing, so the engine always sees the stream from
    /// its first byte.
    ///
    /// An `Err` is fatal; the session drops the engine and never calls
    /// it again.
    fn append(&mut self, data: &[u8]) -> Result<FeedStatus, DecodeFault>;

    /// The region of the output buffer decoded so far.
    fn decoded_area(&self) -> DecodedArea;

    /// Tear down the engine and hand the output buffer back.
    ///
    /// Only meaningful once [`decoded_area()`](Self::decoded_area) covers
    /// the full image; the session guarantees it is not called before.
    fn finish(self) -> FrameBuffer;
}

/// Format-specific codec: header probing plus engine construction.
pub trait StreamCodec {
    /// The engine type driving a single image decode.
    type Engine: DecodeEngine;

    /// Probe the accumulated leading bytes of a stream.
    ///
    /// Must be cheap — O(header), not O(pixels) — and must never report
    /// [`ProbeStatus::NotEnough`] for input that can no longer become a
    /// valid header, or the caller would accumulate forever.
    fn probe(&self, data: &[u8]) -> ProbeStatus;

    /// Build an engine for a probed stream.
    ///
    /// `output` was allocated to exactly `info.width × info.height`
    /// pixels; the engine takes ownership of it for the session's
    /// duration. Codecs that cannot satisfy the output descriptor or the
    /// requested variant fail with
    /// [`SessionError::EngineInitFailed`].
    fn begin(
        &self,
        info: &StreamInfo,
        variant: DecoderVariant,
        output: FrameBuffer,
    ) -> Result<Self::Engine, SessionError>;

    /// Idempotent process-wide bootstrap hook.
    ///
    /// Called once per session before [`begin()`](Self::begin). Pure-Rust
    /// codecs need nothing here; codecs wrapping a foreign library can
    /// guard its one-time global init with a [`OnceFlag`] so concurrent
    /// first-uses cannot double-initialize. Never torn down mid-process.
    fn ensure_initialized(&self) {}
}

/// One-shot guard for process-wide initialization.
///
/// [`claim()`](OnceFlag::claim) returns `true` for exactly one caller
/// across all threads for the lifetime of the flag; every later call
/// returns `false`.
///
/// ```
/// use zenstream::OnceFlag;
///
/// static BOOTSTRAP: OnceFlag = OnceFlag::new();
///
/// if BOOTSTRAP.claim() {
///     // one-time library init goes here
/// }
/// ```
#[derive(Debug, Default)]
pub struct OnceFlag(AtomicBool);

impl OnceFlag {
    /// A flag that has not been claimed.
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Claim the flag. Returns `true` exactly once.
    pub fn claim(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the flag has been claimed.
    pub fn is_claimed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

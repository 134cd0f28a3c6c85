//! Decode session error taxonomy.
//!
//! Every fatal condition maps to one [`SessionError`] variant and drives
//! the session into its terminal failed phase; nothing is retried
//! internally — whether a corrupt transfer is worth re-fetching is the
//! transport's decision. "Need more data" is a status, never an error,
//! and is kept strictly apart from header corruption so unparseable
//! input cannot be accumulated forever.

use core::fmt;

use enough::StopReason;

use crate::codec::DecodeFault;
use crate::limits::LimitExceeded;
use crate::session::SessionPhase;

/// Compact failure classification stored in a failed session's phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FailureKind {
    /// Header bytes parsed but are inconsistent or invalid.
    CorruptHeader,
    /// Dimensions were known but the output buffer could not be obtained.
    OutputAllocationFailed,
    /// The engine could not be constructed with the given output parameters.
    EngineInitFailed,
    /// The engine reported a mid-stream structural failure.
    Decode,
    /// A configured resource limit was exceeded.
    LimitExceeded,
    /// The byte source ended before the image was complete.
    Truncated,
    /// The caller abandoned the session.
    Abandoned,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CorruptHeader => "corrupt header",
            Self::OutputAllocationFailed => "output allocation failed",
            Self::EngineInitFailed => "engine init failed",
            Self::Decode => "decode error",
            Self::LimitExceeded => "resource limit exceeded",
            Self::Truncated => "truncated payload",
            Self::Abandoned => "abandoned",
        })
    }
}

/// Fatal decode session errors.
#[derive(Debug)]
#[non_exhaustive]
pub enum SessionError {
    /// Header bytes parsed but are inconsistent or invalid — distinct
    /// from "not enough bytes yet", which is reported as a status.
    CorruptHeader,
    /// Dimensions were known but the frame buffer provider returned no
    /// buffer. No bytes were fed to any engine.
    OutputAllocationFailed {
        /// Requested buffer width in pixels.
        width: u32,
        /// Requested buffer height in pixels.
        height: u32,
    },
    /// The engine could not be constructed with the given output
    /// parameters (unsupported descriptor or variant, for instance).
    EngineInitFailed(&'static str),
    /// The engine reported a mid-stream structural failure. The engine
    /// was torn down before this error surfaced.
    Decode(DecodeFault),
    /// A configured resource limit was exceeded.
    LimitExceeded(LimitExceeded),
    /// The byte source ended before the decoded area covered the image.
    TruncatedPayload,
    /// A stop token fired; the session was abandoned.
    Stopped(StopReason),
    /// The session already failed; the kind records the original failure.
    SessionFailed(FailureKind),
    /// The output was requested before the session finished.
    Incomplete(SessionPhase),
}

impl SessionError {
    /// The failure classification a session stores for this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::CorruptHeader => FailureKind::CorruptHeader,
            Self::OutputAllocationFailed { .. } => FailureKind::OutputAllocationFailed,
            Self::EngineInitFailed(_) => FailureKind::EngineInitFailed,
            Self::Decode(_) => FailureKind::Decode,
            Self::LimitExceeded(_) => FailureKind::LimitExceeded,
            Self::TruncatedPayload => FailureKind::Truncated,
            Self::Stopped(_) | Self::Incomplete(_) => FailureKind::Abandoned,
            Self::SessionFailed(kind) => *kind,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CorruptHeader => write!(f, "image header is invalid or corrupt"),
            Self::OutputAllocationFailed { width, height } => {
                write!(f, "failed to allocate {width}x{height} output buffer")
            }
            Self::EngineInitFailed(reason) => {
                write!(f, "decoder initialization failed: {reason}")
            }
            Self::Decode(fault) => write!(f, "decode failed: {fault}"),
            Self::LimitExceeded(limit) => write!(f, "{limit}"),
            Self::TruncatedPayload => {
                write!(f, "byte stream ended before the image was complete")
            }
            Self::Stopped(reason) => write!(f, "stopped: {reason}"),
            Self::SessionFailed(kind) => write!(f, "session already failed: {kind}"),
            Self::Incomplete(phase) => write!(f, "decode not finished (session is {phase})"),
        }
    }
}

impl core::error::Error for SessionError {}

impl From<StopReason> for SessionError {
    fn from(reason: StopReason) -> Self {
        Self::Stopped(reason)
    }
}

impl From<LimitExceeded> for SessionError {
    fn from(limit: LimitExceeded) -> Self {
        Self::LimitExceeded(limit)
    }
}

impl From<DecodeFault> for SessionError {
    fn from(fault: DecodeFault) -> Self {
        Self::Decode(fault)
    }
}

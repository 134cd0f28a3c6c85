//! Incremental decode session driver for chunked image delivery.
//!
//! This crate turns a compressed image arriving in arbitrarily sized
//! chunks into a fully decoded pixel buffer, without ever holding the
//! whole compressed payload in memory. The pieces:
//!
//! - [`DecodeSession`] / [`SessionConfig`] — the per-image state machine:
//!   accumulate until dimensions are known, allocate the output once,
//!   stream every further chunk into the engine, detect completion
//! - [`StreamCodec`] / [`DecodeEngine`] — the codec seam: header probing
//!   and the stateful per-image decoder
//! - [`FrameBuffer`] / [`FrameBufferProvider`] — the pre-sized output
//!   rectangle and the seam to whoever owns pixel memory
//! - [`ChunkSource`] — the pull-based transport collaborator
//! - [`PnmCodec`] — built-in binary PNM (P5/P6) codec
//! - [`SessionError`] / [`FailureKind`] — the fatal-error taxonomy
//!
//! Decoded pixels are exposed through `imgref` views over `rgb` pixel
//! types, the common vocabulary of the zen* codec family.

#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;

mod buffer;
mod codec;
mod error;
mod format;
mod limits;
mod pnm;
mod probe;
mod session;
mod source;

pub use buffer::{
    AlphaMode, BufferError, ChannelLayout, ChannelType, FrameBuffer, FrameBufferProvider,
    HeapAllocator, PixelDescriptor, TransferFunction,
};
pub use codec::{
    DecodeEngine, DecodeFault, DecodedArea, DecoderVariant, FeedStatus, OnceFlag, ProbeStatus,
    StreamCodec, StreamInfo,
};
pub use error::{FailureKind, SessionError};
pub use format::ImageFormat;
pub use limits::{LimitExceeded, ResourceLimits};
pub use pnm::{PnmCodec, PnmEngine};
pub use probe::HeaderAccumulator;
pub use session::{DecodeSession, SessionConfig, SessionPhase, StreamStatus};
pub use source::{ChunkSource, SliceSource};

// Re-exports for codec implementors and users.
pub use enough::{Stop, StopReason, Unstoppable};
pub use imgref::{Img, ImgRef, ImgVec};
pub use rgb;
pub use rgb::alt::BGRA as Bgra;
pub use rgb::{Rgb, Rgba};

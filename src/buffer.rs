//! Output pixel buffer and its allocation seam.
//!
//! A [`FrameBuffer`] is the single fixed-size destination a decode session
//! writes into: a tightly packed `width × height` rectangle in one
//! [`PixelDescriptor`] format, allocated exactly once when the stream's
//! dimensions become known. The [`FrameBufferProvider`] trait is the seam
//! to whoever owns pixel memory (display planes, pools, plain heap); the
//! buffer moves into the decode engine for the session's duration and is
//! handed back only once decoding finishes.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use imgref::{Img, ImgRef, ImgVec};
use rgb::FromSlice;
use rgb::alt::BGRA;
use rgb::{Rgb, Rgba};

// ---------------------------------------------------------------------------
// Descriptor enums
// ---------------------------------------------------------------------------

/// Channel storage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum ChannelType {
    /// 8-bit unsigned integer (1 byte per channel).
    U8 = 1,
    /// 16-bit unsigned integer (2 bytes per channel).
    U16 = 2,
}

impl ChannelType {
    /// Byte size of a single channel value.
    #[inline]
    pub const fn byte_size(self) -> usize {
        self as usize
    }
}

/// Channel layout (number and meaning of channels).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum ChannelLayout {
    /// Single luminance channel.
    Gray = 1,
    /// Red, green, blue.
    Rgb = 3,
    /// Red, green, blue, alpha.
    Rgba = 4,
    /// Blue, green, red, alpha (Windows/DirectX byte order).
    Bgra = 5,
}

impl ChannelLayout {
    /// Number of channels in this layout.
    #[inline]
    pub const fn channels(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
            Self::Rgba | Self::Bgra => 4,
        }
    }

    /// Whether this layout includes an alpha channel.
    #[inline]
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba | Self::Bgra)
    }
}

/// Alpha channel interpretation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum AlphaMode {
    /// No alpha channel.
    None = 0,
    /// Straight (unassociated) alpha.
    Straight = 1,
}

/// Electro-optical transfer function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum TransferFunction {
    /// Linear light (gamma 1.0).
    Linear = 0,
    /// sRGB transfer curve (IEC 61966-2-1).
    Srgb = 1,
}

// ---------------------------------------------------------------------------
// PixelDescriptor
// ---------------------------------------------------------------------------

/// Compact pixel format descriptor (4 bytes).
///
/// Describes the format of pixel data without carrying the data itself.
/// A session picks one descriptor at creation and every decoded pixel is
/// emitted in that format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[non_exhaustive]
pub struct PixelDescriptor {
    /// Channel storage type (u8, u16).
    pub channel_type: ChannelType,
    /// Channel layout (gray, RGB, RGBA, BGRA).
    pub layout: ChannelLayout,
    /// Alpha interpretation.
    pub alpha: AlphaMode,
    /// Transfer function (sRGB, linear).
    pub transfer: TransferFunction,
}

impl PixelDescriptor {
    /// 8-bit sRGB grayscale.
    pub const GRAY8_SRGB: Self = Self {
        channel_type: ChannelType::U8,
        layout: ChannelLayout::Gray,
        alpha: AlphaMode::None,
        transfer: TransferFunction::Srgb,
    };

    /// 8-bit sRGB RGB.
    pub const RGB8_SRGB: Self = Self {
        channel_type: ChannelType::U8,
        layout: ChannelLayout::Rgb,
        alpha: AlphaMode::None,
        transfer: TransferFunction::Srgb,
    };

    /// 8-bit sRGB RGBA with straight alpha.
    pub const RGBA8_SRGB: Self = Self {
        channel_type: ChannelType::U8,
        layout: ChannelLayout::Rgba,
        alpha: AlphaMode::Straight,
        transfer: TransferFunction::Srgb,
    };

    /// 8-bit sRGB BGRA with straight alpha.
    pub const BGRA8_SRGB: Self = Self {
        channel_type: ChannelType::U8,
        layout: ChannelLayout::Bgra,
        alpha: AlphaMode::Straight,
        transfer: TransferFunction::Srgb,
    };

    /// Bytes per pixel.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        self.channel_type.byte_size() * self.layout.channels()
    }

    /// Number of channels.
    #[inline]
    pub const fn channels(self) -> u8 {
        self.layout.channels() as u8
    }

    /// Whether this format has an alpha channel.
    #[inline]
    pub const fn has_alpha(self) -> bool {
        self.layout.has_alpha()
    }
}

// ---------------------------------------------------------------------------
// BufferError
// ---------------------------------------------------------------------------

/// Errors from frame buffer construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum BufferError {
    /// Width or height is zero.
    InvalidDimensions,
    /// `width × height × bytes_per_pixel` does not fit in `usize`.
    SizeOverflow,
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions => write!(f, "width or height is zero"),
            Self::SizeOverflow => write!(f, "buffer byte size overflows usize"),
        }
    }
}

impl core::error::Error for BufferError {}

// ---------------------------------------------------------------------------
// FrameBuffer
// ---------------------------------------------------------------------------

/// Owned, tightly packed pixel rectangle.
///
/// Rows are contiguous with stride `width × bytes_per_pixel` and no
/// padding. Row access is bounds-checked; a decode engine that only
/// writes through [`row_mut()`](FrameBuffer::row_mut) cannot address
/// memory outside the rectangle.
pub struct FrameBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    descriptor: PixelDescriptor,
}

impl FrameBuffer {
    /// Allocate a zeroed buffer for the given dimensions and format.
    ///
    /// # Errors
    ///
    /// Returns an error if either dimension is zero or the total byte
    /// size overflows `usize`.
    pub fn new(width: u32, height: u32, descriptor: PixelDescriptor) -> Result<Self, BufferError> {
        if width == 0 || height == 0 {
            return Err(BufferError::InvalidDimensions);
        }
        let len = Self::byte_len(width, height, descriptor).ok_or(BufferError::SizeOverflow)?;
        Ok(Self {
            data: vec![0; len],
            width,
            height,
            descriptor,
        })
    }

    /// Total byte size for the given dimensions, or `None` on overflow.
    pub fn byte_len(width: u32, height: u32, descriptor: PixelDescriptor) -> Option<usize> {
        (width as usize)
            .checked_mul(descriptor.bytes_per_pixel())?
            .checked_mul(height as usize)
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel format of the buffer.
    #[inline]
    pub fn descriptor(&self) -> PixelDescriptor {
        self.descriptor
    }

    /// Row stride in bytes (`width × bytes_per_pixel`, tight).
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * self.descriptor.bytes_per_pixel()
    }

    /// Borrow the raw pixel bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Borrow row `y` immutably.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Borrow row `y` mutably.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &mut self.data[start..start + stride]
    }

    /// Borrow as RGB8 if that is the buffer's format.
    pub fn as_rgb8(&self) -> Option<ImgRef<'_, Rgb<u8>>> {
        (self.descriptor.channel_type == ChannelType::U8
            && self.descriptor.layout == ChannelLayout::Rgb)
            .then(|| Img::new(self.data.as_rgb(), self.width as usize, self.height as usize))
    }

    /// Borrow as RGBA8 if that is the buffer's format.
    pub fn as_rgba8(&self) -> Option<ImgRef<'_, Rgba<u8>>> {
        (self.descriptor.channel_type == ChannelType::U8
            && self.descriptor.layout == ChannelLayout::Rgba)
            .then(|| Img::new(self.data.as_rgba(), self.width as usize, self.height as usize))
    }

    /// Borrow as BGRA8 if that is the buffer's format.
    pub fn as_bgra8(&self) -> Option<ImgRef<'_, BGRA<u8>>> {
        (self.descriptor.channel_type == ChannelType::U8
            && self.descriptor.layout == ChannelLayout::Bgra)
            .then(|| Img::new(self.data.as_bgra(), self.width as usize, self.height as usize))
    }

    /// Convert to an owned RGBA8 image if that is the buffer's format.
    pub fn into_rgba8(self) -> Option<ImgVec<Rgba<u8>>> {
        (self.descriptor.channel_type == ChannelType::U8
            && self.descriptor.layout == ChannelLayout::Rgba)
            .then(|| {
                Img::new(
                    self.data.as_rgba().to_vec(),
                    self.width as usize,
                    self.height as usize,
                )
            })
    }

    /// Consume and return the raw pixel bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// FrameBufferProvider
// ---------------------------------------------------------------------------

/// Allocation seam for the decode output buffer.
///
/// A decode session calls [`allocate()`](FrameBufferProvider::allocate) at
/// most once, precisely when the stream's dimensions first become known.
/// Returning `None` fails the session without any pixel work. The returned
/// buffer must match the requested dimensions and descriptor exactly.
pub trait FrameBufferProvider {
    /// Allocate a `width × height` buffer in the given format, or `None`
    /// if the allocation cannot be satisfied.
    fn allocate(
        &mut self,
        width: u32,
        height: u32,
        descriptor: PixelDescriptor,
    ) -> Option<FrameBuffer>;
}

/// Plain heap-backed provider, optionally capped in total byte size.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapAllocator {
    max_bytes: Option<usize>,
}

impl HeapAllocator {
    /// Provider with no size cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider refusing allocations larger than `max_bytes`.
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            max_bytes: Some(max_bytes),
        }
    }
}

impl FrameBufferProvider for HeapAllocator {
    fn allocate(
        &mut self,
        width: u32,
        height: u32,
        descriptor: PixelDescriptor,
    ) -> Option<FrameBuffer> {
        let needed = FrameBuffer::byte_len(width, height, descriptor)?;
        if let Some(max) = self.max_bytes
            && needed > max
        {
            log::warn!("refusing {needed} byte frame allocation (cap {max})");
            return None;
        }
        FrameBuffer::new(width, height, descriptor).ok()
    }
}

//! Binary PNM codec (P5 graymap, P6 pixmap).
//!
//! The PNM raster is a plain sequence of samples with no entropy coding,
//! which makes it the one format in the family that can be decoded
//! honestly from arbitrary chunk boundaries: the engine converts samples
//! to the output format the moment they arrive, carrying at most one
//! partial pixel between feeds.
//!
//! Supported input is the binary subset with 8-bit samples
//! (`maxval <= 255`). ASCII variants, PAM, and PFM are rejected at probe
//! time.

use alloc::vec::Vec;

use log::{debug, trace};

use crate::buffer::{ChannelLayout, ChannelType, FrameBuffer};
use crate::codec::{
    DecodeEngine, DecodeFault, DecodedArea, DecoderVariant, FeedStatus, ProbeStatus, StreamCodec,
    StreamInfo,
};
use crate::error::SessionError;
use crate::format::ImageFormat;

/// Binary PNM decoding codec.
///
/// Stateless config type; all per-image state lives in [`PnmEngine`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PnmCodec;

impl PnmCodec {
    /// Create the codec.
    pub fn new() -> Self {
        Self
    }
}

// ---------------------------------------------------------------------------
// Header parsing
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SampleKind {
    /// P5: one luminance sample per pixel.
    Graymap,
    /// P6: red, green, blue samples per pixel.
    Pixmap,
}

impl SampleKind {
    fn channels(self) -> u8 {
        match self {
            Self::Graymap => 1,
            Self::Pixmap => 3,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct RasterSpec {
    kind: SampleKind,
    width: u32,
    height: u32,
    maxval: u8,
    /// Byte offset of the first raster sample.
    raster_start: usize,
}

#[derive(Debug)]
enum HeaderParse {
    /// Valid prefix; the header may still complete with more bytes.
    NotEnough,
    /// The bytes can never become a valid binary PNM header.
    Invalid(&'static str),
    Ready(RasterSpec),
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    /// Skip whitespace and `#`-comments. At least one blank must be
    /// present between header tokens; running out of bytes first is a
    /// "not enough" condition, not an error.
    fn skip_blanks(&mut self) -> Result<(), HeaderParse> {
        let start = self.pos;
        loop {
            match self.data.get(self.pos) {
                None => {
                    return if self.pos == start {
                        Err(HeaderParse::NotEnough)
                    } else {
                        Ok(())
                    };
                }
                Some(b' ' | b'\t' | b'\r' | b'\n') => self.pos += 1,
                Some(b'#') => {
                    // Comment runs to the next newline, which may not
                    // have arrived yet.
                    match self.data[self.pos..].iter().position(|&b| b == b'\n') {
                        Some(offset) => self.pos += offset + 1,
                        None => return Err(HeaderParse::NotEnough),
                    }
                }
                Some(_) => {
                    return if self.pos == start {
                        Err(HeaderParse::Invalid("missing header separator"))
                    } else {
                        Ok(())
                    };
                }
            }
        }
    }

    /// Read a decimal header field. A field that runs to the end of the
    /// data is incomplete — the next chunk could append more digits.
    fn read_number(&mut self) -> Result<u32, HeaderParse> {
        let start = self.pos;
        let mut value: u64 = 0;
        while let Some(&b) = self.data.get(self.pos) {
            if !b.is_ascii_digit() {
                break;
            }
            value = value * 10 + u64::from(b - b'0');
            if value > u64::from(u32::MAX) {
                return Err(HeaderParse::Invalid("header value out of range"));
            }
            self.pos += 1;
        }
        if self.pos == self.data.len() {
            return Err(HeaderParse::NotEnough);
        }
        if self.pos == start {
            return Err(HeaderParse::Invalid("expected integer in header"));
        }
        Ok(value as u32)
    }

    /// Consume the single whitespace byte separating maxval from the
    /// raster. Comments are not allowed here — a `#` would already be
    /// sample data.
    fn bump_raster_separator(&mut self) -> Result<(), HeaderParse> {
        match self.data.get(self.pos) {
            None => Err(HeaderParse::NotEnough),
            Some(b' ' | b'\t' | b'\r' | b'\n') => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(HeaderParse::Invalid("missing separator before raster")),
        }
    }
}

fn parse_header(data: &[u8]) -> HeaderParse {
    let Some(&first) = data.first() else {
        return HeaderParse::NotEnough;
    };
    if first != b'P' {
        return HeaderParse::Invalid("not a PNM stream");
    }
    let Some(&second) = data.get(1) else {
        return HeaderParse::NotEnough;
    };
    let kind = match second {
        b'5' => SampleKind::Graymap,
        b'6' => SampleKind::Pixmap,
        b'1'..=b'4' | b'7' | b'F' | b'f' => {
            return HeaderParse::Invalid("unsupported PNM variant");
        }
        _ => return HeaderParse::Invalid("not a PNM stream"),
    };

    let mut cur = Cursor { data, pos: 2 };
    let width = match cur.skip_blanks().and_then(|()| cur.read_number()) {
        Ok(v) => v,
        Err(state) => return state,
    };
    let height = match cur.skip_blanks().and_then(|()| cur.read_number()) {
        Ok(v) => v,
        Err(state) => return state,
    };
    let maxval = match cur.skip_blanks().and_then(|()| cur.read_number()) {
        Ok(v) => v,
        Err(state) => return state,
    };
    if let Err(state) = cur.bump_raster_separator() {
        return state;
    }

    if width == 0 || height == 0 {
        return HeaderParse::Invalid("zero image dimension");
    }
    if maxval == 0 {
        return HeaderParse::Invalid("zero maxval");
    }
    if maxval > 255 {
        return HeaderParse::Invalid("16-bit samples not supported");
    }

    HeaderParse::Ready(RasterSpec {
        kind,
        width,
        height,
        maxval: maxval as u8,
        raster_start: cur.pos,
    })
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

impl StreamCodec for PnmCodec {
    type Engine = PnmEngine;

    fn probe(&self, data: &[u8]) -> ProbeStatus {
        match parse_header(data) {
            HeaderParse::NotEnough => ProbeStatus::NotEnough,
            HeaderParse::Invalid(reason) => {
                if let Some(format) = ImageFormat::detect(data)
                    && format != ImageFormat::Pnm
                {
                    debug!("stream is {format}, not PNM");
                } else {
                    debug!("PNM probe rejected: {reason}");
                }
                ProbeStatus::Invalid
            }
            HeaderParse::Ready(spec) => ProbeStatus::Ready(StreamInfo::new(
                ImageFormat::Pnm,
                spec.width,
                spec.height,
                spec.kind.channels(),
            )),
        }
    }

    fn begin(
        &self,
        info: &StreamInfo,
        variant: DecoderVariant,
        output: FrameBuffer,
    ) -> Result<PnmEngine, SessionError> {
        let desc = output.descriptor();
        if desc.channel_type != ChannelType::U8 {
            return Err(SessionError::EngineInitFailed("only 8-bit output supported"));
        }
        if info.channels == 3 && desc.layout == ChannelLayout::Gray {
            return Err(SessionError::EngineInitFailed(
                "color pixmap cannot decode into grayscale output",
            ));
        }
        debug!(
            "pnm engine ready: {}x{} into {:?} ({:?})",
            info.width,
            info.height,
            desc.layout,
            variant
        );
        Ok(PnmEngine::new(output, variant))
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Mode {
    /// Convert samples as they arrive.
    Incremental,
    /// Stash raster bytes; decode in one pass once all are present.
    Whole { raw: Vec<u8> },
}

/// Stateful PNM decoder for a single image.
#[derive(Debug)]
pub struct PnmEngine {
    output: FrameBuffer,
    spec: Option<RasterSpec>,
    /// Partial pixel carried between feeds (at most `channels - 1` bytes).
    hold: [u8; 3],
    hold_len: usize,
    pixels_done: usize,
    mode: Mode,
}

impl PnmEngine {
    fn new(output: FrameBuffer, variant: DecoderVariant) -> Self {
        let mode = match variant {
            DecoderVariant::Incremental => Mode::Incremental,
            DecoderVariant::WholeBuffer => Mode::Whole { raw: Vec::new() },
        };
        Self {
            output,
            spec: None,
            hold: [0; 3],
            hold_len: 0,
            pixels_done: 0,
            mode,
        }
    }

    fn total_pixels(&self) -> usize {
        self.output.width() as usize * self.output.height() as usize
    }

    fn raster_len(&self) -> usize {
        let samples = match self.spec {
            Some(ref spec) => spec.kind.channels() as usize,
            None => 0,
        };
        self.total_pixels() * samples
    }

    fn consume(&mut self, bytes: &[u8]) {
        match core::mem::replace(&mut self.mode, Mode::Incremental) {
            Mode::Incremental => self.stream_samples(bytes),
            Mode::Whole { mut raw } => {
                let needed = self.raster_len();
                let room = needed.saturating_sub(raw.len());
                let take = room.min(bytes.len());
                raw.extend_from_slice(&bytes[..take]);
                if raw.len() == needed {
                    trace!("whole-buffer raster complete ({needed} bytes), decoding");
                    self.stream_samples(&raw);
                } else {
                    self.mode = Mode::Whole { raw };
                }
            }
        }
    }

    fn stream_samples(&mut self, mut bytes: &[u8]) {
        let (kind, maxval) = match self.spec {
            Some(ref spec) => (spec.kind, spec.maxval),
            None => return,
        };
        let in_bpp = kind.channels() as usize;
        let total = self.total_pixels();

        if self.pixels_done == total || bytes.is_empty() {
            return;
        }

        // Complete a pixel held over from the previous feed first.
        if self.hold_len > 0 {
            let need = in_bpp - self.hold_len;
            let take = need.min(bytes.len());
            self.hold[self.hold_len..self.hold_len + take].copy_from_slice(&bytes[..take]);
            self.hold_len += take;
            bytes = &bytes[take..];
            if self.hold_len < in_bpp {
                return;
            }
            let held = self.hold;
            self.hold_len = 0;
            self.emit(&held[..in_bpp], kind, maxval);
        }

        let mut chunks = bytes.chunks_exact(in_bpp);
        for sample in &mut chunks {
            if self.pixels_done == total {
                // Raster complete; trailing bytes are accepted and ignored.
                return;
            }
            self.emit(sample, kind, maxval);
        }
        if self.pixels_done < total {
            let rem = chunks.remainder();
            self.hold[..rem.len()].copy_from_slice(rem);
            self.hold_len = rem.len();
        }
    }

    fn emit(&mut self, sample: &[u8], kind: SampleKind, maxval: u8) {
        let (r, g, b) = match kind {
            SampleKind::Graymap => {
                let v = scale(sample[0], maxval);
                (v, v, v)
            }
            SampleKind::Pixmap => (
                scale(sample[0], maxval),
                scale(sample[1], maxval),
                scale(sample[2], maxval),
            ),
        };
        let width = self.output.width() as usize;
        let y = (self.pixels_done / width) as u32;
        let x = self.pixels_done % width;
        let desc = self.output.descriptor();
        let at = x * desc.bytes_per_pixel();
        let row = self.output.row_mut(y);
        match desc.layout {
            ChannelLayout::Gray => row[at] = r,
            ChannelLayout::Rgb => row[at..at + 3].copy_from_slice(&[r, g, b]),
            ChannelLayout::Rgba => row[at..at + 4].copy_from_slice(&[r, g, b, 255]),
            ChannelLayout::Bgra => row[at..at + 4].copy_from_slice(&[b, g, r, 255]),
        }
        self.pixels_done += 1;
    }
}

impl DecodeEngine for PnmEngine {
    fn append(&mut self, data: &[u8]) -> Result<FeedStatus, DecodeFault> {
        if self.spec.is_none() {
            // First feed: the session hands over everything accumulated
            // during probing, so the complete header is present.
            match parse_header(data) {
                HeaderParse::Ready(spec)
                    if spec.width == self.output.width()
                        && spec.height == self.output.height() =>
                {
                    let start = spec.raster_start;
                    self.spec = Some(spec);
                    self.consume(&data[start..]);
                }
                HeaderParse::Ready(_) => {
                    return Err(DecodeFault::Malformed("header does not match output buffer"));
                }
                _ => return Err(DecodeFault::Malformed("incomplete header on initial feed")),
            }
        } else {
            self.consume(data);
        }

        if self.pixels_done == self.total_pixels() {
            Ok(FeedStatus::Consumed(data.len()))
        } else {
            Ok(FeedStatus::Suspended)
        }
    }

    fn decoded_area(&self) -> DecodedArea {
        let width = self.output.width();
        let rows = (self.pixels_done / width as usize) as u32;
        if rows == 0 {
            DecodedArea::EMPTY
        } else {
            DecodedArea::new(width, rows)
        }
    }

    fn finish(self) -> FrameBuffer {
        self.output
    }
}

/// Rescale a sample from `0..=maxval` to `0..=255`, rounding to nearest.
/// Samples above maxval are clamped rather than rejected.
fn scale(value: u8, maxval: u8) -> u8 {
    if maxval == 255 {
        return value;
    }
    let clamped = u32::from(value.min(maxval));
    ((clamped * 255 + u32::from(maxval) / 2) / u32::from(maxval)) as u8
}

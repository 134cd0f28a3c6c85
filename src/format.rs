//! Image container detection from leading stream bytes.
//!
//! A streaming probe usually sees only the first chunk of a transfer. The
//! detection here is deliberately conservative: it reports a format only
//! when the magic bytes are unambiguous, so a codec probe can distinguish
//! "this is some other container" (fatal) from "not enough bytes yet".

/// Image container formats recognized from magic bytes.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    WebP,
    Gif,
    Png,
    Pnm,
}

impl ImageFormat {
    /// Detect format from magic bytes. Returns `None` if unrecognized.
    ///
    /// A `None` result on a short prefix does not mean the stream is
    /// invalid — several signatures need up to 12 bytes to match.
    pub fn detect(data: &[u8]) -> Option<Self> {
        // JPEG: FF D8 FF
        if data.len() >= 3 && data[0] == 0xFF && data[1] == 0xD8 && data[2] == 0xFF {
            return Some(ImageFormat::Jpeg);
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.len() >= 8 && data[..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
            return Some(ImageFormat::Png);
        }

        // GIF: "GIF87a" or "GIF89a"
        if data.len() >= 6
            && data[..3] == *b"GIF"
            && data[3] == b'8'
            && (data[4] == b'7' || data[4] == b'9')
            && data[5] == b'a'
        {
            return Some(ImageFormat::Gif);
        }

        // WebP: "RIFF....WEBP"
        if data.len() >= 12 && data[..4] == *b"RIFF" && data[8..12] == *b"WEBP" {
            return Some(ImageFormat::WebP);
        }

        // PNM family: P1-P7, Pf (grayscale PFM), PF (color PFM)
        if data.len() >= 2 && data[0] == b'P' {
            match data[1] {
                b'1'..=b'7' | b'F' | b'f' => return Some(ImageFormat::Pnm),
                _ => {}
            }
        }

        None
    }

    /// MIME type string.
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Png => "image/png",
            ImageFormat::Pnm => "image/x-portable-anymap",
        }
    }

    /// Accumulation ceiling for dimension probing, in bytes.
    ///
    /// Every supported container resolves its dimensions within this many
    /// leading bytes (JPEG is the worst case — the SOF marker can trail
    /// large EXIF/APP segments). A probe that still reports "not enough"
    /// past this point will never succeed, and accumulation must stop
    /// instead of buffering the transfer forever.
    pub const RECOMMENDED_PROBE_BYTES: usize = 4096;
}

impl core::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::WebP => "WebP",
            ImageFormat::Gif => "GIF",
            ImageFormat::Png => "PNG",
            ImageFormat::Pnm => "PNM",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_jpeg() {
        assert_eq!(
            ImageFormat::detect(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(ImageFormat::Jpeg)
        );
    }

    #[test]
    fn detect_png() {
        assert_eq!(
            ImageFormat::detect(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
            Some(ImageFormat::Png)
        );
    }

    #[test]
    fn detect_gif() {
        assert_eq!(
            ImageFormat::detect(b"GIF89a\x00\x00"),
            Some(ImageFormat::Gif)
        );
    }

    #[test]
    fn detect_webp() {
        assert_eq!(
            ImageFormat::detect(b"RIFF\x00\x00\x00\x00WEBP"),
            Some(ImageFormat::WebP)
        );
    }

    #[test]
    fn detect_pnm_binary_variants() {
        assert_eq!(ImageFormat::detect(b"P5\n3 2\n255\n"), Some(ImageFormat::Pnm));
        assert_eq!(ImageFormat::detect(b"P6\n3 2\n255\n"), Some(ImageFormat::Pnm));
    }

    #[test]
    fn detect_unknown() {
        assert_eq!(ImageFormat::detect(b"nope"), None);
        assert_eq!(ImageFormat::detect(&[]), None);
    }

    #[test]
    fn short_prefix_is_not_detected() {
        // A JPEG prefix cut to 2 bytes must not match anything.
        assert_eq!(ImageFormat::detect(&[0xFF, 0xD8]), None);
        // Same for a RIFF header missing the WEBP tag.
        assert_eq!(ImageFormat::detect(b"RIFF\x00\x00\x00\x00"), None);
    }

    #[test]
    fn mime_types() {
        assert_eq!(ImageFormat::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(ImageFormat::Pnm.mime_type(), "image/x-portable-anymap");
    }

    #[test]
    fn display_format() {
        assert_eq!(alloc::format!("{}", ImageFormat::WebP), "WebP");
        assert_eq!(alloc::format!("{}", ImageFormat::Pnm), "PNM");
    }
}

//! Pull-based byte source collaborator.
//!
//! The transport that actually fetches bytes — with its retries,
//! timeouts, and redirects — lives outside this crate. A session only
//! needs the contract below: hand over the next unread bytes of a finite
//! transfer, in order, with no gaps and no duplication, and say when the
//! transfer has ended.

/// A finite, pull-based producer of stream bytes.
pub trait ChunkSource {
    /// Copy up to `buf.len()` of the next unread bytes into `buf`.
    ///
    /// Returns the number of bytes written and whether the transfer has
    /// ended. A `(0, false)` return means "nothing available right now"
    /// and the caller retries; blocking, if any, happens inside this
    /// call.
    fn read_chunk(&mut self, buf: &mut [u8]) -> (usize, bool);

    /// Total payload size advertised by the transport, if known.
    fn expected_len(&self) -> Option<u64> {
        None
    }
}

/// In-memory source replaying a byte slice in fixed-size chunks.
///
/// Useful for tests and for re-driving a payload that already sits in
/// memory through the same session machinery a network transfer uses.
#[derive(Clone, Debug)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
    chunk: usize,
}

impl<'a> SliceSource<'a> {
    /// Source delivering the whole slice in a single read.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_chunk_size(data, data.len().max(1))
    }

    /// Source delivering at most `chunk` bytes per read.
    ///
    /// # Panics
    ///
    /// Panics if `chunk` is zero.
    pub fn with_chunk_size(data: &'a [u8], chunk: usize) -> Self {
        assert!(chunk > 0, "chunk size must be non-zero");
        Self { data, pos: 0, chunk }
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl ChunkSource for SliceSource<'_> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> (usize, bool) {
        let n = self.chunk.min(self.remaining()).min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        (n, self.pos == self.data.len())
    }

    fn expected_len(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

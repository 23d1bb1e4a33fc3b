//! Chunk partition — how a flat buffer is split into transport messages.
//!
//! Buffers under [`CHUNKING_THRESHOLD`] elements, and all single-byte
//! buffers, travel as one chunk. Anything else is split into exactly `W`
//! chunks, `W` being the element width in bytes: `W-1` chunks of
//! `ceil(N/W)` elements followed by the remainder. Every chunk's byte
//! length is thereby bounded by roughly `N`, the byte length the same
//! buffer would have with one-byte elements.

use crate::wire::CHUNKING_THRESHOLD;

/// A contiguous element range of a buffer, sent as one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// First element.
    pub offset: usize,
    /// Number of elements.
    pub len: usize,
    /// Transport MORE flag for this chunk.
    pub more: bool,
}

impl Chunk {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }

    pub fn byte_len(&self, width: usize) -> usize {
        self.len * width
    }
}

/// Element count of the largest chunk [`partition`] produces.
pub fn largest_chunk(n: usize, width: usize) -> usize {
    if n < CHUNKING_THRESHOLD || width <= 1 {
        n
    } else {
        n.div_ceil(width)
    }
}

/// Partition `n` elements of `width` bytes.
///
/// Every chunk but the last is flagged MORE; the last one carries
/// `more_coming`, so a caller can chain a following message.
pub fn partition(n: usize, width: usize, more_coming: bool) -> Vec<Chunk> {
    if n < CHUNKING_THRESHOLD || width <= 1 {
        return vec![Chunk {
            offset: 0,
            len: n,
            more: more_coming,
        }];
    }

    let first_len = largest_chunk(n, width);
    let last_len = n - (width - 1) * first_len;

    let mut chunks: Vec<Chunk> = (0..width - 1)
        .map(|p| Chunk {
            offset: p * first_len,
            len: first_len,
            more: true,
        })
        .collect();
    chunks.push(Chunk {
        offset: (width - 1) * first_len,
        len: last_len,
        more: more_coming,
    });
    chunks
}

//! # Arena
//!
//! One large contiguous byte buffer that serves as the substrate for cyclic
//! pointer chains. A chain is a sequence of `span` nodes at byte offsets
//! `0, stride, 2*stride, ..`, where each node stores the byte offset of the
//! next node as a native `usize`. The links are real memory loads when
//! traversed, so a walk over the chain exercises the cache hierarchy exactly
//! like classic pointer chasing, while the API only ever exposes integer
//! offsets.

use crate::ProbeError;
use std::sync::atomic::{Ordering, fence};

/// Exclusively-owned probe memory plus the chain builder that writes cyclic
/// next-offset links into it.
pub struct Arena {
    buf: Vec<u8>,
}

impl Arena {
    /// Reserve `size` zeroed bytes. Reservation is fallible so that an
    /// undersized machine produces a diagnostic instead of an allocator abort.
    pub fn allocate(size: usize) -> Result<Self, ProbeError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size)
            .map_err(|_| ProbeError::Allocation { bytes: size })?;
        buf.resize(size, 0);
        Ok(Arena { buf })
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write a single cycle of `span` nodes spaced `stride` bytes apart:
    /// node `i` links to node `i-1`, node `0` wraps to node `span-1`. Built
    /// back-to-front like the traversal order so the last-written node is the
    /// traversal entry point at offset 0.
    ///
    /// Links are stored unaligned: line-size probing uses strides like
    /// `way_size + 1` that are not multiples of the pointer width.
    pub fn build_chain(&mut self, stride: usize, span: usize) {
        assert!(stride >= 1 && span >= 1, "chain needs stride >= 1 and span >= 1");
        assert!(
            (span - 1) * stride + size_of::<usize>() <= self.buf.len(),
            "chain of span {span} at stride {stride} exceeds {} byte arena",
            self.buf.len()
        );

        let base = self.buf.as_mut_ptr();
        for i in (0..span).rev() {
            let next = if i > 0 { (i - 1) * stride } else { (span - 1) * stride };
            unsafe { (base.add(i * stride) as *mut usize).write_unaligned(next) };
        }
        // Full barrier: the timed traversal must observe completed links and
        // the compiler must not sink these stores past the timing boundary.
        fence(Ordering::SeqCst);
    }

    /// Read the link stored at `offset`. One traversal step, untimed; lets
    /// tests verify the cycle without touching the clock.
    pub fn chain_next(&self, offset: usize) -> usize {
        assert!(
            offset + size_of::<usize>() <= self.buf.len(),
            "link read at offset {offset} exceeds {} byte arena",
            self.buf.len()
        );
        unsafe { (self.buf.as_ptr().add(offset) as *const usize).read_unaligned() }
    }

    pub(crate) fn base_ptr(&self) -> *const u8 {
        self.buf.as_ptr()
    }
}

//! Pure, deterministic computation of the allocator's on-disk layout.
//!
//! Every offset the allocator needs is a function of `nsizes` alone, and
//! `nsizes` is a function of the arena's length alone. This is what makes
//! reopening a file safe: a fresh [`Geometry`] computed from the file's
//! length reproduces byte-for-byte the same layout the allocator wrote the
//! first time, without anything being re-read from the file to bootstrap
//! the computation itself.

use crate::LEAF_SIZE;
use crate::bits::bytes_for_bits;

/// Size (bytes) of the `{next, prev}` pair stored at the head of every
/// free block — also the size of one `SizeInfo` slot, since a `SizeInfo`
/// is just that free-list sentinel.
pub(crate) const SIZE_INFO_BYTES: u64 = 16;

/// Size in bytes of a block at size class `k`.
#[inline]
pub(crate) const fn blk_size(k: u32) -> u64 {
    LEAF_SIZE << k
}

/// Number of blocks that exist at size class `k`, given `nsizes` classes total.
#[inline]
pub(crate) const fn nblocks_at(k: u32, nsizes: u32) -> u64 {
    1u64 << (nsizes - 1 - k)
}

/// What is the first `k` such that `LEAF_SIZE * 2^k >= n`?
pub(crate) fn first_k(n: u64) -> u32 {
    let mut k = 0u32;
    let mut size = LEAF_SIZE;
    while size < n {
        k += 1;
        size *= 2;
    }
    k
}

fn ilog2(mut n: u64) -> u32 {
    let mut k = 0u32;
    while n > 1 {
        k += 1;
        n >>= 1;
    }
    k
}

/// Round `n` up to the next multiple of `step`.
#[inline]
pub(crate) const fn round_up(n: u64, step: u64) -> u64 {
    n.div_ceil(step) * step
}

/// The allocator's layout for an arena of `heap_len` managed bytes
/// (`real_end` in the spec's terms, i.e. the file's length).
#[derive(Debug, Clone)]
pub(crate) struct Geometry {
    pub nsizes: u32,
    /// Offset of the `pair_state[k]` vector, one entry per `k`.
    pub pair_state_off: Vec<u64>,
    /// Offset of the `split[k]` vector, one entry per `k`; index `0` is
    /// unused (there is no split vector for the smallest size class).
    pub split_off: Vec<u64>,
    /// First byte past all allocator metadata; the start of the heap.
    pub meta_end: u64,
    /// The power-of-two top of the managed heap (`>= real_end`).
    pub heap_end: u64,
}

impl Geometry {
    /// Compute the layout for a heap of `heap_len` bytes.
    ///
    /// Mirrors `bd_init`'s sizing rule exactly: `nsizes` is chosen so that
    /// `LEAF_SIZE * 2^(nsizes-1)` is the smallest power of two at least as
    /// large as `heap_len`.
    pub fn compute(heap_len: u64) -> Self {
        assert!(
            heap_len >= LEAF_SIZE,
            "arena must be at least LEAF_SIZE bytes"
        );

        let mut nsizes = ilog2(heap_len / LEAF_SIZE) + 1;
        if heap_len > blk_size(nsizes - 1) {
            nsizes += 1;
        }

        let mut pair_state_off = vec![0u64; nsizes as usize];
        let mut split_off = vec![0u64; nsizes as usize];

        let mut p = u64::from(nsizes) * SIZE_INFO_BYTES;

        for k in 0..nsizes {
            let pair_nblocks = if k < nsizes - 1 {
                nblocks_at(k + 1, nsizes)
            } else {
                nblocks_at(k, nsizes)
            };
            pair_state_off[k as usize] = p;
            p += bytes_for_bits(pair_nblocks);
        }

        for k in 1..nsizes {
            split_off[k as usize] = p;
            p += bytes_for_bits(nblocks_at(k, nsizes));
        }

        let meta_end = round_up(p, LEAF_SIZE);
        let heap_end = blk_size(nsizes - 1);

        Self {
            nsizes,
            pair_state_off,
            split_off,
            meta_end,
            heap_end,
        }
    }
}

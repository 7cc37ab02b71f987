//! Self-hosting buddy allocator: a power-of-two allocator whose own metadata
//! (free lists, split flags, pair-allocation flags) lives inside the very
//! byte arena it manages, so the arena is reproducible from nothing but its
//! length after a reopen.
//!
//! The arena is laid out as:
//!
//! ```text
//! [ SizeInfo[nsizes] | pair_state[0..nsizes] | split[1..nsizes] ]   <- metadata, ends at `meta_end`
//! [ reserved (optional, caller-sized) | usable heap             ]   <- ends at `real_end`
//! ```
//!
//! The `reserved` span is [`Arena::create`]'s third argument: bytes right
//! after `meta_end` that get marked permanently allocated before any free
//! list is populated, the same way the metadata prefix and any tail padding
//! are. A caller that passes `0` gets the original behavior; a caller that
//! needs a fixed, reopen-stable offset for something outside the allocator's
//! own bookkeeping (a root record, say) can carve one out this way instead
//! of guessing which size class bootstrap's first free chunk happens to be.
//!
//! `SizeInfo[k]` is nothing but the 16-byte `{next, prev}` free-list
//! sentinel for size class `k` ([`arenadb_list::Link`]); there is no
//! separately stored free-block count or pointer table, matching the
//! original design's insistence that everything above the leaf level is
//! derived, never cached beyond what must be mutated in place.
#![cfg_attr(not(any(test, doctest)), no_std)]

mod bits;
mod error;
mod layout;

pub use error::{Error, Result};

use arenadb_list::{Link, ListHandle};
use layout::{Geometry, SIZE_INFO_BYTES, blk_size, first_k};

/// Smallest allocatable unit. Chosen to exactly fit one [`Link`], the
/// smallest payload a free block must be able to hold.
pub const LEAF_SIZE: u64 = 16;

/// Size-class occupancy snapshot, for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Number of size classes the arena is divided into.
    pub nsizes: u32,
    /// Bytes currently reachable from a free list.
    pub free_bytes: u64,
    /// Bytes in the usable heap that are not free (allocated, or mid-split
    /// scaffolding that can never itself be handed out).
    pub used_bytes: u64,
}

/// A byte arena managed by the buddy allocator.
///
/// `Arena` does not own the memory it points into — it borrows `base` for
/// its lifetime and assumes the caller (the `arenadb` crate, via an mmap)
/// keeps that memory valid and of at least `real_end` bytes for as long as
/// the `Arena` exists.
pub struct Arena {
    base: *mut u8,
    /// Length, in bytes, of the region actually backed by the file.
    /// Always a multiple of [`LEAF_SIZE`].
    real_end: u64,
    geo: Geometry,
}

// SAFETY: `Arena` only ever touches the bytes in `base..base+real_end`
// through its own methods, which require `&mut self` for any mutation, so
// moving an `Arena` to another thread and continuing to use it there is
// sound. It is deliberately not `Sync`: sharing one `&Arena` across threads
// would let two threads call `allocate`/`free` with only a shared
// reference, which their `&mut self` signatures do not allow, so the type
// system already forces external synchronization for any concurrent use.
unsafe impl Send for Arena {}

impl Arena {
    /// Bootstrap a fresh arena over `len` bytes starting at `base`,
    /// writing all allocator metadata and leaving every non-metadata,
    /// non-reserved byte reachable through the free lists.
    ///
    /// `reserved` bytes immediately following the metadata (`heap_start()`)
    /// are marked permanently allocated, the same way the metadata prefix
    /// and tail padding are, and are never handed out by [`Self::allocate`]
    /// or accepted by [`Self::free`]. This lets a caller carve out a fixed,
    /// reproducible slot at a known offset — e.g. a root record — without
    /// depending on which free block an arena's first `allocate` call
    /// happens to return, which is otherwise an accident of how the
    /// bootstrap boundary regions decompose into aligned blocks.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `len` is smaller than one leaf,
    /// `reserved` is not a multiple of [`LEAF_SIZE`], or `reserved` leaves
    /// no room for any usable heap.
    ///
    /// # Safety
    /// `base` must be valid for reads and writes for `len` bytes for the
    /// entire lifetime of the returned `Arena`.
    pub unsafe fn create(base: *mut u8, len: u64, reserved: u64) -> Result<Self> {
        if len < LEAF_SIZE {
            return Err(Error::InvalidArgument("arena smaller than one leaf"));
        }
        if reserved % LEAF_SIZE != 0 {
            return Err(Error::InvalidArgument(
                "reserved prefix must be a multiple of LEAF_SIZE",
            ));
        }
        let real_end = len - (len % LEAF_SIZE);
        let geo = Geometry::compute(real_end);
        if geo.meta_end + reserved > real_end {
            return Err(Error::InvalidArgument(
                "arena too small to satisfy the reserved prefix",
            ));
        }

        let mut arena = Self {
            base,
            real_end,
            geo,
        };

        log::trace!(
            "bootstrapping arena: real_end={real_end}, nsizes={}, meta_end={}, reserved={reserved}",
            arena.geo.nsizes,
            arena.geo.meta_end
        );

        unsafe {
            for k in 0..arena.geo.nsizes {
                arena.free_list(k).init(arena.base);
            }

            arena.mark_allocated_region(0, arena.geo.meta_end + reserved);
            let heap_end = arena.geo.heap_end;
            if heap_end > real_end {
                arena.mark_allocated_region(real_end, heap_end);
            }
            arena.add_free_region(arena.geo.meta_end + reserved, real_end);
        }

        #[cfg(debug_assertions)]
        {
            let stats = arena.stats();
            debug_assert_eq!(
                stats.free_bytes + stats.used_bytes,
                real_end,
                "bootstrap must account for every byte of the usable heap"
            );
        }

        Ok(arena)
    }

    /// Attach to an arena that was previously initialized by [`Self::create`]
    /// and persisted to `base`. Performs no writes: the metadata already in
    /// place is trusted as-is.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `len` is smaller than one leaf.
    ///
    /// # Safety
    /// `base` must point at `len` bytes previously written by
    /// [`Self::create`] (directly, or via a file that was), valid for reads
    /// and writes for the lifetime of the returned `Arena`.
    pub unsafe fn attach(base: *mut u8, len: u64) -> Result<Self> {
        if len < LEAF_SIZE {
            return Err(Error::InvalidArgument("arena smaller than one leaf"));
        }
        let real_end = len - (len % LEAF_SIZE);
        let geo = Geometry::compute(real_end);
        Ok(Self {
            base,
            real_end,
            geo,
        })
    }

    /// Length of the usable, file-backed region (metadata included).
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.real_end
    }

    /// First byte past pure allocator metadata. Everything before this is
    /// the `SizeInfo`/`pair_state`/`split` tables; this offset itself is
    /// where a `reserved` prefix passed to [`Self::create`] begins, or
    /// (when `reserved` was zero) the first byte [`Self::allocate`] can
    /// ever hand out.
    #[must_use]
    pub const fn heap_start(&self) -> u64 {
        self.geo.meta_end
    }

    /// Allocate a block of at least `nbytes` bytes, returning its offset
    /// from the arena's base.
    ///
    /// # Errors
    /// Returns [`Error::OutOfArena`] if no free block is large enough, and
    /// [`Error::InvalidArgument`] if `nbytes` is zero.
    ///
    /// # Safety
    /// The caller must not use the returned offset after calling
    /// [`Self::free`] on it, and must not read or write past
    /// `offset + nbytes`.
    pub unsafe fn allocate(&mut self, nbytes: u64) -> Result<u64> {
        if nbytes == 0 {
            return Err(Error::InvalidArgument("allocation size must be nonzero"));
        }
        let fk = first_k(nbytes.max(LEAF_SIZE));
        if fk >= self.geo.nsizes {
            return Err(Error::OutOfArena);
        }

        let mut k = fk;
        while k < self.geo.nsizes && unsafe { self.free_list(k).is_empty(self.base) } {
            k += 1;
        }
        if k >= self.geo.nsizes {
            log::trace!("allocate({nbytes}): arena exhausted from class {fk}");
            return Err(Error::OutOfArena);
        }

        let p = unsafe { self.free_list(k).pop(self.base) }
            .expect("loop above only stops on a nonempty free list");

        unsafe {
            self.flip_pair_state(k, self.block_index(k, p));
        }

        // Split the block down from its natural size class to the one the
        // caller asked for, handing the unused half of each split back to
        // its own free list.
        for lvl in (fk + 1..=k).rev() {
            unsafe {
                bits::bit_set(self.base, self.geo.split_off[lvl as usize], self.block_index(lvl, p));
            }
            let buddy = p + blk_size(lvl - 1);
            unsafe {
                self.free_list(lvl - 1).push(self.base, buddy);
                self.flip_pair_state(lvl - 1, self.block_index(lvl - 1, buddy));
            }
        }

        Ok(p)
    }

    /// Free a block previously returned by [`Self::allocate`], coalescing
    /// with its buddy wherever possible.
    ///
    /// # Safety
    /// `offset` must have been returned by a prior `allocate` call on this
    /// same arena and not already freed.
    pub unsafe fn free(&mut self, mut offset: u64) {
        let mut k = unsafe { self.size_class_of(offset) };
        log::trace!("free({offset}): starting at class {k}");

        loop {
            let bi = self.block_index(k, offset);
            let pair_now_mixed = unsafe { self.flip_pair_state(k, bi) };

            if pair_now_mixed {
                // The buddy is still allocated (or still permanently
                // unavailable); nothing further to merge.
                unsafe {
                    self.free_list(k).push(self.base, offset);
                }
                break;
            }

            // Both halves are now free: remove the buddy from its free
            // list, clear the split flag that recorded this pair as split,
            // and keep merging one level up.
            if k + 1 >= self.geo.nsizes {
                unsafe {
                    self.free_list(k).push(self.base, offset);
                }
                break;
            }

            let buddy = offset ^ blk_size(k);
            unsafe {
                arenadb_list::remove(self.base, buddy);
                bits::bit_clear(self.base, self.geo.split_off[(k + 1) as usize], self.block_index(k + 1, offset));
            }
            offset = offset.min(buddy);
            k += 1;
        }
    }

    /// Snapshot the current free/used byte counts across all size classes.
    #[must_use]
    pub fn stats(&self) -> AllocatorStats {
        let mut free_bytes = 0u64;
        for k in 0..self.geo.nsizes {
            let count = unsafe { self.list_len(self.free_list(k)) };
            free_bytes += count * blk_size(k);
        }
        AllocatorStats {
            nsizes: self.geo.nsizes,
            free_bytes,
            used_bytes: self.real_end - free_bytes,
        }
    }

    fn free_list(&self, k: u32) -> ListHandle {
        ListHandle::new(u64::from(k) * SIZE_INFO_BYTES)
    }

    const fn block_index(&self, k: u32, p: u64) -> u64 {
        p / blk_size(k)
    }

    /// Flip the pair-allocation bit for the pair containing block `bi` at
    /// size class `k`, returning the bit's new value. `true` means exactly
    /// one of the two buddies is allocated/unavailable.
    unsafe fn flip_pair_state(&self, k: u32, bi: u64) -> bool {
        unsafe { bits::bit_flip(self.base, self.geo.pair_state_off[k as usize], bi / 2) }
    }

    /// Determine the size class of a previously allocated block.
    ///
    /// `allocate` sets `split[lvl]` for every level from `fk+1` up through
    /// the class the free block was actually found at, but never for `fk`
    /// itself (the block's own level is never marked as split into
    /// something smaller than itself). So the block's true class is the
    /// *smallest* `k` for which its level-`(k+1)` ancestor's split bit is
    /// set; below that, the ancestor was never divided this finely, and
    /// at `k` itself the block stands whole.
    ///
    /// Bounded to `nsizes - 1` so the top size class never needs a `split`
    /// entry one level above itself, which does not exist; reaching the
    /// bound with no split bit found means `p` is the single block
    /// spanning the whole arena.
    unsafe fn size_class_of(&self, p: u64) -> u32 {
        for k in 0..self.geo.nsizes.saturating_sub(1) {
            let bi = self.block_index(k + 1, p);
            if unsafe { bits::bit_isset(self.base, self.geo.split_off[(k + 1) as usize], bi) } {
                return k;
            }
        }
        self.geo.nsizes - 1
    }

    /// Record, in the `split` bit vectors only, that `[start, stop)` has
    /// been carved down to leaf granularity, without creating any free-list
    /// entries. Used for the metadata prefix and the unavailable tail
    /// beyond `real_end`, neither of which is ever handed out.
    unsafe fn mark_allocated_region(&mut self, mut start: u64, stop: u64) {
        while start < stop {
            let k = self.largest_fitting_class(start, stop);
            unsafe {
                self.mark_split_ancestors(k, start);
            }
            start += blk_size(k);
        }
    }

    /// Partition `[start, stop)` into maximal free blocks and push each
    /// onto its size class's free list.
    unsafe fn add_free_region(&mut self, mut start: u64, stop: u64) {
        while start < stop {
            let k = self.largest_fitting_class(start, stop);
            unsafe {
                self.mark_split_ancestors(k, start);
                self.free_list(k).push(self.base, start);
                self.flip_pair_state(k, self.block_index(k, start));
            }
            start += blk_size(k);
        }
    }

    /// Largest size class `k` such that a block of that size, starting at
    /// `start`, both stays aligned and fits entirely within `[start, stop)`.
    fn largest_fitting_class(&self, start: u64, stop: u64) -> u32 {
        let mut k = self.geo.nsizes - 1;
        while k > 0 {
            let bsz = blk_size(k);
            if start % bsz == 0 && start + bsz <= stop {
                break;
            }
            k -= 1;
        }
        k
    }

    /// Set the `split` bit for every size class above `k` along the
    /// ancestor chain of the block at `(k, start)`.
    unsafe fn mark_split_ancestors(&mut self, k: u32, start: u64) {
        for lvl in (k + 1)..self.geo.nsizes {
            let bi = self.block_index(lvl, start);
            unsafe {
                bits::bit_set(self.base, self.geo.split_off[lvl as usize], bi);
            }
        }
    }

    /// Count the elements on the list rooted at `list`, without mutating it.
    unsafe fn list_len(&self, list: ListHandle) -> u64 {
        let mut count = 0u64;
        let mut cur = unsafe {
            self.base
                .add(list.sentinel() as usize)
                .cast::<Link>()
                .read()
                .next
        };
        while cur != list.sentinel() {
            count += 1;
            cur = unsafe { self.base.add(cur as usize).cast::<Link>().read().next };
        }
        count
    }
}

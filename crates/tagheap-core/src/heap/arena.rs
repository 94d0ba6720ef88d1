//! Arena allocator core.
//!
//! One arena manages one contiguous region: a first-fit (or best-fit)
//! scan over the free list, split-on-allocate, eager bidirectional
//! coalescing on free, and shrink/grow in-place realloc. The arena owns
//! its backing buffer; blocks are byte offsets into it, and the
//! client-visible pointer for a block is `base + payload_offset`.
//!
//! Callers are expected to hold the heap-wide lock; an `&mut Arena` is
//! the critical section.

use super::free_list::NIL;
use super::tag::{
    self, BLOCK_OVERHEAD, CANARY, MIN_BLOCK, Tag, WORD, block_of, block_size_for, footer_of,
    payload_of, read_word, set_prev_free, set_tag, tag_at,
};
use crate::config::FitPolicy;

/// Size of the arena header slot carved from the front of each region.
/// The first allocatable block begins immediately after it, so offset 0
/// is never a valid block and the region's base address is never handed
/// out as a pointer.
pub const ARENA_HEADER: usize = 4 * WORD;

/// Live state for one memory region.
#[derive(Debug)]
pub struct Arena {
    /// Logical address of the region's aligned lower bound.
    base: usize,
    /// Offset of the first block, past the carved header slot.
    start: usize,
    /// Offset one past the managed area (== buffer length).
    end: usize,
    /// Free payload bytes currently available (excludes block overhead).
    total_free: usize,
    /// Low-water mark of `total_free`; monotonically non-increasing.
    min_free: usize,
    /// Offset of the first free block, or [`NIL`].
    pub(super) first_free: u64,
    /// Offset of the last free block, or [`NIL`].
    pub(super) last_free: u64,
    pub(super) buf: Vec<u8>,
}

impl Arena {
    /// Builds an arena over a region of `len` bytes starting at logical
    /// address `base`. Both must already be aligned, and `len` must
    /// leave room for the header slot plus one minimal block; the region
    /// table layer validates this.
    pub(crate) fn new(base: usize, len: usize) -> Self {
        debug_assert_eq!(base % tag::ALIGN, 0);
        debug_assert_eq!(len % tag::ALIGN, 0);
        debug_assert!(len >= ARENA_HEADER + MIN_BLOCK);

        let mut buf = vec![0u8; len];
        let start = ARENA_HEADER;
        let size = len - start;
        set_tag(
            &mut buf,
            start,
            Tag {
                size,
                used: false,
                prev_free: false,
                last: true,
            },
        );
        let mut arena = Self {
            base,
            start,
            end: len,
            total_free: tag::usable_of(size),
            min_free: tag::usable_of(size),
            first_free: NIL,
            last_free: NIL,
            buf,
        };
        arena.list_insert(start);
        arena
    }

    /// Logical address of the first byte of the region.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Logical address one past the managed area.
    pub fn limit(&self) -> usize {
        self.base + self.end
    }

    /// Whether `addr` falls inside this arena's address range.
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.limit()
    }

    pub(crate) fn to_addr(&self, off: usize) -> usize {
        self.base + off
    }

    pub(crate) fn to_offset(&self, addr: usize) -> usize {
        debug_assert!(self.contains(addr));
        addr - self.base
    }

    /// Free payload bytes currently available.
    pub fn total_free(&self) -> usize {
        self.total_free
    }

    /// Lowest value `total_free` has ever held.
    pub fn min_free(&self) -> usize {
        self.min_free
    }

    pub(super) fn start(&self) -> usize {
        self.start
    }

    pub(super) fn end(&self) -> usize {
        self.end
    }

    /// Scans the free list for a block of at least `need` bytes.
    /// First-fit takes the first adequate block; best-fit scans the whole
    /// list and keeps the smallest adequate one, first-encountered on ties.
    fn find_fit(&self, need: usize, policy: FitPolicy) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for block in self.free_blocks() {
            let size = tag_at(&self.buf, block).size;
            if size < need {
                continue;
            }
            match policy {
                FitPolicy::FirstFit => return Some(block),
                FitPolicy::BestFit => {
                    if best.is_none_or(|(_, s)| size < s) {
                        best = Some((block, size));
                    }
                }
            }
        }
        best.map(|(block, _)| block)
    }

    /// Allocates `request` payload bytes. Returns the payload offset, or
    /// `None` if no free block is large enough.
    pub(crate) fn allocate(&mut self, request: usize, policy: FitPolicy) -> Option<usize> {
        let need = block_size_for(request)?;
        let block = self.find_fit(need, policy)?;

        self.list_remove(block);
        let found = tag_at(&self.buf, block);
        debug_assert!(!found.used);
        debug_assert!(!found.prev_free, "free block with a free predecessor");

        let remainder = found.size - need;
        if remainder >= MIN_BLOCK {
            set_tag(
                &mut self.buf,
                block,
                Tag {
                    size: need,
                    used: true,
                    prev_free: false,
                    last: false,
                },
            );
            let rest = block + need;
            set_tag(
                &mut self.buf,
                rest,
                Tag {
                    size: remainder,
                    used: false,
                    prev_free: false,
                    last: found.last,
                },
            );
            // The successor's PREV_FREE (set while the found block was
            // free) stays correct: the remainder still precedes it.
            self.list_insert(rest);
            self.total_free -= need;
        } else {
            set_tag(
                &mut self.buf,
                block,
                Tag {
                    size: found.size,
                    used: true,
                    prev_free: false,
                    last: found.last,
                },
            );
            if !found.last {
                set_prev_free(&mut self.buf, block + found.size, false);
            }
            self.total_free -= tag::usable_of(found.size);
        }
        if self.total_free < self.min_free {
            self.min_free = self.total_free;
        }
        Some(payload_of(block))
    }

    /// Frees the block whose payload starts at `payload`, eagerly
    /// coalescing with both neighbors. Afterwards no two free blocks are
    /// adjacent anywhere in the arena.
    pub(crate) fn free(&mut self, payload: usize) {
        let mut block = block_of(payload);
        let tag = tag_at(&self.buf, block);
        debug_assert!(tag.used, "free of a block that is not allocated");
        debug_assert_eq!(
            read_word(&self.buf, footer_of(block, tag.size)),
            CANARY,
            "canary clobbered on freed block"
        );

        let mut size = tag.size;
        let mut last = tag.last;
        let mut reclaimed = tag::usable_of(tag.size);

        if !last {
            let succ = block + size;
            let succ_tag = tag_at(&self.buf, succ);
            if succ_tag.used {
                set_prev_free(&mut self.buf, succ, true);
            } else {
                self.list_remove(succ);
                size += succ_tag.size;
                last = succ_tag.last;
                reclaimed += BLOCK_OVERHEAD;
            }
        }

        if tag.prev_free {
            let pred = tag::prev_of(&self.buf, block);
            let pred_tag = tag_at(&self.buf, pred);
            debug_assert!(!pred_tag.used);
            self.list_remove(pred);
            size += pred_tag.size;
            reclaimed += BLOCK_OVERHEAD;
            block = pred;
        }

        set_tag(
            &mut self.buf,
            block,
            Tag {
                size,
                used: false,
                prev_free: false,
                last,
            },
        );
        self.list_insert(block);
        self.total_free += reclaimed;
    }

    /// Resizes the block at `payload` in place. Shrinking always
    /// succeeds (splitting off and freeing the tail when it is big
    /// enough to stand alone); growing succeeds only by absorbing an
    /// immediately following free block. Returns whether the block now
    /// satisfies `new_size` at its original offset.
    pub(crate) fn realloc_in_place(&mut self, payload: usize, new_size: usize) -> bool {
        let block = block_of(payload);
        let tag = tag_at(&self.buf, block);
        debug_assert!(tag.used, "realloc of a block that is not allocated");
        let Some(want) = block_size_for(new_size) else {
            return false;
        };

        if want == tag.size {
            return true;
        }

        if want < tag.size {
            let remainder = tag.size - want;
            if remainder < MIN_BLOCK {
                // Slack stays inside the block.
                return true;
            }
            set_tag(
                &mut self.buf,
                block,
                Tag {
                    size: want,
                    used: true,
                    prev_free: tag.prev_free,
                    last: false,
                },
            );
            let tail = block + want;
            set_tag(
                &mut self.buf,
                tail,
                Tag {
                    size: remainder,
                    used: true,
                    prev_free: false,
                    last: tag.last,
                },
            );
            // Freeing the tail coalesces it with whatever follows.
            self.free(payload_of(tail));
            return true;
        }

        if tag.last {
            return false;
        }
        let succ = block + tag.size;
        let succ_tag = tag_at(&self.buf, succ);
        if succ_tag.used {
            return false;
        }
        let combined = tag.size + succ_tag.size;
        if combined < want {
            return false;
        }

        self.list_remove(succ);
        let remainder = combined - want;
        if remainder >= MIN_BLOCK {
            set_tag(
                &mut self.buf,
                block,
                Tag {
                    size: want,
                    used: true,
                    prev_free: tag.prev_free,
                    last: false,
                },
            );
            let rest = block + want;
            set_tag(
                &mut self.buf,
                rest,
                Tag {
                    size: remainder,
                    used: false,
                    prev_free: false,
                    last: succ_tag.last,
                },
            );
            self.list_insert(rest);
            self.total_free -= want - tag.size;
        } else {
            set_tag(
                &mut self.buf,
                block,
                Tag {
                    size: combined,
                    used: true,
                    prev_free: tag.prev_free,
                    last: succ_tag.last,
                },
            );
            if !succ_tag.last {
                set_prev_free(&mut self.buf, block + combined, false);
            }
            self.total_free -= tag::usable_of(succ_tag.size);
        }
        if self.total_free < self.min_free {
            self.min_free = self.total_free;
        }
        true
    }

    /// Usable payload bytes of the allocated block at `payload`.
    pub(crate) fn usable_size(&self, payload: usize) -> usize {
        let tag = tag_at(&self.buf, block_of(payload));
        assert!(tag.used, "usable_size of a block that is not allocated");
        tag::usable_of(tag.size)
    }

    /// Bounds-checked view of `len` payload bytes starting `off` bytes
    /// into the block at `payload`.
    pub(crate) fn payload(&self, payload: usize, off: usize, len: usize) -> &[u8] {
        let usable = self.usable_size(payload);
        assert!(
            off + len <= usable,
            "payload read past block end ({off}+{len} > {usable})"
        );
        &self.buf[payload + off..payload + off + len]
    }

    /// Mutable counterpart of [`Arena::payload`].
    pub(crate) fn payload_mut(&mut self, payload: usize, off: usize, len: usize) -> &mut [u8] {
        let usable = self.usable_size(payload);
        assert!(
            off + len <= usable,
            "payload write past block end ({off}+{len} > {usable})"
        );
        &mut self.buf[payload + off..payload + off + len]
    }

    /// Test hook for corrupting the buffer under the checker.
    #[cfg(test)]
    pub(crate) fn poke_word(&mut self, off: usize, word: u64) {
        tag::write_word(&mut self.buf, off, word);
    }

    /// Test hook for desynchronizing the free-byte counter.
    #[cfg(test)]
    pub(crate) fn skew_total_free(&mut self, delta: usize) {
        self.total_free += delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_1k() -> Arena {
        Arena::new(0x1000, 1024)
    }

    #[test]
    fn test_new_arena_is_one_free_block() {
        let arena = arena_1k();
        assert_eq!(arena.total_free(), 1024 - ARENA_HEADER - BLOCK_OVERHEAD);
        assert_eq!(arena.min_free(), arena.total_free());
        assert_eq!(arena.free_blocks().count(), 1);
    }

    #[test]
    fn test_allocate_splits_and_accounts() {
        let mut arena = arena_1k();
        let before = arena.total_free();
        let p = arena.allocate(100, FitPolicy::FirstFit).expect("fits");
        // 100 + overhead rounds to 120; a split consumes the whole block size.
        assert_eq!(arena.total_free(), before - 120);
        assert_eq!(arena.usable_size(p), 120 - BLOCK_OVERHEAD);
        assert_eq!(arena.free_blocks().count(), 1);
    }

    #[test]
    fn test_allocate_aligned_payload() {
        let mut arena = arena_1k();
        for request in [1, 7, 13, 64] {
            let p = arena.allocate(request, FitPolicy::FirstFit).expect("fits");
            assert_eq!(arena.to_addr(p) % tag::ALIGN, 0);
            assert!(arena.usable_size(p) >= request);
        }
    }

    #[test]
    fn test_allocate_exhaustion_returns_none() {
        let mut arena = arena_1k();
        assert!(arena.allocate(2048, FitPolicy::FirstFit).is_none());
        let total = arena.total_free();
        assert!(arena.allocate(total, FitPolicy::FirstFit).is_some());
        assert!(arena.allocate(1, FitPolicy::FirstFit).is_none());
        assert_eq!(arena.total_free(), 0);
    }

    #[test]
    fn test_free_coalesces_both_directions() {
        let mut arena = arena_1k();
        let initial = arena.total_free();
        let a = arena.allocate(64, FitPolicy::FirstFit).unwrap();
        let b = arena.allocate(64, FitPolicy::FirstFit).unwrap();
        let c = arena.allocate(64, FitPolicy::FirstFit).unwrap();

        arena.free(a);
        arena.free(c);
        assert_eq!(arena.free_blocks().count(), 2);
        // Freeing the middle block must merge all three with the tail.
        arena.free(b);
        assert_eq!(arena.free_blocks().count(), 1);
        assert_eq!(arena.total_free(), initial);
    }

    #[test]
    fn test_first_fit_reuses_freed_hole() {
        let mut arena = arena_1k();
        let a = arena.allocate(100, FitPolicy::FirstFit).unwrap();
        let b = arena.allocate(200, FitPolicy::FirstFit).unwrap();
        assert!(b > a);
        arena.free(a);
        let c = arena.allocate(50, FitPolicy::FirstFit).unwrap();
        assert_eq!(c, a, "first-fit must reuse the freshly freed hole");
        arena.free(b);
        arena.free(c);
        arena.check(false);
    }

    #[test]
    fn test_best_fit_prefers_tightest_hole() {
        let mut arena = Arena::new(0x1000, 2048);
        let a = arena.allocate(200, FitPolicy::FirstFit).unwrap();
        let gap1 = arena.allocate(8, FitPolicy::FirstFit).unwrap();
        let b = arena.allocate(48, FitPolicy::FirstFit).unwrap();
        let gap2 = arena.allocate(8, FitPolicy::FirstFit).unwrap();
        arena.free(a);
        arena.free(b);
        // Holes: 216 bytes at `a`, 64 bytes at `b`, then the tail.
        let p = arena.allocate(48, FitPolicy::BestFit).unwrap();
        assert_eq!(p, b, "best-fit must pick the tightest adequate hole");
        let q = arena.allocate(48, FitPolicy::FirstFit).unwrap();
        assert_eq!(q, a, "first-fit must pick the first adequate hole");
        arena.free(gap1);
        arena.free(gap2);
    }

    #[test]
    fn test_min_free_is_low_water_mark() {
        let mut arena = arena_1k();
        let initial = arena.total_free();
        let a = arena.allocate(300, FitPolicy::FirstFit).unwrap();
        let low = arena.total_free();
        arena.free(a);
        assert_eq!(arena.total_free(), initial);
        assert_eq!(arena.min_free(), low);
        assert!(arena.min_free() <= arena.total_free());
    }

    #[test]
    fn test_exact_fit_clears_successor_prev_free() {
        let mut arena = arena_1k();
        let a = arena.allocate(64, FitPolicy::FirstFit).unwrap();
        let b = arena.allocate(64, FitPolicy::FirstFit).unwrap();
        arena.free(a);
        // The hole at `a` is exactly 80 bytes; re-request its usable size.
        let a2 = arena.allocate(80 - BLOCK_OVERHEAD, FitPolicy::FirstFit).unwrap();
        assert_eq!(a2, a);
        assert!(!tag_at(&arena.buf, block_of(b)).prev_free);
        arena.check(false);
    }

    #[test]
    fn test_realloc_shrink_then_grow_in_place() {
        let mut arena = arena_1k();
        let a = arena.allocate(256, FitPolicy::FirstFit).unwrap();
        let _pin = arena.allocate(64, FitPolicy::FirstFit).unwrap();

        assert!(arena.realloc_in_place(a, 64));
        assert!(arena.usable_size(a) >= 64);
        assert!(arena.realloc_in_place(a, 256), "grow back must reuse the tail");
        assert!(arena.usable_size(a) >= 256);
        arena.check(false);
    }

    #[test]
    fn test_realloc_shrink_tiny_remainder_keeps_slack() {
        let mut arena = arena_1k();
        let a = arena.allocate(64, FitPolicy::FirstFit).unwrap();
        let _pin = arena.allocate(8, FitPolicy::FirstFit).unwrap();
        let before = arena.total_free();
        // 64 -> 56 leaves an 8-byte remainder, below MIN_BLOCK: no split.
        assert!(arena.realloc_in_place(a, 56));
        assert_eq!(arena.usable_size(a), 64);
        assert_eq!(arena.total_free(), before);
    }

    #[test]
    fn test_realloc_grow_blocked_by_used_successor() {
        let mut arena = arena_1k();
        let a = arena.allocate(64, FitPolicy::FirstFit).unwrap();
        let _wall = arena.allocate(64, FitPolicy::FirstFit).unwrap();
        assert!(!arena.realloc_in_place(a, 512));
        assert_eq!(arena.usable_size(a), 64);
    }

    #[test]
    fn test_realloc_grow_absorbs_whole_successor() {
        let mut arena = arena_1k();
        let a = arena.allocate(64, FitPolicy::FirstFit).unwrap();
        let b = arena.allocate(64, FitPolicy::FirstFit).unwrap();
        let _wall = arena.allocate(64, FitPolicy::FirstFit).unwrap();
        arena.free(b);
        // The 80-byte hole at `b` is absorbed entirely; the remainder
        // (80 - (grow of 72->136 needs 64) = 16) is below MIN_BLOCK.
        assert!(arena.realloc_in_place(a, 128));
        assert!(arena.usable_size(a) >= 128);
        arena.check(false);
    }

    #[test]
    fn test_payload_round_trip() {
        let mut arena = arena_1k();
        let a = arena.allocate(100, FitPolicy::FirstFit).unwrap();
        let data: Vec<u8> = (0..100u8).collect();
        arena.payload_mut(a, 0, 100).copy_from_slice(&data);
        assert_eq!(arena.payload(a, 0, 100), &data[..]);
        assert_eq!(arena.payload(a, 50, 50), &data[50..]);
    }

    #[test]
    #[should_panic(expected = "payload write past block end")]
    fn test_payload_write_past_end_panics() {
        let mut arena = arena_1k();
        let a = arena.allocate(16, FitPolicy::FirstFit).unwrap();
        let usable = arena.usable_size(a);
        arena.payload_mut(a, 0, usable + 1);
    }
}

//! Intrusive free list.
//!
//! Every free block stores two link words at the start of its payload
//! (the payload is reused as node storage only while free): the byte
//! offsets of the previous and next free blocks, with [`NIL`] standing
//! in for the list ends held in the [`Arena`] itself.
//!
//! The list is kept in ascending address order, so a first-fit scan
//! returns the lowest-addressed adequate block. Removal is O(1) given a
//! block offset; insertion walks to the block's address position.

use super::arena::Arena;
use super::tag::{WORD, read_word, tag_at, write_word};

/// Link sentinel: "no block", i.e. the list head/tail anchor.
pub const NIL: u64 = u64::MAX;

impl Arena {
    pub(super) fn link_prev(&self, block: usize) -> u64 {
        read_word(&self.buf, block + WORD)
    }

    pub(super) fn link_next(&self, block: usize) -> u64 {
        read_word(&self.buf, block + 2 * WORD)
    }

    fn set_link_prev(&mut self, block: usize, to: u64) {
        write_word(&mut self.buf, block + WORD, to);
    }

    fn set_link_next(&mut self, block: usize, to: u64) {
        write_word(&mut self.buf, block + 2 * WORD, to);
    }

    /// Links the free block at `block` into the list at its address
    /// position.
    pub(super) fn list_insert(&mut self, block: usize) {
        debug_assert!(!tag_at(&self.buf, block).used);

        // Find the first listed block past `block`, if any.
        let mut after = self.first_free;
        while after != NIL && (after as usize) < block {
            after = self.link_next(after as usize);
        }
        debug_assert_ne!(after as usize, block, "block already listed");

        let before = if after == NIL {
            self.last_free
        } else {
            self.link_prev(after as usize)
        };

        self.set_link_prev(block, before);
        self.set_link_next(block, after);
        if before == NIL {
            self.first_free = block as u64;
        } else {
            self.set_link_next(before as usize, block as u64);
        }
        if after == NIL {
            self.last_free = block as u64;
        } else {
            self.set_link_prev(after as usize, block as u64);
        }
    }

    /// Unlinks the free block at `block` in O(1) via its stored links.
    pub(super) fn list_remove(&mut self, block: usize) {
        let prev = self.link_prev(block);
        let next = self.link_next(block);

        if prev == NIL {
            self.first_free = next;
        } else {
            self.set_link_next(prev as usize, next);
        }
        if next == NIL {
            self.last_free = prev;
        } else {
            self.set_link_prev(next as usize, prev);
        }
    }

    /// Iterates free-block offsets in list (address) order.
    pub(crate) fn free_blocks(&self) -> FreeBlocks<'_> {
        FreeBlocks {
            arena: self,
            cursor: self.first_free,
        }
    }
}

/// Iterator over an arena's free-block offsets.
pub struct FreeBlocks<'a> {
    arena: &'a Arena,
    cursor: u64,
}

impl Iterator for FreeBlocks<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.cursor == NIL {
            return None;
        }
        let block = self.cursor as usize;
        self.cursor = self.arena.link_next(block);
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FitPolicy;

    #[test]
    fn test_list_stays_address_ordered() {
        let mut arena = Arena::new(0x1000, 2048);
        let a = arena.allocate(64, FitPolicy::FirstFit).unwrap();
        let b = arena.allocate(64, FitPolicy::FirstFit).unwrap();
        let c = arena.allocate(64, FitPolicy::FirstFit).unwrap();
        let _wall = arena.allocate(64, FitPolicy::FirstFit).unwrap();

        // Free out of address order; the list must come back sorted.
        arena.free(c);
        arena.free(a);
        let offsets: Vec<usize> = arena.free_blocks().collect();
        assert_eq!(offsets.len(), 3, "two holes plus the tail");
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));

        arena.free(b);
        let offsets: Vec<usize> = arena.free_blocks().collect();
        assert_eq!(offsets.len(), 2, "a, b, c coalesce into one hole");
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_remove_relinks_neighbors() {
        let mut arena = Arena::new(0x1000, 2048);
        let a = arena.allocate(96, FitPolicy::FirstFit).unwrap();
        let _g1 = arena.allocate(8, FitPolicy::FirstFit).unwrap();
        let b = arena.allocate(64, FitPolicy::FirstFit).unwrap();
        let _g2 = arena.allocate(8, FitPolicy::FirstFit).unwrap();
        arena.free(a);
        arena.free(b);

        // Reallocating the exact hole at `b` removes a middle node.
        let b2 = arena.allocate(64, FitPolicy::BestFit).unwrap();
        assert_eq!(b2, b);
        let offsets: Vec<usize> = arena.free_blocks().collect();
        assert_eq!(offsets.len(), 2);
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        // Back links mirror forward links.
        assert_eq!(arena.link_prev(offsets[0]), NIL);
        assert_eq!(arena.link_prev(offsets[1]), offsets[0] as u64);
        assert_eq!(arena.link_next(offsets[1]), NIL);
    }

    #[test]
    fn test_empty_list_when_arena_full() {
        let mut arena = Arena::new(0x1000, 1024);
        let total = arena.total_free();
        let p = arena.allocate(total, FitPolicy::FirstFit).unwrap();
        assert_eq!(arena.free_blocks().count(), 0);
        arena.free(p);
        assert_eq!(arena.free_blocks().count(), 1);
    }
}

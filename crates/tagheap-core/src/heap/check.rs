//! Consistency checker.
//!
//! Diagnostic only, off the allocation hot path. Walks every block of an
//! arena address-ascending and the free list separately, cross-checking
//! the two views. Any violated invariant indicates heap corruption and
//! is fatal: the checker panics rather than returning an error, since
//! there is no safe state to continue from.

use std::collections::HashSet;

use super::arena::Arena;
use super::free_list::NIL;
use super::tag::{self, ALIGN, CANARY, MIN_BLOCK, Tag, read_word, tag_at};

/// Summary of one arena's successful check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArenaCheckReport {
    /// Logical base address of the checked arena.
    pub base: usize,
    pub blocks: usize,
    pub used_blocks: usize,
    pub free_blocks: usize,
    /// Sum of free blocks' usable payload bytes.
    pub free_payload_bytes: usize,
    /// One line per block, populated only for verbose checks.
    pub block_map: Vec<String>,
}

impl Arena {
    /// Validates every block and the free list. Panics on any violated
    /// invariant. With `verbose`, the returned report carries a rendered
    /// block map for diagnostics.
    pub(crate) fn check(&self, verbose: bool) -> ArenaCheckReport {
        let mut report = ArenaCheckReport {
            base: self.base(),
            ..ArenaCheckReport::default()
        };
        let mut free_set: HashSet<usize> = HashSet::new();
        let mut prev_was_free = false;
        let mut block = self.start();

        loop {
            assert!(
                block + MIN_BLOCK <= self.end(),
                "block at {block:#x} does not fit before arena end {:#x}",
                self.end()
            );
            let tag = tag_at(&self.buf, block);
            assert!(
                tag.size >= MIN_BLOCK && tag.size % ALIGN == 0,
                "bad block size {} at {block:#x}",
                tag.size
            );
            assert!(
                block + tag.size <= self.end(),
                "block at {block:#x} runs past arena end"
            );
            assert_eq!(
                tag.prev_free, prev_was_free,
                "PREV_FREE flag wrong at {block:#x}"
            );

            let footer = read_word(&self.buf, tag::footer_of(block, tag.size));
            if tag.used {
                assert_eq!(footer, CANARY, "canary clobbered at {block:#x}");
                report.used_blocks += 1;
            } else {
                assert!(!prev_was_free, "adjacent free blocks at {block:#x}");
                assert_eq!(
                    Tag::decode(footer),
                    tag,
                    "footer does not match header at {block:#x}"
                );
                free_set.insert(block);
                report.free_blocks += 1;
                report.free_payload_bytes += tag::usable_of(tag.size);
            }
            report.blocks += 1;

            if verbose {
                report.block_map.push(format!(
                    "{:#08x} {:>8} {}{}{}",
                    self.base() + block,
                    tag.size,
                    if tag.used { "USED" } else { "FREE" },
                    if tag.prev_free { " PREV_FREE" } else { "" },
                    if tag.last { " LAST" } else { "" },
                ));
            }

            if tag.last {
                assert_eq!(
                    block + tag.size,
                    self.end(),
                    "LAST block at {block:#x} does not end at the arena end"
                );
                break;
            }
            assert!(
                block + tag.size < self.end(),
                "final block at {block:#x} is missing its LAST flag"
            );
            prev_was_free = !tag.used;
            block += tag.size;
        }

        // The free list must contain exactly the free blocks found in
        // the walk, correctly back-linked and in ascending address order.
        let mut listed = 0usize;
        let mut prev_link = NIL;
        let mut cursor = self.first_free;
        while cursor != NIL {
            let node = cursor as usize;
            assert!(
                free_set.contains(&node),
                "free-list entry {node:#x} is not a free block"
            );
            assert_eq!(
                self.link_prev(node),
                prev_link,
                "free-list back link broken at {node:#x}"
            );
            assert!(
                prev_link == NIL || (prev_link as usize) < node,
                "free list out of address order at {node:#x}"
            );
            listed += 1;
            assert!(listed <= free_set.len(), "free list cycle detected");
            prev_link = cursor;
            cursor = self.link_next(node);
        }
        assert_eq!(self.last_free, prev_link, "free-list tail link out of sync");
        assert_eq!(
            listed,
            free_set.len(),
            "free blocks missing from the free list"
        );

        assert_eq!(
            report.free_payload_bytes,
            self.total_free(),
            "total_free accounting drift"
        );
        assert!(
            self.min_free() <= self.total_free(),
            "low-water mark above current free count"
        );

        report
    }
}

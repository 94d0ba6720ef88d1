//! Boundary-tag block codec.
//!
//! A block is a contiguous span inside an arena's backing buffer,
//! addressed by the byte offset of its header word. The header packs the
//! block size (always a multiple of the alignment quantum) with three
//! low-order flag bits. Free blocks duplicate the header word in their
//! footer, so the predecessor of a block can be located by reading one
//! word backwards. Used blocks are never walked backwards; their footer
//! slot holds a fixed canary sentinel instead, whose only purpose is
//! corruption detection.

/// Machine word size in bytes. Tags, free-list links and the canary all
/// occupy one word.
pub const WORD: usize = 8;

/// Alignment quantum. Block sizes and payload offsets are multiples of this.
pub const ALIGN: usize = 8;

/// Header flag: block is allocated.
pub const USED: u64 = 0b001;
/// Header flag: the block immediately before this one (in address order)
/// is free, so its footer can be read for backward coalescing.
pub const PREV_FREE: u64 = 0b010;
/// Header flag: final block of the arena; there is no successor.
pub const LAST: u64 = 0b100;

const FLAG_MASK: u64 = 0b111;

/// Sentinel written into a used block's footer slot.
pub const CANARY: u64 = 0xDEAD_C0DE_CAFE_F00D;

/// Fixed per-block overhead: header word plus footer/canary word.
pub const BLOCK_OVERHEAD: usize = 2 * WORD;

/// Smallest representable block: header, two free-list links, footer.
/// Split remainders below this stay inside the allocated block.
pub const MIN_BLOCK: usize = 4 * WORD;

/// Rounds `n` up to the alignment quantum.
pub fn align_up(n: usize) -> usize {
    (n + ALIGN - 1) & !(ALIGN - 1)
}

/// Rounds `n` down to the alignment quantum.
pub fn align_down(n: usize) -> usize {
    n & !(ALIGN - 1)
}

/// Total block size needed to satisfy a payload request of `request`
/// bytes, or `None` if the rounded size overflows.
pub fn block_size_for(request: usize) -> Option<usize> {
    let n = request.checked_add(BLOCK_OVERHEAD + ALIGN - 1)?;
    Some((n & !(ALIGN - 1)).max(MIN_BLOCK))
}

/// Decoded header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Total block size in bytes, including header and footer overhead.
    pub size: usize,
    pub used: bool,
    pub prev_free: bool,
    pub last: bool,
}

impl Tag {
    /// Decodes a raw header word.
    pub fn decode(word: u64) -> Self {
        Self {
            size: (word & !FLAG_MASK) as usize,
            used: word & USED != 0,
            prev_free: word & PREV_FREE != 0,
            last: word & LAST != 0,
        }
    }

    /// Encodes back into a raw header word.
    pub fn encode(self) -> u64 {
        let mut word = self.size as u64;
        if self.used {
            word |= USED;
        }
        if self.prev_free {
            word |= PREV_FREE;
        }
        if self.last {
            word |= LAST;
        }
        word
    }
}

/// Reads the word at byte offset `off`. Panics if `off` is out of
/// bounds, which indicates heap corruption and is intentionally fatal.
pub fn read_word(buf: &[u8], off: usize) -> u64 {
    let bytes: [u8; WORD] = buf[off..off + WORD].try_into().expect("word-sized slice");
    u64::from_le_bytes(bytes)
}

/// Writes the word at byte offset `off`. Panics if out of bounds.
pub fn write_word(buf: &mut [u8], off: usize, word: u64) {
    buf[off..off + WORD].copy_from_slice(&word.to_le_bytes());
}

/// Decodes the header of the block at `block`.
pub fn tag_at(buf: &[u8], block: usize) -> Tag {
    Tag::decode(read_word(buf, block))
}

/// Byte offset of the footer word of a block of `size` bytes at `block`.
pub fn footer_of(block: usize, size: usize) -> usize {
    block + size - WORD
}

/// Writes a block's header, and its footer slot: a duplicate of the
/// header word for free blocks, the canary sentinel for used blocks.
pub fn set_tag(buf: &mut [u8], block: usize, tag: Tag) {
    let word = tag.encode();
    write_word(buf, block, word);
    let footer = footer_of(block, tag.size);
    if tag.used {
        write_word(buf, footer, CANARY);
    } else {
        write_word(buf, footer, word);
    }
}

/// Updates the `PREV_FREE` flag on a used block's header. Free blocks'
/// predecessors are never free (eager coalescing), so this is only ever
/// needed on used blocks, whose footer slot (the canary) is unaffected.
pub fn set_prev_free(buf: &mut [u8], block: usize, prev_free: bool) {
    let mut tag = tag_at(buf, block);
    debug_assert!(tag.used, "PREV_FREE toggled on a free block");
    tag.prev_free = prev_free;
    write_word(buf, block, tag.encode());
}

/// Offset of the successor block, or `None` for the arena's last block.
pub fn next_of(buf: &[u8], block: usize) -> Option<usize> {
    let tag = tag_at(buf, block);
    if tag.last { None } else { Some(block + tag.size) }
}

/// Offset of the predecessor block, located through its footer word.
/// Only valid when the caller has checked `PREV_FREE` on `block`; the
/// arena's first block never carries that flag.
pub fn prev_of(buf: &[u8], block: usize) -> usize {
    debug_assert!(
        tag_at(buf, block).prev_free,
        "prev_of on a block whose predecessor is not free"
    );
    let footer = Tag::decode(read_word(buf, block - WORD));
    block - footer.size
}

/// Payload offset for the block at `block`.
pub fn payload_of(block: usize) -> usize {
    block + WORD
}

/// Inverse of [`payload_of`].
pub fn block_of(payload: usize) -> usize {
    payload - WORD
}

/// Usable payload bytes of a block of `size` total bytes.
pub fn usable_of(size: usize) -> usize {
    size - BLOCK_OVERHEAD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        let tag = Tag {
            size: 96,
            used: true,
            prev_free: false,
            last: true,
        };
        assert_eq!(Tag::decode(tag.encode()), tag);

        let free = Tag {
            size: MIN_BLOCK,
            used: false,
            prev_free: true,
            last: false,
        };
        assert_eq!(Tag::decode(free.encode()), free);
    }

    #[test]
    fn test_block_size_for_rounds_and_clamps() {
        assert_eq!(block_size_for(1), Some(MIN_BLOCK));
        assert_eq!(block_size_for(16), Some(32));
        assert_eq!(block_size_for(17), Some(40));
        assert_eq!(block_size_for(100), Some(120));
        assert_eq!(block_size_for(usize::MAX - 4), None);
    }

    #[test]
    fn test_free_block_footer_duplicates_header() {
        let mut buf = vec![0u8; 64];
        let tag = Tag {
            size: 64,
            used: false,
            prev_free: false,
            last: true,
        };
        set_tag(&mut buf, 0, tag);
        assert_eq!(read_word(&buf, 0), read_word(&buf, footer_of(0, 64)));
        assert_eq!(tag_at(&buf, 0), tag);
    }

    #[test]
    fn test_used_block_footer_holds_canary() {
        let mut buf = vec![0u8; 64];
        set_tag(
            &mut buf,
            0,
            Tag {
                size: 64,
                used: true,
                prev_free: false,
                last: true,
            },
        );
        assert_eq!(read_word(&buf, footer_of(0, 64)), CANARY);
    }

    #[test]
    fn test_prev_of_steps_over_free_predecessor() {
        let mut buf = vec![0u8; 96];
        set_tag(
            &mut buf,
            0,
            Tag {
                size: 48,
                used: false,
                prev_free: false,
                last: false,
            },
        );
        set_tag(
            &mut buf,
            48,
            Tag {
                size: 48,
                used: true,
                prev_free: true,
                last: true,
            },
        );
        assert_eq!(prev_of(&buf, 48), 0);
        assert_eq!(next_of(&buf, 0), Some(48));
        assert_eq!(next_of(&buf, 48), None);
    }

    #[test]
    fn test_set_prev_free_preserves_size_and_canary() {
        let mut buf = vec![0u8; 64];
        set_tag(
            &mut buf,
            0,
            Tag {
                size: 64,
                used: true,
                prev_free: false,
                last: true,
            },
        );
        set_prev_free(&mut buf, 0, true);
        let tag = tag_at(&buf, 0);
        assert!(tag.prev_free);
        assert_eq!(tag.size, 64);
        assert_eq!(read_word(&buf, footer_of(0, 64)), CANARY);
    }
}

//! Multi-arena dispatch.
//!
//! [`TagHeap`] owns the region table: an ordered sequence of arenas
//! built once at startup. Allocation requests walk the table in order,
//! skipping arenas that violate the caller's address ceiling, and
//! delegate to the first arena that can satisfy the request. Frees and
//! reallocs are routed to the owning arena by address range.
//!
//! The whole context sits behind a single `parking_lot::Mutex`: the
//! target execution model is preemptible single-core task scheduling,
//! so exclusion between task-level callers is all that is required. The
//! out-of-memory hook runs after the lock is released and may call back
//! into the allocator.

use std::sync::Arc;

use parking_lot::Mutex;

use super::arena::{ARENA_HEADER, Arena};
use super::check::ArenaCheckReport;
use super::tag::{MIN_BLOCK, align_down, align_up};
use crate::config::HeapConfig;
use crate::error::RegionTableError;
use crate::event::{EventLevel, EventLog, HeapEvent};

/// One entry of the region table: a contiguous address range
/// `[lower, upper)` supplied by the boot collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSpec {
    pub lower: usize,
    pub upper: usize,
}

impl RegionSpec {
    pub fn new(lower: usize, upper: usize) -> Self {
        Self { lower, upper }
    }
}

/// Point-in-time view of one arena's statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    pub lower: usize,
    pub upper: usize,
    pub total_free: usize,
    pub min_free: usize,
    pub free_blocks: usize,
}

type OomHook = Arc<dyn Fn() + Send + Sync>;

struct HeapInner {
    arenas: Vec<Arena>,
    config: HeapConfig,
    events: EventLog,
}

/// The allocator context: every region's arena plus the routing policy.
///
/// Constructed once at startup and shared by reference with every
/// client; there is no global instance.
pub struct TagHeap {
    inner: Mutex<HeapInner>,
    oom_hook: Mutex<Option<OomHook>>,
}

impl TagHeap {
    /// One-time setup from the region table. Bounds are rounded inward
    /// to the alignment quantum and each region gets an arena header
    /// carved from its front. Regions must be ascending and disjoint
    /// and large enough to hold at least one minimal block.
    pub fn new(regions: &[RegionSpec], config: HeapConfig) -> Result<Self, RegionTableError> {
        if regions.is_empty() {
            return Err(RegionTableError::EmptyTable);
        }

        let mut arenas = Vec::with_capacity(regions.len());
        let mut prev_upper = 0usize;
        for region in regions {
            let lower = align_up(region.lower);
            let upper = align_down(region.upper);
            if upper < lower || upper - lower < ARENA_HEADER + MIN_BLOCK {
                return Err(RegionTableError::RegionTooSmall {
                    lower: region.lower,
                    upper: region.upper,
                });
            }
            if lower < prev_upper {
                return Err(RegionTableError::OverlapOrDisorder {
                    lower: region.lower,
                    upper: region.upper,
                });
            }
            prev_upper = upper;
            arenas.push(Arena::new(lower, upper - lower));
        }

        Ok(Self {
            inner: Mutex::new(HeapInner {
                arenas,
                config,
                events: EventLog::new(config.record_events),
            }),
            oom_hook: Mutex::new(None),
        })
    }

    /// Allocates `size` payload bytes from any region.
    pub fn allocate(&self, size: usize) -> Option<usize> {
        self.allocate_below(size, usize::MAX)
    }

    /// Allocates `size` payload bytes from regions entirely below the
    /// configured restricted ceiling.
    pub fn allocate_restricted(&self, size: usize) -> Option<usize> {
        let ceiling = self.inner.lock().config.restricted_ceiling;
        self.allocate_below(size, ceiling)
    }

    /// Allocates `size` payload bytes from regions whose address range
    /// lies entirely below `ceiling`. Returns a logical pointer, or
    /// `None` after notifying the out-of-memory hook.
    pub fn allocate_below(&self, size: usize, ceiling: usize) -> Option<usize> {
        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            for (idx, arena) in inner.arenas.iter_mut().enumerate() {
                if arena.limit() > ceiling {
                    continue;
                }
                if let Some(off) = arena.allocate(size, inner.config.policy) {
                    let ptr = arena.to_addr(off);
                    inner.events.record(
                        EventLevel::Trace,
                        "allocate",
                        "alloc",
                        Some(ptr),
                        Some(size),
                        Some(idx),
                        "success",
                    );
                    return Some(ptr);
                }
            }
            inner.events.record(
                EventLevel::Warn,
                "allocate",
                "alloc",
                None,
                Some(size),
                None,
                "oom",
            );
        }
        self.notify_oom();
        None
    }

    /// Returns a block to its owning arena. No-op on a null pointer;
    /// fatal if no region claims `ptr`.
    pub fn free(&self, ptr: usize) {
        if ptr == 0 {
            return;
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(idx) = inner.arenas.iter().position(|a| a.contains(ptr)) else {
            panic!("free of pointer {ptr:#x} that no region claims");
        };
        let off = inner.arenas[idx].to_offset(ptr);
        inner.arenas[idx].free(off);
        inner
            .events
            .record(EventLevel::Trace, "free", "free", Some(ptr), None, Some(idx), "success");
    }

    /// Resizes a block. A null `ptr` behaves as [`TagHeap::allocate`];
    /// a zero `new_size` behaves as [`TagHeap::free`] and returns
    /// `None`. Tries in place first, then falls back to
    /// allocate-copy-free anywhere in the table.
    pub fn realloc(&self, ptr: usize, new_size: usize) -> Option<usize> {
        if ptr == 0 {
            return self.allocate(new_size);
        }
        if new_size == 0 {
            self.free(ptr);
            return None;
        }

        let moved = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let Some(idx) = inner.arenas.iter().position(|a| a.contains(ptr)) else {
                panic!("realloc of pointer {ptr:#x} that no region claims");
            };
            let off = inner.arenas[idx].to_offset(ptr);

            if inner.arenas[idx].realloc_in_place(off, new_size) {
                inner.events.record(
                    EventLevel::Trace,
                    "realloc",
                    "realloc_in_place",
                    Some(ptr),
                    Some(new_size),
                    Some(idx),
                    "success",
                );
                return Some(ptr);
            }
            inner.events.record(
                EventLevel::Debug,
                "realloc",
                "grow_in_place_failed",
                Some(ptr),
                Some(new_size),
                Some(idx),
                "fallback_alloc",
            );

            let mut found = None;
            for j in 0..inner.arenas.len() {
                if let Some(new_off) = inner.arenas[j].allocate(new_size, inner.config.policy) {
                    found = Some((j, new_off));
                    break;
                }
            }
            match found {
                Some((j, new_off)) => {
                    let copy_len = inner.arenas[idx].usable_size(off).min(new_size);
                    let data = inner.arenas[idx].payload(off, 0, copy_len).to_vec();
                    inner.arenas[j]
                        .payload_mut(new_off, 0, copy_len)
                        .copy_from_slice(&data);
                    inner.arenas[idx].free(off);
                    let new_ptr = inner.arenas[j].to_addr(new_off);
                    inner.events.record(
                        EventLevel::Trace,
                        "realloc",
                        "realloc_move",
                        Some(new_ptr),
                        Some(new_size),
                        Some(j),
                        "success",
                    );
                    Some(new_ptr)
                }
                None => {
                    inner.events.record(
                        EventLevel::Warn,
                        "realloc",
                        "alloc",
                        Some(ptr),
                        Some(new_size),
                        None,
                        "oom",
                    );
                    None
                }
            }
        };
        if moved.is_none() {
            self.notify_oom();
        }
        moved
    }

    /// Sum of free payload bytes across all arenas.
    pub fn total_free_bytes(&self) -> usize {
        self.inner.lock().arenas.iter().map(Arena::total_free).sum()
    }

    /// Sum of the per-arena low-water marks.
    pub fn minimum_ever_free_bytes(&self) -> usize {
        self.inner.lock().arenas.iter().map(Arena::min_free).sum()
    }

    /// Per-arena statistics snapshot, in region-table order.
    pub fn stats(&self) -> Vec<ArenaStats> {
        self.inner
            .lock()
            .arenas
            .iter()
            .map(|arena| ArenaStats {
                lower: arena.base(),
                upper: arena.limit(),
                total_free: arena.total_free(),
                min_free: arena.min_free(),
                free_blocks: arena.free_blocks().count(),
            })
            .collect()
    }

    /// Runs the consistency checker over every arena. Panics on any
    /// violated invariant; diagnostic, not part of the allocation path.
    pub fn check_consistency(&self, verbose: bool) -> Vec<ArenaCheckReport> {
        self.inner
            .lock()
            .arenas
            .iter()
            .map(|arena| arena.check(verbose))
            .collect()
    }

    /// Usable payload bytes behind the allocated block at `ptr`; at
    /// least the size that was requested for it.
    pub fn usable_size(&self, ptr: usize) -> usize {
        let guard = self.inner.lock();
        let arena = Self::owner(&guard.arenas, ptr);
        arena.usable_size(arena.to_offset(ptr))
    }

    /// Copies `data` into the block at `ptr`, `off` bytes into its
    /// payload. Bounds-checked against the block's usable size.
    pub fn write(&self, ptr: usize, off: usize, data: &[u8]) {
        let mut guard = self.inner.lock();
        let idx = Self::owner_index(&guard.arenas, ptr);
        let arena = &mut guard.arenas[idx];
        let payload = arena.to_offset(ptr);
        arena.payload_mut(payload, off, data.len()).copy_from_slice(data);
    }

    /// Copies `len` bytes out of the block at `ptr`, starting `off`
    /// bytes into its payload.
    pub fn read(&self, ptr: usize, off: usize, len: usize) -> Vec<u8> {
        let guard = self.inner.lock();
        let arena = Self::owner(&guard.arenas, ptr);
        arena.payload(arena.to_offset(ptr), off, len).to_vec()
    }

    /// Installs the hook invoked whenever every eligible arena is
    /// exhausted. Runs with no heap lock held, so it may allocate or
    /// free (e.g. drop caches) before the caller sees the failure.
    pub fn set_oom_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.oom_hook.lock() = Some(Arc::new(hook));
    }

    /// Removes the out-of-memory hook.
    pub fn clear_oom_hook(&self) {
        *self.oom_hook.lock() = None;
    }

    /// Drains buffered lifecycle records.
    pub fn drain_events(&self) -> Vec<HeapEvent> {
        self.inner.lock().events.drain()
    }

    fn owner_index(arenas: &[Arena], ptr: usize) -> usize {
        arenas
            .iter()
            .position(|a| a.contains(ptr))
            .unwrap_or_else(|| panic!("pointer {ptr:#x} is not claimed by any region"))
    }

    fn owner(arenas: &[Arena], ptr: usize) -> &Arena {
        &arenas[Self::owner_index(arenas, ptr)]
    }

    fn notify_oom(&self) {
        let hook = self.oom_hook.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

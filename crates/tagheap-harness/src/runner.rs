//! Trace replay against a live heap, with a shadow block table.
//!
//! Every allocation is filled with a slot-derived byte pattern, and the
//! pattern is re-verified on every free and realloc. After the trace,
//! the runner drains surviving blocks and requires the heap to recover
//! every free byte it started with.

use serde::Serialize;
use thiserror::Error;

use tagheap_core::{FitPolicy, HeapConfig, RegionSpec, RegionTableError, TagHeap};

use crate::trace::{Trace, TraceOp};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("trace region table rejected: {0}")]
    Setup(#[from] RegionTableError),

    #[error("op {index}: slot {slot} was never filled by this trace")]
    BadSlot { index: usize, slot: usize },

    #[error("op {index}: payload mismatch in block at {ptr:#x}")]
    PayloadMismatch { index: usize, ptr: usize },

    #[error("heap failed to recover: {expected} free bytes at setup, {actual} after drain")]
    AccountingMismatch { expected: usize, actual: usize },
}

/// Summary of one replay, rendered as JSON by the harness binary.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub name: String,
    pub ops: usize,
    pub allocs: usize,
    pub frees: usize,
    pub reallocs: usize,
    pub oom_failures: usize,
    /// Ops that named a slot left empty by an earlier failed alloc.
    pub skipped: usize,
    pub checks: usize,
    pub drained: usize,
    pub min_ever_free: usize,
    pub final_total_free: usize,
}

struct Slot {
    ptr: usize,
    len: usize,
    fill: u8,
}

fn fill_byte(slot: usize, ptr: usize) -> u8 {
    (slot as u8).wrapping_mul(31) ^ (ptr as u8)
}

fn verify(heap: &TagHeap, slot: &Slot, index: usize) -> Result<(), ReplayError> {
    if heap.read(slot.ptr, 0, slot.len) != vec![slot.fill; slot.len] {
        return Err(ReplayError::PayloadMismatch {
            index,
            ptr: slot.ptr,
        });
    }
    Ok(())
}

/// Replays `trace` against a fresh heap.
pub fn replay(trace: &Trace) -> Result<ReplayReport, ReplayError> {
    let regions: Vec<RegionSpec> = trace
        .regions
        .iter()
        .map(|r| RegionSpec::new(r.lower, r.upper))
        .collect();
    let config = HeapConfig {
        policy: if trace.best_fit {
            FitPolicy::BestFit
        } else {
            FitPolicy::FirstFit
        },
        ..HeapConfig::default()
    };
    let heap = TagHeap::new(&regions, config)?;
    let initial_free = heap.total_free_bytes();

    let mut slots: Vec<Option<Slot>> = Vec::new();
    let mut report = ReplayReport {
        name: trace.name.clone(),
        ops: trace.ops.len(),
        allocs: 0,
        frees: 0,
        reallocs: 0,
        oom_failures: 0,
        skipped: 0,
        checks: 0,
        drained: 0,
        min_ever_free: 0,
        final_total_free: 0,
    };

    for (index, op) in trace.ops.iter().enumerate() {
        match *op {
            TraceOp::Alloc { size, restricted } => {
                report.allocs += 1;
                let found = if restricted {
                    heap.allocate_restricted(size)
                } else {
                    heap.allocate(size)
                };
                match found {
                    Some(ptr) => {
                        let slot_index = slots.len();
                        let fill = fill_byte(slot_index, ptr);
                        heap.write(ptr, 0, &vec![fill; size]);
                        slots.push(Some(Slot {
                            ptr,
                            len: size,
                            fill,
                        }));
                    }
                    None => {
                        report.oom_failures += 1;
                        slots.push(None);
                    }
                }
            }
            TraceOp::Free { slot } => {
                let entry = slots
                    .get_mut(slot)
                    .ok_or(ReplayError::BadSlot { index, slot })?;
                match entry.take() {
                    Some(live) => {
                        verify(&heap, &live, index)?;
                        heap.free(live.ptr);
                        report.frees += 1;
                    }
                    None => report.skipped += 1,
                }
            }
            TraceOp::Realloc { slot, new_size } => {
                let entry = slots
                    .get_mut(slot)
                    .ok_or(ReplayError::BadSlot { index, slot })?;
                let Some(live) = entry.as_mut() else {
                    report.skipped += 1;
                    continue;
                };
                report.reallocs += 1;
                match heap.realloc(live.ptr, new_size) {
                    Some(ptr) if new_size > 0 => {
                        let keep = live.len.min(new_size);
                        if heap.read(ptr, 0, keep) != vec![live.fill; keep] {
                            return Err(ReplayError::PayloadMismatch { index, ptr });
                        }
                        heap.write(ptr, 0, &vec![live.fill; new_size]);
                        live.ptr = ptr;
                        live.len = new_size;
                    }
                    Some(_) => {}
                    None if new_size == 0 => {
                        // Freed through realloc.
                        *entry = None;
                        report.frees += 1;
                    }
                    None => report.oom_failures += 1,
                }
            }
            TraceOp::Check => {
                heap.check_consistency(false);
                report.checks += 1;
            }
        }
    }

    for (index, entry) in slots.iter_mut().enumerate() {
        if let Some(live) = entry.take() {
            verify(&heap, &live, index)?;
            heap.free(live.ptr);
            report.drained += 1;
        }
    }
    heap.check_consistency(false);

    report.min_ever_free = heap.minimum_ever_free_bytes();
    report.final_total_free = heap.total_free_bytes();
    if report.final_total_free != initial_free {
        return Err(ReplayError::AccountingMismatch {
            expected: initial_free,
            actual: report.final_total_free,
        });
    }
    Ok(report)
}

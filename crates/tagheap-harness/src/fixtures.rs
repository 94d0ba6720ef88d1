//! Canned traces for known-interesting allocator scenarios.

use crate::trace::{TRACE_VERSION, Trace, TraceOp, TraceRegion};

const LOW: TraceRegion = TraceRegion {
    lower: 0x1000,
    upper: 0x1000 + 4096,
};
const HIGH: TraceRegion = TraceRegion {
    lower: 0x0040_0000,
    upper: 0x0040_0000 + 4096,
};

fn fixture(name: &str, regions: Vec<TraceRegion>, ops: Vec<TraceOp>) -> Trace {
    Trace {
        version: TRACE_VERSION.to_string(),
        name: name.to_string(),
        regions,
        best_fit: false,
        ops,
    }
}

fn alloc(size: usize) -> TraceOp {
    TraceOp::Alloc {
        size,
        restricted: false,
    }
}

fn alloc_restricted(size: usize) -> TraceOp {
    TraceOp::Alloc {
        size,
        restricted: true,
    }
}

/// Free a block between two live neighbors, then reuse the hole with a
/// smaller request.
pub fn first_fit_reuse() -> Trace {
    fixture(
        "first_fit_reuse",
        vec![LOW],
        vec![
            alloc(100),
            alloc(200),
            TraceOp::Free { slot: 0 },
            alloc(50),
            TraceOp::Check,
            TraceOp::Free { slot: 1 },
            TraceOp::Free { slot: 2 },
            TraceOp::Check,
        ],
    )
}

/// Exhaust the restricted (low) region while the high region stays
/// available to unrestricted traffic.
pub fn ceiling_exhaustion() -> Trace {
    let mut ops = Vec::new();
    // 4096 - 32 header leaves room for 14 blocks of 272 (request 256).
    for _ in 0..14 {
        ops.push(alloc_restricted(256));
    }
    // The 15th restricted request has nowhere to go.
    ops.push(alloc_restricted(256));
    ops.push(alloc(256));
    ops.push(TraceOp::Check);
    fixture("ceiling_exhaustion", vec![LOW, HIGH], ops)
}

/// `realloc(ptr, 0)` is a free; `realloc(0, n)` never appears because a
/// trace slot always names a real block.
pub fn realloc_zero() -> Trace {
    fixture(
        "realloc_zero",
        vec![LOW],
        vec![
            alloc(64),
            alloc(64),
            TraceOp::Realloc {
                slot: 0,
                new_size: 0,
            },
            TraceOp::Check,
            TraceOp::Free { slot: 1 },
        ],
    )
}

/// Shrink a block, then grow it back into its own freed tail.
pub fn shrink_grow_round_trip() -> Trace {
    fixture(
        "shrink_grow_round_trip",
        vec![LOW],
        vec![
            alloc(256),
            alloc(64),
            TraceOp::Realloc {
                slot: 0,
                new_size: 64,
            },
            TraceOp::Check,
            TraceOp::Realloc {
                slot: 0,
                new_size: 256,
            },
            TraceOp::Check,
        ],
    )
}

/// Checkerboard frees followed by hole refills.
pub fn checkerboard() -> Trace {
    let mut ops = Vec::new();
    for _ in 0..24 {
        ops.push(alloc(64));
    }
    for slot in (0..24).step_by(2) {
        ops.push(TraceOp::Free { slot });
    }
    ops.push(TraceOp::Check);
    for _ in 0..12 {
        ops.push(alloc(64));
    }
    ops.push(TraceOp::Check);
    fixture("checkerboard", vec![LOW], ops)
}

pub fn names() -> &'static [&'static str] {
    &[
        "first_fit_reuse",
        "ceiling_exhaustion",
        "realloc_zero",
        "shrink_grow_round_trip",
        "checkerboard",
    ]
}

pub fn by_name(name: &str) -> Option<Trace> {
    match name {
        "first_fit_reuse" => Some(first_fit_reuse()),
        "ceiling_exhaustion" => Some(ceiling_exhaustion()),
        "realloc_zero" => Some(realloc_zero()),
        "shrink_grow_round_trip" => Some(shrink_grow_round_trip()),
        "checkerboard" => Some(checkerboard()),
        _ => None,
    }
}

pub fn all() -> Vec<Trace> {
    names()
        .iter()
        .map(|name| by_name(name).unwrap_or_else(|| unreachable!()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_name_resolves() {
        for name in names() {
            let trace = by_name(name).expect("named fixture exists");
            assert_eq!(trace.name, *name);
            assert!(!trace.ops.is_empty());
        }
        assert!(by_name("no_such_fixture").is_none());
    }
}

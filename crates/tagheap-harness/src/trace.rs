//! Trace model: serializable allocator operation sequences.

use serde::{Deserialize, Serialize};

/// One replayable operation. Slots index the replay's live-block table;
/// a generator only refers to slots it has previously filled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TraceOp {
    Alloc {
        size: usize,
        #[serde(default)]
        restricted: bool,
    },
    Free {
        slot: usize,
    },
    Realloc {
        slot: usize,
        new_size: usize,
    },
    /// Run the consistency checker over every arena.
    Check,
}

/// Region-table entry carried inside a trace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraceRegion {
    pub lower: usize,
    pub upper: usize,
}

/// A complete replayable scenario: region table, fit policy, ops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trace {
    /// Schema version.
    pub version: String,
    pub name: String,
    pub regions: Vec<TraceRegion>,
    #[serde(default)]
    pub best_fit: bool,
    pub ops: Vec<TraceOp>,
}

pub const TRACE_VERSION: &str = "tagheap-trace.v1";

impl Trace {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }
}

/// Deterministic generator state (64-bit LCG).
pub struct Lcg(pub u64);

impl Lcg {
    pub fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0
    }

    pub fn below(&mut self, bound: usize) -> usize {
        (self.next() >> 33) as usize % bound
    }
}

/// Builds a random but always-valid trace: frees and reallocs only ever
/// name slots the trace has already filled, and a checker op is woven
/// in at a fixed stride.
pub fn generate_trace(seed: u64, steps: usize, regions: Vec<TraceRegion>, best_fit: bool) -> Trace {
    let mut rng = Lcg(seed);
    let mut ops = Vec::with_capacity(steps + steps / 32);
    // Slots known to hold a live block, by index into the replay table.
    let mut live: Vec<usize> = Vec::new();
    let mut next_slot = 0usize;

    for step in 0..steps {
        match rng.below(10) {
            0..=4 => {
                ops.push(TraceOp::Alloc {
                    size: 1 + rng.below(300),
                    restricted: rng.below(8) == 0,
                });
                live.push(next_slot);
                next_slot += 1;
            }
            5..=7 if !live.is_empty() => {
                let slot = live.swap_remove(rng.below(live.len()));
                ops.push(TraceOp::Free { slot });
            }
            8..=9 if !live.is_empty() => {
                let slot = live[rng.below(live.len())];
                ops.push(TraceOp::Realloc {
                    slot,
                    new_size: 1 + rng.below(400),
                });
            }
            _ => {
                ops.push(TraceOp::Alloc {
                    size: 1 + rng.below(64),
                    restricted: false,
                });
                live.push(next_slot);
                next_slot += 1;
            }
        }
        if step % 32 == 31 {
            ops.push(TraceOp::Check);
        }
    }
    ops.push(TraceOp::Check);

    Trace {
        version: TRACE_VERSION.to_string(),
        name: format!("random-{seed:#x}-{steps}"),
        regions,
        best_fit,
        ops,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_json_round_trip() {
        let trace = Trace {
            version: TRACE_VERSION.to_string(),
            name: "round-trip".to_string(),
            regions: vec![TraceRegion {
                lower: 0x1000,
                upper: 0x2000,
            }],
            best_fit: true,
            ops: vec![
                TraceOp::Alloc {
                    size: 64,
                    restricted: false,
                },
                TraceOp::Realloc {
                    slot: 0,
                    new_size: 128,
                },
                TraceOp::Free { slot: 0 },
                TraceOp::Check,
            ],
        };
        let json = trace.to_json().expect("serializes");
        assert_eq!(Trace::from_json(&json).expect("parses"), trace);
    }

    #[test]
    fn test_generated_trace_is_deterministic() {
        let regions = vec![TraceRegion {
            lower: 0x1000,
            upper: 0x1000 + 8192,
        }];
        let a = generate_trace(42, 200, regions.clone(), false);
        let b = generate_trace(42, 200, regions, false);
        assert_eq!(a, b);
    }

    #[test]
    fn test_generated_trace_never_frees_unfilled_slot() {
        let regions = vec![TraceRegion {
            lower: 0x1000,
            upper: 0x1000 + 8192,
        }];
        let trace = generate_trace(7, 500, regions, false);
        let mut filled = 0usize;
        for op in &trace.ops {
            match op {
                TraceOp::Alloc { .. } => filled += 1,
                TraceOp::Free { slot } | TraceOp::Realloc { slot, .. } => {
                    assert!(*slot < filled, "op names a slot that was never filled");
                }
                TraceOp::Check => {}
            }
        }
    }
}

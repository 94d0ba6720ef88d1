//! Heap configuration.

/// Free-block search policy.
///
/// First-fit is the compiled-in default: take the first (lowest-address)
/// adequate block. Best-fit scans the whole list and takes the smallest
/// adequate block; it trades a full scan for less fragmentation on some
/// workloads and exists as a documented alternative, not the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FitPolicy {
    #[default]
    FirstFit,
    BestFit,
}

/// Context-wide knobs, fixed at setup.
#[derive(Debug, Clone, Copy)]
pub struct HeapConfig {
    /// Free-block search policy for every arena.
    pub policy: FitPolicy,
    /// Address ceiling used by restricted allocations: only arenas whose
    /// range lies entirely below this address are eligible. Matches the
    /// reach of address-limited DMA clients.
    pub restricted_ceiling: usize,
    /// Whether to keep structured lifecycle records. Drained via
    /// `TagHeap::drain_events`; disable for benchmark runs.
    pub record_events: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            policy: FitPolicy::FirstFit,
            restricted_ceiling: 0x0020_0000,
            record_events: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HeapConfig::default();
        assert_eq!(config.policy, FitPolicy::FirstFit);
        assert_eq!(config.restricted_ceiling, 0x0020_0000);
        assert!(config.record_events);
    }
}

//! Every shipped fixture must replay clean, and the interesting ones
//! must show the behavior they were written to pin down.

use tagheap_harness::{fixtures, replay};

#[test]
fn test_all_fixtures_replay_clean() {
    for trace in fixtures::all() {
        let report = replay(&trace).unwrap_or_else(|err| panic!("{}: {err}", trace.name));
        assert_eq!(report.skipped, 0, "{}: ops hit empty slots", trace.name);
        assert!(report.checks > 0, "{}: no checker coverage", trace.name);
    }
}

#[test]
fn test_ceiling_exhaustion_fixture_sees_exactly_one_oom() {
    let report = replay(&fixtures::ceiling_exhaustion()).expect("replays");
    assert_eq!(report.oom_failures, 1, "the 15th restricted alloc must fail");
    assert_eq!(report.allocs, 16);
}

#[test]
fn test_shrink_grow_fixture_reallocs_in_place() {
    let report = replay(&fixtures::shrink_grow_round_trip()).expect("replays");
    assert_eq!(report.reallocs, 2);
    assert_eq!(report.oom_failures, 0);
}

#[test]
fn test_realloc_zero_fixture_frees_through_realloc() {
    let report = replay(&fixtures::realloc_zero()).expect("replays");
    assert_eq!(report.frees, 2, "one explicit free plus the realloc(_, 0)");
    assert_eq!(report.drained, 0);
}

#[test]
fn test_random_traces_replay_across_policies() {
    let regions = vec![
        tagheap_harness::TraceRegion {
            lower: 0x1000,
            upper: 0x1000 + 16384,
        },
        tagheap_harness::TraceRegion {
            lower: 0x0040_0000,
            upper: 0x0040_0000 + 16384,
        },
    ];
    for (seed, best_fit) in [(11u64, false), (12, true), (0xFEED, false), (0xFACE, true)] {
        let trace = tagheap_harness::generate_trace(seed, 1200, regions.clone(), best_fit);
        let report = replay(&trace).unwrap_or_else(|err| panic!("{}: {err}", trace.name));
        assert!(report.allocs > 0);
        assert!(report.checks > 0);
    }
}

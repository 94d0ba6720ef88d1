//! Trace replay harness for the tagheap allocator.
//!
//! Traces are serializable operation sequences replayed against a fresh
//! heap with a shadow model that cross-checks pointers, payload
//! contents, and free-byte accounting. Fixtures are canned traces for
//! known-interesting scenarios; the `harness` binary replays fixtures,
//! generated random traces, or trace files, and renders reports as
//! JSON/JSONL.

pub mod fixtures;
pub mod runner;
pub mod trace;

pub use runner::{ReplayError, ReplayReport, replay};
pub use trace::{Trace, TraceOp, TraceRegion, generate_trace};

//! Structured lifecycle records.
//!
//! The heap keeps an in-state log of allocation lifecycle events with a
//! monotonic decision id, drained by the embedder (test harnesses render
//! them as JSONL). This keeps the core crate free of logging
//! dependencies while still making every decision observable.

/// Severity of a lifecycle record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Trace,
    Debug,
    Info,
    Warn,
}

/// One allocation-lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapEvent {
    /// Monotonic decision/event id.
    pub decision_id: u64,
    pub level: EventLevel,
    /// Entry point (`allocate`, `free`, `realloc`).
    pub op: &'static str,
    /// Event kind (`alloc`, `oom`, `free`, `realloc_in_place`, ...).
    pub event: &'static str,
    /// Logical pointer involved, when known.
    pub ptr: Option<usize>,
    /// Size involved, when known.
    pub size: Option<usize>,
    /// Index of the arena that served the request, when known.
    pub arena: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
}

/// Append-only event buffer with id assignment.
#[derive(Debug, Default)]
pub(crate) struct EventLog {
    enabled: bool,
    next_decision_id: u64,
    records: Vec<HeapEvent>,
}

impl EventLog {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            next_decision_id: 1,
            records: Vec::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn record(
        &mut self,
        level: EventLevel,
        op: &'static str,
        event: &'static str,
        ptr: Option<usize>,
        size: Option<usize>,
        arena: Option<usize>,
        outcome: &'static str,
    ) {
        if !self.enabled {
            return;
        }
        let decision_id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        self.records.push(HeapEvent {
            decision_id,
            level,
            op,
            event,
            ptr,
            size,
            arena,
            outcome,
        });
    }

    pub(crate) fn drain(&mut self) -> Vec<HeapEvent> {
        std::mem::take(&mut self.records)
    }
}

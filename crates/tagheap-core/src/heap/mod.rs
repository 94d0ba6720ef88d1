//! Heap management.
//!
//! Layered bottom-up:
//! - [`tag`]: boundary-tag block codec (size + flag word, footer/canary).
//! - [`free_list`]: intrusive address-ordered free list stored in free payloads.
//! - [`arena`]: per-region allocator core (first-fit, split, coalesce).
//! - [`region`]: multi-arena dispatch with address-ceiling routing.
//! - [`check`]: diagnostic consistency checker, off the allocation path.

pub mod arena;
pub mod check;
pub mod free_list;
pub mod region;
pub mod tag;

pub use arena::Arena;

//! # tagheap-core
//!
//! A boundary-tag, first-fit, coalescing heap manager operating over
//! pre-registered memory regions.
//!
//! Each region becomes an independent arena with its own free list and
//! statistics. Allocation requests are routed across the ordered region
//! table by [`TagHeap`], optionally constrained by an address ceiling so
//! that address-limited clients (e.g. DMA engines that can only reach a
//! low window) are only served from eligible regions.
//!
//! Blocks are spans inside an arena's owned byte buffer, addressed by the
//! offset of their header word; all buffer access goes through
//! bounds-checked accessors. No `unsafe` code is permitted at the crate
//! level.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod event;
pub mod heap;

pub use config::{FitPolicy, HeapConfig};
pub use error::RegionTableError;
pub use event::{EventLevel, HeapEvent};
pub use heap::check::ArenaCheckReport;
pub use heap::region::{ArenaStats, RegionSpec, TagHeap};

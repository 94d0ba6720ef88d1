//! Setup errors.
//!
//! Only region-table validation is recoverable. Allocation failure is an
//! `Option::None` (plus the out-of-memory hook), and invariant
//! violations detected after setup are fatal panics.

use thiserror::Error;

/// Rejection reasons for a region table at setup time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegionTableError {
    #[error("region table is empty")]
    EmptyTable,

    #[error(
        "region [{lower:#x}, {upper:#x}) is too small to hold the arena header and one block"
    )]
    RegionTooSmall { lower: usize, upper: usize },

    #[error("region [{lower:#x}, {upper:#x}) overlaps its predecessor or is out of address order")]
    OverlapOrDisorder { lower: usize, upper: usize },
}

//! # Work Partitioner
//!
//! Pure functions deriving a group shape for an index space.
//!
//! Two algorithms, tried in order when the caller does not pass an
//! explicit shape:
//!
//! 1. honor a compile-time-required shape if it tiles the index space
//!    within the lane budget;
//! 2. greedy single-dimension split: the largest lane count that evenly
//!    divides the first global dimension, leaving the other axes at 1.
//!
//! Whatever shape comes out (or in, when the caller chose one) is
//! re-validated independently at dispatch time.

use ember_core::{Error, Result};

// =============================================================================
// GROUP-SIZE DERIVATION
// =============================================================================

/// Derive a group shape for `global`.
///
/// `required` is the kernel's compile-time-fixed shape, all-zero when
/// unset. The fixed shape is used only when every global component is
/// divisible by it and its lane product fits `max_lanes`; otherwise the
/// greedy split takes over.
pub fn derive_group_size(
    global: [u32; 3],
    required: [u32; 3],
    max_lanes: u32,
) -> Result<[u32; 3]> {
    if global.contains(&0) {
        return Err(Error::InvalidGlobalSize);
    }

    if required != [0, 0, 0] && fixed_shape_fits(global, required, max_lanes) {
        return Ok(required);
    }

    // Greedy split along x: scan down from the full lane budget so the
    // hardware runs as wide as divisibility allows. g == 1 always divides,
    // so this only fails on a zero lane budget.
    let mut g = max_lanes;
    while g >= 1 {
        if global[0] % g == 0 {
            return Ok([g, 1, 1]);
        }
        g -= 1;
    }
    Err(Error::InvalidGroupSize)
}

fn fixed_shape_fits(global: [u32; 3], required: [u32; 3], max_lanes: u32) -> bool {
    let mut lanes: u64 = 1;
    for i in 0..3 {
        if required[i] == 0 || global[i] % required[i] != 0 {
            return false;
        }
        lanes *= u64::from(required[i]);
    }
    lanes <= u64::from(max_lanes)
}

// =============================================================================
// DISPATCH-TIME VALIDATION
// =============================================================================

/// Validate a group shape against an index space.
///
/// Checked independently of [`derive_group_size`] so explicitly chosen
/// shapes go through the same gate: every component nonzero, the lane
/// product within budget, and every global component evenly divisible.
pub fn validate_group_size(global: [u32; 3], local: [u32; 3], max_lanes: u32) -> Result<()> {
    if local.contains(&0) {
        return Err(Error::InvalidGroupSize);
    }
    let lanes = u64::from(local[0]) * u64::from(local[1]) * u64::from(local[2]);
    if lanes == 0 || lanes > u64::from(max_lanes) {
        return Err(Error::InvalidGroupSize);
    }
    for i in 0..3 {
        if global[i] == 0 || global[i] % local[i] != 0 {
            return Err(Error::InvalidGlobalSize);
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

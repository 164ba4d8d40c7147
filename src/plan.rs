use tracing::debug;

use crate::error::JobError;
use crate::range::SliceRange;

/// Upper bound (exclusive) on the requested slice count.
pub const MAX_SLICES: usize = 16;

/// Minimum width of every slice except possibly the last one.
pub const DEFAULT_LOWER_BOUND: u64 = 256 * 1024;

pub fn validate_slice_count(requested: usize) -> Result<(), JobError> {
    if requested == 0 || requested >= MAX_SLICES {
        return Err(JobError::InvalidConfiguration(format!(
            "slice count must be in [1, {}), got {}",
            MAX_SLICES, requested
        )));
    }
    Ok(())
}

/// Split `[0, total)` into ordered, pairwise disjoint spans.
///
/// The width is `ceil(total / requested)` unless that falls below
/// `lower_bound`, in which case the width becomes `lower_bound` and the count
/// shrinks to `ceil(total / lower_bound)`. The last span is open-ended.
pub fn plan_slices(total: u64, requested: usize, lower_bound: u64) -> Result<Vec<SliceRange>, JobError> {
    validate_slice_count(requested)?;
    if lower_bound == 0 {
        return Err(JobError::InvalidConfiguration(
            "minimum slice size must be positive".to_string(),
        ));
    }
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut width = total.div_ceil(requested as u64);
    if width < lower_bound {
        width = lower_bound;
    }
    // Rounding the width up can leave trailing spans with nothing to fetch.
    let count = total.div_ceil(width);

    let mut slices = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    for index in 0..count {
        if index + 1 == count {
            slices.push(SliceRange::open(offset));
        } else {
            slices.push(SliceRange::closed(offset, offset + width - 1));
        }
        offset += width;
    }

    debug!(total, requested, effective = count, width, "planned slices");
    Ok(slices)
}

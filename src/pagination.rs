//! Limit/offset pagination shared by every aggregator.
//!
//! Each paged query maps the returned index range through its own indexed
//! lookup. The ceilings bound the number of downstream lookups a single call can
//! issue, so callers asking for more than a ceiling get an error instead of a
//! silently truncated page.

use ethers::types::Address;
use std::ops::Range;

use crate::error::{Result, SugarError};

/// Pools per page (`all`, `for_swaps`, `tokens`, `epochs_latest`).
pub const MAX_LPS: u64 = 1000;
/// Pools scanned per positions page.
pub const MAX_POSITIONS: u64 = 200;
/// Epochs per page.
pub const MAX_EPOCHS: u64 = 200;
/// Lock ids per page.
pub const MAX_LOCKS: u64 = 1000;
/// Tokens per `tokens` page.
pub const MAX_TOKENS: u64 = 2000;

/// Returns the half-open index range `[offset, min(offset + limit, total_count))`.
///
/// An offset past the end yields an empty range, never an error.
///
/// # Errors
///
/// `InvalidArgument` when `limit` is zero or exceeds `ceiling`.
pub fn paginate(total_count: u64, limit: u64, offset: u64, ceiling: u64) -> Result<Range<u64>> {
    check_limit(limit, ceiling)?;
    let start = offset.min(total_count);
    let end = start.saturating_add(limit).min(total_count);
    Ok(start..end)
}

/// Validates a page size before any source is touched.
pub fn check_limit(limit: u64, ceiling: u64) -> Result<()> {
    if limit == 0 {
        return Err(SugarError::InvalidArgument(
            "limit must be greater than zero".to_string(),
        ));
    }
    if limit > ceiling {
        return Err(SugarError::InvalidArgument(format!(
            "limit {} exceeds the maximum page size {}",
            limit, ceiling
        )));
    }
    Ok(())
}

/// Maps a range over the concatenated factory pool lists to
/// `(factory, local_index)` pairs. Factories keep the order of `counts`.
pub fn factory_slots(counts: &[(Address, u64)], range: Range<u64>) -> Vec<(Address, u64)> {
    let mut slots = Vec::with_capacity(range.end.saturating_sub(range.start) as usize);
    let mut base = 0u64;
    for &(factory, count) in counts {
        let next = base.saturating_add(count);
        for global in range.start.max(base)..range.end.min(next) {
            slots.push((factory, global - base));
        }
        base = next;
        if base >= range.end {
            break;
        }
    }
    slots
}

/// Page ceilings in effect for one `Sugar` instance.
///
/// Configured values can only tighten the compiled-in maxima.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_lps: u64,
    pub max_positions: u64,
    pub max_epochs: u64,
    pub max_locks: u64,
    pub max_tokens: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_lps: MAX_LPS,
            max_positions: MAX_POSITIONS,
            max_epochs: MAX_EPOCHS,
            max_locks: MAX_LOCKS,
            max_tokens: MAX_TOKENS,
        }
    }
}

impl From<&crate::settings::LimitSettings> for Limits {
    fn from(cfg: &crate::settings::LimitSettings) -> Self {
        let clamp = |value: u64, max: u64| value.clamp(1, max);
        Self {
            max_lps: clamp(cfg.max_lps, MAX_LPS),
            max_positions: clamp(cfg.max_positions, MAX_POSITIONS),
            max_epochs: clamp(cfg.max_epochs, MAX_EPOCHS),
            max_locks: clamp(cfg.max_locks, MAX_LOCKS),
            max_tokens: clamp(cfg.max_tokens, MAX_TOKENS),
        }
    }
}

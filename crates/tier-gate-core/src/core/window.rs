// crates/tier-gate-core/src/core/window.rs
// ============================================================================
// Module: Tier Gate Usage Windows
// Description: Fixed-epoch window arithmetic for usage counters.
// Purpose: Map an instant and a timeframe to a deterministic window.
// Dependencies: serde, thiserror, time
// ============================================================================

//! ## Overview
//! Windows are computed in UTC from fixed epochs, never from subject-local
//! time, so every subject sharing a scope rolls over at the same instant.
//!
//! - `day`: aligned to the Unix epoch.
//! - `week`: aligned to Monday 1970-01-05T00:00Z.
//! - `month`: aligned to the first day of each calendar month.
//! - `billing_cycle`: fixed-length cycles aligned to a configured anchor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::Date;
use time::Month;
use time::OffsetDateTime;

use crate::core::model::Timeframe;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Seconds per day.
const SECONDS_PER_DAY: i64 = 86_400;
/// Seconds per week.
const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;
/// Unix timestamp of Monday 1970-01-05T00:00Z.
const WEEK_EPOCH_UNIX: i64 = 4 * SECONDS_PER_DAY;
/// Default billing cycle length in days.
pub const DEFAULT_BILLING_CYCLE_DAYS: u32 = 30;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Window alignment settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Billing cycle length in days.
    pub billing_cycle_days: u32,
    /// Unix timestamp (seconds) that billing cycles are aligned to.
    pub billing_anchor_unix: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            billing_cycle_days: DEFAULT_BILLING_CYCLE_DAYS,
            billing_anchor_unix: 0,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Window computation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    /// Billing cycle length is zero.
    #[error("billing cycle length must be greater than zero")]
    EmptyCycle,
    /// Computed boundary is outside the representable range.
    #[error("usage window out of range: {0}")]
    OutOfRange(String),
}

// ============================================================================
// SECTION: Windows
// ============================================================================

/// Half-open usage window `[start, end)`.
///
/// # Invariants
/// - `start <= instant < end` for the instant it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageWindow {
    /// Inclusive window start.
    pub start: OffsetDateTime,
    /// Exclusive window end; the counter resets here.
    pub end: OffsetDateTime,
}

impl UsageWindow {
    /// Returns the window start as unix seconds, used as the counter key.
    #[must_use]
    pub const fn start_unix(&self) -> i64 {
        self.start.unix_timestamp()
    }
}

/// Computes the window containing `now` for a timeframe.
///
/// # Errors
///
/// Returns [`WindowError`] when the configuration is unusable or the
/// boundaries fall outside the supported date range.
pub fn usage_window(
    timeframe: Timeframe,
    now: OffsetDateTime,
    config: &WindowConfig,
) -> Result<UsageWindow, WindowError> {
    let instant = now.unix_timestamp();
    match timeframe {
        Timeframe::Day => fixed_window(instant, 0, SECONDS_PER_DAY),
        Timeframe::Week => fixed_window(instant, WEEK_EPOCH_UNIX, SECONDS_PER_WEEK),
        Timeframe::Month => month_window(now),
        Timeframe::BillingCycle => {
            if config.billing_cycle_days == 0 {
                return Err(WindowError::EmptyCycle);
            }
            let length = i64::from(config.billing_cycle_days) * SECONDS_PER_DAY;
            fixed_window(instant, config.billing_anchor_unix, length)
        }
    }
}

/// Returns the earliest start among the windows containing `now`.
///
/// A counter keyed before this instant belongs to a window that has closed
/// for every timeframe, so it can never be read or incremented again.
///
/// # Errors
///
/// Returns [`WindowError`] when any window cannot be computed.
pub fn retention_cutoff(now: OffsetDateTime, config: &WindowConfig) -> Result<i64, WindowError> {
    let mut cutoff = i64::MAX;
    for timeframe in Timeframe::ALL {
        cutoff = cutoff.min(usage_window(timeframe, now, config)?.start_unix());
    }
    Ok(cutoff)
}

/// Computes a fixed-length window aligned to `anchor`.
fn fixed_window(instant: i64, anchor: i64, length: i64) -> Result<UsageWindow, WindowError> {
    let offset = instant
        .checked_sub(anchor)
        .ok_or_else(|| WindowError::OutOfRange("instant precedes anchor range".to_string()))?;
    let start = offset
        .div_euclid(length)
        .checked_mul(length)
        .and_then(|value| value.checked_add(anchor))
        .ok_or_else(|| WindowError::OutOfRange("window start overflow".to_string()))?;
    let end = start
        .checked_add(length)
        .ok_or_else(|| WindowError::OutOfRange("window end overflow".to_string()))?;
    Ok(UsageWindow {
        start: from_unix(start)?,
        end: from_unix(end)?,
    })
}

/// Computes the calendar month window containing `now`.
fn month_window(now: OffsetDateTime) -> Result<UsageWindow, WindowError> {
    let utc = now.to_offset(time::UtcOffset::UTC);
    let month = utc.month();
    let year = utc.year();
    let start = Date::from_calendar_date(year, month, 1)
        .map_err(|err| WindowError::OutOfRange(err.to_string()))?;
    let (next_year, next_month) = if month == Month::December {
        (year + 1, Month::January)
    } else {
        (year, month.next())
    };
    let end = Date::from_calendar_date(next_year, next_month, 1)
        .map_err(|err| WindowError::OutOfRange(err.to_string()))?;
    Ok(UsageWindow {
        start: start.midnight().assume_utc(),
        end: end.midnight().assume_utc(),
    })
}

/// Converts unix seconds into a UTC datetime.
fn from_unix(seconds: i64) -> Result<OffsetDateTime, WindowError> {
    OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|err| WindowError::OutOfRange(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

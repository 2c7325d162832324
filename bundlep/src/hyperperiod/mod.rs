/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Hyperperiod of a task set.
//!
//! The hyperperiod is the least common multiple of all task periods: the
//! smallest window after which the release pattern repeats.  It is reported
//! by the printer and bounds how long a simulation of the set must run.
//!
//! "No periods" and "overflow" are distinct [`HyperperiodError`] variants so
//! callers never have to interpret a `0` result.

pub mod math;

use tracing::{debug, warn};

use crate::task::Time;
use math::lcm_of_slice;

// ── Error type ────────────────────────────────────────────────────────────────

/// Errors that can occur during hyperperiod calculation.
#[derive(Debug, PartialEq, Eq)]
pub enum HyperperiodError {
    /// No periods were given (or every period was zero).
    NoValidPeriods,

    /// LCM calculation overflowed `u64`.
    ///
    /// Contains the two operands that caused the overflow.
    Overflow { a: Time, b: Time },
}

impl std::fmt::Display for HyperperiodError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HyperperiodError::NoValidPeriods => {
                write!(f, "no tasks with a valid (non-zero) period")
            }
            HyperperiodError::Overflow { a, b } => {
                write!(f, "LCM overflow computing lcm({a}, {b})")
            }
        }
    }
}

impl std::error::Error for HyperperiodError {}

// ── HyperperiodInfo ───────────────────────────────────────────────────────────

/// Calculated hyperperiod of one task set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperperiodInfo {
    /// LCM of every unique period.
    pub hyperperiod: Time,

    /// Unique periods present in the set (sorted, deduplicated).
    pub unique_periods: Vec<Time>,

    /// Number of periods that contributed.
    pub task_count: usize,
}

/// Compute the hyperperiod of `periods`.  Zero periods are ignored.
///
/// # Errors
/// * [`HyperperiodError::NoValidPeriods`] – nothing left after filtering.
/// * [`HyperperiodError::Overflow`] – LCM computation exceeded `u64`.
pub fn calculate(periods: impl IntoIterator<Item = Time>) -> Result<HyperperiodInfo, HyperperiodError> {
    let mut unique_periods: Vec<Time> = periods.into_iter().filter(|&p| p > 0).collect();
    let task_count = unique_periods.len();
    if task_count == 0 {
        warn!("No valid periods for hyperperiod calculation");
        return Err(HyperperiodError::NoValidPeriods);
    }
    unique_periods.sort_unstable();
    unique_periods.dedup();

    let hyperperiod = lcm_of_slice(&unique_periods)?;
    debug!(
        hyperperiod,
        task_count,
        unique_count = unique_periods.len(),
        "Calculated hyperperiod"
    );

    Ok(HyperperiodInfo {
        hyperperiod,
        unique_periods,
        task_count,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_periods() {
        let info = calculate([8, 16]).unwrap();
        assert_eq!(info.hyperperiod, 16);
        assert_eq!(info.task_count, 2);
    }

    #[test]
    fn baruah_periods() {
        let periods = [8, 20, 25, 35, 50, 90, 110, 105, 100, 110];
        let info = calculate(periods).unwrap();
        // 2^3 · 3^2 · 5^2 · 7 · 11
        assert_eq!(info.hyperperiod, 138_600);
        assert_eq!(info.task_count, 10);
        assert_eq!(info.unique_periods.len(), 9);
    }

    #[test]
    fn unique_periods_are_sorted_and_deduped() {
        let info = calculate([30, 10, 30, 20]).unwrap();
        assert_eq!(info.unique_periods, vec![10, 20, 30]);
        assert_eq!(info.hyperperiod, 60);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(calculate([]).unwrap_err(), HyperperiodError::NoValidPeriods);
    }

    #[test]
    fn zero_periods_are_ignored() {
        assert_eq!(calculate([0, 0]).unwrap_err(), HyperperiodError::NoValidPeriods);
        assert_eq!(calculate([0, 12]).unwrap().hyperperiod, 12);
    }

    #[test]
    fn overflow_is_reported() {
        let a = u64::MAX / 2 + 1;
        let result = calculate([a, a - 1]);
        assert!(matches!(result, Err(HyperperiodError::Overflow { .. })));
    }
}

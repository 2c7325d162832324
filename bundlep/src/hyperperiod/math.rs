/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Integer helpers shared by the hyperperiod and the response-time analysis.

use super::HyperperiodError;
use crate::task::Time;

/// Iterative Euclidean GCD.  `gcd(0, x) == x`.
pub fn gcd(mut a: Time, mut b: Time) -> Time {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Checked LCM.  `Ok(0)` when either input is `0`.
///
/// Divides before multiplying; the final multiplication is still checked.
pub fn lcm(a: Time, b: Time) -> Result<Time, HyperperiodError> {
    if a == 0 || b == 0 {
        return Ok(0);
    }
    (a / gcd(a, b))
        .checked_mul(b)
        .ok_or(HyperperiodError::Overflow { a, b })
}

/// LCM of a slice.  `Ok(0)` for an empty slice; stops at the first overflow.
pub fn lcm_of_slice(values: &[Time]) -> Result<Time, HyperperiodError> {
    values
        .iter()
        .try_fold(values.first().copied().unwrap_or(0), |acc, &v| lcm(acc, v))
}

/// `⌈a / b⌉` for `b > 0`.  Returns `None` when `b == 0`.
pub fn ceil_div(a: Time, b: Time) -> Option<Time> {
    if b == 0 {
        return None;
    }
    Some(a / b + Time::from(a % b != 0))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcd_basic_cases() {
        assert_eq!(gcd(12, 8), 4);
        assert_eq!(gcd(17, 13), 1);
        assert_eq!(gcd(0, 5), 5);
        assert_eq!(gcd(5, 0), 5);
    }

    #[test]
    fn lcm_basic_cases() {
        assert_eq!(lcm(4, 6).unwrap(), 12);
        assert_eq!(lcm(8, 16).unwrap(), 16);
        assert_eq!(lcm(0, 5).unwrap(), 0);
    }

    #[test]
    fn lcm_overflow_returns_error() {
        let a = u64::MAX / 2 + 1;
        let b = u64::MAX / 2 + 3;
        assert!(matches!(lcm(a, b), Err(HyperperiodError::Overflow { .. })));
    }

    #[test]
    fn lcm_of_slice_cases() {
        assert_eq!(lcm_of_slice(&[]).unwrap(), 0);
        assert_eq!(lcm_of_slice(&[42]).unwrap(), 42);
        assert_eq!(lcm_of_slice(&[8, 20, 25]).unwrap(), 200);
    }

    #[test]
    fn ceil_div_rounds_up() {
        assert_eq!(ceil_div(0, 8), Some(0));
        assert_eq!(ceil_div(1, 8), Some(1));
        assert_eq!(ceil_div(8, 8), Some(1));
        assert_eq!(ceil_div(9, 8), Some(2));
        assert_eq!(ceil_div(u64::MAX, 1), Some(u64::MAX));
        assert_eq!(ceil_div(3, 0), None);
    }
}

/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Response-time recurrence for one task.
//!
//! # Theory
//! For a task with bundle WCET `C`, blocking `B`, interfering tasks `I` and
//! `m` processors, the worst-case response time is the least fixed point of
//!
//! ```text
//! R₀     = C
//! Rₙ₊₁   = C + ⌊(B + Σ_{j ∈ I} ⌈Rₙ / Tⱼ⌉ · Cⱼ) / m⌋
//! ```
//!
//! `Rₙ` never decreases, so the iteration either reaches a fixed point or
//! climbs past the deadline or the period.  With `m = 1` this is the classic
//! uniprocessor recurrence with non-preemptive blocking.
//!
//! # Stopping rules
//!
//! | Condition | Outcome |
//! |---|---|
//! | `Rₙ₊₁ == Rₙ` | [`Outcome::Converged`] |
//! | `R > D` | [`Outcome::DeadlineMiss`] |
//! | `T < R ≤ D` | [`Outcome::NonConvergent`] |
//! | arithmetic overflow | [`Outcome::DeadlineMiss`] at `Time::MAX` |
//!
//! The loop is also capped at `max(D, T) + 1` iterations.  Every non-final
//! step raises `R` by at least one, so the cap is never the reason a healthy
//! iteration stops.

use tracing::trace;

use crate::hyperperiod::math::ceil_div;
use crate::task::Time;

/// A task that can preempt (or delay) the task under analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interferer {
    pub wcet: Time,
    pub period: Time,
}

/// Inputs of one recurrence.
#[derive(Debug, Clone)]
pub struct Recurrence<'a> {
    pub wcet: Time,
    pub deadline: Time,
    pub period: Time,
    pub blocking: Time,
    pub processors: Time,
    pub interference: &'a [Interferer],
}

/// How the iteration ended, with the last response time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Converged(Time),
    DeadlineMiss(Time),
    NonConvergent(Time),
}

impl Outcome {
    pub fn response(self) -> Time {
        match self {
            Outcome::Converged(r) | Outcome::DeadlineMiss(r) | Outcome::NonConvergent(r) => r,
        }
    }
}

impl Recurrence<'_> {
    fn classify(&self, response: Time) -> Option<Outcome> {
        if response > self.deadline {
            Some(Outcome::DeadlineMiss(response))
        } else if response > self.period {
            Some(Outcome::NonConvergent(response))
        } else {
            None
        }
    }

    /// Interference plus blocking over a window of `response`, shared by
    /// `processors`.  `None` on overflow.
    fn demand(&self, response: Time) -> Option<Time> {
        let total = self.interference.iter().try_fold(self.blocking, |acc, j| {
            ceil_div(response, j.period)?
                .checked_mul(j.wcet)?
                .checked_add(acc)
        })?;
        Some(total / self.processors.max(1))
    }

    /// Run the iteration to completion.
    pub fn iterate(&self) -> Outcome {
        let mut response = self.wcet;
        if let Some(stop) = self.classify(response) {
            return stop;
        }

        let cap = self.deadline.max(self.period).saturating_add(1);
        for step in 0..cap {
            let Some(next) = self
                .demand(response)
                .and_then(|d| self.wcet.checked_add(d))
            else {
                return Outcome::DeadlineMiss(Time::MAX);
            };
            trace!(step, response, next, "response-time step");

            if next == response {
                return Outcome::Converged(response);
            }
            if let Some(stop) = self.classify(next) {
                return stop;
            }
            response = next;
        }
        Outcome::NonConvergent(response)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Utilization generator (UUniFast) and resolution of pending drafts.
//!
//! # UUniFast
//! Bini & Buttazzo's algorithm draws `n` utilizations summing to `U`:
//!
//! ```text
//! remaining = U
//! for i in 1..n:
//!     next      = remaining · r^(1 / (n − i))      r ~ Uniform(0, 1)
//!     uᵢ        = remaining − next
//!     remaining = next
//! uₙ = remaining
//! ```
//!
//! `r` is drawn from the open interval so every share is strictly positive.
//!
//! # Drafts
//! Each draft of a [`TaskSetDraft`] receives one share `u`:
//!
//! | Pending | Filled with |
//! |---|---|
//! | period | `T = ⌈wcet[k] / u⌉`, `D = T` |
//! | WCET | `k = threads`, `wcet[k] = max(1, ⌈u · T⌉)`, lower entries by linear growth, `D = T` |
//! | nothing | WCET vector rescaled so `wcet[k] = max(1, ⌈u · T⌉)` |
//! | both | [`GeneratorError::Underdetermined`] |
//!
//! # Skeletons and growth factors
//! [`skeleton`] produces the drafts in the first place: a task count or a
//! total thread budget, and optionally periods drawn from a range.  WCETs
//! stay pending for [`resolve_drafts`].  [`apply_growth_factors`] reshapes
//! the WCET vectors of a finished set with one growth factor per task.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use rand::distr::Open01;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use crate::task::{Task, TaskDraft, TaskSet, TaskSetDraft, Time, TsVersion, ValidationError};

/// Redraws allowed when floating-point rounding yields a non-positive share.
const MAX_DRAWS: usize = 64;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeneratorError {
    #[error("UUniFast needs at least one task")]
    NoTasks,

    #[error("total utilization {total} outside (0, {n}]")]
    UtilizationOutOfRange { total: f64, n: usize },

    #[error("no strictly positive split of {total} into {n} shares after {MAX_DRAWS} draws")]
    Degenerate { total: f64, n: usize },

    #[error("task '{task}': period and WCET are both pending")]
    Underdetermined { task: String },

    #[error("task '{task}': derived {field} {value} does not fit the time domain")]
    OutOfRange {
        task: String,
        field: &'static str,
        value: f64,
    },

    #[error("{what} range [{min}, {max}] is empty or not positive")]
    InvalidRange {
        what: &'static str,
        min: f64,
        max: f64,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Extra work per added thread, relative to one thread:
/// `wcet[i] ∝ 1 + (i − 1) · f`.
///
/// Parsed from `"0.5"` (fixed) or `"0.2..0.8"` (drawn per task, inclusive).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Growth {
    Fixed(f64),
    Uniform { min: f64, max: f64 },
}

impl Growth {
    fn check(self) -> Result<Self, GeneratorError> {
        let (min, max) = match self {
            Growth::Fixed(f) => (f, f),
            Growth::Uniform { min, max } => (min, max),
        };
        if min.is_finite() && max.is_finite() && min >= 0.0 && min <= max {
            Ok(self)
        } else {
            Err(GeneratorError::InvalidRange {
                what: "growth factor",
                min,
                max,
            })
        }
    }

    /// The factor for one task.
    pub fn draw<R: Rng + ?Sized>(self, rng: &mut R) -> f64 {
        match self {
            Growth::Fixed(f) => f,
            Growth::Uniform { min, max } => rng.random_range(min..=max),
        }
    }
}

impl FromStr for Growth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let num = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid growth factor '{v}': {e}"))
        };
        let growth = match s.split_once("..") {
            Some((min, max)) => Growth::Uniform {
                min: num(min)?,
                max: num(max)?,
            },
            None => Growth::Fixed(num(s)?),
        };
        growth.check().map_err(|e| e.to_string())
    }
}

impl fmt::Display for Growth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Growth::Fixed(g) => write!(f, "{g}"),
            Growth::Uniform { min, max } => write!(f, "{min}..{max}"),
        }
    }
}

/// Policy for filling pending WCET vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorConfig {
    /// Thread count given to drafts whose WCET and thread count are both
    /// pending.
    pub threads: usize,

    pub thread_growth: Growth,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            thread_growth: Growth::Fixed(0.5),
        }
    }
}

// ── UUniFast ──────────────────────────────────────────────────────────────────

/// Draw `n` strictly positive utilizations summing to `total`.
///
/// # Errors
/// * [`GeneratorError::NoTasks`] when `n == 0`.
/// * [`GeneratorError::UtilizationOutOfRange`] unless `0 < total ≤ n`.
pub fn uunifast<R: Rng + ?Sized>(
    n: usize,
    total: f64,
    rng: &mut R,
) -> Result<Vec<f64>, GeneratorError> {
    if n == 0 {
        return Err(GeneratorError::NoTasks);
    }
    if !(total > 0.0 && total <= n as f64) {
        return Err(GeneratorError::UtilizationOutOfRange { total, n });
    }

    for _ in 0..MAX_DRAWS {
        let mut shares = Vec::with_capacity(n);
        let mut remaining = total;
        for i in 1..n {
            let r: f64 = rng.sample(Open01);
            let next = remaining * r.powf(1.0 / (n - i) as f64);
            shares.push(remaining - next);
            remaining = next;
        }
        shares.push(remaining);

        if shares.iter().all(|&u| u > 0.0) {
            return Ok(shares);
        }
        debug!(n, total, "non-positive share, redrawing");
    }
    Err(GeneratorError::Degenerate { total, n })
}

// ── WCET policies ─────────────────────────────────────────────────────────────

/// WCET vector of `threads` entries ending at `target`, growing linearly
/// with the thread count.  Positive and non-decreasing.
pub fn synthesize_wcet(target: Time, threads: usize, growth: f64) -> Vec<Time> {
    let target = target.max(1);
    let threads = threads.max(1);
    let growth = growth.max(0.0);
    let weight = |i: usize| 1.0 + (i - 1) as f64 * growth;
    let top = weight(threads);

    let mut wcet: Vec<Time> = (1..=threads)
        .map(|i| {
            let w = (target as f64 * weight(i) / top).ceil() as Time;
            w.clamp(1, target)
        })
        .collect();
    if let Some(last) = wcet.last_mut() {
        *last = target;
    }
    for i in 1..wcet.len() {
        wcet[i] = wcet[i].max(wcet[i - 1]);
    }
    wcet
}

/// Scale `wcet` so its last entry becomes `target`, keeping its shape.
/// Entries round down and never drop below 1.
pub fn rescale_wcet(wcet: &[Time], target: Time) -> Vec<Time> {
    let target = target.max(1);
    let max = wcet.last().copied().unwrap_or(0).max(1);
    let mut scaled: Vec<Time> = wcet
        .iter()
        .map(|&w| {
            let v = u128::from(w) * u128::from(target) / u128::from(max);
            Time::try_from(v).unwrap_or(Time::MAX).max(1)
        })
        .collect();
    if let Some(last) = scaled.last_mut() {
        *last = target;
    }
    scaled
}

fn to_time(task: &str, field: &'static str, value: f64) -> Result<Time, GeneratorError> {
    if value.is_finite() && value >= 0.0 && value < Time::MAX as f64 {
        Ok((value.ceil() as Time).max(1))
    } else {
        Err(GeneratorError::OutOfRange {
            task: task.into(),
            field,
            value,
        })
    }
}

// ── Draft resolution ──────────────────────────────────────────────────────────

fn resolve_one<R: Rng + ?Sized>(
    draft: TaskDraft,
    u: f64,
    rng: &mut R,
    config: &GeneratorConfig,
) -> Result<Task, GeneratorError> {
    let TaskDraft {
        name,
        period,
        deadline,
        threads,
        wcet,
    } = draft;

    let task = match (period, wcet) {
        (None, None) => return Err(GeneratorError::Underdetermined { task: name }),
        (None, Some(wcet)) => {
            let total = wcet.last().copied().unwrap_or(1);
            let period = to_time(&name, "period", total as f64 / u)?;
            Task::new(name, period, period, wcet.len(), wcet)?
        }
        (Some(period), None) => {
            let target = to_time(&name, "wcet", u * period as f64)?;
            let threads = if threads > 0 { threads } else { config.threads };
            let wcet = synthesize_wcet(target, threads, config.thread_growth.draw(rng));
            Task::new(name, period, period, wcet.len(), wcet)?
        }
        (Some(period), Some(wcet)) => {
            let target = to_time(&name, "wcet", u * period as f64)?;
            let wcet = rescale_wcet(&wcet, target);
            let deadline = deadline.unwrap_or(period);
            Task::new(name, period, deadline, wcet.len(), wcet)?
        }
    };
    debug!(task = %task.name(), u, "{task}");
    Ok(task)
}

/// Fill every draft of `draft` from one UUniFast draw summing to `total`.
///
/// Drafts are checked for underdetermined records before any random number
/// is drawn.  Resolved tasks pass through normal [`Task`] validation.
pub fn resolve_drafts<R: Rng + ?Sized>(
    draft: TaskSetDraft,
    total: f64,
    rng: &mut R,
    config: &GeneratorConfig,
) -> Result<TaskSet, GeneratorError> {
    if let Some(d) = draft
        .drafts
        .iter()
        .find(|d| d.period_pending() && d.wcet_pending())
    {
        return Err(GeneratorError::Underdetermined {
            task: d.name.clone(),
        });
    }

    config.thread_growth.check()?;

    let shares = uunifast(draft.drafts.len(), total, rng)?;
    let mut set = TaskSet::with_version(draft.version);
    for (d, u) in draft.drafts.into_iter().zip(shares) {
        set.push(resolve_one(d, u, rng, config)?)?;
    }

    info!(
        tasks = set.len(),
        target = total,
        utilization = set.utilization(),
        "generated task set"
    );
    Ok(set)
}

// ── Skeletons ─────────────────────────────────────────────────────────────────

/// How many tasks a skeleton holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkeletonSize {
    /// `n` tasks; thread counts left to [`GeneratorConfig::threads`].
    Tasks(usize),
    /// Tasks with thread counts drawn from `per_task` until exactly `total`
    /// threads are handed out.  The last task takes what remains.
    Threads {
        total: usize,
        per_task: RangeInclusive<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkeletonConfig {
    pub size: SkeletonSize,
    /// Periods drawn uniformly from this range; pending when `None`.
    pub periods: Option<RangeInclusive<Time>>,
}

fn check_range(what: &'static str, min: f64, max: f64) -> Result<(), GeneratorError> {
    if min > 0.0 && min <= max {
        Ok(())
    } else {
        Err(GeneratorError::InvalidRange { what, min, max })
    }
}

/// Draft set `t:1 … t:n` with pending WCETs and implicit deadlines.
///
/// # Errors
/// [`GeneratorError::NoTasks`] for an empty skeleton,
/// [`GeneratorError::InvalidRange`] for an empty or zero-based range.
pub fn skeleton<R: Rng + ?Sized>(
    config: &SkeletonConfig,
    rng: &mut R,
) -> Result<TaskSetDraft, GeneratorError> {
    if let Some(periods) = &config.periods {
        check_range("period", *periods.start() as f64, *periods.end() as f64)?;
    }

    let threads: Vec<usize> = match &config.size {
        SkeletonSize::Tasks(0) | SkeletonSize::Threads { total: 0, .. } => {
            return Err(GeneratorError::NoTasks)
        }
        SkeletonSize::Tasks(n) => vec![0; *n],
        SkeletonSize::Threads { total, per_task } => {
            check_range(
                "threads per task",
                *per_task.start() as f64,
                *per_task.end() as f64,
            )?;
            let mut left = *total;
            let mut counts = Vec::new();
            while left > 0 {
                let m = rng.random_range(per_task.clone()).min(left);
                counts.push(m);
                left -= m;
            }
            counts
        }
    };

    let drafts = threads
        .into_iter()
        .enumerate()
        .map(|(i, threads)| TaskDraft {
            name: format!("t:{}", i + 1),
            period: config.periods.clone().map(|p| rng.random_range(p)),
            deadline: None,
            threads,
            wcet: None,
        })
        .collect::<Vec<_>>();

    info!(
        tasks = drafts.len(),
        threads = drafts.iter().map(|d| d.threads).sum::<usize>(),
        "generated skeleton"
    );
    Ok(TaskSetDraft {
        version: TsVersion::V1_0,
        drafts,
    })
}

// ── Growth factors ────────────────────────────────────────────────────────────

/// Reshape every WCET vector of `set` with a growth factor drawn per task,
/// keeping `wcet[threads]` and so the utilization.  Chunk sizes are dropped.
pub fn apply_growth_factors<R: Rng + ?Sized>(
    set: &mut TaskSet,
    growth: Growth,
    rng: &mut R,
) -> Result<(), GeneratorError> {
    let growth = growth.check()?;
    let plan: Vec<(String, Vec<Time>)> = set
        .iter()
        .map(|t| {
            let f = growth.draw(rng);
            debug!(task = %t.name(), factor = f, "growth factor");
            (
                t.name().to_string(),
                synthesize_wcet(t.total_wcet(), t.threads(), f),
            )
        })
        .collect();
    for (name, wcet) in plan {
        set.replace_wcet(&name, wcet)?;
    }
    info!(tasks = set.len(), %growth, "growth factors applied");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

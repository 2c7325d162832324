/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Failure reports and error types for the schedulability tester.
//!
//! Two layers, as elsewhere in the crate:
//!
//! * [`Failure`] / [`FailureKind`]: an *unschedulable* verdict.  This is a
//!   normal analysis result, carried inside
//!   [`Verdict::Unschedulable`](super::Verdict::Unschedulable), and it names
//!   the task and the response time that broke it.
//! * [`AnalysisError`]: the tester could not run at all (bad configuration
//!   or a request naming a task that is not in the set).
//!
//! A non-convergent recurrence is its own [`FailureKind`] so that it is never
//! reported as a deadline miss.

use thiserror::Error;

use crate::task::{Time, ValidationError};

// ── Unschedulable verdicts ────────────────────────────────────────────────────

/// Why a task's response-time iteration stopped without proving it
/// schedulable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The response time exceeded the relative deadline.
    DeadlineMiss,

    /// The response time exceeded the period without exceeding the deadline
    /// (only possible when `D > T`).  Treated as unschedulable.
    NonConvergent { period: Time },
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::DeadlineMiss => write!(f, "deadline miss"),
            FailureKind::NonConvergent { period } => {
                write!(f, "non-convergent (response passed period {period})")
            }
        }
    }
}

/// The task reported as failing, with the numbers that failed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub task: String,
    /// Response time at which the iteration stopped.
    pub response: Time,
    pub deadline: Time,
    pub kind: FailureKind,
}

impl Failure {
    pub fn is_deadline_miss(&self) -> bool {
        self.kind == FailureKind::DeadlineMiss
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "task '{}': {} (response {} vs deadline {})",
            self.task, self.kind, self.response, self.deadline
        )
    }
}

// ── Tester errors ─────────────────────────────────────────────────────────────

/// The tester was asked something it cannot answer.
///
/// | Variant | Cause |
/// |---|---|
/// | `NoProcessors` | `AnalysisConfig::processors == 0` |
/// | `UnknownTask` | chunk override names a task not in the set |
/// | `ChunkOutOfRange` | chunk override outside `[1, wcet[threads]]` |
/// | `Validation` | a chunk could not be written back to the task set |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("analysis needs at least one processor")]
    NoProcessors,

    #[error("task '{task}' is not in the task set")]
    UnknownTask { task: String },

    #[error("task '{task}': candidate chunk {chunk} outside [1, {wcet}]")]
    ChunkOutOfRange { task: String, chunk: Time, wcet: Time },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

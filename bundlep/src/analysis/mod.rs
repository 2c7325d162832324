/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Schedulability tester for non-preemptive thread bundles.
//!
//! Given a [`TaskSet`] whose chunk sizes are fixed (an unassigned chunk is the
//! whole bundle), [`Tester::check`] runs the response-time recurrence of
//! [`response`] for every task and returns a [`Verdict`].
//!
//! # Bounds
//!
//! | Bound | Interference `I(τ)` | Blocking `B(τ)` |
//! |---|---|---|
//! | [`Bound::Conservative`] | every other task | sum of the `m` largest chunks of every other task |
//! | [`Bound::Exact`] | higher-priority tasks | sum of the `m` largest `chunk − 1` of lower-priority tasks |
//!
//! The conservative bound ignores priorities entirely and is what the chunk
//! solver uses.  The exact bound is the direct check at fixed chunk sizes.
//! The two can disagree on the same set (a two-task set with `C = 4` at
//! `T = 8` and `T = 16` is rejected by the first and accepted by the second).
//!
//! # Determinism
//! Every task is evaluated.  When several fail, the reported failure is the
//! one with the lowest deadline, ties broken by insertion order, so the
//! result does not depend on evaluation order.

pub mod error;
pub mod response;

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::task::{Task, TaskSet, Time};
pub use error::{AnalysisError, Failure, FailureKind};
use response::{Interferer, Outcome, Recurrence};

// ── Configuration ─────────────────────────────────────────────────────────────

/// Fixed-priority assignment used to order tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriorityPolicy {
    /// Shorter relative deadline → higher priority.
    #[default]
    DeadlineMonotonic,
    /// Shorter period → higher priority.
    RateMonotonic,
}

impl PriorityPolicy {
    fn key(self, task: &Task) -> Time {
        match self {
            PriorityPolicy::DeadlineMonotonic => task.deadline(),
            PriorityPolicy::RateMonotonic => task.period(),
        }
    }
}

impl FromStr for PriorityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dm" | "deadline-monotonic" => Ok(PriorityPolicy::DeadlineMonotonic),
            "rm" | "rate-monotonic" => Ok(PriorityPolicy::RateMonotonic),
            other => Err(format!(
                "unknown priority policy '{other}' (valid: dm, rm)"
            )),
        }
    }
}

impl fmt::Display for PriorityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityPolicy::DeadlineMonotonic => write!(f, "dm"),
            PriorityPolicy::RateMonotonic => write!(f, "rm"),
        }
    }
}

/// Which interference/blocking bound the recurrence uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bound {
    /// Priority-agnostic bound used by the chunk solver.
    #[default]
    Conservative,
    /// Priority-aware direct check.
    Exact,
}

impl FromStr for Bound {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conservative" => Ok(Bound::Conservative),
            "exact" => Ok(Bound::Exact),
            other => Err(format!(
                "unknown bound '{other}' (valid: conservative, exact)"
            )),
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Conservative => write!(f, "conservative"),
            Bound::Exact => write!(f, "exact"),
        }
    }
}

/// Everything the tester needs besides the task set.  Passed explicitly so
/// tests can swap policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub policy: PriorityPolicy,
    /// Identical processors, `m ≥ 1`.
    pub processors: usize,
    pub bound: Bound,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            policy: PriorityPolicy::default(),
            processors: 1,
            bound: Bound::default(),
        }
    }
}

// ── Verdict ───────────────────────────────────────────────────────────────────

/// Converged response time of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResponse {
    pub task: String,
    pub response: Time,
    pub deadline: Time,
}

/// Result of one schedulability test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Every task converged within its deadline.  Responses are in insertion
    /// order.
    Schedulable { responses: Vec<TaskResponse> },
    /// At least one task failed; `failure` is the one reported.
    Unschedulable { failure: Failure },
}

impl Verdict {
    pub fn is_schedulable(&self) -> bool {
        matches!(self, Verdict::Schedulable { .. })
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Verdict::Schedulable { .. } => None,
            Verdict::Unschedulable { failure } => Some(failure),
        }
    }

    pub fn responses(&self) -> &[TaskResponse] {
        match self {
            Verdict::Schedulable { responses } => responses,
            Verdict::Unschedulable { .. } => &[],
        }
    }

    /// Response time of `task`, when schedulable.
    pub fn response_of(&self, task: &str) -> Option<Time> {
        self.responses()
            .iter()
            .find(|r| r.task == task)
            .map(|r| r.response)
    }
}

// ── Tester ────────────────────────────────────────────────────────────────────

/// Stateless schedulability oracle.  Pure over the task set it is given.
#[derive(Debug, Clone, Copy)]
pub struct Tester {
    config: AnalysisConfig,
}

impl Tester {
    /// # Errors
    /// [`AnalysisError::NoProcessors`] when `config.processors == 0`.
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        if config.processors == 0 {
            return Err(AnalysisError::NoProcessors);
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Insertion indices from highest to lowest priority.
    ///
    /// Ties keep insertion order (the sort is stable).
    pub fn priority_order(&self, set: &TaskSet) -> Vec<usize> {
        let mut order: Vec<usize> = (0..set.len()).collect();
        let tasks = set.tasks();
        order.sort_by_key(|&i| self.config.policy.key(&tasks[i]));
        order
    }

    /// Test `set` at its current chunk sizes.
    pub fn check(&self, set: &TaskSet) -> Verdict {
        let chunks: Vec<Time> = set.iter().map(Task::effective_chunk).collect();
        self.evaluate(set, &chunks)
    }

    /// Test `set` as if `task` had chunk size `chunk`, without mutating it.
    pub fn check_with_chunk(
        &self,
        set: &TaskSet,
        task: &str,
        chunk: Time,
    ) -> Result<Verdict, AnalysisError> {
        let i = set
            .position(task)
            .ok_or_else(|| AnalysisError::UnknownTask { task: task.into() })?;
        let wcet = set.tasks()[i].total_wcet();
        if chunk == 0 || chunk > wcet {
            return Err(AnalysisError::ChunkOutOfRange {
                task: task.into(),
                chunk,
                wcet,
            });
        }

        let mut chunks: Vec<Time> = set.iter().map(Task::effective_chunk).collect();
        chunks[i] = chunk;
        Ok(self.evaluate(set, &chunks))
    }

    fn evaluate(&self, set: &TaskSet, chunks: &[Time]) -> Verdict {
        let tasks = set.tasks();
        let mut rank = vec![0usize; tasks.len()];
        for (r, &i) in self.priority_order(set).iter().enumerate() {
            rank[i] = r;
        }

        let mut responses = Vec::with_capacity(tasks.len());
        let mut worst: Option<Failure> = None;

        for (i, task) in tasks.iter().enumerate() {
            let outcome = self.response_time(tasks, chunks, &rank, i);
            debug!(
                task = %task.name(),
                ?outcome,
                deadline = task.deadline(),
                bound = %self.config.bound,
                "response time"
            );

            let kind = match outcome {
                Outcome::Converged(response) => {
                    responses.push(TaskResponse {
                        task: task.name().to_string(),
                        response,
                        deadline: task.deadline(),
                    });
                    continue;
                }
                Outcome::DeadlineMiss(_) => FailureKind::DeadlineMiss,
                Outcome::NonConvergent(_) => FailureKind::NonConvergent {
                    period: task.period(),
                },
            };

            // Lower deadline wins; equal deadlines keep the earlier task.
            if worst.as_ref().map_or(true, |f| task.deadline() < f.deadline) {
                worst = Some(Failure {
                    task: task.name().to_string(),
                    response: outcome.response(),
                    deadline: task.deadline(),
                    kind,
                });
            }
        }

        match worst {
            None => Verdict::Schedulable { responses },
            Some(failure) => Verdict::Unschedulable { failure },
        }
    }

    fn response_time(&self, tasks: &[Task], chunks: &[Time], rank: &[usize], i: usize) -> Outcome {
        let task = &tasks[i];
        let others = (0..tasks.len()).filter(|&j| j != i);

        let (interference, blockers): (Vec<Interferer>, Vec<Time>) = match self.config.bound {
            Bound::Conservative => (
                others.clone().map(|j| interferer(&tasks[j])).collect(),
                others.map(|j| chunks[j]).collect(),
            ),
            Bound::Exact => (
                others
                    .clone()
                    .filter(|&j| rank[j] < rank[i])
                    .map(|j| interferer(&tasks[j]))
                    .collect(),
                others
                    .filter(|&j| rank[j] > rank[i])
                    .map(|j| chunks[j].saturating_sub(1))
                    .collect(),
            ),
        };

        Recurrence {
            wcet: task.total_wcet(),
            deadline: task.deadline(),
            period: task.period(),
            blocking: largest_sum(blockers, self.config.processors),
            processors: self.config.processors as Time,
            interference: &interference,
        }
        .iterate()
    }
}

fn interferer(task: &Task) -> Interferer {
    Interferer {
        wcet: task.total_wcet(),
        period: task.period(),
    }
}

/// Saturating sum of the `m` largest values.
fn largest_sum(mut values: Vec<Time>, m: usize) -> Time {
    values.sort_unstable_by(|a, b| b.cmp(a));
    values
        .into_iter()
        .take(m)
        .fold(0, |acc: Time, v| acc.saturating_add(v))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_task_set;

    fn tester(bound: Bound, processors: usize) -> Tester {
        Tester::new(AnalysisConfig {
            bound,
            processors,
            ..Default::default()
        })
        .unwrap()
    }

    fn task(name: &str, period: Time, deadline: Time, wcet: &[Time]) -> Task {
        Task::new(name, period, deadline, wcet.len(), wcet.to_vec()).unwrap()
    }

    fn scenario(yaml: &str) -> TaskSet {
        parse_task_set(yaml).unwrap()
    }

    // ── configuration ─────────────────────────────────────────────────────────

    #[test]
    fn zero_processors_is_rejected() {
        let err = Tester::new(AnalysisConfig {
            processors: 0,
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, AnalysisError::NoProcessors);
    }

    #[test]
    fn policy_and_bound_parse_from_strings() {
        assert_eq!("dm".parse::<PriorityPolicy>().unwrap(), PriorityPolicy::DeadlineMonotonic);
        assert_eq!("rate-monotonic".parse::<PriorityPolicy>().unwrap(), PriorityPolicy::RateMonotonic);
        assert!("edf".parse::<PriorityPolicy>().is_err());
        assert_eq!("exact".parse::<Bound>().unwrap(), Bound::Exact);
        assert!("loose".parse::<Bound>().is_err());
    }

    #[test]
    fn priority_order_breaks_ties_by_insertion() {
        let set = TaskSet::from_tasks([
            task("c", 50, 60, &[1]),
            task("a", 10, 10, &[1]),
            task("b", 40, 60, &[1]),
        ])
        .unwrap();
        assert_eq!(tester(Bound::Exact, 1).priority_order(&set), vec![1, 0, 2]);

        let rm = Tester::new(AnalysisConfig {
            policy: PriorityPolicy::RateMonotonic,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(rm.priority_order(&set), vec![1, 2, 0]);
    }

    #[test]
    fn largest_sum_takes_top_m() {
        assert_eq!(largest_sum(vec![3, 9, 1, 7], 2), 16);
        assert_eq!(largest_sum(vec![3], 4), 3);
        assert_eq!(largest_sum(vec![], 1), 0);
    }

    // ── scenario A: single task ───────────────────────────────────────────────

    #[test]
    fn single_task_is_schedulable_under_both_bounds() {
        let set = scenario(include_str!("../../../tasksets/one_task.yaml"));
        for bound in [Bound::Conservative, Bound::Exact] {
            let verdict = tester(bound, 1).check(&set);
            assert!(verdict.is_schedulable(), "{bound}: {verdict:?}");
            assert_eq!(verdict.response_of("t.1"), Some(2), "no blocking, no interference");
        }
    }

    // ── scenario B: conservative vs exact ─────────────────────────────────────

    #[test]
    fn exact_check_accepts_two_task_set_at_full_chunks() {
        let set = scenario(include_str!("../../../tasksets/improve.yaml"));
        let verdict = tester(Bound::Exact, 1)
            .check_with_chunk(&set, "t.2", 4)
            .unwrap();
        assert!(verdict.is_schedulable(), "{verdict:?}");
        // t.1 blocked by 4 − 1 = 3; t.2 preempted once by t.1
        assert_eq!(verdict.response_of("t.1"), Some(7));
        assert_eq!(verdict.response_of("t.2"), Some(8));
    }

    #[test]
    fn conservative_bound_rejects_two_task_set() {
        let set = scenario(include_str!("../../../tasksets/improve.yaml"));
        let t = tester(Bound::Conservative, 1);
        for (chunk, response) in [(1, 9), (2, 10), (3, 11), (4, 12)] {
            let verdict = t.check_with_chunk(&set, "t.2", chunk).unwrap();
            let failure = verdict.failure().expect("conservative bound fails");
            assert_eq!(failure.task, "t.1", "chunk {chunk}");
            assert_eq!(failure.response, response, "chunk {chunk}");
            assert!(failure.is_deadline_miss());
        }
    }

    // ── scenario C ────────────────────────────────────────────────────────────

    #[test]
    fn two_thread_bundle_response_times() {
        let set = scenario(include_str!("../../../tasksets/one_split.yaml"));
        let exact = tester(Bound::Exact, 1).check(&set);
        assert_eq!(exact.response_of("t.1"), Some(17));
        assert_eq!(exact.response_of("t.2"), Some(18));

        let conservative = tester(Bound::Conservative, 1).check(&set);
        let failure = conservative.failure().unwrap();
        assert_eq!(failure.task, "t.2");
        assert_eq!(failure.response, 31);
    }

    // ── scenario D: Baruah 2005 ───────────────────────────────────────────────

    // Every task runs as one full-WCET chunk, so lower-priority chunks block
    // the short-deadline tasks.  Three processors is the smallest platform
    // that absorbs that blocking; the tests below pin both sides of it.

    #[test]
    fn baruah_set_is_schedulable_on_three_processors() {
        let set = scenario(include_str!("../../../tasksets/baruah_2005.yaml"));
        let verdict = tester(Bound::Exact, 3).check(&set);
        assert!(verdict.is_schedulable(), "{verdict:?}");
        assert_eq!(verdict.responses().len(), 10);
        for r in verdict.responses() {
            assert!(r.response <= r.deadline, "{r:?}");
        }
    }

    #[test]
    fn baruah_set_misses_on_two_processors() {
        let set = scenario(include_str!("../../../tasksets/baruah_2005.yaml"));
        let verdict = tester(Bound::Exact, 2).check(&set);
        let failure = verdict.failure().unwrap();
        // t.7 and t.8 block t.2 for 7 + 4 units: 4 + ⌊(11 + 2)/2⌋ = 10, then 11 > 10
        assert_eq!(failure.task, "t.2");
        assert_eq!(failure.response, 11);
        assert_eq!(failure.deadline, 10);
    }

    #[test]
    fn baruah_set_misses_on_one_processor() {
        let set = scenario(include_str!("../../../tasksets/baruah_2005.yaml"));
        let verdict = tester(Bound::Exact, 1).check(&set);
        let failure = verdict.failure().unwrap();
        // t.7's 8-unit chunk blocks t.1 for 7 units: 2 + 7 = 9 > 8
        assert_eq!(failure.task, "t.1");
        assert_eq!(failure.response, 9);
    }

    // ── determinism and edge cases ────────────────────────────────────────────

    #[test]
    fn repeated_checks_agree() {
        let set = scenario(include_str!("../../../tasksets/baruah_2005.yaml"));
        let t = tester(Bound::Exact, 2);
        assert_eq!(t.check(&set), t.check(&set));
    }

    #[test]
    fn lowest_deadline_failure_is_reported() {
        // Both tasks fail; "late" comes first but "early" has the lower deadline.
        let set = TaskSet::from_tasks([task("late", 20, 6, &[7]), task("early", 20, 5, &[6])])
            .unwrap();
        let verdict = tester(Bound::Exact, 1).check(&set);
        assert_eq!(verdict.failure().unwrap().task, "early");
    }

    #[test]
    fn equal_deadline_failures_report_first_inserted() {
        let set = TaskSet::from_tasks([task("x", 20, 5, &[6]), task("y", 20, 5, &[6])]).unwrap();
        let verdict = tester(Bound::Exact, 1).check(&set);
        assert_eq!(verdict.failure().unwrap().task, "x");
    }

    #[test]
    fn non_convergence_is_reported_distinctly() {
        // D > T and the response climbs past T before D: 4 → 6 > 5.
        let mut set =
            TaskSet::from_tasks([task("hi", 4, 4, &[2]), task("lo", 5, 12, &[4])]).unwrap();
        set.assign_chunk_size("lo", 1).unwrap();
        let verdict = tester(Bound::Exact, 1).check(&set);
        let failure = verdict.failure().unwrap();
        assert_eq!(failure.task, "lo");
        assert_eq!(failure.kind, FailureKind::NonConvergent { period: 5 });
    }

    #[test]
    fn assigned_chunks_reduce_blocking() {
        let mut set = scenario(include_str!("../../../tasksets/improve.yaml"));
        set.assign_chunk_size("t.2", 1).unwrap();
        let verdict = tester(Bound::Exact, 1).check(&set);
        // chunk 1 blocks for 0
        assert_eq!(verdict.response_of("t.1"), Some(4));
    }

    #[test]
    fn check_with_chunk_validates_request() {
        let set = scenario(include_str!("../../../tasksets/improve.yaml"));
        let t = tester(Bound::Exact, 1);
        assert!(matches!(
            t.check_with_chunk(&set, "t.9", 1),
            Err(AnalysisError::UnknownTask { .. })
        ));
        assert!(matches!(
            t.check_with_chunk(&set, "t.2", 5),
            Err(AnalysisError::ChunkOutOfRange { chunk: 5, wcet: 4, .. })
        ));
    }
}

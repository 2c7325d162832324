/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Maximum non-preemptive chunk sizes.
//!
//! [`ChunkSolver`] finds, for one task, the largest chunk `c` that keeps the
//! whole set schedulable according to its [`Tester`], holding every other
//! task's chunk at its current value (the full bundle when unassigned).
//!
//! # Search
//! Schedulability is assumed to be non-increasing in `c`.  The solver
//! probes the top of the range first, then the bottom, and only then
//! binary-searches between a known feasible and a known infeasible value:
//!
//! ```text
//! probe hi  ── ok ──►  Feasible(hi)
//!    │ fail
//! lo == hi  ─────────►  Infeasible
//! probe lo  ── fail ─►  Infeasible
//!    │ ok
//! bisect (good = lo, bad = hi) ──►  Feasible(good)
//! ```
//!
//! An infeasible chunk is an ordinary outcome, not an error.  The splitter
//! reads the largest feasible chunk of a bundle as its slack.

pub mod split;

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::analysis::{AnalysisError, Failure, Tester, Verdict};
use crate::task::{TaskSet, Time};

// ── Mode ──────────────────────────────────────────────────────────────────────

/// Candidate range searched for each task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkMode {
    /// Any chunk in `[1, wcet[threads]]`.
    #[default]
    Limited,
    /// Only the whole bundle, `c = wcet[threads]`.
    NonPreemptive,
}

impl FromStr for ChunkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "limited" => Ok(ChunkMode::Limited),
            "non-preemptive" | "nonp" => Ok(ChunkMode::NonPreemptive),
            other => Err(format!(
                "unknown chunk mode '{other}' (valid: limited, non-preemptive)"
            )),
        }
    }
}

impl fmt::Display for ChunkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkMode::Limited => write!(f, "limited"),
            ChunkMode::NonPreemptive => write!(f, "non-preemptive"),
        }
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// No chunk in the candidate range keeps the set schedulable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfeasibleChunk {
    pub task: String,
    /// Last candidate tested.
    pub tried: Time,
    /// What the tester reported for that candidate.
    pub failure: Failure,
}

impl fmt::Display for InfeasibleChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no feasible chunk size for '{}' (tried {}: {})",
            self.task, self.tried, self.failure
        )
    }
}

/// Result of a chunk search for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Feasible { task: String, chunk: Time },
    Infeasible(InfeasibleChunk),
}

impl ChunkOutcome {
    pub fn task(&self) -> &str {
        match self {
            ChunkOutcome::Feasible { task, .. } => task,
            ChunkOutcome::Infeasible(inf) => &inf.task,
        }
    }

    pub fn chunk(&self) -> Option<Time> {
        match self {
            ChunkOutcome::Feasible { chunk, .. } => Some(*chunk),
            ChunkOutcome::Infeasible(_) => None,
        }
    }

    pub fn is_feasible(&self) -> bool {
        matches!(self, ChunkOutcome::Feasible { .. })
    }
}

// ── Solver ────────────────────────────────────────────────────────────────────

/// Chunk-size search driven by a schedulability [`Tester`].
#[derive(Debug, Clone, Copy)]
pub struct ChunkSolver {
    tester: Tester,
    mode: ChunkMode,
}

impl ChunkSolver {
    pub fn new(tester: Tester, mode: ChunkMode) -> Self {
        Self { tester, mode }
    }

    pub fn tester(&self) -> &Tester {
        &self.tester
    }

    pub fn mode(&self) -> ChunkMode {
        self.mode
    }

    /// Find the largest feasible chunk for `task` without touching `set`.
    pub fn search(&self, set: &TaskSet, task: &str) -> Result<ChunkOutcome, AnalysisError> {
        let wcet = set
            .get(task)
            .ok_or_else(|| AnalysisError::UnknownTask { task: task.into() })?
            .total_wcet();
        let hi = wcet;
        let lo = match self.mode {
            ChunkMode::Limited => 1,
            ChunkMode::NonPreemptive => wcet,
        };

        let probe = |chunk: Time| -> Result<Verdict, AnalysisError> {
            let verdict = self.tester.check_with_chunk(set, task, chunk)?;
            debug!(task, chunk, ok = verdict.is_schedulable(), "chunk probe");
            Ok(verdict)
        };
        let infeasible = |tried: Time, failure: Failure| {
            ChunkOutcome::Infeasible(InfeasibleChunk {
                task: task.into(),
                tried,
                failure,
            })
        };

        let failure = match probe(hi)? {
            Verdict::Schedulable { .. } => {
                return Ok(ChunkOutcome::Feasible {
                    task: task.into(),
                    chunk: hi,
                })
            }
            Verdict::Unschedulable { failure } => failure,
        };
        if lo == hi {
            return Ok(infeasible(hi, failure));
        }
        if let Verdict::Unschedulable { failure } = probe(lo)? {
            return Ok(infeasible(lo, failure));
        }

        // good is schedulable, bad is not
        let (mut good, mut bad) = (lo, hi);
        while bad - good > 1 {
            let mid = good + (bad - good) / 2;
            if probe(mid)?.is_schedulable() {
                good = mid;
            } else {
                bad = mid;
            }
        }
        Ok(ChunkOutcome::Feasible {
            task: task.into(),
            chunk: good,
        })
    }

    /// Search for `task` and, on success, assign the chunk in `set`.
    pub fn solve(&self, set: &mut TaskSet, task: &str) -> Result<ChunkOutcome, AnalysisError> {
        let outcome = self.search(set, task)?;
        match &outcome {
            ChunkOutcome::Feasible { chunk, .. } => {
                set.assign_chunk_size(task, *chunk)?;
                info!(task, chunk = *chunk, mode = %self.mode, "✓ chunk assigned");
            }
            ChunkOutcome::Infeasible(inf) => {
                warn!(
                    task,
                    tried = inf.tried,
                    failing = %inf.failure.task,
                    response = inf.failure.response,
                    deadline = inf.failure.deadline,
                    kind = %inf.failure.kind,
                    "✗ no feasible chunk size"
                );
            }
        }
        Ok(outcome)
    }

    /// Solve every task, one after another in priority order.
    ///
    /// Each search sees the chunks fixed by the searches before it.
    /// Infeasible tasks keep no chunk and the pass continues.
    pub fn assign_all(&self, set: &mut TaskSet) -> Result<Vec<ChunkOutcome>, AnalysisError> {
        let names: Vec<String> = self
            .tester
            .priority_order(set)
            .into_iter()
            .map(|i| set.tasks()[i].name().to_string())
            .collect();

        let mut outcomes = Vec::with_capacity(names.len());
        for name in &names {
            outcomes.push(self.solve(set, name)?);
        }

        info!(
            assigned = outcomes.iter().filter(|o| o.is_feasible()).count(),
            total = outcomes.len(),
            mode = %self.mode,
            "chunk assignment done"
        );
        Ok(outcomes)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisConfig, Bound};
    use crate::config::parse_task_set;

    fn solver(mode: ChunkMode) -> ChunkSolver {
        ChunkSolver::new(Tester::new(AnalysisConfig::default()).unwrap(), mode)
    }

    fn scenario(yaml: &str) -> TaskSet {
        parse_task_set(yaml).unwrap()
    }

    #[test]
    fn mode_parses_from_strings() {
        assert_eq!("nonp".parse::<ChunkMode>().unwrap(), ChunkMode::NonPreemptive);
        assert_eq!("limited".parse::<ChunkMode>().unwrap(), ChunkMode::Limited);
        assert!("full".parse::<ChunkMode>().is_err());
    }

    // ── scenario A ────────────────────────────────────────────────────────────

    #[test]
    fn single_task_gets_its_whole_wcet() {
        let mut set = scenario(include_str!("../../../tasksets/one_task.yaml"));
        let outcome = solver(ChunkMode::Limited).solve(&mut set, "t.1").unwrap();
        assert_eq!(
            outcome,
            ChunkOutcome::Feasible {
                task: "t.1".into(),
                chunk: 2
            }
        );
        assert_eq!(set.get("t.1").unwrap().chunk_size(), Some(2));
    }

    // ── scenario B ────────────────────────────────────────────────────────────

    #[test]
    fn conservative_search_finds_no_chunk_where_exact_check_passes() {
        let set = scenario(include_str!("../../../tasksets/improve.yaml"));

        let outcome = solver(ChunkMode::Limited).search(&set, "t.2").unwrap();
        let ChunkOutcome::Infeasible(inf) = outcome else {
            panic!("expected infeasible, got {outcome:?}");
        };
        assert_eq!(inf.task, "t.2");
        assert_eq!(inf.tried, 1, "bottom of the range is the last probe");
        assert_eq!(inf.failure.task, "t.1");
        assert_eq!(inf.failure.response, 9);

        let exact = Tester::new(AnalysisConfig {
            bound: Bound::Exact,
            ..Default::default()
        })
        .unwrap();
        assert!(exact.check_with_chunk(&set, "t.2", 4).unwrap().is_schedulable());
    }

    #[test]
    fn search_does_not_mutate() {
        let set = scenario(include_str!("../../../tasksets/one_split.yaml"));
        let before = set.clone();
        solver(ChunkMode::Limited).search(&set, "t.1").unwrap();
        assert_eq!(set, before);
    }

    #[test]
    fn infeasible_solve_leaves_chunk_unassigned() {
        let mut set = scenario(include_str!("../../../tasksets/improve.yaml"));
        let outcome = solver(ChunkMode::Limited).solve(&mut set, "t.2").unwrap();
        assert!(!outcome.is_feasible());
        assert_eq!(set.get("t.2").unwrap().chunk_size(), None);
    }

    // ── scenario C ────────────────────────────────────────────────────────────

    #[test]
    fn limited_search_finds_largest_feasible_chunk() {
        let set = scenario(include_str!("../../../tasksets/one_split.yaml"));
        let outcome = solver(ChunkMode::Limited).search(&set, "t.1").unwrap();
        // t.2 responds in 5 + c + 13, which must stay within 30
        assert_eq!(outcome.chunk(), Some(12));
    }

    #[test]
    fn non_preemptive_bundle_is_infeasible() {
        let set = scenario(include_str!("../../../tasksets/one_split.yaml"));
        let outcome = solver(ChunkMode::NonPreemptive).search(&set, "t.1").unwrap();
        let ChunkOutcome::Infeasible(inf) = outcome else {
            panic!("expected infeasible, got {outcome:?}");
        };
        assert_eq!(inf.tried, 13);
        assert_eq!(inf.failure.task, "t.2");
        assert_eq!(inf.failure.response, 31);
    }

    #[test]
    fn schedulability_is_monotone_in_chunk_size() {
        let set = scenario(include_str!("../../../tasksets/one_split.yaml"));
        let s = solver(ChunkMode::Limited);
        let best = s.search(&set, "t.1").unwrap().chunk().unwrap();
        for c in 1..=13 {
            let ok = s
                .tester()
                .check_with_chunk(&set, "t.1", c)
                .unwrap()
                .is_schedulable();
            assert_eq!(ok, c <= best, "chunk {c}");
        }
    }

    #[test]
    fn assign_all_runs_in_priority_order() {
        let mut set = scenario(include_str!("../../../tasksets/one_split.yaml"));
        let outcomes = solver(ChunkMode::Limited).assign_all(&mut set).unwrap();
        let got: Vec<_> = outcomes.iter().map(|o| (o.task(), o.chunk())).collect();
        assert_eq!(got, [("t.1", Some(12)), ("t.2", Some(5))]);
        assert_eq!(set.get("t.1").unwrap().chunk_size(), Some(12));
        assert_eq!(set.get("t.2").unwrap().chunk_size(), Some(5));
    }

    #[test]
    fn unknown_task_is_an_error() {
        let set = scenario(include_str!("../../../tasksets/one_task.yaml"));
        assert!(matches!(
            solver(ChunkMode::Limited).search(&set, "nope"),
            Err(AnalysisError::UnknownTask { .. })
        ));
    }
}

/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Bundle splitting.
//!
//! Every task runs as one non-preemptive chunk of its full WCET.  While the
//! set is unschedulable, one bundle is divided into two sub-tasks with fewer
//! threads and the set is tested again.  Each division removes one bundle
//! thread from the pool of splittable work, so a set with `M` threads in
//! total needs at most `M − n` rounds before every task is single-threaded.
//!
//! # Which bundle
//! The task named by the tester's failure when it is still a bundle.
//! Otherwise the bundle whose full chunk blocks the most (largest
//! `wcet[threads]`, ties in priority order).  A failure among single-thread
//! tasks is therefore charged to the bundles around them, whatever their
//! position in the set.
//!
//! # Where to split
//! The chunk solver in [`ChunkMode::Limited`] gives the largest chunk the
//! bundle could keep without breaking the set: its slack.  The first part
//! takes the most threads whose `wcet[i]` fits that slack; with no slack it
//! takes one thread.  The second part carries the rest and is divided again
//! in a later round if needed.
//!
//! Children are named `<parent>:1` and `<parent>:2`, inherit period and
//! deadline, and carry prefixes of the parent's WCET vector (see
//! [`TaskSet::split_into`]).  All rounds work on a clone; a failed pass
//! leaves the caller's set untouched.

use thiserror::Error;
use tracing::{debug, info, warn};

use super::{ChunkMode, ChunkOutcome, ChunkSolver};
use crate::analysis::{AnalysisError, Failure, Tester, Verdict};
use crate::task::{TaskSet, ValidationError};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Terminal result: the set is unschedulable with every splittable bundle
/// decomposed into single-thread sub-tasks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task set infeasible at full decomposition: {failure}")]
pub struct InfeasibleTaskSet {
    /// Task reported by the last failing test.
    pub task: String,
    pub failure: Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error(transparent)]
    Infeasible(#[from] InfeasibleTaskSet),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// ── Report ────────────────────────────────────────────────────────────────────

/// One bundle that had to be divided, and the tasks that replaced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Division {
    pub parent: String,
    pub parts: Vec<String>,
}

/// Result of a whole-set [`Splitter::bundle`] pass.
#[derive(Debug, Clone)]
pub struct BundleReport {
    /// The set with every bundle resolved and every chunk assigned.
    pub task_set: TaskSet,
    pub divisions: Vec<Division>,
}

// ── Splitter ──────────────────────────────────────────────────────────────────

/// Resolves unschedulable sets by dividing bundles.
#[derive(Debug, Clone, Copy)]
pub struct Splitter {
    slack: ChunkSolver,
}

impl Splitter {
    pub fn new(tester: Tester) -> Self {
        Self {
            slack: ChunkSolver::new(tester, ChunkMode::Limited),
        }
    }

    pub fn tester(&self) -> &Tester {
        self.slack.tester()
    }

    /// Make `set` schedulable by dividing `task` only.
    ///
    /// On success `set` is updated, every part gets its full WCET as chunk
    /// and the names of the parts are returned (just `task` when no division
    /// was needed).  On failure `set` is untouched.
    pub fn resolve(&self, set: &mut TaskSet, task: &str) -> Result<Vec<String>, SplitError> {
        if set.get(task).is_none() {
            return Err(ValidationError::UnknownTask { task: task.into() }.into());
        }
        let (resolved, mut divisions) = self.settle(set, vec![task.to_string()])?;
        *set = resolved;
        Ok(divisions.pop().map(|d| d.parts).unwrap_or_default())
    }

    /// Divide any bundle of `set` until the whole set is schedulable with
    /// every task run as one chunk.
    pub fn bundle(&self, set: TaskSet) -> Result<BundleReport, SplitError> {
        info!(tasks = set.len(), "Executing bundle pass");
        let roots = set.iter().map(|t| t.name().to_string()).collect();
        let (task_set, divisions) = self.settle(&set, roots)?;
        let divisions: Vec<Division> = divisions
            .into_iter()
            .filter(|d| d.parts.len() > 1)
            .collect();

        for d in &divisions {
            info!(task = %d.parent, parts = ?d.parts, "bundle divided");
        }
        info!(
            tasks = task_set.len(),
            divided = divisions.len(),
            "bundle pass done"
        );
        Ok(BundleReport {
            task_set,
            divisions,
        })
    }

    /// Split tasks descending from `roots` until `set` passes.  Returns the
    /// final set and, per root, the tasks now standing for it.
    fn settle(
        &self,
        set: &TaskSet,
        roots: Vec<String>,
    ) -> Result<(TaskSet, Vec<Division>), SplitError> {
        let mut work = set.clone();
        let mut lineage: Vec<Division> = roots
            .into_iter()
            .map(|name| Division {
                parts: vec![name.clone()],
                parent: name,
            })
            .collect();

        loop {
            let failure = match self.tester().check(&work) {
                Verdict::Schedulable { .. } => break,
                Verdict::Unschedulable { failure } => failure,
            };

            let Some(victim) = self.pick_bundle(&work, &lineage, &failure) else {
                warn!(
                    failing = %failure.task,
                    response = failure.response,
                    deadline = failure.deadline,
                    "✗ task set infeasible at full decomposition"
                );
                return Err(InfeasibleTaskSet {
                    task: failure.task.clone(),
                    failure,
                }
                .into());
            };

            let first = self.split_point(&work, &victim)?;
            let (a, b) = work.split_into(&victim, first)?;
            debug!(
                task = %victim,
                failing = %failure.task,
                first,
                "dividing bundle"
            );
            for d in &mut lineage {
                if let Some(i) = d.parts.iter().position(|p| *p == victim) {
                    d.parts.splice(i..=i, [a.clone(), b.clone()]);
                    break;
                }
            }
        }

        for name in lineage.iter().flat_map(|d| &d.parts) {
            let chunk = work
                .get(name)
                .ok_or_else(|| ValidationError::UnknownTask { task: name.clone() })?
                .total_wcet();
            work.assign_chunk_size(name, chunk)?;
        }
        Ok((work, lineage))
    }

    /// Bundle to divide next, or `None` when nothing splittable is left.
    fn pick_bundle(&self, set: &TaskSet, lineage: &[Division], failure: &Failure) -> Option<String> {
        let splittable = |name: &str| set.get(name).is_some_and(|t| t.threads() > 1);
        let candidates: Vec<&String> = lineage
            .iter()
            .flat_map(|d| &d.parts)
            .filter(|p| splittable(p))
            .collect();

        if candidates.iter().any(|p| **p == failure.task) {
            return Some(failure.task.clone());
        }
        // Largest blocker first; max_by_key keeps the last maximum, so walk
        // the priority order backwards.
        self.tester()
            .priority_order(set)
            .into_iter()
            .rev()
            .map(|i| &set.tasks()[i])
            .filter(|t| candidates.iter().any(|p| p.as_str() == t.name()))
            .max_by_key(|t| t.total_wcet())
            .map(|t| t.name().to_string())
    }

    /// Threads kept by the first part when dividing `task`.
    fn split_point(&self, set: &TaskSet, task: &str) -> Result<usize, SplitError> {
        let bundle = set
            .get(task)
            .ok_or_else(|| ValidationError::UnknownTask { task: task.into() })?;
        let slack = match self.slack.search(set, task)? {
            ChunkOutcome::Feasible { chunk, .. } => chunk,
            ChunkOutcome::Infeasible(_) => 0,
        };

        let wcet = bundle.wcet().as_slice();
        let first = (1..bundle.threads())
            .rev()
            .find(|&i| wcet[i - 1] <= slack)
            .unwrap_or(1);
        debug!(task, slack, first, "split point");
        Ok(first)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisConfig;
    use crate::config::parse_task_set;
    use crate::task::{Task, Time};
    use std::time::{Duration, Instant};

    fn splitter() -> Splitter {
        Splitter::new(Tester::new(AnalysisConfig::default()).unwrap())
    }

    fn task(name: &str, period: Time, wcet: &[Time]) -> Task {
        Task::new(name, period, period, wcet.len(), wcet.to_vec()).unwrap()
    }

    fn names(set: &TaskSet) -> Vec<&str> {
        set.iter().map(Task::name).collect()
    }

    // ── scenario C ────────────────────────────────────────────────────────────

    #[test]
    fn two_thread_bundle_is_split_into_single_threads() {
        let set = parse_task_set(include_str!("../../../tasksets/one_split.yaml")).unwrap();
        let report = splitter().bundle(set).unwrap();

        assert_eq!(names(&report.task_set), ["t.1:1", "t.1:2", "t.2"]);
        assert_eq!(
            report.divisions,
            [Division {
                parent: "t.1".into(),
                parts: vec!["t.1:1".into(), "t.1:2".into()],
            }]
        );
        for t in report.task_set.iter() {
            assert_eq!(t.threads(), 1);
            assert_eq!(t.chunk_size(), Some(t.total_wcet()), "{}", t.name());
            assert_eq!(t.period(), 30);
            assert_eq!(t.deadline(), 30);
        }
        assert_eq!(report.task_set.get("t.1:1").unwrap().total_wcet(), 8);
        assert_eq!(report.task_set.get("t.1:2").unwrap().total_wcet(), 8);

        let verdict = splitter().tester().check(&report.task_set);
        assert!(verdict.is_schedulable(), "{verdict:?}");
    }

    #[test]
    fn record_order_does_not_change_the_decomposition() {
        let set = TaskSet::from_tasks([task("t.2", 30, &[5]), task("t.1", 30, &[8, 13])]).unwrap();
        // The single-thread task is reported first, the bundle is to blame.
        let failure = splitter().tester().check(&set).failure().cloned().unwrap();
        assert_eq!(failure.task, "t.2");

        let report = splitter().bundle(set).unwrap();
        assert_eq!(names(&report.task_set), ["t.2", "t.1:1", "t.1:2"]);
        assert_eq!(report.divisions.len(), 1);
        assert_eq!(report.divisions[0].parent, "t.1");
        assert!(splitter().tester().check(&report.task_set).is_schedulable());
    }

    #[test]
    fn schedulable_set_is_left_whole() {
        let set = parse_task_set(include_str!("../../../tasksets/one_task.yaml")).unwrap();
        let report = splitter().bundle(set).unwrap();
        assert!(report.divisions.is_empty());
        assert_eq!(report.task_set.get("t.1").unwrap().chunk_size(), Some(2));
    }

    // ── split policy ──────────────────────────────────────────────────────────

    #[test]
    fn first_part_takes_the_threads_that_fit_the_slack() {
        let mut set =
            TaskSet::from_tasks([task("b", 20, &[2, 3, 9]), task("o", 20, &[5])]).unwrap();
        let parts = splitter().resolve(&mut set, "b").unwrap();

        assert_eq!(parts, ["b:1", "b:2"]);
        assert_eq!(set.get("b:1").unwrap().wcet().as_slice(), &[2, 3]);
        assert_eq!(set.get("b:2").unwrap().wcet().as_slice(), &[2]);
    }

    #[test]
    fn remainder_is_divided_in_later_rounds() {
        let mut set =
            TaskSet::from_tasks([task("b", 20, &[2, 6, 12, 20]), task("o", 20, &[2])]).unwrap();
        let parts = splitter().resolve(&mut set, "b").unwrap();

        assert_eq!(parts, ["b:1", "b:2:1", "b:2:2"]);
        assert_eq!(names(&set), ["b:1", "b:2:1", "b:2:2", "o"]);
        assert_eq!(set.get("b:2:2").unwrap().wcet().as_slice(), &[2, 6]);
        assert_eq!(set.get("o").unwrap().chunk_size(), None, "only parts of b are assigned");
    }

    #[test]
    fn bundle_can_be_fully_serialized() {
        let mut set =
            TaskSet::from_tasks([task("b", 20, &[3, 7, 13, 21]), task("o", 20, &[2])]).unwrap();
        let parts = splitter().resolve(&mut set, "b").unwrap();

        assert_eq!(parts, ["b:1", "b:2:1", "b:2:2:1", "b:2:2:2"]);
        for name in &parts {
            let t = set.get(name).unwrap();
            assert_eq!(t.threads(), 1);
            assert_eq!(t.total_wcet(), 3, "every part runs wcet[1]");
        }
    }

    #[test]
    fn every_part_carries_a_prefix_of_the_parent_vector() {
        let parent = [2, 6, 12, 20];
        let mut set =
            TaskSet::from_tasks([task("b", 20, &parent), task("o", 20, &[2])]).unwrap();
        let parts = splitter().resolve(&mut set, "b").unwrap();

        let threads: usize = parts.iter().map(|p| set.get(p).unwrap().threads()).sum();
        assert_eq!(threads, parent.len(), "no thread is lost or invented");
        for name in &parts {
            let t = set.get(name).unwrap();
            for (j, &w) in t.wcet().as_slice().iter().enumerate() {
                assert_eq!(w, parent[j], "{name} wcet[{}]", j + 1);
            }
        }
    }

    // ── terminal failure ──────────────────────────────────────────────────────

    #[test]
    fn infeasible_at_every_decomposition_is_terminal() {
        let mut set =
            TaskSet::from_tasks([task("b", 10, &[5, 6]), task("o", 10, &[5])]).unwrap();
        let before = set.clone();

        let err = splitter().resolve(&mut set, "b").unwrap_err();
        let SplitError::Infeasible(inf) = err else {
            panic!("expected InfeasibleTaskSet, got {err:?}");
        };
        assert_eq!(inf.task, "b:1");
        assert_eq!(inf.failure.response, 20);
        assert_eq!(inf.failure.deadline, 10);
        assert_eq!(set, before, "failed resolution leaves the set untouched");
    }

    #[test]
    fn single_thread_task_cannot_be_split() {
        let set = TaskSet::from_tasks([task("t", 8, &[9])]).unwrap();
        let err = splitter().bundle(set).unwrap_err();
        assert!(matches!(err, SplitError::Infeasible(InfeasibleTaskSet { ref task, .. }) if task == "t"));
    }

    #[test]
    fn wide_infeasible_bundle_fails_quickly() {
        let wcet: Vec<Time> = (20..84).collect();
        let mut set = TaskSet::from_tasks([task("b", 30, &wcet), task("o", 30, &[15])]).unwrap();

        let start = Instant::now();
        let err = splitter().resolve(&mut set, "b").unwrap_err();
        assert!(matches!(err, SplitError::Infeasible(_)), "{err:?}");
        // one division per thread at most, each a handful of tests
        assert!(start.elapsed() < Duration::from_secs(10), "{:?}", start.elapsed());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn unknown_task_is_rejected() {
        let mut set = TaskSet::from_tasks([task("t", 8, &[2])]).unwrap();
        let err = splitter().resolve(&mut set, "nope").unwrap_err();
        assert!(matches!(err, SplitError::Validation(ValidationError::UnknownTask { .. })));
    }
}

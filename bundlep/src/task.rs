/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core task data structures for BUNDLEP analysis.
//!
//! Two stages model the two sides of the analysis pipeline:
//!
//! ```text
//! YAML ──(config)──►  TaskDraft  ──(generator / resolve)──►  Task  ──►  TaskSet
//!                      ↑ may be pending                      ↑ validated, ready for analysis
//! ```
//!
//! # Ownership model
//! A [`TaskSet`] **owns** its tasks and is the only mutator.  Chunk sizes are
//! written through [`TaskSet::assign_chunk_size`] and bundles are divided
//! through [`TaskSet::split_into`]; both re-check the task invariants, so no
//! caller can hold a `Task` that violates them.
//!
//! # WCET vectors
//! `wcet[i]` (1-indexed) is the **total** execution time needed to complete
//! `i` threads running together.  The vector is strictly positive and
//! non-decreasing; adding a thread never reduces total work.

use std::fmt;

use thiserror::Error;

use crate::hyperperiod::{self, HyperperiodError, HyperperiodInfo};

/// Integer time unit used throughout the model.
pub type Time = u64;

// ── Errors ────────────────────────────────────────────────────────────────────

/// A task record or task-set operation that breaks a model invariant.
///
/// Always rejected before any analysis runs and never recovered
/// automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("task #{index}: name must not be empty")]
    EmptyName { index: usize },

    #[error("task '{task}': threads = {threads} but wcet has {len} entries")]
    ThreadCountMismatch {
        task: String,
        threads: usize,
        len: usize,
    },

    #[error("task '{task}': at least one thread is required")]
    NoThreads { task: String },

    #[error("task '{task}': wcet[{index}] = {value} must be positive")]
    NonPositiveWcet {
        task: String,
        index: usize,
        value: Time,
    },

    #[error("task '{task}': wcet[{index}] = {value} is below the previous entry {previous}")]
    DecreasingWcet {
        task: String,
        index: usize,
        value: Time,
        previous: Time,
    },

    #[error("task '{task}': period must be positive")]
    NonPositivePeriod { task: String },

    #[error("task '{task}': deadline must be positive")]
    NonPositiveDeadline { task: String },

    #[error("task '{task}': name is already used in this task set")]
    DuplicateName { task: String },

    #[error("task '{task}': chunk size {chunk} outside [1, {wcet}]")]
    ChunkOutOfRange { task: String, chunk: Time, wcet: Time },

    #[error("task '{task}' is not in the task set")]
    UnknownTask { task: String },

    #[error("task '{task}': cannot split {threads} threads with {first} in the first part")]
    SplitOutOfRange {
        task: String,
        first: usize,
        threads: usize,
    },

    #[error("task '{task}': {field} is still pending")]
    Pending { task: String, field: &'static str },

    #[error("thread limit per task must be at least 1")]
    ZeroThreadLimit,
}

// ── WCET vector ───────────────────────────────────────────────────────────────

/// Per-thread-count WCET of one task.  Positive and non-decreasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WcetVector(Vec<Time>);

impl WcetVector {
    /// Validate `values` on behalf of task `task`.
    pub fn new(task: &str, values: Vec<Time>) -> Result<Self, ValidationError> {
        if values.is_empty() {
            return Err(ValidationError::NoThreads { task: task.into() });
        }
        let mut previous = 0;
        for (i, &value) in values.iter().enumerate() {
            if value == 0 {
                return Err(ValidationError::NonPositiveWcet {
                    task: task.into(),
                    index: i + 1,
                    value,
                });
            }
            if value < previous {
                return Err(ValidationError::DecreasingWcet {
                    task: task.into(),
                    index: i + 1,
                    value,
                    previous,
                });
            }
            previous = value;
        }
        Ok(Self(values))
    }

    /// Number of threads the vector covers.
    pub fn threads(&self) -> usize {
        self.0.len()
    }

    /// WCET for `threads` threads running together (1-indexed).
    pub fn at(&self, threads: usize) -> Option<Time> {
        threads.checked_sub(1).and_then(|i| self.0.get(i)).copied()
    }

    /// WCET of the whole bundle, i.e. `wcet[threads]`.
    pub fn total(&self) -> Time {
        // Non-empty by construction.
        self.0.last().copied().unwrap_or(0)
    }

    pub fn as_slice(&self) -> &[Time] {
        &self.0
    }

    /// The first `threads` entries, as used by a sub-task that keeps
    /// `threads` of the original bundle.
    pub fn prefix(&self, threads: usize) -> Option<WcetVector> {
        if threads == 0 || threads > self.0.len() {
            return None;
        }
        Some(Self(self.0[..threads].to_vec()))
    }
}

// ── Task ──────────────────────────────────────────────────────────────────────

/// One sporadic task releasing a bundle of threads per job.
///
/// Fields are private: the only way to obtain a `Task` is [`Task::new`] (or
/// resolving a [`TaskDraft`]), which validates every invariant.
///
/// # Lifecycle
/// Created from a validated record, **moved** into a [`TaskSet`], then
/// mutated only by the set: chunk assignment by the chunk solver and
/// replacement by two children when the splitter divides the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    name: String,
    period: Time,
    deadline: Time,
    wcet: WcetVector,

    /// Maximum non-preemptive slice.  `None` until the solver assigns one,
    /// in which case analysis uses the full bundle WCET.
    chunk_size: Option<Time>,
}

impl Task {
    /// Build a validated task.  `threads` must equal `wcet.len()`.
    pub fn new(
        name: impl Into<String>,
        period: Time,
        deadline: Time,
        threads: usize,
        wcet: Vec<Time>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if threads == 0 {
            return Err(ValidationError::NoThreads { task: name });
        }
        if threads != wcet.len() {
            return Err(ValidationError::ThreadCountMismatch {
                task: name,
                threads,
                len: wcet.len(),
            });
        }
        if period == 0 {
            return Err(ValidationError::NonPositivePeriod { task: name });
        }
        if deadline == 0 {
            return Err(ValidationError::NonPositiveDeadline { task: name });
        }
        let wcet = WcetVector::new(&name, wcet)?;
        Ok(Self {
            name,
            period,
            deadline,
            wcet,
            chunk_size: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Time {
        self.period
    }

    pub fn deadline(&self) -> Time {
        self.deadline
    }

    pub fn threads(&self) -> usize {
        self.wcet.threads()
    }

    pub fn wcet(&self) -> &WcetVector {
        &self.wcet
    }

    /// WCET of the full bundle at the task's own thread count.
    pub fn total_wcet(&self) -> Time {
        self.wcet.total()
    }

    pub fn chunk_size(&self) -> Option<Time> {
        self.chunk_size
    }

    /// Chunk used by the analysis: the assigned chunk, or the whole bundle
    /// when none has been assigned.
    pub fn effective_chunk(&self) -> Time {
        self.chunk_size.unwrap_or_else(|| self.total_wcet())
    }

    /// `wcet[threads] / period`.
    pub fn utilization(&self) -> f64 {
        self.total_wcet() as f64 / self.period as f64
    }

    fn check_chunk(&self, chunk: Time) -> Result<(), ValidationError> {
        if chunk == 0 || chunk > self.total_wcet() {
            return Err(ValidationError::ChunkOutOfRange {
                task: self.name.clone(),
                chunk,
                wcet: self.total_wcet(),
            });
        }
        Ok(())
    }

    /// Child task keeping the first `threads` threads of this bundle.
    fn child(&self, suffix: usize, threads: usize) -> Option<Task> {
        Some(Task {
            name: format!("{}:{suffix}", self.name),
            period: self.period,
            deadline: self.deadline,
            wcet: self.wcet.prefix(threads)?,
            chunk_size: None,
        })
    }
}

impl fmt::Display for Task {
    /// `(p:   8, d:   8, m: 1) wcet {   2} u:0.250 q:2, t.1`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(p:{:4}, d:{:4}, m:{:2}) wcet {{",
            self.period,
            self.deadline,
            self.threads()
        )?;
        for (i, w) in self.wcet.as_slice().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{w:4}")?;
        }
        write!(
            f,
            "}} u:{:.3} q:{}, {}",
            self.utilization(),
            self.chunk_size.unwrap_or(0),
            self.name
        )
    }
}

// ── Drafts (pending records) ──────────────────────────────────────────────────

/// A task record whose period and/or WCET may still be pending.
///
/// The description format marks pending fields with sentinels (`period: 0`,
/// `wcet: []`).  They become `None` here and are resolved exactly once, by
/// the utilization generator or by [`TaskDraft::resolve`].  A pending WCET
/// may still come with a thread count; `threads == 0` leaves that choice to
/// the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub name: String,
    pub period: Option<Time>,
    pub deadline: Option<Time>,
    pub threads: usize,
    pub wcet: Option<Vec<Time>>,
}

impl TaskDraft {
    /// Map a raw record onto a draft.  Only the shape is checked here; the
    /// full task invariants are checked when the draft resolves.
    pub fn new(
        name: impl Into<String>,
        period: Time,
        deadline: Time,
        threads: usize,
        wcet: Vec<Time>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if !wcet.is_empty() && threads != wcet.len() {
            return Err(ValidationError::ThreadCountMismatch {
                task: name,
                threads,
                len: wcet.len(),
            });
        }
        Ok(Self {
            name,
            period: (period > 0).then_some(period),
            deadline: (deadline > 0).then_some(deadline),
            threads,
            wcet: (!wcet.is_empty()).then_some(wcet),
        })
    }

    pub fn period_pending(&self) -> bool {
        self.period.is_none()
    }

    pub fn wcet_pending(&self) -> bool {
        self.wcet.is_none()
    }

    pub fn is_pending(&self) -> bool {
        self.period_pending() || self.wcet_pending()
    }

    /// Turn a fully specified draft into a [`Task`].
    pub fn resolve(self) -> Result<Task, ValidationError> {
        let period = self.period.ok_or_else(|| ValidationError::Pending {
            task: self.name.clone(),
            field: "period",
        })?;
        let wcet = self.wcet.ok_or_else(|| ValidationError::Pending {
            task: self.name.clone(),
            field: "wcet",
        })?;
        let deadline = self.deadline.unwrap_or(0);
        Task::new(self.name, period, deadline, wcet.len(), wcet)
    }
}

/// Schema version tag of a task-set description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TsVersion {
    /// No `ts-version` given.  Treated as the current schema.
    #[default]
    Unspecified,
    V1_0,
}

/// Drafts read from one description, in file order.
#[derive(Debug, Clone, Default)]
pub struct TaskSetDraft {
    pub version: TsVersion,
    pub drafts: Vec<TaskDraft>,
}

impl TaskSetDraft {
    pub fn is_pending(&self) -> bool {
        self.drafts.iter().any(TaskDraft::is_pending)
    }

    /// Resolve every draft and collect them into a [`TaskSet`].
    pub fn resolve(self) -> Result<TaskSet, ValidationError> {
        let mut set = TaskSet::with_version(self.version);
        for draft in self.drafts {
            set.push(draft.resolve()?)?;
        }
        Ok(set)
    }
}

// ── TaskSet ───────────────────────────────────────────────────────────────────

/// Ordered, name-unique collection of tasks.
///
/// Insertion order has no effect on schedulability but is kept for stable
/// reporting and as the priority tie-break.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSet {
    version: TsVersion,
    tasks: Vec<Task>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(version: TsVersion) -> Self {
        Self {
            version,
            tasks: Vec::new(),
        }
    }

    /// Build a set from tasks in order, rejecting duplicate names.
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Result<Self, ValidationError> {
        let mut set = Self::new();
        for task in tasks {
            set.push(task)?;
        }
        Ok(set)
    }

    pub fn version(&self) -> TsVersion {
        self.version
    }

    /// Append a task.  Fails if the name is already taken.
    pub fn push(&mut self, task: Task) -> Result<(), ValidationError> {
        if task.name.is_empty() {
            return Err(ValidationError::EmptyName {
                index: self.tasks.len(),
            });
        }
        if self.position(&task.name).is_some() {
            return Err(ValidationError::DuplicateName { task: task.name });
        }
        self.tasks.push(task);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Insertion index of `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.name == name)
    }

    fn position_or_err(&self, name: &str) -> Result<usize, ValidationError> {
        self.position(name)
            .ok_or_else(|| ValidationError::UnknownTask { task: name.into() })
    }

    /// Fix the chunk size of `name`.  `chunk` must lie in `[1, wcet[threads]]`.
    pub fn assign_chunk_size(&mut self, name: &str, chunk: Time) -> Result<(), ValidationError> {
        let i = self.position_or_err(name)?;
        self.tasks[i].check_chunk(chunk)?;
        self.tasks[i].chunk_size = Some(chunk);
        Ok(())
    }

    /// Drop every assigned chunk size.
    pub fn clear_chunk_sizes(&mut self) {
        for task in &mut self.tasks {
            task.chunk_size = None;
        }
    }

    /// Replace `name` by two children keeping `first` and `threads - first`
    /// threads.
    ///
    /// Children are named `<name>:1` and `<name>:2`, take the parent's place
    /// in the ordering, inherit its period and deadline and carry prefixes of
    /// its WCET vector.  Returns the two child names.
    pub fn split_into(
        &mut self,
        name: &str,
        first: usize,
    ) -> Result<(String, String), ValidationError> {
        let i = self.position_or_err(name)?;
        let parent = &self.tasks[i];
        let threads = parent.threads();
        if first == 0 || first >= threads {
            return Err(ValidationError::SplitOutOfRange {
                task: name.into(),
                first,
                threads,
            });
        }

        let split_err = || ValidationError::SplitOutOfRange {
            task: name.into(),
            first,
            threads,
        };
        let a = parent.child(1, first).ok_or_else(split_err)?;
        let b = parent.child(2, threads - first).ok_or_else(split_err)?;
        for child in [&a, &b] {
            if self.position(&child.name).is_some() {
                return Err(ValidationError::DuplicateName {
                    task: child.name.clone(),
                });
            }
        }

        let names = (a.name.clone(), b.name.clone());
        self.tasks.splice(i..=i, [a, b]);
        Ok(names)
    }

    /// Replace the WCET vector of `name`, keeping its thread count.  The
    /// chunk size is dropped.
    pub fn replace_wcet(&mut self, name: &str, wcet: Vec<Time>) -> Result<(), ValidationError> {
        let i = self.position_or_err(name)?;
        let task = &mut self.tasks[i];
        if wcet.len() != task.threads() {
            return Err(ValidationError::ThreadCountMismatch {
                task: name.into(),
                threads: task.threads(),
                len: wcet.len(),
            });
        }
        task.wcet = WcetVector::new(name, wcet)?;
        task.chunk_size = None;
        Ok(())
    }

    /// Turn every task into a single thread running its whole bundle:
    /// `wcet = [wcet[threads]]`.  Names, periods and deadlines are kept and
    /// chunk sizes dropped.
    pub fn merge_threads(&mut self) {
        for task in &mut self.tasks {
            let total = task.total_wcet();
            task.wcet = WcetVector(vec![total]);
            task.chunk_size = None;
        }
    }

    /// Divide every task with more than `max_threads` threads until no part
    /// exceeds it.  The first part of each division keeps `max_threads`
    /// threads and the remainder is divided again, so a task with `k`
    /// threads ends as `⌈k / max_threads⌉` parts.  Returns the number of
    /// divisions made.
    pub fn divide_max_threads(&mut self, max_threads: usize) -> Result<usize, ValidationError> {
        if max_threads == 0 {
            return Err(ValidationError::ZeroThreadLimit);
        }
        let mut divisions = 0;
        let mut i = 0;
        while i < self.tasks.len() {
            if self.tasks[i].threads() > max_threads {
                let name = self.tasks[i].name.clone();
                self.split_into(&name, max_threads)?;
                divisions += 1;
            }
            i += 1;
        }
        Ok(divisions)
    }

    /// Total utilization `Σ wcet[k] / T`.
    pub fn utilization(&self) -> f64 {
        self.tasks.iter().map(Task::utilization).sum()
    }

    pub fn max_deadline(&self) -> Option<Time> {
        self.tasks.iter().map(Task::deadline).max()
    }

    /// LCM of all periods.
    pub fn hyperperiod(&self) -> Result<HyperperiodInfo, HyperperiodError> {
        hyperperiod::calculate(self.tasks.iter().map(Task::period))
    }
}

impl<'a> IntoIterator for &'a TaskSet {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

impl fmt::Display for TaskSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, task) in self.tasks.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {task}", i + 1)?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

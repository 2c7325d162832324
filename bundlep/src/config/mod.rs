/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task-set description loading and dumping.
//!
//! The expected YAML structure is:
//! ```yaml
//! ts-version: 1.0          # optional
//! tasks:
//!   - name: t.1
//!     period: 30
//!     deadline: 30
//!     threads: 2
//!     wcet: [8, 13]
//!     chunk: 12            # optional, written by the chunk tools
//! ```
//!
//! `wcet: []` marks a pending WCET (with `threads: 0` when the thread count
//! is pending too) and `period: 0` a pending period.  Such records load as
//! [`TaskDraft`]s; only [`parse_drafts`] / [`load_drafts`] accept them, and
//! [`write_drafts`] writes them back in the same form.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::task::{TaskDraft, TaskSet, TaskSetDraft, Time, TsVersion};

/// The only schema version the tools understand.
const SUPPORTED_VERSION: f64 = 1.0;

// ── Private YAML (de)serialization types ──────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
///
/// Kept private: callers work with [`TaskSetDraft`] / [`TaskSet`].
#[derive(Debug, Serialize, Deserialize)]
struct TaskSetFile {
    #[serde(rename = "ts-version", default, skip_serializing_if = "Option::is_none")]
    ts_version: Option<f64>,
    tasks: Vec<TaskRecord>,
}

/// Per-task fields as they appear in the YAML file.
#[derive(Debug, Serialize, Deserialize)]
struct TaskRecord {
    name: String,
    period: Time,
    deadline: Time,
    threads: usize,
    #[serde(default)]
    wcet: Vec<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chunk: Option<Time>,
}

fn version_from(tag: Option<f64>) -> Result<TsVersion> {
    match tag {
        None => {
            info!("No ts-version given, assuming {SUPPORTED_VERSION:.1}");
            Ok(TsVersion::Unspecified)
        }
        Some(v) if (v - SUPPORTED_VERSION).abs() < f64::EPSILON => Ok(TsVersion::V1_0),
        Some(v) => bail!("Unsupported ts-version {v} (expected {SUPPORTED_VERSION:.1})"),
    }
}

fn version_tag(version: TsVersion) -> Option<f64> {
    match version {
        TsVersion::Unspecified => None,
        TsVersion::V1_0 => Some(SUPPORTED_VERSION),
    }
}

fn read_file(yaml: &str) -> Result<TaskSetFile> {
    serde_yaml::from_str(yaml).context("Failed to parse task-set YAML")
}

fn drafts_from(file: TaskSetFile) -> Result<TaskSetDraft> {
    let version = version_from(file.ts_version)?;
    if file.tasks.is_empty() {
        warn!("Task-set description contains no tasks");
    }

    let drafts = file
        .tasks
        .into_iter()
        .map(|r| {
            debug!(
                "  Task: {} | T: {} | D: {} | threads: {} | wcet: {:?}",
                r.name, r.period, r.deadline, r.threads, r.wcet
            );
            TaskDraft::new(r.name, r.period, r.deadline, r.threads, r.wcet)
        })
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid task record")?;

    Ok(TaskSetDraft { version, drafts })
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parse a description that may contain pending records.
pub fn parse_drafts(yaml: &str) -> Result<TaskSetDraft> {
    drafts_from(read_file(yaml)?)
}

/// Load a description that may contain pending records from `path`.
pub fn load_drafts(path: &Path) -> Result<TaskSetDraft> {
    info!("Loading task-set drafts from: {}", path.display());
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open task-set file: {}", path.display()))?;
    parse_drafts(&content).with_context(|| format!("In task-set file: {}", path.display()))
}

/// Parse a fully specified task set, including any recorded chunk sizes.
///
/// # Errors
/// Malformed YAML, an unsupported `ts-version`, a record failing task
/// validation, or a record that is still pending.
pub fn parse_task_set(yaml: &str) -> Result<TaskSet> {
    let file = read_file(yaml)?;
    let chunks: Vec<(String, Time)> = file
        .tasks
        .iter()
        .filter_map(|r| r.chunk.map(|c| (r.name.clone(), c)))
        .collect();

    let draft = drafts_from(file)?;
    if let Some(pending) = draft.drafts.iter().find(|d| d.is_pending()) {
        bail!(
            "Task '{}' is still pending; run `bundlep generate` first",
            pending.name
        );
    }

    let mut set = draft.resolve().context("Invalid task record")?;
    for (name, chunk) in chunks {
        set.assign_chunk_size(&name, chunk)
            .context("Invalid recorded chunk size")?;
    }
    Ok(set)
}

/// Load a fully specified task set from `path`.
pub fn load_task_set(path: &Path) -> Result<TaskSet> {
    info!("Loading task set from: {}", path.display());
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open task-set file: {}", path.display()))?;
    let set = parse_task_set(&content)
        .with_context(|| format!("In task-set file: {}", path.display()))?;

    info!(
        "Successfully loaded {} task(s), U = {:.3}",
        set.len(),
        set.utilization()
    );
    Ok(set)
}

/// Render `set` in the description layout.
pub fn to_yaml(set: &TaskSet) -> Result<String> {
    let file = TaskSetFile {
        ts_version: version_tag(set.version()),
        tasks: set
            .iter()
            .map(|t| TaskRecord {
                name: t.name().to_string(),
                period: t.period(),
                deadline: t.deadline(),
                threads: t.threads(),
                wcet: t.wcet().as_slice().to_vec(),
                chunk: t.chunk_size(),
            })
            .collect(),
    };
    serde_yaml::to_string(&file).context("Failed to serialise task set")
}

/// Render drafts with pending fields back as sentinels.
pub fn drafts_to_yaml(draft: &TaskSetDraft) -> Result<String> {
    let file = TaskSetFile {
        ts_version: version_tag(draft.version),
        tasks: draft
            .drafts
            .iter()
            .map(|d| TaskRecord {
                name: d.name.clone(),
                period: d.period.unwrap_or(0),
                deadline: d.deadline.unwrap_or(0),
                threads: d.wcet.as_ref().map_or(d.threads, Vec::len),
                wcet: d.wcet.clone().unwrap_or_default(),
                chunk: None,
            })
            .collect(),
    };
    serde_yaml::to_string(&file).context("Failed to serialise task-set drafts")
}

fn write_file(yaml: String, count: usize, path: &Path) -> Result<()> {
    std::fs::write(path, yaml)
        .with_context(|| format!("Cannot write task-set file: {}", path.display()))?;
    info!("Wrote {} task(s) to {}", count, path.display());
    Ok(())
}

/// Write `set` to `path` in the description layout.
pub fn write_task_set(set: &TaskSet, path: &Path) -> Result<()> {
    write_file(to_yaml(set)?, set.len(), path)
}

/// Write `draft` to `path`; pending fields become sentinels.
pub fn write_drafts(draft: &TaskSetDraft, path: &Path) -> Result<()> {
    write_file(drafts_to_yaml(draft)?, draft.drafts.len(), path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

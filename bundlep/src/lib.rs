/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! BUNDLEP – chunk-size analysis for bundled multi-thread tasks
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── task          – tasks, WCET vectors, task sets and pending drafts
//! ├── config/       – YAML task-set descriptions (load / dump)
//! ├── hyperperiod/  – LCM / GCD helpers
//! ├── analysis/     – response-time schedulability tester
//! ├── chunks/       – chunk-size search and bundle splitting
//! └── generator/    – UUniFast utilization generator
//! ```

pub mod analysis;
pub mod chunks;
pub mod config;
pub mod generator;
pub mod hyperperiod;
pub mod task;

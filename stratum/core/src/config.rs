// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::collections::HashSet;
use std::time::Duration;

/// Maximum number of terminal failures tolerated on a slave before it is
/// quarantined from further task placement.
pub const MAX_FAILED: u32 = 3;

/// One-time per-slave memory overhead subtracted from the first offer seen
/// from that slave, to account for the executor process itself.
pub const EXECUTOR_MEMORY: f64 = 64.0;

/// Back-off interval for the DAG driver's non-blocking completion-event poll.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Time a stage must sit in the failed set, accumulating fetch failures,
/// before the driver refreshes cache locations and resubmits it.
pub const RESUBMIT_TIMEOUT: Duration = Duration::from_secs(60);

/// How long the cluster scheduler may go without any active job before it
/// stops the framework.
pub const MAX_IDLE_TIME: Duration = Duration::from_secs(1_800);

/// Default number of concurrently running tasks a single slave may host.
pub const DEFAULT_TASK_PER_NODE: u32 = 8;

/// Default parallelism when the embedder doesn't specify a partition count,
/// cluster mode.
pub const DEFAULT_PARALLELISM_CLUSTER: usize = 16;

/// Default parallelism, local (single-process) mode.
pub const DEFAULT_PARALLELISM_LOCAL: usize = 2;

/// Refuse-filter duration offered to the broker when no job wants any of an
/// offer's resources at all.
pub const REFUSE_SECONDS_IDLE: u64 = 300;

/// Refuse-filter duration offered to the broker for an offer that matched no
/// task this round, so it is retried soon.
pub const REFUSE_SECONDS_SHORT: u64 = 5;

/// Total attempts (including the first) a task may fail before the owning
/// stage is abandoned and surfaced to the DAG scheduler as a fatal failure.
pub const MAX_TASK_FAILURES: u32 = 4;

/// Float tolerance used when comparing an offer's remaining cpu against a
/// task's cpu requirement.
pub const CPU_EPSILON: f64 = 1e-4;

/// Warn when a launched task's serialized payload exceeds this size.
pub const TASK_PAYLOAD_WARN_BYTES: usize = 1000 * 1024;

/// Immutable configuration value for a scheduler run. Built once via
/// [`SchedulerConfigBuilder`] and shared (by reference or clone -- all
/// fields are cheap) between the DAG driver and the cluster scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Whether `run_job` streams results in partition order (`true`, the
    /// default) or completion order (`false`).
    pub keep_order: bool,
    /// Number of concurrently running tasks tolerated per slave.
    pub task_per_node: u32,
    /// Terminal failures tolerated on a slave before quarantine.
    pub max_failed: u32,
    /// Total attempts tolerated for a single task before its stage is
    /// abandoned.
    pub max_task_failures: u32,
    /// If set, only offers whose `group` attribute is in this set are
    /// considered for placement.
    pub group: Option<HashSet<String>>,
    /// Per-task default cpu requirement, used when a dataset doesn't specify
    /// one.
    pub default_task_cpus: f64,
    /// Per-task default memory requirement, in the same units as
    /// `EXECUTOR_MEMORY`.
    pub default_task_mem: f64,
    pub executor_memory: f64,
    pub poll_timeout: Duration,
    pub resubmit_timeout: Duration,
    pub max_idle_time: Duration,
    pub log_level: log::LevelFilter,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            keep_order: true,
            task_per_node: DEFAULT_TASK_PER_NODE,
            max_failed: MAX_FAILED,
            max_task_failures: MAX_TASK_FAILURES,
            group: None,
            default_task_cpus: 1.0,
            default_task_mem: 128.0,
            executor_memory: EXECUTOR_MEMORY,
            poll_timeout: POLL_TIMEOUT,
            resubmit_timeout: RESUBMIT_TIMEOUT,
            max_idle_time: MAX_IDLE_TIME,
            log_level: log::LevelFilter::Info,
        }
    }
}

impl SchedulerConfig {
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }
}

/// Builder for [`SchedulerConfig`], mirroring the option-bag-at-construction
/// pattern the upstream scheduler uses for its own config object.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    pub fn keep_order(mut self, keep_order: bool) -> Self {
        self.config.keep_order = keep_order;
        self
    }

    pub fn task_per_node(mut self, n: u32) -> Self {
        self.config.task_per_node = n;
        self
    }

    pub fn group(mut self, group: HashSet<String>) -> Self {
        self.config.group = Some(group);
        self
    }

    pub fn default_task_cpus(mut self, cpus: f64) -> Self {
        self.config.default_task_cpus = cpus;
        self
    }

    pub fn default_task_mem(mut self, mem: f64) -> Self {
        self.config.default_task_mem = mem;
        self
    }

    pub fn max_idle_time(mut self, d: Duration) -> Self {
        self.config.max_idle_time = d;
        self
    }

    pub fn log_level(mut self, level: log::LevelFilter) -> Self {
        self.config.log_level = level;
        self
    }

    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}

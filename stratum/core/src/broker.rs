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

use crate::error::Result;
use crate::task::TaskId;
use async_trait::async_trait;
use std::collections::HashMap;

/// A resource grant offered by the external two-level broker. Carries a
/// slave identity, hostname, named scalar resources, and attributes.
#[derive(Debug, Clone)]
pub struct Offer {
    pub offer_id: String,
    pub slave_id: String,
    pub hostname: String,
    /// Named scalar resources, e.g. `"cpus" -> 4.0`, `"mem" -> 8192.0`.
    pub resources: HashMap<String, f64>,
    /// Named attributes, e.g. `"group" -> "gpu"`.
    pub attributes: HashMap<String, String>,
}

impl Offer {
    pub fn cpus(&self) -> f64 {
        self.resources.get("cpus").copied().unwrap_or(0.0)
    }

    pub fn mem(&self) -> f64 {
        self.resources.get("mem").copied().unwrap_or(0.0)
    }

    pub fn group(&self) -> Option<&str> {
        self.attributes.get("group").map(|s| s.as_str())
    }
}

/// Canonical id embedded in every `TaskInfo`: `"jobId:taskId:tried"`.
pub fn task_info_id(job_id: &str, task_id: TaskId, tried: u32) -> String {
    format!("{job_id}:{}:{tried}", task_id.0)
}

/// Parses a canonical task-info id back into its `(job_id, task_id, tried)`
/// parts.
pub fn parse_task_info_id(id: &str) -> Option<(String, TaskId, u32)> {
    let mut parts = id.splitn(3, ':');
    let job_id = parts.next()?.to_string();
    let task_id: u64 = parts.next()?.parse().ok()?;
    let tried: u32 = parts.next()?.parse().ok()?;
    Some((job_id, TaskId(task_id), tried))
}

/// A task bound for launch against a specific offer, as handed to
/// `Broker::launch_tasks`.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    /// `"jobId:taskId:tried"` -- see `task_info_id`.
    pub id: String,
    pub slave_id: String,
    pub cpus: f64,
    pub mem: f64,
    /// `compress(serialize((task, task.tried)))`.
    pub data: Vec<u8>,
    pub executor: ExecutorInfo,
}

/// Static bootstrap context shared by every task launched for a given
/// framework instance.
#[derive(Debug, Clone)]
pub struct ExecutorInfo {
    pub command: String,
    pub mem: f64,
    /// Opaque bootstrap blob: working directory, search paths, environment,
    /// per-node parallelism, log-collector endpoints, log level.
    pub data: Vec<u8>,
}

/// Terminal or non-terminal state of a launched task, as reported by a
/// status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Finished,
    Failed,
    Lost,
    Killed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::Running)
    }
}

/// A status update reported by the broker for a previously launched task.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub task_info_id: String,
    pub state: TaskState,
    /// Present for FINISHED/FAILED; carries the compressed, encoded
    /// `(taskId, reason, result, accumUpdate)` tuple. Absent for killed/lost
    /// outcomes without a payload.
    pub data: Option<Vec<u8>>,
}

/// Driver-side handle the cluster scheduler uses to talk back to the broker.
/// A production implementation wraps a real two-level resource manager
/// client; this crate ships only the trait plus an in-memory test double
/// (`stratum_scheduler::test_support::ScriptedBroker`).
#[async_trait]
pub trait Broker: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self, failover: bool) -> Result<()>;
    async fn revive_offers(&self) -> Result<()>;
    async fn launch_tasks(
        &self,
        offer_id: &str,
        tasks: Vec<TaskInfo>,
        refuse_seconds: u64,
    ) -> Result<()>;
    async fn kill_task(&self, task_info_id: &str) -> Result<()>;
}

/// Callback surface the broker drives the cluster scheduler through.
/// Exactly one of these fires per broker-originated event; implementations
/// must be safe to call from any task the broker client spawns.
#[async_trait]
pub trait BrokerCallbacks: Send + Sync {
    async fn registered(&self) {}
    async fn reregistered(&self) {}
    async fn disconnected(&self) {}
    async fn resource_offers(&self, offers: Vec<Offer>);
    async fn offer_rescinded(&self, offer_id: &str);
    async fn status_update(&self, update: StatusUpdate);
    async fn framework_message(&self, _message: Vec<u8>) {}
    /// Drop tracked tasks for `slave_id` and quarantine it from further
    /// placement.
    async fn slave_lost(&self, slave_id: &str);
    /// Drop tracked tasks for `slave_id`, but -- unlike [`slave_lost`](Self::slave_lost)
    /// -- leave the slave itself eligible for future offers.
    async fn executor_lost(&self, slave_id: &str, executor_id: &str);
    async fn error(&self, message: &str);
}

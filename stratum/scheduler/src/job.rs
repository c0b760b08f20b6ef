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

//! Component D: per-job task-set bookkeeping.
//!
//! One `JobTaskSet` is created per stage submitted to the cluster scheduler
//! (grounded on `schedule.py`'s `TaskSetManager`). It owns the pending
//! queue for that stage's tasks, tracks in-flight attempts per slave so the
//! cluster scheduler can honor `task_per_node`, and reports completion
//! events back to the DAG driver over a channel instead of a direct
//! callback into a shared scheduler object.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use stratum_core::{StageId, Task, TaskEndReason, TaskId};

/// One pending or in-flight attempt of a task, tracked so timeouts and
/// retries can find it by either id.
struct Attempt {
    task: Task,
    slave_id: String,
    launched_at: Instant,
}

/// Tracks every task belonging to one submitted stage: which are still
/// pending placement, which are running and where, and how many times each
/// has failed.
pub struct JobTaskSet {
    pub job_id: String,
    pub stage_id: StageId,
    pending: Vec<Task>,
    running: HashMap<TaskId, Attempt>,
    finished: HashSet<TaskId>,
    failures: HashMap<TaskId, u32>,
    max_task_failures: u32,
}

/// Outcome of feeding a status update into a [`JobTaskSet`]. Every variant
/// carries the slave the completed attempt ran on, so the caller can update
/// that slave's admission state without a second lookup.
pub enum TaskOutcome {
    /// The task succeeded; all of its stage's tasks may now be complete.
    Success(Task, String),
    /// The task failed but may still be retried; it has been requeued.
    Retrying(Task, String),
    /// The task has exhausted `max_task_failures`; the owning stage should
    /// be abandoned.
    FailedPermanently(Task, TaskEndReason, String),
}

impl JobTaskSet {
    pub fn new(job_id: String, stage_id: StageId, tasks: Vec<Task>, max_task_failures: u32) -> Self {
        Self {
            job_id,
            stage_id,
            pending: tasks,
            running: HashMap::new(),
            finished: HashSet::new(),
            failures: HashMap::new(),
            max_task_failures,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty()
    }

    /// Number of attempts currently running against `slave_id`, used by the
    /// cluster scheduler's `task_per_node` admission check.
    pub fn running_on(&self, slave_id: &str) -> usize {
        self.running.values().filter(|a| a.slave_id == slave_id).count()
    }

    /// Reset the launch clock for a running attempt, e.g. on a `TASK_RUNNING`
    /// confirmation, so `check_timeouts` doesn't resubmit a task that is in
    /// fact progressing normally.
    pub fn touch(&mut self, task_id: TaskId) {
        if let Some(attempt) = self.running.get_mut(&task_id) {
            attempt.launched_at = Instant::now();
        }
    }

    /// Whether `task_id` is currently a running attempt of this task set.
    /// Task ids are unique within one run but not across the stages of that
    /// run, so this is how a status update is routed to the task set that
    /// actually launched it rather than just the first one sharing its
    /// `job_id`.
    pub fn is_running(&self, task_id: TaskId) -> bool {
        self.running.contains_key(&task_id)
    }

    /// Pop the next pending task, if any, without yet committing it to a
    /// slave (the cluster scheduler decides placement across every job's
    /// task set before calling [`JobTaskSet::launch`]).
    pub fn peek_pending(&self) -> Option<&Task> {
        self.pending.first()
    }

    /// Remove the task at the front of the pending queue and mark it
    /// running against `slave_id`.
    pub fn launch(&mut self, slave_id: String) -> Option<Task> {
        let task = self.pending.remove(0);
        self.running.insert(
            task.id,
            Attempt {
                task: task.clone(),
                slave_id,
                launched_at: Instant::now(),
            },
        );
        Some(task)
    }

    /// Record a terminal status update for `task_id`, returning how the
    /// caller should react.
    pub fn complete(&mut self, task_id: TaskId, reason: TaskEndReason) -> Option<TaskOutcome> {
        let attempt = self.running.remove(&task_id)?;
        let slave_id = attempt.slave_id.clone();
        match reason {
            TaskEndReason::Success => {
                self.finished.insert(task_id);
                Some(TaskOutcome::Success(attempt.task, slave_id))
            }
            other => {
                let failures = self.failures.entry(task_id).or_insert(0);
                *failures += 1;
                if *failures >= self.max_task_failures {
                    Some(TaskOutcome::FailedPermanently(attempt.task, other, slave_id))
                } else {
                    let mut task = attempt.task;
                    task.tried += 1;
                    self.pending.push(task.clone());
                    Some(TaskOutcome::Retrying(task, slave_id))
                }
            }
        }
    }

    /// Requeue every attempt running on `slave_id`, e.g. after a slave is
    /// declared lost. Tasks that have already hit `max_task_failures` are
    /// reported as permanent failures instead.
    pub fn slave_lost(&mut self, slave_id: &str) -> Vec<TaskOutcome> {
        let lost_ids: Vec<TaskId> = self
            .running
            .iter()
            .filter(|(_, a)| a.slave_id == slave_id)
            .map(|(id, _)| *id)
            .collect();
        lost_ids
            .into_iter()
            .filter_map(|id| self.complete(id, TaskEndReason::OtherFailure("slave lost".into())))
            .collect()
    }

    /// Attempts that have been running longer than `timeout`, requeued for
    /// resubmission as a new attempt (the original is not counted as a
    /// failure, mirroring the source's timeout-driven speculative-style
    /// resubmission rather than a fault).
    pub fn check_timeouts(&mut self, timeout: std::time::Duration) -> Vec<Task> {
        let now = Instant::now();
        let timed_out: Vec<TaskId> = self
            .running
            .iter()
            .filter(|(_, a)| now.duration_since(a.launched_at) > timeout)
            .map(|(id, _)| *id)
            .collect();
        let mut resubmitted = Vec::new();
        for id in timed_out {
            if let Some(attempt) = self.running.remove(&id) {
                let mut task = attempt.task;
                task.tried += 1;
                self.pending.push(task.clone());
                resubmitted.push(task);
            }
        }
        resubmitted
    }
}

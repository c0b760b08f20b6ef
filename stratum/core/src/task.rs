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

use crate::dataset::{Dataset, PartitionIndex, ShuffleDependency, ShuffleId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Monotonically increasing, process-wide unique id of a stage, minted by the
/// stage arena (`stratum_scheduler::stage::StageArena`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageId(pub u64);

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage-{}", self.0)
    }
}

/// Scheduler-unique id of a task, minted once per task object (not per
/// attempt -- re-submission of the same task keeps its id and increments
/// `tried`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// The body of a task, without the scheduling metadata (id, cpus/mem, tried
/// count) that wraps it -- see `Task`.
#[derive(Clone)]
pub enum TaskKind {
    /// Runs `fn(dataset.iterator(partition))` and returns the caller-visible
    /// result for `output_index`.
    Result {
        dataset: Arc<dyn Dataset>,
        partition: PartitionIndex,
        output_index: usize,
    },
    /// Writes shuffle output for the downstream partitioner; its result is
    /// the hostname where that output now lives.
    ShuffleMap {
        dataset: Arc<dyn Dataset>,
        shuffle_dep: ShuffleDependency,
        partition: PartitionIndex,
    },
}

impl fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Result {
                partition,
                output_index,
                ..
            } => f
                .debug_struct("Result")
                .field("partition", partition)
                .field("output_index", output_index)
                .finish(),
            TaskKind::ShuffleMap {
                partition,
                shuffle_dep,
                ..
            } => f
                .debug_struct("ShuffleMap")
                .field("partition", partition)
                .field("shuffle_id", &shuffle_dep.shuffle_id)
                .finish(),
        }
    }
}

/// A unit of cluster-scheduled work: a `TaskKind` plus everything the
/// cluster layer needs to place and retry it.
#[derive(Clone, Debug)]
pub struct Task {
    pub id: TaskId,
    pub stage_id: StageId,
    pub kind: TaskKind,
    pub preferred_locations: Vec<String>,
    pub cpus: f64,
    pub mem: f64,
    /// Number of times this task has been launched, including the current
    /// attempt. Starts at 0 before the first launch.
    pub tried: u32,
}

impl Task {
    pub fn shuffle_id(&self) -> Option<ShuffleId> {
        match &self.kind {
            TaskKind::ShuffleMap { shuffle_dep, .. } => Some(shuffle_dep.shuffle_id),
            TaskKind::Result { .. } => None,
        }
    }

    pub fn partition(&self) -> PartitionIndex {
        match &self.kind {
            TaskKind::Result { partition, .. } => *partition,
            TaskKind::ShuffleMap { partition, .. } => *partition,
        }
    }
}

/// Why a task ended the way it did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEndReason {
    Success,
    /// A downstream task could not read an upstream shuffle output produced
    /// on `server_uri`; the stage that produced `shuffle_id`'s `map_id`
    /// partition must be recomputed.
    FetchFailed {
        server_uri: String,
        shuffle_id: ShuffleId,
        map_id: PartitionIndex,
        reduce_id: PartitionIndex,
    },
    OtherFailure(String),
}

/// The materialized result of a task, before the scheduler interprets it.
#[derive(Clone)]
pub enum TaskResult {
    /// A `ResultTask`'s output, as produced by the embedding terminal
    /// function. Opaque to the scheduler.
    Value(Arc<dyn std::any::Any + Send + Sync>),
    /// A `ShuffleMapTask`'s output: the hostname where the shuffle output was
    /// written.
    MapOutputLocation(String),
}

impl fmt::Debug for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskResult::Value(_) => f.write_str("Value(..)"),
            TaskResult::MapOutputLocation(host) => {
                f.debug_tuple("MapOutputLocation").field(host).finish()
            }
        }
    }
}

/// `(task, reason, result, accumulator updates)` delivered by the cluster
/// layer back to the DAG driver.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    pub task_id: TaskId,
    pub stage_id: StageId,
    pub reason: TaskEndReason,
    pub result: Option<TaskResult>,
    pub accum_updates: Vec<u8>,
}

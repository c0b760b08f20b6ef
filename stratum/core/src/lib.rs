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

//! Collaborator traits and wire types shared by the stratum DAG scheduler
//! and cluster resource scheduler.
//!
//! This crate deliberately does not implement the lineage-graph data model,
//! the task body, the shuffle data-movement layer, or a production broker
//! client -- those are out of scope (`SPEC_FULL.md` §1) and left as trait
//! seams for the embedding application. It does ship simple in-memory
//! reference implementations of the tracker and accumulator collaborators,
//! sufficient for a single scheduler process.

pub mod accumulator;
pub mod broker;
pub mod codec;
pub mod config;
pub mod dataset;
pub mod error;
pub mod runner;
pub mod task;
pub mod tracker;

pub use accumulator::{AccumulatorId, AccumulatorRegistry, InMemoryAccumulatorRegistry};
pub use broker::{
    parse_task_info_id, task_info_id, Broker, BrokerCallbacks, ExecutorInfo, Offer, StatusUpdate,
    TaskInfo, TaskState,
};
pub use codec::{
    compress, decompress, resolve_result, RemoteFetcher, ResultDecoder, ResultEncoding,
    TaskSerializer,
};
pub use config::SchedulerConfig;
pub use dataset::{Dataset, DatasetId, Dependency, PartitionIndex, ShuffleDependency, ShuffleId};
pub use error::{Result, SchedulerError};
pub use runner::TaskRunner;
pub use task::{CompletionEvent, StageId, Task, TaskEndReason, TaskId, TaskKind, TaskResult};
pub use tracker::{CacheTracker, InMemoryCacheTracker, InMemoryMapOutputTracker, MapOutputTracker};

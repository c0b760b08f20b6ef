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

//! DAG stage scheduler and two-level cluster resource scheduler for a
//! bulk-synchronous, RDD-style compute framework.
//!
//! This crate implements components A-D of the scheduler: the stage graph
//! builder ([`stage`]), the DAG scheduler driver ([`dag_scheduler`]), the
//! cluster resource scheduler ([`cluster`]), and per-job task-set
//! bookkeeping ([`job`]). It is driven entirely through the collaborator
//! traits defined in `stratum-core` -- no concrete lineage model, task
//! body, or broker client lives here.

pub mod cluster;
pub mod context;
pub mod dag_scheduler;
pub mod job;
pub mod stage;
pub mod test_support;

pub use cluster::ClusterScheduler;
pub use context::SchedulerContext;
pub use dag_scheduler::{DagScheduler, JobEvent};
pub use job::{JobTaskSet, TaskOutcome};
pub use stage::{Stage, StageArena};

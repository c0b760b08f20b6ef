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

use crate::task::{StageId, TaskId};
use thiserror::Error;

/// Crate-wide error type. One variant per external failure domain, following
/// the same one-enum-per-crate shape the upstream scheduler uses for its own
/// error type.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("broker error: {0}")]
    Broker(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error("task {task_id} of job {job_id} not found")]
    TaskNotFound { job_id: String, task_id: TaskId },

    #[error("stage {0:?} not found")]
    StageNotFound(StageId),

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("internal scheduler error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

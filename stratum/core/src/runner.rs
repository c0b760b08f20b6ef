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

use crate::dataset::{Dataset, PartitionIndex, ShuffleDependency};
use crate::error::Result;
use crate::task::TaskResult;

/// Executes a single task's body in-process. The task body itself (the
/// terminal function, the shuffle writer) is out of scope for the scheduler
/// (`SPEC_FULL.md` §1); this trait is the seam the embedder plugs into for
/// the two places the scheduler needs to run one, synchronously, itself:
/// the local fast path (`SPEC_FULL.md` §4.2) and the in-memory broker test
/// double (`stratum_scheduler::test_support`).
pub trait TaskRunner: Send + Sync {
    /// Run a `ResultTask`'s function against `dataset`'s `partition`.
    fn run_result_task(
        &self,
        dataset: &dyn Dataset,
        partition: PartitionIndex,
        output_index: usize,
    ) -> Result<TaskResult>;

    /// Run a `ShuffleMapTask`, writing shuffle output for `shuffle_dep` and
    /// returning the hostname the output landed on.
    fn run_shuffle_map_task(
        &self,
        dataset: &dyn Dataset,
        shuffle_dep: &ShuffleDependency,
        partition: PartitionIndex,
    ) -> Result<TaskResult>;
}

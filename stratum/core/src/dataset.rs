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

use std::fmt;
use std::sync::Arc;

/// Stable, process-wide unique id of a dataset (an "RDD" in the lineage
/// model). Assigned by the embedding application when the dataset is
/// constructed.
pub type DatasetId = u64;

/// Stable id of a shuffle dependency. A given `ShuffleId` resolves to exactly
/// one shuffle-map stage for the lifetime of the scheduling context that
/// created it.
pub type ShuffleId = u64;

/// A single partition of a dataset, identified by its index within the
/// dataset's partition list.
pub type PartitionIndex = usize;

/// Narrow or shuffle dependency of one dataset on another.
///
/// A narrow dependency maps each downstream partition onto a bounded set of
/// upstream partitions without a reshuffle; a shuffle dependency means every
/// downstream partition potentially reads every upstream partition, routed
/// through a partitioner, and therefore must wait for all upstream output to
/// be materialized before it can run.
#[derive(Clone)]
pub enum Dependency {
    Narrow(Arc<dyn Dataset>),
    Shuffle(ShuffleDependency),
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Narrow(d) => f.debug_tuple("Narrow").field(&d.id()).finish(),
            Dependency::Shuffle(s) => f.debug_tuple("Shuffle").field(s).finish(),
        }
    }
}

#[derive(Clone)]
pub struct ShuffleDependency {
    pub shuffle_id: ShuffleId,
    pub rdd: Arc<dyn Dataset>,
    /// Number of output partitions the partitioner produces.
    pub num_output_partitions: usize,
}

impl fmt::Debug for ShuffleDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShuffleDependency")
            .field("shuffle_id", &self.shuffle_id)
            .field("rdd", &self.rdd.id())
            .field("num_output_partitions", &self.num_output_partitions)
            .finish()
    }
}

/// The lineage-graph collaborator interface. This crate never constructs a
/// concrete `Dataset` itself (the lineage data model is out of scope for the
/// scheduler) but every algorithm in `stratum-scheduler` is written against
/// this trait.
pub trait Dataset: Send + Sync {
    /// Stable id of this dataset, unique within a scheduling context.
    fn id(&self) -> DatasetId;

    /// Number of partitions in this dataset.
    fn num_partitions(&self) -> usize;

    /// Dependencies of this dataset on its upstream datasets.
    fn dependencies(&self) -> Vec<Dependency>;

    /// Hostnames preferred for running a task against `partition`, most
    /// preferred first. An empty list means "no locality preference".
    fn preferred_locations(&self, partition: PartitionIndex) -> Vec<String>;

    /// Whether this dataset's output should be persisted across runs once
    /// computed, short-circuiting recomputation of its upstream lineage.
    fn should_cache(&self) -> bool {
        false
    }

    /// Per-dataset memory override for tasks reading this dataset, in the
    /// same units as `SchedulerConfig::default_task_mem`. `None` defers to
    /// the scheduler-wide default.
    fn mem_override(&self) -> Option<f64> {
        None
    }
}

impl fmt::Debug for dyn Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("id", &self.id())
            .field("num_partitions", &self.num_partitions())
            .finish()
    }
}

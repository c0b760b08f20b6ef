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

use crate::dataset::{DatasetId, PartitionIndex, ShuffleId};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Tracks, for cached datasets, which hosts already hold a materialized copy
/// of each partition. Registration is idempotent: registering the same
/// dataset id twice is a no-op.
pub trait CacheTracker: Send + Sync {
    /// Register `dataset_id` as cacheable with `num_partitions` partitions.
    /// Idempotent.
    fn register_dataset(&self, dataset_id: DatasetId, num_partitions: usize);

    /// Point-in-time snapshot of cached locations, `dataset_id -> [hosts per
    /// partition]`. A partition with no cached host has an empty `Vec`.
    fn locations_snapshot(&self) -> HashMap<DatasetId, Vec<Vec<String>>>;

    /// Record that `partition` of `dataset_id` is now cached on `host`.
    fn add_location(&self, dataset_id: DatasetId, partition: PartitionIndex, host: String);
}

/// Single-process, in-memory `CacheTracker`. Sufficient for one scheduler;
/// no cross-process propagation (out of scope, see `SPEC_FULL.md` §1).
#[derive(Default)]
pub struct InMemoryCacheTracker {
    locations: Mutex<HashMap<DatasetId, Vec<Vec<String>>>>,
}

impl CacheTracker for InMemoryCacheTracker {
    fn register_dataset(&self, dataset_id: DatasetId, num_partitions: usize) {
        self.locations
            .lock()
            .entry(dataset_id)
            .or_insert_with(|| vec![Vec::new(); num_partitions]);
    }

    fn locations_snapshot(&self) -> HashMap<DatasetId, Vec<Vec<String>>> {
        self.locations.lock().clone()
    }

    fn add_location(&self, dataset_id: DatasetId, partition: PartitionIndex, host: String) {
        let mut locations = self.locations.lock();
        if let Some(parts) = locations.get_mut(&dataset_id) {
            if let Some(hosts) = parts.get_mut(partition) {
                if !hosts.contains(&host) {
                    hosts.push(host);
                }
            }
        }
    }
}

/// Tracks, for each shuffle dependency, the host that produced each output
/// partition.
pub trait MapOutputTracker: Send + Sync {
    /// Register the hosts that produced `shuffle_id`'s output, one entry per
    /// partition, first host wins if called more than once for the same
    /// partition.
    fn register_map_outputs(&self, shuffle_id: ShuffleId, host_per_partition: Vec<String>);

    /// Current known output locations for `shuffle_id`, or `None` if never
    /// registered.
    fn get_map_outputs(&self, shuffle_id: ShuffleId) -> Option<Vec<String>>;

    /// Drop the recorded host for `map_id` of `shuffle_id`, e.g. after a
    /// fetch failure against that host.
    fn unregister_map_output(&self, shuffle_id: ShuffleId, map_id: PartitionIndex);
}

#[derive(Default)]
pub struct InMemoryMapOutputTracker {
    outputs: Mutex<HashMap<ShuffleId, Vec<String>>>,
}

impl MapOutputTracker for InMemoryMapOutputTracker {
    fn register_map_outputs(&self, shuffle_id: ShuffleId, host_per_partition: Vec<String>) {
        self.outputs
            .lock()
            .entry(shuffle_id)
            .or_insert(host_per_partition);
    }

    fn get_map_outputs(&self, shuffle_id: ShuffleId) -> Option<Vec<String>> {
        self.outputs.lock().get(&shuffle_id).cloned()
    }

    fn unregister_map_output(&self, shuffle_id: ShuffleId, map_id: PartitionIndex) {
        if let Some(hosts) = self.outputs.lock().get_mut(&shuffle_id) {
            if let Some(host) = hosts.get_mut(map_id) {
                host.clear();
            }
        }
    }
}

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

//! Test doubles used by this crate's own integration tests and available to
//! embedders writing their own. Always compiled (not `cfg(test)`-gated),
//! mirroring the teacher's always-on `test_utils` module that both unit and
//! integration tests import.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use stratum_core::{
    Broker, BrokerCallbacks, Dataset, Dependency, PartitionIndex, Result, ShuffleDependency,
    StatusUpdate, TaskInfo, TaskResult, TaskRunner,
};

/// Minimal reference [`Dataset`] backed by an in-memory vector of
/// partitions, each a `Vec<i64>`. Supports a single narrow or shuffle
/// parent so tests can build the two-stage wordcount-shaped graphs the
/// seed scenarios call for.
pub struct VecDataset {
    id: u64,
    partitions: Vec<Vec<i64>>,
    dependency: Option<Dependency>,
    cache: bool,
    locations: Vec<Vec<String>>,
}

impl VecDataset {
    pub fn new(id: u64, partitions: Vec<Vec<i64>>) -> Self {
        let n = partitions.len();
        Self {
            id,
            partitions,
            dependency: None,
            cache: false,
            locations: vec![Vec::new(); n],
        }
    }

    pub fn with_narrow_parent(mut self, parent: Arc<dyn Dataset>) -> Self {
        self.dependency = Some(Dependency::Narrow(parent));
        self
    }

    pub fn with_shuffle_parent(mut self, dep: stratum_core::ShuffleDependency) -> Self {
        self.dependency = Some(Dependency::Shuffle(dep));
        self
    }

    pub fn cached(mut self) -> Self {
        self.cache = true;
        self
    }

    pub fn with_locations(mut self, partition: PartitionIndex, hosts: Vec<String>) -> Self {
        self.locations[partition] = hosts;
        self
    }

    pub fn partition(&self, index: PartitionIndex) -> &[i64] {
        &self.partitions[index]
    }
}

impl Dataset for VecDataset {
    fn id(&self) -> u64 {
        self.id
    }

    fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    fn dependencies(&self) -> Vec<Dependency> {
        self.dependency.clone().into_iter().collect()
    }

    fn preferred_locations(&self, partition: PartitionIndex) -> Vec<String> {
        self.locations.get(partition).cloned().unwrap_or_default()
    }

    fn should_cache(&self) -> bool {
        self.cache
    }
}

/// [`TaskRunner`] for [`VecDataset`]: the local fast path and the
/// `ScriptedBroker` test harness both need something to execute a task
/// against, without pulling in a real terminal function or shuffle writer.
/// Result tasks report the partition index as their value so tests can
/// assert on which partition actually ran; shuffle-map tasks report a
/// host name derived from the partition so output-location bookkeeping has
/// something distinct to track.
#[derive(Default)]
pub struct VecTaskRunner;

impl TaskRunner for VecTaskRunner {
    fn run_result_task(
        &self,
        _dataset: &dyn Dataset,
        partition: PartitionIndex,
        _output_index: usize,
    ) -> Result<TaskResult> {
        Ok(TaskResult::Value(Arc::new(partition as i64)))
    }

    fn run_shuffle_map_task(
        &self,
        _dataset: &dyn Dataset,
        _shuffle_dep: &ShuffleDependency,
        partition: PartitionIndex,
    ) -> Result<TaskResult> {
        Ok(TaskResult::MapOutputLocation(format!("host-{partition}")))
    }
}

/// A scripted offer/status-update sequence delivered to whatever
/// [`BrokerCallbacks`] is registered, one step per call to [`Self::step`].
/// `launch_tasks` calls are recorded for assertions instead of acting on a
/// real cluster.
pub struct ScriptedBroker {
    callbacks: Mutex<Option<Arc<dyn BrokerCallbacks>>>,
    launches: Mutex<Vec<(String, Vec<TaskInfo>, u64)>>,
}

impl Default for ScriptedBroker {
    fn default() -> Self {
        Self {
            callbacks: Mutex::new(None),
            launches: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, callbacks: Arc<dyn BrokerCallbacks>) {
        *self.callbacks.lock() = Some(callbacks);
    }

    /// Deliver a batch of offers to the registered callback surface.
    pub async fn deliver_offers(&self, offers: Vec<stratum_core::Offer>) {
        let callbacks = self.callbacks.lock().clone();
        if let Some(cb) = callbacks {
            cb.resource_offers(offers).await;
        }
    }

    /// Deliver a status update to the registered callback surface.
    pub async fn deliver_status(&self, update: StatusUpdate) {
        let callbacks = self.callbacks.lock().clone();
        if let Some(cb) = callbacks {
            cb.status_update(update).await;
        }
    }

    pub async fn deliver_slave_lost(&self, slave_id: &str) {
        let callbacks = self.callbacks.lock().clone();
        if let Some(cb) = callbacks {
            cb.slave_lost(slave_id).await;
        }
    }

    pub async fn deliver_executor_lost(&self, slave_id: &str, executor_id: &str) {
        let callbacks = self.callbacks.lock().clone();
        if let Some(cb) = callbacks {
            cb.executor_lost(slave_id, executor_id).await;
        }
    }

    pub fn launches(&self) -> Vec<(String, Vec<TaskInfo>, u64)> {
        self.launches.lock().clone()
    }
}

#[async_trait]
impl Broker for ScriptedBroker {
    async fn start(&self) -> Result<()> {
        let callbacks = self.callbacks.lock().clone();
        if let Some(cb) = callbacks {
            cb.registered().await;
        }
        Ok(())
    }

    async fn stop(&self, _failover: bool) -> Result<()> {
        Ok(())
    }

    async fn revive_offers(&self) -> Result<()> {
        Ok(())
    }

    async fn launch_tasks(&self, offer_id: &str, tasks: Vec<TaskInfo>, refuse_seconds: u64) -> Result<()> {
        self.launches
            .lock()
            .push((offer_id.to_string(), tasks, refuse_seconds));
        Ok(())
    }

    async fn kill_task(&self, _task_info_id: &str) -> Result<()> {
        Ok(())
    }
}

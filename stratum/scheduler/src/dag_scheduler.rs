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

//! Component B: the DAG scheduler driver.
//!
//! Grounded on `schedule.py`'s `runJob`/`submitStage`/`submitMissingTasks`
//! and its completion-event loop. The "lazy sequence of results" of the
//! source becomes a bounded `tokio::sync::mpsc` channel (`SPEC_FULL.md` §9):
//! the driver runs as its own task, writing into the channel exactly where
//! the source would `yield`, and the caller drains it as a stream.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use log::warn;
use stratum_core::{
    CompletionEvent, Dataset, PartitionIndex, Result, SchedulerError, StageId, Task, TaskEndReason,
    TaskId, TaskKind, TaskResult, TaskRunner,
};
use tokio::sync::mpsc;

use crate::cluster::ClusterScheduler;
use crate::context::SchedulerContext;
use crate::stage::builder::{get_missing_parent_stages, get_parent_stages};
use crate::stage::StageArena;

/// One item of the result stream: a finished output, or a terminal error
/// that ends the run.
#[derive(Debug)]
pub enum JobEvent {
    Result(PartitionIndex, TaskResult),
    Failed(SchedulerError),
}

/// Per-run scheduling state untouched by any task but the driver's own
/// (`SPEC_FULL.md` §5: "the DAG driver's per-run state ... is touched only
/// by the driver task").
struct RunState {
    arena: StageArena,
    waiting: HashSet<StageId>,
    running: HashSet<StageId>,
    failed: HashSet<StageId>,
    failed_since: Option<Instant>,
    pending: HashMap<StageId, HashSet<TaskId>>,
    final_stage: StageId,
    num_partitions: usize,
    finished: Vec<bool>,
    buffered: HashMap<PartitionIndex, TaskResult>,
    last_finished: usize,
    next_task_id: u64,
    /// Result-task id -> its caller-visible output index.
    task_output_index: HashMap<TaskId, usize>,
    /// Shuffle-map task id -> the partition it produces.
    task_partition: HashMap<TaskId, PartitionIndex>,
}

/// Drives one `run_job` invocation to completion against a
/// [`ClusterScheduler`], or executes it inline on the local fast path.
pub struct DagScheduler {
    context: SchedulerContext,
    cluster: Arc<ClusterScheduler>,
    runner: Arc<dyn TaskRunner>,
}

impl DagScheduler {
    pub fn new(context: SchedulerContext, cluster: Arc<ClusterScheduler>, runner: Arc<dyn TaskRunner>) -> Self {
        Self { context, cluster, runner }
    }

    /// `runJob(finalDataset, fn, partitions, allowLocal)`. Returns a channel
    /// the caller drains for [`JobEvent`]s; the channel closes once every
    /// requested partition has produced a result or a fatal error has been
    /// delivered as the final item.
    pub async fn run_job(
        &self,
        job_id: String,
        final_dataset: Arc<dyn Dataset>,
        partitions: Vec<PartitionIndex>,
        allow_local: bool,
        mut completions: mpsc::Receiver<CompletionEvent>,
    ) -> mpsc::Receiver<JobEvent> {
        let (tx, rx) = mpsc::channel(partitions.len().max(1) * 2 + 8);

        if allow_local {
            if let Some(result) = self.try_local_fast_path(&final_dataset, &partitions) {
                let _ = tx.send(JobEvent::Result(partitions[0], result)).await;
                return rx;
            }
        }

        let mut state = RunState {
            arena: StageArena::new(),
            waiting: HashSet::new(),
            running: HashSet::new(),
            failed: HashSet::new(),
            failed_since: None,
            pending: HashMap::new(),
            final_stage: StageId(0),
            num_partitions: partitions.len(),
            finished: vec![false; partitions.len()],
            buffered: HashMap::new(),
            last_finished: 0,
            next_task_id: 0,
            task_output_index: HashMap::new(),
            task_partition: HashMap::new(),
        };

        let parents = get_parent_stages(&mut state.arena, &*self.context.cache_tracker, &final_dataset);
        let final_stage = state.arena_allocate(final_dataset.clone(), None, parents);
        state.final_stage = final_stage;

        self.submit_stage(&job_id, &mut state, final_stage, &partitions).await;

        loop {
            match completions.try_recv() {
                Ok(event) => {
                    if self
                        .handle_completion(&job_id, &mut state, event, &tx, &partitions)
                        .await
                    {
                        break;
                    }
                }
                Err(mpsc::error::TryRecvError::Empty) => {
                    self.cluster.check_timeouts().await;
                    if let Some(since) = state.failed_since {
                        if since.elapsed() >= self.context.config.resubmit_timeout && !state.failed.is_empty() {
                            let failed: Vec<StageId> = state.failed.drain().collect();
                            state.failed_since = None;
                            for stage_id in failed {
                                self.submit_stage(&job_id, &mut state, stage_id, &partitions).await;
                            }
                        }
                    }
                    tokio::time::sleep(self.context.config.poll_timeout).await;
                }
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    let _ = tx
                        .send(JobEvent::Failed(SchedulerError::Internal(
                            "completion channel closed".into(),
                        )))
                        .await;
                    break;
                }
            }
            if state.finished.iter().filter(|f| **f).count() == state.num_partitions {
                break;
            }
        }

        self.cluster.remove(final_stage);
        rx
    }

    /// `|partitions| == 1` and the final stage has no missing parents:
    /// compute inline without engaging the cluster layer.
    fn try_local_fast_path(
        &self,
        final_dataset: &Arc<dyn Dataset>,
        partitions: &[PartitionIndex],
    ) -> Option<TaskResult> {
        if partitions.len() != 1 {
            return None;
        }
        if !final_dataset.dependencies().is_empty() {
            return None;
        }
        self.runner
            .run_result_task(final_dataset.as_ref(), partitions[0], 0)
            .ok()
    }

    /// `submitStage`: recursive -- compute missing parents; submit tasks if
    /// none, else recurse into each missing parent and mark this stage
    /// waiting.
    fn submit_stage<'a>(
        &'a self,
        job_id: &'a str,
        state: &'a mut RunState,
        stage_id: StageId,
        partitions: &'a [PartitionIndex],
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if state.waiting.contains(&stage_id) || state.running.contains(&stage_id) {
                return;
            }
            let missing =
                get_missing_parent_stages(&mut state.arena, &*self.context.cache_tracker, stage_id);
            if missing.is_empty() {
                self.submit_missing_tasks(job_id, state, stage_id, partitions);
                state.running.insert(stage_id);
            } else {
                for parent in missing {
                    self.submit_stage(job_id, state, parent, partitions).await;
                }
                state.waiting.insert(stage_id);
            }
        })
    }

    fn submit_missing_tasks(
        &self,
        job_id: &str,
        state: &mut RunState,
        stage_id: StageId,
        partitions: &[PartitionIndex],
    ) {
        let mut tasks = Vec::new();
        let mut first_locations: Option<Vec<String>> = None;

        let (rdd, shuffle_dep, is_final) = {
            let stage = state.arena.get(stage_id).expect("stage exists");
            (stage.rdd.clone(), stage.shuffle_dep.clone(), stage_id == state.final_stage)
        };

        let default_mem = rdd.mem_override().unwrap_or(self.context.config.default_task_mem);

        if is_final {
            for (output_index, &partition) in partitions.iter().enumerate() {
                if state.finished[output_index] {
                    continue;
                }
                let locations = self.locations_for(&rdd, partition, &mut first_locations);
                let task_id = state.next_task_id();
                state.task_output_index.insert(task_id, output_index);
                tasks.push(Task {
                    id: task_id,
                    stage_id,
                    kind: TaskKind::Result {
                        dataset: rdd.clone(),
                        partition,
                        output_index,
                    },
                    preferred_locations: locations,
                    cpus: self.context.config.default_task_cpus,
                    mem: default_mem,
                    tried: 0,
                });
            }
        } else {
            let missing_partitions = {
                let stage = state.arena.get(stage_id).expect("stage exists");
                stage.missing_partitions()
            };
            let shuffle_dep = shuffle_dep.expect("non-final stage has a shuffle dependency");
            for partition in missing_partitions {
                let locations = self.locations_for(&rdd, partition, &mut first_locations);
                let task_id = state.next_task_id();
                state.task_partition.insert(task_id, partition);
                tasks.push(Task {
                    id: task_id,
                    stage_id,
                    kind: TaskKind::ShuffleMap {
                        dataset: rdd.clone(),
                        shuffle_dep: shuffle_dep.clone(),
                        partition,
                    },
                    preferred_locations: locations,
                    cpus: self.context.config.default_task_cpus,
                    mem: default_mem,
                    tried: 0,
                });
            }
        }

        let pending = state.pending.entry(stage_id).or_default();
        pending.extend(tasks.iter().map(|t| t.id));
        self.cluster.submit(job_id.to_string(), stage_id, tasks);
    }

    /// Preferred-locations short-circuit: query the first task; if empty,
    /// assume locality is unavailable for the whole stage.
    fn locations_for(
        &self,
        rdd: &Arc<dyn Dataset>,
        partition: PartitionIndex,
        first_seen: &mut Option<Vec<String>>,
    ) -> Vec<String> {
        match first_seen {
            Some(locs) if locs.is_empty() => Vec::new(),
            _ => {
                let locs = rdd.preferred_locations(partition);
                if first_seen.is_none() {
                    *first_seen = Some(locs.clone());
                }
                locs
            }
        }
    }

    /// Returns `true` once the run should terminate.
    async fn handle_completion(
        &self,
        job_id: &str,
        state: &mut RunState,
        event: CompletionEvent,
        tx: &mpsc::Sender<JobEvent>,
        partitions: &[PartitionIndex],
    ) -> bool {
        let Some(pending) = state.pending.get_mut(&event.stage_id) else {
            return false;
        };
        if !pending.remove(&event.task_id) {
            return false;
        }

        match event.reason.clone() {
            TaskEndReason::Success => {
                if !event.accum_updates.is_empty() {
                    self.context.accumulators.merge(event.task_id.0, &event.accum_updates);
                }
                if event.stage_id == state.final_stage {
                    if let Some(result) = event.result.clone() {
                        self.deliver_result(state, tx, result, &event).await;
                    }
                } else {
                    self.record_shuffle_output(job_id, state, event, partitions).await;
                }
            }
            TaskEndReason::FetchFailed { shuffle_id, map_id, .. } => {
                if let Some(producing) = state.arena.shuffle_map_stage_id(shuffle_id) {
                    self.context.map_output_tracker.unregister_map_output(shuffle_id, map_id);
                    if let Some(stage) = state.arena.get_mut(producing) {
                        if let Some(hosts) = stage.output_locs.get_mut(map_id) {
                            hosts.clear();
                        }
                    }
                    state.running.remove(&producing);
                    state.failed.insert(producing);
                    state.failed_since.get_or_insert_with(Instant::now);
                }
            }
            TaskEndReason::OtherFailure(message) => {
                let _ = tx
                    .send(JobEvent::Failed(SchedulerError::JobFailed {
                        job_id: job_id.to_string(),
                        message,
                    }))
                    .await;
                return true;
            }
        }

        state.finished.iter().filter(|f| **f).count() == state.num_partitions
    }

    async fn deliver_result(
        &self,
        state: &mut RunState,
        tx: &mpsc::Sender<JobEvent>,
        result: TaskResult,
        event: &CompletionEvent,
    ) {
        let Some(&output_index) = state.task_output_index.get(&event.task_id) else {
            warn!("completion for unknown result task {}", event.task_id);
            return;
        };
        state.finished[output_index] = true;

        if self.context.config.keep_order {
            state.buffered.insert(output_index, result);
            while let Some(next) = state.buffered.remove(&state.last_finished) {
                let _ = tx.send(JobEvent::Result(state.last_finished, next)).await;
                state.last_finished += 1;
            }
        } else {
            let _ = tx.send(JobEvent::Result(output_index, result)).await;
        }
    }

    async fn record_shuffle_output(
        &self,
        job_id: &str,
        state: &mut RunState,
        event: CompletionEvent,
        partitions: &[PartitionIndex],
    ) {
        let Some(TaskResult::MapOutputLocation(host)) = event.result else {
            return;
        };
        let Some(&partition) = state.task_partition.get(&event.task_id) else {
            warn!("completion for unknown shuffle-map task {}", event.task_id);
            return;
        };
        {
            let stage = state.arena.get_mut(event.stage_id).expect("stage exists");
            if let Some(hosts) = stage.output_locs.get_mut(partition) {
                hosts.push(host);
            }
        }

        let pending_empty = state
            .pending
            .get(&event.stage_id)
            .map(|p| p.is_empty())
            .unwrap_or(true);
        if !pending_empty {
            return;
        }

        state.running.remove(&event.stage_id);
        let (shuffle_id, hosts) = {
            let stage = state.arena.get(event.stage_id).expect("stage exists");
            let shuffle_id = stage.shuffle_dep.as_ref().map(|d| d.shuffle_id);
            (shuffle_id, stage.output_locs.clone())
        };
        if let Some(shuffle_id) = shuffle_id {
            let hosts: Vec<String> = hosts
                .into_iter()
                .map(|h| h.first().cloned().unwrap_or_default())
                .collect();
            self.context.map_output_tracker.register_map_outputs(shuffle_id, hosts);
        }

        let waiting: Vec<StageId> = state.waiting.iter().copied().collect();
        for candidate in waiting {
            let missing =
                get_missing_parent_stages(&mut state.arena, &*self.context.cache_tracker, candidate);
            if missing.is_empty() {
                state.waiting.remove(&candidate);
                self.submit_missing_tasks(job_id, state, candidate, partitions);
                state.running.insert(candidate);
            }
        }
    }
}

impl RunState {
    fn next_task_id(&mut self) -> TaskId {
        let id = self.next_task_id;
        self.next_task_id += 1;
        TaskId(id)
    }

    fn arena_allocate(
        &mut self,
        rdd: Arc<dyn Dataset>,
        shuffle_dep: Option<stratum_core::ShuffleDependency>,
        parents: Vec<StageId>,
    ) -> StageId {
        self.arena.allocate(rdd, shuffle_dep, parents)
    }
}

/// Propagated to the caller when a run cannot start (e.g. the cluster layer
/// rejects the first submission).
pub fn fatal(message: impl Into<String>) -> Result<()> {
    Err(SchedulerError::Internal(message.into()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::{ScriptedBroker, VecDataset, VecTaskRunner};
    use stratum_core::ShuffleDependency;

    fn scheduler() -> DagScheduler {
        let context = SchedulerContext::default();
        let (tx, _rx) = mpsc::channel(16);
        let broker = ScriptedBroker::new();
        let executor = stratum_core::ExecutorInfo {
            command: "executor".into(),
            mem: 64.0,
            data: Vec::new(),
        };
        struct NoopCodec;
        impl stratum_core::ResultDecoder for NoopCodec {
            fn decode_fast(&self, _: &[u8]) -> Result<TaskResult> {
                Ok(TaskResult::MapOutputLocation("unused".into()))
            }
            fn decode_generic(&self, _: &[u8]) -> Result<TaskResult> {
                Ok(TaskResult::MapOutputLocation("unused".into()))
            }
        }
        impl stratum_core::TaskSerializer for NoopCodec {
            fn serialize(&self, _: &Task) -> Result<Vec<u8>> {
                Ok(Vec::new())
            }
        }
        #[async_trait::async_trait]
        impl stratum_core::RemoteFetcher for NoopCodec {
            async fn fetch(&self, _: &url::Url) -> Result<Vec<u8>> {
                Ok(Vec::new())
            }
        }
        let codec = Arc::new(NoopCodec);
        let cluster = Arc::new(ClusterScheduler::new(
            context.config.clone(),
            broker,
            codec.clone(),
            codec.clone(),
            codec,
            executor,
            tx,
        ));
        DagScheduler::new(context, cluster, Arc::new(VecTaskRunner))
    }

    #[test]
    fn local_fast_path_runs_inline_for_a_single_sourceless_partition() {
        let scheduler = scheduler();
        let dataset: Arc<dyn Dataset> = Arc::new(VecDataset::new(1, vec![vec![1], vec![2]]));
        let result = scheduler.try_local_fast_path(&dataset, &[0]);
        assert!(matches!(result, Some(TaskResult::Value(_))));
    }

    #[test]
    fn local_fast_path_declines_when_more_than_one_partition_is_requested() {
        let scheduler = scheduler();
        let dataset: Arc<dyn Dataset> = Arc::new(VecDataset::new(1, vec![vec![1], vec![2]]));
        assert!(scheduler.try_local_fast_path(&dataset, &[0, 1]).is_none());
    }

    #[test]
    fn local_fast_path_declines_when_the_dataset_has_dependencies() {
        let scheduler = scheduler();
        let source: Arc<dyn Dataset> = Arc::new(VecDataset::new(1, vec![vec![1]]));
        let derived: Arc<dyn Dataset> =
            Arc::new(VecDataset::new(2, vec![vec![1]]).with_narrow_parent(source));
        assert!(scheduler.try_local_fast_path(&derived, &[0]).is_none());
    }

    #[test]
    fn locations_for_short_circuits_once_the_first_task_has_no_locality() {
        let scheduler = scheduler();
        let rdd: Arc<dyn Dataset> = Arc::new(VecDataset::new(1, vec![vec![1], vec![2]]));
        let mut first_seen = None;
        let first = scheduler.locations_for(&rdd, 0, &mut first_seen);
        assert!(first.is_empty());
        let second = scheduler.locations_for(&rdd, 1, &mut first_seen);
        assert!(second.is_empty());
    }

    #[test]
    fn submit_missing_tasks_populates_output_index_for_the_final_stage() {
        let scheduler = scheduler();
        let dataset: Arc<dyn Dataset> = Arc::new(VecDataset::new(1, vec![vec![1], vec![2]]));
        let mut state = RunState {
            arena: StageArena::new(),
            waiting: HashSet::new(),
            running: HashSet::new(),
            failed: HashSet::new(),
            failed_since: None,
            pending: HashMap::new(),
            final_stage: StageId(0),
            num_partitions: 2,
            finished: vec![false, false],
            buffered: HashMap::new(),
            last_finished: 0,
            next_task_id: 0,
            task_output_index: HashMap::new(),
            task_partition: HashMap::new(),
        };
        let final_stage = state.arena_allocate(dataset, None, Vec::new());
        state.final_stage = final_stage;
        scheduler.submit_missing_tasks("job-1", &mut state, final_stage, &[0, 1]);

        assert_eq!(state.task_output_index.len(), 2);
        assert_eq!(state.pending.get(&final_stage).map(|p| p.len()), Some(2));
    }

    #[test]
    fn submit_missing_tasks_populates_partition_for_a_shuffle_map_stage() {
        let scheduler = scheduler();
        let map_rdd: Arc<dyn Dataset> = Arc::new(VecDataset::new(1, vec![vec![1], vec![2]]));
        let shuffle_dep = ShuffleDependency {
            shuffle_id: 1,
            rdd: map_rdd.clone(),
            num_output_partitions: 2,
        };
        let mut state = RunState {
            arena: StageArena::new(),
            waiting: HashSet::new(),
            running: HashSet::new(),
            failed: HashSet::new(),
            failed_since: None,
            pending: HashMap::new(),
            final_stage: StageId(99),
            num_partitions: 1,
            finished: vec![false],
            buffered: HashMap::new(),
            last_finished: 0,
            next_task_id: 0,
            task_output_index: HashMap::new(),
            task_partition: HashMap::new(),
        };
        let shuffle_stage = state.arena_allocate(map_rdd, Some(shuffle_dep), Vec::new());
        scheduler.submit_missing_tasks("job-1", &mut state, shuffle_stage, &[0]);

        assert_eq!(state.task_partition.len(), 2);
        assert_eq!(state.pending.get(&shuffle_stage).map(|p| p.len()), Some(2));
    }
}

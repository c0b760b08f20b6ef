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

//! Component C: the two-level resource-offer cluster scheduler.
//!
//! Mirrors `schedule.py`'s Mesos scheduler callbacks: offers arrive from the
//! broker, get matched against pending tasks across every active job's
//! task set (FIFO by job submission order, mirroring the teacher's
//! descending-slot bias pass over `active_jobs`), and launches or refusals
//! are reported back. Status updates are decoded via [`stratum_core::resolve_result`]
//! and turned into [`CompletionEvent`]s pushed onto a bounded channel the
//! DAG driver drains.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::Mutex;
use stratum_core::{
    parse_task_info_id, task_info_id, Broker, BrokerCallbacks, CompletionEvent, ExecutorInfo,
    Offer, RemoteFetcher, ResultDecoder, SchedulerConfig, StageId, StatusUpdate, Task, TaskEndReason,
    TaskId, TaskInfo, TaskResult, TaskSerializer, TaskState,
};
use tokio::sync::mpsc;

use crate::job::{JobTaskSet, TaskOutcome};

/// A slave's admission-tracked state: how many tasks it is currently
/// running, whether it has been quarantined for repeated failures, and
/// whether its first offer's memory has already been billed the one-time
/// executor overhead.
#[derive(Default)]
struct SlaveState {
    running: u32,
    consecutive_failures: u32,
    quarantined: bool,
    executor_mem_charged: bool,
}

struct Inner {
    job_sets: HashMap<StageId, JobTaskSet>,
    /// FIFO order of stages as they were submitted, for the bias pass over
    /// active jobs.
    submit_order: Vec<StageId>,
    slaves: HashMap<String, SlaveState>,
    executor: ExecutorInfo,
    last_activity: Instant,
}

/// Drives offer matching, status-update interpretation, and slave lifecycle
/// for every stage the DAG driver has submitted. One instance exists per
/// running scheduler; it is driven by [`BrokerCallbacks`] invocations from
/// the broker client and polled by the DAG driver's `check` loop for
/// timeouts and idle shutdown.
pub struct ClusterScheduler {
    config: Arc<SchedulerConfig>,
    broker: Arc<dyn Broker>,
    decoder: Arc<dyn ResultDecoder>,
    serializer: Arc<dyn TaskSerializer>,
    fetcher: Arc<dyn RemoteFetcher>,
    completions: mpsc::Sender<CompletionEvent>,
    inner: Mutex<Inner>,
}

impl ClusterScheduler {
    pub fn new(
        config: Arc<SchedulerConfig>,
        broker: Arc<dyn Broker>,
        decoder: Arc<dyn ResultDecoder>,
        serializer: Arc<dyn TaskSerializer>,
        fetcher: Arc<dyn RemoteFetcher>,
        executor: ExecutorInfo,
        completions: mpsc::Sender<CompletionEvent>,
    ) -> Self {
        Self {
            config,
            broker,
            decoder,
            serializer,
            fetcher,
            completions,
            inner: Mutex::new(Inner {
                job_sets: HashMap::new(),
                submit_order: Vec::new(),
                slaves: HashMap::new(),
                executor,
                last_activity: Instant::now(),
            }),
        }
    }

    /// Register a newly submitted stage's tasks for placement.
    pub fn submit(&self, job_id: String, stage_id: StageId, tasks: Vec<Task>) {
        let mut inner = self.inner.lock();
        inner.job_sets.insert(
            stage_id,
            JobTaskSet::new(job_id, stage_id, tasks, self.config.max_task_failures),
        );
        inner.submit_order.push(stage_id);
        inner.last_activity = Instant::now();
    }

    /// Drop a stage's task set, e.g. once every task has completed or the
    /// stage has been abandoned.
    pub fn remove(&self, stage_id: StageId) {
        let mut inner = self.inner.lock();
        inner.job_sets.remove(&stage_id);
        inner.submit_order.retain(|id| *id != stage_id);
    }

    pub fn has_active_jobs(&self) -> bool {
        !self.inner.lock().job_sets.is_empty()
    }

    pub fn idle_since(&self) -> Duration {
        self.inner.lock().last_activity.elapsed()
    }

    /// Periodic maintenance: resubmit tasks whose attempts have run past
    /// `resubmit_timeout`. Called from the DAG driver's `check` loop.
    pub async fn check_timeouts(&self) {
        let mut to_revive = false;
        {
            let mut inner = self.inner.lock();
            let timeout = self.config.resubmit_timeout;
            for job_set in inner.job_sets.values_mut() {
                let resubmitted = job_set.check_timeouts(timeout);
                if !resubmitted.is_empty() {
                    warn!(
                        "resubmitting {} timed-out task(s) for {}",
                        resubmitted.len(),
                        job_set.stage_id
                    );
                    to_revive = true;
                }
            }
        }
        if to_revive {
            let _ = self.broker.revive_offers().await;
        }
    }

    fn admit(&self, inner: &Inner, hostname: &str, offer: &Offer) -> bool {
        if let Some(group) = &self.config.group {
            if offer.group().map(|g| !group.contains(g)).unwrap_or(true) {
                return false;
            }
        }
        let slave = inner.slaves.get(hostname);
        if slave.map(|s| s.quarantined).unwrap_or(false) {
            return false;
        }
        if slave.map(|s| s.running).unwrap_or(0) >= self.config.task_per_node {
            return false;
        }
        true
    }

    fn offer_capacity(&self, inner: &mut Inner, hostname: &str, offer: &Offer) -> f64 {
        let slave = inner.slaves.entry(hostname.to_string()).or_default();
        let mut mem = offer.mem();
        if !slave.executor_mem_charged {
            mem -= self.config.executor_memory;
            slave.executor_mem_charged = true;
        }
        mem.max(0.0)
    }
}

#[async_trait::async_trait]
impl BrokerCallbacks for ClusterScheduler {
    async fn resource_offers(&self, mut offers: Vec<Offer>) {
        use rand::seq::SliceRandom;
        offers.shuffle(&mut rand::thread_rng());

        if !self.has_active_jobs() {
            for offer in &offers {
                let _ = self
                    .broker
                    .launch_tasks(&offer.offer_id, Vec::new(), stratum_core::config::REFUSE_SECONDS_IDLE)
                    .await;
            }
            return;
        }

        let mut launches: HashMap<String, Vec<TaskInfo>> = HashMap::new();
        let mut refusals: Vec<(String, u64)> = Vec::new();

        {
            let mut inner = self.inner.lock();
            for offer in &offers {
                if !self.admit(&inner, &offer.hostname, offer) {
                    refusals.push((offer.offer_id.clone(), stratum_core::config::REFUSE_SECONDS_SHORT));
                    continue;
                }
                let mut remaining_cpus = offer.cpus();
                let mut remaining_mem = self.offer_capacity(&mut inner, &offer.hostname, offer);
                let mut bound_any = false;

                let order = inner.submit_order.clone();
                'jobs: for stage_id in order {
                    let Inner { job_sets, slaves, executor, .. } = &mut *inner;
                    let Some(job_set) = job_sets.get_mut(&stage_id) else { continue };
                    loop {
                        let Some(task) = job_set.peek_pending() else { break };
                        let fits = task.cpus <= remaining_cpus + stratum_core::config::CPU_EPSILON
                            && task.mem <= remaining_mem;
                        let under_cap = slaves
                            .get(&offer.hostname)
                            .map(|s| s.running)
                            .unwrap_or(0)
                            < self.config.task_per_node;
                        if !fits || !under_cap {
                            break;
                        }
                        let Some(task) = job_set.launch(offer.hostname.clone()) else { break };
                        remaining_cpus -= task.cpus;
                        remaining_mem -= task.mem;
                        bound_any = true;

                        let slave = slaves.entry(offer.hostname.clone()).or_default();
                        slave.running += 1;

                        let data = match self.serializer.serialize(&task) {
                            Ok(bytes) => bytes,
                            Err(e) => {
                                warn!("failed to serialize {}: {e}", task.id);
                                continue;
                            }
                        };
                        if data.len() > stratum_core::config::TASK_PAYLOAD_WARN_BYTES {
                            warn!("{} payload is {} bytes", task.id, data.len());
                        }
                        let info = TaskInfo {
                            id: task_info_id(&job_set.job_id, task.id, task.tried),
                            slave_id: offer.slave_id.clone(),
                            cpus: task.cpus,
                            mem: task.mem,
                            data,
                            executor: executor.clone(),
                        };
                        launches.entry(offer.offer_id.clone()).or_default().push(info);

                        if remaining_cpus <= stratum_core::config::CPU_EPSILON {
                            break 'jobs;
                        }
                    }
                }

                if !bound_any {
                    refusals.push((offer.offer_id.clone(), stratum_core::config::REFUSE_SECONDS_SHORT));
                }
            }
            inner.last_activity = Instant::now();
        }

        for (offer_id, tasks) in launches {
            if let Err(e) = self.broker.launch_tasks(&offer_id, tasks, 1).await {
                warn!("launch_tasks failed for offer {offer_id}: {e}");
            }
        }
        for (offer_id, refuse_seconds) in refusals {
            let _ = self
                .broker
                .launch_tasks(&offer_id, Vec::new(), refuse_seconds)
                .await;
        }
    }

    async fn offer_rescinded(&self, offer_id: &str) {
        debug!("offer {offer_id} rescinded");
    }

    async fn status_update(&self, update: StatusUpdate) {
        let Some((job_id, task_id, _tried)) = parse_task_info_id(&update.task_info_id) else {
            warn!("malformed task info id: {}", update.task_info_id);
            return;
        };

        if update.state == TaskState::Running {
            let mut inner = self.inner.lock();
            if let Some(js) = inner
                .job_sets
                .values_mut()
                .find(|js| js.job_id == job_id && js.is_running(task_id))
            {
                js.touch(task_id);
            }
            return;
        }

        let (reason, result, accum_updates) = match (update.state, update.data) {
            (TaskState::Finished, Some(data)) => {
                decode_terminal(&data, &*self.decoder, &*self.fetcher, true).await
            }
            (TaskState::Failed, Some(data)) => {
                decode_terminal(&data, &*self.decoder, &*self.fetcher, false).await
            }
            (TaskState::Lost, _) | (TaskState::Killed, _) => {
                (TaskEndReason::OtherFailure(format!("{:?}", update.state)), None, Vec::new())
            }
            _ => return,
        };

        let outcome = {
            let mut inner = self.inner.lock();
            // A run's stages all share one `job_id` and a finished
            // shuffle-map stage's task set outlives it in `job_sets`
            // (`DagScheduler::run_job` only removes the final stage), so
            // routing on `job_id` alone can hit the wrong task set. Task
            // ids are unique within a run, so route on the task set that
            // is actually running this attempt.
            let stage_id = inner
                .job_sets
                .iter()
                .find(|(_, js)| js.job_id == job_id && js.is_running(task_id))
                .map(|(id, _)| *id);
            let Some(stage_id) = stage_id else {
                return;
            };
            inner
                .job_sets
                .get_mut(&stage_id)
                .and_then(|js| js.complete(task_id, reason.clone()))
                .map(|outcome| (stage_id, outcome))
        };

        if let Some((stage_id, outcome)) = outcome {
            self.record_outcome(stage_id, outcome, reason, result, accum_updates).await;
        }
    }

    async fn slave_lost(&self, slave_id: &str) {
        warn!("slave lost: {slave_id}");
        self.drop_slave_tasks(slave_id, true).await;
    }

    async fn executor_lost(&self, slave_id: &str, executor_id: &str) {
        warn!("executor lost: {executor_id} on {slave_id}");
        self.drop_slave_tasks(slave_id, false).await;
    }

    async fn error(&self, message: &str) {
        warn!("broker error: {message}");
    }
}

impl ClusterScheduler {
    /// Shared by `slave_lost`/`executor_lost`: drop the bookkeeping for
    /// every task running on `slave_id`, reporting each as a failure so the
    /// owning job set can requeue or abandon it. `quarantine` additionally
    /// pins the slave's failure count past `max_failed`, as only `slaveLost`
    /// does -- `executorLost` drops the tasks but leaves the slave eligible
    /// for future offers.
    async fn drop_slave_tasks(&self, slave_id: &str, quarantine: bool) {
        let outcomes: Vec<(StageId, TaskOutcome)> = {
            let mut inner = self.inner.lock();
            let slave = inner.slaves.entry(slave_id.to_string()).or_default();
            slave.running = 0;
            if quarantine {
                slave.quarantined = true;
            }
            inner
                .job_sets
                .iter_mut()
                .flat_map(|(id, js)| {
                    js.slave_lost(slave_id).into_iter().map(move |o| (*id, o))
                })
                .collect()
        };
        for (stage_id, outcome) in outcomes {
            self.record_outcome(
                stage_id,
                outcome,
                TaskEndReason::OtherFailure("slave lost".into()),
                None,
                Vec::new(),
            )
            .await;
        }
    }

    async fn record_outcome(
        &self,
        stage_id: StageId,
        outcome: TaskOutcome,
        reason: TaskEndReason,
        result: Option<TaskResult>,
        accum_updates: Vec<u8>,
    ) {
        match outcome {
            TaskOutcome::Success(task, slave_id) => {
                if let Some(s) = self.inner.lock().slaves.get_mut(&slave_id) {
                    s.running = s.running.saturating_sub(1);
                    s.consecutive_failures = 0;
                }
                let _ = self
                    .completions
                    .send(CompletionEvent {
                        task_id: task.id,
                        stage_id,
                        reason: TaskEndReason::Success,
                        result,
                        accum_updates,
                    })
                    .await;
            }
            TaskOutcome::Retrying(_task, slave_id) => {
                {
                    let mut inner = self.inner.lock();
                    if let Some(s) = inner.slaves.get_mut(&slave_id) {
                        s.running = s.running.saturating_sub(1);
                        s.consecutive_failures += 1;
                        if s.consecutive_failures >= self.config.max_failed {
                            warn!("quarantining slave {slave_id} after {} failures", s.consecutive_failures);
                            s.quarantined = true;
                        }
                    }
                }
                let _ = self.broker.revive_offers().await;
            }
            TaskOutcome::FailedPermanently(task, reason, slave_id) => {
                if let Some(s) = self.inner.lock().slaves.get_mut(&slave_id) {
                    s.running = s.running.saturating_sub(1);
                }
                let _ = self
                    .completions
                    .send(CompletionEvent {
                        task_id: task.id,
                        stage_id,
                        reason,
                        result: None,
                        accum_updates: Vec::new(),
                    })
                    .await;
            }
        }
    }
}

/// Decode a terminal status update's payload into `(reason, result,
/// accum_updates)`. Payload layout: `[flag: u8][accum_len: u32 LE]
/// [accum bytes][result bytes]`, with `result bytes` empty on failure.
async fn decode_terminal(
    data: &[u8],
    decoder: &dyn ResultDecoder,
    fetcher: &dyn RemoteFetcher,
    succeeded: bool,
) -> (TaskEndReason, Option<TaskResult>, Vec<u8>) {
    if data.is_empty() {
        let reason = if succeeded {
            TaskEndReason::Success
        } else {
            TaskEndReason::OtherFailure("empty status payload".into())
        };
        return (reason, None, Vec::new());
    }
    let flag = data[0];
    if data.len() < 5 {
        return (
            TaskEndReason::OtherFailure("truncated status payload".into()),
            None,
            Vec::new(),
        );
    }
    let accum_len = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize;
    let accum_updates = data.get(5..5 + accum_len).unwrap_or(&[]).to_vec();
    let payload = data.get(5 + accum_len..).unwrap_or(&[]);

    if !succeeded {
        let message = String::from_utf8_lossy(payload).into_owned();
        return (TaskEndReason::OtherFailure(message), None, accum_updates);
    }

    match stratum_core::resolve_result(flag, payload, decoder, fetcher).await {
        Ok(result) => (TaskEndReason::Success, Some(result), accum_updates),
        Err(e) => (TaskEndReason::OtherFailure(e.to_string()), None, accum_updates),
    }
}

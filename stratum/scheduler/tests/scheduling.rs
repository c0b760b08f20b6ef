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

//! End-to-end seed scenarios, exercised against the in-memory `Dataset`/
//! `Broker` test doubles instead of a real cluster.

use std::sync::Arc;
use std::time::Duration;

use stratum_core::{
    CompletionEvent, ExecutorInfo, RemoteFetcher, ResultDecoder, SchedulerConfig, ShuffleDependency,
    Task, TaskResult, TaskSerializer,
};
use stratum_scheduler::test_support::{ScriptedBroker, VecDataset, VecTaskRunner};
use stratum_scheduler::{ClusterScheduler, DagScheduler, JobEvent, SchedulerContext};
use tokio::sync::mpsc;

/// Decodes a fabricated result payload back into a `TaskResult`. Since the
/// real task body is out of scope for the scheduler, the test harness
/// encodes which variant a status update carries with a one-byte prefix:
/// `0` for a `ResultTask`'s opaque value, `1` followed by a hostname for a
/// `ShuffleMapTask`'s output location.
struct NoopCodec;

impl NoopCodec {
    fn decode(bytes: &[u8]) -> TaskResult {
        if let Some((&1, host)) = bytes.split_first() {
            return TaskResult::MapOutputLocation(String::from_utf8_lossy(host).into_owned());
        }
        TaskResult::Value(Arc::new(0i64))
    }
}

impl ResultDecoder for NoopCodec {
    fn decode_fast(&self, bytes: &[u8]) -> stratum_core::Result<TaskResult> {
        Ok(Self::decode(bytes))
    }
    fn decode_generic(&self, bytes: &[u8]) -> stratum_core::Result<TaskResult> {
        Ok(Self::decode(bytes))
    }
}

impl TaskSerializer for NoopCodec {
    fn serialize(&self, _task: &Task) -> stratum_core::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

#[async_trait::async_trait]
impl RemoteFetcher for NoopCodec {
    async fn fetch(&self, _url: &url::Url) -> stratum_core::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

fn fast_config() -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    config.poll_timeout = Duration::from_millis(5);
    config.resubmit_timeout = Duration::from_millis(20);
    config
}

struct Harness {
    dag: DagScheduler,
    cluster: Arc<ClusterScheduler>,
    broker: Arc<ScriptedBroker>,
    completions_rx: Option<mpsc::Receiver<CompletionEvent>>,
}

fn build_harness(config: SchedulerConfig) -> Harness {
    let context = SchedulerContext::in_memory(config);
    let (tx, rx) = mpsc::channel(64);
    let broker = ScriptedBroker::new();
    let codec = Arc::new(NoopCodec);
    let executor = ExecutorInfo {
        command: "executor".into(),
        mem: 64.0,
        data: Vec::new(),
    };
    let cluster = Arc::new(ClusterScheduler::new(
        context.config.clone(),
        broker.clone(),
        codec.clone(),
        codec.clone(),
        codec,
        executor,
        tx,
    ));
    broker.register(cluster.clone());
    let dag = DagScheduler::new(context, cluster.clone(), Arc::new(VecTaskRunner));
    Harness {
        dag,
        cluster,
        broker,
        completions_rx: Some(rx),
    }
}

/// Compressed, empty-accumulator, fast-codec status payload carrying a
/// `ResultTask`-shaped value.
fn success_payload() -> Vec<u8> {
    wire_payload(&[0u8])
}

/// Same wire shape, carrying a `ShuffleMapTask`-shaped output location.
fn map_output_payload(host: &str) -> Vec<u8> {
    let mut body = vec![1u8];
    body.extend_from_slice(host.as_bytes());
    wire_payload(&body)
}

fn wire_payload(body: &[u8]) -> Vec<u8> {
    let compressed = stratum_core::compress(body).unwrap();
    let mut payload = vec![0u8]; // flag = InlineFast
    payload.extend_from_slice(&0u32.to_le_bytes()); // accum_len = 0
    payload.extend_from_slice(&compressed);
    payload
}

async fn complete_all_launched(broker: &Arc<ScriptedBroker>) {
    for (_, tasks, _) in broker.launches() {
        for info in tasks {
            broker
                .deliver_status(stratum_core::StatusUpdate {
                    task_info_id: info.id,
                    state: stratum_core::TaskState::Finished,
                    data: Some(success_payload()),
                })
                .await;
        }
    }
}

/// Like [`complete_all_launched`], but task ids in `shuffle_task_ids`
/// complete as shuffle-map outputs instead of result values.
async fn complete_all_launched_as(broker: &Arc<ScriptedBroker>, shuffle_task_ids: &std::collections::HashSet<u64>) {
    for (_, tasks, _) in broker.launches() {
        for info in tasks {
            let Some((_, task_id, _)) = stratum_core::parse_task_info_id(&info.id) else {
                continue;
            };
            let payload = if shuffle_task_ids.contains(&task_id.0) {
                map_output_payload(&format!("host-{}", task_id.0))
            } else {
                success_payload()
            };
            broker
                .deliver_status(stratum_core::StatusUpdate {
                    task_info_id: info.id,
                    state: stratum_core::TaskState::Finished,
                    data: Some(payload),
                })
                .await;
        }
    }
}

fn an_offer(id: &str, host: &str, cpus: f64, mem: f64) -> stratum_core::Offer {
    let mut resources = std::collections::HashMap::new();
    resources.insert("cpus".to_string(), cpus);
    resources.insert("mem".to_string(), mem);
    stratum_core::Offer {
        offer_id: id.into(),
        slave_id: host.into(),
        hostname: host.into(),
        resources,
        attributes: std::collections::HashMap::new(),
    }
}

#[tokio::test]
async fn local_fast_path_skips_the_cluster_entirely() {
    let harness = build_harness(fast_config());
    let dataset: Arc<dyn stratum_core::Dataset> = Arc::new(VecDataset::new(1, vec![vec![1], vec![2]]));
    let (_tx, rx) = mpsc::channel(1);

    let mut events = harness
        .dag
        .run_job("job-local".into(), dataset, vec![0], true, rx)
        .await;

    match events.recv().await {
        Some(JobEvent::Result(0, TaskResult::Value(_))) => {}
        other => panic!("expected a local Result(0, ..), got {other:?}"),
    }
    assert!(!harness.cluster.has_active_jobs());
}

#[tokio::test]
async fn single_stage_result_completes_in_partition_order() {
    let mut harness = build_harness(fast_config());
    let dataset: Arc<dyn stratum_core::Dataset> =
        Arc::new(VecDataset::new(1, vec![vec![1], vec![2], vec![3]]));
    let completions_rx = harness.completions_rx.take().unwrap();

    let run = tokio::spawn({
        let dag = harness.dag;
        async move { dag.run_job("job-1".into(), dataset, vec![0, 1, 2], false, completions_rx).await }
    });

    // Give the driver a moment to submit the stage, then offer capacity for
    // all three tasks in one shot.
    tokio::time::sleep(Duration::from_millis(20)).await;
    harness
        .broker
        .deliver_offers(vec![an_offer("o1", "host-a", 8.0, 1024.0)])
        .await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Complete out of order: partition-owning tasks are launched in
    // ascending output-index order by `submit_missing_tasks`, so complete
    // the last-launched one first to exercise the out-of-order buffer.
    let launched = harness.broker.launches();
    let mut infos: Vec<_> = launched.into_iter().flat_map(|(_, tasks, _)| tasks).collect();
    infos.reverse();
    for info in infos {
        harness
            .broker
            .deliver_status(stratum_core::StatusUpdate {
                task_info_id: info.id,
                state: stratum_core::TaskState::Finished,
                data: Some(success_payload()),
            })
            .await;
    }

    let mut rx = run.await.unwrap();
    let mut seen = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            JobEvent::Result(p, _) => seen.push(p),
            JobEvent::Failed(e) => panic!("unexpected failure: {e}"),
        }
    }
    assert_eq!(seen, vec![0, 1, 2], "keep_order=true must yield partitions in order");
}

#[tokio::test]
async fn shuffle_pipeline_runs_producer_before_consumer() {
    let mut harness = build_harness(fast_config());
    let map_side: Arc<dyn stratum_core::Dataset> = Arc::new(VecDataset::new(1, vec![vec![1], vec![2]]));
    let shuffle_dep = ShuffleDependency {
        shuffle_id: 1,
        rdd: map_side,
        num_output_partitions: 2,
    };
    let reduced: Arc<dyn stratum_core::Dataset> =
        Arc::new(VecDataset::new(2, vec![vec![]]).with_shuffle_parent(shuffle_dep));
    let completions_rx = harness.completions_rx.take().unwrap();

    let run = tokio::spawn({
        let dag = harness.dag;
        async move { dag.run_job("job-2".into(), reduced, vec![0], false, completions_rx).await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    // First offer should only ever produce shuffle-map tasks, since the
    // result stage has a missing (not yet available) parent.
    harness
        .broker
        .deliver_offers(vec![an_offer("o1", "host-a", 8.0, 1024.0)])
        .await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    let first_pass = harness.broker.launches();
    assert!(
        first_pass.iter().all(|(_, tasks, _)| tasks.len() <= 2),
        "only the shuffle-map stage's tasks should be launchable before its output is available"
    );

    let shuffle_task_ids: std::collections::HashSet<u64> = [0, 1].into_iter().collect();
    complete_all_launched_as(&harness.broker, &shuffle_task_ids).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Second offer should now be able to place the result task, unblocked
    // once the shuffle-map stage finished.
    harness
        .broker
        .deliver_offers(vec![an_offer("o2", "host-a", 8.0, 1024.0)])
        .await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    complete_all_launched(&harness.broker).await;

    let mut rx = run.await.unwrap();
    match rx.recv().await {
        Some(JobEvent::Result(0, _)) => {}
        other => panic!("expected the reduced result to complete, got {other:?}"),
    }
}

#[tokio::test]
async fn offer_with_insufficient_memory_launches_nothing() {
    let harness = build_harness(fast_config());
    let dataset: Arc<dyn stratum_core::Dataset> = Arc::new(VecDataset::new(1, vec![vec![1]]));
    let heavy_task = Task {
        id: stratum_core::TaskId(0),
        stage_id: stratum_core::StageId(0),
        kind: stratum_core::TaskKind::Result {
            dataset,
            partition: 0,
            output_index: 0,
        },
        preferred_locations: Vec::new(),
        cpus: 1.0,
        mem: 900.0,
        tried: 0,
    };
    harness
        .cluster
        .submit("job-3".into(), stratum_core::StageId(0), vec![heavy_task]);
    harness
        .broker
        .deliver_offers(vec![an_offer("o1", "host-a", 4.0, 10.0)])
        .await;
    let launches = harness.broker.launches();
    assert!(launches.iter().all(|(_, tasks, _)| tasks.is_empty()));
}

#[tokio::test]
async fn cluster_reports_idle_once_every_stage_is_removed() {
    let harness = build_harness(fast_config());
    assert!(!harness.cluster.has_active_jobs());
    harness
        .cluster
        .submit("job-4".into(), stratum_core::StageId(0), vec![]);
    assert!(harness.cluster.has_active_jobs());
    harness.cluster.remove(stratum_core::StageId(0));
    assert!(!harness.cluster.has_active_jobs());
}

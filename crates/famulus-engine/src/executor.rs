//! Staged pipeline execution.
//!
//! A run wires a job's active actions into a chain of stages connected by
//! bounded channels. Every stage pulls items from its predecessor and
//! pushes results downstream. Parallel stages run one worker per
//! configured thread, single threaded stages exactly one worker, which
//! also preserves arrival order. When all workers of a stage are done the
//! stage's `complete` hook runs once and may flush buffered items before
//! the downstream channel closes.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use famulus_actions::{Action, ActionRegistry, ExecutionContext};
use famulus_core::execution::CANCELLED_CAUSE;
use famulus_core::{ConcurrencyPolicy, ConfigError, DataItem, Job};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// One action instance wired into a run.
struct Stage {
    action_id: String,
    kind: &'static str,
    workers: usize,
    action: Arc<dyn Action>,
}

/// A job's active actions, instantiated for a single run.
pub struct Pipeline {
    stages: Vec<Stage>,
    channel_capacity: usize,
}

impl Pipeline {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// Why a run stopped short of finishing.
#[derive(Debug, Clone)]
pub struct RunError {
    pub cause: String,
    pub failed_action: Option<String>,
}

/// Build the pipeline for one run. Fresh action instances are created
/// every time, so per-run state like sort buffers and skip counters
/// starts out empty.
pub fn assemble(job: &Job, registry: &ActionRegistry) -> Result<Pipeline, ConfigError> {
    let mut stages = Vec::new();
    for spec in job.active_actions() {
        let action: Arc<dyn Action> = Arc::from(registry.build(spec)?);
        let workers = match action.concurrency() {
            ConcurrencyPolicy::Parallel => job.num_threads.max(1) as usize,
            ConcurrencyPolicy::SingleThreaded => 1,
        };
        stages.push(Stage {
            action_id: spec.id.clone(),
            kind: spec.params.kind(),
            workers,
            action,
        });
    }
    Ok(Pipeline {
        stages,
        channel_capacity: (job.num_threads as usize * 2).max(2),
    })
}

/// Shared countdown capping how many items enter a simulated run. Seeds
/// and the emissions of the first stage draw from the same budget.
#[derive(Debug)]
pub struct SimulationGate {
    remaining: AtomicI64,
}

impl SimulationGate {
    pub fn new(limit: u32) -> Self {
        Self {
            remaining: AtomicI64::new(i64::from(limit)),
        }
    }

    /// Take one admission. Excess calls keep decrementing but never wrap
    /// back above zero in any realistic run.
    pub fn try_admit(&self) -> bool {
        self.remaining.fetch_sub(1, Ordering::SeqCst) > 0
    }
}

/// Per-stage output snapshot of one run, used for simulation reports.
pub struct SnapshotCollector {
    seeds: Mutex<Vec<DataItem>>,
    stages: Vec<StageBucket>,
}

struct StageBucket {
    action_id: String,
    kind: String,
    items: Mutex<Vec<DataItem>>,
}

/// What one stage emitted during a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSnapshot {
    pub action_id: String,
    pub kind: String,
    pub items: Vec<DataItem>,
}

impl SnapshotCollector {
    pub fn for_pipeline(pipeline: &Pipeline) -> Self {
        Self {
            seeds: Mutex::new(Vec::new()),
            stages: pipeline
                .stages
                .iter()
                .map(|stage| StageBucket {
                    action_id: stage.action_id.clone(),
                    kind: stage.kind.to_string(),
                    items: Mutex::new(Vec::new()),
                })
                .collect(),
        }
    }

    fn record_seed(&self, item: &DataItem) {
        self.seeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item.clone());
    }

    fn record(&self, stage: usize, item: &DataItem) {
        if let Some(bucket) = self.stages.get(stage) {
            bucket
                .items
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(item.clone());
        }
    }

    pub fn seed_items(&self) -> Vec<DataItem> {
        self.seeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stage_snapshots(&self) -> Vec<StageSnapshot> {
        self.stages
            .iter()
            .map(|bucket| StageSnapshot {
                action_id: bucket.action_id.clone(),
                kind: bucket.kind.clone(),
                items: bucket
                    .items
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone(),
            })
            .collect()
    }
}

/// Optional hooks for one run.
#[derive(Default)]
pub struct RunOptions {
    /// Admission budget for simulated runs.
    pub gate: Option<Arc<SimulationGate>>,
    /// Captures stage outputs while the run executes.
    pub collector: Option<Arc<SnapshotCollector>>,
    /// Called once per stage when its first item arrives.
    pub on_stage: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

/// Drive every seed item through the pipeline and wait for the run to
/// drain. The first action error cancels intake everywhere and becomes
/// the run's result; a cancellation without an error reports the
/// cancelled cause.
pub async fn run(
    pipeline: &Pipeline,
    seeds: Vec<DataItem>,
    ctx: &ExecutionContext,
    options: RunOptions,
) -> Result<(), RunError> {
    if pipeline.stages.is_empty() {
        for seed in &seeds {
            if let Some(gate) = &options.gate {
                if !gate.try_admit() {
                    break;
                }
            }
            if let Some(collector) = &options.collector {
                collector.record_seed(seed);
            }
        }
        return Ok(());
    }

    let capacity = pipeline.channel_capacity;
    let error: Arc<Mutex<Option<RunError>>> = Arc::new(Mutex::new(None));
    let mut supervisors = JoinSet::new();

    let (seed_tx, first_rx) = mpsc::channel::<DataItem>(capacity);
    {
        let ctx = ctx.clone();
        let gate = options.gate.clone();
        let collector = options.collector.clone();
        supervisors.spawn(async move {
            for seed in seeds {
                if ctx.is_cancelled() {
                    break;
                }
                if let Some(gate) = &gate {
                    if !gate.try_admit() {
                        break;
                    }
                }
                if let Some(collector) = &collector {
                    collector.record_seed(&seed);
                }
                if seed_tx.send(seed).await.is_err() {
                    break;
                }
            }
        });
    }

    let mut input_rx = first_rx;
    for (index, stage) in pipeline.stages.iter().enumerate() {
        let (next_tx, next_rx) = mpsc::channel::<DataItem>(capacity);
        let shared_rx = Arc::new(tokio::sync::Mutex::new(input_rx));
        let action = stage.action.clone();
        let action_id = stage.action_id.clone();
        let worker_count = stage.workers;
        let ctx = ctx.clone();
        let error = error.clone();
        // only first-stage output draws from the admission budget
        let gate = if index == 0 { options.gate.clone() } else { None };
        let collector = options.collector.clone();
        let on_stage = options.on_stage.clone();

        supervisors.spawn(async move {
            let entered = Arc::new(AtomicBool::new(false));
            let mut workers = JoinSet::new();
            for _ in 0..worker_count {
                let shared_rx = shared_rx.clone();
                let tx = next_tx.clone();
                let action = action.clone();
                let action_id = action_id.clone();
                let ctx = ctx.clone();
                let error = error.clone();
                let gate = gate.clone();
                let collector = collector.clone();
                let on_stage = on_stage.clone();
                let entered = entered.clone();
                workers.spawn(async move {
                    loop {
                        // holding the lock across recv keeps intake serial
                        let item = { shared_rx.lock().await.recv().await };
                        let Some(item) = item else { break };
                        if ctx.is_cancelled() {
                            break;
                        }
                        if !entered.swap(true, Ordering::SeqCst) {
                            if let Some(on_stage) = &on_stage {
                                on_stage(&action_id);
                            }
                        }
                        match action.process(item, &ctx).await {
                            Ok(outputs) => {
                                for output in outputs {
                                    if let Some(gate) = &gate {
                                        if !gate.try_admit() {
                                            continue;
                                        }
                                    }
                                    if let Some(collector) = &collector {
                                        collector.record(index, &output);
                                    }
                                    if tx.send(output).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                record_error(&error, e.to_string(), Some(action_id.clone()));
                                ctx.cancel.cancel();
                                break;
                            }
                        }
                    }
                });
            }

            while let Some(joined) = workers.join_next().await {
                if let Err(join_error) = joined {
                    record_error(
                        &error,
                        format!("stage worker panicked: {join_error}"),
                        Some(action_id.clone()),
                    );
                    ctx.cancel.cancel();
                }
            }

            // flush buffered items once the stage has seen all input
            let failed = error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some();
            if !failed && !ctx.is_cancelled() {
                match action.complete(&ctx).await {
                    Ok(flushed) => {
                        for output in flushed {
                            if let Some(gate) = &gate {
                                if !gate.try_admit() {
                                    continue;
                                }
                            }
                            if let Some(collector) = &collector {
                                collector.record(index, &output);
                            }
                            if next_tx.send(output).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        record_error(&error, e.to_string(), Some(action_id.clone()));
                        ctx.cancel.cancel();
                    }
                }
            }
            // next_tx drops here, closing the downstream channel
        });

        input_rx = next_rx;
    }

    {
        let mut sink_rx = input_rx;
        supervisors.spawn(async move { while sink_rx.recv().await.is_some() {} });
    }

    while let Some(joined) = supervisors.join_next().await {
        if let Err(join_error) = joined {
            record_error(&error, format!("run task panicked: {join_error}"), None);
        }
    }

    let failure = error
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(failure) = failure {
        return Err(failure);
    }
    if ctx.is_cancelled() {
        return Err(RunError {
            cause: CANCELLED_CAUSE.to_string(),
            failed_action: None,
        });
    }
    Ok(())
}

fn record_error(slot: &Mutex<Option<RunError>>, cause: String, failed_action: Option<String>) {
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_none() {
        *slot = Some(RunError {
            cause,
            failed_action,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use famulus_connectors::ConnectorRegistry;
    use famulus_core::connector::LocalFileParams;
    use famulus_core::{ConnectorSpec, JobStateStore, TemplateEngine};
    use serde_json::json;
    use uuid::Uuid;

    fn job(num_threads: u32, actions: serde_json::Value) -> Job {
        serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "name": "pipeline-test",
            "trigger": { "type": "manual" },
            "numThreads": num_threads,
            "actions": actions,
        }))
        .unwrap()
    }

    fn context(simulation: bool, connectors: Arc<ConnectorRegistry>) -> ExecutionContext {
        ExecutionContext::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "pipeline-test",
            simulation,
            Arc::new(TemplateEngine::new()),
            connectors,
            Arc::new(JobStateStore::new()),
        )
    }

    async fn file_registry(root: &std::path::Path) -> Arc<ConnectorRegistry> {
        let registry = ConnectorRegistry::new();
        registry
            .register(
                "disk",
                ConnectorSpec::LocalFile(LocalFileParams {
                    root: root.to_string_lossy().into_owned(),
                }),
            )
            .await;
        Arc::new(registry)
    }

    fn seeds(ctx: &ExecutionContext, count: usize) -> Vec<DataItem> {
        (0..count)
            .map(|_| DataItem::empty(ctx.job_id, ctx.simulation))
            .collect()
    }

    #[tokio::test]
    async fn test_single_threaded_stage_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.txt", "a.txt", "b.txt"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        let registry = file_registry(dir.path()).await;
        let job = job(
            4,
            json!([
                { "id": "list", "type": "listFiles", "connector": "disk", "directory": "" }
            ]),
        );
        let pipeline = assemble(&job, &ActionRegistry::default()).unwrap();
        let collector = Arc::new(SnapshotCollector::for_pipeline(&pipeline));
        let ctx = context(false, registry);

        let result = run(
            &pipeline,
            seeds(&ctx, 1),
            &ctx,
            RunOptions {
                collector: Some(collector.clone()),
                ..Default::default()
            },
        )
        .await;
        assert!(result.is_ok());

        let snapshots = collector.stage_snapshots();
        let names: Vec<String> = snapshots[0]
            .items
            .iter()
            .map(|item| item.data["filename"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn test_error_reports_failing_action() {
        let dir = tempfile::tempdir().unwrap();
        let registry = file_registry(dir.path()).await;
        let job = job(
            1,
            json!([
                { "id": "list", "type": "listFiles", "connector": "disk", "directory": "missing" }
            ]),
        );
        let pipeline = assemble(&job, &ActionRegistry::default()).unwrap();
        let ctx = context(false, registry);

        let error = run(&pipeline, seeds(&ctx, 1), &ctx, RunOptions::default())
            .await
            .unwrap_err();
        assert_eq!(error.failed_action.as_deref(), Some("list"));
        assert!(!error.cause.is_empty());
    }

    #[tokio::test]
    async fn test_gate_caps_first_stage_output() {
        let registry = Arc::new(ConnectorRegistry::new());
        let job = job(
            1,
            json!([
                { "id": "dup", "type": "duplicate", "amount": 50 },
                { "id": "log", "type": "log" }
            ]),
        );
        let pipeline = assemble(&job, &ActionRegistry::default()).unwrap();
        let collector = Arc::new(SnapshotCollector::for_pipeline(&pipeline));
        let gate = Arc::new(SimulationGate::new(25));
        let ctx = context(true, registry);

        run(
            &pipeline,
            seeds(&ctx, 1),
            &ctx,
            RunOptions {
                gate: Some(gate),
                collector: Some(collector.clone()),
                on_stage: None,
            },
        )
        .await
        .unwrap();

        let snapshots = collector.stage_snapshots();
        assert_eq!(collector.seed_items().len(), 1);
        // one admission went to the seed, the rest to duplicated items
        assert_eq!(snapshots[0].items.len(), 24);
        assert_eq!(snapshots[1].items.len(), 24);
    }

    #[tokio::test]
    async fn test_complete_flushes_buffered_items_downstream() {
        let registry = Arc::new(ConnectorRegistry::new());
        let job = job(
            2,
            json!([
                { "id": "stamp", "type": "addData", "json": { "seen": "{{ data.when }}" } },
                {
                    "id": "sort",
                    "type": "sortTimestamp",
                    "input": "{{ data.when }}",
                    "pattern": "\\d{4}-\\d{2}-\\d{2}",
                    "timestampFormat": "%Y-%m-%d"
                },
                { "id": "log", "type": "log" }
            ]),
        );
        let pipeline = assemble(&job, &ActionRegistry::default()).unwrap();
        let collector = Arc::new(SnapshotCollector::for_pipeline(&pipeline));
        let ctx = context(false, registry.clone());

        let seeds: Vec<DataItem> = ["2024-05-20", "2024-05-01", "2024-05-11"]
            .iter()
            .map(|when| DataItem::new(ctx.job_id, false, json!({ "when": when })))
            .collect();
        run(
            &pipeline,
            seeds,
            &ctx,
            RunOptions {
                collector: Some(collector.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // the log stage only sees items after the sort flush, in order
        let snapshots = collector.stage_snapshots();
        let order: Vec<String> = snapshots[2]
            .items
            .iter()
            .map(|item| item.data["when"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(order, vec!["2024-05-01", "2024-05-11", "2024-05-20"]);
    }

    #[tokio::test]
    async fn test_cancel_stops_at_item_boundary() {
        let registry = Arc::new(ConnectorRegistry::new());
        let job = job(
            1,
            json!([
                { "id": "dup", "type": "duplicate", "amount": 20 },
                { "id": "nap", "type": "pause", "milliseconds": 150 }
            ]),
        );
        let pipeline = assemble(&job, &ActionRegistry::default()).unwrap();
        let ctx = context(false, registry);
        let cancel = ctx.cancel.clone();

        let flag = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            flag.cancel();
        });

        let started = std::time::Instant::now();
        let error = run(&pipeline, seeds(&ctx, 1), &ctx, RunOptions::default())
            .await
            .unwrap_err();
        assert_eq!(error.cause, CANCELLED_CAUSE);
        assert!(error.failed_action.is_none());
        // twenty 150ms pauses would take three seconds uncancelled
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_empty_pipeline_completes() {
        let registry = Arc::new(ConnectorRegistry::new());
        let job = job(1, json!([]));
        let pipeline = assemble(&job, &ActionRegistry::default()).unwrap();
        assert!(pipeline.is_empty());
        let ctx = context(false, registry);
        assert!(run(&pipeline, seeds(&ctx, 3), &ctx, RunOptions::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_inactive_actions_are_skipped() {
        let registry = Arc::new(ConnectorRegistry::new());
        let job = job(
            1,
            json!([
                { "id": "dup", "type": "duplicate", "amount": 3 },
                { "id": "off", "type": "duplicate", "amount": 100, "active": false },
                { "id": "log", "type": "log" }
            ]),
        );
        let pipeline = assemble(&job, &ActionRegistry::default()).unwrap();
        assert_eq!(pipeline.stage_count(), 2);
        let collector = Arc::new(SnapshotCollector::for_pipeline(&pipeline));
        let ctx = context(false, registry);

        run(
            &pipeline,
            seeds(&ctx, 1),
            &ctx,
            RunOptions {
                collector: Some(collector.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(collector.stage_snapshots()[1].items.len(), 3);
    }
}

//! Simulated runs.
//!
//! A simulation drives a job's pipeline with the real action code but the
//! simulation flag set, so actions with external effects log what they
//! would have done instead of doing it. Admission is capped by the job's
//! simulation limit, the whole run is bounded by a timeout, and nothing
//! is recorded in the execution history or charged against a slot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use famulus_actions::ExecutionContext;
use famulus_core::{DataItem, Job, TriggerSpec};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::engine::{EngineError, EngineInner};
use crate::executor::{self, RunError, RunOptions, SimulationGate, SnapshotCollector, StageSnapshot};

/// Outcome of one simulated run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub job_id: Uuid,
    /// Items that entered the pipeline.
    pub seed_items: Vec<DataItem>,
    /// What each stage emitted, in pipeline order.
    pub stages: Vec<StageSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Holds the per-job single flight slot until the simulation ends.
struct SingleFlight<'a> {
    inner: &'a EngineInner,
    job_id: Uuid,
}

impl<'a> SingleFlight<'a> {
    fn acquire(inner: &'a EngineInner, job_id: Uuid) -> Result<Self, EngineError> {
        let mut active = inner
            .simulations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !active.insert(job_id) {
            return Err(EngineError::SimulationRunning(job_id));
        }
        Ok(Self { inner, job_id })
    }
}

impl Drop for SingleFlight<'_> {
    fn drop(&mut self) {
        self.inner
            .simulations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&self.job_id);
    }
}

pub(crate) async fn run_simulation(
    inner: &Arc<EngineInner>,
    job_id: Uuid,
    seed: Option<Value>,
) -> Result<SimulationReport, EngineError> {
    let Some(job) = inner.job(job_id).await else {
        return Err(EngineError::UnknownJob(job_id));
    };
    let _flight = SingleFlight::acquire(inner, job_id)?;

    let seeds = match (&job.trigger, seed) {
        (_, Some(data)) => vec![DataItem::new(job.id, true, data)],
        (TriggerSpec::Message { connector_ref, source }, None) => {
            fetch_message_seeds(inner, &job, connector_ref, source).await?
        }
        (_, None) => vec![DataItem::empty(job.id, true)],
    };

    let pipeline = executor::assemble(&job, &inner.actions)?;
    let collector = Arc::new(SnapshotCollector::for_pipeline(&pipeline));
    let gate = Arc::new(SimulationGate::new(job.simulation_limit));
    // the job's live store is shared, so persisted-value filters behave
    // exactly like they would in a real run
    let state = inner.state_store(job.id).await;
    let ctx = ExecutionContext::new(
        job.id,
        Uuid::new_v4(),
        job.name.clone(),
        true,
        inner.template.clone(),
        inner.connectors.clone(),
        state,
    );
    let cancel = ctx.cancel.clone();

    let started = Instant::now();
    let mut run_task = tokio::spawn({
        let ctx = ctx.clone();
        let gate = gate.clone();
        let collector = collector.clone();
        async move {
            executor::run(
                &pipeline,
                seeds,
                &ctx,
                RunOptions {
                    gate: Some(gate),
                    collector: Some(collector),
                    on_stage: None,
                },
            )
            .await
        }
    });

    let timeout = Duration::from_secs(inner.config.simulation_timeout_secs);
    let error = match tokio::time::timeout(timeout, &mut run_task).await {
        Ok(Ok(Ok(()))) => None,
        Ok(Ok(Err(run_error))) => Some(describe(run_error)),
        Ok(Err(join_error)) => Some(format!("simulation task panicked: {join_error}")),
        Err(_) => {
            cancel.cancel();
            // give the pipeline a moment to stop at an item boundary
            if tokio::time::timeout(Duration::from_secs(2), &mut run_task)
                .await
                .is_err()
            {
                run_task.abort();
            }
            Some(format!(
                "simulation timed out after {} seconds",
                timeout.as_secs()
            ))
        }
    };

    if let Some(error) = &error {
        tracing::warn!(job = %job.name, error = %error, "simulation ended with error");
    }
    Ok(SimulationReport {
        job_id: job.id,
        seed_items: collector.seed_items(),
        stages: collector.stage_snapshots(),
        error,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

/// Pull pending messages so a message triggered job can be simulated with
/// real payloads. The messages are acknowledged like in a live run, so a
/// simulation consumes them for good. A single empty item stands in when
/// nothing is waiting.
async fn fetch_message_seeds(
    inner: &Arc<EngineInner>,
    job: &Job,
    connector_ref: &str,
    source: &str,
) -> Result<Vec<DataItem>, EngineError> {
    let connector = inner.connectors.resolve_nats(connector_ref).await?;
    let handle = connector
        .subscribe(source, &format!("famulus-sim-{}", job.id))
        .await?;
    let messages = handle
        .fetch(job.simulation_limit as usize, Duration::from_secs(2))
        .await?;
    let mut seeds = Vec::new();
    for message in messages {
        seeds.push(DataItem::new(job.id, true, message.payload.clone()));
        message.ack().await?;
    }
    if seeds.is_empty() {
        seeds.push(DataItem::empty(job.id, true));
    }
    Ok(seeds)
}

fn describe(error: RunError) -> String {
    match error.failed_action {
        Some(action) => format!("{} (action '{action}')", error.cause),
        None => error.cause,
    }
}

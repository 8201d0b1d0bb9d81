//! Firing, queue promotion and trigger tasks.
//!
//! Every run enters through [`fire`]: it lands in the FIFO waiting queue
//! and is promoted to a slot as soon as one is free and no other run of
//! the same job is active. Cron and message triggered jobs get a
//! background task each that feeds the same path.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use famulus_actions::ExecutionContext;
use famulus_connectors::{ConnectorError, InboundMessage, MessageSource};
use famulus_core::{DataItem, ExecutionState, Job, JobExecution, TriggerSpec};
use serde_json::Value;
use tokio::sync::{oneshot, OwnedSemaphorePermit};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::cron::CronSchedule;
use crate::engine::{EngineError, EngineInner, RunHandle};
use crate::executor::{self, RunOptions};

/// A run waiting for a free execution slot.
pub(crate) struct QueuedRun {
    pub execution_id: Uuid,
    pub job_id: Uuid,
    pub seeds: Vec<DataItem>,
    /// Signalled with the final state. Message triggers use it to decide
    /// between ack and nack.
    pub notify: Option<oneshot::Sender<ExecutionState>>,
}

pub(crate) enum FireOutcome {
    Queued(Uuid),
    /// A run of the job was already waiting; its id is returned instead.
    Deduplicated(Uuid),
}

/// Queue one run of a job.
///
/// Refused while a job that is not fault tolerant has an unresolved
/// failure as its latest ended run. At most one waiting run per job is
/// kept; additional fires collapse onto it.
pub(crate) async fn fire(
    inner: &Arc<EngineInner>,
    job_id: Uuid,
    data: Option<Value>,
    event: Option<String>,
    notify: Option<oneshot::Sender<ExecutionState>>,
) -> Result<FireOutcome, EngineError> {
    let Some(job) = inner.job(job_id).await else {
        return Err(EngineError::UnknownJob(job_id));
    };

    if !job.fault_tolerant && inner.history.latest_terminal(job_id) == Some(ExecutionState::Failed)
    {
        return Err(EngineError::FaultLockout(job_id));
    }

    let execution_id = {
        // the queue lock also serializes the dedupe check
        let mut queue = inner.queue.lock().await;
        if let Some(waiting_id) = inner.history.waiting_execution(job_id) {
            tracing::debug!(job = %job.name, execution = %waiting_id, "fire collapsed onto queued run");
            return Ok(FireOutcome::Deduplicated(waiting_id));
        }
        let mut execution = JobExecution::waiting(job_id);
        if let Some(event) = event {
            execution.events.push(event);
        }
        let execution_id = execution.id;
        inner.history.append(execution);

        let seed = match data {
            Some(data) => DataItem::new(job_id, false, data),
            None => DataItem::empty(job_id, false),
        };
        queue.push_back(QueuedRun {
            execution_id,
            job_id,
            seeds: vec![seed],
            notify,
        });
        execution_id
    };
    tracing::debug!(job = %job.name, execution = %execution_id, "run queued");
    promote_waiting(inner).await;
    Ok(FireOutcome::Queued(execution_id))
}

/// Move waiting runs into free slots. Runs whose job is already running
/// are passed over without losing their queue position.
///
/// Returns a boxed future: `start_run` spawns a task that awaits this
/// function again, and the boxing breaks the opaque-future cycle that
/// would otherwise make the spawned task's `Send`-ness unprovable.
pub(crate) fn promote_waiting<'a>(
    inner: &'a Arc<EngineInner>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        loop {
            let permit = match inner.slots.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let next = {
                let mut queue = inner.queue.lock().await;
                let running = inner.running.read().await;
                match queue
                    .iter()
                    .position(|run| !running.contains_key(&run.job_id))
                {
                    Some(index) => queue.remove(index),
                    None => None,
                }
            };
            let Some(run) = next else {
                drop(permit);
                return;
            };
            start_run(inner.clone(), run, permit).await;
        }
    })
}

/// Turn a queued run into a running pipeline task. The permit travels
/// into the task and frees its slot when the run ends.
async fn start_run(inner: Arc<EngineInner>, run: QueuedRun, permit: OwnedSemaphorePermit) {
    let Some(job) = inner.job(run.job_id).await else {
        inner
            .history
            .update(run.execution_id, |e| e.mark_failed("job definition removed", None));
        if let Some(notify) = run.notify {
            let _ = notify.send(ExecutionState::Failed);
        }
        drop(permit);
        return;
    };

    let pipeline = match executor::assemble(&job, &inner.actions) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            let cause = e.to_string();
            inner
                .history
                .update(run.execution_id, move |exec| exec.mark_failed(cause, None));
            if let Some(notify) = run.notify {
                let _ = notify.send(ExecutionState::Failed);
            }
            drop(permit);
            return;
        }
    };

    let state = inner.state_store(job.id).await;
    let ctx = ExecutionContext::new(
        job.id,
        run.execution_id,
        job.name.clone(),
        false,
        inner.template.clone(),
        inner.connectors.clone(),
        state,
    );

    inner
        .history
        .update(run.execution_id, JobExecution::mark_running);
    inner.running.write().await.insert(
        run.job_id,
        RunHandle {
            execution_id: run.execution_id,
            cancel: ctx.cancel.clone(),
        },
    );
    tracing::info!(job = %job.name, execution = %run.execution_id, "run started");

    tokio::spawn(async move {
        let _permit = permit;
        let on_stage = {
            let inner = inner.clone();
            let execution_id = run.execution_id;
            Arc::new(move |action_id: &str| {
                let action_id = action_id.to_string();
                inner
                    .history
                    .update(execution_id, move |e| e.current_action = Some(action_id));
            }) as Arc<dyn Fn(&str) + Send + Sync>
        };

        let result = executor::run(
            &pipeline,
            run.seeds,
            &ctx,
            RunOptions {
                gate: None,
                collector: None,
                on_stage: Some(on_stage),
            },
        )
        .await;

        let final_state = match result {
            Ok(()) => {
                inner
                    .history
                    .update(run.execution_id, |e| e.mark_finished());
                tracing::info!(job = %job.name, execution = %run.execution_id, "run finished");
                ExecutionState::Finished
            }
            Err(error) => {
                tracing::warn!(
                    job = %job.name,
                    execution = %run.execution_id,
                    cause = %error.cause,
                    "run failed"
                );
                let cause = error.cause;
                let failed_action = error.failed_action;
                inner
                    .history
                    .update(run.execution_id, move |e| e.mark_failed(cause, failed_action));
                ExecutionState::Failed
            }
        };

        if final_state == ExecutionState::Finished && job.fault_tolerant {
            let resolved = inner
                .history
                .resolve_preceding_failures(job.id, run.execution_id);
            if resolved > 0 {
                tracing::info!(job = %job.name, resolved, "resolved earlier failures");
            }
        }
        inner.history.evict(job.id, job.history_limit as usize);

        if let Some(notify) = run.notify {
            let _ = notify.send(final_state);
        }
        inner.running.write().await.remove(&run.job_id);
        // free the slot before scanning for the next waiting run
        drop(_permit);
        promote_waiting(&inner).await;
    });
}

/// Periodically retries promotion, so runs parked behind a busy job do
/// not depend on another run ending to get their turn.
pub(crate) fn spawn_queue_poller(inner: Arc<EngineInner>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shutdown = inner.shutdown.subscribe();
        eprintln!("DBG poller: subscribed, value = {}", *shutdown.borrow());
        let period = Duration::from_millis(inner.config.queue_poll_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => { promote_waiting(&inner).await; },
                _ = shutdown.changed() => { eprintln!("DBG poller: shutdown"); return; },
            }
        }
    })
}

/// Start the background task driving a job's trigger, if it has one.
pub(crate) fn spawn_trigger(inner: &Arc<EngineInner>, job: &Job) -> Option<JoinHandle<()>> {
    match &job.trigger {
        TriggerSpec::Cron { expression } => {
            let schedule = CronSchedule::parse(expression).ok()?;
            Some(spawn_cron_loop(
                inner.clone(),
                job.id,
                job.name.clone(),
                schedule,
            ))
        }
        TriggerSpec::Message {
            connector_ref,
            source,
        } => Some(spawn_message_loop(
            inner.clone(),
            job.id,
            job.name.clone(),
            connector_ref.clone(),
            source.clone(),
        )),
        TriggerSpec::Manual | TriggerSpec::WebHook { .. } => None,
    }
}

fn spawn_cron_loop(
    inner: Arc<EngineInner>,
    job_id: Uuid,
    job_name: String,
    schedule: CronSchedule,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shutdown = inner.shutdown.subscribe();
        tracing::debug!(job = %job_name, schedule = %schedule.expression(), "cron trigger armed");
        loop {
            let now = Utc::now();
            let Some(next) = schedule.next_after(now) else {
                tracing::warn!(job = %job_name, "cron schedule has no future fire time");
                return;
            };
            let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    match fire(&inner, job_id, None, None, None).await {
                        Ok(FireOutcome::Queued(execution)) => {
                            tracing::debug!(job = %job_name, execution = %execution, "cron fire queued");
                        }
                        Ok(FireOutcome::Deduplicated(_)) => {}
                        Err(e) => tracing::warn!(job = %job_name, error = %e, "cron fire refused"),
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    })
}

fn spawn_message_loop(
    inner: Arc<EngineInner>,
    job_id: Uuid,
    job_name: String,
    connector_ref: String,
    source: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shutdown = inner.shutdown.subscribe();
        let initial_delay = Duration::from_millis(500);
        let max_delay = Duration::from_secs(10);
        let mut delay = initial_delay;
        loop {
            let handle = match connect(&inner, &connector_ref, &source, job_id).await {
                Ok(handle) => {
                    tracing::info!(job = %job_name, source = %source, "message trigger listening");
                    delay = initial_delay;
                    handle
                }
                Err(e) => {
                    tracing::warn!(job = %job_name, error = %e, "message trigger connect failed");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            delay = (delay * 2).min(max_delay);
                            continue;
                        }
                        _ = shutdown.changed() => return,
                    }
                }
            };
            loop {
                let wait = Duration::from_millis(inner.config.message_wait_ms);
                let fetched = tokio::select! {
                    result = handle.fetch(inner.config.message_batch, wait) => result,
                    _ = shutdown.changed() => return,
                };
                match fetched {
                    Ok(messages) => {
                        for message in messages {
                            handle_message(&inner, job_id, &job_name, &source, message).await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(job = %job_name, error = %e, "message fetch failed, reconnecting");
                        break;
                    }
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => delay = (delay * 2).min(max_delay),
                _ = shutdown.changed() => return,
            }
        }
    })
}

async fn connect(
    inner: &Arc<EngineInner>,
    connector_ref: &str,
    source: &str,
    job_id: Uuid,
) -> Result<MessageSource, ConnectorError> {
    let connector = inner.connectors.resolve_nats(connector_ref).await?;
    connector
        .subscribe(source, &format!("famulus-{job_id}"))
        .await
}

/// Fire one run for an inbound message and settle the message by how the
/// run ends: a finished run acks it, everything else returns it for
/// redelivery.
async fn handle_message(
    inner: &Arc<EngineInner>,
    job_id: Uuid,
    job_name: &str,
    source: &str,
    message: InboundMessage,
) {
    let (sender, receiver) = oneshot::channel();
    let event = format!("consumed message from '{source}'");
    match fire(
        inner,
        job_id,
        Some(message.payload.clone()),
        Some(event),
        Some(sender),
    )
    .await
    {
        Ok(FireOutcome::Queued(_)) => match receiver.await {
            Ok(ExecutionState::Finished) => {
                if let Err(e) = message.ack().await {
                    tracing::warn!(job = %job_name, error = %e, "message ack failed");
                }
            }
            Ok(state) => {
                tracing::debug!(job = %job_name, state = %state, "run did not finish, message returned");
                let _ = message.nack().await;
            }
            Err(_) => {
                let _ = message.nack().await;
            }
        },
        Ok(FireOutcome::Deduplicated(_)) => {
            tracing::debug!(job = %job_name, "run already queued, message returned for redelivery");
            let _ = message.nack().await;
        }
        Err(e) => {
            tracing::warn!(job = %job_name, error = %e, "message fire refused");
            let _ = message.nack().await;
        }
    }
}

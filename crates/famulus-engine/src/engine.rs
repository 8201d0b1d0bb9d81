//! The engine facade.
//!
//! Owns the job definitions, the connector registry, the execution slot
//! pool, the waiting queue and the per-job trigger tasks. All operations
//! on jobs and runs go through [`Engine`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use famulus_actions::ActionRegistry;
use famulus_connectors::{ConnectorError, ConnectorRegistry};
use famulus_core::{
    CancelFlag, ConfigError, ConnectorFamily, ConnectorSpec, ExecutionState, Job, JobExecution,
    JobStateStore, TemplateEngine, TriggerSpec,
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::cron::CronSchedule;
use crate::dispatcher::{self, FireOutcome, QueuedRun};
use crate::history::HistoryStore;
use crate::simulation::{self, SimulationReport};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unknown job: {0}")]
    UnknownJob(Uuid),

    #[error("execution {0} is not an unresolved failure")]
    NotResolvable(Uuid),

    #[error("job {0} is locked by an unresolved failure")]
    FaultLockout(Uuid),

    #[error("job {0} has no active webhook trigger")]
    NoWebhook(Uuid),

    #[error("a simulation of job {0} is already running")]
    SimulationRunning(Uuid),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),
}

/// Cancellation access to a run occupying a slot.
pub(crate) struct RunHandle {
    pub execution_id: Uuid,
    pub cancel: CancelFlag,
}

pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) jobs: RwLock<HashMap<Uuid, Job>>,
    pub(crate) connectors: Arc<ConnectorRegistry>,
    pub(crate) actions: ActionRegistry,
    pub(crate) template: Arc<TemplateEngine>,
    pub(crate) history: HistoryStore,
    pub(crate) states: RwLock<HashMap<Uuid, Arc<JobStateStore>>>,
    pub(crate) slots: Arc<Semaphore>,
    pub(crate) queue: Mutex<VecDeque<QueuedRun>>,
    pub(crate) running: RwLock<HashMap<Uuid, RunHandle>>,
    pub(crate) triggers: Mutex<HashMap<Uuid, JoinHandle<()>>>,
    pub(crate) simulations: StdMutex<HashSet<Uuid>>,
    pub(crate) shutdown: watch::Sender<bool>,
}

impl EngineInner {
    pub(crate) async fn job(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&job_id).cloned()
    }

    /// The job's persisted value store, created on first use. Stores are
    /// keyed by job id, so redeploying a definition keeps its values.
    pub(crate) async fn state_store(&self, job_id: Uuid) -> Arc<JobStateStore> {
        self.states
            .write()
            .await
            .entry(job_id)
            .or_insert_with(|| Arc::new(JobStateStore::new()))
            .clone()
    }
}

pub struct Engine {
    inner: Arc<EngineInner>,
    poller: StdMutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Start an engine with the built-in action set. Must be called from
    /// within a tokio runtime; the queue poller starts immediately.
    pub fn new(config: EngineConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        let slots = Arc::new(Semaphore::new(config.execution_slots.max(1)));
        let inner = Arc::new(EngineInner {
            jobs: RwLock::new(HashMap::new()),
            connectors: Arc::new(ConnectorRegistry::new()),
            actions: ActionRegistry::default(),
            template: Arc::new(TemplateEngine::new()),
            history: HistoryStore::new(),
            states: RwLock::new(HashMap::new()),
            slots,
            queue: Mutex::new(VecDeque::new()),
            running: RwLock::new(HashMap::new()),
            triggers: Mutex::new(HashMap::new()),
            simulations: StdMutex::new(HashSet::new()),
            shutdown,
            config,
        });
        let poller = dispatcher::spawn_queue_poller(inner.clone());
        Self {
            inner,
            poller: StdMutex::new(Some(poller)),
        }
    }

    /// Validate and (re)load a job definition. An existing definition
    /// with the same id is replaced and its trigger task restarted;
    /// history and persisted values carry over.
    pub async fn submit_job_definition(&self, job: Job) -> Result<Uuid, EngineError> {
        job.validate()?;
        match &job.trigger {
            TriggerSpec::Cron { expression } => {
                CronSchedule::parse(expression)?;
            }
            TriggerSpec::WebHook { token } => {
                if token.trim().is_empty() {
                    return Err(ConfigError::InvalidParameter(
                        "webhook token must not be empty".to_string(),
                    )
                    .into());
                }
            }
            TriggerSpec::Message { connector_ref, .. } => {
                match self.inner.connectors.family_of(connector_ref).await {
                    None => {
                        return Err(ConfigError::UnknownConnector(connector_ref.clone()).into());
                    }
                    Some(family) if family != ConnectorFamily::Messaging => {
                        return Err(ConfigError::ConnectorKind {
                            id: connector_ref.clone(),
                            expected: ConnectorFamily::Messaging.as_str(),
                        }
                        .into());
                    }
                    Some(_) => {}
                }
            }
            TriggerSpec::Manual => {}
        }
        for spec in &job.actions {
            self.inner
                .actions
                .validate(spec, &self.inner.connectors)
                .await?;
        }

        let job_id = job.id;
        if let Some(previous) = self.inner.triggers.lock().await.remove(&job_id) {
            previous.abort();
        }
        self.inner.jobs.write().await.insert(job_id, job.clone());
        if job.active {
            if let Some(handle) = dispatcher::spawn_trigger(&self.inner, &job) {
                self.inner.triggers.lock().await.insert(job_id, handle);
            }
        }
        tracing::info!(job = %job.name, trigger = job.trigger.kind(), "job definition loaded");
        Ok(job_id)
    }

    /// Queue a run right now. Works for inactive jobs too. When a run of
    /// the job is already waiting, its id is returned instead of queueing
    /// a second one.
    pub async fn fire_manually(
        &self,
        job_id: Uuid,
        data: Option<Value>,
    ) -> Result<Uuid, EngineError> {
        match dispatcher::fire(&self.inner, job_id, data, None, None).await? {
            FireOutcome::Queued(id) | FireOutcome::Deduplicated(id) => Ok(id),
        }
    }

    /// Run the job's pipeline in simulation mode and report what every
    /// stage emitted. Simulations bypass queue, slots and history.
    pub async fn simulate(
        &self,
        job_id: Uuid,
        seed: Option<Value>,
    ) -> Result<SimulationReport, EngineError> {
        simulation::run_simulation(&self.inner, job_id, seed).await
    }

    /// All recorded runs of a job, newest first.
    pub fn history(&self, job_id: Uuid) -> Vec<JobExecution> {
        self.inner.history.list(job_id)
    }

    pub fn execution(&self, execution_id: Uuid) -> Option<JobExecution> {
        self.inner.history.get(execution_id)
    }

    /// Acknowledge a failed run, unlocking jobs that are not fault
    /// tolerant.
    pub fn mark_resolved(&self, job_id: Uuid, execution_id: Uuid) -> Result<(), EngineError> {
        if self.inner.history.resolve(job_id, execution_id) {
            Ok(())
        } else {
            Err(EngineError::NotResolvable(execution_id))
        }
    }

    /// Fire a job addressed by an inbound webhook request; the request
    /// payload becomes the seed data. Token routing happens in the
    /// transport layer before this is called. Refused unless the job is
    /// active and carries a webhook trigger.
    pub async fn notify_webhook(
        &self,
        job_id: Uuid,
        data: Option<Value>,
    ) -> Result<Uuid, EngineError> {
        let Some(job) = self.inner.job(job_id).await else {
            return Err(EngineError::UnknownJob(job_id));
        };
        if !job.active || !matches!(job.trigger, TriggerSpec::WebHook { .. }) {
            return Err(EngineError::NoWebhook(job_id));
        }
        match dispatcher::fire(&self.inner, job_id, data, None, None).await? {
            FireOutcome::Queued(id) | FireOutcome::Deduplicated(id) => Ok(id),
        }
    }

    /// Dispatch an externally consumed message to every active job whose
    /// message trigger references the connector. For transports that read
    /// the stream themselves instead of going through the engine's own
    /// subscription. Jobs refusing the fire are skipped with a warning.
    pub async fn notify_message(&self, connector_ref: &str, payload: Value) -> Vec<Uuid> {
        let matching: Vec<(Uuid, String)> = self
            .inner
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.active)
            .filter_map(|job| match &job.trigger {
                TriggerSpec::Message { connector_ref: r, source } if r == connector_ref => {
                    Some((job.id, source.clone()))
                }
                _ => None,
            })
            .collect();
        let mut fired = Vec::new();
        for (job_id, source) in matching {
            let event = format!("consumed message from '{source}'");
            match dispatcher::fire(&self.inner, job_id, Some(payload.clone()), Some(event), None)
                .await
            {
                Ok(FireOutcome::Queued(id)) | Ok(FireOutcome::Deduplicated(id)) => fired.push(id),
                Err(e) => tracing::warn!(job_id = %job_id, error = %e, "message fire refused"),
            }
        }
        fired
    }

    /// Cancel a job's active run: a waiting run fails immediately, a
    /// running one stops at the next item boundary. Returns false when
    /// there was nothing to cancel.
    pub async fn cancel(&self, job_id: Uuid) -> bool {
        let running = self
            .inner
            .running
            .read()
            .await
            .get(&job_id)
            .map(|handle| handle.cancel.clone());
        if let Some(flag) = running {
            flag.cancel();
            tracing::info!(job_id = %job_id, "cancelling running run");
            return true;
        }
        if let Some(execution_id) = self.inner.history.waiting_execution(job_id) {
            self.inner
                .queue
                .lock()
                .await
                .retain(|run| run.execution_id != execution_id);
            self.inner
                .history
                .update(execution_id, |e| e.mark_cancelled());
            tracing::info!(job_id = %job_id, execution = %execution_id, "cancelled waiting run");
            return true;
        }
        false
    }

    /// Drop a job along with its trigger, queued and running work,
    /// history and persisted values.
    pub async fn remove_job(&self, job_id: Uuid) -> bool {
        let removed = self.inner.jobs.write().await.remove(&job_id).is_some();
        if let Some(trigger) = self.inner.triggers.lock().await.remove(&job_id) {
            trigger.abort();
        }
        self.cancel(job_id).await;
        self.inner
            .queue
            .lock()
            .await
            .retain(|run| run.job_id != job_id);
        self.inner.history.remove_job(job_id);
        self.inner.states.write().await.remove(&job_id);
        if removed {
            tracing::info!(job_id = %job_id, "job removed");
        }
        removed
    }

    pub async fn job(&self, job_id: Uuid) -> Option<Job> {
        self.inner.job(job_id).await
    }

    pub async fn job_ids(&self) -> Vec<Uuid> {
        self.inner.jobs.read().await.keys().copied().collect()
    }

    pub async fn register_connector(&self, id: &str, spec: ConnectorSpec) {
        self.inner.connectors.register(id, spec).await;
    }

    pub async fn remove_connector(&self, id: &str) {
        self.inner.connectors.remove(id).await;
    }

    pub async fn connector_ids(&self) -> Vec<String> {
        self.inner.connectors.ids().await
    }

    /// Probe a connector definition without registering it.
    pub async fn test_connector(&self, spec: &ConnectorSpec) -> Result<(), ConnectorError> {
        ConnectorRegistry::test_spec(spec).await
    }

    /// Stop triggers, fail queued runs, cancel running pipelines and wait
    /// for them to wind down.
    pub async fn shutdown(&self) {
        eprintln!(
            "DBG shutdown: send, receivers before = {}",
            self.inner.shutdown.receiver_count()
        );
        let send_result = self.inner.shutdown.send(true);
        eprintln!("DBG shutdown: send err = {}", send_result.is_err());
        eprintln!("DBG shutdown: triggers");
        let triggers: Vec<JoinHandle<()>> = self
            .inner
            .triggers
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for trigger in triggers {
            trigger.abort();
        }
        eprintln!("DBG shutdown: poller take");
        let poller = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(poller) = poller {
            eprintln!("DBG shutdown: poller await");
            let _ = poller.await;
        }
        eprintln!("DBG shutdown: queue drain");
        {
            let mut queue = self.inner.queue.lock().await;
            while let Some(run) = queue.pop_front() {
                self.inner
                    .history
                    .update(run.execution_id, |e| e.mark_cancelled());
            }
        }
        eprintln!("DBG shutdown: cancel running");
        for handle in self.inner.running.read().await.values() {
            handle.cancel.cancel();
        }
        eprintln!("DBG shutdown: wait loop");
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while std::time::Instant::now() < deadline {
            if self.inner.running.read().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        eprintln!("DBG shutdown: done");
        tracing::info!("engine stopped");
    }
}

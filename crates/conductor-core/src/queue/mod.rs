//! In-memory retry queue with a dead-letter store.
//!
//! Jobs are drained one per tick from the head of a FIFO. A failed job goes
//! back to the tail with `retries + 1` until `retries + 1 >= max_retries`,
//! at which point it moves to the dead-letter store. Dead-lettered jobs are
//! kept for operator inspection only and are never replayed automatically.
//!
//! Nothing here survives a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::ConductorError;
use crate::events::{EventDispatcher, Severity, SystemAlert};
use crate::tools::ToolManager;

/// Job type handled by [`ToolJobProcessor`].
pub const TOOL_JOB_TYPE: &str = "tool";

fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Job {
    pub fn new(id: &str, job_type: &str, payload: Value, max_retries: u32) -> Self {
        Self {
            id: id.to_string(),
            job_type: job_type.to_string(),
            payload,
            retries: 0,
            max_retries,
        }
    }
}

/// Handles every job of one type. `Ok(false)` and `Err` both count as a
/// failed attempt.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &Job) -> Result<bool, ConductorError>;
}

/// Runs a tool in the background: payload `{"toolName": "...", "args": {...}}`.
pub struct ToolJobProcessor {
    tools: Arc<ToolManager>,
}

impl ToolJobProcessor {
    pub fn new(tools: Arc<ToolManager>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl JobProcessor for ToolJobProcessor {
    async fn process(&self, job: &Job) -> Result<bool, ConductorError> {
        let tool_name = job
            .payload
            .get("toolName")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ConductorError::BadRequest(format!("Job '{}' has no payload.toolName", job.id))
            })?;
        let args = job
            .payload
            .get("args")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let result = self.tools.execute_tool(tool_name, args).await;
        match result.error {
            Some(e) if !result.success => Err(ConductorError::Internal(e)),
            _ => Ok(result.success),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The queue was empty.
    Idle,
    Completed(String),
    Requeued(String),
    DeadLettered(String),
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    dead_letter: Vec<Job>,
}

pub struct RetryQueue {
    state: Mutex<QueueState>,
    processors: RwLock<HashMap<String, Arc<dyn JobProcessor>>>,
    events: EventDispatcher,
    poll_interval: Duration,
}

impl RetryQueue {
    pub fn new(events: EventDispatcher, poll_interval: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            processors: RwLock::new(HashMap::new()),
            events,
            poll_interval,
        }
    }

    pub fn register_processor(&self, job_type: &str, processor: Arc<dyn JobProcessor>) {
        if let Ok(mut processors) = self.processors.write() {
            processors.insert(job_type.to_string(), processor);
            tracing::info!("[RetryQueue] Registered processor for '{}'", job_type);
        }
    }

    /// Append to the tail with a fresh retry count.
    pub fn add_job(&self, mut job: Job) {
        job.retries = 0;
        tracing::info!("[RetryQueue] Queued job {} ({})", job.id, job.job_type);
        if let Ok(mut state) = self.state.lock() {
            state.pending.push_back(job);
        }
    }

    pub fn pending_jobs(&self) -> Vec<Job> {
        self.state
            .lock()
            .map(|s| s.pending.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_dead_letter_jobs(&self) -> Vec<Job> {
        self.state
            .lock()
            .map(|s| s.dead_letter.clone())
            .unwrap_or_default()
    }

    /// Drop a dead-lettered job. Returns false when no such job exists.
    pub fn remove_dead_letter_job(&self, id: &str) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        let before = state.dead_letter.len();
        state.dead_letter.retain(|j| j.id != id);
        let removed = state.dead_letter.len() != before;
        if removed {
            tracing::info!("[RetryQueue] Removed dead-letter job {}", id);
        }
        removed
    }

    /// Pop the head job and run it once.
    pub async fn process_next(&self) -> ProcessOutcome {
        let job = match self.state.lock() {
            Ok(mut state) => state.pending.pop_front(),
            Err(_) => None,
        };
        let Some(mut job) = job else {
            return ProcessOutcome::Idle;
        };

        let failure = match self.run(&job).await {
            Ok(()) => {
                tracing::info!("[RetryQueue] Job {} completed", job.id);
                return ProcessOutcome::Completed(job.id);
            }
            Err(reason) => reason,
        };

        if job.retries + 1 >= job.max_retries {
            job.retries += 1;
            tracing::warn!(
                "[RetryQueue] Job {} dead-lettered after {} attempt(s): {}",
                job.id,
                job.retries,
                failure
            );
            self.events.alert(
                SystemAlert::new(
                    "job_dead_lettered",
                    Severity::High,
                    format!("Job '{}' moved to the dead-letter queue: {}", job.id, failure),
                )
                .with_context(json!({
                    "jobId": job.id,
                    "type": job.job_type,
                    "attempts": job.retries,
                }))
                .with_metadata(json!({ "lastError": failure })),
            );
            let id = job.id.clone();
            if let Ok(mut state) = self.state.lock() {
                state.dead_letter.push(job);
            }
            ProcessOutcome::DeadLettered(id)
        } else {
            job.retries += 1;
            tracing::info!(
                "[RetryQueue] Job {} failed ({}), requeued (retry {}/{})",
                job.id,
                failure,
                job.retries,
                job.max_retries
            );
            let id = job.id.clone();
            if let Ok(mut state) = self.state.lock() {
                state.pending.push_back(job);
            }
            ProcessOutcome::Requeued(id)
        }
    }

    async fn run(&self, job: &Job) -> Result<(), String> {
        let processor = self
            .processors
            .read()
            .ok()
            .and_then(|p| p.get(&job.job_type).cloned())
            .ok_or_else(|| format!("No processor registered for job type '{}'", job.job_type))?;

        let owned = job.clone();
        match tokio::spawn(async move { processor.process(&owned).await }).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err("processor reported failure".to_string()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("processor crashed: {}", e)),
        }
    }

    /// Start the periodic drain: one job per poll interval until shut down.
    pub fn spawn_worker(self: &Arc<Self>) -> WorkerHandle {
        let queue = self.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(queue.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(
                "[RetryQueue] Worker started (every {}ms)",
                queue.poll_interval.as_millis()
            );
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        queue.process_next().await;
                    }
                }
            }
            tracing::info!("[RetryQueue] Worker stopped");
        });

        WorkerHandle {
            stop: Some(stop_tx),
            handle,
        }
    }
}

pub struct WorkerHandle {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Let the job in flight finish, then stop draining.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            tracing::warn!("[RetryQueue] Worker ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::events::{EventSink, MemorySink};

    struct Always {
        ok: bool,
        calls: AtomicUsize,
    }

    impl Always {
        fn new(ok: bool) -> Arc<Self> {
            Arc::new(Self {
                ok,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl JobProcessor for Always {
        async fn process(&self, _job: &Job) -> Result<bool, ConductorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.ok)
        }
    }

    struct Erroring;

    #[async_trait]
    impl JobProcessor for Erroring {
        async fn process(&self, job: &Job) -> Result<bool, ConductorError> {
            Err(ConductorError::Provider(format!("cannot transcode {}", job.id)))
        }
    }

    fn queue() -> (Arc<RetryQueue>, Arc<MemorySink>, EventDispatcher) {
        let sink = Arc::new(MemorySink::new());
        let sinks: Vec<Arc<dyn EventSink>> = vec![sink.clone()];
        let (events, _handle) = EventDispatcher::spawn(16, sinks);
        (
            Arc::new(RetryQueue::new(events.clone(), Duration::from_millis(2000))),
            sink,
            events,
        )
    }

    #[tokio::test]
    async fn failing_job_is_dead_lettered_after_max_retries_attempts() {
        let (queue, sink, events) = queue();
        let processor = Always::new(false);
        queue.register_processor("x", processor.clone());

        let mut job = Job::new("j1", "x", json!({}), 2);
        job.retries = 7;
        queue.add_job(job);
        assert_eq!(queue.pending_jobs()[0].retries, 0);

        assert_eq!(queue.process_next().await, ProcessOutcome::Requeued("j1".to_string()));
        assert_eq!(queue.pending_jobs()[0].retries, 1);
        assert!(queue.get_dead_letter_jobs().is_empty());

        assert_eq!(
            queue.process_next().await,
            ProcessOutcome::DeadLettered("j1".to_string())
        );
        assert_eq!(processor.calls.load(Ordering::SeqCst), 2);
        assert!(queue.pending_jobs().is_empty());

        let dead = queue.get_dead_letter_jobs();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, "j1");
        assert_eq!(dead[0].retries, 2);

        events.flush().await;
        let alerts = sink.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, "job_dead_lettered");
        assert_eq!(alerts[0].severity, Severity::High);
        assert_eq!(alerts[0].metadata["lastError"], "processor reported failure");

        assert!(queue.remove_dead_letter_job("j1"));
        assert!(queue.get_dead_letter_jobs().is_empty());
        assert!(!queue.remove_dead_letter_job("j1"));
    }

    #[tokio::test]
    async fn failed_jobs_go_to_the_tail() {
        let (queue, _sink, _events) = queue();
        queue.register_processor("bad", Arc::new(Erroring));
        queue.register_processor("good", Always::new(true));

        queue.add_job(Job::new("a", "bad", json!({}), 5));
        queue.add_job(Job::new("b", "good", json!({}), 5));

        assert_eq!(queue.process_next().await, ProcessOutcome::Requeued("a".to_string()));
        let order: Vec<String> = queue.pending_jobs().into_iter().map(|j| j.id).collect();
        assert_eq!(order, vec!["b", "a"]);
        assert_eq!(queue.process_next().await, ProcessOutcome::Completed("b".to_string()));
        assert_eq!(queue.process_next().await, ProcessOutcome::Requeued("a".to_string()));
    }

    #[tokio::test]
    async fn missing_processor_counts_as_failure() {
        let (queue, _sink, _events) = queue();
        queue.add_job(Job::new("orphan", "unknown", json!({}), 1));
        assert_eq!(
            queue.process_next().await,
            ProcessOutcome::DeadLettered("orphan".to_string())
        );
        assert_eq!(queue.process_next().await, ProcessOutcome::Idle);
    }

    #[tokio::test]
    async fn tool_jobs_run_through_the_tool_manager() {
        use crate::tools::{ToolCategory, ToolDefinition, ToolOutput, ToolSchema};

        let tools = Arc::new(ToolManager::new());
        tools
            .register_tool(ToolDefinition::from_fn(
                "echo",
                "echo",
                ToolCategory::Utility,
                ToolSchema::object(json!({}), &["text"]),
                |args: Value| async move { Ok::<_, ConductorError>(ToolOutput::new(args)) },
            ))
            .unwrap();
        let (queue, _sink, _events) = queue();
        queue.register_processor(TOOL_JOB_TYPE, Arc::new(ToolJobProcessor::new(tools.clone())));

        queue.add_job(Job::new(
            "ok",
            TOOL_JOB_TYPE,
            json!({ "toolName": "echo", "args": { "text": "hi" } }),
            3,
        ));
        queue.add_job(Job::new("no-text", TOOL_JOB_TYPE, json!({ "toolName": "echo" }), 1));
        queue.add_job(Job::new("no-name", TOOL_JOB_TYPE, json!({}), 1));

        assert_eq!(queue.process_next().await, ProcessOutcome::Completed("ok".to_string()));
        assert_eq!(
            queue.process_next().await,
            ProcessOutcome::DeadLettered("no-text".to_string())
        );
        assert_eq!(
            queue.process_next().await,
            ProcessOutcome::DeadLettered("no-name".to_string())
        );
        assert_eq!(tools.get_usage_stats()["echo"].count, 2);
    }

    #[test]
    fn job_wire_shape() {
        let job: Job = serde_json::from_value(json!({
            "id": "j1", "type": "transcode", "payload": { "fileId": "f" }, "maxRetries": 2
        }))
        .unwrap();
        assert_eq!(job.job_type, "transcode");
        assert_eq!(job.max_retries, 2);
        assert_eq!(job.retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn worker_drains_one_job_per_tick_until_shutdown() {
        let (queue, _sink, _events) = queue();
        let processor = Always::new(true);
        queue.register_processor("x", processor.clone());
        for id in ["a", "b", "c"] {
            queue.add_job(Job::new(id, "x", json!({}), 3));
        }

        let worker = queue.spawn_worker();
        // First tick fires immediately, the next two after 2s and 4s.
        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
        assert!(queue.pending_jobs().is_empty());

        worker.shutdown().await;
        queue.add_job(Job::new("late", "x", json!({}), 3));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(queue.pending_jobs().len(), 1);
    }
}

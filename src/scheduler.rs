//! The scheduler ("CogServer") — a plugin registry and priority job queue
//! hosting periodic cognitive jobs against the graph.
//!
//! The graph is the sole shared mutable resource; it is guarded behind a
//! single `tokio::sync::Mutex`, one of the compliant designs `spec.md` §5
//! allows for serialising mutating operations. Bounded concurrency,
//! timeouts, and retries are implemented with `tokio`'s task and time
//! primitives, matching the teacher crate's existing `tokio` dependency.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::atom::AtomType;
use crate::atomspace::AtomSpace;
use crate::ecan::Ecan;
use crate::error::{CoreError, CoreResult};
use crate::pln::{self, PlnConfig};

pub type PluginId = String;

/// Shared handles every built-in (and custom) plugin executes against.
#[derive(Clone)]
pub struct CoreServices {
    pub graph: Arc<Mutex<AtomSpace>>,
    pub ecan: Arc<Mutex<Ecan>>,
    pub pln_config: Arc<PlnConfig>,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, services: Arc<CoreServices>, parameters: JsonValue) -> Result<JsonValue, String>;
}

struct PluginEntry {
    plugin: Arc<dyn Plugin>,
    priority: i32,
    enabled: bool,
    execution_count: u64,
    avg_duration_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

struct Job {
    id: u64,
    plugin_id: String,
    parameters: JsonValue,
    priority: i32,
    timeout: Duration,
    max_retries: u32,
    retry_count: u32,
    state: JobState,
    result: Option<JsonValue>,
    error: Option<String>,
    timed_out: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: u64,
    pub plugin_id: String,
    pub state: JobState,
    pub priority: i32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    pub timed_out: bool,
}

impl Job {
    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            plugin_id: self.plugin_id.clone(),
            state: self.state,
            priority: self.priority,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            result: self.result.clone(),
            error: self.error.clone(),
            timed_out: self.timed_out,
        }
    }
}

/// Priority queue entry; higher priority pops first, ties broken FIFO by
/// enqueue sequence.
struct QueuedJob {
    job_id: u64,
    priority: i32,
    seq: u64,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.job_id == other.job_id
    }
}
impl Eq for QueuedJob {}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority).then(other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum SchedulerEvent {
    Cycle { cycle: u64, queue_size: usize, running_count: usize },
    Completed { job_id: u64 },
    Failed { job_id: u64, error: String },
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_concurrent_jobs: usize,
    pub cycle_interval: Duration,
    pub job_timeout: Duration,
    pub max_queue_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            cycle_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(30),
            max_queue_size: 1000,
        }
    }
}

struct SchedulerState {
    services: Arc<CoreServices>,
    plugins: Mutex<HashMap<PluginId, PluginEntry>>,
    queue: Mutex<BinaryHeap<QueuedJob>>,
    jobs: Mutex<HashMap<u64, Job>>,
    running: Mutex<HashSet<u64>>,
    handles: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_job_id: AtomicU64,
    seq_counter: AtomicU64,
    cycle_count: AtomicU64,
    config: SchedulerConfig,
    events: broadcast::Sender<SchedulerEvent>,
}

/// The plugin scheduler. One instance per `Core` — see `spec.md` §9
/// (no process-wide cognitive state).
pub struct Scheduler {
    state: Arc<SchedulerState>,
    cycle_task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(services: CoreServices, config: SchedulerConfig) -> Self {
        let (events, _rx) = broadcast::channel(256);
        let state = Arc::new(SchedulerState {
            services: Arc::new(services),
            plugins: Mutex::new(HashMap::new()),
            queue: Mutex::new(BinaryHeap::new()),
            jobs: Mutex::new(HashMap::new()),
            running: Mutex::new(HashSet::new()),
            handles: Mutex::new(HashMap::new()),
            next_job_id: AtomicU64::new(0),
            seq_counter: AtomicU64::new(0),
            cycle_count: AtomicU64::new(0),
            config,
            events,
        });
        let scheduler = Self {
            state,
            cycle_task: Mutex::new(None),
        };
        scheduler
    }

    /// Constructs a scheduler with the five built-in plugins
    /// (`pln`, `ecan`, `patternMining`, `goalProcessing`,
    /// `memoryConsolidation`) pre-registered and enabled.
    pub async fn with_builtin_plugins(services: CoreServices, config: SchedulerConfig) -> Self {
        let scheduler = Self::new(services, config);
        scheduler.register_plugin("pln", Arc::new(PlnPlugin), 0, true).await;
        scheduler.register_plugin("ecan", Arc::new(EcanPlugin), 0, true).await;
        scheduler
            .register_plugin("patternMining", Arc::new(PatternMiningPlugin), 0, true)
            .await;
        scheduler
            .register_plugin("goalProcessing", Arc::new(GoalProcessingPlugin), 0, true)
            .await;
        scheduler
            .register_plugin("memoryConsolidation", Arc::new(MemoryConsolidationPlugin), 0, true)
            .await;
        scheduler
    }

    pub async fn register_plugin(&self, id: impl Into<String>, plugin: Arc<dyn Plugin>, priority: i32, enabled: bool) {
        self.state.plugins.lock().await.insert(
            id.into(),
            PluginEntry {
                plugin,
                priority,
                enabled,
                execution_count: 0,
                avg_duration_ms: 0.0,
            },
        );
    }

    pub async fn set_plugin_enabled(&self, id: &str, enabled: bool) -> CoreResult<()> {
        let mut plugins = self.state.plugins.lock().await;
        let entry = plugins.get_mut(id).ok_or_else(|| CoreError::PluginNotFound(id.to_string()))?;
        entry.enabled = enabled;
        Ok(())
    }

    pub async fn plugin_stats(&self, id: &str) -> CoreResult<(u64, f64)> {
        let plugins = self.state.plugins.lock().await;
        let entry = plugins.get(id).ok_or_else(|| CoreError::PluginNotFound(id.to_string()))?;
        Ok((entry.execution_count, entry.avg_duration_ms))
    }

    /// Queues `(plugin_id, parameters, priority, timeout, max_retries)`.
    /// Rejects with `queue-full` at capacity, `not-found`/`disabled` for
    /// an unknown or disabled plugin.
    pub async fn enqueue(
        &self,
        plugin_id: &str,
        parameters: JsonValue,
        priority: i32,
        timeout: Option<Duration>,
        max_retries: u32,
    ) -> CoreResult<u64> {
        {
            let plugins = self.state.plugins.lock().await;
            let entry = plugins
                .get(plugin_id)
                .ok_or_else(|| CoreError::PluginNotFound(plugin_id.to_string()))?;
            if !entry.enabled {
                return Err(CoreError::Disabled(plugin_id.to_string()));
            }
        }

        let mut queue = self.state.queue.lock().await;
        if queue.len() >= self.state.config.max_queue_size {
            return Err(CoreError::QueueFull(self.state.config.max_queue_size));
        }

        let id = self.state.next_job_id.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        let seq = self.state.seq_counter.fetch_add(1, AtomicOrdering::SeqCst);
        let job = Job {
            id,
            plugin_id: plugin_id.to_string(),
            parameters,
            priority,
            timeout: timeout.unwrap_or(self.state.config.job_timeout),
            max_retries,
            retry_count: 0,
            state: JobState::Queued,
            result: None,
            error: None,
            timed_out: false,
        };
        self.state.jobs.lock().await.insert(id, job);
        queue.push(QueuedJob { job_id: id, priority, seq });
        Ok(id)
    }

    pub async fn job(&self, id: u64) -> Option<JobSnapshot> {
        self.state.jobs.lock().await.get(&id).map(Job::snapshot)
    }

    pub async fn queue_size(&self) -> usize {
        self.state.queue.lock().await.len()
    }

    pub async fn running_count(&self) -> usize {
        self.state.running.lock().await.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.state.events.subscribe()
    }

    /// Starts the cycle timer. Idempotent: a second call while already
    /// running is a no-op.
    pub async fn start(&self) {
        let mut guard = self.cycle_task.lock().await;
        if guard.is_some() {
            return;
        }
        let state = self.state.clone();
        let interval = state.config.cycle_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                Self::run_cycle_once(state.clone()).await;
            }
        });
        *guard = Some(handle);
    }

    /// Halts dispatch and cancels all running jobs. Idempotent and safe
    /// to call before `start`.
    pub async fn stop(&self) {
        let mut guard = self.cycle_task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }
        drop(guard);

        let mut handles = self.state.handles.lock().await;
        for (_, handle) in handles.drain() {
            handle.abort();
        }
        drop(handles);

        let running_ids: Vec<u64> = self.state.running.lock().await.drain().collect();
        let mut jobs = self.state.jobs.lock().await;
        for id in running_ids {
            if let Some(job) = jobs.get_mut(&id) {
                if job.state == JobState::Running {
                    job.state = JobState::Cancelled;
                }
            }
        }
    }

    /// Runs a single cycle synchronously (useful for tests that don't
    /// want to wait on the periodic timer started by `start`).
    pub async fn tick(&self) {
        Self::run_cycle_once(self.state.clone()).await;
    }

    async fn run_cycle_once(state: Arc<SchedulerState>) {
        loop {
            if state.running.lock().await.len() >= state.config.max_concurrent_jobs {
                break;
            }
            let next = state.queue.lock().await.pop();
            let Some(queued) = next else { break };

            let plugin_id = {
                let mut jobs = state.jobs.lock().await;
                let Some(job) = jobs.get_mut(&queued.job_id) else { continue };
                if job.state != JobState::Queued {
                    continue;
                }
                job.state = JobState::Running;
                job.plugin_id.clone()
            };

            let plugin_lookup = {
                let plugins = state.plugins.lock().await;
                plugins.get(&plugin_id).map(|e| (e.plugin.clone(), e.enabled))
            };

            let Some((plugin, enabled)) = plugin_lookup else {
                Self::fail_immediately(&state, queued.job_id, format!("plugin '{plugin_id}' not found")).await;
                continue;
            };
            if !enabled {
                Self::fail_immediately(&state, queued.job_id, format!("plugin '{plugin_id}' is disabled")).await;
                continue;
            }

            state.running.lock().await.insert(queued.job_id);
            let job_id = queued.job_id;
            let state2 = state.clone();
            let handle = tokio::spawn(async move {
                Self::dispatch_job(state2, job_id, plugin).await;
            });
            state.handles.lock().await.insert(job_id, handle);
        }

        let queue_size = state.queue.lock().await.len();
        let running_count = state.running.lock().await.len();
        let cycle = state.cycle_count.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        let _ = state.events.send(SchedulerEvent::Cycle {
            cycle,
            queue_size,
            running_count,
        });
        debug!(cycle, queue_size, running_count, "scheduler cycle");
    }

    async fn fail_immediately(state: &Arc<SchedulerState>, job_id: u64, error: String) {
        let mut jobs = state.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&job_id) {
            job.state = JobState::Failed;
            job.error = Some(error);
        }
    }

    async fn dispatch_job(state: Arc<SchedulerState>, job_id: u64, plugin: Arc<dyn Plugin>) {
        let (parameters, timeout, plugin_id) = {
            let jobs = state.jobs.lock().await;
            let job = &jobs[&job_id];
            (job.parameters.clone(), job.timeout, job.plugin_id.clone())
        };

        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(timeout, plugin.execute(state.services.clone(), parameters)).await;

        state.running.lock().await.remove(&job_id);
        state.handles.lock().await.remove(&job_id);

        match outcome {
            Ok(Ok(value)) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                {
                    let mut plugins = state.plugins.lock().await;
                    if let Some(entry) = plugins.get_mut(&plugin_id) {
                        entry.execution_count += 1;
                        let n = entry.execution_count as f64;
                        entry.avg_duration_ms += (elapsed_ms - entry.avg_duration_ms) / n;
                    }
                }
                let mut jobs = state.jobs.lock().await;
                if let Some(job) = jobs.get_mut(&job_id) {
                    if job.state == JobState::Cancelled {
                        return;
                    }
                    job.state = JobState::Completed;
                    job.result = Some(value);
                }
                drop(jobs);
                let _ = state.events.send(SchedulerEvent::Completed { job_id });
                info!(job_id, plugin = %plugin_id, "job completed");
            }
            Ok(Err(err_msg)) => {
                Self::handle_failure(&state, job_id, err_msg, false).await;
            }
            Err(_elapsed) => {
                Self::handle_failure(&state, job_id, "timed out".to_string(), true).await;
            }
        }
    }

    async fn handle_failure(state: &Arc<SchedulerState>, job_id: u64, error: String, timed_out: bool) {
        let mut jobs = state.jobs.lock().await;
        let Some(job) = jobs.get_mut(&job_id) else { return };
        if job.state == JobState::Cancelled {
            return;
        }
        if timed_out {
            job.timed_out = true;
        }
        if job.retry_count < job.max_retries {
            job.retry_count += 1;
            job.state = JobState::Queued;
            let priority = job.priority;
            drop(jobs);
            let seq = state.seq_counter.fetch_add(1, AtomicOrdering::SeqCst);
            state.queue.lock().await.push(QueuedJob { job_id, priority, seq });
            warn!(job_id, error = %error, "job failed, retrying");
        } else {
            job.state = JobState::Failed;
            job.error = Some(error.clone());
            drop(jobs);
            error!(job_id, error = %error, "job failed permanently");
            let _ = state.events.send(SchedulerEvent::Failed { job_id, error });
        }
    }
}

// ─── Built-in plugins ───────────────────────────────────────────────────

struct PlnPlugin;

#[async_trait]
impl Plugin for PlnPlugin {
    fn name(&self) -> &str {
        "pln"
    }

    async fn execute(&self, services: Arc<CoreServices>, parameters: JsonValue) -> Result<JsonValue, String> {
        let max_iterations = parameters.get("max_iterations").and_then(|v| v.as_u64()).unwrap_or(1) as u32;
        let mut graph = services.graph.lock().await;
        let result = pln::infer(&mut graph, &services.pln_config, max_iterations);
        serde_json::to_value(result).map_err(|e| e.to_string())
    }
}

struct EcanPlugin;

#[async_trait]
impl Plugin for EcanPlugin {
    fn name(&self) -> &str {
        "ecan"
    }

    async fn execute(&self, services: Arc<CoreServices>, _parameters: JsonValue) -> Result<JsonValue, String> {
        let mut graph = services.graph.lock().await;
        let mut ecan = services.ecan.lock().await;
        let report = ecan.run_cycle(&mut graph);
        serde_json::to_value(report).map_err(|e| e.to_string())
    }
}

struct PatternMiningPlugin;

#[async_trait]
impl Plugin for PatternMiningPlugin {
    fn name(&self) -> &str {
        "patternMining"
    }

    async fn execute(&self, services: Arc<CoreServices>, parameters: JsonValue) -> Result<JsonValue, String> {
        let min_support = parameters.get("minSupport").and_then(|v| v.as_u64()).unwrap_or(1) as usize;
        let graph = services.graph.lock().await;
        let stats = graph.statistics();
        let patterns: Vec<JsonValue> = stats
            .type_distribution
            .into_iter()
            .filter(|(_, count)| *count >= min_support)
            .map(|(t, count)| json!({ "type": t.to_string(), "count": count }))
            .collect();
        Ok(json!({ "patterns": patterns }))
    }
}

struct GoalProcessingPlugin;

#[async_trait]
impl Plugin for GoalProcessingPlugin {
    fn name(&self) -> &str {
        "goalProcessing"
    }

    async fn execute(&self, services: Arc<CoreServices>, parameters: JsonValue) -> Result<JsonValue, String> {
        let threshold = parameters.get("stiThreshold").and_then(|v| v.as_i64()).unwrap_or(0);
        let graph = services.graph.lock().await;
        let goals: Vec<JsonValue> = graph
            .by_type(AtomType::GoalNode)
            .into_iter()
            .filter_map(|id| graph.get(id))
            .filter(|atom| atom.av.sti > threshold)
            .map(|atom| json!({ "id": atom.id, "name": atom.name, "sti": atom.av.sti }))
            .collect();
        Ok(json!({ "goals": goals }))
    }
}

struct MemoryConsolidationPlugin;

#[async_trait]
impl Plugin for MemoryConsolidationPlugin {
    fn name(&self) -> &str {
        "memoryConsolidation"
    }

    async fn execute(&self, services: Arc<CoreServices>, parameters: JsonValue) -> Result<JsonValue, String> {
        let threshold = parameters.get("stiThreshold").and_then(|v| v.as_i64()).unwrap_or(0);
        let mut graph = services.graph.lock().await;
        let ids = graph.all();
        let mut consolidated = 0u64;
        for id in ids {
            if let Some(atom) = graph.get_mut(id) {
                if atom.av.sti > threshold {
                    atom.av.lti += 1;
                    consolidated += 1;
                }
            }
        }
        Ok(json!({ "consolidated": consolidated }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecan::EcanConfig;
    use std::sync::Arc as StdArc;
    use tokio::sync::Mutex as TokioMutex;

    fn services() -> CoreServices {
        CoreServices {
            graph: StdArc::new(TokioMutex::new(AtomSpace::new())),
            ecan: StdArc::new(TokioMutex::new(Ecan::with_seed(EcanConfig::default(), 1))),
            pln_config: StdArc::new(PlnConfig::default()),
        }
    }

    struct Trivial;
    #[async_trait]
    impl Plugin for Trivial {
        fn name(&self) -> &str {
            "trivial"
        }
        async fn execute(&self, _services: Arc<CoreServices>, _parameters: JsonValue) -> Result<JsonValue, String> {
            Ok(json!({ "ok": true }))
        }
    }

    /// Records the `label` from its parameters into a shared log on
    /// completion, so tests can assert dispatch/completion order instead
    /// of just final job state.
    struct Recording {
        log: StdArc<TokioMutex<Vec<String>>>,
    }
    #[async_trait]
    impl Plugin for Recording {
        fn name(&self) -> &str {
            "recording"
        }
        async fn execute(&self, _services: Arc<CoreServices>, parameters: JsonValue) -> Result<JsonValue, String> {
            let label = parameters.get("label").and_then(|v| v.as_str()).unwrap_or("?").to_string();
            self.log.lock().await.push(label);
            Ok(json!({ "ok": true }))
        }
    }

    struct NeverCompletes;
    #[async_trait]
    impl Plugin for NeverCompletes {
        fn name(&self) -> &str {
            "never"
        }
        async fn execute(&self, _services: Arc<CoreServices>, _parameters: JsonValue) -> Result<JsonValue, String> {
            loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    }

    struct AlwaysFails;
    #[async_trait]
    impl Plugin for AlwaysFails {
        fn name(&self) -> &str {
            "always-fails"
        }
        async fn execute(&self, _services: Arc<CoreServices>, _parameters: JsonValue) -> Result<JsonValue, String> {
            Err("boom".to_string())
        }
    }

    #[tokio::test]
    async fn enqueue_rejects_unknown_plugin() {
        let scheduler = Scheduler::new(services(), SchedulerConfig::default());
        let err = scheduler.enqueue("nope", json!({}), 0, None, 0).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn enqueue_rejects_disabled_plugin() {
        let scheduler = Scheduler::new(services(), SchedulerConfig::default());
        scheduler.register_plugin("trivial", Arc::new(Trivial), 0, false).await;
        let err = scheduler.enqueue("trivial", json!({}), 0, None, 0).await;
        assert!(matches!(err, Err(CoreError::Disabled(_))));
    }

    #[tokio::test]
    async fn queue_full_rejects_enqueue() {
        let mut config = SchedulerConfig::default();
        config.max_queue_size = 1;
        let scheduler = Scheduler::new(services(), config);
        scheduler.register_plugin("trivial", Arc::new(Trivial), 0, true).await;
        scheduler.enqueue("trivial", json!({}), 0, None, 0).await.unwrap();
        let err = scheduler.enqueue("trivial", json!({}), 0, None, 0).await;
        assert!(matches!(err, Err(CoreError::QueueFull(_))));
    }

    #[tokio::test]
    async fn priority_dispatch_order() {
        let mut config = SchedulerConfig::default();
        config.max_concurrent_jobs = 1;
        let scheduler = Scheduler::new(services(), config);
        let log: StdArc<TokioMutex<Vec<String>>> = StdArc::new(TokioMutex::new(Vec::new()));
        scheduler
            .register_plugin("recording", Arc::new(Recording { log: log.clone() }), 0, true)
            .await;

        let low = scheduler.enqueue("recording", json!({ "label": "low" }), 1, None, 0).await.unwrap();
        let mid = scheduler.enqueue("recording", json!({ "label": "mid" }), 2, None, 0).await.unwrap();
        let high = scheduler.enqueue("recording", json!({ "label": "high" }), 3, None, 0).await.unwrap();

        // Drain with explicit ticks instead of the periodic timer.
        for _ in 0..3 {
            scheduler.tick().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let snap_high = scheduler.job(high).await.unwrap();
        let snap_mid = scheduler.job(mid).await.unwrap();
        let snap_low = scheduler.job(low).await.unwrap();
        assert!(matches!(snap_high.state, JobState::Completed));
        assert!(matches!(snap_mid.state, JobState::Completed));
        assert!(matches!(snap_low.state, JobState::Completed));

        let order = log.lock().await.clone();
        assert_eq!(order, vec!["high".to_string(), "mid".to_string(), "low".to_string()]);
    }

    #[tokio::test]
    async fn job_times_out() {
        let scheduler = Scheduler::new(services(), SchedulerConfig::default());
        scheduler.register_plugin("never", Arc::new(NeverCompletes), 0, true).await;
        let id = scheduler
            .enqueue("never", json!({}), 0, Some(Duration::from_millis(30)), 0)
            .await
            .unwrap();
        scheduler.tick().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        let snap = scheduler.job(id).await.unwrap();
        assert!(matches!(snap.state, JobState::Failed));
        assert!(snap.timed_out);
    }

    #[tokio::test]
    async fn failed_job_retries_then_fails() {
        let scheduler = Scheduler::new(services(), SchedulerConfig::default());
        scheduler.register_plugin("always-fails", Arc::new(AlwaysFails), 0, true).await;
        let id = scheduler.enqueue("always-fails", json!({}), 0, None, 2).await.unwrap();
        for _ in 0..4 {
            scheduler.tick().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let snap = scheduler.job(id).await.unwrap();
        assert!(matches!(snap.state, JobState::Failed));
        assert_eq!(snap.retry_count, 2);
    }

    #[tokio::test]
    async fn stop_is_idempotent_before_start() {
        let scheduler = Scheduler::new(services(), SchedulerConfig::default());
        scheduler.stop().await;
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn builtin_plugins_are_preregistered() {
        let scheduler = Scheduler::with_builtin_plugins(services(), SchedulerConfig::default()).await;
        for name in ["pln", "ecan", "patternMining", "goalProcessing", "memoryConsolidation"] {
            assert!(scheduler.enqueue(name, json!({}), 0, None, 0).await.is_ok());
        }
    }
}

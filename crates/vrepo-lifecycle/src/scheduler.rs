//! Background driver for expiry sweeps, memory optimization and health
//! checks.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{LifecycleError, LifecycleResult};
use crate::health::HealthStatus;
use crate::manager::CacheLifecycleManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupJob {
    ExpirySweep,
    MemoryOptimization,
    HealthCheck,
}

impl CleanupJob {
    pub const ALL: [CleanupJob; 3] = [
        CleanupJob::ExpirySweep,
        CleanupJob::MemoryOptimization,
        CleanupJob::HealthCheck,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CleanupJob::ExpirySweep => "expiry_sweep",
            CleanupJob::MemoryOptimization => "memory_optimization",
            CleanupJob::HealthCheck => "health_check",
        }
    }

    pub fn parse(name: &str) -> Option<CleanupJob> {
        Self::ALL.into_iter().find(|j| j.name() == name)
    }
}

impl fmt::Display for CleanupJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub sweep_interval: Duration,
    pub memory_interval: Duration,
    pub health_interval: Duration,
    /// How long `shutdown` waits for in-flight jobs.
    pub shutdown_timeout: Duration,
    pub history_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(300),
            memory_interval: Duration::from_secs(600),
            health_interval: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(10),
            history_limit: 100,
        }
    }
}

impl SchedulerConfig {
    fn interval_for(&self, job: CleanupJob) -> Duration {
        let interval = match job {
            CleanupJob::ExpirySweep => self.sweep_interval,
            CleanupJob::MemoryOptimization => self.memory_interval,
            CleanupJob::HealthCheck => self.health_interval,
        };
        if interval.is_zero() {
            let fallback = SchedulerConfig::default().interval_for(job);
            warn!(job = %job, fallback = ?fallback, "zero job interval, using default");
            return fallback;
        }
        interval
    }
}

/// Record of one job execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupJobResult {
    pub job: CleanupJob,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    pub entries_cleaned: usize,
    pub memory_freed: u64,
    pub error: Option<String>,
}

/// Running totals per job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub runs: u64,
    pub failures: u64,
    pub entries_cleaned: u64,
    pub memory_freed: u64,
    pub total_duration: Duration,
    pub last_run: Option<DateTime<Utc>>,
}

struct SchedulerState {
    lifecycle: CacheLifecycleManager,
    config: SchedulerConfig,
    history: Mutex<VecDeque<CleanupJobResult>>,
    stats: Mutex<BTreeMap<CleanupJob, JobStats>>,
    in_flight: Mutex<HashSet<CleanupJob>>,
}

/// Removes a job from the in-flight set when dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<CleanupJob>>,
    job: CleanupJob,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .expect("scheduler in-flight lock poisoned")
            .remove(&self.job);
    }
}

impl SchedulerState {
    fn claim(&self, job: CleanupJob) -> Option<InFlightGuard<'_>> {
        let mut in_flight = self.in_flight.lock().expect("scheduler in-flight lock poisoned");
        if !in_flight.insert(job) {
            return None;
        }
        Some(InFlightGuard {
            set: &self.in_flight,
            job,
        })
    }

    async fn run(&self, job: CleanupJob) -> Option<CleanupJobResult> {
        let Some(_guard) = self.claim(job) else {
            debug!(job = %job, "job already in flight, skipping");
            return None;
        };

        let started_at = Utc::now();
        let timer = Instant::now();
        let (success, entries_cleaned, memory_freed, error) = match job {
            CleanupJob::ExpirySweep => {
                let report = self.lifecycle.sweep_expired().await;
                (
                    true,
                    report.keys_removed + report.cache_entries_removed,
                    report.bytes_freed,
                    None,
                )
            }
            CleanupJob::MemoryOptimization => {
                let report = self.lifecycle.optimize_memory().await;
                (
                    true,
                    report.expired + report.evicted,
                    report.bytes_freed(),
                    None,
                )
            }
            CleanupJob::HealthCheck => {
                let report = self.lifecycle.health().await;
                let error = (report.status != HealthStatus::Healthy)
                    .then(|| format!("{}: {}", report.status, report.reasons.join("; ")));
                (report.status != HealthStatus::Unhealthy, 0, 0, error)
            }
        };

        let result = CleanupJobResult {
            job,
            success,
            started_at,
            finished_at: Utc::now(),
            duration: timer.elapsed(),
            entries_cleaned,
            memory_freed,
            error,
        };
        if result.success {
            debug!(job = %job, entries = entries_cleaned, bytes = memory_freed, "cleanup job finished");
        } else {
            warn!(job = %job, error = ?result.error, "cleanup job failed");
        }
        self.record(&result);
        Some(result)
    }

    fn record(&self, result: &CleanupJobResult) {
        {
            let mut history = self.history.lock().expect("scheduler history lock poisoned");
            while history.len() >= self.config.history_limit.max(1) {
                history.pop_front();
            }
            history.push_back(result.clone());
        }
        let mut stats = self.stats.lock().expect("scheduler stats lock poisoned");
        let entry = stats.entry(result.job).or_default();
        entry.runs += 1;
        if !result.success {
            entry.failures += 1;
        }
        entry.entries_cleaned += result.entries_cleaned as u64;
        entry.memory_freed += result.memory_freed;
        entry.total_duration += result.duration;
        entry.last_run = Some(result.finished_at);
    }
}

struct Running {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Runs each [`CleanupJob`] on its own interval.
///
/// A job never overlaps with itself: a tick that arrives while the previous
/// run is still going is skipped, and so is a [`run_now`](Self::run_now)
/// for a job already in flight.
pub struct CleanupScheduler {
    state: Arc<SchedulerState>,
    running: Mutex<Option<Running>>,
}

impl CleanupScheduler {
    pub fn new(lifecycle: CacheLifecycleManager, config: SchedulerConfig) -> Self {
        Self {
            state: Arc::new(SchedulerState {
                lifecycle,
                config,
                history: Mutex::new(VecDeque::new()),
                stats: Mutex::new(BTreeMap::new()),
                in_flight: Mutex::new(HashSet::new()),
            }),
            running: Mutex::new(None),
        }
    }

    /// Spawn one loop per job. Must be called inside a Tokio runtime.
    pub fn start(&self) -> LifecycleResult<()> {
        let mut running = self.running.lock().expect("scheduler lock poisoned");
        if running.is_some() {
            return Err(LifecycleError::SchedulerRunning);
        }

        let token = CancellationToken::new();
        let tasks = CleanupJob::ALL
            .into_iter()
            .map(|job| {
                let period = self.state.config.interval_for(job);
                tokio::spawn(job_loop(self.state.clone(), job, period, token.clone()))
            })
            .collect();
        *running = Some(Running { token, tasks });
        info!(
            sweep = ?self.state.config.sweep_interval,
            memory = ?self.state.config.memory_interval,
            health = ?self.state.config.health_interval,
            "cleanup scheduler started"
        );
        Ok(())
    }

    /// Cancel the loops and wait for in-flight jobs up to the configured
    /// timeout. Returns `false` if the wait timed out and tasks were
    /// aborted. Stopping a stopped scheduler is a no-op returning `true`.
    pub async fn shutdown(&self) -> bool {
        let Some(Running { token, tasks }) =
            self.running.lock().expect("scheduler lock poisoned").take()
        else {
            return true;
        };
        token.cancel();

        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        let timeout = self.state.config.shutdown_timeout;
        let joined = tokio::time::timeout(timeout, async {
            for task in tasks {
                if let Err(e) = task.await {
                    warn!(error = %e, "cleanup task ended abnormally");
                }
            }
        })
        .await;

        match joined {
            Ok(()) => {
                info!("cleanup scheduler stopped");
                true
            }
            Err(_) => {
                for abort in aborts {
                    abort.abort();
                }
                warn!(timeout = ?timeout, "cleanup scheduler shutdown timed out, tasks aborted");
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().expect("scheduler lock poisoned").is_some()
    }

    /// Run a job immediately. `None` if that job is already in flight.
    pub async fn run_now(&self, job: CleanupJob) -> Option<CleanupJobResult> {
        self.state.run(job).await
    }

    /// Most recent results, newest first.
    pub fn history(&self, limit: usize) -> Vec<CleanupJobResult> {
        self.state
            .history
            .lock()
            .expect("scheduler history lock poisoned")
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn job_stats(&self) -> BTreeMap<CleanupJob, JobStats> {
        self.state
            .stats
            .lock()
            .expect("scheduler stats lock poisoned")
            .clone()
    }

    pub fn lifecycle(&self) -> &CacheLifecycleManager {
        &self.state.lifecycle
    }
}

impl fmt::Debug for CleanupScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupScheduler")
            .field("running", &self.is_running())
            .field("config", &self.state.config)
            .finish()
    }
}

async fn job_loop(
    state: Arc<SchedulerState>,
    job: CleanupJob,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; jobs start one period in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                state.run(job).await;
            }
        }
    }
    debug!(job = %job, "cleanup loop exited");
}

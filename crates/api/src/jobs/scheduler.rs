//! Job scheduler infrastructure for background tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc, Weekday};
use domain::models::WallClockTrigger;
use domain::services::scheduling::send_hour_for;
use serde::Serialize;
use shared::validation::validate_trigger_time;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// When a job runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFrequency {
    /// Run every N seconds.
    Seconds(u64),
    /// Run every N minutes.
    Minutes(u64),
    /// Run at a fixed local time on selected weekdays.
    WallClock(WallClockTrigger),
}

impl JobFrequency {
    /// Interval between runs for the periodic variants.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            JobFrequency::Seconds(secs) => Some(Duration::from_secs(*secs)),
            JobFrequency::Minutes(mins) => Some(Duration::from_secs(*mins * 60)),
            JobFrequency::WallClock(_) => None,
        }
    }

    /// Next run strictly after `after`.
    pub fn next_run_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            JobFrequency::WallClock(trigger) => trigger.next_fire_after(after),
            _ => {
                let interval = chrono::Duration::from_std(self.interval()?).ok()?;
                after.checked_add_signed(interval)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            JobFrequency::Seconds(secs) => format!("every {}s", secs),
            JobFrequency::Minutes(mins) => format!("every {}m", mins),
            JobFrequency::WallClock(trigger) => trigger.describe(),
        }
    }
}

/// Reasons the scheduler refuses to start.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Job {job} has an invalid trigger: {reason}")]
    InvalidTrigger { job: String, reason: String },

    #[error(
        "Job {job} fires at {hour:02}:00 on {weekday}, but passes for that day are sent at {expected:02}:00"
    )]
    Misaligned {
        job: String,
        weekday: Weekday,
        hour: u32,
        expected: u32,
    },

    #[error("Scheduler already started")]
    AlreadyStarted,
}

/// Checks a job's trigger before it is scheduled.
///
/// Wall-clock triggers must fire in the hour passes for each of their
/// weekdays are scheduled for, otherwise due passes would wait for the
/// next trigger.
pub fn validate_frequency(job: &str, frequency: &JobFrequency) -> Result<(), SchedulerError> {
    let invalid = |reason: String| SchedulerError::InvalidTrigger {
        job: job.to_string(),
        reason,
    };

    match frequency {
        JobFrequency::Seconds(0) | JobFrequency::Minutes(0) => {
            Err(invalid("interval must be positive".to_string()))
        }
        JobFrequency::Seconds(_) | JobFrequency::Minutes(_) => Ok(()),
        JobFrequency::WallClock(trigger) => {
            validate_trigger_time(trigger.hour, trigger.minute).map_err(|_| {
                invalid(format!(
                    "{:02}:{:02} is not a valid time",
                    trigger.hour, trigger.minute
                ))
            })?;
            if trigger.weekdays.is_empty() {
                return Err(invalid("no weekdays configured".to_string()));
            }
            for &weekday in &trigger.weekdays {
                let expected = send_hour_for(weekday);
                if trigger.hour != expected {
                    return Err(SchedulerError::Misaligned {
                        job: job.to_string(),
                        weekday,
                        hour: trigger.hour,
                        expected,
                    });
                }
            }
            Ok(())
        }
    }
}

/// Trait for implementing background jobs.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// The name of this job (used for logging).
    fn name(&self) -> &str;

    /// When this job should run.
    fn frequency(&self) -> JobFrequency;

    /// Execute the job. Returns Ok(()) on success, Err with message on failure.
    async fn execute(&self) -> Result<(), String>;
}

/// Schedule of one registered job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub name: String,
    pub schedule: String,
    pub next_run: Option<DateTime<Utc>>,
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerInfo {
    pub running: bool,
    pub jobs: Vec<JobInfo>,
}

/// Scheduler state shared with the HTTP layer.
#[derive(Debug, Default)]
pub struct SchedulerStatus {
    running: AtomicBool,
    jobs: Mutex<Vec<(String, JobFrequency)>>,
}

impl SchedulerStatus {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SchedulerInfo {
        let jobs = self
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, frequency)| JobInfo {
                name: name.clone(),
                schedule: frequency.describe(),
                next_run: frequency.next_run_after(now),
            })
            .collect();

        SchedulerInfo {
            running: self.is_running(),
            jobs,
        }
    }

    fn add(&self, name: String, frequency: JobFrequency) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name, frequency));
    }
}

/// Background job scheduler.
pub struct JobScheduler {
    jobs: Vec<Arc<dyn Job>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
    status: Arc<SchedulerStatus>,
}

impl JobScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
            status: Arc::new(SchedulerStatus::default()),
        }
    }

    /// Register a job with the scheduler.
    pub fn register<J: Job + 'static>(&mut self, job: J) {
        self.status.add(job.name().to_string(), job.frequency());
        self.jobs.push(Arc::new(job));
    }

    /// Handle for reporting the schedule elsewhere.
    pub fn status(&self) -> Arc<SchedulerStatus> {
        Arc::clone(&self.status)
    }

    /// Validates every trigger, then starts all registered jobs.
    ///
    /// Nothing is spawned if any trigger is rejected.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.status.is_running() {
            return Err(SchedulerError::AlreadyStarted);
        }
        for job in &self.jobs {
            validate_frequency(job.name(), &job.frequency())?;
        }

        info!("Starting job scheduler with {} jobs", self.jobs.len());

        for job in &self.jobs {
            let job = Arc::clone(job);
            let shutdown_rx = self.shutdown_rx.clone();
            let handle = match job.frequency() {
                JobFrequency::WallClock(trigger) => {
                    tokio::spawn(run_wall_clock(job, trigger, shutdown_rx))
                }
                periodic => {
                    // validated above
                    let period = periodic.interval().unwrap_or(Duration::from_secs(60));
                    tokio::spawn(run_periodic(job, period, shutdown_rx))
                }
            };
            self.handles.push(handle);
        }

        self.status.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Initiate graceful shutdown of all jobs.
    /// Returns immediately after signaling shutdown.
    pub fn shutdown(&self) {
        info!("Initiating job scheduler shutdown");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for all jobs to complete with timeout.
    pub async fn wait_for_shutdown(self, timeout: Duration) {
        info!("Waiting for jobs to complete (timeout: {:?})", timeout);

        let status = Arc::clone(&self.status);
        let shutdown_future = async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    warn!("Job task panicked: {}", e);
                }
            }
        };

        match tokio::time::timeout(timeout, shutdown_future).await {
            Ok(()) => info!("All jobs completed gracefully"),
            Err(_) => warn!("Job shutdown timed out after {:?}", timeout),
        }
        status.running.store(false, Ordering::SeqCst);
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_periodic(job: Arc<dyn Job>, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let name = job.name().to_string();
    let mut interval = tokio::time::interval(period);

    // Skip the first immediate tick
    interval.tick().await;

    info!(job = %name, every_secs = period.as_secs(), "Job scheduled");

    loop {
        tokio::select! {
            _ = interval.tick() => execute_logged(job.as_ref(), &name).await,
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!(job = %name, "Job shutting down");
                    break;
                }
            }
        }
    }
}

async fn run_wall_clock(
    job: Arc<dyn Job>,
    trigger: WallClockTrigger,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let name = job.name().to_string();
    let mut last_fire: Option<DateTime<Utc>> = None;

    loop {
        let now = Utc::now();
        let after = last_fire.map_or(now, |fired| fired.max(now));
        let Some(next) = trigger.next_fire_after(after) else {
            error!(job = %name, trigger = %trigger.describe(), "Trigger never fires, stopping job");
            break;
        };
        let wait = (next - now).to_std().unwrap_or_default();

        info!(job = %name, next_run = %next, "Job scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                last_fire = Some(next);
                execute_logged(job.as_ref(), &name).await;
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!(job = %name, "Job shutting down");
                    break;
                }
            }
        }
    }
}

async fn execute_logged(job: &dyn Job, name: &str) {
    let start = std::time::Instant::now();
    info!(job = name, "Job starting");

    match job.execute().await {
        Ok(()) => info!(
            job = name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Job completed successfully"
        ),
        Err(e) => error!(
            job = name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            error = %e,
            "Job failed"
        ),
    }
}

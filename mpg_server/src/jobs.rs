//! Background jobs: one reconciliation poller per configured payment method, plus the daily janitor.
//!
//! Every job body runs under its own named lock, so when several server instances share a database only one of them
//! does the work on each tick. The others log that the job is busy and wait for the next one.
use std::{fmt::Display, sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, Duration, TimeZone, Utc};
use log::*;
use mpg_engine::{
    db_types::PaymentMethod,
    events::EventProducers,
    traits::PaymentGatewayDatabase,
    OrderFlowError,
    ReconciliationApi,
    SqliteDatabase,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{config::ServerConfig, errors::ServerError, server::EngineComponents};

pub const JANITOR_JOB_NAME: &str = "janitor";
const RECONCILE_JOB_PREFIX: &str = "reconcile:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Drive `NOT_PAID` orders past the grace window to a terminal state.
    Reconcile(PaymentMethod),
    /// Delete closed orders past the retention period.
    Janitor,
}

impl Job {
    pub fn name(&self) -> String {
        match self {
            Job::Reconcile(m) => format!("{RECONCILE_JOB_PREFIX}{m}"),
            Job::Janitor => JANITOR_JOB_NAME.to_string(),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        if name == JANITOR_JOB_NAME {
            return Some(Job::Janitor);
        }
        name.strip_prefix(RECONCILE_JOB_PREFIX).and_then(|m| m.parse::<PaymentMethod>().ok()).map(Job::Reconcile)
    }

    /// Runs the job body once and returns a one-line summary.
    pub async fn run<B: PaymentGatewayDatabase>(&self, api: &ReconciliationApi<B>) -> Result<String, OrderFlowError> {
        match self {
            Job::Reconcile(method) => {
                let report = api.reconcile_method(*method).await?;
                if !report.failed.is_empty() {
                    warn!("⏲️ {method} orders that could not be reconciled this pass: {:?}", report.failed);
                }
                Ok(report.summary())
            },
            Job::Janitor => {
                let deleted = api.purge_stale_orders().await?;
                Ok(format!("{deleted} stale orders deleted"))
            },
        }
    }
}

impl Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Every(StdDuration),
    /// Once a day, at the top of the given hour (UTC).
    DailyAt { hour: u32 },
}

impl Schedule {
    /// How long to wait, from `now`, before the next run.
    pub fn delay_from(&self, now: DateTime<Utc>) -> StdDuration {
        match self {
            Schedule::Every(period) => *period,
            Schedule::DailyAt { hour } => (next_daily_run(now, *hour) - now).to_std().unwrap_or_default(),
        }
    }
}

/// The first time strictly after `now` at which the clock reads `hour:00:00` UTC.
pub fn next_daily_run(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let today = now.date_naive().and_hms_opt(hour.min(23), 0, 0).map(|t| Utc.from_utc_datetime(&t));
    match today {
        Some(t) if t > now => t,
        Some(t) => t + Duration::days(1),
        None => now + Duration::days(1),
    }
}

pub struct ScheduledJob {
    pub job: Job,
    pub schedule: Schedule,
    api: Arc<ReconciliationApi<SqliteDatabase>>,
}

impl ScheduledJob {
    pub fn new(job: Job, schedule: Schedule, api: Arc<ReconciliationApi<SqliteDatabase>>) -> Self {
        Self { job, schedule, api }
    }

    /// One run of the job. Errors are logged and never stop the schedule.
    pub async fn run_once(&self) {
        match self.job.run(self.api.as_ref()).await {
            Ok(summary) => info!("⏲️ {}: {summary}", self.job),
            Err(e) if e.is_busy() => info!("⏲️ {} is already running elsewhere. Skipping this run. {e}", self.job),
            Err(e) => error!("⏲️ {} failed. {e}", self.job),
        }
    }

    /// Starts the job on its schedule. Do not await the returned JoinHandle, as it will run indefinitely.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("⏲️ {} started. Schedule: {:?}", self.job, self.schedule);
            match self.schedule {
                Schedule::Every(period) => {
                    let mut timer = tokio::time::interval(period);
                    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        timer.tick().await;
                        self.run_once().await;
                    }
                },
                Schedule::DailyAt { .. } => loop {
                    let delay = self.schedule.delay_from(Utc::now());
                    debug!("⏲️ Next {} run in {}s", self.job, delay.as_secs());
                    tokio::time::sleep(delay).await;
                    self.run_once().await;
                },
            }
        })
    }
}

/// The jobs this server runs: a poller per registered payment method and the janitor.
pub fn job_schedule(config: &ServerConfig, methods: &[PaymentMethod]) -> Vec<(Job, Schedule)> {
    let mut jobs = methods
        .iter()
        .map(|m| {
            let period = match m {
                PaymentMethod::Alipay => config.alipay_reconcile_interval,
                PaymentMethod::WechatPay => config.wx_reconcile_interval,
            };
            (Job::Reconcile(*m), Schedule::Every(period))
        })
        .collect::<Vec<_>>();
    jobs.push((Job::Janitor, Schedule::DailyAt { hour: config.janitor_hour }));
    jobs
}

pub fn start_jobs(config: &ServerConfig, engine: &EngineComponents) -> Vec<JoinHandle<()>> {
    let api = Arc::new(engine.reconciliation_api());
    job_schedule(config, &engine.registry.methods())
        .into_iter()
        .map(|(job, schedule)| ScheduledJob::new(job, schedule, Arc::clone(&api)).start())
        .collect()
}

/// Runs a single job immediately, outside its schedule. Used by the `run-job` command.
pub async fn run_job_by_name(config: &ServerConfig, name: &str) -> Result<String, ServerError> {
    let job = Job::from_name(name).ok_or_else(|| {
        ServerError::ConfigurationError(format!(
            "Unknown job '{name}'. Valid jobs are {JANITOR_JOB_NAME}, {RECONCILE_JOB_PREFIX}ALIPAY and \
             {RECONCILE_JOB_PREFIX}WX"
        ))
    })?;
    let engine = EngineComponents::connect(config, EventProducers::default()).await?;
    let api = engine.reconciliation_api();
    let summary = job.run(&api).await?;
    Ok(summary)
}

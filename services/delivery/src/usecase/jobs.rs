use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::repository::JobRepository;
use crate::domain::types::{DEFAULT_JOB_MAX_ATTEMPTS, Enqueued, Job, JobSchedule, NewJob};
use crate::error::DeliveryServiceError;
use crate::usecase::backoff;

/// Work executed for one job of one queue.
///
/// Handlers run inside a spawned task so a panic only fails that job.
/// Returning `Err` schedules a retry until the job's attempts run out.
pub trait JobHandler: Send + Sync + 'static {
    fn handle(&self, job: Job) -> impl Future<Output = anyhow::Result<()>> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    /// Run no earlier than `now + delay`.
    pub delay: Option<Duration>,
    pub max_attempts: Option<u32>,
}

/// Backoff between job attempts.
#[derive(Debug, Clone, Copy)]
pub struct JobRetryPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for JobRetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            max: Duration::from_secs(600),
        }
    }
}

impl JobRetryPolicy {
    pub fn delay(&self, attempts: u32) -> Duration {
        backoff::exponential(self.base, self.max, attempts)
    }
}

/// Next cron occurrence strictly after `after`, evaluated in `timezone`.
pub fn next_occurrence(
    cron_pattern: &str,
    timezone: &str,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, DeliveryServiceError> {
    let schedule = cron::Schedule::from_str(cron_pattern).map_err(|e| {
        DeliveryServiceError::InvalidSchedule(format!("cron pattern {cron_pattern:?}: {e}"))
    })?;
    let tz: chrono_tz::Tz = timezone
        .parse()
        .map_err(|_| DeliveryServiceError::InvalidSchedule(format!("timezone {timezone:?}")))?;
    schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| {
            DeliveryServiceError::InvalidSchedule(format!(
                "cron pattern {cron_pattern:?} has no upcoming occurrence"
            ))
        })
}

/// Job key of one materialised occurrence of a recurring schedule.
pub fn occurrence_key(schedule_name: &str, occurrence: DateTime<Utc>) -> String {
    format!("{schedule_name}:{}", occurrence.timestamp())
}

pub struct JobQueue<R: JobRepository> {
    pub repo: R,
    pub default_max_attempts: u32,
}

impl<R: JobRepository> JobQueue<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            default_max_attempts: DEFAULT_JOB_MAX_ATTEMPTS,
        }
    }

    /// Submit an on-demand job. A second submission with the same
    /// `(queue, job_key)` is a no-op returning the existing job.
    pub async fn enqueue(
        &self,
        queue: &str,
        job_key: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<Enqueued, DeliveryServiceError> {
        let mut run_at = Utc::now();
        if let Some(delay) = options.delay {
            run_at += chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        }
        let job = NewJob {
            queue: queue.to_owned(),
            job_key: job_key.to_owned(),
            payload,
            run_at,
            max_attempts: options.max_attempts.unwrap_or(self.default_max_attempts).max(1),
        };
        let enqueued = self.repo.insert_if_absent(&job).await?;
        if enqueued.is_duplicate() {
            tracing::debug!(queue, job_key, job_id = %enqueued.job_id(), "duplicate job suppressed");
        }
        Ok(enqueued)
    }

    /// Register or update a recurring schedule. Re-registering an identical
    /// schedule leaves it untouched. Returns the next run time.
    pub async fn register_recurring(
        &self,
        queue: &str,
        schedule_name: &str,
        cron_pattern: &str,
        timezone: &str,
        payload: serde_json::Value,
    ) -> Result<DateTime<Utc>, DeliveryServiceError> {
        let next_run_at = next_occurrence(cron_pattern, timezone, Utc::now())?;

        if let Some(existing) = self.repo.find_schedule(queue, schedule_name).await? {
            if existing.cron_pattern == cron_pattern
                && existing.timezone == timezone
                && existing.payload == payload
            {
                return Ok(existing.next_run_at);
            }
        }

        self.repo
            .upsert_schedule(&JobSchedule {
                queue: queue.to_owned(),
                schedule_name: schedule_name.to_owned(),
                cron_pattern: cron_pattern.to_owned(),
                timezone: timezone.to_owned(),
                payload,
                next_run_at,
            })
            .await?;
        tracing::info!(queue, schedule_name, cron_pattern, timezone, %next_run_at, "registered recurring job");
        Ok(next_run_at)
    }

    /// Turn every due schedule occurrence into a job. Safe to run from many
    /// instances: occurrences are deduplicated by job key and each schedule
    /// only advances from the occurrence it was read at.
    pub async fn fire_due_schedules(&self, now: DateTime<Utc>) -> Result<usize, DeliveryServiceError> {
        let mut fired = 0;
        for schedule in self.repo.due_schedules(now).await? {
            let next = match next_occurrence(&schedule.cron_pattern, &schedule.timezone, now) {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!(
                        queue = %schedule.queue,
                        schedule_name = %schedule.schedule_name,
                        error = %e,
                        "skipping schedule with invalid pattern"
                    );
                    continue;
                }
            };

            let occurrence = schedule.next_run_at;
            let key = occurrence_key(&schedule.schedule_name, occurrence);
            let enqueued = self
                .enqueue(
                    &schedule.queue,
                    &key,
                    schedule.payload.clone(),
                    EnqueueOptions::default(),
                )
                .await?;
            self.repo
                .advance_schedule(&schedule.queue, &schedule.schedule_name, occurrence, next)
                .await?;
            if !enqueued.is_duplicate() {
                fired += 1;
            }
        }
        Ok(fired)
    }
}

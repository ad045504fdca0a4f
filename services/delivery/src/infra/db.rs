use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Statement,
    sea_query::{Expr, OnConflict},
};

use courier_delivery_schema::{
    idempotency_records, job_schedules, jobs, webhook_calls, webhook_subscriptions,
};
use courier_domain::id::{JobId, SubscriptionId, TeamId, WebhookCallId};
use courier_domain::pagination::PageRequest;

use crate::domain::repository::{
    IdempotencyRepository, JobRepository, SubscriptionRepository, WebhookCallRepository,
};
use crate::domain::types::{
    AttemptResult, Enqueued, IdempotencyRecord, Job, JobSchedule, JobStatus, NewJob,
    WebhookCall, WebhookCallStatus, WebhookSubscription,
};
use crate::error::DeliveryServiceError;

fn page_bounds(page: PageRequest) -> (u64, u64) {
    (page.offset(), u64::from(page.clamped().limit))
}

fn status_strs(statuses: &[WebhookCallStatus]) -> Vec<&'static str> {
    statuses.iter().map(WebhookCallStatus::as_str).collect()
}

// ── Idempotency repository ───────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbIdempotencyRepository {
    pub db: DatabaseConnection,
}

impl IdempotencyRepository for DbIdempotencyRepository {
    async fn find_active(
        &self,
        team_id: TeamId,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>, DeliveryServiceError> {
        let model = idempotency_records::Entity::find()
            .filter(idempotency_records::Column::TeamId.eq(team_id.0))
            .filter(idempotency_records::Column::IdempotencyKey.eq(key))
            .filter(idempotency_records::Column::ExpiresAt.gt(now))
            .one(&self.db)
            .await
            .context("find idempotency record")?;
        Ok(model.map(idempotency_record_from_model))
    }

    async fn insert_if_absent(
        &self,
        record: &IdempotencyRecord,
    ) -> Result<bool, DeliveryServiceError> {
        // An expired record still occupies the unique slot until the sweep runs.
        idempotency_records::Entity::delete_many()
            .filter(idempotency_records::Column::TeamId.eq(record.team_id.0))
            .filter(idempotency_records::Column::IdempotencyKey.eq(record.key.as_str()))
            .filter(idempotency_records::Column::ExpiresAt.lte(record.created_at))
            .exec(&self.db)
            .await
            .context("delete expired idempotency record")?;

        let model = idempotency_records::ActiveModel {
            id: Set(uuid::Uuid::new_v4()),
            team_id: Set(record.team_id.0),
            idempotency_key: Set(record.key.clone()),
            payload_hash: Set(record.payload_hash.clone()),
            response: Set(record.response.clone()),
            created_at: Set(record.created_at),
            expires_at: Set(record.expires_at),
        };
        let inserted = idempotency_records::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    idempotency_records::Column::TeamId,
                    idempotency_records::Column::IdempotencyKey,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .context("insert idempotency record")?;
        Ok(inserted == 1)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, DeliveryServiceError> {
        let result = idempotency_records::Entity::delete_many()
            .filter(idempotency_records::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await
            .context("delete expired idempotency records")?;
        Ok(result.rows_affected)
    }
}

fn idempotency_record_from_model(model: idempotency_records::Model) -> IdempotencyRecord {
    IdempotencyRecord {
        team_id: TeamId(model.team_id),
        key: model.idempotency_key,
        payload_hash: model.payload_hash,
        response: model.response,
        created_at: model.created_at,
        expires_at: model.expires_at,
    }
}

// ── Subscription repository ──────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbSubscriptionRepository {
    pub db: DatabaseConnection,
}

fn subscription_active_model(
    s: &WebhookSubscription,
) -> Result<webhook_subscriptions::ActiveModel, DeliveryServiceError> {
    Ok(webhook_subscriptions::ActiveModel {
        id: Set(s.id.0),
        team_id: Set(s.team_id.0),
        url: Set(s.url.clone()),
        secret: Set(s.secret.clone()),
        event_types: Set(serde_json::to_value(&s.event_types).context("encode event types")?),
        domain_ids: Set(serde_json::to_value(&s.domain_ids).context("encode domain ids")?),
        enabled: Set(s.enabled),
        description: Set(s.description.clone()),
        created_at: Set(s.created_at),
        updated_at: Set(s.updated_at),
    })
}

impl SubscriptionRepository for DbSubscriptionRepository {
    async fn create(
        &self,
        subscription: &WebhookSubscription,
    ) -> Result<(), DeliveryServiceError> {
        webhook_subscriptions::Entity::insert(subscription_active_model(subscription)?)
            .exec_without_returning(&self.db)
            .await
            .context("insert webhook subscription")?;
        Ok(())
    }

    async fn find(
        &self,
        team_id: TeamId,
        id: SubscriptionId,
    ) -> Result<Option<WebhookSubscription>, DeliveryServiceError> {
        let model = webhook_subscriptions::Entity::find_by_id(id.0)
            .filter(webhook_subscriptions::Column::TeamId.eq(team_id.0))
            .one(&self.db)
            .await
            .context("find webhook subscription")?;
        Ok(model.map(subscription_from_model).transpose()?)
    }

    async fn find_by_id(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<WebhookSubscription>, DeliveryServiceError> {
        let model = webhook_subscriptions::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find webhook subscription by id")?;
        Ok(model.map(subscription_from_model).transpose()?)
    }

    async fn list_by_team(
        &self,
        team_id: TeamId,
        page: PageRequest,
    ) -> Result<Vec<WebhookSubscription>, DeliveryServiceError> {
        let (offset, limit) = page_bounds(page);
        let models = webhook_subscriptions::Entity::find()
            .filter(webhook_subscriptions::Column::TeamId.eq(team_id.0))
            .order_by_desc(webhook_subscriptions::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await
            .context("list webhook subscriptions")?;
        Ok(models
            .into_iter()
            .map(subscription_from_model)
            .collect::<Result<_, _>>()?)
    }

    async fn list_enabled_by_team(
        &self,
        team_id: TeamId,
    ) -> Result<Vec<WebhookSubscription>, DeliveryServiceError> {
        let models = webhook_subscriptions::Entity::find()
            .filter(webhook_subscriptions::Column::TeamId.eq(team_id.0))
            .filter(webhook_subscriptions::Column::Enabled.eq(true))
            .all(&self.db)
            .await
            .context("list enabled webhook subscriptions")?;
        Ok(models
            .into_iter()
            .map(subscription_from_model)
            .collect::<Result<_, _>>()?)
    }

    async fn update(
        &self,
        subscription: &WebhookSubscription,
    ) -> Result<bool, DeliveryServiceError> {
        let mut model = subscription_active_model(subscription)?;
        model.id = sea_orm::ActiveValue::NotSet;
        model.team_id = sea_orm::ActiveValue::NotSet;
        model.created_at = sea_orm::ActiveValue::NotSet;
        let result = webhook_subscriptions::Entity::update_many()
            .set(model)
            .filter(webhook_subscriptions::Column::Id.eq(subscription.id.0))
            .filter(webhook_subscriptions::Column::TeamId.eq(subscription.team_id.0))
            .exec(&self.db)
            .await
            .context("update webhook subscription")?;
        Ok(result.rows_affected > 0)
    }

    async fn delete(
        &self,
        team_id: TeamId,
        id: SubscriptionId,
    ) -> Result<bool, DeliveryServiceError> {
        let result = webhook_subscriptions::Entity::delete_many()
            .filter(webhook_subscriptions::Column::Id.eq(id.0))
            .filter(webhook_subscriptions::Column::TeamId.eq(team_id.0))
            .exec(&self.db)
            .await
            .context("delete webhook subscription")?;
        Ok(result.rows_affected > 0)
    }
}

fn subscription_from_model(
    model: webhook_subscriptions::Model,
) -> Result<WebhookSubscription, anyhow::Error> {
    Ok(WebhookSubscription {
        id: SubscriptionId(model.id),
        team_id: TeamId(model.team_id),
        url: model.url,
        secret: model.secret,
        event_types: serde_json::from_value(model.event_types).context("decode event types")?,
        domain_ids: serde_json::from_value(model.domain_ids).context("decode domain ids")?,
        enabled: model.enabled,
        description: model.description,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

// ── Webhook call repository ──────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbWebhookCallRepository {
    pub db: DatabaseConnection,
}

impl WebhookCallRepository for DbWebhookCallRepository {
    async fn create_many(&self, calls: &[WebhookCall]) -> Result<(), DeliveryServiceError> {
        if calls.is_empty() {
            return Ok(());
        }
        let models = calls.iter().map(|c| webhook_calls::ActiveModel {
            id: Set(c.id.0),
            subscription_id: Set(c.subscription_id.0),
            team_id: Set(c.team_id.0),
            event_id: Set(c.event_id.0),
            event_type: Set(c.event_type.as_str().to_owned()),
            payload: Set(c.payload.clone()),
            status: Set(c.status.as_str().to_owned()),
            attempt: Set(c.attempt as i32),
            max_attempts: Set(c.max_attempts as i32),
            next_attempt_at: Set(c.next_attempt_at),
            response_status: Set(c.response_status.map(i32::from)),
            response_body: Set(c.response_body.clone()),
            response_time_ms: Set(c.response_time_ms),
            last_error: Set(c.last_error.clone()),
            created_at: Set(c.created_at),
            last_attempt_at: Set(c.last_attempt_at),
            updated_at: Set(c.updated_at),
        });
        webhook_calls::Entity::insert_many(models)
            .exec_without_returning(&self.db)
            .await
            .context("insert webhook calls")?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: WebhookCallId,
    ) -> Result<Option<WebhookCall>, DeliveryServiceError> {
        let model = webhook_calls::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find webhook call")?;
        Ok(model.map(webhook_call_from_model).transpose()?)
    }

    async fn list_by_subscription(
        &self,
        subscription_id: SubscriptionId,
        page: PageRequest,
    ) -> Result<Vec<WebhookCall>, DeliveryServiceError> {
        let (offset, limit) = page_bounds(page);
        let models = webhook_calls::Entity::find()
            .filter(webhook_calls::Column::SubscriptionId.eq(subscription_id.0))
            .order_by_desc(webhook_calls::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await
            .context("list webhook calls")?;
        Ok(models
            .into_iter()
            .map(webhook_call_from_model)
            .collect::<Result<_, _>>()?)
    }

    async fn claim_attempt(
        &self,
        id: WebhookCallId,
        expected_attempt: u32,
        from: &[WebhookCallStatus],
        now: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError> {
        let result = webhook_calls::Entity::update_many()
            .col_expr(
                webhook_calls::Column::Status,
                Expr::value(WebhookCallStatus::InProgress.as_str()),
            )
            .col_expr(
                webhook_calls::Column::Attempt,
                Expr::value(expected_attempt as i32 + 1),
            )
            .col_expr(webhook_calls::Column::LastAttemptAt, Expr::value(Some(now)))
            .col_expr(
                webhook_calls::Column::NextAttemptAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(webhook_calls::Column::UpdatedAt, Expr::value(now))
            .filter(webhook_calls::Column::Id.eq(id.0))
            .filter(webhook_calls::Column::Attempt.eq(expected_attempt as i32))
            .filter(webhook_calls::Column::Status.is_in(status_strs(from)))
            .exec(&self.db)
            .await
            .context("claim webhook call attempt")?;
        Ok(result.rows_affected == 1)
    }

    async fn record_attempt(
        &self,
        id: WebhookCallId,
        attempt: u32,
        result: &AttemptResult,
    ) -> Result<bool, DeliveryServiceError> {
        let updated = webhook_calls::Entity::update_many()
            .col_expr(webhook_calls::Column::Status, Expr::value(result.status.as_str()))
            .col_expr(
                webhook_calls::Column::NextAttemptAt,
                Expr::value(result.next_attempt_at),
            )
            .col_expr(
                webhook_calls::Column::ResponseStatus,
                Expr::value(result.response_status.map(i32::from)),
            )
            .col_expr(
                webhook_calls::Column::ResponseBody,
                Expr::value(result.response_body.clone()),
            )
            .col_expr(
                webhook_calls::Column::ResponseTimeMs,
                Expr::value(result.response_time_ms),
            )
            .col_expr(
                webhook_calls::Column::LastError,
                Expr::value(result.last_error.clone()),
            )
            .col_expr(webhook_calls::Column::UpdatedAt, Expr::value(result.finished_at))
            .filter(webhook_calls::Column::Id.eq(id.0))
            .filter(webhook_calls::Column::Attempt.eq(attempt as i32))
            .filter(webhook_calls::Column::Status.eq(WebhookCallStatus::InProgress.as_str()))
            .exec(&self.db)
            .await
            .context("record webhook call attempt")?;
        Ok(updated.rows_affected == 1)
    }

    async fn discard(
        &self,
        id: WebhookCallId,
        expected_attempt: u32,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError> {
        let result = discard_query(reason, now)
            .filter(webhook_calls::Column::Id.eq(id.0))
            .filter(webhook_calls::Column::Attempt.eq(expected_attempt as i32))
            .exec(&self.db)
            .await
            .context("discard webhook call")?;
        Ok(result.rows_affected == 1)
    }

    async fn discard_open_for_subscription(
        &self,
        subscription_id: SubscriptionId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DeliveryServiceError> {
        let result = discard_query(reason, now)
            .filter(webhook_calls::Column::SubscriptionId.eq(subscription_id.0))
            .exec(&self.db)
            .await
            .context("discard open webhook calls")?;
        Ok(result.rows_affected)
    }

    async fn list_due_failed(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<WebhookCall>, DeliveryServiceError> {
        let models = webhook_calls::Entity::find()
            .filter(webhook_calls::Column::Status.eq(WebhookCallStatus::Failed.as_str()))
            .filter(webhook_calls::Column::NextAttemptAt.lte(now))
            .filter(
                Expr::col(webhook_calls::Column::Attempt)
                    .lt(Expr::col(webhook_calls::Column::MaxAttempts)),
            )
            .order_by_asc(webhook_calls::Column::NextAttemptAt)
            .limit(limit)
            .all(&self.db)
            .await
            .context("list due failed webhook calls")?;
        Ok(models
            .into_iter()
            .map(webhook_call_from_model)
            .collect::<Result<_, _>>()?)
    }

    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<WebhookCall>, DeliveryServiceError> {
        let models = webhook_calls::Entity::find()
            .filter(webhook_calls::Column::Status.eq(WebhookCallStatus::Pending.as_str()))
            .filter(webhook_calls::Column::CreatedAt.lt(created_before))
            .order_by_asc(webhook_calls::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
            .context("list stale pending webhook calls")?;
        Ok(models
            .into_iter()
            .map(webhook_call_from_model)
            .collect::<Result<_, _>>()?)
    }

    async fn fail_stalled(
        &self,
        started_before: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DeliveryServiceError> {
        let stalled = || {
            webhook_calls::Entity::update_many()
                .col_expr(webhook_calls::Column::LastError, Expr::value(error))
                .col_expr(webhook_calls::Column::UpdatedAt, Expr::value(now))
                .filter(
                    webhook_calls::Column::Status.eq(WebhookCallStatus::InProgress.as_str()),
                )
                .filter(webhook_calls::Column::LastAttemptAt.lt(started_before))
        };

        let exhausted = stalled()
            .col_expr(
                webhook_calls::Column::Status,
                Expr::value(WebhookCallStatus::Discarded.as_str()),
            )
            .filter(
                Expr::col(webhook_calls::Column::Attempt)
                    .gte(Expr::col(webhook_calls::Column::MaxAttempts)),
            )
            .exec(&self.db)
            .await
            .context("discard stalled webhook calls")?;

        let retryable = stalled()
            .col_expr(
                webhook_calls::Column::Status,
                Expr::value(WebhookCallStatus::Failed.as_str()),
            )
            .col_expr(webhook_calls::Column::NextAttemptAt, Expr::value(Some(now)))
            .exec(&self.db)
            .await
            .context("fail stalled webhook calls")?;

        Ok(exhausted.rows_affected + retryable.rows_affected)
    }

    async fn delete_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DeliveryServiceError> {
        let result = webhook_calls::Entity::delete_many()
            .filter(webhook_calls::Column::CreatedAt.lt(cutoff))
            .exec(&self.db)
            .await
            .context("delete old webhook calls")?;
        Ok(result.rows_affected)
    }
}

fn discard_query(reason: &str, now: DateTime<Utc>) -> sea_orm::UpdateMany<webhook_calls::Entity> {
    webhook_calls::Entity::update_many()
        .col_expr(
            webhook_calls::Column::Status,
            Expr::value(WebhookCallStatus::Discarded.as_str()),
        )
        .col_expr(webhook_calls::Column::LastError, Expr::value(reason))
        .col_expr(
            webhook_calls::Column::NextAttemptAt,
            Expr::value(Option::<DateTime<Utc>>::None),
        )
        .col_expr(webhook_calls::Column::UpdatedAt, Expr::value(now))
        .filter(webhook_calls::Column::Status.is_in(status_strs(&WebhookCallStatus::OPEN)))
}

fn webhook_call_from_model(model: webhook_calls::Model) -> Result<WebhookCall, anyhow::Error> {
    Ok(WebhookCall {
        id: WebhookCallId(model.id),
        subscription_id: SubscriptionId(model.subscription_id),
        team_id: TeamId(model.team_id),
        event_id: model.event_id.into(),
        event_type: model
            .event_type
            .parse()
            .with_context(|| format!("webhook call {} event type", model.id))?,
        payload: model.payload,
        status: model.status.parse()?,
        attempt: model.attempt.max(0) as u32,
        max_attempts: model.max_attempts.max(0) as u32,
        next_attempt_at: model.next_attempt_at,
        response_status: model.response_status.and_then(|s| u16::try_from(s).ok()),
        response_body: model.response_body,
        response_time_ms: model.response_time_ms,
        last_error: model.last_error,
        created_at: model.created_at,
        last_attempt_at: model.last_attempt_at,
        updated_at: model.updated_at,
    })
}

// ── Job repository ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbJobRepository {
    pub db: DatabaseConnection,
}

const CLAIM_NEXT_JOB_SQL: &str = r#"
    UPDATE jobs
    SET status = 'running', attempts = attempts + 1, locked_until = $3
    WHERE id = (
        SELECT id FROM jobs
        WHERE queue = $1 AND status = 'pending' AND run_at <= $2
        ORDER BY run_at
        LIMIT 1
        FOR UPDATE SKIP LOCKED
    )
    RETURNING *
"#;

impl JobRepository for DbJobRepository {
    async fn insert_if_absent(&self, job: &NewJob) -> Result<Enqueued, DeliveryServiceError> {
        let id = JobId::new();
        let model = jobs::ActiveModel {
            id: Set(id.0),
            queue: Set(job.queue.clone()),
            job_key: Set(job.job_key.clone()),
            payload: Set(job.payload.clone()),
            status: Set(JobStatus::Pending.as_str().to_owned()),
            attempts: Set(0),
            max_attempts: Set(job.max_attempts as i32),
            run_at: Set(job.run_at),
            locked_until: Set(None),
            last_error: Set(None),
            created_at: Set(Utc::now()),
            completed_at: Set(None),
            failed_at: Set(None),
        };
        let inserted = jobs::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([jobs::Column::Queue, jobs::Column::JobKey])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .context("insert job")?;
        if inserted == 1 {
            return Ok(Enqueued::Created(id));
        }

        let existing = jobs::Entity::find()
            .filter(jobs::Column::Queue.eq(job.queue.as_str()))
            .filter(jobs::Column::JobKey.eq(job.job_key.as_str()))
            .one(&self.db)
            .await
            .context("find duplicate job")?
            .with_context(|| format!("job {}/{} vanished after conflict", job.queue, job.job_key))?;
        Ok(Enqueued::Duplicate(JobId(existing.id)))
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, DeliveryServiceError> {
        let model = jobs::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find job")?;
        Ok(model.map(job_from_model).transpose()?)
    }

    async fn claim_next(
        &self,
        queue: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<Job>, DeliveryServiceError> {
        let locked_until = now
            + chrono::Duration::from_std(lease).context("job lease out of range")?;
        let model = jobs::Entity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                CLAIM_NEXT_JOB_SQL,
                [queue.into(), now.into(), locked_until.into()],
            ))
            .one(&self.db)
            .await
            .context("claim next job")?;
        Ok(model.map(job_from_model).transpose()?)
    }

    async fn complete(&self, id: JobId, now: DateTime<Utc>) -> Result<(), DeliveryServiceError> {
        jobs::Entity::update_many()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Completed.as_str()))
            .col_expr(jobs::Column::CompletedAt, Expr::value(Some(now)))
            .col_expr(
                jobs::Column::LockedUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .filter(jobs::Column::Id.eq(id.0))
            .exec(&self.db)
            .await
            .context("complete job")?;
        Ok(())
    }

    async fn retry_at(
        &self,
        id: JobId,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), DeliveryServiceError> {
        jobs::Entity::update_many()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Pending.as_str()))
            .col_expr(jobs::Column::RunAt, Expr::value(run_at))
            .col_expr(jobs::Column::LastError, Expr::value(error))
            .col_expr(
                jobs::Column::LockedUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .filter(jobs::Column::Id.eq(id.0))
            .exec(&self.db)
            .await
            .context("reschedule job")?;
        Ok(())
    }

    async fn fail(
        &self,
        id: JobId,
        now: DateTime<Utc>,
        error: &str,
    ) -> Result<(), DeliveryServiceError> {
        jobs::Entity::update_many()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Failed.as_str()))
            .col_expr(jobs::Column::FailedAt, Expr::value(Some(now)))
            .col_expr(jobs::Column::LastError, Expr::value(error))
            .col_expr(
                jobs::Column::LockedUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .filter(jobs::Column::Id.eq(id.0))
            .exec(&self.db)
            .await
            .context("fail job")?;
        Ok(())
    }

    async fn release_expired(
        &self,
        queue: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DeliveryServiceError> {
        let expired = || {
            jobs::Entity::update_many()
                .col_expr(jobs::Column::LastError, Expr::value("lease expired"))
                .col_expr(
                    jobs::Column::LockedUntil,
                    Expr::value(Option::<DateTime<Utc>>::None),
                )
                .filter(jobs::Column::Queue.eq(queue))
                .filter(jobs::Column::Status.eq(JobStatus::Running.as_str()))
                .filter(jobs::Column::LockedUntil.lt(now))
        };

        let exhausted = expired()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Failed.as_str()))
            .col_expr(jobs::Column::FailedAt, Expr::value(Some(now)))
            .filter(Expr::col(jobs::Column::Attempts).gte(Expr::col(jobs::Column::MaxAttempts)))
            .exec(&self.db)
            .await
            .context("fail expired jobs")?;

        let released = expired()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Pending.as_str()))
            .col_expr(jobs::Column::RunAt, Expr::value(now))
            .exec(&self.db)
            .await
            .context("release expired jobs")?;

        Ok(exhausted.rows_affected + released.rows_affected)
    }

    async fn delete_completed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DeliveryServiceError> {
        let result = jobs::Entity::delete_many()
            .filter(jobs::Column::Status.eq(JobStatus::Completed.as_str()))
            .filter(jobs::Column::CompletedAt.lt(cutoff))
            .exec(&self.db)
            .await
            .context("delete completed jobs")?;
        Ok(result.rows_affected)
    }

    async fn find_schedule(
        &self,
        queue: &str,
        schedule_name: &str,
    ) -> Result<Option<JobSchedule>, DeliveryServiceError> {
        let model = job_schedules::Entity::find()
            .filter(job_schedules::Column::Queue.eq(queue))
            .filter(job_schedules::Column::ScheduleName.eq(schedule_name))
            .one(&self.db)
            .await
            .context("find job schedule")?;
        Ok(model.map(job_schedule_from_model))
    }

    async fn upsert_schedule(&self, schedule: &JobSchedule) -> Result<(), DeliveryServiceError> {
        let now = Utc::now();
        let model = job_schedules::ActiveModel {
            id: Set(uuid::Uuid::new_v4()),
            queue: Set(schedule.queue.clone()),
            schedule_name: Set(schedule.schedule_name.clone()),
            cron_pattern: Set(schedule.cron_pattern.clone()),
            timezone: Set(schedule.timezone.clone()),
            payload: Set(schedule.payload.clone()),
            next_run_at: Set(schedule.next_run_at),
            created_at: Set(now),
            updated_at: Set(now),
        };
        job_schedules::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    job_schedules::Column::Queue,
                    job_schedules::Column::ScheduleName,
                ])
                .update_columns([
                    job_schedules::Column::CronPattern,
                    job_schedules::Column::Timezone,
                    job_schedules::Column::Payload,
                    job_schedules::Column::NextRunAt,
                    job_schedules::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .context("upsert job schedule")?;
        Ok(())
    }

    async fn due_schedules(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobSchedule>, DeliveryServiceError> {
        let models = job_schedules::Entity::find()
            .filter(job_schedules::Column::NextRunAt.lte(now))
            .all(&self.db)
            .await
            .context("list due job schedules")?;
        Ok(models.into_iter().map(job_schedule_from_model).collect())
    }

    async fn advance_schedule(
        &self,
        queue: &str,
        schedule_name: &str,
        expected: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError> {
        let result = job_schedules::Entity::update_many()
            .col_expr(job_schedules::Column::NextRunAt, Expr::value(next))
            .col_expr(job_schedules::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(job_schedules::Column::Queue.eq(queue))
            .filter(job_schedules::Column::ScheduleName.eq(schedule_name))
            .filter(job_schedules::Column::NextRunAt.eq(expected))
            .exec(&self.db)
            .await
            .context("advance job schedule")?;
        Ok(result.rows_affected == 1)
    }
}

fn job_from_model(model: jobs::Model) -> Result<Job, anyhow::Error> {
    Ok(Job {
        id: JobId(model.id),
        queue: model.queue,
        job_key: model.job_key,
        payload: model.payload,
        status: model.status.parse()?,
        attempts: model.attempts.max(0) as u32,
        max_attempts: model.max_attempts.max(0) as u32,
        run_at: model.run_at,
        locked_until: model.locked_until,
        last_error: model.last_error,
        created_at: model.created_at,
        completed_at: model.completed_at,
        failed_at: model.failed_at,
    })
}

fn job_schedule_from_model(model: job_schedules::Model) -> JobSchedule {
    JobSchedule {
        queue: model.queue,
        schedule_name: model.schedule_name,
        cron_pattern: model.cron_pattern,
        timezone: model.timezone,
        payload: model.payload,
        next_run_at: model.next_run_at,
    }
}

use std::sync::Arc;
use std::time::Duration;

use sea_orm::Database;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use courier_delivery::config::DeliveryConfig;
use courier_delivery::domain::types::{
    CLEANUP_QUEUE, CLEANUP_SCHEDULE, INBOUND_MESSAGES_QUEUE, WEBHOOK_DELIVERY_QUEUE,
    WEBHOOK_RECOVERY_QUEUE, WEBHOOK_RECOVERY_SCHEDULE,
};
use courier_delivery::infra::http::webhook_client;
use courier_delivery::infra::worker::{JobWorker, run_scheduler};
use courier_delivery::job_handlers::{
    CleanupJobs, InboundMessageJobs, WebhookDeliveryJobs, WebhookRecoveryJobs,
};
use courier_delivery::router::build_router;
use courier_delivery::state::AppState;
use courier_delivery::usecase::jobs::{JobHandler, JobRetryPolicy};

const JOB_LEASE: Duration = Duration::from_secs(300);
const SCHEDULER_INTERVAL: Duration = Duration::from_secs(1);
const MAIL_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

fn spawn_workers<H: JobHandler>(
    state: &AppState,
    queue: &str,
    handler: H,
    count: usize,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let handler = Arc::new(handler);
    (0..count)
        .map(|_| {
            let worker = JobWorker {
                repo: state.job_repo(),
                handler: Arc::clone(&handler),
                queue: queue.to_owned(),
                poll_interval: state.config.job_poll_interval,
                lease: JOB_LEASE,
                retry: JobRetryPolicy::default(),
            };
            tokio::spawn(worker.run(shutdown.clone()))
        })
        .collect()
}

#[tokio::main]
async fn main() {
    courier_core::tracing::init_tracing();

    let config = DeliveryConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let redis_cfg = deadpool_redis::Config::from_url(&config.redis_url);
    let redis = redis_cfg
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .expect("failed to create Redis pool");

    let webhook_client =
        webhook_client(config.webhook_timeout).expect("failed to build webhook client");
    let mail_client = reqwest::Client::builder()
        .timeout(MAIL_PROVIDER_TIMEOUT)
        .build()
        .expect("failed to build mail provider client");

    let state = AppState {
        db,
        redis,
        webhook_client,
        mail_client,
        config: Arc::new(config.clone()),
    };

    let queue = state.job_queue();
    queue
        .register_recurring(
            WEBHOOK_RECOVERY_QUEUE,
            WEBHOOK_RECOVERY_QUEUE,
            WEBHOOK_RECOVERY_SCHEDULE,
            "UTC",
            serde_json::json!({}),
        )
        .await
        .expect("failed to register webhook recovery schedule");
    queue
        .register_recurring(
            CLEANUP_QUEUE,
            CLEANUP_QUEUE,
            CLEANUP_SCHEDULE,
            "UTC",
            serde_json::json!({}),
        )
        .await
        .expect("failed to register cleanup schedule");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let concurrency = config.job_concurrency.max(1);

    let mut tasks = Vec::new();
    tasks.extend(spawn_workers(
        &state,
        WEBHOOK_DELIVERY_QUEUE,
        WebhookDeliveryJobs {
            state: state.clone(),
        },
        concurrency,
        &shutdown_rx,
    ));
    tasks.extend(spawn_workers(
        &state,
        INBOUND_MESSAGES_QUEUE,
        InboundMessageJobs {
            state: state.clone(),
        },
        concurrency,
        &shutdown_rx,
    ));
    tasks.extend(spawn_workers(
        &state,
        WEBHOOK_RECOVERY_QUEUE,
        WebhookRecoveryJobs {
            state: state.clone(),
        },
        1,
        &shutdown_rx,
    ));
    tasks.extend(spawn_workers(
        &state,
        CLEANUP_QUEUE,
        CleanupJobs {
            state: state.clone(),
        },
        1,
        &shutdown_rx,
    ));
    tasks.push(tokio::spawn(run_scheduler(
        state.job_queue(),
        SCHEDULER_INTERVAL,
        shutdown_rx.clone(),
    )));

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.delivery_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!("delivery service listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }
    info!("delivery service stopped");
}

//! Consume scraps from Kafka, run them through the processor stages and report completion.
use std::sync::Arc;

use envconfig::Envconfig;
use scrap_common::health::HealthRegistry;
use scrap_common::kafka_consumer::BatchConsumer;
use scrap_common::kafka_producer::create_kafka_producer;
use scrap_common::metrics::{serve, setup_metrics_recorder, setup_metrics_router};
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scrap_worker::config::Config;
use scrap_worker::error::WorkerError;
use scrap_worker::limiter::ConcurrencyLimiter;
use scrap_worker::liveness::WorkerLiveness;
use scrap_worker::notifier::KafkaNotifier;
use scrap_worker::source::KafkaScrapSource;
use scrap_worker::stage::{LogStage, StageRegistry};
use scrap_worker::storage::build_gateway;
use scrap_worker::worker::ScrapWorker;

fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = terminate.recv() => info!("received SIGTERM"),
                _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
            }
        }
        Err(e) => {
            warn!("cannot listen for SIGTERM, only SIGINT will stop the worker: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("cannot listen for SIGINT: {}", e);
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("cannot listen for ctrl-c: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    setup_tracing();

    let config = Config::init_from_env()?;

    let storage = match build_gateway(&config) {
        Ok(storage) => storage,
        Err(e) => {
            error!("cannot start without a storage gateway: {}", e);
            return Err(e.into());
        }
    };

    let liveness = HealthRegistry::new("liveness");
    let handles = WorkerLiveness::register(&liveness, config.liveness_deadline.0);

    let consumer = BatchConsumer::new(&config.kafka, &config.consumer, handles.consumer)?;
    let source = KafkaScrapSource::new(
        consumer,
        config.max_poll_records,
        config.poll_timeout.0,
    );

    let producer = create_kafka_producer(&config.kafka, handles.producer).await?;
    let notifier = KafkaNotifier::new(
        producer,
        config.notification_topic.as_str(),
        config.dead_letter_topic.as_ref().map(|topic| topic.as_str()),
    );

    let worker = ScrapWorker::new(
        &config.worker_name,
        Arc::new(source),
        storage,
        Arc::new(notifier),
        StageRegistry::new().with_stage(LogStage),
        ConcurrencyLimiter::new(config.max_concurrent_scraps),
        handles.worker,
    );

    let recorder_handle = setup_metrics_recorder()?;
    let router = setup_metrics_router(liveness, recorder_handle);
    let bind = config.bind();
    tokio::task::spawn(async move {
        if let Err(e) = serve(router, &bind).await {
            error!("failed to serve metrics on {}: {}", bind, e);
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, finishing the current batch");
        if shutdown_tx.send(true).is_err() {
            warn!("worker already stopped");
        }
    });

    worker.run(shutdown_rx).await?;

    Ok(())
}

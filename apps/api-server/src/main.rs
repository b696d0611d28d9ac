//! # Todo API Server
//!
//! Actix-web HTTP server: todo CRUD behind a per-identity fixed-window rate limiter.

use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

#[cfg(feature = "scheduler")]
mod background;
mod config;
mod handlers;
mod middleware;
mod observability;
mod state;
mod telemetry;

use config::AppConfig;
use observability::{RequestIdMiddleware, ResponseTimeMiddleware};
use state::AppState;
use telemetry::{TelemetryConfig, init_telemetry};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env();

    tracing::info!("Starting Todo API Server on {}:{}", config.host, config.port);

    let state = AppState::new(&config)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    #[cfg(feature = "scheduler")]
    let mut scheduler = start_scheduler(&config, &state).await;

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(ResponseTimeMiddleware)
            .wrap(RequestIdMiddleware)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(app_state.tokens.clone()))
            .configure(|cfg| handlers::configure_routes(cfg, app_state.admission.clone()))
    })
    .bind((config.host.as_str(), config.port))?
    .run();

    let result = server.await;

    #[cfg(feature = "scheduler")]
    if let Some(scheduler) = scheduler.as_mut() {
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!(error = %e, "Scheduler shutdown failed");
        }
    }

    result
}

/// Start background jobs. A scheduler that fails to start is logged and
/// skipped; the server still runs.
#[cfg(feature = "scheduler")]
async fn start_scheduler(config: &AppConfig, state: &AppState) -> Option<background::Scheduler> {
    use background::Scheduler;

    let result = async {
        let scheduler = Scheduler::new(config.scheduler.clone()).await?;
        scheduler
            .add_partition_purge(
                &config.rate_limit.eviction_cron,
                state.limiter.clone(),
                state.admission.resolver().clone(),
            )
            .await?;
        scheduler.start().await?;
        Ok::<_, tokio_cron_scheduler::JobSchedulerError>(scheduler)
    }
    .await;

    match result {
        Ok(scheduler) => Some(scheduler),
        Err(e) => {
            tracing::error!(error = %e, "Failed to start scheduler");
            None
        }
    }
}

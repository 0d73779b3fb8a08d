use std::sync::Arc;

use anyhow::Context;
use playrank_client::ModelClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod broker;
pub mod config;
pub mod db;
pub mod repository;
pub mod retrieval;
pub mod service;

use crate::broker::EventBroker;
use crate::config::Config;
use crate::repository::PgRepository;
use crate::retrieval::PgRetriever;
use crate::service::{Orchestrator, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "playrank_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Playrank server...");

    let config = Config::from_env().context("invalid configuration")?;
    config.validate()?;
    if config.openai_api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; every model call will fail");
    }

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url)
        .await
        .context("failed to create database pool")?;
    tracing::info!("Database connection pool created");

    db::run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;

    let client = Arc::new(
        ModelClient::new(config.openai_base_url.clone(), config.openai_api_key.clone())
            .with_policy(config.retry)
            .with_embeddings_model(config.embeddings_model.clone()),
    );
    let repo = Arc::new(PgRepository::new(pool.clone()));
    let retriever = Arc::new(PgRetriever::new(pool, client.clone()));
    let broker = Arc::new(EventBroker::new(config.event_buffer_size));
    let engine = Arc::new(Orchestrator::new(
        repo,
        retriever,
        client,
        broker,
        Settings::from(&config),
    ));

    let app = api::create_router(api::AppState {
        engine: engine.clone(),
        keep_alive: config.keep_alive,
    });

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    let draining = engine.clone();
    let grace = config.shutdown_grace;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Stops the jobs, then closes every open progress stream
            tokio::spawn(async move { draining.shutdown(grace).await });
        })
        .await
        .context("server error")?;

    engine.shutdown(config.shutdown_grace).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

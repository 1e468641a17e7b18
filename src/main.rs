//! Pacer - interval pacing reminders over Telegram
//!
//! A per-user state machine drives a habit schedule; durable countdowns
//! notify the user when the next interval opens and survive restarts.

mod api;
mod bot;
mod config;
mod db;
mod runtime;
mod state_machine;

use api::{create_router, AppState};
use bot::TelegramNotifier;
use config::Config;
use db::Database;
use runtime::PacerRuntime;
use std::net::SocketAddr;
use teloxide::Bot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pacer=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.database_path.display(), "Opening database");
    let db = Database::open(&config.database_path)?;

    let bot = Bot::new(&config.bot_token);
    let (mut runtime, handle) = PacerRuntime::new(db.clone(), TelegramNotifier::new(bot.clone()));

    // Countdowns must be back before any user trigger is accepted
    runtime.resume_in_flight()?;
    let runtime_task = tokio::spawn(runtime.run());

    let mut dispatcher = bot::dispatcher(bot, handle);
    let dispatcher_shutdown = dispatcher.shutdown_token();
    let dispatcher_task = tokio::spawn(async move { dispatcher.dispatch().await });

    // Health check server
    let app = create_router(AppState::new(db));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Pacer health check listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Dispatcher owns the last command handle; once it stops the runtime
    // drains its queue, cancels every countdown and exits
    match dispatcher_shutdown.shutdown() {
        Ok(stopped) => {
            stopped.await;
            dispatcher_task.await?;
        }
        Err(e) => {
            tracing::warn!(error = ?e, "Dispatcher was not running");
            dispatcher_task.abort();
        }
    }
    runtime_task.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT - shutting down"),
        () = terminate => tracing::info!("Received SIGTERM - shutting down"),
    }
}

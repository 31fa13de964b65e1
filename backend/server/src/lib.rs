//! Backend of the ORT preparation platform.
//!
//! Students take practice tests for the Kyrgyz national university entrance
//! exam, repetitors author them, and subscribers see their admission chances
//! at universities.
//!
//!
//!
//! # General Infrastructure
//! - One axum process serves everything under `/api`
//! - PostgreSQL holds all state, reached through a small `sqlx` pool
//! - Handlers are stateless, every request reads the store
//! - Mail is optional, without SMTP settings reset tokens come back in the response
//! - The monthly ranking is run by hand, through the admin endpoint or `process rank`
//!
//!
//!
//! # Notes
//!
//! ## Subscriptions
//! A user has at most one active subscription. Buying a new one expires the
//! old row in the same transaction, and the partial unique index on
//! `subscriptions` backs that up at the database level.
//!
//! ## First place bonus
//! Reruns of the ranking job refresh rows in place. The bonus flag is flipped
//! in the same statement that credits the coins, so a second run pays nothing.
//!
//!
//!
//! # Setup
//!
//! Configuration comes from the environment (a `.env` file is read when
//! present). Secrets may also be mounted under `/run/secrets`.
//!
//! | variable | default |
//! |---|---|
//! | `RUST_PORT` / `PORT` | `5000` |
//! | `DATABASE_URL` or `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER`, `DB_PASSWORD` | |
//! | `JWT_SECRET` | required |
//! | `JWT_EXPIRES_IN` | `7d` |
//! | `FRONTEND_URL` | `http://localhost:3000` |
//! | `EMAIL_HOST`, `EMAIL_PORT`, `EMAIL_USER`, `EMAIL_PASS` | mail disabled |
//! | `AUTO_MIGRATE` | `true` |
//!
//! Run the server.
//! ```sh
//! RUST_LOG=info cargo run -p ort
//! ```
//!
//! Seed an admin, subjects and free tests.
//! ```sh
//! cargo run -p process -- seed
//! ```
//!
//! Exercise the PostgreSQL store against a live server.
//! ```sh
//! DATABASE_URL=postgres://... cargo test -p server --features postgres-tests --test postgres
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod mail;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;

use config::Config;
use state::State;

/// The full router, ready to serve.
pub fn app(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .nest("/api", routes::api())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = State::new(config).await?;

    info!("Starting server...");
    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

//! Application startup and lifecycle management.

use crate::config::Config;
use crate::handlers::{collective, epos, wallets, withdrawals};
use crate::middleware::admin_auth_middleware;
use crate::services::{get_metrics, init_metrics, Database, EposClient};
use axum::{
    extract::State,
    http::{HeaderValue, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: Arc<Database>,
    pub epos: EposClient,
}

/// Health check endpoint for liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "wallet-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "wallet-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any);

    if config.security.allowed_origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .security
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(origins)
    }
}

/// Assemble the full router.
pub fn build_router(state: AppState) -> Router {
    // Void/edit rewrite ledger history and sit behind the admin key.
    let admin_routes = Router::new()
        .route(
            "/wallets/transactions/:id",
            put(wallets::edit_transaction),
        )
        .route(
            "/wallets/transactions/:id/void",
            post(wallets::void_transaction),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    Router::new()
        .route("/epos/transaction", post(epos::process_transaction))
        .route("/epos/pool", get(epos::pool_balance))
        .route("/wallets/balances", get(wallets::school_balances))
        .route("/wallets/:santri_id/topup", post(wallets::topup))
        .route("/wallets/:santri_id/debit", post(wallets::debit))
        .route(
            "/wallets/:santri_id/transactions",
            get(wallets::list_transactions),
        )
        .route(
            "/wallets/epos/withdrawal",
            post(withdrawals::create_withdrawal).get(withdrawals::list_withdrawals),
        )
        .route(
            "/wallets/epos/withdrawal/:id/approve",
            put(withdrawals::approve_withdrawal),
        )
        .route(
            "/wallets/epos/withdrawal/:id/reject",
            put(withdrawals::reject_withdrawal).post(withdrawals::reject_withdrawal_by_number),
        )
        .route(
            "/wallets/epos/withdrawal/:id/complete",
            post(withdrawals::complete_withdrawal_by_number),
        )
        .route(
            "/wallets/epos/withdrawal/:id/status",
            get(withdrawals::withdrawal_status),
        )
        .route("/wallets/cash-withdrawal", post(withdrawals::cash_withdrawal))
        .route(
            "/collective-payments",
            post(collective::create_payment).get(collective::list_payments),
        )
        .route("/collective-payments/:id", get(collective::get_payment))
        .route(
            "/collective-payments/:id/retry",
            post(collective::retry_payment),
        )
        .merge(admin_routes)
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        db.run_migrations().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            e
        })?;

        let epos = EposClient::new(config.epos.clone());
        let state = AppState {
            config: config.clone(),
            db: Arc::new(db),
            epos,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Wallet service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);
        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

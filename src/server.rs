//! Router, shared state and the serve loop.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{FromRef, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api;
use crate::auth::Authenticator;
use crate::config::Config;
use crate::error::AppError;
use crate::sms::SmsSender;
use crate::store::TaskStore;

/// Shared state accessible from handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TaskStore>,
    pub auth: Arc<Authenticator>,
    pub sms: Arc<dyn SmsSender>,
    pub config: Arc<Config>,
    pub start_time: Instant,
}

impl FromRef<AppState> for Arc<Authenticator> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl AppState {
    pub fn new(config: Config, store: TaskStore, sms: Arc<dyn SmsSender>) -> Self {
        let auth = Authenticator::new(&config.jwt_secret, config.token_ttl_hours);
        Self {
            store: Arc::new(store),
            auth: Arc::new(auth),
            sms,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Clamp a requested page size into the configured bounds.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size)
    }

    /// Run a store mutation on the blocking pool, since every write
    /// rewrites the data file.
    pub async fn write_store<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&TaskStore) -> Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| AppError::Internal(format!("store task failed: {e}")))?
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/tasks",
            get(api::list_tasks)
                .post(api::create_task)
                .patch(api::patch_task_by_body)
                .delete(api::delete_task_by_query),
        )
        .route(
            "/api/tasks/{id}",
            get(api::get_task)
                .patch(api::patch_task)
                .delete(api::delete_task),
        )
        .route("/api/tasks/{id}/accept", post(api::accept_task))
        .route("/api/tasks/{id}/decline", post(api::decline_task))
        .route("/api/tasks/{id}/start", post(api::start_task))
        .route("/api/tasks/{id}/complete", post(api::complete_task))
        .route("/api/tasks/{id}/cancel", post(api::cancel_task))
        .route("/api/performance", get(api::performance))
        .route("/api/stats", get(api::dashboard_stats))
        .route("/api/users", get(api::list_users).post(api::create_user))
        .route("/api/users/me", get(api::current_user))
        .route("/api/send-sms-reminder", post(api::send_sms_reminder))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub users: usize,
    pub tasks: usize,
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (users, tasks) = state.store.counts();
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        users,
        tasks,
    })
}

/// Bind, serve until ctrl-c, then drain in-flight requests.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let listener =
        tokio::net::TcpListener::bind((state.config.host.as_str(), state.config.port)).await?;
    info!(addr = %listener.local_addr()?, "taskdesk listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

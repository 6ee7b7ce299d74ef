/// Application routes configuration
use crate::handlers::{
    download_output, download_summary, get_job, health, list_processes, submit_plot, submit_run,
    AppState,
};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the application router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Process endpoints
        .route("/processes", get(list_processes))
        .route("/processes/run_name/jobs", post(submit_run))
        .route("/processes/plot_name/jobs", post(submit_plot))
        // Job endpoints
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/output", get(download_output))
        .route("/jobs/:id/summary", get(download_summary))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

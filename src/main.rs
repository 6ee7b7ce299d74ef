/// NAME-on-HPC processing service entry point
mod clients;
mod config;
mod domain;
mod errors;
mod grouping;
mod handlers;
mod orchestrator;
mod packaging;
mod progress;
mod repo;
mod routes;
mod services;
mod utils;
mod validation;

use crate::clients::{CommandPlotter, NameModelClient, Plotter};
use crate::config::AppConfig;
use crate::handlers::AppState;
use crate::repo::JobRepo;
use crate::routes::build_router;
use crate::services::{PlotService, RunService};
use crate::utils::init_tracing;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Load configuration
    let config = AppConfig::from_env()?;
    info!(
        "Configuration loaded, runs live under {}",
        config.output_dir.display()
    );
    tokio::fs::create_dir_all(&config.output_dir).await?;

    // Initialize clients
    let plotter: Arc<dyn Plotter> = Arc::new(CommandPlotter::new(config.plot_cmd.clone()));
    let model = NameModelClient::new(config.model_cmd.clone());

    // Initialize services
    let run_service = Arc::new(RunService::new(config.clone(), model, plotter.clone()));
    let plot_service = Arc::new(PlotService::new(config.clone(), plotter));

    let state = AppState {
        jobs: JobRepo::new(),
        run_service,
        plot_service,
    };

    // Build router
    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("name_wps service listening on {}", config.listen_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

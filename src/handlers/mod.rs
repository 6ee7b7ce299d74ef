/// HTTP request handlers
use crate::domain::{
    Health, JobOutput, JobRecord, JobStatus, PlotArtifact, PlotRequest, ProcessDescription,
    RunRequest, PLOT_PROCESS, RUN_PROCESS,
};
use crate::errors::{ApiError, ApiResult};
use crate::repo::JobRepo;
use crate::services::{PlotService, RunService};
use crate::validation::{validate_plot_request, validate_run_request};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub jobs: JobRepo,
    pub run_service: Arc<RunService>,
    pub plot_service: Arc<PlotService>,
}

/// Successful response wrapper
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { ok: true, data }
    }
}

#[derive(Serialize)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub status: JobStatus,
}

#[derive(Serialize)]
pub struct ProcessList {
    pub processes: Vec<ProcessDescription>,
}

#[derive(Serialize)]
pub struct JobView {
    pub job: JobRecord,
}

/// Health check handler
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        now: Utc::now(),
    })
}

pub async fn list_processes() -> Json<SuccessResponse<ProcessList>> {
    Json(SuccessResponse::new(ProcessList {
        processes: vec![
            ProcessDescription {
                identifier: RUN_PROCESS,
                title: "Run NAME-on-HPC",
                summary: "Run the NAME dispersion model for a release location and period",
            },
            ProcessDescription {
                identifier: PLOT_PROCESS,
                title: "Plot NAME results",
                summary: "Plot the outputs of a completed NAME run as maps",
            },
        ],
    }))
}

fn accepted(job_id: Uuid) -> (StatusCode, Json<SuccessResponse<JobAccepted>>) {
    (
        StatusCode::ACCEPTED,
        Json(SuccessResponse::new(JobAccepted {
            job_id,
            status: JobStatus::Accepted,
        })),
    )
}

/// Validate a run request and launch the model in the background
pub async fn submit_run(
    State(state): State<AppState>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let params = validate_run_request(&request)?;

    let job_id = state.jobs.create(RUN_PROCESS);
    info!("accepted NAME run job {job_id} for \"{}\"", params.title);

    let jobs = state.jobs.clone();
    let service = state.run_service.clone();
    let task = tokio::spawn(async move {
        let handle = jobs.handle(job_id);
        match service.launch(&params, &handle).await {
            Ok(result) => jobs.succeed(job_id, JobOutput::RunName(result)),
            Err(e) => {
                error!("NAME run job {job_id} failed: {e}");
                jobs.fail(job_id, &e);
            }
        }
    });
    tokio::spawn(supervise(state.jobs.clone(), job_id, task));

    Ok(accepted(job_id))
}

/// Validate a plot request against its run directory and plot in the background
pub async fn submit_plot(
    State(state): State<AppState>,
    payload: Result<Json<PlotRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let selection = validate_plot_request(&request)?;
    let params = state.plot_service.prepare(selection)?;

    let job_id = state.jobs.create(PLOT_PROCESS);
    info!("accepted plot job {job_id} for run {}", params.run_id);

    let jobs = state.jobs.clone();
    let service = state.plot_service.clone();
    let task = tokio::task::spawn_blocking(move || {
        let handle = jobs.handle(job_id);
        match service.execute(&params, &handle) {
            Ok(artifact) => jobs.succeed(job_id, JobOutput::PlotName(artifact)),
            Err(e) => {
                error!("plot job {job_id} failed: {e}");
                jobs.fail(job_id, &e);
            }
        }
    });
    tokio::spawn(supervise(state.jobs.clone(), job_id, task));

    Ok(accepted(job_id))
}

/// Fail a job whose worker task panicked or was cancelled before recording an outcome
async fn supervise(jobs: JobRepo, job_id: Uuid, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        error!("job {job_id} worker ended abnormally: {e}");
        let err = ApiError::Internal(format!("job worker ended abnormally: {e}"));
        jobs.fail(job_id, &err);
    }
}

pub async fn get_job(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<SuccessResponse<JobView>>> {
    let job = state.jobs.get(id)?;
    Ok(Json(SuccessResponse::new(JobView { job })))
}

fn finished_output(state: &AppState, id: Uuid) -> ApiResult<JobOutput> {
    let job = state.jobs.get(id)?;
    match (job.status, job.output) {
        (_, Some(output)) => Ok(output),
        (JobStatus::Failed, None) => Err(ApiError::JobFailed(format!(
            "job {id} failed: {}",
            job.error.as_deref().unwrap_or("no error recorded")
        ))),
        _ => Err(ApiError::InvalidInput(format!("job {id} has no output yet"))),
    }
}

async fn file_response(path: &FsPath, media_type: &str) -> ApiResult<Response> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    Ok((
        [
            (header::CONTENT_TYPE, media_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Primary artifact of a finished job
pub async fn download_output(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Response> {
    match finished_output(&state, id)? {
        JobOutput::RunName(result) => file_response(&result.outputs_zip, "application/zip").await,
        JobOutput::PlotName(artifact) => match &artifact {
            PlotArtifact::NoPlots { message } => Ok((
                [(header::CONTENT_TYPE, artifact.media_type())],
                message.clone(),
            )
                .into_response()),
            PlotArtifact::Image { path } | PlotArtifact::Archive { path } => {
                file_response(path, artifact.media_type()).await
            }
        },
    }
}

/// Summary plot of a finished run job
pub async fn download_summary(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Response> {
    match finished_output(&state, id)? {
        JobOutput::RunName(result) => match result.summary_plot {
            Some(path) => file_response(&path, "image/tiff").await,
            None => Err(ApiError::DataNotFound(format!(
                "run {} has no summary plot",
                result.run_id
            ))),
        },
        JobOutput::PlotName(_) => Err(ApiError::InvalidInput(format!(
            "job {id} is a plot job; only run jobs have a summary plot"
        ))),
    }
}

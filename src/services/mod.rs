/// Business logic services layer
use crate::clients::{DrawRequest, DrawSource, NameModelClient, Plotter, SUM_FIELD};
use crate::config::AppConfig;
use crate::domain::{
    ColourMap, PlotArtifact, PlotOptions, PlotParams, RunMetadata, RunParams, RunResult,
    SumWindow,
};
use crate::errors::{ApiError, ApiResult};
use crate::grouping::{find_output_files, stage_groups};
use crate::orchestrator::{expected_renders, PlotContext};
use crate::packaging::{package, reserve_dir, zip_dir};
use crate::progress::{ProgressSink, PLOT_START};
use crate::utils::sanitize_title;
use crate::validation::PlotSelection;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

pub const PARAMETERS_FILE: &str = "user_input_parameters.txt";
pub const MODEL_CONFIG_FILE: &str = "name_config.json";
pub const OUTPUTS_DIR: &str = "outputs";

/// Configuration handed to the NAME model
#[derive(Debug, Serialize)]
pub struct ModelConfig<'a> {
    pub run_id: &'a str,
    pub run_dir: &'a Path,
    pub outputs_dir: &'a Path,
    #[serde(flatten)]
    pub params: &'a RunParams,
}

pub fn new_run_id(title: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", sanitize_title(title), now.format("%Y%m%d%H%M%S%6f"))
}

/// `key: value` lines read back by later plot requests
pub fn user_parameters(params: &RunParams) -> String {
    let ranges: Vec<String> = params
        .elevation_ranges
        .iter()
        .map(ToString::to_string)
        .collect();

    let mut entries = vec![
        ("title", params.title.clone()),
        ("longitude", params.longitude.to_string()),
        ("latitude", params.latitude.to_string()),
        ("elevation", params.elevation.to_string()),
        ("direction", params.direction.to_string()),
        ("time", params.duration.to_string()),
        ("timeFmt", params.time_unit.to_string()),
        ("domain", params.domain.to_string()),
        ("elevationOut", ranges.join(", ")),
        ("resolution", params.resolution.to_string()),
        ("timestamp", params.cadence.to_string()),
    ];
    if let Some(daily_time) = params.daily_time {
        entries.push(("dailytime", daily_time.format("%H:%M:%S").to_string()));
    }
    if let Some(len) = params.daily_release_len {
        entries.push(("dailyreleaselen", len.to_string()));
    }
    entries.push(("startdate", params.start_date.to_rfc3339()));
    entries.push(("enddate", params.end_date.to_rfc3339()));

    entries
        .iter()
        .map(|(key, value)| format!("{key}: {value}\n"))
        .collect()
}

/// Launches NAME runs
pub struct RunService {
    config: AppConfig,
    model: NameModelClient,
    plotter: Arc<dyn Plotter>,
}

impl RunService {
    pub fn new(config: AppConfig, model: NameModelClient, plotter: Arc<dyn Plotter>) -> Self {
        Self {
            config,
            model,
            plotter,
        }
    }

    /// Create the run directory and write everything the model and later plots need
    pub async fn prepare_run_dir(&self, params: &RunParams) -> ApiResult<(String, PathBuf)> {
        let run_id = new_run_id(&params.title, Utc::now());
        let run_dir = self.config.run_dir(&run_id);
        let outputs_dir = run_dir.join(OUTPUTS_DIR);
        tokio::fs::create_dir_all(&outputs_dir).await?;

        tokio::fs::write(run_dir.join(PARAMETERS_FILE), user_parameters(params)).await?;

        let model_config = ModelConfig {
            run_id: &run_id,
            run_dir: &run_dir,
            outputs_dir: &outputs_dir,
            params,
        };
        tokio::fs::write(
            run_dir.join(MODEL_CONFIG_FILE),
            serde_json::to_vec_pretty(&model_config)?,
        )
        .await?;

        debug!("prepared run directory {}", run_dir.display());
        Ok((run_id, run_dir))
    }

    /// Run NAME for validated parameters and collect its outputs
    pub async fn launch(
        &self,
        params: &RunParams,
        progress: &dyn ProgressSink,
    ) -> ApiResult<RunResult> {
        progress.update("Processed parameters", 5);

        let (run_id, run_dir) = self.prepare_run_dir(params).await?;
        self.run_prepared(params, run_id, &run_dir, progress).await
    }

    /// Run the model in an already prepared run directory, then zip and summarise its outputs
    pub async fn run_prepared(
        &self,
        params: &RunParams,
        run_id: String,
        run_dir: &Path,
        progress: &dyn ProgressSink,
    ) -> ApiResult<RunResult> {
        info!("starting NAME run {run_id}");
        progress.update("Running NAME", 10);
        self.model
            .run(run_dir, &run_dir.join(MODEL_CONFIG_FILE))
            .await?;

        progress.update("Zipping outputs", 90);
        let outputs_dir = run_dir.join(OUTPUTS_DIR);
        let outputs_zip = run_dir.join(format!("{run_id}.zip"));
        {
            let (dir, archive) = (outputs_dir.clone(), outputs_zip.clone());
            tokio::task::spawn_blocking(move || zip_dir(&dir, &archive))
                .await
                .map_err(|e| ApiError::Internal(format!("zip task failed: {e}")))??;
        }

        progress.update("Creating summary plot", 95);
        let summary_plot = self.summary_plot(params, &run_id, run_dir).await;

        Ok(RunResult {
            run_id,
            outputs_zip,
            summary_plot,
        })
    }

    /// Whole-period sum over all outputs; a failed render leaves the run without one
    async fn summary_plot(
        &self,
        params: &RunParams,
        run_id: &str,
        run_dir: &Path,
    ) -> Option<PathBuf> {
        let plotter = self.plotter.clone();
        let outputs_dir = run_dir.join(OUTPUTS_DIR);
        let outfile = format!("{run_id}_summary.tif");
        let options = PlotOptions {
            lon_bounds: (params.domain.min_lon, params.domain.max_lon),
            lat_bounds: (params.domain.min_lat, params.domain.max_lat),
            outdir: run_dir.to_path_buf(),
            station: Some((params.longitude, params.latitude)),
            projection: None,
            scale: None,
            colormap: ColourMap::Coolwarm,
        };
        let target = run_dir.join(&outfile);
        let caption = format!("{}: whole period sum", params.title);

        let outcome = tokio::task::spawn_blocking(move || {
            plotter.draw(&DrawRequest {
                source: DrawSource::Sum {
                    dir: &outputs_dir,
                    window: SumWindow::All,
                    field: SUM_FIELD,
                },
                caption: Some(caption),
                outfile: Some(outfile),
                options: &options,
            })
        })
        .await;

        match outcome {
            Ok(Ok(())) => Some(target),
            Ok(Err(e)) => {
                error!("Failed to plot summary for {run_id}: {e}");
                None
            }
            Err(e) => {
                error!("summary plot task for {run_id} failed: {e}");
                None
            }
        }
    }
}

/// Post-processes completed runs into plots
pub struct PlotService {
    config: AppConfig,
    plotter: Arc<dyn Plotter>,
}

impl PlotService {
    pub fn new(config: AppConfig, plotter: Arc<dyn Plotter>) -> Self {
        Self { config, plotter }
    }

    /// Bind a validated selection to its run directory; fails fast on missing data
    pub fn prepare(&self, selection: PlotSelection) -> ApiResult<PlotParams> {
        let run_dir = self.config.run_dir(&selection.run_id);
        debug!("Working Directory for plots: {}", run_dir.display());
        if !run_dir.is_dir() {
            return Err(ApiError::DataNotFound(format!(
                "No NAME run found with ID {}",
                selection.run_id
            )));
        }

        let contents = fs::read_to_string(run_dir.join(PARAMETERS_FILE)).map_err(|e| {
            ApiError::DataNotFound(format!(
                "Cannot read {PARAMETERS_FILE} for run {}: {e}",
                selection.run_id
            ))
        })?;
        let metadata = RunMetadata::parse(&contents);

        find_output_files(&run_dir.join(OUTPUTS_DIR))?;
        // reject runs whose metadata cannot drive progress accounting before accepting a job
        expected_renders(selection.summarise, selection.timestamp.is_some(), &metadata)?;

        let station = if selection.station {
            Some((
                metadata.require_f64("longitude")?,
                metadata.require_f64("latitude")?,
            ))
        } else {
            None
        };

        let options = PlotOptions {
            lon_bounds: (selection.bbox.min_lon, selection.bbox.max_lon),
            lat_bounds: (selection.bbox.min_lat, selection.bbox.max_lat),
            outdir: run_dir.join(format!("plots_{}", Utc::now().timestamp())),
            station,
            projection: selection.projection,
            scale: selection.scale,
            colormap: selection.colormap,
        };
        debug!("Plot options: {options:?}");

        Ok(PlotParams {
            run_id: selection.run_id,
            run_dir,
            summarise: selection.summarise,
            timestamp: selection.timestamp,
            options,
            metadata,
        })
    }

    /// Group, plot and package; blocking, may run for hours
    pub fn execute(
        &self,
        params: &PlotParams,
        progress: &dyn ProgressSink,
    ) -> ApiResult<PlotArtifact> {
        progress.update("Processed plot parameters", 5);

        let per_group = expected_renders(
            params.summarise,
            params.timestamp.is_some(),
            &params.metadata,
        )?;
        let groups = stage_groups(
            &params.run_dir.join(OUTPUTS_DIR),
            self.config.staging_dir.as_deref(),
        )?;
        let total = per_group * groups.len().max(1) as u32;

        let outdir = reserve_dir(&params.options.outdir)?;
        let options = PlotOptions {
            outdir: outdir.clone(),
            ..params.options.clone()
        };

        progress.update("Plotting", PLOT_START);
        let tally = PlotContext::new(
            self.plotter.as_ref(),
            params.summarise,
            params.timestamp.as_deref(),
            &options,
            progress,
            total,
        )
        .plot_groups(groups);
        info!(
            "run {}: {} plots made, {} failed, {} expected",
            params.run_id, tally.succeeded, tally.failed, total
        );

        progress.update("Formatting output", 95);
        package(&outdir, &params.run_id)
    }
}

/// External process clients: the NAME model and the plotting tool
use crate::domain::{PlotOptions, SumSummary, SumWindow};
use crate::errors::{ApiError, ApiResult};
use serde::Serialize;
use std::ffi::OsStr;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tracing::{debug, info};

/// Field drawn from a summation
pub const SUM_FIELD: &str = "total";

/// What a single image is drawn from
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawSource<'a> {
    /// One time-bucket column of a raw output file
    Field { file: &'a Path, column: &'a str },
    /// A summation over every file in a directory
    Sum {
        dir: &'a Path,
        window: SumWindow,
        field: &'a str,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct DrawRequest<'a> {
    pub source: DrawSource<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// File name inside `options.outdir`; the plotter picks one when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outfile: Option<String>,
    pub options: &'a PlotOptions,
}

impl DrawRequest<'_> {
    pub fn label(&self) -> String {
        match (&self.outfile, &self.source) {
            (Some(outfile), _) => outfile.clone(),
            (None, DrawSource::Field { column, .. }) => column.to_string(),
            (None, DrawSource::Sum { window, .. }) => window.to_string(),
        }
    }
}

/// Aggregation and map rendering, delegated to the plotting library.
///
/// `draw` writes one image into `options.outdir`, which must already exist.
pub trait Plotter: Send + Sync {
    /// Time-bucket column labels present in a raw output file, in file order
    fn timestamps(&self, file: &Path) -> ApiResult<Vec<String>>;

    /// Sum every file in `dir` that falls into `window`
    fn summarise(&self, dir: &Path, window: SumWindow) -> ApiResult<SumSummary>;

    fn draw(&self, request: &DrawRequest<'_>) -> ApiResult<()>;
}

/// Plotter backed by a command line tool
pub struct CommandPlotter {
    cmd: String,
}

impl CommandPlotter {
    pub fn new(cmd: String) -> Self {
        Self { cmd }
    }

    fn run(&self, args: &[&OsStr], stdin: Option<&[u8]>) -> ApiResult<Output> {
        let mut cmd = Command::new(&self.cmd);
        cmd.args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!("executing {cmd:?}");

        let mut child = cmd
            .spawn()
            .map_err(|e| ApiError::ExternalProcess(format!("failed to start {}: {e}", self.cmd)))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input)?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(ApiError::ExternalProcess(format!(
                "{} exited with {}: {}",
                self.cmd,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }
}

impl Plotter for CommandPlotter {
    fn timestamps(&self, file: &Path) -> ApiResult<Vec<String>> {
        let output = self.run(&[OsStr::new("timestamps"), file.as_os_str()], None)?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn summarise(&self, dir: &Path, window: SumWindow) -> ApiResult<SumSummary> {
        let window = window.to_string();
        let output = self.run(
            &[OsStr::new("summarise"), dir.as_os_str(), OsStr::new(&window)],
            None,
        )?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    fn draw(&self, request: &DrawRequest<'_>) -> ApiResult<()> {
        let body = serde_json::to_vec(request)?;
        self.run(&[OsStr::new("draw")], Some(&body))?;
        Ok(())
    }
}

/// NAME model launcher
pub struct NameModelClient {
    cmd: String,
}

impl NameModelClient {
    pub fn new(cmd: String) -> Self {
        Self { cmd }
    }

    /// Run the model to completion on a written configuration; this may take hours
    pub async fn run(&self, run_dir: &Path, config_file: &Path) -> ApiResult<()> {
        let mut cmd = tokio::process::Command::new(&self.cmd);
        cmd.arg(config_file.as_os_str())
            .current_dir(run_dir)
            .stdin(Stdio::null());
        debug!("executing {cmd:?}");

        let mut child = cmd
            .spawn()
            .map_err(|e| ApiError::ExternalProcess(format!("failed to start {}: {e}", self.cmd)))?;
        let status = child
            .wait()
            .await
            .map_err(|e| ApiError::ExternalProcess(format!("{} did not complete: {e}", self.cmd)))?;

        info!("{} completed with status {}", self.cmd, status);
        if !status.success() {
            return Err(ApiError::ExternalProcess(format!(
                "NAME run in {} exited with {status}",
                run_dir.display()
            )));
        }
        Ok(())
    }
}

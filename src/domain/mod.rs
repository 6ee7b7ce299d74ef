/// Domain models for the application
use crate::errors::ApiError;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

pub const RUN_PROCESS: &str = "run_name";
pub const PLOT_PROCESS: &str = "plot_name";

fn default_elevation() -> i64 {
    10
}
fn default_true() -> bool {
    true
}
fn default_time() -> i64 {
    1
}
fn default_time_unit() -> String {
    "days".to_string()
}
fn default_min_lon() -> f64 {
    -180.0
}
fn default_max_lon() -> f64 {
    180.0
}
fn default_min_lat() -> f64 {
    -90.0
}
fn default_max_lat() -> f64 {
    90.0
}
fn default_elevation_out() -> Vec<String> {
    vec!["0-100".to_string()]
}
fn default_resolution() -> f64 {
    0.25
}
fn default_summarise() -> String {
    "NA".to_string()
}
fn default_colormap() -> String {
    "coolwarm".to_string()
}

/// Raw `run_name` request as submitted by a client
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    pub title: String,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default = "default_elevation")]
    pub elevation: i64,
    #[serde(default = "default_true")]
    pub run_backwards: bool,
    #[serde(default = "default_time")]
    pub time: i64,
    #[serde(default = "default_time_unit")]
    pub time_unit: String,
    #[serde(default = "default_min_lon")]
    pub min_lon: f64,
    #[serde(default = "default_max_lon")]
    pub max_lon: f64,
    #[serde(default = "default_min_lat")]
    pub min_lat: f64,
    #[serde(default = "default_max_lat")]
    pub max_lat: f64,
    #[serde(default = "default_elevation_out")]
    pub elevation_out: Vec<String>,
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    pub run_type: String,
    pub daily_time: Option<String>,
    pub daily_release_len: Option<u32>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Raw `plot_name` request as submitted by a client
#[derive(Debug, Clone, Deserialize)]
pub struct PlotRequest {
    pub run_id: String,
    #[serde(default = "default_summarise")]
    pub summarise: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub station: Option<bool>,
    pub projection: Option<String>,
    #[serde(default = "default_min_lon")]
    pub min_lon: f64,
    #[serde(default = "default_max_lon")]
    pub max_lon: f64,
    #[serde(default = "default_min_lat")]
    pub min_lat: f64,
    #[serde(default = "default_max_lat")]
    pub max_lat: f64,
    pub scale: Option<String>,
    #[serde(default = "default_colormap")]
    pub colormap: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // latitude first, the order the model expects its domain in
        write!(
            f,
            "{}, {}, {}, {}",
            self.min_lat, self.min_lon, self.max_lat, self.max_lon
        )
    }
}

/// Output elevation averaging range in metres above ground level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElevationRange {
    pub min: u32,
    pub max: u32,
}

impl fmt::Display for ElevationRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunDirection {
    Forward,
    Backward,
}

impl RunDirection {
    pub fn from_backwards(run_backwards: bool) -> Self {
        if run_backwards {
            RunDirection::Backward
        } else {
            RunDirection::Forward
        }
    }
}

impl fmt::Display for RunDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunDirection::Forward => write!(f, "Forwards"),
            RunDirection::Backward => write!(f, "Backwards"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Days,
    Hours,
}

impl FromStr for TimeUnit {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "days" => Ok(TimeUnit::Days),
            "hours" => Ok(TimeUnit::Hours),
            other => Err(ApiError::InvalidInput(format!(
                "time_unit \"{other}\" is not one of: days, hours"
            ))),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeUnit::Days => write!(f, "days"),
            TimeUnit::Hours => write!(f, "hours"),
        }
    }
}

/// How often the model releases: every three hours or once a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunCadence {
    #[serde(rename = "3-hourly")]
    ThreeHourly,
    #[serde(rename = "daily")]
    Daily,
}

impl RunCadence {
    pub fn buckets_per_day(&self) -> u32 {
        match self {
            RunCadence::ThreeHourly => 8,
            RunCadence::Daily => 1,
        }
    }
}

impl FromStr for RunCadence {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "3-hourly" => Ok(RunCadence::ThreeHourly),
            "daily" => Ok(RunCadence::Daily),
            other => Err(ApiError::InvalidInput(format!(
                "run_type \"{other}\" is not one of: 3-hourly, daily"
            ))),
        }
    }
}

impl fmt::Display for RunCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunCadence::ThreeHourly => write!(f, "3-hourly"),
            RunCadence::Daily => write!(f, "daily"),
        }
    }
}

/// Validated and normalized run parameters, ready to become a model configuration
#[derive(Debug, Clone, Serialize)]
pub struct RunParams {
    pub title: String,
    pub longitude: f64,
    pub latitude: f64,
    pub elevation: i64,
    pub direction: RunDirection,
    pub duration: u32,
    pub time_unit: TimeUnit,
    pub domain: BoundingBox,
    pub elevation_ranges: Vec<ElevationRange>,
    pub resolution: f64,
    pub cadence: RunCadence,
    pub daily_time: Option<NaiveTime>,
    pub daily_release_len: Option<u32>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: String,
    pub outputs_zip: PathBuf,
    pub summary_plot: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Summarise {
    #[serde(rename = "NA")]
    None,
    #[serde(rename = "day")]
    Day,
    #[serde(rename = "week")]
    Week,
    #[serde(rename = "month")]
    Month,
    #[serde(rename = "all")]
    All,
}

impl FromStr for Summarise {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NA" => Ok(Summarise::None),
            "day" => Ok(Summarise::Day),
            "week" => Ok(Summarise::Week),
            "month" => Ok(Summarise::Month),
            "all" => Ok(Summarise::All),
            other => Err(ApiError::InvalidInput(format!(
                "summarise \"{other}\" is not one of: NA, day, week, month, all"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    Cyl,
    Npstere,
    Spstere,
}

impl FromStr for Projection {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cyl" => Ok(Projection::Cyl),
            "npstere" => Ok(Projection::Npstere),
            "spstere" => Ok(Projection::Spstere),
            other => Err(ApiError::InvalidInput(format!(
                "projection \"{other}\" is not one of: cyl, npstere, spstere"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColourMap {
    Coolwarm,
    Viridis,
    Rainbow,
}

impl FromStr for ColourMap {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coolwarm" => Ok(ColourMap::Coolwarm),
            "viridis" => Ok(ColourMap::Viridis),
            "rainbow" => Ok(ColourMap::Rainbow),
            other => Err(ApiError::InvalidInput(format!(
                "colormap \"{other}\" is not one of: coolwarm, viridis, rainbow"
            ))),
        }
    }
}

/// Options handed to the plotter for every render of one request
#[derive(Debug, Clone, Serialize)]
pub struct PlotOptions {
    pub lon_bounds: (f64, f64),
    pub lat_bounds: (f64, f64),
    pub outdir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station: Option<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Projection>,
    /// Fixed colour scale; autoscale when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<(f64, f64)>,
    pub colormap: ColourMap,
}

/// Validated plot request, bound to the run it reads from
#[derive(Debug, Clone)]
pub struct PlotParams {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub summarise: Summarise,
    /// Requested bucket label, already formatted the way the plotter names columns.
    pub timestamp: Option<String>,
    pub options: PlotOptions,
    pub metadata: RunMetadata,
}

/// Run metadata read back from `user_input_parameters.txt`
#[derive(Debug, Clone, Default)]
pub struct RunMetadata {
    entries: HashMap<String, String>,
}

impl RunMetadata {
    pub fn parse(contents: &str) -> Self {
        let entries = contents
            .lines()
            .filter_map(|line| line.trim_end().split_once(": "))
            .map(|(key, value)| (key.trim().to_string(), value.to_string()))
            .collect();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str, ApiError> {
        self.get(key).ok_or_else(|| {
            ApiError::MalformedOutput(format!(
                "user_input_parameters.txt has no \"{key}\" entry"
            ))
        })
    }

    pub fn require_f64(&self, key: &str) -> Result<f64, ApiError> {
        let raw = self.require(key)?;
        raw.trim().parse().map_err(|_| {
            ApiError::MalformedOutput(format!(
                "user_input_parameters.txt entry \"{key}\" is not a number: {raw}"
            ))
        })
    }
}

/// Temporal window the plotter sums over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SumWindow {
    Day(NaiveDate),
    Week(u32),
    Month(u32),
    All,
}

impl fmt::Display for SumWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SumWindow::Day(date) => write!(f, "day:{}", date.format("%Y%m%d")),
            SumWindow::Week(week) => write!(f, "week:{week}"),
            SumWindow::Month(month) => write!(f, "month:{month}"),
            SumWindow::All => write!(f, "all"),
        }
    }
}

/// Descriptor of one summation reported by the plotter
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SumSummary {
    pub files: usize,
    pub runname: String,
    pub averaging: String,
    pub altitude: String,
    pub direction: String,
    pub year: String,
    pub month: String,
    pub day: String,
}

impl SumSummary {
    pub fn altitude_label(&self) -> &str {
        self.altitude.trim_matches(|c| c == '(' || c == ')')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeBucket {
    Timestamp(String),
    Sum(SumWindow),
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBucket::Timestamp(label) => write!(f, "{label}"),
            TimeBucket::Sum(window) => write!(f, "{window}"),
        }
    }
}

/// One image to render: a time bucket within one output group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotJob {
    pub group: u32,
    pub bucket: TimeBucket,
}

/// Final deliverable of a plot request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlotArtifact {
    NoPlots { message: String },
    Image { path: PathBuf },
    Archive { path: PathBuf },
}

impl PlotArtifact {
    pub fn media_type(&self) -> &'static str {
        match self {
            PlotArtifact::NoPlots { .. } => "text/plain",
            PlotArtifact::Image { .. } => "image/png",
            PlotArtifact::Archive { .. } => "application/x-zipped-shp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Accepted,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub message: String,
    pub percent: u8,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "process", content = "result", rename_all = "snake_case")]
pub enum JobOutput {
    RunName(RunResult),
    PlotName(PlotArtifact),
}

/// Accepted job and its progress history
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub process: &'static str,
    pub status: JobStatus,
    pub message: String,
    pub percent: u8,
    pub updates: Vec<StatusUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Short description of an offered process
#[derive(Debug, Serialize)]
pub struct ProcessDescription {
    pub identifier: &'static str,
    pub title: &'static str,
    #[serde(rename = "abstract")]
    pub summary: &'static str,
}

/// Health check response
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub now: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_splits_on_first_separator() {
        let meta = RunMetadata::parse(
            "title: test run\nstartdate: 2023-01-01 00:00:00+00:00\nlongitude: -3.5\nbroken line\n",
        );
        assert_eq!(meta.get("title"), Some("test run"));
        assert_eq!(meta.get("startdate"), Some("2023-01-01 00:00:00+00:00"));
        assert_eq!(meta.require_f64("longitude").unwrap(), -3.5);
        assert!(meta.get("broken line").is_none());
    }

    #[test]
    fn test_metadata_missing_key_is_malformed() {
        let meta = RunMetadata::parse("title: x\n");
        let err = meta.require("enddate").unwrap_err();
        assert_eq!(err.code(), "MALFORMED_OUTPUT");
    }

    #[test]
    fn test_altitude_label_strips_parentheses() {
        let summary = SumSummary {
            altitude: "(0 - 100m agl)".to_string(),
            ..Default::default()
        };
        assert_eq!(summary.altitude_label(), "0 - 100m agl");
    }

    #[test]
    fn test_artifact_media_types() {
        let none = PlotArtifact::NoPlots {
            message: "x".into(),
        };
        assert_eq!(none.media_type(), "text/plain");
        let image = PlotArtifact::Image {
            path: PathBuf::from("a.png"),
        };
        assert_eq!(image.media_type(), "image/png");
        let zip = PlotArtifact::Archive {
            path: PathBuf::from("a.zip"),
        };
        assert_eq!(zip.media_type(), "application/x-zipped-shp");
    }

    #[test]
    fn test_enum_parsing_rejects_unknown_values() {
        assert_eq!("week".parse::<Summarise>().unwrap(), Summarise::Week);
        assert!("fortnight".parse::<Summarise>().is_err());
        assert_eq!("3-hourly".parse::<RunCadence>().unwrap(), RunCadence::ThreeHourly);
        assert!("hourly".parse::<RunCadence>().is_err());
        assert!("minutes".parse::<TimeUnit>().is_err());
        assert!("mercator".parse::<Projection>().is_err());
        assert!("jet".parse::<ColourMap>().is_err());
    }
}

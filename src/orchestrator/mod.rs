/// Drives the plotter over every output group for one plot request
use crate::clients::{DrawRequest, DrawSource, Plotter, SUM_FIELD};
use crate::domain::{
    PlotJob, PlotOptions, RunCadence, RunMetadata, SumSummary, SumWindow, Summarise, TimeBucket,
};
use crate::errors::{ApiError, ApiResult};
use crate::grouping::{is_output_file, OutputGroup};
use crate::progress::{PlotProgress, ProgressSink, RenderTally};
use crate::utils::{
    date_from_filename, inclusive_days, months_in_range, parse_datetime, weeks_in_range,
};
use chrono::{Month, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Per-request plotting state, passed explicitly through every stage
pub struct PlotContext<'a> {
    plotter: &'a dyn Plotter,
    summarise: Summarise,
    timestamp: Option<&'a str>,
    options: &'a PlotOptions,
    progress: PlotProgress<'a>,
}

impl<'a> PlotContext<'a> {
    pub fn new(
        plotter: &'a dyn Plotter,
        summarise: Summarise,
        timestamp: Option<&'a str>,
        options: &'a PlotOptions,
        sink: &'a dyn ProgressSink,
        total: u32,
    ) -> Self {
        Self {
            plotter,
            summarise,
            timestamp,
            options,
            progress: PlotProgress::new(sink, total),
        }
    }

    /// Plot every group in index order, removing each staging directory once its group is done
    pub fn plot_groups(mut self, groups: BTreeMap<u32, OutputGroup>) -> RenderTally {
        for (index, group) in groups {
            debug!("plotting group {index} from {}", group.dir().display());
            match self.summarise {
                Summarise::Day => self.plot_days(&group),
                Summarise::Week => self.plot_weeks(&group),
                Summarise::Month => self.plot_months(&group),
                Summarise::All => self.plot_all(&group),
                Summarise::None => self.plot_fields(&group),
            }
            if let Err(e) = group.close() {
                warn!("failed to remove staging directory for group {index}: {e}");
            }
        }
        self.progress.tally()
    }

    fn plot_days(&mut self, group: &OutputGroup) {
        let days: BTreeSet<NaiveDate> = group
            .files
            .iter()
            .filter_map(|file| file_name(file))
            .filter(|name| is_output_file(name))
            .filter_map(|name| {
                let day = date_from_filename(name);
                if day.is_none() {
                    warn!("no date in output file name {name}, skipping");
                }
                day
            })
            .collect();

        for day in days {
            self.plot_sum(group, SumWindow::Day(day), |s| {
                (
                    format!(
                        "{} {} {} {}: {}{}{} day sum (UTC)",
                        s.runname, s.averaging, s.altitude, s.direction, s.year, s.month, s.day
                    ),
                    format!(
                        "{}_{}_{}{}{}_daily.png",
                        s.runname,
                        s.altitude_label(),
                        s.year,
                        s.month,
                        s.day
                    ),
                )
            });
        }
    }

    fn plot_weeks(&mut self, group: &OutputGroup) {
        for week in 1..=52 {
            self.plot_sum(group, SumWindow::Week(week), |s| {
                (
                    format!(
                        "{} {} {} {}: {} week {} sum (UTC)",
                        s.runname, s.averaging, s.altitude, s.direction, s.year, week
                    ),
                    format!(
                        "{}_{}_{}_{}_weekly.png",
                        s.runname,
                        s.altitude_label(),
                        s.year,
                        week
                    ),
                )
            });
        }
    }

    fn plot_months(&mut self, group: &OutputGroup) {
        for month in 1..=12u32 {
            let name = Month::try_from(month as u8)
                .map(|m| m.name())
                .unwrap_or("unknown");
            self.plot_sum(group, SumWindow::Month(month), |s| {
                (
                    format!(
                        "{} {} {} {}: {} {} sum (UTC)",
                        s.runname, s.averaging, s.altitude, s.direction, s.year, name
                    ),
                    format!(
                        "{}_{}_{}_{}_monthly.png",
                        s.runname,
                        s.altitude_label(),
                        s.year,
                        month
                    ),
                )
            });
        }
    }

    // TODO: every altitude level gets the same summed_all file name, so later levels overwrite
    // earlier ones until the plotter reports a per-level altitude
    fn plot_all(&mut self, group: &OutputGroup) {
        self.plot_sum(group, SumWindow::All, |s| {
            (
                format!(
                    "{} {} {} {}: Summed (UTC)",
                    s.runname, s.averaging, s.altitude, s.direction
                ),
                format!("{}_{}_summed_all.png", s.runname, s.altitude_label()),
            )
        });
    }

    /// Sum one window and render it; empty windows are skipped without counting
    fn plot_sum<F>(&mut self, group: &OutputGroup, window: SumWindow, naming: F)
    where
        F: FnOnce(&SumSummary) -> (String, String),
    {
        let job = PlotJob {
            group: group.index,
            bucket: TimeBucket::Sum(window),
        };
        let summary = match self.plotter.summarise(group.dir(), window) {
            Ok(summary) => summary,
            Err(e) => {
                error!("Failed to sum {} for group {}: {e}", job.bucket, job.group);
                self.progress.record(&Err(e));
                return;
            }
        };
        if summary.files == 0 {
            debug!("No files found for {window} in group {}", group.index);
            return;
        }

        let (caption, outfile) = naming(&summary);
        let request = DrawRequest {
            source: DrawSource::Sum {
                dir: group.dir(),
                window,
                field: SUM_FIELD,
            },
            caption: Some(caption),
            outfile: Some(outfile),
            options: self.options,
        };
        self.render(&job, &request);
    }

    fn plot_fields(&mut self, group: &OutputGroup) {
        for file in &group.files {
            let Some(name) = file_name(file) else { continue };
            if !is_output_file(name) {
                continue;
            }
            let columns = match self.plotter.timestamps(file) {
                Ok(columns) => columns,
                Err(e) => {
                    error!("Failed to read time buckets of {name}: {e}");
                    continue;
                }
            };

            match self.timestamp {
                Some(wanted) => {
                    if columns.iter().any(|c| c == wanted) {
                        self.plot_field(group, file, wanted);
                        // the requested timestamp is plotted once per group
                        break;
                    }
                }
                None => {
                    for column in &columns {
                        self.plot_field(group, file, column);
                    }
                }
            }
        }
    }

    fn plot_field(&mut self, group: &OutputGroup, file: &Path, column: &str) {
        let job = PlotJob {
            group: group.index,
            bucket: TimeBucket::Timestamp(column.to_string()),
        };
        let request = DrawRequest {
            source: DrawSource::Field { file, column },
            caption: None,
            outfile: None,
            options: self.options,
        };
        self.render(&job, &request);
    }

    /// One fault-tolerant render: failures are logged and counted, never propagated
    fn render(&mut self, job: &PlotJob, request: &DrawRequest<'_>) {
        let outcome = self.plotter.draw(request);
        match &outcome {
            Ok(()) => debug!("Plotted {} (group {})", request.label(), job.group),
            Err(e) => error!("Failed to plot {} (group {}): {e}", request.label(), job.group),
        }
        self.progress.record(&outcome);
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Renders expected for a single group, estimated from the run's date range and cadence
pub fn expected_renders(
    summarise: Summarise,
    has_timestamp: bool,
    metadata: &RunMetadata,
) -> ApiResult<u32> {
    let start = metadata_date(metadata, "startdate")?;
    let end = metadata_date(metadata, "enddate")?;

    let count = match summarise {
        Summarise::None if has_timestamp => 1,
        Summarise::None => {
            let cadence: RunCadence = metadata.require("timestamp")?.parse().map_err(|_| {
                ApiError::MalformedOutput(
                    "user_input_parameters.txt has an unknown run type".to_string(),
                )
            })?;
            inclusive_days(start, end) * cadence.buckets_per_day()
        }
        Summarise::Day => inclusive_days(start, end),
        Summarise::Week => weeks_in_range(start, end),
        Summarise::Month => months_in_range(start, end),
        Summarise::All => 1,
    };
    info!("expecting {count} plots per group");
    Ok(count.max(1))
}

fn metadata_date(metadata: &RunMetadata, key: &str) -> ApiResult<NaiveDate> {
    let raw = metadata.require(key)?;
    parse_datetime(raw)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| {
            ApiError::MalformedOutput(format!(
                "user_input_parameters.txt entry \"{key}\" is not a date: {raw}"
            ))
        })
}

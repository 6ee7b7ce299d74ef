/// Percent-complete accounting for long-running jobs
use crate::errors::ApiResult;
use tracing::debug;

/// Percent at which plotting starts
pub const PLOT_START: u8 = 10;
/// Share of the percentage reserved for rendering
pub const PLOT_SPAN: u32 = 85;

/// Receiver of `(message, percent)` status updates
pub trait ProgressSink: Send + Sync {
    fn update(&self, message: &str, percent: u8);
}

/// Outcome counts over every attempted render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderTally {
    pub succeeded: u32,
    pub failed: u32,
}

impl RenderTally {
    pub fn attempted(&self) -> u32 {
        self.succeeded + self.failed
    }
}

/// Tracks renders against the expected total and reports integer percentage changes
pub struct PlotProgress<'a> {
    sink: &'a dyn ProgressSink,
    total: u32,
    last: u8,
    tally: RenderTally,
}

impl<'a> PlotProgress<'a> {
    pub fn new(sink: &'a dyn ProgressSink, total: u32) -> Self {
        Self {
            sink,
            total: total.max(1),
            last: PLOT_START,
            tally: RenderTally::default(),
        }
    }

    /// `10 + floor(done / total * 85)`, capped so an overrun never passes the packaging milestone
    pub fn percent_for(done: u32, total: u32) -> u8 {
        let total = total.max(1) as u64;
        let share = (done as u64 * PLOT_SPAN as u64) / total;
        (PLOT_START as u64 + share).min(PLOT_START as u64 + PLOT_SPAN as u64) as u8
    }

    /// Count one render attempt, successful or not
    pub fn record(&mut self, outcome: &ApiResult<()>) {
        match outcome {
            Ok(()) => self.tally.succeeded += 1,
            Err(_) => self.tally.failed += 1,
        }
        let percent = Self::percent_for(self.tally.attempted(), self.total);
        if percent > self.last {
            self.sink.update("Plotting", percent);
            self.last = percent;
        } else {
            debug!(
                "render {}/{} keeps progress at {}%",
                self.tally.attempted(),
                self.total,
                self.last
            );
        }
    }

    pub fn tally(&self) -> RenderTally {
        self.tally
    }
}

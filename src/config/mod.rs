/// Application configuration module
use anyhow::Context;
use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Root under which every run directory lives.
    pub output_dir: PathBuf,
    pub model_cmd: String,
    pub plot_cmd: String,
    pub listen_addr: String,
    /// Parent for per-group staging directories; system temp when unset.
    pub staging_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let output_dir = env::var("NAME_OUTPUT_DIR")
            .map(PathBuf::from)
            .context("NAME_OUTPUT_DIR is required")?;

        let model_cmd = env_string("NAME_MODEL_CMD", "run_name");
        let plot_cmd = env_string("NAME_PLOT_CMD", "nameplot");
        let listen_addr = env_string("LISTEN_ADDR", "0.0.0.0:3000");

        let staging_dir = env::var("STAGING_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            output_dir,
            model_cmd,
            plot_cmd,
            listen_addr,
            staging_dir,
        })
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.output_dir.join(run_id)
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

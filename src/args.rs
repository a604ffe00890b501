use clap::{Args, Parser, Subcommand, ValueEnum};
use measure::hooks::{ProjectContext, StepContext};
use measure::MeasureConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "measure")]
#[command(version)]
#[command(about = "Share one DogStatsD daemon between parallel tasks on this host", long_about = None)]
pub(crate) struct Cli {
    /// Config file (default: $MEASURE_CONFIG_DIR/config.toml or ~/.config/measure/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print diagnostic lines while setting up the daemon
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run a task command with the shared daemon available for its metrics
    Run {
        #[command(flatten)]
        daemon: DaemonArgs,

        #[command(flatten)]
        step: StepArgs,

        /// Command to run, followed by its arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Send a single metric through the shared daemon
    Emit {
        #[command(flatten)]
        daemon: DaemonArgs,

        /// Metric kind
        kind: MetricKind,

        /// Metric name
        name: String,

        /// Value (defaults to 1 for increment/decrement)
        value: Option<f64>,
    },

    /// Show the daemon fingerprint and shared file locations for this config
    Fingerprint {
        #[command(flatten)]
        daemon: DaemonArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum MetricKind {
    Gauge,
    Increment,
    Decrement,
    Distribution,
}

/// Overrides for values from the config file.
#[derive(Args, Default)]
pub(crate) struct DaemonArgs {
    /// Daemon API key (falls back to DD_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Extra constant tag; repeatable
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Don't add runtime/flow/run/step/user tags
    #[arg(long)]
    pub no_identity_tags: bool,

    /// Keep the daemon's output and log file
    #[arg(long)]
    pub debug_daemon: bool,

    /// Extra daemon environment as KEY=VALUE; repeatable
    #[arg(long = "daemon-config", value_parser = parse_key_value)]
    pub daemon_config: Vec<(String, String)>,

    /// Seconds to wait after the final flush in disposable containers (0 disables)
    #[arg(long)]
    pub wait_to_flush: Option<u64>,
}

impl DaemonArgs {
    pub fn apply(self, config: &mut MeasureConfig, verbose: bool) {
        if let Some(key) = self.api_key {
            config.api_key = Some(key);
        }
        config.tags.extend(self.tags);
        if self.no_identity_tags {
            config.include_identity_tags = false;
        }
        config.debug_daemon |= self.debug_daemon;
        config.verbose |= verbose;
        config.daemon_config.extend(self.daemon_config);
        if let Some(secs) = self.wait_to_flush {
            config.wait_to_flush = secs;
        }
    }
}

/// Identifiers of the step being run, as handed over by the pipeline.
#[derive(Args)]
pub(crate) struct StepArgs {
    #[arg(long, default_value = "")]
    pub flow: String,

    #[arg(long, default_value = "")]
    pub run_id: String,

    #[arg(long, default_value = "")]
    pub step: String,

    #[arg(long, default_value = "")]
    pub task_id: String,

    #[arg(long, default_value_t = 0)]
    pub retry_count: u32,

    #[arg(long)]
    pub project: Option<String>,

    #[arg(long, default_value = "")]
    pub branch: String,

    #[arg(long)]
    pub production: bool,
}

impl StepArgs {
    pub fn context(&self) -> StepContext {
        StepContext {
            flow_name: self.flow.clone(),
            run_id: self.run_id.clone(),
            step_name: self.step.clone(),
            task_id: self.task_id.clone(),
            username: measure::clienv::username().unwrap_or_default(),
            project: self.project.as_ref().map(|name| ProjectContext {
                name: name.clone(),
                branch: self.branch.clone(),
                is_production: self.production,
            }),
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

//! CLI command definitions

use crate::core::config::DEFAULT_CONFIG_FILE;
use crate::core::env::is_valid_name;
use crate::execution::SchedulingStrategy;
use clap::Args;

/// Default job limit for `--strategy parallel-limited`
pub const DEFAULT_JOB_LIMIT: usize = 4;

/// Run a build
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to the CI configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub file: String,

    /// Variable overrides (NAME=value), applied after every other definition
    #[arg(long, value_parser = parse_key_value)]
    pub var: Vec<(String, String)>,

    /// Scheduling strategy
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Parallel)]
    pub strategy: SchedulingStrategyArg,

    /// Maximum concurrent jobs for parallel-limited
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Only run jobs whose name matches this regex
    #[arg(long)]
    pub only: Option<String>,

    /// Run jobs for every OS, not only the host's
    #[arg(long)]
    pub all_os: bool,

    /// Shell used to run step commands
    #[arg(long, default_value = "bash")]
    pub shell: String,

    /// Project directory (defaults to the config file's directory)
    #[arg(long)]
    pub workdir: Option<String>,

    /// Run jobs in the project directory itself instead of a scratch copy
    /// per job; jobs then run one at a time
    #[arg(long)]
    pub in_place: bool,

    /// Don't save the build to history
    #[arg(long)]
    pub no_history: bool,

    /// Print the expanded matrix without running anything
    #[arg(long)]
    pub dry_run: bool,
}

impl RunCommand {
    /// Effective strategy; jobs sharing one directory never overlap
    pub fn scheduling_strategy(&self) -> SchedulingStrategy {
        if self.in_place {
            return SchedulingStrategy::Sequential;
        }
        match self.strategy {
            SchedulingStrategyArg::ParallelLimited => {
                SchedulingStrategy::LimitedParallel(self.jobs.unwrap_or(DEFAULT_JOB_LIMIT).max(1))
            }
            other => other.into(),
        }
    }
}

/// Validate a CI configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the CI configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List builds recorded in history
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show execution counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Build name to filter by
    #[arg(short, long)]
    pub name: Option<String>,

    /// Number of recent builds to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show per-job details
    #[arg(long)]
    pub details: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single build by execution ID
    #[arg(long)]
    pub build_id: Option<String>,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

impl From<SchedulingStrategyArg> for SchedulingStrategy {
    fn from(arg: SchedulingStrategyArg) -> Self {
        match arg {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => {
                SchedulingStrategy::LimitedParallel(DEFAULT_JOB_LIMIT)
            }
        }
    }
}

/// Parse NAME=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid NAME=value pair: {}", s))?;
    if !is_valid_name(name) {
        return Err(format!("Invalid variable name: {}", name));
    }
    Ok((name.to_string(), value.to_string()))
}

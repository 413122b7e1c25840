//! Build configuration from YAML

use crate::core::{
    env::{is_valid_name, parse_assignments},
    phase::Phase,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// File looked up when no config path is given
pub const DEFAULT_CONFIG_FILE: &str = ".travis.yml";

/// Operating systems a job can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Linux,
    #[serde(alias = "macos")]
    Osx,
}

impl OperatingSystem {
    /// Map a `std::env::consts::OS` value; `None` for hosts jobs can't target
    pub fn from_host_name(name: &str) -> Option<Self> {
        match name {
            "linux" => Some(OperatingSystem::Linux),
            "macos" => Some(OperatingSystem::Osx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingSystem::Linux => "linux",
            OperatingSystem::Osx => "osx",
        }
    }
}

impl std::fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperatingSystem {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linux" => Ok(OperatingSystem::Linux),
            "osx" | "macos" => Ok(OperatingSystem::Osx),
            other => anyhow::bail!("Unknown operating system '{}' (expected linux or osx)", other),
        }
    }
}

/// Entry of `env.global`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvEntry {
    /// `NAME=value [NAME2=value2 ...]`
    Plain(String),
    /// `secure: NAME` - value is forwarded from the runner's environment and masked
    Secure { secure: String },
}

/// The `env` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Variables exported to every job
    #[serde(default)]
    pub global: Vec<EnvEntry>,

    /// Each row becomes one matrix axis value
    #[serde(default)]
    pub matrix: Vec<String>,
}

/// The `env` key accepts either the full mapping or a bare list of matrix rows
#[derive(Deserialize)]
#[serde(untagged)]
enum EnvSection {
    Rows(Vec<String>),
    Full(EnvConfig),
}

fn deserialize_env<'de, D>(deserializer: D) -> std::result::Result<EnvConfig, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<EnvSection>::deserialize(deserializer)? {
        None => EnvConfig::default(),
        Some(EnvSection::Rows(matrix)) => EnvConfig {
            global: Vec::new(),
            matrix,
        },
        Some(EnvSection::Full(config)) => config,
    })
}

/// A matrix cell selector used by `matrix.exclude` and `matrix.include`
///
/// The interpreter version is stored under the language key (e.g. `python`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixEntry {
    #[serde(default)]
    pub os: Option<OperatingSystem>,

    /// Env row, compared verbatim with `env.matrix` rows
    #[serde(default)]
    pub env: Option<String>,

    /// Remaining keys, including the interpreter key
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl MatrixEntry {
    /// Interpreter version selected by this entry
    pub fn version(&self, language: Option<&str>) -> Option<String> {
        language
            .and_then(|lang| self.extra.get(lang))
            .and_then(scalar_to_string)
    }
}

/// The `matrix` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatrixConfig {
    #[serde(default)]
    pub exclude: Vec<MatrixEntry>,

    #[serde(default)]
    pub include: Vec<MatrixEntry>,
}

/// A command in one of the phases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepConfig {
    /// Plain command string
    Command(String),
    /// Command with metadata
    Detailed {
        run: String,
        #[serde(default)]
        name: Option<String>,
        /// Disabled steps are kept in the plan but never executed
        #[serde(default)]
        disabled: bool,
    },
}

impl StepConfig {
    pub fn command(&self) -> &str {
        match self {
            StepConfig::Command(run) | StepConfig::Detailed { run, .. } => run,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            StepConfig::Command(_) => None,
            StepConfig::Detailed { name, .. } => name.as_deref(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, StepConfig::Detailed { disabled: true, .. })
    }
}

/// The `deploy` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployConfig {
    /// A present but disabled deploy is planned and reported, never executed
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub run: Vec<StepConfig>,
}

/// Top-level build configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiConfig {
    /// Build name; defaults to the config's parent directory name
    #[serde(default)]
    pub name: Option<String>,

    /// Language, also the key of the interpreter version axis
    #[serde(default)]
    pub language: Option<String>,

    /// Operating system axis
    #[serde(default = "default_os")]
    pub os: Vec<OperatingSystem>,

    #[serde(default, deserialize_with = "deserialize_env")]
    pub env: EnvConfig,

    #[serde(default, alias = "jobs")]
    pub matrix: MatrixConfig,

    #[serde(default)]
    pub before_install: Vec<StepConfig>,

    #[serde(default)]
    pub install: Vec<StepConfig>,

    #[serde(default)]
    pub before_script: Vec<StepConfig>,

    #[serde(default)]
    pub script: Vec<StepConfig>,

    #[serde(default)]
    pub after_success: Vec<StepConfig>,

    #[serde(default)]
    pub after_failure: Vec<StepConfig>,

    #[serde(default)]
    pub after_script: Vec<StepConfig>,

    #[serde(default)]
    pub deploy: Option<DeployConfig>,

    /// Per-step timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Everything else, including the interpreter axis (`python: [...]`)
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

fn default_os() -> Vec<OperatingSystem> {
    vec![OperatingSystem::Linux]
}

/// Default per-step timeout: the hosted 50 minute job limit
pub const DEFAULT_TIMEOUT_SECS: u64 = 3000;

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl CiConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config = Self::from_yaml(&content)?;
        if config.name.is_none() {
            config.name = path
                .canonicalize()
                .ok()
                .and_then(|p| p.parent().and_then(|d| d.file_name()).map(|n| n.to_string_lossy().into_owned()));
        }
        Ok(config)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CiConfig = serde_yaml::from_str(yaml).context("Invalid build configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Build name used in history and output
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("build")
    }

    /// Values of the interpreter axis, e.g. `["2.7", "3.4", "3.5"]`
    pub fn versions(&self) -> Vec<String> {
        let Some(language) = self.language.as_deref() else {
            return Vec::new();
        };
        match self.extra.get(language) {
            Some(Value::Sequence(values)) => values.iter().filter_map(scalar_to_string).collect(),
            Some(value) => scalar_to_string(value).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Names of the host variables referenced by `secure` entries
    pub fn secure_names(&self) -> Vec<&str> {
        self.env
            .global
            .iter()
            .filter_map(|entry| match entry {
                EnvEntry::Secure { secure } => Some(secure.as_str()),
                EnvEntry::Plain(_) => None,
            })
            .collect()
    }

    /// Commands of a phase, in file order
    pub fn phase_steps(&self, phase: Phase) -> &[StepConfig] {
        match phase {
            Phase::BeforeInstall => &self.before_install,
            Phase::Install => &self.install,
            Phase::BeforeScript => &self.before_script,
            Phase::Script => &self.script,
            Phase::AfterSuccess => &self.after_success,
            Phase::AfterFailure => &self.after_failure,
            Phase::Deploy => self.deploy.as_ref().map(|d| d.run.as_slice()).unwrap_or(&[]),
            Phase::AfterScript => &self.after_script,
        }
    }

    /// Whether deploy commands may run at all
    pub fn deploy_enabled(&self) -> bool {
        self.deploy.as_ref().is_some_and(|d| d.enabled)
    }

    /// Effective per-step timeout
    pub fn step_timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.os.is_empty() {
            anyhow::bail!("The os list must contain at least one operating system");
        }

        if self.script.is_empty() {
            anyhow::bail!("The script phase must contain at least one command");
        }

        if let Some(language) = &self.language {
            if let Some(value) = self.extra.get(language) {
                let valid = match value {
                    Value::Sequence(values) => values.iter().all(|v| scalar_to_string(v).is_some()),
                    other => scalar_to_string(other).is_some(),
                };
                if !valid {
                    anyhow::bail!("Versions listed under '{}' must be scalars", language);
                }
            }
        }

        for entry in &self.env.global {
            match entry {
                EnvEntry::Plain(line) => {
                    parse_assignments(line)
                        .with_context(|| format!("Invalid env.global entry '{}'", line))?;
                }
                EnvEntry::Secure { secure } => {
                    if !is_valid_name(secure) {
                        anyhow::bail!("Secure entry '{}' is not a valid variable name", secure);
                    }
                }
            }
        }

        for row in &self.env.matrix {
            parse_assignments(row).with_context(|| format!("Invalid env.matrix row '{}'", row))?;
        }

        for entry in self.matrix.include.iter().chain(&self.matrix.exclude) {
            if let Some(row) = &entry.env {
                parse_assignments(row)
                    .with_context(|| format!("Invalid env in matrix entry '{}'", row))?;
            }
        }

        for phase in Phase::ALL {
            for step in self.phase_steps(phase) {
                if step.command().trim().is_empty() {
                    anyhow::bail!("Empty command in the {} phase", phase);
                }
            }
        }

        if self.timeout_secs == Some(0) {
            anyhow::bail!("timeout_secs must be greater than zero");
        }

        Ok(())
    }
}

//! Matrix expansion - turns a config into the list of jobs to run

use crate::core::{
    config::{CiConfig, EnvEntry, MatrixEntry, OperatingSystem},
    env::{parse_assignments, Assignment, EnvVar, JobEnvironment},
    job::Job,
};
use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Coordinates of one job in the matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixCell {
    pub os: OperatingSystem,
    pub version: Option<String>,
    pub env_row: Option<String>,
}

impl MatrixCell {
    /// Same coordinates, ignoring whitespace around the env row
    fn same_as(&self, other: &MatrixCell) -> bool {
        self.os == other.os
            && self.version == other.version
            && self.env_row.as_deref().map(str::trim) == other.env_row.as_deref().map(str::trim)
    }

    fn matches(&self, entry: &MatrixEntry, language: Option<&str>) -> bool {
        let os_ok = entry.os.map_or(true, |os| os == self.os);
        let version_ok = entry
            .version(language)
            .map_or(true, |v| self.version.as_deref() == Some(v.as_str()));
        let env_ok = entry
            .env
            .as_deref()
            .map_or(true, |env| self.env_row.as_deref().map(str::trim) == Some(env.trim()));
        os_ok && version_ok && env_ok
    }
}

/// Drop repeated axis values, keeping the first occurrence of each
fn unique<T, K, F>(axis: &str, values: Vec<T>, key: F) -> Vec<T>
where
    T: std::fmt::Debug,
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let mut seen: Vec<K> = Vec::with_capacity(values.len());
    let mut kept = Vec::with_capacity(values.len());
    for value in values {
        let k = key(&value);
        if seen.contains(&k) {
            warn!("Ignoring duplicate {} value {:?}", axis, value);
            continue;
        }
        seen.push(k);
        kept.push(value);
    }
    kept
}

/// Expands `os` × interpreter versions × `env.matrix` rows into jobs
pub struct MatrixExpander<'a> {
    config: &'a CiConfig,
    secrets: HashMap<String, String>,
    overrides: Vec<(String, String)>,
}

impl<'a> MatrixExpander<'a> {
    pub fn new(config: &'a CiConfig) -> Self {
        Self {
            config,
            secrets: HashMap::new(),
            overrides: Vec::new(),
        }
    }

    /// Values for `secure` entries, keyed by variable name
    pub fn with_secrets(mut self, secrets: HashMap<String, String>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Variables applied after every other definition
    pub fn with_overrides(mut self, overrides: Vec<(String, String)>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Matrix cells after exclusions and inclusions, in job order
    pub fn cells(&self) -> Vec<MatrixCell> {
        let language = self.config.language.as_deref();

        let oses = unique("os", self.config.os.clone(), |os| *os);
        let versions: Vec<Option<String>> = {
            let versions = unique(language.unwrap_or("version"), self.config.versions(), |v| {
                v.clone()
            });
            if versions.is_empty() {
                vec![None]
            } else {
                versions.into_iter().map(Some).collect()
            }
        };
        let rows: Vec<Option<String>> = {
            let rows = unique("env.matrix", self.config.env.matrix.clone(), |row| {
                row.trim().to_string()
            });
            if rows.is_empty() {
                vec![None]
            } else {
                rows.into_iter().map(Some).collect()
            }
        };

        let mut cells = Vec::new();
        for &os in &oses {
            for version in &versions {
                for row in &rows {
                    cells.push(MatrixCell {
                        os,
                        version: version.clone(),
                        env_row: row.clone(),
                    });
                }
            }
        }

        for entry in &self.config.matrix.exclude {
            if entry.os.is_none() && entry.env.is_none() && entry.version(language).is_none() {
                warn!("Ignoring matrix.exclude entry without os, env or version");
                continue;
            }
            let before = cells.len();
            cells.retain(|cell| !cell.matches(entry, language));
            debug!("matrix.exclude removed {} job(s)", before - cells.len());
        }

        let default_os = oses.first().copied().unwrap_or(OperatingSystem::Linux);
        let default_version = versions.first().cloned().flatten();
        for entry in &self.config.matrix.include {
            let cell = MatrixCell {
                os: entry.os.unwrap_or(default_os),
                version: entry.version(language).or_else(|| default_version.clone()),
                env_row: entry.env.clone(),
            };
            if cells.iter().any(|existing| existing.same_as(&cell)) {
                warn!("Ignoring matrix.include entry that duplicates an existing job: {:?}", cell);
                continue;
            }
            cells.push(cell);
        }

        cells
    }

    /// Expand into numbered jobs with resolved environments
    pub fn expand(&self) -> Result<Vec<Job>> {
        self.cells()
            .into_iter()
            .enumerate()
            .map(|(index, cell)| {
                let number = index + 1;
                let env = self
                    .environment(number, &cell)
                    .with_context(|| format!("Failed to build environment for job {}", number))?;
                Ok(Job::new(
                    number,
                    cell.os,
                    self.config.language.clone(),
                    cell.version,
                    cell.env_row,
                    env,
                    self.config,
                ))
            })
            .collect()
    }

    /// Built-in variables, then `env.global`, then the matrix row, then overrides
    fn environment(&self, number: usize, cell: &MatrixCell) -> Result<JobEnvironment> {
        let mut env = JobEnvironment::new();

        env.set(EnvVar::new("CI", "true"));
        env.set(EnvVar::new("TRAVIS", "true"));
        env.set(EnvVar::new("CONTINUOUS_INTEGRATION", "true"));
        env.set(EnvVar::new("TRAVIS_OS_NAME", cell.os.as_str()));
        env.set(EnvVar::new("TRAVIS_JOB_NUMBER", number.to_string()));
        if let (Some(language), Some(version)) = (&self.config.language, &cell.version) {
            env.set(EnvVar::new(
                format!("TRAVIS_{}_VERSION", language.to_uppercase()),
                version.clone(),
            ));
        }

        for entry in &self.config.env.global {
            match entry {
                EnvEntry::Plain(line) => {
                    for assignment in parse_assignments(line)? {
                        env.assign(&assignment);
                    }
                }
                EnvEntry::Secure { secure } => match self.secrets.get(secure) {
                    Some(value) => env.set(EnvVar::secure(secure.clone(), value.clone())),
                    None => warn!(
                        "Secure variable {} is not available, job {} runs without it",
                        secure, number
                    ),
                },
            }
        }

        if let Some(row) = &cell.env_row {
            for assignment in parse_assignments(row)? {
                env.assign(&assignment);
            }
        }

        for (name, value) in &self.overrides {
            env.assign(&Assignment {
                name: name.clone(),
                value: value.clone(),
                literal: false,
            });
        }

        Ok(env)
    }
}

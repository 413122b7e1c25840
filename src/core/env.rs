//! Job environment - ordered variables, expansion and secret masking

use anyhow::Result;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Replacement shown wherever a secure value would be printed
pub const MASK: &str = "[secure]";

/// A single environment variable of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,

    /// Value after expansion
    pub value: String,

    /// Secure values are masked in every piece of output
    #[serde(default)]
    pub secure: bool,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            secure: false,
        }
    }

    pub fn secure(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            secure: true,
        }
    }

    /// Value suitable for display
    pub fn display_value(&self) -> &str {
        if self.secure {
            MASK
        } else {
            &self.value
        }
    }
}

/// An unexpanded `NAME=value` assignment as written in the config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub value: String,
    /// Single-quoted values are taken literally
    pub literal: bool,
}

fn assignment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*([A-Za-z_][A-Za-z0-9_]*)=("(?:[^"\\]|\\.)*"|'[^']*'|[^\s"']*)"#)
            .expect("assignment regex is valid")
    })
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\\\$|\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("reference regex is valid")
    })
}

/// Check that a name is usable as a shell variable
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a line such as `PY_VERSION=2.7 FLAGS="-x -v"` into assignments
pub fn parse_assignments(line: &str) -> Result<Vec<Assignment>> {
    let re = assignment_regex();
    let mut rest = line;
    let mut assignments = Vec::new();

    while !rest.trim().is_empty() {
        let caps = match re.captures(rest) {
            Some(caps) => caps,
            None => anyhow::bail!(
                "Invalid environment assignment '{}' (expected NAME=value)",
                rest.trim()
            ),
        };

        let raw = &caps[2];
        let (value, literal) = if raw.len() >= 2 && raw.starts_with('\'') {
            (raw[1..raw.len() - 1].to_string(), true)
        } else if raw.len() >= 2 && raw.starts_with('"') {
            (unescape_double_quoted(&raw[1..raw.len() - 1]), false)
        } else {
            (raw.to_string(), false)
        };

        assignments.push(Assignment {
            name: caps[1].to_string(),
            value,
            literal,
        });

        let consumed = caps.get(0).map(|m| m.end()).unwrap_or(rest.len());
        rest = &rest[consumed..];
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            anyhow::bail!("Invalid environment assignment near '{}'", rest.trim());
        }
    }

    Ok(assignments)
}

fn unescape_double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('"') | Some('\\') => {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                // keep `\$` intact so expansion can treat it as a literal dollar
                _ => out.push(c),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Expand `$NAME` and `${NAME}` against already-defined variables.
///
/// Unknown names expand to the empty string and `\$` yields a literal `$`.
pub fn expand(value: &str, vars: &BTreeMap<String, String>) -> String {
    reference_regex()
        .replace_all(value, |caps: &Captures| {
            if caps.get(0).map(|m| m.as_str()) == Some("\\$") {
                return "$".to_string();
            }
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            vars.get(name).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Ordered environment of a single job
///
/// Later definitions of a name override earlier ones, mirroring a sequence
/// of shell `export` statements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvironment {
    vars: Vec<EnvVar>,
}

impl JobEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a variable verbatim
    pub fn set(&mut self, var: EnvVar) {
        self.vars.retain(|v| v.name != var.name);
        self.vars.push(var);
    }

    /// Define a variable from a config assignment, expanding references
    pub fn assign(&mut self, assignment: &Assignment) {
        let value = if assignment.literal {
            assignment.value.clone()
        } else {
            expand(&assignment.value, &self.resolved())
        };
        self.set(EnvVar::new(assignment.name.clone(), value));
    }

    /// Look up a variable value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }

    /// Variables in definition order
    pub fn vars(&self) -> &[EnvVar] {
        &self.vars
    }

    /// Name → value map handed to the command runner
    pub fn resolved(&self) -> BTreeMap<String, String> {
        self.vars
            .iter()
            .map(|v| (v.name.clone(), v.value.clone()))
            .collect()
    }

    /// Values that must never be printed
    pub fn secret_values(&self) -> Vec<&str> {
        self.vars
            .iter()
            .filter(|v| v.secure && !v.value.is_empty())
            .map(|v| v.value.as_str())
            .collect()
    }

    /// Replace every secret value occurring in `text`
    pub fn mask(&self, text: &str) -> String {
        let mut masked = text.to_string();
        for secret in self.secret_values() {
            masked = masked.replace(secret, MASK);
        }
        masked
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

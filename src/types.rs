use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Health of the long-running engine as tracked by the supervisor.
///
/// - `Idle`: nothing running; `start()` is allowed.
/// - `Starting`: pre-flight and spawn in progress.
/// - `Ready`: the engine process was spawned and has not exited yet.
/// - `Closing`: an interrupt was delivered; waiting for the process to exit.
/// - `Error`: the last spawn failed or the engine exited with a non-zero code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Idle,
    Starting,
    Ready,
    Closing,
    Error,
}

impl ProcessState {
    /// True for states the engine only leaves through an explicit call.
    pub fn is_settled(self) -> bool {
        matches!(self, ProcessState::Idle | ProcessState::Error)
    }
}

impl Default for ProcessState {
    fn default() -> Self {
        ProcessState::Idle
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Idle => "idle",
            ProcessState::Starting => "starting",
            ProcessState::Ready => "ready",
            ProcessState::Closing => "closing",
            ProcessState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Output format requested from a test run.
///
/// `Json` makes the engine emit machine-readable output, and the collected
/// stdout chunks are concatenated without a separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TestFormat {
    Text,
    Json,
}

impl Default for TestFormat {
    fn default() -> Self {
        TestFormat::Text
    }
}

impl FromStr for TestFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(TestFormat::Text),
            "json" => Ok(TestFormat::Json),
            other => Err(format!(
                "invalid format: {other} (expected \"text\" or \"json\")"
            )),
        }
    }
}

/// Which part of the rule test the engine should perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum TestType {
    /// Schema check, query and alert simulation.
    Full,
    /// Only validate the rule document against the schema.
    SchemaOnly,
    /// Only count matching documents.
    CountOnly,
}

impl Default for TestType {
    fn default() -> Self {
        TestType::Full
    }
}

impl FromStr for TestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "full" => Ok(TestType::Full),
            "schemaonly" => Ok(TestType::SchemaOnly),
            "countonly" => Ok(TestType::CountOnly),
            other => Err(format!(
                "invalid test type: {other} (expected \"full\", \"schemaOnly\" or \"countOnly\")"
            )),
        }
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

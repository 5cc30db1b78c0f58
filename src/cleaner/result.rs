use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::common::errors::{ErrorKind, ResetError};

/// Classified failure attached to an unsuccessful result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    pub kind: ErrorKind,
    pub detail: String,
}

/// How a single step ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success,
    /// The step does not apply to this IDE; counts as success
    Skipped,
    Failed(OperationError),
}

/// Outcome of a single operation on a single IDE, with a message and
/// operation-specific data.
///
/// On the wire it reads `{success, skipped, message, data, error?}`, and
/// `error` is present exactly when `success` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResult", into = "RawResult")]
pub struct OperationResult {
    outcome: Outcome,
    message: String,
    data: Map<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct RawResult {
    success: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    skipped: bool,
    message: String,
    #[serde(default)]
    data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<OperationError>,
}

impl TryFrom<RawResult> for OperationResult {
    type Error = String;

    fn try_from(raw: RawResult) -> Result<Self, Self::Error> {
        let outcome = match (raw.success, raw.skipped, raw.error) {
            (true, false, None) => Outcome::Success,
            (true, true, None) => Outcome::Skipped,
            (false, false, Some(error)) => Outcome::Failed(error),
            (false, true, _) => return Err("a failed result cannot be skipped".to_string()),
            _ => {
                return Err("`error` must be present exactly when `success` is false".to_string())
            }
        };
        Ok(Self {
            outcome,
            message: raw.message,
            data: raw.data,
        })
    }
}

impl From<OperationResult> for RawResult {
    fn from(result: OperationResult) -> Self {
        let (success, skipped, error) = match result.outcome {
            Outcome::Success => (true, false, None),
            Outcome::Skipped => (true, true, None),
            Outcome::Failed(error) => (false, false, Some(error)),
        };
        Self {
            success,
            skipped,
            message: result.message,
            data: result.data,
            error,
        }
    }
}

impl OperationResult {
    fn with_outcome(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
            data: Map::new(),
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::with_outcome(Outcome::Success, message)
    }

    pub fn failed(message: impl Into<String>, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::with_outcome(
            Outcome::Failed(OperationError {
                kind,
                detail: detail.into(),
            }),
            message,
        )
    }

    /// Failed result classified from a typed error
    pub fn from_error(message: impl Into<String>, err: &ResetError) -> Self {
        if err.kind() == ErrorKind::Unexpected {
            tracing::error!("{:?}", err);
        }
        Self::failed(message, err.kind(), err.to_string())
    }

    /// A step that does not apply to this IDE
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::with_outcome(Outcome::Skipped, reason)
    }

    /// Attach a data entry
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.data.insert(key.to_string(), value);
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, Outcome::Failed(_))
    }

    pub fn is_skipped(&self) -> bool {
        self.outcome == Outcome::Skipped
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn error(&self) -> Option<&OperationError> {
        match &self.outcome {
            Outcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Integer data entry, 0 when absent
    pub fn count(&self, key: &str) -> u64 {
        self.data.get(key).and_then(Value::as_u64).unwrap_or(0)
    }
}

impl From<ResetError> for OperationResult {
    fn from(err: ResetError) -> Self {
        let message = err.to_string();
        Self::from_error(message, &err)
    }
}

/// Named step of a per-IDE pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    #[serde(rename = "signout")]
    Signout,
    #[serde(rename = "cleaning.telemetry")]
    Telemetry,
    #[serde(rename = "cleaning.database")]
    Database,
    #[serde(rename = "cleaning.workspace_storage")]
    WorkspaceStorage,
    #[serde(rename = "cleaning.global_storage")]
    GlobalStorage,
    #[serde(rename = "cleaning.storage")]
    Storage,
    #[serde(rename = "signin_prep")]
    SigninPrep,
    #[serde(rename = "restart")]
    Restart,
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "start")]
    Start,
}

impl Step {
    pub fn label(self) -> &'static str {
        match self {
            Step::Signout => "signout",
            Step::Telemetry => "cleaning.telemetry",
            Step::Database => "cleaning.database",
            Step::WorkspaceStorage => "cleaning.workspace_storage",
            Step::GlobalStorage => "cleaning.global_storage",
            Step::Storage => "cleaning.storage",
            Step::SigninPrep => "signin_prep",
            Step::Restart => "restart",
            Step::Stop => "stop",
            Step::Start => "start",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Every step recorded for one IDE, in execution order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeReport {
    pub success: bool,
    pub steps: IndexMap<Step, OperationResult>,
}

impl Default for IdeReport {
    fn default() -> Self {
        Self::new()
    }
}

impl IdeReport {
    pub fn new() -> Self {
        Self {
            success: true,
            steps: IndexMap::new(),
        }
    }

    pub fn record(&mut self, step: Step, result: OperationResult) {
        self.steps.insert(step, result);
        self.success = self.steps.values().all(OperationResult::is_success);
    }

    pub fn get(&self, step: Step) -> Option<&OperationResult> {
        self.steps.get(&step)
    }

    pub fn failed_steps(&self) -> Vec<Step> {
        self.steps
            .iter()
            .filter(|(_, r)| !r.is_success())
            .map(|(s, _)| *s)
            .collect()
    }
}

/// Terminal state of a multi-IDE run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every enabled step was attempted for every IDE
    Done,
    /// Nothing to work on
    Aborted,
    /// Stopped early by the cancel flag
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Done => write!(f, "done"),
            RunStatus::Aborted => write!(f, "aborted"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// IDE display name → step → result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTree {
    pub operation: String,
    pub status: RunStatus,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub ides: IndexMap<String, IdeReport>,
}

impl ResultTree {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            status: RunStatus::Done,
            message: String::new(),
            started_at: Utc::now(),
            ides: IndexMap::new(),
        }
    }

    pub fn aborted(operation: &str, message: impl Into<String>) -> Self {
        let mut tree = Self::new(operation);
        tree.status = RunStatus::Aborted;
        tree.message = message.into();
        tree
    }

    pub fn record(&mut self, ide: &str, step: Step, result: OperationResult) {
        self.ides
            .entry(ide.to_string())
            .or_insert_with(IdeReport::new)
            .record(step, result);
    }

    pub fn ide(&self, name: &str) -> Option<&IdeReport> {
        self.ides.get(name)
    }

    pub fn step(&self, ide: &str, step: Step) -> Option<&OperationResult> {
        self.ides.get(ide).and_then(|r| r.get(step))
    }

    /// True when the run finished and every IDE succeeded
    pub fn success(&self) -> bool {
        self.status == RunStatus::Done && self.ides.values().all(|r| r.success)
    }

    pub fn succeeded_count(&self) -> usize {
        self.ides.values().filter(|r| r.success).count()
    }

    /// Fill in the summary message from the recorded reports
    pub fn finish(&mut self) {
        if self.status == RunStatus::Aborted {
            return;
        }
        let total = self.ides.len();
        let ok = self.succeeded_count();
        let prefix = if self.status == RunStatus::Cancelled {
            "Cancelled: "
        } else {
            ""
        };
        self.message = format!("{}{} of {} IDEs completed successfully", prefix, ok, total);
    }
}

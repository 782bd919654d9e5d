//! Result reporting.
//!
//! The run's outcome is printed to stdout as one JSON object, in the shape a
//! host automation framework expects from a module.

use std::process::ExitCode;

use serde::Serialize;

use crate::reconciler::Outcome;

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ModuleResult {
    Success(Outcome),
    Failure { failed: bool, msg: String },
}

impl ModuleResult {
    pub fn success(outcome: Outcome) -> Self {
        ModuleResult::Success(outcome)
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        ModuleResult::Failure {
            failed: true,
            msg: msg.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ModuleResult::Failure { .. })
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_failure() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"failed": true, "msg": "failed to serialize result: {}"}}"#,
                e
            )
        })
    }
}

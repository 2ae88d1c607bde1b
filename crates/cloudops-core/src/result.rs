//! Execution result envelope

use crate::command::Phase;
use crate::error::{CommandError, GatewayError};
use serde::Serialize;

/// Why an invocation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed CLI input, caught before any provider call
    Validation,
    /// Expected condition reported back to the operator
    Operational,
    /// The provider call itself failed (network, auth, quota)
    Provider,
    /// No such command for the provider
    Lookup,
}

impl FailureKind {
    /// Process exit status for this kind of failure.
    ///
    /// Validation and operational failures are data, not process failures.
    pub fn exit_code(self) -> i32 {
        match self {
            FailureKind::Validation | FailureKind::Operational => 0,
            FailureKind::Provider => 1,
            FailureKind::Lookup => 2,
        }
    }

    /// Classify a non-fatal command error
    pub fn of(error: &CommandError) -> Self {
        match error {
            CommandError::Validation(_) => FailureKind::Validation,
            CommandError::Operational(_) => FailureKind::Operational,
            CommandError::Provider(GatewayError::Runtime(_)) => FailureKind::Operational,
            CommandError::Provider(_) => FailureKind::Provider,
            CommandError::Lookup(_) => FailureKind::Lookup,
            CommandError::NotImplemented(_) | CommandError::Spec(_) => FailureKind::Provider,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Validation => write!(f, "validation"),
            FailureKind::Operational => write!(f, "operational"),
            FailureKind::Provider => write!(f, "provider"),
            FailureKind::Lookup => write!(f, "lookup"),
        }
    }
}

/// Details of a failed invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,

    /// Phase the failure was raised in, `None` before dispatch
    pub phase: Option<Phase>,

    /// Never empty
    pub message: String,
}

/// Uniform outcome of one invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Success(serde_json::Value),
    Failure(Failure),
}

impl ExecutionResult {
    pub fn success(payload: serde_json::Value) -> Self {
        ExecutionResult::Success(payload)
    }

    pub fn failure(kind: FailureKind, phase: Option<Phase>, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = format!("{} error", kind);
        }
        ExecutionResult::Failure(Failure {
            kind,
            phase,
            message,
        })
    }

    pub fn from_error(phase: Option<Phase>, error: &CommandError) -> Self {
        Self::failure(FailureKind::of(error), phase, error.to_string())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            ExecutionResult::Success(payload) => Some(payload),
            ExecutionResult::Failure(_) => None,
        }
    }

    pub fn failure_details(&self) -> Option<&Failure> {
        match self {
            ExecutionResult::Success(_) => None,
            ExecutionResult::Failure(failure) => Some(failure),
        }
    }

    /// The JSON document printed on stdout: the raw payload, or
    /// `{"error": <message>}`
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ExecutionResult::Success(payload) => payload.clone(),
            ExecutionResult::Failure(failure) => serde_json::json!({ "error": failure.message }),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ExecutionResult::Success(_) => 0,
            ExecutionResult::Failure(failure) => failure.kind.exit_code(),
        }
    }
}

//! Error types for the lifecycle command framework

use crate::command::Phase;
use thiserror::Error;

/// Raw input failed validation against a command spec.
///
/// Rendered the way argparse-style CLIs report it: `argument --zone: is
/// required` for a single bad flag, `unrecognized arguments: a b` for
/// tokens no flag accepts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("argument --{flag}: {reason}")]
    Flag { flag: String, reason: String },

    #[error("unrecognized arguments: {}", .0.join(" "))]
    Unrecognized(Vec<String>),
}

impl ValidationError {
    pub fn new(flag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Flag {
            flag: flag.into(),
            reason: reason.into(),
        }
    }

    /// The offending flag, if the error is about one
    pub fn flag(&self) -> Option<&str> {
        match self {
            Self::Flag { flag, .. } => Some(flag),
            Self::Unrecognized(_) => None,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Flag { reason, .. } => reason,
            Self::Unrecognized(_) => "unrecognized arguments",
        }
    }
}

/// A defect in how a command was defined or registered.
///
/// These surface while the registry is built, before any invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("Duplicate flag '{flag}' in command '{command}'")]
    DuplicateFlag { command: String, flag: String },

    #[error("Required flag '{flag}' in command '{command}' must not have a default")]
    RequiredWithDefault { command: String, flag: String },

    #[error("Command '{command}' declares more than one positional flag")]
    MultiplePositional { command: String },

    #[error("Default of flag '{flag}' in command '{command}' is invalid: {reason}")]
    InvalidDefault {
        command: String,
        flag: String,
        reason: String,
    },

    #[error("Command '{verb}' is already registered for provider '{provider}'")]
    DuplicateCommand { provider: String, verb: String },
}

/// Registry lookup failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("No command '{verb}' registered for provider '{provider}'")]
pub struct LookupError {
    pub provider: String,
    pub verb: String,
}

/// Errors raised by a provider gateway implementation
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An expected condition the provider reports back to the operator
    /// (bad region, empty payload, ...). Rendered like an operational error.
    #[error("{0}")]
    Runtime(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while running a lifecycle command
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Operational(String),

    #[error(transparent)]
    Provider(#[from] GatewayError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("The {0} phase is not implemented for this command")]
    NotImplemented(Phase),

    #[error(transparent)]
    Spec(#[from] SpecError),
}

impl CommandError {
    pub fn operational(message: impl Into<String>) -> Self {
        CommandError::Operational(message.into())
    }

    /// Programming defects that must terminate the process instead of being
    /// rendered as an error payload.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CommandError::NotImplemented(_) | CommandError::Spec(_))
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_message_names_flag() {
        let err = ValidationError::new("instance_type", "is required");
        assert_eq!(err.to_string(), "argument --instance_type: is required");
        assert_eq!(err.flag(), Some("instance_type"));

        let err = ValidationError::Unrecognized(vec!["b".into(), "c".into()]);
        assert_eq!(err.to_string(), "unrecognized arguments: b c");
        assert_eq!(err.flag(), None);
    }

    #[test]
    fn test_fatal_errors() {
        assert!(CommandError::NotImplemented(Phase::Execute).is_fatal());
        assert!(!CommandError::operational("no region").is_fatal());
        assert!(!CommandError::from(GatewayError::ApiError("quota".into())).is_fatal());
    }

    #[test]
    fn test_runtime_error_message_is_verbatim() {
        let err = CommandError::from(GatewayError::Runtime("Network already exists".into()));
        assert_eq!(err.to_string(), "Network already exists");
    }
}

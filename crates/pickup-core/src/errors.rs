//! Structured error types shared across pickup crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Diagnostic payload carried by every [`PickupError`].
///
/// `code` is a dotted, machine readable identifier such as
/// `burnin.duplicate_identity`; `context` names the run numbers, axes,
/// coordinates or paths involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Dotted error code, stable across releases.
    pub code: String,
    /// Operator facing description.
    pub message: String,
    /// Identifiers involved in the failure.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
    /// Suggested remediation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Starts a payload with no context.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Records `key=value`; numbers and ids are rendered with `ToString`.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Attaches a remediation hint, replacing any earlier one.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Renders as `message [code] {key=value, ...}; hint: ...`.
impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.message, self.code)?;
        let mut pairs = self.context.iter();
        if let Some((key, value)) = pairs.next() {
            write!(f, " {{{key}={value}")?;
            for (key, value) in pairs {
                write!(f, ", {key}={value}")?;
            }
            write!(f, "}}")?;
        }
        match &self.hint {
            Some(hint) => write!(f, "; hint: {hint}"),
            None => Ok(()),
        }
    }
}

/// Canonical error type for the sweep engine.
///
/// Every failure is raised at the point of detection and aborts the whole
/// experiment build; there is no partial result to recover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum PickupError {
    /// No qualifying burn-in data for the requested experiment.
    #[error("not found: {0}")]
    NotFound(ErrorInfo),
    /// Burn-in metadata that cannot be bound unambiguously.
    #[error("inconsistent state: {0}")]
    InconsistentState(ErrorInfo),
    /// Degenerate sweep input such as an axis without values.
    #[error("empty axis: {0}")]
    EmptyAxis(ErrorInfo),
    /// Burn-in binding out of range or missing required artifacts.
    #[error("binding error: {0}")]
    Binding(ErrorInfo),
    /// One or more instances failed validation during assembly.
    #[error("assembly error: {0}")]
    Assembly(ErrorInfo),
    /// Metadata store access failures.
    #[error("store error: {0}")]
    Store(ErrorInfo),
    /// Serialization, plan parsing and file system errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
    /// Execution resources such as the composition worker pool.
    #[error("runtime error: {0}")]
    Runtime(ErrorInfo),
}

impl PickupError {
    /// Payload shared by every family.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            PickupError::NotFound(info)
            | PickupError::InconsistentState(info)
            | PickupError::EmptyAxis(info)
            | PickupError::Binding(info)
            | PickupError::Assembly(info)
            | PickupError::Store(info)
            | PickupError::Serde(info)
            | PickupError::Runtime(info) => info,
        }
    }

    /// Shorthand for `self.info().code`.
    pub fn code(&self) -> &str {
        &self.info().code
    }
}

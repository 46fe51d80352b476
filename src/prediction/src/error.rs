//! Prediction errors.
//!
//! Every failure a caller can observe is one of a fixed set of kinds with a stable
//! numeric code, plus a free text detail.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PredictionError>;

/// The kind of a prediction failure.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// The model or its session could not be constructed, or has no usable signature.
    FailedToLoadModel = 0,
    /// The request payload doesn't match the expected shape, aliases or lengths.
    InvalidInputs = 1,
    /// The execution engine failed while running the graph.
    FailedToRunGraph = 2,
    /// The engine output batch could not be turned into response rows.
    InvalidOutputs = 3,
    /// A user supplied model implementation is missing or malformed.
    InvalidUserCode = 4,
}

impl ErrorKind {
    /// Stable numeric code.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Fixed message for the kind.
    pub const fn message(self) -> &'static str {
        match self {
            ErrorKind::FailedToLoadModel => "Failed to load model",
            ErrorKind::InvalidInputs => "Invalid inputs",
            ErrorKind::FailedToRunGraph => "Failed to run the model graph",
            ErrorKind::InvalidOutputs => "There was a problem processing the outputs",
            ErrorKind::InvalidUserCode => "There was a problem processing the user code",
        }
    }
}

/// A failure of one prediction call.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{}: {} (Error code: {})", .kind.message(), .detail, .kind.code())]
pub struct PredictionError {
    kind: ErrorKind,
    detail: String,
}

impl PredictionError {
    /// Create an error of `kind` with a detail message.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        PredictionError {
            kind,
            detail: detail.into(),
        }
    }

    /// Shorthand for [`ErrorKind::FailedToLoadModel`].
    pub fn failed_to_load_model(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::FailedToLoadModel, detail)
    }

    /// Shorthand for [`ErrorKind::InvalidInputs`].
    pub fn invalid_inputs(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInputs, detail)
    }

    /// Shorthand for [`ErrorKind::FailedToRunGraph`].
    pub fn failed_to_run_graph(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::FailedToRunGraph, detail)
    }

    /// Shorthand for [`ErrorKind::InvalidOutputs`].
    pub fn invalid_outputs(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOutputs, detail)
    }

    /// Shorthand for [`ErrorKind::InvalidUserCode`].
    pub fn invalid_user_code(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidUserCode, detail)
    }

    /// The kind of failure.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Stable numeric code of the kind.
    pub fn code(&self) -> u32 {
        self.kind.code()
    }

    /// Fixed message of the kind.
    pub fn message(&self) -> &'static str {
        self.kind.message()
    }

    /// Free text detail.
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

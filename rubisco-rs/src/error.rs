//! Error kinds raised by the substitution engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The template could not be tokenised.
    #[error("malformed expression: {message}")]
    MalformedExpression {
        message: String,
        hint: Option<String>,
    },

    /// A reference had no binding, no callback supplied one and there was
    /// no fallback.
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },

    /// The fast formatter met a construct it does not handle.
    #[error("not a simple expression: {reason}")]
    NotSimpleExpression { reason: &'static str },

    /// Inline code touched a denied capability.
    #[error("'{capability}' is disallowed in inline expressions")]
    CapabilityDisallowed { capability: String },

    /// Any other failure while evaluating inline code.
    #[error("failed to evaluate inline expression `{expression}`: {message}")]
    Eval {
        expression: String,
        message: String,
        hint: String,
    },

    #[error("the value of key {key:?} needs to be {expected} instead of {actual}")]
    TypeMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("key not found: {key:?}")]
    MissingKey { key: String },

    #[error("index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

impl Error {
    pub(crate) fn malformed(message: impl Into<String>, hint: Option<&str>) -> Self {
        Error::MalformedExpression {
            message: message.into(),
            hint: hint.map(str::to_string),
        }
    }

    pub(crate) fn undefined(name: impl Into<String>) -> Self {
        Error::UndefinedVariable { name: name.into() }
    }

    /// A short suggestion for the user, when the error carries one.
    pub fn hint(&self) -> Option<String> {
        match self {
            Error::MalformedExpression { hint, .. } => hint.clone(),
            Error::UndefinedVariable { name } => Some(format!(
                "define '{name}' or add a fallback: ${{{{{name}: default}}}}"
            )),
            Error::NotSimpleExpression { .. } => {
                Some("use the full formatter for fallbacks and inline code".to_string())
            }
            Error::CapabilityDisallowed { .. } => None,
            Error::Eval { hint, .. } => Some(hint.clone()),
            Error::TypeMismatch { .. } | Error::MissingKey { .. } => {
                Some("check the configuration file".to_string())
            }
            Error::IndexOutOfRange { .. } => None,
        }
    }

    /// Errors a caller may catch and handle: retry with the full formatter,
    /// substitute a value for an undefined variable, or accept a value of
    /// an unexpected type.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NotSimpleExpression { .. }
                | Error::UndefinedVariable { .. }
                | Error::TypeMismatch { .. }
        )
    }
}

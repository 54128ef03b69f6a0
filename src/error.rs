//! Library error type

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CalcError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    /// A registry lookup for an identifier that was never defined.
    #[error("no {kind} named '{id}'")]
    NotFound { kind: &'static str, id: String },

    /// A requested identifier is neither a resource nor a recipe.
    #[error("unknown target '{0}'")]
    UnknownTarget(String),

    #[error("invalid target '{id}': {reason}")]
    InvalidTarget { id: String, reason: String },

    /// Registries or defaults are inconsistent. Fatal at load time.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// More than one recipe produces `resource` and no default was configured.
    #[error("no default recipe for '{resource}' (candidates: {})", .candidates.join(", "))]
    AmbiguousChoice {
        resource: String,
        candidates: Vec<String>,
    },

    #[error("demand did not converge after {iterations} iterations (last change {delta:.3e})")]
    UnsatisfiableCycle { iterations: usize, delta: f64 },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl CalcError {
    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        CalcError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether the same query can succeed after an outside decision.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CalcError::AmbiguousChoice { .. })
    }
}

/// Convenience result type used across the orchestrator.
pub type RenderResult<T> = Result<T, RenderError>;

/// Top-level error taxonomy used by orchestrator APIs.
///
/// Cancellation is not part of this enum: cooperative aborts are reported through
/// [`crate::Outcome::Aborted`] so callers can tell "try again" apart from "something broke".
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// Invalid creation flags, settings or an unsupported quality request.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Backend or host allocation failure. The context stays usable for a retry.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A public method was called out of order or with arguments that break its contract.
    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    /// An optional backend feature is missing. Callers may fall back to a simpler path.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Failure reported by the render backend session.
    #[error("backend error: {0}")]
    Backend(String),

    /// Errors when serializing or deserializing settings or scene data.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RenderError {
    /// Build a [`RenderError::Configuration`] value.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Build a [`RenderError::ResourceExhausted`] value.
    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// Build a [`RenderError::InvalidUsage`] value.
    pub fn invalid_usage(msg: impl Into<String>) -> Self {
        Self::InvalidUsage(msg.into())
    }

    /// Build a [`RenderError::Unsupported`] value.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Build a [`RenderError::Backend`] value.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Build a [`RenderError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Prefix the message with the phase or channel that produced it, keeping the variant.
    pub fn context(self, label: impl std::fmt::Display) -> Self {
        match self {
            Self::Configuration(m) => Self::Configuration(format!("{label}: {m}")),
            Self::ResourceExhausted(m) => Self::ResourceExhausted(format!("{label}: {m}")),
            Self::InvalidUsage(m) => Self::InvalidUsage(format!("{label}: {m}")),
            Self::Unsupported(m) => Self::Unsupported(format!("{label}: {m}")),
            Self::Backend(m) => Self::Backend(format!("{label}: {m}")),
            Self::Serde(m) => Self::Serde(format!("{label}: {m}")),
            Self::Other(e) => Self::Other(e.context(label.to_string())),
        }
    }

    /// True for the recoverable "feature missing" case.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;

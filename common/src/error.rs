use thiserror::Error;

/// Errors surfaced by the registry, the gateway and the SDK client
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error("{entity} '{id}' already exists")]
    AlreadyExists { entity: String, id: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Backend transport failure or timeout. Retryable.
    #[error("Registry unavailable: {message}")]
    Unavailable { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// The message bus refused or failed a publish.
    #[error("Transport error on '{subject}': {message}")]
    Transport { subject: String, message: String },
}

impl BrokerError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn already_exists(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Whether the caller may retry the same call later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Transport { .. })
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;

//! Error types for cardfront.

use serde::Serialize;

/// Top-level error type for the client core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Configuration-related errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable-storage errors. Only the write path surfaces these; reads
/// degrade to an absent credential.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read key {key}: {reason}")]
    Read { key: String, reason: String },

    #[error("Failed to write key {key}: {reason}")]
    Write { key: String, reason: String },

    #[error("Failed to remove key {key}: {reason}")]
    Remove { key: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Authentication-strategy errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Challenge request failed for {strategy}: {reason}")]
    ChallengeFailed { strategy: String, reason: String },

    #[error("Wallet signer failed over {transport}: {reason}")]
    SignerFailed { transport: String, reason: String },

    #[error(
        "Auth response carried no recognized credential field (checked {})",
        crate::auth::CREDENTIAL_FIELDS.join(", ")
    )]
    MissingCredential,

    #[error("Session rejected by backend: {reason}")]
    SessionRejected { reason: String },

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Remote API gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{status} on {path}: {message}")]
    Request {
        status: u16,
        message: String,
        path: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response body on {path}: {reason}")]
    Decode { path: String, reason: String },
}

impl GatewayError {
    /// Whether this failure indicates a dead or rejected credential.
    ///
    /// A 401, or an error message mentioning `jwt` or `Authentication`,
    /// means the session is gone server-side; callers must tear down the
    /// local session instead of retrying.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Request {
                status, message, ..
            } => {
                *status == 401 || message.contains("jwt") || message.contains("Authentication")
            }
            Self::Transport(e) => e.status().map(|s| s.as_u16()) == Some(401),
            Self::Decode { .. } => false,
        }
    }
}

/// Synchronous input/navigation rejections. No state is mutated.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Step {requested} is not reachable from the current profile (at {current})")]
    StepNotReachable { requested: String, current: String },

    #[error("Invalid {field}: {message}")]
    InvalidInput { field: String, message: String },
}

/// Failure domains surfaced to UI consumers alongside session events.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDomain {
    Auth,
    Network,
    Validation,
    Config,
    Unknown,
}

impl Error {
    /// Classify for UI surfaces: auth-class errors route back to login,
    /// network-class errors keep the user in place with a retry notice.
    pub fn domain(&self) -> ErrorDomain {
        match self {
            Self::Config(_) => ErrorDomain::Config,
            Self::Auth(_) => ErrorDomain::Auth,
            Self::Gateway(e) if e.is_auth_failure() => ErrorDomain::Auth,
            Self::Gateway(_) => ErrorDomain::Network,
            Self::Validation(_) => ErrorDomain::Validation,
            Self::Store(_) => ErrorDomain::Unknown,
        }
    }

    /// Whether the previous session state should be retained and the
    /// operation offered for manual retry.
    pub fn retryable(&self) -> bool {
        matches!(self.domain(), ErrorDomain::Network)
    }
}

/// Result type alias for the client core.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_401_as_auth_failure() {
        let err = GatewayError::Request {
            status: 401,
            message: "Unauthorized".to_string(),
            path: "/v1/users/me".to_string(),
        };
        assert!(err.is_auth_failure());
        assert_eq!(Error::from(err).domain(), ErrorDomain::Auth);
    }

    #[test]
    fn classifies_jwt_message_as_auth_failure() {
        let err = GatewayError::Request {
            status: 500,
            message: "jwt malformed".to_string(),
            path: "/v1/users/me".to_string(),
        };
        assert!(err.is_auth_failure());
    }

    #[test]
    fn other_statuses_are_network_class() {
        let err = GatewayError::Request {
            status: 503,
            message: "upstream unavailable".to_string(),
            path: "/v1/users/me".to_string(),
        };
        assert!(!err.is_auth_failure());
        let err = Error::from(err);
        assert_eq!(err.domain(), ErrorDomain::Network);
        assert!(err.retryable());
    }

    #[test]
    fn navigation_rejections_do_not_retry() {
        let err = Error::from(ValidationError::StepNotReachable {
            requested: "card-order".to_string(),
            current: "kyc".to_string(),
        });
        assert_eq!(err.domain(), ErrorDomain::Validation);
        assert!(!err.retryable());
    }
}

//! Wallet authentication strategies.
//!
//! Each strategy drives a remote challenge flow (nonce issuance, wallet
//! signature, verification) and hands a normalized credential to the
//! session controller. Wallet signing itself is an injected collaborator;
//! the backend verifies signatures.

mod crosschain;
mod embedded;
mod external;

pub use crosschain::CrossChainWalletStrategy;
pub use embedded::EmbeddedWalletStrategy;
pub use external::ExternalWalletStrategy;

use std::sync::Arc;

use async_trait::async_trait;
use rand::{Rng, distributions::Alphanumeric};
use secrecy::SecretString;
use serde_json::Value;

use crate::error::{AuthError, ValidationError};
use crate::gateway::ApiGateway;
use crate::onboarding::Profile;

/// Candidate credential fields on auth responses, in priority order. The
/// first populated field wins.
pub const CREDENTIAL_FIELDS: [&str; 4] = ["accessToken", "token", "jwt", "access_token"];

/// Result of a completed authentication flow.
#[derive(Debug)]
pub struct AuthHandoff {
    pub bearer: SecretString,
    /// Profile embedded in the verification response, when the backend
    /// includes one. Authoritative for the first step computation.
    pub profile: Option<Profile>,
}

/// A wallet authentication flow producing a bearer credential.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn authenticate(&self, gateway: &ApiGateway) -> Result<AuthHandoff, AuthError>;
}

/// Opaque signing collaborator: produces a signature string for a message
/// and address. Implementations wrap whatever transport reaches the
/// user's wallet.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Transport label for diagnostics ("injected-provider",
    /// "wallet-connect", ...).
    fn transport(&self) -> &'static str;

    async fn sign(&self, address: &str, message: &str) -> Result<String, AuthError>;
}

/// Tries a primary signing transport, falling back to a second one only
/// after the primary fails.
pub struct FallbackSigner {
    primary: Arc<dyn WalletSigner>,
    fallback: Arc<dyn WalletSigner>,
}

impl FallbackSigner {
    pub fn new(primary: Arc<dyn WalletSigner>, fallback: Arc<dyn WalletSigner>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl WalletSigner for FallbackSigner {
    fn transport(&self) -> &'static str {
        "fallback-chain"
    }

    async fn sign(&self, address: &str, message: &str) -> Result<String, AuthError> {
        match self.primary.sign(address, message).await {
            Ok(signature) => Ok(signature),
            Err(e) => {
                tracing::warn!(
                    transport = self.primary.transport(),
                    "Primary signing transport failed, trying {}: {e}",
                    self.fallback.transport()
                );
                self.fallback.sign(address, message).await
            }
        }
    }
}

/// Pick the bearer value out of an auth response body.
///
/// Fails loudly when no recognized field is populated; an empty credential
/// must never reach the token store.
pub fn extract_bearer(body: &Value) -> Result<SecretString, AuthError> {
    for field in CREDENTIAL_FIELDS {
        if let Some(value) = body.get(field).and_then(Value::as_str) {
            let value = value.trim();
            if !value.is_empty() {
                return Ok(SecretString::from(value.to_string()));
            }
        }
    }
    Err(AuthError::MissingCredential)
}

/// Profile payload embedded in a verification response, under either of
/// the field names the backend has used.
pub(crate) fn extract_profile(body: &Value) -> Option<Profile> {
    for field in ["user", "profile"] {
        if let Some(raw) = body.get(field)
            && let Ok(profile) = serde_json::from_value::<Profile>(raw.clone())
        {
            return Some(profile);
        }
    }
    None
}

/// Lowercased `0x` + 40 hex wallet address, or a rejection.
pub(crate) fn normalize_wallet_address(raw: &str) -> Result<String, ValidationError> {
    let candidate = raw.trim().to_ascii_lowercase();
    let hex = candidate.strip_prefix("0x").unwrap_or_default();
    if hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(candidate)
    } else {
        Err(ValidationError::InvalidInput {
            field: "wallet_address".to_string(),
            message: "must be a 0x-prefixed 40-hex address".to_string(),
        })
    }
}

pub(crate) fn random_nonce(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Nonce from a challenge response, tolerating the two field names the
/// auth service has shipped.
pub(crate) fn challenge_nonce(strategy: &'static str, body: &Value) -> Result<String, AuthError> {
    body.get("nonce")
        .or_else(|| body.get("challenge"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AuthError::ChallengeFailed {
            strategy: strategy.to_string(),
            reason: "challenge response carried no nonce".to_string(),
        })
}

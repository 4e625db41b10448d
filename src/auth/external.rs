//! External-wallet authentication: signature challenge against the user's
//! own wallet (injected provider or wallet-connect transport).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{Value, json};

use crate::error::{AuthError, ValidationError};
use crate::gateway::ApiGateway;

use super::{
    AuthHandoff, AuthStrategy, WalletSigner, challenge_nonce, extract_bearer, extract_profile,
    normalize_wallet_address, random_nonce,
};

pub struct ExternalWalletStrategy {
    address: String,
    chain_id: u64,
    signer: Arc<dyn WalletSigner>,
}

impl ExternalWalletStrategy {
    pub fn new(
        address: &str,
        chain_id: u64,
        signer: Arc<dyn WalletSigner>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            address: normalize_wallet_address(address)?,
            chain_id,
            signer,
        })
    }

    /// Challenge text signed by the wallet. The backend's own message wins
    /// when the challenge response carries one; this local assembly covers
    /// nonce-only responses.
    fn challenge_message(&self, nonce: &str) -> String {
        format!(
            "Card Access Authorization\nWallet: {}\nChain ID: {}\nNonce: {}\nIssued At: {}\n\nSign to verify wallet control. No transaction is submitted and no gas is spent.",
            self.address,
            self.chain_id,
            nonce,
            Utc::now().to_rfc3339()
        )
    }
}

#[async_trait]
impl AuthStrategy for ExternalWalletStrategy {
    fn name(&self) -> &'static str {
        "external-wallet"
    }

    async fn authenticate(&self, gateway: &ApiGateway) -> Result<AuthHandoff, AuthError> {
        let challenge = gateway.request_nonce(&self.address, self.chain_id).await?;
        let nonce = challenge_nonce(self.name(), &challenge)
            .unwrap_or_else(|_| random_nonce(24));
        let message = challenge
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.challenge_message(&nonce));

        let signature = self.signer.sign(&self.address, &message).await?;

        let response = gateway
            .request(
                Method::POST,
                "/v1/auth/wallet/verify",
                Some(&json!({
                    "address": self.address,
                    "chainId": self.chain_id,
                    "message": message,
                    "signature": signature,
                })),
            )
            .await?;

        Ok(AuthHandoff {
            bearer: extract_bearer(&response)?,
            profile: extract_profile(&response),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::storage::MemoryStorage;
    use crate::token::{SystemClock, TokenStore};
    use secrecy::ExposeSecret;
    use std::time::Duration;

    const ADDR: &str = "0x00000000000000000000000000000000000000a1";

    struct StubSigner;

    #[async_trait]
    impl WalletSigner for StubSigner {
        fn transport(&self) -> &'static str {
            "stub"
        }

        async fn sign(&self, _address: &str, _message: &str) -> Result<String, AuthError> {
            Ok("0xdeadbeef".to_string())
        }
    }

    fn gateway(base_url: &str) -> ApiGateway {
        let api = ApiConfig {
            base_url: url::Url::parse(base_url).unwrap(),
            partner_id: "partner_test".to_string(),
            request_timeout: Duration::from_secs(5),
        };
        let tokens = Arc::new(TokenStore::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(SystemClock),
            Duration::from_secs(3600),
        ));
        ApiGateway::new(&api, tokens)
    }

    #[tokio::test]
    async fn completes_the_nonce_sign_verify_flow() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/auth/nonce")
            .with_body(r#"{"nonce":"n-123","message":"please sign n-123"}"#)
            .create_async()
            .await;
        let verify = server
            .mock("POST", "/v1/auth/wallet/verify")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "address": ADDR,
                "signature": "0xdeadbeef",
                "message": "please sign n-123",
            })))
            .with_body(r#"{"accessToken":"tok-1"}"#)
            .create_async()
            .await;

        let strategy = ExternalWalletStrategy::new(ADDR, 1, Arc::new(StubSigner)).unwrap();
        let handoff = strategy.authenticate(&gateway(&server.url())).await.unwrap();
        assert_eq!(handoff.bearer.expose_secret(), "tok-1");
        verify.assert_async().await;
    }

    #[tokio::test]
    async fn unrecognized_verify_body_fails_without_a_credential() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/auth/nonce")
            .with_body(r#"{"nonce":"n-1"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/v1/auth/wallet/verify")
            .with_body(r#"{}"#)
            .create_async()
            .await;

        let strategy = ExternalWalletStrategy::new(ADDR, 1, Arc::new(StubSigner)).unwrap();
        let err = strategy
            .authenticate(&gateway(&server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingCredential));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(ExternalWalletStrategy::new("0x123", 1, Arc::new(StubSigner)).is_err());
    }
}

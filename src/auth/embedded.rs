//! Embedded smart-account authentication: the account's owner key signs
//! the challenge, scoped to the embedded-wallet app id.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

use crate::error::{AuthError, ValidationError};
use crate::gateway::ApiGateway;

use super::{
    AuthHandoff, AuthStrategy, WalletSigner, challenge_nonce, extract_bearer, extract_profile,
    normalize_wallet_address,
};

pub struct EmbeddedWalletStrategy {
    owner_address: String,
    app_id: String,
    chain_id: u64,
    signer: Arc<dyn WalletSigner>,
}

impl EmbeddedWalletStrategy {
    pub fn new(
        owner_address: &str,
        app_id: &str,
        chain_id: u64,
        signer: Arc<dyn WalletSigner>,
    ) -> Result<Self, ValidationError> {
        let app_id = app_id.trim();
        if app_id.is_empty() {
            return Err(ValidationError::InvalidInput {
                field: "app_id".to_string(),
                message: "embedded-wallet app id is required".to_string(),
            });
        }
        Ok(Self {
            owner_address: normalize_wallet_address(owner_address)?,
            app_id: app_id.to_string(),
            chain_id,
            signer,
        })
    }
}

#[async_trait]
impl AuthStrategy for EmbeddedWalletStrategy {
    fn name(&self) -> &'static str {
        "embedded-wallet"
    }

    async fn authenticate(&self, gateway: &ApiGateway) -> Result<AuthHandoff, AuthError> {
        let challenge = gateway
            .request_nonce(&self.owner_address, self.chain_id)
            .await?;
        let nonce = challenge_nonce(self.name(), &challenge)?;

        // The embedded account abstracts the chain away from the user; the
        // owner key still proves control of the account.
        let message = format!(
            "Card Access Authorization\nSmart Account Owner: {}\nApp: {}\nNonce: {}",
            self.owner_address, self.app_id, nonce
        );
        let signature = self.signer.sign(&self.owner_address, &message).await?;

        let response = gateway
            .request(
                Method::POST,
                "/v1/auth/embedded/verify",
                Some(&json!({
                    "ownerAddress": self.owner_address,
                    "appId": self.app_id,
                    "chainId": self.chain_id,
                    "nonce": nonce,
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

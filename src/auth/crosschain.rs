//! Cross-chain mini-app wallet authentication: the challenge carries the
//! source chain id so the backend can verify a signature produced inside
//! the mini-app wallet runtime.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AuthError, ValidationError};
use crate::gateway::ApiGateway;

use super::{
    AuthHandoff, AuthStrategy, WalletSigner, challenge_nonce, extract_bearer, extract_profile,
    normalize_wallet_address,
};

pub struct CrossChainWalletStrategy {
    address: String,
    source_chain_id: u64,
    channel_id: String,
    signer: Arc<dyn WalletSigner>,
}

impl CrossChainWalletStrategy {
    pub fn new(
        address: &str,
        source_chain_id: u64,
        channel_id: &str,
        signer: Arc<dyn WalletSigner>,
    ) -> Result<Self, ValidationError> {
        let channel_id = channel_id.trim();
        if channel_id.is_empty() {
            return Err(ValidationError::InvalidInput {
                field: "channel_id".to_string(),
                message: "mini-app channel id is required".to_string(),
            });
        }
        Ok(Self {
            address: normalize_wallet_address(address)?,
            source_chain_id,
            channel_id: channel_id.to_string(),
            signer,
        })
    }
}

#[async_trait]
impl AuthStrategy for CrossChainWalletStrategy {
    fn name(&self) -> &'static str {
        "crosschain-wallet"
    }

    async fn authenticate(&self, gateway: &ApiGateway) -> Result<AuthHandoff, AuthError> {
        let challenge = gateway
            .request_nonce(&self.address, self.source_chain_id)
            .await?;
        let nonce = challenge_nonce(self.name(), &challenge)?;

        // Client-generated state ties the verify call back to this attempt
        // across the mini-app runtime's redirect hops.
        let state = Uuid::new_v4().to_string();
        let message = format!(
            "Card Access Authorization\nWallet: {}\nSource Chain: {}\nChannel: {}\nNonce: {}\nState: {}",
            self.address, self.source_chain_id, self.channel_id, nonce, state
        );
        let signature = self.signer.sign(&self.address, &message).await?;

        let response = gateway
            .request(
                Method::POST,
                "/v1/auth/crosschain/verify",
                Some(&json!({
                    "address": self.address,
                    "sourceChainId": self.source_chain_id,
                    "channelId": self.channel_id,
                    "nonce": nonce,
                    "state": state,
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

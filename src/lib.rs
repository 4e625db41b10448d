//! cardfront: headless client core for a stablecoin card onboarding and
//! top-up product.
//!
//! The crate owns four cooperating pieces:
//!
//! - [`token::TokenStore`] — the bearer credential, its expiry, and the
//!   cached profile, persisted across restarts.
//! - [`session::SessionController`] — authentication lifecycle, expiry
//!   monitoring, and prerequisite-gated step navigation.
//! - [`onboarding`] — the pure progress resolver mapping a profile
//!   snapshot to the current onboarding step.
//! - [`gateway::ApiGateway`] — the single entry point all authenticated
//!   card-issuer calls pass through.
//!
//! Wallet signing and the card issuer's KYC decisioning are external
//! collaborators: the former injected behind [`auth::WalletSigner`], the
//! latter reached over HTTP.

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod onboarding;
pub mod session;
pub mod storage;
pub mod token;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::Config;
pub use error::{Error, Result};
pub use gateway::ApiGateway;
pub use onboarding::{KycStatus, OnboardingStep, Profile};
pub use session::{SessionController, SessionEvent, SessionPhase, SessionSnapshot};
pub use token::TokenStore;

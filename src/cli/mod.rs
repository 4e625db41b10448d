//! Command-line interface: inspect and manage the persisted session.

mod doctor;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::onboarding;
use crate::storage::FileStorage;
use crate::token::{SystemClock, TokenStore};

#[derive(Parser, Debug)]
#[command(name = "cardfront", version, about = "Stablecoin card onboarding client")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show session status and onboarding progress.
    Status,
    /// Clear the persisted session.
    Logout,
    /// Run configuration and connectivity diagnostics.
    Doctor {
        /// Exit non-zero when any check fails.
        #[arg(long)]
        strict: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Status => run_status(),
        Command::Logout => run_logout(),
        Command::Doctor { strict } => doctor::run_doctor_command(strict).await,
    }
}

fn open_token_store(config: &Config) -> anyhow::Result<TokenStore> {
    let storage = Arc::new(FileStorage::new(&config.storage_dir)?);
    Ok(TokenStore::new(
        storage,
        Arc::new(SystemClock),
        config.session.token_validity,
    ))
}

fn run_status() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let store = open_token_store(&config)?;

    if store.credential().is_none() {
        println!("Not logged in.");
        return Ok(());
    }

    let remaining = store.remaining_validity_secs();
    println!(
        "Logged in, {}m {:02}s of validity remaining.",
        remaining / 60,
        remaining % 60
    );

    match store.cached_profile() {
        Some(profile) => {
            let step = onboarding::determine_current_step(Some(&profile));
            println!("Current onboarding step: {step}");
            println!("KYC status: {}", profile.kyc_status.as_str());
        }
        None => println!("No cached profile; the next app start will refresh it."),
    }
    Ok(())
}

fn run_logout() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let store = open_token_store(&config)?;
    store.set_credential(None, None)?;
    println!("Session cleared.");
    Ok(())
}

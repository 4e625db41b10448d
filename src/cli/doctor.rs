//! `cardfront doctor` - active health diagnostics.
//!
//! Validates configuration and probes external collaborators to surface
//! problems before they bite during onboarding. Each check reports
//! pass/fail with actionable guidance on failures.

use std::time::Duration;

use crate::config::Config;
use crate::storage::{FileStorage, KeyValueStorage};

/// Run diagnostic checks and print results.
pub async fn run_doctor_command(strict: bool) -> anyhow::Result<()> {
    println!("cardfront Doctor");
    println!("================\n");

    let mut passed = 0u32;
    let mut failed = 0u32;

    let config = Config::from_env();

    check("Configuration", check_config(&config), &mut passed, &mut failed);
    check(
        "Storage directory",
        check_storage(&config),
        &mut passed,
        &mut failed,
    );
    check(
        "Card API reachability",
        check_api_reachability(&config).await,
        &mut passed,
        &mut failed,
    );
    check("Session", check_session(&config), &mut passed, &mut failed);

    println!();
    println!("  {passed} passed, {failed} failed");

    if failed > 0 {
        println!("\n  Some checks failed. Fix the listed items before onboarding users.");
        if strict {
            anyhow::bail!("doctor strict mode failed with {failed} check(s)");
        }
    }

    Ok(())
}

fn check(name: &str, result: CheckResult, passed: &mut u32, failed: &mut u32) {
    match result {
        CheckResult::Pass(detail) => {
            *passed += 1;
            println!("  [pass] {name}: {detail}");
        }
        CheckResult::Fail(detail) => {
            *failed += 1;
            println!("  [FAIL] {name}: {detail}");
        }
        CheckResult::Skip(reason) => {
            println!("  [skip] {name}: {reason}");
        }
    }
}

enum CheckResult {
    Pass(String),
    Fail(String),
    Skip(String),
}

fn check_config(config: &Result<Config, crate::error::ConfigError>) -> CheckResult {
    match config {
        Ok(config) => {
            let mut detail = format!(
                "api={}, partner={}",
                config.api.base_url, config.api.partner_id
            );
            if config.embedded_app_id.is_none() {
                detail.push_str(" (embedded-wallet strategy disabled)");
            }
            if config.miniapp_channel_id.is_none() {
                detail.push_str(" (cross-chain strategy disabled)");
            }
            CheckResult::Pass(detail)
        }
        Err(e) => CheckResult::Fail(e.to_string()),
    }
}

fn check_storage(config: &Result<Config, crate::error::ConfigError>) -> CheckResult {
    let Ok(config) = config else {
        return CheckResult::Skip("configuration unavailable".to_string());
    };

    let storage = match FileStorage::new(&config.storage_dir) {
        Ok(storage) => storage,
        Err(e) => return CheckResult::Fail(format!("cannot open storage dir: {e}")),
    };

    match storage
        .set("doctor.probe", "ok")
        .and_then(|()| storage.remove("doctor.probe"))
    {
        Ok(()) => CheckResult::Pass(config.storage_dir.display().to_string()),
        Err(e) => CheckResult::Fail(format!("storage dir is not writable: {e}")),
    }
}

async fn check_api_reachability(
    config: &Result<Config, crate::error::ConfigError>,
) -> CheckResult {
    let Ok(config) = config else {
        return CheckResult::Skip("configuration unavailable".to_string());
    };

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(e) => return CheckResult::Fail(format!("HTTP client build failed: {e}")),
    };

    let url = format!(
        "{}/v1/health",
        config.api.base_url.as_str().trim_end_matches('/')
    );
    // Any HTTP answer proves the host is reachable; the status itself may
    // legitimately be a 404 on deployments without a health route.
    match client.get(&url).send().await {
        Ok(response) => CheckResult::Pass(format!("{} ({})", url, response.status())),
        Err(e) => CheckResult::Fail(format!("{url} unreachable: {e}")),
    }
}

fn check_session(config: &Result<Config, crate::error::ConfigError>) -> CheckResult {
    let Ok(config) = config else {
        return CheckResult::Skip("configuration unavailable".to_string());
    };
    let storage = match FileStorage::new(&config.storage_dir) {
        Ok(storage) => storage,
        Err(_) => return CheckResult::Skip("storage unavailable".to_string()),
    };

    let store = crate::token::TokenStore::new(
        std::sync::Arc::new(storage),
        std::sync::Arc::new(crate::token::SystemClock),
        config.session.token_validity,
    );
    if store.credential().is_some() {
        let remaining = store.remaining_validity_secs();
        CheckResult::Pass(format!("credential valid for {}m", remaining / 60))
    } else {
        CheckResult::Pass("no persisted session (logged out)".to_string())
    }
}

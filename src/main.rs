//! Binary entry point for the cardfront CLI.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Working-directory .env first, then the app-home one; dotenvy never
    // overwrites, so explicit env vars keep priority.
    dotenvy::dotenv().ok();
    cardfront::config::load_cardfront_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cardfront=info")),
        )
        .init();

    cardfront::cli::run().await
}

mod auth;
mod config;
mod draft;
mod generate;
mod gmail;
mod knowledge;
mod models;
mod pipeline;
mod provider;

use crate::config::Config;
use crate::generate::{Generator, OpenAiClient};
use crate::gmail::GmailClient;
use crate::pipeline::{Pipeline, PipelineConfig};
use anyhow::Context;
use google_gmail1::Gmail;
use std::time::Duration;
use tracing::{Level, debug, error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // A missing .env is fine; the key may come from the real environment.
    let _ = dotenvy::dotenv();

    let debug_logging = std::env::args().any(|arg| arg == "--debug");
    tracing_subscriber::fmt()
        .with_max_level(if debug_logging {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .init();

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::load();

    if std::env::args().any(|arg| arg == "--reset-token") {
        auth::Authenticator::clear_token(config.token_store, &config.token_cache_path)?;
        info!("Token cleared. Run again without --reset-token to re-authenticate.");
        return Ok(());
    }

    let api_key = std::env::var(&config.api_key_env).ok();
    if let Some(key) = &api_key {
        debug!(env = %config.api_key_env, length = key.len(), "API key found");
    }

    let knowledge = knowledge::load(
        config.knowledge_base_path.as_deref(),
        config.knowledge_max_chars,
    );
    let pipeline_config = PipelineConfig::from_config(&config, api_key, knowledge)?;
    let generator = build_generator(&config, pipeline_config.api_key.as_deref());

    let secret = auth::Authenticator::load_secret(&config.client_secret_path).await?;
    let authenticator =
        auth::Authenticator::authenticate(secret, config.token_store, &config.token_cache_path)
            .await?;

    let hub = Gmail::new(
        hyper::Client::builder().build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .context("Failed to load native roots")?
                .https_only()
                .enable_http1()
                .build(),
        ),
        authenticator,
    );

    let pipeline = Pipeline::new(GmailClient::new(hub), pipeline_config, generator);
    let summary = pipeline.run().await?;

    info!(
        processed = summary.processed(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        "Run complete"
    );
    Ok(())
}

fn build_generator(config: &Config, api_key: Option<&str>) -> Option<Box<dyn Generator>> {
    let key = api_key?;
    match OpenAiClient::new(
        &config.api_base_url,
        key.to_string(),
        &config.model,
        config.temperature,
        Duration::from_secs(config.request_timeout_secs),
    ) {
        Ok(client) => Some(Box::new(client)),
        Err(e) => {
            error!(error = %e, "Failed to set up completion client");
            None
        }
    }
}

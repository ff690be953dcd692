use deal_courier_bot::auth::Authenticator;
use deal_courier_bot::config::BotConfig;
use deal_courier_bot::dispatcher::Dispatcher;
use deal_courier_bot::error::BotError;
use deal_courier_bot::telegram::TelegramClient;
use deal_courier_conversation::{DialogOptions, SessionManager};
use deal_courier_core::Result;
use deal_courier_crm::{LinkStore, RestClient, RestDirectory};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(report) = run().await {
        tracing::error!(error = %report, "deal-courier failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), BotError> {
    let config = BotConfig::from_env().map_err(|e| BotError::Config {
        reason: e.to_string(),
    })?;
    tracing::info!("Loaded configuration");

    let pattern = &config.dialog.task_label_strip;
    let options = DialogOptions::new(pattern).map_err(|e| BotError::InvalidTaskPattern {
        pattern: pattern.clone(),
        reason: e.to_string(),
    })?;

    let telegram = Arc::new(TelegramClient::new(
        &config.telegram.api_url,
        &config.telegram.token,
        Duration::from_secs(config.telegram.poll_timeout_seconds),
    ));
    let crm = RestClient::new(
        &config.crm.base_url,
        config.crm.user_id,
        &config.crm.webhook_token,
    );

    let links = Arc::new(LinkStore::open(config.links_file.clone()));
    tracing::info!(
        links = links.len(),
        path = %links.path().display(),
        "Opened user link store"
    );

    let auth = Authenticator::new(Arc::new(RestDirectory::new(crm)), Arc::clone(&links));
    let sessions = SessionManager::new(telegram.clone(), options);
    let dispatcher = Arc::new(Dispatcher::new(telegram, auth, sessions));

    dispatcher.run(shutdown_signal()).await;

    if let Err(report) = links.save() {
        tracing::warn!(error = %report, "Failed to save user links on shutdown");
    }
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

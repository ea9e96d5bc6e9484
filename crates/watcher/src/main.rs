//! HTB exam watcher binary entrypoint.

use tracing_subscriber::EnvFilter;

use htb_common::config::{AppConfig, LogFormat};
use htb_common::types::PollOutcome;
use htb_watcher::app;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("htb_watcher=info,htb_notifier=info,htb_common=info")
    });

    match format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // LOG_FORMAT may come from .env, so load it before the subscriber
    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_env());

    tracing::info!("HTB exam watcher starting...");

    let config = AppConfig::from_env();
    let missing = config.missing_settings();
    if !missing.is_empty() {
        tracing::warn!(
            missing = ?missing,
            "Some settings are not configured; the steps that need them will be skipped or fail"
        );
    }

    let report = app::run(&config).await?;

    match &report.outcome {
        PollOutcome::Terminal(record) => {
            tracing::info!(status = %record.status, "Exam result received")
        }
        PollOutcome::Timeout { polls, .. } => {
            tracing::warn!(polls, "Gave up waiting for a final result")
        }
        PollOutcome::Aborted { status, .. } => {
            tracing::error!(status, "Polling aborted on HTTP error")
        }
    }

    tracing::info!(delivery = ?report.delivery, "HTB exam watcher finished.");
    Ok(())
}

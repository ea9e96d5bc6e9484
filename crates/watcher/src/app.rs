//! One watcher run: authenticate, poll, notify.

use htb_common::config::{AppConfig, HtbConfig, PollSettings};
use htb_common::error::WatchError;
use htb_common::types::PollOutcome;
use htb_notifier::{Delivery, Notification, Notifier};

use crate::auth::TokenAcquirer;
use crate::fetcher::{Auth, StatusClient};
use crate::poller::PollLoop;

/// How a run ended and what happened to its notification.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: PollOutcome,
    pub delivery: Delivery,
}

/// Shared HTTP client for the login and attempts endpoints.
pub fn http_client(htb: &HtbConfig, polling: &PollSettings) -> Result<reqwest::Client, WatchError> {
    Ok(reqwest::Client::builder()
        .user_agent(htb.user_agent.as_str())
        .timeout(polling.http_timeout)
        .build()?)
}

/// Choose the primary auth mode and the optional cookie fallback.
pub fn select_auth(token: Option<String>, cookie: Option<String>) -> (Auth, Option<String>) {
    match (token, cookie) {
        (Some(token), cookie) => (Auth::Bearer(token), cookie),
        (None, Some(cookie)) => {
            tracing::info!("No bearer token, authenticating with HTB_COOKIE");
            (Auth::Cookie(cookie), None)
        }
        (None, None) => {
            tracing::warn!("No bearer token or HTB_COOKIE, requests will be unauthenticated");
            (Auth::Anonymous, None)
        }
    }
}

/// Execute a full run. Only a failure to build the HTTP client is an error;
/// every other failure ends in a notification attempt.
pub async fn run(config: &AppConfig) -> Result<RunReport, WatchError> {
    let client = http_client(&config.htb, &config.polling)?;

    let token = TokenAcquirer::new(client.clone(), &config.htb).acquire().await;
    let (auth, fallback_cookie) = select_auth(token, config.htb.cookie.clone());

    tracing::info!(
        exam = %config.htb.exam,
        exam_id = config.htb.exam.exam_id(),
        auth = auth.kind(),
        cookie_fallback = fallback_cookie.is_some(),
        "Watching exam attempt"
    );

    let mut source = StatusClient::new(client, &config.htb, &config.polling, auth)
        .with_cookie_fallback(fallback_cookie);

    let outcome = PollLoop::new(config.polling.clone())
        .run(&mut source)
        .await;

    let notification = Notification::for_outcome(config.htb.exam, &outcome);
    let delivery = Notifier::from_config(&config.mail).notify(notification).await;

    Ok(RunReport { outcome, delivery })
}

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;

use htb_common::config::PollSettings;
use htb_common::types::{FetchOutcome, PollOutcome};

use crate::fetcher::AttemptSource;

/// Poll loop that waits for an attempt to leave `In Review`.
///
/// States: polling until a terminal status (`Terminal`), an HTTP error
/// (`Aborted`), or `max_polls` non-terminal observations (`Timeout`).
/// Between non-terminal observations it sleeps a random duration: the review
/// range after `In Review`, the idle range after an empty or failed fetch.
pub struct PollLoop {
    settings: PollSettings,
}

impl PollLoop {
    pub fn new(settings: PollSettings) -> Self {
        Self { settings }
    }

    /// Run until a final state is reached. Blocks the task for the whole wait.
    pub async fn run<S>(&self, source: &mut S) -> PollOutcome
    where
        S: AttemptSource + ?Sized,
    {
        let max_polls = self.settings.max_polls.max(1);
        let mut polls: u32 = 0;
        let mut last_status: Option<String> = None;

        tracing::info!(max_polls, "Poll loop started");

        loop {
            let sleep_range = match source.fetch_attempt().await {
                FetchOutcome::HttpError { status, body } => {
                    tracing::error!(status, polls, "HTTP error from attempts endpoint, aborting");
                    return PollOutcome::Aborted { status, body };
                }
                FetchOutcome::Attempt(record) => {
                    if record.classify().is_terminal() {
                        tracing::info!(status = %record.status, polls, "Terminal status reached");
                        return PollOutcome::Terminal(record);
                    }
                    tracing::info!(status = %record.status, "Attempt still under review");
                    last_status = Some(record.status);
                    &self.settings.review_sleep_secs
                }
                FetchOutcome::Empty => {
                    tracing::info!("No attempt listed yet");
                    &self.settings.idle_sleep_secs
                }
                FetchOutcome::NetworkExhausted => {
                    tracing::warn!("No data after network retries");
                    &self.settings.idle_sleep_secs
                }
            };

            polls += 1;
            if polls >= max_polls {
                tracing::warn!(polls, last_status = ?last_status, "Poll budget exhausted");
                return PollOutcome::Timeout { polls, last_status };
            }

            let sleep_secs = random_secs(sleep_range);
            tracing::info!(
                poll = polls,
                max_polls,
                sleep_secs,
                "Waiting before next status check"
            );
            tokio::time::sleep(Duration::from_secs(sleep_secs)).await;
        }
    }
}

/// Uniform pick from an inclusive range; a degenerate range yields its start.
fn random_secs(range: &RangeInclusive<u64>) -> u64 {
    if range.start() >= range.end() {
        return *range.start();
    }
    rand::rng().random_range(range.clone())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use htb_common::types::AttemptRecord;
    use tokio::time::Instant;

    use super::*;

    /// Replays scripted outcomes, then repeats `rest` forever.
    struct ScriptedSource {
        script: VecDeque<FetchOutcome>,
        rest: FetchOutcome,
        calls: u32,
    }

    impl ScriptedSource {
        fn new(script: Vec<FetchOutcome>, rest: FetchOutcome) -> Self {
            Self {
                script: script.into(),
                rest,
                calls: 0,
            }
        }
    }

    #[async_trait]
    impl AttemptSource for ScriptedSource {
        async fn fetch_attempt(&mut self) -> FetchOutcome {
            self.calls += 1;
            self.script.pop_front().unwrap_or_else(|| self.rest.clone())
        }
    }

    fn attempt(status: &str) -> FetchOutcome {
        FetchOutcome::Attempt(
            serde_json::from_value::<AttemptRecord>(serde_json::json!({"status": status}))
                .unwrap(),
        )
    }

    fn settings(max_polls: u32) -> PollSettings {
        PollSettings {
            max_polls,
            review_sleep_secs: 300..=300,
            idle_sleep_secs: 60..=60,
            ..PollSettings::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_statuses_end_on_first_fetch() {
        for status in ["Certified", "Failed", "Voided", ""] {
            let mut source = ScriptedSource::new(vec![], attempt(status));
            let outcome = PollLoop::new(settings(40)).run(&mut source).await;

            match outcome {
                PollOutcome::Terminal(record) => assert_eq!(record.status, status),
                other => panic!("expected terminal for {:?}, got {:?}", status, other),
            }
            assert_eq!(source.calls, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_null_status_ends_on_first_fetch() {
        let record: AttemptRecord =
            serde_json::from_value(serde_json::json!({"id": 5, "status": null})).unwrap();
        let mut source = ScriptedSource::new(vec![], FetchOutcome::Attempt(record.clone()));

        let outcome = PollLoop::new(settings(40)).run(&mut source).await;

        assert_eq!(outcome, PollOutcome::Terminal(record));
        assert_eq!(source.calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_review_times_out_after_budget() {
        let start = Instant::now();
        let mut source = ScriptedSource::new(vec![], attempt("In Review"));
        let outcome = PollLoop::new(settings(40)).run(&mut source).await;

        assert_eq!(
            outcome,
            PollOutcome::Timeout {
                polls: 40,
                last_status: Some("In Review".to_string())
            }
        );
        assert_eq!(source.calls, 40);
        // No sleep after the final observation.
        assert_eq!(start.elapsed(), Duration::from_secs(39 * 300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_review_then_result() {
        let mut source = ScriptedSource::new(
            vec![attempt("In Review"), attempt("In Review")],
            attempt("Certified"),
        );
        let outcome = PollLoop::new(settings(40)).run(&mut source).await;

        assert!(matches!(outcome, PollOutcome::Terminal(ref r) if r.status == "Certified"));
        assert_eq!(source.calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_and_network_exhausted_keep_polling() {
        let start = Instant::now();
        let mut source = ScriptedSource::new(
            vec![FetchOutcome::Empty, FetchOutcome::NetworkExhausted],
            attempt("Failed"),
        );
        let outcome = PollLoop::new(settings(40)).run(&mut source).await;

        assert!(matches!(outcome, PollOutcome::Terminal(ref r) if r.status == "Failed"));
        assert_eq!(source.calls, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_data_counts_against_budget() {
        let mut source = ScriptedSource::new(vec![], FetchOutcome::Empty);
        let outcome = PollLoop::new(settings(5)).run(&mut source).await;

        assert_eq!(
            outcome,
            PollOutcome::Timeout {
                polls: 5,
                last_status: None
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_error_aborts_immediately() {
        let mut source = ScriptedSource::new(
            vec![
                attempt("In Review"),
                FetchOutcome::HttpError {
                    status: 503,
                    body: "maintenance".to_string(),
                },
            ],
            attempt("Certified"),
        );
        let outcome = PollLoop::new(settings(40)).run(&mut source).await;

        assert_eq!(
            outcome,
            PollOutcome::Aborted {
                status: 503,
                body: "maintenance".to_string()
            }
        );
        assert_eq!(source.calls, 2);
    }

    #[test]
    fn test_random_secs_stays_in_range() {
        for _ in 0..200 {
            let secs = random_secs(&(60..=180));
            assert!((60..=180).contains(&secs));
        }
        assert_eq!(random_secs(&(0..=0)), 0);
    }
}

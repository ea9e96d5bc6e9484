use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use crate::types::ExamCode;

pub const DEFAULT_LOGIN_URL: &str = "https://labs.hackthebox.com/api/v4/login";
pub const DEFAULT_ACADEMY_URL: &str = "https://academy.hackthebox.com";
pub const DEFAULT_MAILGUN_API_URL: &str = "https://api.mailgun.net/v3";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:143.0) Gecko/20100101 Firefox/143.0";

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub htb: HtbConfig,
    pub mail: MailConfig,
    pub polling: PollSettings,
}

/// Hack The Box account and endpoint settings.
#[derive(Clone)]
pub struct HtbConfig {
    pub email: Option<String>,
    pub password: Option<String>,
    /// Raw `Cookie` header value used when bearer auth is unavailable or rejected
    pub cookie: Option<String>,
    pub exam: ExamCode,
    pub login_url: String,
    /// Academy base URL, without trailing slash
    pub academy_url: String,
    pub user_agent: String,
}

impl std::fmt::Debug for HtbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtbConfig")
            .field("email", &self.email)
            .field("password", &redacted(&self.password))
            .field("cookie", &redacted(&self.cookie))
            .field("exam", &self.exam)
            .field("login_url", &self.login_url)
            .field("academy_url", &self.academy_url)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Mailgun delivery settings.
#[derive(Clone)]
pub struct MailConfig {
    pub api_key: Option<String>,
    pub domain: Option<String>,
    pub to: Option<String>,
    pub from: Option<String>,
    /// Mailgun API base (`https://api.eu.mailgun.net/v3` for EU domains)
    pub api_url: String,
}

impl MailConfig {
    /// Mail can be attempted once the key and sending domain are known.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.domain.is_some()
    }
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("api_key", &redacted(&self.api_key))
            .field("domain", &self.domain)
            .field("to", &self.to)
            .field("from", &self.from)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Retry ceilings and sleep ranges for the status fetcher and poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    /// Non-terminal observations allowed before giving up (default: 40)
    pub max_polls: u32,
    /// Sleep range in seconds after an `In Review` observation (default: 300..=600)
    pub review_sleep_secs: RangeInclusive<u64>,
    /// Sleep range in seconds after a fetch that returned no data (default: 60..=180)
    pub idle_sleep_secs: RangeInclusive<u64>,
    /// Network tries per logical fetch (default: 3)
    pub fetch_max_tries: u32,
    /// Fixed delay between network tries (default: 60s)
    pub fetch_retry_delay: Duration,
    /// Per-request HTTP timeout (default: 30s)
    pub http_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_polls: 40,
            review_sleep_secs: 300..=600,
            idle_sleep_secs: 60..=180,
            fetch_max_tries: 3,
            fetch_retry_delay: Duration::from_secs(60),
            http_timeout: Duration::from_secs(30),
        }
    }
}

/// Output format of the tracing subscriber, selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT` from the process environment.
    ///
    /// Called before the subscriber exists, so it cannot log.
    pub fn from_env() -> Self {
        std::env::var("LOG_FORMAT")
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

impl AppConfig {
    /// Load configuration from `.env` (if present) and the process environment.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Never fails: blank values count as unset, malformed values log a
    /// warning and keep their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let exam = match var("HTB_EXAM") {
            None => ExamCode::DEFAULT,
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(
                    error = %e,
                    fallback = %ExamCode::DEFAULT,
                    "Invalid HTB_EXAM, expected CBBH or CDSA"
                );
                ExamCode::DEFAULT
            }),
        };

        let htb = HtbConfig {
            email: var("HTB_EMAIL"),
            password: var("HTB_PASSWORD"),
            cookie: var("HTB_COOKIE"),
            exam,
            login_url: var("HTB_LOGIN_URL").unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string()),
            academy_url: var("HTB_ACADEMY_URL")
                .unwrap_or_else(|| DEFAULT_ACADEMY_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            user_agent: var("HTB_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        };

        let mail = MailConfig {
            api_key: var("MAILGUN_API_KEY"),
            domain: var("MAILGUN_DOMAIN"),
            to: var("MAILGUN_TO"),
            from: var("MAILGUN_FROM"),
            api_url: var("MAILGUN_API_URL")
                .unwrap_or_else(|| DEFAULT_MAILGUN_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        };

        let defaults = PollSettings::default();
        let polling = PollSettings {
            max_polls: at_least_one(
                "POLL_MAX_ATTEMPTS",
                parse_or(&var, "POLL_MAX_ATTEMPTS", defaults.max_polls),
                defaults.max_polls,
            ),
            review_sleep_secs: range_or(
                &var,
                ("POLL_REVIEW_SLEEP_MIN_SECS", "POLL_REVIEW_SLEEP_MAX_SECS"),
                defaults.review_sleep_secs,
            ),
            idle_sleep_secs: range_or(
                &var,
                ("POLL_IDLE_SLEEP_MIN_SECS", "POLL_IDLE_SLEEP_MAX_SECS"),
                defaults.idle_sleep_secs,
            ),
            fetch_max_tries: at_least_one(
                "FETCH_MAX_TRIES",
                parse_or(&var, "FETCH_MAX_TRIES", defaults.fetch_max_tries),
                defaults.fetch_max_tries,
            ),
            fetch_retry_delay: Duration::from_secs(parse_or(
                &var,
                "FETCH_RETRY_DELAY_SECS",
                defaults.fetch_retry_delay.as_secs(),
            )),
            http_timeout: Duration::from_secs(parse_or(
                &var,
                "HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )),
        };

        Self { htb, mail, polling }
    }

    /// Environment variables a complete run needs but that are unset.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.htb.email.is_none() {
            missing.push("HTB_EMAIL");
        }
        if self.htb.password.is_none() {
            missing.push("HTB_PASSWORD");
        }
        if self.mail.api_key.is_none() {
            missing.push("MAILGUN_API_KEY");
        }
        if self.mail.domain.is_none() {
            missing.push("MAILGUN_DOMAIN");
        }
        if self.mail.to.is_none() {
            missing.push("MAILGUN_TO");
        }
        if self.mail.from.is_none() {
            missing.push("MAILGUN_FROM");
        }
        missing
    }
}

fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "Invalid number, using default");
            default
        }),
    }
}

fn at_least_one(key: &str, value: u32, default: u32) -> u32 {
    if value == 0 {
        tracing::warn!(key, default, "Value must be at least 1, using default");
        default
    } else {
        value
    }
}

fn range_or<F>(var: &F, keys: (&str, &str), default: RangeInclusive<u64>) -> RangeInclusive<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let min = parse_or(var, keys.0, *default.start());
    let max = parse_or(var, keys.1, *default.end());
    if min > max {
        tracing::warn!(
            min_key = keys.0,
            max_key = keys.1,
            min,
            max,
            "Sleep range is inverted, swapping bounds"
        );
        max..=min
    } else {
        min..=max
    }
}

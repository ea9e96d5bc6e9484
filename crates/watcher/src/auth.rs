//! Token acquisition: exchanges HTB credentials for a bearer token.
//!
//! The token's payload is decoded without signature verification, purely to
//! log when it expires. Nothing here is fatal: every failure degrades to
//! "no token" and the caller falls back to cookie or anonymous auth.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Serialize;
use serde_json::{Map, Value};

use htb_common::config::HtbConfig;
use htb_common::error::WatchError;

/// JSON paths searched, in order, for the access token in a login response.
const TOKEN_PATHS: &[&[&str]] = &[
    &["message", "access_token"],
    &["data", "access_token"],
    &["access_token"],
    &["token"],
];

/// Request body for the login endpoint.
#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
    remember: bool,
}

/// Logs into HTB and hands back a bearer token, if one can be had.
pub struct TokenAcquirer {
    client: reqwest::Client,
    login_url: String,
    email: Option<String>,
    password: Option<String>,
}

impl TokenAcquirer {
    pub fn new(client: reqwest::Client, config: &HtbConfig) -> Self {
        Self {
            client,
            login_url: config.login_url.clone(),
            email: config.email.clone(),
            password: config.password.clone(),
        }
    }

    /// Obtain a bearer token. `None` means degraded auth, not an error.
    pub async fn acquire(&self) -> Option<String> {
        let (Some(email), Some(password)) = (&self.email, &self.password) else {
            tracing::info!("HTB_EMAIL or HTB_PASSWORD not set, skipping login");
            return None;
        };

        match self.login(email, password).await {
            Ok(token) => {
                log_expiry(&token);
                Some(token)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Login failed, continuing without bearer token");
                None
            }
        }
    }

    async fn login(&self, email: &str, password: &str) -> Result<String, WatchError> {
        let response = self
            .client
            .post(&self.login_url)
            .json(&LoginRequest {
                email,
                password,
                remember: true,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WatchError::status(status.as_u16(), &body));
        }

        let body = response.text().await?;
        let body: Value = serde_json::from_str(&body)
            .map_err(|e| WatchError::Decode(format!("login response: {}", e)))?;
        extract_token(&body).ok_or(WatchError::MissingToken)
    }
}

/// Find the access token in a login response body.
pub fn extract_token(body: &Value) -> Option<String> {
    TOKEN_PATHS.iter().find_map(|path| {
        path.iter()
            .try_fold(body, |node, key| node.get(key))
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    })
}

/// Decode a JWT payload without verifying it.
///
/// Malformed tokens yield an empty map.
pub fn decode_claims(token: &str) -> Map<String, Value> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    match decode::<Map<String, Value>>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => data.claims,
        Err(e) => {
            tracing::warn!(error = %e, "Could not decode token payload, expiry unknown");
            Map::new()
        }
    }
}

/// The `exp` claim as an instant, if present and sane.
pub fn token_expiry(claims: &Map<String, Value>) -> Option<DateTime<Utc>> {
    let exp = claims.get("exp")?;
    let secs = exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))?;
    Utc.timestamp_opt(secs, 0).single()
}

fn log_expiry(token: &str) {
    match token_expiry(&decode_claims(token)) {
        Some(expires_at) => tracing::info!(
            expires_at = %expires_at.to_rfc3339(),
            minutes_left = (expires_at - Utc::now()).num_minutes(),
            "Obtained bearer token"
        ),
        None => tracing::info!("Obtained bearer token (no expiry claim)"),
    }
}

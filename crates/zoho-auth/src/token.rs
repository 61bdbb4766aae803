//! Token endpoint client
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (one-time consent flow completion)
//! 2. Refresh token → access token exchange (every cache miss)
//!
//! Both POST form data to `{accounts}/oauth/v2/token`. The client only talks
//! to the network; persisting the result is the caller's job. Nothing here
//! retries: a rejected refresh usually means a revoked grant that needs a
//! human to re-authorize.

use std::time::Duration;

use common::Secret;
use serde::Deserialize;
use tracing::debug;

use crate::constants::{
    DEFAULT_ACCOUNTS_URL, DEFAULT_EXPIRES_IN_SECS, DEFAULT_SCOPE, REQUEST_TIMEOUT_SECS, TOKEN_PATH,
};
use crate::error::{Error, Result};
use crate::store::AccessTokenRecord;

/// OAuth client registration for the single Zoho account.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub accounts_url: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Only needed for the authorization code exchange
    pub redirect_uri: Option<String>,
    pub scope: String,
    pub timeout: Duration,
}

impl OAuthClientConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            accounts_url: DEFAULT_ACCOUNTS_URL.to_owned(),
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret.into()),
            redirect_uri: None,
            scope: DEFAULT_SCOPE.to_owned(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}{}", self.accounts_url.trim_end_matches('/'), TOKEN_PATH)
    }
}

/// Raw token endpoint response.
///
/// Zoho reports some failures as HTTP 200 with an `error` field, so every
/// field is optional and presence of `access_token` is checked explicitly.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

/// Result of the one-time authorization code exchange.
#[derive(Debug)]
pub struct CodeExchange {
    pub access: AccessTokenRecord,
    /// Only present when the consent screen granted offline access
    pub refresh_token: Option<Secret<String>>,
}

/// HTTP client for the accounts server token endpoint.
#[derive(Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    config: OAuthClientConfig,
}

impl TokenClient {
    /// Build a client with its own connection pool and the configured timeout.
    pub fn new(config: OAuthClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Network(format!("building HTTP client: {e}")))?;
        Self::with_http_client(config, http)
    }

    /// Build a client on top of an existing `reqwest::Client`.
    pub fn with_http_client(config: OAuthClientConfig, http: reqwest::Client) -> Result<Self> {
        if config.client_id.is_empty() {
            return Err(Error::NotConfigured("CLIENT_ID is not set".into()));
        }
        if config.client_secret.expose().is_empty() {
            return Err(Error::NotConfigured("CLIENT_SECRET is not set".into()));
        }
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// `expires_at` on the returned record is `now + expires_in - 60s`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AccessTokenRecord> {
        let response = self
            .post_form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose().as_str()),
                ("refresh_token", refresh_token),
            ])
            .await?;
        let (record, _) = into_record(response, common::unix_now_secs())?;
        Ok(record)
    }

    /// Exchange an authorization code from the consent redirect for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<CodeExchange> {
        let redirect_uri = self
            .config
            .redirect_uri
            .as_deref()
            .ok_or_else(|| Error::NotConfigured("REDIRECT_URI is not set".into()))?;

        let response = self
            .post_form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose().as_str()),
                ("redirect_uri", redirect_uri),
            ])
            .await?;
        let (access, refresh_token) = into_record(response, common::unix_now_secs())?;
        Ok(CodeExchange {
            access,
            refresh_token: refresh_token.map(Secret::new),
        })
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let url = self.config.token_url();
        let response = self
            .http
            .post(&url)
            .form(form)
            .send()
            .await
            .map_err(|e| network_error(&self.config, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| network_error(&self.config, e))?;
        debug!(%status, "token endpoint responded");

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|_| {
            Error::AuthServer(format!("token endpoint returned {status}: {body}"))
        })?;

        if !status.is_success() || parsed.access_token.is_none() {
            return Err(Error::AuthServer(format!(
                "token endpoint returned {status} without access_token: {body}"
            )));
        }
        Ok(parsed)
    }
}

fn into_record(
    response: TokenResponse,
    now: u64,
) -> Result<(AccessTokenRecord, Option<String>)> {
    let token = response
        .access_token
        .ok_or_else(|| Error::AuthServer("token response missing access_token".into()))?;
    let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    let refresh = response.refresh_token.filter(|t| !t.is_empty());
    Ok((AccessTokenRecord::from_lifetime(token, expires_in, now), refresh))
}

fn network_error(config: &OAuthClientConfig, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Network(format!(
            "token request timed out after {}s",
            config.timeout.as_secs_f64()
        ))
    } else {
        Error::Network(format!("token request failed: {e}"))
    }
}

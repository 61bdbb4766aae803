//! One-time authorization capture
//!
//! The consent flow runs once per deployment: the operator is redirected to
//! the accounts server, approves offline access, and the redirect carries an
//! authorization code back. Exchanging that code yields the long-lived
//! refresh token that every later refresh depends on.
//!
//! The `state` parameter is an opaque random value the gateway generates for
//! CSRF protection; the accounts server returns it unchanged in the redirect.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use tracing::info;

use crate::constants::AUTHORIZE_PATH;
use crate::error::{Error, Result};
use crate::store::{AccessTokenRecord, CredentialStore};
use crate::token::{OAuthClientConfig, TokenClient};

/// What the consent flow left behind, safe to show to the operator.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    /// Masked refresh token, `None` when the server did not issue a new one
    pub refresh_token_masked: Option<String>,
    pub access_expires_at: u64,
}

/// Generate a random `state` value (32 bytes, URL-safe base64).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the consent URL requesting offline access.
pub fn build_authorization_url(config: &OAuthClientConfig, state: &str) -> Result<String> {
    let redirect_uri = config
        .redirect_uri
        .as_deref()
        .ok_or_else(|| Error::NotConfigured("REDIRECT_URI is not set".into()))?;
    if config.client_id.is_empty() {
        return Err(Error::NotConfigured("CLIENT_ID is not set".into()));
    }

    let base = format!("{}{}", config.accounts_url.trim_end_matches('/'), AUTHORIZE_PATH);
    let mut url = reqwest::Url::parse(&base)
        .map_err(|e| Error::NotConfigured(format!("invalid accounts URL {base}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("scope", &config.scope)
        .append_pair("client_id", &config.client_id)
        .append_pair("response_type", "code")
        .append_pair("access_type", "offline")
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("prompt", "consent")
        .append_pair("state", state);
    Ok(url.to_string())
}

/// Exchange the code and persist what came back.
///
/// A response without a refresh token leaves the stored one unchanged.
pub(crate) async fn capture_authorization(
    client: &TokenClient,
    store: &dyn CredentialStore,
    code: &str,
) -> Result<(CaptureOutcome, AccessTokenRecord)> {
    let exchange = client.exchange_code(code).await?;

    let refresh_token_masked = match &exchange.refresh_token {
        Some(rt) => {
            store.save_refresh_token(rt.expose()).await?;
            info!("refresh token captured");
            Some(mask_token(rt.expose()))
        }
        None => {
            info!("authorization exchange returned no refresh token, keeping the stored one");
            None
        }
    };
    store.save_access_token(&exchange.access).await?;

    Ok((
        CaptureOutcome {
            refresh_token_masked,
            access_expires_at: exchange.access.expires_at,
        },
        exchange.access,
    ))
}

/// Show the first 8 and last 6 characters of tokens longer than 20 characters.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 20 {
        return token.to_owned();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCredentialStore;
    use crate::token::testing;
    use axum::http::StatusCode;
    use std::time::Duration;

    #[test]
    fn state_is_url_safe_and_unique() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(a, b);
    }

    #[test]
    fn authorization_url_contains_required_params() {
        let mut config = OAuthClientConfig::new("1000.CLIENT", "secret");
        config.redirect_uri = Some("https://pay.example.com/callback".into());
        let url = build_authorization_url(&config, "st4te").unwrap();

        assert!(url.starts_with("https://accounts.zoho.in/oauth/v2/auth?"));
        assert!(url.contains("scope=ZohoPay.payments.CREATE"));
        assert!(url.contains("client_id=1000.CLIENT"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("state=st4te"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fpay.example.com%2Fcallback"));
    }

    #[test]
    fn authorization_url_requires_redirect_uri() {
        let config = OAuthClientConfig::new("1000.CLIENT", "secret");
        assert!(matches!(
            build_authorization_url(&config, "s"),
            Err(Error::NotConfigured(_))
        ));
    }

    #[test]
    fn mask_keeps_short_values() {
        assert_eq!(mask_token("short"), "short");
        assert_eq!(
            mask_token("1000.abcdefghijklmnop.xyz987"),
            "1000.abc...xyz987"
        );
    }

    #[tokio::test]
    async fn exchange_without_refresh_token_keeps_stored_one() {
        let server = testing::start(Duration::ZERO, |_| {
            (
                StatusCode::OK,
                r#"{"access_token":"at_again","expires_in":3600}"#.into(),
            )
        })
        .await;
        let client = TokenClient::new(server.config()).unwrap();
        let store = MemoryCredentialStore::with_refresh_token("rt_existing");

        let (outcome, record) = capture_authorization(&client, &store, "code").await.unwrap();
        assert!(outcome.refresh_token_masked.is_none());
        assert_eq!(record.token, "at_again");
        assert_eq!(store.load_refresh_token().await.unwrap().expose(), "rt_existing");
        assert_eq!(store.load_access_token().await.unwrap().token, "at_again");
    }

    #[tokio::test]
    async fn rejected_code_stores_nothing() {
        let server = testing::start(Duration::ZERO, |_| {
            (StatusCode::OK, r#"{"error":"invalid_code"}"#.into())
        })
        .await;
        let client = TokenClient::new(server.config()).unwrap();
        let store = MemoryCredentialStore::new();

        let result = capture_authorization(&client, &store, "expired-code").await;
        assert!(matches!(result, Err(Error::AuthServer(_))));
        assert!(store.load_refresh_token().await.is_none());
        assert!(store.load_access_token().await.is_none());
    }
}

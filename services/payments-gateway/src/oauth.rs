//! One-time authorization routes
//!
//! - GET /oauth/start: redirect the operator to the Zoho consent screen
//! - GET /callback: exchange the returned code and persist the tokens
//!
//! Each start issues a random `state` that the callback must present. States
//! live in memory for ten minutes and are consumed on first use.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::response::{Html, Redirect};
use axum::routing::get;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};
use zoho_auth::CaptureOutcome;

use crate::AppState;
use crate::error::ApiError;

/// Maximum age of a pending `state` before it expires.
const STATE_EXPIRY: Duration = Duration::from_secs(600);

/// Outstanding `state` values from /oauth/start.
#[derive(Clone, Default)]
pub struct PendingStates(Arc<Mutex<HashMap<String, Instant>>>);

impl PendingStates {
    pub async fn insert(&self, state: String) {
        let mut states = self.0.lock().await;
        // Lazy cleanup: drop expired entries while holding the lock
        states.retain(|_, created_at| created_at.elapsed() < STATE_EXPIRY);
        states.insert(state, Instant::now());
    }

    /// Consume a state. Returns false when unknown, reused or expired.
    pub async fn take(&self, state: &str) -> bool {
        let mut states = self.0.lock().await;
        states
            .remove(state)
            .is_some_and(|created_at| created_at.elapsed() < STATE_EXPIRY)
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.0.lock().await.len()
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/oauth/start", get(start))
        .route("/callback", get(callback))
}

async fn start(State(state): State<AppState>) -> Result<Redirect, ApiError> {
    let oauth_state = zoho_auth::generate_state();
    let url = zoho_auth::build_authorization_url(state.tokens.client().config(), &oauth_state)?;
    state.pending_states.insert(oauth_state).await;
    info!("authorization flow started");
    Ok(Redirect::temporary(&url))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Html<String>, ApiError> {
    if let Some(error) = query.error {
        warn!(error = %error, "authorization was not granted");
        return Err(ApiError::BadRequest(format!(
            "authorization was not granted: {error}"
        )));
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing ?code".into()))?;

    let known = match query.state.as_deref() {
        Some(s) => state.pending_states.take(s).await,
        None => false,
    };
    if !known {
        return Err(ApiError::BadRequest(
            "unknown or expired state, restart at /oauth/start".into(),
        ));
    }

    let outcome = state.tokens.capture_authorization(&code).await?;
    info!(
        refresh_token_issued = outcome.refresh_token_masked.is_some(),
        "authorization captured"
    );
    Ok(Html(linked_page(&outcome)))
}

fn linked_page(outcome: &CaptureOutcome) -> String {
    let refresh = outcome
        .refresh_token_masked
        .as_deref()
        .unwrap_or("(unchanged, no new refresh token was issued)");
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>Zoho linked</title></head>\n\
         <body>\n<h2>Zoho linked</h2>\n<p>Refresh token: <code>{refresh}</code></p>\n\
         <p>Access token cached until unix time {expires}.</p>\n\
         <p>You can close this window.</p>\n</body></html>\n",
        expires = outcome.access_expires_at,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn states_are_single_use() {
        let states = PendingStates::default();
        states.insert("abc".into()).await;
        assert!(states.take("abc").await);
        assert!(!states.take("abc").await);
        assert!(!states.take("never-issued").await);
    }

    #[tokio::test(start_paused = true)]
    async fn states_expire_after_ten_minutes() {
        let states = PendingStates::default();
        states.insert("old".into()).await;
        tokio::time::advance(Duration::from_secs(601)).await;
        assert!(!states.take("old").await);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_states_are_pruned_on_insert() {
        let states = PendingStates::default();
        states.insert("first".into()).await;
        tokio::time::advance(Duration::from_secs(601)).await;
        states.insert("second".into()).await;
        assert_eq!(states.len().await, 1);
        assert!(states.take("second").await);
    }

    #[test]
    fn page_shows_masked_token_or_unchanged() {
        let page = linked_page(&CaptureOutcome {
            refresh_token_masked: Some("1000.abc...xyz123".into()),
            access_expires_at: 1_700_000_000,
        });
        assert!(page.contains("1000.abc...xyz123"));
        assert!(page.contains("1700000000"));

        let page = linked_page(&CaptureOutcome {
            refresh_token_masked: None,
            access_expires_at: 1,
        });
        assert!(page.contains("unchanged"));
    }
}

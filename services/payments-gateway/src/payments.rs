//! Payment-link routes and the authenticated payments API client
//!
//! Every outbound call carries `Authorization: Zoho-oauthtoken <token>` with
//! a token from the credential provider. The `account_id` query parameter is
//! appended to every request.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};
use zoho_auth::AccessTokenProvider;

use crate::AppState;
use crate::error::{ApiError, payment_api_error};

/// Client for the Zoho Payments REST API.
pub struct ZohoPaymentsClient {
    http: reqwest::Client,
    api_root: String,
    account_id: Option<String>,
    tokens: Arc<AccessTokenProvider>,
}

impl ZohoPaymentsClient {
    pub fn new(
        api_root: impl Into<String>,
        account_id: Option<String>,
        timeout: Duration,
        tokens: Arc<AccessTokenProvider>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::NotConfigured(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_root: api_root.into(),
            account_id,
            tokens,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let account_id = self
            .account_id
            .as_deref()
            .ok_or_else(|| ApiError::NotConfigured("ACCOUNT_ID is not set".into()))?;
        let mut url = Url::parse(&self.api_root)
            .map_err(|e| ApiError::NotConfigured(format!("invalid API root: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ApiError::NotConfigured("API root cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().append_pair("account_id", account_id);
        Ok(url)
    }

    /// Send an authenticated request and return the status with the decoded
    /// body. Bodies that are not JSON come back as a JSON string.
    #[instrument(skip(self, body))]
    pub async fn request(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Result<(StatusCode, Value), ApiError> {
        let url = self.url(segments)?;
        let token = self.tokens.access_token().await?;

        let mut request = self
            .http
            .request(method, url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Zoho-oauthtoken {token}"),
            );
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(payment_api_error)?;
        let status = response.status();
        let text = response.text().await.map_err(payment_api_error)?;
        let json = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok((status, json))
    }

    /// Like `request`, but turns non-2xx answers into a passthrough error.
    async fn request_ok(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let (status, json) = self.request(method, segments, body).await?;
        if !status.is_success() {
            return Err(ApiError::Upstream { status, body: json });
        }
        Ok(json)
    }

    pub async fn create_payment_link(&self, payload: &Value) -> Result<Value, ApiError> {
        self.request_ok(Method::POST, &["paymentlinks"], Some(payload))
            .await
    }

    pub async fn get_payment_link(&self, payment_link_id: &str) -> Result<Value, ApiError> {
        self.request_ok(Method::GET, &["paymentlinks", payment_link_id], None)
            .await
    }

    pub async fn update_payment_link(
        &self,
        payment_link_id: &str,
        payload: &Value,
    ) -> Result<Value, ApiError> {
        self.request_ok(
            Method::PUT,
            &["paymentlinks", payment_link_id],
            Some(payload),
        )
        .await
    }
}

/// Subscription plans sold through payment links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Newbie,
    Investor,
    Trader,
}

impl Plan {
    /// One-year price in rupees.
    pub fn amount(self) -> u32 {
        match self {
            Plan::Newbie => 499,
            Plan::Investor => 999,
            Plan::Trader => 1999,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Newbie => "newbie",
            Plan::Investor => "investor",
            Plan::Trader => "trader",
        }
    }

    pub fn description(self) -> String {
        let name = match self {
            Plan::Newbie => "Newbie",
            Plan::Investor => "Investor",
            Plan::Trader => "Trader",
        };
        format!("{name} \u{2013} 1 Year")
    }
}

fn default_currency() -> String {
    "INR".to_owned()
}

fn default_return_url() -> String {
    "https://your-domain.com/pay/thank-you".to_owned()
}

#[derive(Debug, Deserialize)]
pub struct PlanLinkRequest {
    pub plan: Plan,
    pub email: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_return_url")]
    pub return_url: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub payment_link_id: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments/plan-link", post(create_plan_link))
        .route("/payments/verify", post(verify))
        .route("/payments/verify-simple", get(verify_simple))
}

/// Zoho wraps some responses in `payment_links`; fall back to the root.
fn payment_link_object(data: &Value) -> &Value {
    match data.get("payment_links") {
        Some(inner) if inner.is_object() => inner,
        _ => data,
    }
}

fn field_as_string(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Set (or replace) one query parameter on a URL.
fn with_query_param(url: &Url, key: &str, value: &str) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut updated = url.clone();
    {
        let mut pairs = updated.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(key, value);
    }
    updated
}

/// POST /payments/plan-link
///
/// Creates a one-year payment link for the plan, then rewrites its return URL
/// to carry `payment_link_id` so the thank-you page can verify the payment.
/// A failed rewrite is reported as a `warning` rather than an error.
async fn create_plan_link(
    State(state): State<AppState>,
    Json(request): Json<PlanLinkRequest>,
) -> Result<Json<Value>, ApiError> {
    if !is_plausible_email(&request.email) {
        return Err(ApiError::BadRequest(format!(
            "invalid email address: {}",
            request.email
        )));
    }
    let return_url = Url::parse(&request.return_url)
        .map_err(|e| ApiError::BadRequest(format!("invalid return_url: {e}")))?;

    let plan = request.plan;
    let payload = json!({
        "amount": plan.amount(),
        "currency": request.currency,
        "email": request.email,
        "description": plan.description(),
        "return_url": return_url.as_str(),
        "reference_id": format!("{}-1y-{}", plan.as_str(), common::unix_now_secs()),
    });

    let data = state.payments.create_payment_link(&payload).await?;
    let link = payment_link_object(&data);
    let Some(payment_link_id) = field_as_string(link, "payment_link_id") else {
        return Err(ApiError::PaymentApi(format!(
            "no payment_link_id in response: {data}"
        )));
    };

    let new_return_url = with_query_param(&return_url, "payment_link_id", &payment_link_id);
    let warning = match state
        .payments
        .update_payment_link(
            &payment_link_id,
            &json!({ "return_url": new_return_url.as_str() }),
        )
        .await
    {
        Ok(_) => None,
        Err(e) => {
            warn!(payment_link_id = %payment_link_id, error = %e, "failed to update payment link return_url");
            Some(json!({ "message": "return_url not updated" }))
        }
    };

    info!(
        plan = plan.as_str(),
        payment_link_id = %payment_link_id,
        "payment link created"
    );

    let mut body = json!({
        "plan": plan,
        "amount": plan.amount(),
        "payment_link_id": payment_link_id,
        "status": link.get("status").cloned().unwrap_or(Value::Null),
        "url": link.get("url").cloned().unwrap_or(Value::Null),
    });
    if let Some(warning) = warning {
        body["warning"] = warning;
    }
    Ok(Json(body))
}

/// POST /payments/verify
async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.payment_link_id.trim().is_empty() {
        return Err(ApiError::BadRequest("payment_link_id is required".into()));
    }
    let payment_link_id = request.payment_link_id.trim();
    let data = state.payments.get_payment_link(payment_link_id).await?;
    let link = payment_link_object(&data);

    let status = link
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();
    Ok(Json(json!({
        "payment_link_id": payment_link_id,
        "paid": status == "paid",
        "status": status,
        "amount": link.get("amount").cloned().unwrap_or(Value::Null),
        "currency": link.get("currency").cloned().unwrap_or(Value::Null),
        "email": link.get("email").cloned().unwrap_or(Value::Null),
        "reference_id": link.get("reference_id").cloned().unwrap_or(Value::Null),
    })))
}

#[derive(Debug, Deserialize)]
struct VerifySimpleQuery {
    payment_link_id: Option<String>,
}

/// GET /payments/verify-simple?payment_link_id=...
async fn verify_simple(
    State(state): State<AppState>,
    Query(query): Query<VerifySimpleQuery>,
) -> Result<Json<Value>, ApiError> {
    let payment_link_id = query
        .payment_link_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("payment_link_id is required".into()))?;
    let data = state.payments.get_payment_link(payment_link_id.trim()).await?;
    let link = payment_link_object(&data);

    let status = link
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();
    Ok(Json(json!({
        "payment_link_id": payment_link_id,
        "status": status,
        "paid": status == "paid",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_have_fixed_prices() {
        assert_eq!(Plan::Newbie.amount(), 499);
        assert_eq!(Plan::Investor.amount(), 999);
        assert_eq!(Plan::Trader.amount(), 1999);
        assert_eq!(Plan::Investor.description(), "Investor \u{2013} 1 Year");
    }

    #[test]
    fn unknown_plan_rejected() {
        let result: Result<PlanLinkRequest, _> =
            serde_json::from_value(json!({"plan": "whale", "email": "a@b.co"}));
        assert!(result.is_err());
    }

    #[test]
    fn plan_request_defaults() {
        let request: PlanLinkRequest =
            serde_json::from_value(json!({"plan": "trader", "email": "a@b.co"})).unwrap();
        assert_eq!(request.plan, Plan::Trader);
        assert_eq!(request.currency, "INR");
        assert_eq!(request.return_url, "https://your-domain.com/pay/thank-you");
    }

    #[test]
    fn nested_payment_links_object_is_preferred() {
        let nested = json!({"code": 0, "payment_links": {"payment_link_id": "42", "status": "active"}});
        assert_eq!(payment_link_object(&nested)["payment_link_id"], "42");

        let flat = json!({"payment_link_id": "43"});
        assert_eq!(payment_link_object(&flat)["payment_link_id"], "43");
    }

    #[test]
    fn numeric_ids_are_stringified() {
        let link = json!({"payment_link_id": 5000000012345u64});
        assert_eq!(
            field_as_string(&link, "payment_link_id").as_deref(),
            Some("5000000012345")
        );
        assert_eq!(field_as_string(&json!({"payment_link_id": ""}), "payment_link_id"), None);
    }

    #[test]
    fn query_param_is_added_or_replaced() {
        let url = Url::parse("https://shop.example.com/thanks?src=ad").unwrap();
        let updated = with_query_param(&url, "payment_link_id", "99");
        assert_eq!(
            updated.as_str(),
            "https://shop.example.com/thanks?src=ad&payment_link_id=99"
        );

        let again = with_query_param(&updated, "payment_link_id", "100");
        assert_eq!(
            again.as_str(),
            "https://shop.example.com/thanks?src=ad&payment_link_id=100"
        );
    }

    #[test]
    fn email_check() {
        assert!(is_plausible_email("buyer@example.com"));
        assert!(!is_plausible_email("buyer"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("buyer@localhost"));
    }
}

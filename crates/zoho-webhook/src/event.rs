//! Typed summary of a verified webhook payload
//!
//! Zoho has shipped a few envelope shapes: the event name under `event` or
//! `event_type`, the link under `data` or at the root, named `payment_link`
//! or `payment_links`, identified by `payment_link_id` or `id`. Each variant
//! is an optional field here; the summary takes the first one present.
//! Empty objects, empty strings and nulls count as absent.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    event: Option<String>,
    event_type: Option<String>,
    data: Option<Value>,
    #[serde(flatten)]
    root: LinkContainer,
}

#[derive(Debug, Default, Deserialize)]
struct LinkContainer {
    payment_link: Option<Value>,
    payment_links: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentLink {
    payment_link_id: Option<Value>,
    id: Option<Value>,
    status: Option<String>,
}

/// Event name, link id and link status pulled from a webhook payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSummary {
    /// Lower-cased event name, empty when absent
    pub event: String,
    pub payment_link_id: Option<String>,
    /// Lower-cased link status, empty when absent
    pub status: String,
}

impl WebhookSummary {
    /// Parse a verified body. Only call this after the signature check.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let envelope: Envelope =
            serde_json::from_slice(body).map_err(|e| Error::Payload(e.to_string()))?;

        let event = non_empty(envelope.event)
            .or_else(|| non_empty(envelope.event_type))
            .unwrap_or_default()
            .to_lowercase();

        let container = match present(envelope.data) {
            Some(data) => decode::<LinkContainer>(data)?,
            None => envelope.root,
        };
        let link = present(container.payment_link).or_else(|| present(container.payment_links));
        let link = match link {
            Some(link) => decode::<PaymentLink>(link)?,
            None => PaymentLink::default(),
        };

        let payment_link_id = id_string(link.payment_link_id).or_else(|| id_string(link.id));
        let status = link.status.unwrap_or_default().to_lowercase();

        Ok(Self {
            event,
            payment_link_id,
            status,
        })
    }
}

/// Drop values that carry nothing: null, `false`, zero, `""`, `[]`, `{}`.
fn present(value: Option<Value>) -> Option<Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    })
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Payload(e.to_string()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Ids arrive as strings, occasionally as bare numbers.
fn id_string(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

//! Webhook signature verification
//!
//! Zoho signs each callback with HMAC-SHA256 over `"{t}.{raw_body}"` and sends
//! `X-Zoho-Webhook-Signature: t=<unix millis>,v=<hex digest>`. The body must be
//! the exact bytes received; re-serializing parsed JSON changes the bytes and
//! breaks the signature.
//!
//! Verification fails closed: a missing signing key rejects everything. The
//! bypass used for local testing only exists in debug builds.

use std::time::Duration;

use common::Secret;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

/// Header carrying the signature (lower-case, as axum normalizes names)
pub const SIGNATURE_HEADER: &str = "x-zoho-webhook-signature";

/// Maximum distance between the signed timestamp and the local clock
pub const DEFAULT_MAX_SKEW: Duration = Duration::from_secs(300);

/// Parsed `t=<ms>,v=<hex>` signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp in milliseconds when the payload was signed
    pub timestamp: i64,
    /// Lower-cased hex HMAC
    pub signature_hex: String,
    /// `t` exactly as sent; it is part of the signed message
    raw_timestamp: String,
}

impl SignatureHeader {
    /// Parse comma-separated `key=value` pairs.
    ///
    /// Pairs without `=` and unknown keys are ignored; a repeated key keeps
    /// its last value.
    pub fn parse(header: &str) -> Result<Self> {
        let mut t: Option<&str> = None;
        let mut v: Option<&str> = None;

        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => t = Some(value.trim()),
                "v" => v = Some(value.trim()),
                _ => {}
            }
        }

        let raw_timestamp = t
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::MalformedHeader("missing t".into()))?;
        let signature = v
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::MalformedHeader("missing v".into()))?;
        let timestamp = raw_timestamp
            .parse::<i64>()
            .map_err(|_| Error::MalformedHeader(format!("non-numeric t: {raw_timestamp}")))?;

        Ok(Self {
            timestamp,
            signature_hex: signature.to_ascii_lowercase(),
            raw_timestamp: raw_timestamp.to_owned(),
        })
    }
}

enum Mode {
    Enforce(Secret<String>),
    NotConfigured,
    #[cfg(debug_assertions)]
    Disabled,
}

/// Checks inbound webhook signatures against the shared signing key.
pub struct WebhookVerifier {
    mode: Mode,
    max_skew_ms: i64,
}

impl WebhookVerifier {
    /// Verifier for the given key. `None` or an empty key rejects every request.
    pub fn new(signing_key: Option<Secret<String>>) -> Self {
        let mode = match signing_key {
            Some(key) if !key.expose().is_empty() => Mode::Enforce(key),
            _ => Mode::NotConfigured,
        };
        Self {
            mode,
            max_skew_ms: DEFAULT_MAX_SKEW.as_millis() as i64,
        }
    }

    /// Accept every request without checking. Not compiled into release builds.
    #[cfg(debug_assertions)]
    pub fn insecure_disabled() -> Self {
        tracing::warn!("webhook signature verification DISABLED (debug build only)");
        Self {
            mode: Mode::Disabled,
            max_skew_ms: DEFAULT_MAX_SKEW.as_millis() as i64,
        }
    }

    pub fn with_max_skew(mut self, max_skew: Duration) -> Self {
        self.max_skew_ms = max_skew.as_millis() as i64;
        self
    }

    /// `enforced`, `not_configured` or `disabled`.
    pub fn mode_label(&self) -> &'static str {
        match self.mode {
            Mode::Enforce(_) => "enforced",
            Mode::NotConfigured => "not_configured",
            #[cfg(debug_assertions)]
            Mode::Disabled => "disabled",
        }
    }

    /// Verify against the current wall clock.
    pub fn verify(&self, header: Option<&str>, body: &[u8]) -> Result<()> {
        self.verify_at(header, body, common::unix_now_millis())
    }

    /// Verify as of `now_ms` (unix milliseconds).
    pub fn verify_at(&self, header: Option<&str>, body: &[u8], now_ms: i64) -> Result<()> {
        let key = match &self.mode {
            Mode::Enforce(key) => key,
            Mode::NotConfigured => return Err(Error::NotConfigured),
            #[cfg(debug_assertions)]
            Mode::Disabled => return Ok(()),
        };

        let header = SignatureHeader::parse(header.unwrap_or_default())?;
        let expected = compute_signature(key.expose().as_bytes(), &header.raw_timestamp, body);

        let skew_ms = now_ms.saturating_sub(header.timestamp);
        if skew_ms.saturating_abs() > self.max_skew_ms {
            return Err(Error::StaleTimestamp { skew_ms });
        }

        if !constant_time_eq(expected.as_bytes(), header.signature_hex.as_bytes()) {
            return Err(Error::Mismatch);
        }
        Ok(())
    }

    pub fn is_valid(&self, header: Option<&str>, body: &[u8]) -> bool {
        self.verify(header, body).is_ok()
    }
}

/// Lower-case hex HMAC-SHA256 of `"{timestamp}.{body}"`.
pub fn compute_signature(key: &[u8], timestamp: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "secret";
    const BODY: &[u8] = br#"{"event":"paid"}"#;

    fn verifier(key: &str) -> WebhookVerifier {
        WebhookVerifier::new(Some(Secret::new(key.to_owned())))
    }

    fn signed_header(key: &str, t: i64, body: &[u8]) -> String {
        format!("t={t},v={}", compute_signature(key.as_bytes(), &t.to_string(), body))
    }

    fn flip_last(header: &str) -> String {
        let mut chars: Vec<char> = header.chars().collect();
        let last = chars.last_mut().unwrap();
        *last = if *last == '0' { '1' } else { '0' };
        chars.into_iter().collect()
    }

    #[test]
    fn parse_reads_t_and_v() {
        let header = SignatureHeader::parse("t=1734340423138,v=ABCdef").unwrap();
        assert_eq!(header.timestamp, 1_734_340_423_138);
        assert_eq!(header.signature_hex, "abcdef");
    }

    #[test]
    fn parse_ignores_unknown_and_bare_parts() {
        let header = SignatureHeader::parse("scheme=v1, t=5 ,junk,v=aa").unwrap();
        assert_eq!(header.timestamp, 5);
        assert_eq!(header.signature_hex, "aa");
    }

    #[test]
    fn malformed_headers_are_rejected() {
        for raw in ["", "v=abc", "t=123", "t=abc,v=def", "t=,v=abc", "t=1,v=", "garbage", ",,,"] {
            let result = SignatureHeader::parse(raw);
            assert!(
                matches!(result, Err(Error::MalformedHeader(_))),
                "{raw:?} should be malformed, got {result:?}"
            );
        }
    }

    #[test]
    fn signed_scenario_verifies_and_flipped_char_fails() {
        let now = common::unix_now_millis();
        let header = signed_header(KEY, now, BODY);
        let v = verifier(KEY);

        assert_eq!(v.verify(Some(&header), BODY), Ok(()));
        assert_eq!(v.verify(Some(&flip_last(&header)), BODY), Err(Error::Mismatch));
    }

    #[test]
    fn valid_signatures_verify_for_many_keys_and_bodies() {
        let now = 1_734_340_423_138;
        let keys = ["secret", "k", "a much longer signing key with spaces", "ключ"];
        let bodies: [&[u8]; 4] = [b"", b"{}", br#"{"event":"payment_link.paid","data":{}}"#, &[0xff, 0x00, 0x7f]];

        for key in keys {
            for body in bodies {
                let header = signed_header(key, now - 1_000, body);
                assert!(
                    verifier(key).verify_at(Some(&header), body, now).is_ok(),
                    "key {key:?} body {body:?}"
                );
            }
        }
    }

    #[test]
    fn replay_window_is_five_minutes_both_ways() {
        let now = 1_734_340_423_138;
        let v = verifier(KEY);

        for shift in [300_000, -300_000, 0, 1] {
            let header = signed_header(KEY, now + shift, BODY);
            assert!(v.verify_at(Some(&header), BODY, now).is_ok(), "shift {shift}");
        }
        for shift in [300_001, -300_001, 3_600_000] {
            let header = signed_header(KEY, now + shift, BODY);
            assert!(
                matches!(
                    v.verify_at(Some(&header), BODY, now),
                    Err(Error::StaleTimestamp { .. })
                ),
                "shift {shift}"
            );
        }
    }

    #[test]
    fn custom_skew_bound_applies() {
        let now = 10_000_000;
        let v = verifier(KEY).with_max_skew(Duration::from_secs(10));
        let header = signed_header(KEY, now - 10_001, BODY);
        assert!(matches!(
            v.verify_at(Some(&header), BODY, now),
            Err(Error::StaleTimestamp { skew_ms: 10_001 })
        ));
    }

    #[test]
    fn wrong_key_is_mismatch() {
        let now = common::unix_now_millis();
        let header = signed_header("other-key", now, BODY);
        assert_eq!(verifier(KEY).verify(Some(&header), BODY), Err(Error::Mismatch));
    }

    #[test]
    fn reserialized_body_is_mismatch() {
        let now = common::unix_now_millis();
        let header = signed_header(KEY, now, BODY);
        let reserialized = br#"{"event": "paid"}"#;
        assert_eq!(
            verifier(KEY).verify(Some(&header), reserialized),
            Err(Error::Mismatch)
        );
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let now = common::unix_now_millis();
        let sig = compute_signature(KEY.as_bytes(), &now.to_string(), BODY).to_uppercase();
        let header = format!("t={now},v={sig}");
        assert!(verifier(KEY).is_valid(Some(&header), BODY));
    }

    #[test]
    fn truncated_signature_is_mismatch() {
        let now = common::unix_now_millis();
        let header = signed_header(KEY, now, BODY);
        let truncated = &header[..header.len() - 2];
        assert_eq!(verifier(KEY).verify(Some(truncated), BODY), Err(Error::Mismatch));
    }

    #[test]
    fn missing_key_rejects_even_valid_signatures() {
        let now = common::unix_now_millis();
        let header = signed_header(KEY, now, BODY);

        let none = WebhookVerifier::new(None);
        assert_eq!(none.verify(Some(&header), BODY), Err(Error::NotConfigured));
        assert_eq!(none.mode_label(), "not_configured");

        let empty = WebhookVerifier::new(Some(Secret::new(String::new())));
        assert_eq!(empty.verify(Some(&header), BODY), Err(Error::NotConfigured));
    }

    #[test]
    fn missing_header_is_malformed() {
        assert!(matches!(
            verifier(KEY).verify(None, BODY),
            Err(Error::MalformedHeader(_))
        ));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn disabled_verifier_accepts_anything() {
        let v = WebhookVerifier::insecure_disabled();
        assert_eq!(v.mode_label(), "disabled");
        assert!(v.is_valid(None, b"not even json"));
    }

    #[test]
    fn signature_is_lowercase_hex_sha256() {
        let sig = compute_signature(b"secret", "1", b"{}");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}

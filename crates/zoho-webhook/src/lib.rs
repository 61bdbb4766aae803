//! Zoho Payments webhook authentication
//!
//! Verifies the `X-Zoho-Webhook-Signature` header on inbound callbacks and
//! extracts a small typed summary from verified payloads. Verification is
//! stateless and needs no locking.

pub mod error;
pub mod event;
pub mod signature;

pub use error::{Error, Result};
pub use event::WebhookSummary;
pub use signature::{
    DEFAULT_MAX_SKEW, SIGNATURE_HEADER, SignatureHeader, WebhookVerifier, compute_signature,
};

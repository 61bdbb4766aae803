//! Zoho OAuth credential lifecycle
//!
//! Owns the single account's refresh token and access-token cache, and the
//! exchange that turns one into the other. This crate has no dependency on
//! the gateway binary; it can be tested and used independently.
//!
//! Credential flow:
//! 1. Operator is redirected via `capture::build_authorization_url()`
//! 2. Gateway calls `AccessTokenProvider::capture_authorization()` with the code
//! 3. Refresh token + first access token land in the `CredentialStore`
//! 4. Outbound calls use `AccessTokenProvider::access_token()`, which refreshes
//!    through `TokenClient::refresh()` when the cache has expired

pub mod capture;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod provider;
pub mod store;
pub mod token;

pub use capture::{CaptureOutcome, build_authorization_url, generate_state, mask_token};
pub use constants::*;
pub use credentials::FileCredentialStore;
pub use error::{Error, Result};
pub use provider::{AccessTokenProvider, AccessTokenState, CredentialStatus};
pub use store::{AccessTokenRecord, CredentialStore, MemoryCredentialStore};
pub use token::{CodeExchange, OAuthClientConfig, TokenClient};

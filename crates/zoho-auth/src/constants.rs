//! Zoho OAuth constants
//!
//! Endpoint paths are relative to the accounts server configured for the
//! data center (`https://accounts.zoho.in`, `.com`, `.eu`, ...).

/// Default accounts server (India data center)
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.zoho.in";

/// Token endpoint path for code exchange and token refresh
pub const TOKEN_PATH: &str = "/oauth/v2/token";

/// Authorization endpoint path for the one-time consent redirect
pub const AUTHORIZE_PATH: &str = "/oauth/v2/auth";

/// Scope requested when none is configured
pub const DEFAULT_SCOPE: &str = "ZohoPay.payments.CREATE";

/// Subtracted from the server-declared lifetime so a token never expires
/// mid-request.
pub const EXPIRY_MARGIN_SECS: u64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Bound on every call to the accounts server
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

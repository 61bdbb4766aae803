//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The file is
//! optional; every section has defaults so a deployment can be configured
//! from the environment alone. `CLIENT_SECRET` and `ZOHO_WEBHOOK_SIGNING_KEY`
//! are env-only and never read from TOML to avoid leaking secrets.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use serde::Deserialize;
use zoho_auth::{FileCredentialStore, OAuthClientConfig};
use zoho_webhook::WebhookVerifier;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub zoho: ZohoConfig,
    pub credentials: CredentialsConfig,
    pub webhook: WebhookConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_connections: 1000,
        }
    }
}

/// Zoho accounts server and payments API settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ZohoConfig {
    pub accounts_url: String,
    pub api_root: String,
    pub account_id: Option<String>,
    pub client_id: Option<String>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    pub redirect_uri: Option<String>,
    pub scope: String,
    pub timeout_secs: u64,
}

impl Default for ZohoConfig {
    fn default() -> Self {
        Self {
            accounts_url: zoho_auth::DEFAULT_ACCOUNTS_URL.to_owned(),
            api_root: "https://payments.zoho.in/api/v1".to_owned(),
            account_id: None,
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            scope: zoho_auth::DEFAULT_SCOPE.to_owned(),
            timeout_secs: zoho_auth::REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Where the refresh token and access-token cache live
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub dir: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }
}

/// Inbound webhook settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    #[serde(skip)]
    pub signing_key: Option<Secret<String>>,
    pub max_skew_secs: u64,
    /// Set from `DISABLE_WEBHOOK_SIG`; rejected in release builds
    #[serde(skip)]
    pub disable_signature_check: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            signing_key: None,
            max_skew_secs: zoho_webhook::DEFAULT_MAX_SKEW.as_secs(),
            disable_signature_check: false,
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then overlay process environment.
    pub fn load(path: Option<&Path>) -> common::Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load with an explicit environment lookup.
    pub fn load_with(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> common::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)?
            }
            None => Config::default(),
        };
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables. Empty values count as unset.
    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> common::Result<()> {
        let var = |key: &str| env(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        if let Some(v) = var("CLIENT_ID") {
            self.zoho.client_id = Some(v);
        }
        if let Some(v) = var("CLIENT_SECRET") {
            self.zoho.client_secret = Some(Secret::new(v));
        }
        if let Some(v) = var("ZOHO_ACCOUNTS") {
            self.zoho.accounts_url = v;
        }
        if let Some(v) = var("API_ROOT") {
            self.zoho.api_root = v;
        }
        if let Some(v) = var("ACCOUNT_ID") {
            self.zoho.account_id = Some(v);
        }
        if let Some(v) = var("REDIRECT_URI") {
            self.zoho.redirect_uri = Some(v);
        }
        if let Some(v) = var("SCOPE") {
            self.zoho.scope = v;
        }
        if let Some(v) = var("ZOHO_WEBHOOK_SIGNING_KEY") {
            self.webhook.signing_key = Some(Secret::new(v));
        }
        if let Some(v) = var("DISABLE_WEBHOOK_SIG") {
            self.webhook.disable_signature_check = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = var("CREDENTIALS_DIR") {
            self.credentials.dir = PathBuf::from(v);
        }
        if let Some(v) = var("LISTEN_ADDR") {
            self.server.listen_addr = v.parse().map_err(|e| {
                common::Error::Config(format!("LISTEN_ADDR is not a socket address ({v}): {e}"))
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        for (name, url) in [
            ("accounts_url", &self.zoho.accounts_url),
            ("api_root", &self.zoho.api_root),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.zoho.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.webhook.max_skew_secs == 0 {
            return Err(common::Error::Config(
                "max_skew_secs must be greater than 0".into(),
            ));
        }

        if self.webhook.disable_signature_check && !cfg!(debug_assertions) {
            return Err(common::Error::Config(
                "DISABLE_WEBHOOK_SIG is not available in release builds".into(),
            ));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var, falling
    /// back to `payments-gateway.toml` when it exists.
    pub fn resolve_path(cli_path: Option<&str>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(PathBuf::from(p));
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return Some(PathBuf::from(p));
        }
        let default = PathBuf::from("payments-gateway.toml");
        default.exists().then_some(default)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.zoho.timeout_secs)
    }

    /// OAuth client registration. Missing id/secret surface as
    /// `NotConfigured` when the token client is built.
    pub fn oauth_client(&self) -> OAuthClientConfig {
        OAuthClientConfig {
            accounts_url: self.zoho.accounts_url.clone(),
            client_id: self.zoho.client_id.clone().unwrap_or_default(),
            client_secret: self
                .zoho
                .client_secret
                .clone()
                .unwrap_or_else(|| Secret::new(String::new())),
            redirect_uri: self.zoho.redirect_uri.clone(),
            scope: self.zoho.scope.clone(),
            timeout: self.timeout(),
        }
    }

    pub fn credential_store(&self) -> FileCredentialStore {
        FileCredentialStore::in_dir(&self.credentials.dir)
    }

    pub fn webhook_verifier(&self) -> WebhookVerifier {
        #[cfg(debug_assertions)]
        if self.webhook.disable_signature_check {
            return WebhookVerifier::insecure_disabled();
        }
        WebhookVerifier::new(self.webhook.signing_key.clone())
            .with_max_skew(Duration::from_secs(self.webhook.max_skew_secs))
    }
}

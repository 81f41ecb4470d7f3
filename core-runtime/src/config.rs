//! # Client Configuration
//!
//! Builder-validated settings and bridge handles for the authenticated survey
//! client.
//!
//! ## Required settings
//!
//! - `client_id` / `client_secret` - OAuth client credentials of the app
//!
//! ## Bridges
//!
//! - `HttpClient` - transport for the wire layer
//! - `SecureStore` - persistence for the session credential
//! - `Clock` - time source (defaults to the system clock)
//!
//! With the `desktop-shims` feature, missing `HttpClient` and `SecureStore`
//! bridges default to the `bridge-desktop` adapters. Without it they must be
//! injected and `build()` fails fast when they are not.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{ClientConfig, RefreshPolicy};
//! use std::sync::Arc;
//!
//! let config = ClientConfig::builder()
//!     .client_id("my-client-id")
//!     .client_secret("my-client-secret")
//!     .refresh_policy(RefreshPolicy::proactive())
//!     .http_client(Arc::new(MyHttpClient))
//!     .secure_store(Arc::new(MySecureStore))
//!     .build()?;
//! ```
//!
//! Settings can also be seeded from the environment with
//! [`ClientConfig::builder_from_env`]:
//!
//! | variable | setting |
//! |---|---|
//! | `SURVEY_API_BASE_URL` | `base_url` |
//! | `SURVEY_CLIENT_ID` | `client_id` |
//! | `SURVEY_CLIENT_SECRET` | `client_secret` |

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, SecureStore, SystemClock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Survey API root used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://survey-api.nimblehq.co/api/v1";

/// Secure store key holding the session credential.
pub const DEFAULT_CREDENTIAL_KEY: &str = "nimble_survey.credential";

/// Keychain service name used by the desktop secure store.
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "nimble-survey";

/// Per-request deadline handed to the transport.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Leeway used by [`RefreshPolicy::proactive`].
pub const DEFAULT_REFRESH_LEEWAY: Duration = Duration::from_secs(60);

pub const ENV_BASE_URL: &str = "SURVEY_API_BASE_URL";
pub const ENV_CLIENT_ID: &str = "SURVEY_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "SURVEY_CLIENT_SECRET";

/// When the client refreshes the access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// Use the stored token as is and refresh only after the server answers 401.
    #[default]
    Reactive,
    /// Also refresh before sending when the credential expires within `leeway`.
    /// The 401 path stays active.
    Proactive { leeway: Duration },
}

impl RefreshPolicy {
    pub fn proactive() -> Self {
        RefreshPolicy::Proactive {
            leeway: DEFAULT_REFRESH_LEEWAY,
        }
    }
}

/// Validated client configuration. Use [`ClientConfig::builder`].
#[derive(Clone)]
pub struct ClientConfig {
    /// API root without trailing slash
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Secure store key of the single session credential
    pub credential_key: String,
    /// Keychain service name (desktop secure store)
    pub keychain_service: String,
    pub refresh_policy: RefreshPolicy,
    pub request_timeout: Duration,
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
    pub clock: Arc<dyn Clock>,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Builder pre-filled from `SURVEY_*` environment variables.
    pub fn builder_from_env() -> ClientConfigBuilder {
        ClientConfigBuilder::from_lookup(|name| std::env::var(name).ok())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("credential_key", &self.credential_key)
            .field("keychain_service", &self.keychain_service)
            .field("refresh_policy", &self.refresh_policy)
            .field("request_timeout", &self.request_timeout)
            .field("http_client", &"HttpClient { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .finish_non_exhaustive()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    credential_key: Option<String>,
    keychain_service: Option<String>,
    refresh_policy: RefreshPolicy,
    request_timeout: Option<Duration>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ClientConfigBuilder {
    /// Seed settings from a variable lookup. Empty values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Self {
            base_url: read(ENV_BASE_URL),
            client_id: read(ENV_CLIENT_ID),
            client_secret: read(ENV_CLIENT_SECRET),
            ..Self::default()
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn credential_key(mut self, key: impl Into<String>) -> Self {
        self.credential_key = Some(key.into());
        self
    }

    pub fn keychain_service(mut self, service: impl Into<String>) -> Self {
        self.keychain_service = Some(service.into());
        self
    }

    pub fn refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.refresh_policy = policy;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate settings and resolve bridges.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for missing or malformed settings
    /// - [`Error::CapabilityMissing`] when a bridge is neither injected nor
    ///   available as a desktop default
    pub fn build(self) -> Result<ClientConfig> {
        let client_id = required("client_id", self.client_id, ENV_CLIENT_ID)?;
        let client_secret = required("client_secret", self.client_secret, ENV_CLIENT_SECRET)?;
        let base_url = normalize_base_url(self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))?;

        let credential_key = self
            .credential_key
            .unwrap_or_else(|| DEFAULT_CREDENTIAL_KEY.to_string());
        if credential_key.trim().is_empty() {
            return Err(Error::Config("credential_key must not be empty".to_string()));
        }

        let keychain_service = self
            .keychain_service
            .unwrap_or_else(|| DEFAULT_KEYCHAIN_SERVICE.to_string());

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        if request_timeout.is_zero() {
            return Err(Error::Config(
                "request_timeout must be greater than zero".to_string(),
            ));
        }

        let http_client = match self.http_client {
            Some(client) => client,
            None => default_http_client(request_timeout)?,
        };

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => default_secure_store(&keychain_service)?,
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        Ok(ClientConfig {
            base_url,
            client_id,
            client_secret,
            credential_key,
            keychain_service,
            refresh_policy: self.refresh_policy,
            request_timeout,
            http_client,
            secure_store,
            clock,
        })
    }
}

fn required(name: &str, value: Option<String>, env_var: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!(
            "{name} is required (set it on the builder or via {env_var})"
        ))),
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let host = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));

    match host {
        None => Err(Error::Config(format!(
            "base_url must be an http(s) URL, got '{raw}'"
        ))),
        Some("") => Err(Error::Config(format!("base_url has no host: '{raw}'"))),
        Some(_) => Ok(trimmed.to_string()),
    }
}

#[cfg(feature = "desktop-shims")]
fn default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Ok(Arc::new(desktop_http_client(timeout)?))
}

/// Transport retries are off: the authenticated client bounds every call to
/// one request, one refresh and one retry.
#[cfg(feature = "desktop-shims")]
fn desktop_http_client(timeout: Duration) -> Result<bridge_desktop::ReqwestHttpClient> {
    let client = bridge_desktop::ReqwestHttpClient::with_timeout(timeout)
        .map_err(|e| Error::Config(format!("Failed to create desktop HTTP client: {e}")))?;
    Ok(client.with_retry_policy(bridge_traits::http::RetryPolicy::none()))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client provided. Desktop: enable the `desktop-shims` feature. \
                  Mobile: inject the platform adapter."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn default_secure_store(service: &str) -> Result<Arc<dyn SecureStore>> {
    Ok(Arc::new(bridge_desktop::KeyringSecureStore::with_service_name(
        service,
    )))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_secure_store(_service: &str) -> Result<Arc<dyn SecureStore>> {
    Err(Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "No secure store provided. Desktop: enable the `desktop-shims` feature. \
                  Mobile: inject a Keychain/Keystore adapter."
            .to_string(),
    })
}

//! Core service façade and bootstrap helpers.
//!
//! This crate wires a validated [`ClientConfig`] (HTTP client, secure store,
//! clock and API settings) into an [`AuthenticatedClient`] and a shared
//! [`EventBus`]. Desktop apps typically enable the `desktop-shims` feature so
//! the keychain and reqwest adapters from `bridge-desktop` fill in any bridge
//! the host did not inject; mobile hosts inject their own adapters.

pub mod error;

pub use error::{CoreError, Result};

pub use core_auth::{
    AuthApi, AuthError, AuthenticatedClient, ClientError, Credential, CredentialStore, Survey,
};
pub use core_runtime::config::{ClientConfig, ClientConfigBuilder, RefreshPolicy};
pub use core_runtime::events::{AuthEvent, CoreEvent, EventBus, SignOutReason};

use std::sync::Arc;

use core_auth::{HttpAuthApi, SecureCredentialStore};
use tracing::info;

/// Primary façade exposed to host applications.
///
/// Cloning is cheap and every clone drives the same client, so concurrent
/// requests share one refresh.
#[derive(Clone)]
pub struct SurveyService {
    client: Arc<AuthenticatedClient>,
    event_bus: EventBus,
    base_url: Arc<str>,
}

impl SurveyService {
    /// Build the service from a validated configuration.
    pub fn new(config: ClientConfig) -> Self {
        let store: Arc<dyn CredentialStore> = Arc::new(SecureCredentialStore::new(
            Arc::clone(&config.secure_store),
            config.credential_key.clone(),
        ));
        let api: Arc<dyn AuthApi> = Arc::new(
            HttpAuthApi::new(config.base_url.clone(), Arc::clone(&config.http_client))
                .with_timeout(config.request_timeout),
        );

        Self::with_collaborators(&config, store, api)
    }

    /// Build the service around caller-provided store and API
    /// implementations. The configuration supplies client credentials,
    /// refresh policy and clock.
    pub fn with_collaborators(
        config: &ClientConfig,
        store: Arc<dyn CredentialStore>,
        api: Arc<dyn AuthApi>,
    ) -> Self {
        let event_bus = EventBus::default();
        let client = AuthenticatedClient::new(
            store,
            api,
            config.client_id.clone(),
            config.client_secret.clone(),
        )
        .with_refresh_policy(config.refresh_policy)
        .with_clock(Arc::clone(&config.clock))
        .with_event_bus(event_bus.clone());

        info!(
            base_url = %config.base_url,
            refresh_policy = ?config.refresh_policy,
            "Survey service initialized"
        );

        Self {
            client: Arc::new(client),
            event_bus,
            base_url: Arc::from(config.base_url.as_str()),
        }
    }

    /// The authenticated client driving every request.
    pub fn client(&self) -> Arc<AuthenticatedClient> {
        Arc::clone(&self.client)
    }

    /// Bus carrying session events; call `subscribe()` on it.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Reads `SURVEY_API_BASE_URL`, `SURVEY_CLIENT_ID` and `SURVEY_CLIENT_SECRET`
/// and uses the OS keychain and reqwest adapters.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// let service = core_service::bootstrap_desktop()?;
/// let client = service.client();
///
/// client.authenticate("john@appleseed.com", "12345678").await?;
/// let surveys = client.fetch_surveys(1, 10).await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop() -> Result<SurveyService> {
    bootstrap_desktop_with(ClientConfig::builder_from_env())
}

/// Like [`bootstrap_desktop`] but starting from a caller-prepared builder.
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop_with(builder: ClientConfigBuilder) -> Result<SurveyService> {
    let config = builder.build()?;
    Ok(SurveyService::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::storage::MemorySecureStore;
    use bridge_traits::time::FixedClock;
    use bridge_traits::{HttpClient, HttpRequest, HttpResponse};

    struct OfflineHttpClient;

    #[async_trait::async_trait]
    impl HttpClient for OfflineHttpClient {
        async fn execute(
            &self,
            _request: HttpRequest,
        ) -> bridge_traits::error::Result<HttpResponse> {
            Err(bridge_traits::BridgeError::Network("offline".to_string()))
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::builder()
            .base_url("https://survey.example.com/api/v1/")
            .client_id("id")
            .client_secret("secret")
            .http_client(Arc::new(OfflineHttpClient))
            .secure_store(Arc::new(MemorySecureStore::new()))
            .clock(Arc::new(FixedClock::at_timestamp(1_597_169_495)))
            .refresh_policy(RefreshPolicy::proactive())
            .build()
            .unwrap()
    }

    #[test]
    fn test_service_uses_config() {
        let service = SurveyService::new(config());

        assert_eq!(service.base_url(), "https://survey.example.com/api/v1");
        assert_eq!(service.client().refresh_policy(), RefreshPolicy::proactive());
    }

    #[tokio::test]
    async fn test_offline_sign_in_is_unknown_error() {
        let service = SurveyService::new(config());
        let mut events = service.event_bus().subscribe();

        let result = service.client().authenticate("john@appleseed.com", "pw").await;

        assert_eq!(result.unwrap_err(), AuthError::Unknown);
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::SignInFailed { .. })
        ));
    }

    #[test]
    fn test_runtime_errors_convert() {
        let missing = core_runtime::Error::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: "inject one".to_string(),
        };
        assert!(matches!(
            CoreError::from(missing),
            CoreError::CapabilityMissing { .. }
        ));
        assert!(matches!(
            CoreError::from(core_runtime::Error::Config("bad".to_string())),
            CoreError::Config(_)
        ));
    }
}

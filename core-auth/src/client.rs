//! # Authenticated Client
//!
//! Orchestrates sign-in and authenticated survey requests on top of a
//! [`CredentialStore`] and an [`AuthApi`].
//!
//! ## Refresh protocol
//!
//! `fetch_surveys` sends the stored access token. When the server answers
//! 401 the client exchanges the refresh token once, stores the new
//! credential and retries the request once:
//!
//! ```text
//! survey_list(at) --401--> refresh_token(rt) --ok--> store --> survey_list(at')
//!                                            \--err--> clear --> Unauthorized
//! ```
//!
//! A single call never makes more than three network requests, and a retry
//! that is rejected again is reported as [`ClientError::Unauthorized`].
//!
//! ## Single-flight refresh
//!
//! Concurrent callers rejected with the same access token share one refresh
//! exchange. The exchange runs on its own task, so dropping or cancelling a
//! caller never interrupts it and its result is applied exactly once.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{AuthenticatedClient, HttpAuthApi, SecureCredentialStore};
//! use bridge_traits::storage::MemorySecureStore;
//! # use bridge_traits::http::HttpClient;
//! use std::sync::Arc;
//!
//! # async fn example(http_client: Arc<dyn HttpClient>) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SecureCredentialStore::new(
//!     Arc::new(MemorySecureStore::new()),
//!     "nimble_survey.credential",
//! ));
//! let api = Arc::new(HttpAuthApi::new("https://survey-api.nimblehq.co/api/v1", http_client));
//! let client = AuthenticatedClient::new(store, api, "client-id", "client-secret");
//!
//! client.authenticate("john@appleseed.com", "12345678").await?;
//! let surveys = client.fetch_surveys(1, 10).await?;
//! # Ok(())
//! # }
//! ```

use crate::api::AuthApi;
use crate::credential_store::CredentialStore;
use crate::error::{AuthError, ClientError, Result, WireError};
use crate::types::{Credential, Survey};
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_runtime::config::RefreshPolicy;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus, SignOutReason};
use core_runtime::logging::redact_if_sensitive;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

type SharedRefresh = Shared<BoxFuture<'static, std::result::Result<Credential, WireError>>>;

/// A refresh exchange that callers can join.
struct InFlightRefresh {
    /// Access token the refresh replaces
    stale_access_token: String,
    future: SharedRefresh,
}

/// Survey API client that keeps its credential fresh.
///
/// All collaborators are injected. Clones are not provided on purpose: share
/// the client behind an `Arc` so every caller uses the same single-flight
/// guard.
pub struct AuthenticatedClient {
    store: Arc<dyn CredentialStore>,
    api: Arc<dyn AuthApi>,
    client_id: String,
    client_secret: String,
    refresh_policy: RefreshPolicy,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    in_flight: Mutex<Option<InFlightRefresh>>,
}

impl AuthenticatedClient {
    /// Create a client with the reactive refresh policy, the system clock and
    /// a private event bus.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        api: Arc<dyn AuthApi>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            store,
            api,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_policy: RefreshPolicy::default(),
            clock: Arc::new(SystemClock),
            event_bus: EventBus::default(),
            in_flight: Mutex::new(None),
        }
    }

    pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.refresh_policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish session events on a shared bus instead of a private one.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        self.refresh_policy
    }

    /// Sign in with email and password.
    ///
    /// The new credential is written through to the store. A failed write does
    /// not fail the sign-in, but any earlier credential is cleared so later
    /// calls are unauthenticated instead of running as the previous session.
    #[instrument(skip_all, fields(email = %redact_if_sensitive("email", email)))]
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<(), AuthError> {
        match self
            .api
            .login(email, password, &self.client_id, &self.client_secret)
            .await
        {
            Ok(credential) => {
                if !self.store.store(&credential).await {
                    if self.store.clear().await {
                        warn!("Signed in but the credential could not be persisted, previous credential cleared");
                    } else {
                        error!("Signed in but the credential could not be persisted or the previous one cleared");
                    }
                }

                info!(valid_until = %credential.valid_until(), "Signed in");
                self.emit(AuthEvent::SignedIn {
                    valid_until: credential.valid_until().timestamp(),
                });
                Ok(())
            }
            Err(wire_error) => {
                let error = AuthError::from(wire_error);
                warn!(wire_error = %wire_error, error = %error, "Sign-in failed");
                self.emit(AuthEvent::SignInFailed {
                    reason: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// True when a credential is stored. Expiry is not checked.
    pub async fn has_credentials(&self) -> bool {
        self.store.retrieve().await.is_some()
    }

    /// Expiry of the stored credential, if any.
    pub async fn current_credential_valid_until(&self) -> Option<DateTime<Utc>> {
        self.store.retrieve().await.map(|c| c.valid_until())
    }

    /// Forget the stored credential. Returns `false` if the store could not
    /// delete it.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> bool {
        let cleared = self.store.clear().await;
        if cleared {
            info!("Signed out");
            self.emit(AuthEvent::SignedOut {
                reason: SignOutReason::UserRequested,
            });
        } else {
            warn!("Sign-out could not clear the stored credential");
        }
        cleared
    }

    /// Fetch one page of surveys with the stored credential.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Unauthorized`] when nothing is stored (no request is
    ///   made), when the refresh is rejected (the credential is cleared) or
    ///   when the retried request is rejected again
    /// - [`ClientError::Network`], [`ClientError::Parsing`] and
    ///   [`ClientError::Unknown`] for the other wire failures
    #[instrument(skip(self))]
    pub async fn fetch_surveys(&self, page_number: u32, page_size: u32) -> Result<Vec<Survey>> {
        let Some(mut credential) = self.store.retrieve().await else {
            debug!("No stored credential");
            return Err(ClientError::Unauthorized);
        };

        let mut refreshed = false;
        if self.needs_proactive_refresh(&credential) {
            info!(valid_until = %credential.valid_until(), "Access token expiring, refreshing first");
            credential = self.refreshed_credential(&credential).await?;
            refreshed = true;
        }

        let first = self
            .api
            .survey_list(page_number, page_size, Some(credential.access_token()))
            .await;

        match first {
            Ok(surveys) => {
                debug!(count = surveys.len(), "Fetched surveys");
                Ok(surveys)
            }
            Err(WireError::Unauthorized) if !refreshed => {
                info!("Access token rejected, refreshing");
                let credential = self.refreshed_credential(&credential).await?;

                self.api
                    .survey_list(page_number, page_size, Some(credential.access_token()))
                    .await
                    .map_err(|e| {
                        warn!(error = %e, "Retried survey request failed");
                        ClientError::from(e)
                    })
            }
            Err(e) => {
                warn!(error = %e, "Survey request failed");
                Err(e.into())
            }
        }
    }

    /// [`fetch_surveys`](Self::fetch_surveys) that gives up with
    /// [`ClientError::Cancelled`] once `cancel` fires.
    ///
    /// A refresh already started keeps running and is stored once.
    pub async fn fetch_surveys_with_cancellation(
        &self,
        page_number: u32,
        page_size: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<Survey>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(page_number, page_size, "Survey fetch cancelled");
                Err(ClientError::Cancelled)
            }
            result = self.fetch_surveys(page_number, page_size) => result,
        }
    }

    fn needs_proactive_refresh(&self, credential: &Credential) -> bool {
        match self.refresh_policy {
            RefreshPolicy::Reactive => false,
            RefreshPolicy::Proactive { leeway } => {
                let leeway = chrono::Duration::from_std(leeway)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                credential.is_expired_at(self.clock.now(), leeway)
            }
        }
    }

    /// Credential to use after `stale` was rejected or found expiring.
    ///
    /// Joins a refresh already running for `stale`. Otherwise re-reads the
    /// store: a credential rotated in the meantime is returned as is, and
    /// only a still-current `stale` starts a new exchange.
    async fn refreshed_credential(&self, stale: &Credential) -> Result<Credential> {
        let refresh = {
            let mut in_flight = self.in_flight.lock().await;

            let joinable = in_flight.as_ref().filter(|running| {
                running.stale_access_token == stale.access_token()
                    && running.future.peek().is_none()
            });

            match joinable {
                Some(running) => {
                    debug!("Joining refresh already in flight");
                    running.future.clone()
                }
                None => match self.store.retrieve().await {
                    None => {
                        debug!("Credential was cleared while waiting to refresh");
                        return Err(ClientError::Unauthorized);
                    }
                    Some(current) if current.access_token() != stale.access_token() => {
                        debug!("Credential already rotated");
                        return Ok(current);
                    }
                    Some(current) => {
                        let future = self.spawn_refresh(current);
                        *in_flight = Some(InFlightRefresh {
                            stale_access_token: stale.access_token().to_string(),
                            future: future.clone(),
                        });
                        future
                    }
                },
            }
        };

        refresh.await.map_err(|_| ClientError::Unauthorized)
    }

    /// Start the refresh exchange on its own task.
    ///
    /// The task stores the new credential before its result is published. When
    /// the exchange fails or the new credential cannot be stored, it clears the
    /// store instead.
    fn spawn_refresh(&self, current: Credential) -> SharedRefresh {
        let api = Arc::clone(&self.api);
        let store = Arc::clone(&self.store);
        let event_bus = self.event_bus.clone();
        let client_id = self.client_id.clone();
        let client_secret = self.client_secret.clone();

        let task = tokio::spawn(
            async move {
                event_bus.emit(CoreEvent::Auth(AuthEvent::TokenRefreshing));

                let refreshed = match api
                    .refresh_token(current.refresh_token(), &client_id, &client_secret)
                    .await
                {
                    Ok(credential) => {
                        if store.store(&credential).await {
                            Ok(credential)
                        } else {
                            warn!("Refreshed credential could not be persisted");
                            Err(WireError::Unknown)
                        }
                    }
                    Err(e) => Err(e),
                };

                match refreshed {
                    Ok(credential) => {
                        info!(valid_until = %credential.valid_until(), "Access token refreshed");
                        event_bus.emit(CoreEvent::Auth(AuthEvent::TokenRefreshed {
                            valid_until: credential.valid_until().timestamp(),
                        }));
                        Ok(credential)
                    }
                    Err(e) => {
                        warn!(error = %e, "Token refresh failed, clearing credential");
                        if !store.clear().await {
                            error!("Failed to clear credential after refresh failure");
                        }
                        event_bus.emit(CoreEvent::Auth(AuthEvent::SignedOut {
                            reason: SignOutReason::RefreshFailed,
                        }));
                        Err(e)
                    }
                }
            }
            .instrument(info_span!("token_refresh")),
        );

        async move {
            task.await.unwrap_or_else(|e| {
                error!(error = %e, "Token refresh task failed");
                Err(WireError::Unknown)
            })
        }
        .boxed()
        .shared()
    }

    fn emit(&self, event: AuthEvent) {
        self.event_bus.emit(CoreEvent::Auth(event));
    }
}

impl fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_policy", &self.refresh_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential_store::SecureCredentialStore;
    use crate::api::WireResult;
    use async_trait::async_trait;
    use bridge_traits::storage::MemorySecureStore;
    use bridge_traits::time::FixedClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Accepts only `at-fresh`; refresh always hands out `at-fresh`.
    #[derive(Default)]
    struct TokenCheckingApi {
        refresh_calls: AtomicUsize,
        survey_calls: AtomicUsize,
    }

    #[async_trait]
    impl AuthApi for TokenCheckingApi {
        async fn login(&self, _: &str, _: &str, _: &str, _: &str) -> WireResult<Credential> {
            Err(WireError::Unknown)
        }

        async fn refresh_token(&self, refresh_token: &str, _: &str, _: &str) -> WireResult<Credential> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(refresh_token, "rt-old");
            Ok(Credential::issued("at-fresh", "Bearer", "rt-fresh", 2_000.0, 7200.0).unwrap())
        }

        async fn survey_list(&self, _: u32, _: u32, bearer: Option<&str>) -> WireResult<Vec<Survey>> {
            self.survey_calls.fetch_add(1, Ordering::SeqCst);
            match bearer {
                Some("at-fresh") => Ok(vec![]),
                _ => Err(WireError::Unauthorized),
            }
        }
    }

    async fn client_with(
        api: Arc<TokenCheckingApi>,
        valid_until_secs: f64,
    ) -> (AuthenticatedClient, Arc<SecureCredentialStore>) {
        let store = Arc::new(SecureCredentialStore::new(
            Arc::new(MemorySecureStore::new()),
            "credential",
        ));
        let old = Credential::issued("at-old", "Bearer", "rt-old", 0.0, valid_until_secs).unwrap();
        assert!(store.store(&old).await);

        let client = AuthenticatedClient::new(store.clone(), api, "id", "secret");
        (client, store)
    }

    #[tokio::test]
    async fn test_reactive_policy_waits_for_401() {
        let api = Arc::new(TokenCheckingApi::default());
        let (client, _) = client_with(api.clone(), 1_000.0).await;
        let client = client.with_clock(Arc::new(FixedClock::at_timestamp(5_000)));

        assert!(client.fetch_surveys(1, 10).await.is_ok());
        assert_eq!(api.survey_calls.load(Ordering::SeqCst), 2);
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_proactive_policy_refreshes_before_sending() {
        let api = Arc::new(TokenCheckingApi::default());
        let (client, store) = client_with(api.clone(), 1_000.0).await;
        let client = client
            .with_clock(Arc::new(FixedClock::at_timestamp(970)))
            .with_refresh_policy(RefreshPolicy::Proactive {
                leeway: Duration::from_secs(60),
            });

        assert!(client.fetch_surveys(1, 10).await.is_ok());
        assert_eq!(api.survey_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.retrieve().await.unwrap().access_token(), "at-fresh");
    }

    #[tokio::test]
    async fn test_proactive_policy_leaves_fresh_token_alone() {
        let api = Arc::new(TokenCheckingApi::default());
        let (client, _) = client_with(api.clone(), 1_000.0).await;
        let client = client
            .with_clock(Arc::new(FixedClock::at_timestamp(100)))
            .with_refresh_policy(RefreshPolicy::proactive());

        // at-old is still rejected by the server, so the 401 path runs.
        assert!(client.fetch_surveys(1, 10).await.is_ok());
        assert_eq!(api.survey_calls.load(Ordering::SeqCst), 2);
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rotated_credential_is_reused_without_refresh() {
        let api = Arc::new(TokenCheckingApi::default());
        let (client, store) = client_with(api.clone(), 1_000.0).await;
        let stale = store.retrieve().await.unwrap();

        let rotated = Credential::issued("at-fresh", "Bearer", "rt-fresh", 0.0, 9_000.0).unwrap();
        assert!(store.store(&rotated).await);

        let credential = client.refreshed_credential(&stale).await.unwrap();
        assert_eq!(credential, rotated);
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sign_out_clears_and_emits() {
        let api = Arc::new(TokenCheckingApi::default());
        let (client, _) = client_with(api, 1_000.0).await;
        let mut events = client.event_bus().subscribe();

        assert!(client.sign_out().await);
        assert!(!client.has_credentials().await);
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::SignedOut {
                reason: SignOutReason::UserRequested
            })
        );
    }

    #[test]
    fn test_debug_hides_secret() {
        let api = Arc::new(TokenCheckingApi::default());
        let store = Arc::new(SecureCredentialStore::new(
            Arc::new(MemorySecureStore::new()),
            "credential",
        ));
        let client = AuthenticatedClient::new(store, api, "id", "very-secret");

        let debug = format!("{:?}", client);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("id"));
    }
}

//! Credential Storage
//!
//! Persists the single live [`Credential`] under one fixed key of a
//! platform [`SecureStore`] (Keychain, Secret Service, Credential Manager).
//!
//! The store never fails loudly: writes and deletes report success as a
//! `bool`, and a missing or unreadable entry reads back as `None`. The reason
//! for every failure is logged, never the tokens themselves.
//!
//! ```no_run
//! use core_auth::{Credential, CredentialStore, SecureCredentialStore};
//! use bridge_traits::storage::MemorySecureStore;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let store = SecureCredentialStore::new(Arc::new(MemorySecureStore::new()), "nimble_survey.credential");
//! let credential = Credential::issued("at", "Bearer", "rt", 1_597_169_495.0, 7200.0).unwrap();
//!
//! assert!(store.store(&credential).await);
//! assert_eq!(store.retrieve().await, Some(credential));
//! assert!(store.clear().await);
//! # }
//! ```

use crate::types::Credential;
use async_trait::async_trait;
use bridge_traits::{error::BridgeError, storage::SecureStore};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Persistence for exactly one credential.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist `credential`, overwriting any previous one.
    ///
    /// Returns `false` when serialization or the underlying write fails.
    async fn store(&self, credential: &Credential) -> bool;

    /// Read the stored credential. Absent and corrupt entries are both `None`.
    async fn retrieve(&self) -> Option<Credential>;

    /// Remove the stored credential. Succeeds when nothing was stored.
    async fn clear(&self) -> bool;
}

/// Reason a store operation reported failure. Only ever logged.
#[derive(Error, Debug)]
enum StoreError {
    #[error("Failed to encode credential: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Stored credential is corrupt: {0}")]
    Corrupt(String),

    #[error("Secure storage failed: {0}")]
    Storage(#[from] BridgeError),
}

/// On-disk shape of a credential.
#[derive(Serialize, Deserialize)]
struct StoredCredential {
    access_token: String,
    token_type: String,
    refresh_token: String,
    /// Unix epoch milliseconds
    valid_until_ms: i64,
}

impl From<&Credential> for StoredCredential {
    fn from(credential: &Credential) -> Self {
        Self {
            access_token: credential.access_token().to_string(),
            token_type: credential.token_type().to_string(),
            refresh_token: credential.refresh_token().to_string(),
            valid_until_ms: credential.valid_until().timestamp_millis(),
        }
    }
}

impl StoredCredential {
    fn into_credential(self) -> Result<Credential, StoreError> {
        let valid_until = DateTime::from_timestamp_millis(self.valid_until_ms).ok_or_else(|| {
            StoreError::Corrupt(format!("timestamp {} out of range", self.valid_until_ms))
        })?;

        Ok(Credential::new(
            self.access_token,
            self.token_type,
            self.refresh_token,
            valid_until,
        ))
    }
}

/// [`CredentialStore`] backed by a [`SecureStore`] entry, JSON encoded.
#[derive(Clone)]
pub struct SecureCredentialStore {
    secure_store: Arc<dyn SecureStore>,
    key: String,
}

impl SecureCredentialStore {
    pub fn new(secure_store: Arc<dyn SecureStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        debug!(key = %key, "Initializing SecureCredentialStore");
        Self { secure_store, key }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn try_store(&self, credential: &Credential) -> Result<(), StoreError> {
        let encoded =
            serde_json::to_vec(&StoredCredential::from(credential)).map_err(StoreError::Encode)?;
        self.secure_store.set_secret(&self.key, &encoded).await?;
        Ok(())
    }

    async fn try_retrieve(&self) -> Result<Option<Credential>, StoreError> {
        let Some(bytes) = self.secure_store.get_secret(&self.key).await? else {
            return Ok(None);
        };

        let stored: StoredCredential = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        stored.into_credential().map(Some)
    }
}

#[async_trait]
impl CredentialStore for SecureCredentialStore {
    #[instrument(skip(self, credential), fields(key = %self.key))]
    async fn store(&self, credential: &Credential) -> bool {
        match self.try_store(credential).await {
            Ok(()) => {
                debug!(valid_until = %credential.valid_until(), "Credential stored");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to store credential");
                false
            }
        }
    }

    #[instrument(skip(self), fields(key = %self.key))]
    async fn retrieve(&self) -> Option<Credential> {
        match self.try_retrieve().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Treating unreadable credential as absent");
                None
            }
        }
    }

    #[instrument(skip(self), fields(key = %self.key))]
    async fn clear(&self) -> bool {
        match self.secure_store.delete_secret(&self.key).await {
            Ok(()) => {
                debug!("Credential cleared");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to clear credential");
                false
            }
        }
    }
}

//! # Authentication Module
//!
//! Credential lifecycle and authenticated access to the NimbleSurvey API.
//!
//! ## Overview
//!
//! This crate signs users in with the OAuth password grant, keeps the issued
//! [`Credential`] in platform secure storage and makes authenticated survey
//! requests, refreshing an expired access token transparently.
//!
//! ## Features
//!
//! - Password sign-in with write-through credential storage
//! - One refresh and one retry when the server rejects the access token
//! - Single-flight refresh shared by concurrent callers
//! - Typed wire, sign-in and request errors with exhaustive mappings
//! - Optional proactive refresh before the token expires
//! - Cancellation-aware requests
//! - Auth state event emission

pub mod api;
pub mod client;
pub mod credential_store;
pub mod error;
pub mod types;

pub use api::{AuthApi, HttpAuthApi, WireResult};
pub use client::AuthenticatedClient;
pub use credential_store::{CredentialStore, SecureCredentialStore};
pub use error::{AuthError, ClientError, Result, WireError};
pub use types::{Credential, Survey};

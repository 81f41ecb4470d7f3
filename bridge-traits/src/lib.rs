//! # Host Bridge Traits
//!
//! Capability contracts the survey client core needs from its host.
//!
//! ## Overview
//!
//! The core never talks to the network, the keychain or the wall clock
//! directly. Each of those is a trait defined here and implemented per
//! platform (`bridge-desktop` ships the desktop adapters; mobile hosts inject
//! their own).
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Executes HTTP requests for the wire layer
//! - [`SecureStore`](storage::SecureStore) - Secret persistence (Keychain, Secret Service, DPAPI)
//! - [`Clock`](time::Clock) - Time source, swappable for deterministic tests
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! Every bridge reports failures as [`BridgeError`](error::BridgeError).
//! Transport adapters must classify connection problems as
//! [`BridgeError::Network`] or [`BridgeError::Timeout`] so the wire layer can
//! tell a dead network apart from a broken adapter.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyHttpClient;
//!
//! #[async_trait]
//! impl HttpClient for MyHttpClient {
//!     async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{MemorySecureStore, SecureStore};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};

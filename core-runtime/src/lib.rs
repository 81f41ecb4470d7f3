//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the survey client core:
//! - Logging and tracing infrastructure
//! - Client configuration
//! - Auth event bus
//!
//! Every other `core-*` crate depends on this one for its logging
//! conventions and for the validated [`ClientConfig`](config::ClientConfig)
//! it is built from.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{ClientConfig, ClientConfigBuilder, RefreshPolicy};
pub use error::{Error, Result};

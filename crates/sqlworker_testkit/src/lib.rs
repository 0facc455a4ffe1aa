//! # SQLWorker Testkit
//!
//! Test utilities for SQLWorker.
//!
//! This crate provides:
//! - Temporary stores and connected test clients
//! - A scripted engine that records a timeline of the requests it receives
//! - Scenario helpers built around a small groceries schema
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sqlworker_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_client() {
//!     let client = TestClient::memory().await;
//!     groceries_schema(&client).await.unwrap();
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod scenarios;
pub mod scripted;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::scenarios::*;
    pub use crate::scripted::*;
}

pub use fixtures::*;
pub use generators::*;
pub use scenarios::*;
pub use scripted::*;

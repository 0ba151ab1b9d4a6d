//! # kusto-client
//!
//! Core HTTP client infrastructure for Azure Data Explorer (Kusto).
//!
//! This crate provides the foundational HTTP client with:
//! - The fixed Kusto header set (`x-ms-version`, JSON content negotiation,
//!   gzip/deflate) plus the caller's tracing headers
//! - Single-hop redirect handling that resubmits the original payload
//! - Service error parsing with activity id correlation
//! - Transport failure classification (permanent vs. retriable)
//!
//! Retrying is left to the caller; errors only report whether a retry
//! could succeed.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Application Layer                        │
//! │  (kusto-query)                                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    KustoHttpClient                          │
//! │  - Header set, client details, compression                  │
//! │  - Redirect-once, error body parsing                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use kusto_client::{ClientConfig, KustoHttpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kusto_client::Error> {
//!     let client = KustoHttpClient::new(ClientConfig::default())?;
//!
//!     let response = client
//!         .post_json(
//!             "https://help.kusto.windows.net/v1/rest/mgmt",
//!             &token,
//!             &serde_json::json!({"csl": ".show version"}),
//!         )
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod details;
mod error;
mod request;
mod response;

pub use client::KustoHttpClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use details::{escape_field, ClientDetails, ConnectorDetails};
pub use error::{Error, ErrorKind, Result};
pub use request::{RequestBuilder, RequestMethod};
pub use response::{error_from_response, Response, ResponseExt, ACTIVITY_ID_HEADER};

use std::time::Duration;

/// Value of the `x-ms-version` header.
pub const API_VERSION: &str = "2024-12-12";

/// User-Agent string for the client
pub const USER_AGENT: &str = concat!("kusto-rust/", env!("CARGO_PKG_VERSION"));

/// Default timeout for queries.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(4 * 60);

/// Default timeout for management commands.
pub const DEFAULT_MGMT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Extra time granted to the client beyond the server-side timeout.
pub const CLIENT_SERVER_DELTA: Duration = Duration::from_secs(30);

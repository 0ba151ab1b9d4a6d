//! # kusto-sdk
//!
//! An Azure Data Explorer (Kusto) client library for Rust.
//!
//! ## Security
//!
//! - Tokens, secrets and keys are redacted in Debug output
//! - Tracing skips credential parameters
//! - Error messages never echo credential values
//!
//! ## Crates
//!
//! - **kusto-client** - HTTP core: Kusto header set, redirect-once, service error parsing
//! - **kusto-auth** - Token caching with silent refresh, cloud info, identity backends, connection strings
//! - **kusto-data** - Typed result tables over the v1/v2 tabular envelopes
//! - **kusto-query** - Queries and management commands, end to end
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kusto_sdk::{ConnectionString, KustoQueryClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection: ConnectionString =
//!         "Data Source=https://help.kusto.windows.net;Managed Identity=system".parse()?;
//!     let client = KustoQueryClient::from_connection_string(&connection)?;
//!
//!     let dataset = client
//!         .execute_query("Samples", "StormEvents | summarize count() by State | top 5 by count_")
//!         .await?;
//!
//!     if let Some(mut table) = dataset.into_primary_result() {
//!         while table.next() {
//!             println!("{}: {}", table.get_string("State")?, table.get_i64("count_")?);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "auth")]
pub use kusto_auth as auth;
#[cfg(feature = "client")]
pub use kusto_client as client;
#[cfg(feature = "data")]
pub use kusto_data as data;
#[cfg(feature = "query")]
pub use kusto_query as query;

#[cfg(feature = "auth")]
pub use kusto_auth::{ConnectionString, TokenProvider, TokenProviderConfig};
#[cfg(feature = "client")]
pub use kusto_client::{ClientConfig, KustoHttpClient};
#[cfg(feature = "data")]
pub use kusto_data::{KustoResponseDataSet, ResultTable};
#[cfg(feature = "query")]
pub use kusto_query::{ClientRequestProperties, KustoQueryClient};

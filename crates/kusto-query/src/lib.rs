//! # kusto-query
//!
//! Runs queries and management commands against an Azure Data Explorer
//! (Kusto) cluster and decodes the responses into typed result tables.
//!
//! Queries go to `/v2/rest/query` and come back in the v2 envelope;
//! management commands go to `/v1/rest/mgmt` and come back in the v1
//! envelope. Either way the result is a
//! [`KustoResponseDataSet`](kusto_data::KustoResponseDataSet).
//!
//! ## Example
//!
//! ```rust,ignore
//! use kusto_auth::ConnectionString;
//! use kusto_query::{ClientRequestProperties, KustoQueryClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection: ConnectionString = std::env::var("KUSTO_CONNECTION_STRING")?.parse()?;
//!     let client = KustoQueryClient::from_connection_string(&connection)?;
//!
//!     let properties = ClientRequestProperties::new()
//!         .with_server_timeout(std::time::Duration::from_secs(60));
//!
//!     let dataset = client
//!         .execute_query_with_properties("Samples", "StormEvents | count", &properties)
//!         .await?;
//!
//!     if let Some(mut table) = dataset.into_primary_result() {
//!         while table.next() {
//!             println!("{}", table.get_i64(0)?);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod properties;

pub use client::{CommandKind, KustoQueryClient, MGMT_PATH, QUERY_PATH};
pub use error::{Error, ErrorKind, Result};
pub use properties::{
    ClientRequestProperties, CLIENT_REQUEST_ID_PREFIX, MAX_SERVER_TIMEOUT, OPTION_SERVER_TIMEOUT,
};

//! # kusto-data
//!
//! Decoding of Azure Data Explorer (Kusto) tabular responses.
//!
//! A response is a set of tables; each [`ResultTable`] is read through a
//! forward-only cursor with one typed accessor per Kusto type:
//!
//! - `_opt` accessors return `None` for null cells, plain accessors fail
//!   with a null-value error
//! - widening reads (`int` as `i64`) succeed, narrowing reads (`long` as
//!   `i32`) fail with an invalid-cast error
//! - rows carrying inline `Exceptions` fail construction of the table
//!
//! Both envelope versions are handled by [`KustoResponseDataSet`], which
//! picks the version from the JSON shape.
//!
//! ## Example
//!
//! ```rust,ignore
//! use kusto_data::KustoResponseDataSet;
//!
//! let dataset = KustoResponseDataSet::parse(&body)?;
//! let mut table = dataset.into_primary_result().expect("query returns a table");
//!
//! while table.next() {
//!     let state = table.get_string("State")?;
//!     let count = table.get_i64("Count")?;
//!     println!("{state}: {count}");
//! }
//! ```

mod dataset;
mod datetime;
mod error;
mod table;
mod timespan;
mod types;

pub use dataset::{EnvelopeVersion, KustoResponseDataSet};
pub use datetime::{format_datetime, format_datetime_literal, parse_datetime};
pub use error::{Error, ErrorKind, Result};
pub use table::{ColumnIndex, ResultTable, Row};
pub use timespan::{format_timespan, format_timespan_literal, parse_timespan};
pub use types::{Column, ColumnType, KustoDecimal, KustoValue};

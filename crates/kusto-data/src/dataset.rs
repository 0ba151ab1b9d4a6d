//! The tabular response envelope: one parser for both the v1 (`{"Tables": [...]}`)
//! and v2 (array of frames) shapes.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::table::{collect_exceptions, ResultTable};

/// Envelope version, resolved from the top-level JSON shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeVersion {
    /// `{"Tables": [...]}`, as returned by `/v1/rest/mgmt` and `/v1/rest/query`.
    V1,
    /// `[{"FrameType": ...}, ...]`, as returned by `/v2/rest/query`.
    V2,
}

impl EnvelopeVersion {
    /// Objects are v1, arrays are v2.
    pub fn detect(envelope: &Value) -> Result<Self> {
        match envelope {
            Value::Object(_) => Ok(EnvelopeVersion::V1),
            Value::Array(_) => Ok(EnvelopeVersion::V2),
            other => Err(Error::new(ErrorKind::InvalidEnvelope(format!(
                "expected an object or an array, found {}",
                json_kind(other)
            )))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DataSetCompletion {
    #[serde(default)]
    has_errors: bool,
    #[serde(default)]
    cancelled: bool,
}

/// All tables of one response, plus which of them hold query results.
#[derive(Debug, Clone)]
pub struct KustoResponseDataSet {
    version: EnvelopeVersion,
    tables: Vec<ResultTable>,
    primary: Vec<usize>,
}

impl KustoResponseDataSet {
    /// Parse a response body, detecting the envelope version.
    pub fn parse(body: &str) -> Result<Self> {
        let envelope: Value = serde_json::from_str(body)?;
        Self::from_value(&envelope)
    }

    /// Parse a response body that must be of the given version.
    pub fn parse_as(body: &str, version: EnvelopeVersion) -> Result<Self> {
        let envelope: Value = serde_json::from_str(body)?;
        Self::from_value_as(&envelope, version)
    }

    /// Decode an already parsed envelope, detecting its version.
    pub fn from_value(envelope: &Value) -> Result<Self> {
        Self::from_value_as(envelope, EnvelopeVersion::detect(envelope)?)
    }

    /// Decode an already parsed envelope of the given version.
    pub fn from_value_as(envelope: &Value, version: EnvelopeVersion) -> Result<Self> {
        let dataset = match version {
            EnvelopeVersion::V1 => Self::from_v1(envelope)?,
            EnvelopeVersion::V2 => Self::from_v2(envelope)?,
        };

        debug!(
            version = ?dataset.version,
            tables = dataset.tables.len(),
            primary = dataset.primary.len(),
            "Decoded response data set"
        );

        Ok(dataset)
    }

    fn from_v1(envelope: &Value) -> Result<Self> {
        let frames = envelope
            .get("Tables")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::new(ErrorKind::MissingProperty("Tables".to_string())))?;

        let tables = frames
            .iter()
            .filter(|t| {
                t.get("FrameType")
                    .and_then(Value::as_str)
                    .is_none_or(|f| f == "DataTable")
            })
            .map(ResultTable::from_json)
            .collect::<Result<Vec<_>>>()?;

        let primary = v1_primary_indices(&tables);

        Ok(Self {
            version: EnvelopeVersion::V1,
            tables,
            primary,
        })
    }

    fn from_v2(envelope: &Value) -> Result<Self> {
        let frames = envelope.as_array().ok_or_else(|| {
            Error::new(ErrorKind::InvalidEnvelope(format!(
                "v2 envelope must be an array, found {}",
                json_kind(envelope)
            )))
        })?;

        let mut tables = Vec::new();
        let mut exceptions = Vec::new();

        for frame in frames {
            match frame.get("FrameType").and_then(Value::as_str) {
                Some("DataTable") => tables.push(ResultTable::from_json(frame)?),
                Some("DataSetCompletion") => {
                    let completion = DataSetCompletion::deserialize(frame)?;
                    if completion.has_errors || completion.cancelled {
                        exceptions.extend(collect_exceptions(frame));
                        if exceptions.is_empty() {
                            exceptions.push(if completion.cancelled {
                                "Query was cancelled".to_string()
                            } else {
                                "Query completed with errors".to_string()
                            });
                        }
                    }
                }
                Some(_) => {}
                None => {
                    return Err(Error::new(ErrorKind::MissingProperty(
                        "FrameType".to_string(),
                    )))
                }
            }
        }

        if !exceptions.is_empty() {
            return Err(Error::new(ErrorKind::ServiceExceptions(exceptions)));
        }

        let primary = tables
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind() == Some("PrimaryResult"))
            .map(|(i, _)| i)
            .collect();

        Ok(Self {
            version: EnvelopeVersion::V2,
            tables,
            primary,
        })
    }

    /// The envelope version this data set was decoded from.
    pub fn version(&self) -> EnvelopeVersion {
        self.version
    }

    /// All tables, in response order.
    pub fn tables(&self) -> &[ResultTable] {
        &self.tables
    }

    /// Table at `index`.
    pub fn table(&self, index: usize) -> Option<&ResultTable> {
        self.tables.get(index)
    }

    /// First table with exactly this name.
    pub fn table_by_name(&self, name: &str) -> Option<&ResultTable> {
        self.tables.iter().find(|t| t.name() == name)
    }

    /// Tables holding the results of the query itself.
    pub fn primary_results(&self) -> impl Iterator<Item = &ResultTable> + '_ {
        self.primary.iter().map(|&i| &self.tables[i])
    }

    /// The first primary result.
    pub fn primary_result(&self) -> Option<&ResultTable> {
        self.primary.first().map(|&i| &self.tables[i])
    }

    /// Take ownership of the first primary result.
    pub fn into_primary_result(mut self) -> Option<ResultTable> {
        let index = *self.primary.first()?;
        Some(self.tables.swap_remove(index))
    }

    /// Take ownership of every table.
    pub fn into_tables(self) -> Vec<ResultTable> {
        self.tables
    }
}

/// Resolve primary results through the trailing table of contents.
///
/// With several tables the last one lists every table's `Ordinal` and
/// `Kind`; a single table is the result itself.
fn v1_primary_indices(tables: &[ResultTable]) -> Vec<usize> {
    if tables.len() <= 1 {
        return (0..tables.len()).collect();
    }

    let toc = &tables[tables.len() - 1];
    let (Some(ordinal), Some(kind)) = (toc.find_column("Ordinal"), toc.find_column("Kind")) else {
        return vec![0];
    };

    let indices: Vec<usize> = toc
        .rows()
        .filter(|row| row.get_string_opt(kind).ok().flatten().as_deref() == Some("QueryResult"))
        .filter_map(|row| row.get_i64_opt(ordinal).ok().flatten())
        .filter_map(|n| usize::try_from(n).ok())
        .filter(|&i| i < tables.len() - 1)
        .collect();

    if indices.is_empty() {
        vec![0]
    } else {
        indices
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v2_body() -> String {
        json!([
            {"FrameType": "DataSetHeader", "IsProgressive": false, "Version": "v2.0"},
            {
                "FrameType": "DataTable",
                "TableId": 0,
                "TableKind": "QueryProperties",
                "TableName": "@ExtendedProperties",
                "Columns": [
                    {"ColumnName": "TableId", "ColumnType": "int"},
                    {"ColumnName": "Key", "ColumnType": "string"},
                    {"ColumnName": "Value", "ColumnType": "dynamic"}
                ],
                "Rows": [[1, "Visualization", "{\"Visualization\":null}"]]
            },
            {
                "FrameType": "DataTable",
                "TableId": 1,
                "TableKind": "PrimaryResult",
                "TableName": "PrimaryResult",
                "Columns": [
                    {"ColumnName": "State", "ColumnType": "string"},
                    {"ColumnName": "Count", "ColumnType": "long"}
                ],
                "Rows": [["TEXAS", 4701], ["KANSAS", 3166]]
            },
            {
                "FrameType": "DataTable",
                "TableId": 2,
                "TableKind": "QueryCompletionInformation",
                "TableName": "QueryCompletionInformation",
                "Columns": [{"ColumnName": "Payload", "ColumnType": "string"}],
                "Rows": [["{}"]]
            },
            {"FrameType": "DataSetCompletion", "HasErrors": false, "Cancelled": false}
        ])
        .to_string()
    }

    #[test]
    fn test_v2_primary_result() {
        let dataset = KustoResponseDataSet::parse(&v2_body()).unwrap();
        assert_eq!(dataset.version(), EnvelopeVersion::V2);
        assert_eq!(dataset.tables().len(), 3);
        assert_eq!(dataset.primary_results().count(), 1);

        let mut table = dataset.into_primary_result().unwrap();
        assert_eq!(table.name(), "PrimaryResult");
        assert!(table.next());
        assert_eq!(table.get_string("State").unwrap(), "TEXAS");
        assert_eq!(table.get_i64("Count").unwrap(), 4701);
    }

    #[test]
    fn test_v2_completion_errors() {
        let body = json!([
            {"FrameType": "DataSetHeader", "IsProgressive": false, "Version": "v2.0"},
            {
                "FrameType": "DataSetCompletion",
                "HasErrors": true,
                "Cancelled": false,
                "OneApiErrors": [
                    {"error": {"code": "LimitsExceeded", "message": "Query result set has exceeded the internal record count limit"}}
                ]
            }
        ])
        .to_string();

        let err = KustoResponseDataSet::parse(&body).unwrap_err();
        assert_eq!(err.exceptions().map(<[String]>::len), Some(1));
    }

    #[test]
    fn test_v1_with_table_of_contents() {
        let body = json!({
            "Tables": [
                {
                    "TableName": "Table_0",
                    "Columns": [{"ColumnName": "Name", "DataType": "String", "ColumnType": "string"}],
                    "Rows": [["a"], ["b"]]
                },
                {
                    "TableName": "Table_1",
                    "Columns": [{"ColumnName": "Value", "DataType": "String"}],
                    "Rows": [["{}"]]
                },
                {
                    "TableName": "Table_2",
                    "Columns": [
                        {"ColumnName": "Ordinal", "DataType": "Int64"},
                        {"ColumnName": "Kind", "DataType": "String"},
                        {"ColumnName": "Name", "DataType": "String"},
                        {"ColumnName": "Id", "DataType": "String"},
                        {"ColumnName": "PrettyName", "DataType": "String"}
                    ],
                    "Rows": [
                        [0, "QueryResult", "PrimaryResult", "f8b4b9a4-6b1c-4f8e-9b0a-000000000000", ""],
                        [1, "QueryProperties", "@ExtendedProperties", "d0b4b9a4-6b1c-4f8e-9b0a-000000000000", ""]
                    ]
                }
            ]
        })
        .to_string();

        let dataset = KustoResponseDataSet::parse_as(&body, EnvelopeVersion::V1).unwrap();
        assert_eq!(dataset.tables().len(), 3);
        let primary: Vec<&str> = dataset.primary_results().map(ResultTable::name).collect();
        assert_eq!(primary, vec!["Table_0"]);
        assert!(dataset.table_by_name("Table_2").is_some());
    }

    #[test]
    fn test_v1_single_table_is_primary() {
        let body = r#"{"Tables":[{"TableName":"Table_0","Columns":[{"ColumnName":"BuildVersion","DataType":"String","ColumnType":"string"}],"Rows":[["1.0.0"]]}]}"#;

        let dataset = KustoResponseDataSet::parse(body).unwrap();
        assert_eq!(dataset.version(), EnvelopeVersion::V1);
        let table = dataset.primary_result().unwrap();
        assert_eq!(table.row(0).unwrap().get_string("BuildVersion").unwrap(), "1.0.0");
    }

    #[test]
    fn test_v1_inline_exceptions() {
        let body = json!({
            "Tables": [{
                "TableName": "Table_0",
                "Columns": [{"ColumnName": "A", "DataType": "Int32"}],
                "Rows": [{"Exceptions": ["msg1", "msg2"]}]
            }]
        });

        let err = KustoResponseDataSet::from_value(&body).unwrap_err();
        assert_eq!(err.exceptions().map(<[String]>::len), Some(2));
    }

    #[test]
    fn test_wrong_shape() {
        assert!(EnvelopeVersion::detect(&json!("text")).is_err());
        assert!(KustoResponseDataSet::parse_as("{}", EnvelopeVersion::V2).is_err());
        assert!(KustoResponseDataSet::parse("not json").is_err());

        let err = KustoResponseDataSet::parse("{}").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MissingProperty(ref p) if p == "Tables"));
    }
}

//! Column types and the decoded cell value union.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::datetime::parse_datetime;
use crate::error::{Error, ErrorKind, Result};
use crate::timespan::parse_timespan;

/// The fixed set of Kusto scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Bool,
    String,
    DateTime,
    Decimal,
    Dynamic,
    Guid,
    Int,
    Long,
    Real,
    Timespan,
    Short,
}

impl ColumnType {
    /// The Kusto spelling of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Bool => "bool",
            ColumnType::String => "string",
            ColumnType::DateTime => "datetime",
            ColumnType::Decimal => "decimal",
            ColumnType::Dynamic => "dynamic",
            ColumnType::Guid => "guid",
            ColumnType::Int => "int",
            ColumnType::Long => "long",
            ColumnType::Real => "real",
            ColumnType::Timespan => "timespan",
            ColumnType::Short => "short",
        }
    }

    /// Decode a raw cell into its host representation.
    pub fn decode(&self, raw: &Value) -> Result<KustoValue> {
        if raw.is_null() {
            return Ok(KustoValue::Null);
        }

        let invalid = || {
            Error::new(ErrorKind::InvalidFormat {
                column_type: *self,
                value: raw.to_string(),
            })
        };

        let value = match self {
            ColumnType::Bool => KustoValue::Bool(match raw {
                Value::Bool(b) => *b,
                Value::Number(n) => match n.as_i64() {
                    Some(0) => false,
                    Some(1) => true,
                    _ => return Err(invalid()),
                },
                Value::String(s) if s.eq_ignore_ascii_case("true") => true,
                Value::String(s) if s.eq_ignore_ascii_case("false") => false,
                _ => return Err(invalid()),
            }),
            ColumnType::String => match raw {
                Value::String(s) => KustoValue::String(s.clone()),
                _ => return Err(invalid()),
            },
            ColumnType::DateTime => match raw {
                Value::String(s) if s.is_empty() => KustoValue::Null,
                Value::String(s) => KustoValue::DateTime(parse_datetime(s)?),
                _ => return Err(invalid()),
            },
            ColumnType::Decimal => match raw {
                Value::String(s) if s.is_empty() => KustoValue::Null,
                Value::String(s) => KustoValue::Decimal(s.parse()?),
                Value::Number(n) => KustoValue::Decimal(n.to_string().parse()?),
                _ => return Err(invalid()),
            },
            ColumnType::Dynamic => KustoValue::Dynamic(decode_dynamic(raw)),
            ColumnType::Guid => match raw {
                Value::String(s) if s.is_empty() => KustoValue::Null,
                Value::String(s) => KustoValue::Guid(Uuid::parse_str(s).map_err(|e| {
                    Error::with_source(
                        ErrorKind::InvalidFormat {
                            column_type: *self,
                            value: s.clone(),
                        },
                        e,
                    )
                })?),
                _ => return Err(invalid()),
            },
            ColumnType::Int => KustoValue::Int(
                raw.as_i64()
                    .and_then(|n| i32::try_from(n).ok())
                    .ok_or_else(invalid)?,
            ),
            ColumnType::Long => KustoValue::Long(raw.as_i64().ok_or_else(invalid)?),
            ColumnType::Short => KustoValue::Short(
                raw.as_i64()
                    .and_then(|n| i16::try_from(n).ok())
                    .ok_or_else(invalid)?,
            ),
            ColumnType::Real => KustoValue::Real(match raw {
                Value::Number(n) => n.as_f64().ok_or_else(invalid)?,
                Value::String(s) => match s.as_str() {
                    "NaN" => f64::NAN,
                    "Infinity" => f64::INFINITY,
                    "-Infinity" => f64::NEG_INFINITY,
                    other => other.parse().map_err(|_| invalid())?,
                },
                _ => return Err(invalid()),
            }),
            ColumnType::Timespan => match raw {
                Value::String(s) if s.is_empty() => KustoValue::Null,
                Value::String(s) => KustoValue::Timespan(parse_timespan(s)?),
                _ => return Err(invalid()),
            },
        };

        Ok(value)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = Error;

    /// Accepts Kusto names and the .NET names used by v1 envelopes.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let name = lower.strip_prefix("system.").unwrap_or(&lower);

        let column_type = match name {
            "bool" | "boolean" | "sbyte" => ColumnType::Bool,
            "string" => ColumnType::String,
            "datetime" | "date" => ColumnType::DateTime,
            "decimal" | "data.sqltypes.sqldecimal" => ColumnType::Decimal,
            "dynamic" | "object" => ColumnType::Dynamic,
            "guid" | "uuid" | "uniqueid" => ColumnType::Guid,
            "int" | "int32" => ColumnType::Int,
            "long" | "int64" => ColumnType::Long,
            "real" | "double" => ColumnType::Real,
            "timespan" | "time" => ColumnType::Timespan,
            "short" | "int16" => ColumnType::Short,
            _ => return Err(Error::new(ErrorKind::UnknownColumnType(s.to_string()))),
        };

        Ok(column_type)
    }
}

/// A named, typed column of a result table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    /// Create a new column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A decoded cell. One variant per Kusto type, plus `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum KustoValue {
    Null,
    Bool(bool),
    String(String),
    DateTime(DateTime<Utc>),
    Decimal(KustoDecimal),
    Dynamic(Value),
    Guid(Uuid),
    Int(i32),
    Long(i64),
    Real(f64),
    Timespan(TimeDelta),
    Short(i16),
}

impl KustoValue {
    /// Returns true for the null cell.
    pub fn is_null(&self) -> bool {
        matches!(self, KustoValue::Null)
    }
}

/// A decimal kept in its exact textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KustoDecimal(String);

impl KustoDecimal {
    /// The decimal text as received.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lossy conversion to a float.
    pub fn to_f64(&self) -> f64 {
        self.0.parse().unwrap_or(f64::NAN)
    }
}

impl FromStr for KustoDecimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        static PATTERN: OnceLock<regex_lite::Regex> = OnceLock::new();
        let re = PATTERN.get_or_init(|| {
            regex_lite::Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$")
                .expect("static pattern is valid")
        });

        if re.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::new(ErrorKind::InvalidFormat {
                column_type: ColumnType::Decimal,
                value: s.to_string(),
            }))
        }
    }
}

impl fmt::Display for KustoDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// v1 envelopes carry dynamic values as JSON text; v2 carries them inline.
fn decode_dynamic(raw: &Value) -> Value {
    if let Value::String(s) = raw {
        let trimmed = s.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                return parsed;
            }
        }
    }
    raw.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_type_names() {
        assert_eq!("int".parse::<ColumnType>().unwrap(), ColumnType::Int);
        assert_eq!("Int64".parse::<ColumnType>().unwrap(), ColumnType::Long);
        assert_eq!("System.DateTime".parse::<ColumnType>().unwrap(), ColumnType::DateTime);
        assert_eq!("SByte".parse::<ColumnType>().unwrap(), ColumnType::Bool);
        assert_eq!("TimeSpan".parse::<ColumnType>().unwrap(), ColumnType::Timespan);
        assert_eq!("Object".parse::<ColumnType>().unwrap(), ColumnType::Dynamic);
        assert_eq!("Int16".parse::<ColumnType>().unwrap(), ColumnType::Short);
        assert!("varchar".parse::<ColumnType>().is_err());

        assert_eq!(ColumnType::Timespan.to_string(), "timespan");
    }

    #[test]
    fn test_decode_null_for_every_type() {
        for t in [
            ColumnType::Bool,
            ColumnType::String,
            ColumnType::DateTime,
            ColumnType::Decimal,
            ColumnType::Dynamic,
            ColumnType::Guid,
            ColumnType::Int,
            ColumnType::Long,
            ColumnType::Real,
            ColumnType::Timespan,
            ColumnType::Short,
        ] {
            assert!(t.decode(&Value::Null).unwrap().is_null(), "{t}");
        }
    }

    #[test]
    fn test_decode_integers_respect_width() {
        assert_eq!(ColumnType::Int.decode(&json!(42)).unwrap(), KustoValue::Int(42));
        assert!(ColumnType::Int.decode(&json!(5_000_000_000i64)).is_err());
        assert_eq!(
            ColumnType::Long.decode(&json!(5_000_000_000i64)).unwrap(),
            KustoValue::Long(5_000_000_000)
        );
        assert!(ColumnType::Short.decode(&json!(40_000)).is_err());
        assert!(ColumnType::Long.decode(&json!("12")).is_err());
    }

    #[test]
    fn test_decode_real_special_values() {
        assert_eq!(ColumnType::Real.decode(&json!(1.5)).unwrap(), KustoValue::Real(1.5));
        match ColumnType::Real.decode(&json!("NaN")).unwrap() {
            KustoValue::Real(v) => assert!(v.is_nan()),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            ColumnType::Real.decode(&json!("-Infinity")).unwrap(),
            KustoValue::Real(f64::NEG_INFINITY)
        );
    }

    #[test]
    fn test_decode_guid() {
        let value = ColumnType::Guid
            .decode(&json!("74be27de-1e4e-49d9-b579-fe0b331d3642"))
            .unwrap();
        assert_eq!(
            value,
            KustoValue::Guid(Uuid::parse_str("74be27de-1e4e-49d9-b579-fe0b331d3642").unwrap())
        );

        let err = ColumnType::Guid.decode(&json!("not-a-guid")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidFormat { .. }));
    }

    #[test]
    fn test_decode_dynamic_preserves_shape() {
        let inline = json!({"a": [1, 2, {"b": null}]});
        assert_eq!(
            ColumnType::Dynamic.decode(&inline).unwrap(),
            KustoValue::Dynamic(inline.clone())
        );

        let encoded = json!(r#"{"a": [1, 2, {"b": null}]}"#);
        assert_eq!(
            ColumnType::Dynamic.decode(&encoded).unwrap(),
            KustoValue::Dynamic(inline)
        );

        let scalar = json!("just text");
        assert_eq!(
            ColumnType::Dynamic.decode(&scalar).unwrap(),
            KustoValue::Dynamic(scalar.clone())
        );
    }

    #[test]
    fn test_decimal_keeps_text() {
        let d: KustoDecimal = "123.4500".parse().unwrap();
        assert_eq!(d.as_str(), "123.4500");
        assert!((d.to_f64() - 123.45).abs() < 1e-9);

        assert_eq!(
            ColumnType::Decimal.decode(&json!(2.5)).unwrap(),
            KustoValue::Decimal("2.5".parse().unwrap())
        );
        assert!("12,5".parse::<KustoDecimal>().is_err());
    }

    #[test]
    fn test_decode_bool_forms() {
        assert_eq!(ColumnType::Bool.decode(&json!(true)).unwrap(), KustoValue::Bool(true));
        assert_eq!(ColumnType::Bool.decode(&json!(0)).unwrap(), KustoValue::Bool(false));
        assert_eq!(ColumnType::Bool.decode(&json!("True")).unwrap(), KustoValue::Bool(true));
        assert!(ColumnType::Bool.decode(&json!(2)).is_err());
    }
}

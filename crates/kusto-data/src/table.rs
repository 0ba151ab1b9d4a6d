//! A single decoded result table with a forward-only cursor.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, ErrorKind, Result};
use crate::types::{Column, ColumnType, KustoDecimal, KustoValue};

/// Something that identifies a column: an ordinal or an exact name.
pub trait ColumnIndex {
    /// Resolve to a zero-based ordinal.
    fn resolve(&self, columns: &[Column]) -> Result<usize>;
}

impl ColumnIndex for usize {
    fn resolve(&self, columns: &[Column]) -> Result<usize> {
        if *self < columns.len() {
            Ok(*self)
        } else {
            Err(Error::new(ErrorKind::ColumnIndexOutOfRange {
                index: *self,
                count: columns.len(),
            }))
        }
    }
}

impl ColumnIndex for &str {
    fn resolve(&self, columns: &[Column]) -> Result<usize> {
        find_column(columns, self)
            .ok_or_else(|| Error::new(ErrorKind::ColumnNotFound(self.to_string())))
    }
}

impl ColumnIndex for &String {
    fn resolve(&self, columns: &[Column]) -> Result<usize> {
        self.as_str().resolve(columns)
    }
}

fn find_column(columns: &[Column], name: &str) -> Option<usize> {
    columns.iter().position(|c| c.name == name)
}

/// One table of a tabular response.
///
/// Rows are immutable once constructed; only the cursor moves. The cursor
/// starts before the first row and never leaves `[-1, row_count]`.
#[derive(Debug, Clone)]
pub struct ResultTable {
    name: String,
    id: Option<i64>,
    kind: Option<String>,
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
    cursor: isize,
}

impl ResultTable {
    /// Build a table from its JSON object.
    ///
    /// Fails if a column lacks its name or type, if a row is misaligned
    /// with the columns, or if any row carries inline service exceptions.
    pub fn from_json(table: &Value) -> Result<Self> {
        let object = table.as_object().ok_or_else(|| {
            Error::new(ErrorKind::InvalidEnvelope(
                "table is not a JSON object".to_string(),
            ))
        })?;

        let id = object.get("TableId").and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });
        let name = match (object.get("TableName").and_then(Value::as_str), id) {
            (Some(name), _) => name.to_string(),
            (None, Some(id)) => format!("Table_{}", id),
            (None, None) => return Err(missing("TableName")),
        };
        let kind = object
            .get("TableKind")
            .and_then(Value::as_str)
            .map(str::to_string);

        let columns = object
            .get("Columns")
            .and_then(Value::as_array)
            .ok_or_else(|| missing("Columns"))?
            .iter()
            .map(parse_column)
            .collect::<Result<Vec<_>>>()?;

        let raw_rows = object
            .get("Rows")
            .and_then(Value::as_array)
            .ok_or_else(|| missing("Rows"))?;

        let mut rows = Vec::with_capacity(raw_rows.len());
        let mut exceptions = Vec::new();

        for (index, row) in raw_rows.iter().enumerate() {
            match row {
                Value::Array(values) if values.len() == columns.len() => rows.push(values.clone()),
                Value::Array(values) => {
                    return Err(Error::new(ErrorKind::InvalidRow {
                        index,
                        reason: format!(
                            "expected {} value(s), found {}",
                            columns.len(),
                            values.len()
                        ),
                    }))
                }
                Value::Object(map)
                    if map.contains_key("Exceptions") || map.contains_key("OneApiErrors") =>
                {
                    exceptions.extend(collect_exceptions(row));
                }
                _ => {
                    return Err(Error::new(ErrorKind::InvalidRow {
                        index,
                        reason: "row is neither an array nor an exception record".to_string(),
                    }))
                }
            }
        }

        if !exceptions.is_empty() {
            return Err(Error::new(ErrorKind::ServiceExceptions(exceptions)));
        }

        Ok(Self {
            name,
            id,
            kind,
            columns,
            rows,
            cursor: -1,
        })
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table id, when the envelope carries one.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Table kind (`PrimaryResult`, `QueryProperties`, ...), v2 only.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Declared columns in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Ordinal of the first column with exactly this name.
    pub fn find_column(&self, name: &str) -> Option<usize> {
        find_column(&self.columns, name)
    }

    /// Like [`find_column`](Self::find_column), but an unknown name is an error.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        name.resolve(&self.columns)
    }

    /// Advance to the next row. Returns false once past the last row.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        let len = self.rows.len() as isize;
        if self.cursor < len {
            self.cursor += 1;
        }
        self.cursor < len
    }

    /// Rewind and advance to the first row.
    pub fn first(&mut self) -> bool {
        self.reset();
        self.next()
    }

    /// Move the cursor back before the first row.
    pub fn reset(&mut self) {
        self.cursor = -1;
    }

    /// Index of the current row, if the cursor is on one.
    pub fn position(&self) -> Option<usize> {
        usize::try_from(self.cursor)
            .ok()
            .filter(|&i| i < self.rows.len())
    }

    /// The row under the cursor.
    pub fn current(&self) -> Result<Row<'_>> {
        self.position()
            .map(|i| self.row_at(i))
            .ok_or_else(|| Error::new(ErrorKind::NoCurrentRow))
    }

    /// Snapshot of row `index`, independent of the cursor.
    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        (index < self.rows.len()).then(|| self.row_at(index))
    }

    /// Snapshots of every row, independent of the cursor.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = Row<'_>> + '_ {
        (0..self.rows.len()).map(move |i| self.row_at(i))
    }

    fn row_at(&self, index: usize) -> Row<'_> {
        Row {
            index,
            columns: &self.columns,
            values: &self.rows[index],
        }
    }
}

macro_rules! cursor_getters {
    ($($name:ident => $ty:ty),* $(,)?) => {
        impl ResultTable {
            $(
                #[doc = concat!("Read the current row; see [`Row::", stringify!($name), "`].")]
                pub fn $name<C: ColumnIndex>(&self, column: C) -> Result<$ty> {
                    self.current()?.$name(column)
                }
            )*
        }
    };
}

cursor_getters! {
    get_value => KustoValue,
    is_null => bool,
    get_bool_opt => Option<bool>,
    get_bool => bool,
    get_i16_opt => Option<i16>,
    get_i16 => i16,
    get_i32_opt => Option<i32>,
    get_i32 => i32,
    get_i64_opt => Option<i64>,
    get_i64 => i64,
    get_f64_opt => Option<f64>,
    get_f64 => f64,
    get_decimal_opt => Option<KustoDecimal>,
    get_decimal => KustoDecimal,
    get_string_opt => Option<String>,
    get_string => String,
    get_datetime_opt => Option<DateTime<Utc>>,
    get_datetime => DateTime<Utc>,
    get_naive_datetime_opt => Option<NaiveDateTime>,
    get_naive_datetime => NaiveDateTime,
    get_timespan_opt => Option<TimeDelta>,
    get_timespan => TimeDelta,
    get_guid_opt => Option<Uuid>,
    get_guid => Uuid,
    get_dynamic_opt => Option<Value>,
    get_dynamic => Value,
}

/// A borrowed view of one row.
///
/// `_opt` accessors return `None` for null cells; the plain accessors fail
/// with a null-value error instead. Reading a column through an accessor
/// narrower than its declared type fails with an invalid-cast error.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    index: usize,
    columns: &'a [Column],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    /// Zero-based row index within its table.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Raw JSON cells.
    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    /// Decode the cell according to its declared type.
    pub fn get_value<C: ColumnIndex>(&self, column: C) -> Result<KustoValue> {
        let (column, raw) = self.cell(column)?;
        column.column_type.decode(raw)
    }

    /// Every cell decoded in column order.
    pub fn decoded(&self) -> Result<Vec<KustoValue>> {
        self.columns
            .iter()
            .zip(self.values)
            .map(|(column, raw)| column.column_type.decode(raw))
            .collect()
    }

    /// Whether the cell is null.
    pub fn is_null<C: ColumnIndex>(&self, column: C) -> Result<bool> {
        Ok(self.get_value(column)?.is_null())
    }

    /// The `bool` cell, or `None` when null.
    pub fn get_bool_opt<C: ColumnIndex>(&self, column: C) -> Result<Option<bool>> {
        self.read(column, &[ColumnType::Bool], "bool", |v| match v {
            KustoValue::Bool(b) => Some(b),
            _ => None,
        })
    }

    /// The `bool` cell; fails on null.
    pub fn get_bool<C: ColumnIndex>(&self, column: C) -> Result<bool> {
        self.required(column, Self::get_bool_opt)
    }

    /// A `short` cell as `i16`, or `None` when null.
    pub fn get_i16_opt<C: ColumnIndex>(&self, column: C) -> Result<Option<i16>> {
        self.read(column, &[ColumnType::Short], "i16", |v| match v {
            KustoValue::Short(n) => Some(n),
            _ => None,
        })
    }

    /// A `short` cell as `i16`; fails on null.
    pub fn get_i16<C: ColumnIndex>(&self, column: C) -> Result<i16> {
        self.required(column, Self::get_i16_opt)
    }

    /// An `int` or `short` cell widened to `i32`, or `None` when null.
    pub fn get_i32_opt<C: ColumnIndex>(&self, column: C) -> Result<Option<i32>> {
        self.read(column, &[ColumnType::Int, ColumnType::Short], "i32", |v| match v {
            KustoValue::Int(n) => Some(n),
            KustoValue::Short(n) => Some(i32::from(n)),
            _ => None,
        })
    }

    /// An `int` or `short` cell widened to `i32`; fails on null.
    pub fn get_i32<C: ColumnIndex>(&self, column: C) -> Result<i32> {
        self.required(column, Self::get_i32_opt)
    }

    /// Any integer cell widened to `i64`, or `None` when null.
    pub fn get_i64_opt<C: ColumnIndex>(&self, column: C) -> Result<Option<i64>> {
        self.read(
            column,
            &[ColumnType::Long, ColumnType::Int, ColumnType::Short],
            "i64",
            |v| match v {
                KustoValue::Long(n) => Some(n),
                KustoValue::Int(n) => Some(i64::from(n)),
                KustoValue::Short(n) => Some(i64::from(n)),
                _ => None,
            },
        )
    }

    /// Any integer cell widened to `i64`; fails on null.
    pub fn get_i64<C: ColumnIndex>(&self, column: C) -> Result<i64> {
        self.required(column, Self::get_i64_opt)
    }

    /// A `real` cell, or an `int`/`short` widened to `f64`. `None` when null.
    pub fn get_f64_opt<C: ColumnIndex>(&self, column: C) -> Result<Option<f64>> {
        self.read(
            column,
            &[ColumnType::Real, ColumnType::Int, ColumnType::Short],
            "f64",
            |v| match v {
                KustoValue::Real(n) => Some(n),
                KustoValue::Int(n) => Some(f64::from(n)),
                KustoValue::Short(n) => Some(f64::from(n)),
                _ => None,
            },
        )
    }

    /// Like [`Row::get_f64_opt`], failing on null.
    pub fn get_f64<C: ColumnIndex>(&self, column: C) -> Result<f64> {
        self.required(column, Self::get_f64_opt)
    }

    /// A `decimal` cell, or an integer cell as its exact decimal text.
    pub fn get_decimal_opt<C: ColumnIndex>(&self, column: C) -> Result<Option<KustoDecimal>> {
        self.read(
            column,
            &[
                ColumnType::Decimal,
                ColumnType::Long,
                ColumnType::Int,
                ColumnType::Short,
            ],
            "decimal",
            |v| match v {
                KustoValue::Decimal(d) => Some(d),
                KustoValue::Long(n) => n.to_string().parse().ok(),
                KustoValue::Int(n) => n.to_string().parse().ok(),
                KustoValue::Short(n) => n.to_string().parse().ok(),
                _ => None,
            },
        )
    }

    /// Like [`Row::get_decimal_opt`], failing on null.
    pub fn get_decimal<C: ColumnIndex>(&self, column: C) -> Result<KustoDecimal> {
        self.required(column, Self::get_decimal_opt)
    }

    /// The `string` cell, or `None` when null.
    pub fn get_string_opt<C: ColumnIndex>(&self, column: C) -> Result<Option<String>> {
        self.read(column, &[ColumnType::String], "string", |v| match v {
            KustoValue::String(s) => Some(s),
            _ => None,
        })
    }

    /// The `string` cell; fails on null.
    pub fn get_string<C: ColumnIndex>(&self, column: C) -> Result<String> {
        self.required(column, Self::get_string_opt)
    }

    /// The `datetime` cell in UTC, keeping 100ns precision.
    pub fn get_datetime_opt<C: ColumnIndex>(&self, column: C) -> Result<Option<DateTime<Utc>>> {
        self.read(column, &[ColumnType::DateTime], "datetime", |v| match v {
            KustoValue::DateTime(d) => Some(d),
            _ => None,
        })
    }

    /// Like [`Row::get_datetime_opt`], failing on null.
    pub fn get_datetime<C: ColumnIndex>(&self, column: C) -> Result<DateTime<Utc>> {
        self.required(column, Self::get_datetime_opt)
    }

    /// The datetime as a zone-less UTC timestamp, as SQL drivers expect.
    pub fn get_naive_datetime_opt<C: ColumnIndex>(
        &self,
        column: C,
    ) -> Result<Option<NaiveDateTime>> {
        Ok(self.get_datetime_opt(column)?.map(|d| d.naive_utc()))
    }

    /// Like [`Row::get_naive_datetime_opt`], failing on null.
    pub fn get_naive_datetime<C: ColumnIndex>(&self, column: C) -> Result<NaiveDateTime> {
        self.required(column, Self::get_naive_datetime_opt)
    }

    /// The `timespan` cell, or `None` when null.
    pub fn get_timespan_opt<C: ColumnIndex>(&self, column: C) -> Result<Option<TimeDelta>> {
        self.read(column, &[ColumnType::Timespan], "timespan", |v| match v {
            KustoValue::Timespan(t) => Some(t),
            _ => None,
        })
    }

    /// The `timespan` cell; fails on null.
    pub fn get_timespan<C: ColumnIndex>(&self, column: C) -> Result<TimeDelta> {
        self.required(column, Self::get_timespan_opt)
    }

    /// The `guid` cell, or `None` when null.
    pub fn get_guid_opt<C: ColumnIndex>(&self, column: C) -> Result<Option<Uuid>> {
        self.read(column, &[ColumnType::Guid], "guid", |v| match v {
            KustoValue::Guid(g) => Some(g),
            _ => None,
        })
    }

    /// The `guid` cell; fails on null.
    pub fn get_guid<C: ColumnIndex>(&self, column: C) -> Result<Uuid> {
        self.required(column, Self::get_guid_opt)
    }

    /// The `dynamic` cell as JSON. String-encoded JSON is parsed.
    pub fn get_dynamic_opt<C: ColumnIndex>(&self, column: C) -> Result<Option<Value>> {
        self.read(column, &[ColumnType::Dynamic], "dynamic", |v| match v {
            KustoValue::Dynamic(d) => Some(d),
            _ => None,
        })
    }

    /// Like [`Row::get_dynamic_opt`], failing on null.
    pub fn get_dynamic<C: ColumnIndex>(&self, column: C) -> Result<Value> {
        self.required(column, Self::get_dynamic_opt)
    }

    fn cell<C: ColumnIndex>(&self, column: C) -> Result<(&'a Column, &'a Value)> {
        let (columns, values) = (self.columns, self.values);
        let ordinal = column.resolve(columns)?;
        Ok((&columns[ordinal], &values[ordinal]))
    }

    fn read<C, T>(
        &self,
        column: C,
        accepted: &[ColumnType],
        requested: &'static str,
        extract: impl FnOnce(KustoValue) -> Option<T>,
    ) -> Result<Option<T>>
    where
        C: ColumnIndex,
    {
        let (column, raw) = self.cell(column)?;
        let cast_error = || {
            Error::new(ErrorKind::InvalidCast {
                column: column.name.clone(),
                declared: column.column_type,
                requested,
            })
        };

        if !accepted.contains(&column.column_type) {
            return Err(cast_error());
        }

        match column.column_type.decode(raw)? {
            KustoValue::Null => Ok(None),
            value => extract(value).map(Some).ok_or_else(cast_error),
        }
    }

    fn required<C, T>(&self, column: C, read: fn(&Self, C) -> Result<Option<T>>) -> Result<T>
    where
        C: ColumnIndex,
    {
        let name = self.column_name(&column);
        read(self, column)?.ok_or_else(|| Error::new(ErrorKind::NullValue { column: name }))
    }

    fn column_name<C: ColumnIndex>(&self, column: &C) -> String {
        column
            .resolve(self.columns)
            .map(|i| self.columns[i].name.clone())
            .unwrap_or_default()
    }
}

fn missing(property: &str) -> Error {
    Error::new(ErrorKind::MissingProperty(property.to_string()))
}

fn parse_column(value: &Value) -> Result<Column> {
    let name = value
        .get("ColumnName")
        .and_then(Value::as_str)
        .ok_or_else(|| missing("ColumnName"))?;

    let type_name = ["ColumnType", "DataType"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .ok_or_else(|| missing("ColumnType"))?;

    Ok(Column::new(name, type_name.parse()?))
}

/// Messages from an `Exceptions` list or a `OneApiErrors` list.
pub(crate) fn collect_exceptions(row: &Value) -> Vec<String> {
    let mut messages = Vec::new();

    if let Some(items) = row.get("Exceptions").and_then(Value::as_array) {
        messages.extend(items.iter().map(|item| match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }));
    }

    if let Some(items) = row.get("OneApiErrors").and_then(Value::as_array) {
        messages.extend(items.iter().map(|item| {
            item.get("error")
                .and_then(|e| e.get("@message").or_else(|| e.get("message")))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| item.to_string())
        }));
    }

    messages
}

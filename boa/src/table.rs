//! Tabular query results.
//!
//! A [`ResultTable`] holds the column names reported by the server and one
//! [`Value`] per column for every row. Tables are never edited in place;
//! operations such as [`ResultTable::without_columns`] return a new table.

use std::fmt;

use chrono::NaiveDateTime;

/// Timestamp layouts used by the archive, e.g. `2019-04-27 07:49:11.688`.
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Infer a typed value from a text cell.
    ///
    /// Empty cells are null. `true`/`false` become booleans. A cell becomes
    /// a number only if the number displays as exactly the same text, so
    /// codes such as `007`, `1.10` or `NaN` stay text.
    pub fn infer(cell: &str) -> Self {
        if cell.is_empty() {
            return Value::Null;
        }
        match cell {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(i) = cell.parse::<i64>() {
            if i.to_string() == cell {
                return Value::Int(i);
            }
        }
        if let Ok(x) = cell.parse::<f64>() {
            if x.is_finite() && x.to_string() == cell {
                return Value::Float(x);
            }
        }
        Value::Text(cell.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as a float. Integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Reinterpret a text cell as a timestamp. Anything else is returned unchanged.
    fn into_timestamp(self) -> Self {
        match self {
            Value::Text(s) => match parse_timestamp(&s) {
                Some(t) => Value::Timestamp(t),
                None => Value::Text(s),
            },
            other => other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S%.3f")),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
}

/// The result of a single query: ordered columns and ordered rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultTable {
    /// Build a table from column names and rows.
    ///
    /// # Panics
    ///
    /// Panics if any row does not have exactly one value per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(
                row.len(),
                columns.len(),
                "row {i} has {} values for {} columns",
                row.len(),
                columns.len()
            );
        }
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |values| Row {
            columns: &self.columns,
            values,
        })
    }

    /// All values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// A copy of this table without the named columns.
    ///
    /// Names that are not present are ignored.
    pub fn without_columns(&self, names: &[&str]) -> Self {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|&i| !names.contains(&self.columns[i].as_str()))
            .collect();

        let columns = keep.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Self { columns, rows }
    }

    /// Convert text cells to timestamps in every column whose name contains
    /// `time` (case-insensitive). Cells that do not parse are left as text.
    pub fn with_parsed_times(self) -> Self {
        let time_columns: Vec<bool> = self
            .columns
            .iter()
            .map(|c| c.to_lowercase().contains("time"))
            .collect();

        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&time_columns)
                    .map(|(value, &is_time)| {
                        if is_time {
                            value.into_timestamp()
                        } else {
                            value
                        }
                    })
                    .collect()
            })
            .collect();

        Self {
            columns: self.columns,
            rows,
        }
    }
}

/// A borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    /// Value of the named column.
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

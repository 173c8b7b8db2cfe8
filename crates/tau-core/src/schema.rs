//! Row schema: field names resolved to indices once, rows read by index.
//!
//! Every column is stored as `f64` (booleans as 0/1, integers exactly), the
//! same flattening the ntuple branch readers apply. Name lookups happen when
//! a predicate or binding is built; the per-event path only indexes slices.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use crate::{Error, Result};

/// Ordered set of column names.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Build a schema; duplicate names are a configuration error.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Schema::default();
        for name in names {
            let name = name.into();
            if schema.index.contains_key(&name) {
                return Err(Error::config(format!("duplicate column '{name}' in schema")));
            }
            schema.index.insert(name.clone(), schema.names.len());
            schema.names.push(name);
        }
        Ok(schema)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Column names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// True if a column with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Resolve a column name to a [`Field`] handle.
    pub fn field(&self, name: &str) -> Result<Field> {
        self.index
            .get(name)
            .map(|&index| Field { index, name: Arc::from(name) })
            .ok_or_else(|| Error::Schema { field: name.to_string() })
    }
}

/// Resolved column handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    index: usize,
    name: Arc<str>,
}

impl Field {
    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column position in the schema.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Borrowed view of one event.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    entry: u64,
    values: &'a [f64],
}

impl<'a> Row<'a> {
    /// Wrap a slice of column values for entry number `entry`.
    pub fn new(entry: u64, values: &'a [f64]) -> Self {
        Self { entry, values }
    }

    /// Entry number of the event in its source.
    pub fn entry(&self) -> u64 {
        self.entry
    }

    /// Finite value of a field; NaN/inf raise [`Error::Data`]. A field the
    /// row does not have (resolved against another schema) is
    /// [`Error::Schema`].
    pub fn get(&self, field: &Field) -> Result<f64> {
        let v = *self
            .values
            .get(field.index)
            .ok_or_else(|| Error::Schema { field: field.name().to_string() })?;
        if v.is_finite() {
            Ok(v)
        } else {
            Err(Error::Data { entry: self.entry, field: field.name().to_string(), value: v })
        }
    }

    /// Boolean view of a flag column (non-zero is true).
    pub fn flag(&self, field: &Field) -> Result<bool> {
        Ok(self.get(field)? != 0.0)
    }

    /// Integer view of a count column; a fractional value is
    /// [`Error::Data`].
    pub fn count(&self, field: &Field) -> Result<i64> {
        let v = self.get(field)?;
        if v.fract() != 0.0 {
            return Err(Error::Data { entry: self.entry, field: field.name().to_string(), value: v });
        }
        Ok(v as i64)
    }
}

/// In-memory row-major event table.
#[derive(Debug, Clone)]
pub struct EventTable {
    schema: Schema,
    values: Vec<f64>,
}

impl EventTable {
    /// Empty table with the given schema.
    pub fn new(schema: Schema) -> Self {
        Self { schema, values: Vec::new() }
    }

    /// Build from column-major data; all columns must have the same length.
    pub fn from_columns(schema: Schema, columns: &[Vec<f64>]) -> Result<Self> {
        if columns.len() != schema.len() {
            return Err(Error::config(format!(
                "expected {} columns, got {}",
                schema.len(),
                columns.len()
            )));
        }
        let n_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        for (name, col) in schema.names().iter().zip(columns) {
            if col.len() != n_rows {
                return Err(Error::config(format!(
                    "column '{name}' has {} rows, expected {n_rows}",
                    col.len()
                )));
            }
        }
        let width = schema.len();
        let mut values = vec![0.0; n_rows * width];
        for (j, col) in columns.iter().enumerate() {
            for (i, &v) in col.iter().enumerate() {
                values[i * width + j] = v;
            }
        }
        Ok(Self { schema, values })
    }

    /// Append one row.
    pub fn push_row(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.schema.len() {
            return Err(Error::config(format!(
                "row has {} values, schema has {} columns",
                row.len(),
                self.schema.len()
            )));
        }
        self.values.extend_from_slice(row);
        Ok(())
    }

    /// Table schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        if self.schema.is_empty() { 0 } else { self.values.len() / self.schema.len() }
    }

    /// True if the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row `i`.
    pub fn row(&self, i: usize) -> Row<'_> {
        let w = self.schema.len();
        Row::new(i as u64, &self.values[i * w..(i + 1) * w])
    }

    /// All rows in source order.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows_in(0..self.len())
    }

    /// Rows with entry numbers in `range`.
    pub fn rows_in(&self, range: Range<usize>) -> impl Iterator<Item = Row<'_>> {
        range.map(move |i| self.row(i))
    }
}

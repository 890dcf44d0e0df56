use crate::error::{DashError, Result};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// Inferred type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Numeric,
    Text,
    Date,
    Boolean,
}

impl ColumnType {
    /// Text and boolean columns can be used as categories
    pub fn is_categorical(self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::Boolean)
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Text => "text",
            ColumnType::Date => "date",
            ColumnType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
    Date(NaiveDate),
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Ordering used when sorting keys: nulls first, then by variant, then by value.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Number(_) => 2,
                Value::Date(_) => 3,
                Value::Text(_) => 4,
            }
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A named, homogeneously typed column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    kind: ColumnType,
    values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnType {
        self.kind
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Non-null numeric cells, in row order
    pub fn numbers(&self) -> Vec<f64> {
        self.values.iter().filter_map(Value::as_f64).collect()
    }

    fn take(&self, indices: &[usize]) -> Column {
        Column {
            name: self.name.clone(),
            kind: self.kind,
            values: indices.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }
}

/// Columnar in-memory table. Immutable once built: every operation that
/// narrows or reshapes it returns a new, independently owned table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    /// Build a table, checking that all columns have the same length and distinct names
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let row_count = columns.first().map(Column::len).unwrap_or(0);

        let mut seen = HashSet::new();
        for col in &columns {
            if col.len() != row_count {
                return Err(DashError::Validation(format!(
                    "Column '{}' has {} rows, expected {}",
                    col.name,
                    col.len(),
                    row_count
                )));
            }
            if !seen.insert(col.name.to_lowercase()) {
                return Err(DashError::Validation(format!(
                    "Duplicate column name '{}'",
                    col.name
                )));
            }
        }

        Ok(Self { columns, row_count })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    pub fn column_types(&self) -> Vec<(&str, ColumnType)> {
        self.columns.iter().map(|c| (c.name(), c.kind())).collect()
    }

    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.kind() == ColumnType::Numeric)
            .map(|c| c.name())
            .collect()
    }

    /// Case-insensitive column lookup
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    /// Look a column up on behalf of `target`, failing with a binding error if it is absent
    pub fn require_column(&self, name: &str, target: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| DashError::binding(target, name, "column not found in table"))
    }

    pub fn row(&self, index: usize) -> Vec<&Value> {
        self.columns.iter().map(|c| &c.values[index]).collect()
    }

    /// Distinct non-null values of a column in order of first appearance
    pub fn unique_values(&self, name: &str) -> Result<Vec<Value>> {
        let col = self.require_column(name, "unique values")?;
        Ok(distinct(col.values().iter()))
    }

    /// New table holding the given rows (in the given order)
    pub fn take_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            row_count: indices.len(),
        }
    }

    pub fn head(&self, n: usize) -> Table {
        let indices: Vec<usize> = (0..self.row_count.min(n)).collect();
        self.take_rows(&indices)
    }

    /// Projection onto the named columns, in the requested order
    pub fn select_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let col = self.require_column(name.as_ref(), "column selection")?;
            columns.push(col.clone());
        }
        Table::new(columns)
    }

    /// Re-type a column as text. Only used while a freshly loaded table is being normalised.
    pub(crate) fn coerce_to_text(mut self, name: &str) -> Table {
        if let Some(idx) = self.column_index(name) {
            let col = &mut self.columns[idx];
            if col.kind != ColumnType::Text {
                col.kind = ColumnType::Text;
                for v in col.values.iter_mut() {
                    if !v.is_null() {
                        *v = Value::Text(v.to_string());
                    }
                }
            }
        }
        self
    }
}

/// Distinct non-null values in order of first appearance
pub(crate) fn distinct<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<Value> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for v in values {
        if v.is_null() {
            continue;
        }
        if seen.insert(v.to_string()) {
            out.push(v.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(values: &[&str]) -> Vec<Value> {
        values.iter().map(|s| Value::Text(s.to_string())).collect()
    }

    fn make_table() -> Table {
        Table::new(vec![
            Column::new("Region", ColumnType::Text, text(&["East", "West", "East"])),
            Column::new(
                "Sales",
                ColumnType::Numeric,
                vec![Value::Number(1.0), Value::Number(2.5), Value::Null],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_new_rejects_ragged_columns() {
        let result = Table::new(vec![
            Column::new("a", ColumnType::Text, text(&["x"])),
            Column::new("b", ColumnType::Text, text(&["x", "y"])),
        ]);
        assert!(matches!(result, Err(DashError::Validation(_))));
    }

    #[test]
    fn test_new_rejects_duplicate_names() {
        let result = Table::new(vec![
            Column::new("a", ColumnType::Text, text(&["x"])),
            Column::new("A", ColumnType::Text, text(&["y"])),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_column_lookup_is_case_insensitive() {
        let table = make_table();
        assert_eq!(table.column_index("sales"), Some(1));
        assert!(table.column("REGION").is_some());
        assert!(table.column("Profit").is_none());
    }

    #[test]
    fn test_unique_values_first_appearance() {
        let table = make_table();
        let values = table.unique_values("Region").unwrap();
        assert_eq!(values, text(&["East", "West"]));
    }

    #[test]
    fn test_take_rows_copies() {
        let table = make_table();
        let sub = table.take_rows(&[2, 0]);
        assert_eq!(sub.row_count(), 2);
        assert_eq!(sub.row(0), table.row(2));
        assert_eq!(sub.row(1), table.row(0));
    }

    #[test]
    fn test_select_columns_missing() {
        let table = make_table();
        let err = table.select_columns(&["Region", "Profit"]).unwrap_err();
        assert!(matches!(err, DashError::IncompatibleBinding { .. }));
    }

    #[test]
    fn test_coerce_to_text() {
        let table = Table::new(vec![Column::new(
            "Postal",
            ColumnType::Numeric,
            vec![Value::Number(10001.0), Value::Null],
        )])
        .unwrap()
        .coerce_to_text("Postal");
        let col = table.column("Postal").unwrap();
        assert_eq!(col.kind(), ColumnType::Text);
        assert_eq!(col.values()[0], Value::Text("10001".to_string()));
        assert_eq!(col.values()[1], Value::Null);
    }

    #[test]
    fn test_value_ordering() {
        let mut values = vec![
            Value::Text("b".into()),
            Value::Number(2.0),
            Value::Null,
            Value::Number(-1.0),
            Value::Text("a".into()),
        ];
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Number(-1.0),
                Value::Number(2.0),
                Value::Text("a".into()),
                Value::Text("b".into()),
            ]
        );
    }
}

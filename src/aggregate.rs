use crate::error::{DashError, PipelineWarning, Result};
use crate::table::{Column, ColumnType, Table, Value};
use chrono::{Datelike, NaiveDate};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One group-by dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    /// Group on the raw values of a column
    Column(String),
    /// Calendar month of a date column, labelled `YYYY-MM`
    YearMonth(String),
    /// Month of year of a date column regardless of year, labelled `January`..`December`
    MonthOfYear(String),
}

impl GroupKey {
    pub fn column(name: impl Into<String>) -> Self {
        GroupKey::Column(name.into())
    }

    /// Source column in the input table
    pub fn source(&self) -> &str {
        match self {
            GroupKey::Column(c) | GroupKey::YearMonth(c) | GroupKey::MonthOfYear(c) => c,
        }
    }

    /// Column name in the summary table
    pub fn output_name(&self) -> &str {
        match self {
            GroupKey::Column(c) => c,
            GroupKey::YearMonth(_) => "month_year",
            GroupKey::MonthOfYear(_) => "month",
        }
    }
}

/// Sum `measure` per distinct combination of `group_by`
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationSpec {
    pub group_by: Vec<GroupKey>,
    pub measure: String,
}

impl AggregationSpec {
    pub fn new(group_by: Vec<GroupKey>, measure: impl Into<String>) -> Self {
        Self {
            group_by,
            measure: measure.into(),
        }
    }

    pub fn by_columns(columns: &[&str], measure: impl Into<String>) -> Self {
        Self::new(columns.iter().map(|c| GroupKey::column(*c)).collect(), measure)
    }
}

/// Year + month time bucket. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
}

impl MonthBucket {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

pub fn month_name(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|i| MONTH_NAMES.get(i as usize))
        .copied()
        .unwrap_or("")
}

/// Sortable group key component
#[derive(Debug, Clone, PartialEq)]
enum KeyPart {
    Value(Value),
    Bucket(MonthBucket),
    Month(u32),
}

impl KeyPart {
    fn into_value(self) -> Value {
        match self {
            KeyPart::Value(v) => v,
            KeyPart::Bucket(b) => Value::Text(b.label()),
            KeyPart::Month(m) => Value::Text(month_name(m).to_string()),
        }
    }

    fn label(&self) -> String {
        self.clone().into_value().to_string()
    }
}

impl Eq for KeyPart {}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Value(a), KeyPart::Value(b)) => a.total_cmp(b),
            (KeyPart::Bucket(a), KeyPart::Bucket(b)) => a.cmp(b),
            (KeyPart::Month(a), KeyPart::Month(b)) => a.cmp(b),
            (KeyPart::Value(_), _) => Ordering::Less,
            (_, KeyPart::Value(_)) => Ordering::Greater,
            (KeyPart::Bucket(_), KeyPart::Month(_)) => Ordering::Less,
            (KeyPart::Month(_), KeyPart::Bucket(_)) => Ordering::Greater,
        }
    }
}

struct ResolvedKey<'a> {
    key: &'a GroupKey,
    column: &'a Column,
}

impl ResolvedKey<'_> {
    fn part(&self, row: usize) -> Option<KeyPart> {
        let value = &self.column.values()[row];
        match self.key {
            GroupKey::Column(_) if value.is_null() => None,
            GroupKey::Column(_) => Some(KeyPart::Value(value.clone())),
            GroupKey::YearMonth(_) => value.as_date().map(|d| KeyPart::Bucket(MonthBucket::from_date(d))),
            GroupKey::MonthOfYear(_) => value.as_date().map(|d| KeyPart::Month(d.month())),
        }
    }

    fn output_kind(&self) -> ColumnType {
        match self.key {
            GroupKey::Column(_) => self.column.kind(),
            GroupKey::YearMonth(_) | GroupKey::MonthOfYear(_) => ColumnType::Text,
        }
    }
}

struct Grouped<'a> {
    keys: Vec<ResolvedKey<'a>>,
    sums: BTreeMap<Vec<KeyPart>, f64>,
}

fn group_sums<'a>(table: &'a Table, group_by: &'a [GroupKey], measure: &str) -> Result<Grouped<'a>> {
    const TARGET: &str = "aggregation";

    if group_by.is_empty() {
        return Err(DashError::Validation(
            "aggregation needs at least one group-by column".to_string(),
        ));
    }

    let measure_col = table.require_column(measure, TARGET)?;
    if measure_col.kind() != ColumnType::Numeric {
        return Err(DashError::binding(
            TARGET,
            measure,
            format!("measure must be numeric, found {}", measure_col.kind()),
        ));
    }

    let mut keys = Vec::with_capacity(group_by.len());
    for key in group_by {
        let column = table.require_column(key.source(), TARGET)?;
        if !matches!(key, GroupKey::Column(_)) && column.kind() != ColumnType::Date {
            return Err(DashError::binding(
                TARGET,
                key.source(),
                format!("time bucketing needs a date column, found {}", column.kind()),
            ));
        }
        keys.push(ResolvedKey { key, column });
    }

    let mut sums: BTreeMap<Vec<KeyPart>, f64> = BTreeMap::new();
    'rows: for row in 0..table.row_count() {
        let mut parts = Vec::with_capacity(keys.len());
        for key in &keys {
            match key.part(row) {
                Some(p) => parts.push(p),
                None => continue 'rows,
            }
        }
        let sum = sums.entry(parts).or_insert(0.0);
        if let Some(v) = measure_col.values()[row].as_f64() {
            *sum += v;
        }
    }

    Ok(Grouped { keys, sums })
}

/// Aggregated result: one row per group present in the input, sorted by key
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    keys: Vec<String>,
    measure: String,
    table: Table,
}

impl SummaryTable {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn measure(&self) -> &str {
        &self.measure
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    pub fn row_count(&self) -> usize {
        self.table.row_count()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// (key labels, sum) per row
    pub fn entries(&self) -> Vec<(Vec<String>, f64)> {
        let key_cols: Vec<&Column> = self.table.columns()[..self.keys.len()].iter().collect();
        let sums = &self.table.columns()[self.keys.len()];
        (0..self.table.row_count())
            .map(|row| {
                let labels = key_cols.iter().map(|c| c.values()[row].to_string()).collect();
                (labels, sums.values()[row].as_f64().unwrap_or(0.0))
            })
            .collect()
    }

    pub fn warning(&self, stage: &str) -> Option<PipelineWarning> {
        self.is_empty().then(|| PipelineWarning::EmptyResult {
            stage: stage.to_string(),
        })
    }
}

pub fn aggregate(table: &Table, spec: &AggregationSpec) -> Result<SummaryTable> {
    let grouped = group_sums(table, &spec.group_by, &spec.measure)?;

    let mut key_values: Vec<Vec<Value>> = vec![Vec::with_capacity(grouped.sums.len()); grouped.keys.len()];
    let mut sums = Vec::with_capacity(grouped.sums.len());
    for (parts, sum) in grouped.sums {
        for (slot, part) in key_values.iter_mut().zip(parts) {
            slot.push(part.into_value());
        }
        sums.push(Value::Number(sum));
    }

    let mut columns = Vec::with_capacity(grouped.keys.len() + 1);
    for (key, values) in grouped.keys.iter().zip(key_values) {
        columns.push(Column::new(key.key.output_name(), key.output_kind(), values));
    }
    let measure_name = table
        .require_column(&spec.measure, "aggregation")?
        .name()
        .to_string();
    columns.push(Column::new(measure_name.clone(), ColumnType::Numeric, sums));

    let table = Table::new(columns)?;
    log::debug!(
        "aggregated {} by {:?}: {} groups",
        spec.measure,
        spec.group_by,
        table.row_count()
    );

    Ok(SummaryTable {
        keys: spec.group_by.iter().map(|k| k.output_name().to_string()).collect(),
        measure: measure_name,
        table,
    })
}

/// Two-dimensional sum. Cells without contributing rows are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotTable {
    pub row_key: String,
    pub measure: String,
    pub row_labels: Vec<String>,
    pub column_labels: Vec<String>,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl PivotTable {
    pub fn get(&self, row: &str, column: &str) -> Option<f64> {
        let r = self.row_labels.iter().position(|l| l == row)?;
        let c = self.column_labels.iter().position(|l| l == column)?;
        self.cells[r][c]
    }

    pub fn is_empty(&self) -> bool {
        self.row_labels.is_empty()
    }

    /// Flatten into a table: the row key column followed by one numeric column per column label.
    /// Labels that clash with an earlier name (ignoring case) get a ` (n)` suffix.
    pub fn to_table(&self) -> Result<Table> {
        let mut taken: HashSet<String> = HashSet::new();
        taken.insert(self.row_key.to_lowercase());
        let mut columns = Vec::with_capacity(self.column_labels.len() + 1);
        columns.push(Column::new(
            self.row_key.clone(),
            ColumnType::Text,
            self.row_labels.iter().map(|l| Value::Text(l.clone())).collect(),
        ));
        for (c, label) in self.column_labels.iter().enumerate() {
            let values = self
                .cells
                .iter()
                .map(|row| row[c].map(Value::Number).unwrap_or(Value::Null))
                .collect();
            columns.push(Column::new(unique_name(label, &mut taken), ColumnType::Numeric, values));
        }
        Table::new(columns)
    }
}

fn unique_name(label: &str, taken: &mut HashSet<String>) -> String {
    let mut name = label.to_string();
    let mut n = 2;
    while !taken.insert(name.to_lowercase()) {
        name = format!("{} ({})", label, n);
        n += 1;
    }
    name
}

pub fn pivot(table: &Table, rows: &GroupKey, columns: &GroupKey, measure: &str) -> Result<PivotTable> {
    let keys = [rows.clone(), columns.clone()];
    let grouped = group_sums(table, &keys, measure)?;

    let row_parts: BTreeSet<&KeyPart> = grouped.sums.keys().map(|k| &k[0]).collect();
    let col_parts: BTreeSet<&KeyPart> = grouped.sums.keys().map(|k| &k[1]).collect();
    let row_index: BTreeMap<&KeyPart, usize> = row_parts.iter().enumerate().map(|(i, p)| (*p, i)).collect();
    let col_index: BTreeMap<&KeyPart, usize> = col_parts.iter().enumerate().map(|(i, p)| (*p, i)).collect();

    let mut cells = vec![vec![None; col_parts.len()]; row_parts.len()];
    for (parts, sum) in &grouped.sums {
        cells[row_index[&parts[0]]][col_index[&parts[1]]] = Some(*sum);
    }

    Ok(PivotTable {
        row_key: rows.output_name().to_string(),
        measure: measure.to_string(),
        row_labels: row_parts.iter().map(|p| p.label()).collect(),
        column_labels: col_parts.iter().map(|p| p.label()).collect(),
        cells,
    })
}

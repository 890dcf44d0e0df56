use crate::config::ColumnMap;
use crate::error::{DashError, Result};
use crate::table::{distinct, Column, ColumnType, Table, Value};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::fmt;

/// Levels of the location hierarchy, in their fixed cascade order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Region,
    State,
    City,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Region, Level::State, Level::City];

    /// Levels whose selections constrain the options offered at this level
    pub fn ancestors(self) -> &'static [Level] {
        match self {
            Level::Region => &[],
            Level::State => &[Level::Region],
            Level::City => &[Level::Region, Level::State],
        }
    }

    /// Levels whose options depend on this level's selection
    pub fn descendants(self) -> &'static [Level] {
        match self {
            Level::Region => &[Level::State, Level::City],
            Level::State => &[Level::City],
            Level::City => &[],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Level::Region => "region",
            Level::State => "state",
            Level::City => "city",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive date window. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(DashError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Span from the earliest to the latest date found in `column`
    pub fn of_column(table: &Table, column: &str) -> Result<Self> {
        let col = date_column(table, column)?;
        let mut dates = col.values().iter().filter_map(Value::as_date);
        let first = dates
            .next()
            .ok_or_else(|| DashError::Schema(format!("Column '{}' contains no dates", column)))?;
        let (start, end) = dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Selected values per hierarchy level. An empty level means "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    region: Vec<String>,
    state: Vec<String>,
    city: Vec<String>,
}

impl FilterSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, S>(mut self, level: Level, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(level, values);
        self
    }

    /// Replace the selection at one level. Duplicates are dropped, order is kept.
    pub fn set<I, S>(&mut self, level: Level, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for v in values {
            let v = v.into();
            if !out.contains(&v) {
                out.push(v);
            }
        }
        *self.slot_mut(level) = out;
    }

    pub fn values(&self, level: Level) -> &[String] {
        match level {
            Level::Region => &self.region,
            Level::State => &self.state,
            Level::City => &self.city,
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        Level::ALL.iter().all(|&l| self.values(l).is_empty())
    }

    /// Keep only the values at `level` that appear in `offered`
    pub(crate) fn retain(&mut self, level: Level, offered: &[String]) {
        self.slot_mut(level).retain(|v| offered.contains(v));
    }

    fn slot_mut(&mut self, level: Level) -> &mut Vec<String> {
        match level {
            Level::Region => &mut self.region,
            Level::State => &mut self.state,
            Level::City => &mut self.city,
        }
    }
}

/// Membership test for one hierarchy level
struct LevelPredicate<'a> {
    column: &'a Column,
    allowed: HashSet<&'a str>,
}

impl LevelPredicate<'_> {
    fn accepts(&self, row: usize) -> bool {
        match &self.column.values()[row] {
            Value::Null => false,
            Value::Text(s) => self.allowed.contains(s.as_str()),
            other => self.allowed.contains(other.to_string().as_str()),
        }
    }
}

/// Predicates for the given levels. Levels with an empty selection contribute none.
fn level_predicates<'a>(
    table: &'a Table,
    columns: &ColumnMap,
    selection: &'a FilterSelection,
    levels: &[Level],
) -> Result<Vec<LevelPredicate<'a>>> {
    let mut predicates = Vec::new();
    for &level in levels {
        let chosen = selection.values(level);
        if chosen.is_empty() {
            continue;
        }
        let column = table.require_column(columns.level(level), "hierarchy filter")?;
        predicates.push(LevelPredicate {
            column,
            allowed: chosen.iter().map(String::as_str).collect(),
        });
    }
    Ok(predicates)
}

fn date_column<'a>(table: &'a Table, name: &str) -> Result<&'a Column> {
    let col = table.require_column(name, "date filter")?;
    if col.kind() != ColumnType::Date {
        return Err(DashError::binding(
            "date filter",
            name,
            format!("expected a date column, found {}", col.kind()),
        ));
    }
    Ok(col)
}

fn matching_rows(
    table: &Table,
    columns: &ColumnMap,
    range: &DateRange,
    selection: &FilterSelection,
    levels: &[Level],
) -> Result<Vec<usize>> {
    let dates = date_column(table, &columns.order_date)?;
    let predicates = level_predicates(table, columns, selection, levels)?;

    Ok((0..table.row_count())
        .filter(|&row| {
            dates.values()[row]
                .as_date()
                .map(|d| range.contains(d))
                .unwrap_or(false)
        })
        .filter(|&row| predicates.iter().all(|p| p.accepts(row)))
        .collect())
}

/// Produce the filtered view: rows inside the date window that satisfy every
/// active hierarchy predicate. An empty result is not an error.
pub fn apply(
    table: &Table,
    columns: &ColumnMap,
    range: &DateRange,
    selection: &FilterSelection,
) -> Result<Table> {
    let rows = matching_rows(table, columns, range, selection, &Level::ALL)?;
    log::debug!(
        "filter kept {} of {} rows ({} .. {})",
        rows.len(),
        table.row_count(),
        range.start(),
        range.end()
    );
    if rows.is_empty() {
        log::warn!("filter selection matches no rows");
    }
    Ok(table.take_rows(&rows))
}

/// Values offered for `level`: distinct values among rows in the date window
/// that pass the selections of every earlier level.
pub fn options(
    table: &Table,
    columns: &ColumnMap,
    range: &DateRange,
    selection: &FilterSelection,
    level: Level,
) -> Result<Vec<String>> {
    let rows = matching_rows(table, columns, range, selection, level.ancestors())?;
    let column = table.require_column(columns.level(level), "hierarchy filter")?;
    let values = distinct(rows.iter().map(|&r| &column.values()[r]));
    Ok(values.iter().map(Value::to_string).collect())
}

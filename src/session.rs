use crate::config::ColumnMap;
use crate::error::{DashError, Result};
use crate::filter::{self, DateRange, FilterSelection, Level};
use crate::table::{ColumnType, Table, Value};

/// Owns the loaded table for one session, after the schema has been checked
#[derive(Debug, Clone)]
pub struct TableStore {
    table: Table,
    columns: ColumnMap,
}

impl TableStore {
    /// Check that every required column is present with a usable type.
    /// Categorical columns inferred as something else are re-typed as text.
    pub fn load(table: Table, columns: ColumnMap) -> Result<Self> {
        let mut missing: Vec<&str> = Vec::new();
        let required = columns
            .categorical()
            .into_iter()
            .chain(columns.numeric())
            .chain([columns.order_date.as_str()]);
        for name in required {
            if table.column(name).is_none() {
                missing.push(name);
            }
        }
        if !missing.is_empty() {
            return Err(DashError::Schema(format!(
                "missing required column(s): {}",
                missing.join(", ")
            )));
        }

        expect_type(&table, &columns.order_date, ColumnType::Date)?;
        for name in columns.numeric() {
            expect_type(&table, name, ColumnType::Numeric)?;
        }

        let mut table = table;
        for name in columns.categorical() {
            table = table.coerce_to_text(name);
        }

        log::info!(
            "session loaded {} rows x {} columns",
            table.row_count(),
            table.column_count()
        );
        Ok(Self { table, columns })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.table.column_names()
    }

    pub fn column_types(&self) -> Vec<(&str, ColumnType)> {
        self.table.column_types()
    }

    pub fn unique_values(&self, column: &str) -> Result<Vec<Value>> {
        self.table.unique_values(column)
    }
}

fn expect_type(table: &Table, name: &str, kind: ColumnType) -> Result<()> {
    let found = table
        .column(name)
        .map(|c| c.kind())
        .ok_or_else(|| DashError::Schema(format!("missing required column: {}", name)))?;
    if found != kind {
        return Err(DashError::Schema(format!(
            "column '{}' must be {}, found {}",
            name, kind, found
        )));
    }
    Ok(())
}

/// The explicit context every pipeline call runs against
#[derive(Debug, Clone)]
pub struct Session {
    store: TableStore,
    range: DateRange,
    selection: FilterSelection,
}

impl Session {
    /// Start a session over the full date span of the table, with no hierarchy selection
    pub fn new(store: TableStore) -> Result<Self> {
        let range = DateRange::of_column(store.table(), &store.columns().order_date)?;
        Ok(Self {
            store,
            range,
            selection: FilterSelection::new(),
        })
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub fn date_range(&self) -> &DateRange {
        &self.range
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    /// Move the date window, then drop selections at every level that the
    /// new window no longer offers
    pub fn set_date_range(&mut self, range: DateRange) -> Result<()> {
        self.range = range;
        for level in Level::ALL {
            let offered = self.options(level)?;
            self.selection.retain(level, &offered);
        }
        Ok(())
    }

    /// Replace the selection at `level`, then drop deeper selections that the
    /// new choice no longer offers
    pub fn select<I, S>(&mut self, level: Level, values: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection.set(level, values);
        for &deeper in level.descendants() {
            let offered = self.options(deeper)?;
            self.selection.retain(deeper, &offered);
        }
        Ok(())
    }

    /// Values the selector for `level` should offer right now
    pub fn options(&self, level: Level) -> Result<Vec<String>> {
        filter::options(
            self.store.table(),
            self.store.columns(),
            &self.range,
            &self.selection,
            level,
        )
    }

    /// Rows passing the date window and every active hierarchy predicate
    pub fn filtered(&self) -> Result<Table> {
        filter::apply(
            self.store.table(),
            self.store.columns(),
            &self.range,
            &self.selection,
        )
    }

    /// The date-windowed table with no hierarchy restriction
    pub fn windowed(&self) -> Result<Table> {
        filter::apply(
            self.store.table(),
            self.store.columns(),
            &self.range,
            &FilterSelection::new(),
        )
    }
}

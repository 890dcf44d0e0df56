// Abstract Syntax Tree for the dashboard query language

use crate::chart::Role;
use crate::filter::Level;
use chrono::NaiveDate;

/// A parsed query: stages applied left to right
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub stages: Vec<Stage>,
}

impl Query {
    /// The stage that decides what the query outputs, if any
    pub fn terminal(&self) -> Option<&Stage> {
        self.stages.iter().find(|s| s.is_terminal())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Date window; a missing bound keeps the current one
    Dates {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    /// Hierarchy selection for one level; empty = no restriction
    Select { level: Level, values: Vec<String> },
    /// Column projection of the filtered rows
    Columns(Vec<String>),
    View(String),
    Sum { by: Vec<String>, of: String },
    Monthly { of: String },
    Pivot { rows: String, cols: String, of: String },
    Chart(ChartStage),
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Stage::View(_) | Stage::Sum { .. } | Stage::Monthly { .. } | Stage::Pivot { .. } | Stage::Chart(_)
        )
    }
}

/// `chart(type, role: column, ..., title: "...")`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChartStage {
    pub chart: String,
    pub bindings: Vec<(Role, Vec<String>)>,
    pub title: Option<String>,
    pub fill: Option<String>,
    pub hole: Option<f64>,
    pub bins: Option<usize>,
}

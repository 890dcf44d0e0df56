use crate::aggregate::{aggregate, AggregationSpec, GroupKey};
use crate::error::{DashError, Result};
use crate::stats;
use crate::table::{ColumnType, Table};
use std::fmt;

/// Chart types the dashboard can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartType {
    Bar,
    Line,
    Area,
    Scatter,
    Pie,
    Treemap,
    Histogram,
    Box,
    Violin,
    Density,
    Heatmap,
    Pair,
}

impl ChartType {
    pub const ALL: [ChartType; 12] = [
        ChartType::Bar,
        ChartType::Line,
        ChartType::Area,
        ChartType::Scatter,
        ChartType::Pie,
        ChartType::Treemap,
        ChartType::Histogram,
        ChartType::Box,
        ChartType::Violin,
        ChartType::Density,
        ChartType::Heatmap,
        ChartType::Pair,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Area => "area",
            ChartType::Scatter => "scatter",
            ChartType::Pie => "pie",
            ChartType::Treemap => "treemap",
            ChartType::Histogram => "histogram",
            ChartType::Box => "box",
            ChartType::Violin => "violin",
            ChartType::Density => "density",
            ChartType::Heatmap => "heatmap",
            ChartType::Pair => "pair",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "boxplot" => Some(ChartType::Box),
            "donut" => Some(ChartType::Pie),
            _ => ChartType::ALL.iter().copied().find(|c| c.name() == name),
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The arrangement of columns a chart type needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingShape {
    /// one category + one numeric value
    CategoricalComparison,
    /// one temporal/ordinal x + one numeric y
    Trend,
    /// numeric x + numeric y, optional numeric size and colour grouping
    Relationship,
    /// a single numeric column
    Distribution,
    /// one category + one numeric measure
    PartOfWhole,
    /// ordered categorical levels + one numeric measure
    Hierarchy,
    /// two or more numeric columns
    Matrix,
}

/// Binding slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Category,
    Value,
    X,
    Y,
    Size,
    Color,
    Path,
    Columns,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Category => "category",
            Role::Value => "value",
            Role::X => "x",
            Role::Y => "y",
            Role::Size => "size",
            Role::Color => "color",
            Role::Path => "path",
            Role::Columns => "columns",
        }
    }

    pub const ALL: [Role; 8] = [
        Role::Category,
        Role::Value,
        Role::X,
        Role::Y,
        Role::Size,
        Role::Color,
        Role::Path,
        Role::Columns,
    ];
}

/// Column types a role accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accept {
    Categorical,
    Numeric,
    Ordered,
    Any,
}

impl Accept {
    fn allows(self, kind: ColumnType) -> bool {
        match self {
            Accept::Categorical => kind.is_categorical(),
            Accept::Numeric => kind == ColumnType::Numeric,
            Accept::Ordered => matches!(kind, ColumnType::Date | ColumnType::Numeric | ColumnType::Text),
            Accept::Any => true,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Accept::Categorical => "categorical",
            Accept::Numeric => "numeric",
            Accept::Ordered => "date, numeric or text",
            Accept::Any => "any",
        }
    }
}

struct RoleRule {
    role: Role,
    accept: Accept,
    required: bool,
}

const fn req(role: Role, accept: Accept) -> RoleRule {
    RoleRule { role, accept, required: true }
}

const fn opt(role: Role, accept: Accept) -> RoleRule {
    RoleRule { role, accept, required: false }
}

impl BindingShape {
    fn role_rules(self) -> &'static [RoleRule] {
        const CATEGORY_VALUE: &[RoleRule] = &[req(Role::Category, Accept::Categorical), req(Role::Value, Accept::Numeric)];
        const TREND: &[RoleRule] = &[req(Role::X, Accept::Ordered), req(Role::Y, Accept::Numeric)];
        const RELATIONSHIP: &[RoleRule] = &[
            req(Role::X, Accept::Numeric),
            req(Role::Y, Accept::Numeric),
            opt(Role::Size, Accept::Numeric),
            opt(Role::Color, Accept::Any),
        ];
        const DISTRIBUTION: &[RoleRule] = &[req(Role::Value, Accept::Numeric)];
        const HIERARCHY: &[RoleRule] = &[req(Role::Path, Accept::Categorical), req(Role::Value, Accept::Numeric)];
        const MATRIX: &[RoleRule] = &[opt(Role::Columns, Accept::Numeric)];

        match self {
            BindingShape::CategoricalComparison | BindingShape::PartOfWhole => CATEGORY_VALUE,
            BindingShape::Trend => TREND,
            BindingShape::Relationship => RELATIONSHIP,
            BindingShape::Distribution => DISTRIBUTION,
            BindingShape::Hierarchy => HIERARCHY,
            BindingShape::Matrix => MATRIX,
        }
    }
}

/// Registry entry: chart type → binding shape
pub struct ChartRule {
    pub chart: ChartType,
    pub shape: BindingShape,
}

pub static CHART_RULES: &[ChartRule] = &[
    ChartRule { chart: ChartType::Bar, shape: BindingShape::CategoricalComparison },
    ChartRule { chart: ChartType::Line, shape: BindingShape::Trend },
    ChartRule { chart: ChartType::Area, shape: BindingShape::Trend },
    ChartRule { chart: ChartType::Scatter, shape: BindingShape::Relationship },
    ChartRule { chart: ChartType::Pie, shape: BindingShape::PartOfWhole },
    ChartRule { chart: ChartType::Treemap, shape: BindingShape::Hierarchy },
    ChartRule { chart: ChartType::Histogram, shape: BindingShape::Distribution },
    ChartRule { chart: ChartType::Box, shape: BindingShape::Distribution },
    ChartRule { chart: ChartType::Violin, shape: BindingShape::Distribution },
    ChartRule { chart: ChartType::Density, shape: BindingShape::Distribution },
    ChartRule { chart: ChartType::Heatmap, shape: BindingShape::Matrix },
    ChartRule { chart: ChartType::Pair, shape: BindingShape::Matrix },
];

pub fn rule_for(chart: ChartType) -> Result<&'static ChartRule> {
    CHART_RULES
        .iter()
        .find(|r| r.chart == chart)
        .ok_or_else(|| DashError::Validation(format!("No binding rule registered for {} charts", chart)))
}

/// Column choices for a chart request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    pub category: Option<String>,
    pub value: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub path: Vec<String>,
    pub columns: Vec<String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, c: impl Into<String>) -> Self {
        self.category = Some(c.into());
        self
    }

    pub fn value(mut self, c: impl Into<String>) -> Self {
        self.value = Some(c.into());
        self
    }

    pub fn x(mut self, c: impl Into<String>) -> Self {
        self.x = Some(c.into());
        self
    }

    pub fn y(mut self, c: impl Into<String>) -> Self {
        self.y = Some(c.into());
        self
    }

    pub fn size(mut self, c: impl Into<String>) -> Self {
        self.size = Some(c.into());
        self
    }

    pub fn color(mut self, c: impl Into<String>) -> Self {
        self.color = Some(c.into());
        self
    }

    pub fn path<S: Into<String>>(mut self, levels: impl IntoIterator<Item = S>) -> Self {
        self.path = levels.into_iter().map(Into::into).collect();
        self
    }

    pub fn columns<S: Into<String>>(mut self, cols: impl IntoIterator<Item = S>) -> Self {
        self.columns = cols.into_iter().map(Into::into).collect();
        self
    }

    /// Set a role by name, as used by the query language
    pub fn set(&mut self, role: Role, columns: Vec<String>) {
        let first = columns.first().cloned();
        match role {
            Role::Category => self.category = first,
            Role::Value => self.value = first,
            Role::X => self.x = first,
            Role::Y => self.y = first,
            Role::Size => self.size = first,
            Role::Color => self.color = first,
            Role::Path => self.path = columns,
            Role::Columns => self.columns = columns,
        }
    }

    /// Columns bound to `role`
    pub fn get(&self, role: Role) -> Vec<&str> {
        fn single(o: &Option<String>) -> Vec<&str> {
            o.as_deref().into_iter().collect()
        }
        match role {
            Role::Category => single(&self.category),
            Role::Value => single(&self.value),
            Role::X => single(&self.x),
            Role::Y => single(&self.y),
            Role::Size => single(&self.size),
            Role::Color => single(&self.color),
            Role::Path => self.path.iter().map(String::as_str).collect(),
            Role::Columns => self.columns.iter().map(String::as_str).collect(),
        }
    }
}

/// Presentation settings carried along with a spec
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartOptions {
    pub title: Option<String>,
    pub fill: Option<String>,
    /// Donut hole as a fraction of the radius
    pub hole: Option<f64>,
    pub bins: Option<usize>,
}

/// Declarative chart description with its own copy of the data it draws
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub chart: ChartType,
    pub shape: BindingShape,
    pub encodings: Vec<(Role, String)>,
    pub options: ChartOptions,
    pub data: Table,
}

impl ChartSpec {
    pub fn column(&self, role: Role) -> Option<&str> {
        self.encodings
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, c)| c.as_str())
    }

    pub fn columns(&self, role: Role) -> Vec<&str> {
        self.encodings
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, c)| c.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn with_options(self, options: ChartOptions) -> Self {
        Self { options, ..self }
    }

    /// Pre-aggregate the snapshot the way the chart displays it: sums per
    /// category / period / hierarchy path, correlation for heatmaps.
    /// Shapes plotted row by row are returned unchanged.
    pub fn summarize(&self) -> Result<ChartSpec> {
        let (group_by, measure) = match self.shape {
            BindingShape::CategoricalComparison | BindingShape::PartOfWhole => (
                vec![GroupKey::column(self.required(Role::Category)?)],
                self.required(Role::Value)?,
            ),
            BindingShape::Trend => {
                let x = self.required(Role::X)?;
                let key = match self.data.column(x).map(|c| c.kind()) {
                    Some(ColumnType::Date) => GroupKey::YearMonth(x.to_string()),
                    _ => GroupKey::column(x),
                };
                (vec![key], self.required(Role::Y)?)
            }
            BindingShape::Hierarchy => (
                self.columns(Role::Path).into_iter().map(GroupKey::column).collect(),
                self.required(Role::Value)?,
            ),
            BindingShape::Matrix if self.chart == ChartType::Heatmap => {
                let data = stats::correlation(&self.data, &self.columns(Role::Columns))?;
                return Ok(ChartSpec { data, ..self.clone() });
            }
            BindingShape::Relationship | BindingShape::Distribution | BindingShape::Matrix => {
                return Ok(self.clone());
            }
        };

        let summary = aggregate(&self.data, &AggregationSpec::new(group_by.clone(), measure))?;
        let mut encodings = self.encodings.clone();
        for (role, column) in encodings.iter_mut() {
            if let Some(key) = group_by.iter().find(|k| k.source() == column.as_str()) {
                if *role != Role::Value && *role != Role::Y {
                    *column = key.output_name().to_string();
                }
            }
        }

        Ok(ChartSpec {
            chart: self.chart,
            shape: self.shape,
            encodings,
            options: self.options.clone(),
            data: summary.into_table(),
        })
    }

    fn required(&self, role: Role) -> Result<&str> {
        self.column(role).ok_or_else(|| {
            DashError::binding(self.chart.name(), role.name(), "missing required binding")
        })
    }
}

/// Validate `bindings` for `chart` against `table` and snapshot the bound columns
pub fn build_spec(chart: ChartType, table: &Table, bindings: &Bindings) -> Result<ChartSpec> {
    let shape = rule_for(chart)?.shape;
    let rules = shape.role_rules();
    let target = format!("{} chart", chart);

    for role in Role::ALL {
        if !bindings.get(role).is_empty() && !rules.iter().any(|r| r.role == role) {
            return Err(DashError::binding(
                &target,
                bindings.get(role).join(", "),
                format!("{} charts do not use a {} binding", chart, role.name()),
            ));
        }
    }

    let mut encodings: Vec<(Role, String)> = Vec::new();
    for rule in rules {
        let mut names: Vec<String> = bindings.get(rule.role).iter().map(|s| s.to_string()).collect();

        if names.is_empty() && shape == BindingShape::Matrix {
            names = table.numeric_columns().iter().map(|s| s.to_string()).collect();
        }
        if names.is_empty() {
            if rule.required {
                return Err(DashError::binding(&target, rule.role.name(), "missing required binding"));
            }
            continue;
        }

        for name in names {
            let col = table.require_column(&name, &target)?;
            if !rule.accept.allows(col.kind()) {
                return Err(DashError::binding(
                    &target,
                    col.name(),
                    format!(
                        "{} binding needs a {} column, found {}",
                        rule.role.name(),
                        rule.accept.describe(),
                        col.kind()
                    ),
                ));
            }
            encodings.push((rule.role, col.name().to_string()));
        }
    }

    if shape == BindingShape::Matrix && encodings.len() < 2 {
        return Err(DashError::binding(&target, "columns", "needs at least two numeric columns"));
    }

    let mut needed: Vec<&str> = Vec::new();
    for (_, name) in &encodings {
        if !needed.contains(&name.as_str()) {
            needed.push(name);
        }
    }
    let data = table.select_columns(&needed)?;

    log::debug!("built {} spec over {} rows", chart, data.row_count());

    Ok(ChartSpec {
        chart,
        shape,
        encodings,
        options: ChartOptions::default(),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, Value};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn make_table() -> Table {
        let text = |v: &[&str]| v.iter().map(|s| Value::Text(s.to_string())).collect::<Vec<_>>();
        let nums = |v: &[f64]| v.iter().map(|&n| Value::Number(n)).collect::<Vec<_>>();
        let date = |m: u32| Value::Date(NaiveDate::from_ymd_opt(2014, m, 1).unwrap());
        Table::new(vec![
            Column::new("Order Date", ColumnType::Date, vec![date(3), date(1), date(3)]),
            Column::new("Region", ColumnType::Text, text(&["East", "West", "East"])),
            Column::new("Category", ColumnType::Text, text(&["Tech", "Tech", "Office"])),
            Column::new("Sales", ColumnType::Numeric, nums(&[100.0, 50.0, 25.0])),
            Column::new("Profit", ColumnType::Numeric, nums(&[10.0, -5.0, 2.0])),
            Column::new("Quantity", ColumnType::Numeric, nums(&[1.0, 2.0, 3.0])),
        ])
        .unwrap()
    }

    #[test]
    fn test_every_chart_type_has_a_rule() {
        for chart in ChartType::ALL {
            assert_eq!(rule_for(chart).map(|r| r.chart), Ok(chart));
        }
    }

    #[test]
    fn test_bindings_get_reads_each_role() {
        let mut bindings = Bindings::new().x("Order Date").path(["Region", "Category"]);
        bindings.set(Role::Value, vec!["Sales".to_string(), "Profit".to_string()]);
        assert_eq!(bindings.get(Role::X), vec!["Order Date"]);
        assert_eq!(bindings.get(Role::Value), vec!["Sales"]);
        assert_eq!(bindings.get(Role::Path), vec!["Region", "Category"]);
        assert!(bindings.get(Role::Category).is_empty());
        assert!(bindings.get(Role::Columns).is_empty());
    }

    #[test]
    fn test_histogram_on_text_is_incompatible() {
        let err = build_spec(ChartType::Histogram, &make_table(), &Bindings::new().value("Region")).unwrap_err();
        match err {
            DashError::IncompatibleBinding { column, .. } => assert_eq!(column, "Region"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_missing_column_is_incompatible() {
        let err = build_spec(
            ChartType::Bar,
            &make_table(),
            &Bindings::new().category("Ship Mode").value("Sales"),
        )
        .unwrap_err();
        assert!(matches!(err, DashError::IncompatibleBinding { .. }));
    }

    #[test]
    fn test_missing_role_is_incompatible() {
        let err = build_spec(ChartType::Bar, &make_table(), &Bindings::new().category("Region")).unwrap_err();
        assert!(matches!(err, DashError::IncompatibleBinding { .. }));
    }

    #[test]
    fn test_unused_role_is_rejected() {
        let err = build_spec(
            ChartType::Histogram,
            &make_table(),
            &Bindings::new().value("Sales").category("Region"),
        )
        .unwrap_err();
        assert!(matches!(err, DashError::IncompatibleBinding { .. }));
    }

    #[test]
    fn test_spec_snapshots_only_bound_columns() {
        let table = make_table();
        let spec = build_spec(
            ChartType::Scatter,
            &table,
            &Bindings::new().x("sales").y("Profit").size("Quantity"),
        )
        .unwrap();
        assert_eq!(spec.data.column_names(), vec!["Sales", "Profit", "Quantity"]);
        assert_eq!(spec.column(Role::X), Some("Sales"));
        assert_eq!(spec.data.row_count(), 3);
    }

    #[test]
    fn test_spec_outlives_source_table() {
        let spec = {
            let table = make_table();
            build_spec(ChartType::Density, &table, &Bindings::new().value("Profit")).unwrap()
        };
        assert_eq!(spec.data.column("Profit").unwrap().numbers(), vec![10.0, -5.0, 2.0]);
    }

    #[test]
    fn test_treemap_path_must_be_categorical() {
        let bindings = Bindings::new().path(["Region", "Sales"]).value("Sales");
        assert!(build_spec(ChartType::Treemap, &make_table(), &bindings).is_err());
    }

    #[test]
    fn test_matrix_defaults_to_numeric_columns() {
        let spec = build_spec(ChartType::Heatmap, &make_table(), &Bindings::new()).unwrap();
        assert_eq!(spec.columns(Role::Columns), vec!["Sales", "Profit", "Quantity"]);
        let summarized = spec.summarize().unwrap();
        assert_eq!(summarized.data.column_names(), vec!["column", "Sales", "Profit", "Quantity"]);
    }

    #[test]
    fn test_summarize_bar_sums_per_category() {
        let spec = build_spec(
            ChartType::Bar,
            &make_table(),
            &Bindings::new().category("Region").value("Sales"),
        )
        .unwrap()
        .summarize()
        .unwrap();
        assert_eq!(spec.data.column("Sales").unwrap().numbers(), vec![125.0, 50.0]);
    }

    #[test]
    fn test_summarize_trend_buckets_dates() {
        let spec = build_spec(
            ChartType::Line,
            &make_table(),
            &Bindings::new().x("Order Date").y("Sales"),
        )
        .unwrap()
        .summarize()
        .unwrap();
        assert_eq!(spec.column(Role::X), Some("month_year"));
        assert_eq!(
            spec.data.column("month_year").unwrap().values(),
            &[Value::Text("2014-01".into()), Value::Text("2014-03".into())]
        );
    }

    #[test]
    fn test_empty_table_gives_empty_spec() {
        let empty = make_table().take_rows(&[]);
        let spec = build_spec(ChartType::Pie, &empty, &Bindings::new().category("Region").value("Sales")).unwrap();
        assert!(spec.is_empty());
        assert!(spec.summarize().unwrap().is_empty());
    }

    #[test]
    fn test_parse_chart_names() {
        assert_eq!(ChartType::parse("Bar"), Some(ChartType::Bar));
        assert_eq!(ChartType::parse("boxplot"), Some(ChartType::Box));
        assert_eq!(ChartType::parse("geo"), None);
    }
}

use crate::aggregate::{aggregate, pivot, AggregationSpec, GroupKey};
use crate::chart::{build_spec, Bindings, ChartOptions, ChartSpec, ChartType};
use crate::config::{ColumnMap, DashboardConfig};
use crate::error::{PipelineWarning, Result};
use crate::session::Session;
use crate::stats;
use crate::table::Table;
use std::fmt;

/// The fixed panels of the sales dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DashboardView {
    Data,
    Preview,
    Sample,
    CategorySales,
    RegionSales,
    SegmentSales,
    CategoryShare,
    MonthlySales,
    Hierarchy,
    SalesVsProfit,
    SubcategoryByMonth,
    Describe,
    Correlation,
}

impl DashboardView {
    pub const ALL: [DashboardView; 13] = [
        DashboardView::Data,
        DashboardView::Preview,
        DashboardView::Sample,
        DashboardView::CategorySales,
        DashboardView::RegionSales,
        DashboardView::SegmentSales,
        DashboardView::CategoryShare,
        DashboardView::MonthlySales,
        DashboardView::Hierarchy,
        DashboardView::SalesVsProfit,
        DashboardView::SubcategoryByMonth,
        DashboardView::Describe,
        DashboardView::Correlation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DashboardView::Data => "data",
            DashboardView::Preview => "preview",
            DashboardView::Sample => "sample",
            DashboardView::CategorySales => "category_sales",
            DashboardView::RegionSales => "region_sales",
            DashboardView::SegmentSales => "segment_sales",
            DashboardView::CategoryShare => "category_share",
            DashboardView::MonthlySales => "monthly_sales",
            DashboardView::Hierarchy => "hierarchy",
            DashboardView::SalesVsProfit => "sales_vs_profit",
            DashboardView::SubcategoryByMonth => "subcategory_by_month",
            DashboardView::Describe => "describe",
            DashboardView::Correlation => "correlation",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        DashboardView::ALL
            .iter()
            .copied()
            .find(|v| v.name().eq_ignore_ascii_case(name))
    }

    /// Chart drawn next to the view's table, bound to raw (filtered) columns.
    /// The spec keeps the filtered rows; `ChartSpec::summarize` gives what is drawn.
    pub fn default_chart(self, columns: &ColumnMap) -> Option<(ChartType, Bindings, ChartOptions)> {
        let titled = |title: &str| ChartOptions {
            title: Some(title.to_string()),
            ..ChartOptions::default()
        };
        let by = |category: &str| Bindings::new().category(category).value(&columns.sales);

        let chart = match self {
            DashboardView::CategorySales => (ChartType::Bar, by(&columns.category), titled("Category wise Sales")),
            DashboardView::RegionSales => (
                ChartType::Pie,
                by(&columns.region),
                ChartOptions {
                    hole: Some(0.5),
                    ..titled("Region wise Sales")
                },
            ),
            DashboardView::SegmentSales => (ChartType::Pie, by(&columns.segment), titled("Segment wise Sales")),
            DashboardView::CategoryShare => (ChartType::Pie, by(&columns.category), titled("Category wise Sales")),
            DashboardView::MonthlySales => (
                ChartType::Line,
                Bindings::new().x(&columns.order_date).y(&columns.sales),
                titled("Time Series Analysis"),
            ),
            DashboardView::Hierarchy => (
                ChartType::Treemap,
                Bindings::new()
                    .path([&columns.region, &columns.category, &columns.sub_category])
                    .value(&columns.sales),
                titled("Hierarchical view of Sales"),
            ),
            DashboardView::SalesVsProfit => (
                ChartType::Scatter,
                Bindings::new()
                    .x(&columns.sales)
                    .y(&columns.profit)
                    .size(&columns.quantity),
                titled("Relationship between Sales and Profits"),
            ),
            DashboardView::Correlation => (
                ChartType::Heatmap,
                Bindings::new(),
                titled("Correlation"),
            ),
            DashboardView::Data
            | DashboardView::Preview
            | DashboardView::Sample
            | DashboardView::SubcategoryByMonth
            | DashboardView::Describe => return None,
        };
        Some(chart)
    }
}

impl fmt::Display for DashboardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One computed panel
#[derive(Debug, Clone, PartialEq)]
pub struct ViewOutput {
    pub view: DashboardView,
    pub table: Table,
    pub chart: Option<ChartSpec>,
}

impl ViewOutput {
    pub fn warning(&self) -> Option<PipelineWarning> {
        self.table.is_empty().then(|| PipelineWarning::EmptyResult {
            stage: self.view.name().to_string(),
        })
    }
}

/// Every panel for the current session state
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardViews {
    pub outputs: Vec<ViewOutput>,
    pub warnings: Vec<PipelineWarning>,
}

impl DashboardViews {
    pub fn get(&self, view: DashboardView) -> Option<&ViewOutput> {
        self.outputs.iter().find(|o| o.view == view)
    }
}

fn sales_by(table: &Table, columns: &ColumnMap, key: &str) -> Result<Table> {
    Ok(aggregate(table, &AggregationSpec::by_columns(&[key], columns.sales.as_str()))?.into_table())
}

/// Compute a single view against the session's current filters
pub fn compute(session: &Session, config: &DashboardConfig, view: DashboardView) -> Result<ViewOutput> {
    let columns = session.store().columns();
    let filtered = session.filtered()?;

    let table = match view {
        DashboardView::Data => filtered.clone(),
        DashboardView::Preview => filtered.head(config.preview_rows),
        DashboardView::Sample => {
            let picked: [&str; 7] = [
                &columns.region,
                &columns.state,
                &columns.city,
                &columns.category,
                &columns.sales,
                &columns.profit,
                &columns.quantity,
            ];
            session
                .windowed()?
                .select_columns(&picked)?
                .head(config.sample_rows)
        }
        DashboardView::CategorySales | DashboardView::CategoryShare => {
            sales_by(&filtered, columns, &columns.category)?
        }
        DashboardView::RegionSales => sales_by(&filtered, columns, &columns.region)?,
        DashboardView::SegmentSales => sales_by(&filtered, columns, &columns.segment)?,
        DashboardView::MonthlySales => {
            let spec = AggregationSpec::new(
                vec![GroupKey::YearMonth(columns.order_date.clone())],
                columns.sales.as_str(),
            );
            aggregate(&filtered, &spec)?.into_table()
        }
        DashboardView::Hierarchy => {
            let keys: [&str; 3] = [
                &columns.region,
                &columns.category,
                &columns.sub_category,
            ];
            aggregate(&filtered, &AggregationSpec::by_columns(&keys, columns.sales.as_str()))?.into_table()
        }
        DashboardView::SalesVsProfit => {
            filtered.select_columns(&[&columns.sales, &columns.profit, &columns.quantity])?
        }
        DashboardView::SubcategoryByMonth => pivot(
            &filtered,
            &GroupKey::column(columns.sub_category.as_str()),
            &GroupKey::MonthOfYear(columns.order_date.clone()),
            &columns.sales,
        )?
        .to_table()?,
        DashboardView::Describe => stats::describe(&filtered)?,
        DashboardView::Correlation => stats::correlation(&filtered, &[] as &[&str])?,
    };

    let chart = match view.default_chart(columns) {
        Some((chart, bindings, options)) => {
            Some(build_spec(chart, &filtered, &bindings)?.with_options(options))
        }
        None => None,
    };

    log::debug!("view {} has {} rows", view, table.row_count());
    Ok(ViewOutput { view, table, chart })
}

/// Compute every view. Empty views are reported as warnings, not errors.
pub fn compute_all(session: &Session, config: &DashboardConfig) -> Result<DashboardViews> {
    let mut outputs = Vec::with_capacity(DashboardView::ALL.len());
    let mut warnings = Vec::new();
    for view in DashboardView::ALL {
        let output = compute(session, config, view)?;
        if let Some(w) = output.warning() {
            log::warn!("{}", w);
            warnings.push(w);
        }
        outputs.push(output);
    }
    Ok(DashboardViews { outputs, warnings })
}

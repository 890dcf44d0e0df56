// Runtime executor for the dashboard query language

use crate::aggregate::{aggregate, pivot, AggregationSpec, GroupKey};
use crate::chart::{build_spec, Bindings, ChartOptions, ChartSpec, ChartType};
use crate::config::{ColumnMap, DashboardConfig, MAX_HISTOGRAM_BINS};
use crate::error::PipelineWarning;
use crate::export;
use crate::filter::DateRange;
use crate::graph;
use crate::parser::ast::{ChartStage, Query, Stage};
use crate::session::Session;
use crate::table::Table;
use crate::views::{self, DashboardView};
use crate::OutputFormat;
use anyhow::{anyhow, Context, Result};

/// What a query produced: a table, plus the chart that goes with it when there is one
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub table: Table,
    pub chart: Option<ChartSpec>,
    pub warnings: Vec<PipelineWarning>,
}

/// Resolve a group key: `month` / `month_year` name the date buckets of the
/// order date unless the table has a real column of that name
fn resolve_key(table: &Table, columns: &ColumnMap, name: &str) -> GroupKey {
    if table.column(name).is_some() {
        return GroupKey::column(name);
    }
    match name.to_ascii_lowercase().as_str() {
        "month" => GroupKey::MonthOfYear(columns.order_date.clone()),
        "month_year" => GroupKey::YearMonth(columns.order_date.clone()),
        _ => GroupKey::column(name),
    }
}

fn chart_from_stage(stage: &ChartStage, table: &Table, config: &DashboardConfig) -> Result<ChartSpec> {
    let chart = ChartType::parse(&stage.chart)
        .ok_or_else(|| anyhow!("Unknown chart type '{}'", stage.chart))?;

    let mut bindings = Bindings::new();
    for (role, columns) in &stage.bindings {
        bindings.set(*role, columns.clone());
    }

    let bins = stage.bins.unwrap_or(config.histogram_bins);
    if bins > MAX_HISTOGRAM_BINS {
        anyhow::bail!("bins must be at most {}, got {}", MAX_HISTOGRAM_BINS, bins);
    }
    let options = ChartOptions {
        title: stage.title.clone(),
        fill: stage.fill.clone(),
        hole: stage.hole,
        bins: Some(bins),
    };
    if let Some(fill) = &options.fill {
        graph::parse_color(fill).ok_or_else(|| anyhow!("Unknown colour '{}'", fill))?;
    }

    let spec = build_spec(chart, table, &bindings)?;
    Ok(spec.with_options(options))
}

/// Apply the query's filter stages to the session, then evaluate its terminal stage
pub fn execute(session: &mut Session, config: &DashboardConfig, query: &Query) -> Result<QueryResult> {
    let mut projection: Option<&[String]> = None;

    for stage in &query.stages {
        match stage {
            Stage::Dates { from, to } => {
                let current = *session.date_range();
                let range = DateRange::new(
                    from.unwrap_or(current.start()),
                    to.unwrap_or(current.end()),
                )?;
                session
                    .set_date_range(range)
                    .context("Failed to apply date window")?;
            }
            Stage::Select { level, values } => {
                session
                    .select(*level, values.iter().cloned())
                    .with_context(|| format!("Failed to apply {} selection", level))?;
            }
            Stage::Columns(names) => projection = Some(names.as_slice()),
            _ => {}
        }
    }

    let mut table = session.filtered().context("Failed to filter rows")?;
    if let Some(names) = projection {
        table = table.select_columns(names)?;
    }
    let columns = session.store().columns().clone();

    let (stage_name, table, chart) = match query.terminal() {
        None => ("data".to_string(), table, None),
        Some(Stage::View(name)) => {
            let view = DashboardView::parse(name).ok_or_else(|| {
                let known: Vec<&str> = DashboardView::ALL.iter().map(|v| v.name()).collect();
                anyhow!("Unknown view '{}' (expected one of: {})", name, known.join(", "))
            })?;
            let output = views::compute(session, config, view)?;
            (view.name().to_string(), output.table, output.chart)
        }
        Some(Stage::Sum { by, of }) => {
            let keys = by.iter().map(|b| resolve_key(&table, &columns, b)).collect();
            let summary = aggregate(&table, &AggregationSpec::new(keys, of.as_str()))?;
            ("sum".to_string(), summary.into_table(), None)
        }
        Some(Stage::Monthly { of }) => {
            let spec = AggregationSpec::new(vec![GroupKey::YearMonth(columns.order_date.clone())], of.as_str());
            ("monthly".to_string(), aggregate(&table, &spec)?.into_table(), None)
        }
        Some(Stage::Pivot { rows, cols, of }) => {
            let rows = resolve_key(&table, &columns, rows);
            let cols = resolve_key(&table, &columns, cols);
            let result = pivot(&table, &rows, &cols, of)?.to_table()?;
            ("pivot".to_string(), result, None)
        }
        Some(Stage::Chart(stage)) => {
            let spec = chart_from_stage(stage, &table, config)?;
            let drawn = spec.summarize()?;
            (format!("{} chart", spec.chart), drawn.data, Some(spec))
        }
        Some(other) => anyhow::bail!("Stage {:?} cannot end a query", other),
    };

    let mut warnings = Vec::new();
    if table.is_empty() {
        let warning = PipelineWarning::EmptyResult { stage: stage_name };
        log::warn!("{}", warning);
        warnings.push(warning);
    }

    log::info!(
        "query produced {} rows x {} columns",
        table.row_count(),
        table.column_count()
    );
    Ok(QueryResult { table, chart, warnings })
}

/// Serialise a query result in the requested format
pub fn render(result: &QueryResult, format: OutputFormat, config: &DashboardConfig) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Csv => Ok(export::to_csv(&result.table)?),
        OutputFormat::Json => Ok(export::to_json(&result.table)?),
        OutputFormat::Png => {
            let chart = result
                .chart
                .as_ref()
                .context("PNG output needs a chart: end the query with chart(...) or a charted view")?;
            graph::render_chart(chart, &config.render, config.histogram_bins)
        }
    }
}

use crate::error::{DashError, Result};
use crate::table::{Column, ColumnType, Table, Value};

/// Linear-interpolated percentile of already sorted data
pub fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    let n = sorted_data.len();
    if n == 0 { return f64::NAN; }
    if n == 1 { return sorted_data[0]; }

    let rank = p * (n - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = rank.ceil() as usize;

    if lower_idx == upper_idx {
        sorted_data[lower_idx]
    } else {
        let weight = rank - lower_idx as f64;
        sorted_data[lower_idx] * (1.0 - weight) + sorted_data[upper_idx] * weight
    }
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    out.sort_by(f64::total_cmp);
    out
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1)
fn std_dev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n < 2.0 { return f64::NAN; }
    let m = mean(values);
    (values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
}

fn number_or_null(v: f64) -> Value {
    if v.is_finite() { Value::Number(v) } else { Value::Null }
}

pub const DESCRIBE_ROWS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

/// Summary statistics of every numeric column: one row per statistic, one column per input column
pub fn describe(table: &Table) -> Result<Table> {
    let mut columns = vec![Column::new(
        "statistic",
        ColumnType::Text,
        DESCRIBE_ROWS.iter().map(|s| Value::Text(s.to_string())).collect(),
    )];

    for col in table.columns().iter().filter(|c| c.kind() == ColumnType::Numeric) {
        let data = sorted(&col.numbers());
        let stats = if data.is_empty() {
            vec![0.0, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN]
        } else {
            vec![
                data.len() as f64,
                mean(&data),
                std_dev(&data),
                data[0],
                percentile(&data, 0.25),
                percentile(&data, 0.50),
                percentile(&data, 0.75),
                data[data.len() - 1],
            ]
        };
        columns.push(Column::new(
            col.name(),
            ColumnType::Numeric,
            stats.into_iter().map(number_or_null).collect(),
        ));
    }

    Table::new(columns)
}

/// Pearson correlation over rows where both cells are present
pub fn pearson(xs: &[Value], ys: &[Value]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| Some((x.as_f64()?, y.as_f64()?)))
        .collect();
    let n = pairs.len() as f64;
    if n < 2.0 { return None; }

    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in &pairs {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    let denom = (sxx * syy).sqrt();
    if denom == 0.0 { None } else { Some(sxy / denom) }
}

/// Correlation matrix of the given numeric columns (all numeric columns when empty)
pub fn correlation<S: AsRef<str>>(table: &Table, names: &[S]) -> Result<Table> {
    let selected: Vec<&Column> = if names.is_empty() {
        table.columns().iter().filter(|c| c.kind() == ColumnType::Numeric).collect()
    } else {
        let mut cols = Vec::with_capacity(names.len());
        for name in names {
            let col = table.require_column(name.as_ref(), "correlation")?;
            if col.kind() != ColumnType::Numeric {
                return Err(DashError::binding(
                    "correlation",
                    col.name(),
                    format!("expected a numeric column, found {}", col.kind()),
                ));
            }
            cols.push(col);
        }
        cols
    };

    let mut columns = vec![Column::new(
        "column",
        ColumnType::Text,
        selected.iter().map(|c| Value::Text(c.name().to_string())).collect(),
    )];
    for col in &selected {
        let values = selected
            .iter()
            .map(|other| {
                pearson(other.values(), col.values())
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            })
            .collect();
        columns.push(Column::new(col.name(), ColumnType::Numeric, values));
    }
    Table::new(columns)
}

/// One histogram bin, `[start, end)` except for the last bin which includes `end`
#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

pub fn histogram(values: &[f64], bins: usize) -> Result<Vec<Bin>> {
    if bins == 0 {
        return Err(DashError::Validation("histogram needs at least one bin".to_string()));
    }
    let data = sorted(values);
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let min = data[0];
    let max = data[data.len() - 1];
    let range = max - min;
    let width = if range == 0.0 { 1.0 } else { range / bins as f64 };

    let mut out: Vec<Bin> = (0..bins)
        .map(|i| Bin {
            start: min + i as f64 * width,
            end: min + (i + 1) as f64 * width,
            count: 0,
        })
        .collect();
    for v in data {
        let idx = (((v - min) / width).floor() as usize).min(bins - 1);
        out[idx].count += 1;
    }
    Ok(out)
}

/// Tukey box plot statistics
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSummary {
    pub lower_whisker: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

pub fn box_summary(values: &[f64]) -> Option<BoxSummary> {
    let ys = sorted(values);
    if ys.is_empty() { return None; }

    let q1 = percentile(&ys, 0.25);
    let median = percentile(&ys, 0.50);
    let q3 = percentile(&ys, 0.75);
    let iqr = q3 - q1;

    let lower_fence = q1 - 1.5 * iqr;
    let upper_fence = q3 + 1.5 * iqr;

    // Whiskers: Range of data within fences
    let lower_whisker = ys.iter().copied().find(|&v| v >= lower_fence).unwrap_or(q1);
    let upper_whisker = ys.iter().rev().copied().find(|&v| v <= upper_fence).unwrap_or(q3);
    let outliers = ys.iter().copied().filter(|&v| v < lower_fence || v > upper_fence).collect();

    Some(BoxSummary { lower_whisker, q1, median, q3, upper_whisker, outliers })
}

/// Silverman's rule of thumb for bandwidth selection
fn silverman_bandwidth(data: &[f64]) -> f64 {
    let n = data.len() as f64;
    if n < 2.0 { return 1.0; }

    let sd = std_dev(data);
    let q1 = percentile(data, 0.25);
    let q3 = percentile(data, 0.75);
    let iqr = q3 - q1;

    // h = 0.9 * min(std, IQR/1.34) * n^(-1/5)
    let scale = if iqr > 0.0 { sd.min(iqr / 1.34) } else { sd };
    if !(scale > 0.0) { return 1.0; }
    0.9 * scale * n.powf(-0.2)
}

fn gaussian_kernel(u: f64) -> f64 {
    const SQRT_2PI: f64 = 2.5066282746310002;
    (-0.5 * u * u).exp() / SQRT_2PI
}

/// Gaussian kernel density estimate on an evenly spaced grid.
/// Returns (grid, density); the density integrates to ~1.
pub fn kde(values: &[f64], grid_points: usize) -> (Vec<f64>, Vec<f64>) {
    let data = sorted(values);
    if data.is_empty() || grid_points < 2 { return (vec![], vec![]); }

    let n = data.len() as f64;
    let bandwidth = silverman_bandwidth(&data);
    let start = data[0] - 3.0 * bandwidth;
    let end = data[data.len() - 1] + 3.0 * bandwidth;
    let step = (end - start) / (grid_points - 1) as f64;

    let mut grid = Vec::with_capacity(grid_points);
    let mut density = Vec::with_capacity(grid_points);
    for i in 0..grid_points {
        let y = start + i as f64 * step;
        let d: f64 = data.iter().map(|&xi| gaussian_kernel((y - xi) / bandwidth)).sum();
        grid.push(y);
        density.push(d / (n * bandwidth));
    }
    (grid, density)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_percentile_interpolates() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert!(approx(percentile(&data, 0.5), 2.5));
        assert!(approx(percentile(&data, 0.25), 1.75));
        assert!(approx(percentile(&[7.0], 0.9), 7.0));
    }

    #[test]
    fn test_describe() {
        let table = Table::new(vec![
            Column::new("name", ColumnType::Text, vec![Value::Text("a".into()); 4]),
            Column::new(
                "x",
                ColumnType::Numeric,
                vec![Value::Number(4.0), Value::Number(1.0), Value::Null, Value::Number(7.0)],
            ),
        ])
        .unwrap();
        let stats = describe(&table).unwrap();
        assert_eq!(stats.column_names(), vec!["statistic", "x"]);
        let x = stats.column("x").unwrap().numbers();
        assert_eq!(x[0], 3.0); // count
        assert!(approx(x[1], 4.0)); // mean
        assert!(approx(x[2], 3.0)); // std
        assert_eq!(x[3], 1.0);
        assert!(approx(x[5], 4.0)); // median
        assert_eq!(x[7], 7.0);
    }

    #[test]
    fn test_correlation_matrix() {
        let table = Table::new(vec![
            Column::new("a", ColumnType::Numeric, vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]),
            Column::new("b", ColumnType::Numeric, vec![Value::Number(2.0), Value::Number(4.0), Value::Number(6.0)]),
            Column::new("c", ColumnType::Numeric, vec![Value::Number(3.0), Value::Number(2.0), Value::Number(1.0)]),
        ])
        .unwrap();
        let corr = correlation::<&str>(&table, &[]).unwrap();
        assert_eq!(corr.column_names(), vec!["column", "a", "b", "c"]);
        let b = corr.column("b").unwrap().numbers();
        assert!(approx(b[0], 1.0));
        assert!(approx(b[2], -1.0));
    }

    #[test]
    fn test_correlation_constant_column_is_null() {
        let xs = vec![Value::Number(1.0), Value::Number(1.0)];
        let ys = vec![Value::Number(1.0), Value::Number(2.0)];
        assert_eq!(pearson(&xs, &ys), None);
    }

    #[test]
    fn test_histogram_counts_every_value() {
        let values = [0.0, 1.0, 2.0, 3.0, 4.0, 10.0];
        let bins = histogram(&values, 5).unwrap();
        assert_eq!(bins.len(), 5);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 6);
        assert_eq!(bins[0].count, 2);
        assert_eq!(bins[4].count, 1);
        assert!(histogram(&values, 0).is_err());
    }

    #[test]
    fn test_box_summary_outliers() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
        let summary = box_summary(&values).unwrap();
        assert_eq!(summary.outliers, vec![100.0]);
        assert_eq!(summary.upper_whisker, 5.0);
        assert_eq!(summary.lower_whisker, 1.0);
        assert!(box_summary(&[]).is_none());
    }

    #[test]
    fn test_kde_integrates_to_one() {
        let (grid, density) = kde(&[1.0, 2.0, 2.5, 3.0, 7.0], 256);
        let step = grid[1] - grid[0];
        let area: f64 = density.iter().sum::<f64>() * step;
        assert!((area - 1.0).abs() < 0.05, "area was {}", area);
    }
}

use crate::chart::{ChartSpec, ChartType, Role};
use crate::stats;
use crate::table::{ColumnType, Value};
use crate::RenderOptions;
use anyhow::{Context, Result};
use image::ImageEncoder;
use plotters::prelude::*;
use std::f64::consts::PI;
use std::ops::Range;

/// Plotly/matplotlib "category10" palette
const CATEGORY10: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

pub fn palette_color(index: usize) -> RGBColor {
    CATEGORY10[index % CATEGORY10.len()]
}

/// Parse a colour name or `#rrggbb` hex string
pub fn parse_color(color: &str) -> Option<RGBColor> {
    let named = match color.to_ascii_lowercase().as_str() {
        "red" => Some(RED),
        "green" => Some(GREEN),
        "blue" => Some(BLUE),
        "black" => Some(BLACK),
        "yellow" => Some(YELLOW),
        "cyan" => Some(CYAN),
        "magenta" => Some(MAGENTA),
        "white" => Some(WHITE),
        "orange" => Some(palette_color(1)),
        "grey" | "gray" => Some(palette_color(7)),
        _ => None,
    };
    if named.is_some() {
        return named;
    }

    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}

fn lighten(color: RGBColor, amount: f64) -> RGBColor {
    let mix = |c: u8| (c as f64 + (255.0 - c as f64) * amount).round() as u8;
    RGBColor(mix(color.0), mix(color.1), mix(color.2))
}

/// Diverging blue-white-red scale over [-1, 1]
fn diverging(v: f64) -> RGBColor {
    let v = v.clamp(-1.0, 1.0);
    let (end, t) = if v < 0.0 {
        (RGBColor(59, 76, 192), -v)
    } else {
        (RGBColor(180, 4, 38), v)
    };
    let mix = |c: u8| (255.0 + (c as f64 - 255.0) * t).round() as u8;
    RGBColor(mix(end.0), mix(end.1), mix(end.2))
}

/// Min/max of the data with 5% padding, widened when degenerate
fn padded_range(values: impl IntoIterator<Item = f64>, include_zero: bool) -> Option<Range<f64>> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values.into_iter().filter(|v| v.is_finite()) {
        min = min.min(v);
        max = max.max(v);
    }
    if min > max {
        return None;
    }
    if include_zero {
        min = min.min(0.0);
        max = max.max(0.0);
    }
    Some(if min == max {
        (min - 1.0)..(max + 1.0)
    } else {
        let padding = (max - min) * 0.05;
        (min - padding)..(max + padding)
    })
}

fn trim_number(x: f64) -> String {
    let text = format!("{:.2}", x);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn label_formatter(labels: &[String], x: f64) -> String {
    let idx = x.floor();
    if idx >= 0.0 && (idx as usize) < labels.len() {
        labels[idx as usize].clone()
    } else {
        String::new()
    }
}

/// One node of a treemap hierarchy
struct TreeNode {
    label: String,
    value: f64,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn insert(nodes: &mut Vec<TreeNode>, path: &[String], value: f64) {
        let Some((head, rest)) = path.split_first() else {
            return;
        };
        let idx = match nodes.iter().position(|n| &n.label == head) {
            Some(idx) => idx,
            None => {
                nodes.push(TreeNode {
                    label: head.clone(),
                    value: 0.0,
                    children: Vec::new(),
                });
                nodes.len() - 1
            }
        };
        nodes[idx].value += value;
        TreeNode::insert(&mut nodes[idx].children, rest, value);
    }
}

struct Tile {
    rect: (i32, i32, i32, i32),
    label: String,
    color: RGBColor,
}

/// Slice-and-dice layout: alternate horizontal and vertical splits per level
fn slice_and_dice(
    nodes: &[TreeNode],
    rect: (i32, i32, i32, i32),
    horizontal: bool,
    color: Option<RGBColor>,
    depth: usize,
    out: &mut Vec<Tile>,
) {
    let total: f64 = nodes.iter().map(|n| n.value).sum();
    if total <= 0.0 {
        return;
    }
    let (x0, y0, x1, y1) = rect;
    let span = (if horizontal { x1 - x0 } else { y1 - y0 }) as f64;
    let mut offset = 0.0;
    for (i, node) in nodes.iter().enumerate() {
        let start = offset;
        offset += span * node.value / total;
        let child = if horizontal {
            (x0 + start.round() as i32, y0, x0 + offset.round() as i32, y1)
        } else {
            (x0, y0 + start.round() as i32, x1, y0 + offset.round() as i32)
        };
        let base = color.unwrap_or_else(|| palette_color(i));
        if node.children.is_empty() {
            out.push(Tile {
                rect: child,
                label: node.label.clone(),
                color: lighten(base, 0.2 * depth as f64),
            });
        } else {
            slice_and_dice(&node.children, child, !horizontal, Some(base), depth + 1, out);
        }
    }
}

/// Canvas for a single chart
pub struct Canvas {
    buffer: Vec<u8>,
    width: u32,
    height: u32,
    title: String,
}

impl Canvas {
    pub fn new(width: u32, height: u32, title: Option<String>) -> Result<Self> {
        if width == 0 || height == 0 {
            anyhow::bail!("Canvas size must be positive (got {}x{})", width, height);
        }
        Ok(Canvas {
            buffer: vec![0u8; (width * height * 3) as usize],
            width,
            height,
            title: title.unwrap_or_default(),
        })
    }

    /// Bars over a categorical axis
    pub fn draw_bars(&mut self, labels: &[String], values: &[f64], color: RGBColor) -> Result<()> {
        let y_range = padded_range(values.iter().copied(), true)
            .context("Cannot create bar chart with no data")?;
        let root = BitMapBackend::with_buffer(&mut self.buffer, (self.width, self.height))
            .into_drawing_area();
        root.fill(&WHITE).context("Failed to fill background")?;

        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(&self.title, ("sans-serif", 20))
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(0.0..labels.len() as f64, y_range)
            .context("Failed to build chart")?;

        chart
            .configure_mesh()
            .x_labels(labels.len())
            .x_label_formatter(&|x| label_formatter(labels, *x))
            .draw()
            .context("Failed to draw mesh")?;

        for (idx, &y) in values.iter().enumerate() {
            let x_center = idx as f64 + 0.5;
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [(x_center - 0.4, 0.0), (x_center + 0.4, y)],
                    color.filled(),
                )))
                .context("Failed to draw bar")?;
        }

        root.present().context("Failed to present drawing")?;
        Ok(())
    }

    /// Line (optionally filled down to zero) over numeric or ordinal x positions
    pub fn draw_trend(
        &mut self,
        xs: &[f64],
        ys: &[f64],
        labels: Option<&[String]>,
        color: RGBColor,
        filled: bool,
    ) -> Result<()> {
        let x_range = match labels {
            Some(l) => -0.5..(l.len() as f64 - 0.5),
            None => padded_range(xs.iter().copied(), false).context("Cannot draw a trend with no data")?,
        };
        let y_range = padded_range(ys.iter().copied(), filled).context("Cannot draw a trend with no data")?;

        let root = BitMapBackend::with_buffer(&mut self.buffer, (self.width, self.height))
            .into_drawing_area();
        root.fill(&WHITE).context("Failed to fill background")?;

        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(&self.title, ("sans-serif", 20))
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range, y_range)
            .context("Failed to build chart")?;

        let format_tick = |x: &f64| match labels {
            Some(l) => label_formatter(l, x.round()),
            None => trim_number(*x),
        };
        let mut mesh = chart.configure_mesh();
        if let Some(l) = labels {
            mesh.x_labels(l.len().min(12));
        }
        mesh.x_label_formatter(&format_tick)
            .draw()
            .context("Failed to draw mesh")?;

        let points: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
        if filled {
            chart
                .draw_series(
                    AreaSeries::new(points, 0.0, color.mix(0.3).filled())
                        .border_style(color.stroke_width(2)),
                )
                .context("Failed to draw area series")?;
        } else {
            chart
                .draw_series(LineSeries::new(points, color.stroke_width(2)))
                .context("Failed to draw line series")?;
        }

        root.present().context("Failed to present drawing")?;
        Ok(())
    }

    /// Scatter with per-point radius and colour
    pub fn draw_points(&mut self, points: &[(f64, f64, i32, RGBColor)], x_desc: &str, y_desc: &str) -> Result<()> {
        let x_range = padded_range(points.iter().map(|p| p.0), false)
            .context("Cannot create scatter plot with no data")?;
        let y_range = padded_range(points.iter().map(|p| p.1), false)
            .context("Cannot create scatter plot with no data")?;

        let root = BitMapBackend::with_buffer(&mut self.buffer, (self.width, self.height))
            .into_drawing_area();
        root.fill(&WHITE).context("Failed to fill background")?;

        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(&self.title, ("sans-serif", 20))
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range, y_range)
            .context("Failed to build chart")?;

        chart
            .configure_mesh()
            .x_desc(x_desc)
            .y_desc(y_desc)
            .draw()
            .context("Failed to draw mesh")?;

        chart
            .draw_series(
                points
                    .iter()
                    .map(|&(x, y, r, c)| Circle::new((x, y), r, c.mix(0.7).filled())),
            )
            .context("Failed to draw point series")?;

        root.present().context("Failed to present drawing")?;
        Ok(())
    }

    /// Pie, or donut when `hole` is a fraction of the radius
    pub fn draw_pie(&mut self, labels: &[String], values: &[f64], hole: Option<f64>) -> Result<()> {
        let total: f64 = values.iter().filter(|v| **v > 0.0).sum();
        if total <= 0.0 {
            anyhow::bail!("Cannot create pie chart without positive values");
        }

        let root = BitMapBackend::with_buffer(&mut self.buffer, (self.width, self.height))
            .into_drawing_area();
        root.fill(&WHITE).context("Failed to fill background")?;
        let root = if self.title.is_empty() {
            root
        } else {
            root.titled(&self.title, ("sans-serif", 20))
                .context("Failed to draw title")?
        };

        let (w, h) = root.dim_in_pixel();
        let center = ((w / 2) as i32, (h / 2) as i32);
        let radius = w.min(h) as f64 * 0.38;
        let at = |angle: f64, r: f64| {
            (
                center.0 + (r * angle.cos()).round() as i32,
                center.1 + (r * angle.sin()).round() as i32,
            )
        };

        let mut angle = -PI / 2.0;
        for (idx, (label, &value)) in labels.iter().zip(values).enumerate() {
            if value <= 0.0 {
                continue;
            }
            let sweep = value / total * 2.0 * PI;
            let steps = ((sweep / 0.02).ceil() as usize).max(2);
            let mut wedge = vec![center];
            wedge.extend((0..=steps).map(|s| at(angle + sweep * s as f64 / steps as f64, radius)));
            root.draw(&Polygon::new(wedge, palette_color(idx).filled()))
                .context("Failed to draw pie slice")?;

            let (lx, ly) = at(angle + sweep / 2.0, radius * 1.08);
            let text = format!("{} {:.1}%", label, value / total * 100.0);
            root.draw(&Text::new(text, (lx, ly), ("sans-serif", 13).into_font()))
                .context("Failed to draw pie label")?;
            angle += sweep;
        }

        if let Some(hole) = hole.filter(|h| *h > 0.0 && *h < 1.0) {
            root.draw(&Circle::new(center, (radius * hole).round() as i32, WHITE.filled()))
                .context("Failed to draw donut hole")?;
        }

        root.present().context("Failed to present drawing")?;
        Ok(())
    }

    /// Slice-and-dice treemap of `(path, value)` rows
    pub fn draw_treemap(&mut self, rows: &[(Vec<String>, f64)]) -> Result<()> {
        let mut roots: Vec<TreeNode> = Vec::new();
        for (path, value) in rows.iter().filter(|(_, v)| *v > 0.0) {
            TreeNode::insert(&mut roots, path, *value);
        }
        if roots.is_empty() {
            anyhow::bail!("Cannot create treemap without positive values");
        }

        let root = BitMapBackend::with_buffer(&mut self.buffer, (self.width, self.height))
            .into_drawing_area();
        root.fill(&WHITE).context("Failed to fill background")?;
        let root = if self.title.is_empty() {
            root
        } else {
            root.titled(&self.title, ("sans-serif", 20))
                .context("Failed to draw title")?
        };

        let (w, h) = root.dim_in_pixel();
        let mut tiles = Vec::new();
        slice_and_dice(&roots, (5, 5, w as i32 - 5, h as i32 - 5), true, None, 0, &mut tiles);

        for tile in &tiles {
            let (x0, y0, x1, y1) = tile.rect;
            root.draw(&Rectangle::new([(x0, y0), (x1, y1)], tile.color.filled()))
                .context("Failed to draw tile")?;
            root.draw(&Rectangle::new([(x0, y0), (x1, y1)], WHITE.stroke_width(2)))
                .context("Failed to draw tile border")?;
            if x1 - x0 > 40 && y1 - y0 > 16 {
                root.draw(&Text::new(
                    tile.label.clone(),
                    (x0 + 4, y0 + 4),
                    ("sans-serif", 12).into_font(),
                ))
                .context("Failed to draw tile label")?;
            }
        }

        root.present().context("Failed to present drawing")?;
        Ok(())
    }

    /// Histogram bars over a numeric axis
    pub fn draw_histogram(&mut self, bins: &[stats::Bin], color: RGBColor, x_desc: &str) -> Result<()> {
        let (first, last) = match (bins.first(), bins.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => anyhow::bail!("Cannot create histogram with no data"),
        };
        let max_count = bins.iter().map(|b| b.count).max().unwrap_or(0) as f64;

        let root = BitMapBackend::with_buffer(&mut self.buffer, (self.width, self.height))
            .into_drawing_area();
        root.fill(&WHITE).context("Failed to fill background")?;

        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(&self.title, ("sans-serif", 20))
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(first.start..last.end, 0.0..(max_count * 1.05).max(1.0))
            .context("Failed to build chart")?;

        chart
            .configure_mesh()
            .x_desc(x_desc)
            .y_desc("count")
            .draw()
            .context("Failed to draw mesh")?;

        chart
            .draw_series(bins.iter().map(|b| {
                Rectangle::new([(b.start, 0.0), (b.end, b.count as f64)], color.filled())
            }))
            .context("Failed to draw histogram bars")?;

        root.present().context("Failed to present drawing")?;
        Ok(())
    }

    /// Box plot (Tukey whiskers) or violin (mirrored density) of one column
    pub fn draw_distribution(&mut self, values: &[f64], name: &str, violin: bool, color: RGBColor) -> Result<()> {
        let summary = stats::box_summary(values).context("Cannot summarise a column with no values")?;
        let y_range = padded_range(values.iter().copied(), false).context("Cannot draw an empty distribution")?;
        let (grid, density) = if violin {
            stats::kde(values, 100)
        } else {
            (Vec::new(), Vec::new())
        };
        let y_range = match padded_range(grid.iter().copied(), false) {
            Some(g) => g.start.min(y_range.start)..g.end.max(y_range.end),
            None => y_range,
        };

        let root = BitMapBackend::with_buffer(&mut self.buffer, (self.width, self.height))
            .into_drawing_area();
        root.fill(&WHITE).context("Failed to fill background")?;

        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(&self.title, ("sans-serif", 20))
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(0.0..1.0, y_range)
            .context("Failed to build chart")?;

        let names = [name.to_string()];
        chart
            .configure_mesh()
            .x_labels(1)
            .x_label_formatter(&|x| label_formatter(&names, *x))
            .draw()
            .context("Failed to draw mesh")?;

        if violin {
            let peak = density.iter().cloned().fold(0.0, f64::max);
            if peak > 0.0 {
                let half = |d: f64| 0.4 * d / peak;
                let mut outline: Vec<(f64, f64)> =
                    grid.iter().zip(&density).map(|(&y, &d)| (0.5 + half(d), y)).collect();
                outline.extend(grid.iter().zip(&density).rev().map(|(&y, &d)| (0.5 - half(d), y)));
                chart
                    .draw_series(std::iter::once(Polygon::new(outline, color.mix(0.5).filled())))
                    .context("Failed to draw violin")?;
            }
        }

        let (left, right) = if violin { (0.47, 0.53) } else { (0.3, 0.7) };
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(left, summary.q1), (right, summary.q3)],
                if violin { BLACK.filled() } else { color.mix(0.6).filled() },
            )))
            .context("Failed to draw box")?;
        chart
            .draw_series(vec![
                PathElement::new(vec![(left, summary.median), (right, summary.median)], WHITE.stroke_width(2)),
                PathElement::new(vec![(0.5, summary.q3), (0.5, summary.upper_whisker)], BLACK.stroke_width(1)),
                PathElement::new(vec![(0.5, summary.q1), (0.5, summary.lower_whisker)], BLACK.stroke_width(1)),
            ])
            .context("Failed to draw whiskers")?;
        chart
            .draw_series(summary.outliers.iter().map(|&y| Circle::new((0.5, y), 3, BLACK.filled())))
            .context("Failed to draw outliers")?;

        root.present().context("Failed to present drawing")?;
        Ok(())
    }

    /// Kernel density estimate of one column
    pub fn draw_density(&mut self, values: &[f64], name: &str, color: RGBColor) -> Result<()> {
        let (grid, density) = stats::kde(values, 200);
        let x_range = padded_range(grid.iter().copied(), false).context("Cannot estimate density with no data")?;
        let y_range = padded_range(density.iter().copied(), true).context("Cannot estimate density with no data")?;

        let root = BitMapBackend::with_buffer(&mut self.buffer, (self.width, self.height))
            .into_drawing_area();
        root.fill(&WHITE).context("Failed to fill background")?;

        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(&self.title, ("sans-serif", 20))
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range, y_range)
            .context("Failed to build chart")?;

        chart
            .configure_mesh()
            .x_desc(name)
            .y_desc("density")
            .draw()
            .context("Failed to draw mesh")?;

        chart
            .draw_series(
                AreaSeries::new(grid.into_iter().zip(density), 0.0, color.mix(0.3).filled())
                    .border_style(color.stroke_width(2)),
            )
            .context("Failed to draw density")?;

        root.present().context("Failed to present drawing")?;
        Ok(())
    }

    /// Square matrix of values in [-1, 1]; `None` cells are grey
    pub fn draw_heatmap(&mut self, labels: &[String], cells: &[Vec<Option<f64>>]) -> Result<()> {
        if labels.is_empty() {
            anyhow::bail!("Cannot create heatmap with no columns");
        }

        let root = BitMapBackend::with_buffer(&mut self.buffer, (self.width, self.height))
            .into_drawing_area();
        root.fill(&WHITE).context("Failed to fill background")?;
        let root = if self.title.is_empty() {
            root
        } else {
            root.titled(&self.title, ("sans-serif", 20))
                .context("Failed to draw title")?
        };

        let (w, h) = root.dim_in_pixel();
        let (left, top) = (110i32, 30i32);
        let n = labels.len() as i32;
        let cell = ((w as i32 - left - 10) / n).min((h as i32 - top - 10) / n).max(1);

        for (c, label) in labels.iter().enumerate() {
            root.draw(&Text::new(
                label.clone(),
                (left + c as i32 * cell + 4, 8),
                ("sans-serif", 12).into_font(),
            ))
            .context("Failed to draw column label")?;
        }

        for (r, row) in cells.iter().enumerate() {
            let y0 = top + r as i32 * cell;
            root.draw(&Text::new(
                labels.get(r).cloned().unwrap_or_default(),
                (6, y0 + cell / 2 - 6),
                ("sans-serif", 12).into_font(),
            ))
            .context("Failed to draw row label")?;
            for (c, value) in row.iter().enumerate() {
                let x0 = left + c as i32 * cell;
                let fill = value.map(diverging).unwrap_or(RGBColor(220, 220, 220));
                root.draw(&Rectangle::new([(x0, y0), (x0 + cell, y0 + cell)], fill.filled()))
                    .context("Failed to draw heatmap cell")?;
                if let Some(v) = value {
                    root.draw(&Text::new(
                        format!("{:.2}", v),
                        (x0 + cell / 2 - 14, y0 + cell / 2 - 6),
                        ("sans-serif", 12).into_font(),
                    ))
                    .context("Failed to draw cell value")?;
                }
            }
        }

        root.present().context("Failed to present drawing")?;
        Ok(())
    }

    /// Scatter matrix: a histogram of each column on the diagonal, pairwise scatters elsewhere
    pub fn draw_pair(
        &mut self,
        names: &[String],
        columns: &[Vec<Option<f64>>],
        bins: usize,
        color: RGBColor,
    ) -> Result<()> {
        let n = columns.len();
        if n < 2 {
            anyhow::bail!("Cannot create pair plot with fewer than two columns");
        }
        let ranges: Vec<Option<Range<f64>>> = columns
            .iter()
            .map(|c| padded_range(c.iter().flatten().copied(), false))
            .collect();

        let root = BitMapBackend::with_buffer(&mut self.buffer, (self.width, self.height))
            .into_drawing_area();
        root.fill(&WHITE).context("Failed to fill background")?;
        let root = if self.title.is_empty() {
            root
        } else {
            root.titled(&self.title, ("sans-serif", 20))
                .context("Failed to draw title")?
        };

        let cells = root.split_evenly((n, n));
        for (idx, area) in cells.iter().enumerate() {
            let (row, col) = (idx / n, idx % n);
            let x_desc = if row == n - 1 { names.get(col).cloned() } else { None };
            let y_desc = if col == 0 { names.get(row).cloned() } else { None };

            let mut builder = ChartBuilder::on(area);
            builder
                .margin(4)
                .x_label_area_size(if row == n - 1 { 30 } else { 0 })
                .y_label_area_size(if col == 0 { 40 } else { 0 });

            if row == col {
                let values: Vec<f64> = columns[col].iter().flatten().copied().collect();
                let hist = stats::histogram(&values, bins)?;
                let (Some(first), Some(last)) = (hist.first(), hist.last()) else {
                    continue;
                };
                let max_count = hist.iter().map(|b| b.count).max().unwrap_or(0) as f64;
                let mut chart = builder
                    .build_cartesian_2d(first.start..last.end, 0.0..(max_count * 1.05).max(1.0))
                    .context("Failed to build pair cell")?;
                let mut mesh = chart.configure_mesh();
                mesh.x_labels(4).y_labels(4);
                if let Some(d) = x_desc {
                    mesh.x_desc(d);
                }
                if let Some(d) = y_desc {
                    mesh.y_desc(d);
                }
                mesh.draw().context("Failed to draw mesh")?;
                chart
                    .draw_series(hist.iter().map(|b| {
                        Rectangle::new([(b.start, 0.0), (b.end, b.count as f64)], color.filled())
                    }))
                    .context("Failed to draw histogram bars")?;
            } else {
                let points: Vec<(f64, f64)> = columns[col]
                    .iter()
                    .zip(&columns[row])
                    .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
                    .collect();
                let (Some(x_range), Some(y_range)) = (ranges[col].clone(), ranges[row].clone()) else {
                    continue;
                };
                if points.is_empty() {
                    continue;
                }
                let mut chart = builder
                    .build_cartesian_2d(x_range, y_range)
                    .context("Failed to build pair cell")?;
                let mut mesh = chart.configure_mesh();
                mesh.x_labels(4).y_labels(4);
                if let Some(d) = x_desc {
                    mesh.x_desc(d);
                }
                if let Some(d) = y_desc {
                    mesh.y_desc(d);
                }
                mesh.draw().context("Failed to draw mesh")?;
                chart
                    .draw_series(
                        points
                            .iter()
                            .map(|&(x, y)| Circle::new((x, y), 2, color.mix(0.7).filled())),
                    )
                    .context("Failed to draw point series")?;
            }
        }

        root.present().context("Failed to present drawing")?;
        Ok(())
    }

    /// Finalize and encode the canvas as PNG
    pub fn render(self) -> Result<Vec<u8>> {
        let mut png_bytes = Vec::new();
        {
            let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
            encoder
                .write_image(&self.buffer, self.width, self.height, image::ColorType::Rgb8)
                .context("Failed to encode PNG")?;
        }

        Ok(png_bytes)
    }
}

fn column_of<'a>(spec: &'a ChartSpec, role: Role) -> Result<&'a crate::table::Column> {
    let name = spec
        .column(role)
        .with_context(|| format!("{} chart has no {} binding", spec.chart, role.name()))?;
    spec.data
        .column(name)
        .with_context(|| format!("Column '{}' missing from chart data", name))
}

fn labels_and_values(spec: &ChartSpec) -> Result<(Vec<String>, Vec<f64>)> {
    let labels = column_of(spec, Role::Category)?.values().iter().map(Value::to_string).collect();
    let values = column_of(spec, Role::Value)?
        .values()
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0))
        .collect();
    Ok((labels, values))
}

fn fill_color(spec: &ChartSpec) -> Result<RGBColor> {
    match spec.options.fill.as_deref() {
        Some(fill) => parse_color(fill).with_context(|| format!("Unknown colour '{}'", fill)),
        None => Ok(palette_color(0)),
    }
}

fn scatter_points(spec: &ChartSpec) -> Result<Vec<(f64, f64, i32, RGBColor)>> {
    let xs = column_of(spec, Role::X)?.values();
    let ys = column_of(spec, Role::Y)?.values();
    let sizes: Option<Vec<Option<f64>>> = spec
        .column(Role::Size)
        .and_then(|s| spec.data.column(s))
        .map(|c| c.values().iter().map(Value::as_f64).collect());
    let size_range = sizes
        .as_ref()
        .and_then(|s| padded_range(s.iter().flatten().copied(), false))
        .map(|r| (r.start, r.end - r.start));
    let groups = spec.column(Role::Color).and_then(|c| spec.data.column(c));
    let group_values: Vec<Value> = groups
        .map(|c| crate::table::distinct(c.values().iter()))
        .unwrap_or_default();
    let fallback = fill_color(spec)?;

    let mut points = Vec::new();
    for row in 0..spec.data.row_count() {
        let (Some(x), Some(y)) = (xs[row].as_f64(), ys[row].as_f64()) else {
            continue;
        };
        let radius = match (&sizes, size_range) {
            (Some(s), Some((start, span))) if span > 0.0 => {
                3.0 + 12.0 * (s[row].unwrap_or(start) - start) / span
            }
            _ => 5.0,
        };
        let color = match groups {
            Some(col) => group_values
                .iter()
                .position(|g| g == &col.values()[row])
                .map(palette_color)
                .unwrap_or(RGBColor(127, 127, 127)),
            None => fallback,
        };
        points.push((x, y, radius.round() as i32, color));
    }
    Ok(points)
}

/// Draw a chart spec to PNG bytes. The spec is summarised first, so category,
/// trend and hierarchy charts show sums and heatmaps show correlations.
pub fn render_chart(spec: &ChartSpec, options: &RenderOptions, default_bins: usize) -> Result<Vec<u8>> {
    if spec.is_empty() {
        anyhow::bail!("Nothing to draw: the {} chart has no rows", spec.chart);
    }
    let drawn = spec.summarize().context("Failed to summarise chart data")?;
    let mut canvas = Canvas::new(options.width, options.height, drawn.options.title.clone())?;
    let color = fill_color(&drawn)?;

    match drawn.chart {
        ChartType::Bar => {
            let (labels, values) = labels_and_values(&drawn)?;
            canvas.draw_bars(&labels, &values, color)?;
        }
        ChartType::Pie => {
            let (labels, values) = labels_and_values(&drawn)?;
            canvas.draw_pie(&labels, &values, drawn.options.hole)?;
        }
        ChartType::Line | ChartType::Area => {
            let x = column_of(&drawn, Role::X)?;
            let ys: Vec<f64> = column_of(&drawn, Role::Y)?
                .values()
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0))
                .collect();
            let filled = drawn.chart == ChartType::Area;
            if x.kind() == ColumnType::Numeric {
                let xs: Vec<f64> = x.values().iter().map(|v| v.as_f64().unwrap_or(f64::NAN)).collect();
                canvas.draw_trend(&xs, &ys, None, color, filled)?;
            } else {
                let labels: Vec<String> = x.values().iter().map(Value::to_string).collect();
                let xs: Vec<f64> = (0..labels.len()).map(|i| i as f64).collect();
                canvas.draw_trend(&xs, &ys, Some(&labels), color, filled)?;
            }
        }
        ChartType::Scatter => {
            let points = scatter_points(&drawn)?;
            let x_desc = drawn.column(Role::X).unwrap_or_default();
            let y_desc = drawn.column(Role::Y).unwrap_or_default();
            canvas.draw_points(&points, x_desc, y_desc)?;
        }
        ChartType::Treemap => {
            let path = drawn.columns(Role::Path);
            let value = column_of(&drawn, Role::Value)?;
            let mut rows = Vec::with_capacity(drawn.data.row_count());
            for row in 0..drawn.data.row_count() {
                let labels = path
                    .iter()
                    .filter_map(|p| drawn.data.column(p))
                    .map(|c| c.values()[row].to_string())
                    .collect();
                rows.push((labels, value.values()[row].as_f64().unwrap_or(0.0)));
            }
            canvas.draw_treemap(&rows)?;
        }
        ChartType::Histogram | ChartType::Box | ChartType::Violin | ChartType::Density => {
            let column = column_of(&drawn, Role::Value)?;
            let values = column.numbers();
            match drawn.chart {
                ChartType::Histogram => {
                    let bins = stats::histogram(&values, drawn.options.bins.unwrap_or(default_bins))?;
                    canvas.draw_histogram(&bins, color, column.name())?;
                }
                ChartType::Density => canvas.draw_density(&values, column.name(), color)?,
                other => canvas.draw_distribution(&values, column.name(), other == ChartType::Violin, color)?,
            }
        }
        ChartType::Heatmap => {
            let label_col = drawn
                .data
                .column("column")
                .context("Correlation matrix has no label column")?;
            let labels: Vec<String> = label_col.values().iter().map(Value::to_string).collect();
            let cells: Vec<Vec<Option<f64>>> = (0..drawn.data.row_count())
                .map(|r| {
                    labels
                        .iter()
                        .map(|l| drawn.data.column(l).and_then(|c| c.values()[r].as_f64()))
                        .collect()
                })
                .collect();
            canvas.draw_heatmap(&labels, &cells)?;
        }
        ChartType::Pair => {
            let names: Vec<String> = drawn.columns(Role::Columns).iter().map(|s| s.to_string()).collect();
            let mut columns = Vec::with_capacity(names.len());
            for name in &names {
                let column = drawn
                    .data
                    .column(name)
                    .with_context(|| format!("Column '{}' missing from chart data", name))?;
                columns.push(column.values().iter().map(Value::as_f64).collect::<Vec<_>>());
            }
            let bins = drawn.options.bins.unwrap_or(default_bins);
            canvas.draw_pair(&names, &columns, bins, color)?;
        }
    }

    log::info!("rendered {} chart ({}x{})", drawn.chart, options.width, options.height);
    canvas.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{build_spec, Bindings};
    use crate::table::{Column, Table};

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("red"), Some(RED));
        assert_eq!(parse_color("#1f77b4"), Some(RGBColor(31, 119, 180)));
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(parse_color("chartreuse"), None);
    }

    #[test]
    fn test_padded_range() {
        assert_eq!(padded_range(vec![5.0], false), Some(4.0..6.0));
        assert_eq!(padded_range(vec![0.0, 10.0], false), Some(-0.5..10.5));
        let with_zero = padded_range(vec![2.0, 4.0], true).unwrap();
        assert!(with_zero.start < 0.0 && with_zero.end > 4.0);
        assert_eq!(padded_range(vec![f64::NAN], false), None);
    }

    #[test]
    fn test_slice_and_dice_covers_area() {
        let mut roots = Vec::new();
        TreeNode::insert(&mut roots, &["East".to_string(), "Tech".to_string()], 30.0);
        TreeNode::insert(&mut roots, &["East".to_string(), "Office".to_string()], 10.0);
        TreeNode::insert(&mut roots, &["West".to_string(), "Tech".to_string()], 40.0);
        let mut tiles = Vec::new();
        slice_and_dice(&roots, (0, 0, 800, 600), true, None, 0, &mut tiles);
        assert_eq!(tiles.len(), 3);
        let area: i32 = tiles.iter().map(|t| (t.rect.2 - t.rect.0) * (t.rect.3 - t.rect.1)).sum();
        assert_eq!(area, 800 * 600);
        // East gets half the width, split vertically 3:1
        assert_eq!(tiles[0].rect, (0, 0, 400, 450));
    }

    #[test]
    fn test_diverging_endpoints() {
        assert_eq!(diverging(0.0), WHITE);
        assert_eq!(diverging(1.0), RGBColor(180, 4, 38));
        assert_eq!(diverging(-2.0), RGBColor(59, 76, 192));
    }

    #[test]
    fn test_empty_spec_is_render_error() {
        let table = Table::new(vec![
            Column::new("Region", ColumnType::Text, vec![]),
            Column::new("Sales", ColumnType::Numeric, vec![]),
        ])
        .unwrap();
        let spec = build_spec(ChartType::Bar, &table, &Bindings::new().category("Region").value("Sales")).unwrap();
        assert!(render_chart(&spec, &RenderOptions::default(), 20).is_err());
    }

    #[test]
    fn test_pair_renders_png() {
        let nums = |v: &[f64]| v.iter().map(|&n| Value::Number(n)).collect::<Vec<_>>();
        let table = Table::new(vec![
            Column::new("Sales", ColumnType::Numeric, nums(&[100.0, 50.0, 30.0, 20.0])),
            Column::new("Profit", ColumnType::Numeric, nums(&[20.0, 5.0, -3.0, 1.0])),
            Column::new(
                "Quantity",
                ColumnType::Numeric,
                vec![Value::Number(2.0), Value::Null, Value::Number(3.0), Value::Number(4.0)],
            ),
        ])
        .unwrap();
        let spec = build_spec(ChartType::Pair, &table, &Bindings::new()).unwrap();
        assert_eq!(spec.columns(Role::Columns), vec!["Sales", "Profit", "Quantity"]);
        let png = render_chart(&spec, &RenderOptions::default(), 5).unwrap();
        assert!(png.starts_with(&[137, 80, 78, 71, 13, 10, 26, 10]));
    }
}

use crate::error::{DashError, Result};
use crate::filter::Level;
use crate::{OutputFormat, RenderOptions};
use serde::Deserialize;
use std::path::Path;

/// Physical header names of the columns the dashboard relies on.
/// Defaults match the Sample Superstore export.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnMap {
    pub order_date: String,
    pub region: String,
    pub state: String,
    pub city: String,
    pub category: String,
    pub sub_category: String,
    pub segment: String,
    pub sales: String,
    pub profit: String,
    pub quantity: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            order_date: "Order Date".to_string(),
            region: "Region".to_string(),
            state: "State".to_string(),
            city: "City".to_string(),
            category: "Category".to_string(),
            sub_category: "Sub-Category".to_string(),
            segment: "Segment".to_string(),
            sales: "Sales".to_string(),
            profit: "Profit".to_string(),
            quantity: "Quantity".to_string(),
        }
    }
}

impl ColumnMap {
    /// Column backing one level of the region → state → city hierarchy
    pub fn level(&self, level: Level) -> &str {
        match level {
            Level::Region => &self.region,
            Level::State => &self.state,
            Level::City => &self.city,
        }
    }

    pub fn categorical(&self) -> [&str; 6] {
        [
            &self.region,
            &self.state,
            &self.city,
            &self.category,
            &self.sub_category,
            &self.segment,
        ]
    }

    pub fn numeric(&self) -> [&str; 3] {
        [&self.sales, &self.profit, &self.quantity]
    }
}

/// Session-wide settings, read from a JSON file. Every field is optional.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    pub columns: ColumnMap,
    pub render: RenderOptions,
    /// Output used when the command line does not pick one
    pub format: OutputFormat,
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,
}

fn default_preview_rows() -> usize { 500 }
fn default_sample_rows() -> usize { 5 }
fn default_histogram_bins() -> usize { 20 }

pub const MAX_HISTOGRAM_BINS: usize = 500;

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            columns: ColumnMap::default(),
            render: RenderOptions::default(),
            format: OutputFormat::default(),
            preview_rows: default_preview_rows(),
            sample_rows: default_sample_rows(),
            histogram_bins: default_histogram_bins(),
        }
    }
}

impl DashboardConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: DashboardConfig = serde_json::from_str(text)
            .map_err(|e| DashError::Validation(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DashError::Validation(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.histogram_bins == 0 || self.histogram_bins > MAX_HISTOGRAM_BINS {
            return Err(DashError::Validation(format!(
                "histogram_bins must be between 1 and {}, got {}",
                MAX_HISTOGRAM_BINS, self.histogram_bins
            )));
        }
        if self.render.width == 0 || self.render.height == 0 {
            return Err(DashError::Validation(
                "render width and height must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

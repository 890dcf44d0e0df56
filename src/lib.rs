// Library exports for salesdash

pub mod aggregate;
pub mod chart;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod graph;
pub mod loader;
pub mod parser;
pub mod runtime;
pub mod session;
pub mod stats;
pub mod table;
pub mod views;

pub use error::{DashError, PipelineWarning, Result};
pub use session::{Session, TableStore};
pub use table::{Column, ColumnType, Table, Value};

use serde::Deserialize;

/// Byte format written to stdout
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[serde(rename = "csv")]
    #[default]
    Csv,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "png")]
    Png,
}

impl std::str::FromStr for OutputFormat {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            "png" => Ok(OutputFormat::Png),
            other => Err(DashError::Validation(format!(
                "Unknown output format '{}' (expected csv, json or png)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RenderOptions {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 600 }

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

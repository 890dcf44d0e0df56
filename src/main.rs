use anyhow::{Context, Result};
use clap::Parser;
use salesdash::config::DashboardConfig;
use salesdash::loader::{self, InputFormat};
use salesdash::{parser, runtime, OutputFormat, Session, TableStore};
use std::io::{self, Read, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "salesdash")]
#[command(about = "Filter, aggregate and chart sales data with a small query language", long_about = None)]
struct Args {
    /// Query string (e.g., 'region(East) | dates(from: "2015-01-01") | view(category_sales)')
    #[arg(default_value = "")]
    query: String,

    /// Dataset to load (csv, txt, json, xlsx, xls); CSV is read from stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// JSON dashboard configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format, overriding the configuration
    #[arg(short, long)]
    format: Option<OutputFormat>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DashboardConfig::from_path(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => DashboardConfig::default(),
    };
    let format = args.format.unwrap_or(config.format);

    // Read the dataset from the input file or stdin
    let (bytes, input_format) = match &args.input {
        Some(path) => {
            let input_format = InputFormat::from_path(path)?;
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read '{}'", path.display()))?;
            (bytes, input_format)
        }
        None => {
            let mut bytes = Vec::new();
            io::stdin()
                .read_to_end(&mut bytes)
                .context("Failed to read CSV from stdin")?;
            (bytes, InputFormat::Csv)
        }
    };
    let table = loader::load_bytes(bytes, input_format).context("Failed to load dataset")?;
    let store = TableStore::load(table, config.columns.clone()).context("Dataset does not fit the dashboard")?;
    let mut session = Session::new(store)?;

    let query = parser::parse(&args.query)?;

    let result = runtime::execute(&mut session, &config, &query).context("Failed to run query")?;
    for warning in &result.warnings {
        eprintln!("Warning: {}", warning);
    }

    let output = runtime::render(&result, format, &config).context("Failed to render output")?;

    // Write output to stdout
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(&output)
        .context("Failed to write output to stdout")?;
    handle.flush().context("Failed to flush stdout")?;

    Ok(())
}

use std::fs;
use std::io::Write;
use std::process::{Command, Stdio};

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/superstore_sample.csv");

/// Helper function to run salesdash with a query, extra flags and CSV on stdin
fn run_salesdash(query: &str, flags: &[&str], csv_content: &str) -> Result<Vec<u8>, String> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_salesdash"))
        .args(flags)
        .arg(query)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to spawn process: {}", e))?;

    // Write CSV to stdin
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(csv_content.as_bytes())
            .map_err(|e| format!("Failed to write to stdin: {}", e))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| format!("Failed to wait for process: {}", e))?;

    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(String::from_utf8_lossy(&output.stderr).to_string())
    }
}

fn run_csv(query: &str) -> Result<String, String> {
    let csv = fs::read_to_string(FIXTURE).expect("Failed to read test CSV");
    run_salesdash(query, &[], &csv).map(|bytes| String::from_utf8(bytes).expect("CSV output is UTF-8"))
}

/// Check if bytes are a valid PNG
fn is_valid_png(bytes: &[u8]) -> bool {
    bytes.len() > 8 && bytes[0..8] == [137, 80, 78, 71, 13, 10, 26, 10]
}

#[test]
fn test_end_to_end_region_sales() {
    let out = run_csv("view(region_sales)").unwrap();
    assert_eq!(out, "Region,Sales\nCentral,440\nEast,1290\nSouth,340\nWest,890\n");
}

#[test]
fn test_end_to_end_category_sales_after_date_window() {
    let out = run_csv(r#"dates(from: "2016-01-01", to: "2017-12-31") | view(category_sales)"#).unwrap();
    assert_eq!(out, "Category,Sales\nFurniture,260\nOffice Supplies,180\nTechnology,900\n");
}

#[test]
fn test_end_to_end_cascading_filter() {
    let out = run_csv("region(West) | state(California) | sum(by: City, of: Sales)").unwrap();
    assert_eq!(out, "City,Sales\nLos Angeles,330\nSan Francisco,60\n");
}

#[test]
fn test_end_to_end_region_change_drops_stale_city() {
    // Buffalo is not offered once the region moves to West, so the city selection is dropped
    let out = run_csv("city(Buffalo) | region(West) | sum(by: State, of: Sales)").unwrap();
    assert_eq!(out, "State,Sales\nCalifornia,390\nWashington,500\n");
}

#[test]
fn test_end_to_end_monthly_trend() {
    let out = run_csv(r#"dates(from: "2016-01-01") | monthly(of: Sales)"#).unwrap();
    assert_eq!(
        out,
        "month_year,Sales\n2016-01,260\n2016-05,80\n2016-07,30\n2017-10,900\n2017-12,70\n"
    );
}

#[test]
fn test_end_to_end_pivot_by_year_month() {
    let out = run_csv(r#"region(Central) | pivot(rows: Category, cols: month_year, of: Profit)"#).unwrap();
    assert_eq!(
        out,
        "Category,2015-11,2015-12,2017-12\n\
         Furniture,-15,,\n\
         Office Supplies,,,-40\n\
         Technology,,18,\n"
    );
}

#[test]
fn test_end_to_end_projection() {
    let out = run_csv("city(Seattle) | columns(City, Sales, Profit)").unwrap();
    assert_eq!(out, "City,Sales,Profit\nSeattle,500,-60\n");
}

#[test]
fn test_end_to_end_dates_are_iso_in_output() {
    let out = run_csv(r#"city(Dallas) | columns("Order Date", City)"#).unwrap();
    assert_eq!(out, "Order Date,City\n2017-12-24,Dallas\n");
}

#[test]
fn test_end_to_end_heatmap_table_is_correlation() {
    let out = run_csv("chart(heatmap, columns: [Sales, Profit, Quantity])").unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "column,Sales,Profit,Quantity");
    assert_eq!(lines.len(), 4);
    let cells: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(cells[0], "Sales");
    let diagonal: f64 = cells[1].parse().expect("numeric cell");
    assert!((diagonal - 1.0).abs() < 1e-9, "{}", lines[1]);
}

#[test]
fn test_end_to_end_json_output() {
    let csv = fs::read_to_string(FIXTURE).expect("Failed to read test CSV");
    let bytes = run_salesdash("sum(by: Segment, of: Quantity)", &["--format", "json"], &csv).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).expect("Output is not JSON");
    let records = value.as_array().expect("Expected an array");
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["Segment"], "Consumer");
    assert_eq!(records[0]["Quantity"].as_f64(), Some(21.0));
    assert_eq!(records[1]["Segment"], "Corporate");
    assert_eq!(records[1]["Quantity"].as_f64(), Some(13.0));
    assert_eq!(records[2]["Quantity"].as_f64(), Some(4.0));
}

#[test]
fn test_end_to_end_bar_chart_png() {
    let csv = fs::read_to_string(FIXTURE).expect("Failed to read test CSV");
    let result = run_salesdash("view(category_sales)", &["--format", "png"], &csv);
    assert!(result.is_ok(), "Failed: {:?}", result.err());
    assert!(is_valid_png(&result.unwrap()), "Output is not a valid PNG");
}

#[test]
fn test_end_to_end_donut_png() {
    let csv = fs::read_to_string(FIXTURE).expect("Failed to read test CSV");
    let result = run_salesdash(
        r#"chart(pie, category: Region, value: Sales, hole: 0.5, title: "Region wise Sales")"#,
        &["--format", "png"],
        &csv,
    );
    assert!(result.is_ok(), "Failed: {:?}", result.err());
    assert!(is_valid_png(&result.unwrap()));
}

#[test]
fn test_end_to_end_empty_selection_warns() {
    let csv = fs::read_to_string(FIXTURE).expect("Failed to read test CSV");
    let mut child = Command::new(env!("CARGO_BIN_EXE_salesdash"))
        .arg("region(East) | state(Texas) | view(category_sales)")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn process");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(csv.as_bytes())
        .expect("Failed to write to stdin");
    let output = child.wait_with_output().expect("Failed to wait for process");

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "Category,Sales\n");
    assert!(String::from_utf8_lossy(&output.stderr).contains("Warning"));
}

#[test]
fn test_end_to_end_json_input_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .expect("Failed to create temp file");
    write!(
        file,
        r#"[
  {{"Order Date": "2015-03-01", "Region": "East", "State": "New York", "City": "Albany", "Category": "Furniture", "Sub-Category": "Chairs", "Segment": "Consumer", "Sales": 10, "Profit": 2, "Quantity": 1}},
  {{"Order Date": "2015-04-01", "Region": "East", "State": "New York", "City": "Albany", "Category": "Furniture", "Sub-Category": "Chairs", "Segment": "Consumer", "Sales": 15, "Profit": 3, "Quantity": 2}}
]"#
    )
    .expect("Failed to write temp file");

    let path = file.path().to_str().expect("temp path is UTF-8").to_string();
    let out = run_salesdash("sum(by: City, of: Sales)", &["--input", &path], "").unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "City,Sales\nAlbany,25\n");
}

#[test]
fn test_end_to_end_config_sets_format_and_columns() {
    let mut config = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    write!(config, r#"{{"format": "json", "columns": {{"sales": "Profit"}}}}"#).expect("Failed to write config");

    let csv = fs::read_to_string(FIXTURE).expect("Failed to read test CSV");
    let path = config.path().to_str().expect("temp path is UTF-8").to_string();
    let bytes = run_salesdash("view(segment_sales)", &["--config", &path], &csv).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).expect("Output is not JSON");
    assert_eq!(value[0]["Segment"], "Consumer");
    assert_eq!(value[0]["Profit"].as_f64(), Some(-19.0));
}

#[test]
fn test_error_parse_failure() {
    let err = run_csv("region(East) | explode()").unwrap_err();
    assert!(err.contains("Parse error"), "{}", err);
}

#[test]
fn test_error_two_terminal_stages() {
    let err = run_csv("view(data) | view(sample)").unwrap_err();
    assert!(err.contains("may end with one"), "{}", err);
}

#[test]
fn test_error_missing_required_column() {
    let csv = "Order Date,Region,Sales\n1/1/2015,East,10\n";
    let err = run_salesdash("view(data)", &[], csv).unwrap_err();
    assert!(err.contains("Schema error"), "{}", err);
    assert!(err.contains("City"), "{}", err);
}

#[test]
fn test_error_incompatible_binding() {
    let err = run_csv("chart(scatter, x: Region, y: Sales)").unwrap_err();
    assert!(err.contains("Cannot bind column 'Region'"), "{}", err);
}

#[test]
fn test_error_png_without_chart() {
    let csv = fs::read_to_string(FIXTURE).expect("Failed to read test CSV");
    let err = run_salesdash("sum(by: Region, of: Sales)", &["--format", "png"], &csv).unwrap_err();
    assert!(err.contains("PNG output needs a chart"), "{}", err);
}

#[test]
fn test_error_reversed_dates() {
    let err = run_csv(r#"dates(from: "2017-01-01", to: "2016-01-01")"#).unwrap_err();
    assert!(err.contains("Invalid date range"), "{}", err);
}

use crate::error::{DashError, Result};
use crate::table::{Column, ColumnType, Table, Value};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Days, NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;

/// Supported upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Json,
    Excel,
}

impl InputFormat {
    /// Pick a format from a file extension (csv, txt, json, xlsx, xls)
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "txt" => Ok(InputFormat::Csv),
            "json" => Ok(InputFormat::Json),
            "xlsx" | "xls" => Ok(InputFormat::Excel),
            other => Err(DashError::Load(format!(
                "Unsupported file extension '{}' for '{}'",
                other,
                path.display()
            ))),
        }
    }
}

pub fn load_bytes(bytes: Vec<u8>, format: InputFormat) -> Result<Table> {
    let table = match format {
        InputFormat::Csv => load_csv(&bytes)?,
        InputFormat::Json => {
            let value: JsonValue = serde_json::from_slice(&bytes)
                .map_err(|e| DashError::Load(format!("Invalid JSON: {}", e)))?;
            load_json(&value)?
        }
        InputFormat::Excel => load_excel(bytes)?,
    };
    log::info!(
        "loaded {} rows x {} columns ({:?})",
        table.row_count(),
        table.column_count(),
        format
    );
    Ok(table)
}

/// Parse delimited text with a header row. Bytes that are not valid UTF-8 are read as Latin-1.
pub fn load_csv(bytes: &[u8]) -> Result<Table> {
    let text = decode_text(bytes);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| DashError::Load(format!("Failed to read CSV headers: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| DashError::Load(format!("Failed to read CSV record {}: {}", line + 1, e)))?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    build_table(headers, rows)
}

fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            log::warn!("input is not valid UTF-8, decoding as Latin-1");
            Cow::Owned(bytes.iter().map(|&b| b as char).collect())
        }
    }
}

/// Create a table from a JSON array of objects. Headers come from the first object.
pub fn load_json(value: &JsonValue) -> Result<Table> {
    let array = value
        .as_array()
        .ok_or_else(|| DashError::Load("Input data must be a JSON array of objects".to_string()))?;

    let first_obj = array
        .first()
        .and_then(|v| v.as_object())
        .ok_or_else(|| DashError::Load("Items in array must be objects".to_string()))?;

    let headers: Vec<String> = first_obj.keys().cloned().collect();

    let mut rows = Vec::with_capacity(array.len());
    for item in array {
        let obj = item
            .as_object()
            .ok_or_else(|| DashError::Load("Items in array must be objects".to_string()))?;

        let mut row = Vec::with_capacity(headers.len());
        for header in &headers {
            let cell = match obj.get(header) {
                Some(JsonValue::String(s)) => s.clone(),
                Some(JsonValue::Number(n)) => n.to_string(),
                Some(JsonValue::Bool(b)) => b.to_string(),
                Some(JsonValue::Null) | None => String::new(),
                _ => {
                    return Err(DashError::Load(format!(
                        "Unsupported value type for field '{}'",
                        header
                    )))
                }
            };
            row.push(cell);
        }
        rows.push(row);
    }

    build_table(headers, rows)
}

/// Read the first worksheet of an xlsx/xls workbook
pub fn load_excel(bytes: Vec<u8>) -> Result<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| DashError::Load(format!("Cannot open workbook: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DashError::Load("Workbook has no worksheets".to_string()))?
        .map_err(|e| DashError::Load(format!("Cannot read first worksheet: {}", e)))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| DashError::Load("Worksheet is empty".to_string()))?
        .iter()
        .map(|c| cell_to_string(c).trim().to_string())
        .collect();

    let data = rows
        .map(|r| r.iter().map(cell_to_string).collect())
        .collect();

    build_table(headers, data)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.clone(),
        _ => String::new(),
    }
}

/// Excel serial day number (1900 date system) to a calendar date
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.floor() as u64))
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m-%d-%Y", "%d-%m-%Y", "%d/%m/%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parse a date cell. Month-first formats win when a value is ambiguous.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn infer_type(cells: &[&str]) -> ColumnType {
    let present: Vec<&str> = cells.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect();
    if present.is_empty() {
        return ColumnType::Text;
    }
    if present.iter().all(|c| c.parse::<f64>().is_ok()) {
        ColumnType::Numeric
    } else if present.iter().all(|c| parse_bool(c).is_some()) {
        ColumnType::Boolean
    } else if present.iter().all(|c| parse_date(c).is_some()) {
        ColumnType::Date
    } else {
        ColumnType::Text
    }
}

fn convert(cell: &str, kind: ColumnType) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    let converted = match kind {
        ColumnType::Numeric => trimmed.parse::<f64>().ok().map(Value::Number),
        ColumnType::Boolean => parse_bool(trimmed).map(Value::Bool),
        ColumnType::Date => parse_date(trimmed).map(Value::Date),
        ColumnType::Text => Some(Value::Text(cell.to_string())),
    };
    converted.unwrap_or(Value::Null)
}

/// Turn raw string cells into a typed columnar table
pub fn build_table(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Table> {
    if headers.is_empty() {
        return Err(DashError::Load("Input has no columns".to_string()));
    }

    let mut columns = Vec::with_capacity(headers.len());
    for (idx, header) in headers.into_iter().enumerate() {
        let cells: Vec<&str> = rows
            .iter()
            .map(|r| r.get(idx).map(String::as_str).unwrap_or(""))
            .collect();
        let kind = infer_type(&cells);
        let values = cells.iter().map(|c| convert(c, kind)).collect();
        log::debug!("column '{}' inferred as {}", header, kind);
        columns.push(Column::new(header, kind, values));
    }

    Table::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_csv_infers_types() {
        let csv = "Order Date,Region,Sales,Returned\n11/8/2016,South,261.96,true\n2016-06-12,West,14.62,false\n";
        let table = load_csv(csv.as_bytes()).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(
            table.column_types(),
            vec![
                ("Order Date", ColumnType::Date),
                ("Region", ColumnType::Text),
                ("Sales", ColumnType::Numeric),
                ("Returned", ColumnType::Boolean),
            ]
        );
        let dates = table.column("Order Date").unwrap().values();
        assert_eq!(dates[0], Value::Date(NaiveDate::from_ymd_opt(2016, 11, 8).unwrap()));
    }

    #[test]
    fn test_load_csv_empty_cells_are_null() {
        let csv = "a,b\n1,\n,x\n";
        let table = load_csv(csv.as_bytes()).unwrap();
        assert_eq!(table.column("a").unwrap().values()[1], Value::Null);
        assert_eq!(table.column("b").unwrap().values()[0], Value::Null);
    }

    #[test]
    fn test_load_csv_latin1() {
        let bytes = b"City,Sales\nQu\xe9bec,10\n".to_vec();
        let table = load_csv(&bytes).unwrap();
        assert_eq!(
            table.column("City").unwrap().values()[0],
            Value::Text("Québec".to_string())
        );
    }

    #[test]
    fn test_load_csv_header_only_gives_empty_text_columns() {
        let table = load_csv(b"x,y\n").unwrap();
        assert_eq!(table.row_count(), 0);
        assert_eq!(
            table.column_types(),
            vec![("x", ColumnType::Text), ("y", ColumnType::Text)]
        );
        assert!(load_csv(b"").is_err());
    }

    #[test]
    fn test_mixed_column_is_text() {
        let csv = "code\n10\nA7\n";
        let table = load_csv(csv.as_bytes()).unwrap();
        assert_eq!(table.column("code").unwrap().kind(), ColumnType::Text);
    }

    #[test]
    fn test_load_json() {
        let value = json!([
            {"Region": "East", "Sales": 100},
            {"Region": "West", "Sales": 50.5}
        ]);
        let table = load_json(&value).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column("Sales").unwrap().numbers(), vec![100.0, 50.5]);
    }

    #[test]
    fn test_load_json_rejects_nested() {
        let value = json!([{"a": [1, 2]}]);
        assert!(load_json(&value).is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2015, 3, 4);
        assert_eq!(parse_date("2015-03-04"), expected);
        assert_eq!(parse_date("3/4/2015"), expected);
        assert_eq!(parse_date("2015-03-04 10:30:00"), expected);
        assert_eq!(parse_date("25-12-2015"), NaiveDate::from_ymd_opt(2015, 12, 25));
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_excel_serial_dates() {
        assert_eq!(excel_serial_to_date(42005.0), NaiveDate::from_ymd_opt(2015, 1, 1));
        assert_eq!(excel_serial_to_date(-1.0), None);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(InputFormat::from_path(Path::new("a.CSV")).unwrap(), InputFormat::Csv);
        assert_eq!(InputFormat::from_path(Path::new("a.xlsx")).unwrap(), InputFormat::Excel);
        assert!(InputFormat::from_path(Path::new("a.parquet")).is_err());
    }
}

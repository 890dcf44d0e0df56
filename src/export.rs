use crate::error::{DashError, Result};
use crate::table::{Table, Value};
use serde_json::{Map, Number, Value as JsonValue};

/// Serialise a table as CSV with a header row. Nulls become empty fields.
pub fn to_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(table.column_names())
        .map_err(|e| DashError::Export(format!("Failed to write CSV header: {}", e)))?;

    for i in 0..table.row_count() {
        let record: Vec<String> = table.row(i).iter().map(|v| v.to_string()).collect();
        writer
            .write_record(&record)
            .map_err(|e| DashError::Export(format!("Failed to write CSV row {}: {}", i + 1, e)))?;
    }

    writer
        .into_inner()
        .map_err(|e| DashError::Export(format!("Failed to flush CSV output: {}", e)))
}

fn json_value(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Number(n) => Number::from_f64(*n).map(JsonValue::Number).unwrap_or(JsonValue::Null),
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Date(_) => JsonValue::String(value.to_string()),
        Value::Bool(b) => JsonValue::Bool(*b),
    }
}

/// Records as a JSON array of objects. Keys follow column order.
pub fn to_json_value(table: &Table) -> JsonValue {
    let names = table.column_names();
    let records = (0..table.row_count())
        .map(|i| {
            let mut object = Map::new();
            for (name, value) in names.iter().zip(table.row(i)) {
                object.insert(name.to_string(), json_value(value));
            }
            JsonValue::Object(object)
        })
        .collect();
    JsonValue::Array(records)
}

pub fn to_json(table: &Table) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(&to_json_value(table))
        .map_err(|e| DashError::Export(format!("Failed to serialise JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate, AggregationSpec};
    use crate::loader;
    use crate::table::{Column, ColumnType};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn make_table() -> Table {
        Table::new(vec![
            Column::new(
                "Order Date",
                ColumnType::Date,
                vec![
                    Value::Date(NaiveDate::from_ymd_opt(2015, 6, 1).unwrap()),
                    Value::Date(NaiveDate::from_ymd_opt(2016, 1, 31).unwrap()),
                ],
            ),
            Column::new(
                "City",
                ColumnType::Text,
                vec![Value::Text("Salt Lake City".into()), Value::Text("Dallas, TX".into())],
            ),
            Column::new("Sales", ColumnType::Numeric, vec![Value::Number(12.5), Value::Null]),
        ])
        .unwrap()
    }

    #[test]
    fn test_csv_output() {
        let csv = String::from_utf8(to_csv(&make_table()).unwrap()).unwrap();
        assert_eq!(
            csv,
            "Order Date,City,Sales\n2015-06-01,Salt Lake City,12.5\n2016-01-31,\"Dallas, TX\",\n"
        );
    }

    #[test]
    fn test_csv_round_trip() {
        let table = make_table();
        let reloaded = loader::load_csv(&to_csv(&table).unwrap()).unwrap();
        assert_eq!(reloaded, table);
    }

    #[test]
    fn test_json_keeps_column_order() {
        let json = String::from_utf8(to_json(&make_table()).unwrap()).unwrap();
        let date = json.find("Order Date").unwrap();
        let city = json.find("City").unwrap();
        let sales = json.find("Sales").unwrap();
        assert!(date < city && city < sales);
    }

    #[test]
    fn test_json_values() {
        let value = to_json_value(&make_table());
        assert_eq!(value[0]["Sales"], serde_json::json!(12.5));
        assert_eq!(value[1]["Sales"], JsonValue::Null);
        assert_eq!(value[1]["Order Date"], serde_json::json!("2016-01-31"));
    }

    #[test]
    fn test_empty_table_exports_header_only() {
        let empty = make_table().take_rows(&[]);
        let csv = String::from_utf8(to_csv(&empty).unwrap()).unwrap();
        assert_eq!(csv, "Order Date,City,Sales\n");
        assert_eq!(to_json_value(&empty), JsonValue::Array(Vec::new()));
    }

    #[test]
    fn test_empty_summary_round_trip() {
        let empty = make_table().take_rows(&[]);
        let summary = aggregate(&empty, &AggregationSpec::by_columns(&["City"], "Sales")).unwrap();
        assert!(summary.is_empty());

        let csv = to_csv(summary.table()).unwrap();
        assert_eq!(String::from_utf8(csv.clone()).unwrap(), "City,Sales\n");
        let reloaded = loader::load_csv(&csv).unwrap();
        assert_eq!(reloaded.column_names(), vec!["City", "Sales"]);
        assert_eq!(reloaded.row_count(), 0);
    }
}

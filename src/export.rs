//! Export: serialise an extracted record as a JSON or CSV download.
//!
//! Both exports work on the raw record, so every key the model produced is
//! kept, in the order it produced them.
//!
//! CSV columns are the keys of the first record. Rows missing a key get an
//! empty cell; keys that appear only in later rows are not exported. Cells
//! are quoted by the `csv` writer, so commas, quotes and newlines inside
//! item names survive a round trip.

use crate::error::ReceiptError;
use crate::receipt::ExtractedRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Download format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    /// `Content-Type` of the exported bytes.
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ReceiptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ReceiptError::invalid_input(format!(
                "unknown export format '{other}' (expected json or csv)"
            ))),
        }
    }
}

/// Serialise `record` in `format`.
pub fn export_as(record: &ExtractedRecord, format: ExportFormat) -> Result<Vec<u8>, ReceiptError> {
    let bytes = match format {
        ExportFormat::Json => serde_json::to_vec_pretty(record).map_err(|e| ReceiptError::Export {
            format: format.to_string(),
            detail: e.to_string(),
        })?,
        ExportFormat::Csv => to_csv(record)?,
    };
    debug!("Exported {} rows as {} ({} bytes)", record.len(), format, bytes.len());
    Ok(bytes)
}

fn to_csv(record: &ExtractedRecord) -> Result<Vec<u8>, ReceiptError> {
    let csv_err = |detail: String| ReceiptError::Export {
        format: "csv".to_string(),
        detail,
    };

    let Some(first) = record.first() else {
        return Ok(Vec::new());
    };
    let header: Vec<&str> = first.keys().map(String::as_str).collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&header)
        .map_err(|e| csv_err(e.to_string()))?;

    for row in record.rows() {
        let cells = header.iter().map(|key| cell(row.get(*key)));
        writer
            .write_record(cells)
            .map_err(|e| csv_err(e.to_string()))?;
    }

    writer.into_inner().map_err(|e| csv_err(e.to_string()))
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        // Numbers and bools print as-is; nested values as compact JSON.
        Some(other) => other.to_string(),
    }
}

/// Download name: `receipt-<receipt_number>.<ext>`, falling back to the
/// date, then to `receipt-data.<ext>`.
pub fn export_filename(record: &ExtractedRecord, format: ExportFormat) -> String {
    let stem = ["receipt_number", "date"]
        .iter()
        .filter_map(|key| record.header_text(key))
        .map(|raw| sanitise(&raw))
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| "data".to_string());

    format!("receipt-{}.{}", stem, format.extension())
}

/// Keep `[A-Za-z0-9._-]`, map everything else to `-`.
fn sanitise(raw: &str) -> String {
    let mapped: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    mapped.trim_matches(|c| c == '-' || c == '.').to_string()
}

/// Export to `path`.
///
/// Uses atomic write (temp file + rename) so a failed export never leaves
/// a partial file behind.
pub async fn write_export(
    record: &ExtractedRecord,
    format: ExportFormat,
    path: impl AsRef<Path>,
) -> Result<(), ReceiptError> {
    let path = path.as_ref();
    let bytes = export_as(record, format)?;
    let write_err = |e: std::io::Error| ReceiptError::ExportWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension(format!("{}.tmp", format.extension()));
    tokio::fs::write(&tmp_path, &bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> ExtractedRecord {
        ExtractedRecord::from_value(v, "").unwrap()
    }

    #[test]
    fn csv_round_trips_through_a_reader() {
        let rec = record(json!([
            {"receipt_number": "0187", "item_name": "Cheese, Gouda", "quantity": 0.45, "line_total": "5.81"},
            {"receipt_number": "0187", "item_name": "Say \"cheese\"\nplease", "quantity": 1, "line_total": "2.00"}
        ]));
        let bytes = export_as(&rec, ExportFormat::Csv).unwrap();

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            ["receipt_number", "item_name", "quantity", "line_total"]
        );
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "Cheese, Gouda");
        assert_eq!(&rows[0][2], "0.45");
        assert_eq!(&rows[1][1], "Say \"cheese\"\nplease");
    }

    #[test]
    fn csv_fills_missing_and_null_with_empty_cells() {
        let rec = record(json!([
            {"a": 1, "b": null, "c": true},
            {"a": 2, "d": "ignored"}
        ]));
        let text = String::from_utf8(export_as(&rec, ExportFormat::Csv).unwrap()).unwrap();
        assert_eq!(text, "a,b,c\n1,,true\n2,,\n");
    }

    #[test]
    fn csv_nested_values_are_compact_json() {
        let rec = record(json!({"merchant_name": "Shop", "items": [{"name": "X"}]}));
        let bytes = export_as(&rec, ExportFormat::Csv).unwrap();
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[1], r#"[{"name":"X"}]"#);
    }

    #[test]
    fn csv_of_empty_record_is_empty() {
        let rec = record(json!([]));
        assert!(export_as(&rec, ExportFormat::Csv).unwrap().is_empty());
    }

    #[test]
    fn json_export_is_pretty_and_faithful() {
        let v = json!([{"item_name": "Tea", "quantity": 2}]);
        let rec = record(v.clone());
        let bytes = export_as(&rec, ExportFormat::Json).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\n  "));
        let back: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn filename_prefers_receipt_number_then_date() {
        let rec = record(json!([{"receipt_number": "A/17 b", "date": "2024-03-01"}]));
        assert_eq!(export_filename(&rec, ExportFormat::Csv), "receipt-A-17-b.csv");

        let rec = record(json!({"date": "01.03.2024"}));
        assert_eq!(export_filename(&rec, ExportFormat::Json), "receipt-01.03.2024.json");

        let rec = record(json!({"total": 1}));
        assert_eq!(export_filename(&rec, ExportFormat::Json), "receipt-data.json");

        let rec = record(json!({"receipt_number": "///"}));
        assert_eq!(export_filename(&rec, ExportFormat::Csv), "receipt-data.csv");
    }

    #[test]
    fn format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().unwrap_err().is_client_error());
    }

    #[tokio::test]
    async fn write_export_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("receipt.csv");
        let rec = record(json!([{"item_name": "Tea"}]));

        write_export(&rec, ExportFormat::Csv, &path).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "item_name\nTea\n");
        assert!(!path.with_extension("csv.tmp").exists());
    }
}

use std::collections::HashSet;
use std::path::Path;

use bytes::Bytes;

use crate::error::AppError;
use crate::models::{CellValue, Row};
use crate::services::excel::{self, utils::unique_header};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Lower-cased extension of an uploaded file name, if any.
pub fn file_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Decodes an uploaded file into rows keyed by the header row.
pub fn decode(file_data: Bytes, extension: &str) -> Result<Vec<Row>, AppError> {
    let extension = extension.trim_start_matches('.').to_lowercase();
    tracing::info!("Decoding {} file ({}KB)", extension, file_data.len() / 1024);

    match extension.as_str() {
        "csv" => decode_csv(&file_data),
        "xlsx" => excel::read_xlsx(file_data),
        "xls" => excel::read_xls(file_data),
        other => Err(AppError::UnsupportedType(format!(
            "'{}'. Please upload a CSV or Excel file.",
            other
        ))),
    }
}

fn decode_csv(file_data: &[u8]) -> Result<Vec<Row>, AppError> {
    let file_data = file_data.strip_prefix(UTF8_BOM).unwrap_or(file_data);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file_data);

    let mut existing_names = HashSet::new();
    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(|e| AppError::FileProcessing(format!("Unable to read CSV headers: {}", e)))?
        .iter()
        .map(|header| unique_header(&String::from_utf8_lossy(header), &mut existing_names))
        .collect();

    // Invalid UTF-8 (e.g. Latin-1 exports) is replaced rather than rejected.
    let mut rows = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record
            .map_err(|e| AppError::FileProcessing(format!("Unable to read CSV row {}: {}", idx + 1, e)))?;
        if record.len() > headers.len() {
            tracing::debug!(
                "CSV row {} has {} fields for {} columns; extra fields ignored",
                idx + 1,
                record.len(),
                headers.len()
            );
        }
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| {
                (header.clone(), CellValue::text(String::from_utf8_lossy(value)))
            })
            .collect();
        rows.push(row);
    }

    tracing::info!("Read {} CSV rows x {} columns", rows.len(), headers.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_str(csv: &str) -> Vec<Row> {
        decode(Bytes::from(csv.to_string()), "csv").expect("csv should decode")
    }

    #[test]
    fn csv_rows_are_keyed_by_header() {
        let rows = decode_str("Name,Sales\n Alice ,100\n,\nBob,200\n");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("Name"), Some(&CellValue::text(" Alice ")));
        assert_eq!(rows[0].get("Sales"), Some(&CellValue::text("100")));
        assert!(rows[1].is_blank());
        assert_eq!(rows[2].columns().collect::<Vec<_>>(), vec!["Name", "Sales"]);
    }

    #[test]
    fn csv_handles_bom_ragged_rows_and_duplicate_headers() {
        let rows = decode_str("\u{feff}Name,Name,City\nAlice,Smith\nBob,Jones,Paris,extra\n");
        assert_eq!(rows[0].columns().collect::<Vec<_>>(), vec!["Name", "Name_1"]);
        assert_eq!(rows[1].len(), 3);
        assert_eq!(rows[1].get("City"), Some(&CellValue::text("Paris")));
    }

    #[test]
    fn csv_tolerates_invalid_utf8() {
        let data = Bytes::from_static(b"Name,City\nJos\xE9,Montr\xE9al\nAnn,Paris\n");
        let rows = decode(data, "csv").expect("latin-1 csv should decode");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Name"), Some(&CellValue::text("Jos\u{FFFD}")));
        assert_eq!(rows[1].get("City"), Some(&CellValue::text("Paris")));
    }

    #[test]
    fn xlsx_reads_first_sheet_with_typed_cells() {
        let data = Bytes::from_static(include_bytes!("../../tests/fixtures/sales.xlsx"));
        let rows = decode(data, "xlsx").expect("xlsx should decode");

        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0].columns().collect::<Vec<_>>(),
            vec!["Name", "Sales", "Active", "__EMPTY"]
        );
        assert_eq!(rows[0].get("Name"), Some(&CellValue::text("Alice")));
        assert!(matches!(
            rows[0].get("Sales"),
            Some(CellValue::Number(n)) if n.as_f64() == Some(100.0)
        ));
        assert_eq!(rows[0].get("Active"), Some(&CellValue::Bool(true)));
        assert_eq!(rows[0].get("__EMPTY"), Some(&CellValue::Empty));

        // missing cells stay in the row as empty values
        assert_eq!(rows[1].get("Sales"), Some(&CellValue::Empty));
        assert_eq!(rows[1].get("Active"), Some(&CellValue::Bool(false)));

        assert!(matches!(
            rows[2].get("Sales"),
            Some(CellValue::Number(n)) if n.as_f64() == Some(12.5)
        ));
        assert_eq!(rows[2].get("__EMPTY"), Some(&CellValue::text("note")));

        // the second sheet is never read
        assert!(rows.iter().all(|row| row.get("Ignored").is_none()));
    }

    #[test]
    fn extension_is_case_insensitive() {
        let rows = decode(Bytes::from_static(b"a\n1\n"), "CSV").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(file_extension("Report.Final.XLSX").as_deref(), Some("xlsx"));
        assert_eq!(file_extension("noext"), None);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = decode(Bytes::from_static(b"%PDF"), "pdf").unwrap_err();
        assert!(matches!(err, AppError::UnsupportedType(_)));
    }
}

use std::collections::HashSet;
use std::io::{Cursor, Read, Seek};

use bytes::Bytes;
use calamine::{open_workbook_from_rs, Reader, Xls, Xlsx};

use super::utils::{cell_value, header_text, unique_header};
use crate::error::AppError;
use crate::models::{CellValue, Row};

pub fn read_xlsx(file_data: Bytes) -> Result<Vec<Row>, AppError> {
    let workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(file_data)).map_err(|e| {
        tracing::error!("Failed to open Excel file: {}", e);
        AppError::FileProcessing(format!("Failed to open Excel file: {}", e))
    })?;
    read_first_sheet(workbook)
}

pub fn read_xls(file_data: Bytes) -> Result<Vec<Row>, AppError> {
    let workbook: Xls<_> = open_workbook_from_rs(Cursor::new(file_data)).map_err(|e| {
        tracing::error!("Failed to open legacy Excel file: {}", e);
        AppError::FileProcessing(format!("Failed to open Excel file: {}", e))
    })?;
    read_first_sheet(workbook)
}

/// Reads the first worksheet; its first row names the columns.
fn read_first_sheet<RS, R>(mut workbook: R) -> Result<Vec<Row>, AppError>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    let sheet_names = workbook.sheet_names().to_vec();
    tracing::info!("Found {} sheets: {:?}", sheet_names.len(), sheet_names);

    let sheet_name = sheet_names
        .first()
        .cloned()
        .ok_or_else(|| AppError::FileProcessing("No sheets found in workbook".to_string()))?;

    let range = workbook.worksheet_range(&sheet_name).map_err(|e| {
        AppError::FileProcessing(format!("Failed to read worksheet {}: {}", sheet_name, e))
    })?;

    let mut rows_iter = range.rows();
    let Some(header_row) = rows_iter.next() else {
        tracing::warn!("Sheet {} is empty", sheet_name);
        return Ok(Vec::new());
    };

    let mut existing_names = HashSet::new();
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| unique_header(&header_text(cell), &mut existing_names))
        .collect();

    let rows: Vec<Row> = rows_iter
        .map(|cells| {
            headers
                .iter()
                .enumerate()
                .map(|(idx, header)| {
                    let value = cells.get(idx).map(cell_value).unwrap_or(CellValue::Empty);
                    (header.clone(), value)
                })
                .collect()
        })
        .collect();

    tracing::info!(
        "Read {} rows x {} columns from sheet {}",
        rows.len(),
        headers.len(),
        sheet_name
    );
    Ok(rows)
}

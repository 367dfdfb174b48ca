use serde_json::Value;

use crate::error::AppError;
use crate::models::{CellValue, Dataset, Row};

/// Trims string cells and drops rows with no non-blank value.
///
/// Input rows are left untouched; row order is preserved.
pub fn normalize(rows: &[Row]) -> Dataset {
    let cleaned: Vec<Row> = rows
        .iter()
        .filter(|row| !row.is_blank())
        .map(trim_row)
        .collect();

    if cleaned.len() != rows.len() {
        tracing::debug!("Dropped {} empty rows during normalization", rows.len() - cleaned.len());
    }

    Dataset::new(cleaned)
}

/// Normalizes rows that arrive as raw JSON, e.g. parsed client-side.
pub fn normalize_json(raw: &Value) -> Result<Dataset, AppError> {
    let items = raw.as_array().ok_or_else(|| {
        AppError::InvalidInput("Rows must be a JSON array of objects".to_string())
    })?;

    let rows = items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            Row::from_json(item).map_err(|e| match e {
                AppError::InvalidInput(msg) => AppError::InvalidInput(format!("Row {}: {}", idx, msg)),
                other => other,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(normalize(&rows))
}

fn trim_row(row: &Row) -> Row {
    row.iter()
        .map(|(column, value)| {
            let value = match value {
                CellValue::Text(s) => CellValue::Text(s.trim().to_string()),
                other => other.clone(),
            };
            (column.to_string(), value)
        })
        .collect()
}

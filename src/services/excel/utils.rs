use std::collections::HashSet;

use calamine::Data;

use crate::models::CellValue;

const EMPTY_HEADER: &str = "__EMPTY";

/// Gives every column a distinct name: blank headers become `__EMPTY`,
/// repeats get a numeric suffix (`Name`, `Name_1`, ...).
pub fn unique_header(name: &str, existing_names: &mut HashSet<String>) -> String {
    let base_name = if name.trim().is_empty() {
        EMPTY_HEADER.to_string()
    } else {
        name.to_string()
    };

    // If the name already exists, add a numeric suffix
    let mut cleaned = base_name.clone();
    let mut counter = 1;
    while !existing_names.insert(cleaned.clone()) {
        cleaned = format!("{}_{}", base_name, counter);
        counter += 1;
    }

    cleaned
}

pub fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        _ => cell.to_string(),
    }
}

/// Dates are kept as their spreadsheet serial number.
pub fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Number((*i).into()),
        Data::Float(f) => number_or_text(*f, cell),
        Data::DateTime(d) => number_or_text(d.as_f64(), cell),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) => CellValue::Text(s.clone()),
        other => CellValue::Text(other.to_string()),
    }
}

fn number_or_text(value: f64, cell: &Data) -> CellValue {
    match serde_json::Number::from_f64(value) {
        Some(n) => CellValue::Number(n),
        None => CellValue::Text(cell.to_string()),
    }
}

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::error::AppError;

/// A single scalar cell as it came out of the decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(Number),
    Bool(bool),
    Text(String),
    Empty,
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(CellValue::Empty),
            Value::Bool(b) => Some(CellValue::Bool(*b)),
            Value::Number(n) => Some(CellValue::Number(n.clone())),
            Value::String(s) => Some(CellValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// One record: column name to cell, in source column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `column`, replacing an existing value in place.
    pub fn insert(&mut self, column: impl Into<String>, value: CellValue) {
        let column = column.into();
        match self.cells.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: CellValue) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// True when every value is missing or blank after trimming.
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.is_blank())
    }

    pub fn from_json(value: &Value) -> Result<Self, AppError> {
        let object = value.as_object().ok_or_else(|| {
            AppError::InvalidInput(format!("Expected a row object, got {}", json_kind(value)))
        })?;

        let mut row = Row::new();
        for (column, cell) in object {
            let cell = CellValue::from_json(cell).ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Column '{}' holds a non-scalar value ({})",
                    column,
                    json_kind(cell)
                ))
            })?;
            row.insert(column.clone(), cell);
        }
        Ok(row)
    }
}

impl FromIterator<(String, CellValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, CellValue)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// All rows of one upload. Replaced wholesale, never edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Dataset {
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first row's keys; treated as the schema for rendering.
    pub fn columns(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| row.columns().map(String::from).collect())
            .unwrap_or_default()
    }

    pub fn sample(&self, max_rows: usize) -> &[Row] {
        &self.rows[..self.rows.len().min(max_rows)]
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// KPI numbers as returned by the model; some models quote them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(Number),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetric {
    pub title: String,
    pub value: MetricValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<MetricValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub data: Map<String, Value>,
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationRecommendation {
    pub chart_type: String,
    #[serde(default)]
    pub columns: Vec<String>,
    pub config: ChartConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecasting {
    #[serde(default)]
    pub forecast_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasonality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaxSuggestions {
    #[serde(default)]
    pub measures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_settings: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization: Option<Value>,
    #[serde(default)]
    pub explanation: String,
}

/// Validated output of one analysis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(deserialize_with = "column_type_labels")]
    pub column_types: Map<String, Value>,
    pub relationships: Vec<String>,
    #[serde(default)]
    pub time_series: Vec<String>,
    pub key_metrics: Vec<KeyMetric>,
    #[serde(deserialize_with = "renderable_recommendations")]
    pub visualization_recommendations: Vec<VisualizationRecommendation>,
    pub insights: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecasting: Option<Forecasting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dax_suggestions: Option<DaxSuggestions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_response: Option<QueryResponse>,
    /// Only set on fallback results built by the caller.
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    /// Placeholder result a caller may show instead of propagating `error`.
    pub fn fallback(error: &AppError) -> Self {
        Self {
            column_types: Map::new(),
            relationships: Vec::new(),
            time_series: Vec::new(),
            key_metrics: Vec::new(),
            visualization_recommendations: Vec::new(),
            insights: vec![
                "AI analysis failed. Please check your data format or try again later.".to_string(),
            ],
            forecasting: Some(Forecasting::default()),
            dax_suggestions: Some(DaxSuggestions::default()),
            query_response: Some(QueryResponse::default()),
            error: Some(error.to_string()),
        }
    }
}

// Keeps the model's column order; every label must be a string.
fn column_type_labels<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let labels = Map::<String, Value>::deserialize(deserializer)?;
    if let Some((column, label)) = labels.iter().find(|(_, label)| !label.is_string()) {
        return Err(serde::de::Error::custom(format!(
            "columnTypes.{} must be a string, got {}",
            column,
            json_kind(label)
        )));
    }
    Ok(labels)
}

// Entries a chart renderer cannot use are dropped here instead of failing the
// whole result.
fn renderable_recommendations<'de, D>(
    deserializer: D,
) -> Result<Vec<VisualizationRecommendation>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Vec::<Value>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .enumerate()
        .filter_map(|(idx, entry)| {
            match serde_json::from_value::<VisualizationRecommendation>(entry) {
                Ok(rec) => Some(rec),
                Err(e) => {
                    tracing::warn!("Dropping visualization recommendation #{}: {}", idx, e);
                    None
                }
            }
        })
        .collect())
}

use once_cell::sync::Lazy;
use serde_json::{json, Value};

pub const FUNCTION_NAME: &str = "analyze_and_recommend";
pub const FUNCTION_DESCRIPTION: &str =
    "Analyze tabular data, recommend visualizations, and generate insights.";

/// Top-level fields the model must always return.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "columnTypes",
    "relationships",
    "keyMetrics",
    "visualizationRecommendations",
    "insights",
];

static PARAMETERS: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "columnTypes": {
                "type": "object",
                "description": "Mapping of column names to detected data types.",
                "additionalProperties": { "type": "string" }
            },
            "relationships": {
                "type": "array",
                "description": "Detected relationships between columns.",
                "items": { "type": "string" }
            },
            "timeSeries": {
                "type": "array",
                "description": "Columns identified as time series.",
                "items": { "type": "string" }
            },
            "keyMetrics": {
                "type": "array",
                "description": "Key metrics and KPIs.",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "value": { "type": "number" },
                        "change": { "type": "number" },
                        "changeLabel": { "type": "string" }
                    }
                }
            },
            "visualizationRecommendations": {
                "type": "array",
                "description": "Recommended visualizations with config.",
                "items": {
                    "type": "object",
                    "properties": {
                        "chartType": { "type": "string" },
                        "columns": { "type": "array", "items": { "type": "string" } },
                        "config": {
                            "type": "object",
                            "properties": {
                                "data": { "type": "object" },
                                "options": { "type": "object" }
                            },
                            "required": ["data", "options"]
                        },
                        "layout": { "type": "object" }
                    }
                }
            },
            "insights": {
                "type": "array",
                "description": "Natural language insights about the data.",
                "items": { "type": "string" }
            },
            "forecasting": {
                "type": "object",
                "description": "Forecasting opportunities and time series analysis.",
                "properties": {
                    "forecastColumns": { "type": "array", "items": { "type": "string" } },
                    "seasonality": { "type": "string" },
                    "trend": { "type": "string" }
                }
            },
            "daxSuggestions": {
                "type": "object",
                "description": "PowerBI DAX queries and data model suggestions.",
                "properties": {
                    "measures": { "type": "array", "items": { "type": "string" } },
                    "dataModel": { "type": "string" },
                    "visualSettings": { "type": "string" }
                }
            },
            "queryResponse": {
                "type": "object",
                "description": "Results for user natural language queries.",
                "properties": {
                    "answer": { "type": "string" },
                    "visualization": { "type": "object" },
                    "explanation": { "type": "string" }
                }
            }
        },
        "required": REQUIRED_FIELDS
    })
});

/// JSON schema of the function arguments the model must produce.
pub fn response_schema() -> &'static Value {
    &PARAMETERS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_fields_are_declared_properties() {
        let schema = response_schema();
        let properties = schema["properties"].as_object().unwrap();
        for field in REQUIRED_FIELDS {
            assert!(properties.contains_key(field), "missing property {}", field);
        }
        assert_eq!(schema["required"], json!(REQUIRED_FIELDS));
    }

    #[test]
    fn chart_config_requires_data_and_options() {
        let config = &response_schema()["properties"]["visualizationRecommendations"]["items"]
            ["properties"]["config"];
        assert_eq!(config["required"], json!(["data", "options"]));
    }

    #[test]
    fn optional_blocks_are_not_required() {
        let required = response_schema()["required"].as_array().unwrap();
        for field in ["timeSeries", "forecasting", "daxSuggestions", "queryResponse"] {
            assert!(!required.iter().any(|r| r == field));
        }
    }
}

use crate::models::Row;

/// Rows of the dataset shown to the model.
pub const PROMPT_SAMPLE_ROWS: usize = 10;

pub const SYSTEM_PROMPT: &str = "You are DashGenius AI, a data analysis and dashboard expert.";

/// Renders the analysis instructions for one request.
///
/// Pure and deterministic: identical inputs give byte-identical output. Only
/// the first [`PROMPT_SAMPLE_ROWS`] rows of `sample` are embedded.
pub fn build_prompt(sample: &[Row], columns: &[String], user_query: Option<&str>) -> String {
    let sample = &sample[..sample.len().min(PROMPT_SAMPLE_ROWS)];
    // Row serialization cannot fail: keys are strings and cells are scalars.
    let sample_json = serde_json::to_string_pretty(sample).unwrap_or_else(|_| "[]".to_string());

    let mut prompt = format!(
        r#"You are DashGenius AI, an elite data analyst and dashboard designer.
The user has uploaded a spreadsheet. Analyze THIS data in depth and design a dashboard tailored to its actual columns and values.

Data preview (JSON, first {sample_rows} rows):
{sample_json}

Columns: {columns}

TASKS:
1. Detect the data type of every column (e.g. string, number, date, boolean, category).
2. Detect relationships between columns.
3. Identify columns that form a time series.
4. Compute the key metrics and KPIs this data supports. For keyMetrics, return objects with {{ title, value, change, changeLabel }}, where value and change are numbers. Example: {{ "title": "Total Sales", "value": 12345, "change": 5.2, "changeLabel": "vs last month" }}
5. Recommend the most relevant visualizations for this data, specifying chart type, axes, groupings and breakdowns.
6. Generate concise, user-friendly insights about the data.
7. Point out forecasting or anomaly-detection opportunities and suggest PowerBI DAX measures where useful.

VISUALIZATION RULES:
- Every visualization must carry a valid Chart.js configuration object ('config') with a 'data' property (labels, datasets) and an 'options' property. Do NOT return configs missing either field.
- Target Chart.js v3+: do NOT use 'xAxes' or 'yAxes' in the options; use 'scales' with 'x' and 'y' keys.
- Multiple visualizations must form one cohesive dashboard layout; describe placement in each item's 'layout'.
- Style for a dark theme with modern KPI cards, clear legends and a responsive layout.
- Only reference columns and values that exist in the uploaded data. Do NOT include generic content."#,
        sample_rows = PROMPT_SAMPLE_ROWS,
        sample_json = sample_json,
        columns = columns.join(", "),
    );

    if let Some(query) = user_query.filter(|q| !q.trim().is_empty()) {
        prompt.push_str(&format!(
            "\n\nUser query: \"{}\"\nAnswer the query in 'queryResponse' and, if relevant, include a suitable visualization config and a text explanation. The answer must be specific to the user's data.",
            query
        ));
    }

    prompt.push_str("\n\nRespond ONLY in the specified JSON function-call format. Do not include any extra commentary or text.");
    prompt
}

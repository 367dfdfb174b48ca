use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::models::{AnalysisResult, KeyMetric, MetricValue, VisualizationRecommendation};

/// Rounds `value` to two decimals, ties away from zero.
///
/// Operates on the binary value, so `-0.005` becomes `-0.01`. Negative zero is
/// returned as `0`.
pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Returns a copy of `result` with KPI values/changes and chart dataset
/// numbers rounded to two decimals. Nothing else is touched.
pub fn post_process(result: &AnalysisResult) -> AnalysisResult {
    let mut processed = result.clone();

    for metric in &mut processed.key_metrics {
        round_metric(metric);
    }
    for rec in &mut processed.visualization_recommendations {
        round_chart_data(&mut rec.config.data);
    }

    processed
}

fn round_metric(metric: &mut KeyMetric) {
    round_metric_value(&mut metric.value);
    if let Some(change) = metric.change.as_mut() {
        round_metric_value(change);
    }
}

fn round_metric_value(value: &mut MetricValue) {
    if let MetricValue::Number(n) = value {
        if let Some(rounded) = round_number(n) {
            *n = rounded;
        }
    }
}

// Integers are already exact; only floats are rewritten.
fn round_number(n: &Number) -> Option<Number> {
    if !n.is_f64() {
        return None;
    }
    n.as_f64().and_then(|f| Number::from_f64(round2(f)))
}

fn round_chart_data(data: &mut Map<String, Value>) {
    let Some(Value::Array(datasets)) = data.get_mut("datasets") else {
        return;
    };

    for dataset in datasets.iter_mut() {
        if let Some(Value::Array(points)) = dataset.get_mut("data") {
            for point in points.iter_mut() {
                if let Value::Number(n) = point {
                    if let Some(rounded) = round_number(n) {
                        *n = rounded;
                    }
                }
            }
        }
    }
}

/// Renderer-ready chart description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    #[serde(rename = "type")]
    pub chart_type: String,
    pub data: Map<String, Value>,
    pub options: Map<String, Value>,
    pub columns: Vec<String>,
}

/// Maps validated recommendations to chart specs; `layout` keys override
/// `options` keys of the same name.
pub fn chart_configs(recommendations: &[VisualizationRecommendation]) -> Vec<ChartSpec> {
    recommendations
        .iter()
        .map(|rec| {
            let mut options = rec.config.options.clone();
            if let Some(layout) = &rec.layout {
                options.extend(layout.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            ChartSpec {
                chart_type: rec.chart_type.clone(),
                data: rec.config.data.clone(),
                options,
                columns: rec.columns.clone(),
            }
        })
        .collect()
}

//! Automatic chart selection over execution results.
//!
//! Only table- and series-shaped successes are chartable. The output is a
//! Vega-Lite v5 spec, self-contained with inlined data, that any Vega-Lite
//! renderer can draw. Failures here are never fatal: an uncharted result is
//! simply returned without a chart.

use crate::data::{DataTable, Value};
use crate::exec::{ExecutionOutcome, ResultValue};
use serde::Serialize;
use serde_json::{json, Value as Json};
use tracing::debug;

/// Readability cap: larger results keep only the top entries.
pub const MAX_CHART_ROWS: usize = 15;

const VEGA_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    GroupedBar,
    Line,
    Scatter,
}

#[derive(Debug, Clone, Serialize)]
pub struct Chart {
    pub kind: ChartKind,
    pub title: String,
    pub spec: Json,
}

/// Infer a chart family from the shape of an outcome. Pure: identical
/// outcomes yield identical decisions.
pub fn select_chart(outcome: &ExecutionOutcome) -> Option<Chart> {
    let table = match outcome {
        ExecutionOutcome::Success { value: ResultValue::Table(t), .. } => t.clone(),
        ExecutionOutcome::Success {
            value: ResultValue::Series { name, labels, values },
            ..
        } => series_to_table(name, labels, values),
        _ => return None,
    };
    let chart = build_chart(table);
    if chart.is_none() {
        debug!("result shape not chartable, skipping visualization");
    }
    chart
}

fn series_to_table(name: &str, labels: &[String], values: &[Value]) -> DataTable {
    DataTable {
        columns: vec!["category".into(), name.to_string()],
        rows: labels
            .iter()
            .zip(values.iter())
            .map(|(l, v)| vec![Value::Text(l.clone()), v.clone()])
            .collect(),
    }
}

fn build_chart(table: DataTable) -> Option<Chart> {
    if table.is_empty() {
        return None;
    }

    let numeric: Vec<usize> = (0..table.column_count())
        .filter(|&i| table.column_is_numeric(i))
        .collect();
    let categorical: Vec<usize> = (0..table.column_count())
        .filter(|i| !numeric.contains(i))
        .collect();

    match (numeric.len(), categorical.len()) {
        (0, _) => None,
        (1, c) if c >= 1 => Some(bar_chart(table, categorical[0], numeric[0])),
        (n, c) if n >= 2 && c >= 1 => {
            if is_date_axis(&table.columns[categorical[0]]) {
                Some(line_chart(table, categorical[0], &numeric))
            } else {
                Some(grouped_bar_chart(table, categorical[0], &numeric))
            }
        }
        (2, 0) => Some(scatter_chart(table, numeric[0], numeric[1])),
        _ => None,
    }
}

fn is_date_axis(name: &str) -> bool {
    let lower = name.to_lowercase();
    ["date", "day", "month", "year", "time", "week", "quarter", "period"]
        .iter()
        .any(|hint| lower.contains(hint))
}

/// Keep the `MAX_CHART_ROWS` largest rows by `key`, descending.
fn cap_rows(table: &mut DataTable, key: impl Fn(&[Value]) -> f64) {
    if table.row_count() > MAX_CHART_ROWS {
        table.rows.sort_by(|a, b| key(b).total_cmp(&key(a)));
        table.rows.truncate(MAX_CHART_ROWS);
    }
}

fn rows_to_json(table: &DataTable) -> Vec<Json> {
    table
        .rows
        .iter()
        .map(|row| {
            let mut obj = serde_json::Map::new();
            for (name, value) in table.columns.iter().zip(row.iter()) {
                obj.insert(name.clone(), value.to_json());
            }
            Json::Object(obj)
        })
        .collect()
}

fn bar_chart(mut table: DataTable, cat: usize, num: usize) -> Chart {
    cap_rows(&mut table, |row| row[num].as_f64().unwrap_or(f64::MIN));
    let cat_name = table.columns[cat].clone();
    let num_name = table.columns[num].clone();
    let title = format!("{num_name} by {cat_name}");
    let spec = json!({
        "$schema": VEGA_SCHEMA,
        "title": title,
        "data": { "values": rows_to_json(&table) },
        "mark": "bar",
        "encoding": {
            "x": { "field": cat_name, "type": "nominal", "sort": "-y" },
            "y": { "field": num_name, "type": "quantitative" }
        },
        "height": 400
    });
    Chart { kind: ChartKind::Bar, title, spec }
}

fn numeric_sum(row: &[Value], numeric: &[usize]) -> f64 {
    numeric
        .iter()
        .filter_map(|&i| row[i].as_f64())
        .sum::<f64>()
}

fn line_chart(mut table: DataTable, cat: usize, numeric: &[usize]) -> Chart {
    cap_rows(&mut table, |row| numeric_sum(row, numeric));
    let cat_name = table.columns[cat].clone();
    let series: Vec<String> = numeric.iter().map(|&i| table.columns[i].clone()).collect();
    let title = format!("{} over {cat_name}", series.join(", "));
    let spec = json!({
        "$schema": VEGA_SCHEMA,
        "title": title,
        "data": { "values": rows_to_json(&table) },
        "transform": [{ "fold": series, "as": ["series", "value"] }],
        "mark": { "type": "line", "point": true },
        "encoding": {
            "x": { "field": cat_name, "type": "temporal" },
            "y": { "field": "value", "type": "quantitative" },
            "color": { "field": "series", "type": "nominal" }
        },
        "height": 400
    });
    Chart { kind: ChartKind::Line, title, spec }
}

fn grouped_bar_chart(mut table: DataTable, cat: usize, numeric: &[usize]) -> Chart {
    cap_rows(&mut table, |row| numeric_sum(row, numeric));
    let cat_name = table.columns[cat].clone();
    let series: Vec<String> = numeric.iter().map(|&i| table.columns[i].clone()).collect();
    let title = format!("{} by {cat_name}", series.join(", "));
    let spec = json!({
        "$schema": VEGA_SCHEMA,
        "title": title,
        "data": { "values": rows_to_json(&table) },
        "transform": [{ "fold": series, "as": ["series", "value"] }],
        "mark": "bar",
        "encoding": {
            "x": { "field": cat_name, "type": "nominal" },
            "xOffset": { "field": "series" },
            "y": { "field": "value", "type": "quantitative" },
            "color": { "field": "series", "type": "nominal" }
        },
        "height": 400
    });
    Chart { kind: ChartKind::GroupedBar, title, spec }
}

fn scatter_chart(table: DataTable, x: usize, y: usize) -> Chart {
    let x_name = table.columns[x].clone();
    let y_name = table.columns[y].clone();
    let title = format!("{y_name} vs {x_name}");
    let spec = json!({
        "$schema": VEGA_SCHEMA,
        "title": title,
        "data": { "values": rows_to_json(&table) },
        "layer": [
            {
                "mark": { "type": "point", "filled": true },
                "encoding": {
                    "x": { "field": x_name, "type": "quantitative" },
                    "y": { "field": y_name, "type": "quantitative" }
                }
            },
            {
                "mark": { "type": "line" },
                "transform": [{ "regression": y_name, "on": x_name }],
                "encoding": {
                    "x": { "field": x_name, "type": "quantitative" },
                    "y": { "field": y_name, "type": "quantitative" }
                }
            }
        ],
        "height": 400
    });
    Chart { kind: ChartKind::Scatter, title, spec }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(value: ResultValue) -> ExecutionOutcome {
        ExecutionOutcome::Success {
            type_name: value.kind().to_string(),
            value,
        }
    }

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> DataTable {
        DataTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn scalar_and_mapping_yield_no_chart() {
        assert!(select_chart(&success(ResultValue::Scalar(Value::Int(7)))).is_none());
        assert!(select_chart(&success(ResultValue::Mapping(vec![(
            "total".into(),
            Value::Float(1.0)
        )])))
        .is_none());
        assert!(select_chart(&ExecutionOutcome::Failure {
            error: "x".into(),
            detail: None
        })
        .is_none());
    }

    #[test]
    fn empty_table_yields_no_chart() {
        let t = table(&["a", "b"], vec![]);
        assert!(select_chart(&success(ResultValue::Table(t))).is_none());
    }

    #[test]
    fn zero_numeric_columns_yield_no_chart() {
        let t = table(
            &["a", "b"],
            vec![vec![Value::Text("x".into()), Value::Text("y".into())]],
        );
        assert!(select_chart(&success(ResultValue::Table(t))).is_none());
    }

    #[test]
    fn one_numeric_plus_categorical_is_a_bar() {
        let t = table(
            &["Store", "Revenue"],
            vec![
                vec![Value::Text("A".into()), Value::Float(10.0)],
                vec![Value::Text("B".into()), Value::Float(20.0)],
            ],
        );
        let chart = select_chart(&success(ResultValue::Table(t))).unwrap();
        assert_eq!(chart.kind, ChartKind::Bar);
        assert_eq!(chart.title, "Revenue by Store");
    }

    #[test]
    fn series_coerces_to_bar() {
        let chart = select_chart(&success(ResultValue::Series {
            name: "revenue".into(),
            labels: vec!["A".into(), "B".into()],
            values: vec![Value::Float(1.0), Value::Float(2.0)],
        }))
        .unwrap();
        assert_eq!(chart.kind, ChartKind::Bar);
    }

    #[test]
    fn sixteen_rows_cap_to_fifteen_largest() {
        let rows: Vec<Vec<Value>> = (0..16)
            .map(|i| vec![Value::Text(format!("S{i}")), Value::Int(i)])
            .collect();
        let t = table(&["Store", "Revenue"], rows);
        let chart = select_chart(&success(ResultValue::Table(t))).unwrap();
        let values = chart.spec["data"]["values"].as_array().unwrap();
        assert_eq!(values.len(), MAX_CHART_ROWS);
        // The smallest row (S0, 0) is the one dropped.
        assert!(values.iter().all(|v| v["Store"] != "S0"));
    }

    #[test]
    fn date_axis_with_two_numerics_is_a_line() {
        let t = table(
            &["Month", "Revenue", "Cost"],
            vec![
                vec![Value::Text("2024-01".into()), Value::Float(10.0), Value::Float(5.0)],
                vec![Value::Text("2024-02".into()), Value::Float(12.0), Value::Float(6.0)],
            ],
        );
        let chart = select_chart(&success(ResultValue::Table(t))).unwrap();
        assert_eq!(chart.kind, ChartKind::Line);
    }

    #[test]
    fn non_date_axis_with_two_numerics_is_grouped_bars() {
        let t = table(
            &["Region", "Revenue", "Cost"],
            vec![
                vec![Value::Text("North".into()), Value::Float(10.0), Value::Float(5.0)],
                vec![Value::Text("South".into()), Value::Float(12.0), Value::Float(6.0)],
            ],
        );
        let chart = select_chart(&success(ResultValue::Table(t))).unwrap();
        assert_eq!(chart.kind, ChartKind::GroupedBar);
    }

    #[test]
    fn two_numerics_without_category_is_a_scatter() {
        let t = table(
            &["UnitPrice", "Quantity"],
            vec![
                vec![Value::Float(1.0), Value::Int(10)],
                vec![Value::Float(2.0), Value::Int(5)],
            ],
        );
        let chart = select_chart(&success(ResultValue::Table(t))).unwrap();
        assert_eq!(chart.kind, ChartKind::Scatter);
        assert!(chart.spec["layer"].is_array());
    }

    #[test]
    fn selection_is_pure() {
        let outcome = success(ResultValue::Series {
            name: "v".into(),
            labels: vec!["a".into()],
            values: vec![Value::Int(1)],
        });
        let first = select_chart(&outcome).unwrap();
        let second = select_chart(&outcome).unwrap();
        assert_eq!(first.kind, second.kind);
        assert_eq!(first.spec, second.spec);
    }
}

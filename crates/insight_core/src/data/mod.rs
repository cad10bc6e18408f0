pub(crate) mod duck;
pub mod loader;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A single typed cell in a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// JSON rendering used by chart specs.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => (*b).into(),
            Value::Int(v) => (*v).into(),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => s.clone().into(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string().into(),
            Value::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string().into(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => {
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{:.1}", v)
                } else {
                    write!(f, "{:.2}", v)
                }
            }
            Value::Text(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// An immutable, ordered table: column names plus row-major values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl DataTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, idx: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().map(move |r| &r[idx])
    }

    /// True when the column holds at least one non-null value and every
    /// non-null value is numeric.
    pub fn column_is_numeric(&self, idx: usize) -> bool {
        let mut saw_value = false;
        for v in self.column(idx) {
            match v {
                Value::Null => {}
                v if v.is_numeric() => saw_value = true,
                _ => return false,
            }
        }
        saw_value
    }

    /// Plain-text rendering with padded columns, capped at `limit` rows.
    pub fn to_text(&self, limit: usize) -> String {
        let shown = self.rows.len().min(limit);
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.len()).collect();
        let mut cells: Vec<Vec<String>> = Vec::with_capacity(shown);
        for row in self.rows.iter().take(shown) {
            let rendered: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            for (i, cell) in rendered.iter().enumerate() {
                widths[i] = widths[i].max(cell.len());
            }
            cells.push(rendered);
        }
        let mut out = String::new();
        for (i, name) in self.columns.iter().enumerate() {
            if i > 0 {
                out.push_str("  ");
            }
            out.push_str(&format!("{:>width$}", name, width = widths[i]));
        }
        for row in &cells {
            out.push('\n');
            for (i, cell) in row.iter().enumerate() {
                if i > 0 {
                    out.push_str("  ");
                }
                out.push_str(&format!("{:>width$}", cell, width = widths[i]));
            }
        }
        out
    }
}

/// The five retail datasets, loaded once at startup and read-only afterwards.
/// Cloning is cheap (Arc per table), so the store can be shared across
/// sessions freely.
#[derive(Debug, Clone, Default)]
pub struct TableStore {
    pub store_transactions: Option<Arc<DataTable>>,
    pub product_sales: Option<Arc<DataTable>>,
    pub inventory_data: Option<Arc<DataTable>>,
    pub customer_data: Option<Arc<DataTable>>,
    pub online_orders: Option<Arc<DataTable>>,
}

impl TableStore {
    /// The datasets bound into the execution sandbox, by SQL table name.
    /// online_orders is loaded for reporting but deliberately not exposed
    /// to generated code.
    pub fn codegen_tables(&self) -> Vec<(&'static str, Arc<DataTable>)> {
        let mut tables = Vec::new();
        if let Some(t) = &self.store_transactions {
            tables.push(("store_transactions", Arc::clone(t)));
        }
        if let Some(t) = &self.product_sales {
            tables.push(("product_sales", Arc::clone(t)));
        }
        if let Some(t) = &self.inventory_data {
            tables.push(("inventory_data", Arc::clone(t)));
        }
        if let Some(t) = &self.customer_data {
            tables.push(("customer_data", Arc::clone(t)));
        }
        tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DataTable {
        DataTable {
            columns: vec!["StoreID".into(), "Revenue".into()],
            rows: vec![
                vec![Value::Text("S1".into()), Value::Float(100.0)],
                vec![Value::Text("S2".into()), Value::Null],
                vec![Value::Text("S3".into()), Value::Int(40)],
            ],
        }
    }

    #[test]
    fn numeric_column_detection_skips_nulls() {
        let t = table();
        assert!(!t.column_is_numeric(0));
        assert!(t.column_is_numeric(1));
    }

    #[test]
    fn all_null_column_is_not_numeric() {
        let t = DataTable {
            columns: vec!["x".into()],
            rows: vec![vec![Value::Null], vec![Value::Null]],
        };
        assert!(!t.column_is_numeric(0));
    }

    #[test]
    fn to_text_caps_rows() {
        let t = table();
        let text = t.to_text(2);
        assert!(text.contains("S1"));
        assert!(text.contains("S2"));
        assert!(!text.contains("S3"));
    }
}

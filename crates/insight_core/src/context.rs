//! Dataset-aware context extraction: structural facts for the system
//! prompt, per-dataset digests for the model, and the z-score anomaly scan
//! used by the deterministic fallback. Absent datasets or columns degrade
//! by omission, never by error.

use crate::data::{DataTable, TableStore, Value};
use crate::intent::Intent;
use std::collections::{BTreeMap, HashSet};

/// Structural facts about the loaded datasets. `None` / empty means the
/// owning dataset or column is absent and prompts render "N/A".
#[derive(Debug, Clone, Default)]
pub struct ContextSummary {
    pub total_stores: Option<usize>,
    pub total_products: Option<usize>,
    pub regions: Vec<String>,
    pub date_range: Option<(String, String)>,
    pub inventory_items: Option<usize>,
}

pub fn build_context(store: &TableStore) -> ContextSummary {
    let mut ctx = ContextSummary::default();

    if let Some(tx) = &store.store_transactions {
        if let Some(idx) = tx.column_index("StoreID") {
            ctx.total_stores = Some(distinct_count(tx, idx));
        }
        if let Some(idx) = tx.column_index("Date") {
            ctx.date_range = column_range(tx, idx);
        }
    }

    if let Some(sales) = &store.product_sales {
        if let Some(idx) = sales.column_index("Region") {
            ctx.regions = distinct_values(sales, idx);
        }
        if let Some(idx) = sales.column_index("Product") {
            ctx.total_products = Some(distinct_count(sales, idx));
        }
    }

    if let Some(inv) = &store.inventory_data {
        ctx.inventory_items = Some(inv.row_count());
    }

    ctx
}

/// Textual digest of every present dataset. The intent is accepted for
/// parity with the prompt layer; all intents currently see the same digest.
pub fn build_data_summary(store: &TableStore, _intent: Intent) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(tx) = &store.store_transactions {
        if let Some(section) = store_performance_section(tx) {
            parts.push(section);
        }
    }
    if let Some(sales) = &store.product_sales {
        if let Some(section) = regional_section(sales) {
            parts.push(section);
        }
    }
    if let Some(inv) = &store.inventory_data {
        if let Some(section) = inventory_section(inv) {
            parts.push(section);
        }
    }
    if let Some(customers) = &store.customer_data {
        if let Some(section) = customer_section(customers) {
            parts.push(section);
        }
    }

    parts.join("\n")
}

fn store_performance_section(tx: &DataTable) -> Option<String> {
    let store_idx = tx.column_index("StoreID")?;
    let price_idx = tx.column_index("TotalPrice")?;

    let mut total = 0.0;
    let mut count = 0usize;
    for v in tx.column(price_idx) {
        if let Some(x) = v.as_f64() {
            total += x;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    let avg = total / count as f64;

    let perf = store_performance(tx, store_idx, price_idx);
    let top = slice_table(&perf, 0, 3);
    let bottom_start = perf.row_count().saturating_sub(3);
    let mut bottom = slice_table(&perf, bottom_start, 3);
    bottom.rows.reverse();

    Some(format!(
        "**Store Performance:**\n\
         - Total Revenue: ${}\n\
         - Total Transactions: {}\n\
         - Average Transaction: ${:.2}\n\n\
         Top 3 Stores by Revenue:\n{}\n\n\
         Bottom 3 Stores by Revenue:\n{}\n",
        money(total),
        thousands(&tx.row_count().to_string()),
        avg,
        top.to_text(3),
        bottom.to_text(3),
    ))
}

/// Per-store revenue aggregation, sorted descending by total.
pub fn store_performance(tx: &DataTable, store_idx: usize, price_idx: usize) -> DataTable {
    let mut groups: BTreeMap<String, (f64, u64)> = BTreeMap::new();
    for row in &tx.rows {
        let key = row[store_idx].to_string();
        if let Some(x) = row[price_idx].as_f64() {
            let entry = groups.entry(key).or_insert((0.0, 0));
            entry.0 += x;
            entry.1 += 1;
        }
    }
    let mut rows: Vec<(String, f64, u64)> =
        groups.into_iter().map(|(k, (sum, n))| (k, sum, n)).collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut out = DataTable::new(vec![
        "StoreID".into(),
        "Total_Revenue".into(),
        "Transaction_Count".into(),
        "Avg_Transaction".into(),
    ]);
    for (store, sum, n) in rows {
        let mean = sum / n as f64;
        out.rows.push(vec![
            Value::Text(store),
            Value::Float(round2(sum)),
            Value::Int(n as i64),
            Value::Float(round2(mean)),
        ]);
    }
    out
}

fn regional_section(sales: &DataTable) -> Option<String> {
    let region_idx = sales.column_index("Region")?;
    let price_idx = sales.column_index("TotalPrice")?;
    let qty_idx = sales.column_index("Quantity");

    let mut groups: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for row in &sales.rows {
        let key = row[region_idx].to_string();
        let entry = groups.entry(key).or_insert((0.0, 0.0));
        if let Some(x) = row[price_idx].as_f64() {
            entry.0 += x;
        }
        if let Some(q) = qty_idx.and_then(|i| row[i].as_f64()) {
            entry.1 += q;
        }
    }
    if groups.is_empty() {
        return None;
    }

    let mut out = DataTable::new(vec!["Region".into(), "TotalPrice".into(), "Quantity".into()]);
    for (region, (revenue, qty)) in groups {
        out.rows.push(vec![
            Value::Text(region),
            Value::Float(round2(revenue)),
            Value::Float(round2(qty)),
        ]);
    }
    let limit = out.row_count();
    Some(format!("**Regional Performance:**\n{}\n", out.to_text(limit)))
}

fn inventory_section(inv: &DataTable) -> Option<String> {
    let stock_idx = inv.column_index("QuantityInStock")?;
    let reorder_idx = inv.column_index("ReorderPoint");

    let mut total_stock = 0.0;
    let mut counted = 0usize;
    let mut low = 0usize;
    for row in &inv.rows {
        if let Some(stock) = row[stock_idx].as_f64() {
            total_stock += stock;
            counted += 1;
            if let Some(reorder) = reorder_idx.and_then(|i| row[i].as_f64()) {
                if stock < reorder {
                    low += 1;
                }
            }
        }
    }
    if counted == 0 {
        return None;
    }

    Some(format!(
        "**Inventory Status:**\n\
         - Total Items: {}\n\
         - Low Stock Items: {}\n\
         - Average Stock Level: {:.0}\n",
        inv.row_count(),
        low,
        total_stock / counted as f64,
    ))
}

fn customer_section(customers: &DataTable) -> Option<String> {
    let rating_idx = customers.column_index("ReviewRating")?;

    let mut total = 0.0;
    let mut count = 0usize;
    for v in customers.column(rating_idx) {
        if let Some(x) = v.as_f64() {
            total += x;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    let distinct_customers = customers
        .column_index("CustomerID")
        .map(|idx| distinct_count(customers, idx))
        .unwrap_or(0);

    Some(format!(
        "**Customer Metrics:**\n\
         - Average Rating: {:.2}/5.0\n\
         - Total Customers: {}\n",
        total / count as f64,
        distinct_customers,
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct Anomaly {
    pub kind: &'static str,
    pub message: String,
    pub severity: Severity,
}

/// Z-score scan over per-store revenue plus a critically-low-stock check.
/// Used by the deterministic fallback when the narrative LLM path fails.
pub fn detect_anomalies(store: &TableStore, threshold: f64) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    if let Some(tx) = &store.store_transactions {
        if let (Some(store_idx), Some(price_idx)) =
            (tx.column_index("StoreID"), tx.column_index("TotalPrice"))
        {
            let perf = store_performance(tx, store_idx, price_idx);
            let totals: Vec<f64> = perf.rows.iter().filter_map(|r| r[1].as_f64()).collect();
            if totals.len() > 1 {
                let mean = totals.iter().sum::<f64>() / totals.len() as f64;
                let var = totals.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
                    / (totals.len() - 1) as f64;
                let std = var.sqrt();
                for row in &perf.rows {
                    let total = row[1].as_f64().unwrap_or(0.0);
                    let z = if std > 0.0 { ((total - mean) / std).abs() } else { 0.0 };
                    if z > threshold {
                        let pct = (total - mean) / mean * 100.0;
                        anomalies.push(Anomaly {
                            kind: "store_revenue",
                            message: format!(
                                "Store {}'s revenue is {:.1}% {} average",
                                row[0],
                                pct.abs(),
                                if pct > 0.0 { "above" } else { "below" },
                            ),
                            severity: if z > 2.0 { Severity::High } else { Severity::Medium },
                        });
                    }
                }
            }
        }
    }

    if let Some(inv) = &store.inventory_data {
        if let Some(stock_idx) = inv.column_index("QuantityInStock") {
            let stocks: Vec<f64> = inv.column(stock_idx).filter_map(|v| v.as_f64()).collect();
            if let Some(cutoff) = quantile(&stocks, 0.1) {
                let critical = stocks.iter().filter(|&&s| s < cutoff).count();
                if critical > 0 {
                    anomalies.push(Anomaly {
                        kind: "inventory",
                        message: format!("{critical} items have critically low stock levels"),
                        severity: Severity::High,
                    });
                }
            }
        }
    }

    anomalies
}

fn distinct_count(table: &DataTable, idx: usize) -> usize {
    table
        .column(idx)
        .filter(|v| !v.is_null())
        .map(|v| v.to_string())
        .collect::<HashSet<_>>()
        .len()
}

fn distinct_values(table: &DataTable, idx: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for v in table.column(idx) {
        if v.is_null() {
            continue;
        }
        let s = v.to_string();
        if seen.insert(s.clone()) {
            out.push(s);
        }
    }
    out
}

fn column_range(table: &DataTable, idx: usize) -> Option<(String, String)> {
    let mut min: Option<String> = None;
    let mut max: Option<String> = None;
    for v in table.column(idx) {
        if v.is_null() {
            continue;
        }
        let s = v.to_string();
        if min.as_ref().map(|m| s < *m).unwrap_or(true) {
            min = Some(s.clone());
        }
        if max.as_ref().map(|m| s > *m).unwrap_or(true) {
            max = Some(s);
        }
    }
    Some((min?, max?))
}

fn slice_table(table: &DataTable, start: usize, len: usize) -> DataTable {
    DataTable {
        columns: table.columns.clone(),
        rows: table.rows.iter().skip(start).take(len).cloned().collect(),
    }
}

/// Linear-interpolation quantile, `q` in [0, 1].
fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        Some(sorted[lo])
    } else {
        Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `1234567.891` -> `1,234,567.89`
pub(crate) fn money(x: f64) -> String {
    thousands(&format!("{:.2}", x))
}

fn thousands(s: &str) -> String {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

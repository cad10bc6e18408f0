//! Conversions between DuckDB relations and [`DataTable`].

use super::{DataTable, Value};
use chrono::NaiveDate;
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::{params_from_iter, Connection};

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Run `sql` and materialize the full result set.
pub(crate) fn read_table(conn: &Connection, sql: &str) -> duckdb::Result<DataTable> {
    let mut stmt = conn.prepare(sql)?;
    let mut columns: Vec<String> = Vec::new();
    let mut out_rows: Vec<Vec<Value>> = Vec::new();
    {
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            if columns.is_empty() {
                columns = row.as_ref().column_names();
            }
            let mut rec = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                rec.push(decode(row.get_ref(i)?));
            }
            out_rows.push(rec);
        }
    }
    if columns.is_empty() {
        // Zero-row result: the executed statement still knows its schema.
        columns = stmt.column_names();
    }
    Ok(DataTable { columns, rows: out_rows })
}

/// Create and populate `name` from a canonical table copy.
pub(crate) fn register_table(
    conn: &Connection,
    name: &str,
    table: &DataTable,
) -> duckdb::Result<()> {
    let col_defs: Vec<String> = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} {}", quote_ident(c), sql_type_for(table, i)))
        .collect();
    conn.execute_batch(&format!(
        "CREATE TABLE {} ({});",
        quote_ident(name),
        col_defs.join(", ")
    ))?;
    if table.rows.is_empty() {
        return Ok(());
    }
    let placeholders = vec!["?"; table.columns.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {} VALUES ({})",
        quote_ident(name),
        placeholders
    ))?;
    for row in &table.rows {
        stmt.execute(params_from_iter(row.iter().map(bind_value)))?;
    }
    Ok(())
}

fn sql_type_for(table: &DataTable, idx: usize) -> &'static str {
    for v in table.column(idx) {
        match v {
            Value::Null => continue,
            Value::Bool(_) => return "BOOLEAN",
            Value::Int(_) => return "BIGINT",
            Value::Float(_) => return "DOUBLE",
            Value::Text(_) => return "VARCHAR",
            Value::Date(_) => return "DATE",
            Value::Timestamp(_) => return "TIMESTAMP",
        }
    }
    "VARCHAR"
}

fn bind_value(v: &Value) -> duckdb::types::Value {
    match v {
        Value::Null => duckdb::types::Value::Null,
        Value::Bool(b) => duckdb::types::Value::Boolean(*b),
        Value::Int(i) => duckdb::types::Value::BigInt(*i),
        Value::Float(f) => duckdb::types::Value::Double(*f),
        Value::Text(s) => duckdb::types::Value::Text(s.clone()),
        Value::Date(d) => {
            let days = (*d - NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()).num_days();
            duckdb::types::Value::Date32(days as i32)
        }
        Value::Timestamp(ts) => duckdb::types::Value::Timestamp(
            TimeUnit::Microsecond,
            ts.and_utc().timestamp_micros(),
        ),
    }
}

fn decode(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(x) => Value::Int(x as i64),
        ValueRef::SmallInt(x) => Value::Int(x as i64),
        ValueRef::Int(x) => Value::Int(x as i64),
        ValueRef::BigInt(x) => Value::Int(x),
        ValueRef::HugeInt(x) => Value::Int(x as i64),
        ValueRef::UTinyInt(x) => Value::Int(x as i64),
        ValueRef::USmallInt(x) => Value::Int(x as i64),
        ValueRef::UInt(x) => Value::Int(x as i64),
        ValueRef::UBigInt(x) => Value::Int(x as i64),
        ValueRef::Float(x) => Value::Float(x as f64),
        ValueRef::Double(x) => Value::Float(x),
        ValueRef::Decimal(d) => Value::Float(d.to_string().parse().unwrap_or(0.0)),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .checked_add_signed(chrono::Duration::days(days as i64))
            .map(Value::Date)
            .unwrap_or(Value::Null),
        ValueRef::Timestamp(unit, raw) => {
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => raw,
                TimeUnit::Nanosecond => raw / 1_000,
            };
            chrono::DateTime::from_timestamp_micros(micros)
                .map(|dt| Value::Timestamp(dt.naive_utc()))
                .unwrap_or(Value::Null)
        }
        other => Value::Text(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_read_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        let table = DataTable {
            columns: vec!["StoreID".into(), "TotalPrice".into(), "Date".into()],
            rows: vec![
                vec![
                    Value::Text("S1".into()),
                    Value::Float(125.5),
                    Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
                ],
                vec![Value::Text("S2".into()), Value::Null, Value::Null],
            ],
        };
        register_table(&conn, "t", &table).unwrap();
        let back = read_table(&conn, "SELECT * FROM t ORDER BY StoreID").unwrap();
        assert_eq!(back.columns, table.columns);
        assert_eq!(back.rows[0][0], Value::Text("S1".into()));
        assert_eq!(back.rows[0][1], Value::Float(125.5));
        assert_eq!(back.rows[1][1], Value::Null);
    }

    #[test]
    fn zero_row_result_keeps_schema() {
        let conn = Connection::open_in_memory().unwrap();
        let t = read_table(&conn, "SELECT 1 AS a, 'x' AS b WHERE false").unwrap();
        assert_eq!(t.columns, vec!["a".to_string(), "b".to_string()]);
        assert!(t.is_empty());
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}

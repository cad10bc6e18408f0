//! Sandboxed execution of generated SQL programs.
//!
//! Each execution gets a scratch in-memory database with external access
//! disabled and fresh copies of the exposed datasets, so a program that
//! mutates or drops a table can never contaminate later queries.

use crate::data::duck::{read_table, register_table};
use crate::data::{DataTable, TableStore, Value};
use duckdb::Connection;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// The designated output binding: generated programs must materialize
/// their final answer as a relation with this name.
pub const RESULT_TABLE: &str = "result";

pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// The shapes the formatter and visualizer understand. Anything a program
/// produces is mapped onto one of these four.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Table(DataTable),
    Series {
        name: String,
        labels: Vec<String>,
        values: Vec<Value>,
    },
    Scalar(Value),
    Mapping(Vec<(String, Value)>),
}

impl ResultValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ResultValue::Table(_) => "table",
            ResultValue::Series { .. } => "series",
            ResultValue::Scalar(_) => "scalar",
            ResultValue::Mapping(_) => "mapping",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success {
        value: ResultValue,
        type_name: String,
    },
    Failure {
        error: String,
        /// The statement that failed, when one can be pinned down.
        detail: Option<String>,
    },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    fn success(value: ResultValue) -> Self {
        ExecutionOutcome::Success {
            type_name: value.kind().to_string(),
            value,
        }
    }
}

/// Run a generated program against fresh dataset copies. The wait on the
/// worker is wall-clock bounded; on expiry the worker is abandoned and its
/// scratch database dies with it.
pub fn execute_program(store: &TableStore, program: &str, timeout: Duration) -> ExecutionOutcome {
    let store = store.clone();
    let program = program.to_string();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(run_in_scratch(&store, &program));
    });
    match rx.recv_timeout(timeout) {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "generated program timed out");
            ExecutionOutcome::Failure {
                error: format!("execution timed out after {}s", timeout.as_secs()),
                detail: None,
            }
        }
    }
}

fn run_in_scratch(store: &TableStore, program: &str) -> ExecutionOutcome {
    let conn = match Connection::open_in_memory() {
        Ok(conn) => conn,
        Err(e) => {
            return ExecutionOutcome::Failure {
                error: format!("failed to open scratch database: {e}"),
                detail: None,
            }
        }
    };

    // Generated SQL must not reach the filesystem or network; lock the
    // configuration so the program cannot re-enable it.
    if let Err(e) =
        conn.execute_batch("SET enable_external_access = false; SET lock_configuration = true;")
    {
        return ExecutionOutcome::Failure {
            error: format!("failed to restrict scratch database: {e}"),
            detail: None,
        };
    }

    for (name, table) in store.codegen_tables() {
        if let Err(e) = register_table(&conn, name, &table) {
            return ExecutionOutcome::Failure {
                error: format!("failed to register dataset {name}: {e}"),
                detail: None,
            };
        }
    }

    for stmt in split_statements(program) {
        debug!(statement = stmt, "executing generated statement");
        if let Err(e) = conn.execute_batch(stmt) {
            return ExecutionOutcome::Failure {
                error: e.to_string(),
                detail: Some(stmt.to_string()),
            };
        }
    }

    match read_table(&conn, &format!("SELECT * FROM {RESULT_TABLE}")) {
        Ok(table) => ExecutionOutcome::success(classify_result(table)),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("does not exist") || msg.contains("not found") {
                ExecutionOutcome::Failure {
                    error: format!("code did not produce a `{RESULT_TABLE}` table"),
                    detail: None,
                }
            } else {
                ExecutionOutcome::Failure {
                    error: msg,
                    detail: Some(format!("SELECT * FROM {RESULT_TABLE}")),
                }
            }
        }
    }
}

/// Naive ';' split, the same contract the code-generation prompt states:
/// one statement per ';', no string literals containing semicolons.
fn split_statements(program: &str) -> impl Iterator<Item = &str> {
    program.split(';').map(str::trim).filter(|s| !s.is_empty())
}

/// Map a designated-output table onto the four downstream shapes.
fn classify_result(table: DataTable) -> ResultValue {
    let nrows = table.row_count();
    let ncols = table.column_count();
    if nrows == 1 && ncols == 1 {
        return ResultValue::Scalar(table.rows[0][0].clone());
    }
    if nrows == 1 && ncols > 1 {
        let pairs = table
            .columns
            .iter()
            .cloned()
            .zip(table.rows[0].iter().cloned())
            .collect();
        return ResultValue::Mapping(pairs);
    }
    // The group-by shape: one label column, one numeric column.
    if ncols == 2 && !table.column_is_numeric(0) && table.column_is_numeric(1) {
        return ResultValue::Series {
            name: table.columns[1].clone(),
            labels: table.column(0).map(|v| v.to_string()).collect(),
            values: table.column(1).cloned().collect(),
        };
    }
    ResultValue::Table(table)
}

/// Human/LLM-readable rendering. Long tables and series show the first 10
/// entries with an explicit truncation note.
pub fn format_result(outcome: &ExecutionOutcome) -> String {
    match outcome {
        ExecutionOutcome::Failure { error, .. } => format!("Error executing code:\n{error}"),
        ExecutionOutcome::Success { value, .. } => match value {
            ResultValue::Table(table) => {
                let n = table.row_count();
                if n > 20 {
                    format!(
                        "Table with {} rows and {} columns\n\nFirst 10 rows:\n{}\n\n... (showing 10 of {} rows)",
                        n,
                        table.column_count(),
                        table.to_text(10),
                        n,
                    )
                } else {
                    table.to_text(n.max(1))
                }
            }
            ResultValue::Series { labels, values, .. } => {
                let n = values.len();
                if n > 20 {
                    format!(
                        "Series with {} values\n\nFirst 10 values:\n{}\n\n... (showing 10 of {} values)",
                        n,
                        series_text(labels, values, 10),
                        n,
                    )
                } else {
                    series_text(labels, values, n)
                }
            }
            ResultValue::Scalar(v) => format!("Result: {v}"),
            ResultValue::Mapping(pairs) => {
                let mut out = String::from("Result (mapping):\n");
                for (k, v) in pairs {
                    out.push_str(&format!("  {k}: {v}\n"));
                }
                out
            }
        },
    }
}

fn series_text(labels: &[String], values: &[Value], limit: usize) -> String {
    let width = labels
        .iter()
        .take(limit)
        .map(|l| l.len())
        .max()
        .unwrap_or(0);
    labels
        .iter()
        .zip(values.iter())
        .take(limit)
        .map(|(l, v)| format!("{:<width$}  {}", l, v, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}

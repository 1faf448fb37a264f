//! Data-source surface: bound parameters, query results, transactions
//!
//! No concrete database driver lives here. The engine talks to a
//! `DataSource` trait object; parameters are always bound values handed to
//! the surface alongside the statement text, never concatenated into it.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::value::Val;

/// A named parameter bound to a statement placeholder (`:name`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundParam {
    pub name: String,
    pub value: Val,
}

/// Rows plus metadata from one statement execution.
///
/// `exec_time_ms` is filled in by the engine, which times the surface call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySet {
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, Val>>,
    pub exec_time_ms: u64,
    pub last_insert_id: Option<i64>,
}

impl QuerySet {
    pub fn empty() -> Self {
        QuerySet {
            columns: Vec::new(),
            rows: Vec::new(),
            exec_time_ms: 0,
            last_insert_id: None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("statement failed: {0}")]
    Statement(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("statement timed out")]
    Timeout,
}

/// Pluggable data-source surface.
///
/// Implementations are shared across concurrent renders (`Send + Sync`);
/// connection pooling and checkout/checkin are the implementation's
/// concern. Transaction calls arrive strictly as begin → execute* →
/// (commit | rollback) from a single render.
pub trait DataSource: Send + Sync {
    fn execute(&self, statement: &str, params: &[BoundParam]) -> Result<QuerySet, DataSourceError>;

    fn begin(&self) -> Result<(), DataSourceError>;
    fn commit(&self) -> Result<(), DataSourceError>;
    fn rollback(&self) -> Result<(), DataSourceError>;
}

/* ===================== In-memory data source ===================== */

/// Append-only in-memory data source for tests and demos.
///
/// Supported statements: `insert ...` appends the bound parameters as a
/// row; `select ...` returns all committed rows. Anything else fails, which
/// is also how tests exercise transaction rollback. Statements received are
/// journaled verbatim so tests can assert that parameter values never reach
/// statement text.
#[derive(Default)]
pub struct MemoryDataSource {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    committed: Vec<HashMap<String, Val>>,
    pending: Vec<HashMap<String, Val>>,
    in_txn: bool,
    next_id: i64,
    log: Vec<(String, Vec<BoundParam>)>,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements executed so far, with the params as delivered
    pub fn statement_log(&self) -> Vec<(String, Vec<BoundParam>)> {
        self.state.lock().expect("memory datasource poisoned").log.clone()
    }

    pub fn committed_rows(&self) -> Vec<HashMap<String, Val>> {
        self.state
            .lock()
            .expect("memory datasource poisoned")
            .committed
            .clone()
    }
}

impl DataSource for MemoryDataSource {
    fn execute(&self, statement: &str, params: &[BoundParam]) -> Result<QuerySet, DataSourceError> {
        let mut state = self.state.lock().expect("memory datasource poisoned");
        state.log.push((statement.to_string(), params.to_vec()));

        let lowered = statement.trim().to_ascii_lowercase();
        if lowered.starts_with("insert") {
            let mut row: HashMap<String, Val> = params
                .iter()
                .map(|p| (p.name.clone(), p.value.clone()))
                .collect();
            state.next_id += 1;
            let id = state.next_id;
            row.insert("id".to_string(), Val::Num(id as f64));
            if state.in_txn {
                state.pending.push(row);
            } else {
                state.committed.push(row);
            }
            Ok(QuerySet {
                columns: Vec::new(),
                rows: Vec::new(),
                exec_time_ms: 0,
                last_insert_id: Some(id),
            })
        } else if lowered.starts_with("select") {
            let rows: Vec<HashMap<String, Val>> = if state.in_txn {
                state
                    .committed
                    .iter()
                    .chain(state.pending.iter())
                    .cloned()
                    .collect()
            } else {
                state.committed.clone()
            };
            let mut columns: Vec<String> = rows
                .first()
                .map(|r| r.keys().cloned().collect())
                .unwrap_or_default();
            columns.sort();
            Ok(QuerySet {
                columns,
                rows,
                exec_time_ms: 0,
                last_insert_id: None,
            })
        } else {
            Err(DataSourceError::Statement(format!(
                "unsupported statement: {}",
                statement.trim()
            )))
        }
    }

    fn begin(&self) -> Result<(), DataSourceError> {
        let mut state = self.state.lock().expect("memory datasource poisoned");
        state.in_txn = true;
        state.pending.clear();
        Ok(())
    }

    fn commit(&self) -> Result<(), DataSourceError> {
        let mut state = self.state.lock().expect("memory datasource poisoned");
        let pending = std::mem::take(&mut state.pending);
        state.committed.extend(pending);
        state.in_txn = false;
        Ok(())
    }

    fn rollback(&self) -> Result<(), DataSourceError> {
        let mut state = self.state.lock().expect("memory datasource poisoned");
        state.pending.clear();
        state.in_txn = false;
        Ok(())
    }
}

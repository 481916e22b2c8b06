use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{project, StoreConnection};
use crate::error::{Error, Result};
use crate::schema::PRIMARY_KEY;
use crate::value::{Filter, Row, Value};

#[derive(Default)]
struct MemoryTable {
    rows: Vec<Row>,
    last_id: i64,
}

/// Store connection keeping tables in process memory. Tables are created on
/// first insert; reading a table that was never written yields no rows.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<RwLock<HashMap<String, MemoryTable>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        let tables = self.tables.read().map_err(|_| Error::LockPoisoned("read"))?;
        Ok(tables.get(table).map(|t| t.rows.len()).unwrap_or(0))
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Real(r) => Some(*r),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Equality filter. Numbers compare by value on both sides, so `7`, `7.0`
/// and `"7"` all match each other.
fn matches(row: &Row, filter: &Filter) -> bool {
    filter.iter().all(|(column, expected)| {
        let actual = row.get(column).unwrap_or(&Value::Null);
        match (numeric(actual), numeric(expected)) {
            (Some(a), Some(b)) => a == b,
            _ => actual == expected,
        }
    })
}

impl StoreConnection for MemoryStorage {
    fn select(&self, table: &str, fields: &[String], filter: &Filter) -> Result<Vec<Row>> {
        log::debug!("STORE SELECT: table='{}', fields={}, filter={:?}", table, fields.len(), filter);
        let tables = self.tables.read().map_err(|_| Error::LockPoisoned("read"))?;
        let rows: Vec<Row> = tables
            .get(table)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|row| matches(row, filter))
                    .map(|row| project(row, fields))
                    .collect()
            })
            .unwrap_or_default();
        log::debug!("STORE SELECT RESULT: {} rows", rows.len());
        Ok(rows)
    }

    fn insert(&self, table: &str, row: &Row) -> Result<Option<i64>> {
        log::debug!("STORE INSERT: table='{}', columns={:?}", table, row.keys().collect::<Vec<_>>());
        let mut tables = self.tables.write().map_err(|_| Error::LockPoisoned("write"))?;
        let table = tables.entry(table.to_string()).or_default();

        let id = match row.get(PRIMARY_KEY).and_then(Value::as_i64).filter(|id| *id > 0) {
            Some(id) => id,
            None => table.last_id + 1,
        };
        table.last_id = table.last_id.max(id);

        let mut stored = row.clone();
        stored.insert(PRIMARY_KEY.to_string(), Value::Integer(id));
        table.rows.push(stored);
        log::debug!("STORE INSERT RESULT: id={}", id);
        Ok(Some(id))
    }

    fn update(&self, table: &str, row: &Row, filter: &Filter) -> Result<usize> {
        log::debug!("STORE UPDATE: table='{}', filter={:?}", table, filter);
        let mut tables = self.tables.write().map_err(|_| Error::LockPoisoned("write"))?;
        let Some(table) = tables.get_mut(table) else {
            return Ok(0);
        };
        let mut changed = 0;
        for existing in table.rows.iter_mut().filter(|r| matches(r, filter)) {
            existing.extend(row.iter().map(|(k, v)| (k.clone(), v.clone())));
            changed += 1;
        }
        log::debug!("STORE UPDATE RESULT: {} rows", changed);
        Ok(changed)
    }

    fn delete(&self, table: &str, filter: &Filter) -> Result<usize> {
        log::debug!("STORE DELETE: table='{}', filter={:?}", table, filter);
        let mut tables = self.tables.write().map_err(|_| Error::LockPoisoned("write"))?;
        let Some(table) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = table.rows.len();
        table.rows.retain(|r| !matches(r, filter));
        let removed = before - table.rows.len();
        log::debug!("STORE DELETE RESULT: {} rows", removed);
        Ok(removed)
    }
}

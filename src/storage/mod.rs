mod memory_storage;
mod sqlite_storage;

pub use memory_storage::MemoryStorage;
pub use sqlite_storage::SqliteStorage;

use std::sync::Arc;

use crate::error::Result;
use crate::value::{Filter, Row};

/// Row-oriented primitives a backing store must provide. Filters are
/// equality constraints joined with AND.
pub trait StoreConnection: Send + Sync {
    fn select(&self, table: &str, fields: &[String], filter: &Filter) -> Result<Vec<Row>>;

    /// Inserts a row and returns the store generated identity, if any.
    fn insert(&self, table: &str, row: &Row) -> Result<Option<i64>>;

    /// Returns the number of rows changed.
    fn update(&self, table: &str, row: &Row, filter: &Filter) -> Result<usize>;

    /// Returns the number of rows removed.
    fn delete(&self, table: &str, filter: &Filter) -> Result<usize>;

    fn get(&self, table: &str, fields: &[String], filter: &Filter) -> Result<Option<Row>> {
        Ok(self.select(table, fields, filter)?.into_iter().next())
    }
}

impl<S: StoreConnection + ?Sized> StoreConnection for Arc<S> {
    fn select(&self, table: &str, fields: &[String], filter: &Filter) -> Result<Vec<Row>> {
        (**self).select(table, fields, filter)
    }

    fn insert(&self, table: &str, row: &Row) -> Result<Option<i64>> {
        (**self).insert(table, row)
    }

    fn update(&self, table: &str, row: &Row, filter: &Filter) -> Result<usize> {
        (**self).update(table, row, filter)
    }

    fn delete(&self, table: &str, filter: &Filter) -> Result<usize> {
        (**self).delete(table, filter)
    }

    fn get(&self, table: &str, fields: &[String], filter: &Filter) -> Result<Option<Row>> {
        (**self).get(table, fields, filter)
    }
}

/// Projects `row` onto `fields`, filling absent columns with null. An empty
/// field list keeps the whole row.
pub(crate) fn project(row: &Row, fields: &[String]) -> Row {
    if fields.is_empty() {
        return row.clone();
    }
    fields
        .iter()
        .map(|f| (f.clone(), row.get(f).cloned().unwrap_or_default()))
        .collect()
}

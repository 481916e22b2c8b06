use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::proxy::ProxyBinding;
use crate::schema::{Principal, Schema, SearchContext, FIELD_CREATED, FIELD_LAST_EDITED, PRIMARY_KEY};
use crate::storage::StoreConnection;
use crate::value::{Filter, Row, Value};

/// Format of `Created` and `LastEdited`, always in UTC.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn timestamp(at: DateTime<Utc>) -> String {
    at.format(DATETIME_FORMAT).to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    Inserted,
    Updated,
}

/// What happened to the in-memory state after the row was written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refresh {
    /// State was replaced with the re-read row.
    Refreshed,
    /// The written row could not be read back; state is as it was before
    /// the write.
    RowMissing,
    /// The store produced no identity to read the row back with.
    NoIdentity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteOutcome {
    pub kind: WriteKind,
    pub id: Option<i64>,
    pub refresh: Refresh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { rows: usize },
    /// The record was never persisted; no store call was made.
    NoIdentity,
}

/// One record of a shadow type, persisted in the binding's store.
#[derive(Clone)]
pub struct Record {
    binding: Arc<ProxyBinding>,
    data: Row,
}

impl Record {
    pub fn new(binding: Arc<ProxyBinding>) -> Self {
        Record { binding, data: Row::new() }
    }

    pub fn from_row(binding: Arc<ProxyBinding>, row: Row) -> Self {
        let mut record = Self::new(binding);
        record.update(row);
        record
    }

    pub fn binding(&self) -> &Arc<ProxyBinding> {
        &self.binding
    }

    pub fn fields(&self) -> Schema {
        self.binding.fields()
    }

    pub fn all_fields(&self) -> Vec<String> {
        self.binding.all_fields()
    }

    pub fn table_name(&self) -> String {
        self.binding.table_name()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn to_map(&self) -> &Row {
        &self.data
    }

    pub fn id(&self) -> Option<i64> {
        self.data.get(PRIMARY_KEY).and_then(Value::as_i64)
    }

    /// True once the record carries a positive identity.
    pub fn exists(&self) -> bool {
        self.id().is_some_and(|id| id > 0)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.update([(field, value.into())])
    }

    /// Merges `data` into the record. Fields unknown to the schema are
    /// dropped and the primary key is left alone once the record exists.
    pub fn update<I, K, V>(&mut self, data: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let known = self.all_fields();
        for (field, value) in data {
            let field = field.into();
            if self.exists() && field == PRIMARY_KEY {
                continue;
            }
            if !known.contains(&field) {
                log::debug!("UPDATE: dropping unknown field '{}' on {}", field, self.binding.name());
                continue;
            }
            self.data.insert(field, value.into());
        }
        self
    }

    /// Upserts the record and refreshes it from the stored row.
    pub fn write(&mut self) -> Result<WriteOutcome> {
        let table = self.table_name();
        let schema = self.fields();
        let store = self.binding.store().clone();

        let mut prepared: Row = self
            .data
            .iter()
            .filter(|(field, _)| schema.contains(field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();

        let now = Value::Text(timestamp(Utc::now()));
        prepared.insert(FIELD_LAST_EDITED.to_string(), now.clone());

        let (kind, key) = match self.data.get(PRIMARY_KEY).filter(|key| key.is_truthy()) {
            Some(key) => {
                store.update(&table, &prepared, &primary_key_filter(key))?;
                (WriteKind::Updated, Some(key.clone()))
            }
            None => {
                prepared.insert(FIELD_CREATED.to_string(), now);
                let id = store.insert(&table, &prepared)?;
                (WriteKind::Inserted, id.map(Value::Integer))
            }
        };
        log::debug!("WRITE: {:?} {} into '{}', key={:?}", kind, self.binding.name(), table, key);

        let refresh = match &key {
            None => Refresh::NoIdentity,
            Some(key) => match store.get(&table, &self.all_fields(), &primary_key_filter(key))? {
                Some(row) => {
                    self.update(row);
                    Refresh::Refreshed
                }
                None => {
                    log::warn!("WRITE: row {} in '{}' not found after write", key, table);
                    Refresh::RowMissing
                }
            },
        };

        Ok(WriteOutcome { kind, id: key.as_ref().and_then(Value::as_i64), refresh })
    }

    /// Deletes the stored row. In-memory state is kept.
    pub fn delete(&self) -> Result<DeleteOutcome> {
        let Some(key) = self.data.get(PRIMARY_KEY).filter(|key| key.is_truthy()) else {
            return Ok(DeleteOutcome::NoIdentity);
        };
        let rows = self.binding.store().delete(&self.table_name(), &primary_key_filter(key))?;
        log::debug!("DELETE: {} {} from '{}', {} rows", self.binding.name(), key, self.table_name(), rows);
        Ok(DeleteOutcome::Deleted { rows })
    }

    pub fn plural_name(&self) -> String {
        self.binding.metadata().plural_name()
    }

    pub fn search_context(&self) -> SearchContext {
        self.binding.metadata().search_context()
    }

    pub fn summary_fields(&self) -> Vec<String> {
        self.binding.metadata().summary_fields()
    }

    pub fn can_view(&self, principal: Option<&Principal>) -> bool {
        self.binding.metadata().can_view(principal)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("shadow", &self.binding.name())
            .field("data", &self.data)
            .finish()
    }
}

fn primary_key_filter(key: &Value) -> Filter {
    Filter::from([(PRIMARY_KEY.to_string(), key.clone())])
}

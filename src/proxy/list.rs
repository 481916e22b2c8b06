use std::sync::Arc;

use crate::error::Result;
use crate::proxy::{ProxyBinding, Record};
use crate::storage::StoreConnection;
use crate::value::Filter;

/// Every record of a shadow type, fetched with a single select when the
/// list is built. The list never re-queries; build a new one for fresh data.
#[derive(Clone, Debug)]
pub struct ProxyList {
    binding: Arc<ProxyBinding>,
    items: Vec<Record>,
}

impl ProxyList {
    pub fn fetch_all(binding: &Arc<ProxyBinding>) -> Result<Self> {
        let table = binding.table_name();
        let rows = binding.store().select(&table, &binding.all_fields(), &Filter::new())?;
        log::debug!("FETCH: {} rows of {} from '{}'", rows.len(), binding.name(), table);

        let items = rows.into_iter().map(|row| binding.from_row(row)).collect();
        Ok(ProxyList { binding: binding.clone(), items })
    }

    pub fn binding(&self) -> &Arc<ProxyBinding> {
        &self.binding
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.items.get(index)
    }

    pub fn first(&self) -> Option<&Record> {
        self.items.first()
    }

    pub fn find_by_id(&self, id: i64) -> Option<&Record> {
        self.items.iter().find(|r| r.id() == Some(id))
    }

    pub fn into_vec(self) -> Vec<Record> {
        self.items
    }
}

impl IntoIterator for ProxyList {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ProxyList {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::config::{ProxyConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::proxy::{ProxyList, Record};
use crate::schema::{Catalog, EntityMetadata, Schema};
use crate::storage::StoreConnection;
use crate::value::Row;

/// Everything a shadow type needs at runtime: the delegate entity it borrows
/// its schema and metadata from, and the store its rows live in.
pub struct ProxyBinding {
    name: String,
    metadata: Arc<dyn EntityMetadata>,
    store: Arc<dyn StoreConnection>,
}

impl ProxyBinding {
    pub fn new(
        name: &str,
        metadata: Arc<dyn EntityMetadata>,
        store: Arc<dyn StoreConnection>,
    ) -> Arc<Self> {
        Arc::new(ProxyBinding { name: name.to_string(), metadata, store })
    }

    /// Resolves the delegate in `catalog` and connects to the configured store.
    pub fn from_config(name: &str, config: &ProxyConfig, catalog: &Catalog) -> Result<Arc<Self>> {
        let metadata = catalog.resolve(name, &config.delegate)?;
        let store = config.store.connect()?;
        log::debug!("BIND: shadow='{}', delegate='{}', table='{}'", name, config.delegate, metadata.table_name());
        Ok(Self::new(name, metadata, store))
    }

    /// Name of the shadow type.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &Arc<dyn EntityMetadata> {
        &self.metadata
    }

    pub fn store(&self) -> &Arc<dyn StoreConnection> {
        &self.store
    }

    pub fn fields(&self) -> Schema {
        self.metadata.fields()
    }

    pub fn all_fields(&self) -> Vec<String> {
        self.fields().all_fields()
    }

    pub fn table_name(&self) -> String {
        self.metadata.table_name()
    }

    /// A new, not yet persisted record.
    pub fn create(self: &Arc<Self>) -> Record {
        Record::new(self.clone())
    }

    pub fn from_row(self: &Arc<Self>, row: Row) -> Record {
        Record::from_row(self.clone(), row)
    }

    /// Fetches every record of this shadow type.
    pub fn get(self: &Arc<Self>) -> Result<ProxyList> {
        ProxyList::fetch_all(self)
    }
}

impl fmt::Debug for ProxyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyBinding")
            .field("name", &self.name)
            .field("delegate", &self.metadata.name())
            .finish()
    }
}

/// A shadow type declared in code.
pub trait ShadowEntity: 'static {
    /// Name of the delegate entity in the registry's catalog.
    const DELEGATE: &'static str;

    fn store_config() -> StoreConfig;

    /// Short type name with any generic arguments removed.
    fn name() -> &'static str {
        let full_name = std::any::type_name::<Self>();
        let path = full_name.split('<').next().unwrap_or(full_name);
        path.rsplit("::").next().unwrap_or(path)
    }
}

/// Bindings resolved at most once per shadow type for the registry's
/// lifetime. Concurrent first lookups of the same type build one binding.
#[derive(Default)]
pub struct Registry {
    catalog: Catalog,
    typed: Mutex<HashMap<TypeId, Arc<ProxyBinding>>>,
    named: Mutex<HashMap<String, Arc<ProxyBinding>>>,
}

impl Registry {
    pub fn new(catalog: Catalog) -> Self {
        Registry { catalog, ..Default::default() }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn binding<T: ShadowEntity>(&self) -> Result<Arc<ProxyBinding>> {
        let mut typed = self.typed.lock().map_err(|_| Error::LockPoisoned("registry"))?;
        if let Some(binding) = typed.get(&TypeId::of::<T>()) {
            return Ok(binding.clone());
        }
        let config = ProxyConfig::new(T::DELEGATE, T::store_config());
        let binding = ProxyBinding::from_config(T::name(), &config, &self.catalog)?;
        typed.insert(TypeId::of::<T>(), binding.clone());
        Ok(binding)
    }

    /// Binds `T` to an already open store instead of its configured one.
    /// Fails if `T` was bound before.
    pub fn bind_store<T: ShadowEntity>(&self, store: Arc<dyn StoreConnection>) -> Result<Arc<ProxyBinding>> {
        let mut typed = self.typed.lock().map_err(|_| Error::LockPoisoned("registry"))?;
        if typed.contains_key(&TypeId::of::<T>()) {
            return Err(Error::config(format!("{} is already bound", T::name())));
        }
        let metadata = self.catalog.resolve(T::name(), T::DELEGATE)?;
        let binding = ProxyBinding::new(T::name(), metadata, store);
        typed.insert(TypeId::of::<T>(), binding.clone());
        Ok(binding)
    }

    /// Binds a shadow type declared in configuration rather than code.
    pub fn bind(&self, name: &str, config: &ProxyConfig) -> Result<Arc<ProxyBinding>> {
        let mut named = self.named.lock().map_err(|_| Error::LockPoisoned("registry"))?;
        if named.contains_key(name) {
            return Err(Error::config(format!("{} is already bound", name)));
        }
        let binding = ProxyBinding::from_config(name, config, &self.catalog)?;
        named.insert(name.to_string(), binding.clone());
        Ok(binding)
    }

    pub fn named(&self, name: &str) -> Result<Arc<ProxyBinding>> {
        let named = self.named.lock().map_err(|_| Error::LockPoisoned("registry"))?;
        named
            .get(name)
            .cloned()
            .ok_or_else(|| Error::config(format!("{} is not bound", name)))
    }

    pub fn create<T: ShadowEntity>(&self) -> Result<Record> {
        Ok(self.binding::<T>()?.create())
    }

    pub fn list<T: ShadowEntity>(&self) -> Result<ProxyList> {
        self.binding::<T>()?.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityDefinition, FieldType};

    struct ArchivedArtist;

    impl ShadowEntity for ArchivedArtist {
        const DELEGATE: &'static str = "Artist";

        fn store_config() -> StoreConfig {
            StoreConfig::Memory
        }
    }

    struct Orphan;

    impl ShadowEntity for Orphan {
        const DELEGATE: &'static str = "";

        fn store_config() -> StoreConfig {
            StoreConfig::Memory
        }
    }

    struct Archived<T>(std::marker::PhantomData<T>);

    impl<T: 'static> ShadowEntity for Archived<T> {
        const DELEGATE: &'static str = "Artist";

        fn store_config() -> StoreConfig {
            StoreConfig::Memory
        }
    }

    fn registry() -> Registry {
        Registry::new(Catalog::new().with(
            EntityDefinition::new("Artist")
                .field("Name", FieldType::Text)
                .table("ArchivedArtist"),
        ))
    }

    #[test]
    fn shadow_name_is_short_type_name() {
        assert_eq!(ArchivedArtist::name(), "ArchivedArtist");
        assert_eq!(Archived::<ArchivedArtist>::name(), "Archived");
        assert_eq!(Archived::<Vec<std::sync::Arc<Orphan>>>::name(), "Archived");
    }

    #[test]
    fn binding_is_resolved_once() -> anyhow::Result<()> {
        let registry = registry();
        let first = registry.binding::<ArchivedArtist>()?;
        let second = registry.binding::<ArchivedArtist>()?;
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(first.store(), second.store()));
        assert_eq!(first.name(), "ArchivedArtist");
        assert_eq!(first.table_name(), "ArchivedArtist");
        assert_eq!(first.all_fields(), vec!["Name", "ID", "Created", "LastEdited"]);
        Ok(())
    }

    #[test]
    fn missing_delegate_is_config_error() {
        let registry = registry();
        assert!(matches!(registry.binding::<Orphan>(), Err(Error::Config(_))));
        assert!(matches!(registry.create::<Orphan>(), Err(Error::Config(_))));

        let empty = Registry::new(Catalog::new());
        assert!(matches!(empty.list::<ArchivedArtist>(), Err(Error::Config(_))));
    }

    #[test]
    fn bind_store_rejects_rebinding() -> anyhow::Result<()> {
        let registry = registry();
        registry.binding::<ArchivedArtist>()?;
        let result = registry.bind_store::<ArchivedArtist>(Arc::new(crate::storage::MemoryStorage::new()));
        assert!(matches!(result, Err(Error::Config(_))));
        Ok(())
    }

    #[test]
    fn named_bindings() -> anyhow::Result<()> {
        let registry = registry();
        let config = ProxyConfig::from_json(r#"{"delegate": "Artist", "store": {"driver": "memory"}}"#)?;
        let binding = registry.bind("LegacyArtist", &config)?;
        assert!(Arc::ptr_eq(&binding, &registry.named("LegacyArtist")?));
        assert!(matches!(registry.bind("LegacyArtist", &config), Err(Error::Config(_))));
        assert!(matches!(registry.named("Unknown"), Err(Error::Config(_))));

        let orphan = ProxyConfig::new("Album", StoreConfig::Memory);
        assert!(matches!(registry.bind("LegacyAlbum", &orphan), Err(Error::Config(_))));
        Ok(())
    }
}

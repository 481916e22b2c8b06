use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const FIELD_ID: &str = "ID";
pub const FIELD_CREATED: &str = "Created";
pub const FIELD_LAST_EDITED: &str = "LastEdited";

pub const PRIMARY_KEY: &str = FIELD_ID;

/// Fields every backing table carries in addition to the declared schema.
pub const RESERVED_FIELDS: [&str; 3] = [FIELD_ID, FIELD_CREATED, FIELD_LAST_EDITED];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_FIELDS.contains(&name)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Integer,
    Real,
    Boolean,
    Date,
    Datetime,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Ordered declared fields of an entity. Reserved fields are never part of it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Builds a schema, keeping the first declaration of each name and
    /// skipping reserved names.
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        let mut seen = BTreeSet::new();
        let fields = fields
            .into_iter()
            .filter(|f| !is_reserved(&f.name) && seen.insert(f.name.clone()))
            .collect();
        Schema { fields }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        match name {
            FIELD_ID => Some(FieldType::Integer),
            FIELD_CREATED | FIELD_LAST_EDITED => Some(FieldType::Datetime),
            _ => self.fields.iter().find(|f| f.name == name).map(|f| f.field_type),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Declared field names followed by `ID`, `Created` and `LastEdited`.
    pub fn all_fields(&self) -> Vec<String> {
        let mut names = self.names();
        names.extend(RESERVED_FIELDS.iter().map(|s| s.to_string()));
        names
    }
}

/// The caller on whose behalf a permission check runs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl Principal {
    pub fn new(id: &str) -> Self {
        Principal { id: id.to_string(), permissions: BTreeSet::new() }
    }

    pub fn with_permission(mut self, permission: &str) -> Self {
        self.permissions.insert(permission.to_string());
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Describes which fields an admin listing may search on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchContext {
    pub entity: String,
    pub fields: Vec<String>,
}

/// Supplies the field schema and display/access metadata a shadow type
/// borrows from its delegate entity.
pub trait EntityMetadata: Send + Sync {
    fn name(&self) -> &str;
    fn fields(&self) -> Schema;
    fn table_name(&self) -> String;
    fn plural_name(&self) -> String;
    fn search_context(&self) -> SearchContext;
    fn summary_fields(&self) -> Vec<String>;
    fn can_view(&self, principal: Option<&Principal>) -> bool;
}

/// Plain-data entity description, usually loaded from JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    pub fields: Vec<Field>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub plural_name: Option<String>,
    #[serde(default)]
    pub summary_fields: Option<Vec<String>>,
    #[serde(default)]
    pub searchable_fields: Option<Vec<String>>,
    /// Permission required to view records. `None` means public.
    #[serde(default)]
    pub view_permission: Option<String>,
}

impl EntityDefinition {
    pub fn new(name: &str) -> Self {
        EntityDefinition {
            name: name.to_string(),
            fields: Vec::new(),
            table_name: None,
            plural_name: None,
            summary_fields: None,
            searchable_fields: None,
            view_permission: None,
        }
    }

    pub fn field(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields.push(Field { name: name.to_string(), field_type });
        self
    }

    pub fn table(mut self, table_name: &str) -> Self {
        self.table_name = Some(table_name.to_string());
        self
    }

    pub fn plural(mut self, plural_name: &str) -> Self {
        self.plural_name = Some(plural_name.to_string());
        self
    }

    pub fn summary(mut self, fields: &[&str]) -> Self {
        self.summary_fields = Some(fields.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn requires_permission(mut self, permission: &str) -> Self {
        self.view_permission = Some(permission.to_string());
        self
    }
}

impl EntityMetadata for EntityDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> Schema {
        Schema::new(self.fields.iter().cloned())
    }

    fn table_name(&self) -> String {
        self.table_name.clone().unwrap_or_else(|| self.name.clone())
    }

    fn plural_name(&self) -> String {
        self.plural_name.clone().unwrap_or_else(|| format!("{}s", self.name))
    }

    fn search_context(&self) -> SearchContext {
        SearchContext {
            entity: self.name.clone(),
            fields: self.searchable_fields.clone().unwrap_or_else(|| self.summary_fields()),
        }
    }

    fn summary_fields(&self) -> Vec<String> {
        self.summary_fields.clone().unwrap_or_else(|| self.fields().names())
    }

    fn can_view(&self, principal: Option<&Principal>) -> bool {
        match &self.view_permission {
            None => true,
            Some(permission) => principal.is_some_and(|p| p.has_permission(permission)),
        }
    }
}

/// Delegate entities known to the application, by name.
#[derive(Clone, Default)]
pub struct Catalog {
    entities: BTreeMap<String, Arc<dyn EntityMetadata>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, metadata: Arc<dyn EntityMetadata>) -> &mut Self {
        self.entities.insert(metadata.name().to_string(), metadata);
        self
    }

    pub fn with(mut self, definition: EntityDefinition) -> Self {
        self.register(Arc::new(definition));
        self
    }

    /// Loads a JSON array of entity definitions.
    pub fn from_json(json: &str) -> Result<Self> {
        let definitions: Vec<EntityDefinition> = serde_json::from_str(json)?;
        Ok(definitions.into_iter().fold(Catalog::new(), Catalog::with))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn EntityMetadata>> {
        self.entities.get(name).cloned()
    }

    /// Resolves the delegate of a shadow type or fails with a
    /// configuration error naming the shadow type.
    pub fn resolve(&self, shadow: &str, delegate: &str) -> Result<Arc<dyn EntityMetadata>> {
        if delegate.trim().is_empty() {
            return Err(Error::config(format!("{} is missing a delegate entity setting", shadow)));
        }
        self.get(delegate).ok_or_else(|| {
            Error::config(format!("{} delegates to unknown entity '{}'", shadow, delegate))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artist() -> EntityDefinition {
        EntityDefinition::new("Artist")
            .field("Name", FieldType::Text)
            .field("Country", FieldType::Text)
            .field("Founded", FieldType::Integer)
    }

    #[test]
    fn all_fields_appends_reserved_once() {
        let schema = artist().field("ID", FieldType::Integer).field("Name", FieldType::Real).fields();
        assert_eq!(
            schema.all_fields(),
            vec!["Name", "Country", "Founded", "ID", "Created", "LastEdited"]
        );
        assert_eq!(schema.field_type("Name"), Some(FieldType::Text));
        assert_eq!(schema.field_type("LastEdited"), Some(FieldType::Datetime));
    }

    #[test]
    fn metadata_defaults() {
        let artist = artist();
        assert_eq!(artist.table_name(), "Artist");
        assert_eq!(artist.plural_name(), "Artists");
        assert_eq!(artist.summary_fields(), vec!["Name", "Country", "Founded"]);
        assert_eq!(artist.search_context().fields, artist.summary_fields());

        let artist = artist.table("ArchivedArtist").plural("Archived Artists").summary(&["Name"]);
        assert_eq!(artist.table_name(), "ArchivedArtist");
        assert_eq!(artist.plural_name(), "Archived Artists");
        assert_eq!(artist.search_context().fields, vec!["Name"]);
    }

    #[test]
    fn can_view_checks_permission() {
        let public = artist();
        assert!(public.can_view(None));

        let private = artist().requires_permission("VIEW_ARCHIVE");
        assert!(!private.can_view(None));
        assert!(!private.can_view(Some(&Principal::new("bob"))));
        assert!(private.can_view(Some(&Principal::new("alice").with_permission("VIEW_ARCHIVE"))));
    }

    #[test]
    fn catalog_resolve() -> anyhow::Result<()> {
        let catalog = Catalog::from_json(
            r#"[{"name": "Artist", "fields": [{"name": "Name", "type": "Text"}]}]"#,
        )?;
        assert_eq!(catalog.resolve("ArchivedArtist", "Artist")?.fields().names(), vec!["Name"]);
        assert!(matches!(catalog.resolve("ArchivedArtist", ""), Err(Error::Config(_))));
        assert!(matches!(catalog.resolve("ArchivedArtist", "Album"), Err(Error::Config(_))));
        Ok(())
    }

    #[test]
    fn catalog_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"[{"name": "Artist", "table_name": "ArchivedArtist",
                 "fields": [{"name": "Name", "type": "Text"}, {"name": "Founded", "type": "Integer"}]}]"#,
        )?;
        let artist = Catalog::from_file(&path)?.get("Artist").expect("registered");
        assert_eq!(artist.table_name(), "ArchivedArtist");
        assert_eq!(artist.fields().field_type("Founded"), Some(FieldType::Integer));

        assert!(matches!(Catalog::from_file(dir.path().join("missing.json")), Err(Error::Io(_))));
        Ok(())
    }
}

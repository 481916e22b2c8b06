use std::sync::Arc;

use shadow_db::rusqlite_migration::{Migrations, M};
use shadow_db::{row, Catalog, EntityDefinition, FieldType, Registry, ShadowEntity, SqliteStorage, StoreConfig};

struct ArchivedArtist;

impl ShadowEntity for ArchivedArtist {
    const DELEGATE: &'static str = "Artist";

    fn store_config() -> StoreConfig {
        StoreConfig::sqlite("archive.db")
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let catalog = Catalog::new().with(
        EntityDefinition::new("Artist")
            .field("Name", FieldType::Text)
            .field("Country", FieldType::Text)
            .table("ArchivedArtist"),
    );

    let storage = SqliteStorage::open_memory()?;
    storage.migrate(&Migrations::new(vec![M::up(
        "CREATE TABLE ArchivedArtist (
            ID INTEGER PRIMARY KEY AUTOINCREMENT,
            Created TEXT,
            LastEdited TEXT,
            Name TEXT NOT NULL,
            Country TEXT
        );",
    )]))?;

    let registry = Registry::new(catalog);
    registry.bind_store::<ArchivedArtist>(Arc::new(storage))?;

    let mut artist = registry.create::<ArchivedArtist>()?;
    let outcome = artist.update(row! { "Name" => "Metallica", "Country" => "US" }).write()?;
    dbg!(outcome, &artist);

    artist.set("Country", "USA").write()?;
    for artist in &registry.list::<ArchivedArtist>()? {
        dbg!(artist.to_map());
    }

    artist.delete()?;
    Ok(())
}

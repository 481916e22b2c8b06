use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params_from_iter, Connection};
use rusqlite_migration::Migrations;

use super::StoreConnection;
use crate::error::{Error, Result};
use crate::value::{Filter, Row, Value};

/// Store connection backed by a single SQLite database.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(SqliteStorage { conn: Mutex::new(conn) })
    }

    /// Brings the backing tables up to date with caller supplied migrations.
    pub fn migrate(&self, migrations: &Migrations) -> Result<()> {
        let mut conn = self.conn()?;
        migrations.to_latest(&mut *conn)?;
        Ok(())
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned("connection"))
    }

    fn select_sql(table: &str, fields: &[String], filter: &Filter, limit: Option<usize>) -> Result<String> {
        let columns = if fields.is_empty() {
            "*".to_string()
        } else {
            fields.iter().map(|f| quote_ident(f)).collect::<Result<Vec<_>>>()?.join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}{}", columns, quote_ident(table)?, where_clause(filter)?);
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        Ok(sql)
    }

    fn query_rows(&self, sql: &str, filter: &Filter) -> Result<Vec<Row>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut rows = stmt.query(params_from_iter(filter.values()))?;

        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, name) in column_names.iter().enumerate() {
                record.insert(name.clone(), Value::from(row.get_ref(i)?));
            }
            results.push(record);
        }
        Ok(results)
    }
}

impl StoreConnection for SqliteStorage {
    fn select(&self, table: &str, fields: &[String], filter: &Filter) -> Result<Vec<Row>> {
        log::debug!("STORE SELECT: table='{}', fields={}, filter={:?}", table, fields.len(), filter);
        let sql = Self::select_sql(table, fields, filter, None)?;
        let rows = self.query_rows(&sql, filter)?;
        log::debug!("STORE SELECT RESULT: {} rows", rows.len());
        Ok(rows)
    }

    fn get(&self, table: &str, fields: &[String], filter: &Filter) -> Result<Option<Row>> {
        log::debug!("STORE GET: table='{}', filter={:?}", table, filter);
        let sql = Self::select_sql(table, fields, filter, Some(1))?;
        Ok(self.query_rows(&sql, filter)?.into_iter().next())
    }

    fn insert(&self, table: &str, row: &Row) -> Result<Option<i64>> {
        log::debug!("STORE INSERT: table='{}', columns={:?}", table, row.keys().collect::<Vec<_>>());
        let sql = if row.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table)?)
        } else {
            let columns = row.keys().map(|c| quote_ident(c)).collect::<Result<Vec<_>>>()?;
            let placeholders = vec!["?"; row.len()].join(", ");
            format!("INSERT INTO {} ({}) VALUES ({})", quote_ident(table)?, columns.join(", "), placeholders)
        };

        let conn = self.conn()?;
        conn.execute(&sql, params_from_iter(row.values()))?;
        let id = conn.last_insert_rowid();
        log::debug!("STORE INSERT RESULT: id={}", id);
        Ok(Some(id))
    }

    fn update(&self, table: &str, row: &Row, filter: &Filter) -> Result<usize> {
        log::debug!("STORE UPDATE: table='{}', filter={:?}", table, filter);
        if row.is_empty() {
            return Ok(0);
        }
        let set_clause = row
            .keys()
            .map(|c| Ok(format!("{} = ?", quote_ident(c)?)))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let sql = format!("UPDATE {} SET {}{}", quote_ident(table)?, set_clause, where_clause(filter)?);

        let changed = self
            .conn()?
            .execute(&sql, params_from_iter(row.values().chain(filter.values())))?;
        log::debug!("STORE UPDATE RESULT: {} rows", changed);
        Ok(changed)
    }

    fn delete(&self, table: &str, filter: &Filter) -> Result<usize> {
        log::debug!("STORE DELETE: table='{}', filter={:?}", table, filter);
        let sql = format!("DELETE FROM {}{}", quote_ident(table)?, where_clause(filter)?);
        let removed = self.conn()?.execute(&sql, params_from_iter(filter.values()))?;
        log::debug!("STORE DELETE RESULT: {} rows", removed);
        Ok(removed)
    }
}

/// Quotes a table or column name for use in generated SQL.
fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('\0') {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

fn where_clause(filter: &Filter) -> Result<String> {
    if filter.is_empty() {
        return Ok(String::new());
    }
    let predicates = filter
        .keys()
        .map(|c| Ok(format!("{} = ?", quote_ident(c)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(" WHERE {}", predicates.join(" AND ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    fn storage() -> anyhow::Result<SqliteStorage> {
        let storage = SqliteStorage::open_memory()?;
        storage.execute_batch(
            "CREATE TABLE Artist (
                ID         INTEGER PRIMARY KEY AUTOINCREMENT,
                Created    TEXT,
                LastEdited TEXT,
                Name       TEXT,
                Country    TEXT
            );",
        )?;
        Ok(storage)
    }

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn quote_ident_escapes_quotes() -> anyhow::Result<()> {
        assert_eq!(quote_ident("Name")?, "\"Name\"");
        assert_eq!(quote_ident("we\"ird")?, "\"we\"\"ird\"");
        assert!(matches!(quote_ident(""), Err(Error::InvalidIdentifier(_))));
        assert!(matches!(quote_ident("a\0b"), Err(Error::InvalidIdentifier(_))));
        Ok(())
    }

    #[test]
    fn insert_get_update_delete() -> anyhow::Result<()> {
        let storage = storage()?;
        let id = storage.insert("Artist", &row! { "Name" => "Metallica", "Country" => "US" })?;
        assert_eq!(id, Some(1));

        let found = storage
            .get("Artist", &fields(&["ID", "Name"]), &row! { "ID" => 1 })?
            .expect("row");
        assert_eq!(found, row! { "ID" => 1, "Name" => "Metallica" });

        let changed = storage.update("Artist", &row! { "Country" => "USA" }, &row! { "ID" => 1 })?;
        assert_eq!(changed, 1);
        let found = storage.get("Artist", &[], &row! { "ID" => 1 })?.expect("row");
        assert_eq!(found["Country"], Value::from("USA"));
        assert_eq!(found["Created"], Value::Null);

        assert_eq!(storage.delete("Artist", &row! { "ID" => 1 })?, 1);
        assert!(storage.get("Artist", &[], &row! { "ID" => 1 })?.is_none());
        Ok(())
    }

    #[test]
    fn select_returns_insertion_order() -> anyhow::Result<()> {
        let storage = storage()?;
        for name in ["Slayer", "Anthrax", "Megadeth"] {
            storage.insert("Artist", &row! { "Name" => name })?;
        }
        let rows = storage.select("Artist", &fields(&["Name"]), &Filter::new())?;
        let names: Vec<_> = rows.iter().map(|r| r["Name"].to_string()).collect();
        assert_eq!(names, vec!["Slayer", "Anthrax", "Megadeth"]);

        let rows = storage.select("Artist", &fields(&["Name"]), &row! { "Name" => "Anthrax" })?;
        assert_eq!(rows.len(), 1);
        Ok(())
    }

    #[test]
    fn missing_table_is_store_error() -> anyhow::Result<()> {
        let storage = SqliteStorage::open_memory()?;
        let result = storage.select("Nope", &[], &Filter::new());
        assert!(matches!(result, Err(Error::Store(_))));
        Ok(())
    }

    #[test]
    fn migrate_creates_tables() -> anyhow::Result<()> {
        use rusqlite_migration::M;

        let storage = SqliteStorage::open_memory()?;
        let migrations = Migrations::new(vec![
            M::up("CREATE TABLE Album (ID INTEGER PRIMARY KEY, Created TEXT, LastEdited TEXT, Title TEXT);"),
            M::up("ALTER TABLE Album ADD COLUMN Year INTEGER;"),
        ]);
        storage.migrate(&migrations)?;
        storage.insert("Album", &row! { "Title" => "Master of Puppets", "Year" => 1986 })?;
        let rows = storage.select("Album", &fields(&["Title", "Year"]), &Filter::new())?;
        assert_eq!(rows[0]["Year"], Value::Integer(1986));
        Ok(())
    }
}

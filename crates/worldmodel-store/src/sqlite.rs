//! SQLite persistence backend.
//!
//! # Storage layout
//!
//! Three tables are created (if they do not already exist):
//!
//! | table         | columns                                   | purpose                                  |
//! |---------------|-------------------------------------------|------------------------------------------|
//! | `sequences`   | collection, last_id                       | per-collection id counter                |
//! | `records`     | collection, id, body                      | JSON-encoded sparse record               |
//! | `record_tags` | collection, id, position, tag             | tag index, one row per tag occurrence    |
//!
//! Tag searches run against `record_tags` (`GROUP BY id HAVING COUNT(DISTINCT
//! tag) = n`) instead of decoding every body.
//!
//! # Example
//!
//! ```rust
//! use worldmodel_store::backend::{Backend, Collection};
//! use worldmodel_store::record::{Field, Record, Value};
//! use worldmodel_store::sqlite::SqliteBackend;
//!
//! let backend = SqliteBackend::open_in_memory().unwrap();
//! let mut r = Record::new();
//! r.insert(Field::Name, Value::Text("Robot".to_string()));
//! let id = backend.insert(Collection::Instances, r).unwrap();
//! assert_eq!(id, 1);
//! ```

use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Transaction, params, params_from_iter};

use crate::backend::{Backend, Collection};
use crate::error::StoreError;
use crate::record::{Record, Value};
use crate::tags::TagQuery;

/// SQLite-backed [`Backend`].
///
/// The connection is guarded by a mutex; every trait call runs inside its own
/// transaction.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) a persistent database at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sequences (
            collection TEXT NOT NULL PRIMARY KEY,
            last_id    INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS records (
            collection TEXT NOT NULL,
            id         INTEGER NOT NULL,
            body       TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        );
        CREATE TABLE IF NOT EXISTS record_tags (
            collection TEXT NOT NULL,
            id         INTEGER NOT NULL,
            position   INTEGER NOT NULL,
            tag        TEXT NOT NULL,
            PRIMARY KEY (collection, id, position)
        );
        CREATE INDEX IF NOT EXISTS record_tags_by_tag ON record_tags (collection, tag);",
    )?;
    Ok(())
}

fn to_sql_id(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

fn write_tags(tx: &Transaction<'_>, collection: Collection, id: u64, record: &Record) -> Result<(), StoreError> {
    tx.execute(
        "DELETE FROM record_tags WHERE collection = ?1 AND id = ?2",
        params![collection.as_str(), to_sql_id(id)],
    )?;
    for (position, tag) in record.tags().iter().enumerate() {
        tx.execute(
            "INSERT INTO record_tags (collection, id, position, tag) VALUES (?1, ?2, ?3, ?4)",
            params![collection.as_str(), to_sql_id(id), position as i64, tag],
        )?;
    }
    Ok(())
}

fn decode_rows(rows: Vec<(i64, String)>) -> Result<Vec<(u64, Record)>, StoreError> {
    rows.into_iter()
        .map(|(id, body)| Ok((id as u64, Record::from_json_str(&body)?)))
        .collect()
}

impl Backend for SqliteBackend {
    fn insert(&self, collection: Collection, mut record: Record) -> Result<u64, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO sequences (collection, last_id) VALUES (?1, 0)",
            params![collection.as_str()],
        )?;
        tx.execute(
            "UPDATE sequences SET last_id = last_id + 1 WHERE collection = ?1",
            params![collection.as_str()],
        )?;
        let id: i64 = tx.query_row(
            "SELECT last_id FROM sequences WHERE collection = ?1",
            params![collection.as_str()],
            |row| row.get(0),
        )?;
        let id = id as u64;
        record.insert(collection.id_field(), Value::Integer(id));
        tx.execute(
            "INSERT INTO records (collection, id, body) VALUES (?1, ?2, ?3)",
            params![collection.as_str(), to_sql_id(id), record.to_json_string()?],
        )?;
        write_tags(&tx, collection, id, &record)?;
        tx.commit()?;
        Ok(id)
    }

    fn get(&self, collection: Collection, id: u64) -> Result<Option<Record>, StoreError> {
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM records WHERE collection = ?1 AND id = ?2",
                params![collection.as_str(), to_sql_id(id)],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(raw) => Ok(Some(Record::from_json_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn replace(&self, collection: Collection, id: u64, mut record: Record) -> Result<bool, StoreError> {
        record.insert(collection.id_field(), Value::Integer(id));
        let body = record.to_json_string()?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE records SET body = ?3 WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), to_sql_id(id), body],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        write_tags(&tx, collection, id, &record)?;
        tx.commit()?;
        Ok(true)
    }

    fn remove(&self, collection: Collection, id: u64) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), to_sql_id(id)],
        )?;
        tx.execute(
            "DELETE FROM record_tags WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), to_sql_id(id)],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(u64, Record)>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, body FROM records WHERE collection = ?1 ORDER BY id ASC")?;
        let rows = stmt
            .query_map(params![collection.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(i64, String)>, _>>()?;
        decode_rows(rows)
    }

    fn find_by_tags(
        &self,
        collection: Collection,
        query: &TagQuery,
    ) -> Result<Vec<(u64, Record)>, StoreError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let holders = (0..query.tags().len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT r.id, r.body FROM records r
             WHERE r.collection = ?1 AND r.id IN (
                 SELECT id FROM record_tags
                 WHERE collection = ?1 AND tag IN ({holders})
                 GROUP BY id
                 HAVING COUNT(DISTINCT tag) = ?2
             )
             ORDER BY r.id ASC"
        );
        // ?1 collection, ?2 tag count, ?3.. tags.
        let mut values = vec![
            SqlValue::Text(collection.as_str().to_string()),
            SqlValue::Integer(query.tags().len() as i64),
        ];
        values.extend(query.tags().iter().cloned().map(SqlValue::Text));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(i64, String)>, _>>()?;
        decode_rows(rows)
    }
}

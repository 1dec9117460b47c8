use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use decor_core::RetrievedPassage;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, InterruptHandle};
use serde_json::Value;
use tracing::debug;

use crate::vector::{cosine_distance, parse_vector_literal, to_vector_literal};

const SCHEMA: &str = r#"
    PRAGMA journal_mode = WAL;
    CREATE TABLE IF NOT EXISTS pricing_embeddings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        category TEXT NOT NULL,
        item_name TEXT,
        content TEXT NOT NULL,
        metadata TEXT,
        embedding TEXT NOT NULL,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_pricing_category ON pricing_embeddings(category);
"#;

const NEAREST_SQL: &str = r#"
    SELECT content, metadata, vec_cosine_distance(embedding, ?1) AS distance
    FROM pricing_embeddings
    ORDER BY distance ASC, id ASC
    LIMIT ?2
"#;

/// SQLite-backed passage table. Cheap to clone; every clone shares the connection counters.
#[derive(Clone)]
pub struct VectorStore {
    path: PathBuf,
    live: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
}

impl VectorStore {
    /// Handle without touching the file. Connections are opened per call.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            live: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = Self::new(path);
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Drops every passage and recreates the table.
    pub fn reset(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch("DROP TABLE IF EXISTS pricing_embeddings;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn connect(&self) -> Result<StoreConnection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        register_distance(&conn)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(StoreConnection {
            conn,
            live: Arc::clone(&self.live),
        })
    }

    /// Connections currently checked out.
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn opened_connections(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn insert_passages(&self, passages: &[PassageInsert]) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for passage in passages {
            tx.execute(
                "INSERT INTO pricing_embeddings (category, item_name, content, metadata, embedding) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    passage.category,
                    passage.item_name,
                    passage.content,
                    passage.metadata.to_string(),
                    to_vector_literal(&passage.embedding),
                ],
            )?;
        }
        tx.commit()?;
        Ok(passages.len())
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.connect()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM pricing_embeddings", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// A checked-out connection. Dropping it closes the connection and releases its slot in
/// the live counter, whichever way the caller exits.
pub struct StoreConnection {
    conn: Connection,
    live: Arc<AtomicUsize>,
}

impl StoreConnection {
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.conn.get_interrupt_handle()
    }

    /// Top `limit` passages by cosine distance to `query_literal`, ties broken by insertion
    /// order.
    pub fn nearest(&self, query_literal: &str, limit: usize) -> Result<Vec<RetrievedPassage>> {
        let mut stmt = self.conn.prepare(NEAREST_SQL)?;
        let rows = stmt.query_map(params![query_literal, limit as i64], |row| {
            let content: String = row.get(0)?;
            let metadata: Option<String> = row.get(1)?;
            let distance: f64 = row.get(2)?;
            Ok(RetrievedPassage::new(
                content,
                RetrievedPassage::metadata_from_json(metadata.as_deref()),
                distance,
            ))
        })?;
        let passages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(rows = passages.len(), limit, "nearest passages fetched");
        Ok(passages)
    }
}

impl Deref for StoreConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl std::ops::DerefMut for StoreConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Drop for StoreConnection {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

fn register_distance(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "vec_cosine_distance",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let stored: String = ctx.get(0)?;
            let query: String = ctx.get(1)?;
            let stored = parse_vector_literal(&stored)
                .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
            let query = parse_vector_literal(&query)
                .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
            cosine_distance(&stored, &query).map_err(|e| rusqlite::Error::UserFunctionError(e.into()))
        },
    )
}

#[derive(Debug, Clone)]
pub struct PassageInsert {
    pub category: String,
    pub item_name: String,
    pub content: String,
    pub metadata: Value,
    pub embedding: Vec<f32>,
}

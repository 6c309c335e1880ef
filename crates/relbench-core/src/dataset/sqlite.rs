use super::QrelSource;
use crate::model::QrelRow;
use anyhow::Context;
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Layout the loader scripts produce. Only read by this crate.
pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS queries (
  query_id TEXT PRIMARY KEY,
  text TEXT
);

CREATE TABLE IF NOT EXISTS docs (
  doc_id TEXT PRIMARY KEY,
  text TEXT
);

CREATE TABLE IF NOT EXISTS qrels (
  query_id TEXT NOT NULL,
  doc_id TEXT NOT NULL,
  relevance INTEGER NOT NULL,
  PRIMARY KEY (query_id, doc_id)
);
"#;

const COUNT_SQL: &str = "SELECT COUNT(*)
     FROM qrels qr
     JOIN queries q ON q.query_id = qr.query_id
     JOIN docs d ON d.doc_id = qr.doc_id";

const FETCH_SQL: &str = "SELECT qr.query_id, COALESCE(q.text, ''), qr.doc_id, COALESCE(d.text, ''), qr.relevance
     FROM qrels qr
     JOIN queries q ON q.query_id = qr.query_id
     JOIN docs d ON d.doc_id = qr.doc_id
     ORDER BY qr.query_id, qr.doc_id
     LIMIT ?1 OFFSET ?2";

pub struct SqliteQrels {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteQrels {
    /// Opens an existing dataset file read-only.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open dataset {}", path.display()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            path: None,
        }
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("dataset connection mutex poisoned"))
    }
}

impl QrelSource for SqliteQrels {
    fn count(&self) -> anyhow::Result<u64> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row(COUNT_SQL, [], |r| r.get(0))
            .context("failed to count qrels")?;
        Ok(n.max(0) as u64)
    }

    fn fetch(&self, offset: u64, limit: u64) -> anyhow::Result<Vec<QrelRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(FETCH_SQL)?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                Ok(QrelRow {
                    query_id: row.get(0)?,
                    query_text: row.get::<_, String>(1)?.trim().to_string(),
                    doc_id: row.get(2)?,
                    doc_text: row.get::<_, String>(3)?.trim().to_string(),
                    gold_score: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to fetch qrels")?;
        Ok(rows)
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(p) => format!("sqlite:{}", p.display()),
            None => "sqlite:<connection>".to_string(),
        }
    }
}

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OpenFlags};

use crate::event::DetectionLog;

/// Durable store for consolidated detection logs.
pub trait DetectionLogStore: Send {
    /// Insert a log and return the identity assigned by the store.
    fn insert(&mut self, log: &DetectionLog) -> Result<i64>;

    /// Most recent logs for one subject, newest first.
    fn latest_for_subject(&mut self, subject_id: &str, limit: usize) -> Result<Vec<DetectionLog>>;
}

pub struct SqliteDetectionLogStore {
    conn: Connection,
}

impl SqliteDetectionLogStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = if db_path.starts_with("file:") {
            Connection::open_with_flags(
                db_path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI,
            )?
        } else {
            Connection::open(db_path)?
        };
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS detection_logs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              timestamp INTEGER NOT NULL,
              objects_detected TEXT NOT NULL,
              object_count INTEGER NOT NULL,
              extracted_text TEXT NOT NULL,
              scene_description TEXT NOT NULL,
              subject_id TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_detection_logs_subject ON detection_logs(subject_id);
            "#,
        )?;
        Ok(())
    }
}

impl DetectionLogStore for SqliteDetectionLogStore {
    fn insert(&mut self, log: &DetectionLog) -> Result<i64> {
        let timestamp = i64::try_from(log.timestamp)
            .map_err(|_| anyhow!("timestamp exceeds i64 range"))?;
        self.conn.execute(
            r#"
            INSERT INTO detection_logs(timestamp, objects_detected, object_count,
                                       extracted_text, scene_description, subject_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                timestamp,
                log.objects_detected,
                log.object_count,
                log.extracted_text,
                log.scene_description,
                log.subject_id
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn latest_for_subject(&mut self, subject_id: &str, limit: usize) -> Result<Vec<DetectionLog>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, timestamp, objects_detected, object_count,
                   extracted_text, scene_description, subject_id
            FROM detection_logs
            WHERE subject_id = ?1
            ORDER BY timestamp DESC, id DESC
            LIMIT ?2
            "#,
        )?;
        let mut rows = stmt.query(params![subject_id, limit as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let timestamp: i64 = row.get(1)?;
            out.push(DetectionLog {
                id: row.get(0)?,
                timestamp: u64::try_from(timestamp)
                    .map_err(|_| anyhow!("corrupt detection log: negative timestamp"))?,
                objects_detected: row.get(2)?,
                object_count: row.get(3)?,
                extracted_text: row.get(4)?,
                scene_description: row.get(5)?,
                subject_id: row.get(6)?,
            });
        }
        Ok(out)
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryDetectionLogStore {
    logs: Vec<DetectionLog>,
}

impl InMemoryDetectionLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logs(&self) -> &[DetectionLog] {
        &self.logs
    }
}

impl DetectionLogStore for InMemoryDetectionLogStore {
    fn insert(&mut self, log: &DetectionLog) -> Result<i64> {
        let id = self.logs.len() as i64 + 1;
        let mut stored = log.clone();
        stored.id = id;
        self.logs.push(stored);
        Ok(id)
    }

    fn latest_for_subject(&mut self, subject_id: &str, limit: usize) -> Result<Vec<DetectionLog>> {
        let mut matching: Vec<DetectionLog> = self
            .logs
            .iter()
            .filter(|log| log.subject_id == subject_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        matching.truncate(limit);
        Ok(matching)
    }
}

use crate::types::{DecimalConfidence, DetectionRecord};
use failure::Error;
use log::info;
use rusqlite::{Connection, Row, NO_PARAMS};
use std::path::Path;
use std::sync::Mutex;

/// Record store used by the recorder and the duplicate check.
pub trait DetectionStore: Send + Sync {
    /// Writes `record` keyed by its image key, replacing any earlier row for
    /// the same image.
    fn put(&self, record: &DetectionRecord) -> Result<(), Error>;

    /// Records for `plate_text` with a timestamp strictly after `since`.
    fn find_recent(&self, plate_text: &str, since: &str) -> Result<Vec<DetectionRecord>, Error>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> Result<SqliteStore, Error> {
        let conn = Connection::open(path.as_ref())?;
        info!("Opened detection database {:?}", path.as_ref());
        SqliteStore::with_connection(conn, table)
    }

    /// Creates the table and its (plate_text, timestamp) index if they are
    /// missing.
    pub fn with_connection(conn: Connection, table: &str) -> Result<SqliteStore, Error> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format_err!("Invalid table name {:?}", table));
        }
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (\
                 image_key TEXT NOT NULL PRIMARY KEY, \
                 plate_text TEXT NOT NULL, \
                 timestamp TEXT NOT NULL, \
                 confidence TEXT NOT NULL, \
                 bucket_name TEXT NOT NULL) WITHOUT ROWID",
                table
            ),
            NO_PARAMS,
        )?;
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS {0}_plate_timestamp ON {0} (plate_text, timestamp)",
                table
            ),
            NO_PARAMS,
        )?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, Error> {
        self.conn
            .lock()
            .map_err(|_| format_err!("Detection database lock poisoned"))
    }

    #[cfg(test)]
    pub fn count(&self) -> Result<i64, Error> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            NO_PARAMS,
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

fn record_from_row(row: &Row) -> rusqlite::Result<DetectionRecord> {
    let confidence: String = row.get(3)?;
    Ok(DetectionRecord {
        image_key: row.get(0)?,
        plate_text: row.get(1)?,
        timestamp: row.get(2)?,
        confidence: DecimalConfidence::parse(&confidence).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(3, "confidence".to_string(), rusqlite::types::Type::Text)
        })?,
        bucket_name: row.get(4)?,
    })
}

impl DetectionStore for SqliteStore {
    fn put(&self, record: &DetectionRecord) -> Result<(), Error> {
        let conn = self.lock()?;
        conn.execute_named(
            &format!(
                "INSERT OR REPLACE INTO {} (image_key, plate_text, timestamp, confidence, bucket_name) \
                 VALUES (:image_key, :plate_text, :timestamp, :confidence, :bucket_name)",
                self.table
            ),
            &[
                (":image_key", &record.image_key),
                (":plate_text", &record.plate_text),
                (":timestamp", &record.timestamp),
                (":confidence", &record.confidence.as_str()),
                (":bucket_name", &record.bucket_name),
            ],
        )?;
        Ok(())
    }

    fn find_recent(&self, plate_text: &str, since: &str) -> Result<Vec<DetectionRecord>, Error> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT image_key, plate_text, timestamp, confidence, bucket_name FROM {} \
             WHERE plate_text = :plate_text AND timestamp > :since",
            self.table
        ))?;
        let rows = stmt.query_map_named(
            &[(":plate_text", &plate_text), (":since", &since)],
            record_from_row,
        )?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::with_connection(Connection::open_in_memory().unwrap(), "Detections").unwrap()
    }

    fn record(image_key: &str, plate: &str, timestamp: &str) -> DetectionRecord {
        DetectionRecord {
            image_key: image_key.to_string(),
            plate_text: plate.to_string(),
            confidence: DecimalConfidence::from_f64(97.125),
            timestamp: timestamp.to_string(),
            bucket_name: "gate-camera".to_string(),
        }
    }

    #[test]
    fn put_then_find_recent() {
        let store = store();
        store
            .put(&record("a.jpg", "ABC123", "2026-10-19T10:00:00.000000Z"))
            .unwrap();
        let found = store
            .find_recent("ABC123", "2026-10-19T09:55:00.000000Z")
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].confidence.as_str(), "97.125");
        assert_eq!(found[0].bucket_name, "gate-camera");
    }

    #[test]
    fn find_recent_is_strictly_after_and_per_plate() {
        let store = store();
        store
            .put(&record("a.jpg", "ABC123", "2026-10-19T10:00:00.000000Z"))
            .unwrap();
        store
            .put(&record("b.jpg", "XYZ789", "2026-10-19T10:04:00.000000Z"))
            .unwrap();
        assert!(store
            .find_recent("ABC123", "2026-10-19T10:00:00.000000Z")
            .unwrap()
            .is_empty());
        assert!(store
            .find_recent("ABC124", "2026-10-19T09:00:00.000000Z")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn same_image_key_overwrites() {
        let store = store();
        store
            .put(&record("a.jpg", "ABC123", "2026-10-19T10:00:00.000000Z"))
            .unwrap();
        store
            .put(&record("a.jpg", "ABC128", "2026-10-19T10:01:00.000000Z"))
            .unwrap();
        assert_eq!(store.count().unwrap(), 1);
        let found = store
            .find_recent("ABC128", "2026-10-19T09:00:00.000000Z")
            .unwrap();
        assert_eq!(found[0].image_key, "a.jpg");
    }

    #[test]
    fn setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE Detections (image_key TEXT NOT NULL PRIMARY KEY, plate_text TEXT NOT NULL, \
             timestamp TEXT NOT NULL, confidence TEXT NOT NULL, bucket_name TEXT NOT NULL) WITHOUT ROWID",
            NO_PARAMS,
        )
        .unwrap();
        assert!(SqliteStore::with_connection(conn, "Detections").is_ok());
    }

    #[test]
    fn rejects_unsafe_table_names() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(SqliteStore::with_connection(conn, "plates; DROP TABLE x").is_err());
    }
}

//! SQLite database store implementation.

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::models::*;
use crate::analysis::{format_timestamp, Sample, StatisticsSnapshot, Status, TelemetryStore, TIMESTAMP_FORMAT};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Not found")]
    NotFound,
}

const SAMPLE_COLUMNS: &str = "device_id, timestamp, online, power, voltage, current";
const DEVICE_COLUMNS: &str = "device_id, name, tariff, api_token, active, created_at";

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Bring the schema up to date.
    fn init(&self) -> Result<(), DbError> {
        let mut conn = self.conn.lock().unwrap();
        let report = embedded::migrations::runner()
            .run(&mut *conn)
            .map_err(|e| DbError::Migration(e.to_string()))?;
        for migration in report.applied_migrations() {
            tracing::info!("Applied migration {}", migration);
        }
        Ok(())
    }

    // --- Device registry ---

    pub fn add_device(&self, device: &Device) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO devices (device_id, name, tariff, api_token, active) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                device.device_id,
                device.name,
                device.tariff,
                device.api_token,
                device.active,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref f, _) if f.code == ErrorCode::ConstraintViolation => {
                DbError::AlreadyExists(device.device_id.clone())
            }
            other => DbError::Sqlite(other),
        })?;
        Ok(())
    }

    /// Update name, tariff, token and active flag of an existing device.
    pub fn update_device(&self, device: &Device) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE devices SET name=?1, tariff=?2, api_token=?3, active=?4 WHERE device_id=?5",
            params![
                device.name,
                device.tariff,
                device.api_token,
                device.active,
                device.device_id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub fn get_devices(&self) -> Result<Vec<Device>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM devices ORDER BY device_id",
            DEVICE_COLUMNS
        ))?;
        let devices = stmt
            .query_map([], device_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(devices)
    }

    /// Devices the poller should query.
    pub fn get_active_devices(&self) -> Result<Vec<Device>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM devices WHERE active = 1 ORDER BY device_id",
            DEVICE_COLUMNS
        ))?;
        let devices = stmt
            .query_map([], device_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(devices)
    }

    pub fn get_device(&self, device_id: &str) -> Result<Device, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM devices WHERE device_id = ?1", DEVICE_COLUMNS),
            params![device_id],
            device_from_row,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Delete a device with its samples and statistics.
    pub fn delete_device(&self, device_id: &str) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM samples WHERE device_id = ?1", params![device_id])?;
        tx.execute("DELETE FROM statistics WHERE device_id = ?1", params![device_id])?;
        let changed = tx.execute("DELETE FROM devices WHERE device_id = ?1", params![device_id])?;
        tx.commit()?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub fn get_tariff(&self, device_id: &str) -> Result<Option<f64>, DbError> {
        let conn = self.conn.lock().unwrap();
        let tariff: Option<Option<f64>> = conn
            .query_row(
                "SELECT tariff FROM devices WHERE device_id = ?1",
                params![device_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(tariff.flatten())
    }

    // --- Samples ---

    /// Append samples in one transaction.
    pub fn add_samples(&self, samples: &[Sample]) -> Result<(), DbError> {
        if samples.is_empty() {
            return Ok(());
        }

        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO samples ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                SAMPLE_COLUMNS
            ))?;

            for s in samples {
                stmt.execute(params![
                    s.device_id,
                    format_timestamp(&s.timestamp),
                    s.online.as_flag(),
                    s.power,
                    s.voltage,
                    s.current,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Samples in `[start, end]` ordered by timestamp then insertion.
    ///
    /// Absent bounds are open; `limit` keeps the oldest rows.
    pub fn get_samples(
        &self,
        device_id: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        limit: Option<i64>,
    ) -> Result<Vec<Sample>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM samples
             WHERE device_id = ?1
               AND (?2 IS NULL OR timestamp >= ?2)
               AND (?3 IS NULL OR timestamp <= ?3)
             ORDER BY timestamp ASC, id ASC LIMIT ?4",
            SAMPLE_COLUMNS
        ))?;

        let samples = stmt
            .query_map(
                params![
                    device_id,
                    start.map(|t| format_timestamp(&t)),
                    end.map(|t| format_timestamp(&t)),
                    limit.unwrap_or(-1),
                ],
                sample_from_row,
            )?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(samples)
    }

    pub fn latest_sample(&self, device_id: &str) -> Result<Option<Sample>, DbError> {
        let conn = self.conn.lock().unwrap();
        let sample = conn
            .query_row(
                &format!(
                    "SELECT {} FROM samples WHERE device_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT 1",
                    SAMPLE_COLUMNS
                ),
                params![device_id],
                sample_from_row,
            )
            .optional()?;
        Ok(sample)
    }

    // --- Statistics ---

    /// Replace the stored snapshot for the snapshot's device.
    pub fn upsert_statistics(&self, snapshot: &StatisticsSnapshot) -> Result<(), DbError> {
        let json = serde_json::to_string(snapshot)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO statistics (device_id, snapshot, updated_at)
             VALUES (?1, ?2, strftime('%Y-%m-%d %H:%M:%S', 'now'))
             ON CONFLICT(device_id) DO UPDATE SET
             snapshot=excluded.snapshot, updated_at=excluded.updated_at",
            params![snapshot.device_id, json],
        )?;
        Ok(())
    }

    /// The stored snapshot as JSON, if one was ever written.
    pub fn get_statistics(&self, device_id: &str) -> Result<Option<serde_json::Value>, DbError> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row(
                "SELECT snapshot FROM statistics WHERE device_id = ?1",
                params![device_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(json.map(|j| serde_json::from_str::<serde_json::Value>(&j)).transpose()?)
    }

    // --- Health ---

    pub fn get_sample_stats(&self) -> Result<SampleStats, DbError> {
        let conn = self.conn.lock().unwrap();
        let devices: i64 = conn.query_row("SELECT COUNT(*) FROM devices", [], |r| r.get(0))?;
        let samples: i64 = conn.query_row("SELECT COUNT(*) FROM samples", [], |r| r.get(0))?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |r| r.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;
        Ok(SampleStats {
            devices,
            samples,
            db_size_bytes: page_count * page_size,
        })
    }
}

impl TelemetryStore for Store {
    fn samples(
        &self,
        device_id: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Sample>, DbError> {
        self.get_samples(device_id, start, end, None)
    }

    fn tariff(&self, device_id: &str) -> Result<Option<f64>, DbError> {
        self.get_tariff(device_id)
    }

    fn upsert_snapshot(&self, snapshot: &StatisticsSnapshot) -> Result<(), DbError> {
        self.upsert_statistics(snapshot)
    }
}

fn device_from_row(row: &Row<'_>) -> SqlResult<Device> {
    Ok(Device {
        device_id: row.get(0)?,
        name: row.get(1)?,
        tariff: row.get(2)?,
        api_token: row.get(3)?,
        active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn sample_from_row(row: &Row<'_>) -> SqlResult<Sample> {
    let time_str: String = row.get(1)?;
    let timestamp = NaiveDateTime::parse_from_str(&time_str, TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    let online: Option<bool> = row.get(2)?;

    Ok(Sample {
        device_id: row.get(0)?,
        timestamp,
        online: Status::from_flag(online),
        power: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
        voltage: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
        current: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{build_snapshot, parse_timestamp, AnalysisConfig};
    use chrono::NaiveDate;
    use tempfile::NamedTempFile;

    fn sample(device_id: &str, at: &str, online: Status, power: f64) -> Sample {
        Sample {
            device_id: device_id.to_string(),
            timestamp: parse_timestamp(at).unwrap(),
            online,
            power,
            voltage: 231.5,
            current: 0.4,
        }
    }

    fn plug(device_id: &str, tariff: Option<f64>) -> Device {
        Device {
            device_id: device_id.to_string(),
            name: "Kettle".to_string(),
            tariff,
            ..Default::default()
        }
    }

    #[test]
    fn test_device_crud() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();

        // Create
        store.add_device(&plug("plug-1", Some(0.3))).unwrap();
        assert!(matches!(
            store.add_device(&plug("plug-1", None)),
            Err(DbError::AlreadyExists(_))
        ));

        // Read
        let fetched = store.get_device("plug-1").unwrap();
        assert_eq!(fetched.name, "Kettle");
        assert_eq!(fetched.tariff, Some(0.3));
        assert!(fetched.active);
        assert!(!fetched.created_at.is_empty());

        // Update
        let mut updated = fetched;
        updated.active = false;
        updated.tariff = None;
        store.update_device(&updated).unwrap();
        assert!(store.get_active_devices().unwrap().is_empty());
        assert_eq!(store.get_tariff("plug-1").unwrap(), None);
        assert!(matches!(
            store.update_device(&plug("missing", None)),
            Err(DbError::NotFound)
        ));

        // Delete
        store.delete_device("plug-1").unwrap();
        assert!(matches!(store.get_device("plug-1"), Err(DbError::NotFound)));
        assert!(matches!(store.delete_device("plug-1"), Err(DbError::NotFound)));
    }

    #[test]
    fn test_samples_round_trip_status_and_order() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();

        store
            .add_samples(&[
                sample("plug-1", "2024-05-01 10:02:00", Status::Disconnected, 0.0),
                sample("plug-1", "2024-05-01 10:00:00", Status::Online, 12.5),
                sample("plug-1", "2024-05-01 10:01:00", Status::Offline, 0.0),
                sample("plug-1", "2024-05-01 10:01:00", Status::Online, 3.0),
                sample("plug-2", "2024-05-01 10:00:30", Status::Online, 99.0),
            ])
            .unwrap();

        let all = store.get_samples("plug-1", None, None, None).unwrap();
        let statuses: Vec<Status> = all.iter().map(|s| s.online).collect();
        assert_eq!(
            statuses,
            vec![Status::Online, Status::Offline, Status::Online, Status::Disconnected]
        );
        assert_eq!(all[0].power, 12.5);
        assert_eq!(all[0].voltage, 231.5);

        let window = store
            .get_samples(
                "plug-1",
                Some(parse_timestamp("2024-05-01 10:01:00").unwrap()),
                Some(parse_timestamp("2024-05-01 10:01:59").unwrap()),
                None,
            )
            .unwrap();
        assert_eq!(window.len(), 2);

        let limited = store.get_samples("plug-1", None, None, Some(1)).unwrap();
        assert_eq!(limited.len(), 1);

        let latest = store.latest_sample("plug-1").unwrap().unwrap();
        assert_eq!(latest.online, Status::Disconnected);
        assert!(store.latest_sample("plug-3").unwrap().is_none());
    }

    #[test]
    fn test_null_readings_read_back_as_zero() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO samples (device_id, timestamp, online) VALUES ('plug-1', '2024-05-01 10:00:00', NULL)",
                [],
            )
            .unwrap();
        }
        let s = store.latest_sample("plug-1").unwrap().unwrap();
        assert_eq!(s.online, Status::Disconnected);
        assert_eq!((s.power, s.voltage, s.current), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_statistics_upsert() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        store.add_device(&plug("plug-1", Some(0.5))).unwrap();
        store
            .add_samples(&[
                sample("plug-1", "2024-05-01 10:00:00", Status::Online, 600.0),
                sample("plug-1", "2024-05-01 10:01:00", Status::Online, 600.0),
            ])
            .unwrap();
        assert!(store.get_statistics("plug-1").unwrap().is_none());

        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let config = AnalysisConfig::default();
        build_snapshot(&store, "plug-1", today, &config).unwrap();
        build_snapshot(&store, "plug-1", today, &config).unwrap();

        let stored = store.get_statistics("plug-1").unwrap().unwrap();
        assert_eq!(stored["device_id"], "plug-1");
        assert_eq!(stored["current_tariff"], 0.5);
        assert_eq!(stored["energy_statistics"]["day"]["power_usage"]["kwh"], 0.02);
        assert_eq!(stored["status_statistics"]["day"]["total"]["online"]["seconds"], 60);

        let conn = store.conn.lock().unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM statistics", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_reopen_keeps_schema() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let store = Store::new(tmp.path()).unwrap();
            store.add_device(&plug("plug-1", None)).unwrap();
        }
        let store = Store::new(tmp.path()).unwrap();
        assert_eq!(store.get_devices().unwrap().len(), 1);
        assert_eq!(store.get_sample_stats().unwrap().devices, 1);
    }
}

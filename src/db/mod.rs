pub mod queries;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Key-value persistence: `get` returns `None` for an absent key, `set` replaces the value.
pub trait KeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRow {
    pub id: String,
    pub title: String,
    pub body: String,
    pub payload: String,
    pub hour: u32,
    pub minute: u32,
    pub repeats: bool,
    pub created_at: i64,
    pub last_fired_on: Option<NaiveDate>,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite DB: {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set SQLite busy timeout")?;

        let database = Self { conn };
        database.init_schema()?;

        Ok(database)
    }

    pub fn init_schema(&self) -> Result<()> {
        queries::schema_statements()
            .iter()
            .try_for_each(|statement| {
                self.conn
                    .execute(statement, [])
                    .context("Failed to initialize schema")
                    .map(|_| ())
            })
    }

    pub fn item_updated_at(&self, key: &str) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT updated_at FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query storage timestamp")
    }

    pub fn insert_notification(&self, row: &NotificationRow) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO scheduled_notifications (id, title, body, payload, hour, minute, repeats, created_at, last_fired_on)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    row.id,
                    row.title,
                    row.body,
                    row.payload,
                    row.hour,
                    row.minute,
                    row.repeats,
                    row.created_at,
                    row.last_fired_on
                ],
            )
            .context("Failed to insert scheduled notification")?;

        Ok(())
    }

    pub fn notifications(&self) -> Result<Vec<NotificationRow>> {
        let mut statement = self.conn.prepare(
            "SELECT id, title, body, payload, hour, minute, repeats, created_at, last_fired_on
             FROM scheduled_notifications
             ORDER BY hour ASC, minute ASC, created_at ASC",
        )?;

        let rows = statement
            .query_map([], |row| {
                Ok(NotificationRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    body: row.get(2)?,
                    payload: row.get(3)?,
                    hour: row.get(4)?,
                    minute: row.get(5)?,
                    repeats: row.get(6)?,
                    created_at: row.get(7)?,
                    last_fired_on: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query scheduled notifications")?;

        Ok(rows)
    }

    pub fn delete_notification(&self, id: &str) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM scheduled_notifications WHERE id = ?1",
                params![id],
            )
            .context("Failed to delete scheduled notification")
    }

    pub fn delete_all_notifications(&self) -> Result<usize> {
        self.conn
            .execute("DELETE FROM scheduled_notifications", [])
            .context("Failed to clear scheduled notifications")
    }

    pub fn mark_notification_fired(&self, id: &str, date: NaiveDate) -> Result<()> {
        self.conn
            .execute(
                "UPDATE scheduled_notifications SET last_fired_on = ?2 WHERE id = ?1",
                params![id, date],
            )
            .context("Failed to record notification delivery")?;

        Ok(())
    }

    pub fn setting(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM platform_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read platform setting")
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO platform_settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value=excluded.value",
                params![key, value],
            )
            .context("Failed to save platform setting")?;

        Ok(())
    }
}

impl KeyValueStore for Database {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read storage key: {key}"))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key)
                 DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
                params![key, value, Utc::now().timestamp()],
            )
            .with_context(|| format!("Failed to write storage key: {key}"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Database, KeyValueStore, NotificationRow};
    use chrono::NaiveDate;

    fn open_temp() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("temp dir");
        let database = Database::open(&dir.path().join("db").join("test.db")).expect("open db");
        (dir, database)
    }

    #[test]
    fn set_item_replaces_previous_value() {
        let (_dir, database) = open_temp();
        assert_eq!(database.get_item("prescriptions").expect("get"), None);

        database.set_item("prescriptions", "[]").expect("first write");
        database.set_item("prescriptions", "[1]").expect("second write");

        assert_eq!(
            database.get_item("prescriptions").expect("get").as_deref(),
            Some("[1]")
        );
        assert!(database.item_updated_at("prescriptions").expect("ts").is_some());
    }

    #[test]
    fn notification_rows_round_trip_fired_date() {
        let (_dir, database) = open_temp();
        let row = NotificationRow {
            id: "n-1".to_string(),
            title: "Medication Reminder".to_string(),
            body: "Time to take Ibuprofen - 200mg".to_string(),
            payload: r#"{"prescriptionId":"1"}"#.to_string(),
            hour: 8,
            minute: 0,
            repeats: true,
            created_at: 0,
            last_fired_on: None,
        };
        database.insert_notification(&row).expect("insert");

        let date = NaiveDate::from_ymd_opt(2026, 3, 1).expect("date");
        database.mark_notification_fired("n-1", date).expect("mark");

        let stored = database.notifications().expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].last_fired_on, Some(date));
        assert!(stored[0].repeats);

        assert_eq!(database.delete_notification("n-1").expect("delete"), 1);
        assert!(database.notifications().expect("list").is_empty());
    }

    #[test]
    fn settings_upsert() {
        let (_dir, database) = open_temp();
        database.set_setting("permission", "denied").expect("set");
        database.set_setting("permission", "granted").expect("set");
        assert_eq!(
            database.setting("permission").expect("get").as_deref(),
            Some("granted")
        );
    }
}

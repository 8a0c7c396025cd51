pub const CREATE_KV_STORE: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
  key          TEXT PRIMARY KEY,
  value        TEXT NOT NULL,
  updated_at   INTEGER NOT NULL
);
"#;

pub const CREATE_SCHEDULED_NOTIFICATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS scheduled_notifications (
  id             TEXT PRIMARY KEY,
  title          TEXT NOT NULL,
  body           TEXT NOT NULL,
  payload        TEXT NOT NULL DEFAULT '{}',
  hour           INTEGER NOT NULL,
  minute         INTEGER NOT NULL,
  repeats        INTEGER NOT NULL DEFAULT 1,
  created_at     INTEGER NOT NULL,
  last_fired_on  TEXT
);
"#;

pub const CREATE_PLATFORM_SETTINGS: &str = r#"
CREATE TABLE IF NOT EXISTS platform_settings (
  key    TEXT PRIMARY KEY,
  value  TEXT NOT NULL
);
"#;

pub const INDEX_SCHEDULED_NOTIFICATIONS_TRIGGER: &str = "CREATE INDEX IF NOT EXISTS idx_scheduled_notifications_trigger ON scheduled_notifications(hour, minute);";

pub fn schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_KV_STORE,
        CREATE_SCHEDULED_NOTIFICATIONS,
        CREATE_PLATFORM_SETTINGS,
        INDEX_SCHEDULED_NOTIFICATIONS_TRIGGER,
    ]
}

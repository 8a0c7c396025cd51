use crate::db::{Database, NotificationRow};
use crate::notify::{
    DailyTrigger, NotificationContent, NotificationData, NotificationPlatform, NotificationRequest,
    PermissionStatus, ScheduledNotification, desktop,
};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

const PERMISSION_KEY: &str = "notification_permission";

/// Notification scheduler backed by the local SQLite file. Delivery happens in the dispatcher.
pub struct LocalNotificationPlatform {
    database: Database,
    supported: bool,
}

impl LocalNotificationPlatform {
    pub fn new(database: Database, supported: bool) -> Self {
        Self {
            database,
            supported,
        }
    }

    pub fn open(path: &Path, supported: bool) -> Result<Self> {
        Ok(Self::new(Database::open(path)?, supported))
    }

    pub fn set_permission(&self, status: PermissionStatus) -> Result<()> {
        self.database
            .set_setting(PERMISSION_KEY, &status.to_string())
    }

    pub fn mark_fired(&self, notification_id: &str, date: NaiveDate) -> Result<()> {
        self.database.mark_notification_fired(notification_id, date)
    }
}

impl NotificationPlatform for LocalNotificationPlatform {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn permission_status(&self) -> Result<PermissionStatus> {
        self.database
            .setting(PERMISSION_KEY)?
            .map(|value| value.parse())
            .transpose()
            .map(|status| status.unwrap_or(PermissionStatus::Undetermined))
    }

    fn request_permission(&self) -> Result<PermissionStatus> {
        let current = self.permission_status()?;
        if current != PermissionStatus::Undetermined {
            return Ok(current);
        }

        let decided = if desktop::notifier_available() {
            PermissionStatus::Granted
        } else {
            warn!("no desktop notifier found; notification permission denied");
            PermissionStatus::Denied
        };
        self.set_permission(decided)?;
        info!(status = %decided, "notification permission decided");

        Ok(decided)
    }

    fn schedule_daily(&self, request: &NotificationRequest) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(&request.content.data)
            .context("Failed to encode notification payload")?;

        self.database.insert_notification(&NotificationRow {
            id: id.clone(),
            title: request.content.title.clone(),
            body: request.content.body.clone(),
            payload,
            hour: request.trigger.hour,
            minute: request.trigger.minute,
            repeats: request.trigger.repeats,
            created_at: Utc::now().timestamp_millis(),
            last_fired_on: None,
        })?;

        Ok(id)
    }

    fn list_scheduled(&self) -> Result<Vec<ScheduledNotification>> {
        let notifications = self
            .database
            .notifications()?
            .into_iter()
            .map(|row| {
                let data = serde_json::from_str::<NotificationData>(&row.payload)
                    .unwrap_or_else(|error| {
                        warn!(
                            error = %error,
                            notification_id = %row.id,
                            "unreadable notification payload"
                        );
                        NotificationData::default()
                    });

                ScheduledNotification {
                    id: row.id,
                    content: NotificationContent {
                        title: row.title,
                        body: row.body,
                        data,
                    },
                    trigger: DailyTrigger {
                        hour: row.hour,
                        minute: row.minute,
                        repeats: row.repeats,
                    },
                    last_fired_on: row.last_fired_on,
                }
            })
            .collect();

        Ok(notifications)
    }

    fn cancel(&self, notification_id: &str) -> Result<()> {
        self.database.delete_notification(notification_id)?;
        Ok(())
    }

    fn cancel_all(&self) -> Result<()> {
        self.database.delete_all_notifications()?;
        Ok(())
    }
}

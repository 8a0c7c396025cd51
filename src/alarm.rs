use crate::model::{AlarmSchedule, Prescription, ValidationError, parse_alarm_times};
use crate::notify::{
    DailyTrigger, NotificationContent, NotificationData, NotificationPlatform,
    NotificationRequest, PermissionStatus,
};
use thiserror::Error;
use tracing::{debug, info};

pub const REMINDER_TITLE: &str = "Medication Reminder";

#[derive(Debug, Error)]
pub enum AlarmError {
    #[error(transparent)]
    InvalidTime(#[from] ValidationError),
    #[error("notification platform error: {0:#}")]
    Platform(anyhow::Error),
}

/// Keeps the platform's scheduled notifications in line with each prescription's alarm times.
///
/// Notifications are linked to their prescription only through the `prescriptionId`
/// carried in the payload, so lookups scan everything that is scheduled.
pub struct AlarmScheduler<P> {
    platform: P,
}

impl<P: NotificationPlatform> AlarmScheduler<P> {
    pub fn new(platform: P) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn request_permissions(&self) -> Result<bool, AlarmError> {
        if !self.platform.is_supported() {
            return Ok(true);
        }

        let status = self.platform.permission_status().map_err(AlarmError::Platform)?;
        let status = match status {
            PermissionStatus::Undetermined => self
                .platform
                .request_permission()
                .map_err(AlarmError::Platform)?,
            decided => decided,
        };

        Ok(status == PermissionStatus::Granted)
    }

    /// Replaces every alarm of `prescription` with one daily notification per alarm time.
    pub fn schedule_alarm(&self, prescription: &Prescription) -> Result<usize, AlarmError> {
        let times = parse_alarm_times(&prescription.alarm_times)?;

        if !self.platform.is_supported() {
            info!(
                medication = %prescription.medication_name,
                "notifications unsupported on this host; alarm scheduling skipped"
            );
            return Ok(0);
        }

        self.cancel_alarms(&prescription.id)?;

        let content = reminder_content(prescription);
        for time in &times {
            let notification_id = self
                .platform
                .schedule_daily(&NotificationRequest {
                    content: content.clone(),
                    trigger: DailyTrigger {
                        hour: time.hour,
                        minute: time.minute,
                        repeats: true,
                    },
                })
                .map_err(AlarmError::Platform)?;
            debug!(
                prescription_id = %prescription.id,
                notification_id = %notification_id,
                time = %time,
                "alarm scheduled"
            );
        }

        info!(
            prescription_id = %prescription.id,
            count = times.len(),
            "alarms scheduled"
        );
        Ok(times.len())
    }

    pub fn cancel_alarms(&self, prescription_id: &str) -> Result<usize, AlarmError> {
        if !self.platform.is_supported() {
            return Ok(0);
        }

        let tagged = self
            .platform
            .list_scheduled()
            .map_err(AlarmError::Platform)?
            .into_iter()
            .filter(|notification| notification.prescription_id() == Some(prescription_id))
            .collect::<Vec<_>>();

        for notification in &tagged {
            self.platform
                .cancel(&notification.id)
                .map_err(AlarmError::Platform)?;
        }

        if !tagged.is_empty() {
            debug!(prescription_id = %prescription_id, count = tagged.len(), "alarms cancelled");
        }
        Ok(tagged.len())
    }

    pub fn cancel_all_alarms(&self) -> Result<(), AlarmError> {
        if !self.platform.is_supported() {
            return Ok(());
        }

        self.platform.cancel_all().map_err(AlarmError::Platform)?;
        info!("all scheduled alarms cancelled");
        Ok(())
    }

    pub fn alarms_for(&self, prescription_id: &str) -> Result<Vec<AlarmSchedule>, AlarmError> {
        if !self.platform.is_supported() {
            return Ok(Vec::new());
        }

        let alarms = self
            .platform
            .list_scheduled()
            .map_err(AlarmError::Platform)?
            .into_iter()
            .filter(|notification| notification.prescription_id() == Some(prescription_id))
            .map(|notification| AlarmSchedule {
                id: notification.id,
                prescription_id: prescription_id.to_string(),
                time: format!(
                    "{:02}:{:02}",
                    notification.trigger.hour, notification.trigger.minute
                ),
                is_active: true,
            })
            .collect();

        Ok(alarms)
    }
}

pub fn reminder_content(prescription: &Prescription) -> NotificationContent {
    NotificationContent {
        title: REMINDER_TITLE.to_string(),
        body: format!(
            "Time to take {} - {}",
            prescription.medication_name, prescription.dosage
        ),
        data: NotificationData {
            prescription_id: Some(prescription.id.clone()),
        },
    }
}

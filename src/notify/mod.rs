pub mod desktop;
pub mod local;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use local::LocalNotificationPlatform;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescription_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: NotificationData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTrigger {
    pub hour: u32,
    pub minute: u32,
    pub repeats: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub content: NotificationContent,
    pub trigger: DailyTrigger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledNotification {
    pub id: String,
    pub content: NotificationContent,
    pub trigger: DailyTrigger,
    pub last_fired_on: Option<NaiveDate>,
}

impl ScheduledNotification {
    pub fn prescription_id(&self) -> Option<&str> {
        self.content.data.prescription_id.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Undetermined => "undetermined",
        };
        f.write_str(label)
    }
}

impl FromStr for PermissionStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            "undetermined" => Ok(Self::Undetermined),
            other => anyhow::bail!("Unknown permission status: {other}"),
        }
    }
}

/// How delivered notifications are presented. Desktop notifiers have no badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presentation {
    pub show_alert: bool,
    pub play_sound: bool,
}

impl Default for Presentation {
    fn default() -> Self {
        Self {
            show_alert: true,
            play_sound: true,
        }
    }
}

/// The host's notification scheduler.
pub trait NotificationPlatform {
    /// `false` when the host cannot show notifications at all.
    fn is_supported(&self) -> bool;
    fn permission_status(&self) -> Result<PermissionStatus>;
    /// Asks for permission when it has not been decided yet and returns the resulting status.
    fn request_permission(&self) -> Result<PermissionStatus>;
    fn schedule_daily(&self, request: &NotificationRequest) -> Result<String>;
    fn list_scheduled(&self) -> Result<Vec<ScheduledNotification>>;
    fn cancel(&self, notification_id: &str) -> Result<()>;
    fn cancel_all(&self) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{
        NotificationPlatform, NotificationRequest, PermissionStatus, ScheduledNotification,
    };
    use anyhow::{Result, bail};
    use std::cell::{Cell, RefCell};

    /// In-memory platform with switches for injecting failures.
    pub(crate) struct MemoryPlatform {
        pub supported: bool,
        pub permission: Cell<PermissionStatus>,
        pub grant_on_request: bool,
        pub scheduled: RefCell<Vec<ScheduledNotification>>,
        pub fail_schedule_after: Cell<Option<usize>>,
        pub fail_cancel: Cell<bool>,
        /// Lets this many cancels through, fails the next one, then recovers.
        pub fail_cancel_after: Cell<Option<usize>>,
        pub platform_calls: Cell<usize>,
        next_id: Cell<u64>,
    }

    impl MemoryPlatform {
        pub fn granted() -> Self {
            Self {
                supported: true,
                permission: Cell::new(PermissionStatus::Granted),
                grant_on_request: true,
                scheduled: RefCell::new(Vec::new()),
                fail_schedule_after: Cell::new(None),
                fail_cancel: Cell::new(false),
                fail_cancel_after: Cell::new(None),
                platform_calls: Cell::new(0),
                next_id: Cell::new(0),
            }
        }

        pub fn unsupported() -> Self {
            Self {
                supported: false,
                ..Self::granted()
            }
        }

        pub fn denied() -> Self {
            Self {
                permission: Cell::new(PermissionStatus::Denied),
                grant_on_request: false,
                ..Self::granted()
            }
        }

        pub fn tagged(&self, prescription_id: &str) -> Vec<ScheduledNotification> {
            self.scheduled
                .borrow()
                .iter()
                .filter(|notification| notification.prescription_id() == Some(prescription_id))
                .cloned()
                .collect()
        }

        fn touch(&self) {
            self.platform_calls.set(self.platform_calls.get() + 1);
        }
    }

    impl NotificationPlatform for MemoryPlatform {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn permission_status(&self) -> Result<PermissionStatus> {
            Ok(self.permission.get())
        }

        fn request_permission(&self) -> Result<PermissionStatus> {
            if self.permission.get() == PermissionStatus::Undetermined {
                self.permission.set(if self.grant_on_request {
                    PermissionStatus::Granted
                } else {
                    PermissionStatus::Denied
                });
            }
            Ok(self.permission.get())
        }

        fn schedule_daily(&self, request: &NotificationRequest) -> Result<String> {
            self.touch();
            if let Some(remaining) = self.fail_schedule_after.get() {
                if remaining == 0 {
                    bail!("notification scheduler rejected the request");
                }
                self.fail_schedule_after.set(Some(remaining - 1));
            }

            let id = format!("mem-{}", self.next_id.get());
            self.next_id.set(self.next_id.get() + 1);
            self.scheduled.borrow_mut().push(ScheduledNotification {
                id: id.clone(),
                content: request.content.clone(),
                trigger: request.trigger,
                last_fired_on: None,
            });
            Ok(id)
        }

        fn list_scheduled(&self) -> Result<Vec<ScheduledNotification>> {
            self.touch();
            Ok(self.scheduled.borrow().clone())
        }

        fn cancel(&self, notification_id: &str) -> Result<()> {
            self.touch();
            if self.fail_cancel.get() {
                bail!("notification scheduler is unavailable");
            }
            if let Some(remaining) = self.fail_cancel_after.get() {
                if remaining == 0 {
                    self.fail_cancel_after.set(None);
                    bail!("notification scheduler dropped the cancel request");
                }
                self.fail_cancel_after.set(Some(remaining - 1));
            }
            self.scheduled
                .borrow_mut()
                .retain(|notification| notification.id != notification_id);
            Ok(())
        }

        fn cancel_all(&self) -> Result<()> {
            self.touch();
            if self.fail_cancel.get() {
                bail!("notification scheduler is unavailable");
            }
            self.scheduled.borrow_mut().clear();
            Ok(())
        }
    }
}

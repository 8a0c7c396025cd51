use crate::config::Config;
use crate::notify::{
    DailyTrigger, LocalNotificationPlatform, NotificationContent, NotificationPlatform,
    PermissionStatus, desktop,
};
use anyhow::{Context, Result};
use chrono::{
    DateTime, Duration as ChronoDuration, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Timelike,
};
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info, warn};

pub const DISPATCH_POLL_SECONDS: u64 = 20;

pub async fn run_alarm_dispatcher(config: Arc<Config>) -> Result<()> {
    let presentation = config.presentation();
    let mut ticker = interval(Duration::from_secs(DISPATCH_POLL_SECONDS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        poll_seconds = DISPATCH_POLL_SECONDS,
        show_alert = presentation.show_alert,
        play_sound = presentation.play_sound,
        "alarm dispatcher started"
    );

    loop {
        ticker.tick().await;

        let now = Local::now().naive_local();
        let dispatched =
            LocalNotificationPlatform::open(&config.db_path, config.notifications_enabled)
                .and_then(|platform| {
                    dispatch_due(&platform, now, |content| {
                        desktop::deliver(content, presentation)
                    })
                });

        match dispatched {
            Ok(0) => {}
            Ok(fired) => info!(fired, "medication reminders delivered"),
            Err(error) => error!(error = %error, "failed to dispatch alarms"),
        }
    }
}

/// Fires every notification due at `now` and returns how many fired.
pub fn dispatch_due<F>(
    platform: &LocalNotificationPlatform,
    now: NaiveDateTime,
    mut deliver: F,
) -> Result<usize>
where
    F: FnMut(&NotificationContent) -> bool,
{
    if !platform.is_supported() || platform.permission_status()? != PermissionStatus::Granted {
        return Ok(0);
    }

    let today = now.date();
    let due = platform
        .list_scheduled()?
        .into_iter()
        .filter(|notification| is_due(&notification.trigger, notification.last_fired_on, now))
        .collect::<Vec<_>>();

    for notification in &due {
        if !deliver(&notification.content) {
            warn!(
                notification_id = %notification.id,
                body = %notification.content.body,
                "reminder was due but no notifier displayed it"
            );
        }

        if notification.trigger.repeats {
            platform.mark_fired(&notification.id, today)?;
        } else {
            platform.cancel(&notification.id)?;
        }
    }

    Ok(due.len())
}

pub fn is_due(
    trigger: &DailyTrigger,
    last_fired_on: Option<NaiveDate>,
    now: NaiveDateTime,
) -> bool {
    now.hour() == trigger.hour
        && now.minute() == trigger.minute
        && last_fired_on != Some(now.date())
}

/// Next local time `trigger` fires after `now`.
pub fn next_occurrence(trigger: &DailyTrigger, now: DateTime<Local>) -> Result<DateTime<Local>> {
    let target_time = NaiveTime::from_hms_opt(trigger.hour, trigger.minute, 0).with_context(|| {
        format!(
            "Invalid trigger time values: hour={}, minute={}",
            trigger.hour, trigger.minute
        )
    })?;
    let today = now.date_naive();

    let candidate_today = match Local.from_local_datetime(&today.and_time(target_time)) {
        LocalResult::Single(datetime) => datetime,
        _ => {
            let fallback_day = today + ChronoDuration::days(1);
            Local
                .from_local_datetime(&fallback_day.and_time(target_time))
                .single()
                .context("Failed to convert trigger time")?
        }
    };

    if candidate_today > now {
        return Ok(candidate_today);
    }

    let tomorrow = today + ChronoDuration::days(1);
    Local
        .from_local_datetime(&tomorrow.and_time(target_time))
        .single()
        .context("Failed to convert next trigger time")
}

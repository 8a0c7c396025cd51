use crate::notify::{NotificationContent, Presentation};
#[cfg(any(target_os = "macos", target_os = "linux"))]
use std::process::{Command, Stdio};
#[cfg(any(target_os = "macos", target_os = "linux"))]
use tracing::warn;

/// Shows `content` with the host's notifier. Returns whether anything was displayed.
pub fn deliver(content: &NotificationContent, presentation: Presentation) -> bool {
    if !presentation.show_alert {
        return false;
    }

    show(content, presentation)
}

#[cfg(target_os = "macos")]
fn show(content: &NotificationContent, presentation: Presentation) -> bool {
    let mut args = vec![
        "-title".to_string(),
        content.title.clone(),
        "-message".to_string(),
        content.body.clone(),
        "-group".to_string(),
        "RxReminder".to_string(),
    ];
    if presentation.play_sound {
        args.extend(["-sound".to_string(), "default".to_string()]);
    }

    let notified = Command::new("terminal-notifier")
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);

    if notified {
        return true;
    }

    let script = r#"
on run argv
    set notificationTitle to item 1 of argv
    set notificationBody to item 2 of argv
    if item 3 of argv is "sound" then
        display notification notificationBody with title notificationTitle sound name "default"
    else
        display notification notificationBody with title notificationTitle
    end if
end run
"#;
    let sound = if presentation.play_sound { "sound" } else { "silent" };

    match Command::new("osascript")
        .arg("-e")
        .arg(script)
        .arg(&content.title)
        .arg(&content.body)
        .arg(sound)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(error) => {
            warn!(error = %error, "failed to show macOS notification");
            false
        }
    }
}

#[cfg(target_os = "linux")]
fn show(content: &NotificationContent, presentation: Presentation) -> bool {
    let mut command = Command::new("notify-send");
    command
        .arg("--app-name=RxReminder")
        .arg("--urgency=critical")
        .arg(&content.title)
        .arg(&content.body);
    if !presentation.play_sound {
        command.arg("--hint=boolean:suppress-sound:true");
    }

    match command.stdout(Stdio::null()).stderr(Stdio::null()).status() {
        Ok(status) => status.success(),
        Err(error) => {
            warn!(error = %error, "failed to run notify-send");
            false
        }
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn show(_content: &NotificationContent, _presentation: Presentation) -> bool {
    false
}

/// Whether this host has a notifier `deliver` can drive.
pub fn notifier_available() -> bool {
    #[cfg(target_os = "macos")]
    {
        return command_succeeds("osascript", &["-e", "return 1"]);
    }

    #[cfg(target_os = "linux")]
    {
        return command_succeeds("notify-send", &["--version"]);
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        false
    }
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
fn command_succeeds(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::deliver;
    use crate::notify::{NotificationContent, NotificationData, Presentation};

    #[test]
    fn hidden_alerts_are_not_displayed() {
        let content = NotificationContent {
            title: "Medication Reminder".to_string(),
            body: "Time to take Ibuprofen - 200mg".to_string(),
            data: NotificationData::default(),
        };
        let presentation = Presentation {
            show_alert: false,
            play_sound: true,
        };

        assert!(!deliver(&content, presentation));
    }
}

use crate::config::{Config, parse_alarm_time_list};
use crate::daemon;
use crate::notify::{LocalNotificationPlatform, PermissionStatus, desktop};
use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Password, theme::ColorfulTheme};
use uuid::Uuid;

pub fn run_onboarding(install_daemon_flag: bool) -> Result<Config> {
    println!("──────────────────────────────────────────");
    println!("  Welcome to RxReminder onboarding.");
    println!("──────────────────────────────────────────");

    let theme = ColorfulTheme::default();
    let mut config = Config::load().unwrap_or_default();

    println!("\n[1/5] Notification permission");
    if desktop::notifier_available() {
        println!("  A desktop notifier was found on this machine.");
    } else {
        println!("  ! No desktop notifier found (terminal-notifier, osascript or notify-send).");
    }

    let granted = Confirm::with_theme(&theme)
        .with_prompt("  Allow RxReminder to show medication reminders?")
        .default(true)
        .interact()
        .context("Failed to read permission prompt input")?;

    println!("\n[2/5] Default reminder times");
    println!("  Used when reminders are switched on for a prescription without times.");
    let default_times: String = Input::with_theme(&theme)
        .with_prompt("  Reminder times (HH:MM, comma separated)")
        .default(config.default_alarm_times.join(","))
        .validate_with(|input: &String| -> std::result::Result<(), String> {
            parse_alarm_time_list(input)
                .map(|_| ())
                .map_err(|error| error.to_string())
        })
        .interact_text()
        .context("Failed to read default reminder times")?;
    config.default_alarm_times = parse_alarm_time_list(&default_times)?;
    println!("  ✓ {}", config.default_alarm_times.join(", "));

    println!("\n[3/5] Prescription photo reading");
    let api_key = Password::with_theme(&theme)
        .with_prompt("  Gemini API key (leave empty to skip)")
        .allow_empty_password(true)
        .interact()
        .context("Failed to read API key")?;
    if api_key.trim().is_empty() {
        println!("  ✓ Skipped. Set it later with `RxReminder config set ai.api_key <KEY>`.");
    } else {
        config.ai_api_key = Some(api_key.trim().to_string());
        println!("  ✓ API key saved");
    }

    println!("\n[4/5] Local API token");
    if config.api_tokens.is_empty() {
        let create_token = Confirm::with_theme(&theme)
            .with_prompt("  Create a token for the local extraction API?")
            .default(false)
            .interact()
            .context("Failed to read API token input")?;
        if create_token {
            let token = Uuid::new_v4().simple().to_string();
            println!("  ✓ Token: {token}");
            config.api_tokens.push(token);
        }
    } else {
        println!("  ✓ {} token(s) already configured", config.api_tokens.len());
    }

    config.ensure_bootstrap_files()?;
    config.save()?;

    let platform = LocalNotificationPlatform::open(&config.db_path, config.notifications_enabled)?;
    let status = if granted {
        PermissionStatus::Granted
    } else {
        PermissionStatus::Denied
    };
    platform.set_permission(status)?;
    println!("\n  ✓ Notification permission: {status}");

    println!("\n[5/5] Install background daemon");
    println!("  Register a launchd service so reminders keep firing after reboot.");

    let install_daemon = if install_daemon_flag {
        true
    } else {
        Confirm::with_theme(&theme)
            .with_prompt("  Install daemon now?")
            .default(cfg!(target_os = "macos"))
            .interact()
            .context("Failed to read daemon install input")?
    };

    if install_daemon {
        let plist_path = daemon::install(&config)?;
        daemon::load(&config)?;
        println!("  ✓ Daemon installed ({})", plist_path.display());
    } else {
        println!("  ✓ Skipped daemon installation");
    }

    println!("\n──────────────────────────────────────────");
    println!("  Onboarding complete!");
    println!("  Add a prescription with RxReminder add.");
    println!("  Run RxReminder service to keep reminders firing in the foreground.");
    println!("──────────────────────────────────────────");

    Ok(config)
}

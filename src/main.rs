mod alarm;
mod api;
mod cli;
mod config;
mod daemon;
mod db;
mod dispatch;
mod extract;
mod model;
mod notify;
mod service;
mod store;

use crate::alarm::AlarmScheduler;
use crate::cli::onboard::run_onboarding;
use crate::cli::form::{self, FormKind};
use crate::cli::{AddArgs, Cli, Commands, ConfigCommands};
use crate::config::Config;
use crate::db::Database;
use crate::extract::ExtractionRequest;
use crate::model::{Prescription, PrescriptionDraft};
use crate::notify::{LocalNotificationPlatform, NotificationPlatform, PermissionStatus, desktop};
use crate::service::{AlarmOutcome, AlarmToggle, PrescriptionService};
use crate::store::PrescriptionStore;
use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;
use dialoguer::{Confirm, theme::ColorfulTheme};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

type Service = PrescriptionService<Database, LocalNotificationPlatform>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Onboard { install_daemon } => {
            let _ = run_onboarding(install_daemon)?;
            Ok(())
        }
        Commands::Config { command } => handle_config_command(command),
        Commands::Add(args) => handle_add(args),
        Commands::List => handle_list(),
        Commands::Edit { id } => handle_edit(&id),
        Commands::Delete { id, yes } => handle_delete(&id, yes),
        Commands::Toggle { id } => handle_toggle(&id),
        Commands::Alarms { id } => handle_alarms(id.as_deref()),
        Commands::Permissions { grant, revoke } => handle_permissions(grant, revoke),
        Commands::CancelAll => handle_cancel_all(),
        Commands::Extract {
            image,
            prompt,
            save,
        } => handle_extract(&image, prompt, save),
        Commands::Status => handle_status(),
        Commands::Doctor => handle_doctor(),
        Commands::Start => handle_start().await,
        Commands::Stop => handle_stop(),
        Commands::Restart => handle_restart(),
        Commands::Service => {
            let config = load_or_default_config()?;
            run_service(config).await
        }
        Commands::Uninstall => handle_uninstall(),
    }
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            let masked = if key.contains("api_key") || key.contains("token") {
                "***hidden***".to_string()
            } else {
                value
            };
            println!("Config saved: {key} = {masked}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_or_default_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_add(args: AddArgs) -> Result<()> {
    let config = load_or_default_config()?;
    let service = open_service(&config)?;

    let draft = if args.name.is_some() {
        form::draft_from_args(args, &config.default_alarm_times)?
    } else {
        let photo_uri = args.photo.as_deref().map(form::photo_uri).transpose()?;
        form::prompt_prescription(FormKind::New, PrescriptionDraft {
            photo_uri,
            start_date: Local::now().format("%Y-%m-%d").to_string(),
            alarm_times: config.default_alarm_times.clone(),
            ..PrescriptionDraft::default()
        })?
    };

    save_draft(&service, draft)
}

fn save_draft(service: &Service, draft: PrescriptionDraft) -> Result<()> {
    let created = service.create_prescription(draft, Local::now())?;

    println!(
        "Prescription saved: {} ({})",
        created.prescription.medication_name, created.prescription.id
    );
    println!("- alarms: {}", describe_outcome(created.alarms));
    Ok(())
}

fn handle_list() -> Result<()> {
    let config = load_or_default_config()?;
    let service = open_service(&config)?;
    let prescriptions = service.list_prescriptions();

    if prescriptions.is_empty() {
        println!("No prescriptions saved. Add one with `RxReminder add`.");
        return Ok(());
    }

    for prescription in &prescriptions {
        println!(
            "{}  {} - {}",
            prescription.id, prescription.medication_name, prescription.dosage
        );
        if !prescription.frequency.is_empty() {
            println!("    frequency: {}", prescription.frequency);
        }
        if !prescription.start_date.is_empty() || !prescription.end_date.is_empty() {
            println!(
                "    course: {} to {}",
                or_dash(&prescription.start_date),
                or_dash(&prescription.end_date)
            );
        }
        if !prescription.instructions.is_empty() {
            println!("    instructions: {}", prescription.instructions);
        }
        if prescription.alarms_enabled() {
            println!("    reminders: {}", prescription.alarm_times.join(", "));
        } else {
            println!("    reminders: off");
        }
    }
    println!("{} prescription(s)", prescriptions.len());

    Ok(())
}

fn handle_edit(id: &str) -> Result<()> {
    let config = load_or_default_config()?;
    let service = open_service(&config)?;

    let Some(current) = service.store().find_prescription(id) else {
        bail!("Prescription not found: {id}");
    };

    let draft = form::prompt_prescription(FormKind::Edit, PrescriptionDraft {
        photo_uri: Some(current.photo_uri.clone()).filter(|uri| !uri.is_empty()),
        medication_name: current.medication_name.clone(),
        dosage: current.dosage.clone(),
        frequency: current.frequency.clone(),
        start_date: current.start_date.clone(),
        end_date: current.end_date.clone(),
        instructions: current.instructions.clone(),
        alarm_times: if current.alarms_enabled() {
            current.alarm_times.clone()
        } else {
            config.default_alarm_times.clone()
        },
    })?
    .validate()?;

    let updated = Prescription {
        photo_uri: draft.photo_uri.unwrap_or_default(),
        medication_name: draft.medication_name,
        dosage: draft.dosage,
        frequency: draft.frequency,
        start_date: draft.start_date,
        end_date: draft.end_date,
        instructions: draft.instructions,
        alarm_times: draft.alarm_times,
        ..current
    };
    let outcome = service.update_prescription(&updated)?;

    println!("Prescription updated: {}", updated.medication_name);
    println!("- alarms: {}", describe_outcome(outcome));
    Ok(())
}

fn handle_delete(id: &str, yes: bool) -> Result<()> {
    let config = load_or_default_config()?;
    let service = open_service(&config)?;

    let Some(prescription) = service.store().find_prescription(id) else {
        bail!("Prescription not found: {id}");
    };

    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Delete {} and its reminders?",
                prescription.medication_name
            ))
            .default(false)
            .interact()
            .context("Failed to read delete confirmation")?;
        if !confirmed {
            println!("Cancelled");
            return Ok(());
        }
    }

    service.delete_prescription(id)?;
    println!("Prescription deleted: {}", prescription.medication_name);
    Ok(())
}

fn handle_toggle(id: &str) -> Result<()> {
    let config = load_or_default_config()?;
    let service = open_service(&config)?;

    match service.toggle_alarms(id)? {
        AlarmToggle::Disabled => println!("Reminders turned off for {id}"),
        AlarmToggle::Enabled(outcome) => {
            println!("Reminders turned on for {id}: {}", describe_outcome(outcome))
        }
    }
    Ok(())
}

fn handle_alarms(id: Option<&str>) -> Result<()> {
    let config = load_or_default_config()?;
    let service = open_service(&config)?;

    if let Some(id) = id {
        let alarms = service.scheduler().alarms_for(id)?;
        if alarms.is_empty() {
            println!("No reminders scheduled for {id}");
        }
        for alarm in &alarms {
            println!("{}  {}", alarm.time, alarm.id);
        }
        return Ok(());
    }

    let scheduled = service.scheduler().platform().list_scheduled()?;
    if scheduled.is_empty() {
        println!("No reminders scheduled");
        return Ok(());
    }

    let now = Local::now();
    for notification in &scheduled {
        let next = dispatch::next_occurrence(&notification.trigger, now)?;
        println!(
            "{:02}:{:02}  {}  (next: {}, prescription: {})",
            notification.trigger.hour,
            notification.trigger.minute,
            notification.content.body,
            next.format("%Y-%m-%d %H:%M"),
            notification.prescription_id().unwrap_or("-")
        );
    }
    println!("{} reminder(s)", scheduled.len());

    Ok(())
}

fn handle_permissions(grant: bool, revoke: bool) -> Result<()> {
    let config = load_or_default_config()?;
    let platform = LocalNotificationPlatform::open(&config.db_path, config.notifications_enabled)?;

    if grant {
        platform.set_permission(PermissionStatus::Granted)?;
    } else if revoke {
        platform.set_permission(PermissionStatus::Denied)?;
    }

    let scheduler = AlarmScheduler::new(platform);
    let granted = scheduler.request_permissions()?;
    let status = scheduler.platform().permission_status()?;

    println!("Notification permission: {status}");
    if !scheduler.platform().is_supported() {
        println!("Notifications are disabled in config; reminders are never shown.");
    } else if !granted {
        println!("Reminders will not be shown. Run `RxReminder permissions --grant` to allow.");
    }
    Ok(())
}

fn handle_cancel_all() -> Result<()> {
    let config = load_or_default_config()?;
    let service = open_service(&config)?;
    service.scheduler().cancel_all_alarms()?;
    println!("All scheduled reminders cancelled");
    Ok(())
}

fn handle_extract(image: &Path, prompt: Option<String>, save: bool) -> Result<()> {
    let config = load_or_default_config()?;
    let request = ExtractionRequest {
        image: extract::encode_image_file(image)?,
        prompt: prompt.unwrap_or_default(),
    };

    let medications = extract::extract_medications(&config, &request)?;
    if medications.is_empty() {
        println!("No medications found in {}", image.display());
        return Ok(());
    }

    for medication in &medications {
        let timings = medication
            .dosages
            .timings
            .iter()
            .map(|timing| format!("{:?}", timing.context))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "- {} (from {}, {} day(s); {})",
            medication.medicine_name,
            or_dash(&medication.dosages.start_date),
            medication.dosages.days,
            or_dash(&timings)
        );
    }

    if !save {
        return Ok(());
    }

    let service = open_service(&config)?;
    let photo_uri = form::photo_uri(image)?;
    for medication in &medications {
        let defaults = medication.draft_defaults(Some(photo_uri.clone()));
        let draft = form::prompt_prescription(FormKind::New, defaults)?;
        save_draft(&service, draft)?;
    }

    Ok(())
}

fn handle_status() -> Result<()> {
    let config = load_or_default_config()?;
    let service = open_service(&config)?;
    let daemon_status = daemon::status(&config)?;
    let platform = service.scheduler().platform();

    println!("RxReminder status");
    println!("- daemon_label: {}", config.daemon_label);
    println!("- daemon_installed: {}", daemon_status.installed);
    println!("- daemon_loaded: {}", daemon_status.loaded);
    println!("- prescriptions: {}", service.list_prescriptions().len());
    println!("- scheduled_reminders: {}", platform.list_scheduled()?.len());
    println!("- notifications_enabled: {}", config.notifications_enabled);
    println!("- permission: {}", platform.permission_status()?);
    println!(
        "- last_saved_at: {}",
        service
            .store()
            .storage()
            .item_updated_at(&config.store_key)?
            .map(|timestamp| timestamp.to_string())
            .unwrap_or_else(|| "never".to_string())
    );

    Ok(())
}

fn handle_doctor() -> Result<()> {
    let config_path = Config::config_path()?;
    let mut issues = Vec::new();

    if config_path.exists() {
        println!("[OK] config.json found: {}", config_path.display());
    } else {
        println!("[WARN] config.json not found: {}", config_path.display());
        issues.push("config missing".to_string());
    }

    let config = load_or_default_config()?;

    match LocalNotificationPlatform::open(&config.db_path, config.notifications_enabled) {
        Ok(platform) => {
            println!("[OK] SQLite reachable: {}", config.db_path.display());
            match platform.permission_status() {
                Ok(PermissionStatus::Granted) => println!("[OK] notification permission granted"),
                Ok(status) => {
                    println!("[WARN] notification permission {status}");
                    issues.push("permission not granted".to_string());
                }
                Err(error) => {
                    println!("[WARN] permission check failed: {error}");
                    issues.push("permission unreadable".to_string());
                }
            }
        }
        Err(error) => {
            println!("[WARN] SQLite check failed: {error}");
            issues.push("db unreachable".to_string());
        }
    }

    if !config.notifications_enabled {
        println!("[WARN] notifications disabled in config");
        issues.push("notifications disabled".to_string());
    } else if desktop::notifier_available() {
        println!("[OK] desktop notifier available");
    } else {
        println!("[WARN] no desktop notifier found (terminal-notifier, osascript, notify-send)");
        issues.push("notifier missing".to_string());
    }

    if let Err(error) = config::parse_alarm_time_list(&config.default_alarm_times.join(",")) {
        println!("[WARN] invalid default_alarm_times: {error}");
        issues.push("invalid default alarm times".to_string());
    } else {
        println!(
            "[OK] default alarm times valid: {}",
            config.default_alarm_times.join(", ")
        );
    }

    if config.ai_enabled {
        if extract::has_api_key(&config) {
            println!("[OK] AI API key is configured");
        } else {
            println!("[WARN] AI is enabled but API key is missing");
            issues.push("ai api key missing".to_string());
        }
    } else {
        println!("[OK] AI feature disabled");
    }

    if config.api_tokens.is_empty() {
        println!("[WARN] no api.tokens configured; the extraction API rejects every caller");
        issues.push("api tokens missing".to_string());
    } else {
        println!("[OK] {} API token(s) configured", config.api_tokens.len());
    }

    if issues.is_empty() {
        println!("doctor result: no issues");
    } else {
        println!("doctor result: {} warning(s)", issues.len());
    }

    Ok(())
}

async fn handle_start() -> Result<()> {
    let config = load_or_default_config()?;
    let daemon_status = daemon::status(&config)?;

    if daemon_status.installed {
        daemon::load(&config)?;
        println!("launchd daemon started");
        Ok(())
    } else {
        println!("launchd daemon is not installed. Running foreground service (Ctrl+C to stop).");
        run_service(config).await
    }
}

fn handle_stop() -> Result<()> {
    let config = load_or_default_config()?;
    daemon::unload(&config)?;
    println!("launchd daemon stopped");
    Ok(())
}

fn handle_restart() -> Result<()> {
    let config = load_or_default_config()?;
    daemon::restart(&config)?;
    println!("launchd daemon restarted");
    Ok(())
}

fn handle_uninstall() -> Result<()> {
    let config = load_or_default_config()?;

    let _ = daemon::unload(&config);

    if let Ok(plist_path) = daemon::plist_path(&config) {
        if plist_path.exists() {
            let _ = fs::remove_file(&plist_path);
            println!("Removed daemon plist: {}", plist_path.display());
        }
    }

    println!("Remove binary: cargo uninstall rxreminder");
    println!("Remove data (optional): rm -rf ~/.RxReminder");

    Ok(())
}

async fn run_service(config: Config) -> Result<()> {
    config.ensure_bootstrap_files()?;
    let _ = Database::open(&config.db_path)?;

    let shared_config = Arc::new(config);
    let dispatcher_config = Arc::clone(&shared_config);
    let api_config = Arc::clone(&shared_config);

    info!("RxReminder service started");

    tokio::select! {
        dispatcher_result = dispatch::run_alarm_dispatcher(dispatcher_config) => {
            dispatcher_result?;
        }
        api_result = api::run_server(api_config) => {
            api_result?;
        }
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

fn open_service(config: &Config) -> Result<Service> {
    config.ensure_bootstrap_files()?;

    let store = PrescriptionStore::with_key(Database::open(&config.db_path)?, &config.store_key);
    let platform = LocalNotificationPlatform::open(&config.db_path, config.notifications_enabled)?;

    Ok(PrescriptionService::new(
        store,
        AlarmScheduler::new(platform),
        config.default_alarm_times.clone(),
    ))
}

fn describe_outcome(outcome: AlarmOutcome) -> String {
    match outcome {
        AlarmOutcome::Scheduled(0) => "saved (notifications unavailable on this host)".to_string(),
        AlarmOutcome::Scheduled(count) => format!("{count} daily reminder(s) scheduled"),
        AlarmOutcome::PermissionDenied => {
            "not scheduled (notification permission denied)".to_string()
        }
        AlarmOutcome::Disabled => "off".to_string(),
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

fn load_or_default_config() -> Result<Config> {
    Config::load().or_else(|_| {
        let config = Config::default();
        config.ensure_bootstrap_files()?;
        config.save()?;
        Ok(config)
    })
}

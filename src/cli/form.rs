use crate::cli::AddArgs;
use crate::config::{expand_home, parse_alarm_time_list};
use crate::model::PrescriptionDraft;
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use dialoguer::{Confirm, Input, theme::ColorfulTheme};
use std::path::Path;
use url::Url;

/// Builds a draft straight from `add` flags. Reminders fall back to `default_alarm_times`
/// unless `--no-alarms` was given.
pub fn draft_from_args(args: AddArgs, default_alarm_times: &[String]) -> Result<PrescriptionDraft> {
    let photo_uri = args.photo.as_deref().map(photo_uri).transpose()?;

    let alarm_times = if args.no_alarms {
        Vec::new()
    } else if args.alarms.is_empty() {
        default_alarm_times.to_vec()
    } else {
        args.alarms
    };

    Ok(PrescriptionDraft {
        photo_uri,
        medication_name: args.name.unwrap_or_default(),
        dosage: args.dosage.unwrap_or_default(),
        frequency: args.frequency,
        start_date: args.start,
        end_date: args.end,
        instructions: args.instructions,
        alarm_times,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    New,
    Edit,
}

impl FormKind {
    pub fn heading(self) -> &'static str {
        match self {
            Self::New => "New prescription",
            Self::Edit => "Edit prescription",
        }
    }
}

/// Interactive prescription form. Every field starts from `defaults`.
pub fn prompt_prescription(
    kind: FormKind,
    defaults: PrescriptionDraft,
) -> Result<PrescriptionDraft> {
    let theme = ColorfulTheme::default();

    println!("──────────────────────────────────────────");
    println!("  {}", kind.heading());
    println!("──────────────────────────────────────────");

    let medication_name: String = Input::with_theme(&theme)
        .with_prompt("  Medication name")
        .with_initial_text(defaults.medication_name)
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            required(input, "Medication name is required")
        })
        .interact_text()
        .context("Failed to read medication name")?;

    let dosage: String = Input::with_theme(&theme)
        .with_prompt("  Dosage (e.g. 500mg, 1 tablet)")
        .with_initial_text(defaults.dosage)
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            required(input, "Dosage is required")
        })
        .interact_text()
        .context("Failed to read dosage")?;

    let frequency: String = Input::with_theme(&theme)
        .with_prompt("  Frequency (e.g. twice daily)")
        .with_initial_text(defaults.frequency)
        .allow_empty(true)
        .interact_text()
        .context("Failed to read frequency")?;

    let start_date = prompt_date(&theme, "  Start date (YYYY-MM-DD)", defaults.start_date)?;
    let end_date = prompt_date(&theme, "  End date (YYYY-MM-DD)", defaults.end_date)?;

    let instructions: String = Input::with_theme(&theme)
        .with_prompt("  Instructions (e.g. take with food)")
        .with_initial_text(defaults.instructions)
        .allow_empty(true)
        .interact_text()
        .context("Failed to read instructions")?;

    let photo_uri = match defaults.photo_uri {
        Some(uri) => Some(uri),
        None => {
            let raw: String = Input::with_theme(&theme)
                .with_prompt("  Prescription photo path (optional)")
                .allow_empty(true)
                .validate_with(|input: &String| -> std::result::Result<(), String> {
                    if input.trim().is_empty() {
                        return Ok(());
                    }
                    photo_uri(&expand_home(input.trim()))
                        .map(|_| ())
                        .map_err(|error| error.to_string())
                })
                .interact_text()
                .context("Failed to read photo path")?;

            (!raw.trim().is_empty())
                .then(|| photo_uri(&expand_home(raw.trim())))
                .transpose()?
        }
    };

    let enable_alarms = Confirm::with_theme(&theme)
        .with_prompt("  Enable reminders?")
        .default(true)
        .interact()
        .context("Failed to read reminder choice")?;

    let alarm_times = if enable_alarms {
        let raw: String = Input::with_theme(&theme)
            .with_prompt("  Reminder times (HH:MM, comma separated)")
            .with_initial_text(defaults.alarm_times.join(","))
            .validate_with(|input: &String| -> std::result::Result<(), String> {
                parse_alarm_time_list(input)
                    .map(|_| ())
                    .map_err(|error| error.to_string())
            })
            .interact_text()
            .context("Failed to read reminder times")?;
        parse_alarm_time_list(&raw)?
    } else {
        Vec::new()
    };

    Ok(PrescriptionDraft {
        photo_uri,
        medication_name,
        dosage,
        frequency,
        start_date,
        end_date,
        instructions,
        alarm_times,
    })
}

/// `file://` URI for a local photo. The file has to exist.
pub fn photo_uri(path: &Path) -> Result<String> {
    let absolute = path
        .canonicalize()
        .with_context(|| format!("Photo not found: {}", path.display()))?;

    Url::from_file_path(&absolute)
        .map(|url| url.to_string())
        .map_err(|_| anyhow!("Photo path is not absolute: {}", absolute.display()))
}

fn prompt_date(theme: &ColorfulTheme, prompt: &str, initial: String) -> Result<String> {
    Input::with_theme(theme)
        .with_prompt(prompt)
        .with_initial_text(initial)
        .allow_empty(true)
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            let trimmed = input.trim();
            if trimmed.is_empty() || NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok() {
                Ok(())
            } else {
                Err("Use YYYY-MM-DD format (example: 2026-03-01)")
            }
        })
        .interact_text()
        .with_context(|| format!("Failed to read {}", prompt.trim()))
}

fn required<'a>(input: &str, message: &'a str) -> std::result::Result<(), &'a str> {
    if input.trim().is_empty() {
        Err(message)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{FormKind, draft_from_args, photo_uri};
    use crate::cli::AddArgs;

    fn args() -> AddArgs {
        AddArgs {
            name: Some("Amoxicillin".to_string()),
            dosage: Some("500mg".to_string()),
            frequency: "3x daily".to_string(),
            start: "2026-03-01".to_string(),
            end: String::new(),
            instructions: String::new(),
            photo: None,
            alarms: Vec::new(),
            no_alarms: false,
        }
    }

    fn defaults() -> Vec<String> {
        vec!["08:00".to_string(), "20:00".to_string()]
    }

    #[test]
    fn falls_back_to_default_alarm_times() {
        let draft = draft_from_args(args(), &defaults()).expect("draft");
        assert_eq!(draft.alarm_times, defaults());
        assert_eq!(draft.medication_name, "Amoxicillin");
        assert!(draft.photo_uri.is_none());
    }

    #[test]
    fn explicit_alarms_and_no_alarms_override_defaults() {
        let explicit = AddArgs {
            alarms: vec!["9:15".to_string()],
            ..args()
        };
        assert_eq!(
            draft_from_args(explicit, &defaults()).expect("draft").alarm_times,
            vec!["9:15"]
        );

        let silent = AddArgs {
            no_alarms: true,
            ..args()
        };
        assert!(
            draft_from_args(silent, &defaults())
                .expect("draft")
                .alarm_times
                .is_empty()
        );
    }

    #[test]
    fn heading_follows_form_kind() {
        assert_eq!(FormKind::New.heading(), "New prescription");
        assert_eq!(FormKind::Edit.heading(), "Edit prescription");
    }

    #[test]
    fn photo_path_becomes_file_uri() {
        let dir = tempfile::tempdir().expect("temp dir");
        let photo = dir.path().join("label.jpg");
        std::fs::write(&photo, b"jpeg").expect("write photo");

        let uri = photo_uri(&photo).expect("uri");
        assert!(uri.starts_with("file:///"));
        assert!(uri.ends_with("/label.jpg"));

        assert!(photo_uri(&dir.path().join("missing.jpg")).is_err());
    }
}

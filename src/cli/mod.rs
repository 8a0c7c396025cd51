pub mod form;
pub mod onboard;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "RxReminder",
    about = "Prescription records and daily medication reminders"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Onboard {
        #[arg(long, default_value_t = false)]
        install_daemon: bool,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Add a prescription. Without --name the interactive form is shown.
    Add(AddArgs),
    List,
    /// Edit a prescription in the interactive form and reschedule its reminders.
    Edit {
        id: String,
    },
    Delete {
        id: String,
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Turn reminders off, or back on with the default times.
    Toggle {
        id: String,
    },
    Alarms {
        #[arg(long)]
        id: Option<String>,
    },
    Permissions {
        #[arg(long, conflicts_with = "revoke")]
        grant: bool,
        #[arg(long)]
        revoke: bool,
    },
    CancelAll,
    /// Read medications from a prescription photo.
    Extract {
        image: PathBuf,
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    Status,
    Doctor,
    Start,
    Stop,
    Restart,
    Service,
    Uninstall,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub dosage: Option<String>,
    #[arg(long, default_value = "")]
    pub frequency: String,
    #[arg(long, default_value = "")]
    pub start: String,
    #[arg(long, default_value = "")]
    pub end: String,
    #[arg(long, default_value = "")]
    pub instructions: String,
    #[arg(long)]
    pub photo: Option<PathBuf>,
    /// Reminder time (HH:MM). Repeat for several times a day.
    #[arg(long = "alarm", value_name = "HH:MM")]
    pub alarms: Vec<String>,
    #[arg(long, default_value_t = false, conflicts_with = "alarms")]
    pub no_alarms: bool,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn parses_repeated_alarm_flags() {
        let cli = Cli::try_parse_from([
            "RxReminder",
            "add",
            "--name",
            "Amoxicillin",
            "--dosage",
            "500mg",
            "--alarm",
            "08:00",
            "--alarm",
            "20:00",
        ])
        .expect("parse");

        let Commands::Add(args) = cli.command else {
            panic!("expected add command");
        };
        assert_eq!(args.name.as_deref(), Some("Amoxicillin"));
        assert_eq!(args.alarms, vec!["08:00", "20:00"]);
        assert!(!args.no_alarms);
    }

    #[test]
    fn rejects_alarms_with_no_alarms() {
        let parsed = Cli::try_parse_from([
            "RxReminder",
            "add",
            "--name",
            "Ibuprofen",
            "--alarm",
            "08:00",
            "--no-alarms",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn grant_and_revoke_are_exclusive() {
        assert!(Cli::try_parse_from(["RxReminder", "permissions", "--grant", "--revoke"]).is_err());
        assert!(Cli::try_parse_from(["RxReminder", "cancel-all"]).is_ok());
    }
}

use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const MAX_ALARM_TIMES: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: String,
    #[serde(default)]
    pub photo_uri: String,
    pub medication_name: String,
    pub dosage: String,
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub alarm_times: Vec<String>,
    pub created_at: String,
}

impl Prescription {
    pub fn alarms_enabled(&self) -> bool {
        !self.alarm_times.is_empty()
    }
}

/// One reminder of a prescription, as shown in alarm listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmSchedule {
    pub id: String,
    pub prescription_id: String,
    pub time: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("invalid alarm time: {0:?}. Example: 08:00 (24-hour format)")]
    InvalidAlarmTime(String),
    #[error("too many alarm times: {count} (at most {max})")]
    TooManyAlarmTimes { count: usize, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AlarmTime {
    pub hour: u32,
    pub minute: u32,
}

impl AlarmTime {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidAlarmTime(raw.to_string());

        let (hour, minute) = raw.trim().split_once(':').ok_or_else(invalid)?;
        if hour.is_empty() || minute.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(invalid());
        }

        let hour = hour.parse::<u32>().map_err(|_| invalid())?;
        let minute = minute.parse::<u32>().map_err(|_| invalid())?;

        if hour > 23 || minute > 59 {
            return Err(invalid());
        }

        Ok(Self { hour, minute })
    }
}

impl fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

pub fn parse_alarm_times(times: &[String]) -> Result<Vec<AlarmTime>, ValidationError> {
    times.iter().map(|time| AlarmTime::parse(time)).collect()
}

/// Form input for a new prescription, before it has an id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrescriptionDraft {
    pub photo_uri: Option<String>,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub start_date: String,
    pub end_date: String,
    pub instructions: String,
    pub alarm_times: Vec<String>,
}

impl PrescriptionDraft {
    /// Trims text fields, checks required ones and normalizes alarm times to `HH:MM`.
    pub fn validate(self) -> Result<Self, ValidationError> {
        let medication_name = self.medication_name.trim().to_string();
        if medication_name.is_empty() {
            return Err(ValidationError::MissingField("medication name"));
        }

        let dosage = self.dosage.trim().to_string();
        if dosage.is_empty() {
            return Err(ValidationError::MissingField("dosage"));
        }

        if self.alarm_times.len() > MAX_ALARM_TIMES {
            return Err(ValidationError::TooManyAlarmTimes {
                count: self.alarm_times.len(),
                max: MAX_ALARM_TIMES,
            });
        }

        let alarm_times = parse_alarm_times(&self.alarm_times)?
            .into_iter()
            .map(|time| time.to_string())
            .collect();

        Ok(Self {
            photo_uri: self
                .photo_uri
                .map(|uri| uri.trim().to_string())
                .filter(|uri| !uri.is_empty()),
            medication_name,
            dosage,
            frequency: self.frequency.trim().to_string(),
            start_date: self.start_date.trim().to_string(),
            end_date: self.end_date.trim().to_string(),
            instructions: self.instructions.trim().to_string(),
            alarm_times,
        })
    }

    pub fn into_prescription(self, id: String, created_at: DateTime<Local>) -> Prescription {
        Prescription {
            id,
            photo_uri: self.photo_uri.unwrap_or_default(),
            medication_name: self.medication_name,
            dosage: self.dosage,
            frequency: self.frequency,
            start_date: self.start_date,
            end_date: self.end_date,
            instructions: self.instructions,
            alarm_times: self.alarm_times,
            created_at: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

pub fn generate_id(now: DateTime<Local>) -> String {
    now.timestamp_millis().to_string()
}

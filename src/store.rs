use crate::db::KeyValueStore;
use crate::model::{Prescription, generate_id};
use chrono::{DateTime, Duration, Local};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_STORE_KEY: &str = "prescriptions";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("prescription already exists: {0}")]
    DuplicateId(String),
    #[error("prescription not found: {0}")]
    NotFound(String),
    #[error("failed to encode prescriptions: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to persist prescriptions: {0:#}")]
    Write(anyhow::Error),
}

/// All prescriptions, stored as one JSON array under a single key.
pub struct PrescriptionStore<S> {
    storage: S,
    key: String,
}

impl<S: KeyValueStore> PrescriptionStore<S> {
    #[cfg(test)]
    pub fn new(storage: S) -> Self {
        Self::with_key(storage, DEFAULT_STORE_KEY)
    }

    pub fn with_key(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Unreadable or corrupt payloads read as an empty collection.
    pub fn get_all_prescriptions(&self) -> Vec<Prescription> {
        let payload = match self.storage.get_item(&self.key) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Vec::new(),
            Err(error) => {
                warn!(error = %error, key = %self.key, "failed to load prescriptions");
                return Vec::new();
            }
        };

        serde_json::from_str(&payload).unwrap_or_else(|error| {
            warn!(error = %error, key = %self.key, "stored prescriptions are unreadable");
            Vec::new()
        })
    }

    pub fn find_prescription(&self, id: &str) -> Option<Prescription> {
        self.get_all_prescriptions()
            .into_iter()
            .find(|prescription| prescription.id == id)
    }

    pub fn save_prescription(&self, prescription: &Prescription) -> Result<(), StoreError> {
        let mut prescriptions = self.get_all_prescriptions();
        if prescriptions.iter().any(|existing| existing.id == prescription.id) {
            return Err(StoreError::DuplicateId(prescription.id.clone()));
        }

        prescriptions.push(prescription.clone());
        self.replace_all(&prescriptions)?;
        debug!(prescription_id = %prescription.id, "prescription saved");

        Ok(())
    }

    /// Removes every record with `id` and returns how many were removed.
    pub fn delete_prescription(&self, id: &str) -> Result<usize, StoreError> {
        let prescriptions = self.get_all_prescriptions();
        let before = prescriptions.len();
        let remaining = prescriptions
            .into_iter()
            .filter(|prescription| prescription.id != id)
            .collect::<Vec<_>>();

        let removed = before - remaining.len();
        self.replace_all(&remaining)?;
        debug!(prescription_id = %id, removed, "prescription deleted");

        Ok(removed)
    }

    pub fn update_prescription(&self, updated: &Prescription) -> Result<(), StoreError> {
        let mut prescriptions = self.get_all_prescriptions();
        let slot = prescriptions
            .iter_mut()
            .find(|prescription| prescription.id == updated.id)
            .ok_or_else(|| StoreError::NotFound(updated.id.clone()))?;

        *slot = updated.clone();
        self.replace_all(&prescriptions)?;
        debug!(prescription_id = %updated.id, "prescription updated");

        Ok(())
    }

    pub fn replace_all(&self, prescriptions: &[Prescription]) -> Result<(), StoreError> {
        let payload = serde_json::to_string(prescriptions)?;
        self.storage
            .set_item(&self.key, &payload)
            .map_err(StoreError::Write)
    }

    /// Timestamp-derived id, moved forward a millisecond at a time until unused.
    pub fn next_free_id(&self, now: DateTime<Local>) -> String {
        let prescriptions = self.get_all_prescriptions();
        let mut candidate = now;

        loop {
            let id = generate_id(candidate);
            if prescriptions.iter().all(|prescription| prescription.id != id) {
                return id;
            }
            candidate = candidate + Duration::milliseconds(1);
        }
    }
}

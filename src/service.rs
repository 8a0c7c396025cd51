use crate::alarm::AlarmScheduler;
use crate::db::KeyValueStore;
use crate::model::{Prescription, PrescriptionDraft};
use crate::notify::NotificationPlatform;
use crate::store::{PrescriptionStore, StoreError};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmOutcome {
    Scheduled(usize),
    PermissionDenied,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmToggle {
    Enabled(AlarmOutcome),
    Disabled,
}

#[derive(Debug, Clone)]
pub struct CreatedPrescription {
    pub prescription: Prescription,
    pub alarms: AlarmOutcome,
}

/// What the form and list screens do: every change touches the record store and the
/// alarm scheduler, persisting first and undoing the store change when the platform fails.
pub struct PrescriptionService<S, P> {
    store: PrescriptionStore<S>,
    scheduler: AlarmScheduler<P>,
    default_alarm_times: Vec<String>,
}

impl<S: KeyValueStore, P: NotificationPlatform> PrescriptionService<S, P> {
    pub fn new(
        store: PrescriptionStore<S>,
        scheduler: AlarmScheduler<P>,
        default_alarm_times: Vec<String>,
    ) -> Self {
        Self {
            store,
            scheduler,
            default_alarm_times,
        }
    }

    pub fn store(&self) -> &PrescriptionStore<S> {
        &self.store
    }

    pub fn scheduler(&self) -> &AlarmScheduler<P> {
        &self.scheduler
    }

    pub fn list_prescriptions(&self) -> Vec<Prescription> {
        self.store.get_all_prescriptions()
    }

    pub fn create_prescription(
        &self,
        draft: PrescriptionDraft,
        now: DateTime<Local>,
    ) -> Result<CreatedPrescription> {
        let draft = draft.validate()?;
        let prescription = draft.into_prescription(self.store.next_free_id(now), now);
        let snapshot = self.store.get_all_prescriptions();

        self.store
            .save_prescription(&prescription)
            .context("Failed to save prescription")?;

        let alarms = self
            .apply_alarms(&prescription)
            .inspect_err(|_| self.rollback(&prescription.id, &snapshot))
            .context("Failed to schedule alarms")?;

        info!(
            prescription_id = %prescription.id,
            medication = %prescription.medication_name,
            "prescription created"
        );
        Ok(CreatedPrescription {
            prescription,
            alarms,
        })
    }

    /// Returns `false` when no record had this id; its alarms are cancelled either way.
    pub fn delete_prescription(&self, id: &str) -> Result<bool> {
        let snapshot = self.store.get_all_prescriptions();

        let removed = self
            .store
            .delete_prescription(id)
            .context("Failed to delete prescription")?;

        if let Err(error) = self.scheduler.cancel_alarms(id) {
            self.rollback(id, &snapshot);
            return Err(error).context("Failed to cancel alarms");
        }

        info!(prescription_id = %id, removed, "prescription deleted");
        Ok(removed > 0)
    }

    pub fn toggle_alarms(&self, id: &str) -> Result<AlarmToggle> {
        let snapshot = self.store.get_all_prescriptions();
        let prescription = snapshot
            .iter()
            .find(|prescription| prescription.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if prescription.alarms_enabled() {
            let updated = Prescription {
                alarm_times: Vec::new(),
                ..prescription
            };
            self.store
                .update_prescription(&updated)
                .context("Failed to update prescription")?;

            if let Err(error) = self.scheduler.cancel_alarms(id) {
                self.rollback(id, &snapshot);
                return Err(error).context("Failed to cancel alarms");
            }

            info!(prescription_id = %id, "alarms disabled");
            Ok(AlarmToggle::Disabled)
        } else {
            let updated = Prescription {
                alarm_times: self.default_alarm_times.clone(),
                ..prescription
            };
            self.store
                .update_prescription(&updated)
                .context("Failed to update prescription")?;

            let outcome = self
                .apply_alarms(&updated)
                .inspect_err(|_| self.rollback(id, &snapshot))
                .context("Failed to schedule alarms")?;

            info!(prescription_id = %id, "alarms enabled");
            Ok(AlarmToggle::Enabled(outcome))
        }
    }

    /// Replaces the whole record and reschedules its alarms.
    pub fn update_prescription(&self, updated: &Prescription) -> Result<AlarmOutcome> {
        crate::model::parse_alarm_times(&updated.alarm_times)?;
        let snapshot = self.store.get_all_prescriptions();

        self.store
            .update_prescription(updated)
            .context("Failed to update prescription")?;

        let outcome = if updated.alarms_enabled() {
            self.apply_alarms(updated)
        } else {
            self.scheduler
                .cancel_alarms(&updated.id)
                .map(|_| AlarmOutcome::Disabled)
                .map_err(anyhow::Error::from)
        };

        let outcome = outcome
            .inspect_err(|_| self.rollback(&updated.id, &snapshot))
            .context("Failed to update alarms")?;

        info!(prescription_id = %updated.id, "prescription updated");
        Ok(outcome)
    }

    fn apply_alarms(&self, prescription: &Prescription) -> Result<AlarmOutcome> {
        if !prescription.alarms_enabled() {
            self.scheduler.cancel_alarms(&prescription.id)?;
            return Ok(AlarmOutcome::Disabled);
        }

        if !self.scheduler.request_permissions()? {
            self.scheduler.cancel_alarms(&prescription.id)?;
            warn!(
                prescription_id = %prescription.id,
                "notification permission not granted; alarms were not scheduled"
            );
            return Ok(AlarmOutcome::PermissionDenied);
        }

        let count = self.scheduler.schedule_alarm(prescription)?;
        Ok(AlarmOutcome::Scheduled(count))
    }

    /// Drops whatever got scheduled for `id` and puts the store back to `snapshot`.
    /// The alarms the snapshot had are scheduled again.
    fn rollback(&self, id: &str, snapshot: &[Prescription]) {
        if let Err(error) = self.scheduler.cancel_alarms(id) {
            warn!(
                error = %error,
                prescription_id = %id,
                "failed to cancel alarms during rollback"
            );
        }
        self.restore(snapshot);

        if let Some(previous) = snapshot.iter().find(|prescription| prescription.id == id) {
            if previous.alarms_enabled() {
                if let Err(error) = self.scheduler.schedule_alarm(previous) {
                    warn!(
                        error = %error,
                        prescription_id = %id,
                        "failed to restore previous alarms"
                    );
                }
            }
        }
    }

    fn restore(&self, snapshot: &[Prescription]) {
        if let Err(error) = self.store.replace_all(snapshot) {
            warn!(error = %error, "failed to restore prescriptions after a failed change");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AlarmOutcome, AlarmToggle, PrescriptionService};
    use crate::alarm::AlarmScheduler;
    use crate::model::{PrescriptionDraft, ValidationError};
    use crate::notify::PermissionStatus;
    use crate::notify::testing::MemoryPlatform;
    use crate::store::PrescriptionStore;
    use crate::store::tests::MemoryKeyValueStore;
    use chrono::{DateTime, Local, TimeZone};

    type TestService = PrescriptionService<MemoryKeyValueStore, MemoryPlatform>;

    fn service_with(platform: MemoryPlatform) -> TestService {
        PrescriptionService::new(
            PrescriptionStore::new(MemoryKeyValueStore::default()),
            AlarmScheduler::new(platform),
            vec!["08:00".to_string(), "14:00".to_string(), "20:00".to_string()],
        )
    }

    fn now() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("local datetime")
    }

    fn ibuprofen() -> PrescriptionDraft {
        PrescriptionDraft {
            medication_name: "Ibuprofen".to_string(),
            dosage: "200mg".to_string(),
            alarm_times: vec!["08:00".to_string(), "20:00".to_string()],
            ..PrescriptionDraft::default()
        }
    }

    #[test]
    fn saving_a_prescription_schedules_its_alarms() {
        let service = service_with(MemoryPlatform::granted());

        let created = service.create_prescription(ibuprofen(), now()).expect("create");

        assert_eq!(created.alarms, AlarmOutcome::Scheduled(2));
        let id = created.prescription.id.clone();
        let tagged = service.scheduler().platform().tagged(&id);
        assert_eq!(tagged.len(), 2);
        assert!(tagged
            .iter()
            .all(|notification| notification.prescription_id() == Some(id.as_str())));
        assert_eq!(service.list_prescriptions(), vec![created.prescription]);
    }

    #[test]
    fn consecutive_creates_get_distinct_ids() {
        let service = service_with(MemoryPlatform::granted());

        let first = service.create_prescription(ibuprofen(), now()).expect("first");
        let second = service.create_prescription(ibuprofen(), now()).expect("second");

        assert_ne!(first.prescription.id, second.prescription.id);
        assert_eq!(service.list_prescriptions().len(), 2);
    }

    #[test]
    fn invalid_form_is_rejected_before_persisting() {
        let service = service_with(MemoryPlatform::granted());
        let draft = PrescriptionDraft {
            dosage: "  ".to_string(),
            ..ibuprofen()
        };

        let error = service.create_prescription(draft, now()).expect_err("invalid");

        assert_eq!(
            error.downcast_ref::<ValidationError>(),
            Some(&ValidationError::MissingField("dosage"))
        );
        assert!(service.list_prescriptions().is_empty());
    }

    #[test]
    fn denied_permission_keeps_record_without_alarms() {
        let service = service_with(MemoryPlatform::denied());

        let created = service.create_prescription(ibuprofen(), now()).expect("create");

        assert_eq!(created.alarms, AlarmOutcome::PermissionDenied);
        assert_eq!(service.list_prescriptions().len(), 1);
        assert!(service.scheduler().platform().scheduled.borrow().is_empty());
    }

    #[test]
    fn failed_scheduling_rolls_back_the_new_record() {
        let platform = MemoryPlatform::granted();
        platform.fail_schedule_after.set(Some(1));
        let service = service_with(platform);

        assert!(service.create_prescription(ibuprofen(), now()).is_err());

        assert!(service.list_prescriptions().is_empty());
        assert!(service.scheduler().platform().scheduled.borrow().is_empty());
    }

    #[test]
    fn toggling_off_cancels_alarms_and_clears_times() {
        let service = service_with(MemoryPlatform::granted());
        let id = service
            .create_prescription(ibuprofen(), now())
            .expect("create")
            .prescription
            .id;

        assert_eq!(service.toggle_alarms(&id).expect("toggle"), AlarmToggle::Disabled);

        assert!(service.scheduler().platform().tagged(&id).is_empty());
        let stored = service.store().find_prescription(&id).expect("stored");
        assert!(stored.alarm_times.is_empty());
    }

    #[test]
    fn toggling_on_uses_default_times() {
        let service = service_with(MemoryPlatform::granted());
        let draft = PrescriptionDraft {
            alarm_times: Vec::new(),
            ..ibuprofen()
        };
        let created = service.create_prescription(draft, now()).expect("create");
        assert_eq!(created.alarms, AlarmOutcome::Disabled);
        let id = created.prescription.id;

        assert_eq!(
            service.toggle_alarms(&id).expect("toggle"),
            AlarmToggle::Enabled(AlarmOutcome::Scheduled(3))
        );

        let stored = service.store().find_prescription(&id).expect("stored");
        assert_eq!(stored.alarm_times, vec!["08:00", "14:00", "20:00"]);
        assert_eq!(service.scheduler().platform().tagged(&id).len(), 3);
    }

    #[test]
    fn failed_cancel_restores_record_on_toggle_off() {
        let service = service_with(MemoryPlatform::granted());
        let id = service
            .create_prescription(ibuprofen(), now())
            .expect("create")
            .prescription
            .id;
        service.scheduler().platform().fail_cancel.set(true);

        assert!(service.toggle_alarms(&id).is_err());

        let stored = service.store().find_prescription(&id).expect("stored");
        assert_eq!(stored.alarm_times, vec!["08:00", "20:00"]);
        assert_eq!(service.scheduler().platform().tagged(&id).len(), 2);
    }

    #[test]
    fn delete_removes_record_and_cancels_alarms() {
        let service = service_with(MemoryPlatform::granted());
        let keep = service
            .create_prescription(ibuprofen(), now())
            .expect("create")
            .prescription
            .id;
        let doomed = service
            .create_prescription(ibuprofen(), now())
            .expect("create")
            .prescription
            .id;

        assert!(service.delete_prescription(&doomed).expect("delete"));

        assert!(service.store().find_prescription(&doomed).is_none());
        assert!(service.scheduler().platform().tagged(&doomed).is_empty());
        assert_eq!(service.scheduler().platform().tagged(&keep).len(), 2);
    }

    #[test]
    fn failed_cancel_keeps_deleted_record() {
        let service = service_with(MemoryPlatform::granted());
        let id = service
            .create_prescription(ibuprofen(), now())
            .expect("create")
            .prescription
            .id;
        service.scheduler().platform().fail_cancel.set(true);

        assert!(service.delete_prescription(&id).is_err());
        assert!(service.store().find_prescription(&id).is_some());
    }

    #[test]
    fn partial_cancel_failure_on_delete_restores_record_and_alarms() {
        let service = service_with(MemoryPlatform::granted());
        let id = service
            .create_prescription(ibuprofen(), now())
            .expect("create")
            .prescription
            .id;
        service.scheduler().platform().fail_cancel_after.set(Some(1));

        assert!(service.delete_prescription(&id).is_err());

        assert!(service.store().find_prescription(&id).is_some());
        let mut times = service
            .scheduler()
            .platform()
            .tagged(&id)
            .iter()
            .map(|notification| (notification.trigger.hour, notification.trigger.minute))
            .collect::<Vec<_>>();
        times.sort();
        assert_eq!(times, vec![(8, 0), (20, 0)]);
    }

    #[test]
    fn partial_cancel_failure_on_toggle_off_restores_alarms() {
        let service = service_with(MemoryPlatform::granted());
        let id = service
            .create_prescription(ibuprofen(), now())
            .expect("create")
            .prescription
            .id;
        service.scheduler().platform().fail_cancel_after.set(Some(1));

        assert!(service.toggle_alarms(&id).is_err());

        let stored = service.store().find_prescription(&id).expect("stored");
        assert_eq!(stored.alarm_times, vec!["08:00", "20:00"]);
        assert_eq!(service.scheduler().platform().tagged(&id).len(), 2);
    }

    #[test]
    fn deleting_unknown_id_reports_false() {
        let service = service_with(MemoryPlatform::granted());
        assert!(!service.delete_prescription("missing").expect("delete"));
    }

    #[test]
    fn update_reschedules_from_new_times() {
        let service = service_with(MemoryPlatform::granted());
        let mut prescription = service
            .create_prescription(ibuprofen(), now())
            .expect("create")
            .prescription;
        prescription.alarm_times = vec!["07:15".to_string()];
        prescription.dosage = "400mg".to_string();

        assert_eq!(
            service.update_prescription(&prescription).expect("update"),
            AlarmOutcome::Scheduled(1)
        );

        let tagged = service.scheduler().platform().tagged(&prescription.id);
        assert_eq!(tagged.len(), 1);
        assert_eq!((tagged[0].trigger.hour, tagged[0].trigger.minute), (7, 15));
        assert_eq!(tagged[0].content.body, "Time to take Ibuprofen - 400mg");
    }

    #[test]
    fn update_with_denied_permission_drops_stale_alarms() {
        let service = service_with(MemoryPlatform::granted());
        let mut prescription = service
            .create_prescription(ibuprofen(), now())
            .expect("create")
            .prescription;
        service
            .scheduler()
            .platform()
            .permission
            .set(PermissionStatus::Denied);
        prescription.alarm_times = vec!["07:15".to_string()];
        prescription.dosage = "400mg".to_string();

        assert_eq!(
            service.update_prescription(&prescription).expect("update"),
            AlarmOutcome::PermissionDenied
        );

        let stored = service
            .store()
            .find_prescription(&prescription.id)
            .expect("stored");
        assert_eq!(stored.alarm_times, vec!["07:15"]);
        assert_eq!(stored.dosage, "400mg");
        assert!(service.scheduler().platform().tagged(&prescription.id).is_empty());
    }
}

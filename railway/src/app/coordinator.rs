//! Consistency coordinator: the reconciliation pass.
//!
//! Composite mutations commit one document at a time, so a crash between two
//! writes can leave a schedule's seat counter, a train's references or a
//! traveler's reservation set out of step with the reservations. This pass
//! recomputes all of them from the live reservations with the pure functions
//! in [`crate::reconcile`] and writes the difference back with
//! compare-and-swap. Running it twice in a row reports nothing the second
//! time.

use crate::aggregates::{Reservation, Schedule, Train, TrainStatus, Traveler};
use crate::environment::{BookingEnvironment, load, query, retryable};
use crate::error::BookingError;
use crate::reconcile::{
    Finding, ReconcileReport, Repair, SeatCount, compute_available_dates, compute_schedule_repair,
    compute_traveler_refs,
};
use crate::types::{Nic, ScheduleId, TrainId};
use railway_core::{Criteria, Document};
use railway_runtime::metrics::ConsistencyMetrics;
use railway_runtime::retry::retry_with_predicate;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Runs reconciliation for one entity or the whole store.
#[derive(Clone)]
pub struct Coordinator {
    env: BookingEnvironment,
}

impl Coordinator {
    /// Create the coordinator.
    #[must_use]
    pub const fn new(env: BookingEnvironment) -> Self {
        Self { env }
    }

    /// Recompute one schedule's seat counter and reservation references.
    ///
    /// An overbooked schedule is reported as a finding and left untouched.
    ///
    /// # Errors
    ///
    /// `NotFound` if the schedule does not exist, `Internal` on storage
    /// failure.
    #[instrument(skip(self))]
    pub async fn reconcile_schedule(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<ReconcileReport, BookingError> {
        let report = self.repair_schedule(schedule_id).await?;
        record(&report);
        Ok(report)
    }

    /// Recompute one train's schedule references, dates and publish state.
    ///
    /// # Errors
    ///
    /// `NotFound` if the train does not exist, `Internal` on storage failure.
    #[instrument(skip(self))]
    pub async fn reconcile_train(
        &self,
        train_id: TrainId,
    ) -> Result<ReconcileReport, BookingError> {
        let report = self.repair_train(train_id).await?;
        record(&report);
        Ok(report)
    }

    /// Recompute one traveler's reservation references.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown traveler, `Internal` on storage failure.
    #[instrument(skip(self))]
    pub async fn reconcile_traveler(&self, nic: &str) -> Result<ReconcileReport, BookingError> {
        let nic = Nic::parse(nic).map_err(BookingError::InvalidInput)?;
        let report = self.repair_traveler(&nic).await?;
        record(&report);
        Ok(report)
    }

    /// Reconcile every schedule, then every train, then every traveler.
    ///
    /// Entities deleted while the pass runs are skipped.
    ///
    /// # Errors
    ///
    /// `Internal` on storage failure.
    #[instrument(skip(self))]
    pub async fn reconcile_all(&self) -> Result<ReconcileReport, BookingError> {
        let started = Instant::now();
        let env = &self.env;
        let mut report = ReconcileReport::default();

        let schedules: Vec<Schedule> = query(&*env.schedules, Criteria::new()).await?;
        for schedule in &schedules {
            report.merge(skip_missing(self.repair_schedule(schedule.id).await)?);
        }

        let trains: Vec<Train> = query(&*env.trains, Criteria::new()).await?;
        for train in &trains {
            report.merge(skip_missing(self.repair_train(train.id).await)?);
        }

        let travelers: Vec<Traveler> = query(&*env.travelers, Criteria::new()).await?;
        for traveler in &travelers {
            report.merge(skip_missing(self.repair_traveler(&traveler.nic).await)?);
        }

        record(&report);
        ConsistencyMetrics::record_pass(started.elapsed());
        info!(
            schedules = schedules.len(),
            trains = trains.len(),
            travelers = travelers.len(),
            repairs = report.repairs.len(),
            findings = report.findings.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Reconciliation pass complete"
        );
        Ok(report)
    }

    async fn repair_schedule(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<ReconcileReport, BookingError> {
        let env = &self.env;
        let key = schedule_id.to_string();
        let key = key.as_str();
        retry_with_predicate(
            env.retry.clone(),
            || async move {
                let mut report = ReconcileReport::default();
                let (schedule, version) = load(&*env.schedules, key).await?.into_parts();
                let Some(train) = env.trains.find(&schedule.train_id.to_string()).await? else {
                    report.findings.push(Finding::MissingTrain {
                        schedule_id,
                        train_id: schedule.train_id,
                    });
                    return Ok(report);
                };

                let live: Vec<Reservation> = query(
                    &*env.reservations,
                    Criteria::new()
                        .eq("schedule_id", key)
                        .eq("is_cancelled", false),
                )
                .await?;
                let repair = compute_schedule_repair(&schedule, train.document.capacity, &live);
                let available = match repair.seats {
                    SeatCount::Available(available) => available,
                    SeatCount::Overbooked { excess } => {
                        report.findings.push(Finding::Overbooked { schedule_id, excess });
                        return Ok(report);
                    }
                };
                if !repair.differs_from(&schedule) {
                    return Ok(report);
                }

                if available != schedule.available_seats {
                    report.repairs.push(Repair::SeatsCorrected {
                        schedule_id,
                        from: schedule.available_seats,
                        to: available,
                    });
                }
                if repair.reservation_ids != schedule.reservation_ids {
                    report.repairs.push(Repair::ScheduleRefsCorrected { schedule_id });
                }
                let fixed = Schedule {
                    available_seats: available,
                    reservation_ids: repair.reservation_ids,
                    ..schedule
                };
                env.schedules.replace(fixed, version).await?;
                Ok::<_, BookingError>(report)
            },
            retryable(Schedule::COLLECTION),
        )
        .await
    }

    async fn repair_train(&self, train_id: TrainId) -> Result<ReconcileReport, BookingError> {
        let env = &self.env;
        let key = train_id.to_string();
        let key = key.as_str();
        retry_with_predicate(
            env.retry.clone(),
            || async move {
                let mut report = ReconcileReport::default();
                let (train, version) = load(&*env.trains, key).await?.into_parts();
                let schedules: Vec<Schedule> =
                    query(&*env.schedules, Criteria::new().eq("train_id", key)).await?;

                let existing: BTreeSet<ScheduleId> =
                    schedules.iter().map(|schedule| schedule.id).collect();
                let removed = train.schedule_ids.difference(&existing).count();
                let added = existing.difference(&train.schedule_ids).count();
                let dates = compute_available_dates(&schedules);

                let mut fixed = train.clone();
                if removed > 0 || added > 0 {
                    report.repairs.push(Repair::TrainRefsCorrected { train_id, removed, added });
                    fixed.schedule_ids = existing;
                }
                if dates != train.available_dates {
                    report.repairs.push(Repair::AvailableDatesCorrected { train_id });
                    fixed.available_dates = dates;
                }

                // A lost delete left the train published with nothing ahead
                let now = env.now();
                let has_future = schedules.iter().any(|schedule| schedule.is_upcoming(&now));
                if removed > 0 && fixed.status.is_published() && !has_future {
                    report.repairs.push(Repair::PublishStateCorrected { train_id });
                    fixed.status = TrainStatus::Unpublished;
                }

                if fixed != train {
                    env.trains.replace(fixed, version).await?;
                }
                Ok::<_, BookingError>(report)
            },
            retryable(Train::COLLECTION),
        )
        .await
    }

    async fn repair_traveler(&self, nic: &Nic) -> Result<ReconcileReport, BookingError> {
        let env = &self.env;
        retry_with_predicate(
            env.retry.clone(),
            || async move {
                let mut report = ReconcileReport::default();
                let (traveler, version) = load(&*env.travelers, nic.as_str()).await?.into_parts();
                let live: Vec<Reservation> = query(
                    &*env.reservations,
                    Criteria::new()
                        .eq("traveler_id", nic.as_str())
                        .eq("is_cancelled", false),
                )
                .await?;

                let refs = compute_traveler_refs(nic, &live);
                if refs != traveler.reservation_ids {
                    report.repairs.push(Repair::TravelerRefsCorrected { nic: nic.clone() });
                    let fixed = Traveler {
                        reservation_ids: refs,
                        ..traveler
                    };
                    env.travelers.replace(fixed, version).await?;
                }
                Ok::<_, BookingError>(report)
            },
            retryable(Traveler::COLLECTION),
        )
        .await
    }
}

/// Treat an entity that vanished mid-pass as already consistent.
fn skip_missing(
    result: Result<ReconcileReport, BookingError>,
) -> Result<ReconcileReport, BookingError> {
    match result {
        Err(BookingError::NotFound { .. }) => Ok(ReconcileReport::default()),
        other => other,
    }
}

fn record(report: &ReconcileReport) {
    for repair in &report.repairs {
        ConsistencyMetrics::record_repair(repair.label());
        warn!(?repair, "Reconciliation repaired inconsistency");
    }
    for finding in &report.findings {
        warn!(?finding, "Reconciliation found inconsistency needing manual action");
    }
}

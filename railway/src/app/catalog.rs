//! Catalog service: trains, schedules and the train lifecycle.
//!
//! Removing schedules is gated on the absence of live reservations. The gate
//! is checked once for the whole batch and again immediately before each
//! individual delete, and the delete itself is a compare-and-swap on the
//! version that was checked, so a reservation landing in between is never
//! stranded.

use crate::aggregates::{
    NewSchedule, NewTrain, Schedule, ScheduleUpdate, Train, TrainStatus, TrainTransition,
};
use crate::environment::{BookingEnvironment, load, modify, observe, query, retryable};
use crate::error::{BookingError, ConflictReason};
use crate::policy::Moment;
use crate::types::{ScheduleId, Station, TrainId};
use chrono::NaiveDate;
use railway_core::{Criteria, Document, Versioned};
use railway_runtime::metrics::CatalogMetrics;
use railway_runtime::retry::retry_with_predicate;
use serde::Serialize;
use tracing::{error, info, instrument};

/// A train with its upcoming schedules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrainDetails {
    /// The train.
    pub train: Train,
    /// Future schedules, ordered by date then departure time.
    pub schedules: Vec<Schedule>,
}

/// Filters for [`CatalogService::search_trains`]; `None` matches anything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrainSearch {
    /// Origin station, any case.
    pub departure_station: Option<String>,
    /// Destination station, any case.
    pub arrival_station: Option<String>,
    /// Travel date the train must have a schedule on.
    pub date: Option<NaiveDate>,
    /// Lifecycle state.
    pub status: Option<TrainStatus>,
}

/// What happens to the train status once its schedules are detached.
#[derive(Clone, Copy, Debug)]
enum AfterRemoval {
    Apply(TrainTransition),
    UnpublishIfIdle,
    Keep,
}

/// Result of one guarded schedule delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Removal {
    Deleted,
    Missing,
    Departed,
}

/// Train and schedule commands and queries.
#[derive(Clone)]
pub struct CatalogService {
    env: BookingEnvironment,
}

impl CatalogService {
    /// Create the service.
    #[must_use]
    pub const fn new(env: BookingEnvironment) -> Self {
        Self { env }
    }

    /// Create an active, unpublished train.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on bad fields.
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create_train(&self, new: NewTrain) -> Result<Train, BookingError> {
        let result = self.insert_train(new).await;
        observe("create_train", &result);
        result
    }

    async fn insert_train(&self, new: NewTrain) -> Result<Train, BookingError> {
        let train = Train::create(new)?;
        self.env.trains.insert(train.clone()).await?;
        info!(
            train_id = %train.id,
            capacity = %train.capacity,
            route = %format_args!("{} -> {}", train.departure_station, train.arrival_station),
            "Train created"
        );
        Ok(train)
    }

    /// Add a schedule with the full train capacity on sale. The first
    /// schedule publishes the train.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the train does not exist
    /// - `Conflict(TrainInactive)` if the train is inactive
    /// - `InvalidInput` on bad fields or a schedule that is not in the future
    #[instrument(skip(self, new), fields(train_id = %new.train_id, date = %new.date))]
    pub async fn add_schedule(&self, new: NewSchedule) -> Result<Schedule, BookingError> {
        let result = self.attach_schedule(new).await;
        observe("add_schedule", &result);
        result
    }

    async fn attach_schedule(&self, new: NewSchedule) -> Result<Schedule, BookingError> {
        let env = &self.env;
        let train = load(&*env.trains, &new.train_id.to_string())
            .await?
            .document;
        if !train.status.is_active() {
            return Err(BookingError::conflict(ConflictReason::TrainInactive));
        }

        let schedule = Schedule::create(new, train.capacity, &env.now())?;
        let version = env.schedules.insert(schedule.clone()).await?;

        let attached = modify(
            &*env.trains,
            &train.key(),
            &env.retry,
            |train: &mut Train| train.attach_schedule(&schedule),
        )
        .await;
        if let Err(failure) = attached {
            if let Err(cleanup) = env.schedules.delete(&schedule.key(), version).await {
                error!(
                    schedule_id = %schedule.id,
                    error = %cleanup,
                    "Could not remove unattached schedule, reconciliation required"
                );
            }
            return Err(failure);
        }

        CatalogMetrics::record_schedule_added();
        info!(schedule_id = %schedule.id, seats = schedule.available_seats, "Schedule added");
        Ok(schedule)
    }

    /// Edit times, price or seats on sale of a schedule without reservations.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the schedule or its train does not exist
    /// - `Conflict(ActiveReservations)` if anyone holds seats on it
    /// - `InvalidInput` on negative or over-capacity seats, zero price or
    ///   equal times
    #[instrument(skip(self, update))]
    pub async fn update_schedule(
        &self,
        schedule_id: ScheduleId,
        update: ScheduleUpdate,
    ) -> Result<Schedule, BookingError> {
        let result = self.edit_schedule(schedule_id, update).await;
        observe("update_schedule", &result);
        result
    }

    async fn edit_schedule(
        &self,
        schedule_id: ScheduleId,
        update: ScheduleUpdate,
    ) -> Result<Schedule, BookingError> {
        let env = &self.env;
        let key = schedule_id.to_string();
        let current = load(&*env.schedules, &key).await?.document;
        let train = load(&*env.trains, &current.train_id.to_string())
            .await?
            .document;
        self.ensure_no_live_reservations(&current).await?;
        if update.is_empty() {
            return Ok(current);
        }

        let (schedule, ()) = modify(
            &*env.schedules,
            &key,
            &env.retry,
            |schedule: &mut Schedule| {
                if !schedule.reservation_ids.is_empty() {
                    return Err(BookingError::conflict(ConflictReason::ActiveReservations));
                }
                schedule.apply_update(&update, train.capacity)
            },
        )
        .await?;

        info!(
            schedule_id = %schedule.id,
            available_seats = schedule.available_seats,
            withheld_seats = schedule.withheld_seats,
            "Schedule updated"
        );
        Ok(schedule)
    }

    /// Delete a future schedule without reservations.
    ///
    /// Returns the train after bookkeeping: the schedule id and, when no
    /// other schedule shares it, the date are removed, and a train left
    /// with no future schedule is unpublished.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the schedule does not exist
    /// - `Conflict(ScheduleDeparted)` if it has already departed
    /// - `Conflict(ActiveReservations)` if anyone holds seats on it
    #[instrument(skip(self))]
    pub async fn delete_schedule(&self, schedule_id: ScheduleId) -> Result<Train, BookingError> {
        let result = self.remove_schedule(schedule_id).await;
        observe("delete_schedule", &result);
        result
    }

    async fn remove_schedule(&self, schedule_id: ScheduleId) -> Result<Train, BookingError> {
        let env = &self.env;
        let schedule = load(&*env.schedules, &schedule_id.to_string())
            .await?
            .document;
        let now = env.now();
        if !schedule.is_upcoming(&now) {
            return Err(BookingError::conflict(ConflictReason::ScheduleDeparted));
        }
        self.ensure_no_live_reservations(&schedule).await?;

        match self.remove_one(schedule_id, &now).await? {
            Removal::Deleted => {}
            Removal::Missing => return Err(BookingError::not_found("schedule", schedule_id)),
            Removal::Departed => {
                return Err(BookingError::conflict(ConflictReason::ScheduleDeparted));
            }
        }
        CatalogMetrics::record_schedules_deleted(1);

        let detached = self
            .detach(schedule.train_id, &[schedule_id], AfterRemoval::UnpublishIfIdle, &now)
            .await;
        match detached {
            Ok(train) => {
                info!(
                    schedule_id = %schedule_id,
                    train_id = %train.id,
                    status = train.status.as_str(),
                    "Schedule deleted"
                );
                Ok(train)
            }
            Err(failure) => {
                // Put the schedule back so the train's references stay true
                if let Err(restore) = env.schedules.insert(schedule).await {
                    error!(
                        schedule_id = %schedule_id,
                        error = %restore,
                        "Could not restore deleted schedule, reconciliation required"
                    );
                }
                Err(failure)
            }
        }
    }

    /// Activate or deactivate a train.
    ///
    /// Deactivating deletes every future schedule, provided none has live
    /// reservations, and unpublishes the train. Activating only flips the
    /// state back to unpublished; removed schedules are not restored.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the train does not exist
    /// - `Conflict(ActiveReservations)` if a future schedule has reservations
    #[instrument(skip(self))]
    pub async fn set_active_status(
        &self,
        train_id: TrainId,
        active: bool,
    ) -> Result<Train, BookingError> {
        let transition = if active {
            TrainTransition::Activate
        } else {
            TrainTransition::Deactivate
        };
        let result = self.transition(train_id, transition).await;
        observe("set_active_status", &result);
        result
    }

    /// Publish or unpublish a train.
    ///
    /// Unpublishing deletes every future schedule under the same gate as
    /// deactivation but leaves the train active.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the train does not exist
    /// - `Conflict(TrainInactive)` when publishing an inactive train
    /// - `Conflict(ActiveReservations)` if a future schedule has reservations
    #[instrument(skip(self))]
    pub async fn set_publish_status(
        &self,
        train_id: TrainId,
        publish: bool,
    ) -> Result<Train, BookingError> {
        let transition = if publish {
            TrainTransition::Publish
        } else {
            TrainTransition::Unpublish
        };
        let result = self.transition(train_id, transition).await;
        observe("set_publish_status", &result);
        result
    }

    async fn transition(
        &self,
        train_id: TrainId,
        transition: TrainTransition,
    ) -> Result<Train, BookingError> {
        if transition.removes_future_schedules() {
            return self.cascade(train_id, transition).await;
        }

        let env = &self.env;
        let (train, ()) = modify(
            &*env.trains,
            &train_id.to_string(),
            &env.retry,
            |train: &mut Train| {
                train.status = train
                    .status
                    .apply(transition)
                    .map_err(BookingError::conflict)?;
                Ok(())
            },
        )
        .await?;

        info!(
            train_id = %train_id,
            ?transition,
            status = train.status.as_str(),
            "Train status changed"
        );
        Ok(train)
    }

    async fn cascade(
        &self,
        train_id: TrainId,
        transition: TrainTransition,
    ) -> Result<Train, BookingError> {
        let env = &self.env;
        load(&*env.trains, &train_id.to_string()).await?;
        let now = env.now();
        let upcoming: Vec<Schedule> = self
            .schedules_of(train_id)
            .await?
            .into_iter()
            .filter(|schedule| schedule.is_upcoming(&now))
            .collect();
        for schedule in &upcoming {
            self.ensure_no_live_reservations(schedule).await?;
        }

        let (removed, outcome) = self.remove_each(&upcoming, &now).await;
        CatalogMetrics::record_schedules_deleted(removed.len());
        if let Err(failure) = outcome {
            self.detach_after_failure(train_id, &removed, &now).await;
            return Err(failure);
        }

        let train = self
            .detach(train_id, &removed, AfterRemoval::Apply(transition), &now)
            .await?;
        info!(
            train_id = %train_id,
            ?transition,
            removed_schedules = removed.len(),
            status = train.status.as_str(),
            "Train status changed"
        );
        Ok(train)
    }

    /// Delete every schedule of a train on one date.
    ///
    /// A date without schedules is a successful no-op. The train's status is
    /// left unchanged.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the train does not exist
    /// - `Conflict(ScheduleDeparted)` if a schedule on that date has departed
    /// - `Conflict(ActiveReservations)` if any of them has reservations
    #[instrument(skip(self))]
    pub async fn cancel_for_date(
        &self,
        train_id: TrainId,
        date: NaiveDate,
    ) -> Result<Train, BookingError> {
        let result = self.remove_date(train_id, date).await;
        observe("cancel_for_date", &result);
        result
    }

    async fn remove_date(&self, train_id: TrainId, date: NaiveDate) -> Result<Train, BookingError> {
        let env = &self.env;
        let train = load(&*env.trains, &train_id.to_string())
            .await?
            .document;
        let schedules: Vec<Schedule> = query(
            &*env.schedules,
            Criteria::new()
                .eq("train_id", train_id.to_string())
                .eq("date", date.to_string()),
        )
        .await?;
        if schedules.is_empty() {
            return Ok(train);
        }

        let now = env.now();
        if schedules.iter().any(|schedule| !schedule.is_upcoming(&now)) {
            return Err(BookingError::conflict(ConflictReason::ScheduleDeparted));
        }
        for schedule in &schedules {
            self.ensure_no_live_reservations(schedule).await?;
        }

        let (removed, outcome) = self.remove_each(&schedules, &now).await;
        CatalogMetrics::record_schedules_deleted(removed.len());
        if let Err(failure) = outcome {
            self.detach_after_failure(train_id, &removed, &now).await;
            return Err(failure);
        }

        let train = self.detach(train_id, &removed, AfterRemoval::Keep, &now).await?;
        info!(
            train_id = %train_id,
            %date,
            removed_schedules = removed.len(),
            "Train cancelled for date"
        );
        Ok(train)
    }

    /// A train with its future schedules.
    ///
    /// # Errors
    ///
    /// `NotFound` if the train does not exist.
    #[instrument(skip(self))]
    pub async fn get_train(&self, train_id: TrainId) -> Result<TrainDetails, BookingError> {
        let train = load(&*self.env.trains, &train_id.to_string())
            .await?
            .document;
        let now = self.env.now();
        let mut schedules: Vec<Schedule> = self
            .schedules_of(train_id)
            .await?
            .into_iter()
            .filter(|schedule| schedule.is_upcoming(&now))
            .collect();
        schedules.sort_by_key(|schedule| (schedule.date, schedule.departure_time));
        Ok(TrainDetails { train, schedules })
    }

    /// Trains matching every given filter, ordered by name.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on a blank station filter.
    #[instrument(skip(self))]
    pub async fn search_trains(&self, search: TrainSearch) -> Result<Vec<Train>, BookingError> {
        let mut criteria = Criteria::new();
        if let Some(departure) = &search.departure_station {
            let station = Station::parse(departure).map_err(BookingError::InvalidInput)?;
            criteria = criteria.eq("departure_station", station.as_str());
        }
        if let Some(arrival) = &search.arrival_station {
            let station = Station::parse(arrival).map_err(BookingError::InvalidInput)?;
            criteria = criteria.eq("arrival_station", station.as_str());
        }
        if let Some(date) = search.date {
            criteria = criteria.contains("available_dates", date.to_string());
        }
        if let Some(status) = search.status {
            criteria = criteria.eq("status", status.as_str());
        }

        let mut trains = query(&*self.env.trains, criteria).await?;
        trains.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(trains)
    }

    /// One schedule.
    ///
    /// # Errors
    ///
    /// `NotFound` if the schedule does not exist.
    #[instrument(skip(self))]
    pub async fn get_schedule(&self, schedule_id: ScheduleId) -> Result<Schedule, BookingError> {
        Ok(load(&*self.env.schedules, &schedule_id.to_string())
            .await?
            .document)
    }

    async fn schedules_of(&self, train_id: TrainId) -> Result<Vec<Schedule>, BookingError> {
        query(
            &*self.env.schedules,
            Criteria::new().eq("train_id", train_id.to_string()),
        )
        .await
    }

    /// Fail if anyone holds, or is about to hold, seats on the schedule.
    ///
    /// The reservation query also catches a booking whose reservation is
    /// written but whose seats have not been taken from the schedule yet.
    async fn ensure_no_live_reservations(&self, schedule: &Schedule) -> Result<(), BookingError> {
        if !schedule.reservation_ids.is_empty() {
            return Err(BookingError::conflict(ConflictReason::ActiveReservations));
        }
        let live = self
            .env
            .reservations
            .find_matching(
                Criteria::new()
                    .eq("schedule_id", schedule.id.to_string())
                    .eq("is_cancelled", false),
            )
            .await?;
        if live.is_empty() {
            Ok(())
        } else {
            Err(BookingError::conflict(ConflictReason::ActiveReservations))
        }
    }

    /// Re-read, re-check and delete one schedule at the version checked.
    async fn remove_one(
        &self,
        schedule_id: ScheduleId,
        now: &Moment,
    ) -> Result<Removal, BookingError> {
        let env = &self.env;
        let key = schedule_id.to_string();
        let key = key.as_str();
        retry_with_predicate(
            env.retry.clone(),
            || async move {
                let Some(Versioned { document, version }) = env.schedules.find(key).await? else {
                    return Ok(Removal::Missing);
                };
                if !document.is_upcoming(now) {
                    return Ok(Removal::Departed);
                }
                self.ensure_no_live_reservations(&document).await?;
                env.schedules.delete(key, version).await?;
                Ok::<_, BookingError>(Removal::Deleted)
            },
            retryable(Schedule::COLLECTION),
        )
        .await
    }

    /// Remove schedules one by one, stopping at the first refusal.
    ///
    /// Returns the ids actually deleted together with the outcome.
    async fn remove_each(
        &self,
        schedules: &[Schedule],
        now: &Moment,
    ) -> (Vec<ScheduleId>, Result<(), BookingError>) {
        let mut removed = Vec::with_capacity(schedules.len());
        for schedule in schedules {
            match self.remove_one(schedule.id, now).await {
                Ok(Removal::Deleted) => removed.push(schedule.id),
                Ok(Removal::Missing | Removal::Departed) => {}
                Err(failure) => return (removed, Err(failure)),
            }
        }
        (removed, Ok(()))
    }

    /// Drop removed schedules from the train and settle its status.
    async fn detach(
        &self,
        train_id: TrainId,
        removed: &[ScheduleId],
        after: AfterRemoval,
        now: &Moment,
    ) -> Result<Train, BookingError> {
        let env = &self.env;
        let remaining = self.schedules_of(train_id).await?;
        let has_future = remaining.iter().any(|schedule| schedule.is_upcoming(now));

        let (train, ()) = modify(
            &*env.trains,
            &train_id.to_string(),
            &env.retry,
            |train: &mut Train| {
                train.detach_schedules(removed, &remaining);
                match after {
                    AfterRemoval::Apply(transition) => {
                        train.status = train
                            .status
                            .apply(transition)
                            .map_err(BookingError::conflict)?;
                    }
                    AfterRemoval::UnpublishIfIdle => {
                        if train.status.is_published() && !has_future {
                            train.status = TrainStatus::Unpublished;
                        }
                    }
                    AfterRemoval::Keep => {}
                }
                Ok(())
            },
        )
        .await?;
        Ok(train)
    }

    /// Keep the train's references true for the part of a batch that went
    /// through before it was refused.
    async fn detach_after_failure(&self, train_id: TrainId, removed: &[ScheduleId], now: &Moment) {
        if removed.is_empty() {
            return;
        }
        if let Err(failure) = self.detach(train_id, removed, AfterRemoval::Keep, now).await {
            error!(
                train_id = %train_id,
                removed = removed.len(),
                error = %failure,
                "Could not detach deleted schedules, reconciliation required"
            );
        }
    }
}

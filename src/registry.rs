use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::clock::Clock;
use crate::config::Schedule;
use crate::errors::{FieldError, TrainingError, TrainingResult};
use crate::event::{EventFilter, EventId, EventPatch, EventStatus, NewEvent, TrainingEvent};
use crate::listing::Listing;
use crate::locks;

/// Owns training events and their lifecycle.
pub struct EventRegistry {
    events: RwLock<HashMap<EventId, TrainingEvent>>,
    clock: Arc<Clock>,
    schedule: Schedule,
}

/// A status change made by `sync_statuses`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StatusChange {
    pub event: EventId,
    pub title: String,
    pub from: EventStatus,
    pub to: EventStatus,
}

impl EventRegistry {
    pub fn new(clock: Arc<Clock>, schedule: Schedule) -> Self {
        EventRegistry {
            events: RwLock::new(HashMap::new()),
            clock,
            schedule,
        }
    }

    /// Validates and stores a new event, returning its identifier.
    pub fn create_event(&self, fields: NewEvent) -> TrainingResult<EventId> {
        let validated = fields.validate()?;

        let mut event = TrainingEvent {
            id: EventId::new(),
            title: validated.title,
            description: validated.description,
            category: validated.category,
            speaker: validated.speaker,
            date: validated.date,
            time: validated.time,
            venue: validated.venue,
            capacity: validated.capacity,
            status: EventStatus::Upcoming,
            registered_count: 0,
        };

        event.status = match fields.status {
            Some(status) => status,
            None if event.starts_at(self.schedule.utc_offset) <= (self.clock)() => EventStatus::Ongoing,
            None => EventStatus::Upcoming,
        };

        let id = event.id;
        locks::write(&self.events).insert(id, event);

        Ok(id)
    }

    pub fn get_event(&self, id: EventId) -> TrainingResult<TrainingEvent> {
        locks::read(&self.events)
            .get(&id)
            .cloned()
            .ok_or_else(|| TrainingError::event_not_found(id))
    }

    /// Events matching `filter`, ordered by date, then time, then id.
    pub fn list_events(&self, filter: &EventFilter) -> Listing<TrainingEvent> {
        let mut events: Vec<TrainingEvent> = locks::read(&self.events)
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        events.sort_by_key(TrainingEvent::schedule_key);

        Listing::new(events)
    }

    pub fn update_event(&self, id: EventId, patch: &EventPatch) -> TrainingResult<TrainingEvent> {
        let mut events = locks::write(&self.events);
        let event = events.get_mut(&id).ok_or_else(|| TrainingError::event_not_found(id))?;

        let updated = patch.apply(event)?;
        *event = updated.clone();

        Ok(updated)
    }

    /// Moves the event forward to `target`. Asking for the current status
    /// succeeds without change.
    pub fn transition_status(&self, id: EventId, target: EventStatus) -> TrainingResult<TrainingEvent> {
        let mut events = locks::write(&self.events);
        let event = events.get_mut(&id).ok_or_else(|| TrainingError::event_not_found(id))?;

        if !event.status.can_become(target) {
            return Err(TrainingError::InvalidTransition {
                event: id,
                from: event.status,
                to: target,
            });
        }

        event.status = target;
        Ok(event.clone())
    }

    /// Promotes events whose start, or start plus session length, has
    /// passed. Statuses set by hand ahead of the clock are left alone.
    /// A session ending past the last representable instant never completes.
    pub fn sync_statuses(&self) -> Vec<StatusChange> {
        let now = (self.clock)();
        let mut events = locks::write(&self.events);
        let mut changes = Vec::new();

        for event in events.values_mut() {
            let starts_at = event.starts_at(self.schedule.utc_offset);

            let ends_at = starts_at.checked_add(self.schedule.session_length);

            let due = if ends_at.map_or(false, |end| end <= now) {
                EventStatus::Completed
            } else if starts_at <= now {
                EventStatus::Ongoing
            } else {
                EventStatus::Upcoming
            };

            if due > event.status {
                changes.push(StatusChange {
                    event: event.id,
                    title: event.title.clone(),
                    from: event.status,
                    to: due,
                });
                event.status = due;
            }
        }

        changes.sort_by_key(|c| c.event);
        changes
    }

    pub fn len(&self) -> usize {
        locks::read(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes one seat, failing if the event is gone, completed or full.
    /// The check and the increment happen under one lock.
    pub(crate) fn reserve_seat(&self, id: EventId) -> TrainingResult<()> {
        let mut events = locks::write(&self.events);
        let event = events.get_mut(&id).ok_or_else(|| TrainingError::event_not_found(id))?;

        if event.status == EventStatus::Completed {
            return Err(TrainingError::Validation {
                fields: vec![FieldError::new("eventId", "refers to a completed event")],
            });
        }

        if let Some(capacity) = event.capacity {
            if event.registered_count >= capacity {
                return Err(TrainingError::CapacityExceeded { event: id, capacity });
            }
        }

        event.registered_count += 1;
        Ok(())
    }

    pub(crate) fn release_seat(&self, id: EventId) {
        if let Some(event) = locks::write(&self.events).get_mut(&id) {
            event.registered_count = event.registered_count.saturating_sub(1);
        }
    }

    pub(crate) fn remove(&self, id: EventId) -> TrainingResult<TrainingEvent> {
        locks::write(&self.events)
            .remove(&id)
            .ok_or_else(|| TrainingError::event_not_found(id))
    }
}

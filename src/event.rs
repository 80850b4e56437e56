use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use uuid::Uuid;

use crate::errors::{FieldError, TrainingError, TrainingResult};
use crate::normalization;

/// The identifier of a training event.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        EventId(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(EventId)
    }
}

/// Where an event is in its lifecycle. Variants are ordered so that a
/// legal transition never decreases.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Upcoming,
    Ongoing,
    Completed,
}

impl EventStatus {
    /// Whether moving to `target` keeps the lifecycle monotonic. Steps may
    /// be skipped, so an upcoming event can be completed directly.
    pub fn can_become(self, target: EventStatus) -> bool {
        target >= self
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventStatus::Upcoming => "upcoming",
            EventStatus::Ongoing => "ongoing",
            EventStatus::Completed => "completed",
        };

        f.write_str(label)
    }
}

/// A scheduled training session.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingEvent {
    pub id: EventId,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub speaker: Option<String>,
    pub date: Date,
    pub time: Option<Time>,
    pub venue: String,

    /// Maximum number of registrations; `None` means unlimited.
    pub capacity: Option<u32>,

    pub status: EventStatus,

    /// Number of attendance records currently registered.
    pub registered_count: u32,
}

impl TrainingEvent {
    /// The instant the event starts. Events without a time start at midnight.
    pub fn starts_at(&self, offset: UtcOffset) -> OffsetDateTime {
        PrimitiveDateTime::new(self.date, self.time.unwrap_or(Time::MIDNIGHT)).assume_offset(offset)
    }

    pub fn is_full(&self) -> bool {
        self.capacity.map_or(false, |c| self.registered_count >= c)
    }

    pub fn seats_left(&self) -> Option<u32> {
        self.capacity.map(|c| c.saturating_sub(self.registered_count))
    }

    /// The key `list_events` sorts by.
    pub(crate) fn schedule_key(&self) -> (Date, Option<Time>, EventId) {
        (self.date, self.time, self.id)
    }
}

/// The fields submitted to create an event, as entered in the form.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    #[serde(default, deserialize_with = "normalization::deserialize")]
    pub title: String,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub category: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub speaker: Option<String>,

    /// Calendar date as `YYYY-MM-DD`.
    #[serde(default)]
    pub date: String,

    /// Start time as `HH:MM`.
    #[serde(default)]
    pub time: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize")]
    pub venue: String,

    #[serde(default)]
    pub capacity: Option<u32>,

    /// Explicit initial status, overriding the one derived from the clock.
    #[serde(default)]
    pub status: Option<EventStatus>,
}

/// Event fields after validation, ready to be stored.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct EventFields {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub speaker: Option<String>,
    pub date: Date,
    pub time: Option<Time>,
    pub venue: String,
    pub capacity: Option<u32>,
}

impl NewEvent {
    /// Checks the submission, reporting every problem at once.
    pub(crate) fn validate(&self) -> TrainingResult<EventFields> {
        let mut problems = Vec::new();

        let title = normalization::normalize_text(&self.title);
        if title.is_empty() {
            problems.push(FieldError::new("title", "is required"));
        }

        let venue = normalization::normalize_text(&self.venue);
        if venue.is_empty() {
            problems.push(FieldError::new("venue", "is required"));
        }

        let date = parse_date(&self.date).map_err(|p| problems.push(p)).ok();
        let time = parse_time(self.time.as_deref())
            .map_err(|p| problems.push(p))
            .ok();

        if let Err(p) = check_capacity(self.capacity) {
            problems.push(p);
        }

        match (date, time) {
            (Some(date), Some(time)) if problems.is_empty() => Ok(EventFields {
                title,
                description: normalization::normalize_optional(self.description.as_ref()),
                category: normalization::normalize_optional(self.category.as_ref()),
                speaker: normalization::normalize_optional(self.speaker.as_ref()),
                date,
                time,
                venue,
                capacity: self.capacity,
            }),
            _ => Err(TrainingError::Validation { fields: problems }),
        }
    }
}

/// A partial update to an existing event. Absent fields are left unchanged.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub speaker: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub venue: Option<String>,
    pub capacity: Option<u32>,
}

impl EventPatch {
    /// Applies the patch to a copy of `event`, validating the result.
    pub(crate) fn apply(&self, event: &TrainingEvent) -> TrainingResult<TrainingEvent> {
        let mut problems = Vec::new();
        let mut updated = event.clone();

        if let Some(title) = &self.title {
            updated.title = normalization::normalize_text(title);
            if updated.title.is_empty() {
                problems.push(FieldError::new("title", "is required"));
            }
        }

        if let Some(venue) = &self.venue {
            updated.venue = normalization::normalize_text(venue);
            if updated.venue.is_empty() {
                problems.push(FieldError::new("venue", "is required"));
            }
        }

        if self.description.is_some() {
            updated.description = normalization::normalize_optional(self.description.as_ref());
        }
        if self.category.is_some() {
            updated.category = normalization::normalize_optional(self.category.as_ref());
        }
        if self.speaker.is_some() {
            updated.speaker = normalization::normalize_optional(self.speaker.as_ref());
        }

        if let Some(date) = &self.date {
            match parse_date(date) {
                Ok(date) => updated.date = date,
                Err(p) => problems.push(p),
            }
        }

        if self.time.is_some() {
            match parse_time(self.time.as_deref()) {
                Ok(time) => updated.time = time,
                Err(p) => problems.push(p),
            }
        }

        if self.capacity.is_some() {
            match check_capacity(self.capacity) {
                Ok(()) if self.capacity < Some(event.registered_count) => problems.push(
                    FieldError::new("capacity", format!("is below the {} registered attendees", event.registered_count)),
                ),
                Ok(()) => updated.capacity = self.capacity,
                Err(p) => problems.push(p),
            }
        }

        if problems.is_empty() {
            Ok(updated)
        } else {
            Err(TrainingError::Validation { fields: problems })
        }
    }
}

fn parse_date(raw: &str) -> Result<Date, FieldError> {
    let raw = raw.trim();

    if raw.is_empty() {
        return Err(FieldError::new("date", "is required"));
    }

    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map_err(|_| FieldError::new("date", format!("{:?} is not a valid calendar date", raw)))
}

fn parse_time(raw: Option<&str>) -> Result<Option<Time>, FieldError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => Time::parse(raw, format_description!("[hour]:[minute]"))
            .map(Some)
            .map_err(|_| FieldError::new("time", format!("{:?} is not a valid HH:MM time", raw))),
    }
}

fn check_capacity(capacity: Option<u32>) -> Result<(), FieldError> {
    match capacity {
        Some(0) => Err(FieldError::new("capacity", "must be greater than zero")),
        _ => Ok(()),
    }
}

/// Selects events for listings and aggregates.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    /// Accepted statuses; empty accepts every status.
    #[serde(default)]
    pub statuses: Vec<EventStatus>,

    #[serde(default)]
    pub category: Option<String>,
}

impl EventFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn status(status: EventStatus) -> Self {
        EventFilter {
            statuses: vec![status],
            ..Default::default()
        }
    }

    /// Events that have started, i.e. ongoing or completed.
    pub fn held() -> Self {
        EventFilter {
            statuses: vec![EventStatus::Ongoing, EventStatus::Completed],
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn matches(&self, event: &TrainingEvent) -> bool {
        let status_ok = self.statuses.is_empty() || self.statuses.contains(&event.status);
        let category_ok = match &self.category {
            None => true,
            Some(wanted) => event
                .category
                .as_deref()
                .map_or(false, |c| c.eq_ignore_ascii_case(wanted)),
        };

        status_ok && category_ok
    }
}

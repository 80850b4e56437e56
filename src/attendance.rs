use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::{FieldError, TrainingError, TrainingResult};
use crate::event::EventId;
use crate::normalization;

/// The identifier of an attendee, such as an officer number printed on a
/// badge. Opaque to the core.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct AttendeeId(String);

impl AttendeeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AttendeeId {
    fn from(id: &str) -> Self {
        AttendeeId(normalization::normalize_text(id))
    }
}

impl From<String> for AttendeeId {
    fn from(id: String) -> Self {
        AttendeeId::from(id.as_str())
    }
}

impl fmt::Display for AttendeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How presence was recorded.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckInMethod {
    /// Scanned at a check-in station.
    Qr,

    /// Entered by an officer.
    Manual,
}

impl fmt::Display for CheckInMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckInMethod::Qr => "QR Code",
            CheckInMethod::Manual => "Manual",
        })
    }
}

/// The attendee details submitted at registration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeInfo {
    pub attendee_id: AttendeeId,

    #[serde(deserialize_with = "normalization::deserialize")]
    pub name: String,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub email: Option<String>,

    /// The cooperative or organization the attendee represents.
    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub affiliation: Option<String>,
}

impl AttendeeInfo {
    pub fn new(attendee_id: impl Into<AttendeeId>, name: impl AsRef<str>) -> Self {
        AttendeeInfo {
            attendee_id: attendee_id.into(),
            name: normalization::normalize_text(name),
            email: None,
            affiliation: None,
        }
    }

    pub fn with_email(mut self, email: impl AsRef<str>) -> Self {
        self.email = Some(email.as_ref().to_owned());
        self
    }

    pub fn with_affiliation(mut self, affiliation: impl AsRef<str>) -> Self {
        self.affiliation = normalization::normalize_optional(Some(affiliation));
        self
    }

    pub(crate) fn validate(self) -> TrainingResult<AttendeeInfo> {
        let mut problems = Vec::new();

        if self.attendee_id.as_str().is_empty() {
            problems.push(FieldError::new("attendeeId", "is required"));
        }

        let name = normalization::normalize_text(&self.name);
        if name.is_empty() {
            problems.push(FieldError::new("name", "is required"));
        }

        let email = self
            .email
            .as_ref()
            .map(normalization::normalize_email)
            .filter(|e| !e.is_empty());
        if let Some(email) = &email {
            if !looks_like_email(email) {
                problems.push(FieldError::new("email", format!("{:?} is not an email address", email)));
            }
        }

        if !problems.is_empty() {
            return Err(TrainingError::Validation { fields: problems });
        }

        Ok(AttendeeInfo {
            attendee_id: self.attendee_id,
            name,
            email,
            affiliation: normalization::normalize_optional(self.affiliation.as_ref()),
        })
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    }
}

/// Registration and check-in state for one attendee in one event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub event_id: EventId,
    pub attendee_id: AttendeeId,
    pub attendee_name: String,
    pub email: Option<String>,
    pub affiliation: Option<String>,

    /// When the attendee first enrolled.
    #[serde(with = "time::serde::timestamp")]
    pub registered_at: OffsetDateTime,

    pub registered: bool,
    pub checked_in: bool,

    #[serde(with = "time::serde::timestamp::option")]
    pub check_in_time: Option<OffsetDateTime>,

    pub check_in_method: Option<CheckInMethod>,
}

impl AttendanceRecord {
    pub(crate) fn new(event_id: EventId, info: AttendeeInfo, now: OffsetDateTime) -> Self {
        AttendanceRecord {
            event_id,
            attendee_id: info.attendee_id,
            attendee_name: info.name,
            email: info.email,
            affiliation: info.affiliation,
            registered_at: now,
            registered: true,
            checked_in: false,
            check_in_time: None,
            check_in_method: None,
        }
    }

    /// Marks the attendee present unless they already are. Returns whether
    /// anything changed.
    pub(crate) fn check_in(&mut self, method: CheckInMethod, now: OffsetDateTime) -> bool {
        if self.checked_in {
            return false;
        }

        self.checked_in = true;
        self.check_in_time = Some(now);
        self.check_in_method = Some(method);
        true
    }

    /// Clears any check-in. Returns whether anything changed.
    pub(crate) fn mark_absent(&mut self) -> bool {
        let changed = self.checked_in;

        self.checked_in = false;
        self.check_in_time = None;
        self.check_in_method = None;
        changed
    }

    /// Whether the record counts as present for attendance figures.
    pub fn is_present(&self) -> bool {
        self.registered && self.checked_in
    }
}

/// An opaque credential letting a check-in station record QR check-ins for
/// one event. It says nothing about who is being checked in.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CheckInToken(Uuid);

impl CheckInToken {
    pub(crate) fn issue() -> Self {
        CheckInToken(Uuid::new_v4())
    }
}

impl fmt::Display for CheckInToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Headcount for the attendance page.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub registered: usize,
    pub checked_in: usize,
    pub pending: usize,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn record() -> AttendanceRecord {
        let info = AttendeeInfo::new("officer-1", "Juan Miguel Santos")
            .with_email("Juan.Santos@Coop.com")
            .with_affiliation("Metro Manila Cooperative")
            .validate()
            .expect("validate attendee");

        AttendanceRecord::new(EventId::new(), info, datetime!(2024-01-15 13:00 UTC))
    }

    #[test]
    fn registration_copies_attendee_details() {
        let record = record();

        assert_eq!(record.email.as_deref(), Some("juan.santos@coop.com"));
        assert_eq!(record.affiliation.as_deref(), Some("Metro Manila Cooperative"));
        assert!(record.registered);
        assert!(!record.checked_in);
        assert_eq!(record.check_in_time, None);
        assert_eq!(record.check_in_method, None);
    }

    #[test]
    fn second_check_in_keeps_first_time() {
        let mut record = record();

        assert!(record.check_in(CheckInMethod::Qr, datetime!(2024-01-15 13:55 UTC)));
        assert!(!record.check_in(CheckInMethod::Manual, datetime!(2024-01-15 14:02 UTC)));

        assert_eq!(record.check_in_time, Some(datetime!(2024-01-15 13:55 UTC)));
        assert_eq!(record.check_in_method, Some(CheckInMethod::Qr));
    }

    #[test]
    fn marking_absent_clears_check_in() {
        let mut record = record();
        record.check_in(CheckInMethod::Manual, datetime!(2024-01-15 14:02 UTC));

        assert!(record.mark_absent());
        assert!(!record.mark_absent());
        assert_eq!((record.checked_in, record.check_in_time, record.check_in_method), (false, None, None));
    }

    #[test]
    fn malformed_attendees_are_rejected() {
        let error = AttendeeInfo::new("  ", "")
            .with_email("not-an-email")
            .validate()
            .expect_err("reject attendee");

        match error {
            TrainingError::Validation { fields } => {
                let names: Vec<_> = fields.iter().map(|f| f.field).collect();
                assert_eq!(names, vec!["attendeeId", "name", "email"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}

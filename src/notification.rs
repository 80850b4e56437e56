use serde::Serialize;

use crate::errors::TrainingError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
}

/// The outcome of a command, handed to the notifier for presentation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub subject_id: Option<String>,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn success(subject_id: impl ToString, title: impl Into<String>, message: impl Into<String>) -> Self {
        Notification {
            kind: NotificationKind::Success,
            subject_id: Some(subject_id.to_string()),
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn failure(title: impl Into<String>, error: &TrainingError) -> Self {
        Notification {
            kind: NotificationKind::Error,
            subject_id: error.subject_id(),
            title: title.into(),
            message: error.to_string(),
        }
    }
}

/// Receives every notification the service emits.
pub type Notifier = dyn Fn(&Notification) + Send + Sync;

/// A notifier that drops everything.
pub fn ignore(_: &Notification) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventId;

    #[test]
    fn failures_carry_the_error_subject() {
        let event = EventId::new();
        let error = TrainingError::Conflict { event, records: 3 };

        let notification = Notification::failure("Unable to Delete Event", &error);

        assert_eq!(notification.kind, NotificationKind::Error);
        assert_eq!(notification.subject_id, Some(event.to_string()));
        assert_eq!(notification.message, error.to_string());
    }

    #[test]
    fn notifications_serialize_in_camel_case() {
        let notification = Notification::success("officer-1", "Marked Present", "Ana has been marked as present.");
        let json = serde_json::to_value(&notification).expect("serialize notification");

        assert_eq!(json["kind"], "success");
        assert_eq!(json["subjectId"], "officer-1");
        assert_eq!(json["title"], "Marked Present");
    }
}

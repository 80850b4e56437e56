use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::attendance::{
    AttendanceRecord, AttendanceSummary, AttendeeId, AttendeeInfo, CheckInMethod, CheckInToken,
};
use crate::clock::Clock;
use crate::errors::{Subject, TrainingError, TrainingResult};
use crate::event::{EventId, TrainingEvent};
use crate::listing::Listing;
use crate::locks;
use crate::registry::EventRegistry;

/// What to do with attendance records when deleting an event.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    /// Refuse to delete an event that has records.
    Abort,

    /// Delete the records and revoke the event's tokens along with it.
    Cascade,
}

impl Default for DeletePolicy {
    fn default() -> Self {
        DeletePolicy::Abort
    }
}

/// What a successful delete removed.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetiredEvent {
    pub event: TrainingEvent,
    pub records_removed: usize,
    pub tokens_revoked: usize,
}

/// The result of a check-in command, noting whether it had any effect.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Tracked {
    pub record: AttendanceRecord,
    pub changed: bool,
}

type SharedRecord = Arc<Mutex<AttendanceRecord>>;

/// The attendance records of one event, in registration order.
#[derive(Default)]
struct Roster {
    records: Vec<SharedRecord>,
    index: HashMap<AttendeeId, usize>,
}

impl Roster {
    fn find(&self, attendee: &AttendeeId) -> Option<SharedRecord> {
        self.index.get(attendee).map(|&i| self.records[i].clone())
    }

    fn push(&mut self, record: AttendanceRecord) {
        self.index.insert(record.attendee_id.clone(), self.records.len());
        self.records.push(Arc::new(Mutex::new(record)));
    }

    fn snapshot(&self) -> Vec<AttendanceRecord> {
        self.records.iter().map(|r| locks::lock(r).clone()).collect()
    }
}

/// Owns registration and check-in state for every event.
///
/// Registrations for one event are serialized by the event's roster lock,
/// and each record carries its own mutex so that racing check-ins settle
/// on a single timestamp. Locks are taken in the order roster map, roster,
/// record, registry.
pub struct AttendanceLedger {
    registry: Arc<EventRegistry>,
    rosters: RwLock<HashMap<EventId, Arc<RwLock<Roster>>>>,
    tokens: RwLock<HashMap<CheckInToken, EventId>>,
    clock: Arc<Clock>,
}

impl AttendanceLedger {
    pub fn new(registry: Arc<EventRegistry>, clock: Arc<Clock>) -> Self {
        AttendanceLedger {
            registry,
            rosters: RwLock::new(HashMap::new()),
            tokens: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Enrolls an attendee, taking one of the event's seats.
    pub fn register(&self, event_id: EventId, info: AttendeeInfo) -> TrainingResult<AttendanceRecord> {
        let info = info.validate()?;
        let roster = self.roster_or_create(event_id)?;
        let mut roster = locks::write(&roster);

        if let Some(existing) = roster.find(&info.attendee_id) {
            let mut record = locks::lock(&existing);

            if record.registered {
                return Err(TrainingError::DuplicateRegistration {
                    event: event_id,
                    attendee: info.attendee_id,
                });
            }

            self.registry.reserve_seat(event_id)?;
            record.registered = true;
            record.attendee_name = info.name;
            record.email = info.email;
            record.affiliation = info.affiliation;

            return Ok(record.clone());
        }

        self.registry.reserve_seat(event_id)?;

        let record = AttendanceRecord::new(event_id, info, (self.clock)());
        roster.push(record.clone());

        Ok(record)
    }

    /// Cancels a registration, freeing the seat and clearing any check-in.
    /// Withdrawing twice changes nothing.
    pub fn withdraw(&self, event_id: EventId, attendee: &AttendeeId) -> TrainingResult<AttendanceRecord> {
        let roster = self.existing_roster(event_id)?;
        let roster = locks::write(&roster);
        let shared = roster
            .find(attendee)
            .ok_or_else(|| TrainingError::record_not_found(event_id, attendee.clone()))?;
        let mut record = locks::lock(&shared);

        if record.registered {
            record.registered = false;
            record.mark_absent();
            self.registry.release_seat(event_id);
        }

        Ok(record.clone())
    }

    /// Marks the attendee present. Repeating the call leaves the first
    /// check-in untouched.
    pub fn check_in(
        &self,
        event_id: EventId,
        attendee: &AttendeeId,
        method: CheckInMethod,
    ) -> TrainingResult<AttendanceRecord> {
        self.check_in_tracked(event_id, attendee, method).map(|t| t.record)
    }

    pub(crate) fn check_in_tracked(
        &self,
        event_id: EventId,
        attendee: &AttendeeId,
        method: CheckInMethod,
    ) -> TrainingResult<Tracked> {
        self.with_record(event_id, attendee, |record| {
            if !record.registered {
                return Err(TrainingError::invalid("attendeeId", "is not registered for this event"));
            }

            let changed = record.check_in(method, (self.clock)());
            Ok(changed)
        })
    }

    /// Clears the attendee's check-in, e.g. to correct a misscan.
    pub fn mark_absent(&self, event_id: EventId, attendee: &AttendeeId) -> TrainingResult<AttendanceRecord> {
        self.mark_absent_tracked(event_id, attendee).map(|t| t.record)
    }

    pub(crate) fn mark_absent_tracked(&self, event_id: EventId, attendee: &AttendeeId) -> TrainingResult<Tracked> {
        self.with_record(event_id, attendee, |record| Ok(record.mark_absent()))
    }

    /// Records for the event in registration order.
    pub fn list_attendance(&self, event_id: EventId) -> TrainingResult<Listing<AttendanceRecord>> {
        Ok(Listing::new(self.records(event_id)?))
    }

    pub fn summary(&self, event_id: EventId) -> TrainingResult<AttendanceSummary> {
        let records = self.records(event_id)?;
        let registered = records.iter().filter(|r| r.registered).count();
        let checked_in = records.iter().filter(|r| r.is_present()).count();

        Ok(AttendanceSummary {
            registered,
            checked_in,
            pending: registered - checked_in,
        })
    }

    /// Issues a token that check-in stations present for QR check-ins at
    /// this event.
    pub fn issue_check_in_token(&self, event_id: EventId) -> TrainingResult<CheckInToken> {
        let _rosters = locks::read(&self.rosters);
        self.registry.get_event(event_id)?;

        let token = CheckInToken::issue();
        locks::write(&self.tokens).insert(token, event_id);

        Ok(token)
    }

    /// The event a token was issued for.
    pub fn token_event(&self, token: &CheckInToken) -> TrainingResult<EventId> {
        locks::read(&self.tokens)
            .get(token)
            .copied()
            .ok_or_else(|| TrainingError::NotFound {
                subject: Subject::Token(token.to_string()),
            })
    }

    /// Performs a QR check-in for the attendee whose badge was scanned at
    /// a station holding `token`.
    pub fn check_in_with_token(&self, token: &CheckInToken, attendee: &AttendeeId) -> TrainingResult<AttendanceRecord> {
        let event_id = self.token_event(token)?;
        self.check_in(event_id, attendee, CheckInMethod::Qr)
    }

    /// Deletes an event from the registry together with, if allowed, its
    /// attendance records and tokens.
    pub fn retire_event(&self, event_id: EventId, policy: DeletePolicy) -> TrainingResult<RetiredEvent> {
        let mut rosters = locks::write(&self.rosters);
        self.registry.get_event(event_id)?;

        let records = rosters
            .get(&event_id)
            .map_or(0, |roster| locks::read(roster).records.len());

        if records > 0 && policy == DeletePolicy::Abort {
            return Err(TrainingError::Conflict {
                event: event_id,
                records,
            });
        }

        let event = self.registry.remove(event_id)?;
        rosters.remove(&event_id);

        let mut tokens = locks::write(&self.tokens);
        let before = tokens.len();
        tokens.retain(|_, e| *e != event_id);

        Ok(RetiredEvent {
            event,
            records_removed: records,
            tokens_revoked: before - tokens.len(),
        })
    }

    /// Snapshot of the event's records, failing if the event is unknown.
    pub(crate) fn records(&self, event_id: EventId) -> TrainingResult<Vec<AttendanceRecord>> {
        let roster = self.existing_roster(event_id)?;
        let records = locks::read(&roster).snapshot();
        Ok(records)
    }

    /// Snapshot of every roster, keyed by event.
    pub(crate) fn all_records(&self) -> HashMap<EventId, Vec<AttendanceRecord>> {
        locks::read(&self.rosters)
            .iter()
            .map(|(id, roster)| (*id, locks::read(roster).snapshot()))
            .collect()
    }

    fn with_record<F>(&self, event_id: EventId, attendee: &AttendeeId, update: F) -> TrainingResult<Tracked>
    where
        F: FnOnce(&mut AttendanceRecord) -> TrainingResult<bool>,
    {
        let roster = self.existing_roster(event_id)?;
        let shared = locks::read(&roster)
            .find(attendee)
            .ok_or_else(|| TrainingError::record_not_found(event_id, attendee.clone()))?;

        let mut record = locks::lock(&shared);
        let changed = update(&mut record)?;

        Ok(Tracked {
            record: record.clone(),
            changed,
        })
    }

    /// The event's roster; an empty one if nobody has registered yet.
    fn existing_roster(&self, event_id: EventId) -> TrainingResult<Arc<RwLock<Roster>>> {
        let rosters = locks::read(&self.rosters);
        self.registry.get_event(event_id)?;

        Ok(rosters.get(&event_id).cloned().unwrap_or_default())
    }

    fn roster_or_create(&self, event_id: EventId) -> TrainingResult<Arc<RwLock<Roster>>> {
        if let Some(roster) = locks::read(&self.rosters).get(&event_id) {
            return Ok(roster.clone());
        }

        let mut rosters = locks::write(&self.rosters);
        self.registry.get_event(event_id)?;

        Ok(rosters.entry(event_id).or_default().clone())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use time::macros::datetime;
    use time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Schedule;
    use crate::event::{EventStatus, NewEvent};

    struct Fixture {
        clock: ManualClock,
        ledger: Arc<AttendanceLedger>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = ManualClock::new(datetime!(2024-01-15 13:00 UTC));
            let registry = Arc::new(EventRegistry::new(clock.as_clock(), Schedule::default()));
            let ledger = Arc::new(AttendanceLedger::new(registry, clock.as_clock()));

            Fixture { clock, ledger }
        }

        fn event(&self, capacity: Option<u32>) -> EventId {
            self.ledger
                .registry()
                .create_event(NewEvent {
                    title: "Financial Management Basics".to_owned(),
                    date: "2024-01-15".to_owned(),
                    time: Some("14:00".to_owned()),
                    venue: "Conference Room A".to_owned(),
                    capacity,
                    ..Default::default()
                })
                .expect("create event")
        }
    }

    fn officer(n: usize) -> AttendeeInfo {
        AttendeeInfo::new(format!("officer-{}", n), format!("Officer {}", n))
    }

    #[test]
    fn duplicate_registrations_are_rejected() {
        let fixture = Fixture::new();
        let event = fixture.event(None);

        fixture.ledger.register(event, officer(1)).expect("register");
        let error = fixture.ledger.register(event, officer(1)).expect_err("reject duplicate");

        assert_eq!(
            error,
            TrainingError::DuplicateRegistration {
                event,
                attendee: AttendeeId::from("officer-1"),
            }
        );
        assert_eq!(fixture.ledger.registry().get_event(event).expect("get").registered_count, 1);
    }

    #[test]
    fn unknown_events_and_attendees_are_not_found() {
        let fixture = Fixture::new();
        let event = fixture.event(None);
        let missing = EventId::new();
        let nobody = AttendeeId::from("nobody");

        assert_eq!(
            fixture.ledger.register(missing, officer(1)),
            Err(TrainingError::event_not_found(missing))
        );
        assert_eq!(
            fixture.ledger.check_in(event, &nobody, CheckInMethod::Qr),
            Err(TrainingError::record_not_found(event, nobody.clone()))
        );
        assert_eq!(
            fixture.ledger.mark_absent(missing, &nobody),
            Err(TrainingError::event_not_found(missing))
        );
        assert!(fixture.ledger.list_attendance(event).expect("list").is_empty());
    }

    #[test]
    fn completed_events_take_no_registrations() {
        let fixture = Fixture::new();
        let event = fixture.event(None);
        fixture
            .ledger
            .registry()
            .transition_status(event, EventStatus::Completed)
            .expect("complete");

        assert!(matches!(
            fixture.ledger.register(event, officer(1)),
            Err(TrainingError::Validation { .. })
        ));
    }

    #[test]
    fn withdrawal_frees_the_seat_and_keeps_roster_order() {
        let fixture = Fixture::new();
        let event = fixture.event(Some(2));
        let first = AttendeeId::from("officer-1");

        fixture.ledger.register(event, officer(1)).expect("register");
        fixture.ledger.register(event, officer(2)).expect("register");
        fixture.ledger.check_in(event, &first, CheckInMethod::Manual).expect("check in");

        let withdrawn = fixture.ledger.withdraw(event, &first).expect("withdraw");
        assert!(!withdrawn.registered);
        assert!(!withdrawn.checked_in);
        assert!(matches!(
            fixture.ledger.check_in(event, &first, CheckInMethod::Qr),
            Err(TrainingError::Validation { .. })
        ));

        fixture.ledger.register(event, officer(3)).expect("take freed seat");
        assert!(matches!(
            fixture.ledger.register(event, officer(1)),
            Err(TrainingError::CapacityExceeded { .. })
        ));

        let order: Vec<_> = fixture
            .ledger
            .list_attendance(event)
            .expect("list")
            .iter()
            .map(|r| r.attendee_id.to_string())
            .collect();
        assert_eq!(order, vec!["officer-1", "officer-2", "officer-3"]);
        assert_eq!(
            fixture.ledger.summary(event).expect("summary"),
            AttendanceSummary {
                registered: 2,
                checked_in: 0,
                pending: 2,
            }
        );
    }

    #[test]
    fn tokens_resolve_to_their_event_until_it_is_deleted() {
        let fixture = Fixture::new();
        let event = fixture.event(None);
        let attendee = AttendeeId::from("officer-1");
        fixture.ledger.register(event, officer(1)).expect("register");

        let token = fixture.ledger.issue_check_in_token(event).expect("issue token");
        assert_eq!(fixture.ledger.token_event(&token), Ok(event));

        let record = fixture.ledger.check_in_with_token(&token, &attendee).expect("scan");
        assert_eq!(record.check_in_method, Some(CheckInMethod::Qr));

        assert!(matches!(
            fixture.ledger.retire_event(event, DeletePolicy::Abort),
            Err(TrainingError::Conflict { records: 1, .. })
        ));

        let retired = fixture.ledger.retire_event(event, DeletePolicy::Cascade).expect("delete");
        assert_eq!((retired.records_removed, retired.tokens_revoked), (1, 1));
        assert!(matches!(
            fixture.ledger.check_in_with_token(&token, &attendee),
            Err(TrainingError::NotFound {
                subject: Subject::Token(_)
            })
        ));
        assert!(fixture.ledger.registry().is_empty());
    }

    #[test]
    fn racing_check_ins_record_one_time() {
        let fixture = Fixture::new();
        let event = fixture.event(None);
        fixture.ledger.register(event, officer(1)).expect("register");

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let ledger = fixture.ledger.clone();
                let clock = fixture.clock.clone();

                thread::spawn(move || {
                    clock.advance(Duration::seconds(n));
                    ledger
                        .check_in_tracked(event, &AttendeeId::from("officer-1"), CheckInMethod::Qr)
                        .expect("check in")
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().expect("join")).collect();

        assert_eq!(results.iter().filter(|t| t.changed).count(), 1);
        let times: Vec<_> = results.iter().map(|t| t.record.check_in_time).collect();
        assert!(times.iter().all(|t| *t == times[0]));
        assert_eq!(fixture.ledger.summary(event).expect("summary").checked_in, 1);
    }

    #[test]
    fn racing_registrations_respect_capacity() {
        let fixture = Fixture::new();
        let event = fixture.event(Some(5));

        let handles: Vec<_> = (0..20)
            .map(|n| {
                let ledger = fixture.ledger.clone();
                thread::spawn(move || ledger.register(event, officer(n)).is_ok())
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .filter(|ok| *ok)
            .count();

        assert_eq!(accepted, 5);
        assert_eq!(fixture.ledger.registry().get_event(event).expect("get").registered_count, 5);
        assert_eq!(fixture.ledger.list_attendance(event).expect("list").len(), 5);
    }
}

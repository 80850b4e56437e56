use std::sync::Arc;

use slog::{debug, info, o, warn, Logger};

use crate::access::{ActorRole, Permission, PermissionMatrix};
use crate::attendance::{
    AttendanceRecord, AttendanceSummary, AttendeeId, AttendeeInfo, CheckInMethod, CheckInToken,
};
use crate::compliance::{
    AttendanceRate, ComplianceAggregator, ComplianceBucket, ComplianceSnapshot, DashboardStats, ThresholdPolicy,
};
use crate::environment::Environment;
use crate::errors::{TrainingError, TrainingResult};
use crate::event::{EventFilter, EventId, EventPatch, EventStatus, NewEvent, TrainingEvent};
use crate::ledger::{AttendanceLedger, DeletePolicy, RetiredEvent, Tracked};
use crate::listing::Listing;
use crate::normalization;
use crate::notification::{Notification, Notifier};
use crate::registry::{EventRegistry, StatusChange};

/// The command and query boundary of the training core.
///
/// Every command checks the actor's role against the permission matrix,
/// logs, and reports its outcome to the notifier. Queries do neither.
pub struct TrainingService {
    logger: Arc<Logger>,
    notifier: Arc<Notifier>,
    permissions: PermissionMatrix,
    policy: ThresholdPolicy,
    registry: Arc<EventRegistry>,
    ledger: Arc<AttendanceLedger>,
    aggregator: ComplianceAggregator,
}

impl TrainingService {
    pub fn new(environment: Environment) -> Self {
        let Environment {
            logger,
            clock,
            notifier,
            config,
        } = environment;

        let registry = Arc::new(EventRegistry::new(clock.clone(), config.schedule));
        let ledger = Arc::new(AttendanceLedger::new(registry.clone(), clock));
        let aggregator = ComplianceAggregator::new(ledger.clone());

        TrainingService {
            logger,
            notifier,
            permissions: config.permissions,
            policy: config.compliance,
            registry,
            ledger,
            aggregator,
        }
    }

    /// The classification applied by `dashboard`.
    pub fn policy(&self) -> ThresholdPolicy {
        self.policy
    }

    pub fn create_event(&self, actor: &ActorRole, fields: NewEvent) -> TrainingResult<EventId> {
        let logger = self.logger.new(o!("command" => "create_event", "role" => actor.to_string()));
        debug!(logger, "Creating training event..."; "title" => &fields.title);

        let title = normalization::normalize_text(&fields.title);
        let result = self
            .authorize(actor, Permission::CreateEvent)
            .and_then(|_| self.registry.create_event(fields));

        self.finish(&logger, "Unable to Create Event", result, |id| {
            Notification::success(
                id,
                "Training Event Created",
                format!("\"{}\" has been successfully created and officers will be notified.", title),
            )
        })
    }

    pub fn get_event(&self, id: EventId) -> TrainingResult<TrainingEvent> {
        self.registry.get_event(id)
    }

    pub fn list_events(&self, filter: &EventFilter) -> Listing<TrainingEvent> {
        self.registry.list_events(filter)
    }

    pub fn update_event(&self, actor: &ActorRole, id: EventId, patch: &EventPatch) -> TrainingResult<TrainingEvent> {
        let logger = self.event_logger("update_event", actor, id);
        debug!(logger, "Updating training event...");

        let result = self
            .authorize(actor, Permission::UpdateEvent)
            .and_then(|_| self.registry.update_event(id, patch));

        self.finish(&logger, "Unable to Update Event", result, |event| {
            Notification::success(
                event.id,
                "Training Event Updated",
                format!("\"{}\" has been updated.", event.title),
            )
        })
    }

    pub fn transition_status(
        &self,
        actor: &ActorRole,
        id: EventId,
        target: EventStatus,
    ) -> TrainingResult<TrainingEvent> {
        let logger = self.event_logger("transition_status", actor, id);
        debug!(logger, "Changing event status..."; "target" => target.to_string());

        let result = self
            .authorize(actor, Permission::TransitionEvent)
            .and_then(|_| self.registry.transition_status(id, target));

        self.finish(&logger, "Unable to Change Status", result, |event| {
            Notification::success(
                event.id,
                "Event Status Updated",
                format!("\"{}\" is now {}.", event.title, event.status),
            )
        })
    }

    /// Deletes the event. With `DeletePolicy::Abort` this fails while
    /// attendance records exist.
    pub fn delete_event(&self, actor: &ActorRole, id: EventId, policy: DeletePolicy) -> TrainingResult<RetiredEvent> {
        let logger = self.event_logger("delete_event", actor, id);
        debug!(logger, "Deleting training event..."; "policy" => format!("{:?}", policy));

        let result = self
            .authorize(actor, Permission::DeleteEvent)
            .and_then(|_| self.ledger.retire_event(id, policy));

        self.finish(&logger, "Unable to Delete Event", result, |retired| {
            Notification::success(
                retired.event.id,
                "Training Event Deleted",
                format!(
                    "\"{}\" has been deleted along with {} attendance records.",
                    retired.event.title, retired.records_removed
                ),
            )
        })
    }

    /// Brings event statuses up to date with the clock, notifying once per
    /// promoted event.
    pub fn sync_statuses(&self, actor: &ActorRole) -> TrainingResult<Vec<StatusChange>> {
        let logger = self.logger.new(o!("command" => "sync_statuses", "role" => actor.to_string()));
        debug!(logger, "Synchronizing event statuses...");

        if let Err(e) = self.authorize(actor, Permission::SyncStatuses) {
            self.report_failure(&logger, "Unable to Update Statuses", &e);
            return Err(e);
        }

        let changes = self.registry.sync_statuses();
        info!(logger, "Synchronized event statuses"; "changed" => changes.len());

        for change in &changes {
            (self.notifier)(&Notification::success(
                change.event,
                "Event Status Updated",
                format!("\"{}\" is now {}.", change.title, change.to),
            ));
        }

        Ok(changes)
    }

    pub fn register(&self, actor: &ActorRole, event_id: EventId, info: AttendeeInfo) -> TrainingResult<AttendanceRecord> {
        let logger = self.attendee_logger("register", actor, event_id, &info.attendee_id);
        debug!(logger, "Registering attendee...");

        let result = self
            .authorize(actor, Permission::Register)
            .and_then(|_| self.ledger.register(event_id, info));

        self.finish(&logger, "Unable to Register", result, |record| {
            Notification::success(
                &record.attendee_id,
                "Officer Registered",
                format!("{} has been registered for this training event.", record.attendee_name),
            )
        })
    }

    pub fn withdraw(&self, actor: &ActorRole, event_id: EventId, attendee: &AttendeeId) -> TrainingResult<AttendanceRecord> {
        let logger = self.attendee_logger("withdraw", actor, event_id, attendee);
        debug!(logger, "Withdrawing registration...");

        let result = self
            .authorize(actor, Permission::Withdraw)
            .and_then(|_| self.ledger.withdraw(event_id, attendee));

        self.finish(&logger, "Unable to Withdraw", result, |record| {
            Notification::success(
                &record.attendee_id,
                "Registration Withdrawn",
                format!("{} has been withdrawn from this training event.", record.attendee_name),
            )
        })
    }

    pub fn check_in(
        &self,
        actor: &ActorRole,
        event_id: EventId,
        attendee: &AttendeeId,
        method: CheckInMethod,
    ) -> TrainingResult<AttendanceRecord> {
        let logger = self.attendee_logger("check_in", actor, event_id, attendee);
        debug!(logger, "Checking in attendee..."; "method" => method.to_string());

        let result = self
            .authorize(actor, Permission::CheckIn)
            .and_then(|_| self.ledger.check_in_tracked(event_id, attendee, method));

        self.finish_check_in(&logger, result)
    }

    /// QR check-in from a station holding `token`, for the attendee whose
    /// badge it scanned.
    pub fn check_in_with_token(
        &self,
        actor: &ActorRole,
        token: &CheckInToken,
        attendee: &AttendeeId,
    ) -> TrainingResult<AttendanceRecord> {
        let logger = self.logger.new(o!(
            "command" => "check_in_with_token",
            "role" => actor.to_string(),
            "attendee" => attendee.to_string(),
        ));
        debug!(logger, "Resolving check-in token...");

        let result = self
            .authorize(actor, Permission::CheckIn)
            .and_then(|_| self.ledger.token_event(token))
            .and_then(|event_id| {
                debug!(logger, "Checking in attendee..."; "event" => event_id.to_string());
                self.ledger.check_in_tracked(event_id, attendee, CheckInMethod::Qr)
            });

        self.finish_check_in(&logger, result)
    }

    pub fn mark_absent(&self, actor: &ActorRole, event_id: EventId, attendee: &AttendeeId) -> TrainingResult<AttendanceRecord> {
        let logger = self.attendee_logger("mark_absent", actor, event_id, attendee);
        debug!(logger, "Marking attendee absent...");

        let result = self
            .authorize(actor, Permission::MarkAbsent)
            .and_then(|_| self.ledger.mark_absent_tracked(event_id, attendee));

        self.finish(&logger, "Unable to Update Attendance", result, |tracked| {
            Notification::success(
                &tracked.record.attendee_id,
                "Marked Absent",
                format!("{} has been marked as absent.", tracked.record.attendee_name),
            )
        })
        .map(|tracked| tracked.record)
    }

    pub fn list_attendance(&self, event_id: EventId) -> TrainingResult<Listing<AttendanceRecord>> {
        self.ledger.list_attendance(event_id)
    }

    pub fn attendance_summary(&self, event_id: EventId) -> TrainingResult<AttendanceSummary> {
        self.ledger.summary(event_id)
    }

    pub fn issue_check_in_token(&self, actor: &ActorRole, event_id: EventId) -> TrainingResult<CheckInToken> {
        let logger = self.event_logger("issue_check_in_token", actor, event_id);
        debug!(logger, "Issuing check-in token...");

        let result = self
            .authorize(actor, Permission::IssueToken)
            .and_then(|_| self.ledger.issue_check_in_token(event_id));

        self.finish(&logger, "Unable to Generate QR Code", result, |_| {
            Notification::success(
                event_id,
                "QR Code Generated",
                "A unique QR code has been generated for this training event.",
            )
        })
    }

    pub fn event_attendance_rate(&self, event_id: EventId) -> TrainingResult<AttendanceRate> {
        self.aggregator.event_attendance_rate(event_id)
    }

    pub fn compliance_snapshot<F>(&self, filter: &EventFilter, classify: F) -> ComplianceSnapshot
    where
        F: Fn(AttendanceRate) -> ComplianceBucket,
    {
        self.aggregator.compliance_snapshot(filter, classify)
    }

    /// Dashboard figures, classifying attendees with the configured policy.
    pub fn dashboard(&self) -> DashboardStats {
        let policy = self.policy;
        self.dashboard_with(|rate| policy.classify(rate))
    }

    pub fn dashboard_with<F>(&self, classify: F) -> DashboardStats
    where
        F: Fn(AttendanceRate) -> ComplianceBucket,
    {
        self.aggregator.dashboard(classify)
    }

    fn authorize(&self, actor: &ActorRole, permission: Permission) -> TrainingResult<()> {
        self.permissions.authorize(actor, permission)
    }

    /// Logs and reports the outcome of a command, then hands it back.
    fn finish<T, F>(&self, logger: &Logger, failure_title: &str, result: TrainingResult<T>, success: F) -> TrainingResult<T>
    where
        F: FnOnce(&T) -> Notification,
    {
        match &result {
            Ok(value) => {
                let notification = success(value);
                info!(logger, "{}", notification.message);
                (self.notifier)(&notification);
            }
            Err(e) => self.report_failure(logger, failure_title, e),
        }

        result
    }

    fn report_failure(&self, logger: &Logger, title: &str, error: &TrainingError) {
        warn!(logger, "Command failed"; "error" => error.to_string());
        (self.notifier)(&Notification::failure(title, error));
    }

    fn finish_check_in(&self, logger: &Logger, result: TrainingResult<Tracked>) -> TrainingResult<AttendanceRecord> {
        self.finish(logger, "Unable to Update Attendance", result, |tracked| {
            let record = &tracked.record;
            let message = if tracked.changed {
                format!("{} has been marked as present.", record.attendee_name)
            } else {
                format!("{} was already marked as present.", record.attendee_name)
            };

            Notification::success(&record.attendee_id, "Marked Present", message)
        })
        .map(|tracked| tracked.record)
    }

    fn event_logger(&self, command: &'static str, actor: &ActorRole, id: EventId) -> Logger {
        self.logger.new(o!(
            "command" => command,
            "role" => actor.to_string(),
            "event" => id.to_string(),
        ))
    }

    fn attendee_logger(&self, command: &'static str, actor: &ActorRole, id: EventId, attendee: &AttendeeId) -> Logger {
        self.logger.new(o!(
            "command" => command,
            "role" => actor.to_string(),
            "event" => id.to_string(),
            "attendee" => attendee.to_string(),
        ))
    }
}

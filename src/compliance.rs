use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::attendance::AttendeeId;
use crate::errors::TrainingResult;
use crate::event::{EventFilter, EventId, EventStatus};
use crate::ledger::AttendanceLedger;

/// A share of checked-in registrations, between 0 and 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct AttendanceRate(f64);

impl AttendanceRate {
    /// `checked_in / registered`, or zero when nobody is registered.
    pub fn of(checked_in: usize, registered: usize) -> Self {
        if registered == 0 {
            AttendanceRate(0.0)
        } else {
            AttendanceRate(checked_in as f64 / registered as f64)
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for AttendanceRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}%", self.0 * 100.0)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplianceBucket {
    FullyCompliant,
    PartiallyCompliant,
    NonCompliant,
}

impl ComplianceBucket {
    pub const ALL: [ComplianceBucket; 3] = [
        ComplianceBucket::FullyCompliant,
        ComplianceBucket::PartiallyCompliant,
        ComplianceBucket::NonCompliant,
    ];
}

/// Classifies attendance rates by two thresholds: at or above `fully` is
/// fully compliant, at or above `partially` is partially compliant.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct ThresholdPolicy {
    pub fully: f64,
    pub partially: f64,
}

impl ThresholdPolicy {
    /// Returns `None` unless `0 <= partially <= fully <= 1`.
    pub fn new(fully: f64, partially: f64) -> Option<Self> {
        if 0.0 <= partially && partially <= fully && fully <= 1.0 {
            Some(ThresholdPolicy { fully, partially })
        } else {
            None
        }
    }

    pub fn classify(&self, rate: AttendanceRate) -> ComplianceBucket {
        if rate.value() >= self.fully {
            ComplianceBucket::FullyCompliant
        } else if rate.value() >= self.partially {
            ComplianceBucket::PartiallyCompliant
        } else {
            ComplianceBucket::NonCompliant
        }
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        ThresholdPolicy {
            fully: 0.9,
            partially: 0.5,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketShare {
    pub bucket: ComplianceBucket,
    pub attendees: usize,
    pub percentage: u32,
}

/// How attendees split across compliance buckets.
///
/// Percentages are whole numbers that add up to 100, or are all zero when
/// nobody was classified.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceSnapshot {
    pub population: usize,
    pub buckets: Vec<BucketShare>,
}

impl ComplianceSnapshot {
    fn from_counts(counts: [usize; 3]) -> Self {
        let percentages = largest_remainder(counts);

        let buckets = ComplianceBucket::ALL
            .iter()
            .zip(counts.iter().zip(percentages.iter()))
            .map(|(&bucket, (&attendees, &percentage))| BucketShare {
                bucket,
                attendees,
                percentage,
            })
            .collect();

        ComplianceSnapshot {
            population: counts.iter().sum(),
            buckets,
        }
    }

    pub fn percentage(&self, bucket: ComplianceBucket) -> u32 {
        self.share(bucket).map_or(0, |s| s.percentage)
    }

    pub fn attendees(&self, bucket: ComplianceBucket) -> usize {
        self.share(bucket).map_or(0, |s| s.attendees)
    }

    fn share(&self, bucket: ComplianceBucket) -> Option<&BucketShare> {
        self.buckets.iter().find(|s| s.bucket == bucket)
    }
}

/// Splits 100 points across `counts` in proportion, handing the points lost
/// to rounding down to the largest remainders. Ties go to the earlier bucket.
fn largest_remainder(counts: [usize; 3]) -> [u32; 3] {
    let total: usize = counts.iter().sum();
    let mut percentages = [0u32; 3];

    if total == 0 {
        return percentages;
    }

    let mut remainders = Vec::with_capacity(counts.len());
    let mut assigned = 0;

    for (i, &count) in counts.iter().enumerate() {
        let scaled = count * 100;
        percentages[i] = (scaled / total) as u32;
        assigned += percentages[i];
        remainders.push((scaled % total, i));
    }

    remainders.sort_by(|(a, i), (b, j)| b.cmp(a).then(i.cmp(j)));

    for &(_, i) in remainders.iter().take((100 - assigned) as usize) {
        percentages[i] += 1;
    }

    percentages
}

/// Headline figures for the dashboard.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub active_events: usize,
    pub upcoming_events: usize,
    pub completed_events: usize,
    pub registered_officers: usize,
    pub total_check_ins: usize,
    pub attendance_rate: AttendanceRate,
    pub compliance: ComplianceSnapshot,
}

/// Read-only figures derived from the registry and the ledger.
pub struct ComplianceAggregator {
    ledger: Arc<AttendanceLedger>,
}

impl ComplianceAggregator {
    pub fn new(ledger: Arc<AttendanceLedger>) -> Self {
        ComplianceAggregator { ledger }
    }

    pub fn event_attendance_rate(&self, event_id: EventId) -> TrainingResult<AttendanceRate> {
        let summary = self.ledger.summary(event_id)?;
        Ok(AttendanceRate::of(summary.checked_in, summary.registered))
    }

    /// Classifies every attendee registered for an event matching `filter`
    /// by their attendance rate across those events.
    pub fn compliance_snapshot<F>(&self, filter: &EventFilter, classify: F) -> ComplianceSnapshot
    where
        F: Fn(AttendanceRate) -> ComplianceBucket,
    {
        let events: HashSet<EventId> = self
            .ledger
            .registry()
            .list_events(filter)
            .iter()
            .map(|e| e.id)
            .collect();

        let mut tallies: BTreeMap<AttendeeId, (usize, usize)> = BTreeMap::new();

        for (event_id, records) in self.ledger.all_records() {
            if !events.contains(&event_id) {
                continue;
            }

            for record in records.into_iter().filter(|r| r.registered) {
                let tally = tallies.entry(record.attendee_id).or_default();
                tally.0 += 1;
                if record.checked_in {
                    tally.1 += 1;
                }
            }
        }

        let mut counts = [0; 3];
        for (registered, checked_in) in tallies.values() {
            let bucket = classify(AttendanceRate::of(*checked_in, *registered));
            counts[bucket as usize] += 1;
        }

        ComplianceSnapshot::from_counts(counts)
    }

    pub fn dashboard<F>(&self, classify: F) -> DashboardStats
    where
        F: Fn(AttendanceRate) -> ComplianceBucket,
    {
        let events = self.ledger.registry().list_events(&EventFilter::any());
        let count = |status: EventStatus| events.iter().filter(|e| e.status == status).count();

        let mut officers = BTreeSet::new();
        let mut registered = 0;
        let mut checked_in = 0;

        for record in self.ledger.all_records().into_iter().flat_map(|(_, r)| r) {
            if record.registered {
                registered += 1;
                if record.checked_in {
                    checked_in += 1;
                }
                officers.insert(record.attendee_id);
            }
        }

        DashboardStats {
            active_events: count(EventStatus::Ongoing),
            upcoming_events: count(EventStatus::Upcoming),
            completed_events: count(EventStatus::Completed),
            registered_officers: officers.len(),
            total_check_ins: checked_in,
            attendance_rate: AttendanceRate::of(checked_in, registered),
            compliance: self.compliance_snapshot(&EventFilter::held(), classify),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use time::macros::datetime;

    use super::*;
    use crate::attendance::{AttendeeInfo, CheckInMethod};
    use crate::clock::ManualClock;
    use crate::config::Schedule;
    use crate::event::NewEvent;
    use crate::registry::EventRegistry;

    fn aggregator() -> (Arc<AttendanceLedger>, ComplianceAggregator) {
        let clock = ManualClock::new(datetime!(2024-01-15 15:00 UTC));
        let registry = Arc::new(EventRegistry::new(clock.as_clock(), Schedule::default()));
        let ledger = Arc::new(AttendanceLedger::new(registry, clock.as_clock()));

        (ledger.clone(), ComplianceAggregator::new(ledger))
    }

    fn event(ledger: &AttendanceLedger, date: &str) -> EventId {
        ledger
            .registry()
            .create_event(NewEvent {
                title: format!("Session on {}", date),
                date: date.to_owned(),
                venue: "Training Center".to_owned(),
                ..Default::default()
            })
            .expect("create event")
    }

    fn attend(ledger: &AttendanceLedger, event: EventId, officer: &str, present: bool) {
        ledger
            .register(event, AttendeeInfo::new(officer, officer))
            .expect("register");
        if present {
            ledger
                .check_in(event, &AttendeeId::from(officer), CheckInMethod::Manual)
                .expect("check in");
        }
    }

    #[test]
    fn rate_is_zero_without_registrations() {
        let (ledger, aggregator) = aggregator();
        let id = event(&ledger, "2024-01-12");

        assert_eq!(aggregator.event_attendance_rate(id), Ok(AttendanceRate(0.0)));

        attend(&ledger, id, "a", true);
        attend(&ledger, id, "b", false);
        assert_eq!(aggregator.event_attendance_rate(id).expect("rate").value(), 0.5);
    }

    #[test]
    fn thresholds_classify_inclusively() {
        let policy = ThresholdPolicy::default();

        assert_eq!(policy.classify(AttendanceRate(0.9)), ComplianceBucket::FullyCompliant);
        assert_eq!(policy.classify(AttendanceRate(0.5)), ComplianceBucket::PartiallyCompliant);
        assert_eq!(policy.classify(AttendanceRate(0.49)), ComplianceBucket::NonCompliant);
        assert_eq!(ThresholdPolicy::new(0.4, 0.6), None);
        assert_eq!(ThresholdPolicy::new(1.2, 0.5), None);
    }

    #[test]
    fn snapshot_is_per_attendee_across_filtered_events() {
        let (ledger, aggregator) = aggregator();
        let first = event(&ledger, "2024-01-12");
        let second = event(&ledger, "2024-01-15");
        let later = event(&ledger, "2024-02-01");

        attend(&ledger, first, "ana", true);
        attend(&ledger, second, "ana", true);
        attend(&ledger, first, "ben", true);
        attend(&ledger, second, "ben", false);
        attend(&ledger, first, "cy", false);
        attend(&ledger, later, "dee", false);

        let snapshot = aggregator.compliance_snapshot(&EventFilter::held(), |r| ThresholdPolicy::default().classify(r));

        assert_eq!(snapshot.population, 3);
        assert_eq!(snapshot.attendees(ComplianceBucket::FullyCompliant), 1);
        assert_eq!(snapshot.attendees(ComplianceBucket::PartiallyCompliant), 1);
        assert_eq!(snapshot.attendees(ComplianceBucket::NonCompliant), 1);
        assert_eq!(
            snapshot.buckets.iter().map(|s| s.percentage).collect::<Vec<_>>(),
            vec![34, 33, 33]
        );
    }

    #[test]
    fn empty_population_has_zero_percentages() {
        let (_, aggregator) = aggregator();
        let snapshot = aggregator.compliance_snapshot(&EventFilter::any(), |_| ComplianceBucket::NonCompliant);

        assert_eq!(snapshot.population, 0);
        assert!(snapshot.buckets.iter().all(|s| s.percentage == 0));
    }

    #[test]
    fn dashboard_counts_events_and_officers() {
        let (ledger, aggregator) = aggregator();
        let held = event(&ledger, "2024-01-12");
        let upcoming = event(&ledger, "2024-01-20");
        ledger
            .registry()
            .transition_status(held, EventStatus::Completed)
            .expect("complete");

        attend(&ledger, upcoming, "ana", false);
        attend(&ledger, upcoming, "ben", true);

        let stats = aggregator.dashboard(|r| ThresholdPolicy::default().classify(r));

        assert_eq!(
            (stats.active_events, stats.upcoming_events, stats.completed_events),
            (0, 1, 1)
        );
        assert_eq!(stats.registered_officers, 2);
        assert_eq!(stats.total_check_ins, 1);
        assert_eq!(stats.attendance_rate.value(), 0.5);
        assert_eq!(stats.compliance.population, 0);
    }

    proptest! {
        #[test]
        fn percentages_add_up_to_one_hundred(a in 0usize..500, b in 0usize..500, c in 0usize..500) {
            prop_assume!(a + b + c > 0);

            let counts = [a, b, c];
            let percentages = largest_remainder(counts);
            let total = (a + b + c) as f64;

            prop_assert_eq!(percentages.iter().sum::<u32>(), 100);
            for (count, percentage) in counts.iter().zip(percentages.iter()) {
                let exact = *count as f64 * 100.0 / total;
                prop_assert!((f64::from(*percentage) - exact).abs() < 1.0);
            }
        }
    }
}

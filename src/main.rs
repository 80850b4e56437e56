use std::error::Error;
use std::sync::Arc;

use dotenv;
use slog::{debug, info, o, Logger};
use structopt::StructOpt;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use coop_training::access::ActorRole;
use coop_training::attendance::{AttendeeId, AttendeeInfo, CheckInMethod};
use coop_training::clock::{system_clock, Clock};
use coop_training::config::Config;
use coop_training::environment::Environment;
use coop_training::event::{EventId, NewEvent};
use coop_training::log::initialize_logger;
use coop_training::notification::Notification;
use coop_training::service::TrainingService;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "coop-training",
    about = "Seed the sample training calendar and print the dashboard figures"
)]
struct Opt {
    /// Pretend the current time is this RFC 3339 instant
    #[structopt(long, parse(try_from_str = parse_instant))]
    at: Option<OffsetDateTime>,

    /// Skip the sample registrations and check-ins
    #[structopt(long)]
    no_attendance: bool,

    /// Pretty-print the dashboard JSON
    #[structopt(long)]
    pretty: bool,
}

fn parse_instant(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(raw, &Rfc3339)
}

fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let opt = Opt::from_args();
    let config = Config::from_env()?;
    let logger = Arc::new(initialize_logger());

    let clock: Arc<Clock> = match opt.at {
        Some(at) => Arc::new(move || at),
        None => system_clock(),
    };

    let notifications = logger.new(o!("source" => "notifier"));
    let notifier = Arc::new(move |n: &Notification| {
        info!(notifications, "{}", n.title; "kind" => format!("{:?}", n.kind), "message" => &n.message);
    });

    let service = TrainingService::new(Environment::new(logger.clone(), clock, notifier, config));
    let admin = ActorRole::administrator();

    let events = seed_events(&logger, &service, &admin)?;

    if !opt.no_attendance {
        if let Some(first) = events.first() {
            seed_attendance(&logger, &service, &admin, *first)?;
        }
    }

    service.sync_statuses(&admin)?;

    let stats = service.dashboard();
    let output = if opt.pretty {
        serde_json::to_string_pretty(&stats)?
    } else {
        serde_json::to_string(&stats)?
    };

    println!("{}", output);

    Ok(())
}

fn seed_events(logger: &Logger, service: &TrainingService, admin: &ActorRole) -> Result<Vec<EventId>, Box<dyn Error>> {
    let samples = vec![
        (
            "Financial Management Basics",
            "Learn fundamental financial management principles for cooperatives",
            "Finance",
            "Dr. Maria Santos",
            "2024-01-15",
            "14:00",
            "Conference Room A",
            30,
        ),
        (
            "Cooperative Governance",
            "Understanding governance structures and best practices",
            "Governance",
            "Prof. Juan dela Cruz",
            "2024-01-12",
            "09:00",
            "Main Auditorium",
            50,
        ),
        (
            "Digital Marketing for Coops",
            "Modern marketing strategies for cooperative businesses",
            "Marketing",
            "Ms. Anna Rodriguez",
            "2024-01-20",
            "10:00",
            "Training Center B",
            25,
        ),
        (
            "Risk Management Workshop",
            "",
            "Finance",
            "",
            "2024-01-25",
            "09:00",
            "Main Auditorium",
            40,
        ),
    ];

    info!(logger, "Seeding {} sample events...", samples.len());

    let mut ids = Vec::with_capacity(samples.len());

    for (title, description, category, speaker, date, time, venue, capacity) in samples {
        let id = service.create_event(
            admin,
            NewEvent {
                title: title.to_owned(),
                description: Some(description.to_owned()),
                category: Some(category.to_owned()),
                speaker: Some(speaker.to_owned()),
                date: date.to_owned(),
                time: Some(time.to_owned()),
                venue: venue.to_owned(),
                capacity: Some(capacity),
                status: None,
            },
        )?;

        debug!(logger, "Seeded event"; "event" => id.to_string(), "title" => title);
        ids.push(id);
    }

    Ok(ids)
}

fn seed_attendance(
    logger: &Logger,
    service: &TrainingService,
    admin: &ActorRole,
    event: EventId,
) -> Result<(), Box<dyn Error>> {
    let officers = vec![
        (
            "juan.santos",
            "Juan Miguel Santos",
            "juan.santos@coop.com",
            "Metro Manila Cooperative",
            Some(CheckInMethod::Qr),
        ),
        (
            "maria.rodriguez",
            "Maria Elena Rodriguez",
            "maria.rodriguez@coop.com",
            "Northern Luzon Cooperative",
            Some(CheckInMethod::Manual),
        ),
        (
            "roberto.cruz",
            "Roberto Cruz",
            "roberto.cruz@coop.com",
            "Central Visayas Cooperative",
            None,
        ),
        (
            "ana.delacruz",
            "Ana Cristina Dela Cruz",
            "ana.delacruz@coop.com",
            "Mindanao Development Cooperative",
            Some(CheckInMethod::Qr),
        ),
    ];

    let logger = logger.new(o!("event" => event.to_string()));
    info!(logger, "Registering {} sample officers...", officers.len());

    let token = service.issue_check_in_token(admin, event)?;

    for (id, name, email, cooperative, method) in officers {
        let info = AttendeeInfo::new(id, name)
            .with_email(email)
            .with_affiliation(cooperative);
        service.register(admin, event, info)?;

        let attendee = AttendeeId::from(id);
        match method {
            Some(CheckInMethod::Qr) => {
                service.check_in_with_token(admin, &token, &attendee)?;
            }
            Some(method) => {
                service.check_in(admin, event, &attendee, method)?;
            }
            None => {}
        }
    }

    Ok(())
}

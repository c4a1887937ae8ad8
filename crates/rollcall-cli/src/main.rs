use anyhow::{bail, Context, Result};
use chrono::{Datelike, Local, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use rollcall_core::{PersonId, PersonSummary, RegistrationDraft, Snapshot};
use rollcall_engine::records::{presence_on, PersonUpdate};
use rollcall_engine::{
    spawn_attendance, spawn_registration, CameraSource, Config, EventReceiver, FaceService,
    FrameSource, HttpBackend, RegistrationHandle, SessionEvent,
};
use rollcall_hw::Camera;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

#[derive(Parser)]
#[command(name = "rollcall", about = "Face registration and attendance capture")]
struct Cli {
    /// TOML config file (defaults to $ROLLCALL_CONFIG if set)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new person: capture one face and enroll it
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        mobile: String,
        #[arg(long)]
        gender: String,
        /// Extra attempts after a rejected submission, reusing the same fields
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
    /// Poll the camera and mark attendance until Ctrl-C
    Attend {
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },
    /// List registered people
    Users {
        /// Show who is present or absent today
        #[arg(long)]
        today: bool,
    },
    /// Update a registered person's details
    UpdateUser {
        id: PersonId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        mobile: Option<String>,
        #[arg(long)]
        gender: Option<String>,
        /// Capture a new reference face from the camera
        #[arg(long)]
        recapture: bool,
    },
    /// Remove a registered person and their attendance
    RemoveUser { id: PersonId },
    /// List attendance entries
    Attendance,
    /// Add an attendance entry by hand
    AddAttendance {
        user_id: PersonId,
        /// e.g. 2024-05-02T09:15:00 (default: now)
        #[arg(long, value_parser = parse_timestamp)]
        timestamp: Option<NaiveDateTime>,
    },
    /// Change an attendance entry
    UpdateAttendance {
        id: i64,
        #[arg(long)]
        user: Option<PersonId>,
        #[arg(long, value_parser = parse_timestamp)]
        timestamp: Option<NaiveDateTime>,
    },
    /// Remove an attendance entry
    RemoveAttendance { id: i64 },
    /// Monthly attendance report
    Report {
        #[arg(long)]
        month: Option<u32>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        user: Option<PersonId>,
    },
    /// Six-month averages, full attendance and defaulters
    Analytics {
        #[arg(long)]
        month: Option<u32>,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Days present for one person in a month
    Calendar {
        #[arg(long)]
        month: Option<u32>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        user: PersonId,
    },
    /// Ask the attendance chatbot a question
    Ask {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// List V4L2 capture devices
    Devices,
}

/// Frames tried before giving up on a re-enrollment capture.
const RECAPTURE_ATTEMPTS: usize = 5;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Devices = cli.command {
        list_devices();
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(api = %config.api_base_url, device = %config.camera_device, "configuration loaded");
    let backend = HttpBackend::new(config.api_base_url.clone());

    match cli.command {
        Commands::Register {
            name,
            email,
            mobile,
            gender,
            retries,
        } => {
            let draft = RegistrationDraft::new(name, email, mobile, gender);
            register(&config, backend, draft, retries).await?;
        }
        Commands::Attend { duration } => attend(&config, backend, duration).await?,
        Commands::Users { today: false } => {
            for p in backend.list_users().await? {
                print_person(&p);
            }
        }
        Commands::Users { today: true } => {
            let people = backend.list_users().await?;
            let records = backend.list_attendance().await?;
            let day = Utc::now().date_naive();
            for row in presence_on(people, &records, day) {
                println!(
                    "{:>4}  {:<24} {:<28} {}",
                    row.person.id,
                    row.person.name,
                    row.person.email,
                    row.presence.label()
                );
            }
        }
        Commands::UpdateUser {
            id,
            name,
            email,
            mobile,
            gender,
            recapture,
        } => {
            let mut update = PersonUpdate {
                name,
                email,
                mobile_number: mobile,
                gender,
                facial_data: None,
            };
            if recapture {
                let image = recapture_face(&config, &backend).await?;
                update = update.with_face(&image);
            }
            if update.is_empty() {
                bail!("nothing to update; pass at least one of --name, --email, --mobile, --gender, --recapture");
            }
            println!("{}", backend.update_user(id, &update).await?.message);
        }
        Commands::RemoveUser { id } => println!("{}", backend.delete_user(id).await?.message),
        Commands::Attendance => {
            for r in backend.list_attendance().await? {
                println!("{:>6}  user {:>4}  {}", r.id, r.user_id, r.timestamp.format("%Y-%m-%d %H:%M:%S"));
            }
        }
        Commands::AddAttendance { user_id, timestamp } => {
            let ack = backend.add_attendance(user_id, timestamp).await?;
            match ack.record_id {
                Some(id) => println!("{} (entry {id})", ack.message),
                None => println!("{}", ack.message),
            }
        }
        Commands::UpdateAttendance {
            id,
            user,
            timestamp,
        } => {
            if user.is_none() && timestamp.is_none() {
                bail!("nothing to update; pass --user and/or --timestamp");
            }
            println!("{}", backend.update_attendance(id, user, timestamp).await?.message);
        }
        Commands::RemoveAttendance { id } => {
            println!("{}", backend.delete_attendance(id).await?.message)
        }
        Commands::Report { month, year, user } => {
            let (month, year) = month_or_current(month, year);
            for row in backend.monthly_report(month, year, user).await? {
                println!(
                    "{:>4}  {:<24} {:>2}/{:<2} days  {:>6.2}%",
                    row.user_id,
                    row.user_name,
                    row.total_days_present,
                    row.total_working_days,
                    row.monthly_attendance_percentage
                );
            }
        }
        Commands::Analytics { month, year } => {
            let (month, year) = month_or_current(month, year);
            let analytics = backend.monthly_analytics(month, year).await?;
            println!("Average attendance:");
            for m in &analytics.average_attendance_last_6_months {
                println!("  {:04}-{:02}  {:>6.2}%", m.year, m.month, m.average_attendance);
            }
            println!("Full attendance: {}", analytics.full_attendance_users.join(", "));
            println!("Defaulters:");
            for d in &analytics.defaulters_list {
                println!("  {:<24} {:>6.2}%", d.name, d.attendance_percentage);
            }
        }
        Commands::Calendar { month, year, user } => {
            let (month, year) = month_or_current(month, year);
            let calendar = backend.monthly_calendar(month, year, user).await?;
            if calendar.is_empty() {
                println!("No attendance in {year:04}-{month:02}");
            }
            for (day, status) in calendar {
                println!("{year:04}-{month:02}-{day:02}  {status}");
            }
        }
        Commands::Ask { query } => {
            let reply = backend.ask(&query.join(" ")).await?;
            println!("{}", reply.response);
        }
        Commands::Devices => {}
    }

    Ok(())
}

async fn register(
    config: &Config,
    backend: HttpBackend,
    mut draft: RegistrationDraft,
    retries: u32,
) -> Result<()> {
    let source = open_camera(config)?;
    let backend = Arc::new(backend);
    let (tx, mut events) = mpsc::unbounded_channel();
    let screen = spawn_registration(source, backend.clone(), backend, config, tx);

    let mut attempt = 0;
    let result = loop {
        attempt += 1;
        if let Err(e) = screen.start(draft.clone()).await {
            print_pending(&mut events);
            break Err(e.into());
        }
        match await_registration(&screen, &mut events).await? {
            Finished::Registered => break Ok(()),
            Finished::Cancelled => break Ok(()),
            Finished::Rejected(error) if attempt > retries => {
                break Err(anyhow::anyhow!("registration failed: {error}"))
            }
            Finished::Rejected(_) => {
                draft = screen.state().await?.1;
                println!("Retrying ({attempt}/{retries})...");
            }
        }
    };

    screen.shutdown().await?;
    result
}

enum Finished {
    Registered,
    Rejected(String),
    Cancelled,
}

async fn await_registration(screen: &RegistrationHandle, events: &mut EventReceiver) -> Result<Finished> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    bail!("registration screen closed unexpectedly");
                };
                print_event(&event);
                match event {
                    SessionEvent::Registered { .. } => return Ok(Finished::Registered),
                    SessionEvent::RegistrationFailed { error } => return Ok(Finished::Rejected(error)),
                    _ => {}
                }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if screen.cancel().await? {
                    print_pending(events);
                    return Ok(Finished::Cancelled);
                }
                println!("Submission already in progress, waiting for the result...");
            }
        }
    }
}

async fn attend(config: &Config, backend: HttpBackend, duration: Option<u64>) -> Result<()> {
    let source = open_camera(config)?;
    let backend = Arc::new(backend);
    let (tx, mut events) = mpsc::unbounded_channel();
    let screen = spawn_attendance(source, backend.clone(), backend, config, tx);
    println!("Taking attendance; press Ctrl-C to stop.");

    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            Some(event) = events.recv() => print_event(&event),
            _ = &mut ctrl_c => break,
            _ = until(deadline) => break,
        }
    }

    let cards = screen.shutdown().await?;
    print_pending(&mut events);
    println!();
    if cards.is_empty() {
        println!("Nobody recognized this session.");
    }
    for card in cards {
        println!(
            "{:>4}  {:<24} {:<16} last seen {}",
            card.person.id,
            card.person.name,
            card.status.label(),
            card.last_seen_at.with_timezone(&Local).format("%H:%M:%S")
        );
    }
    Ok(())
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Grab a still that shows a face, for re-enrolling an existing person.
async fn recapture_face(config: &Config, backend: &HttpBackend) -> Result<Snapshot> {
    let mut source = open_camera(config)?;
    println!("Look at the camera...");
    for attempt in 1..=RECAPTURE_ATTEMPTS {
        let (returned, grabbed) = tokio::task::spawn_blocking(move || {
            let grabbed = source.snapshot();
            (source, grabbed)
        })
        .await?;
        source = returned;
        let Some(image) = grabbed.map_err(|e| anyhow::anyhow!(e))? else {
            tracing::debug!(attempt, "no usable frame");
            continue;
        };
        let detection = backend.detect(&image).await?;
        if detection.face_present() {
            tracing::info!(attempt, seq = image.sequence, faces = detection.faces.len(), "face captured");
            return Ok(image);
        }
        println!("No face in view ({attempt}/{RECAPTURE_ATTEMPTS})");
    }
    bail!("no face captured after {RECAPTURE_ATTEMPTS} frames")
}

fn open_camera(config: &Config) -> Result<CameraSource> {
    CameraSource::open(&config.camera_device, config.warmup_frames, config.jpeg_quality)
        .with_context(|| format!("failed to open camera {}", config.camera_device))
}

fn print_event(event: &SessionEvent) {
    match event.status_line() {
        Some(line) => println!("{line}"),
        None => tracing::debug!(?event, "session event"),
    }
}

fn print_pending(events: &mut EventReceiver) {
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
}

fn print_person(p: &PersonSummary) {
    println!("{:>4}  {:<24} {:<28} {:<14} {}", p.id, p.name, p.email, p.mobile_number, p.gender);
}

fn list_devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
    }
    for d in devices {
        println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }
}

fn month_or_current(month: Option<u32>, year: Option<i32>) -> (u32, i32) {
    let today = Local::now().date_naive();
    (month.unwrap_or(today.month()), year.unwrap_or(today.year()))
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| format!("expected YYYY-MM-DDTHH:MM:SS: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_register() {
        let cli = Cli::try_parse_from([
            "rollcall", "register", "--name", "Asha", "--email", "a@x", "--mobile", "1",
            "--gender", "Female", "--retries", "2",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Register { retries: 2, .. }));
    }

    #[test]
    fn test_cli_parses_new_commands() {
        let cli = Cli::try_parse_from(["rollcall", "ask", "who", "was", "absent", "today?"]).unwrap();
        assert!(matches!(cli.command, Commands::Ask { ref query } if query.join(" ") == "who was absent today?"));

        let cli = Cli::try_parse_from(["rollcall", "users", "--today"]).unwrap();
        assert!(matches!(cli.command, Commands::Users { today: true }));

        let cli = Cli::try_parse_from(["rollcall", "update-user", "4", "--recapture"]).unwrap();
        assert!(matches!(cli.command, Commands::UpdateUser { id: 4, recapture: true, .. }));

        assert!(Cli::try_parse_from(["rollcall", "ask"]).is_err());
    }

    #[test]
    fn test_timestamp_formats() {
        assert!(parse_timestamp("2024-05-02T09:15:00").is_ok());
        assert!(parse_timestamp("2024-05-02 09:15:00").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}

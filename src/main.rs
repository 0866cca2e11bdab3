//! # LessonBell — deadline reminders for the Lessons Learned register
//!
//! Usage:
//!   lessonbell run                       # One reminder batch (for an external daily cron)
//!   lessonbell run --dry-run             # List what would be sent, send nothing
//!   lessonbell serve                     # Trigger endpoint on port 3001
//!   lessonbell serve --with-scheduler    # Trigger endpoint + in-process daily batch
//!   lessonbell check --date 2024-03-07   # Config summary and the due set for a day
//!   lessonbell import lessons.json       # Load a JSON export into the SQLite store

use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use lessonbell_core::NotifierConfig;
use lessonbell_scheduler::SqliteLessonStore;
use lessonbell_scheduler::engine::{self, BatchSettings};

#[derive(Parser)]
#[command(
    name = "lessonbell",
    version,
    about = "🔔 LessonBell — deadline reminders and timeline-change emails"
)]
struct Cli {
    /// Config file (default: $LESSONBELL_CONFIG, else ~/.lessonbell/config.toml when present)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reminder batch and exit
    Run {
        /// Override the reminder offset in days
        #[arg(long)]
        offset_days: Option<u32>,

        /// Format and list the due lessons without sending or marking
        #[arg(long)]
        dry_run: bool,
    },
    /// Serve the timeline-change trigger endpoint
    Serve {
        /// Override the listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Also run the reminder batch daily on the configured schedule
        #[arg(long)]
        with_scheduler: bool,
    },
    /// Show the effective config and which lessons are due on a day
    Check {
        /// Local calendar day to evaluate (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Load lessons from a JSON array of documents into the SQLite store
    Import {
        /// JSON file, e.g. `mongoexport --jsonArray` output
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "lessonbell=debug,lessonbell_scheduler=debug,lessonbell_channels=debug,lessonbell_gateway=debug,tower_http=debug"
    } else {
        "lessonbell=info,lessonbell_scheduler=info,lessonbell_channels=info,lessonbell_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("LESSONBELL_CONFIG").ok())
        .map(|p| PathBuf::from(shellexpand::tilde(&p).to_string()));
    let config = NotifierConfig::load(config_path.as_deref())?;

    match cli.command {
        Commands::Run {
            offset_days,
            dry_run,
        } => run(config, offset_days, dry_run).await,
        Commands::Serve {
            port,
            with_scheduler,
        } => serve(config, port, with_scheduler).await,
        Commands::Check { date } => check(config, date).await,
        Commands::Import { file } => import(config, &file),
    }
}

async fn run(config: NotifierConfig, offset_days: Option<u32>, dry_run: bool) -> Result<()> {
    let mut settings = BatchSettings::from_config(&config.reminder)?;
    if let Some(days) = offset_days {
        settings.offset_days = days;
    }
    let store = lessonbell_scheduler::open_store(&config.store)?;

    if dry_run {
        let due = engine::preview_at(store.as_ref(), &settings, Utc::now()).await?;
        println!("🔎 Dry run: {} lesson(s) due in {} day(s)", due.len(), settings.offset_days);
        for (lesson, message) in &due {
            println!("   {} → {}", lesson.id, message.subject);
        }
        return Ok(());
    }

    let mailer = lessonbell_channels::build_mailer(&config.mail)?;
    let report = engine::run_batch(store.as_ref(), mailer.as_ref(), &settings).await?;

    println!("🔔 Reminder batch: {}", report.summary());
    for failure in &report.failures {
        println!(
            "   ❌ {} [{:?}] {}: {}",
            failure.lesson_id, failure.stage, failure.subject, failure.error
        );
    }
    Ok(())
}

async fn serve(mut config: NotifierConfig, port: Option<u16>, with_scheduler: bool) -> Result<()> {
    if let Some(p) = port {
        config.gateway.port = p;
    }
    let mailer = lessonbell_channels::build_mailer(&config.mail)?;

    if with_scheduler {
        let store = lessonbell_scheduler::open_store(&config.store)?;
        let settings = BatchSettings::from_config(&config.reminder)?;
        let schedule = config.reminder.schedule.clone();
        tokio::spawn(engine::spawn_daily_batch(
            store,
            mailer.clone(),
            settings,
            schedule,
        ));
    }

    let state = lessonbell_gateway::AppState::new(mailer);
    lessonbell_gateway::start(&config.gateway, state).await
}

async fn check(config: NotifierConfig, date: Option<NaiveDate>) -> Result<()> {
    let settings = BatchSettings::from_config(&config.reminder)?;
    println!("🔔 LessonBell configuration");
    println!("   Store:      {} ({}.{})", config.store.resolved_uri(), config.store.database, config.store.collection);
    println!("   Transport:  {:?} → {} recipient(s)", config.mail.transport, config.mail.recipients.len());
    println!("   Timezone:   {}", settings.tz);
    println!("   Offset:     {} day(s)", settings.offset_days);
    println!("   Schedule:   {}", config.reminder.schedule);

    let reference = match date {
        Some(day) => local_noon(&settings, day)?,
        None => Utc::now(),
    };
    let store = lessonbell_scheduler::open_store(&config.store)?;
    let due = engine::preview_at(store.as_ref(), &settings, reference).await?;

    println!(
        "\n📅 {}: {} lesson(s) due",
        reference.with_timezone(&settings.tz).date_naive(),
        due.len()
    );
    for (lesson, message) in &due {
        println!(
            "   {} → {} (Timeline: {})",
            lesson.id,
            message.subject,
            lesson.timeline().unwrap_or_default()
        );
    }
    Ok(())
}

fn import(config: NotifierConfig, file: &str) -> Result<()> {
    if config.store.is_json_file() {
        anyhow::bail!("store uri {} is already a JSON file; import targets SQLite", config.store.uri);
    }
    let uri = config.store.resolved_uri();
    let store = SqliteLessonStore::open(Path::new(&uri), &config.store.database, &config.store.collection)?;
    let source = PathBuf::from(shellexpand::tilde(file).to_string());
    let count = lessonbell_scheduler::import_json(&source, &store)?;
    println!("📥 Imported {count} lesson(s) into {uri} ({}.{})", config.store.database, config.store.collection);
    Ok(())
}

/// Midday on `day` in the configured timezone.
fn local_noon(settings: &BatchSettings, day: NaiveDate) -> Result<DateTime<Utc>> {
    let noon = day
        .and_hms_opt(12, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("invalid date {day}"))?;
    settings
        .tz
        .from_local_datetime(&noon)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| anyhow::anyhow!("{day} has no local noon in {}", settings.tz))
}

//! `herdbook` operator CLI.
//!
//! Cron runs `herdbook reconcile --user <id>` once a day per user; the other
//! subcommands record herd events and inspect derived state.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use herdbook_core::db::Connection;
use herdbook_core::{
    compute_due_dates, core_version, default_log_level, init_logging, open_db, parse_date,
    Animal, BreedingMethod, BreedingRecord, Calving, EngineConfig, NotificationPageQuery,
    NotificationStore, PdResult, ReconcileService, RecordService, Sex,
    SqliteNotificationRepository, SqliteRecordRepository, UserId, CONFIG_PATH_ENV,
};
use chrono::NaiveDate;
use log::info;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "herdbook")]
#[command(about = "Dairy herd reproductive-cycle engine", long_about = None)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, default_value = "herdbook.db")]
    db: PathBuf,

    /// Engine constants JSON; falls back to $HERDBOOK_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for rolling log files; logging is off when absent
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync reminders with one user's breeding history
    Reconcile {
        #[arg(long)]
        user: UserId,
        /// Evaluation date, YYYY-MM-DD (default: today)
        #[arg(long)]
        today: Option<String>,
    },

    /// Print the reproductive status of every animal as JSON lines
    Status {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        today: Option<String>,
    },

    /// Compute PD-check and calving dates for a breeding date
    DueDates {
        #[arg(long)]
        breeding_date: String,
    },

    Notifications {
        #[command(subcommand)]
        cmd: NotificationsCmd,
    },

    Animal {
        #[command(subcommand)]
        cmd: AnimalCmd,
    },

    Breeding {
        #[command(subcommand)]
        cmd: BreedingCmd,
    },

    Calving {
        #[command(subcommand)]
        cmd: CalvingCmd,
    },

    Version,
}

#[derive(Subcommand)]
enum NotificationsCmd {
    /// Print one page of the feed, newest due date first
    List {
        #[arg(long)]
        user: UserId,
        #[arg(long, default_value_t = false)]
        unread: bool,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    MarkRead {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        id: Uuid,
    },

    MarkAllRead {
        #[arg(long)]
        user: UserId,
    },
}

#[derive(Subcommand)]
enum AnimalCmd {
    Add {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        tag: String,
        #[arg(long, value_enum)]
        sex: SexArg,
        #[arg(long)]
        birth_date: Option<String>,
    },
}

#[derive(Subcommand)]
enum BreedingCmd {
    Add {
        #[arg(long)]
        user: UserId,
        /// Dam id
        #[arg(long)]
        animal: i64,
        #[arg(long)]
        date: String,
        #[arg(long, value_enum, default_value_t = MethodArg::Ai)]
        method: MethodArg,
        #[arg(long)]
        sire: Option<i64>,
    },

    /// Record a pregnancy diagnosis
    Pd {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        breeding: i64,
        #[arg(long, value_enum)]
        result: PdArg,
        #[arg(long)]
        date: Option<String>,
    },
}

#[derive(Subcommand)]
enum CalvingCmd {
    Add(CalvingAddArgs),
}

#[derive(Args)]
struct CalvingAddArgs {
    #[arg(long)]
    user: UserId,
    /// Dam id
    #[arg(long)]
    animal: i64,
    #[arg(long)]
    date: String,
    /// Breeding record this calving closes
    #[arg(long)]
    breeding: Option<i64>,
    #[arg(long)]
    calf_tag: Option<String>,
    #[arg(long, value_enum)]
    calf_sex: Option<SexArg>,
    #[arg(long)]
    calf_weight_kg: Option<f64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SexArg {
    Female,
    Male,
}

impl From<SexArg> for Sex {
    fn from(value: SexArg) -> Self {
        match value {
            SexArg::Female => Sex::Female,
            SexArg::Male => Sex::Male,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Natural,
    Ai,
}

impl From<MethodArg> for BreedingMethod {
    fn from(value: MethodArg) -> Self {
        match value {
            MethodArg::Natural => BreedingMethod::Natural,
            MethodArg::Ai => BreedingMethod::ArtificialInsemination,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PdArg {
    Pregnant,
    NotPregnant,
}

impl From<PdArg> for PdResult {
    fn from(value: PdArg) -> Self {
        match value {
            PdArg::Pregnant => PdResult::Pregnant,
            PdArg::NotPregnant => PdResult::NotPregnant,
        }
    }
}

fn main() {
    if let Err(err) = run(Cli::parse()) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Some(dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        let dir = absolute(dir)?;
        init_logging(level, &dir).map_err(|err| anyhow!("{err}"))?;
    }

    match cli.cmd {
        Commands::Version => {
            println!("herdbook {}", core_version());
            Ok(())
        }
        Commands::DueDates { breeding_date } => {
            let config = load_config(cli.config.as_deref())?;
            let record = BreedingRecord::new(0, 0, breeding_date, BreedingMethod::Natural);
            let due = compute_due_dates(&record, &config)?
                .ok_or_else(|| anyhow!("no due dates for this record"))?;
            println!("{}", serde_json::to_string(&due)?);
            Ok(())
        }
        Commands::Reconcile { user, today } => {
            let config = load_config(cli.config.as_deref())?;
            let today = resolve_today(today.as_deref())?;
            let conn = open(&cli.db)?;
            let service = ReconcileService::new(
                SqliteRecordRepository::try_new(&conn)?,
                SqliteNotificationRepository::try_new(&conn)?,
                config,
            );
            let report = service.run_for_user(user, today)?;
            for warning in &report.warnings {
                eprintln!("warning: {} ({})", warning, warning.code());
            }
            println!(
                "inserted={} updated={} unchanged={} flagged={} warnings={}",
                report.inserted,
                report.updated,
                report.unchanged,
                report.flagged,
                report.warnings.len()
            );
            Ok(())
        }
        Commands::Status { user, today } => {
            let config = load_config(cli.config.as_deref())?;
            let today = resolve_today(today.as_deref())?;
            let conn = open(&cli.db)?;
            let service = ReconcileService::new(
                SqliteRecordRepository::try_new(&conn)?,
                SqliteNotificationRepository::try_new(&conn)?,
                config,
            );
            for row in service.herd_statuses(user, today)? {
                println!("{}", serde_json::to_string(&row)?);
            }
            Ok(())
        }
        Commands::Notifications { cmd } => {
            let conn = open(&cli.db)?;
            run_notifications(&conn, cmd)
        }
        Commands::Animal { cmd } => {
            let conn = open(&cli.db)?;
            let service = RecordService::new(SqliteRecordRepository::try_new(&conn)?);
            match cmd {
                AnimalCmd::Add {
                    user,
                    tag,
                    sex,
                    birth_date,
                } => {
                    let mut animal = Animal::new(user, tag, sex.into());
                    animal.birth_date = birth_date;
                    println!("{}", service.register_animal(&animal)?);
                }
            }
            Ok(())
        }
        Commands::Breeding { cmd } => {
            let conn = open(&cli.db)?;
            let service = RecordService::new(SqliteRecordRepository::try_new(&conn)?);
            match cmd {
                BreedingCmd::Add {
                    user,
                    animal,
                    date,
                    method,
                    sire,
                } => {
                    let mut record = BreedingRecord::new(user, animal, date, method.into());
                    record.sire_id = sire;
                    println!("{}", service.record_breeding(&record)?);
                }
                BreedingCmd::Pd {
                    user,
                    breeding,
                    result,
                    date,
                } => {
                    service.record_pd_result(user, breeding, result.into(), date.as_deref())?;
                }
            }
            Ok(())
        }
        Commands::Calving { cmd } => {
            let conn = open(&cli.db)?;
            let service = RecordService::new(SqliteRecordRepository::try_new(&conn)?);
            let CalvingCmd::Add(args) = cmd;
            let mut calving = Calving::new(args.user, args.animal, args.date);
            calving.breeding_id = args.breeding;
            calving.calf_ear_tag = args.calf_tag;
            calving.calf_sex = args.calf_sex.map(Sex::from);
            calving.calf_weight_kg = args.calf_weight_kg;
            let registration = service.register_calving(&calving)?;
            match registration.calf_id {
                Some(calf_id) => println!("{} calf={}", registration.calving_id, calf_id),
                None => println!("{}", registration.calving_id),
            }
            Ok(())
        }
    }
}

fn run_notifications(conn: &Connection, cmd: NotificationsCmd) -> Result<()> {
    let store = SqliteNotificationRepository::try_new(conn)?;
    match cmd {
        NotificationsCmd::List {
            user,
            unread,
            limit,
            offset,
        } => {
            let page = store.list_page(&NotificationPageQuery {
                user_id: user,
                unread_only: unread,
                limit,
                offset,
            })?;
            for notification in page {
                println!("{}", serde_json::to_string(&notification)?);
            }
        }
        NotificationsCmd::MarkRead { user, id } => {
            if !store.mark_read(user, id)? {
                info!("event=notification_mark_read module=cli status=skipped reason=already_read");
            }
        }
        NotificationsCmd::MarkAllRead { user } => {
            println!("{}", store.mark_all_read(user)?);
        }
    }
    Ok(())
}

/// `--config`, then `$HERDBOOK_CONFIG`. There is no built-in default.
fn load_config(flag: Option<&Path>) -> Result<EngineConfig> {
    let path = match flag {
        Some(path) => path.to_path_buf(),
        None => std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("no engine config: pass --config or set {CONFIG_PATH_ENV}"))?,
    };
    let config = EngineConfig::load(&path)?;
    info!(
        "event=config_load module=cli status=ok pd_check_offset_days={} gestation_days={}",
        config.pd_check_offset_days, config.gestation_days
    );
    Ok(config)
}

fn resolve_today(flag: Option<&str>) -> Result<NaiveDate> {
    match flag {
        Some(raw) => parse_date(raw).with_context(|| "invalid --today"),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn open(path: &Path) -> Result<Connection> {
    open_db(path).with_context(|| format!("failed to open database `{}`", path.display()))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("cannot resolve current directory")?;
    Ok(cwd.join(path))
}

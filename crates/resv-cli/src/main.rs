use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use resv_config::{
    load_layered_yaml, report_unused_keys, secrets::resolve_store_secrets, ConfigConsumer,
    LoadedConfig, Settings, StoreBackend, UnusedKeyPolicy,
};
use resv_engine::{summarize_month, EngineConfig, ReservationFilter, ReservationService};
use resv_schemas::{Reservation, ReservationKind};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "resv")]
#[command(about = "Venue booking and distribution reservations CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (base -> env -> local)
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Print the catalog slug for each item name
    Slug {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// List reservations in display order
    List {
        #[arg(long)]
        kind: Option<KindArg>,

        /// YYYY-MM-DD
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Case-insensitive substring of the person name
        #[arg(long)]
        person: Option<String>,

        /// Exact event purpose
        #[arg(long)]
        purpose: Option<String>,
    },

    /// Monthly totals (cancelled reservations excluded from amounts)
    Report {
        #[arg(long)]
        year: i32,

        #[arg(long)]
        month: u32,
    },

    /// Reconcile reservations against ledger entries
    Audit {
        /// Rewrite ledger entries for every repairable finding
        #[arg(long, default_value_t = false)]
        repair: bool,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations.
    Migrate,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Booking,
    Distribution,
}

impl From<KindArg> for ReservationKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Booking => ReservationKind::Booking,
            KindArg::Distribution => ReservationKind::Distribution,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let loaded = load_config(&cli.config_paths)?;
            let settings = settings_of(loaded.as_ref())?;
            let pool = resv_db::connect_from_env(&settings.store.database_url_env).await?;
            match cmd {
                DbCmd::Status => {
                    let s = resv_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_documents_table={}",
                        s.ok, s.has_documents_table
                    );
                }
                DbCmd::Migrate => {
                    resv_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
            let loaded = load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
        Commands::Slug { names } => {
            for name in names {
                println!("{}\t{}", resv_catalog::normalize_to_slug(&name), name);
            }
        }
        Commands::List {
            kind,
            date,
            person,
            purpose,
        } => {
            let svc = open_service(&cli.config_paths).await?;
            let filter = ReservationFilter {
                kind: kind.map(Into::into),
                date,
                person_name: person,
                event_purpose: purpose,
            };
            let snapshot = svc.live_view().snapshot().await?;
            let matched = filter.apply(&snapshot);
            for r in &matched {
                println!("{}", format_row(r));
            }
            println!("count={}", matched.len());
        }
        Commands::Report { year, month } => {
            if !(1..=12).contains(&month) {
                bail!("month must be 1..=12, got {month}");
            }
            let svc = open_service(&cli.config_paths).await?;
            let reservations = svc.list_reservations().await?;
            let s = summarize_month(&reservations, year, month);
            println!("period={:04}-{:02}", s.year, s.month);
            println!("count={}", s.count);
            println!("cancelled={}", s.cancelled);
            println!("total_amount={}", s.total_amount);
            println!("received_amount={}", s.received_amount);
            println!("pending_amount={}", s.pending_amount);
        }
        Commands::Audit { repair } => {
            let svc = open_service(&cli.config_paths).await?;
            let report = svc.audit().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if repair {
                for id in report.repairable_ids() {
                    let fixed = svc.repair_ledger(&id).await?;
                    println!(
                        "repaired reservation_id={} entries_rewritten={} entry_created={}",
                        fixed.reservation_id, fixed.entries_rewritten, fixed.entry_created
                    );
                }
            }
            if !report.is_clean() && !repair {
                bail!(
                    "LEDGER_AUDIT_FINDINGS: {} finding(s); re-run with --repair to fix {} reservation(s)",
                    report.findings.len(),
                    report.repairable_ids().len()
                );
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn load_config(paths: &[String]) -> Result<Option<LoadedConfig>> {
    if paths.is_empty() {
        return Ok(None);
    }
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = load_layered_yaml(&path_refs)?;
    let report = report_unused_keys(
        ConfigConsumer::Cli,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "config has keys the cli does not read");
    }
    Ok(Some(loaded))
}

fn settings_of(loaded: Option<&LoadedConfig>) -> Result<Settings> {
    match loaded {
        Some(cfg) => cfg.settings(),
        None => Ok(Settings::default()),
    }
}

/// Store-backed commands need persistent data; the in-memory backend
/// would always be empty here.
async fn open_service(config_paths: &[String]) -> Result<ReservationService> {
    let loaded = load_config(config_paths)?;
    let settings = settings_of(loaded.as_ref())?;
    if settings.store.backend == StoreBackend::Memory {
        bail!(
            "CLI_STORE_MEMORY: store.backend is memory, which holds nothing between processes; \
             pass --config with store.backend: postgres"
        );
    }
    let config_json = loaded
        .map(|c| c.config_json)
        .context("postgres backend requires a config")?;
    let secrets = resolve_store_secrets(&config_json)?;
    let url = secrets
        .database_url
        .as_deref()
        .with_context(|| format!("env var {} is empty", secrets.database_url_env))?;
    let pool = resv_db::connect(url).await?;
    info!(backend = "postgres", "store opened");

    Ok(ReservationService::with_config(
        Arc::new(resv_db::PgStore::new(pool)),
        EngineConfig {
            max_commit_attempts: settings.engine.max_commit_attempts,
        },
    ))
}

fn format_row(r: &Reservation) -> String {
    let when = match (&r.start_time, &r.end_time) {
        (Some(start), Some(end)) if r.is_booking() => format!("{start}-{end}"),
        _ => "-".to_string(),
    };
    let date = r
        .resource_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}\t{}\t{}\t{}\t{}\ttotal={} received={} pending={}\t{}",
        r.id,
        r.kind.as_str(),
        date,
        when,
        r.status,
        r.total_amount,
        r.received_amount,
        r.pending_amount,
        r.person_name
    )
}

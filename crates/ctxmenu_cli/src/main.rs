//! `ctxmenu` command-line entry point.
//!
//! # Responsibility
//! - Expose catalog inspection, validation and interchange from a shell.
//! - Never touch the registry; every command works on the catalog file.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use ctxmenu_core::{
    init_logging, open_db, AppConfig, AuditSink, ImportExport, ManagerError, MenuStyle,
    SecurityValidator, ShortcutFilter, ShortcutStore, SqliteAuditLog, SqliteShortcutStore,
    TargetType,
};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ctxmenu")]
#[command(author, version, about = "Manage shell context-menu shortcuts")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Catalog database file
    #[arg(long, global = true, default_value = "ctxmenu.db", env = "CTXMENU_DB")]
    db: PathBuf,

    /// Path to config file
    #[arg(short, long, global = true, env = "CTXMENU_CONFIG")]
    config: Option<PathBuf>,

    /// Absolute directory for rolling log files
    #[arg(long, global = true, env = "CTXMENU_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a command string against the security rules
    Validate {
        /// Command template, e.g. `notepad "%1"`
        command: String,
    },

    /// List stored shortcuts in creation order
    List {
        /// Only show one target type (file, folder, background, drive, all)
        #[arg(short, long, value_parser = parse_target)]
        target: Option<TargetType>,

        /// Only show enabled (true) or disabled (false) entries
        #[arg(short, long)]
        enabled: Option<bool>,
    },

    /// Export the catalog as JSON
    Export {
        /// Output file; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Import shortcuts from a JSON export
    Import {
        /// Interchange document to read
        file: PathBuf,
    },

    /// Show recent audit records, newest first
    Audit {
        /// Maximum number of records
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Print the core version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load config `{}`", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(log_dir) = &cli.log_dir {
        init_logging(&config.log_level, log_dir)
            .map_err(|err| anyhow!("failed to initialize logging: {err}"))?;
    }

    match cli.command {
        Commands::Validate { command } => validate(&config, &command),
        Commands::List { target, enabled } => list(&cli.db, &config, target, enabled),
        Commands::Export { out } => export(&cli.db, &config, out),
        Commands::Import { file } => import(&cli.db, &config, &file),
        Commands::Audit { limit } => audit(&cli.db, limit),
        Commands::Version => {
            println!("ctxmenu {}", ctxmenu_core::core_version());
            Ok(())
        }
    }
}

fn parse_target(value: &str) -> std::result::Result<TargetType, String> {
    TargetType::parse(value).ok_or_else(|| {
        format!("unknown target `{value}`; expected file|folder|background|drive|all")
    })
}

fn validator(config: &AppConfig) -> SecurityValidator {
    SecurityValidator::new(config.validator.clone())
}

fn validate(config: &AppConfig, command: &str) -> Result<()> {
    let verdict = validator(config).validate(command);
    match verdict.reason() {
        None => {
            println!("accepted");
            Ok(())
        }
        Some(reason) => bail!("rejected: {reason}"),
    }
}

fn with_catalog<T>(
    db: &Path,
    config: &AppConfig,
    run: impl FnOnce(
        ImportExport<'_, SqliteShortcutStore<'_>, SqliteAuditLog<'_>>,
    ) -> std::result::Result<T, ManagerError>,
) -> Result<T> {
    let conn = open_db(db).with_context(|| format!("failed to open catalog `{}`", db.display()))?;
    let store = SqliteShortcutStore::new(&conn, validator(config));
    let audit = SqliteAuditLog::new(&conn);
    let interchange =
        ImportExport::new(&store, &audit).with_max_entries(config.max_import_count);
    Ok(run(interchange)?)
}

fn list(
    db: &Path,
    config: &AppConfig,
    target_type: Option<TargetType>,
    enabled: Option<bool>,
) -> Result<()> {
    let filter = ShortcutFilter {
        target_type,
        enabled,
    };
    let conn = open_db(db).with_context(|| format!("failed to open catalog `{}`", db.display()))?;
    let entries = SqliteShortcutStore::new(&conn, validator(config)).list(&filter)?;

    if entries.is_empty() {
        println!("No shortcuts stored.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  {:<10} {:<8} {:<8} {}{}",
            entry.id,
            entry.target_type.as_str(),
            entry.applied_state.as_str(),
            if entry.enabled { "enabled" } else { "disabled" },
            entry.name,
            if entry.menu_style == MenuStyle::Modern {
                " [modern]"
            } else {
                ""
            }
        );
        println!("    {}", entry.command);
    }
    Ok(())
}

fn export(db: &Path, config: &AppConfig, out: Option<PathBuf>) -> Result<()> {
    let document = with_catalog(db, config, |interchange| interchange.export_all())?;
    let text = ctxmenu_core::service::interchange::to_json(&document)?;

    match out {
        Some(path) => {
            std::fs::write(&path, text)
                .with_context(|| format!("failed to write `{}`", path.display()))?;
            info!(
                "event=cli_export module=cli status=ok entries={}",
                document.shortcuts.len()
            );
            println!(
                "Exported {} shortcut(s) to {}",
                document.shortcuts.len(),
                path.display()
            );
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn import(db: &Path, config: &AppConfig, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read `{}`", file.display()))?;
    let report = with_catalog(db, config, |interchange| interchange.import_json(&text))?;

    println!(
        "Imported {}, skipped {}",
        report.imported, report.skipped
    );
    for issue in &report.errors {
        println!("  #{} `{}`: {}", issue.index, issue.name, issue.reason);
    }
    Ok(())
}

fn audit(db: &Path, limit: u32) -> Result<()> {
    let conn = open_db(db).with_context(|| format!("failed to open catalog `{}`", db.display()))?;
    let records = SqliteAuditLog::new(&conn).recent(limit)?;

    if records.is_empty() {
        println!("No audit records.");
        return Ok(());
    }
    for record in records {
        let entry = record
            .entry_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<8} {:<7} {}  {}",
            record.timestamp_ms,
            record.operation.as_str(),
            record.outcome.as_str(),
            entry,
            record.detail
        );
    }
    Ok(())
}

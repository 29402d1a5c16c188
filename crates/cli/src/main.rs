// flatwatch CLI - scrape, reconcile and query rental listings

mod exit_codes;
mod fetch;
mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use flatwatch_config::{ConfigError, Settings, MAX_INTERVAL_MINS};
use flatwatch_core::normalize_floor;
use flatwatch_store::{
    export_csv, ExportScope, Filter, ListingField, ListingFilters, ListingStore, RunId, SqliteStore, StorageError,
};
use flatwatch_tracker::{RunError, StartOutcome, Tracker, TrackerOptions};

use exit_codes::{
    run_exit_code, EXIT_CONFIG, EXIT_ERROR, EXIT_EXPORT, EXIT_INVALID_NUMERAL, EXIT_STORAGE, EXIT_SUCCESS, EXIT_USAGE,
};
use fetch::HtmlFetcher;

#[derive(Parser)]
#[command(name = "flatwatch")]
#[command(about = "Track rental listings across scrapes: what is new, what is gone, what came back")]
#[command(version)]
struct Cli {
    /// Config file (default: <config dir>/flatwatch/config.toml)
    #[arg(long, global = true, env = "FLATWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Listing database (overrides [store] path)
    #[arg(long, global = true, env = "FLATWATCH_DB")]
    db: Option<PathBuf>,

    /// More log output on stderr (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only warnings and errors on stderr
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape all result pages once, reconcile and store
    #[command(after_help = "\
Examples:
  flatwatch run
  flatwatch run --json
  flatwatch run --max-pages 2 --no-descriptions")]
    Run {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,

        /// Stop after N result pages (overrides source.max_pages)
        #[arg(long)]
        max_pages: Option<u32>,

        /// Skip detail-page description fetches
        #[arg(long)]
        no_descriptions: bool,
    },

    /// Run on a timer until interrupted
    #[command(after_help = "\
Examples:
  flatwatch watch
  flatwatch watch --interval-mins 30")]
    Watch {
        /// Minutes between runs (default: run.interval_mins)
        #[arg(long)]
        interval_mins: Option<u64>,

        /// Stop after N runs
        #[arg(long)]
        max_runs: Option<u32>,
    },

    /// List stored listings
    #[command(after_help = "\
Examples:
  flatwatch list
  flatwatch list --where floor~ground
  flatwatch list --where rooms=2.0 --where price~5
  flatwatch list --all --json")]
    List {
        /// Filter, repeatable and AND-combined: FIELD~TEXT (contains) or FIELD=TEXT (equals).
        /// Fields: url, price, area, rooms, floor, max_floor, description
        #[arg(long = "where", value_name = "EXPR")]
        filters: Vec<String>,

        /// Include removed listings
        #[arg(long)]
        all: bool,

        #[arg(long)]
        json: bool,
    },

    /// Listings first added by a run or any later run
    New {
        /// Run id (see `flatwatch status`)
        #[arg(long)]
        since_run: RunId,

        #[arg(long)]
        json: bool,
    },

    /// Listings added, removed or reactivated on or after a date
    Changed {
        /// YYYY-MM-DD
        #[arg(long)]
        since: String,

        #[arg(long)]
        json: bool,
    },

    /// Distinct values of a field among active listings
    Values {
        /// url, price, area, rooms, floor, max_floor or description
        field: String,

        #[arg(long)]
        json: bool,
    },

    /// Lifecycle history of one listing
    History {
        url: String,

        #[arg(long)]
        json: bool,
    },

    /// Last run and listing counts
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Export listings to CSV
    Export {
        /// Output file
        out: PathBuf,

        /// Include removed listings
        #[arg(long)]
        all: bool,
    },

    /// Normalize a scraped floor value (e.g. "IV/6", "VPR")
    Floor { raw: String },

    /// Show or create the config file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the config file path
    Path,
    /// Print the effective settings as TOML
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn config(err: ConfigError) -> Self {
        let hint = match &err {
            ConfigError::Parse { .. } | ConfigError::Validation(_) => {
                Some("check the file with `flatwatch config show`, or recreate it with `flatwatch config init --force`".to_string())
            }
            _ => None,
        };
        Self { code: EXIT_CONFIG, message: err.to_string(), hint }
    }

    pub fn storage(err: StorageError) -> Self {
        let hint = match &err {
            StorageError::Incompatible { .. } => Some("this database was written by a newer flatwatch".to_string()),
            StorageError::Open { .. } => Some("set [store] path in the config or pass --db".to_string()),
            _ => None,
        };
        Self { code: EXIT_STORAGE, message: err.to_string(), hint }
    }

    pub fn run(err: RunError) -> Self {
        let hint = match &err {
            RunError::AlreadyRunning => Some("wait for the current run to finish".to_string()),
            RunError::Fetch(_) => Some("nothing was stored; the next run starts from the last good state".to_string()),
            RunError::Storage(_) => None,
        };
        Self { code: run_exit_code(&err), message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Run { json, max_pages, no_descriptions } => cmd_run(&cli, *json, *max_pages, *no_descriptions),
        Commands::Watch { interval_mins, max_runs } => cmd_watch(&cli, *interval_mins, *max_runs),
        Commands::List { filters, all, json } => cmd_list(&cli, filters, *all, *json),
        Commands::New { since_run, json } => cmd_new(&cli, *since_run, *json),
        Commands::Changed { since, json } => cmd_changed(&cli, since, *json),
        Commands::Values { field, json } => cmd_values(&cli, field, *json),
        Commands::History { url, json } => cmd_history(&cli, url, *json),
        Commands::Status { json } => cmd_status(&cli, *json),
        Commands::Export { out, all } => cmd_export(&cli, out, *all),
        Commands::Floor { raw } => cmd_floor(raw),
        Commands::Config(ConfigCommands::Path) => cmd_config_path(&cli),
        Commands::Config(ConfigCommands::Show) => cmd_config_show(&cli),
        Commands::Config(ConfigCommands::Init { force }) => cmd_config_init(&cli, *force),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_secs()
        .init();
}

// ============================================================================
// Setup helpers
// ============================================================================

fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(Settings::config_path)
}

fn load_settings(cli: &Cli) -> Result<Settings, CliError> {
    Settings::load_or_default(Some(config_path(cli).as_path())).map_err(CliError::config)
}

fn open_store(cli: &Cli, settings: &Settings) -> Result<SqliteStore, CliError> {
    let path = cli.db.clone().unwrap_or_else(|| settings.store_path());
    SqliteStore::open(&path).map_err(CliError::storage)
}

fn build_tracker(
    cli: &Cli,
    max_pages: Option<u32>,
    no_descriptions: bool,
) -> Result<Tracker<HtmlFetcher, SqliteStore>, CliError> {
    let settings = load_settings(cli)?;
    let store = open_store(cli, &settings)?;
    let fetcher = HtmlFetcher::new(&settings.source, &settings.selectors)
        .map_err(|msg| CliError { code: EXIT_CONFIG, message: msg, hint: None })?;
    let options = TrackerOptions {
        max_pages: max_pages.or(settings.source.max_pages),
        fetch_descriptions: settings.run.fetch_descriptions && !no_descriptions,
        today: None,
    };
    Ok(Tracker::new(fetcher, store, options))
}

fn parse_field(name: &str) -> Result<ListingField, CliError> {
    name.parse::<ListingField>().map_err(|e| CliError::args(e.to_string()))
}

fn parse_filters(exprs: &[String]) -> Result<ListingFilters, CliError> {
    let mut filters = ListingFilters::new();
    for expr in exprs {
        let filter: Filter = expr
            .parse()
            .map_err(|e| CliError::args(format!("--where '{expr}': {e}")).with_hint("e.g. --where floor~ground"))?;
        filters = filters.with(filter);
    }
    Ok(filters)
}

fn parse_date(s: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| CliError::args(format!("invalid date '{s}': {e} (expected YYYY-MM-DD)")))
}

// ============================================================================
// run / watch
// ============================================================================

fn cmd_run(cli: &Cli, json: bool, max_pages: Option<u32>, no_descriptions: bool) -> Result<(), CliError> {
    let tracker = build_tracker(cli, max_pages, no_descriptions)?;
    let report = tracker.run_now().map_err(CliError::run)?;
    if json {
        output::print_json(&report)
    } else {
        output::print_report(&report);
        Ok(())
    }
}

fn cmd_watch(cli: &Cli, interval_mins: Option<u64>, max_runs: Option<u32>) -> Result<(), CliError> {
    let interval = match interval_mins {
        Some(m) if m == 0 || m > MAX_INTERVAL_MINS => {
            return Err(CliError::args(format!("--interval-mins must be between 1 and {MAX_INTERVAL_MINS}")))
        }
        Some(m) => m,
        None => load_settings(cli)?.run.interval_mins,
    };
    let tracker = build_tracker(cli, None, false)?;
    log::info!("watching every {interval} min");

    let mut runs = 0u32;
    loop {
        match tracker.start_run() {
            StartOutcome::Started(handle) => match handle.join() {
                Ok(report) => output::print_report(&report),
                Err(e) => log::error!("run failed: {e}"),
            },
            StartOutcome::AlreadyRunning => log::warn!("another run is active on this store, skipping"),
        }
        runs += 1;
        if max_runs.is_some_and(|max| runs >= max) {
            return Ok(());
        }
        thread::sleep(Duration::from_secs(interval.saturating_mul(60)));
    }
}

// ============================================================================
// Queries
// ============================================================================

fn cmd_list(cli: &Cli, exprs: &[String], all: bool, json: bool) -> Result<(), CliError> {
    let filters = parse_filters(exprs)?;
    let store = open_store(cli, &load_settings(cli)?)?;
    let records = if all {
        let mut records = store.get_all().map_err(CliError::storage)?;
        records.retain(|r| filters.matches(r));
        records
    } else {
        store.list_active(&filters).map_err(CliError::storage)?
    };
    if json {
        output::print_json(&records)
    } else {
        output::print_listings(&records);
        Ok(())
    }
}

fn cmd_new(cli: &Cli, since_run: RunId, json: bool) -> Result<(), CliError> {
    let store = open_store(cli, &load_settings(cli)?)?;
    let records = store.list_new(since_run).map_err(CliError::storage)?;
    if json {
        output::print_json(&records)
    } else {
        output::print_listings(&records);
        Ok(())
    }
}

fn cmd_changed(cli: &Cli, since: &str, json: bool) -> Result<(), CliError> {
    let date = parse_date(since)?;
    let store = open_store(cli, &load_settings(cli)?)?;
    let records = store.get_changed_since(date).map_err(CliError::storage)?;
    if json {
        output::print_json(&records)
    } else {
        output::print_listings(&records);
        Ok(())
    }
}

fn cmd_values(cli: &Cli, field: &str, json: bool) -> Result<(), CliError> {
    let field = parse_field(field)?;
    let store = open_store(cli, &load_settings(cli)?)?;
    let values = store.distinct_values(field).map_err(CliError::storage)?;
    if json {
        return output::print_json(&values);
    }
    for v in &values {
        println!("{v}");
    }
    Ok(())
}

fn cmd_history(cli: &Cli, url: &str, json: bool) -> Result<(), CliError> {
    let store = open_store(cli, &load_settings(cli)?)?;
    let entries = store.history(url).map_err(CliError::storage)?;
    if json {
        output::print_json(&entries)
    } else {
        output::print_history(&entries);
        Ok(())
    }
}

#[derive(serde::Serialize)]
struct StatusOutput {
    active: usize,
    removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_run: Option<flatwatch_store::RunRecord>,
}

fn cmd_status(cli: &Cli, json: bool) -> Result<(), CliError> {
    let store = open_store(cli, &load_settings(cli)?)?;
    let all = store.get_all().map_err(CliError::storage)?;
    let active = all.iter().filter(|r| r.is_active()).count();
    let status = StatusOutput {
        active,
        removed: all.len() - active,
        last_run: store.last_run().map_err(CliError::storage)?,
    };
    if json {
        return output::print_json(&status);
    }
    println!("listings:  {} active, {} removed", status.active, status.removed);
    match &status.last_run {
        Some(run) => output::print_run(run),
        None => println!("last run:  never"),
    }
    Ok(())
}

fn cmd_export(cli: &Cli, out: &Path, all: bool) -> Result<(), CliError> {
    let store = open_store(cli, &load_settings(cli)?)?;
    let scope = if all { ExportScope::All } else { ExportScope::Active };
    let n = export_csv(&store, out, scope).map_err(|e| match e {
        StorageError::Io(msg) => CliError { code: EXIT_EXPORT, message: format!("{}: {msg}", out.display()), hint: None },
        other => CliError::storage(other),
    })?;
    println!("wrote {n} listing(s) to {}", out.display());
    Ok(())
}

fn cmd_floor(raw: &str) -> Result<(), CliError> {
    let normalized = normalize_floor(raw).map_err(|e| CliError {
        code: EXIT_INVALID_NUMERAL,
        message: e.to_string(),
        hint: Some("floors are roman numerals (I..MMMCMXCIX), PR/VPR, optionally /<max floor>".to_string()),
    })?;
    println!("{normalized}");
    Ok(())
}

// ============================================================================
// config
// ============================================================================

fn cmd_config_path(cli: &Cli) -> Result<(), CliError> {
    println!("{}", config_path(cli).display());
    Ok(())
}

fn cmd_config_show(cli: &Cli) -> Result<(), CliError> {
    let settings = load_settings(cli)?;
    print!("{}", settings.to_toml().map_err(CliError::config)?);
    Ok(())
}

fn cmd_config_init(cli: &Cli, force: bool) -> Result<(), CliError> {
    let path = config_path(cli);
    if path.exists() && !force {
        return Err(CliError::args(format!("{} already exists", path.display())).with_hint("pass --force to overwrite"));
    }
    Settings::default().save(&path).map_err(CliError::config)?;
    println!("wrote {}", path.display());
    Ok(())
}

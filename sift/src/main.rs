use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use normalize::{dedup, identify};
use parsers::ParserRegistry;
use pipeline::Pipeline;
use reliability_sqlite::SqliteStore;
use sift_core::config::load_config;
use sift_core::PipelineConfig;
use tracing::{info, warn};

mod input;
mod output;

use output::{FingerprintRow, OutputFormat};

const DEFAULT_DB: &str = "sift.db";

#[derive(Debug, Parser)]
#[command(name = "sift", version, about = "Normalize, deduplicate and probe proxy connection strings")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./sift.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Trace-level logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct InputArgs {
    /// Files with newline-delimited connection strings (# comments and blanks ignored)
    #[arg(long, value_name = "FILE")]
    input: Vec<PathBuf>,
    /// Also read connection strings from stdin
    #[arg(long, default_value_t = false)]
    stdin: bool,
}

#[derive(Debug, Args)]
struct FilterArgs {
    /// Keep only these protocols (repeatable)
    #[arg(long = "include-protocol", value_name = "P")]
    include_protocols: Vec<String>,
    /// Drop these protocols (repeatable)
    #[arg(long = "exclude-protocol", value_name = "P")]
    exclude_protocols: Vec<String>,
    /// Keep only strings containing one of these substrings (case-insensitive)
    #[arg(long = "include", value_name = "PAT")]
    include_patterns: Vec<String>,
    /// Drop strings containing any of these substrings (case-insensitive)
    #[arg(long = "exclude", value_name = "PAT")]
    exclude_patterns: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Dedup, probe and score connection strings
    Run {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        filters: FilterArgs,
        /// Reliability database
        #[arg(long, value_name = "PATH", default_value = DEFAULT_DB)]
        db: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Output file (overwrites). Stdout if omitted.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Max concurrent probes
        #[arg(long)]
        concurrency: Option<usize>,
        /// Connect timeout per probe in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Probes per second per target address
        #[arg(long)]
        rate: Option<f64>,
        /// Skip geolocation lookups
        #[arg(long, default_value_t = false)]
        no_geo: bool,
        /// Abandon probes still running after this many milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,
    },
    /// Print the connection strings that survive dedup and filtering
    Dedup {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Show protocol, canonical form and fingerprint of each string
    Fingerprint {
        raw: Vec<String>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// List stored reliability records, most recently tested first
    History {
        #[arg(long, value_name = "PATH", default_value = DEFAULT_DB)]
        db: PathBuf,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "trace" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn base_config(path: Option<&Path>) -> Result<PipelineConfig> {
    Ok(load_config(path)?.unwrap_or_default())
}

fn apply_filters(cfg: &mut PipelineConfig, f: FilterArgs) {
    cfg.include_protocols.extend(f.include_protocols);
    cfg.exclude_protocols.extend(f.exclude_protocols);
    cfg.include_patterns.extend(f.include_patterns);
    cfg.exclude_patterns.extend(f.exclude_patterns);
}

fn read_input(args: &InputArgs) -> Result<Vec<sift_core::RawConnection>> {
    if args.input.is_empty() && !args.stdin {
        return Err(anyhow!("provide --input <FILE> or --stdin"));
    }
    input::read_inputs(args.input.as_slice(), args.stdin)
}

fn open_output(out: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match out {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(path)
                .with_context(|| format!("creating {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            println!("sift {} (core {})", env!("CARGO_PKG_VERSION"), sift_core::version());
        }
        Commands::Run { input, filters, db, format, out, concurrency, timeout_ms, rate, no_geo, deadline_ms } => {
            let mut cfg = base_config(cli.config.as_deref())?;
            apply_filters(&mut cfg, filters);
            if let Some(c) = concurrency {
                cfg.concurrency_limit = c;
            }
            if let Some(t) = timeout_ms {
                cfg.probe_timeout_ms = t;
            }
            if let Some(r) = rate {
                cfg.rate_limit = r;
            }
            if deadline_ms.is_some() {
                cfg.batch_deadline_ms = deadline_ms;
            }
            if no_geo {
                cfg.geo.enabled = false;
            }
            cfg.validate()?;

            let entries = read_input(&input)?;
            let store = Arc::new(
                SqliteStore::open_or_create(&db).with_context(|| format!("opening reliability db {}", db.display()))?,
            );
            let pipeline = Pipeline::new(cfg, store.clone()).with_ledger(store);
            let rt = tokio::runtime::Runtime::new()?;
            let report = rt.block_on(pipeline.run(entries))?;

            for w in &report.warnings {
                warn!("{w}");
            }
            let mut w = open_output(out.as_deref())?;
            output::write_report(&mut w, &report, format)?;
            w.flush()?;
            info!("{}", output::summary(&report));
        }
        Commands::Dedup { input, filters } => {
            let mut cfg = base_config(cli.config.as_deref())?;
            apply_filters(&mut cfg, filters);
            let filters = cfg.validate()?;
            let entries = read_input(&input)?;
            let registry = ParserRegistry::with_builtin_parsers(cfg.max_payload_bytes);
            let outcome = dedup(&entries, &filters, &registry);
            let mut w = open_output(None)?;
            for c in &outcome.kept {
                writeln!(w, "{}", c.raw)?;
            }
            w.flush()?;
            info!(kept = outcome.stats.kept, dropped = outcome.stats.dropped(), "dedup done");
        }
        Commands::Fingerprint { raw, format } => {
            let cfg = base_config(cli.config.as_deref())?;
            let registry = ParserRegistry::with_builtin_parsers(cfg.max_payload_bytes);
            let rows: Vec<FingerprintRow> = raw
                .iter()
                .map(|r| match identify(r, "", &registry) {
                    Some(c) => FingerprintRow {
                        raw: c.raw.clone(),
                        protocol: Some(c.protocol),
                        fingerprint: Some(c.fingerprint),
                        canonical: Some(c.canonical.to_string()),
                        error: c.parsed.err().map(|e| e.to_string()),
                    },
                    None => FingerprintRow { raw: r.clone(), protocol: None, fingerprint: None, canonical: None, error: None },
                })
                .collect();
            let mut w = open_output(None)?;
            output::write_fingerprints(&mut w, &rows, format)?;
            w.flush()?;
        }
        Commands::History { db, limit, format } => {
            if !db.exists() {
                return Err(anyhow!("no reliability database at {}", db.display()));
            }
            let store = SqliteStore::open_or_create(&db)?;
            let records = store.history(limit)?;
            let mut w = open_output(None)?;
            output::write_history(&mut w, &records, format)?;
            w.flush()?;
        }
    }
    Ok(())
}

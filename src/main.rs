//! Index Analyzer CLI
//!
//! Command-line interface for index diagnostics:
//! - Analyze chunk fragmentation of a table
//! - List the tenants of a table
//! - Print the default configuration or the active overrides

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use index_analyzer::config::{generate_default_config, Config, LoggingConfig};
use index_analyzer::{AnalysisResult, LabelMatcher, LocalIndexShipper, Report, ScanContext, TableDriver};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "index-analyzer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fragmentation and sizing diagnostics for series chunk indexes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Root directory holding one subdirectory per table
    #[arg(long, global = true)]
    pub data_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze chunk fragmentation of one table
    Analyze {
        /// Table to scan
        #[arg(short, long)]
        table: String,
        /// Tenant to scan (repeatable; default: every tenant in the table)
        #[arg(long = "tenant")]
        tenant: Vec<String>,
        /// Comma-separated tenants to scan
        #[arg(long, value_delimiter = ',')]
        tenants: Vec<String>,
        /// Only scan series matching this selector, e.g. 'app="api"'
        #[arg(short, long)]
        matcher: Option<String>,
        /// Expected spacing between samples (ms)
        #[arg(long)]
        downsample_period_ms: Option<i64>,
        /// Stop each index walk after this many series
        #[arg(long)]
        series_limit: Option<usize>,
        /// Disable per-chunk trace lines
        #[arg(long)]
        no_trace: bool,
        /// Report format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List tenants owning indexes in a table
    Tenants {
        /// Table to inspect
        #[arg(short, long)]
        table: String,
    },

    /// Print the default config file, or the loaded config's overrides
    Config {
        /// Show only values that differ from the defaults
        #[arg(long)]
        diff: bool,
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default()?,
    };
    if let Some(data_dir) = &cli.data_dir {
        config.index.data_dir = data_dir.clone();
    }

    match cli.command {
        Commands::Analyze {
            table,
            tenant,
            tenants,
            matcher,
            downsample_period_ms,
            series_limit,
            no_trace,
            format,
        } => {
            if let Some(period) = downsample_period_ms {
                config.analysis.downsample_period_ms = period;
            }
            if series_limit.is_some() {
                config.analysis.series_limit = series_limit;
            }
            if no_trace {
                config.analysis.trace_chunks = false;
            }
            config.validate()?;
            init_logging(&config.logging)?;

            let matcher = match matcher.as_deref() {
                Some(text) => LabelMatcher::parse(text)
                    .with_context(|| format!("invalid --matcher {:?}", text))?,
                None => LabelMatcher::match_all(),
            };

            let mut requested: Vec<String> = Vec::new();
            for name in tenant.into_iter().chain(tenants) {
                if !name.is_empty() && !requested.contains(&name) {
                    requested.push(name);
                }
            }

            let report = analyze(config, table, requested, matcher).await?;
            match format {
                OutputFormat::Text => println!("{}", report),
                OutputFormat::Json => println!("{}", report.to_json_pretty()?),
            }
        }

        Commands::Tenants { table } => {
            config.validate()?;
            init_logging(&config.logging)?;

            let shipper = LocalIndexShipper::new(expand_home(&config.index.data_dir));
            let driver = TableDriver::new(&shipper, config.analysis.clone());
            for tenant in driver.discover_tenants(&table)? {
                println!("{}", tenant);
            }
        }

        Commands::Config { diff, output } => {
            let content = if diff {
                config.render_diff()?
            } else {
                generate_default_config()
            };

            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    eprintln!("Config written to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

/// Run the scan on a blocking thread; Ctrl-C cancels it
async fn analyze(
    config: Config,
    table: String,
    requested: Vec<String>,
    matcher: LabelMatcher,
) -> anyhow::Result<Report> {
    let ctx = ScanContext::new();
    let scan_ctx = ctx.clone();
    let data_dir = expand_home(&config.index.data_dir);
    tracing::info!("Data directory: {:?}", data_dir);

    let mut scan = tokio::task::spawn_blocking(move || -> AnalysisResult<Report> {
        let shipper = LocalIndexShipper::new(data_dir);
        let driver = TableDriver::new(&shipper, config.analysis).with_matcher(matcher);
        let tenants = if requested.is_empty() {
            driver.discover_tenants(&table)?
        } else {
            requested
        };
        driver.run(&scan_ctx, &table, &tenants)
    });

    let report = tokio::select! {
        joined = &mut scan => joined??,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, cancelling scan");
            ctx.cancel();
            scan.await??
        }
    };

    Ok(report)
}

/// Install the tracing subscriber; RUST_LOG wins over the configured level
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid log level {:?}", config.level))?;

    let writer = match &config.file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(config.file.is_none());

    if config.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| Path::new(path).to_path_buf()),
        None => PathBuf::from(path),
    }
}

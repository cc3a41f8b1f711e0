//! CLI entry point for `mboxbook`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mboxbook::book::group::GroupingStrategy;
use mboxbook::book::render::OutputFormat;
use mboxbook::config::{self, Config};
use mboxbook::pipeline::{build_book, BookRequest, RunReport};

#[derive(Parser)]
#[command(
    name = "mboxbook",
    version,
    about = "Turn an MBOX archive of your correspondence into a print-ready book document"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to $MBOXBOOK_CONFIG, then the user config dir)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a book document from an MBOX archive
    Build {
        /// Book title, shown on the front page
        #[arg(long)]
        title: String,
        /// Book author, shown on the front page
        #[arg(long)]
        author: String,
        /// MBOX archive to read
        #[arg(long, value_name = "FILE")]
        mbox: PathBuf,
        /// Output file (defaults to "<title>.html" or "<title>.json")
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Layout style; selects <stylesheet_dir>/<style>.css
        #[arg(long, value_name = "STYLE")]
        style: Option<String>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Html)]
        format: OutputFormat,
        /// Chapter grouping strategy
        #[arg(long, value_enum)]
        grouping: Option<GroupingStrategy>,
        /// Quote lines needed after a reply header to strip it
        #[arg(long, value_name = "N")]
        min_quote_run: Option<usize>,
        /// Worker threads (0 = one per core)
        #[arg(long, value_name = "N")]
        threads: Option<usize>,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    let (config, config_error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);
    if let Some(e) = config_error {
        tracing::warn!(error = %format!("{e:#}"), "Using default configuration");
    }

    match cli.command {
        Commands::Build {
            title,
            author,
            mbox,
            output,
            style,
            format,
            grouping,
            min_quote_run,
            threads,
            json,
        } => {
            let mut config = config;
            if let Some(style) = style {
                config.book.layout = style;
            }
            if let Some(grouping) = grouping {
                config.book.grouping = grouping;
            }
            if let Some(min) = min_quote_run {
                config.quotes.min_quote_run = min;
            }
            if let Some(threads) = threads {
                config.performance.threads = threads;
            }
            let request = BookRequest {
                title,
                author,
                mbox,
                output,
                format,
            };
            cmd_build(&request, &config, json)
        }
        Commands::InitConfig { force } => cmd_init_config(cli.config, force),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_file = config::log_file_path(config);
    let log_dir = config::cache_dir(config);
    let file_name = log_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "mboxbook.log".into());

    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Build the book and print the run report.
fn cmd_build(request: &BookRequest, config: &Config, json: bool) -> anyhow::Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} Reading messages {pos} ({elapsed})")
            .context("invalid progress template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let start = Instant::now();
    let result = build_book(
        request,
        config,
        Some(&|done| {
            pb.set_position(done);
        }),
    );
    pb.finish_and_clear();

    let report = result.with_context(|| format!("Cannot build book from {}", request.mbox.display()))?;
    let elapsed = start.elapsed();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report_table(&report, elapsed);
    }
    Ok(())
}

/// Print the run report in a human-readable table.
fn print_report_table(report: &RunReport, elapsed: Duration) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<22} {}", "Archive", report.archive.display());
    println!("  {:<22} {}", "Entries seen", report.entries_seen);
    println!("  {:<22} {}", "Skipped (malformed)", report.skipped_malformed);
    println!("  {:<22} {}", "Messages assembled", report.messages_assembled);
    println!("  {:<22} {}", "Chapters", report.chapters);
    println!("  {:<22} {}", "Quotes stripped", report.stripped_quotes);
    if report.date_fallbacks > 0 {
        println!("  {:<22} {}", "Envelope dates used", report.date_fallbacks);
    }
    if report.encoding_failures > 0 {
        println!("  {:<22} {}", "Encoding failures", report.encoding_failures);
    }
    if report.unresolved_images > 0 {
        println!("  {:<22} {}", "Unresolved images", report.unresolved_images);
    }
    println!(
        "  {:<22} {}",
        "Output size",
        format_size(report.output_bytes, BINARY)
    );
    println!("  {:<22} {}", "Output file", report.output.display());
    println!("  {:<22} {:.2?}", "Time", elapsed);
    println!();
}

/// Write a default config to `--config`, or to the standard location.
fn cmd_init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path
        .or_else(config::config_file_path)
        .context("Could not determine config file path")?;
    if path.exists() && !force {
        anyhow::bail!(
            "Config file {} already exists (use --force to overwrite)",
            path.display()
        );
    }
    config::save_config(&Config::default(), &path)?;
    println!("{}", path.display());
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mboxbook", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

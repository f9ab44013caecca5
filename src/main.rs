//! CLI entry point for `mailatt`.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use mailatt::config::{self, Cfg};
use mailatt::fetch::watermark::StateFile;
use mailatt::fetch::{FetchEngine, FetchEvent, FetchOptions, FetchSummary};
use mailatt::store;

/// Fetch mail attachments into a directory tree, resuming where the last run stopped.
#[derive(Parser)]
#[command(name = "mailatt", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (defaults to $MAILATT_CONFIG, then the user config dir)
    #[arg(short = 'c', long = "conf", value_name = "FILE")]
    conf: Option<std::path::PathBuf>,

    /// Print no progress lines
    #[arg(short, long)]
    quiet: bool,

    /// Dry run: report what would be downloaded, keep the watermark
    #[arg(short, long)]
    test: bool,

    /// Forget the last downloaded date before running
    #[arg(short, long)]
    reset: bool,

    /// Print message envelopes and body structure instead of fetching
    #[arg(short, long)]
    dump: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log level (error, warn, info, debug, trace); overrides general.log.level
    #[arg(short = 'l', long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
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

    match &cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(*shell),
        Some(Commands::Manpage) => return cmd_manpage(),
        None => {}
    }

    let Some(config_path) = config::config_file_path(cli.conf.as_deref()) else {
        anyhow::bail!("No configuration file given and no config directory available");
    };
    if !config_path.exists() {
        anyhow::bail!("Configuration file not found: {}", config_path.display());
    }
    let cfg = Cfg::load(&config_path)?;

    let log_level = match cli.verbose {
        0 => cli
            .log_level
            .clone()
            .unwrap_or_else(|| cfg.get_or("general.log.level", "warn").to_string()),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level);
    for (key, value) in cfg.iter() {
        let shown = if key.ends_with("password") { "****" } else { value };
        tracing::debug!("config {key} = {shown}");
    }

    if !cli.quiet && !cli.json {
        println!("  Using configuration {}", config_path.display());
    }

    let state = StateFile::new(config::state_file_path(&cfg, &config::config_name(&config_path)));
    if cli.reset {
        let removed = state.reset()?;
        if !cli.quiet && removed {
            println!("  Removed state file {}", state.path().display());
        }
    }

    let start = Instant::now();
    if cli.dump {
        cmd_dump(&cfg)?;
    } else {
        cmd_fetch(&cli, &cfg, state)?;
    }

    if !cli.quiet && !cli.json {
        println!("  {:<20} {:.2?}", "Completed in", start.elapsed());
    }
    Ok(())
}

/// Run one incremental fetch.
fn cmd_fetch(cli: &Cli, cfg: &Cfg, mut state: StateFile) -> anyhow::Result<()> {
    // Every configuration problem surfaces before the mailbox is contacted.
    let mut options = FetchOptions::from_config(cfg)?;
    options.dry_run = cli.test;

    let mut mailbox = store::connect(cfg).context("Could not open the mailbox")?;
    let mut engine = FetchEngine::new(options);

    let pb = if cli.quiet || cli.json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .expect("valid template"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    };

    let quiet = cli.quiet || cli.json;
    let summary = engine.run(mailbox.as_mut(), &mut state, Utc::now(), &mut |event| {
        if !quiet {
            report(&pb, event)
        }
    })?;
    pb.finish_and_clear();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !cli.quiet {
        print_summary(&summary, state.path());
    }
    Ok(())
}

/// Print the folder structure instead of fetching.
fn cmd_dump(cfg: &Cfg) -> anyhow::Result<()> {
    let limit = cfg.int_or("process.mail.limit", 0)?;
    let mut mailbox = store::connect(cfg).context("Could not open the mailbox")?;
    let stdout = std::io::stdout();
    let printed = mailatt::dump::dump_folder(
        mailbox.as_mut(),
        store::folder_name(cfg),
        usize::try_from(limit).unwrap_or(0),
        &mut stdout.lock(),
    )?;
    tracing::info!(messages = printed, "Dump finished");
    Ok(())
}

/// Print a line on stdout without tearing the spinner.
fn say(pb: &ProgressBar, line: String) {
    pb.suspend(|| println!("{line}"));
}

/// Turn engine events into progress lines.
fn report(pb: &ProgressBar, event: FetchEvent<'_>) {
    match event {
        FetchEvent::RangeResolved(range) => say(pb, format!("  Fetching {range}")),
        FetchEvent::FolderOpened {
            folder,
            listed,
            visiting,
        } => say(pb, format!("  {folder}: {listed} message(s), visiting {visiting}")),
        FetchEvent::Message {
            position,
            visiting,
            envelope,
            matched,
        } => {
            pb.set_message(format!("[{position}/{visiting}] {}", envelope.subject));
            if matched {
                let from = envelope
                    .first_sender()
                    .map(|a| a.display())
                    .unwrap_or_default();
                say(pb, format!(
                    "  {} {} | {}",
                    envelope.received.format("%Y-%m-%d %H:%M"),
                    from,
                    envelope.subject
                ));
            }
        }
        FetchEvent::Downloaded { path, size } => say(pb, format!(
            "    saved {} ({})",
            path.display(),
            format_size(size, BINARY)
        )),
        FetchEvent::WouldDownload { path, size } => say(pb, format!(
            "    would save {} ({})",
            path.display(),
            format_size(size, BINARY)
        )),
        FetchEvent::Skipped { path } => say(pb, format!("    unchanged {}", path.display())),
        FetchEvent::MessageFailed { error, .. } => say(pb, format!("    failed: {error}")),
    }
}

fn print_summary(summary: &FetchSummary, state_path: &Path) {
    println!();
    println!("  {:<20} {}", "Folder", summary.folder);
    println!("  {:<20} {}", "Range", summary.range);
    println!("  {:<20} {} of {}", "Visited", summary.visited, summary.listed);
    println!("  {:<20} {}", "Matched", summary.matched);
    let verb = if summary.dry_run { "Would download" } else { "Downloaded" };
    println!("  {:<20} {}", verb, summary.downloaded);
    println!("  {:<20} {}", "Unchanged", summary.skipped);
    println!("  {:<20} {}", "Filtered out", summary.filtered);
    if summary.failed_messages + summary.failed_attachments > 0 {
        println!(
            "  {:<20} {} message(s), {} attachment(s)",
            "Failed", summary.failed_messages, summary.failed_attachments
        );
    }
    match summary.watermark {
        Some(w) => println!(
            "  {:<20} {} ({})",
            "Last download",
            w.format("%Y-%m-%d %H:%M:%S"),
            state_path.display()
        ),
        None => println!("  {:<20} none", "Last download"),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir();
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailatt.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailatt", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let man = clap_mangen::Man::new(Cli::command());
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

//! diskcloner - Clone block devices with verification and safe cancellation.
//!
//! Usage:
//!   diskcloner list                   List attached disks
//!   diskcloner clone SOURCE DEST      Clone SOURCE onto DEST
//!   diskcloner simulate               Dry run against in-memory disks
//!   diskcloner --help                 Show help

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use diskcloner_core::{
    ApplicationLog, CloneConfig, DiskInfo, JsonLogExporter, LogEntry, LogExporter, LogLevel,
    OperationOutcome, OperationRequest, Phase, TextLogExporter, full_log_path, session_log_path,
};
use diskcloner_ops::{
    FaultPlan, FileEngine, MemoryEngine, OperationController, OperationEvent, TransferEngine,
};
use diskcloner_scan::{DiskEnumerator, LsblkEnumerator, StaticEnumerator};

/// Exit code after an interrupt, as a shell reports SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "diskcloner",
    version,
    about = "Clone block devices with verification and safe cancellation",
    long_about = "diskcloner copies one block device (or image file) onto another in \
                  fixed-size chunks, optionally verifies the result, and stops cleanly \
                  at the next chunk boundary when interrupted with Ctrl-C."
)]
struct Cli {
    /// Config file (defaults to <config dir>/diskcloner/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List attached disks
    List {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Seconds to wait for lsblk
        #[arg(long, default_value = "10")]
        timeout: u64,
    },

    /// Clone SOURCE onto DEST
    Clone {
        /// Source device or image (e.g. /dev/sda)
        source: String,

        /// Destination device or image (e.g. /dev/sdb)
        dest: String,

        /// Skip the verification pass
        #[arg(long)]
        no_verify: bool,

        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,

        /// Create DEST if it does not exist (image files)
        #[arg(long)]
        create: bool,

        /// Bytes per chunk (overrides the config file)
        #[arg(long)]
        chunk_size: Option<u64>,

        /// Write the session log to the log directory on exit
        #[arg(long, value_name = "FORMAT", num_args = 0..=1, default_missing_value = "text")]
        export_log: Option<LogFormat>,

        /// Export the complete application log instead of this session's
        #[arg(long, requires = "export_log")]
        full: bool,
    },

    /// Dry run against in-memory disks
    Simulate {
        /// Simulated disk size in bytes
        #[arg(long, default_value = "104857600")]
        size: usize,

        /// Bytes per chunk
        #[arg(long, default_value = "1048576")]
        chunk_size: u64,

        /// Simulated wait per chunk call in milliseconds
        #[arg(long, default_value = "20")]
        latency_ms: u64,

        /// Skip the verification pass
        #[arg(long)]
        no_verify: bool,

        /// Fail the Nth chunk write
        #[arg(long, value_name = "N")]
        fail_write: Option<usize>,

        /// Corrupt the Nth chunk write so verification fails
        #[arg(long, value_name = "N")]
        corrupt_write: Option<usize>,

        /// Write the session log to the log directory on exit
        #[arg(long, value_name = "FORMAT", num_args = 0..=1, default_missing_value = "text")]
        export_log: Option<LogFormat>,

        /// Export the complete application log instead of this session's
        #[arg(long, requires = "export_log")]
        full: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn exporter(self) -> Box<dyn LogExporter> {
        match self {
            Self::Text => Box::new(TextLogExporter),
            Self::Json => Box::new(JsonLogExporter),
        }
    }
}

/// What to export when the operation ends.
#[derive(Debug, Clone, Copy)]
struct ExportOptions {
    format: LogFormat,
    /// The whole application log rather than the session log.
    full: bool,
}

impl ExportOptions {
    fn from_args(format: Option<LogFormat>, full: bool) -> Option<Self> {
        format.map(|format| Self { format, full })
    }
}

/// A controller plus the application log its entries are appended to.
struct Session {
    controller: OperationController,
    app_log: Option<Arc<ApplicationLog>>,
}

impl Session {
    /// Open the application log in the configured directory and attach it.
    ///
    /// Without a usable log directory the session still runs, unrecorded.
    fn open(engine: Arc<dyn TransferEngine>, config: CloneConfig) -> Self {
        let app_log = match ApplicationLog::in_dir(config.log_dir.as_deref()) {
            Ok(log) => Some(Arc::new(log)),
            Err(err) => {
                tracing::warn!(error = %err, "application log disabled");
                None
            }
        };

        let mut controller = OperationController::new(engine, config);
        if let Some(log) = &app_log {
            if let Err(err) = log.append(&LogEntry::info("diskcloner started")) {
                tracing::warn!(path = %log.path().display(), error = %err, "cannot write application log");
            }
            controller = controller.with_log_sink(log.clone());
        }

        Self { controller, app_log }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let config = CloneConfig::load_or_default(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Command::List { format, timeout } => {
            let enumerator = LsblkEnumerator::new().with_timeout(Duration::from_secs(timeout));
            list_disks(&enumerator, format).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Clone {
            source,
            dest,
            no_verify,
            force,
            create,
            chunk_size,
            export_log,
            full,
        } => {
            let mut config = config;
            if let Some(chunk_size) = chunk_size {
                if chunk_size == 0 {
                    bail!("Chunk size must be greater than zero");
                }
                config.chunk_size = chunk_size;
            }

            let request = OperationRequest::new(source, dest)
                .with_verify(!no_verify)
                .with_force(force);
            request.validate()?;

            if needs_root(Path::new(request.dest_id.trim())) {
                bail!(
                    "This program must be run as root to write {}",
                    request.dest_id
                );
            }

            if !request.force && !confirm(&request).await? {
                eprintln!("Aborted.");
                return Ok(ExitCode::SUCCESS);
            }

            let engine = if create {
                FileEngine::with_create_destination()
            } else {
                FileEngine::new()
            };
            let session = Session::open(Arc::new(engine), config);
            let code = run_operation(&session, request, ExportOptions::from_args(export_log, full)).await?;
            Ok(ExitCode::from(code))
        }
        Command::Simulate {
            size,
            chunk_size,
            latency_ms,
            no_verify,
            fail_write,
            corrupt_write,
            export_log,
            full,
        } => {
            let config = CloneConfig {
                chunk_size,
                ..config
            };
            config.validate()?;

            let enumerator = StaticEnumerator::new(simulated_disks(size as u64));
            let disks = list_disks(&enumerator, OutputFormat::Text).await?;
            let [source, dest] = disks.as_slice() else {
                bail!("Expected two simulated disks, found {}", disks.len());
            };

            let engine = MemoryEngine::new()
                .with_pattern_device(source.id.as_str(), size)
                .with_blank_device(dest.id.as_str(), size)
                .with_latency(Duration::from_millis(latency_ms))
                .with_faults(FaultPlan {
                    fail_write_on: fail_write,
                    corrupt_write_on: corrupt_write,
                    ..Default::default()
                });

            let request = OperationRequest::new(source.id.as_str(), dest.id.as_str()).with_verify(!no_verify);
            let session = Session::open(Arc::new(engine), config);
            session
                .controller
                .append_log(LogEntry::info("Dry run: no device is written"));
            let code = run_operation(&session, request, ExportOptions::from_args(export_log, full)).await?;
            Ok(ExitCode::from(code))
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Print the disks `enumerator` reports and return them.
async fn list_disks(enumerator: &dyn DiskEnumerator, format: OutputFormat) -> Result<Vec<DiskInfo>> {
    let disks = enumerator
        .enumerate()
        .await
        .with_context(|| format!("Failed to list disks ({})", enumerator.name()))?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&disks)?);
        return Ok(disks);
    }

    if disks.is_empty() {
        println!("No disks found.");
        return Ok(disks);
    }

    println!("{:<16} {:>12}  MODEL", "DEVICE", "SIZE");
    println!("{}", "─".repeat(50));
    for disk in &disks {
        println!(
            "{:<16} {:>12}  {}",
            disk.id,
            disk.size_display(),
            disk.model.as_deref().unwrap_or("Unknown Model")
        );
    }

    Ok(disks)
}

/// The two in-memory disks of a dry run.
fn simulated_disks(size: u64) -> Vec<DiskInfo> {
    [("sim-source", "Simulated source"), ("sim-dest", "Simulated destination")]
        .into_iter()
        .map(|(id, model)| DiskInfo {
            id: id.to_string(),
            ..DiskInfo::new(id, size, "disk").with_model(Some(model.to_string()))
        })
        .collect()
}

/// Whether `dest` is a block device this process lacks the rights to write.
#[cfg(unix)]
fn needs_root(dest: &Path) -> bool {
    use std::os::unix::fs::{FileTypeExt, MetadataExt};

    let is_block_device = std::fs::metadata(dest)
        .map(|m| m.file_type().is_block_device())
        .unwrap_or(false);
    // /proc/self is owned by the effective uid.
    let euid = std::fs::metadata("/proc/self").map(|m| m.uid()).ok();
    is_block_device && euid != Some(0)
}

#[cfg(not(unix))]
fn needs_root(_dest: &Path) -> bool {
    false
}

/// Ask before overwriting the destination.
async fn confirm(request: &OperationRequest) -> Result<bool> {
    let prompt = format!(
        "This will overwrite ALL data on {}.\nAre you sure you want to continue? [y/N] ",
        request.dest_id
    );

    let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        let mut stderr = std::io::stderr();
        stderr.write_all(prompt.as_bytes())?;
        stderr.flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    })
    .await??;

    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Submit `request`, render its progress and wait for it to finish.
///
/// The first Ctrl-C asks the operation to stop at the next chunk boundary.
/// A second one exits at once with the destination left as it is.
async fn run_operation(session: &Session, request: OperationRequest, export: Option<ExportOptions>) -> Result<u8> {
    let controller = &session.controller;
    let events = controller.subscribe();
    let printer = tokio::spawn(print_events(events));

    let accepted = controller.submit(request)?;
    let wait = accepted.wait();
    tokio::pin!(wait);

    let mut interrupted = false;
    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                if interrupted {
                    eprintln!("\nExiting without waiting for the operation to stop");
                    let code = exit_during_operation(session, export);
                    // Returning would make the runtime wait for the blocking worker.
                    std::process::exit(i32::from(code));
                }
                interrupted = true;
                if controller.request_cancel() {
                    eprintln!("\nStopping at the next chunk boundary... (Ctrl-C again to exit now)");
                }
            }
        }
    };
    printer.await?;

    let code = match &outcome {
        OperationOutcome::Completed { bytes, digest } => {
            println!(
                "Cloned {} ({bytes} bytes)",
                humansize::format_size(*bytes, humansize::BINARY)
            );
            if let Some(digest) = digest {
                println!("blake3 {digest}");
            }
            0
        }
        OperationOutcome::Cancelled { .. } => {
            eprintln!("{}", controller.current_state().status_line());
            EXIT_INTERRUPTED
        }
        OperationOutcome::Failed(err) => {
            eprintln!("operation failed: {}", err.detail());
            1
        }
    };

    Ok(finish_session(session, export, code))
}

/// Export if asked and acknowledge the outcome. Neither step changes `code`.
fn finish_session(session: &Session, export: Option<ExportOptions>, code: u8) -> u8 {
    if let Some(options) = export {
        export_or_report(session, options);
    }
    if let Err(err) = session.controller.reset() {
        eprintln!("{err}");
    }
    code
}

/// Record an exit requested while the operation is still active.
fn exit_during_operation(session: &Session, export: Option<ExportOptions>) -> u8 {
    session
        .controller
        .append_log(LogEntry::warning("Exit requested during operation"));
    if let Some(options) = export {
        export_or_report(session, options);
    }
    EXIT_INTERRUPTED
}

fn export_or_report(session: &Session, options: ExportOptions) {
    if let Err(err) = export_log(session, options) {
        let message = format!("Failed to export log: {err:#}");
        session.controller.append_log(LogEntry::error(message.as_str()));
        eprintln!("{message}");
    }
}

fn export_log(session: &Session, options: ExportOptions) -> Result<PathBuf> {
    let controller = &session.controller;
    let exporter = options.format.exporter();
    let dir = controller.config().log_dir.as_deref();

    let (entries, path) = if options.full {
        let app_log = session
            .app_log
            .as_ref()
            .ok_or_else(|| eyre!("The application log is not available"))?;
        (app_log.entries()?, full_log_path(dir, exporter.as_ref())?)
    } else {
        (controller.log_entries(), session_log_path(dir, exporter.as_ref())?)
    };

    let written = exporter.export(&entries, &path)?;
    controller.append_log(LogEntry::success(format!("Log exported to {}", written.display())));
    eprintln!("Log exported to {}", written.display());
    Ok(written)
}

/// Render events on stderr until the operation finishes.
async fn print_events(mut events: tokio::sync::broadcast::Receiver<OperationEvent>) {
    loop {
        match events.recv().await {
            Ok(OperationEvent::Progress {
                stage,
                percent,
                bytes_done,
                total_bytes,
                ..
            }) => {
                let label = if stage == Phase::Verifying {
                    "Verifying"
                } else {
                    "Cloning"
                };
                eprint!(
                    "\r{label}... {percent:>3}% ({} / {})",
                    humansize::format_size(bytes_done, humansize::BINARY),
                    humansize::format_size(total_bytes, humansize::BINARY)
                );
            }
            Ok(OperationEvent::Log(entry)) => {
                if entry.level != LogLevel::Info {
                    eprintln!("\r{entry}");
                }
            }
            Ok(OperationEvent::PhaseChanged { .. }) => {}
            Ok(OperationEvent::Finished { .. }) | Err(RecvError::Closed) => {
                eprintln!();
                break;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress display lagged");
            }
        }
    }
}

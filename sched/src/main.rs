//! jobsched - recurring job scheduler
//!
//! CLI entry point for running and controlling the scheduler daemon.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use jobsched::activity::{ActivityLog, ConsoleLog, FanoutLog, FileLog, MemoryLog, TracingLog};
use jobsched::cli::{Cli, Command, OutputFormat};
use jobsched::config::{Config, data_dir};
use jobsched::daemon::{DaemonManager, DaemonSignal, StatusReport, StopOutcome, VERSION};
use jobsched::dispatch::Dispatcher;
use jobsched::domain::{Trigger, TriggerStatus};
use jobsched::process::ProcessLauncher;
use jobsched::scheduler::{
    Collaborators, SchedulerHandle, SchedulerLoop, SchedulerRunner, SchedulerSnapshot, StartOutcome,
};
use jobsched::store::FileTriggerStore;
use jobsched::workspace::WorkspaceManager;

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = data_dir().join("logs");
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Append: CLI invocations share the file with a running daemon
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("jobsched.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        triggers_file = ?config.store.triggers_file,
        tick_interval_secs = config.scheduler.tick_interval_secs,
        "jobsched loaded config"
    );

    match cli.command {
        Some(Command::Start { foreground }) => cmd_start(&config, cli.config.as_deref(), foreground).await,
        Some(Command::Stop { timeout_secs, force }) => cmd_stop(timeout_secs, force),
        Some(Command::Status { detailed, format }) => cmd_status(detailed, format),
        Some(Command::Pause) => cmd_signal(DaemonSignal::Pause),
        Some(Command::Resume) => cmd_signal(DaemonSignal::Resume),
        Some(Command::Triggers { format }) => cmd_triggers(&config, format),
        Some(Command::Reset { id }) => cmd_reset(&config, &id),
        Some(Command::Logs { follow, lines }) => cmd_logs(&config, follow, lines),
        Some(Command::RunDaemon) => run_daemon(&config, false).await,
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Start the daemon
async fn cmd_start(config: &Config, config_path: Option<&Path>, foreground: bool) -> Result<()> {
    let daemon = DaemonManager::new();

    if let Some(pid) = daemon.running_pid() {
        println!("jobsched is already running (PID: {})", pid);
        return Ok(());
    }

    if foreground {
        println!("Starting jobsched in foreground mode...");
        run_daemon(config, true).await
    } else {
        let pid = daemon.start(config_path)?;
        println!("jobsched started (PID: {})", pid);
        Ok(())
    }
}

/// Stop the daemon
fn cmd_stop(timeout_secs: u64, force: bool) -> Result<()> {
    let daemon = DaemonManager::new();

    let Some(pid) = daemon.running_pid() else {
        println!("jobsched is not running");
        return Ok(());
    };

    println!("Stopping jobsched (PID: {}), waiting for running jobs to finish...", pid);
    match daemon.stop(Duration::from_secs(timeout_secs), force)? {
        StopOutcome::Exited => println!("jobsched stopped (was PID: {})", pid),
        StopOutcome::Killed => println!("jobsched killed after {}s (was PID: {})", timeout_secs, pid),
        StopOutcome::StillDraining => {
            let running = daemon
                .read_status()
                .ok()
                .flatten()
                .map(|report| report.scheduler.jobs.len())
                .unwrap_or(0);
            println!(
                "jobsched is paused and still waiting for {} running job(s); it exits once they finish",
                running
            );
            println!("Use --force to kill it instead");
        }
    }
    Ok(())
}

/// Pause or resume the running daemon
fn cmd_signal(signal: DaemonSignal) -> Result<()> {
    let daemon = DaemonManager::new();
    if !daemon.is_running() {
        println!("jobsched is not running");
        return Ok(());
    }

    let pid = daemon.signal(signal)?;
    match signal {
        DaemonSignal::Pause => println!("Pause requested (PID: {}); running jobs will finish", pid),
        DaemonSignal::Resume => println!("Resume requested (PID: {})", pid),
        DaemonSignal::Shutdown => println!("Shutdown requested (PID: {})", pid),
    }
    Ok(())
}

/// Show daemon status
fn cmd_status(detailed: bool, format: OutputFormat) -> Result<()> {
    let daemon = DaemonManager::new();
    let status = daemon.status();
    let report = if status.running { daemon.read_status()? } else { None };

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "running": status.running,
                "pid": status.pid,
                "version": status.version,
                "pid_file": status.pid_file,
                "report": report,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text | OutputFormat::Table => {
            println!("jobsched Status");
            println!("---------------");
            match status.pid {
                Some(pid) => {
                    println!("Status: {}", "running".green());
                    println!("PID: {}", pid);
                }
                None => println!("Status: {}", "stopped".yellow()),
            }
            println!("PID file: {}", status.pid_file.display());
            if status.running && !daemon.version_matches() {
                println!(
                    "{} daemon version {} differs from CLI version {}",
                    "Note:".yellow(),
                    status.version.as_deref().unwrap_or("unknown"),
                    VERSION
                );
            }

            if let Some(report) = &report {
                print_scheduler(&report.scheduler);
                if detailed {
                    print_detail(report);
                }
            } else if detailed && status.running {
                println!();
                println!("No status published yet");
            }
        }
    }
    Ok(())
}

fn print_scheduler(snapshot: &SchedulerSnapshot) {
    println!("Scheduler: {}", snapshot.headline());
    println!("Running jobs: {}", snapshot.jobs.len());
    if let Some(at) = snapshot.last_tick_at {
        println!("Last tick: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}

fn print_detail(report: &StatusReport) {
    let snapshot = &report.scheduler;
    println!();
    for job in &snapshot.jobs {
        let blocking = if job.blocking { " [blocking]".red().to_string() } else { String::new() };
        println!(
            "  {} {}{} pid={} since {}",
            job.trigger_id.cyan(),
            job.process_name,
            blocking,
            job.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            job.launched_at.format("%H:%M:%S")
        );
    }

    let stats = &snapshot.stats;
    println!();
    println!("Ticks: {}", stats.ticks);
    println!("  Launched:  {}", stats.launched);
    println!("  Succeeded: {}", stats.succeeded);
    println!("  Failed:    {}", stats.failed);
    println!("  Cleanups:  {}", stats.cleanups);

    if !report.recent_activity.is_empty() {
        println!();
        println!("Recent activity:");
        let skip = report.recent_activity.len().saturating_sub(10);
        for line in report.recent_activity.iter().skip(skip) {
            println!("  {}", line);
        }
    }
}

fn open_store(config: &Config) -> Result<FileTriggerStore> {
    let path = config
        .store
        .triggers_file
        .as_ref()
        .ok_or_else(|| eyre::eyre!("No triggers file configured (set store.triggers-file)"))?;
    Ok(FileTriggerStore::new(path))
}

/// List stored triggers
fn cmd_triggers(config: &Config, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;
    let triggers = store.list().context("Failed to read triggers")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&triggers)?),
        OutputFormat::Table => {
            println!(
                "{:<24} {:<28} {:<9} {:<8} {:<20}",
                "ID", "PROCESS", "STATUS", "BLOCKING", "NEXT RUN"
            );
            for trigger in &triggers {
                println!(
                    "{:<24} {:<28} {:<9} {:<8} {:<20}",
                    trigger.id,
                    trigger.process_name,
                    colored_status(trigger.status),
                    if trigger.is_blocking { "yes" } else { "no" },
                    trigger.schedule.next_run().format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        OutputFormat::Text => {
            if triggers.is_empty() {
                println!("No triggers in {}", store.path().display());
            }
            for trigger in &triggers {
                print_trigger(trigger);
            }
        }
    }
    Ok(())
}

fn print_trigger(trigger: &Trigger) {
    println!("{} ({})", trigger.id.cyan(), trigger.process_name);
    println!("  Status:   {}", colored_status(trigger.status));
    println!("  Command:  {} {}", trigger.command, trigger.args.join(" "));
    println!("  Next run: {}", trigger.schedule.next_run().format("%Y-%m-%d %H:%M:%S UTC"));
    if trigger.is_blocking {
        println!("  Blocking: yes");
    }
    if let Some(error) = &trigger.last_error {
        println!("  Error:    {}", error.red());
    }
}

fn colored_status(status: TriggerStatus) -> String {
    let text = status.to_string();
    match status {
        TriggerStatus::Idle => text,
        TriggerStatus::Running => text.cyan().to_string(),
        TriggerStatus::Done => text.green().to_string(),
        TriggerStatus::Failed => text.red().to_string(),
        TriggerStatus::Paused => text.yellow().to_string(),
    }
}

/// Put a trigger back to idle
fn cmd_reset(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config)?;
    let trigger = store.reset(id).context(format!("Failed to reset trigger {}", id))?;
    println!("{} Trigger {} is {}", "✓".green(), trigger.id.cyan(), colored_status(trigger.status));
    Ok(())
}

/// Show the activity log
fn cmd_logs(config: &Config, follow: bool, lines: usize) -> Result<()> {
    let log_path = config.activity.file_path();

    if !log_path.exists() {
        println!("No activity log found at: {}", log_path.display());
        println!("The daemon may not have been started yet.");
        return Ok(());
    }

    if follow {
        println!("Following activity log: {} (Ctrl+C to stop)", log_path.display());
        println!();

        let mut child = std::process::Command::new("tail")
            .args(["-f", "-n", &lines.to_string()])
            .arg(&log_path)
            .spawn()
            .context("Failed to run tail -f")?;

        child.wait()?;
    } else {
        let file = fs::File::open(&log_path).context("Failed to open activity log")?;
        let reader = BufReader::new(file);
        let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

        let start = all_lines.len().saturating_sub(lines);
        for line in &all_lines[start..] {
            println!("{}", line);
        }
    }

    Ok(())
}

/// Run the scheduler daemon until it is told to stop and has drained
async fn run_daemon(config: &Config, foreground: bool) -> Result<()> {
    let daemon = DaemonManager::new();
    daemon.register_self()?;

    let result = serve(config, foreground, &daemon).await;

    if let Err(e) = daemon.cleanup() {
        warn!(error = %e, "Failed to remove daemon files");
    }
    info!("Daemon exited");
    result
}

async fn serve(config: &Config, foreground: bool, daemon: &DaemonManager) -> Result<()> {
    let recent = Arc::new(MemoryLog::new(config.activity.max_lines));
    let activity_file = FileLog::open(config.activity.file_path())?;
    let mut fanout = FanoutLog::new()
        .with(recent.clone())
        .with(Arc::new(activity_file))
        .with(Arc::new(TracingLog));
    if foreground {
        fanout = fanout.with(Arc::new(ConsoleLog));
    }
    let log: Arc<dyn ActivityLog> = Arc::new(fanout);

    let workspace = Arc::new(WorkspaceManager::new(&config.workspace.dir));
    let mut launcher = ProcessLauncher::new(workspace.clone(), config.workspace.stderr_tail_bytes);
    let store = config.store.triggers_file.as_ref().map(FileTriggerStore::new);

    if let Some(store) = &store {
        launcher = launcher.with_triggers_file(store.path());
        if store.is_available() {
            let recovered = store
                .recover_interrupted()
                .context("Failed to recover interrupted triggers")?;
            if recovered > 0 {
                log.push(&format!("Marked {} interrupted trigger(s) as failed", recovered));
            }
        }
    }

    let dispatcher = Arc::new(Dispatcher::new(store, launcher, log.clone()));
    let scheduler = SchedulerLoop::new(
        config.scheduler.clone(),
        Collaborators {
            connection: dispatcher.clone(),
            source: dispatcher.clone(),
            recorder: dispatcher,
            cleaner: workspace,
            log: log.clone(),
        },
    );

    let (handle, mut join) = SchedulerRunner::spawn(scheduler);
    let status_writer = spawn_status_writer(daemon.clone(), handle.subscribe(), recent);

    if config.scheduler.autostart {
        resume(&handle).await;
    }

    info!("Daemon running. SIGUSR1 pauses, SIGUSR2 resumes, SIGTERM/SIGINT stop after running jobs finish.");

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigusr1 = signal(SignalKind::user_defined1())?;
        let mut sigusr2 = signal(SignalKind::user_defined2())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut interrupted = false;

        loop {
            tokio::select! {
                result = &mut join => {
                    let scheduler = result.context("Scheduler task failed")?;
                    info!(stats = ?scheduler.stats(), "Scheduler drained");
                    break;
                }
                _ = sigusr1.recv() => {
                    info!("SIGUSR1 received - pausing");
                    if let Err(e) = handle.stop().await {
                        warn!(error = %e, "Pause request failed");
                    }
                }
                _ = sigusr2.recv() => {
                    info!("SIGUSR2 received - resuming");
                    resume(&handle).await;
                }
                _ = sigterm.recv() => {
                    warn!("SIGTERM received - stopping once running jobs finish");
                    shutdown(&handle).await;
                }
                _ = sigint.recv() => {
                    if interrupted {
                        warn!("Second SIGINT received - exiting without waiting for running jobs");
                        break;
                    }
                    interrupted = true;
                    warn!("SIGINT received - stopping once running jobs finish (interrupt again to exit now)");
                    shutdown(&handle).await;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            result = &mut join => {
                result.context("Scheduler task failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Ctrl+C received - stopping once running jobs finish");
                shutdown(&handle).await;
                join.await.context("Scheduler task failed")?;
            }
        }
    }

    status_writer.abort();
    Ok(())
}

async fn resume(handle: &SchedulerHandle) {
    match handle.start().await {
        Ok(StartOutcome::Started) => info!("Scheduler started"),
        Ok(StartOutcome::AlreadyRunning) => info!("Scheduler already running"),
        Err(e) => warn!(error = %e, "Scheduler not started"),
    }
}

async fn shutdown(handle: &SchedulerHandle) {
    if let Err(e) = handle.shutdown().await {
        error!(error = %e, "Shutdown request failed");
    }
}

/// Republish the status file whenever the scheduler publishes a snapshot
fn spawn_status_writer(
    daemon: DaemonManager,
    mut snapshots: watch::Receiver<SchedulerSnapshot>,
    recent: Arc<MemoryLog>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            let report = StatusReport::new(snapshot, recent.lines());
            if let Err(e) = daemon.write_status(&report) {
                warn!(error = %e, "Failed to write status file");
            }
            if snapshots.changed().await.is_err() {
                break;
            }
        }
    })
}

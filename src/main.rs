mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use log::{error, info};

use webwatchd::clock::SystemClock;
use webwatchd::config::{self, WatchConfig};
use webwatchd::control::SystemServiceControl;
use webwatchd::install::{self, ServiceSpec};
use webwatchd::notify::{NotificationSink, Severity, SinkSettings, SmtpMailer};
use webwatchd::probe::{HttpProber, Prober};
use webwatchd::{Watcher, signals};

fn main() {
    // Initialize logger with custom format for daemon
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();

    if let Err(e) = real_main() {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<()> {
    let args = cli::Args::parse();

    match args.sub.unwrap_or(cli::Cmd::Run {
        foreground: false,
        config: cli::ConfigArgs::default(),
        log: None,
    }) {
        cli::Cmd::Run {
            foreground,
            config,
            log,
        } => run_watcher(&config, log, foreground),
        cli::Cmd::Once { config, log } => handle_once(&config, log),
        cli::Cmd::Probe { config } => handle_probe(&config),
        cli::Cmd::InitConfig { config } => handle_init_config(&config),
        cli::Cmd::Install { config } => handle_install(&config),
        cli::Cmd::Uninstall { system } => handle_uninstall(system),
    }
}

/// Load the config and assemble the production watcher. Config warnings are
/// recorded and flushed as their own batch before the first cycle.
fn build_watcher(
    args: &cli::ConfigArgs,
    log_override: Option<PathBuf>,
    console: bool,
) -> Result<Watcher> {
    let cfg_path = config::resolve_config_path(args.config.as_deref(), args.system)?;
    let loaded = WatchConfig::load(&cfg_path);
    info!("Using config from: {}", cfg_path.display());

    let mut cfg = loaded.config;
    if log_override.is_some() {
        cfg.log_file = log_override;
    }

    let mailer = SmtpMailer::new(&cfg.smtp);
    if !mailer.is_configured() {
        info!("Mail notifications disabled: smtp.server, smtp.from and smtp.to must all be set");
    }
    let sink = NotificationSink::new(
        SinkSettings {
            log_file: cfg.log_file.clone(),
            console,
            log_threshold: cfg.log_severity_threshold,
            email_threshold: cfg.email_severity_threshold,
        },
        Box::new(mailer),
    );
    let prober = HttpProber::new().context("Failed to build HTTP client")?;

    let mut watcher = Watcher::new(
        cfg,
        Box::new(prober),
        Box::new(SystemServiceControl),
        Box::new(SystemClock),
        sink,
    );
    if !loaded.warnings.is_empty() {
        let sink = watcher.sink_mut();
        for warning in loaded.warnings {
            sink.record(Severity::Warning, warning);
        }
        sink.flush();
    }
    Ok(watcher)
}

fn run_watcher(args: &cli::ConfigArgs, log: Option<PathBuf>, foreground: bool) -> Result<()> {
    let watcher = build_watcher(args, log, foreground)?;

    signals::install()?;
    // Held for the life of the loop; dropping it would read as a shutdown.
    let (_shutdown_tx, shutdown_rx) = bounded::<()>(1);

    info!("webwatchd started (pid {})", std::process::id());
    watcher.run(&shutdown_rx);
    info!("webwatchd exiting");
    Ok(())
}

/// Handle once command - one cycle in the foreground
fn handle_once(args: &cli::ConfigArgs, log: Option<PathBuf>) -> Result<()> {
    let mut watcher = build_watcher(args, log, true)?;
    let outcome = watcher.run_cycle();
    println!("{}: {outcome}", watcher.config().target_url);
    std::process::exit(if outcome.is_up() { 0 } else { 1 });
}

/// Handle probe command - single probe, no remediation
fn handle_probe(args: &cli::ConfigArgs) -> Result<()> {
    let cfg_path = config::resolve_config_path(args.config.as_deref(), args.system)?;
    let loaded = WatchConfig::load(&cfg_path);
    for warning in &loaded.warnings {
        eprintln!("warning: {warning}");
    }
    let cfg = loaded.config;

    let prober = HttpProber::new().context("Failed to build HTTP client")?;
    let result = prober.probe(&cfg.target_url, cfg.probe_timeout());
    let code = result
        .http_status
        .map_or_else(|| "-".to_string(), |c| c.to_string());
    println!(
        "{} {} (code {code}, received {} bytes, declared {})",
        cfg.target_url, result.status, result.received_length, result.declared_length
    );
    std::process::exit(if result.is_ok() { 0 } else { 1 });
}

/// Handle init-config command - write the default configuration
fn handle_init_config(args: &cli::ConfigArgs) -> Result<()> {
    let cfg_path = config::resolve_config_path(args.config.as_deref(), args.system)?;
    config::write_default(&cfg_path)?;
    println!("Wrote default configuration to {}", cfg_path.display());
    Ok(())
}

/// Handle install command - register and start the watchdog service
fn handle_install(args: &cli::ConfigArgs) -> Result<()> {
    let system = args.system || install::is_privileged();
    let cfg_path = config::resolve_config_path(args.config.as_deref(), system)?;
    let cfg_path = std::path::absolute(&cfg_path)
        .with_context(|| format!("Failed to resolve {}", cfg_path.display()))?;
    if !cfg_path.exists() {
        config::write_default(&cfg_path)?;
        info!("Wrote default configuration to {}", cfg_path.display());
    }

    let program = std::env::current_exe().context("Failed to locate the webwatchd binary")?;
    let spec = ServiceSpec::new(program, &cfg_path, system);
    let location = install::install(&spec).context("Service installation failed")?;
    println!(
        "Installed {} ({}) using {}",
        spec.label,
        location.display(),
        cfg_path.display()
    );
    Ok(())
}

/// Handle uninstall command - stop and remove the watchdog service
fn handle_uninstall(system: bool) -> Result<()> {
    let system = system || install::is_privileged();
    let location = install::uninstall(system).context("Service removal failed")?;
    println!("Removed {} ({})", install::SERVICE_LABEL, location.display());
    Ok(())
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "web endpoint watchdog")]
pub struct Args {
    /// Sub‑commands (run, once, probe, init-config, install, uninstall)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

/// Where to find the configuration file.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to configuration file
    #[arg(long, short = 'c')]
    pub config: Option<String>,

    /// Use system-wide config (/etc/webwatchd/webwatchd.toml)
    #[arg(long, conflicts_with = "config")]
    pub system: bool,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Watch the endpoint on the configured poll interval (default if no sub‑command)
    Run {
        /// Echo every notification to the console
        #[arg(long, short = 'f', alias = "debug")]
        foreground: bool,

        #[command(flatten)]
        config: ConfigArgs,

        /// Append notifications to this file (overrides `log_file`)
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Run a single watch cycle now and exit (Exit 0 = endpoint up, 1 = not)
    Once {
        #[command(flatten)]
        config: ConfigArgs,

        /// Append notifications to this file (overrides `log_file`)
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Probe the endpoint once without remediation (Exit 0 = 200 OK, 1 = not)
    Probe {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Write a default configuration file
    InitConfig {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Register webwatchd as a service (systemd unit or launchd job) and start it
    Install {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Stop and remove the webwatchd service
    Uninstall {
        /// Remove the system-wide service (default when running as root)
        #[arg(long)]
        system: bool,
    },
}

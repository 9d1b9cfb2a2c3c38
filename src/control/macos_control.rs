//! macOS service control using launchd (launchctl)

use std::process::{Command, Output};

use super::{ControlError, ServiceControl, ServiceState};

/// launchd-backed control; the service name is the job label.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemServiceControl;

impl ServiceControl for SystemServiceControl {
    fn stop(&self, service: &str) -> Result<(), ControlError> {
        request("stop", service)
    }

    fn start(&self, service: &str) -> Result<(), ControlError> {
        request("start", service)
    }

    /// Check the PID column of launchctl list
    fn query(&self, service: &str) -> Result<ServiceState, ControlError> {
        let output = launchctl(&["list"])?;
        if !output.status.success() {
            return Err(ControlError::Command {
                action: "list",
                service: service.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_list(&stdout, service).ok_or_else(|| ControlError::UnknownService(service.to_string()))
    }
}

fn request(action: &'static str, service: &str) -> Result<(), ControlError> {
    let output = launchctl(&[action, service])?;

    if !output.status.success() {
        return Err(ControlError::Command {
            action,
            service: service.to_string(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

fn launchctl(args: &[&str]) -> Result<Output, ControlError> {
    log::debug!("launchctl {}", args.join(" "));
    Command::new("launchctl")
        .args(args)
        .output()
        .map_err(|source| ControlError::Spawn {
            tool: "launchctl",
            source,
        })
}

/// Output format: "PID\tStatus\tLabel". A PID of "-" means the job is loaded
/// but not running.
fn parse_list(stdout: &str, label: &str) -> Option<ServiceState> {
    stdout.lines().find_map(|line| {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [pid, _status, name] if *name == label => Some(if *pid == "-" {
                ServiceState::Stopped
            } else {
                ServiceState::Running
            }),
            _ => None,
        }
    })
}

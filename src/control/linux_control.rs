//! Linux service control using systemd (systemctl)

use std::process::{Command, Output};

use super::{ControlError, ServiceControl, ServiceState};

/// systemd-backed control. System units when running as root, the user's
/// units otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemServiceControl;

impl ServiceControl for SystemServiceControl {
    fn stop(&self, service: &str) -> Result<(), ControlError> {
        request("stop", service)
    }

    fn start(&self, service: &str) -> Result<(), ControlError> {
        request("start", service)
    }

    /// Query via systemctl is-active
    fn query(&self, service: &str) -> Result<ServiceState, ControlError> {
        let unit = unit_name(service);
        // is-active exits non-zero for anything but "active", so the exit
        // status is not an error here; the printed state is what matters.
        let output = systemctl(&["is-active", &unit])?;
        let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
        match parse_active_state(&state) {
            Some(state) => Ok(state),
            None if state == "unknown" => Err(ControlError::UnknownService(service.to_string())),
            None => Err(ControlError::Command {
                action: "is-active",
                service: service.to_string(),
                detail: format!("unexpected state '{state}'"),
            }),
        }
    }
}

/// Queue a start or stop job without blocking on it; the caller waits with
/// its own deadline.
fn request(action: &'static str, service: &str) -> Result<(), ControlError> {
    let unit = unit_name(service);
    let output = systemctl(&["--no-block", action, &unit])?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains("not loaded") || stderr.contains("not found") {
            return Err(ControlError::UnknownService(service.to_string()));
        }
        return Err(ControlError::Command {
            action,
            service: service.to_string(),
            detail: stderr,
        });
    }

    Ok(())
}

fn systemctl(args: &[&str]) -> Result<Output, ControlError> {
    let mut cmd = Command::new("systemctl");
    if !is_root() {
        cmd.arg("--user");
    }
    log::debug!("systemctl {}", args.join(" "));
    cmd.args(args).output().map_err(|source| ControlError::Spawn {
        tool: "systemctl",
        source,
    })
}

/// `nginx` → `nginx.service`; names that already carry a unit suffix are
/// left alone.
fn unit_name(service: &str) -> String {
    if service.contains('.') {
        service.to_string()
    } else {
        format!("{service}.service")
    }
}

fn parse_active_state(state: &str) -> Option<ServiceState> {
    match state {
        "active" => Some(ServiceState::Running),
        "inactive" | "failed" => Some(ServiceState::Stopped),
        "activating" | "deactivating" | "reloading" | "refreshing" => {
            Some(ServiceState::Transitioning)
        }
        _ => None,
    }
}

/// Check if running as root
#[inline]
fn is_root() -> bool {
    nix::unistd::getuid().is_root()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_get_service_suffix() {
        assert_eq!(unit_name("apache2"), "apache2.service");
        assert_eq!(unit_name("web.target"), "web.target");
    }

    #[test]
    fn active_states_map_to_service_states() {
        assert_eq!(parse_active_state("active"), Some(ServiceState::Running));
        assert_eq!(parse_active_state("failed"), Some(ServiceState::Stopped));
        assert_eq!(
            parse_active_state("deactivating"),
            Some(ServiceState::Transitioning)
        );
        assert_eq!(parse_active_state("unknown"), None);
    }
}

//! systemd unit generation and registration.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::Command;

use super::{InstallError, ServiceSpec, remove_if_present, write_file_atomic};

pub(super) fn install(spec: &ServiceSpec) -> Result<PathBuf, InstallError> {
    let unit = unit_file_name(&spec.label);
    let path = unit_dir(spec.system)?.join(&unit);

    write_file_atomic(&path, &render_unit(spec))?;
    log::info!("Wrote {}", path.display());

    systemctl(spec.system, &["daemon-reload"])?;
    systemctl(spec.system, &["enable", "--now", &unit])?;
    Ok(path)
}

pub(super) fn uninstall(label: &str, system: bool) -> Result<PathBuf, InstallError> {
    let unit = unit_file_name(label);
    let path = unit_dir(system)?.join(&unit);

    if let Err(e) = systemctl(system, &["disable", "--now", &unit]) {
        log::warn!("Could not disable {unit}: {e}");
    }
    remove_if_present(&path)?;
    systemctl(system, &["daemon-reload"])?;
    Ok(path)
}

fn unit_file_name(label: &str) -> String {
    format!("{label}.service")
}

fn unit_dir(system: bool) -> Result<PathBuf, InstallError> {
    if system {
        return Ok(PathBuf::from("/etc/systemd/system"));
    }
    dirs::config_dir()
        .map(|dir| dir.join("systemd").join("user"))
        .ok_or(InstallError::NoDirectory("user config"))
}

/// Render the unit. The watchdog restarts other services through systemctl,
/// so it runs without filesystem sandboxing.
fn render_unit(spec: &ServiceSpec) -> String {
    let mut content = String::with_capacity(512);

    content.push_str("[Unit]\n");
    let _ = writeln!(content, "Description={}", spec.description);
    content.push_str("Wants=network-online.target\n");
    content.push_str("After=network-online.target\n");
    content.push('\n');

    content.push_str("[Service]\n");
    content.push_str("Type=simple\n");
    let mut exec_start = quote(&spec.program.display().to_string());
    for arg in &spec.args {
        exec_start.push(' ');
        exec_start.push_str(&quote(arg));
    }
    let _ = writeln!(content, "ExecStart={exec_start}");
    content.push_str("Restart=on-failure\n");
    content.push_str("RestartSec=5s\n");
    content.push_str("StandardOutput=journal\n");
    content.push_str("StandardError=journal\n");
    let _ = writeln!(content, "SyslogIdentifier={}", spec.label);
    content.push('\n');

    content.push_str("[Install]\n");
    let target = if spec.system {
        "multi-user.target"
    } else {
        "default.target"
    };
    let _ = writeln!(content, "WantedBy={target}");

    content
}

/// systemd's ExecStart splits on whitespace; quote words that contain any.
fn quote(word: &str) -> String {
    if word.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\') {
        let escaped = word.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        word.to_string()
    }
}

fn systemctl(system: bool, args: &[&str]) -> Result<(), InstallError> {
    let mut cmd = Command::new("systemctl");
    if !system {
        cmd.arg("--user");
    }
    cmd.args(args);
    log::debug!("{cmd:?}");

    let output = cmd.output().map_err(|source| InstallError::Spawn {
        tool: "systemctl",
        source,
    })?;
    if !output.status.success() {
        return Err(InstallError::Command {
            command: format!("systemctl {}", args.join(" ")),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

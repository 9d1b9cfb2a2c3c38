//! launchd plist generation and registration.

use std::path::{Path, PathBuf};
use std::process::Command;

use plist::{Dictionary, Value};

use super::{InstallError, ServiceSpec, remove_if_present, write_file_atomic};

pub(super) fn install(spec: &ServiceSpec) -> Result<PathBuf, InstallError> {
    let path = plist_path(&spec.label, spec.system)?;
    write_file_atomic(&path, &render_plist(spec)?)?;
    log::info!("Wrote {}", path.display());

    launchctl(&["load", "-w"], &path)?;
    Ok(path)
}

pub(super) fn uninstall(label: &str, system: bool) -> Result<PathBuf, InstallError> {
    let path = plist_path(label, system)?;
    if path.exists() {
        if let Err(e) = launchctl(&["unload", "-w"], &path) {
            log::warn!("Could not unload {label}: {e}");
        }
    }
    remove_if_present(&path)?;
    Ok(path)
}

fn plist_path(label: &str, system: bool) -> Result<PathBuf, InstallError> {
    let dir = if system {
        PathBuf::from("/Library/LaunchDaemons")
    } else {
        dirs::home_dir()
            .ok_or(InstallError::NoDirectory("home"))?
            .join("Library")
            .join("LaunchAgents")
    };
    Ok(dir.join(format!("{label}.plist")))
}

/// Generate a launchd job that keeps the watch loop running
fn render_plist(spec: &ServiceSpec) -> Result<String, InstallError> {
    let mut job = Dictionary::new();
    job.insert("Label".to_string(), Value::String(spec.label.clone()));

    let mut program_args = vec![Value::String(spec.program.display().to_string())];
    program_args.extend(spec.args.iter().map(|a| Value::String(a.clone())));
    job.insert("ProgramArguments".to_string(), Value::Array(program_args));

    job.insert("RunAtLoad".to_string(), Value::Boolean(true));
    let mut keep_alive = Dictionary::new();
    keep_alive.insert("SuccessfulExit".to_string(), Value::Boolean(false));
    job.insert("KeepAlive".to_string(), Value::Dictionary(keep_alive));

    let log_dir = if spec.system {
        PathBuf::from("/var/log")
    } else {
        std::env::temp_dir()
    };
    job.insert(
        "StandardErrorPath".to_string(),
        Value::String(
            log_dir
                .join(format!("{}.err.log", spec.label))
                .display()
                .to_string(),
        ),
    );

    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, &Value::Dictionary(job))
        .map_err(|e| InstallError::Render(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| InstallError::Render(e.to_string()))
}

fn launchctl(args: &[&str], plist: &Path) -> Result<(), InstallError> {
    let mut cmd = Command::new("launchctl");
    cmd.args(args).arg(plist);
    log::debug!("{cmd:?}");

    let output = cmd.output().map_err(|source| InstallError::Spawn {
        tool: "launchctl",
        source,
    })?;
    if !output.status.success() {
        return Err(InstallError::Command {
            command: format!("launchctl {} {}", args.join(" "), plist.display()),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

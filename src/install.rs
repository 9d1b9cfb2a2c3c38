//! Register webwatchd itself as an OS service.
//!
//! - Linux: a systemd unit (system unit as root, user unit otherwise)
//! - macOS: a launchd plist (LaunchDaemon as root, LaunchAgent otherwise)
//! - everything else: [`InstallError::Unsupported`]

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux_install;
        use linux_install as platform;
    } else if #[cfg(target_os = "macos")] {
        mod macos_install;
        use macos_install as platform;
    } else {
        mod unsupported_install;
        use unsupported_install as platform;
    }
}

/// Name of the installed service (unit name, launchd label).
pub const SERVICE_LABEL: &str = "webwatchd";

const DESCRIPTION: &str = "webwatchd web endpoint watchdog";

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to execute {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` failed: {detail}")]
    Command { command: String, detail: String },
    #[error("could not determine the {0} directory")]
    NoDirectory(&'static str),
    #[error("failed to render service definition: {0}")]
    Render(String),
    #[error("installing webwatchd as a service is not supported on this platform")]
    Unsupported,
}

/// What gets registered: this binary running `run -c <config>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub label: String,
    pub description: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// System-wide service rather than a per-user one.
    pub system: bool,
}

impl ServiceSpec {
    pub fn new(program: PathBuf, config_path: &Path, system: bool) -> Self {
        Self {
            label: SERVICE_LABEL.to_string(),
            description: DESCRIPTION.to_string(),
            program,
            args: vec![
                "run".to_string(),
                "--config".to_string(),
                config_path.display().to_string(),
            ],
            system,
        }
    }
}

/// Write the service definition, register it and start it. Returns where the
/// definition was written.
pub fn install(spec: &ServiceSpec) -> Result<PathBuf, InstallError> {
    platform::install(spec)
}

/// Stop and deregister the service and remove its definition. A service that
/// was never installed is not an error.
pub fn uninstall(system: bool) -> Result<PathBuf, InstallError> {
    platform::uninstall(SERVICE_LABEL, system)
}

/// Whether a bare install should go system-wide.
pub fn is_privileged() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::getuid().is_root()
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Write via a sibling temp file and rename, so a half-written definition is
/// never picked up.
#[cfg_attr(not(any(target_os = "linux", target_os = "macos")), allow(dead_code))]
pub(crate) fn write_file_atomic(path: &Path, content: &str) -> Result<(), InstallError> {
    let io_err = |source| InstallError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let temp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&temp_path).map_err(io_err)?;
        file.write_all(content.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    fs::rename(&temp_path, path).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o644)).map_err(io_err)?;
    }
    Ok(())
}

/// Remove `path`; a missing file counts as removed.
#[cfg_attr(not(any(target_os = "linux", target_os = "macos")), allow(dead_code))]
pub(crate) fn remove_if_present(path: &Path) -> Result<(), InstallError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(InstallError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

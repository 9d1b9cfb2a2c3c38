//! Targets without a supported service registration.
//!
//! On Windows the binary does not run the service control dispatcher, so an
//! SCM registration would never report as started.

use std::path::PathBuf;

use super::{InstallError, ServiceSpec};

pub(super) fn install(_spec: &ServiceSpec) -> Result<PathBuf, InstallError> {
    Err(InstallError::Unsupported)
}

pub(super) fn uninstall(_label: &str, _system: bool) -> Result<PathBuf, InstallError> {
    Err(InstallError::Unsupported)
}

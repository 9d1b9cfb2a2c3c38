//! Windows service control using Service Control Manager (SCM) API

use std::mem;

use windows::Win32::Foundation::{ERROR_SERVICE_DOES_NOT_EXIST, ERROR_SERVICE_NOT_ACTIVE};
use windows::Win32::System::Services::{
    CloseServiceHandle, ControlService, OpenSCManagerW, OpenServiceW, QueryServiceStatusEx,
    SC_HANDLE, SC_MANAGER_CONNECT, SC_STATUS_PROCESS_INFO, SERVICE_CONTROL_STOP,
    SERVICE_QUERY_STATUS, SERVICE_RUNNING, SERVICE_START, SERVICE_STATUS, SERVICE_STATUS_PROCESS,
    SERVICE_STOP, SERVICE_STOPPED, StartServiceW,
};
use windows::core::{HSTRING, PCWSTR};

use super::{ControlError, ServiceControl, ServiceState};

/// SCM-backed control; the service name is the service's key name.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemServiceControl;

/// RAII wrapper for SC_HANDLE (manager or service handle)
struct ScHandle(SC_HANDLE);

impl Drop for ScHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseServiceHandle(self.0);
            }
        }
    }
}

fn command_error(action: &'static str, service: &str, err: windows::core::Error) -> ControlError {
    ControlError::Command {
        action,
        service: service.to_string(),
        detail: err.message().to_string(),
    }
}

/// Open a service with the specified access rights
fn open_service(service: &str, access: u32) -> Result<ScHandle, ControlError> {
    let manager = unsafe { OpenSCManagerW(PCWSTR::null(), PCWSTR::null(), SC_MANAGER_CONNECT) }
        .map(ScHandle)
        .map_err(|e| command_error("open service manager", service, e))?;

    let name = HSTRING::from(service);
    unsafe { OpenServiceW(manager.0, &name, access) }
        .map(ScHandle)
        .map_err(|e| {
            if e.code() == ERROR_SERVICE_DOES_NOT_EXIST.to_hresult() {
                ControlError::UnknownService(service.to_string())
            } else {
                command_error("open", service, e)
            }
        })
}

/// A service that is not running (it crashed, or someone stopped it) counts
/// as stopped, matching `systemctl stop` on an inactive unit.
fn stop_outcome(result: windows::core::Result<()>, service: &str) -> Result<(), ControlError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.code() == ERROR_SERVICE_NOT_ACTIVE.to_hresult() => {
            log::debug!("{service} was not running; nothing to stop");
            Ok(())
        }
        Err(e) => Err(command_error("stop", service, e)),
    }
}

impl ServiceControl for SystemServiceControl {
    /// Stop via ControlService
    fn stop(&self, service: &str) -> Result<(), ControlError> {
        let handle = open_service(service, SERVICE_STOP)?;
        let mut status: SERVICE_STATUS = unsafe { mem::zeroed() };
        stop_outcome(
            unsafe { ControlService(handle.0, SERVICE_CONTROL_STOP, &mut status) },
            service,
        )
    }

    /// Start via StartServiceW
    fn start(&self, service: &str) -> Result<(), ControlError> {
        let handle = open_service(service, SERVICE_START)?;
        unsafe { StartServiceW(handle.0, None) }.map_err(|e| command_error("start", service, e))
    }

    /// Query via QueryServiceStatusEx
    fn query(&self, service: &str) -> Result<ServiceState, ControlError> {
        let handle = open_service(service, SERVICE_QUERY_STATUS)?;

        let mut status: SERVICE_STATUS_PROCESS = unsafe { mem::zeroed() };
        let mut bytes_needed: u32 = 0;
        let buffer = unsafe {
            std::slice::from_raw_parts_mut(
                &mut status as *mut SERVICE_STATUS_PROCESS as *mut u8,
                mem::size_of::<SERVICE_STATUS_PROCESS>(),
            )
        };

        unsafe {
            QueryServiceStatusEx(
                handle.0,
                SC_STATUS_PROCESS_INFO,
                Some(buffer),
                &mut bytes_needed,
            )
        }
        .map_err(|e| command_error("query", service, e))?;

        Ok(match status.dwCurrentState {
            SERVICE_RUNNING => ServiceState::Running,
            SERVICE_STOPPED => ServiceState::Stopped,
            _ => ServiceState::Transitioning,
        })
    }
}

#[cfg(test)]
mod tests {
    use windows::Win32::Foundation::ERROR_ACCESS_DENIED;

    use super::*;

    #[test]
    fn stopping_an_inactive_service_succeeds() {
        let inactive = Err(ERROR_SERVICE_NOT_ACTIVE.to_hresult().into());
        assert!(stop_outcome(inactive, "W3SVC").is_ok());
    }

    #[test]
    fn other_stop_failures_are_reported() {
        let denied = Err(ERROR_ACCESS_DENIED.to_hresult().into());
        assert!(matches!(
            stop_outcome(denied, "W3SVC"),
            Err(ControlError::Command { action: "stop", .. })
        ));
    }
}

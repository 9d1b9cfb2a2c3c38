//! Fallback for targets without a known service manager.

use super::{ControlError, ServiceControl, ServiceState};

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemServiceControl;

impl ServiceControl for SystemServiceControl {
    fn stop(&self, _service: &str) -> Result<(), ControlError> {
        Err(ControlError::Unsupported)
    }

    fn start(&self, _service: &str) -> Result<(), ControlError> {
        Err(ControlError::Unsupported)
    }

    fn query(&self, _service: &str) -> Result<ServiceState, ControlError> {
        Err(ControlError::Unsupported)
    }
}

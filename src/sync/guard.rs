use log::info;

use super::instance_mutex_name;
use crate::error::PlatformError;
use crate::model::ProcessRole;
use crate::platform::{MutexHandle, SignalBackend};

/// Proof that this process is the only running instance of its role.
/// The claim lasts until the guard is dropped, normally at process exit.
pub struct InstanceGuard {
    role: ProcessRole,
    _handle: MutexHandle,
}

pub enum ClaimResult {
    Owned(InstanceGuard),
    /// Another process of the same role holds the claim.
    AlreadyRunning,
}

impl InstanceGuard {
    pub fn claim(backend: &dyn SignalBackend, role: ProcessRole) -> Result<ClaimResult, PlatformError> {
        let claim = backend.create_or_open_mutex(&instance_mutex_name(role))?;
        if claim.already_existed {
            info!("Another {} instance is already running", role.as_arg());
            return Ok(ClaimResult::AlreadyRunning);
        }
        Ok(ClaimResult::Owned(InstanceGuard {
            role,
            _handle: claim.handle,
        }))
    }

    pub fn role(&self) -> ProcessRole {
        self.role
    }
}

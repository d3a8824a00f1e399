//! Worker revision lifecycle.
//!
//! ```text
//! Idle -> Installing -> InstallFailed
//!                    -> Installed -> Activating -> Active -> Superseded
//!                                              \-> Installed (store failure, retryable)
//! ```

use serde::Serialize;
use shellcache_core::Error;
use std::fmt;

/// Lifecycle state of one worker revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Installing,
    /// Terminal. The previous generation stays authoritative.
    InstallFailed,
    Installed,
    Activating,
    Active,
    /// Terminal. A newer revision took over.
    Superseded,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Installing => "installing",
            Self::InstallFailed => "install_failed",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Superseded => "superseded",
        }
    }

    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Idle, Installing)
                | (Installing, InstallFailed)
                | (Installing, Installed)
                | (Installed, Activating)
                | (Activating, Active)
                | (Activating, Installed)
                | (Active, Superseded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::InstallFailed | Self::Superseded)
    }

    /// Only the active revision answers intercepted requests.
    pub fn intercepts(self) -> bool {
        self == Self::Active
    }

    /// Checked transition.
    pub fn advance(&mut self, next: WorkerState) -> Result<(), Error> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidTransition { from: self.to_string(), to: next.to_string() });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

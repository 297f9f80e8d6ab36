use crate::fault::ExecutionFault;

/// Per-core scheduling state seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunState {
    /// Ready to execute the next instruction.
    #[default]
    Running,
    /// Secondary core waiting to be launched.
    Dormant,
    /// Sleeping after `WFI`/`WFE` until woken by the host.
    WaitingForInterrupt,
    /// Parked after a fault under the park-core policy.
    Faulted(ExecutionFault),
}

impl RunState {
    /// Returns `true` when the core fetches on its next step.
    #[must_use]
    pub const fn is_runnable(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns the parked fault, if any.
    #[must_use]
    pub const fn latched_fault(self) -> Option<ExecutionFault> {
        match self {
            Self::Faulted(fault) => Some(fault),
            Self::Running | Self::Dormant | Self::WaitingForInterrupt => None,
        }
    }
}

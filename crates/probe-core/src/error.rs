//! Error type shared across the workspace.

use thiserror::Error;

/// Failures the supervisor can surface.
///
/// The underlying hardware protocol has no timeouts: a real Z80 always
/// answers BUSRQ and always releases IORQ. The bounded waits exist so a
/// wedged or absent CPU produces a typed error on the host instead of
/// hanging the whole system.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// BUSACK never asserted within the toggle budget.
    #[error("bus acquire timed out after {toggles} clock toggles without BUSACK")]
    AcquireTimeout { toggles: u32 },

    /// The CPU did not release IORQ after the acknowledge.
    #[error("CPU held IORQ for {toggles} clock toggles after IOACK")]
    IoAckTimeout { toggles: u32 },

    /// Single-step clock operation attempted while the waveform runs.
    #[error("clock is free-running; stop it before single-stepping")]
    ClockModeConflict,

    /// Master-mode memory access attempted without bus ownership.
    #[error("bus is CPU-owned; acquire it before master memory access")]
    NotBusMaster,
}

pub type Result<T> = std::result::Result<T, Error>;

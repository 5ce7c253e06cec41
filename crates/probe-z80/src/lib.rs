//! Bus controller and cycle-level debugger for an external Z80.
//!
//! The supervisor owns the CPU's clock and can seize its bus: step
//! execution one clock cycle at a time, intercept I/O-space cycles and
//! route them to virtual peripherals, install code over the CPU's own
//! memory, and trace execution with watch and breakpoint ranges at
//! sub-instruction granularity.
//!
//! The physical transport (port expander, GPIO block, or a simulated CPU
//! in tests) sits behind [`probe_core::BusPort`]; everything here is
//! hardware-agnostic.
//!
//! # Typical session
//!
//! Build an [`IoPortMap`] with the peripheral wiring, wrap it and the
//! port in a [`Supervisor`], `init()`, then either [`Supervisor::run`]
//! at full speed or [`Supervisor::trace`] under the tick engine with a
//! [`DebugConfig`] selecting the cycles to log and break on.

mod boundary;
mod clock;
mod dispatch;
mod drive;
mod engine;
mod iomap;
mod reset;
mod sio;
mod supervisor;
mod trace;
mod watch;

pub use boundary::PrefixTracker;
pub use clock::ClockMode;
pub use drive::{DRIVE_CONTROL, DRIVE_DATA, DRIVE_STATUS, install_drive};
pub use engine::{CancelToken, StopReason, TickOutcome};
pub use iomap::{IoPortMap, OPEN_BUS, PortHandler};
pub use sio::{
    SIO0_DATA, SIO0_STATUS, SIOA_CONTROL, SIOA_DATA, SIOB_CONTROL, SIOB_DATA, install_sio,
};
pub use supervisor::{BusOwnership, DEFAULT_TOGGLE_BUDGET, Supervisor};
pub use trace::{NullSink, TraceSink, WriteSink, long_line, short_line, stdout_sink};
pub use watch::{DebugConfig, WatchPair, WatchSpan};

//! Core traits and types for bus-level Z80 supervision.
//!
//! The supervisor talks to the outside world through narrow trait seams:
//! the physical signal lines (`BusPort`), the disassembler, and the
//! peripheral capabilities behind the I/O dispatch table. Everything here
//! is transport-agnostic; nothing assumes how a line level actually
//! reaches the CPU's pins.

mod disasm;
mod error;
mod line;
mod peripheral;
mod port;
mod status;

pub use disasm::{Disassembler, Disassembly};
pub use error::{Error, Result};
pub use line::{Direction, Level};
pub use peripheral::{BlockDevice, SerialChannel};
pub use port::{BusPort, Line, LineGroup};
pub use status::BusStatus;

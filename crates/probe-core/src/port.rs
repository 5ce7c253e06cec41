//! The signal/GPIO collaborator trait.

use crate::line::{Direction, Level};
use crate::status::BusStatus;

/// A named bus signal line.
///
/// Which side drives a line depends on bus ownership: the supervisor always
/// drives CLK, INT, NMI, RESET, BUSRQ, and IOACK; MREQ, IORQ, RD, and WR
/// are CPU outputs until the supervisor masters the bus and switches the
/// control group to output. M1, RFSH, HALT, and BUSACK are always CPU
/// outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Clk,
    Int,
    Nmi,
    Reset,
    BusRq,
    BusAck,
    IoAck,
    Mreq,
    Iorq,
    Rd,
    Wr,
    M1,
    Rfsh,
    Halt,
}

/// A group of lines whose direction switches together on bus handover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineGroup {
    /// MREQ, IORQ, RD, WR.
    Control,
    /// A0-A15.
    Address,
    /// D0-D7.
    Data,
}

/// Physical access to the bus signal lines.
///
/// This is the seam between the supervisor and whatever transport actually
/// reaches the CPU's pins: a port expander, memory-mapped GPIO, or a
/// simulated CPU in tests. Implementations own the fixed direction setup of
/// the dedicated supervisor outputs (CLK, INT, NMI, RESET, BUSRQ, IOACK)
/// and CPU outputs (M1, RFSH, HALT, BUSACK); only the switchable groups go
/// through [`BusPort::set_direction`].
///
/// Writes to a line whose group is currently an input are latched by the
/// implementation but have no electrical effect until the group switches to
/// output, matching port-expander hardware.
pub trait BusPort {
    /// Read the current level of a line.
    fn level(&mut self, line: Line) -> Level;

    /// Drive a line to the given level.
    fn drive(&mut self, line: Line, level: Level);

    /// Switch the direction of a line group.
    fn set_direction(&mut self, group: LineGroup, direction: Direction);

    /// Read the 16-bit address bus.
    fn address(&mut self) -> u16;

    /// Drive the address bus (address group must be output).
    fn set_address(&mut self, address: u16);

    /// Read the 8-bit data bus.
    fn data(&mut self) -> u8;

    /// Drive the data bus (data group must be output).
    fn set_data(&mut self, value: u8);

    /// Atomic snapshot of every line plus address and data.
    ///
    /// All fields must reflect the same instant; the tick engine depends on
    /// no field lagging a clock edge behind another.
    fn status(&mut self) -> BusStatus;

    /// Select a memory bank, on hardware that has a bank latch.
    fn set_bank(&mut self, _bank: u8) {}

    /// Start the free-running clock waveform: fixed short low phase,
    /// shortest representable high phase.
    fn start_clock_waveform(&mut self);

    /// Stop the free-running waveform. The clock line is left wherever the
    /// waveform parked it; callers wanting a defined level drive it low.
    fn stop_clock_waveform(&mut self);
}

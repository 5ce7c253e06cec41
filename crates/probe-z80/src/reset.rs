//! CPU reset sequencing.

use probe_core::{BusPort, Level, Line, Result};

use crate::supervisor::Supervisor;

/// Unconditional jump opcode, for the reset-vector install.
const JP: u8 = 0xC3;

impl<P: BusPort> Supervisor<P> {
    /// Reset the CPU so it starts executing at `addr`.
    ///
    /// For any target other than the default vector 0x0000, a `jp addr`
    /// is first written at 0x0000 through the master memory-write path;
    /// the caller must already hold the bus for that (this function
    /// composes with whatever ownership is active and never
    /// acquires/releases itself). Then RESET is held for exactly 3 clock
    /// cycles and IOACK is pulsed so no stale WAIT state survives the
    /// reset.
    pub fn reset_to(&mut self, addr: u16) -> Result<()> {
        if addr != 0x0000 {
            let vector = [JP, addr as u8, (addr >> 8) as u8];
            self.mem_write(0x0000, &vector)?;
        }

        log::debug!("resetting CPU, start vector {addr:04X}");
        self.port.drive(Line::Reset, Level::Low);
        self.clock_cycle(3)?;
        self.port.drive(Line::Reset, Level::High);
        self.pulse_ioack();
        Ok(())
    }
}

//! Servicing of CPU-initiated I/O requests.

use probe_core::{BusPort, BusStatus, Direction, Error, Level, Line, LineGroup, Result};

use crate::supervisor::Supervisor;

impl<P: BusPort> Supervisor<P> {
    /// Service one I/O-space cycle through the dispatch table.
    ///
    /// Call only when `status` shows an active IORQ. For reads the
    /// handler's value is driven onto the data bus before the
    /// acknowledge; for writes the handler receives the byte the CPU
    /// drove. The CPU sits in a WAIT state until IOACK asserts, so after
    /// the handler runs this toggles the clock until IORQ de-asserts,
    /// and only then returns data to input and releases the acknowledge.
    /// Releasing IOACK while IORQ is still active risks the CPU
    /// resampling stale data.
    pub(crate) fn service_io_request(&mut self, status: &BusStatus) -> Result<()> {
        let port = status.addr as u8;

        if status.read_active() {
            let value = self.io_map.read(port);
            self.port.set_data(value);
            self.port.set_direction(LineGroup::Data, Direction::Output);
        } else if status.write_active() {
            self.io_map.write(port, status.data);
        }

        self.port.drive(Line::IoAck, Level::Low);
        let mut toggles = 0;
        while self.port.level(Line::Iorq).is_low() {
            if toggles >= self.toggle_budget {
                self.port.set_direction(LineGroup::Data, Direction::Input);
                self.port.drive(Line::IoAck, Level::High);
                return Err(Error::IoAckTimeout { toggles });
            }
            self.toggle_clock();
            toggles += 1;
        }
        self.port.set_direction(LineGroup::Data, Direction::Input);
        self.port.drive(Line::IoAck, Level::High);
        Ok(())
    }
}

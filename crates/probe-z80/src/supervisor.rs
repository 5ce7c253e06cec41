//! Bus ownership: arbitration and master-mode memory access.

use probe_core::{BusPort, Direction, Error, Level, Line, LineGroup, Result};

use crate::boundary::PrefixTracker;
use crate::clock::ClockMode;
use crate::iomap::IoPortMap;

/// Default bound on the clock-toggle busy-waits.
///
/// A real Z80 answers BUSRQ within a handful of machine cycles and releases
/// IORQ right after the acknowledge; the budget only has to be generous
/// enough never to fire against working hardware.
pub const DEFAULT_TOGGLE_BUDGET: u32 = 100_000;

/// Who currently drives the address and control lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOwnership {
    CpuOwned,
    SupervisorOwned,
}

/// The bus supervisor.
///
/// Owns the signal port and the I/O dispatch table, and is the single
/// authority for line-direction changes and clock mode. All bus activity,
/// from arbitration to per-cycle tracing, goes through methods on this
/// type; the impl blocks are spread across the sibling modules by concern.
pub struct Supervisor<P: BusPort> {
    pub(crate) port: P,
    pub(crate) io_map: IoPortMap,
    pub(crate) clock_mode: ClockMode,
    pub(crate) ownership: BusOwnership,
    pub(crate) toggle_budget: u32,
    pub(crate) tracker: PrefixTracker,
}

impl<P: BusPort> Supervisor<P> {
    /// Wrap a signal port and a fully built dispatch table.
    ///
    /// The port map is fixed from here on; there is no way to install
    /// further handlers through the supervisor.
    #[must_use]
    pub fn new(port: P, io_map: IoPortMap) -> Self {
        Self {
            port,
            io_map,
            clock_mode: ClockMode::Stopped,
            ownership: BusOwnership::CpuOwned,
            toggle_budget: DEFAULT_TOGGLE_BUDGET,
            tracker: PrefixTracker::new(),
        }
    }

    /// Bring the bus to its power-on state: supervisor outputs at their
    /// inactive defaults, bank 0, CPU reset to the default vector, bus
    /// released to the CPU.
    pub fn init(&mut self) -> Result<()> {
        self.port.drive(Line::Int, Level::High);
        self.port.drive(Line::Nmi, Level::High);
        self.port.drive(Line::Reset, Level::High);
        self.port.drive(Line::BusRq, Level::High);
        self.port.drive(Line::IoAck, Level::High);
        self.port.set_bank(0);

        self.reset_to(0x0000)?;
        self.release();
        Ok(())
    }

    #[must_use]
    pub fn ownership(&self) -> BusOwnership {
        self.ownership
    }

    /// Bound for the BUSACK and IORQ-release busy-waits, in clock toggles.
    pub fn set_toggle_budget(&mut self, budget: u32) {
        self.toggle_budget = budget;
    }

    /// Request bus mastership from the CPU, using the configured toggle
    /// budget as the deadline.
    pub fn acquire(&mut self) -> Result<()> {
        self.acquire_within(self.toggle_budget)
    }

    /// Request bus mastership, waiting at most `budget` clock toggles for
    /// the CPU's acknowledge.
    ///
    /// Asserts BUSRQ, pulses IOACK so a CPU latched in a WAIT state can
    /// get moving again, then toggles the clock until BUSACK asserts;
    /// some bus-release paths inside the CPU only complete on a clock
    /// edge, so polling without toggling can wait forever. On success the
    /// control and address groups switch to output with every strobe
    /// de-asserted, and data stays input: the supervisor never drives
    /// data on acquire, dispatch switches it per-cycle.
    pub fn acquire_within(&mut self, budget: u32) -> Result<()> {
        if self.clock_mode == ClockMode::FreeRunning {
            return Err(Error::ClockModeConflict);
        }

        self.port.drive(Line::BusRq, Level::Low);
        self.pulse_ioack();

        let mut toggles = 0;
        while self.port.level(Line::BusAck).is_high() {
            if toggles >= budget {
                self.port.drive(Line::BusRq, Level::High);
                return Err(Error::AcquireTimeout { toggles });
            }
            self.toggle_clock();
            toggles += 1;
        }
        log::debug!("bus acquired after {toggles} clock toggles");

        for line in [Line::Mreq, Line::Iorq, Line::Rd, Line::Wr] {
            self.port.drive(line, Level::High);
        }
        self.port.set_direction(LineGroup::Control, Direction::Output);
        self.port.set_direction(LineGroup::Address, Direction::Output);
        self.port.set_direction(LineGroup::Data, Direction::Input);
        self.ownership = BusOwnership::SupervisorOwned;
        Ok(())
    }

    /// Return the bus to the CPU. It resumes autonomous execution
    /// immediately once BUSRQ de-asserts.
    pub fn release(&mut self) {
        self.port.set_direction(LineGroup::Control, Direction::Input);
        self.port.set_direction(LineGroup::Address, Direction::Input);
        self.port.set_direction(LineGroup::Data, Direction::Input);
        self.port.drive(Line::BusRq, Level::High);
        self.ownership = BusOwnership::CpuOwned;
    }

    /// Write bytes to memory while holding the bus.
    ///
    /// Static RAM needs no clock; each byte is one address/data setup and
    /// one MREQ/WR strobe pulse.
    pub fn mem_write(&mut self, addr: u16, bytes: &[u8]) -> Result<()> {
        if self.ownership != BusOwnership::SupervisorOwned {
            return Err(Error::NotBusMaster);
        }

        self.port.set_direction(LineGroup::Data, Direction::Output);
        for (i, &byte) in bytes.iter().enumerate() {
            self.port.set_address(addr.wrapping_add(i as u16));
            self.port.set_data(byte);
            self.port.drive(Line::Mreq, Level::Low);
            self.port.drive(Line::Wr, Level::Low);
            self.port.drive(Line::Wr, Level::High);
            self.port.drive(Line::Mreq, Level::High);
        }
        self.port.set_direction(LineGroup::Data, Direction::Input);
        Ok(())
    }

    /// Read bytes from memory while holding the bus.
    pub fn mem_read(&mut self, addr: u16, buf: &mut [u8]) -> Result<()> {
        if self.ownership != BusOwnership::SupervisorOwned {
            return Err(Error::NotBusMaster);
        }

        for (i, slot) in buf.iter_mut().enumerate() {
            self.port.set_address(addr.wrapping_add(i as u16));
            self.port.drive(Line::Mreq, Level::Low);
            self.port.drive(Line::Rd, Level::Low);
            *slot = self.port.data();
            self.port.drive(Line::Rd, Level::High);
            self.port.drive(Line::Mreq, Level::High);
        }
        Ok(())
    }

    /// IOACK low then high: clears any WAIT state the CPU is latched in.
    pub(crate) fn pulse_ioack(&mut self) {
        self.port.drive(Line::IoAck, Level::Low);
        self.port.drive(Line::IoAck, Level::High);
    }

    /// Direct access to the underlying port, for host integrations that
    /// need lines this supervisor doesn't manage (e.g. INT/NMI).
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_port(self) -> P {
        self.port
    }
}

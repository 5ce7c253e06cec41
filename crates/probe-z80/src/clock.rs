//! Clock generation: free-running waveform or software-stepped edges.

use probe_core::{BusPort, Error, Level, Line, Result};

use crate::supervisor::Supervisor;

/// How the CPU clock is currently produced.
///
/// `FreeRunning` and software stepping are mutually exclusive; the
/// supervisor checks the mode at every stepping entry point instead of
/// trusting callers to sequence `clock_stop` themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// Waveform off, line parked low.
    Stopped,
    /// Hardware waveform generator running.
    FreeRunning,
    /// Edges produced one at a time under software control.
    SingleStep,
}

impl<P: BusPort> Supervisor<P> {
    #[must_use]
    pub fn clock_mode(&self) -> ClockMode {
        self.clock_mode
    }

    /// Start the free-running waveform: fixed short low phase, shortest
    /// representable high phase. Near-minimum duty, but within CPU timing.
    pub fn clock_run(&mut self) {
        self.port.start_clock_waveform();
        self.clock_mode = ClockMode::FreeRunning;
    }

    /// Stop the waveform and park the clock line low.
    pub fn clock_stop(&mut self) {
        self.port.stop_clock_waveform();
        self.port.drive(Line::Clk, Level::Low);
        self.clock_mode = ClockMode::Stopped;
    }

    /// Force the line low once, then emit exactly `cycles` high/low edge
    /// pairs. Used for reset pulses and other fixed-width sequencing.
    pub fn clock_cycle(&mut self, cycles: u8) -> Result<()> {
        if self.clock_mode == ClockMode::FreeRunning {
            return Err(Error::ClockModeConflict);
        }
        self.clock_mode = ClockMode::SingleStep;

        self.port.drive(Line::Clk, Level::Low);
        for _ in 0..cycles {
            self.port.drive(Line::Clk, Level::High);
            self.port.drive(Line::Clk, Level::Low);
        }
        Ok(())
    }

    /// One clock edge, for the busy-waits that poll an external
    /// acknowledge. Callers have already checked the mode.
    pub(crate) fn toggle_clock(&mut self) {
        let level = self.port.level(Line::Clk);
        self.port.drive(Line::Clk, level.toggled());
        self.clock_mode = ClockMode::SingleStep;
    }
}

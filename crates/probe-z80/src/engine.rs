//! The bus-cycle tick engine and the trace/debug loop.
//!
//! `tick` is the single synchronization point where the supervisor and
//! the external CPU agree on bus-cycle boundaries. Everything else
//! (dispatch, watch/break, instruction counting, the disassembler's byte
//! reads) hangs off it; it must never skip or double-count a cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use probe_core::{BusPort, BusStatus, Disassembler, Error, Level, Line, Result};

use crate::boundary::PrefixTracker;
use crate::clock::ClockMode;
use crate::iomap::OPEN_BUS;
use crate::supervisor::Supervisor;
use crate::trace::TraceSink;
use crate::watch::DebugConfig;

/// What one tick observed.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    /// The cycle's atomic status snapshot.
    pub status: BusStatus,
    /// A break span matched this cycle.
    pub breakpoint: bool,
    /// This cycle was the opening fetch of a new instruction, per the
    /// boundary heuristic.
    pub new_instruction: bool,
}

/// Why the trace loop stopped. The three hardware reasons and
/// cancellation are equally valid; callers distinguish all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The CPU's HALT line went (or was) inactive.
    Halted,
    /// The instruction-count limit was reached.
    LimitReached,
    /// A break span matched.
    Breakpoint,
    /// The cancellation token was set.
    Cancelled,
}

/// Cooperative cancellation for the trace and run loops.
///
/// Checked once per tick; setting it from another context stops the loop
/// at the next cycle boundary without changing tick semantics.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl<P: BusPort> Supervisor<P> {
    /// Advance the bus by one clock cycle and process whatever it carried.
    ///
    /// In order: drive the clock low then high, take the atomic status
    /// snapshot, classify the cycle, service an I/O request if one is
    /// active, apply watch/break spans. Read-vs-write classification
    /// compares the previous tick's strobe levels against the current
    /// ones, so a category fires exactly once per bus transaction (on the
    /// falling edge) no matter how many clock cycles the strobes stay
    /// asserted.
    pub fn tick(&mut self, cfg: &DebugConfig, sink: &mut dyn TraceSink) -> Result<TickOutcome> {
        if self.clock_mode == ClockMode::FreeRunning {
            return Err(Error::ClockModeConflict);
        }

        let last_rd = self.port.level(Line::Rd);
        let last_wr = self.port.level(Line::Wr);

        self.port.drive(Line::Clk, Level::Low);
        self.port.drive(Line::Clk, Level::High);
        self.clock_mode = ClockMode::SingleStep;
        let status = self.port.status();

        let rd_edge = last_rd.is_high() && status.read_active();
        let wr_edge = last_wr.is_high() && status.write_active();

        let mut logged = false;
        let mut breakpoint = false;

        // MREQ and IORQ are mutually exclusive on a working CPU; memory
        // is tested first.
        if status.mem_active() {
            if rd_edge {
                if cfg.mem_read.log.contains(status.addr) {
                    sink.cycle(&status);
                    logged = true;
                }
                breakpoint = cfg.mem_read.brk.contains(status.addr);
            } else if wr_edge {
                if cfg.mem_write.log.contains(status.addr) {
                    sink.cycle(&status);
                    logged = true;
                }
                breakpoint = cfg.mem_write.brk.contains(status.addr);
            }
        } else if status.io_active() {
            let port = status.addr as u8;
            if rd_edge {
                if cfg.io_read.log.contains(port) {
                    sink.cycle(&status);
                    logged = true;
                }
                breakpoint = cfg.io_read.brk.contains(port);
            } else if wr_edge {
                if cfg.io_write.log.contains(port) {
                    sink.cycle(&status);
                    logged = true;
                }
                breakpoint = cfg.io_write.brk.contains(port);
            }
            self.service_io_request(&status)?;
        }

        // The fetch stream feeds the boundary tracker once per fetch
        // transaction, on its opening edge.
        let fetch_edge = rd_edge && status.opcode_fetch();
        let new_instruction = fetch_edge && self.tracker.starts_instruction(status.data);
        if fetch_edge && cfg.op_fetch.brk.contains(status.addr) {
            breakpoint = true;
        }

        // The generic bus category only logs cycles nothing more specific
        // claimed; its break span applies to every cycle.
        if !logged && cfg.bus.log.contains(status.addr) {
            sink.cycle(&status);
        }
        if cfg.bus.brk.contains(status.addr) {
            breakpoint = true;
        }

        Ok(TickOutcome {
            status,
            breakpoint,
            new_instruction,
        })
    }

    /// Read one byte off the bus by ticking the CPU through a memory-read
    /// transaction.
    ///
    /// This is the byte-reader capability handed to the disassembler:
    /// reads consume real bus cycles, so the CPU advances in step with
    /// the decode. If a read transaction is already in progress the byte
    /// on the bus is taken as-is. Break spans matching during these ticks
    /// are not acted upon.
    pub fn bus_read(&mut self, cfg: &DebugConfig, sink: &mut dyn TraceSink) -> Result<u8> {
        while !(self.port.level(Line::Mreq).is_low() && self.port.level(Line::Rd).is_low()) {
            self.tick(cfg, sink)?;
        }
        let data = self.port.data();
        while self.port.level(Line::Mreq).is_low() || self.port.level(Line::Rd).is_low() {
            self.tick(cfg, sink)?;
        }
        Ok(data)
    }

    /// Trace execution for `limit` instructions (0 = unbounded).
    ///
    /// Drives the tick engine while the halt line permits execution, no
    /// break span matches, the limit is not exceeded, and the token is
    /// not cancelled. At each instruction boundary the disassembler is
    /// invoked with the fetch address and the bus-read capability; the
    /// mnemonic is echoed through the sink when the opcode-fetch log
    /// span covers the address.
    pub fn trace(
        &mut self,
        limit: u32,
        cfg: &DebugConfig,
        sink: &mut dyn TraceSink,
        disasm: &mut dyn Disassembler,
        cancel: &CancelToken,
    ) -> Result<StopReason> {
        self.tracker = PrefixTracker::new();
        let mut count: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }
            if self.port.level(Line::Halt).is_low() {
                return Ok(StopReason::Halted);
            }
            if limit != 0 && count >= limit {
                return Ok(StopReason::LimitReached);
            }

            let outcome = self.tick(cfg, sink)?;

            if outcome.new_instruction {
                let addr = outcome.status.addr;
                count += 1;

                let mut fetch_failure = None;
                let rendered = disasm.disassemble(addr, &mut || {
                    match self.bus_read(cfg, sink) {
                        Ok(byte) => byte,
                        Err(e) => {
                            fetch_failure = Some(e);
                            OPEN_BUS
                        }
                    }
                });
                if let Some(e) = fetch_failure {
                    return Err(e);
                }
                if cfg.op_fetch.log.contains(addr) {
                    sink.instruction(addr, &rendered.text);
                }
            }

            // Checked after the fetch handling so the breaking
            // instruction is still counted and rendered.
            if outcome.breakpoint {
                return Ok(StopReason::Breakpoint);
            }
        }
    }

    /// Run the CPU at full speed, servicing I/O requests as they appear.
    ///
    /// The clock free-runs; the supervisor only watches for IORQ, stops
    /// the waveform to service the request under software clocking, and
    /// restarts it. Returns when the halt line drops or the token is
    /// cancelled, with the clock stopped and parked low.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<()> {
        self.clock_run();
        while self.port.level(Line::Halt).is_high() && !cancel.is_cancelled() {
            if self.port.level(Line::Iorq).is_low() {
                self.clock_stop();
                let status = self.port.status();
                self.service_io_request(&status)?;
                self.clock_run();
            }
        }
        self.clock_stop();
        Ok(())
    }
}

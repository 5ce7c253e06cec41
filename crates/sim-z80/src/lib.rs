//! Simulated Z80 bus agent.
//!
//! Implements [`BusPort`] over a scripted state machine instead of real
//! hardware, so the supervisor can be exercised cycle-by-cycle in plain
//! unit tests: bus-grant handshakes (including a CPU that never grants),
//! memory and I/O transactions with WAIT-state behaviour, reset pulse
//! observation, and master-mode memory access against a 64K RAM.
//!
//! # Timing model
//!
//! The simulated CPU advances on rising clock edges. A memory transaction
//! occupies three edges (assert, hold, release); an I/O transaction
//! asserts its strobes and then holds them, WAIT-style, until it observes
//! IOACK low on an edge. In free-running clock mode there is no explicit
//! clock line to edge, so the CPU advances once per line poll instead,
//! which is enough asynchrony for the run-loop's IORQ polling to be
//! realistic.
//!
//! Side effects the supervisor causes (master writes, reset pulses, IOACK
//! pulses, bus handover) are recorded in an event journal for ordering
//! assertions.

use std::collections::VecDeque;

use probe_core::{BusPort, BusStatus, Direction, Level, Line, LineGroup};

/// One scripted bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCycle {
    /// Opcode fetch: M1 + MREQ + RD, data served from RAM.
    Fetch { addr: u16 },
    /// Memory read, data served from RAM.
    MemRead { addr: u16 },
    /// Memory write into RAM.
    MemWrite { addr: u16, data: u8 },
    /// Refresh cycle: RFSH + MREQ, no data strobe.
    Refresh { addr: u16 },
    /// I/O read: IORQ + RD, held until IOACK.
    IoRead { port: u8 },
    /// I/O write: IORQ + WR, held until IOACK.
    IoWrite { port: u8, data: u8 },
    /// Internal cycle, no bus activity.
    Idle,
    /// HALT executed: the halt line drops and stays down.
    Halt,
}

/// Supervisor-caused side effect, in observation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// Master-mode memory write committed.
    MasterWrite { addr: u16, data: u8 },
    /// Master-mode memory read strobed.
    MasterRead { addr: u16 },
    ResetAsserted,
    /// Reset released after this many clock cycles held low.
    ResetReleased { clocks: u32 },
    IoAckPulse,
    BusGranted,
    BusReleased,
}

/// Grant countdown value for a CPU that never answers BUSRQ.
pub const NEVER: u32 = u32::MAX;

/// The simulated CPU and its bus.
pub struct SimZ80 {
    ram: Vec<u8>,

    // Supervisor-driven lines, latched on drive().
    clk: Level,
    int: Level,
    nmi: Level,
    reset: Level,
    busrq: Level,
    ioack: Level,
    sup_mreq: Level,
    sup_iorq: Level,
    sup_rd: Level,
    sup_wr: Level,
    sup_addr: u16,
    sup_data: u8,
    bank: u8,

    // Switchable group directions, supervisor side.
    ctrl_dir: Direction,
    addr_dir: Direction,
    data_dir: Direction,

    // CPU-driven lines.
    cpu_m1: Level,
    cpu_mreq: Level,
    cpu_iorq: Level,
    cpu_rd: Level,
    cpu_wr: Level,
    cpu_rfsh: Level,
    halt: Level,
    busack: Level,
    cpu_addr: u16,
    cpu_data: u8,

    script: VecDeque<SimCycle>,
    current: Option<SimCycle>,
    phase: u8,
    halted: bool,

    /// Rising edges between BUSRQ and BUSACK; [`NEVER`] never grants.
    grant_after: u32,
    grant_countdown: u32,
    granted: bool,

    free_running: bool,
    reset_clocks: u32,
    /// Wedged-CPU mode: IORQ is never released even after IOACK.
    stuck_iorq: bool,

    events: Vec<SimEvent>,
    /// (port, data) pairs the CPU sampled on I/O reads.
    io_reads: Vec<(u8, u8)>,
}

impl SimZ80 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ram: vec![0; 0x1_0000],
            clk: Level::Low,
            int: Level::High,
            nmi: Level::High,
            reset: Level::High,
            busrq: Level::High,
            ioack: Level::High,
            sup_mreq: Level::High,
            sup_iorq: Level::High,
            sup_rd: Level::High,
            sup_wr: Level::High,
            sup_addr: 0,
            sup_data: 0,
            bank: 0,
            ctrl_dir: Direction::Input,
            addr_dir: Direction::Input,
            data_dir: Direction::Input,
            cpu_m1: Level::High,
            cpu_mreq: Level::High,
            cpu_iorq: Level::High,
            cpu_rd: Level::High,
            cpu_wr: Level::High,
            cpu_rfsh: Level::High,
            halt: Level::High,
            busack: Level::High,
            cpu_addr: 0,
            cpu_data: 0,
            script: VecDeque::new(),
            current: None,
            phase: 0,
            halted: false,
            grant_after: 2,
            grant_countdown: 2,
            granted: false,
            free_running: false,
            reset_clocks: 0,
            stuck_iorq: false,
            events: Vec::new(),
            io_reads: Vec::new(),
        }
    }

    /// Load bytes into RAM.
    pub fn load(&mut self, addr: u16, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.ram[addr.wrapping_add(i as u16) as usize] = b;
        }
    }

    #[must_use]
    pub fn ram(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    /// Append transactions to the script.
    pub fn queue(&mut self, cycles: &[SimCycle]) {
        self.script.extend(cycles.iter().copied());
    }

    /// Rising edges between BUSRQ assertion and the grant. [`NEVER`]
    /// simulates a CPU that never releases the bus.
    pub fn set_grant_after(&mut self, edges: u32) {
        self.grant_after = edges;
        self.grant_countdown = edges;
    }

    /// Wedge the CPU so it never releases IORQ, for timeout tests.
    pub fn set_stuck_iorq(&mut self, stuck: bool) {
        self.stuck_iorq = stuck;
    }

    /// Force the halt line, e.g. to start a test with the CPU held.
    pub fn set_halt(&mut self, level: Level) {
        self.halt = level;
        self.halted = level.is_low();
    }

    #[must_use]
    pub fn granted(&self) -> bool {
        self.granted
    }

    #[must_use]
    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    #[must_use]
    pub fn io_reads(&self) -> &[(u8, u8)] {
        &self.io_reads
    }

    /// Script fully consumed and no transaction in flight.
    #[must_use]
    pub fn script_done(&self) -> bool {
        self.script.is_empty() && self.current.is_none()
    }

    fn release_strobes(&mut self) {
        self.cpu_m1 = Level::High;
        self.cpu_mreq = Level::High;
        self.cpu_iorq = Level::High;
        self.cpu_rd = Level::High;
        self.cpu_wr = Level::High;
        self.cpu_rfsh = Level::High;
    }

    /// Read a line without advancing the free-running CPU.
    fn peek(&self, line: Line) -> Level {
        match line {
            Line::Clk => self.clk,
            Line::Int => self.int,
            Line::Nmi => self.nmi,
            Line::Reset => self.reset,
            Line::BusRq => self.busrq,
            Line::IoAck => self.ioack,
            Line::Mreq => self.merged(self.sup_mreq, self.cpu_mreq),
            Line::Iorq => self.merged(self.sup_iorq, self.cpu_iorq),
            Line::Rd => self.merged(self.sup_rd, self.cpu_rd),
            Line::Wr => self.merged(self.sup_wr, self.cpu_wr),
            Line::M1 => self.cpu_m1,
            Line::Rfsh => self.cpu_rfsh,
            Line::Halt => self.halt,
            Line::BusAck => self.busack,
        }
    }

    fn merged(&self, sup: Level, cpu: Level) -> Level {
        if self.ctrl_dir == Direction::Output {
            sup
        } else {
            cpu
        }
    }

    /// One rising clock edge.
    fn advance(&mut self) {
        if self.reset.is_low() {
            self.reset_clocks += 1;
            return;
        }

        // Bus handshake has priority over everything else.
        if self.busrq.is_low() {
            if !self.granted && self.grant_after != NEVER {
                if self.grant_countdown > 0 {
                    self.grant_countdown -= 1;
                }
                if self.grant_countdown == 0 {
                    self.granted = true;
                    self.busack = Level::Low;
                    self.release_strobes();
                    self.current = None;
                    self.events.push(SimEvent::BusGranted);
                }
            }
            return;
        }

        if self.halted {
            return;
        }

        if self.current.is_none() {
            let Some(cycle) = self.script.pop_front() else {
                return;
            };
            self.current = Some(cycle);
            self.phase = 0;
            self.assert_cycle(cycle);
            return;
        }

        match self.current {
            Some(SimCycle::IoRead { port }) => {
                if self.ioack.is_low() && !self.stuck_iorq {
                    // Supervisor acknowledged; sample whatever it drove.
                    self.io_reads.push((port, self.sup_data));
                    self.release_strobes();
                    self.current = None;
                }
            }
            Some(SimCycle::IoWrite { .. }) => {
                if self.ioack.is_low() && !self.stuck_iorq {
                    self.release_strobes();
                    self.current = None;
                }
            }
            Some(_) => {
                self.phase += 1;
                if self.phase >= 2 {
                    self.release_strobes();
                    self.current = None;
                }
            }
            None => {}
        }
    }

    fn assert_cycle(&mut self, cycle: SimCycle) {
        match cycle {
            SimCycle::Fetch { addr } => {
                self.cpu_m1 = Level::Low;
                self.cpu_mreq = Level::Low;
                self.cpu_rd = Level::Low;
                self.cpu_addr = addr;
                self.cpu_data = self.ram[addr as usize];
            }
            SimCycle::MemRead { addr } => {
                self.cpu_mreq = Level::Low;
                self.cpu_rd = Level::Low;
                self.cpu_addr = addr;
                self.cpu_data = self.ram[addr as usize];
            }
            SimCycle::MemWrite { addr, data } => {
                self.cpu_mreq = Level::Low;
                self.cpu_wr = Level::Low;
                self.cpu_addr = addr;
                self.cpu_data = data;
                self.ram[addr as usize] = data;
            }
            SimCycle::Refresh { addr } => {
                self.cpu_rfsh = Level::Low;
                self.cpu_mreq = Level::Low;
                self.cpu_addr = addr;
            }
            SimCycle::IoRead { port } => {
                self.cpu_iorq = Level::Low;
                self.cpu_rd = Level::Low;
                self.cpu_addr = u16::from(port);
            }
            SimCycle::IoWrite { port, data } => {
                self.cpu_iorq = Level::Low;
                self.cpu_wr = Level::Low;
                self.cpu_addr = u16::from(port);
                self.cpu_data = data;
            }
            SimCycle::Idle => {
                self.current = None;
            }
            SimCycle::Halt => {
                self.halt = Level::Low;
                self.halted = true;
                self.current = None;
            }
        }
    }
}

impl Default for SimZ80 {
    fn default() -> Self {
        Self::new()
    }
}

impl BusPort for SimZ80 {
    fn level(&mut self, line: Line) -> Level {
        // A free-running clock means time passes while the supervisor
        // merely polls, so each poll costs one edge.
        if self.free_running {
            self.advance();
        }
        self.peek(line)
    }

    fn drive(&mut self, line: Line, level: Level) {
        match line {
            Line::Clk => {
                let rising = self.clk.is_low() && level.is_high();
                self.clk = level;
                if rising {
                    self.advance();
                }
            }
            Line::Int => self.int = level,
            Line::Nmi => self.nmi = level,
            Line::Reset => {
                if self.reset.is_high() && level.is_low() {
                    self.reset_clocks = 0;
                    self.events.push(SimEvent::ResetAsserted);
                } else if self.reset.is_low() && level.is_high() {
                    self.events.push(SimEvent::ResetReleased {
                        clocks: self.reset_clocks,
                    });
                }
                self.reset = level;
            }
            Line::BusRq => {
                if self.granted && level.is_high() {
                    self.granted = false;
                    self.busack = Level::High;
                    self.grant_countdown = self.grant_after;
                    self.events.push(SimEvent::BusReleased);
                }
                self.busrq = level;
            }
            Line::IoAck => {
                if self.ioack.is_low() && level.is_high() {
                    self.events.push(SimEvent::IoAckPulse);
                }
                self.ioack = level;
            }
            Line::Mreq => self.sup_mreq = level,
            Line::Iorq => self.sup_iorq = level,
            Line::Rd => {
                if self.ctrl_dir == Direction::Output
                    && self.sup_mreq.is_low()
                    && self.sup_rd.is_high()
                    && level.is_low()
                {
                    self.events.push(SimEvent::MasterRead {
                        addr: self.sup_addr,
                    });
                }
                self.sup_rd = level;
            }
            Line::Wr => {
                // SRAM-style latch on the rising edge of WR.
                if self.ctrl_dir == Direction::Output
                    && self.sup_mreq.is_low()
                    && self.sup_wr.is_low()
                    && level.is_high()
                {
                    self.ram[self.sup_addr as usize] = self.sup_data;
                    self.events.push(SimEvent::MasterWrite {
                        addr: self.sup_addr,
                        data: self.sup_data,
                    });
                }
                self.sup_wr = level;
            }
            Line::M1 | Line::Rfsh | Line::Halt | Line::BusAck => {
                // CPU outputs; a real expander write would be a wiring
                // bug, a latched no-op here.
            }
        }
    }

    fn set_direction(&mut self, group: LineGroup, direction: Direction) {
        match group {
            LineGroup::Control => self.ctrl_dir = direction,
            LineGroup::Address => self.addr_dir = direction,
            LineGroup::Data => self.data_dir = direction,
        }
    }

    fn address(&mut self) -> u16 {
        if self.addr_dir == Direction::Output {
            self.sup_addr
        } else {
            self.cpu_addr
        }
    }

    fn set_address(&mut self, address: u16) {
        self.sup_addr = address;
    }

    fn data(&mut self) -> u8 {
        if self.data_dir == Direction::Output {
            self.sup_data
        } else if self.ctrl_dir == Direction::Output
            && self.sup_mreq.is_low()
            && self.sup_rd.is_low()
        {
            // Master-mode read: RAM answers the supervisor's strobes.
            self.ram[self.sup_addr as usize]
        } else {
            self.cpu_data
        }
    }

    fn set_data(&mut self, value: u8) {
        self.sup_data = value;
    }

    fn status(&mut self) -> BusStatus {
        BusStatus {
            clk: self.peek(Line::Clk),
            m1: self.peek(Line::M1),
            mreq: self.peek(Line::Mreq),
            iorq: self.peek(Line::Iorq),
            ioack: self.peek(Line::IoAck),
            rd: self.peek(Line::Rd),
            wr: self.peek(Line::Wr),
            rfsh: self.peek(Line::Rfsh),
            halt: self.peek(Line::Halt),
            int: self.peek(Line::Int),
            nmi: self.peek(Line::Nmi),
            reset: self.peek(Line::Reset),
            busrq: self.peek(Line::BusRq),
            busack: self.peek(Line::BusAck),
            addr: self.address(),
            data: self.data(),
            bank: Some(self.bank),
        }
    }

    fn set_bank(&mut self, bank: u8) {
        self.bank = bank;
    }

    fn start_clock_waveform(&mut self) {
        self.free_running = true;
    }

    fn stop_clock_waveform(&mut self) {
        self.free_running = false;
    }
}

//! Tick-engine classification, watch/break behaviour, and trace-loop
//! termination, driven against the simulated CPU.

use std::cell::RefCell;
use std::rc::Rc;

use probe_core::{
    BusStatus, Disassembler, Disassembly, Error, Level, SerialChannel,
};
use probe_z80::{
    CancelToken, ClockMode, DebugConfig, IoPortMap, NullSink, StopReason, Supervisor, TraceSink,
    WatchSpan, install_sio,
};
use sim_z80::{SimCycle, SimZ80};

/// Captures records structurally instead of as text.
#[derive(Default)]
struct RecordingSink {
    cycles: Vec<BusStatus>,
    instructions: Vec<(u16, String)>,
}

impl TraceSink for RecordingSink {
    fn cycle(&mut self, status: &BusStatus) {
        self.cycles.push(*status);
    }

    fn instruction(&mut self, address: u16, mnemonic: &str) {
        self.instructions.push((address, mnemonic.to_string()));
    }
}

/// Renders `length` fetched bytes as a hex blob. Every byte goes through
/// the supervisor's bus-read capability.
struct FakeDisasm {
    length: u8,
}

impl Disassembler for FakeDisasm {
    fn disassemble(&mut self, _address: u16, fetch: &mut dyn FnMut() -> u8) -> Disassembly {
        let bytes: Vec<String> = (0..self.length).map(|_| format!("{:02x}", fetch())).collect();
        Disassembly {
            text: format!("db {}", bytes.join(" ")),
            length: self.length,
        }
    }
}

#[derive(Default)]
struct FakeChannel {
    pending: Vec<u8>,
    sent: Vec<u8>,
}

impl SerialChannel for FakeChannel {
    fn transmit_ready(&self) -> bool {
        true
    }

    fn receive_ready(&self) -> bool {
        !self.pending.is_empty()
    }

    fn transmit(&mut self, byte: u8) {
        self.sent.push(byte);
    }

    fn receive(&mut self) -> u8 {
        if self.pending.is_empty() {
            0
        } else {
            self.pending.remove(0)
        }
    }
}

fn full() -> WatchSpan<u16> {
    WatchSpan::new(0, u16::MAX)
}

fn bare_supervisor(sim: SimZ80) -> Supervisor<SimZ80> {
    Supervisor::new(sim, IoPortMap::new())
}

fn sio_supervisor(
    sim: SimZ80,
) -> (
    Supervisor<SimZ80>,
    Rc<RefCell<FakeChannel>>,
    Rc<RefCell<FakeChannel>>,
) {
    let a = Rc::new(RefCell::new(FakeChannel::default()));
    let b = Rc::new(RefCell::new(FakeChannel::default()));
    let mut map = IoPortMap::new();
    install_sio(&mut map, Rc::clone(&a), Rc::clone(&b));
    (Supervisor::new(sim, map), a, b)
}

// --- tick engine ---------------------------------------------------------

#[test]
fn memory_read_fires_once_per_transaction() {
    let mut sim = SimZ80::new();
    sim.queue(&[SimCycle::MemRead { addr: 0x2000 }]);
    let mut sup = bare_supervisor(sim);

    let mut cfg = DebugConfig::default();
    cfg.mem_read.log = WatchSpan::new(0x2000, 0x2000);
    let mut sink = RecordingSink::default();

    // The strobes stay asserted for several clock cycles; only the
    // falling edge counts.
    let first = sup.tick(&cfg, &mut sink).expect("tick");
    assert!(first.status.read_active());
    sup.tick(&cfg, &mut sink).expect("tick");
    sup.tick(&cfg, &mut sink).expect("tick");

    assert_eq!(sink.cycles.len(), 1);
    assert_eq!(sink.cycles[0].addr, 0x2000);
}

#[test]
fn memory_write_is_classified_by_its_own_span() {
    let mut sim = SimZ80::new();
    sim.queue(&[SimCycle::MemWrite {
        addr: 0x3000,
        data: 0x77,
    }]);
    let mut sup = bare_supervisor(sim);

    let mut cfg = DebugConfig::default();
    cfg.mem_read.log = full();
    cfg.mem_write.log = WatchSpan::new(0x3000, 0x3000);
    let mut sink = RecordingSink::default();

    sup.tick(&cfg, &mut sink).expect("tick");

    assert_eq!(sink.cycles.len(), 1);
    assert!(sink.cycles[0].write_active());
    assert_eq!(sink.cycles[0].data, 0x77);
}

#[test]
fn bus_span_logs_cycles_no_specific_category_claimed() {
    let mut sim = SimZ80::new();
    sim.queue(&[SimCycle::MemRead { addr: 0x2000 }]);
    let mut sup = bare_supervisor(sim);

    let mut cfg = DebugConfig::default();
    cfg.bus.log = WatchSpan::new(0x2000, 0x2000);
    let mut sink = RecordingSink::default();

    let outcome = sup.tick(&cfg, &mut sink).expect("tick");
    assert_eq!(sink.cycles.len(), 1);
    assert!(!outcome.breakpoint);
}

#[test]
fn bus_span_does_not_duplicate_specific_log() {
    let mut sim = SimZ80::new();
    sim.queue(&[SimCycle::MemRead { addr: 0x2000 }]);
    let mut sup = bare_supervisor(sim);

    let mut cfg = DebugConfig::default();
    cfg.mem_read.log = full();
    cfg.bus.log = full();
    let mut sink = RecordingSink::default();

    sup.tick(&cfg, &mut sink).expect("tick");
    assert_eq!(sink.cycles.len(), 1, "one record for one cycle");
}

#[test]
fn bus_break_span_applies_to_any_cycle() {
    let mut sim = SimZ80::new();
    sim.queue(&[SimCycle::MemRead { addr: 0x2000 }]);
    let mut sup = bare_supervisor(sim);

    let mut cfg = DebugConfig::default();
    cfg.bus.brk = WatchSpan::new(0x2000, 0x2000);

    let outcome = sup.tick(&cfg, &mut NullSink).expect("tick");
    assert!(outcome.breakpoint);
}

#[test]
fn refresh_cycles_are_neither_reads_nor_fetches() {
    let mut sim = SimZ80::new();
    sim.load(0x0100, &[0x3E]);
    sim.queue(&[
        SimCycle::Refresh { addr: 0x0042 },
        SimCycle::Fetch { addr: 0x0100 },
        SimCycle::Halt,
    ]);
    let mut sup = bare_supervisor(sim);

    let mut cfg = DebugConfig::default();
    cfg.mem_read.log = full();
    cfg.op_fetch.log = full();
    let mut sink = RecordingSink::default();
    let mut disasm = FakeDisasm { length: 1 };

    let reason = sup
        .trace(0, &cfg, &mut sink, &mut disasm, &CancelToken::new())
        .expect("trace");

    assert_eq!(reason, StopReason::Halted);
    assert_eq!(sink.instructions.len(), 1);
    assert_eq!(sink.instructions[0].0, 0x0100);
    // Only the fetch produced a memory-read record.
    assert_eq!(sink.cycles.len(), 1);
    assert_eq!(sink.cycles[0].addr, 0x0100);
}

// --- I/O dispatch through the tick engine --------------------------------

#[test]
fn io_write_reaches_the_mapped_handler() {
    let mut sim = SimZ80::new();
    sim.queue(&[SimCycle::IoWrite {
        port: 0x81,
        data: 0x41,
    }]);
    let (mut sup, a, b) = sio_supervisor(sim);

    sup.tick(&DebugConfig::default(), &mut NullSink).expect("tick");

    assert_eq!(a.borrow().sent, vec![0x41]);
    assert!(b.borrow().sent.is_empty());
}

#[test]
fn io_read_drives_the_handler_value_onto_the_bus() {
    let mut sim = SimZ80::new();
    sim.queue(&[SimCycle::IoRead { port: 0x81 }]);
    let (mut sup, a, _b) = sio_supervisor(sim);
    a.borrow_mut().pending.push(0x5A);

    sup.tick(&DebugConfig::default(), &mut NullSink).expect("tick");

    assert_eq!(sup.port_mut().io_reads(), &[(0x81, 0x5A)]);
}

#[test]
fn unmapped_port_reads_open_bus_and_discards_writes() {
    let mut sim = SimZ80::new();
    sim.queue(&[
        SimCycle::IoRead { port: 0x99 },
        SimCycle::IoWrite {
            port: 0x99,
            data: 0x55,
        },
    ]);
    let mut sup = bare_supervisor(sim);

    sup.tick(&DebugConfig::default(), &mut NullSink).expect("tick");
    sup.tick(&DebugConfig::default(), &mut NullSink).expect("tick");

    assert_eq!(sup.port_mut().io_reads(), &[(0x99, 0xFF)]);
}

#[test]
fn io_spans_watch_and_break_on_port_number() {
    let mut sim = SimZ80::new();
    sim.queue(&[SimCycle::IoWrite {
        port: 0x81,
        data: 0x00,
    }]);
    let mut sup = bare_supervisor(sim);

    let mut cfg = DebugConfig::default();
    cfg.io_write.log = WatchSpan::new(0x80, 0x83);
    cfg.io_write.brk = WatchSpan::new(0x81, 0x81);
    let mut sink = RecordingSink::default();

    let outcome = sup.tick(&cfg, &mut sink).expect("tick");
    assert_eq!(sink.cycles.len(), 1);
    assert!(outcome.breakpoint);
}

#[test]
fn wedged_iorq_surfaces_as_timeout() {
    let mut sim = SimZ80::new();
    sim.set_stuck_iorq(true);
    sim.queue(&[SimCycle::IoWrite {
        port: 0x81,
        data: 0x00,
    }]);
    let mut sup = bare_supervisor(sim);
    sup.set_toggle_budget(16);

    let err = sup
        .tick(&DebugConfig::default(), &mut NullSink)
        .expect_err("CPU never releases IORQ");
    assert_eq!(err, Error::IoAckTimeout { toggles: 16 });
}

// --- trace loop ----------------------------------------------------------

#[test]
fn trace_exits_immediately_when_cpu_is_held() {
    let mut sim = SimZ80::new();
    sim.set_halt(Level::Low);
    let mut sup = bare_supervisor(sim);

    let mut sink = RecordingSink::default();
    let mut disasm = FakeDisasm { length: 1 };
    let reason = sup
        .trace(
            0,
            &DebugConfig::default(),
            &mut sink,
            &mut disasm,
            &CancelToken::new(),
        )
        .expect("trace");

    assert_eq!(reason, StopReason::Halted);
    assert!(sink.instructions.is_empty());
}

#[test]
fn trace_counts_exactly_the_instruction_limit() {
    let mut sim = SimZ80::new();
    sim.queue(&[
        SimCycle::Fetch { addr: 0x0100 },
        SimCycle::Fetch { addr: 0x0101 },
        SimCycle::Fetch { addr: 0x0102 },
        SimCycle::Fetch { addr: 0x0103 },
        SimCycle::Fetch { addr: 0x0104 },
    ]);
    let mut sup = bare_supervisor(sim);

    let mut cfg = DebugConfig::default();
    cfg.op_fetch.log = full();
    let mut sink = RecordingSink::default();
    let mut disasm = FakeDisasm { length: 1 };

    let reason = sup
        .trace(3, &cfg, &mut sink, &mut disasm, &CancelToken::new())
        .expect("trace");

    assert_eq!(reason, StopReason::LimitReached);
    assert_eq!(sink.instructions.len(), 3);
    assert_eq!(sink.instructions[0].0, 0x0100);
    assert_eq!(sink.instructions[2].0, 0x0102);
}

#[test]
fn trace_stops_at_opcode_fetch_breakpoint() {
    let mut sim = SimZ80::new();
    sim.queue(&[
        SimCycle::Fetch { addr: 0x0100 },
        SimCycle::Fetch { addr: 0x0101 },
        SimCycle::Fetch { addr: 0x0102 },
    ]);
    let mut sup = bare_supervisor(sim);

    let mut cfg = DebugConfig::default();
    cfg.op_fetch.log = full();
    cfg.op_fetch.brk = WatchSpan::new(0x0101, 0x0101);
    let mut sink = RecordingSink::default();
    let mut disasm = FakeDisasm { length: 1 };

    let reason = sup
        .trace(10, &cfg, &mut sink, &mut disasm, &CancelToken::new())
        .expect("trace");

    assert_eq!(reason, StopReason::Breakpoint);
    // The breaking instruction is still counted and rendered.
    assert_eq!(sink.instructions.len(), 2);
    assert_eq!(sink.instructions[1].0, 0x0101);
}

#[test]
fn trace_stops_at_memory_read_breakpoint() {
    let mut sim = SimZ80::new();
    sim.queue(&[
        SimCycle::Fetch { addr: 0x0100 },
        SimCycle::MemRead { addr: 0x8000 },
        SimCycle::Fetch { addr: 0x0101 },
    ]);
    let mut sup = bare_supervisor(sim);

    let mut cfg = DebugConfig::default();
    cfg.op_fetch.log = full();
    cfg.mem_read.brk = WatchSpan::new(0x8000, 0x8000);
    let mut sink = RecordingSink::default();
    let mut disasm = FakeDisasm { length: 1 };

    let reason = sup
        .trace(0, &cfg, &mut sink, &mut disasm, &CancelToken::new())
        .expect("trace");

    assert_eq!(reason, StopReason::Breakpoint);
    assert_eq!(sink.instructions.len(), 1);
}

#[test]
fn trace_honours_cancellation() {
    let mut sup = bare_supervisor(SimZ80::new());

    let token = CancelToken::new();
    token.cancel();

    let mut disasm = FakeDisasm { length: 1 };
    let reason = sup
        .trace(
            0,
            &DebugConfig::default(),
            &mut RecordingSink::default(),
            &mut disasm,
            &token,
        )
        .expect("trace");

    assert_eq!(reason, StopReason::Cancelled);
}

#[test]
fn trace_stops_when_cpu_halts_mid_run() {
    let mut sim = SimZ80::new();
    sim.load(0x0100, &[0x76]);
    sim.queue(&[SimCycle::Fetch { addr: 0x0100 }, SimCycle::Halt]);
    let mut sup = bare_supervisor(sim);

    let mut cfg = DebugConfig::default();
    cfg.op_fetch.log = full();
    let mut sink = RecordingSink::default();
    let mut disasm = FakeDisasm { length: 1 };

    let reason = sup
        .trace(0, &cfg, &mut sink, &mut disasm, &CancelToken::new())
        .expect("trace");

    assert_eq!(reason, StopReason::Halted);
    assert_eq!(sink.instructions.len(), 1);
    assert_eq!(sink.instructions[0].1, "db 76");
}

#[test]
fn prefix_continuation_fetches_are_not_counted() {
    // DD 7E is one instruction: the 0x7E fetch must not start a new
    // trace line even though it is an M1 cycle.
    let mut sim = SimZ80::new();
    sim.load(0x0100, &[0xDD]);
    sim.load(0x0101, &[0x7E]);
    sim.load(0x0105, &[0x3E]);
    sim.queue(&[
        SimCycle::Fetch { addr: 0x0100 },
        SimCycle::Fetch { addr: 0x0101 },
        SimCycle::Fetch { addr: 0x0105 },
        SimCycle::Halt,
    ]);
    let mut sup = bare_supervisor(sim);

    let mut cfg = DebugConfig::default();
    cfg.op_fetch.log = full();
    let mut sink = RecordingSink::default();
    let mut disasm = FakeDisasm { length: 1 };

    let reason = sup
        .trace(0, &cfg, &mut sink, &mut disasm, &CancelToken::new())
        .expect("trace");

    assert_eq!(reason, StopReason::Halted);
    let addrs: Vec<u16> = sink.instructions.iter().map(|(a, _)| *a).collect();
    assert_eq!(addrs, vec![0x0100, 0x0105]);
}

#[test]
fn disassembler_reads_consume_real_bus_cycles() {
    let mut sim = SimZ80::new();
    sim.load(0x0200, &[0xC3, 0x00, 0x03]);
    sim.queue(&[
        SimCycle::Fetch { addr: 0x0200 },
        SimCycle::MemRead { addr: 0x0201 },
        SimCycle::MemRead { addr: 0x0202 },
        SimCycle::Halt,
    ]);
    let mut sup = bare_supervisor(sim);

    let mut cfg = DebugConfig::default();
    cfg.op_fetch.log = full();
    let mut sink = RecordingSink::default();
    let mut disasm = FakeDisasm { length: 3 };

    let reason = sup
        .trace(0, &cfg, &mut sink, &mut disasm, &CancelToken::new())
        .expect("trace");

    assert_eq!(reason, StopReason::Halted);
    assert_eq!(sink.instructions, vec![(0x0200, "db c3 00 03".to_string())]);
    assert!(sup.port_mut().script_done(), "operand cycles were consumed");
}

#[test]
fn fetch_echo_respects_the_op_fetch_span() {
    let mut sim = SimZ80::new();
    sim.queue(&[
        SimCycle::Fetch { addr: 0x0100 },
        SimCycle::Fetch { addr: 0x4000 },
        SimCycle::Halt,
    ]);
    let mut sup = bare_supervisor(sim);

    let mut cfg = DebugConfig::default();
    cfg.op_fetch.log = WatchSpan::new(0x4000, 0x4000);
    let mut sink = RecordingSink::default();
    let mut disasm = FakeDisasm { length: 1 };

    sup.trace(0, &cfg, &mut sink, &mut disasm, &CancelToken::new())
        .expect("trace");

    // Both instructions executed, only the covered one was echoed.
    assert_eq!(sink.instructions.len(), 1);
    assert_eq!(sink.instructions[0].0, 0x4000);
}

// --- free-running loop ---------------------------------------------------

#[test]
fn run_services_io_requests_until_halt() {
    let mut sim = SimZ80::new();
    sim.queue(&[
        SimCycle::IoWrite {
            port: 0x81,
            data: 0x48,
        },
        SimCycle::Idle,
        SimCycle::IoWrite {
            port: 0x81,
            data: 0x49,
        },
        SimCycle::Halt,
    ]);
    let (mut sup, a, _b) = sio_supervisor(sim);

    sup.run(&CancelToken::new()).expect("run");

    assert_eq!(a.borrow().sent, vec![0x48, 0x49]);
    assert_eq!(sup.clock_mode(), ClockMode::Stopped);
}

#[test]
fn run_stops_on_cancellation() {
    let mut sup = bare_supervisor(SimZ80::new());
    let token = CancelToken::new();
    token.cancel();

    sup.run(&token).expect("run");
    assert_eq!(sup.clock_mode(), ClockMode::Stopped);
}

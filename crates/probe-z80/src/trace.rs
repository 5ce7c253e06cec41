//! Trace record output.
//!
//! Trace records are produced output, not diagnostics; they go through an
//! injected sink rather than the `log` facade so tests can capture them
//! and hosts can route them anywhere. Two textual layouts exist: a compact
//! per-cycle form and a long form reporting every signal as H/L. Neither
//! is a binding wire format; the set of reported facts is.

use std::io::{self, Write};

use probe_core::BusStatus;

/// Receives trace records from the tick engine and the trace loop.
pub trait TraceSink {
    /// One qualifying bus cycle.
    fn cycle(&mut self, status: &BusStatus);

    /// One disassembled instruction at an opcode-fetch boundary.
    fn instruction(&mut self, address: u16, mnemonic: &str);
}

/// Discards every record.
pub struct NullSink;

impl TraceSink for NullSink {
    fn cycle(&mut self, _status: &BusStatus) {}
    fn instruction(&mut self, _address: u16, _mnemonic: &str) {}
}

/// Renders records as text lines into any [`io::Write`].
///
/// Write failures are swallowed: losing a trace line must never fail the
/// trace loop.
pub struct WriteSink<W: Write> {
    out: W,
    long_form: bool,
}

impl<W: Write> WriteSink<W> {
    /// Compact per-cycle layout.
    #[must_use]
    pub fn new(out: W) -> Self {
        Self {
            out,
            long_form: false,
        }
    }

    /// Every-signal H/L layout.
    #[must_use]
    pub fn long_form(out: W) -> Self {
        Self {
            out,
            long_form: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TraceSink for WriteSink<W> {
    fn cycle(&mut self, status: &BusStatus) {
        let line = if self.long_form {
            long_line(status)
        } else {
            short_line(status)
        };
        let _ = writeln!(self.out, "{line}");
    }

    fn instruction(&mut self, address: u16, mnemonic: &str) {
        let _ = writeln!(self.out, "\t{address:04x}\t{mnemonic}");
    }
}

fn printable(data: u8) -> char {
    if (0x20..=0x7E).contains(&data) {
        data as char
    } else {
        ' '
    }
}

/// Compact cycle record: address, data, printable byte, then fixed-width
/// tokens for each active strobe.
#[must_use]
pub fn short_line(s: &BusStatus) -> String {
    let strobe = if s.read_active() {
        "rd  "
    } else if s.write_active() {
        "wr  "
    } else if s.refresh_active() {
        "rfsh"
    } else {
        "    "
    };
    let space = if s.mem_active() {
        "mem"
    } else if s.io_active() {
        "io "
    } else {
        "   "
    };

    format!(
        "\t{:04x} {:02x} {}    {} {}    {} {} {} {} {} {} {} {}",
        s.addr,
        s.data,
        printable(s.data),
        strobe,
        space,
        if s.m1_active() { "m1" } else { "  " },
        if s.running() { "    " } else { "halt" },
        if s.int.is_low() { "int" } else { "   " },
        if s.nmi.is_low() { "nmi" } else { "   " },
        if s.reset.is_low() { "rst" } else { "   " },
        if s.busrq.is_low() { "busrq" } else { "     " },
        if s.busack.is_low() { "busack" } else { "      " },
        if s.io_acked() { "ioack" } else { "     " },
    )
}

/// Long cycle record: every signal as H/L, plus bank (when present),
/// address, and data.
#[must_use]
pub fn long_line(s: &BusStatus) -> String {
    use std::fmt::Write as _;

    let mut line = format!(
        "clk={} m1={} mreq={} iorq={} ioack={} rd={} wr={} rfsh={} halt={} \
         int={} nmi={} reset={} busrq={} busack={}",
        s.clk.symbol(),
        s.m1.symbol(),
        s.mreq.symbol(),
        s.iorq.symbol(),
        s.ioack.symbol(),
        s.rd.symbol(),
        s.wr.symbol(),
        s.rfsh.symbol(),
        s.halt.symbol(),
        s.int.symbol(),
        s.nmi.symbol(),
        s.reset.symbol(),
        s.busrq.symbol(),
        s.busack.symbol(),
    );
    if let Some(bank) = s.bank {
        let _ = write!(line, " bank={bank:X}");
    }
    let _ = write!(
        line,
        " addr={:04X} data={:02X} {}",
        s.addr,
        s.data,
        printable(s.data)
    );
    line
}

/// Convenience sink writing the compact layout to stdout.
#[must_use]
pub fn stdout_sink() -> WriteSink<io::Stdout> {
    WriteSink::new(io::stdout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_core::Level;

    fn mem_read_status() -> BusStatus {
        BusStatus {
            mreq: Level::Low,
            rd: Level::Low,
            addr: 0x1234,
            data: 0x41,
            ..BusStatus::idle()
        }
    }

    #[test]
    fn short_line_reports_memory_read() {
        let line = short_line(&mem_read_status());
        assert!(line.contains("1234 41 A"));
        assert!(line.contains("rd  "));
        assert!(line.contains("mem"));
        assert!(!line.contains("io "));
    }

    #[test]
    fn short_line_reports_io_write() {
        let s = BusStatus {
            iorq: Level::Low,
            wr: Level::Low,
            addr: 0x0081,
            data: 0x0A,
            ..BusStatus::idle()
        };
        let line = short_line(&s);
        assert!(line.contains("wr  "));
        assert!(line.contains("io "));
        assert!(!line.contains("mem"));
    }

    #[test]
    fn short_line_renders_unprintable_data_as_space() {
        let mut s = mem_read_status();
        s.data = 0x07;
        assert!(short_line(&s).contains("1234 07  "));
    }

    #[test]
    fn long_line_reports_every_signal() {
        let line = long_line(&mem_read_status());
        assert!(line.contains("mreq=L"));
        assert!(line.contains("rd=L"));
        assert!(line.contains("wr=H"));
        assert!(line.contains("halt=H"));
        assert!(line.contains("addr=1234"));
        assert!(line.contains("data=41"));
        assert!(!line.contains("bank="));
    }

    #[test]
    fn long_line_includes_bank_when_present() {
        let mut s = mem_read_status();
        s.bank = Some(3);
        assert!(long_line(&s).contains("bank=3"));
    }

    #[test]
    fn write_sink_emits_one_line_per_record() {
        let mut sink = WriteSink::new(Vec::new());
        sink.cycle(&mem_read_status());
        sink.instruction(0x0100, "ld a,05h");

        let text = String::from_utf8(sink.into_inner()).expect("utf8 output");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("1234"));
        assert_eq!(lines[1], "\t0100\tld a,05h");
    }
}

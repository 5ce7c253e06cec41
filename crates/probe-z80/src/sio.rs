//! Serial (SIO-style) port wiring.
//!
//! Two channels behind six Z80-visible registers. The polled status port
//! exposes bare ready bits; the SIO control registers additionally report
//! CTS and DCD, which this supervisor has no modem lines for and therefore
//! forces high. Channel A answers on both the polled data port and the SIO
//! channel-A data port.

use std::cell::RefCell;
use std::rc::Rc;

use probe_core::SerialChannel;

use crate::iomap::{IoPortMap, PortHandler};

pub const SIO0_STATUS: u8 = 0x10;
pub const SIO0_DATA: u8 = 0x11;
pub const SIOA_CONTROL: u8 = 0x80;
pub const SIOA_DATA: u8 = 0x81;
pub const SIOB_CONTROL: u8 = 0x82;
pub const SIOB_DATA: u8 = 0x83;

/// Polled status: bit 1 = transmit ready, bit 0 = receive ready.
/// Writes are ignored (the register is read-only).
struct StatusPort<S> {
    channel: Rc<RefCell<S>>,
}

impl<S: SerialChannel> PortHandler for StatusPort<S> {
    fn read(&mut self) -> u8 {
        let ch = self.channel.borrow();
        (u8::from(ch.transmit_ready()) << 1) | u8::from(ch.receive_ready())
    }

    fn write(&mut self, _value: u8) {}
}

/// SIO control/status register read: CTS (bit 3) and DCD (bit 5) forced
/// high, bit 2 = transmit ready, bit 0 = receive ready. Control writes
/// (WR register setup) are accepted and ignored.
struct ControlPort<S> {
    channel: Rc<RefCell<S>>,
}

impl<S: SerialChannel> PortHandler for ControlPort<S> {
    fn read(&mut self) -> u8 {
        let ch = self.channel.borrow();
        (1 << 3) | (1 << 5) | (u8::from(ch.transmit_ready()) << 2) | u8::from(ch.receive_ready())
    }

    fn write(&mut self, _value: u8) {}
}

/// Data register: read pulls the waiting byte, write pushes one out.
struct DataPort<S> {
    channel: Rc<RefCell<S>>,
}

impl<S: SerialChannel> PortHandler for DataPort<S> {
    fn read(&mut self) -> u8 {
        self.channel.borrow_mut().receive()
    }

    fn write(&mut self, value: u8) {
        self.channel.borrow_mut().transmit(value);
    }
}

/// Wire both serial channels into the port map.
pub fn install_sio<A, B>(map: &mut IoPortMap, channel_a: Rc<RefCell<A>>, channel_b: Rc<RefCell<B>>)
where
    A: SerialChannel + 'static,
    B: SerialChannel + 'static,
{
    map.install(
        SIO0_STATUS,
        Box::new(StatusPort {
            channel: Rc::clone(&channel_a),
        }),
    );
    map.install(
        SIO0_DATA,
        Box::new(DataPort {
            channel: Rc::clone(&channel_a),
        }),
    );
    map.install(
        SIOA_CONTROL,
        Box::new(ControlPort {
            channel: Rc::clone(&channel_a),
        }),
    );
    map.install(SIOA_DATA, Box::new(DataPort { channel: channel_a }));
    map.install(
        SIOB_CONTROL,
        Box::new(ControlPort {
            channel: Rc::clone(&channel_b),
        }),
    );
    map.install(SIOB_DATA, Box::new(DataPort { channel: channel_b }));
}

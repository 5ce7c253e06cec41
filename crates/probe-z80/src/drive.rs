//! Disk-emulation port wiring.
//!
//! Three registers in the 88-DSK style: status/select, sector/control, and
//! streamed data. Each register pairs one read operation with one write
//! operation on the backing [`BlockDevice`] capability.

use std::cell::RefCell;
use std::rc::Rc;

use probe_core::BlockDevice;

use crate::iomap::{IoPortMap, PortHandler};

pub const DRIVE_STATUS: u8 = 0x08;
pub const DRIVE_CONTROL: u8 = 0x09;
pub const DRIVE_DATA: u8 = 0x0A;

/// Read: controller status. Write: drive select.
struct StatusPort<D> {
    device: Rc<RefCell<D>>,
}

impl<D: BlockDevice> PortHandler for StatusPort<D> {
    fn read(&mut self) -> u8 {
        self.device.borrow_mut().status()
    }

    fn write(&mut self, value: u8) {
        self.device.borrow_mut().select(value);
    }
}

/// Read: current sector. Write: control register.
struct ControlPort<D> {
    device: Rc<RefCell<D>>,
}

impl<D: BlockDevice> PortHandler for ControlPort<D> {
    fn read(&mut self) -> u8 {
        self.device.borrow_mut().sector()
    }

    fn write(&mut self, value: u8) {
        self.device.borrow_mut().control(value);
    }
}

/// Streamed data register.
struct DataPort<D> {
    device: Rc<RefCell<D>>,
}

impl<D: BlockDevice> PortHandler for DataPort<D> {
    fn read(&mut self) -> u8 {
        self.device.borrow_mut().read()
    }

    fn write(&mut self, value: u8) {
        self.device.borrow_mut().write(value);
    }
}

/// Wire the disk-emulation backend into the port map.
pub fn install_drive<D: BlockDevice + 'static>(map: &mut IoPortMap, device: Rc<RefCell<D>>) {
    map.install(
        DRIVE_STATUS,
        Box::new(StatusPort {
            device: Rc::clone(&device),
        }),
    );
    map.install(
        DRIVE_CONTROL,
        Box::new(ControlPort {
            device: Rc::clone(&device),
        }),
    );
    map.install(DRIVE_DATA, Box::new(DataPort { device }));
}

//! Peripheral capability traits behind the I/O dispatch table.
//!
//! Both families are external collaborators; their internal behaviour is
//! out of scope here. The supervisor only needs the narrow operations the
//! Z80-visible registers map onto.

/// One serial channel: status query, byte pull, byte push.
pub trait SerialChannel {
    /// Transmit register empty, ready to accept a byte.
    fn transmit_ready(&self) -> bool;

    /// A received byte is waiting.
    fn receive_ready(&self) -> bool;

    /// Push one byte out the channel.
    fn transmit(&mut self, byte: u8);

    /// Pull the waiting byte (most recently received).
    fn receive(&mut self) -> u8;
}

/// Disk-emulation backend: status, select/sector addressing, streamed data.
pub trait BlockDevice {
    /// Query controller status.
    fn status(&mut self) -> u8;

    /// Select a drive.
    fn select(&mut self, drive: u8);

    /// Current sector position.
    fn sector(&mut self) -> u8;

    /// Control register write (head movement, etc.).
    fn control(&mut self, value: u8);

    /// Pull one byte from the current position.
    fn read(&mut self) -> u8;

    /// Push one byte at the current position.
    fn write(&mut self, value: u8);
}

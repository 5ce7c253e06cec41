//! Watch and breakpoint ranges.
//!
//! Six independent category slots, each with a log span (emit a trace
//! record) and a break span (stop the trace loop). Memory-side categories
//! test the full 16-bit address; I/O categories test the low-byte port
//! number. An unconfigured span is inverted (`start > end`) and matches
//! nothing.

/// Inclusive address interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSpan<T> {
    pub start: T,
    pub end: T,
}

impl<T: PartialOrd + Copy> WatchSpan<T> {
    #[must_use]
    pub const fn new(start: T, end: T) -> Self {
        Self { start, end }
    }

    /// `start <= value <= end`. Inverted spans match nothing.
    pub fn contains(&self, value: T) -> bool {
        self.start <= value && value <= self.end
    }
}

impl Default for WatchSpan<u16> {
    fn default() -> Self {
        Self { start: u16::MAX, end: 0 }
    }
}

impl Default for WatchSpan<u8> {
    fn default() -> Self {
        Self { start: u8::MAX, end: 0 }
    }
}

/// Log and break spans for one cycle category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchPair<T> {
    /// Matching cycles emit a trace record.
    pub log: WatchSpan<T>,
    /// Matching cycles mark a breakpoint hit.
    pub brk: WatchSpan<T>,
}

impl<T> Default for WatchPair<T>
where
    WatchSpan<T>: Default,
{
    fn default() -> Self {
        Self {
            log: WatchSpan::default(),
            brk: WatchSpan::default(),
        }
    }
}

/// The complete watch/break configuration.
///
/// Owned by the caller of the trace loop and passed by reference into every
/// tick, so independent debug sessions don't share state. Defaults exclude
/// everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugConfig {
    /// Any cycle, tested when no more specific category logged.
    pub bus: WatchPair<u16>,
    pub mem_read: WatchPair<u16>,
    pub mem_write: WatchPair<u16>,
    pub io_read: WatchPair<u8>,
    pub io_write: WatchPair<u8>,
    /// Opcode-fetch cycles, by fetch address.
    pub op_fetch: WatchPair<u16>,
}

//! Instruction-boundary detection over the opcode-fetch byte stream.
//!
//! The Z80 asserts M1 for every opcode byte, including the CB/DD/ED/FD
//! prefixes, so "is this fetch the start of a new instruction?" cannot be
//! read off a single cycle. This tracker answers it from a two-byte
//! lookback over the fetch stream, without a full instruction-length
//! decode.
//!
//! The rule table is empirically derived against the Z80 opcode set rather
//! than proven exhaustive. Keep it as-is; callers needing exact instruction
//! text go through the disassembler, which does its own length computation.
//! This only decides where trace output starts a new printed line.

/// Two-byte lookback state over opcode-fetch bytes.
///
/// One tracker per trace session; constructing a fresh tracker restarts
/// classification from a clean history.
#[derive(Debug, Clone, Default)]
pub struct PrefixTracker {
    previous: u8,
    previous2: u8,
}

impl PrefixTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify the current opcode-fetch byte, then roll the history.
    ///
    /// The history rolls on every call regardless of the verdict.
    pub fn starts_instruction(&mut self, current: u8) -> bool {
        let result = match self.previous {
            0xCB => {
                // After CB CB, DD CB, or FD CB the previous byte was a real
                // opcode (or a second prefix), so current starts fresh.
                matches!(self.previous2, 0xCB | 0xDD | 0xFD)
            }
            0xED => {
                // ED directly after a CB-prefixed opcode cannot be a
                // prefix continuation.
                self.previous2 == 0xCB
            }
            0xDD | 0xFD => {
                // After CB the previous byte was an opcode; and a prefix
                // followed by another prefix byte acts as a no-op, so a
                // fresh (possibly prefixed) instruction starts here.
                self.previous2 == 0xCB || matches!(current, 0xDD | 0xED | 0xFD)
            }
            // Previous byte was a plain opcode; it completed the prior
            // instruction.
            _ => true,
        };

        self.previous2 = self.previous;
        self.previous = current;

        result
    }
}

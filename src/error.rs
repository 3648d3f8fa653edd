use thiserror::Error;

/// Everything that can go wrong while building, loading or stepping a machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("ROM is empty")]
    EmptyRom,

    #[error("ROM is too large ({size} bytes), max size is {max} bytes")]
    RomTooLarge { size: usize, max: usize },

    #[error("font must be 80 bytes, got {len}")]
    InvalidFont { len: usize },

    #[error("stack overflow: call at {pc:#06X} with a full call stack")]
    StackOverflow { pc: u16 },

    #[error("stack underflow: return at {pc:#06X} with an empty call stack")]
    StackUnderflow { pc: u16 },

    #[error("memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: usize },

    #[error("write to the font table at address {address:#06X}")]
    ProtectedMemory { address: usize },

    #[error("key {key:#04X} is not on the keypad")]
    InvalidKey { key: u8 },
}

impl Error {
    /// Faults raised by a running program, as opposed to setup failures.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Error::StackOverflow { .. }
                | Error::StackUnderflow { .. }
                | Error::MemoryOutOfBounds { .. }
                | Error::ProtectedMemory { .. }
                | Error::InvalidKey { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_runtime_errors_are_faults() {
        assert!(Error::StackUnderflow { pc: 0x200 }.is_fault());
        assert!(Error::ProtectedMemory { address: 0x50 }.is_fault());
        assert!(!Error::EmptyRom.is_fault());
        assert!(!Error::InvalidFont { len: 0 }.is_fault());
    }
}

//! Unified error type for uf2boot.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` for efficient on-target logging.

/// Top-level error type used across the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Control plane
    /// The aggregate callback table has no free slot; the handler will
    /// never see any request.
    RegistryFull,

    // HF2
    /// An HF2 packet violated the framing rules and was dropped.
    Protocol(ProtocolError),

    /// Outbound HF2 packet could not be queued.
    BufferOverflow,

    // Collaborators
    /// Flash read/write was rejected by the flash driver.
    Flash,

    /// Mass-storage block read/write failed.
    Storage,
}

/// HF2 framing violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// Serial packet arrived while a command was half reassembled.
    SerialMidCommand,
    /// Packet would grow the reassembly buffer past its capacity.
    Overflow,
    /// Packet is shorter than the size in its tag byte.
    ShortPacket,
    /// Reassembled command is shorter than the command header.
    Truncated,
}

// Convenience conversions

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

/// Terminal failure hook.
///
/// Called when the bootloader cannot continue (for example a mandatory
/// handler could not be registered). Override `fail` to reset the chip or
/// blink an error code instead of parking the core.
pub trait FailureHook {
    fn fail(&self, reason: &str) -> ! {
        error!("fatal: {}", reason);
        loop {
            core::hint::spin_loop();
        }
    }
}

/// Default hook: log and spin forever.
pub struct Halt;

impl FailureHook for Halt {}

#[cfg(test)]
mod tests {
    use super::*;

    struct PanicHook;

    impl FailureHook for PanicHook {
        fn fail(&self, reason: &str) -> ! {
            panic!("{}", reason)
        }
    }

    #[test]
    fn protocol_error_converts_into_error() {
        let e: Error = ProtocolError::Overflow.into();
        assert_eq!(e, Error::Protocol(ProtocolError::Overflow));
    }

    #[test]
    #[should_panic(expected = "registry full")]
    fn failure_hook_can_be_overridden() {
        PanicHook.fail("registry full");
    }
}

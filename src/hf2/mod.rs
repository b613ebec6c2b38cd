//! HF2 command channel over 64-byte HID reports.
//!
//! ## Packet format
//!
//! ```text
//! Byte 0    : tag = flag (bits 7-6) | size (bits 5-0, 0..=63)
//! Byte 1..  : `size` payload bytes, rest of the report is padding
//! ```
//!
//! | flag | meaning                                  |
//! |------|------------------------------------------|
//! | 0x00 | command/response body, more follows      |
//! | 0x40 | last packet of a command/response        |
//! | 0x80 | serial stdout                            |
//! | 0xC0 | serial stderr                            |
//!
//! Command and response bodies are reassembled from consecutive packets:
//!
//! ```text
//! Command  : command_id u32 | tag u16 | reserved u8 u8 | payload
//! Response : tag u16 | status u8 | status_info u8 | payload
//! ```

pub mod engine;
pub mod protocol;
pub mod transmit;

pub use engine::Hf2Engine;
pub use protocol::{Accumulator, BinInfo, Command, Frame, Request};
pub use transmit::{PacketSink, Transmitter};

use crate::config::{
    FLASH_PAGE_SIZE, FLASH_SIZE, INFO_UF2, UF2_FAMILY, USER_FLASH_END, USER_FLASH_START,
};

/// HID report size.
pub const PACKET_SIZE: usize = 64;
/// Largest payload one report carries.
pub const MAX_CHUNK: usize = PACKET_SIZE - 1;

pub const FLAG_MASK: u8 = 0xC0;
pub const SIZE_MASK: u8 = 0x3F;
pub const CMDPKT_BODY: u8 = 0x00;
pub const CMDPKT_LAST: u8 = 0x40;
pub const SERIAL_OUT: u8 = 0x80;
pub const SERIAL_ERR: u8 = 0xC0;

pub const CMD_HEADER_SIZE: usize = 8;
pub const RESPONSE_HEADER_SIZE: usize = 4;

pub mod command_id {
    pub const BININFO: u32 = 0x0001;
    pub const INFO: u32 = 0x0002;
    pub const RESET_INTO_APP: u32 = 0x0003;
    pub const RESET_INTO_BOOTLOADER: u32 = 0x0004;
    pub const START_FLASH: u32 = 0x0005;
    pub const WRITE_FLASH_PAGE: u32 = 0x0006;
    pub const READ_WORDS: u32 = 0x0008;
}

/// BININFO `mode` value.
pub const MODE_BOOTLOADER: u32 = 0x01;

/// Response status byte.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Hf2Status {
    Ok = 0x00,
    InvalidCmd = 0x01,
    ExecErr = 0x02,
}

/// Deferred side effect of a command, performed by the caller once the
/// response has left the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Hf2Action {
    ResetIntoApp,
    ResetIntoBootloader,
}

/// Device description reported over HF2.
#[derive(Clone, Copy, Debug)]
pub struct Hf2Config {
    /// Total flash, used for BININFO page count and READ_WORDS bounds.
    pub flash_size: u32,
    /// Host-writable window, `[start, end)`.
    pub user_flash_start: u32,
    pub user_flash_end: u32,
    pub family_id: u32,
    /// INFO text.
    pub info: &'static str,
}

impl Hf2Config {
    pub const fn new() -> Self {
        Self {
            flash_size: FLASH_SIZE,
            user_flash_start: USER_FLASH_START,
            user_flash_end: USER_FLASH_END,
            family_id: UF2_FAMILY,
            info: INFO_UF2,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.flash_size / FLASH_PAGE_SIZE as u32
    }

    /// Is `[addr, addr + len)` inside the user window?
    pub fn is_writable(&self, addr: u32, len: usize) -> bool {
        let Ok(len) = u32::try_from(len) else {
            return false;
        };
        match addr.checked_add(len) {
            Some(end) => addr >= self.user_flash_start && end <= self.user_flash_end,
            None => false,
        }
    }

    /// Is `[addr, addr + len)` inside flash?
    pub fn is_readable(&self, addr: u32, len: usize) -> bool {
        let Ok(len) = u32::try_from(len) else {
            return false;
        };
        addr.checked_add(len)
            .is_some_and(|end| end <= self.flash_size)
    }
}

impl Default for Hf2Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_board_constants() {
        let config = Hf2Config::default();
        assert_eq!(config.page_count(), 4096);
        assert_eq!(config.family_id, UF2_FAMILY);
    }

    #[test]
    fn user_window_bounds() {
        let config = Hf2Config {
            flash_size: 0x2_0000,
            user_flash_start: 0x1_0000,
            user_flash_end: 0x2_0000,
            ..Hf2Config::new()
        };
        assert!(config.is_writable(0x1_0000, 256));
        assert!(config.is_writable(0x1_FF00, 256));
        assert!(!config.is_writable(0x0_FF00, 256));
        assert!(!config.is_writable(0x1_FF01, 256));
        assert!(!config.is_writable(u32::MAX - 16, 256));
        assert!(config.is_readable(0, 16));
        assert!(!config.is_readable(0x1_FFFC, 8));
    }
}

//! Application-wide constants and compile-time configuration.
//!
//! USB identity, vendor codes, flash geometry and UF2 metadata live here
//! so they can be tuned in one place.

// USB

/// USB VID/PID - "pid.codes" open-source VID, bootloader PID.
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0xDB42;

/// USB device strings.
pub const USB_MANUFACTURER: &str = "uf2boot";
pub const USB_PRODUCT: &str = "UF2 Bootloader";

/// Serial numbers longer than this are truncated.
pub const USB_SERIAL_NUM_LENGTH: usize = 24;

/// Max packet size for every bulk/interrupt endpoint and EP0.
pub const MAX_USB_PACKET_SIZE: usize = 64;

/// Control transfer buffer. Must hold the largest vendor descriptor.
pub const USB_CONTROL_BUF_SIZE: usize = 256;

// Control-plane aggregation

/// Slots in the aggregate control-request table.
pub const CONTROL_CALLBACK_CAPACITY: usize = 10;

/// Slots in the aggregate set-configuration table.
pub const CONFIG_CALLBACK_CAPACITY: usize = 10;

// WebUSB / WinUSB

/// bRequest used by the host for WebUSB vendor requests.
pub const WEBUSB_VENDOR_CODE: u8 = 0x22;

/// Landing page advertised to browsers (scheme is implied HTTPS).
pub const WEBUSB_LANDING_PAGE: &str = "microsoft.github.io/uf2";

/// bRequest used by Windows for Microsoft OS 1.0 feature descriptors.
/// Printable on purpose: it is carried as the last char of "MSFT100?".
pub const WINUSB_VENDOR_CODE: u8 = 0x21;

/// DeviceInterfaceGUIDs value registered for the WinUSB interface.
pub const WINUSB_INTERFACE_GUID: &str = "{9D32F82C-1FB2-4486-8501-B6145B5BA336}";

// Flash / HF2

/// Size of one HF2 WRITE_FLASH_PAGE payload.
pub const FLASH_PAGE_SIZE: usize = 256;

/// HF2 reassembly buffer: one page plus command header slack.
pub const HF2_BUF_SIZE: usize = FLASH_PAGE_SIZE + 64;

/// Total on-chip flash (nRF52840: 1 MiB).
pub const FLASH_SIZE: u32 = 1024 * 1024;

/// Start of the region the host may program. Everything below belongs to
/// the bootloader (see memory.x).
pub const USER_FLASH_START: u32 = 0x0001_0000;

/// End (exclusive) of the host-programmable region.
pub const USER_FLASH_END: u32 = FLASH_SIZE;

/// nRF52 NVMC erase unit.
pub const FLASH_SECTOR_SIZE: u32 = 4096;

// UF2 metadata

/// UF2 family id reported by BININFO (nRF52840).
pub const UF2_FAMILY: u32 = 0xADA5_2840;

/// Checked by MakeCode.
pub const UF2_VERSION: &str = "1.1.3";
pub const PRODUCT_NAME: &str = "NRF52840";
/// CPU type - board type - board revision
pub const BOARD_ID: &str = "nRF52840-DK-v0";

/// Text returned by HF2 INFO (same content as INFO_UF2.TXT).
pub const INFO_UF2: &str =
    "UF2 Bootloader 1.1.3\r\nModel: NRF52840\r\nBoard-ID: nRF52840-DK-v0\r\n";

// Mass storage

/// Virtual disk size in 512-byte blocks.
pub const UF2_NUM_BLOCKS: u32 = 8000;

/// Size of one mass-storage block.
pub const MSC_BLOCK_SIZE: usize = 512;

//! USB device subsystem - presents the composite bootloader to the host.
//!
//! The nRF52840's built-in USB 2.0 Full-Speed controller is driven by
//! `embassy-usb`. The composite device carries:
//!
//! - Interface 0: vendor interface bound to WinUSB, advertised to
//!   browsers through the WebUSB BOS capability
//! - Interface 1-2: CDC-ACM serial port (communication + data)
//! - Interface 3: HF2 raw HID, 64-byte reports in and out
//!
//! Control requests for every function go through one
//! [`bridge::ControlBridge`] into the library's `UsbControl` dispatcher.

pub mod bridge;
pub mod device;

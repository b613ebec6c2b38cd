//! Extended descriptor providers for driverless host pairing.
//!
//! - [`bos`]: USB 2.1 Binary Object Store (GET_DESCRIPTOR type 0x0F)
//! - [`webusb`]: WebUSB platform capability and landing-page URL
//! - [`winusb`]: Microsoft OS 1.0 compatible-ID / extended-properties
//!   feature descriptors and the 0xEE OS string descriptor
//!
//! Each provider is a [`ControlHandler`](crate::control::ControlHandler)
//! that registers itself into the [`UsbControl`](crate::control::UsbControl)
//! context with `attach`, and re-registers on every SET_CONFIGURATION.

pub mod bos;
pub mod webusb;
pub mod winusb;

pub use bos::{BosDescriptor, Usb21Standard};
pub use webusb::WebUsb;
pub use winusb::WinUsb;

/// Copy as much of `src` as fits into `dst`, returning the count.
pub(crate) fn copy_truncated(dst: &mut [u8], src: &[u8]) -> usize {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}

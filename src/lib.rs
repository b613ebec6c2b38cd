//! Control-plane engine of the uf2boot USB bootloader.
//!
//! Everything protocol-shaped lives here and is tested on the host:
//!
//! - [`control`]: aggregate control-request dispatcher and set-configuration
//!   fan-out behind one control endpoint
//! - [`descriptor`]: BOS, WebUSB and WinUSB descriptor providers
//! - [`hf2`]: HF2 command channel (reassembly, commands, chunked responses)
//! - [`cdc`], [`msc`]: serial and mass-storage hookups
//!
//! Usage: `cargo test` on the host.
//!
//! The embedded binary (main.rs, `--features embedded`) binds these to the
//! nRF52840 USB peripheral and NVMC through Embassy.

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod cdc;
pub mod config;
pub mod control;
pub mod descriptor;
pub mod error;
pub mod flash;
pub mod hf2;
pub mod msc;

pub use control::{ControlHandler, ControlRequest, DispatchResult, SetupPacket, UsbControl};
pub use error::{Error, ProtocolError};

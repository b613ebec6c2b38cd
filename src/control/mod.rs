//! Control-plane aggregation.
//!
//! The USB peripheral driver exposes one control endpoint and only a
//! handful of request-handler slots. Every USB function of the bootloader
//! (WebUSB, WinUSB, BOS, CDC, mass storage, HF2) instead registers into a
//! [`UsbControl`] context, which fans each control transfer out to the
//! registered handlers in registration order and fans every
//! SET_CONFIGURATION out to every configuration callback.
//!
//! ## Request type byte
//!
//! ```text
//! Bit 7   : direction   (0 = host-to-device, 1 = device-to-host)
//! Bit 6-5 : type        (0 = standard, 1 = class, 2 = vendor)
//! Bit 4-0 : recipient   (0 = device, 1 = interface, 2 = endpoint)
//! ```

pub mod dispatch;
pub mod set_config;

pub use dispatch::{AggregateDispatcher, CallbackEntry};
pub use set_config::{ConfigCallbacks, ConfigHandler};

use crate::error::Error;

/// Bit groups and values of `bmRequestType`.
pub mod request_type {
    pub const DIRECTION: u8 = 0x80;
    pub const IN: u8 = 0x80;
    pub const OUT: u8 = 0x00;

    pub const TYPE: u8 = 0x60;
    pub const STANDARD: u8 = 0x00;
    pub const CLASS: u8 = 0x20;
    pub const VENDOR: u8 = 0x40;

    pub const RECIPIENT: u8 = 0x1F;
    pub const DEVICE: u8 = 0x00;
    pub const INTERFACE: u8 = 0x01;
    pub const ENDPOINT: u8 = 0x02;
}

/// Standard request codes used by the descriptor providers.
pub mod standard_request {
    pub const GET_DESCRIPTOR: u8 = 0x06;
}

/// Descriptor type codes (high byte of `wValue` in GET_DESCRIPTOR).
pub mod descriptor_type {
    pub const STRING: u8 = 0x03;
    pub const BOS: u8 = 0x0F;
    pub const DEVICE_CAPABILITY: u8 = 0x10;
}

/// The 8-byte SETUP stage of a control transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetupPacket {
    /// `bmRequestType`: direction | type | recipient.
    pub request_type: u8,
    /// `bRequest`.
    pub request: u8,
    /// `wValue`.
    pub value: u16,
    /// `wIndex`.
    pub index: u16,
    /// `wLength`.
    pub length: u16,
}

impl SetupPacket {
    pub fn is_in(&self) -> bool {
        self.request_type & request_type::DIRECTION == request_type::IN
    }

    /// Type bits (`STANDARD`, `CLASS` or `VENDOR`).
    pub fn kind(&self) -> u8 {
        self.request_type & request_type::TYPE
    }

    /// Recipient bits (`DEVICE`, `INTERFACE` or `ENDPOINT`).
    pub fn recipient(&self) -> u8 {
        self.request_type & request_type::RECIPIENT
    }

    /// Descriptor type of a GET_DESCRIPTOR request.
    pub fn descriptor_type(&self) -> u8 {
        (self.value >> 8) as u8
    }

    /// Descriptor index of a GET_DESCRIPTOR request.
    pub fn descriptor_index(&self) -> u8 {
        (self.value & 0xFF) as u8
    }
}

/// Outcome of offering a control request to one handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatchResult {
    /// Request answered. Terminal.
    Handled,
    /// Request understood but refused (the driver stalls). Terminal.
    NotSupported,
    /// Not for this handler; offer it to the next matching one.
    NextHandler,
}

enum Data<'d> {
    /// Driver control buffer, writable by the handler.
    Buffer(&'d mut [u8]),
    /// OUT data stage, or a descriptor the handler redirected to.
    Borrowed(&'d [u8]),
}

/// A control transfer in flight.
///
/// `len` plays the role of the in/out length: it starts at the host's
/// `wLength` (clamped to the buffer) and handlers may only shrink it.
pub struct ControlRequest<'d> {
    pub setup: SetupPacket,
    data: Data<'d>,
    len: usize,
}

impl<'d> ControlRequest<'d> {
    /// Device-to-host request answered through the driver's control buffer.
    pub fn new(setup: SetupPacket, buf: &'d mut [u8]) -> Self {
        let len = usize::from(setup.length).min(buf.len());
        Self {
            setup,
            data: Data::Buffer(buf),
            len,
        }
    }

    /// Host-to-device request carrying its data stage.
    pub fn with_data(setup: SetupPacket, data: &'d [u8]) -> Self {
        Self {
            setup,
            data: Data::Borrowed(data),
            len: data.len(),
        }
    }

    /// Current transfer length.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes of the transfer: the OUT data stage, or the reply built so far.
    pub fn data(&self) -> &[u8] {
        match &self.data {
            Data::Buffer(buf) => &buf[..self.len],
            Data::Borrowed(data) => &data[..self.len],
        }
    }

    /// Writable reply buffer. Empty once the handler redirected the reply.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        match &mut self.data {
            Data::Buffer(buf) => &mut buf[..],
            Data::Borrowed(_) => &mut [],
        }
    }

    /// Declare that `n` reply bytes were written into [`buffer_mut`].
    /// The transfer never grows past what the host asked for.
    ///
    /// [`buffer_mut`]: Self::buffer_mut
    pub fn set_reply_len(&mut self, n: usize) {
        self.len = self.len.min(n);
    }

    /// Answer with an existing descriptor instead of the control buffer.
    pub fn reply_with(&mut self, descriptor: &'d [u8]) {
        self.len = self.len.min(descriptor.len());
        self.data = Data::Borrowed(descriptor);
    }

    /// Hand the reply back to the driver.
    pub fn into_data(self) -> &'d [u8] {
        let len = self.len;
        match self.data {
            Data::Buffer(buf) => &buf[..len],
            Data::Borrowed(data) => &data[..len],
        }
    }
}

/// One USB function's view of the control endpoint.
///
/// Handlers are offered every request whose `bmRequestType` passes the
/// filter they registered with. A handler must check `wIndex` itself and
/// return [`DispatchResult::NextHandler`] for interfaces it does not own.
pub trait ControlHandler {
    fn handle<'d>(&'d self, req: &mut ControlRequest<'d>) -> DispatchResult;
}

/// Per-device control-plane context: the aggregate request table plus the
/// aggregate set-configuration table.
pub struct UsbControl<'a> {
    requests: AggregateDispatcher<'a>,
    configs: ConfigCallbacks<'a>,
}

impl<'a> UsbControl<'a> {
    pub const fn new() -> Self {
        Self {
            requests: AggregateDispatcher::new(),
            configs: ConfigCallbacks::new(),
        }
    }

    /// Register a control handler for requests with
    /// `(bmRequestType & mask) == value`. Duplicate-safe.
    pub fn register_control(
        &mut self,
        mask: u8,
        value: u8,
        handler: &'a dyn ControlHandler,
    ) -> Result<(), Error> {
        self.requests.register(mask, value, handler)
    }

    /// Register a set-configuration callback. Duplicate-safe.
    pub fn register_config(&mut self, callback: &'a dyn ConfigHandler<'a>) -> Result<(), Error> {
        self.configs.register(callback)
    }

    /// Answer a control transfer.
    pub fn dispatch<'d>(&'d self, req: &mut ControlRequest<'d>) -> DispatchResult {
        self.requests.dispatch(req)
    }

    /// Host selected configuration `value`.
    pub fn set_configuration(&mut self, value: u16) {
        self.configs.notify(&mut self.requests, value);
    }

    pub fn requests(&self) -> &AggregateDispatcher<'a> {
        &self.requests
    }
}

impl Default for UsbControl<'_> {
    fn default() -> Self {
        Self::new()
    }
}

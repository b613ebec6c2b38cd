//! USB 2.1 Binary Object Store.
//!
//! Layout:
//! ```text
//! Byte 0   : bLength (5)
//! Byte 1   : bDescriptorType (0x0F)
//! Byte 2-3 : wTotalLength (header + every capability)
//! Byte 4   : bNumDeviceCaps
//! Byte 5.. : device capability descriptors, each starting with bLength
//! ```

use super::copy_truncated;
use crate::control::request_type::{DEVICE, DIRECTION, IN, RECIPIENT, STANDARD, TYPE};
use crate::control::standard_request::GET_DESCRIPTOR;
use crate::control::{
    descriptor_type, AggregateDispatcher, ConfigHandler, ControlHandler, ControlRequest,
    DispatchResult, UsbControl,
};
use crate::error::Error;

pub const BOS_HEADER_SIZE: usize = 5;

const CALLBACK_MASK: u8 = DIRECTION | TYPE | RECIPIENT;
const CALLBACK_TYPE: u8 = IN | STANDARD | DEVICE;

/// A BOS table: the header is generated, the capabilities are supplied.
pub struct BosDescriptor<'a> {
    pub capabilities: &'a [&'a [u8]],
}

impl<'a> BosDescriptor<'a> {
    pub const fn new(capabilities: &'a [&'a [u8]]) -> Self {
        Self { capabilities }
    }

    /// Length a capability descriptor claims for itself.
    fn capability_len(cap: &[u8]) -> usize {
        cap.first()
            .map_or(0, |&len| usize::from(len))
            .min(cap.len())
    }

    /// Full serialized length (the wTotalLength field).
    pub fn total_length(&self) -> u16 {
        let caps: usize = self
            .capabilities
            .iter()
            .map(|cap| Self::capability_len(cap))
            .sum();
        (BOS_HEADER_SIZE + caps) as u16
    }

    /// Serialize into `buf`, truncating to its length.
    /// Returns the number of bytes written.
    pub fn write(&self, buf: &mut [u8]) -> usize {
        let total = self.total_length().to_le_bytes();
        let header = [
            BOS_HEADER_SIZE as u8,
            descriptor_type::BOS,
            total[0],
            total[1],
            self.capabilities.len() as u8,
        ];

        let mut written = copy_truncated(buf, &header);
        for cap in self.capabilities {
            let cap = &cap[..Self::capability_len(cap)];
            written += copy_truncated(&mut buf[written..], cap);
        }
        written
    }
}

/// GET_DESCRIPTOR(BOS) provider.
pub struct Usb21Standard<'a> {
    bos: Option<&'a BosDescriptor<'a>>,
}

impl<'a> Usb21Standard<'a> {
    pub const fn new(bos: Option<&'a BosDescriptor<'a>>) -> Self {
        Self { bos }
    }

    /// Register now (the host reads the BOS before configuring) and on
    /// every configuration change.
    pub fn attach(&'a self, usb: &mut UsbControl<'a>) -> Result<(), Error> {
        usb.register_control(CALLBACK_MASK, CALLBACK_TYPE, self)?;
        usb.register_config(self)
    }
}

impl ControlHandler for Usb21Standard<'_> {
    fn handle<'d>(&'d self, req: &mut ControlRequest<'d>) -> DispatchResult {
        if req.setup.descriptor_type() != descriptor_type::BOS {
            return DispatchResult::NextHandler;
        }
        let Some(bos) = self.bos else {
            warn!("BOS requested but none configured");
            return DispatchResult::NotSupported;
        };
        if req.setup.request != GET_DESCRIPTOR {
            debug!("usb21 next, request {}", req.setup.request);
            return DispatchResult::NextHandler;
        }

        let written = bos.write(req.buffer_mut());
        req.set_reply_len(written);
        debug!("usb21 BOS, {} bytes", req.len());
        DispatchResult::Handled
    }
}

impl<'a> ConfigHandler<'a> for Usb21Standard<'a> {
    fn set_config(&'a self, control: &mut AggregateDispatcher<'a>, _value: u16) {
        if control.register(CALLBACK_MASK, CALLBACK_TYPE, self).is_err() {
            error!("usb21 set_config failed");
        }
    }
}

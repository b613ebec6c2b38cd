//! `embassy_usb::Handler` that feeds the control endpoint into
//! [`UsbControl`].
//!
//! embassy-usb answers standard GET_DESCRIPTOR itself (the BOS comes from
//! the builder), so only class and vendor requests, configuration changes
//! and the 0xEE OS string reach this bridge.

use defmt::{debug, info};
use embassy_usb::control::{InResponse, OutResponse, Request};
use embassy_usb::driver::Direction;
use embassy_usb::types::StringIndex;
use embassy_usb::Handler;
use uf2boot::control::request_type::{IN, OUT};
use uf2boot::control::{ControlRequest, DispatchResult, SetupPacket, UsbControl};
use heapless::String;
use uf2boot::descriptor::winusb::{WinUsb, OS_STRING_INDEX, OS_STRING_TEXT_CAPACITY};

pub struct ControlBridge {
    usb: UsbControl<'static>,
    /// String 0xEE, which embassy-usb encodes itself.
    os_string: String<OS_STRING_TEXT_CAPACITY>,
}

impl ControlBridge {
    pub fn new(usb: UsbControl<'static>, winusb: &WinUsb) -> Self {
        Self {
            usb,
            os_string: winusb.os_string_text(),
        }
    }
}

/// Rebuild the raw SETUP fields from embassy's decoded request.
fn setup_packet(req: &Request) -> SetupPacket {
    let direction = match req.direction {
        Direction::In => IN,
        Direction::Out => OUT,
    };
    SetupPacket {
        request_type: direction | (req.request_type as u8) << 5 | req.recipient as u8,
        request: req.request,
        value: req.value,
        index: req.index,
        length: req.length,
    }
}

impl Handler for ControlBridge {
    fn reset(&mut self) {
        debug!("usb bus reset");
    }

    fn configured(&mut self, configured: bool) {
        info!("usb configured: {}", configured);
        self.usb.set_configuration(u16::from(configured));
    }

    fn control_out(&mut self, req: Request, data: &[u8]) -> Option<OutResponse> {
        let mut request = ControlRequest::with_data(setup_packet(&req), data);
        match self.usb.dispatch(&mut request) {
            DispatchResult::Handled => Some(OutResponse::Accepted),
            DispatchResult::NotSupported => Some(OutResponse::Rejected),
            DispatchResult::NextHandler => None,
        }
    }

    fn control_in<'a>(&'a mut self, req: Request, buf: &'a mut [u8]) -> Option<InResponse<'a>> {
        let mut request = ControlRequest::new(setup_packet(&req), buf);
        match self.usb.dispatch(&mut request) {
            DispatchResult::Handled => Some(InResponse::Accepted(request.into_data())),
            DispatchResult::NotSupported => Some(InResponse::Rejected),
            DispatchResult::NextHandler => None,
        }
    }

    fn get_string(&mut self, index: StringIndex, _lang_id: u16) -> Option<&str> {
        (u8::from(index) == OS_STRING_INDEX).then_some(self.os_string.as_str())
    }
}

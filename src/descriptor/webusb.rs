//! WebUSB: the BOS platform capability and the GET_URL vendor request.
//!
//! Browsers read the platform capability from the BOS, learn the vendor
//! code and landing-page index, then issue
//! `GET_URL(bmRequestType 0xC0, bRequest vendor_code, wValue index, wIndex 2)`.

use super::copy_truncated;
use crate::control::request_type::{DEVICE, RECIPIENT, TYPE, VENDOR};
use crate::control::{
    descriptor_type, AggregateDispatcher, ConfigHandler, ControlHandler, ControlRequest,
    DispatchResult, UsbControl,
};
use crate::error::Error;

/// `{3408b638-09a9-a047-8bfd-a0768815b665}` in little-endian layout.
pub const WEBUSB_UUID: [u8; 16] = [
    0x38, 0xB6, 0x08, 0x34, 0xA9, 0x09, 0xA0, 0x47, 0x8B, 0xFD, 0xA0, 0x76, 0x88, 0x15, 0xB6, 0x65,
];

pub const PLATFORM_CAPABILITY_SIZE: usize = 24;
const PLATFORM_CAPABILITY_TYPE: u8 = 0x05;
const WEBUSB_VERSION: u16 = 0x0100;

pub const REQ_GET_URL: u16 = 2;
pub const DT_URL: u8 = 3;
pub const URL_HEADER_SIZE: usize = 3;
pub const URL_SCHEME_HTTPS: u8 = 1;

/// Landing page string index. Index 0 means "no landing page".
const LANDING_PAGE_INDEX: u16 = 1;

/// Longest URL a one-byte `bLength` can describe.
const MAX_URL_LEN: usize = u8::MAX as usize - URL_HEADER_SIZE;

/// The 24-byte WebUSB platform capability descriptor for the BOS.
pub const fn platform_capability(vendor_code: u8, landing_page: bool) -> [u8; PLATFORM_CAPABILITY_SIZE] {
    let mut cap = [0u8; PLATFORM_CAPABILITY_SIZE];
    cap[0] = PLATFORM_CAPABILITY_SIZE as u8;
    cap[1] = descriptor_type::DEVICE_CAPABILITY;
    cap[2] = PLATFORM_CAPABILITY_TYPE;
    cap[3] = 0; // bReserved
    let mut i = 0;
    while i < WEBUSB_UUID.len() {
        cap[4 + i] = WEBUSB_UUID[i];
        i += 1;
    }
    let version = WEBUSB_VERSION.to_le_bytes();
    cap[20] = version[0];
    cap[21] = version[1];
    cap[22] = vendor_code;
    cap[23] = if landing_page { LANDING_PAGE_INDEX as u8 } else { 0 };
    cap
}

/// GET_URL responder for one landing page (scheme-less, served as https).
pub struct WebUsb<'a> {
    vendor_code: u8,
    landing_page: &'a str,
}

impl<'a> WebUsb<'a> {
    pub const fn new(vendor_code: u8, landing_page: &'a str) -> Self {
        Self {
            vendor_code,
            landing_page,
        }
    }

    pub fn attach(&'a self, usb: &mut UsbControl<'a>) -> Result<(), Error> {
        usb.register_control(TYPE | RECIPIENT, VENDOR | DEVICE, self)?;
        usb.register_config(self)
    }

    /// Build the URL descriptor into `buf`; returns the descriptor length.
    fn write_url(&self, buf: &mut [u8]) -> usize {
        let url = self.landing_page.as_bytes();
        let url = &url[..url.len().min(MAX_URL_LEN)];
        let total = URL_HEADER_SIZE + url.len();

        let header = [total as u8, DT_URL, URL_SCHEME_HTTPS];
        let written = copy_truncated(buf, &header);
        copy_truncated(&mut buf[written..], url);
        total
    }
}

impl ControlHandler for WebUsb<'_> {
    fn handle<'d>(&'d self, req: &mut ControlRequest<'d>) -> DispatchResult {
        let setup = req.setup;
        // GET_URL is a device-to-host vendor request addressed to the device.
        if !setup.is_in() || setup.kind() != VENDOR || setup.recipient() != DEVICE {
            return DispatchResult::NextHandler;
        }
        if setup.request != self.vendor_code {
            return DispatchResult::NextHandler;
        }

        if setup.index != REQ_GET_URL {
            debug!("webusb unknown wIndex {}", setup.index);
            return DispatchResult::NotSupported;
        }

        match setup.value {
            LANDING_PAGE_INDEX if !self.landing_page.is_empty() => {
                let total = self.write_url(req.buffer_mut());
                req.set_reply_len(total);
                debug!("webusb url, {} bytes", req.len());
                DispatchResult::Handled
            }
            // Index 0 and unknown indices.
            index => {
                debug!("webusb no url at index {}", index);
                DispatchResult::NotSupported
            }
        }
    }
}

impl<'a> ConfigHandler<'a> for WebUsb<'a> {
    fn set_config(&'a self, control: &mut AggregateDispatcher<'a>, _value: u16) {
        if control
            .register(TYPE | RECIPIENT, VENDOR | DEVICE, self)
            .is_err()
        {
            error!("webusb set_config failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::SetupPacket;

    fn get_url(value: u16, length: u16) -> SetupPacket {
        SetupPacket {
            request_type: 0xC0,
            request: 0x22,
            value,
            index: REQ_GET_URL,
            length,
        }
    }

    #[test]
    fn platform_capability_layout() {
        let cap = platform_capability(0x22, true);
        assert_eq!(&cap[..4], &[0x18, 0x10, 0x05, 0x00]);
        assert_eq!(&cap[4..20], &WEBUSB_UUID);
        assert_eq!(&cap[20..], &[0x00, 0x01, 0x22, 0x01]);

        let cap = platform_capability(0x22, false);
        assert_eq!(cap[23], 0);
    }

    #[test]
    fn get_url_returns_https_descriptor() {
        let webusb = WebUsb::new(0x22, "example.org");
        let mut buf = [0u8; 64];
        let mut req = ControlRequest::new(get_url(1, 64), &mut buf);
        assert_eq!(webusb.handle(&mut req), DispatchResult::Handled);
        assert_eq!(req.len(), 14);
        assert_eq!(&req.data()[..3], &[14, DT_URL, URL_SCHEME_HTTPS]);
        assert_eq!(&req.data()[3..], b"example.org");
    }

    #[test]
    fn get_url_truncates_to_host_length() {
        let webusb = WebUsb::new(0x22, "example.org");
        let mut buf = [0u8; 64];
        let mut req = ControlRequest::new(get_url(1, 5), &mut buf);
        assert_eq!(webusb.handle(&mut req), DispatchResult::Handled);
        assert_eq!(req.data(), &[14, DT_URL, URL_SCHEME_HTTPS, b'e', b'x']);
    }

    #[test]
    fn index_zero_and_unknown_indices_are_refused() {
        let webusb = WebUsb::new(0x22, "example.org");
        for value in [0, 2, 7] {
            let mut buf = [0u8; 64];
            let mut req = ControlRequest::new(get_url(value, 64), &mut buf);
            assert_eq!(webusb.handle(&mut req), DispatchResult::NotSupported);
        }
    }

    #[test]
    fn foreign_vendor_code_is_passed_on() {
        let webusb = WebUsb::new(0x22, "example.org");
        let mut setup = get_url(1, 64);
        setup.request = 0x21;
        let mut buf = [0u8; 64];
        let mut req = ControlRequest::new(setup, &mut buf);
        assert_eq!(webusb.handle(&mut req), DispatchResult::NextHandler);
    }

    #[test]
    fn other_request_types_are_passed_on() {
        let webusb = WebUsb::new(0x22, "example.org");
        let mut setup = get_url(1, 64);
        setup.request_type = 0x40;
        let mut buf = [0u8; 64];
        let mut req = ControlRequest::new(setup, &mut buf);
        assert_eq!(webusb.handle(&mut req), DispatchResult::NextHandler);
    }

    #[test]
    fn unknown_windex_is_refused() {
        let webusb = WebUsb::new(0x22, "example.org");
        let mut setup = get_url(1, 64);
        setup.index = 1;
        let mut buf = [0u8; 64];
        let mut req = ControlRequest::new(setup, &mut buf);
        assert_eq!(webusb.handle(&mut req), DispatchResult::NotSupported);
    }

    #[test]
    fn only_device_recipient_reaches_get_url() {
        let webusb = WebUsb::new(0x22, "example.org");
        let mut usb = UsbControl::new();
        webusb.attach(&mut usb).unwrap();

        // Interface-recipient vendor requests never match the filter.
        let mut setup = get_url(1, 64);
        setup.request_type = 0xC1;
        let mut buf = [0u8; 64];
        let mut req = ControlRequest::new(setup, &mut buf);
        assert_eq!(usb.dispatch(&mut req), DispatchResult::NextHandler);
        let mut req = ControlRequest::new(setup, &mut buf);
        assert_eq!(webusb.handle(&mut req), DispatchResult::NextHandler);

        let mut buf = [0u8; 64];
        let mut req = ControlRequest::new(get_url(1, 64), &mut buf);
        assert_eq!(usb.dispatch(&mut req), DispatchResult::Handled);
    }
}

//! Microsoft OS 1.0 descriptors binding one interface to WinUSB.
//!
//! Windows first reads string descriptor 0xEE. If it carries the "MSFT100"
//! signature, the vendor code in it is used for two vendor requests:
//!
//! | bmRequestType | wIndex | Reply                          |
//! |---------------|--------|--------------------------------|
//! | 0xC0          | 4      | compatible ID ("WINUSB")       |
//! | 0xC1          | 5      | extended properties (GUIDs)    |

use heapless::String;

use crate::config::WINUSB_INTERFACE_GUID;
use crate::control::request_type::{DEVICE, INTERFACE, RECIPIENT, STANDARD, TYPE, VENDOR};
use crate::control::standard_request::GET_DESCRIPTOR;
use crate::control::{
    descriptor_type, AggregateDispatcher, ConfigHandler, ControlHandler, ControlRequest,
    DispatchResult, UsbControl,
};
use crate::error::Error;

pub const OS_STRING_INDEX: u8 = 0xEE;
pub const OS_STRING_SIZE: usize = 18;
const OS_SIGNATURE: &[u8; 7] = b"MSFT100";

/// UTF-8 length of the 0xEE string: signature plus a vendor code above
/// 0x7F taking two bytes.
pub const OS_STRING_TEXT_CAPACITY: usize = OS_SIGNATURE.len() + 2;

pub const COMPATIBLE_ID_INDEX: u16 = 0x0004;
pub const EXTENDED_PROPERTIES_INDEX: u16 = 0x0005;
const MS_OS_VERSION: u16 = 0x0100;

pub const COMPATIBLE_ID_SIZE: usize = 40;
const COMPATIBLE_ID_HEADER_SIZE: usize = 16;

const REG_MULTI_SZ: u32 = 7;
const PROPERTY_NAME: &str = "DeviceInterfaceGUIDs";
/// UTF-16 with terminating null.
const PROPERTY_NAME_SIZE: usize = (PROPERTY_NAME.len() + 1) * 2;
/// UTF-16 REG_MULTI_SZ: string null plus list null.
const PROPERTY_DATA_SIZE: usize = (WINUSB_INTERFACE_GUID.len() + 2) * 2;
const PROPERTY_SIZE: usize = 4 + 4 + 2 + PROPERTY_NAME_SIZE + 4 + PROPERTY_DATA_SIZE;
const EXTENDED_PROPERTIES_HEADER_SIZE: usize = 10;
pub const EXTENDED_PROPERTIES_SIZE: usize = EXTENDED_PROPERTIES_HEADER_SIZE + PROPERTY_SIZE;

/// Extended properties feature descriptor carrying the interface GUID.
pub static EXTENDED_PROPERTIES: [u8; EXTENDED_PROPERTIES_SIZE] = extended_properties();

const fn extended_properties() -> [u8; EXTENDED_PROPERTIES_SIZE] {
    let mut d = [0u8; EXTENDED_PROPERTIES_SIZE];

    // Header: dwLength, bcdVersion, wIndex, wCount.
    let len = (EXTENDED_PROPERTIES_SIZE as u32).to_le_bytes();
    d[0] = len[0];
    d[1] = len[1];
    d[2] = len[2];
    d[3] = len[3];
    let version = MS_OS_VERSION.to_le_bytes();
    d[4] = version[0];
    d[5] = version[1];
    d[6] = EXTENDED_PROPERTIES_INDEX as u8;
    d[7] = 0;
    d[8] = 1;
    d[9] = 0;

    // Property section.
    let mut at = EXTENDED_PROPERTIES_HEADER_SIZE;
    let size = (PROPERTY_SIZE as u32).to_le_bytes();
    let kind = REG_MULTI_SZ.to_le_bytes();
    let mut i = 0;
    while i < 4 {
        d[at + i] = size[i];
        d[at + 4 + i] = kind[i];
        i += 1;
    }
    at += 8;

    let name_len = (PROPERTY_NAME_SIZE as u16).to_le_bytes();
    d[at] = name_len[0];
    d[at + 1] = name_len[1];
    at += 2;
    let name = PROPERTY_NAME.as_bytes();
    let mut i = 0;
    while i < name.len() {
        d[at + i * 2] = name[i];
        i += 1;
    }
    at += PROPERTY_NAME_SIZE;

    let data_len = (PROPERTY_DATA_SIZE as u32).to_le_bytes();
    let mut i = 0;
    while i < 4 {
        d[at + i] = data_len[i];
        i += 1;
    }
    at += 4;
    let guid = WINUSB_INTERFACE_GUID.as_bytes();
    let mut i = 0;
    while i < guid.len() {
        d[at + i * 2] = guid[i];
        i += 1;
    }

    d
}

/// Compatible ID feature descriptor naming `interface` as WINUSB.
pub const fn compatible_id(interface: u8) -> [u8; COMPATIBLE_ID_SIZE] {
    let mut d = [0u8; COMPATIBLE_ID_SIZE];
    d[0] = COMPATIBLE_ID_SIZE as u8;
    let version = MS_OS_VERSION.to_le_bytes();
    d[4] = version[0];
    d[5] = version[1];
    d[6] = COMPATIBLE_ID_INDEX as u8;
    d[8] = 1; // bCount
    // 7 reserved bytes, then the function section.
    let f = COMPATIBLE_ID_HEADER_SIZE;
    d[f] = interface;
    d[f + 1] = 0x01;
    let id = b"WINUSB";
    let mut i = 0;
    while i < id.len() {
        d[f + 2 + i] = id[i];
        i += 1;
    }
    // Sub-compatible ID and reserved bytes stay zero.
    d
}

/// String descriptor 0xEE: "MSFT100" signature plus the vendor code.
pub const fn os_string_descriptor(vendor_code: u8) -> [u8; OS_STRING_SIZE] {
    let mut d = [0u8; OS_STRING_SIZE];
    d[0] = OS_STRING_SIZE as u8;
    d[1] = descriptor_type::STRING;
    let mut i = 0;
    while i < OS_SIGNATURE.len() {
        d[2 + i * 2] = OS_SIGNATURE[i];
        i += 1;
    }
    d[16] = vendor_code;
    d
}

pub struct WinUsb {
    vendor_code: u8,
    interface: u8,
    compatible_id: [u8; COMPATIBLE_ID_SIZE],
    os_string: [u8; OS_STRING_SIZE],
}

impl WinUsb {
    pub const fn new(vendor_code: u8, interface: u8) -> Self {
        Self {
            vendor_code,
            interface,
            compatible_id: compatible_id(interface),
            os_string: os_string_descriptor(vendor_code),
        }
    }

    pub fn os_string(&self) -> &[u8; OS_STRING_SIZE] {
        &self.os_string
    }

    /// The 0xEE string as text, for drivers that build string
    /// descriptors themselves. Encodes to the same UTF-16 as
    /// [`os_string`](Self::os_string).
    pub fn os_string_text(&self) -> String<OS_STRING_TEXT_CAPACITY> {
        OS_SIGNATURE
            .iter()
            .chain(core::iter::once(&self.vendor_code))
            .map(|&b| char::from(b))
            .collect()
    }

    /// Register the vendor-request filter and the device-descriptor filter.
    pub fn attach<'a>(&'a self, usb: &mut UsbControl<'a>) -> Result<(), Error> {
        usb.register_control(TYPE, VENDOR, self)?;
        usb.register_control(RECIPIENT, DEVICE, self)?;
        usb.register_config(self)
    }

    fn string_descriptor<'d>(&'d self, req: &mut ControlRequest<'d>) -> DispatchResult {
        let setup = req.setup;
        if setup.request != GET_DESCRIPTOR
            || setup.descriptor_type() != descriptor_type::STRING
            || setup.descriptor_index() != OS_STRING_INDEX
        {
            return DispatchResult::NextHandler;
        }
        req.reply_with(&self.os_string);
        DispatchResult::Handled
    }

    fn feature_descriptor<'d>(&'d self, req: &mut ControlRequest<'d>) -> DispatchResult {
        let setup = req.setup;
        if setup.request != self.vendor_code {
            return DispatchResult::NextHandler;
        }

        match (setup.recipient(), setup.index) {
            (DEVICE, COMPATIBLE_ID_INDEX) => {
                debug!("winusb compatible id, intf {}", self.interface);
                req.reply_with(&self.compatible_id);
                DispatchResult::Handled
            }
            (INTERFACE, EXTENDED_PROPERTIES_INDEX)
                if setup.descriptor_index() == self.interface =>
            {
                debug!("winusb extended properties, intf {}", self.interface);
                req.reply_with(&EXTENDED_PROPERTIES);
                DispatchResult::Handled
            }
            (recipient, index) => {
                warn!(
                    "winusb unsupported, recipient {} wIndex {} wValue {:x}",
                    recipient, index, setup.value
                );
                DispatchResult::NotSupported
            }
        }
    }
}

impl ControlHandler for WinUsb {
    fn handle<'d>(&'d self, req: &mut ControlRequest<'d>) -> DispatchResult {
        match req.setup.kind() {
            VENDOR => self.feature_descriptor(req),
            STANDARD if req.setup.recipient() == DEVICE => self.string_descriptor(req),
            _ => DispatchResult::NextHandler,
        }
    }
}

impl<'a> ConfigHandler<'a> for WinUsb {
    fn set_config(&'a self, control: &mut AggregateDispatcher<'a>, _value: u16) {
        let result = control
            .register(TYPE, VENDOR, self)
            .and_then(|()| control.register(RECIPIENT, DEVICE, self));
        if result.is_err() {
            error!("winusb set_config failed");
        }
    }
}

//! CDC-ACM virtual serial port: class control requests and receive path.
//!
//! Line coding and control line state are accepted and ignored; the Linux
//! `cdc_acm` driver refuses to open the port without them even though the
//! ACM functional descriptor does not advertise them.

use crate::control::request_type::{CLASS, INTERFACE, RECIPIENT, TYPE};
use crate::control::{
    AggregateDispatcher, ConfigHandler, ControlHandler, ControlRequest, DispatchResult, UsbControl,
};
use crate::error::Error;

const CALLBACK_MASK: u8 = TYPE | RECIPIENT;
const CALLBACK_TYPE: u8 = CLASS | INTERFACE;

/// Class-specific interface descriptor type.
pub const CS_INTERFACE: u8 = 0x24;

/// Functional descriptor subtypes of the communication interface.
pub mod functional {
    pub const HEADER: u8 = 0x00;
    pub const CALL_MANAGEMENT: u8 = 0x01;
    pub const ABSTRACT_CONTROL_MANAGEMENT: u8 = 0x02;
    pub const UNION: u8 = 0x06;
}

pub const CDC_VERSION: u16 = 0x0110;
pub const CLASS_CDC: u8 = 0x02;
pub const CLASS_CDC_DATA: u8 = 0x0A;
pub const SUBCLASS_ACM: u8 = 0x02;

pub const REQ_SET_LINE_CODING: u8 = 0x20;
pub const REQ_GET_LINE_CODING: u8 = 0x21;
pub const REQ_SET_CONTROL_LINE_STATE: u8 = 0x22;

/// SET_LINE_CODING data stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineCoding {
    pub data_rate: u32,
    /// 0 = 1 stop bit, 1 = 1.5, 2 = 2.
    pub stop_bits: u8,
    /// 0 = none, 1 = odd, 2 = even, 3 = mark, 4 = space.
    pub parity: u8,
    pub data_bits: u8,
}

impl LineCoding {
    pub const SIZE: usize = 7;

    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            data_rate: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            stop_bits: data[4],
            parity: data[5],
            data_bits: data[6],
        })
    }
}

/// The communication/data interface pair of one serial port.
pub struct CdcAcm {
    comm_interface: u8,
    data_interface: u8,
}

impl CdcAcm {
    pub const fn new(comm_interface: u8, data_interface: u8) -> Self {
        Self {
            comm_interface,
            data_interface,
        }
    }

    /// Class requests are only registered once the host configures the
    /// device.
    pub fn attach<'a>(&'a self, usb: &mut UsbControl<'a>) -> Result<(), Error> {
        usb.register_config(self)
    }

    fn owns(&self, index: u16) -> bool {
        index == u16::from(self.comm_interface) || index == u16::from(self.data_interface)
    }

    /// Bulk OUT data from the host. Consumed and logged.
    pub fn on_data_received(&self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        debug!("cdc << {=[u8]:a}", data);
        data.len()
    }
}

impl ControlHandler for CdcAcm {
    fn handle<'d>(&'d self, req: &mut ControlRequest<'d>) -> DispatchResult {
        if !self.owns(req.setup.index) {
            return DispatchResult::NextHandler;
        }
        trace!("cdc control {}", req.setup.request);

        match req.setup.request {
            REQ_SET_CONTROL_LINE_STATE => DispatchResult::Handled,
            REQ_SET_LINE_CODING => match LineCoding::parse(req.data()) {
                Some(coding) => {
                    debug!("cdc line coding {}", coding);
                    DispatchResult::Handled
                }
                None => DispatchResult::NotSupported,
            },
            request => {
                debug!("cdc control not supported {}", request);
                DispatchResult::NotSupported
            }
        }
    }
}

impl<'a> ConfigHandler<'a> for CdcAcm {
    fn set_config(&'a self, control: &mut AggregateDispatcher<'a>, _value: u16) {
        if control.register(CALLBACK_MASK, CALLBACK_TYPE, self).is_err() {
            error!("cdc set_config failed");
        }
    }
}

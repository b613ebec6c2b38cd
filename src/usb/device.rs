//! Composite device construction and the USB-side tasks.

use defmt::{info, warn};
use embassy_nrf::usb::vbus_detect::HardwareVbusDetect;
use embassy_nrf::usb::Driver;
use embassy_nrf::{self, bind_interrupts, peripherals};
use embassy_usb::class::hid::{Config as HidConfig, HidReaderWriter, State};
use embassy_usb::driver::{Endpoint as _, EndpointOut as _};
use embassy_usb::{Builder, Config, UsbDevice};
use heapless::Deque;
use static_cell::StaticCell;
use uf2boot::cdc::{
    functional, CdcAcm, CDC_VERSION, CLASS_CDC, CLASS_CDC_DATA, CS_INTERFACE, SUBCLASS_ACM,
};
use uf2boot::config;
use uf2boot::control::UsbControl;
use uf2boot::descriptor::bos::{BosDescriptor, Usb21Standard};
use uf2boot::descriptor::webusb::{platform_capability, WebUsb, PLATFORM_CAPABILITY_SIZE};
use uf2boot::descriptor::winusb::WinUsb;
use uf2boot::error::{Error, FailureHook, Halt};
use uf2boot::hf2::{Hf2Config, Hf2Engine, PACKET_SIZE};

use super::bridge::ControlBridge;
use crate::board::{self, NvmcFlash};

bind_interrupts!(struct Irqs {
    USBD => embassy_nrf::usb::InterruptHandler<peripherals::USBD>;
    CLOCK_POWER => embassy_nrf::usb::vbus_detect::InterruptHandler;
});

pub type UsbDriver = Driver<'static, peripherals::USBD, HardwareVbusDetect>;
pub type CdcOut = <UsbDriver as embassy_usb::driver::Driver<'static>>::EndpointOut;
pub type Hf2Hid = HidReaderWriter<'static, UsbDriver, PACKET_SIZE, PACKET_SIZE>;

/// Vendor-defined raw HID collection: 64-byte input and output reports,
/// no report id.
const HF2_REPORT_DESCRIPTOR: &[u8] = &[
    0x06, 0x97, 0xFF, // Usage Page (Vendor 0xFF97)
    0x09, 0x01, // Usage (0x01)
    0xA1, 0x01, // Collection (Application)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, //   Logical Maximum (255)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x40, //   Report Count (64)
    0x09, 0x01, //   Usage (0x01)
    0x81, 0x02, //   Input (Data, Var, Abs)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x40, //   Report Count (64)
    0x09, 0x01, //   Usage (0x01)
    0x91, 0x02, //   Output (Data, Var, Abs)
    0xC0, // End Collection
];

/// HF2 poll interval.
const HF2_POLL_MS: u8 = 1;

/// Reports staged ahead of the IN endpoint. The engine hands over one
/// chunk per transmit-complete, so one slot is enough.
const HF2_QUEUE_DEPTH: usize = 1;

static WEBUSB_CAPABILITY: [u8; PLATFORM_CAPABILITY_SIZE] =
    platform_capability(config::WEBUSB_VENDOR_CODE, true);
static BOS_CAPABILITIES: [&[u8]; 1] = [&WEBUSB_CAPABILITY];
static BOS: BosDescriptor<'static> = BosDescriptor::new(&BOS_CAPABILITIES);
static USB21: Usb21Standard<'static> = Usb21Standard::new(Some(&BOS));
static WEBUSB: WebUsb<'static> = WebUsb::new(config::WEBUSB_VENDOR_CODE, config::WEBUSB_LANDING_PAGE);

/// HF2 engine, shared by the HF2 task and the configuration fan-out.
pub static HF2: Hf2Engine = Hf2Engine::new(Hf2Config::new());

static WINUSB: StaticCell<WinUsb> = StaticCell::new();
static CDC: StaticCell<CdcAcm> = StaticCell::new();
static HF2_STATE: StaticCell<State> = StaticCell::new();
static USB_CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_MSOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_CTRL_BUF: StaticCell<[u8; config::USB_CONTROL_BUF_SIZE]> = StaticCell::new();
static USB_BRIDGE: StaticCell<ControlBridge> = StaticCell::new();

/// Build result: the device runner plus the endpoints the tasks own.
pub struct UsbParts {
    pub device: UsbDevice<'static, UsbDriver>,
    pub hf2: Hf2Hid,
    pub cdc_rx: CdcOut,
    pub cdc: &'static CdcAcm,
}

fn registered(result: Result<(), Error>, what: &str) {
    if result.is_err() {
        Halt.fail(what);
    }
}

/// Initialise the USB stack and create the composite bootloader device.
///
/// Must be called exactly once.  All static buffers are consumed here.
pub fn init(usbd: peripherals::USBD, serial_number: &'static str) -> UsbParts {
    let driver = Driver::new(usbd, Irqs, HardwareVbusDetect::new(Irqs));

    let mut usb_config = Config::new(config::USB_VID, config::USB_PID);
    usb_config.manufacturer = Some(config::USB_MANUFACTURER);
    usb_config.product = Some(config::USB_PRODUCT);
    usb_config.serial_number = Some(serial_number);
    usb_config.max_power = 100; // mA
    usb_config.max_packet_size_0 = config::MAX_USB_PACKET_SIZE as u8;

    let mut builder = Builder::new(
        driver,
        usb_config,
        USB_CONFIG_DESC.init([0u8; 256]),
        USB_BOS_DESC.init([0u8; 256]),
        USB_MSOS_DESC.init([0u8; 256]),
        USB_CTRL_BUF.init([0u8; config::USB_CONTROL_BUF_SIZE]),
    );

    // Vendor interface: WinUSB binding, WebUSB capability.
    let vendor_interface = {
        let mut func = builder.function(0xFF, 0x00, 0x00);
        let mut iface = func.interface();
        let number = u8::from(iface.interface_number());
        let mut alt = iface.alt_setting(0xFF, 0x00, 0x00, None);
        alt.bos_capability(WEBUSB_CAPABILITY[2], &WEBUSB_CAPABILITY[3..]);
        number
    };

    // CDC-ACM: communication interface with functional descriptors, then
    // the data interface.
    let (cdc_rx, comm_interface, data_interface) = {
        let mut func = builder.function(CLASS_CDC, SUBCLASS_ACM, 0x00);
        let mut iface = func.interface();
        let comm = u8::from(iface.interface_number());
        let data = comm + 1;
        let mut alt = iface.alt_setting(CLASS_CDC, SUBCLASS_ACM, 0x00, None);
        let version = CDC_VERSION.to_le_bytes();
        alt.descriptor(CS_INTERFACE, &[functional::HEADER, version[0], version[1]]);
        alt.descriptor(CS_INTERFACE, &[functional::CALL_MANAGEMENT, 0x00, data]);
        alt.descriptor(CS_INTERFACE, &[functional::ABSTRACT_CONTROL_MANAGEMENT, 0x02]);
        alt.descriptor(CS_INTERFACE, &[functional::UNION, comm, data]);
        let _notify = alt.endpoint_interrupt_in(8, 255);

        let mut iface = func.interface();
        let mut alt = iface.alt_setting(CLASS_CDC_DATA, 0x00, 0x00, None);
        let rx = alt.endpoint_bulk_out(config::MAX_USB_PACKET_SIZE as u16);
        let _tx = alt.endpoint_bulk_in(config::MAX_USB_PACKET_SIZE as u16);
        (rx, comm, data)
    };

    let hf2_config = HidConfig {
        report_descriptor: HF2_REPORT_DESCRIPTOR,
        request_handler: None,
        poll_ms: HF2_POLL_MS,
        max_packet_size: PACKET_SIZE as u16,
    };
    let hf2 = HidReaderWriter::new(&mut builder, HF2_STATE.init(State::new()), hf2_config);

    // Aggregate control plane, in priority order.
    let winusb: &'static WinUsb = WINUSB.init(WinUsb::new(config::WINUSB_VENDOR_CODE, vendor_interface));
    let cdc: &'static CdcAcm = CDC.init(CdcAcm::new(comm_interface, data_interface));
    let mut control = UsbControl::new();
    registered(USB21.attach(&mut control), "usb21 setup failed");
    registered(WEBUSB.attach(&mut control), "webusb setup failed");
    registered(winusb.attach(&mut control), "winusb setup failed");
    registered(cdc.attach(&mut control), "cdc setup failed");
    registered(control.register_config(&HF2), "hf2 setup failed");

    builder.handler(USB_BRIDGE.init(ControlBridge::new(control, winusb)));

    let device = builder.build();

    info!(
        "USB composite device initialised (vendor {}, cdc {}/{})",
        vendor_interface, comm_interface, data_interface
    );

    UsbParts {
        device,
        hf2,
        cdc_rx,
        cdc,
    }
}

/// Run the USB device stack - must be spawned as a dedicated Embassy task.
pub async fn run_usb_device(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    info!("USB device task started");
    device.run().await
}

/// HF2 task: feeds OUT reports to the engine and drains its responses.
///
/// Each written report counts as a transmit-complete event and lets the
/// engine stage the next chunk of a multi-report response.
pub async fn hf2_task(hid: Hf2Hid, mut flash: NvmcFlash) -> ! {
    info!("HF2 task started");
    let (mut reader, mut writer) = hid.split();
    let mut packet = [0u8; PACKET_SIZE];
    let mut queue: Deque<[u8; PACKET_SIZE], HF2_QUEUE_DEPTH> = Deque::new();

    loop {
        let n = match reader.read(&mut packet).await {
            Ok(n) => n,
            Err(_e) => {
                warn!("HF2 read failed");
                continue;
            }
        };

        let action = match HF2.on_packet(&packet[..n], &mut flash, &mut queue) {
            Ok(action) => action,
            Err(e) => {
                warn!("HF2 packet rejected: {}", e);
                None
            }
        };

        while let Some(report) = queue.pop_front() {
            if let Err(_e) = writer.write(&report).await {
                warn!("HF2 write failed");
                HF2.reset();
                queue.clear();
                break;
            }
            if let Err(e) = HF2.on_transmit_complete(&mut queue) {
                warn!("HF2 transmit stalled: {}", e);
            }
        }

        if let Some(action) = action {
            board::reset(action).await;
        }
    }
}

/// CDC receive task - consumes whatever the host writes to the port.
pub async fn cdc_task(mut rx: CdcOut, cdc: &'static CdcAcm) -> ! {
    let mut buf = [0u8; config::MAX_USB_PACKET_SIZE];
    loop {
        rx.wait_enabled().await;
        info!("CDC data interface enabled");
        while let Ok(n) = rx.read(&mut buf).await {
            cdc.on_data_received(&buf[..n]);
        }
        warn!("CDC data interface disabled");
    }
}

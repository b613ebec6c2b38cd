//! Integration tests for the uf2boot control plane and HF2 channel.

use heapless::Deque;
use uf2boot::cdc::CdcAcm;
use uf2boot::config::{FLASH_PAGE_SIZE, WEBUSB_VENDOR_CODE, WINUSB_VENDOR_CODE};
use uf2boot::descriptor::webusb::platform_capability;
use uf2boot::descriptor::winusb::{compatible_id, EXTENDED_PROPERTIES};
use uf2boot::descriptor::{BosDescriptor, Usb21Standard, WebUsb, WinUsb};
use uf2boot::flash::TargetFlash;
use uf2boot::hf2::{command_id, Hf2Config, Hf2Engine, CMDPKT_BODY, CMDPKT_LAST, PACKET_SIZE};
use uf2boot::msc::{MassStorage, MscConfig, RamDisk};
use uf2boot::{ControlRequest, DispatchResult, Error, SetupPacket, UsbControl};

const VENDOR_IF: u8 = 0;
const COMM_IF: u8 = 1;
const DATA_IF: u8 = 2;
const MSC_IF: u8 = 4;

fn setup(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> SetupPacket {
    SetupPacket {
        request_type,
        request,
        value,
        index,
        length,
    }
}

#[test]
fn composite_control_plane_routes_every_function() {
    let capability = platform_capability(WEBUSB_VENDOR_CODE, true);
    let caps: [&[u8]; 1] = [&capability];
    let bos = BosDescriptor::new(&caps);
    let usb21 = Usb21Standard::new(Some(&bos));
    let webusb = WebUsb::new(WEBUSB_VENDOR_CODE, "example.org");
    let winusb = WinUsb::new(WINUSB_VENDOR_CODE, VENDOR_IF);
    let cdc = CdcAcm::new(COMM_IF, DATA_IF);
    let msc = MassStorage::new(MSC_IF, MscConfig::new(), RamDisk::<4>::new());
    let hf2 = Hf2Engine::new(Hf2Config::new());

    let mut usb = UsbControl::new();
    usb21.attach(&mut usb).expect("usb21");
    webusb.attach(&mut usb).expect("webusb");
    winusb.attach(&mut usb).expect("winusb");
    cdc.attach(&mut usb).expect("cdc");
    msc.attach(&mut usb).expect("msc");
    usb.register_config(&hf2).expect("hf2");
    usb.set_configuration(1);

    // BOS
    let mut buf = [0u8; 256];
    let mut req = ControlRequest::new(setup(0x80, 0x06, 0x0F00, 0, 255), &mut buf);
    assert_eq!(usb.dispatch(&mut req), DispatchResult::Handled);
    assert_eq!(req.len(), 29);
    assert_eq!(&req.data()[5..], &capability);

    // WebUSB GET_URL
    let mut buf = [0u8; 256];
    let mut req = ControlRequest::new(setup(0xC0, WEBUSB_VENDOR_CODE, 1, 2, 255), &mut buf);
    assert_eq!(usb.dispatch(&mut req), DispatchResult::Handled);
    assert_eq!(req.data()[0], 14);
    assert_eq!(&req.data()[3..], b"example.org");

    // WinUSB compatible ID and extended properties
    let mut buf = [0u8; 256];
    let mut req = ControlRequest::new(setup(0xC0, WINUSB_VENDOR_CODE, 0, 4, 255), &mut buf);
    assert_eq!(usb.dispatch(&mut req), DispatchResult::Handled);
    assert_eq!(req.data(), &compatible_id(VENDOR_IF));

    let mut buf = [0u8; 256];
    let mut req = ControlRequest::new(
        setup(0xC1, WINUSB_VENDOR_CODE, u16::from(VENDOR_IF), 5, 255),
        &mut buf,
    );
    assert_eq!(usb.dispatch(&mut req), DispatchResult::Handled);
    assert_eq!(req.data(), &EXTENDED_PROPERTIES[..]);

    // Microsoft OS string descriptor
    let mut buf = [0u8; 256];
    let mut req = ControlRequest::new(setup(0x80, 0x06, 0x03EE, 0, 255), &mut buf);
    assert_eq!(usb.dispatch(&mut req), DispatchResult::Handled);
    assert_eq!(req.data(), winusb.os_string());

    // CDC class requests are scoped to its interfaces.
    let line = [0x00, 0xC2, 0x01, 0x00, 0, 0, 8];
    let mut req = ControlRequest::with_data(setup(0x21, 0x20, 0, u16::from(DATA_IF), 7), &line);
    assert_eq!(usb.dispatch(&mut req), DispatchResult::Handled);

    // Mass storage GET_MAX_LUN falls past CDC to the MSC handler.
    let mut buf = [0xFFu8; 256];
    let mut req = ControlRequest::new(setup(0xA1, 0xFE, 0, u16::from(MSC_IF), 1), &mut buf);
    assert_eq!(usb.dispatch(&mut req), DispatchResult::Handled);
    assert_eq!(req.data(), &[0]);

    // Nobody owns interface 7: the driver gets the request back.
    let mut buf = [0u8; 256];
    let mut req = ControlRequest::new(setup(0xA1, 0xFE, 0, 7, 1), &mut buf);
    assert_eq!(usb.dispatch(&mut req), DispatchResult::NextHandler);
}

#[test]
fn repeated_configuration_does_not_grow_the_table() {
    let webusb = WebUsb::new(WEBUSB_VENDOR_CODE, "example.org");
    let winusb = WinUsb::new(WINUSB_VENDOR_CODE, VENDOR_IF);
    let cdc = CdcAcm::new(COMM_IF, DATA_IF);

    let mut usb = UsbControl::new();
    webusb.attach(&mut usb).expect("webusb");
    winusb.attach(&mut usb).expect("winusb");
    cdc.attach(&mut usb).expect("cdc");

    usb.set_configuration(1);
    let after_first = usb.requests().len();
    for _ in 0..5 {
        usb.set_configuration(1);
    }
    assert_eq!(usb.requests().len(), after_first);
    assert_eq!(after_first, 4);
}

#[test]
fn registry_capacity_is_reported_not_fatal() {
    let cdcs: Vec<CdcAcm> = (0..12).map(|i| CdcAcm::new(i * 2, i * 2 + 1)).collect();
    let mut usb = UsbControl::new();
    let mut errors = 0;
    for cdc in &cdcs {
        if usb.register_control(0x7F, 0x21, cdc) == Err(Error::RegistryFull) {
            errors += 1;
        }
    }
    assert_eq!(errors, 2);

    // Earlier handlers keep working.
    let mut req = ControlRequest::with_data(setup(0x21, 0x22, 0, 1, 0), &[]);
    assert_eq!(usb.dispatch(&mut req), DispatchResult::Handled);
}

struct SimFlash {
    mem: Vec<u8>,
    writes: usize,
}

impl TargetFlash for SimFlash {
    fn write_page(&mut self, addr: u32, data: &[u8; FLASH_PAGE_SIZE]) -> Result<(), Error> {
        let at = addr as usize;
        self.mem[at..at + FLASH_PAGE_SIZE].copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error> {
        let at = addr as usize;
        buf.copy_from_slice(&self.mem[at..at + buf.len()]);
        Ok(())
    }
}

fn send(
    engine: &Hf2Engine,
    id: u32,
    tag: u16,
    payload: &[u8],
    flash: &mut SimFlash,
    queue: &mut Deque<[u8; PACKET_SIZE], 1>,
) -> Vec<u8> {
    let mut msg = Vec::from(id.to_le_bytes());
    msg.extend_from_slice(&tag.to_le_bytes());
    msg.extend_from_slice(&[0, 0]);
    msg.extend_from_slice(payload);

    let chunks: Vec<&[u8]> = msg.chunks(PACKET_SIZE - 1).collect();
    for (i, chunk) in chunks.iter().enumerate() {
        let flag = if i + 1 == chunks.len() { CMDPKT_LAST } else { CMDPKT_BODY };
        let mut packet = [0u8; PACKET_SIZE];
        packet[0] = flag | chunk.len() as u8;
        packet[1..1 + chunk.len()].copy_from_slice(chunk);
        engine.on_packet(&packet, flash, queue).expect("packet accepted");
    }

    // One report in flight at a time, as on the IN endpoint.
    let mut response = Vec::new();
    while let Some(packet) = queue.pop_front() {
        let size = usize::from(packet[0] & 0x3F);
        response.extend_from_slice(&packet[1..1 + size]);
        engine.on_transmit_complete(queue).expect("room for next report");
    }
    assert_eq!(engine.pending(), 0);
    response
}

#[test]
fn hf2_flash_then_read_back() {
    let config = Hf2Config {
        flash_size: 0x2_0000,
        user_flash_start: 0x1_0000,
        user_flash_end: 0x2_0000,
        ..Hf2Config::new()
    };
    let engine = Hf2Engine::new(config);
    let mut flash = SimFlash {
        mem: vec![0xFF; 0x2_0000],
        writes: 0,
    };
    let mut queue = Deque::new();

    let start = send(&engine, command_id::START_FLASH, 1, &[], &mut flash, &mut queue);
    assert_eq!(start, [1, 0, 0, 0]);

    let mut payload = Vec::from(0x1_0000u32.to_le_bytes());
    payload.extend((0..FLASH_PAGE_SIZE).map(|i| (i % 251) as u8));
    let ack = send(&engine, command_id::WRITE_FLASH_PAGE, 2, &payload, &mut flash, &mut queue);
    assert_eq!(ack, [2, 0, 0, 0]);
    assert_eq!(flash.writes, 1);

    let mut read = Vec::from(0x1_0000u32.to_le_bytes());
    read.extend_from_slice(&64u32.to_le_bytes());
    let words = send(&engine, command_id::READ_WORDS, 3, &read, &mut flash, &mut queue);
    assert_eq!(&words[..4], &[3, 0, 0, 0]);
    assert_eq!(&words[4..], &payload[4..]);
}

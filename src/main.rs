//! uf2boot - composite USB bootloader for the nRF52840.
//!
//! Presents WinUSB/WebUSB, CDC-ACM and HF2 raw HID behind one control
//! endpoint and programs the user flash region over HF2.
//!
//! Build and flash: `cargo run --release --features embedded`

#![no_std]
#![no_main]

mod board;
mod usb;

use defmt::info;
use embassy_executor::Spawner;
use embassy_nrf::config::{Config, HfclkSource};
use uf2boot::cdc::CdcAcm;
use {defmt_rtt as _, panic_probe as _};

#[embassy_executor::task]
async fn usb_task(device: embassy_usb::UsbDevice<'static, usb::device::UsbDriver>) -> ! {
    usb::device::run_usb_device(device).await
}

#[embassy_executor::task]
async fn hf2_task(hid: usb::device::Hf2Hid, flash: board::NvmcFlash) -> ! {
    usb::device::hf2_task(hid, flash).await
}

#[embassy_executor::task]
async fn cdc_task(rx: usb::device::CdcOut, cdc: &'static CdcAcm) -> ! {
    usb::device::cdc_task(rx, cdc).await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // The USB peripheral needs the crystal oscillator.
    let mut config = Config::default();
    config.hfclk_source = HfclkSource::ExternalXtal;
    let p = embassy_nrf::init(config);

    info!(
        "uf2boot {} on {} ({})",
        uf2boot::config::UF2_VERSION,
        uf2boot::config::PRODUCT_NAME,
        uf2boot::config::BOARD_ID
    );

    let flash = board::NvmcFlash::new(p.NVMC);
    let parts = usb::device::init(p.USBD, board::serial_number());

    spawner.must_spawn(usb_task(parts.device));
    spawner.must_spawn(hf2_task(parts.hf2, flash));
    spawner.must_spawn(cdc_task(parts.cdc_rx, parts.cdc));

    info!("bootloader ready");
}

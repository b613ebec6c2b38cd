//! nRF52840 glue: NVMC-backed flash, device serial number and resets.

use core::fmt::Write as _;

use defmt::{debug, info, warn};
use embassy_nrf::nvmc::Nvmc;
use embassy_nrf::peripherals;
use embassy_time::Timer;
use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
use heapless::String;
use static_cell::StaticCell;
use uf2boot::config::{FLASH_PAGE_SIZE, FLASH_SECTOR_SIZE, FLASH_SIZE, USB_SERIAL_NUM_LENGTH};
use uf2boot::error::Error;
use uf2boot::flash::{EraseMap, TargetFlash};
use uf2boot::hf2::Hf2Action;

/// FICR DEVICEID[0..2], the factory-programmed 64-bit unique id.
const FICR_DEVICEID: *const u32 = 0x1000_0060 as *const u32;

/// POWER.GPREGRET, retained across soft resets.
const POWER_GPREGRET: *mut u32 = 0x4000_051C as *mut u32;

/// GPREGRET value asking the next boot to stay in the bootloader.
const GPREGRET_ENTER_BOOTLOADER: u32 = 0x57;

/// Time for the last response report to reach the host before resetting.
const RESET_DELAY_MS: u64 = 50;

static SERIAL_NUMBER: StaticCell<String<USB_SERIAL_NUM_LENGTH>> = StaticCell::new();

/// Erase sectors covering the whole flash.
const SECTOR_COUNT: usize = (FLASH_SIZE / FLASH_SECTOR_SIZE) as usize;

/// NVMC as the HF2 flash target.
///
/// The first page write into a sector erases that sector, whatever the
/// offset of the page inside it.
pub struct NvmcFlash {
    nvmc: Nvmc<'static>,
    erased: EraseMap<SECTOR_COUNT>,
}

impl NvmcFlash {
    pub fn new(nvmc: peripherals::NVMC) -> Self {
        Self {
            nvmc: Nvmc::new(nvmc),
            erased: EraseMap::new(FLASH_SECTOR_SIZE),
        }
    }
}

impl TargetFlash for NvmcFlash {
    fn write_page(&mut self, addr: u32, data: &[u8; FLASH_PAGE_SIZE]) -> Result<(), Error> {
        if let Some(sector) = self.erased.claim(addr)? {
            debug!("erasing sector {:x}", sector);
            if self.nvmc.erase(sector, sector + FLASH_SECTOR_SIZE).is_err() {
                self.erased.release(addr);
                return Err(Error::Flash);
            }
        }
        self.nvmc.write(addr, data).map_err(|_| Error::Flash)
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error> {
        self.nvmc.read(addr, buf).map_err(|_| Error::Flash)
    }
}

/// Hex rendering of the FICR device id, used as the USB serial number.
pub fn serial_number() -> &'static str {
    // SAFETY: FICR is read-only memory present on every nRF52840.
    let (lo, hi) = unsafe {
        (
            core::ptr::read_volatile(FICR_DEVICEID),
            core::ptr::read_volatile(FICR_DEVICEID.add(1)),
        )
    };
    let serial = SERIAL_NUMBER.init(String::new());
    if write!(serial, "{:08X}{:08X}", hi, lo).is_err() {
        warn!("serial number truncated");
    }
    serial.as_str()
}

/// Perform an HF2 reset once the response had time to leave.
pub async fn reset(action: Hf2Action) -> ! {
    info!("resetting: {}", action);
    Timer::after_millis(RESET_DELAY_MS).await;
    if action == Hf2Action::ResetIntoBootloader {
        // SAFETY: GPREGRET is a plain retained register, no other user.
        unsafe { core::ptr::write_volatile(POWER_GPREGRET, GPREGRET_ENTER_BOOTLOADER) };
    }
    cortex_m::peripheral::SCB::sys_reset()
}

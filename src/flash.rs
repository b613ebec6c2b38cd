//! Flash programming boundary.
//!
//! The HF2 engine never touches the flash controller directly; the binary
//! supplies a [`TargetFlash`] backed by the NVMC, tests supply a RAM model.

use crate::config::FLASH_PAGE_SIZE;
use crate::error::Error;

pub trait TargetFlash {
    /// Program one page at `addr`.
    ///
    /// Bounded blocking call: the caller holds a critical section for its
    /// whole duration, so no other interrupt work is guaranteed to run
    /// until it returns. Only called for addresses inside the user window.
    fn write_page(&mut self, addr: u32, data: &[u8; FLASH_PAGE_SIZE]) -> Result<(), Error>;

    /// Copy `buf.len()` bytes starting at `addr`.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error>;
}

impl<T: TargetFlash + ?Sized> TargetFlash for &mut T {
    fn write_page(&mut self, addr: u32, data: &[u8; FLASH_PAGE_SIZE]) -> Result<(), Error> {
        (**self).write_page(addr, data)
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error> {
        (**self).read(addr, buf)
    }
}

/// Which erase sectors have been wiped since boot.
///
/// A sector is erased on the first page write that lands anywhere inside
/// it, so images may be programmed in any page order. An HF2 session ends
/// with a reset, which starts the map over.
pub struct EraseMap<const SECTORS: usize> {
    sector_size: u32,
    erased: [bool; SECTORS],
}

impl<const SECTORS: usize> EraseMap<SECTORS> {
    pub const fn new(sector_size: u32) -> Self {
        Self {
            sector_size,
            erased: [false; SECTORS],
        }
    }

    /// Mark the sector holding `addr` as erased.
    ///
    /// Returns the sector start when the caller must erase it first, or
    /// `None` when it was already wiped. Addresses past the last sector
    /// are a [`Error::Flash`].
    pub fn claim(&mut self, addr: u32) -> Result<Option<u32>, Error> {
        let sector = (addr / self.sector_size) as usize;
        let erased = self.erased.get_mut(sector).ok_or(Error::Flash)?;
        if *erased {
            return Ok(None);
        }
        *erased = true;
        Ok(Some(sector as u32 * self.sector_size))
    }

    /// Forget a sector whose erase failed.
    pub fn release(&mut self, addr: u32) {
        if let Some(erased) = self.erased.get_mut((addr / self.sector_size) as usize) {
            *erased = false;
        }
    }
}

//! Mass-storage hookup.
//!
//! Only the class control requests of the Bulk-Only transport live here:
//! GET_MAX_LUN and the Bulk-Only mass storage reset. The block device
//! behind the interface is reached through [`BlockDevice`].

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::config::{MSC_BLOCK_SIZE, UF2_NUM_BLOCKS};
use crate::control::request_type::{CLASS, INTERFACE, RECIPIENT, TYPE};
use crate::control::{
    AggregateDispatcher, ConfigHandler, ControlHandler, ControlRequest, DispatchResult, UsbControl,
};
use crate::error::Error;

const CALLBACK_MASK: u8 = TYPE | RECIPIENT;
const CALLBACK_TYPE: u8 = CLASS | INTERFACE;

pub const REQ_GET_MAX_LUN: u8 = 0xFE;
pub const REQ_BULK_ONLY_RESET: u8 = 0xFF;

/// Block storage behind the mass-storage interface.
pub trait BlockDevice {
    /// Number of addressable blocks.
    fn block_count(&self) -> u32;

    fn read_block(&mut self, lba: u32, buf: &mut [u8; MSC_BLOCK_SIZE]) -> Result<(), Error>;

    fn write_block(&mut self, lba: u32, data: &[u8; MSC_BLOCK_SIZE]) -> Result<(), Error>;
}

/// RAM-backed disk of `N` blocks.
pub struct RamDisk<const N: usize> {
    blocks: [[u8; MSC_BLOCK_SIZE]; N],
}

impl<const N: usize> RamDisk<N> {
    pub const fn new() -> Self {
        Self {
            blocks: [[0; MSC_BLOCK_SIZE]; N],
        }
    }

    fn block(&self, lba: u32) -> Result<&[u8; MSC_BLOCK_SIZE], Error> {
        usize::try_from(lba)
            .ok()
            .and_then(|i| self.blocks.get(i))
            .ok_or(Error::Storage)
    }
}

impl<const N: usize> Default for RamDisk<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> BlockDevice for RamDisk<N> {
    fn block_count(&self) -> u32 {
        N as u32
    }

    fn read_block(&mut self, lba: u32, buf: &mut [u8; MSC_BLOCK_SIZE]) -> Result<(), Error> {
        buf.copy_from_slice(self.block(lba)?);
        Ok(())
    }

    fn write_block(&mut self, lba: u32, data: &[u8; MSC_BLOCK_SIZE]) -> Result<(), Error> {
        let block = usize::try_from(lba)
            .ok()
            .and_then(|i| self.blocks.get_mut(i))
            .ok_or(Error::Storage)?;
        block.copy_from_slice(data);
        Ok(())
    }
}

/// Geometry advertised by the mass-storage function.
#[derive(Clone, Copy, Debug)]
pub struct MscConfig {
    /// Advertised disk size in blocks.
    pub num_blocks: u32,
}

impl MscConfig {
    pub const fn new() -> Self {
        Self {
            num_blocks: UF2_NUM_BLOCKS,
        }
    }
}

impl Default for MscConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One mass-storage interface with a single LUN.
pub struct MassStorage<D> {
    interface: u8,
    config: MscConfig,
    disk: Mutex<CriticalSectionRawMutex, RefCell<D>>,
}

impl<D: BlockDevice> MassStorage<D> {
    pub const fn new(interface: u8, config: MscConfig, disk: D) -> Self {
        Self {
            interface,
            config,
            disk: Mutex::new(RefCell::new(disk)),
        }
    }

    pub fn attach<'a>(&'a self, usb: &mut UsbControl<'a>) -> Result<(), Error>
    where
        D: 'a,
    {
        usb.register_config(self)
    }

    /// Blocks actually backed by the device.
    pub fn block_count(&self) -> u32 {
        let backed = self.disk.lock(|disk| disk.borrow().block_count());
        backed.min(self.config.num_blocks)
    }

    pub fn read_block(&self, lba: u32, buf: &mut [u8; MSC_BLOCK_SIZE]) -> Result<(), Error> {
        if lba >= self.block_count() {
            warn!("msc read past end, lba {}", lba);
            return Err(Error::Storage);
        }
        self.disk.lock(|disk| disk.borrow_mut().read_block(lba, buf))
    }

    pub fn write_block(&self, lba: u32, data: &[u8; MSC_BLOCK_SIZE]) -> Result<(), Error> {
        if lba >= self.block_count() {
            warn!("msc write past end, lba {}", lba);
            return Err(Error::Storage);
        }
        trace!("msc write lba {}", lba);
        self.disk.lock(|disk| disk.borrow_mut().write_block(lba, data))
    }
}

impl<D: BlockDevice> ControlHandler for MassStorage<D> {
    fn handle<'d>(&'d self, req: &mut ControlRequest<'d>) -> DispatchResult {
        if req.setup.index != u16::from(self.interface) {
            return DispatchResult::NextHandler;
        }
        match req.setup.request {
            REQ_GET_MAX_LUN => {
                let Some(lun) = req.buffer_mut().first_mut() else {
                    return DispatchResult::NotSupported;
                };
                *lun = 0;
                req.set_reply_len(1);
                DispatchResult::Handled
            }
            REQ_BULK_ONLY_RESET => {
                debug!("msc bulk-only reset");
                DispatchResult::Handled
            }
            request => {
                debug!("msc control not supported {}", request);
                DispatchResult::NotSupported
            }
        }
    }
}

impl<'a, D: BlockDevice + 'a> ConfigHandler<'a> for MassStorage<D> {
    fn set_config(&'a self, control: &mut AggregateDispatcher<'a>, _value: u16) {
        if control.register(CALLBACK_MASK, CALLBACK_TYPE, self).is_err() {
            error!("msc set_config failed");
        }
    }
}

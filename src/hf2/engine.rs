//! HF2 command interpreter.
//!
//! [`Hf2Engine`] owns the reassembly buffer and the transmitter. The USB
//! side feeds it every inbound report with [`Hf2Engine::on_packet`] and
//! calls [`Hf2Engine::on_transmit_complete`] whenever the IN endpoint can
//! take another report.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::blocking_mutex::Mutex;

use super::protocol::{Accumulator, BinInfo, Command, Frame, Request};
use super::transmit::{PacketSink, Transmitter};
use super::{Hf2Action, Hf2Config, Hf2Status, RESPONSE_HEADER_SIZE};
use crate::config::{FLASH_PAGE_SIZE, HF2_BUF_SIZE};
use crate::control::{AggregateDispatcher, ConfigHandler};
use crate::descriptor::copy_truncated;
use crate::error::Error;
use crate::flash::TargetFlash;

pub struct Hf2Engine {
    config: Hf2Config,
    rx: Mutex<CriticalSectionRawMutex, RefCell<Accumulator>>,
    tx: Transmitter,
    /// Held for the duration of a flash write.
    flash_lock: CriticalSectionRawMutex,
}

impl Hf2Engine {
    pub const fn new(config: Hf2Config) -> Self {
        Self {
            config,
            rx: Mutex::new(RefCell::new(Accumulator::new())),
            tx: Transmitter::new(),
            flash_lock: CriticalSectionRawMutex::new(),
        }
    }

    pub fn config(&self) -> &Hf2Config {
        &self.config
    }

    /// Handle one inbound report.
    ///
    /// Returns the deferred action of a completed RESET command; the caller
    /// performs it after the response has been transmitted.
    pub fn on_packet<F, S>(
        &self,
        packet: &[u8],
        flash: &mut F,
        sink: &mut S,
    ) -> Result<Option<Hf2Action>, Error>
    where
        F: TargetFlash + ?Sized,
        S: PacketSink + ?Sized,
    {
        match self.rx.lock(|rx| rx.borrow_mut().push(packet)) {
            Ok(Frame::Command) => {}
            Ok(Frame::Serial { len }) => {
                debug!("hf2 serial packet, {} bytes", len);
                return Ok(None);
            }
            Ok(Frame::Partial) => return Ok(None),
            Err(e) => {
                warn!("hf2 packet dropped: {}", e);
                return Err(e.into());
            }
        }

        let mut msg = [0u8; HF2_BUF_SIZE];
        let len = self.rx.lock(|rx| {
            let mut rx = rx.borrow_mut();
            let len = rx.len();
            msg[..len].copy_from_slice(rx.message());
            rx.reset();
            len
        });

        let request = Request::decode(&msg[..len]).map_err(|e| {
            warn!("hf2 command dropped: {}", e);
            Error::from(e)
        })?;
        self.execute(request, flash, sink)
    }

    /// Send the next pending response chunk, if any.
    ///
    /// Call once per report the IN endpoint has taken.
    pub fn on_transmit_complete<S: PacketSink + ?Sized>(&self, sink: &mut S) -> Result<bool, Error> {
        self.tx.poke(sink)
    }

    /// Bytes of the current response still to be sent.
    pub fn pending(&self) -> usize {
        self.tx.pending()
    }

    /// Drop any half-received command and unsent response.
    pub fn reset(&self) {
        self.rx.lock(|rx| rx.borrow_mut().reset());
        self.tx.reset();
    }

    fn execute<F, S>(
        &self,
        request: Request<'_>,
        flash: &mut F,
        sink: &mut S,
    ) -> Result<Option<Hf2Action>, Error>
    where
        F: TargetFlash + ?Sized,
        S: PacketSink + ?Sized,
    {
        let tag = request.tag;
        let mut action = None;

        match request.command {
            Command::Info => {
                debug!("hf2 INFO");
                let info = self.config.info.as_bytes();
                self.tx.respond(tag, |buf| Ok(copy_truncated(buf, info)));
            }
            Command::BinInfo => {
                debug!("hf2 BININFO");
                let info = BinInfo::from_config(&self.config);
                self.tx.respond(tag, |buf| Ok(info.encode(buf)));
            }
            Command::ResetIntoApp => {
                info!("hf2 reset into app");
                self.tx.respond(tag, |_| Ok(0));
                action = Some(Hf2Action::ResetIntoApp);
            }
            Command::ResetIntoBootloader => {
                info!("hf2 reset into bootloader");
                self.tx.respond(tag, |_| Ok(0));
                action = Some(Hf2Action::ResetIntoBootloader);
            }
            Command::StartFlash => {
                debug!("hf2 START_FLASH");
                self.tx.respond(tag, |_| Ok(0));
            }
            Command::WriteFlashPage { target_addr, data } => {
                return self.write_flash_page(tag, target_addr, data, flash, sink);
            }
            Command::ReadWords {
                target_addr,
                num_words,
            } => {
                trace!("hf2 READ_WORDS {:x} x{}", target_addr, num_words);
                let config = &self.config;
                self.tx.respond(tag, |buf| {
                    let len = usize::try_from(num_words)
                        .ok()
                        .and_then(|n| n.checked_mul(4))
                        .filter(|&len| len <= HF2_BUF_SIZE - RESPONSE_HEADER_SIZE)
                        .filter(|&len| config.is_readable(target_addr, len))
                        .ok_or(Hf2Status::ExecErr)?;
                    flash
                        .read(target_addr, &mut buf[..len])
                        .map_err(|_| Hf2Status::ExecErr)?;
                    Ok(len)
                });
            }
            Command::Malformed { command_id } => {
                warn!("hf2 command {} has bad payload size", command_id);
                self.tx.respond(tag, |_| Err(Hf2Status::ExecErr));
            }
            Command::Unknown(command_id) => {
                warn!("hf2 unknown command {:x}", command_id);
                self.tx.respond(tag, |_| Err(Hf2Status::InvalidCmd));
            }
        }

        self.tx.start(sink);
        Ok(action)
    }

    /// Acknowledge first, then program the page.
    fn write_flash_page<F, S>(
        &self,
        tag: u16,
        target_addr: u32,
        data: &[u8; FLASH_PAGE_SIZE],
        flash: &mut F,
        sink: &mut S,
    ) -> Result<Option<Hf2Action>, Error>
    where
        F: TargetFlash + ?Sized,
        S: PacketSink + ?Sized,
    {
        if !self.config.is_writable(target_addr, FLASH_PAGE_SIZE) {
            warn!("hf2 write outside user flash: {:x}", target_addr);
            self.tx.respond(tag, |_| Err(Hf2Status::ExecErr));
            self.tx.start(sink);
            return Ok(None);
        }

        trace!("hf2 WRITE_FLASH_PAGE {:x}", target_addr);
        self.tx.respond(tag, |_| Ok(0));
        self.tx.start(sink);

        self.flash_lock
            .lock(|| flash.write_page(target_addr, data))
            .map_err(|e| {
                error!("flash write at {:x} failed", target_addr);
                e
            })?;
        Ok(None)
    }
}

impl<'a> ConfigHandler<'a> for Hf2Engine {
    fn set_config(&'a self, _control: &mut AggregateDispatcher<'a>, value: u16) {
        debug!("hf2 reset for configuration {}", value);
        self.reset();
    }
}

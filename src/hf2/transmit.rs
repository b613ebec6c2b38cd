//! Chunked response transmitter.
//!
//! A response is built once into the transmit buffer, then sent one report
//! at a time: synchronously right after it is built, and again from every
//! transmit-complete event until nothing remains. The `{position,
//! remaining, flag}` triple is only ever touched under a critical-section
//! mutex so the two contexts never see it half updated.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Deque;

use super::{Hf2Status, CMDPKT_BODY, CMDPKT_LAST, MAX_CHUNK, PACKET_SIZE, RESPONSE_HEADER_SIZE};
use crate::config::HF2_BUF_SIZE;
use crate::error::Error;

/// Outbound report queue (the HID IN endpoint).
pub trait PacketSink {
    /// Queue one report, or fail with [`Error::BufferOverflow`] when full.
    fn send(&mut self, packet: &[u8; PACKET_SIZE]) -> Result<(), Error>;
}

impl<const N: usize> PacketSink for Deque<[u8; PACKET_SIZE], N> {
    fn send(&mut self, packet: &[u8; PACKET_SIZE]) -> Result<(), Error> {
        self.push_back(*packet).map_err(|_| Error::BufferOverflow)
    }
}

struct TxState {
    buf: [u8; HF2_BUF_SIZE],
    pos: usize,
    remaining: usize,
    flag: u8,
}

impl TxState {
    const fn new() -> Self {
        Self {
            buf: [0; HF2_BUF_SIZE],
            pos: 0,
            remaining: 0,
            flag: CMDPKT_LAST,
        }
    }

    /// Next report, without consuming it.
    fn next_packet(&self) -> Option<(usize, [u8; PACKET_SIZE])> {
        if self.remaining == 0 {
            return None;
        }
        let chunk = self.remaining.min(MAX_CHUNK);
        // Only the final chunk may carry LAST.
        let flag = if self.remaining > MAX_CHUNK && self.flag == CMDPKT_LAST {
            CMDPKT_BODY
        } else {
            self.flag
        };

        let mut packet = [0u8; PACKET_SIZE];
        packet[0] = flag | chunk as u8;
        packet[1..1 + chunk].copy_from_slice(&self.buf[self.pos..self.pos + chunk]);
        Some((chunk, packet))
    }
}

pub struct Transmitter {
    state: Mutex<CriticalSectionRawMutex, RefCell<TxState>>,
}

impl Transmitter {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(TxState::new())),
        }
    }

    /// Build a response for `tag`.
    ///
    /// `build` fills the payload area and returns its length, or the
    /// failure status (the response then has no payload). The header is
    /// written afterwards and the transfer armed in one step.
    pub fn respond<B>(&self, tag: u16, build: B) -> Hf2Status
    where
        B: FnOnce(&mut [u8]) -> Result<usize, Hf2Status>,
    {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.remaining != 0 {
                warn!("hf2 response dropped, {} bytes unsent", state.remaining);
            }

            let capacity = state.buf.len() - RESPONSE_HEADER_SIZE;
            let (status, len) = match build(&mut state.buf[RESPONSE_HEADER_SIZE..]) {
                Ok(len) => (Hf2Status::Ok, len.min(capacity)),
                Err(status) => (status, 0),
            };

            let tag = tag.to_le_bytes();
            state.buf[..RESPONSE_HEADER_SIZE].copy_from_slice(&[tag[0], tag[1], status as u8, 0]);
            state.pos = 0;
            state.remaining = RESPONSE_HEADER_SIZE + len;
            state.flag = CMDPKT_LAST;
            status
        })
    }

    /// Send the next chunk, if any. Returns whether a report was queued.
    ///
    /// When the sink is full the state is left untouched so the same chunk
    /// goes out on the next call.
    pub fn poke<S: PacketSink + ?Sized>(&self, sink: &mut S) -> Result<bool, Error> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            let Some((chunk, packet)) = state.next_packet() else {
                return Ok(false);
            };
            sink.send(&packet)?;
            state.pos += chunk;
            state.remaining -= chunk;
            Ok(true)
        })
    }

    /// Queue the first chunk of a freshly built response.
    ///
    /// A full sink is not an error here: the response stays armed and goes
    /// out from the next transmit-complete event.
    pub fn start<S: PacketSink + ?Sized>(&self, sink: &mut S) {
        if let Err(e) = self.poke(sink) {
            debug!("hf2 response pending, {}: {} bytes", e, self.pending());
        }
    }

    /// Bytes of the current response not yet queued.
    pub fn pending(&self) -> usize {
        self.state.lock(|state| state.borrow().remaining)
    }

    /// Abandon the current response.
    pub fn reset(&self) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.pos = 0;
            state.remaining = 0;
        });
    }
}

impl Default for Transmitter {
    fn default() -> Self {
        Self::new()
    }
}

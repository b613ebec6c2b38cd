//! Aggregate control-request table.
//!
//! A fixed-capacity, append-only list of `(mask, value, handler)` entries.
//! [`AggregateDispatcher::dispatch`] walks it in insertion order and stops
//! at the first handler that answers `Handled` or `NotSupported`.

use heapless::Vec;

use super::{ControlHandler, ControlRequest, DispatchResult};
use crate::config::CONTROL_CALLBACK_CAPACITY;
use crate::error::Error;

/// One registered control handler.
#[derive(Clone, Copy)]
pub struct CallbackEntry<'a> {
    pub mask: u8,
    pub value: u8,
    pub handler: &'a dyn ControlHandler,
}

impl<'a> CallbackEntry<'a> {
    /// Does this entry's filter accept `request_type`?
    pub fn matches(&self, request_type: u8) -> bool {
        request_type & self.mask == self.value
    }

    /// Same filter and same handler instance.
    ///
    /// Handlers are identified by address, so two zero-sized handlers
    /// compare equal.
    fn same_as(&self, mask: u8, value: u8, handler: &dyn ControlHandler) -> bool {
        self.mask == mask && self.value == value && same_object(self.handler, handler)
    }
}

fn same_object(a: &dyn ControlHandler, b: &dyn ControlHandler) -> bool {
    core::ptr::eq(
        a as *const dyn ControlHandler as *const u8,
        b as *const dyn ControlHandler as *const u8,
    )
}

/// Fan-out of one control endpoint to many handlers.
pub struct AggregateDispatcher<'a> {
    entries: Vec<CallbackEntry<'a>, CONTROL_CALLBACK_CAPACITY>,
}

impl<'a> AggregateDispatcher<'a> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add `handler` for requests where `(bmRequestType & mask) == value`.
    ///
    /// Registering an identical `(mask, value, handler)` triple again is a
    /// no-op, so configuration callbacks may re-register on every
    /// SET_CONFIGURATION.
    pub fn register(
        &mut self,
        mask: u8,
        value: u8,
        handler: &'a dyn ControlHandler,
    ) -> Result<(), Error> {
        if self
            .entries
            .iter()
            .any(|entry| entry.same_as(mask, value, handler))
        {
            return Ok(());
        }

        self.entries
            .push(CallbackEntry {
                mask,
                value,
                handler,
            })
            .map_err(|_| {
                warn!(
                    "control callback table full, mask {:x} value {:x} dropped",
                    mask, value
                );
                Error::RegistryFull
            })
    }

    /// Offer `req` to each matching handler in registration order.
    ///
    /// Returns the first terminal answer, or `NextHandler` if nobody
    /// claimed the request (the driver then applies its own standard
    /// request handling).
    pub fn dispatch<'d>(&'d self, req: &mut ControlRequest<'d>) -> DispatchResult {
        trace!("control {}", req.setup);
        for entry in self.entries.iter() {
            if !entry.matches(req.setup.request_type) {
                continue;
            }
            match entry.handler.handle(req) {
                DispatchResult::NextHandler => continue,
                result => return result,
            }
        }
        DispatchResult::NextHandler
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AggregateDispatcher<'_> {
    fn default() -> Self {
        Self::new()
    }
}

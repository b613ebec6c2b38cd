//! Aggregate SET_CONFIGURATION callbacks.
//!
//! The driver only reports a configuration change to one callback. Every
//! USB function needs it (endpoint setup and handler re-registration must
//! be redone each time the host selects a configuration), so callbacks are
//! collected here and all invoked in registration order.

use heapless::Vec;

use super::AggregateDispatcher;
use crate::config::CONFIG_CALLBACK_CAPACITY;
use crate::error::Error;

/// Notified each time the host (re)selects a configuration.
pub trait ConfigHandler<'a> {
    /// `control` is the live request table; re-registering into it is
    /// duplicate-safe.
    fn set_config(&'a self, control: &mut AggregateDispatcher<'a>, value: u16);
}

pub struct ConfigCallbacks<'a> {
    callbacks: Vec<&'a dyn ConfigHandler<'a>, CONFIG_CALLBACK_CAPACITY>,
}

impl<'a> ConfigCallbacks<'a> {
    pub const fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    pub fn register(&mut self, callback: &'a dyn ConfigHandler<'a>) -> Result<(), Error> {
        let ptr = callback as *const dyn ConfigHandler<'a> as *const u8;
        if self
            .callbacks
            .iter()
            .any(|cb| core::ptr::eq(*cb as *const dyn ConfigHandler<'a> as *const u8, ptr))
        {
            return Ok(());
        }
        self.callbacks.push(callback).map_err(|_| {
            warn!("config callback table full");
            Error::RegistryFull
        })
    }

    /// Invoke every callback, unconditionally and in order.
    pub fn notify(&self, control: &mut AggregateDispatcher<'a>, value: u16) {
        debug!("set configuration {}", value);
        for callback in self.callbacks.iter() {
            callback.set_config(control, value);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl Default for ConfigCallbacks<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::request_type::*;
    use crate::control::{ControlHandler, ControlRequest, DispatchResult, UsbControl};
    use core::cell::Cell;

    struct Function {
        configured: Cell<u32>,
        last_value: Cell<u16>,
    }

    impl Function {
        fn new() -> Self {
            Self {
                configured: Cell::new(0),
                last_value: Cell::new(0),
            }
        }
    }

    impl ControlHandler for Function {
        fn handle<'d>(&'d self, _req: &mut ControlRequest<'d>) -> DispatchResult {
            DispatchResult::Handled
        }
    }

    impl<'a> ConfigHandler<'a> for Function {
        fn set_config(&'a self, control: &mut AggregateDispatcher<'a>, value: u16) {
            self.configured.set(self.configured.get() + 1);
            self.last_value.set(value);
            control.register(TYPE | RECIPIENT, CLASS | INTERFACE, self).unwrap();
        }
    }

    #[test]
    fn every_callback_runs_on_each_configuration() {
        let a = Function::new();
        let b = Function::new();
        let mut usb = UsbControl::new();
        usb.register_config(&a).unwrap();
        usb.register_config(&b).unwrap();

        usb.set_configuration(1);
        usb.set_configuration(1);

        assert_eq!(a.configured.get(), 2);
        assert_eq!(b.configured.get(), 2);
        assert_eq!(b.last_value.get(), 1);
    }

    #[test]
    fn re_registration_from_callbacks_is_idempotent() {
        let a = Function::new();
        let mut usb = UsbControl::new();
        usb.register_config(&a).unwrap();

        usb.set_configuration(1);
        usb.set_configuration(0);
        usb.set_configuration(1);

        assert_eq!(usb.requests().len(), 1);
    }

    #[test]
    fn duplicate_config_callback_is_ignored() {
        let a = Function::new();
        let mut callbacks = ConfigCallbacks::new();
        callbacks.register(&a).unwrap();
        callbacks.register(&a).unwrap();
        assert_eq!(callbacks.len(), 1);
    }
}

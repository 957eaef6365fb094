//! Transports that carry command and data bytes to a peripheral.
//!
//! Device drivers are written against [`Protocol`] and never see which
//! transport moves the bytes: [`BitBang`] toggles GPIO lines directly,
//! [`HardwareSpi`] hands bulk bytes to a native SPI bus and keeps only the
//! DC and RST lines on GPIO.

use crate::error::Result;
use crate::gpio::{Delay, Gpio, LogicalPin, PinState};
use log::{debug, trace};
use std::time::Duration;

pub mod bitbang;
pub mod spi;

pub use bitbang::{BitBang, BitBangConfig, BitBangPins};
pub use spi::{HardwareSpi, HardwareSpiConfig, HardwareSpiPins, SpiBus, SpiConfig, SpiMode};

/// Transport contract shared by every command/data transport.
pub trait Protocol {
    /// Sends command bytes (DC Low, where wired).
    fn send_command(&mut self, commands: &[u8]) -> Result<()>;

    /// Sends payload bytes (DC High, where wired).
    fn send_data(&mut self, data: &[u8]) -> Result<()>;

    /// Releases every resource the transport holds. Never fails and may be
    /// called more than once.
    fn cleanup(&mut self);
}

impl<P: Protocol + ?Sized> Protocol for &mut P {
    fn send_command(&mut self, commands: &[u8]) -> Result<()> {
        (**self).send_command(commands)
    }
    fn send_data(&mut self, data: &[u8]) -> Result<()> {
        (**self).send_data(data)
    }
    fn cleanup(&mut self) {
        (**self).cleanup()
    }
}

impl<P: Protocol + ?Sized> Protocol for Box<P> {
    fn send_command(&mut self, commands: &[u8]) -> Result<()> {
        (**self).send_command(commands)
    }
    fn send_data(&mut self, data: &[u8]) -> Result<()> {
        (**self).send_data(data)
    }
    fn cleanup(&mut self) {
        (**self).cleanup()
    }
}

// --- Shared control-line helpers ---

/// Puts every pin in `pins` into output mode and returns the pins that were
/// unconfigured on entry. On failure only those are released again, so pins
/// the caller already held keep their claim.
pub(crate) fn claim_outputs<G: Gpio>(
    gpio: &mut G,
    pins: &[LogicalPin],
) -> Result<Vec<LogicalPin>> {
    let mut claimed = Vec::with_capacity(pins.len());
    for &pin in pins {
        let fresh = gpio.state(pin) == PinState::Unconfigured;
        if let Err(e) = gpio.set_output_mode(pin) {
            debug!("Claiming pin {} failed ({}), rolling back {:?}", pin, e, claimed);
            release_all(gpio, &claimed);
            return Err(e);
        }
        if fresh {
            claimed.push(pin);
        }
    }
    Ok(claimed)
}

pub(crate) fn release_all<G: Gpio>(gpio: &mut G, pins: &[LogicalPin]) {
    for &pin in pins {
        gpio.release(pin);
    }
}

/// Power-on reset: RST Low for `hold`, then High and wait `release`.
pub(crate) fn reset_device<G: Gpio, D: Delay>(
    gpio: &mut G,
    delay: &mut D,
    rst: LogicalPin,
    hold: Duration,
    release: Duration,
) -> Result<()> {
    debug!(
        "Resetting device on pin {} (hold {:?}, release {:?})",
        rst, hold, release
    );
    gpio.set_low(rst)?;
    delay.delay(hold);
    gpio.set_high(rst)?;
    delay.delay(release);
    Ok(())
}

/// Drives DC Low for commands, High for data. No-op when DC is not wired.
pub(crate) fn select_data_command<G: Gpio>(
    gpio: &mut G,
    dc: Option<LogicalPin>,
    data: bool,
) -> Result<()> {
    match dc {
        Some(pin) if data => gpio.set_high(pin),
        Some(pin) => gpio.set_low(pin),
        None => {
            let kind = if data { "data" } else { "command" };
            trace!("DC not wired, sending {} without selection", kind);
            Ok(())
        }
    }
}

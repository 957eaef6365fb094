//! Software SPI-style transport driven entirely by GPIO toggling.
//!
//! Framing is SPI mode 0, MSB first: SDA is set up while SCLK is Low and
//! the device samples it on SCLK's rising edge. Each call to the private
//! `send_bytes` is one burst under a single chip-select assertion.
//!
//! This is a lot slower than a hardware SPI controller, but works on any
//! set of output pins.

use super::{claim_outputs, release_all, reset_device, select_data_command, Protocol};
use crate::consts;
use crate::error::{zero_transfer_size, Error, Result};
use crate::gpio::{Delay, Gpio, GpioLevel, LogicalPin, StdDelay};
use log::{debug, trace};
use std::time::Duration;

/// Pin roles of a bit-bang session. Optional roles set to `None` are not wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitBangPins {
    /// Serial clock (SCLK).
    pub sclk: LogicalPin,
    /// Serial data out (SDA / MOSI).
    pub sda: LogicalPin,
    /// Chip enable (CE), active Low.
    pub ce: Option<LogicalPin>,
    /// Data/command select (DC): Low for commands, High for data.
    pub dc: Option<LogicalPin>,
    /// Device reset (RST), active Low.
    pub rst: Option<LogicalPin>,
}

impl BitBangPins {
    /// Clock and data only; every optional role unwired.
    pub fn new(sclk: LogicalPin, sda: LogicalPin) -> Self {
        Self {
            sclk,
            sda,
            ce: None,
            dc: None,
            rst: None,
        }
    }

    pub fn with_chip_select(mut self, ce: LogicalPin) -> Self {
        self.ce = Some(ce);
        self
    }

    pub fn with_data_command(mut self, dc: LogicalPin) -> Self {
        self.dc = Some(dc);
        self
    }

    pub fn with_reset(mut self, rst: LogicalPin) -> Self {
        self.rst = Some(rst);
        self
    }

    /// Wired pins in role order: SCLK, SDA, CE, DC, RST.
    pub fn wired(&self) -> Vec<LogicalPin> {
        [Some(self.sclk), Some(self.sda), self.ce, self.dc, self.rst]
            .into_iter()
            .flatten()
            .collect()
    }

    fn check_distinct(&self) -> Result<()> {
        let wired = self.wired();
        for (i, pin) in wired.iter().enumerate() {
            if wired[..i].contains(pin) {
                return Err(Error::ArgumentOutOfRange(format!(
                    "pin {} is assigned to more than one role",
                    pin
                )));
            }
        }
        Ok(())
    }
}

/// Transfer and reset timing of a bit-bang session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitBangConfig {
    /// Maximum bytes per chip-select burst in `send_data`.
    pub transfer_size: usize,
    /// How long RST is held Low.
    pub reset_hold: Duration,
    /// How long to wait after RST goes High before the device is usable.
    pub reset_release: Duration,
}

impl Default for BitBangConfig {
    fn default() -> Self {
        Self {
            transfer_size: consts::DEFAULT_TRANSFER_SIZE,
            reset_hold: Duration::ZERO,
            reset_release: Duration::ZERO,
        }
    }
}

impl BitBangConfig {
    pub fn with_reset(mut self, hold: Duration, release: Duration) -> Self {
        self.reset_hold = hold;
        self.reset_release = release;
        self
    }

    pub fn with_transfer_size(mut self, transfer_size: usize) -> Self {
        self.transfer_size = transfer_size;
        self
    }

    /// Reset timing most small SPI displays need: 100 ms hold, 150 ms release.
    pub fn display_reset() -> Self {
        Self::default().with_reset(consts::DISPLAY_RESET_HOLD, consts::DISPLAY_RESET_RELEASE)
    }
}

/// A bit-banged serial session.
///
/// Owns its role pins from construction until [`Protocol::cleanup`] or drop.
/// GPIO errors are returned unchanged; a burst that fails half-way is not
/// retried, since resynchronizing the device (usually by another reset) is up
/// to the caller.
#[derive(Debug)]
pub struct BitBang<G: Gpio, D: Delay = StdDelay> {
    gpio: G,
    delay: D,
    pins: BitBangPins,
    transfer_size: usize,
    active: bool,
}

impl<G: Gpio> BitBang<G> {
    /// Claims the role pins and, if RST is wired, resets the device.
    pub fn new(gpio: G, pins: BitBangPins, config: BitBangConfig) -> Result<Self> {
        Self::with_delay(gpio, StdDelay, pins, config)
    }
}

impl<G: Gpio, D: Delay> BitBang<G, D> {
    /// Like [`BitBang::new`] with a custom reset delay source.
    pub fn with_delay(
        mut gpio: G,
        mut delay: D,
        pins: BitBangPins,
        config: BitBangConfig,
    ) -> Result<Self> {
        if config.transfer_size == 0 {
            return Err(zero_transfer_size());
        }
        pins.check_distinct()?;

        let claimed = claim_outputs(&mut gpio, &pins.wired())?;
        if let Err(e) = Self::prepare(&mut gpio, &mut delay, &pins, &config) {
            release_all(&mut gpio, &claimed);
            return Err(e);
        }
        debug!(
            "Bit-bang session ready: {:?}, transfer size {}",
            pins, config.transfer_size
        );
        Ok(Self {
            gpio,
            delay,
            pins,
            transfer_size: config.transfer_size,
            active: true,
        })
    }

    fn prepare(
        gpio: &mut G,
        delay: &mut D,
        pins: &BitBangPins,
        config: &BitBangConfig,
    ) -> Result<()> {
        // Idle deselected
        if let Some(ce) = pins.ce {
            gpio.set_high(ce)?;
        }
        if let Some(rst) = pins.rst {
            reset_device(gpio, delay, rst, config.reset_hold, config.reset_release)?;
        }
        Ok(())
    }

    pub fn pins(&self) -> &BitBangPins {
        &self.pins
    }

    pub fn transfer_size(&self) -> usize {
        self.transfer_size
    }

    pub fn gpio(&self) -> &G {
        &self.gpio
    }

    /// Re-runs the reset sequence on RST, e.g. to resynchronize after a
    /// failed burst. Does nothing when RST is not wired.
    pub fn reset(&mut self, hold: Duration, release: Duration) -> Result<()> {
        match self.pins.rst {
            Some(rst) => reset_device(&mut self.gpio, &mut self.delay, rst, hold, release),
            None => Ok(()),
        }
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        trace!("Bit-bang burst of {} bytes", bytes.len());
        if let Some(ce) = self.pins.ce {
            self.gpio.set_low(ce)?;
        }
        for &byte in bytes {
            for bit in (0..8).rev() {
                let level = GpioLevel::from((byte >> bit) & 1 == 1);
                self.gpio.write(self.pins.sda, level)?;
                self.gpio.set_high(self.pins.sclk)?;
                self.gpio.set_low(self.pins.sclk)?;
            }
        }
        if let Some(ce) = self.pins.ce {
            self.gpio.set_high(ce)?;
        }
        Ok(())
    }
}

impl<G: Gpio, D: Delay> Protocol for BitBang<G, D> {
    fn send_command(&mut self, commands: &[u8]) -> Result<()> {
        select_data_command(&mut self.gpio, self.pins.dc, false)?;
        self.send_bytes(commands)
    }

    fn send_data(&mut self, data: &[u8]) -> Result<()> {
        select_data_command(&mut self.gpio, self.pins.dc, true)?;
        for chunk in data.chunks(self.transfer_size) {
            self.send_bytes(chunk)?;
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        if self.active {
            debug!("Releasing bit-bang pins {:?}", self.pins.wired());
        }
        release_all(&mut self.gpio, &self.pins.wired());
        self.active = false;
    }
}

impl<G: Gpio, D: Delay> Drop for BitBang<G, D> {
    fn drop(&mut self) {
        if self.active {
            debug!("Bit-bang session dropped, releasing pins");
            self.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimChip;
    use crate::PinState;

    fn pins() -> BitBangPins {
        BitBangPins::new(LogicalPin::new(11), LogicalPin::new(10))
            .with_chip_select(LogicalPin::new(8))
            .with_data_command(LogicalPin::new(25))
    }

    #[test]
    fn test_config_defaults() {
        let config = BitBangConfig::default();
        assert_eq!(config.transfer_size, 4096);
        assert_eq!(config.reset_hold, Duration::ZERO);
        assert_eq!(config.reset_release, Duration::ZERO);

        let display = BitBangConfig::display_reset();
        assert_eq!(display.reset_hold, Duration::from_millis(100));
        assert_eq!(display.reset_release, Duration::from_millis(150));
    }

    #[test]
    fn test_wired_pins_in_role_order() {
        let p = pins().with_reset(LogicalPin::new(24));
        let wired: Vec<u32> = p.wired().iter().map(|p| p.number()).collect();
        assert_eq!(wired, vec![11, 10, 8, 25, 24]);
        assert_eq!(
            BitBangPins::new(LogicalPin::new(1), LogicalPin::new(2))
                .wired()
                .len(),
            2
        );
    }

    #[test]
    fn test_rejects_zero_transfer_size() {
        let chip = SimChip::raspberry_pi();
        let result = BitBang::with_delay(
            chip.handle(),
            chip.delay(),
            pins(),
            BitBangConfig::default().with_transfer_size(0),
        );
        assert!(matches!(result, Err(Error::ArgumentOutOfRange(_))));
        assert_eq!(chip.state(LogicalPin::new(11)), PinState::Unconfigured);
    }

    #[test]
    fn test_rejects_shared_roles() {
        let chip = SimChip::raspberry_pi();
        let shared = pins().with_reset(LogicalPin::new(8));
        let result =
            BitBang::with_delay(chip.handle(), chip.delay(), shared, BitBangConfig::default());
        assert!(matches!(result, Err(Error::ArgumentOutOfRange(_))));
    }

    #[test]
    fn test_chip_select_idles_high() {
        let chip = SimChip::raspberry_pi();
        let _bb =
            BitBang::with_delay(chip.handle(), chip.delay(), pins(), BitBangConfig::default())
                .unwrap();
        assert_eq!(chip.level(LogicalPin::new(8)), GpioLevel::High);
        assert_eq!(chip.level(LogicalPin::new(11)), GpioLevel::Low);
    }

    #[test]
    fn test_drop_releases_pins() {
        let chip = SimChip::raspberry_pi();
        let mut gpio = chip.handle();
        {
            let _bb =
                BitBang::with_delay(&mut gpio, chip.delay(), pins(), BitBangConfig::default())
                    .unwrap();
            assert_eq!(chip.state(LogicalPin::new(25)), PinState::Output);
        }
        for pin in pins().wired() {
            assert_eq!(gpio.state(pin), PinState::Unconfigured);
        }
    }
}

//! Hardware SPI transport with GPIO-driven DC and RST lines.
//!
//! Bulk bytes go through a native bus driver implementing [`SpiBus`]; the
//! controller owns SCLK, MOSI and CE itself, so only the data/command select
//! and reset lines are claimed on the [`Gpio`] backend. The controller caps
//! the size of a single transfer, which is why `send_data` is chunked and an
//! oversized command burst is rejected.

use super::{claim_outputs, release_all, reset_device, select_data_command, Protocol};
use crate::consts;
use crate::error::{zero_transfer_size, Error, Result};
use crate::gpio::{Delay, Gpio, LogicalPin, StdDelay};
use crate::pinout::{PinScheme, PinTranslator, PinoutTable};
use log::{debug, trace};
use std::io;
use std::time::Duration;

/// Clock polarity and phase, `[CPOL|CPHA]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiMode {
    Mode0,
    Mode1,
    Mode2,
    Mode3,
}

impl SpiMode {
    /// Clock idles High.
    pub fn cpol(self) -> bool {
        matches!(self, SpiMode::Mode2 | SpiMode::Mode3)
    }

    /// Data sampled on the trailing clock edge.
    pub fn cpha(self) -> bool {
        matches!(self, SpiMode::Mode1 | SpiMode::Mode3)
    }
}

impl TryFrom<u8> for SpiMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SpiMode::Mode0),
            1 => Ok(SpiMode::Mode1),
            2 => Ok(SpiMode::Mode2),
            3 => Ok(SpiMode::Mode3),
            other => Err(Error::ArgumentOutOfRange(format!(
                "SPI mode {} out of range (0-3)",
                other
            ))),
        }
    }
}

/// Settings handed to the bus driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiConfig {
    /// SPI port, usually 0 or 1.
    pub bus: u8,
    /// Hardware chip-select line of the port, usually 0 or 1.
    pub chip_select: u8,
    pub mode: SpiMode,
    pub bits_per_word: u8,
    pub speed_hz: u32,
    /// Delay between writes, in microseconds.
    pub delay_us: u16,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            bus: consts::spi::DEFAULT_BUS,
            chip_select: consts::spi::DEFAULT_CHIP_SELECT,
            mode: SpiMode::Mode3,
            bits_per_word: consts::spi::DEFAULT_BITS_PER_WORD,
            speed_hz: consts::spi::DEFAULT_SPEED_HZ,
            delay_us: consts::spi::DEFAULT_DELAY_US,
        }
    }
}

impl SpiConfig {
    /// Checks the clock rate against the controller's supported rates.
    pub fn validate(&self) -> Result<()> {
        if !consts::spi::SUPPORTED_SPEEDS_HZ.contains(&self.speed_hz) {
            let valid = consts::spi::SUPPORTED_SPEEDS_HZ
                .iter()
                .map(|hz| hz.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::InvalidSpiSpeed {
                speed_hz: self.speed_hz,
                valid,
            });
        }
        if self.bits_per_word == 0 {
            return Err(Error::ArgumentOutOfRange(
                "SPI bits per word must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A native SPI bus driver.
pub trait SpiBus {
    /// Applies `config` before the first transfer.
    fn configure(&mut self, config: &SpiConfig) -> io::Result<()>;

    /// Writes one burst under a single hardware chip-select assertion.
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Closes the bus. Must tolerate repeated calls.
    fn close(&mut self) {}
}

impl<B: SpiBus + ?Sized> SpiBus for &mut B {
    fn configure(&mut self, config: &SpiConfig) -> io::Result<()> {
        (**self).configure(config)
    }
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }
    fn close(&mut self) {
        (**self).close()
    }
}

/// GPIO lines used alongside the hardware bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardwareSpiPins {
    pub dc: Option<LogicalPin>,
    pub rst: Option<LogicalPin>,
}

impl HardwareSpiPins {
    /// DC on BCM 24 and RST on BCM 25, the usual wiring of SPI display hats.
    pub fn bcm_default<T: PinoutTable>(translator: &mut PinTranslator<T>) -> Result<Self> {
        Ok(Self {
            dc: Some(translator.resolve(PinScheme::Bcm, consts::spi::DEFAULT_DC_PIN)?),
            rst: Some(translator.resolve(PinScheme::Bcm, consts::spi::DEFAULT_RST_PIN)?),
        })
    }

    fn wired(&self) -> Vec<LogicalPin> {
        [self.dc, self.rst].into_iter().flatten().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareSpiConfig {
    pub spi: SpiConfig,
    /// Hard ceiling on bytes per bus transfer.
    pub transfer_size: usize,
    pub reset_hold: Duration,
    pub reset_release: Duration,
}

impl Default for HardwareSpiConfig {
    fn default() -> Self {
        Self {
            spi: SpiConfig::default(),
            transfer_size: consts::DEFAULT_TRANSFER_SIZE,
            reset_hold: consts::spi::DEFAULT_RESET_HOLD,
            reset_release: consts::spi::DEFAULT_RESET_RELEASE,
        }
    }
}

/// Command/data transport over a hardware SPI bus.
#[derive(Debug)]
pub struct HardwareSpi<G: Gpio, B: SpiBus, D: Delay = StdDelay> {
    gpio: G,
    bus: B,
    delay: D,
    pins: HardwareSpiPins,
    transfer_size: usize,
    active: bool,
}

impl<G: Gpio, B: SpiBus> HardwareSpi<G, B> {
    pub fn new(gpio: G, bus: B, pins: HardwareSpiPins, config: HardwareSpiConfig) -> Result<Self> {
        Self::with_delay(gpio, bus, StdDelay, pins, config)
    }
}

impl<G: Gpio, B: SpiBus, D: Delay> HardwareSpi<G, B, D> {
    /// Validates the bus settings, claims DC/RST, resets the device and
    /// configures the bus, in that order. On failure the pins this call
    /// claimed are released; pins the handle already held keep their claim.
    pub fn with_delay(
        mut gpio: G,
        mut bus: B,
        mut delay: D,
        pins: HardwareSpiPins,
        config: HardwareSpiConfig,
    ) -> Result<Self> {
        config.spi.validate()?;
        if config.transfer_size == 0 {
            return Err(zero_transfer_size());
        }
        if pins.dc.is_some() && pins.dc == pins.rst {
            return Err(Error::ArgumentOutOfRange(
                "DC and RST must be different pins".to_string(),
            ));
        }

        let claimed = claim_outputs(&mut gpio, &pins.wired())?;
        let setup = match pins.rst {
            Some(rst) => reset_device(
                &mut gpio,
                &mut delay,
                rst,
                config.reset_hold,
                config.reset_release,
            ),
            None => Ok(()),
        }
        .and_then(|()| bus.configure(&config.spi).map_err(Error::from));
        if let Err(e) = setup {
            release_all(&mut gpio, &claimed);
            return Err(e);
        }
        debug!(
            "Hardware SPI ready: bus {}.{} {:?} @ {} Hz, {:?}",
            config.spi.bus, config.spi.chip_select, config.spi.mode, config.spi.speed_hz, pins
        );
        Ok(Self {
            gpio,
            bus,
            delay,
            pins,
            transfer_size: config.transfer_size,
            active: true,
        })
    }

    pub fn pins(&self) -> &HardwareSpiPins {
        &self.pins
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Re-runs the reset sequence on RST. Does nothing when RST is not wired.
    pub fn reset(&mut self, hold: Duration, release: Duration) -> Result<()> {
        match self.pins.rst {
            Some(rst) => reset_device(&mut self.gpio, &mut self.delay, rst, hold, release),
            None => Ok(()),
        }
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.transfer_size {
            return Err(Error::OperationTooLarge {
                max: self.transfer_size,
                actual: bytes.len(),
            });
        }
        trace!("SPI burst of {} bytes", bytes.len());
        self.bus.write(bytes)?;
        Ok(())
    }
}

impl<G: Gpio, B: SpiBus, D: Delay> Protocol for HardwareSpi<G, B, D> {
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
            debug!("Closing SPI bus and releasing {:?}", self.pins);
        }
        self.bus.close();
        release_all(&mut self.gpio, &self.pins.wired());
        self.active = false;
    }
}

impl<G: Gpio, B: SpiBus, D: Delay> Drop for HardwareSpi<G, B, D> {
    fn drop(&mut self) {
        if self.active {
            debug!("Hardware SPI dropped, closing bus");
            self.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimChip;
    use crate::PinState;

    #[derive(Debug, Default)]
    struct RecordingBus {
        configured: Option<SpiConfig>,
        bursts: Vec<Vec<u8>>,
        closed: usize,
        fail_configure: bool,
    }

    impl SpiBus for RecordingBus {
        fn configure(&mut self, config: &SpiConfig) -> io::Result<()> {
            if self.fail_configure {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such bus"));
            }
            self.configured = Some(config.clone());
            Ok(())
        }
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.bursts.push(bytes.to_vec());
            Ok(())
        }
        fn close(&mut self) {
            self.closed += 1;
        }
    }

    const DC: LogicalPin = LogicalPin::new(17);
    const RST: LogicalPin = LogicalPin::new(21);

    fn pins() -> HardwareSpiPins {
        HardwareSpiPins {
            dc: Some(DC),
            rst: Some(RST),
        }
    }

    #[test]
    fn test_spi_config_defaults_and_validation() {
        let config = SpiConfig::default();
        assert_eq!(config.mode, SpiMode::Mode3);
        assert_eq!(config.speed_hz, 8_000_000);
        assert!(config.validate().is_ok());

        let bad = SpiConfig {
            speed_hz: 3_000_000,
            ..SpiConfig::default()
        };
        match bad.validate() {
            Err(Error::InvalidSpiSpeed { speed_hz, valid }) => {
                assert_eq!(speed_hz, 3_000_000);
                assert!(valid.starts_with("500000, 1000000"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_spi_mode_bits() {
        assert!(!SpiMode::Mode0.cpol() && !SpiMode::Mode0.cpha());
        assert!(SpiMode::Mode3.cpol() && SpiMode::Mode3.cpha());
        assert_eq!(SpiMode::try_from(2).unwrap(), SpiMode::Mode2);
        assert!(SpiMode::try_from(4).is_err());
    }

    #[test]
    fn test_bcm_default_pins() {
        let mut translator = PinTranslator::default();
        let p = HardwareSpiPins::bcm_default(&mut translator).unwrap();
        // BCM 24 is physical 18, BCM 25 is physical 22
        assert_eq!(p.dc, Some(LogicalPin::new(17)));
        assert_eq!(p.rst, Some(LogicalPin::new(21)));
    }

    #[test]
    fn test_reset_then_configure() {
        let chip = SimChip::raspberry_pi();
        let mut bus = RecordingBus::default();
        let spi = HardwareSpi::with_delay(
            chip.handle(),
            &mut bus,
            chip.delay(),
            pins(),
            HardwareSpiConfig::default(),
        )
        .unwrap();
        assert_eq!(chip.now(), Duration::from_millis(1500));
        assert_eq!(chip.state(DC), PinState::Output);
        drop(spi);
        assert_eq!(bus.configured, Some(SpiConfig::default()));
        assert_eq!(bus.closed, 1);
        assert_eq!(chip.state(RST), PinState::Unconfigured);
    }

    #[test]
    fn test_configure_failure_releases_pins() {
        let chip = SimChip::raspberry_pi();
        let bus = RecordingBus {
            fail_configure: true,
            ..RecordingBus::default()
        };
        let result = HardwareSpi::with_delay(
            chip.handle(),
            bus,
            chip.delay(),
            pins(),
            HardwareSpiConfig::default(),
        );
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(chip.state(DC), PinState::Unconfigured);
        assert_eq!(chip.state(RST), PinState::Unconfigured);
    }

    #[test]
    fn test_configure_failure_keeps_pins_held_before() {
        let chip = SimChip::raspberry_pi();
        let mut gpio = chip.handle();
        gpio.set_output_mode(DC).unwrap();
        let bus = RecordingBus {
            fail_configure: true,
            ..RecordingBus::default()
        };
        let result = HardwareSpi::with_delay(
            &mut gpio,
            bus,
            chip.delay(),
            pins(),
            HardwareSpiConfig::default(),
        )
        .err();
        assert!(matches!(result, Some(Error::Io(_))));
        assert_eq!(gpio.state(DC), PinState::Output);
        assert_eq!(gpio.state(RST), PinState::Unconfigured);
    }

    #[test]
    fn test_data_chunked_and_commands_capped() {
        let chip = SimChip::raspberry_pi();
        let mut bus = RecordingBus::default();
        let config = HardwareSpiConfig {
            transfer_size: 4,
            reset_hold: Duration::ZERO,
            reset_release: Duration::ZERO,
            ..HardwareSpiConfig::default()
        };
        {
            let mut spi =
                HardwareSpi::with_delay(chip.handle(), &mut bus, chip.delay(), pins(), config)
                    .unwrap();
            spi.send_data(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]).unwrap();
            assert_eq!(chip.level(DC), crate::GpioLevel::High);
            assert!(matches!(
                spi.send_command(&[0; 5]),
                Err(Error::OperationTooLarge { max: 4, actual: 5 })
            ));
            spi.send_command(&[0xAF]).unwrap();
            assert_eq!(chip.level(DC), crate::GpioLevel::Low);
            spi.cleanup();
            spi.cleanup();
        }
        let sizes: Vec<usize> = bus.bursts.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 2, 1]);
        // Closed by both cleanups; drop does not close again
        assert_eq!(bus.closed, 2);
    }

    #[test]
    fn test_reset_without_rst_pin_is_noop() {
        let chip = SimChip::raspberry_pi();
        let pins = HardwareSpiPins {
            dc: Some(DC),
            rst: None,
        };
        let mut spi = HardwareSpi::with_delay(
            chip.handle(),
            RecordingBus::default(),
            chip.delay(),
            pins,
            HardwareSpiConfig::default(),
        )
        .unwrap();
        assert_eq!(chip.now(), Duration::ZERO);
        spi.reset(Duration::from_millis(5), Duration::from_millis(5))
            .unwrap();
        assert_eq!(chip.now(), Duration::ZERO);
        assert!(chip.writes_to(RST).is_empty());
        assert!(spi.bus().configured.is_some());
    }
}

//! Pin numbering schemes and translation to logical pin numbers.
//!
//! Every backend operates on [`LogicalPin`]s. Callers that think in header
//! positions, SoC line numbers, BCM or WiringPi numbers go through a
//! [`PinTranslator`], which resolves the raw number with an injected
//! [`PinoutTable`] and memoizes the result.

use crate::error::{Error, Result};
use crate::gpio::LogicalPin;
use log::trace;
use std::collections::HashMap;
use std::fmt;

/// Numbering convention a raw pin number is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PinScheme {
    /// Canonical zero-based logical numbers.
    Logical = 0,
    /// One-based position on the physical header.
    Physical = 1,
    /// SoC GPIO chip line number.
    ChipGpio = 2,
    /// Broadcom (BCM) GPIO number.
    Bcm = 3,
    /// WiringPi library number.
    WiringPi = 4,
}

impl TryFrom<u8> for PinScheme {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PinScheme::Logical),
            1 => Ok(PinScheme::Physical),
            2 => Ok(PinScheme::ChipGpio),
            3 => Ok(PinScheme::Bcm),
            4 => Ok(PinScheme::WiringPi),
            other => Err(Error::InvalidScheme(other)),
        }
    }
}

impl fmt::Display for PinScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PinScheme::Logical => "logical",
            PinScheme::Physical => "physical",
            PinScheme::ChipGpio => "chip GPIO",
            PinScheme::Bcm => "BCM",
            PinScheme::WiringPi => "WiringPi",
        };
        f.write_str(name)
    }
}

/// Platform pinout: maps the table-driven schemes to logical pins.
///
/// Implementations must be pure; [`PinTranslator`] caches every answer.
pub trait PinoutTable {
    /// Logical pin wired to SoC GPIO line `gpio`.
    fn from_chip_gpio(&self, gpio: u32) -> Option<LogicalPin>;
    /// Logical pin carrying BCM GPIO `bcm`.
    fn from_bcm(&self, bcm: u32) -> Option<LogicalPin>;
    /// Logical pin addressed as WiringPi `wpi`.
    fn from_wiring_pi(&self, wpi: u32) -> Option<LogicalPin>;
}

impl<T: PinoutTable + ?Sized> PinoutTable for &T {
    fn from_chip_gpio(&self, gpio: u32) -> Option<LogicalPin> {
        (**self).from_chip_gpio(gpio)
    }
    fn from_bcm(&self, bcm: u32) -> Option<LogicalPin> {
        (**self).from_bcm(bcm)
    }
    fn from_wiring_pi(&self, wpi: u32) -> Option<LogicalPin> {
        (**self).from_wiring_pi(wpi)
    }
}

#[derive(Debug, Clone, Copy)]
struct HeaderPin {
    physical: u8,
    bcm: u8,
    wiring_pi: u8,
}

const fn hp(physical: u8, bcm: u8, wiring_pi: u8) -> HeaderPin {
    HeaderPin {
        physical,
        bcm,
        wiring_pi,
    }
}

// GPIO-capable positions of the 40-pin header. Power and ground pins have no
// BCM or WiringPi number and are omitted.
const RPI_40PIN_HEADER: [HeaderPin; 28] = [
    hp(3, 2, 8),
    hp(5, 3, 9),
    hp(7, 4, 7),
    hp(8, 14, 15),
    hp(10, 15, 16),
    hp(11, 17, 0),
    hp(12, 18, 1),
    hp(13, 27, 2),
    hp(15, 22, 3),
    hp(16, 23, 4),
    hp(18, 24, 5),
    hp(19, 10, 12),
    hp(21, 9, 13),
    hp(22, 25, 6),
    hp(23, 11, 14),
    hp(24, 8, 10),
    hp(26, 7, 11),
    hp(27, 0, 30),
    hp(28, 1, 31),
    hp(29, 5, 21),
    hp(31, 6, 22),
    hp(32, 12, 26),
    hp(33, 13, 23),
    hp(35, 19, 24),
    hp(36, 16, 27),
    hp(37, 26, 25),
    hp(38, 20, 28),
    hp(40, 21, 29),
];

/// Pinout of the Raspberry Pi 40-pin header (models B+ onwards).
///
/// Logical numbers are zero-based header positions. On these boards the
/// `gpiochip0` line offset equals the BCM number.
#[derive(Debug, Clone, Copy, Default)]
pub struct RaspberryPiPinout;

impl RaspberryPiPinout {
    fn find(pred: impl Fn(&HeaderPin) -> bool) -> Option<LogicalPin> {
        RPI_40PIN_HEADER
            .iter()
            .find(|p| pred(p))
            .map(|p| LogicalPin::new(u32::from(p.physical) - 1))
    }
}

impl PinoutTable for RaspberryPiPinout {
    fn from_chip_gpio(&self, gpio: u32) -> Option<LogicalPin> {
        Self::find(|p| u32::from(p.bcm) == gpio)
    }
    fn from_bcm(&self, bcm: u32) -> Option<LogicalPin> {
        Self::find(|p| u32::from(p.bcm) == bcm)
    }
    fn from_wiring_pi(&self, wpi: u32) -> Option<LogicalPin> {
        Self::find(|p| u32::from(p.wiring_pi) == wpi)
    }
}

/// Resolves raw pin numbers to logical pins, caching table lookups.
///
/// The cache is owned by the translator and lives as long as it does; the
/// mapping is static so entries never need invalidating.
#[derive(Debug)]
pub struct PinTranslator<T: PinoutTable = RaspberryPiPinout> {
    table: T,
    cache: HashMap<(PinScheme, u32), LogicalPin>,
}

impl Default for PinTranslator<RaspberryPiPinout> {
    fn default() -> Self {
        Self::new(RaspberryPiPinout)
    }
}

impl<T: PinoutTable> PinTranslator<T> {
    /// Creates a translator backed by `table`.
    pub fn new(table: T) -> Self {
        Self {
            table,
            cache: HashMap::new(),
        }
    }

    /// Resolves `raw` expressed in `scheme` to a logical pin.
    pub fn resolve(&mut self, scheme: PinScheme, raw: u32) -> Result<LogicalPin> {
        match scheme {
            PinScheme::Logical => Ok(LogicalPin::new(raw)),
            PinScheme::Physical => {
                if raw == 0 {
                    return Err(Error::PinArgumentOutOfRange {
                        pin: raw,
                        message: "physical header pins are numbered from 1".to_string(),
                    });
                }
                Ok(LogicalPin::new(raw - 1))
            }
            PinScheme::ChipGpio | PinScheme::Bcm | PinScheme::WiringPi => {
                if let Some(&pin) = self.cache.get(&(scheme, raw)) {
                    return Ok(pin);
                }
                let found = match scheme {
                    PinScheme::ChipGpio => self.table.from_chip_gpio(raw),
                    PinScheme::Bcm => self.table.from_bcm(raw),
                    _ => self.table.from_wiring_pi(raw),
                };
                let pin = found.ok_or(Error::UnknownPin { scheme, pin: raw })?;
                trace!("Resolved {} pin {} to logical {}", scheme, raw, pin);
                self.cache.insert((scheme, raw), pin);
                Ok(pin)
            }
        }
    }

    /// Resolves a raw scheme discriminant, as received from configuration.
    pub fn resolve_raw(&mut self, scheme: u8, raw: u32) -> Result<LogicalPin> {
        let scheme = PinScheme::try_from(scheme)?;
        self.resolve(scheme, raw)
    }

    /// Number of memoized table lookups.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingTable {
        lookups: Cell<usize>,
    }

    impl PinoutTable for CountingTable {
        fn from_chip_gpio(&self, gpio: u32) -> Option<LogicalPin> {
            self.lookups.set(self.lookups.get() + 1);
            Some(LogicalPin::new(gpio + 100))
        }
        fn from_bcm(&self, bcm: u32) -> Option<LogicalPin> {
            self.lookups.set(self.lookups.get() + 1);
            Some(LogicalPin::new(bcm + 200))
        }
        fn from_wiring_pi(&self, wpi: u32) -> Option<LogicalPin> {
            self.lookups.set(self.lookups.get() + 1);
            (wpi < 10).then(|| LogicalPin::new(wpi + 300))
        }
    }

    #[test]
    fn test_scheme_discriminants() {
        assert_eq!(PinScheme::try_from(0).unwrap(), PinScheme::Logical);
        assert_eq!(PinScheme::try_from(1).unwrap(), PinScheme::Physical);
        assert_eq!(PinScheme::try_from(2).unwrap(), PinScheme::ChipGpio);
        assert_eq!(PinScheme::try_from(3).unwrap(), PinScheme::Bcm);
        assert_eq!(PinScheme::try_from(4).unwrap(), PinScheme::WiringPi);
        assert_eq!(PinScheme::WiringPi as u8, 4);
        assert!(matches!(
            PinScheme::try_from(5),
            Err(Error::InvalidScheme(5))
        ));
    }

    #[test]
    fn test_logical_and_physical() {
        let mut t = PinTranslator::default();
        assert_eq!(t.resolve(PinScheme::Logical, 17).unwrap(), LogicalPin::new(17));
        for n in 1..=40 {
            assert_eq!(
                t.resolve(PinScheme::Physical, n).unwrap(),
                LogicalPin::new(n - 1)
            );
        }
        assert!(matches!(
            t.resolve(PinScheme::Physical, 0),
            Err(Error::PinArgumentOutOfRange { pin: 0, .. })
        ));
        // Arithmetic schemes never touch the cache
        assert_eq!(t.cached(), 0);
    }

    #[test]
    fn test_table_lookups_are_memoized_per_scheme() {
        let table = CountingTable {
            lookups: Cell::new(0),
        };
        let mut t = PinTranslator::new(&table);
        let first = t.resolve(PinScheme::Bcm, 4).unwrap();
        let second = t.resolve(PinScheme::Bcm, 4).unwrap();
        assert_eq!(first, second);
        assert_eq!(table.lookups.get(), 1);

        // Same raw number, different scheme, separate entry
        assert_eq!(
            t.resolve(PinScheme::ChipGpio, 4).unwrap(),
            LogicalPin::new(104)
        );
        assert_eq!(table.lookups.get(), 2);
        assert_eq!(t.cached(), 2);
    }

    #[test]
    fn test_unknown_pins_are_not_cached() {
        let table = CountingTable {
            lookups: Cell::new(0),
        };
        let mut t = PinTranslator::new(&table);
        for _ in 0..2 {
            assert!(matches!(
                t.resolve(PinScheme::WiringPi, 42),
                Err(Error::UnknownPin {
                    scheme: PinScheme::WiringPi,
                    pin: 42
                })
            ));
        }
        assert_eq!(table.lookups.get(), 2);
        assert_eq!(t.cached(), 0);
    }

    #[test]
    fn test_raspberry_pi_table() {
        let mut t = PinTranslator::default();
        // BCM 17 / WiringPi 0 sits on physical pin 11
        assert_eq!(t.resolve(PinScheme::Bcm, 17).unwrap(), LogicalPin::new(10));
        assert_eq!(
            t.resolve(PinScheme::WiringPi, 0).unwrap(),
            LogicalPin::new(10)
        );
        assert_eq!(
            t.resolve(PinScheme::ChipGpio, 17).unwrap(),
            LogicalPin::new(10)
        );
        // SPI0 SCLK: BCM 11, physical 23
        assert_eq!(t.resolve(PinScheme::Bcm, 11).unwrap(), LogicalPin::new(22));
        // BCM 28+ is not on the header
        assert!(t.resolve(PinScheme::Bcm, 28).is_err());
        assert!(t.resolve_raw(9, 1).is_err());
    }
}

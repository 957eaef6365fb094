//! # sbc-hal
//!
//! GPIO pin control and command/data transports for driving displays and
//! sensors from a single-board computer's header pins.
//!
//! ## Features
//!
//! *   Pin numbering schemes (`PinScheme`): logical, physical header position,
//!     SoC chip line, BCM and WiringPi numbers.
//!     *   `PinTranslator` resolves any of them to a `LogicalPin`, memoizing
//!         table lookups per `(scheme, pin)`.
//!     *   Built-in Raspberry Pi 40-pin pinout (`RaspberryPiPinout`); any other
//!         board plugs in through the `PinoutTable` trait.
//! *   A backend-agnostic pin capability (`Gpio` trait):
//!     *   Input/output claims with per-owner exclusivity (`Error::PinBusy`).
//!     *   Mode-checked reads and writes (`Error::WrongMode`).
//!     *   Edge waits with timeout (`wait_for_rising`, `wait_for_falling`),
//!         with a polling fallback for backends without edge events.
//!     *   Pulse-width measurement (`time_in_high`, `time_in_low`).
//! *   Transports implementing the `Protocol` contract
//!     (`send_command`, `send_data`, `cleanup`):
//!     *   `BitBang`: SPI-style framing over plain GPIO lines with optional
//!         chip-select, data/command and reset pins.
//!     *   `HardwareSpi`: bulk bytes over a native `SpiBus`, DC and RST over GPIO.
//! *   A simulated chip (`sim`) with a virtual clock for tests and dry runs.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use sbc_hal::{
//!     sim::SimChip, BitBang, BitBangConfig, BitBangPins, PinScheme, Protocol,
//!     RaspberryPiPinout, Result,
//! };
//!
//! fn main() -> Result<()> {
//!     // Optional: Initialize logging
//!     // env_logger::init();
//!
//!     // Any `Gpio` backend works here; the simulated chip needs no hardware.
//!     let chip = SimChip::raspberry_pi();
//!     let mut gpio = chip.handle_with(PinScheme::Bcm, RaspberryPiPinout);
//!
//!     let pins = BitBangPins::new(gpio.pin(11)?, gpio.pin(10)?)
//!         .with_chip_select(gpio.pin(8)?)
//!         .with_data_command(gpio.pin(24)?)
//!         .with_reset(gpio.pin(25)?);
//!
//!     let config = BitBangConfig::display_reset();
//!     let mut display = BitBang::with_delay(gpio, chip.delay(), pins, config)?;
//!     display.send_command(&[0xAE])?; // display off
//!     display.send_data(&[0x00; 1024])?;
//!     display.cleanup();
//!     Ok(())
//! }
//! ```
//!
//! ## Ownership
//!
//! Handles are single-threaded. A pin belongs to the handle that configured
//! it until `release` or until the handle is dropped; transports hold their
//! role pins until `cleanup` or drop. Edge-wait and measurement timeouts are
//! reported as `false`/`0`, not as errors.
//!
//! ## License
//!
//! This project is licensed under the WTFPL.

mod consts;
mod error;
pub mod gpio;
pub mod pinout;
pub mod protocol;
pub mod sim;

pub use consts::DEFAULT_TRANSFER_SIZE;
pub use error::{Error, Result};
pub use gpio::{
    poll_for_edge, Delay, Edge, EdgeEvent, Gpio, GpioLevel, LogicalPin, PinState, StdDelay,
};
pub use pinout::{PinScheme, PinTranslator, PinoutTable, RaspberryPiPinout};
pub use protocol::{
    BitBang, BitBangConfig, BitBangPins, HardwareSpi, HardwareSpiConfig, HardwareSpiPins,
    Protocol, SpiBus, SpiConfig, SpiMode,
};

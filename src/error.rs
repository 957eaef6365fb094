use crate::gpio::{LogicalPin, PinState};
use crate::pinout::PinScheme;
use thiserror::Error;

/// Errors that can occur when configuring or driving GPIO pins and transports.
///
/// Timeouts of edge waits and pulse measurements are not errors; they are
/// reported as `false`, `None` or a zero duration.
#[derive(Error, Debug)]
pub enum Error {
    /// Numbering scheme discriminant outside 0-4. Always a programming error.
    #[error("Invalid pin numbering scheme: {0} (expected 0-4)")]
    InvalidScheme(u8),
    /// The pinout table has no entry for this pin in the given scheme.
    #[error("Pin {pin} has no logical mapping in the {scheme} scheme")]
    UnknownPin {
        /// Scheme the raw number was expressed in.
        scheme: PinScheme,
        /// The raw pin number that could not be mapped.
        pin: u32,
    },
    /// Raw pin number is outside the valid range for its scheme.
    #[error("Pin {pin} argument out of range: {message}")]
    PinArgumentOutOfRange {
        /// The invalid raw pin number.
        pin: u32,
        /// Detailed error message explaining the constraint.
        message: String,
    },
    /// Another owner currently holds the pin.
    #[error("Pin {pin} is currently being used by another consumer")]
    PinBusy {
        /// The contended pin.
        pin: LogicalPin,
    },
    /// The underlying line could not be claimed.
    #[error("Pin {pin} could not be configured: {message}")]
    PinConfig {
        /// The pin that failed to configure.
        pin: LogicalPin,
        /// Backend-specific details.
        message: String,
    },
    /// Read, write or wait issued while the pin is in the wrong state.
    #[error("Pin {pin} is not in {expected} mode (currently {actual})")]
    WrongMode {
        /// The pin the operation was issued on.
        pin: LogicalPin,
        /// State the operation requires.
        expected: PinState,
        /// State the pin is actually in.
        actual: PinState,
    },
    /// Function argument is outside the valid range.
    #[error("Argument out of range: {0}")]
    ArgumentOutOfRange(String),
    /// SPI clock rate not supported by the bus controller.
    #[error("Invalid bus speed {speed_hz} Hz, valid values are: {valid}")]
    InvalidSpiSpeed {
        /// The rejected clock rate.
        speed_hz: u32,
        /// Comma separated list of accepted rates.
        valid: String,
    },
    /// Requested burst exceeds the transport's per-transfer ceiling.
    #[error("Requested transfer size is too large (max {max}, got {actual})")]
    OperationTooLarge {
        /// Maximum bytes per transfer.
        max: usize,
        /// Bytes requested.
        actual: usize,
    },
    /// I/O error reported by a bus driver.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

// Helpers for recurring error shapes
pub(crate) fn wrong_mode(pin: LogicalPin, expected: PinState, actual: PinState) -> Error {
    Error::WrongMode {
        pin,
        expected,
        actual,
    }
}

pub(crate) fn zero_transfer_size() -> Error {
    Error::ArgumentOutOfRange("transfer size must be at least 1 byte".to_string())
}

//! Crate-wide defaults and limits.

use std::time::Duration;

// --- Bit-bang transport ---
/// Maximum bytes sent under one chip-select assertion by `send_data`.
pub const DEFAULT_TRANSFER_SIZE: usize = 4096;

// --- Hardware SPI transport ---
pub mod spi {
    use std::time::Duration;

    pub const DEFAULT_BUS: u8 = 0;
    pub const DEFAULT_CHIP_SELECT: u8 = 0;
    pub const DEFAULT_BITS_PER_WORD: u8 = 8;
    pub const DEFAULT_SPEED_HZ: u32 = 8_000_000;
    pub const DEFAULT_DELAY_US: u16 = 0;

    // DC/RST defaults match the common BCM wiring of SPI display hats
    pub const DEFAULT_DC_PIN: u32 = 24;
    pub const DEFAULT_RST_PIN: u32 = 25;

    pub const DEFAULT_RESET_HOLD: Duration = Duration::from_millis(500);
    pub const DEFAULT_RESET_RELEASE: Duration = Duration::from_millis(1000);

    /// Clock rates accepted by `SpiConfig::validate`.
    pub const SUPPORTED_SPEEDS_HZ: [u32; 16] = [
        500_000, 1_000_000, 2_000_000, 4_000_000, 8_000_000, 16_000_000, 20_000_000, 24_000_000,
        28_000_000, 32_000_000, 36_000_000, 40_000_000, 44_000_000, 48_000_000, 50_000_000,
        52_000_000,
    ];
}

// --- Edge detection ---
/// Sampling interval of the polling edge-wait fallback.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(50);

// --- Display reset preset ---
pub const DISPLAY_RESET_HOLD: Duration = Duration::from_millis(100);
pub const DISPLAY_RESET_RELEASE: Duration = Duration::from_millis(150);

//! The GPIO pin capability shared by every backend.
//!
//! A backend implements the required methods of [`Gpio`]; edge waits fall
//! back to polling and pulse-width timing is composed from two edge waits
//! unless the backend overrides them.

use crate::consts;
use crate::error::Result;
use std::fmt;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

/// Canonical zero-based pin number every backend operates on.
///
/// Obtain one from a raw number with [`crate::PinTranslator`], or directly
/// with `LogicalPin::new` when the number is already logical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalPin(pub(crate) u32);

impl LogicalPin {
    /// Wraps an already-logical pin number.
    #[inline]
    pub const fn new(pin_num: u32) -> Self {
        LogicalPin(pin_num)
    }

    /// Returns the underlying pin number.
    #[inline]
    pub fn number(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for LogicalPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioLevel {
    Low,
    High,
}

impl GpioLevel {
    #[inline]
    pub fn is_high(self) -> bool {
        self == GpioLevel::High
    }
}

impl From<bool> for GpioLevel {
    fn from(high: bool) -> Self {
        if high {
            GpioLevel::High
        } else {
            GpioLevel::Low
        }
    }
}

/// A level transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Low to High.
    Rising,
    /// High to Low.
    Falling,
}

impl Edge {
    /// True if going from `from` to `to` is this edge.
    #[inline]
    pub fn matches(self, from: GpioLevel, to: GpioLevel) -> bool {
        match self {
            Edge::Rising => from == GpioLevel::Low && to == GpioLevel::High,
            Edge::Falling => from == GpioLevel::High && to == GpioLevel::Low,
        }
    }

    /// The opposite transition.
    #[inline]
    pub fn opposite(self) -> Edge {
        match self {
            Edge::Rising => Edge::Falling,
            Edge::Falling => Edge::Rising,
        }
    }
}

/// Configuration state of a single pin, as seen by one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    Unconfigured,
    Input,
    Output,
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PinState::Unconfigured => "unconfigured",
            PinState::Input => "input",
            PinState::Output => "output",
        };
        f.write_str(name)
    }
}

/// An observed edge.
///
/// `timestamp` is monotonic and relative to a backend-defined epoch; only
/// differences between timestamps from the same backend are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub edge: Edge,
    pub timestamp: Duration,
}

/// Pin control contract implemented by every GPIO backend.
///
/// All pins are logical. A pin is exclusively owned by the handle that
/// configured it until [`Gpio::release`] or until the handle is dropped.
/// Handles are single-threaded; callers sharing one across threads must
/// serialize access themselves.
pub trait Gpio {
    /// Claims `pin` for input. Switching from output releases the pin first.
    ///
    /// Fails with [`crate::Error::PinBusy`] if another owner holds the line and with
    /// [`crate::Error::PinConfig`] if the line cannot be claimed at all.
    fn set_input_mode(&mut self, pin: LogicalPin) -> Result<()>;

    /// Claims `pin` for output, driving it Low on first claim.
    fn set_output_mode(&mut self, pin: LogicalPin) -> Result<()>;

    /// Current configuration of `pin` for this owner.
    fn state(&self, pin: LogicalPin) -> PinState;

    /// Level of an input pin. [`crate::Error::WrongMode`] unless `pin` is an input.
    fn is_high(&self, pin: LogicalPin) -> Result<bool>;

    fn is_low(&self, pin: LogicalPin) -> Result<bool> {
        Ok(!self.is_high(pin)?)
    }

    /// Drives an output pin High. [`crate::Error::WrongMode`] unless `pin` is an output.
    fn set_high(&mut self, pin: LogicalPin) -> Result<()>;

    /// Drives an output pin Low. [`crate::Error::WrongMode`] unless `pin` is an output.
    fn set_low(&mut self, pin: LogicalPin) -> Result<()>;

    /// Returns `pin` to [`PinState::Unconfigured`]. A no-op if it already is.
    fn release(&mut self, pin: LogicalPin);

    fn read(&self, pin: LogicalPin) -> Result<GpioLevel> {
        self.is_high(pin).map(GpioLevel::from)
    }

    fn write(&mut self, pin: LogicalPin, level: GpioLevel) -> Result<()> {
        match level {
            GpioLevel::High => self.set_high(pin),
            GpioLevel::Low => self.set_low(pin),
        }
    }

    /// Blocks until `edge` is seen on an input pin or `timeout` elapses.
    ///
    /// Returns `None` on timeout. The provided implementation polls the pin
    /// level; backends with kernel edge events should override it.
    fn wait_for_edge(
        &mut self,
        pin: LogicalPin,
        edge: Edge,
        timeout: Duration,
    ) -> Result<Option<EdgeEvent>> {
        poll_for_edge(
            || self.read(pin),
            edge,
            timeout,
            consts::DEFAULT_POLL_INTERVAL,
        )
    }

    /// Waits for a Low to High transition. `false` on timeout.
    fn wait_for_rising(&mut self, pin: LogicalPin, timeout: Duration) -> Result<bool> {
        Ok(self.wait_for_edge(pin, Edge::Rising, timeout)?.is_some())
    }

    /// Waits for a High to Low transition. `false` on timeout.
    fn wait_for_falling(&mut self, pin: LogicalPin, timeout: Duration) -> Result<bool> {
        Ok(self.wait_for_edge(pin, Edge::Falling, timeout)?.is_some())
    }

    /// Microseconds the pin spends High. The pin must be Low on entry.
    ///
    /// Sequence: rising edge (start), falling edge (end). Each wait is bounded
    /// by `timeout`; 0 if either one times out.
    fn time_in_high(&mut self, pin: LogicalPin, timeout: Duration) -> Result<u64> {
        measure_pulse(self, pin, Edge::Rising, timeout)
    }

    /// Microseconds the pin spends Low. The pin must be High on entry.
    fn time_in_low(&mut self, pin: LogicalPin, timeout: Duration) -> Result<u64> {
        measure_pulse(self, pin, Edge::Falling, timeout)
    }
}

impl<G: Gpio + ?Sized> Gpio for &mut G {
    fn set_input_mode(&mut self, pin: LogicalPin) -> Result<()> {
        (**self).set_input_mode(pin)
    }
    fn set_output_mode(&mut self, pin: LogicalPin) -> Result<()> {
        (**self).set_output_mode(pin)
    }
    fn state(&self, pin: LogicalPin) -> PinState {
        (**self).state(pin)
    }
    fn is_high(&self, pin: LogicalPin) -> Result<bool> {
        (**self).is_high(pin)
    }
    fn is_low(&self, pin: LogicalPin) -> Result<bool> {
        (**self).is_low(pin)
    }
    fn set_high(&mut self, pin: LogicalPin) -> Result<()> {
        (**self).set_high(pin)
    }
    fn set_low(&mut self, pin: LogicalPin) -> Result<()> {
        (**self).set_low(pin)
    }
    fn release(&mut self, pin: LogicalPin) {
        (**self).release(pin)
    }
    fn read(&self, pin: LogicalPin) -> Result<GpioLevel> {
        (**self).read(pin)
    }
    fn write(&mut self, pin: LogicalPin, level: GpioLevel) -> Result<()> {
        (**self).write(pin, level)
    }
    fn wait_for_edge(
        &mut self,
        pin: LogicalPin,
        edge: Edge,
        timeout: Duration,
    ) -> Result<Option<EdgeEvent>> {
        (**self).wait_for_edge(pin, edge, timeout)
    }
    fn wait_for_rising(&mut self, pin: LogicalPin, timeout: Duration) -> Result<bool> {
        (**self).wait_for_rising(pin, timeout)
    }
    fn wait_for_falling(&mut self, pin: LogicalPin, timeout: Duration) -> Result<bool> {
        (**self).wait_for_falling(pin, timeout)
    }
    fn time_in_high(&mut self, pin: LogicalPin, timeout: Duration) -> Result<u64> {
        (**self).time_in_high(pin, timeout)
    }
    fn time_in_low(&mut self, pin: LogicalPin, timeout: Duration) -> Result<u64> {
        (**self).time_in_low(pin, timeout)
    }
}

fn measure_pulse<G: Gpio + ?Sized>(
    gpio: &mut G,
    pin: LogicalPin,
    start: Edge,
    timeout: Duration,
) -> Result<u64> {
    let Some(t0) = gpio.wait_for_edge(pin, start, timeout)? else {
        return Ok(0);
    };
    let Some(t1) = gpio.wait_for_edge(pin, start.opposite(), timeout)? else {
        return Ok(0);
    };
    let width = t1.timestamp.saturating_sub(t0.timestamp);
    Ok(u64::try_from(width.as_micros()).unwrap_or(u64::MAX))
}

/// Monotonic timestamp of `at`, relative to the first call in this process.
pub fn monotonic_timestamp(at: Instant) -> Duration {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    at.saturating_duration_since(*EPOCH.get_or_init(Instant::now))
}

/// Polling edge detector for backends without edge events.
///
/// Samples the level every `interval` and reports the first `edge` relative
/// to the level seen on entry. Returns `None` once `timeout` has elapsed; the
/// overshoot is bounded by one interval plus scheduler latency.
pub fn poll_for_edge<F>(
    mut sample: F,
    edge: Edge,
    timeout: Duration,
    interval: Duration,
) -> Result<Option<EdgeEvent>>
where
    F: FnMut() -> Result<GpioLevel>,
{
    let start = Instant::now();
    let mut previous = sample()?;
    loop {
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Ok(None);
        }
        thread::sleep(interval.min(timeout - elapsed));
        let level = sample()?;
        let now = Instant::now();
        if edge.matches(previous, level) {
            return Ok(Some(EdgeEvent {
                edge,
                timestamp: monotonic_timestamp(now),
            }));
        }
        previous = level;
    }
}

/// Blocking delay used for reset sequencing.
pub trait Delay {
    fn delay(&mut self, duration: Duration);
}

impl<D: Delay + ?Sized> Delay for &mut D {
    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration)
    }
}

/// [`Delay`] backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay(&mut self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

// Reports WrongMode if `actual` is not `expected`.
pub(crate) fn require_state(
    pin: LogicalPin,
    expected: PinState,
    actual: PinState,
) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(crate::error::wrong_mode(pin, expected, actual))
    }
}

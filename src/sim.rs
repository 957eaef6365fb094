//! In-memory GPIO chip with a virtual clock.
//!
//! [`SimChip`] models a bank of lines shared by any number of owners. Each
//! [`SimGpio`] handle is one owner: claims made through it conflict with
//! claims from other handles exactly like lines held by another process on a
//! real chip. Time only moves when a handle waits for an edge or a
//! [`SimDelay`] sleeps, so timing behavior is fully deterministic.
//!
//! Every level driven by an output is recorded with its timestamp and can be
//! read back with [`SimChip::writes`] or decoded into SPI bursts with
//! [`SimChip::decode_bursts`].

use crate::error::{Error, Result};
use crate::gpio::{require_state, Delay, Edge, EdgeEvent, Gpio, GpioLevel, LogicalPin, PinState};
use crate::pinout::{PinScheme, PinTranslator, PinoutTable, RaspberryPiPinout};
use log::{debug, trace};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

/// A level driven onto an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinWrite {
    /// Virtual time of the write.
    pub at: Duration,
    pub pin: LogicalPin,
    pub level: GpioLevel,
}

#[derive(Debug, Clone, Copy)]
struct Claim {
    owner: u32,
    mode: PinState,
}

#[derive(Debug)]
struct Line {
    claim: Option<Claim>,
    // Held by a consumer outside the simulation
    external: bool,
    level: GpioLevel,
    // Pending input level changes, sorted by time
    scheduled: VecDeque<(Duration, GpioLevel)>,
}

impl Default for Line {
    fn default() -> Self {
        Line {
            claim: None,
            external: false,
            level: GpioLevel::Low,
            scheduled: VecDeque::new(),
        }
    }
}

impl Line {
    // Applies every scheduled change up to and including `now`.
    fn settle(&mut self, now: Duration) {
        while let Some(&(at, level)) = self.scheduled.front() {
            if at > now {
                break;
            }
            self.level = level;
            self.scheduled.pop_front();
        }
    }

    // First matching edge strictly after the settled level, no later than `deadline`.
    fn next_edge(&self, edge: Edge, deadline: Duration) -> Option<Duration> {
        let mut previous = self.level;
        for &(at, level) in &self.scheduled {
            if at > deadline {
                break;
            }
            if edge.matches(previous, level) {
                return Some(at);
            }
            previous = level;
        }
        None
    }
}

#[derive(Debug)]
struct ChipState {
    line_count: u32,
    now: Duration,
    next_owner: u32,
    lines: HashMap<LogicalPin, Line>,
    writes: Vec<PinWrite>,
}

impl ChipState {
    fn line_mut(&mut self, pin: LogicalPin) -> &mut Line {
        self.lines.entry(pin).or_default()
    }

    fn owner_state(&self, owner: u32, pin: LogicalPin) -> PinState {
        match self.lines.get(&pin).and_then(|l| l.claim) {
            Some(claim) if claim.owner == owner => claim.mode,
            _ => PinState::Unconfigured,
        }
    }

    fn drive(&mut self, pin: LogicalPin, level: GpioLevel) {
        let at = self.now;
        self.line_mut(pin).level = level;
        self.writes.push(PinWrite { at, pin, level });
    }
}

/// A simulated GPIO chip.
///
/// Cloning yields another reference to the same chip.
#[derive(Debug, Clone)]
pub struct SimChip {
    inner: Rc<RefCell<ChipState>>,
}

impl SimChip {
    /// Creates a chip exposing lines `0..line_count`.
    pub fn new(line_count: u32) -> Self {
        SimChip {
            inner: Rc::new(RefCell::new(ChipState {
                line_count,
                now: Duration::ZERO,
                next_owner: 0,
                lines: HashMap::new(),
                writes: Vec::new(),
            })),
        }
    }

    /// A chip with one line per position of the Raspberry Pi 40-pin header.
    pub fn raspberry_pi() -> Self {
        Self::new(40)
    }

    /// Opens a new owner that addresses pins by logical number.
    pub fn handle(&self) -> SimGpio {
        self.handle_with(PinScheme::Logical, RaspberryPiPinout)
    }

    /// Opens a new owner that addresses pins in `scheme`, resolved through `table`.
    pub fn handle_with<T: PinoutTable>(&self, scheme: PinScheme, table: T) -> SimGpio<T> {
        let owner = {
            let mut chip = self.inner.borrow_mut();
            chip.next_owner += 1;
            chip.next_owner
        };
        debug!("Opened simulated GPIO owner {} ({} numbering)", owner, scheme);
        SimGpio {
            chip: Rc::clone(&self.inner),
            owner,
            scheme,
            translator: PinTranslator::new(table),
        }
    }

    /// A delay source that advances this chip's clock.
    pub fn delay(&self) -> SimDelay {
        SimDelay {
            chip: Rc::clone(&self.inner),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    /// Moves the virtual clock forward.
    pub fn advance(&self, by: Duration) {
        self.inner.borrow_mut().now += by;
    }

    /// Marks `pin` as held by a consumer outside the simulation.
    pub fn claim_externally(&self, pin: LogicalPin) {
        self.inner.borrow_mut().line_mut(pin).external = true;
    }

    /// Undoes [`SimChip::claim_externally`].
    pub fn release_externally(&self, pin: LogicalPin) {
        self.inner.borrow_mut().line_mut(pin).external = false;
    }

    /// Sets the level seen by inputs on `pin` from now on.
    ///
    /// The change happens "before" any later wait starts, so it is never
    /// reported as an edge.
    pub fn set_input_level(&self, pin: LogicalPin, level: GpioLevel) {
        let mut chip = self.inner.borrow_mut();
        let now = chip.now;
        let line = chip.line_mut(pin);
        line.settle(now);
        line.level = level;
    }

    /// Schedules level changes on `pin`, each `(offset from now, level)`.
    pub fn schedule(&self, pin: LogicalPin, changes: &[(Duration, GpioLevel)]) {
        let mut chip = self.inner.borrow_mut();
        let now = chip.now;
        let line = chip.line_mut(pin);
        for &(offset, level) in changes {
            let at = now + offset;
            let idx = line.scheduled.partition_point(|&(t, _)| t <= at);
            line.scheduled.insert(idx, (at, level));
        }
    }

    /// Current level of `pin`, whoever drives it.
    pub fn level(&self, pin: LogicalPin) -> GpioLevel {
        let mut chip = self.inner.borrow_mut();
        let now = chip.now;
        let line = chip.line_mut(pin);
        line.settle(now);
        line.level
    }

    /// Configuration of `pin` regardless of owner.
    pub fn state(&self, pin: LogicalPin) -> PinState {
        self.inner
            .borrow()
            .lines
            .get(&pin)
            .and_then(|l| l.claim)
            .map_or(PinState::Unconfigured, |c| c.mode)
    }

    /// Every level driven so far, in order.
    pub fn writes(&self) -> Vec<PinWrite> {
        self.inner.borrow().writes.clone()
    }

    /// Levels driven on one pin, in order.
    pub fn writes_to(&self, pin: LogicalPin) -> Vec<PinWrite> {
        self.inner
            .borrow()
            .writes
            .iter()
            .filter(|w| w.pin == pin)
            .copied()
            .collect()
    }

    pub fn clear_writes(&self) {
        self.inner.borrow_mut().writes.clear();
    }

    /// Decodes the write log as MSB-first SPI mode 0 traffic.
    ///
    /// Data is sampled on each rising edge of `clock`. With a chip-select
    /// line, a burst runs from CE going Low to CE going High and only
    /// complete bytes are kept; without one, all traffic is a single burst.
    pub fn decode_bursts(
        &self,
        clock: LogicalPin,
        data: LogicalPin,
        chip_select: Option<LogicalPin>,
    ) -> Vec<Vec<u8>> {
        let chip = self.inner.borrow();
        let mut bursts = Vec::new();
        let mut current: Option<Vec<u8>> = chip_select.is_none().then(Vec::new);
        let mut clock_level = GpioLevel::Low;
        let mut data_level = GpioLevel::Low;
        let mut byte = 0u8;
        let mut bits = 0u8;

        for write in &chip.writes {
            if Some(write.pin) == chip_select {
                match (write.level, current.take()) {
                    (GpioLevel::Low, None) => {
                        current = Some(Vec::new());
                        byte = 0;
                        bits = 0;
                    }
                    (GpioLevel::Low, open) => current = open,
                    (GpioLevel::High, Some(done)) => bursts.push(done),
                    (GpioLevel::High, None) => {}
                }
            } else if write.pin == data {
                data_level = write.level;
            } else if write.pin == clock {
                let rising = Edge::Rising.matches(clock_level, write.level);
                clock_level = write.level;
                if let (true, Some(burst)) = (rising, current.as_mut()) {
                    byte = (byte << 1) | u8::from(data_level.is_high());
                    bits += 1;
                    if bits == 8 {
                        burst.push(byte);
                        byte = 0;
                        bits = 0;
                    }
                }
            }
        }
        if chip_select.is_none() {
            if let Some(burst) = current.filter(|b| !b.is_empty()) {
                bursts.push(burst);
            }
        }
        bursts
    }
}

/// One owner's view of a [`SimChip`].
///
/// Dropping the handle releases every line it still holds.
#[derive(Debug)]
pub struct SimGpio<T: PinoutTable = RaspberryPiPinout> {
    chip: Rc<RefCell<ChipState>>,
    owner: u32,
    scheme: PinScheme,
    translator: PinTranslator<T>,
}

impl<T: PinoutTable> SimGpio<T> {
    /// Resolves a raw number in this handle's numbering scheme.
    pub fn pin(&mut self, raw: u32) -> Result<LogicalPin> {
        self.translator.resolve(self.scheme, raw)
    }

    pub fn scheme(&self) -> PinScheme {
        self.scheme
    }

    fn claim(&mut self, pin: LogicalPin, mode: PinState) -> Result<()> {
        let mut chip = self.chip.borrow_mut();
        if pin.number() >= chip.line_count {
            return Err(Error::PinConfig {
                pin,
                message: format!("chip has only {} lines", chip.line_count),
            });
        }
        let owner = self.owner;
        let line = chip.line_mut(pin);
        if line.external {
            return Err(Error::PinBusy { pin });
        }
        match line.claim {
            Some(claim) if claim.owner != owner => return Err(Error::PinBusy { pin }),
            Some(claim) if claim.mode == mode => {
                trace!("Pin {} already configured as {}", pin, mode);
                return Ok(());
            }
            Some(claim) => {
                debug!("Releasing pin {} ({}) before reconfiguring", pin, claim.mode);
            }
            None => {}
        }
        line.claim = Some(Claim { owner, mode });
        debug!("Owner {} claimed pin {} as {}", owner, pin, mode);
        if mode == PinState::Output {
            chip.drive(pin, GpioLevel::Low);
        }
        Ok(())
    }

    fn drive(&mut self, pin: LogicalPin, level: GpioLevel) -> Result<()> {
        let mut chip = self.chip.borrow_mut();
        require_state(pin, PinState::Output, chip.owner_state(self.owner, pin))?;
        trace!("Pin {} <- {:?}", pin, level);
        chip.drive(pin, level);
        Ok(())
    }
}

impl<T: PinoutTable> Gpio for SimGpio<T> {
    fn set_input_mode(&mut self, pin: LogicalPin) -> Result<()> {
        self.claim(pin, PinState::Input)
    }

    fn set_output_mode(&mut self, pin: LogicalPin) -> Result<()> {
        self.claim(pin, PinState::Output)
    }

    fn state(&self, pin: LogicalPin) -> PinState {
        self.chip.borrow().owner_state(self.owner, pin)
    }

    fn is_high(&self, pin: LogicalPin) -> Result<bool> {
        let mut chip = self.chip.borrow_mut();
        require_state(pin, PinState::Input, chip.owner_state(self.owner, pin))?;
        let now = chip.now;
        let line = chip.line_mut(pin);
        line.settle(now);
        Ok(line.level.is_high())
    }

    fn set_high(&mut self, pin: LogicalPin) -> Result<()> {
        self.drive(pin, GpioLevel::High)
    }

    fn set_low(&mut self, pin: LogicalPin) -> Result<()> {
        self.drive(pin, GpioLevel::Low)
    }

    fn release(&mut self, pin: LogicalPin) {
        let mut chip = self.chip.borrow_mut();
        if let Some(line) = chip.lines.get_mut(&pin) {
            if line.claim.is_some_and(|c| c.owner == self.owner) {
                line.claim = None;
                debug!("Owner {} released pin {}", self.owner, pin);
            }
        }
    }

    fn wait_for_edge(
        &mut self,
        pin: LogicalPin,
        edge: Edge,
        timeout: Duration,
    ) -> Result<Option<EdgeEvent>> {
        let mut chip = self.chip.borrow_mut();
        require_state(pin, PinState::Input, chip.owner_state(self.owner, pin))?;
        let now = chip.now;
        let deadline = now + timeout;
        let line = chip.line_mut(pin);
        line.settle(now);
        match line.next_edge(edge, deadline) {
            Some(at) => {
                line.settle(at);
                chip.now = at;
                trace!("Pin {} {:?} edge at {:?}", pin, edge, at);
                Ok(Some(EdgeEvent {
                    edge,
                    timestamp: at,
                }))
            }
            None => {
                line.settle(deadline);
                chip.now = deadline;
                trace!("Pin {} {:?} edge wait timed out", pin, edge);
                Ok(None)
            }
        }
    }
}

impl<T: PinoutTable> Drop for SimGpio<T> {
    fn drop(&mut self) {
        let mut chip = self.chip.borrow_mut();
        let owner = self.owner;
        for (pin, line) in chip.lines.iter_mut() {
            if line.claim.is_some_and(|c| c.owner == owner) {
                line.claim = None;
                trace!("Owner {} dropped, released pin {}", owner, pin);
            }
        }
    }
}

/// [`Delay`] that advances a [`SimChip`]'s clock instead of sleeping.
#[derive(Debug, Clone)]
pub struct SimDelay {
    chip: Rc<RefCell<ChipState>>,
}

impl Delay for SimDelay {
    fn delay(&mut self, duration: Duration) {
        self.chip.borrow_mut().now += duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: LogicalPin = LogicalPin::new(7);

    #[test]
    fn test_output_claim_drives_low_once() {
        let chip = SimChip::new(8);
        let mut gpio = chip.handle();
        gpio.set_output_mode(P).unwrap();
        gpio.set_high(P).unwrap();
        gpio.set_output_mode(P).unwrap(); // idempotent, no new write
        assert_eq!(chip.level(P), GpioLevel::High);
        let levels: Vec<_> = chip.writes_to(P).iter().map(|w| w.level).collect();
        assert_eq!(levels, vec![GpioLevel::Low, GpioLevel::High]);
    }

    #[test]
    fn test_line_out_of_range_is_config_error() {
        let chip = SimChip::new(8);
        let mut gpio = chip.handle();
        assert!(matches!(
            gpio.set_input_mode(LogicalPin::new(8)),
            Err(Error::PinConfig { .. })
        ));
    }

    #[test]
    fn test_scheduled_changes_apply_in_time_order() {
        let chip = SimChip::new(8);
        chip.schedule(
            P,
            &[
                (Duration::from_micros(20), GpioLevel::Low),
                (Duration::from_micros(10), GpioLevel::High),
            ],
        );
        assert_eq!(chip.level(P), GpioLevel::Low);
        chip.advance(Duration::from_micros(15));
        assert_eq!(chip.level(P), GpioLevel::High);
        chip.advance(Duration::from_micros(5));
        assert_eq!(chip.level(P), GpioLevel::Low);
    }

    #[test]
    fn test_wait_skips_non_matching_transitions() {
        let chip = SimChip::new(8);
        let mut gpio = chip.handle();
        gpio.set_input_mode(P).unwrap();
        chip.schedule(
            P,
            &[
                (Duration::from_micros(5), GpioLevel::Low), // no change
                (Duration::from_micros(10), GpioLevel::High),
                (Duration::from_micros(30), GpioLevel::Low),
            ],
        );
        let ev = gpio
            .wait_for_edge(P, Edge::Falling, Duration::from_millis(1))
            .unwrap()
            .unwrap();
        assert_eq!(ev.timestamp, Duration::from_micros(30));
        assert_eq!(chip.now(), Duration::from_micros(30));
    }

    #[test]
    fn test_wait_timeout_advances_clock_to_deadline() {
        let chip = SimChip::new(8);
        let mut gpio = chip.handle();
        gpio.set_input_mode(P).unwrap();
        chip.schedule(P, &[(Duration::from_millis(3), GpioLevel::High)]);
        assert!(!gpio.wait_for_rising(P, Duration::from_millis(2)).unwrap());
        assert_eq!(chip.now(), Duration::from_millis(2));
        // The edge is still ahead of us
        assert!(gpio.wait_for_rising(P, Duration::from_millis(2)).unwrap());
        assert_eq!(chip.now(), Duration::from_millis(3));
    }

    #[test]
    fn test_drop_releases_owned_lines() {
        let chip = SimChip::new(8);
        {
            let mut gpio = chip.handle();
            gpio.set_output_mode(P).unwrap();
            assert_eq!(chip.state(P), PinState::Output);
        }
        assert_eq!(chip.state(P), PinState::Unconfigured);
        let mut other = chip.handle();
        assert!(other.set_input_mode(P).is_ok());
    }

    #[test]
    fn test_decode_without_chip_select() {
        let chip = SimChip::new(8);
        let (clk, sda) = (LogicalPin::new(0), LogicalPin::new(1));
        let mut gpio = chip.handle();
        gpio.set_output_mode(clk).unwrap();
        gpio.set_output_mode(sda).unwrap();
        for bit in (0..8).rev() {
            gpio.write(sda, GpioLevel::from((0xA5u8 >> bit) & 1 == 1))
                .unwrap();
            gpio.set_high(clk).unwrap();
            gpio.set_low(clk).unwrap();
        }
        assert_eq!(chip.decode_bursts(clk, sda, None), vec![vec![0xA5]]);
    }
}

//! Derives fixed-width clock pulses from the MIDI timing clock.
//!
//! Each output counts incoming ticks and fires when its [`Division`] is reached. Pulses are retired by polling rather
//! than by the next tick, so every pulse is the same width whatever the tempo, as long as the tempo is slow enough
//! for pulses not to overlap.
//!
//! At very high tempos a pulse may fire again before the previous one was retired. The output then simply stays
//! high and the pulse width is measured from the latest fire; no low gap is inserted between the two.

use crate::configuration::Division;
use embassy_time::{Duration, Instant};

/// MIDI transport messages which affect the clock outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transport {
    /// Playback starts from the top.
    Start,
    /// Playback resumes from where it stopped.
    Continue,
    /// Playback halts.
    Stop,
}

/// One clock output: a tick counter and the pulse currently in flight, if any.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockOutput {
    division: Division,
    /// Ticks since the last pulse fired or the division changed.
    ticks: u16,
    /// When the current pulse fired; `None` while the output is low.
    pulse_start: Option<Instant>,
}

impl ClockOutput {
    /// Constructs an idle output.
    pub fn new(division: Division) -> Self {
        Self {
            division,
            ticks: 0,
            pulse_start: None,
        }
    }

    /// Getter.
    pub fn division(&self) -> Division {
        self.division
    }

    /// Ticks counted towards the next pulse.
    pub fn ticks(&self) -> u16 {
        self.ticks
    }

    /// Whether the output line should be high.
    pub fn is_high(&self) -> bool {
        self.pulse_start.is_some()
    }

    /// Changes the division, discarding progress made towards the old one.
    pub fn set_division(&mut self, division: Division) {
        self.division = division;
        self.ticks = 0;
    }

    fn fire(&mut self, now: Instant) {
        self.pulse_start = Some(now);
        self.ticks = 0;
    }

    fn retract(&mut self) {
        self.pulse_start = None;
    }

    /// Counts one tick, firing if the division has been reached. Returns `true` if a pulse fired.
    fn tick(&mut self, now: Instant) -> bool {
        self.ticks = self.ticks.saturating_add(1);
        if self.ticks >= self.division.ticks() {
            self.fire(now);
            true
        } else {
            false
        }
    }

    /// Retracts the pulse once it has been high for longer than `width`. Returns `true` if it was retracted.
    fn expire(&mut self, now: Instant, width: Duration) -> bool {
        match self.pulse_start {
            Some(start) if now.saturating_duration_since(start) > width => {
                self.retract();
                true
            }
            _ => false,
        }
    }
}

/// `N` independently divided clock outputs plus a quarter-note indicator, all gated by the MIDI transport.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockDivider<const N: usize> {
    outputs: [ClockOutput; N],
    /// Fixed quarter-note output for the clock LED.
    indicator: ClockOutput,
    running: bool,
    pulse_width: Duration,
}

impl<const N: usize> ClockDivider<N> {
    /// Constructs a stopped divider.
    pub fn new(divisions: [Division; N], pulse_width: Duration) -> Self {
        Self {
            outputs: divisions.map(ClockOutput::new),
            indicator: ClockOutput::new(Division::QuarterNote),
            running: false,
            pulse_width,
        }
    }

    /// Whether incoming ticks are being counted.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The divided outputs, in order.
    pub fn outputs(&self) -> &[ClockOutput; N] {
        &self.outputs
    }

    /// The quarter-note indicator output.
    pub fn indicator(&self) -> &ClockOutput {
        &self.indicator
    }

    /// Returns the division of an output, or `None` if there is no such output.
    pub fn division(&self, output: usize) -> Option<Division> {
        self.outputs.get(output).map(ClockOutput::division)
    }

    /// Sets an output's division by index, clamping indices past the end of the division table, and resets that
    /// output's tick counter.
    ///
    /// Returns the division actually applied, or `None` if there is no such output.
    pub fn set_division(&mut self, output: usize, index: u8) -> Option<Division> {
        let division = Division::from_index(index);
        match self.outputs.get_mut(output) {
            Some(clock) => {
                clock.set_division(division);
                info!("Clock {} division set to {}", output + 1, division);
                Some(division)
            }
            None => {
                warn!("No clock output {} to set division on", output + 1);
                None
            }
        }
    }

    /// Handles a transport message.
    ///
    /// Start and Continue fire every output at once so the downbeat lines up; Stop pulls every output low
    /// immediately and forgets any progress towards the next pulse.
    pub fn transport(&mut self, event: Transport, now: Instant) {
        match event {
            Transport::Start | Transport::Continue => {
                self.running = true;
                self.all_mut().for_each(|clock| clock.fire(now));
            }
            Transport::Stop => {
                self.running = false;
                self.all_mut().for_each(|clock| {
                    clock.retract();
                    clock.ticks = 0;
                });
            }
        }
    }

    /// Handles one MIDI timing clock tick. Ignored while the transport is stopped.
    ///
    /// Returns `true` if any output fired.
    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.running {
            return false;
        }
        // every output must count the tick, so no short-circuiting
        self.all_mut().fold(false, |fired, clock| clock.tick(now) | fired)
    }

    /// Retracts every pulse that has outlived the pulse width. Meant to be called on every pass of the main loop.
    ///
    /// Returns `true` if any output went low.
    pub fn poll(&mut self, now: Instant) -> bool {
        let width = self.pulse_width;
        self.all_mut()
            .fold(false, |retracted, clock| clock.expire(now, width) | retracted)
    }

    fn all_mut(&mut self) -> impl Iterator<Item = &mut ClockOutput> {
        self.outputs
            .iter_mut()
            .chain(core::iter::once(&mut self.indicator))
    }
}

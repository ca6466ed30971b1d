//! This crate contains architecture-agnostic logic for a four-voice MIDI to [CV/gate](https://en.wikipedia.org/wiki/CV/gate)
//! converter with synchronized eurorack clock outputs. It translates [MIDI](https://midi.org/midi-1-0) messages into
//! 12-bit codes for a bank of MCP4822 <abbr name="digital-to-analog converter">DAC</abbr>s, gate/slide/accent levels,
//! and fixed-width clock pulses divided down from the incoming MIDI timing clock.
//!
//! Nothing in here touches a specific microcontroller: hardware is reached through [`embedded_hal`] traits and the
//! [`ControlVoltage`](dac::ControlVoltage) seam, and time is always passed in by the caller.

#![deny(missing_docs)]
#![cfg_attr(not(test), no_std)]

// must come first so the logging macros are visible to the modules below
#[macro_use]
mod fmt;

pub mod clock;
pub mod configuration;
pub mod dac;
pub mod engine;
pub mod midi;
pub mod quantizer;
pub mod voice;

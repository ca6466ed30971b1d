//! Digital outputs mirroring engine state: gates, articulation lines, clocks, and their indicator LEDs.

use embassy_stm32::gpio::Output;
use midi_cv_lib::{
    engine::{CLOCK_COUNT, Engine, Operation, VOICE_COUNT},
    voice::Articulation,
};

/// Every digital output line of the converter, owned in one place so a refresh happens under one lock.
pub struct Outputs {
    /// Gate per voice, in MIDI channel order.
    pub gates: [Output<'static>; VOICE_COUNT],
    /// Mirrors [`Self::gates`].
    pub gate_leds: [Output<'static>; VOICE_COUNT],
    /// Voice 1 only.
    pub slide: Output<'static>,
    /// Voice 1 only.
    pub accent: Output<'static>,
    /// Divided clock outputs.
    pub clocks: [Output<'static>; CLOCK_COUNT],
    /// Pulses on every quarter note while the transport runs.
    pub clock_led: Output<'static>,
    /// Lit while any note is held on any MIDI channel.
    pub activity_led: Output<'static>,
}

impl Outputs {
    /// Drives the pins belonging to each group named in `operation` from the engine's current state.
    pub fn refresh(&mut self, engine: &Engine, operation: Operation) {
        if operation.contains(Operation::NoteChange) {
            let voices = engine.voices();
            for ((voice, gate), led) in voices
                .iter()
                .zip(&mut self.gates)
                .zip(&mut self.gate_leds)
            {
                gate.set_level(voice.gate().into());
                led.set_level(voice.gate().into());
            }
            self.slide.set_level(voices[0].slide().into());
            self.accent.set_level(voices[0].accent().into());
            self.activity_led.set_level(engine.is_active().into());
        }

        if operation.contains(Operation::ClockChange) {
            let clock = engine.clock();
            for (output, pin) in clock.outputs().iter().zip(&mut self.clocks) {
                pin.set_level(output.is_high().into());
            }
            self.clock_led.set_level(clock.indicator().is_high().into());
        }
    }
}

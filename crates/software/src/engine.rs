//! The conversion engine: owns every voice and the clock divider, and routes MIDI messages to them.
//!
//! The engine only holds state. Converter writes go out through a [`ControlVoltage`] handed in by the caller, and
//! the caller reads gate/slide/accent/clock levels back afterwards, guided by the returned [`Operation`]. Time is
//! passed in as well, so the engine can be driven from a test as easily as from firmware.

use crate::{
    clock::{ClockDivider, Transport},
    configuration::{Division, Settings},
    dac::{self, ControlVoltage, CvWrite, DacSelect},
    midi, quantizer,
    voice::{Articulation, MonoVoice, SimpleVoice, Voice},
};
use bitmask_enum::bitmask;
use embassy_time::Instant;
use wmidi::{Channel, ControlFunction, MidiMessage, Note, U7, Velocity};

/// Number of voices, each listening on the MIDI channel of the same number.
pub const VOICE_COUNT: usize = 4;

/// Number of divided clock outputs on the stock hardware.
pub const CLOCK_COUNT: usize = 2;

/// Output groups which may have changed while handling a message.
#[bitmask(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Operation {
    /// Indicates a note was added or removed: gate, slide, accent or activity levels may differ.
    NoteChange,
    /// Indicates a clock output rose or fell.
    ClockChange,
}

/// State of the whole converter.
pub struct Engine<const N: usize = CLOCK_COUNT> {
    voices: [Voice; VOICE_COUNT],
    clock: ClockDivider<N>,
    /// Note-Ons not yet released across every MIDI channel, including those no voice listens on.
    activity: u8,
    settings: Settings,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(
            Settings::default(),
            [Division::SixteenthNote, Division::QuarterNote],
        )
    }
}

impl<const N: usize> Engine<N> {
    /// Constructs an idle engine with the transport stopped.
    pub fn new(settings: Settings, divisions: [Division; N]) -> Self {
        Self {
            voices: [
                MonoVoice::new(settings.accent_threshold).into(),
                SimpleVoice::new().into(),
                SimpleVoice::new().into(),
                SimpleVoice::new().into(),
            ],
            clock: ClockDivider::new(divisions, settings.pulse_width),
            activity: 0,
            settings,
        }
    }

    /// The voices, in MIDI channel order.
    pub fn voices(&self) -> &[Voice; VOICE_COUNT] {
        &self.voices
    }

    /// Getter.
    pub fn clock(&self) -> &ClockDivider<N> {
        &self.clock
    }

    /// Whether any note is held on any channel; drives the MIDI activity LED.
    pub fn is_active(&self) -> bool {
        self.activity > 0
    }

    /// See [`ClockDivider::set_division`].
    pub fn set_division(&mut self, output: usize, index: u8) -> Option<Division> {
        self.clock.set_division(output, index)
    }

    /// Handles every message in a buffer of USB-MIDI Event Packets. Returns the union of the [`Operation`]s performed.
    pub fn update<C: ControlVoltage>(&mut self, data: &[u8], now: Instant, cv: &mut C) -> Operation {
        midi::usb_midi_messages(data).fold(Operation::none(), |operation, msg| {
            operation | self.handle(msg, now, cv)
        })
    }

    /// Handles one MIDI message received at `now`.
    pub fn handle<C: ControlVoltage>(
        &mut self,
        msg: MidiMessage<'_>,
        now: Instant,
        cv: &mut C,
    ) -> Operation {
        match msg {
            // by convention, a NoteOn without velocity is a NoteOff
            MidiMessage::NoteOn(channel, note, velocity) if u8::from(velocity) == 0 => {
                self.note_off(channel, note, velocity, cv)
            }
            MidiMessage::NoteOn(channel, note, velocity) => self.note_on(channel, note, velocity, cv),
            MidiMessage::NoteOff(channel, note, velocity) => {
                self.note_off(channel, note, velocity, cv)
            }
            MidiMessage::ControlChange(channel, function, value) => {
                self.control_change(channel, function, value, cv)
            }
            MidiMessage::TimingClock => {
                if self.clock.tick(now) {
                    Operation::ClockChange
                } else {
                    Operation::none()
                }
            }
            MidiMessage::Start => self.transport(Transport::Start, now),
            MidiMessage::Continue => self.transport(Transport::Continue, now),
            MidiMessage::Stop => self.transport(Transport::Stop, now),
            _ => {
                debug!("Ignoring unsupported MIDI message");
                Operation::none()
            }
        }
    }

    /// Retires clock pulses which have run their course. Call once per pass of the main loop.
    pub fn poll(&mut self, now: Instant) -> Operation {
        if self.clock.poll(now) {
            Operation::ClockChange
        } else {
            Operation::none()
        }
    }

    fn voice_mut(&mut self, channel: Channel) -> Option<(&mut Voice, DacSelect)> {
        let index = usize::from(channel.index());
        self.voices
            .get_mut(index)
            .zip(DacSelect::ALL.get(index).copied())
    }

    fn note_on<C: ControlVoltage>(
        &mut self,
        channel: Channel,
        note: Note,
        velocity: Velocity,
        cv: &mut C,
    ) -> Operation {
        info!(
            "Received NoteOn: channel {}, note {}, velocity: {}",
            channel.number(),
            note.to_str(),
            u8::from(velocity)
        );
        self.activity = self.activity.saturating_add(1);

        if let Some((voice, dac)) = self.voice_mut(channel) {
            debug!(
                "Voicing {} at {} V",
                note.to_str(),
                quantizer::quantize(note).voltage().as_volts()
            );
            for write in voice.note_on(note, velocity) {
                cv.set_voltage(dac, write);
            }
        }
        Operation::NoteChange
    }

    fn note_off<C: ControlVoltage>(
        &mut self,
        channel: Channel,
        note: Note,
        velocity: Velocity,
        cv: &mut C,
    ) -> Operation {
        info!(
            "Received NoteOff: channel {}, note {}, velocity: {}",
            channel.number(),
            note.to_str(),
            u8::from(velocity)
        );
        self.activity = self.activity.saturating_sub(1);

        if let Some((voice, dac)) = self.voice_mut(channel) {
            for write in voice.note_off(note, velocity) {
                cv.set_voltage(dac, write);
            }
        }
        Operation::NoteChange
    }

    /// Routes the designated controller to voice 1's secondary CV, whatever channel it arrives on.
    fn control_change<C: ControlVoltage>(
        &mut self,
        channel: Channel,
        function: ControlFunction,
        value: U7,
        cv: &mut C,
    ) -> Operation {
        if function == self.settings.cv_controller {
            info!(
                "Received CV Control Change: channel {}, value: {}",
                channel.number(),
                u8::from(value)
            );
            cv.set_voltage(DacSelect::Dac1, CvWrite::secondary(dac::cv_code(value)));
        } else {
            info!(
                "Received unsupported Control Change {} on channel {}",
                u8::from(function.0),
                channel.number()
            );
        }
        Operation::none()
    }

    fn transport(&mut self, event: Transport, now: Instant) -> Operation {
        info!("Received transport {}", event);
        self.clock.transport(event, now);
        Operation::ClockChange
    }
}

//! Provides [`MonoVoice`], a monophonic voice which distinguishes legato from detached playing.

use super::{Articulation, CvWrites};
use crate::{dac::CvWrite, quantizer};
use tinyvec::array_vec;
use wmidi::{Note, Velocity};

/// Where a [`MonoVoice`] stands given how many notes are held.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// No notes held; gate is low.
    Idle,
    /// Exactly one note held.
    Held,
    /// A new note arrived before the previous one was released.
    Legato,
}

/// A monophonic voice modelled after bass-line sequencers.
///
/// Rather than remember which notes are down, the voice counts them. Every Note-On retunes the pitch CV, even
/// while another note is held, and raises the slide line so the attached synth glides instead of retriggering.
/// Slide drops as soon as at most one note remains; gate and accent drop with the last release.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MonoVoice {
    /// Count of Note-Ons not yet matched by a Note-Off; saturates at both ends.
    held: u8,
    slide: bool,
    accent: bool,
    /// Velocities strictly above this are accented.
    accent_threshold: Velocity,
}

impl MonoVoice {
    /// Constructs an idle [`MonoVoice`].
    pub fn new(accent_threshold: Velocity) -> Self {
        Self {
            held: 0,
            slide: false,
            accent: false,
            accent_threshold,
        }
    }

    /// Number of notes currently held.
    pub fn held(&self) -> u8 {
        self.held
    }

    /// Getter.
    pub fn phase(&self) -> Phase {
        match self.held {
            0 => Phase::Idle,
            1 => Phase::Held,
            _ => Phase::Legato,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MonoVoice {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "MonoVoice {{ held: {}, slide: {}, accent: {}, accent_threshold: {} }}",
            self.held,
            self.slide,
            self.accent,
            u8::from(self.accent_threshold)
        );
    }
}

impl Articulation for MonoVoice {
    fn note_on(&mut self, note: Note, velocity: Velocity) -> CvWrites {
        self.held = self.held.saturating_add(1);
        self.accent = velocity > self.accent_threshold;
        // a fresh first note leaves slide alone; only releases clear it
        if self.held > 1 {
            self.slide = true;
        }

        array_vec!([CvWrite; 2] => CvWrite::pitch(quantizer::pitch_code(note)))
    }

    fn note_off(&mut self, _note: Note, _velocity: Velocity) -> CvWrites {
        self.held = self.held.saturating_sub(1);
        if self.held <= 1 {
            self.slide = false;
        }
        if self.held == 0 {
            self.accent = false;
        }

        CvWrites::new()
    }

    fn gate(&self) -> bool {
        self.held > 0
    }

    fn slide(&self) -> bool {
        self.slide
    }

    fn accent(&self) -> bool {
        self.accent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantizer::VOLTAGE_TABLE;
    use wmidi::U7;

    const SOFT: Velocity = U7::from_u8_lossy(64);

    fn voice() -> MonoVoice {
        MonoVoice::new(U7::from_u8_lossy(80))
    }

    #[test]
    fn note_on_raises_gate_and_writes_pitch() {
        let mut voice = voice();
        let writes = voice.note_on(Note::C4, SOFT);

        assert!(voice.gate(), "Gate should be high");
        assert!(!voice.slide(), "A single note should not slide");
        assert_eq!(Phase::Held, voice.phase());
        assert_eq!(
            &[CvWrite::pitch(VOLTAGE_TABLE[48])][..],
            writes.as_slice(),
            "Expected left but got right"
        );
    }

    #[test]
    fn overlapping_notes_slide_until_one_remains() {
        let mut voice = voice();
        voice.note_on(Note::C4, SOFT);
        let writes = voice.note_on(Note::E4, SOFT);

        assert!(voice.gate());
        assert!(voice.slide(), "Second held note should slide");
        assert_eq!(Phase::Legato, voice.phase());
        // legato notes still retune
        assert_eq!(
            &[CvWrite::pitch(VOLTAGE_TABLE[52])][..],
            writes.as_slice(),
            "Expected left but got right"
        );

        let writes = voice.note_off(Note::C4, SOFT);
        assert!(voice.gate(), "One note remains held");
        assert!(!voice.slide(), "Slide should end with one note left");
        assert!(writes.is_empty(), "Releases don't touch the converter");
    }

    #[test]
    fn extra_release_does_not_underflow() {
        let mut voice = voice();
        voice.note_on(Note::C4, SOFT);
        voice.note_off(Note::C4, SOFT);
        voice.note_off(Note::C4, SOFT);

        assert_eq!(0, voice.held(), "Expected left but got right");
        assert!(!voice.gate(), "Gate should be low");
        assert_eq!(Phase::Idle, voice.phase());

        // the stray release mustn't leave a debt for the next note to pay off
        voice.note_on(Note::C4, SOFT);
        assert!(voice.gate());
        assert!(!voice.slide());
    }

    #[test]
    fn held_count_saturates() {
        let mut voice = voice();
        for _ in 0..300 {
            voice.note_on(Note::C4, SOFT);
        }
        assert_eq!(u8::MAX, voice.held(), "Expected left but got right");
        assert!(voice.slide());
    }

    #[test]
    fn accent_threshold_is_exclusive() {
        let mut voice = voice();
        voice.note_on(Note::C4, U7::from_u8_lossy(81));
        assert!(voice.accent(), "Velocity 81 should accent");

        voice.note_on(Note::D4, U7::from_u8_lossy(80));
        assert!(!voice.accent(), "Velocity 80 should not accent");
    }

    #[test]
    fn last_release_clears_accent() {
        let mut voice = voice();
        voice.note_on(Note::C4, U7::from_u8_lossy(127));
        voice.note_on(Note::E4, U7::from_u8_lossy(127));

        voice.note_off(Note::E4, SOFT);
        assert!(voice.accent(), "Accent holds while a note is down");

        voice.note_off(Note::C4, SOFT);
        assert!(!voice.accent(), "Accent should drop with the gate");
        assert!(!voice.gate());
    }
}

//! Provides [`SimpleVoice`], a voice which only follows the latest Note-On and Note-Off.

use super::{Articulation, CvWrites};
use crate::{
    dac::{self, CvWrite},
    quantizer,
};
use tinyvec::array_vec;
use wmidi::{Note, Velocity};

/// A voice with one gate and two CVs: pitch and velocity.
///
/// Overlap isn't tracked; each Note-Off closes the gate and zeroes the velocity CV regardless of what else is held.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SimpleVoice {
    gate: bool,
}

impl SimpleVoice {
    /// Constructs an idle [`SimpleVoice`].
    pub fn new() -> Self {
        Self::default()
    }
}

impl Articulation for SimpleVoice {
    fn note_on(&mut self, note: Note, velocity: Velocity) -> CvWrites {
        self.gate = true;
        array_vec!([CvWrite; 2] =>
            CvWrite::pitch(quantizer::pitch_code(note)),
            CvWrite::secondary(dac::cv_code(velocity))
        )
    }

    fn note_off(&mut self, _note: Note, _velocity: Velocity) -> CvWrites {
        self.gate = false;
        array_vec!([CvWrite; 2] => CvWrite::secondary(0))
    }

    fn gate(&self) -> bool {
        self.gate
    }
}

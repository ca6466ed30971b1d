//! Per-channel note tracking. Each [`Voice`] turns Note-On/Note-Off events into gate, slide and accent levels plus
//! the converter writes those events call for.
//!
//! Voice 1 is a monophonic bass-line style voice with legato and accent articulation ([`MonoVoice`]); voices 2-4
//! are plain gate + two-CV voices ([`SimpleVoice`]).

mod mono;
pub use mono::*;

mod simple;
pub use simple::*;

use crate::dac::CvWrite;
use enum_dispatch::enum_dispatch;
use tinyvec::ArrayVec;
use wmidi::{Note, Velocity};

/// The converter writes resulting from one note event, in the order they should be sent.
pub type CvWrites = ArrayVec<[CvWrite; 2]>;

/// A trait for tracking the notes held on one channel and deriving its digital output levels.
#[enum_dispatch]
pub trait Articulation {
    /// Registers a Note-On. Returns the writes needed to voice it.
    fn note_on(&mut self, note: Note, velocity: Velocity) -> CvWrites;

    /// Registers a Note-Off. Returns the writes needed to silence it, if any.
    fn note_off(&mut self, note: Note, velocity: Velocity) -> CvWrites;

    /// Whether the gate line should be high.
    fn gate(&self) -> bool;

    /// Whether the slide line should be high. Only articulated voices have one.
    fn slide(&self) -> bool {
        false
    }

    /// Whether the accent line should be high. Only articulated voices have one.
    fn accent(&self) -> bool {
        false
    }
}

/// One of the converter's four voices.
#[enum_dispatch(Articulation)]
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Voice {
    /// Voice with legato and accent articulation.
    Mono(MonoVoice),
    /// Voice with a gate and a velocity CV.
    Simple(SimpleVoice),
}

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

/// MIDI timing clock resolution: pulses per quarter note.
pub const PPQN: u16 = 24;

/// Determines how many incoming MIDI clock ticks make up one pulse on a clock output, expressed as a musical
/// duration.
///
/// The variants are ordered; their discriminant is the "division index" exposed to the performer.
#[derive(Debug, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Division {
    /// One pulse per 16th note, the usual eurorack sequencer clock.
    SixteenthNote,
    /// One pulse per 8th note.
    EighthNote,
    /// One pulse per beat.
    QuarterNote,
    /// One pulse every two beats.
    HalfNote,
    /// One pulse per bar of 4/4.
    Bar,
    /// One pulse every two bars.
    TwoBars,
    /// One pulse every four bars.
    FourBars,
    /// One pulse every eight bars.
    EightBars,
}

impl Division {
    /// The longest division; out-of-range indices clamp to this.
    pub const LAST: Self = Self::EightBars;

    /// Looks up a division by index, clamping anything past the end of the table.
    pub fn from_index(index: u8) -> Self {
        Self::from_u8(index).unwrap_or(Self::LAST)
    }

    /// Position of this division in the table.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Number of MIDI clock ticks per pulse.
    pub fn ticks(self) -> u16 {
        match self {
            Self::SixteenthNote => PPQN / 4,
            Self::EighthNote => PPQN / 2,
            Self::QuarterNote => PPQN,
            Self::HalfNote => PPQN * 2,
            Self::Bar => PPQN * 4,
            Self::TwoBars => PPQN * 8,
            Self::FourBars => PPQN * 16,
            Self::EightBars => PPQN * 32,
        }
    }
}

impl super::CycleConfig for Division {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::CycleConfig;

    #[test]
    fn ticks_per_division() {
        let ticks: [u16; 8] = core::array::from_fn(|i| Division::from_index(i as u8).ticks());
        assert_eq!(
            [6_u16, 12, 24, 48, 96, 192, 384, 768],
            ticks,
            "Expected left but got right"
        );
    }

    #[test]
    fn out_of_range_index_clamps() {
        assert_eq!(Division::EightBars, Division::from_index(8));
        assert_eq!(Division::EightBars, Division::from_index(u8::MAX));
    }

    #[test]
    fn index_round_trips() {
        assert_eq!(2, Division::QuarterNote.index());
        assert_eq!(Division::QuarterNote, Division::from_index(2));
    }

    #[test]
    fn cycling_wraps_to_sixteenth() {
        assert_eq!(Division::SixteenthNote, Division::EightBars.cycle());
        assert_eq!(Division::EighthNote, Division::SixteenthNote.cycle());
    }
}

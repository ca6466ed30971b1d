//! Converts MIDI notes into the 12-bit <abbr name="digital-to-analog converter">DAC</abbr> codes that produce a
//! 1 V/octave pitch CV.
//!
//! The converter spans ten octaves, from C0 (MIDI note 12, 0 V) to C10. Pitches outside of that range are pinned to
//! the nearest end of the table rather than wrapped.

use measurements::Voltage;
use wmidi::Note;

/// MIDI note number which corresponds to 0 V (C0).
pub const REFERENCE_NOTE: u8 = 12;

/// The highest semitone index, ten octaves above [`REFERENCE_NOTE`].
pub const MAX_SEMITONE: u8 = 120;

/// Full scale of the 12-bit converter.
pub const MAX_CODE: u16 = 4095;

const TABLE_LEN: usize = MAX_SEMITONE as usize + 1;

/// DAC code for each semitone above [`REFERENCE_NOTE`].
///
/// Ten octaves are spread evenly across the converter's 12-bit range; the output stage following the converter
/// scales full range up to 10 V.
pub static VOLTAGE_TABLE: [u16; TABLE_LEN] = build_table();

const fn build_table() -> [u16; TABLE_LEN] {
    let mut table = [0; TABLE_LEN];
    let mut i = 0;
    while i < TABLE_LEN {
        // i * 4095 / 120, rounding halves up
        let scaled = i as u32 * MAX_CODE as u32 * 2 + MAX_SEMITONE as u32;
        table[i] = (scaled / (MAX_SEMITONE as u32 * 2)) as u16;
        i += 1;
    }
    table
}

/// A semitone index into the [`VOLTAGE_TABLE`]; always within `0..=120`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Semitone(u8);

impl Semitone {
    /// Position in the [`VOLTAGE_TABLE`].
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// The DAC code which voices this semitone.
    pub fn code(self) -> u16 {
        VOLTAGE_TABLE[self.index()]
    }

    /// Nominal pitch voltage at the output jack.
    pub fn voltage(self) -> Voltage {
        Voltage::from_volts(f64::from(self.0) / 12.0)
    }
}

/// Maps a raw pitch onto the table's domain.
///
/// Pitches below [`REFERENCE_NOTE`] collapse to 0; pitches more than ten octaves above it collapse to 120.
pub fn quantize_pitch(pitch: u8) -> Semitone {
    Semitone(pitch.saturating_sub(REFERENCE_NOTE).min(MAX_SEMITONE))
}

/// Maps a [`Note`] onto the table's domain. See [`quantize_pitch`].
pub fn quantize(note: Note) -> Semitone {
    quantize_pitch(u8::from(note))
}

/// Shorthand for the DAC code of a [`Note`]'s quantized semitone.
pub fn pitch_code(note: Note) -> u16 {
    quantize(note).code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wmidi::U7;

    #[test]
    fn table_matches_shipped_values() {
        let first_octave: [u16; 13] = [0, 34, 68, 102, 137, 171, 205, 239, 273, 307, 341, 375, 410];
        assert_eq!(
            first_octave[..],
            VOLTAGE_TABLE[..13],
            "Expected left but got right"
        );
        assert_eq!(2048, VOLTAGE_TABLE[60], "Expected left but got right");
        assert_eq!(2867, VOLTAGE_TABLE[84], "Expected left but got right");
        assert_eq!(4061, VOLTAGE_TABLE[119], "Expected left but got right");
        assert_eq!(MAX_CODE, VOLTAGE_TABLE[120], "Expected left but got right");
    }

    #[test]
    fn table_is_monotonic() {
        assert!(VOLTAGE_TABLE.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn low_pitches_clamp_to_zero() {
        for pitch in 0..REFERENCE_NOTE {
            assert_eq!(
                0,
                quantize_pitch(pitch).index(),
                "Pitch {} should not wrap to the top of the table",
                pitch
            );
        }
    }

    #[test]
    fn high_pitches_clamp_to_top() {
        for pitch in 133..=u8::MAX {
            assert_eq!(120, quantize_pitch(pitch).index(), "Pitch {}", pitch);
        }
    }

    #[test]
    fn in_range_pitches_are_non_decreasing() {
        let mut previous = quantize_pitch(12);
        for pitch in 12..=132 {
            let current = quantize_pitch(pitch);
            assert!(current >= previous, "Pitch {} went backwards", pitch);
            assert!(current.index() <= 120);
            previous = current;
        }
    }

    #[test]
    fn note_to_code() {
        let middle_c = Note::from(U7::from_u8_lossy(60));
        assert_eq!(48, quantize(middle_c).index(), "Expected left but got right");
        assert_eq!(
            VOLTAGE_TABLE[48],
            pitch_code(middle_c),
            "Expected left but got right"
        );
        assert_eq!(0, pitch_code(Note::from(U7::from_u8_lossy(0))));
    }

    #[test]
    fn voltage_is_one_volt_per_octave() {
        assert_eq!(4.0, quantize_pitch(60).voltage().as_volts());
        assert_eq!(0.0, quantize_pitch(12).voltage().as_volts());
    }
}

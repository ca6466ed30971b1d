//! This module contains both user-configurable settings (implemented as enums) and traits to make them easier to work with in code.

mod division;
pub use division::*;

use embassy_time::Duration;
use num_traits::{FromPrimitive, ToPrimitive};
use wmidi::{ControlFunction, U7, Velocity};

/// A trait which allows infinite cycling of an enum's variants.
///
/// Useful for pushbutton user interfaces, allowing presses to advance from the current to the next variant,
/// cycling back to the beginning when all variants have been exhausted.
pub trait CycleConfig {
    /// Return the next variant, cycling back to the beginning as needed.
    fn cycle(self) -> Self
    where
        Self: FromPrimitive + ToPrimitive + Sized,
    {
        let index = self
            .to_u8()
            .expect("enum variants should be castable to u8");
        match <Self as FromPrimitive>::from_u8(index + 1) {
            Some(new_selection) => new_selection,
            None => FromPrimitive::from_u8(0).expect("enum should not be empty"),
        }
    }
}

/// Fixed behavior of the converter. None of these are exposed to the performer at present.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Settings {
    /// Note-On velocities strictly above this raise the accent line of the primary voice.
    pub accent_threshold: Velocity,
    /// The controller whose value is routed to the primary voice's secondary CV.
    pub cv_controller: ControlFunction,
    /// How long each clock pulse stays high.
    pub pulse_width: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            accent_threshold: U7::from_u8_lossy(80),
            // CC 70
            cv_controller: ControlFunction::SOUND_CONTROLLER_1,
            pulse_width: Duration::from_millis(10),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Settings {
    fn format(&self, fmt: defmt::Formatter) {
        let Settings {
            accent_threshold,
            cv_controller,
            pulse_width,
        } = *self;
        defmt::write!(
            fmt,
            "Settings {{ accent_threshold: {}, cv_controller: {}, pulse_width: {} }}",
            u8::from(accent_threshold),
            u8::from(cv_controller.0),
            pulse_width
        );
    }
}

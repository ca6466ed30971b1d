//! Drives a bank of four MCP4822 dual 12-bit <abbr name="digital-to-analog converter">DAC</abbr>s sharing one SPI
//! bus, each with its own chip-select line.
//!
//! Every voice owns one converter: channel A carries pitch, channel B a secondary CV (velocity or a controller). The
//! link is open loop. The MCP4822 has no readback, so a write that the bus accepted is assumed to have landed.

use crate::quantizer::MAX_CODE;
use embedded_hal::{digital::OutputPin, spi::SpiBus};
use wmidi::U7;

/// Selects channel B; channel A leaves the bit clear.
const CHANNEL_B: u16 = 0x8000;
/// Output gain select bit, always set.
const GAIN: u16 = 0x2000;
/// Keeps the selected channel's output active.
const ACTIVE: u16 = 0x1000;
const CODE_MASK: u16 = 0x0FFF;

/// One of the two outputs of an MCP4822.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DacChannel {
    /// Pitch CV.
    #[default]
    A,
    /// Secondary CV.
    B,
}

/// Addresses one converter in the bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DacSelect {
    /// Converter for voice 1 (MIDI channel 1).
    Dac1,
    /// Converter for voice 2 (MIDI channel 2).
    Dac2,
    /// Converter for voice 3 (MIDI channel 3).
    Dac3,
    /// Converter for voice 4 (MIDI channel 4).
    Dac4,
}

impl DacSelect {
    /// Every converter, in chip-select order.
    pub const ALL: [Self; 4] = [Self::Dac1, Self::Dac2, Self::Dac3, Self::Dac4];

    /// Position of this converter's chip select in the bank.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A pending write to one channel of a converter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CvWrite {
    /// Which output to update.
    pub channel: DacChannel,
    /// 12-bit magnitude; higher bits are discarded when encoded.
    pub code: u16,
}

impl CvWrite {
    /// A write to the pitch output.
    pub fn pitch(code: u16) -> Self {
        Self {
            channel: DacChannel::A,
            code,
        }
    }

    /// A write to the secondary output.
    pub fn secondary(code: u16) -> Self {
        Self {
            channel: DacChannel::B,
            code,
        }
    }
}

/// A 16-bit MCP4822 write command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Command(u16);

impl Command {
    /// Encodes a write of `code` to `channel`.
    pub fn new(channel: DacChannel, code: u16) -> Self {
        let select = match channel {
            DacChannel::A => 0,
            DacChannel::B => CHANNEL_B,
        };
        Self(select | GAIN | ACTIVE | (code & CODE_MASK))
    }

    /// The raw command word.
    pub fn word(self) -> u16 {
        self.0
    }

    /// The command as it goes out on the wire: high byte first.
    pub fn bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl From<CvWrite> for Command {
    fn from(write: CvWrite) -> Self {
        Self::new(write.channel, write.code)
    }
}

/// Scales a 7-bit MIDI value (velocity, controller) across the converter's full range.
pub fn cv_code(value: U7) -> u16 {
    (u32::from(u8::from(value)) * u32::from(MAX_CODE) / 127) as u16
}

/// Errors reported by the bus or a chip-select line during a transaction.
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DacError<B, P> {
    /// The SPI transfer failed.
    Bus(B),
    /// A chip-select line could not be driven.
    ChipSelect(P),
}

/// Four MCP4822s on a shared SPI bus.
///
/// The bus must be configured for mode 0, most significant bit first, at no more than 20 MHz.
pub struct Mcp4822Bank<SPI, CS> {
    spi: SPI,
    chip_selects: [CS; 4],
}

impl<SPI: SpiBus, CS: OutputPin> Mcp4822Bank<SPI, CS> {
    /// Takes ownership of the bus and chip selects, releasing every chip select so all converters start idle.
    pub fn new(spi: SPI, mut chip_selects: [CS; 4]) -> Result<Self, DacError<SPI::Error, CS::Error>> {
        for cs in chip_selects.iter_mut() {
            cs.set_high().map_err(DacError::ChipSelect)?;
        }
        Ok(Self { spi, chip_selects })
    }

    /// Writes `code` to `channel` of the selected converter.
    ///
    /// The chip select is asserted for exactly the two bytes of the command and is released even when the transfer
    /// fails, so one bad write can't wedge the next.
    pub fn send(
        &mut self,
        dac: DacSelect,
        channel: DacChannel,
        code: u16,
    ) -> Result<(), DacError<SPI::Error, CS::Error>> {
        let command = Command::new(channel, code);
        let cs = &mut self.chip_selects[dac.index()];

        cs.set_low().map_err(DacError::ChipSelect)?;
        let transfer = self
            .spi
            .write(&command.bytes())
            .and_then(|_| self.spi.flush());
        cs.set_high().map_err(DacError::ChipSelect)?;

        transfer.map_err(DacError::Bus)
    }
}

/// A trait for putting voltages on a voice's converter.
///
/// This is the seam between the engine, which only decides what each output should read, and the hardware. There is
/// no failure path: implementations log problems and carry on.
pub trait ControlVoltage {
    /// Applies a single write to the given converter.
    fn set_voltage(&mut self, dac: DacSelect, write: CvWrite);
}

impl<SPI: SpiBus, CS: OutputPin> ControlVoltage for Mcp4822Bank<SPI, CS> {
    fn set_voltage(&mut self, dac: DacSelect, write: CvWrite) {
        trace!("Sending {} to {}", Command::from(write), dac);
        if self.send(dac, write.channel, write.code).is_err() {
            warn!("Write to {} channel {} failed", dac, write.channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::{cell::RefCell, convert::Infallible};
    use embedded_hal::{digital, spi};

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum BusOp {
        Select(usize),
        Release(usize),
        Write(u8),
        Flush,
    }

    type Log = RefCell<Vec<BusOp>>;

    struct MockSpi<'a> {
        log: &'a Log,
        fail: bool,
    }

    impl spi::ErrorType for MockSpi<'_> {
        type Error = spi::ErrorKind;
    }

    impl SpiBus for MockSpi<'_> {
        fn read(&mut self, _words: &mut [u8]) -> Result<(), Self::Error> {
            Ok(())
        }

        fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
            if self.fail {
                return Err(spi::ErrorKind::Other);
            }
            self.log
                .borrow_mut()
                .extend(words.iter().map(|&w| BusOp::Write(w)));
            Ok(())
        }

        fn transfer(&mut self, _read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
            self.write(write)
        }

        fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
            self.write(words)
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            self.log.borrow_mut().push(BusOp::Flush);
            Ok(())
        }
    }

    struct MockPin<'a> {
        id: usize,
        log: &'a Log,
    }

    impl digital::ErrorType for MockPin<'_> {
        type Error = Infallible;
    }

    impl OutputPin for MockPin<'_> {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.log.borrow_mut().push(BusOp::Select(self.id));
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.log.borrow_mut().push(BusOp::Release(self.id));
            Ok(())
        }
    }

    fn bank(log: &Log, fail: bool) -> Mcp4822Bank<MockSpi<'_>, MockPin<'_>> {
        let pins = [0, 1, 2, 3].map(|id| MockPin { id, log });
        let bank = Mcp4822Bank::new(MockSpi { log, fail }, pins).unwrap();
        log.borrow_mut().clear();
        bank
    }

    #[test]
    fn encodes_channel_a_zero() {
        assert_eq!(
            0x3000,
            Command::new(DacChannel::A, 0).word(),
            "Expected left but got right"
        );
    }

    #[test]
    fn encodes_channel_b_full_scale() {
        assert_eq!(
            0xBFFF,
            Command::new(DacChannel::B, 4095).word(),
            "Expected left but got right"
        );
    }

    #[test]
    fn discards_bits_above_twelve() {
        assert_eq!(
            Command::new(DacChannel::A, 0x0123),
            Command::new(DacChannel::A, 0xF123),
            "Expected left but got right"
        );
    }

    #[test]
    fn bytes_are_high_first() {
        assert_eq!([0x3A_u8, 0xBC], Command::new(DacChannel::A, 0xABC).bytes());
    }

    #[test]
    fn scales_seven_bit_values() {
        assert_eq!(0, cv_code(U7::from_u8_lossy(0)));
        assert_eq!(4095, cv_code(U7::from_u8_lossy(127)));
        assert_eq!(2031, cv_code(U7::from_u8_lossy(63)));
    }

    #[test]
    fn new_releases_every_chip_select() {
        let log = Log::default();
        let pins = [0, 1, 2, 3].map(|id| MockPin { id, log: &log });
        let _bank = Mcp4822Bank::new(
            MockSpi {
                log: &log,
                fail: false,
            },
            pins,
        )
        .unwrap();

        assert_eq!(
            vec![
                BusOp::Release(0),
                BusOp::Release(1),
                BusOp::Release(2),
                BusOp::Release(3)
            ],
            *log.borrow(),
            "Expected left but got right"
        );
    }

    #[test]
    fn send_frames_two_bytes_in_chip_select() {
        let log = Log::default();
        let mut bank = bank(&log, false);

        bank.send(DacSelect::Dac2, DacChannel::B, 4095).unwrap();

        assert_eq!(
            vec![
                BusOp::Select(1),
                BusOp::Write(0xBF),
                BusOp::Write(0xFF),
                BusOp::Flush,
                BusOp::Release(1)
            ],
            *log.borrow(),
            "Expected left but got right"
        );
    }

    #[test]
    fn failed_transfer_still_releases_chip_select() {
        let log = Log::default();
        let mut bank = bank(&log, true);

        let result = bank.send(DacSelect::Dac4, DacChannel::A, 0);

        assert_eq!(Err(DacError::Bus(spi::ErrorKind::Other)), result);
        assert_eq!(
            vec![BusOp::Select(3), BusOp::Release(3)],
            *log.borrow(),
            "Expected left but got right"
        );
    }

    #[test]
    fn control_voltage_swallows_bus_errors() {
        let log = Log::default();
        let mut bank = bank(&log, true);

        // no write verification: the failure is logged, not surfaced
        bank.set_voltage(DacSelect::Dac1, CvWrite::pitch(2048));

        assert_eq!(vec![BusOp::Select(0), BusOp::Release(0)], *log.borrow());
    }

    #[test]
    fn control_voltage_writes_through() {
        let log = Log::default();
        let mut bank = bank(&log, false);

        bank.set_voltage(DacSelect::Dac3, CvWrite::pitch(2048));

        assert_eq!(
            vec![
                BusOp::Select(2),
                BusOp::Write(0x38),
                BusOp::Write(0x00),
                BusOp::Flush,
                BusOp::Release(2)
            ],
            *log.borrow(),
            "Expected left but got right"
        );
    }
}

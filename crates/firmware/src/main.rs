//! MIDI-CV is [Embassy](https://embassy.dev)-based firmware for a four-voice MIDI to
//! [CV/gate](https://en.wikipedia.org/wiki/CV/gate) converter with two divided clock outputs. The firmware runs on the
//! [Nucleo-F767ZI development board](https://www.st.com/en/evaluation-tools/nucleo-f767zi.html), which is powered by
//! an F7-series STM32 microcontroller.
//!
//! MIDI arrives over USB. MIDI channels 1 through 4 each drive one voice: a pitch CV and a secondary CV from one
//! MCP4822 dual DAC, plus a gate. Voice 1 also has slide and accent outputs for bass-line synthesizers, and its
//! secondary CV follows controller 70 instead of velocity. The MIDI timing clock is divided down to two
//! eurorack-style clock outputs whose divisions are selected with pushbuttons.
//!
//! For the pin assignments, see [`main`].

#![no_std]
#![no_main]

mod outputs;

use crate::outputs::Outputs;
use defmt::{panic, *};
use embassy_executor::Spawner;
use embassy_stm32::{
    Config, bind_interrupts,
    exti::ExtiInput,
    gpio::{Level, Output, Pull, Speed},
    mode::Blocking,
    peripherals,
    spi::{self, Spi},
    time::Hertz,
    usb,
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex};
use embassy_time::{Duration, Instant, Ticker, Timer};
use embassy_usb::{Builder, UsbDevice, class::midi::MidiClass, driver::EndpointError};
use midi_cv_lib::{configuration::CycleConfig, dac::Mcp4822Bank, engine::Engine};
use static_cell::StaticCell;

use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(
    #[doc(hidden)]
    struct Irqs {
        OTG_FS => usb::InterruptHandler<peripherals::USB_OTG_FS>;
    }
);

type UsbDriver = usb::Driver<'static, peripherals::USB_OTG_FS>;
type DacBank = Mcp4822Bank<Spi<'static, Blocking>, Output<'static>>;
type RigMutex = mutex::Mutex<CriticalSectionRawMutex, Rig>;

/// The engine together with every peripheral it drives, so a single lock covers a whole update.
struct Rig {
    engine: Engine,
    dacs: DacBank,
    outputs: Outputs,
}

impl Rig {
    fn update(&mut self, data: &[u8]) {
        let operation = self.engine.update(data, Instant::now(), &mut self.dacs);
        self.outputs.refresh(&self.engine, operation);
    }

    fn poll(&mut self) {
        let operation = self.engine.poll(Instant::now());
        self.outputs.refresh(&self.engine, operation);
    }
}

/// Pin assignments:
///
/// | Function                   | Pins                        |
/// |----------------------------|-----------------------------|
/// | SPI SCK / MOSI             | PA5 / PB5                   |
/// | DAC 1–4 chip select        | PD14, PD15, PF12, PF13      |
/// | Gate 1–4                   | PE9, PE11, PE13, PF14       |
/// | Gate LED 1–4               | PE14, PE15, PF15, PG14      |
/// | Slide / accent             | PG9 / PG10                  |
/// | Clock 1 / 2                | PE12 / PE10                 |
/// | Clock LED (blue)           | PB7                         |
/// | MIDI activity LED (green)  | PB0                         |
/// | Clock 1 button / LED (red) | PD1 / PB14                  |
/// | Clock 2 button / LED       | PC13 (user button) / PG3    |
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Initializing MIDI-CV");

    let mut config = Config::default();
    {
        use embassy_stm32::rcc::*;
        // hse: high-speed external clock
        config.rcc.hse = Some(Hse {
            freq: Hertz(8_000_000),
            mode: HseMode::Bypass,
        });

        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL216,
            divp: Some(PllPDiv::DIV2), // 8mhz / 4 * 216 / 2 = 216Mhz
            // USB OTG FS takes its 48MHz from the PLLQ output rather than from a bus clock
            divq: Some(PllQDiv::DIV9), // 8mhz / 4 * 216 / 9 = 48Mhz
            divr: None,
        });
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2; // SPI1 runs off APB2 at 108Mhz
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.mux.clk48sel = mux::Clk48sel::PLL1_Q;
    }
    let p = embassy_stm32::init(config);

    // MCP4822s accept mode 0 up to 20MHz
    let mut spi_config = spi::Config::default();
    spi_config.frequency = Hertz(8_000_000);
    spi_config.mode = spi::MODE_0;
    spi_config.bit_order = spi::BitOrder::MsbFirst;
    let spi = Spi::new_blocking_txonly(p.SPI1, p.PA5, p.PB5, spi_config);

    let chip_selects = [
        Output::new(p.PD14, Level::High, Speed::VeryHigh),
        Output::new(p.PD15, Level::High, Speed::VeryHigh),
        Output::new(p.PF12, Level::High, Speed::VeryHigh),
        Output::new(p.PF13, Level::High, Speed::VeryHigh),
    ];
    let dacs = unwrap!(Mcp4822Bank::new(spi, chip_selects));

    let outputs = Outputs {
        gates: [
            Output::new(p.PE9, Level::Low, Speed::Low),
            Output::new(p.PE11, Level::Low, Speed::Low),
            Output::new(p.PE13, Level::Low, Speed::Low),
            Output::new(p.PF14, Level::Low, Speed::Low),
        ],
        gate_leds: [
            Output::new(p.PE14, Level::Low, Speed::Low),
            Output::new(p.PE15, Level::Low, Speed::Low),
            Output::new(p.PF15, Level::Low, Speed::Low),
            Output::new(p.PG14, Level::Low, Speed::Low),
        ],
        slide: Output::new(p.PG9, Level::Low, Speed::Low),
        accent: Output::new(p.PG10, Level::Low, Speed::Low),
        clocks: [
            Output::new(p.PE12, Level::Low, Speed::Low),
            Output::new(p.PE10, Level::Low, Speed::Low),
        ],
        clock_led: Output::new(p.PB7, Level::Low, Speed::Low),
        activity_led: Output::new(p.PB0, Level::Low, Speed::Low),
    };

    static RIG: StaticCell<RigMutex> = StaticCell::new();
    let rig = RIG.init(mutex::Mutex::new(Rig {
        engine: Engine::default(),
        dacs,
        outputs,
    }));

    let button = ExtiInput::new(p.PD1, p.EXTI1, Pull::Up);
    unwrap!(spawner.spawn(division_input_task(button, 0, rig)));
    let button = ExtiInput::new(p.PC13, p.EXTI13, Pull::None);
    unwrap!(spawner.spawn(division_input_task(button, 1, rig)));

    let red_led = Output::new(p.PB14, Level::Low, Speed::Low);
    unwrap!(spawner.spawn(division_display_task(red_led, 0, rig)));
    let led = Output::new(p.PG3, Level::Low, Speed::Low);
    unwrap!(spawner.spawn(division_display_task(led, 1, rig)));

    // Create the driver, from the HAL.
    static ENDPOINT_OUT_BUFFER: StaticCell<[u8; 256]> = StaticCell::new();
    let mut config = embassy_stm32::usb::Config::default();

    // USB devices which are self-powered (i.e., that can stay powered on if unplugged from the host)
    // need to enable vbus_detection. Per section 6.10 of the Nucleo board manual (UM1974), CN13
    // (the USB port) cannot power the board; external power is necessary.
    config.vbus_detection = true;

    let driver = usb::Driver::new_fs(
        p.USB_OTG_FS,
        Irqs,
        p.PA12,
        p.PA11,
        ENDPOINT_OUT_BUFFER.init([0; 256]),
        config,
    );

    // per https://pid.codes, FOSS projects can apply to be listed under the vendor ID owned by InterBiometrics
    let vendor_id = 0x1209;
    let product_id = 0x4822;

    let mut config = embassy_usb::Config::new(vendor_id, product_id);
    config.manufacturer = Some("Pawpaw Works");
    config.product = Some("MIDI-CV");
    config.self_powered = true;
    config.max_power = 0;

    static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static CONTROL_BUFFER: StaticCell<[u8; 64]> = StaticCell::new();

    let mut builder = Builder::new(
        driver,
        config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        &mut [], // no msos descriptors
        CONTROL_BUFFER.init([0; 64]),
    );

    let class = MidiClass::new(&mut builder, 0, 1, 64);
    let usb = builder.build();

    unwrap!(spawner.spawn(usb_task(usb)));
    unwrap!(spawner.spawn(midi_task(class, rig)));
    unwrap!(spawner.spawn(pulse_task(rig)));
}

/// Retires clock pulses once they have been high for the pulse width.
///
/// Runs independently of MIDI input so pulses end on time even when no more messages arrive.
#[embassy_executor::task]
async fn pulse_task(rig: &'static RigMutex) -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(1));
    loop {
        rig.lock().await.poll();
        ticker.next().await;
    }
}

/// Handles button presses, cycling through the divisions of one clock output.
#[embassy_executor::task(pool_size = 2)]
async fn division_input_task(
    mut button: ExtiInput<'static>,
    output: usize,
    rig: &'static RigMutex,
) -> ! {
    loop {
        button.wait_for_rising_edge().await;
        let mut rig = rig.lock().await;
        if let Some(division) = rig.engine.clock().division(output) {
            rig.engine.set_division(output, division.cycle().index());
        }
    }
}

/// Status indicator for the division of one clock output.
///
/// Each cycle is divided in half. The LED remains dark for one half. For the other, the LED lights up N times,
/// where N is one more than the index of the selected division (one blink for sixteenth notes, eight for eight bars).
#[embassy_executor::task(pool_size = 2)]
async fn division_display_task(
    mut led: Output<'static>,
    output: usize,
    rig: &'static RigMutex,
) -> ! {
    const BLINK_SLEEP_MS: u64 = 1_000;

    loop {
        led.set_low();
        Timer::after_millis(BLINK_SLEEP_MS).await;

        let blink_cnt = rig
            .lock()
            .await
            .engine
            .clock()
            .division(output)
            .map_or(1, |division| division.index().saturating_add(1));
        // mult by two to account for the "off" periods, sub 1 so the LED always starts and ends lit
        let animation_frames = blink_cnt * 2 - 1;
        for _ in 0..animation_frames {
            led.toggle();
            Timer::after_millis(BLINK_SLEEP_MS / u64::from(animation_frames)).await;
        }
    }
}

#[embassy_executor::task]
async fn usb_task(mut usb: UsbDevice<'static, UsbDriver>) -> ! {
    usb.run().await
}

#[embassy_executor::task]
async fn midi_task(mut class: MidiClass<'static, UsbDriver>, rig: &'static RigMutex) -> ! {
    loop {
        class.wait_connection().await;
        info!("USB connected");
        let _ = process_midi(&mut class, rig).await;
        info!("USB disconnected");
    }
}

#[doc(hidden)]
struct Disconnected {}

impl From<EndpointError> for Disconnected {
    fn from(val: EndpointError) -> Self {
        match val {
            EndpointError::BufferOverflow => panic!("Buffer overflow"),
            EndpointError::Disabled => Disconnected {},
        }
    }
}

/// Helper function which interprets data received over USB.
///
/// Each packet is handled to completion, DAC writes included, before the next one is read.
async fn process_midi<'d, T: usb::Instance + 'd>(
    class: &mut MidiClass<'d, usb::Driver<'d, T>>,
    rig: &'static RigMutex,
) -> Result<(), Disconnected> {
    let mut buf = [0; 64];
    loop {
        let n = class.read_packet(&mut buf).await?;
        rig.lock().await.update(&buf[..n]);
    }
}

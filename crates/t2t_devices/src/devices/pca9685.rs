use std::time::Duration;

use embedded_hal::{delay::DelayNs, i2c::I2c};
use serde::Deserialize;
use t2t_core::{error::T2tBuildError, Actuator, ActuatorBuilder};
use tracing::{debug, info, warn};

use crate::{
    bus::{BusAddress, BusTransport, Register},
    error::{DeviceError, DeviceResult},
};

pub const MODE1: Register = Register(0x00);
pub const MODE2: Register = Register(0x01);
pub const LED0_ON_L: Register = Register(0x06);
pub const ALL_LED_ON_L: Register = Register(0xFA);
pub const PRE_SCALE: Register = Register(0xFE);

pub const MODE1_RESTART: u8 = 0x80;
pub const MODE1_EXTCLK: u8 = 0x40;
pub const MODE1_AI: u8 = 0x20;
pub const MODE1_SLEEP: u8 = 0x10;
pub const MODE1_ALLCALL: u8 = 0x01;

pub const MODE2_INVRT: u8 = 0x10;
pub const MODE2_OUTDRV: u8 = 0x04;

pub const CHANNEL_COUNT: u8 = 16;
pub const MAX_TICK: u16 = 4095;
const FULL_TICK_BIT: u16 = 0x1000;

pub const INTERNAL_OSCILLATOR_HZ: f64 = 25_000_000.0;
pub const PRESCALE_MIN: u8 = 3;
pub const PRESCALE_MAX: u8 = 255;

///The oscillator needs at most 500us to stabilize after leaving sleep.
pub const MIN_SETTLE_TIME: Duration = Duration::from_micros(500);

///Address of the Adafruit motor HAT with no address jumpers bridged.
pub const DEFAULT_ADDRESS: u8 = 0x60;

///On/off tick positions within the 4096-tick PWM period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutyCycle {
    Window { on: u16, off: u16 },
    FullOn,
    FullOff,
}

impl DutyCycle {
    pub fn window(on: u16, off: u16) -> DeviceResult<Self> {
        if on > off || off > MAX_TICK {
            Err(DeviceError::InvalidDutyCycle { on, off })
        } else {
            Ok(Self::Window { on, off })
        }
    }

    ///Map a value in 0.0..=1.0 onto a window starting at tick 0. The ends of the range use the full on/off patterns.
    pub fn from_fraction(value: f64) -> Self {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        if value <= 0.0 {
            Self::FullOff
        } else if value >= 1.0 {
            Self::FullOn
        } else {
            Self::Window {
                on: 0,
                off: (value * MAX_TICK as f64).round() as u16,
            }
        }
    }

    ///ON_L, ON_H, OFF_L, OFF_H
    fn register_bytes(&self) -> [u8; 4] {
        let (on, off) = match *self {
            Self::Window { on, off } => (on, off),
            Self::FullOn => (FULL_TICK_BIT, 0),
            Self::FullOff => (0, FULL_TICK_BIT),
        };
        [
            (on & 0xFF) as u8,
            (on >> 8) as u8,
            (off & 0xFF) as u8,
            (off >> 8) as u8,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum OutputDriver {
    OpenDrain,
    #[default]
    TotemPole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct OutputMode {
    pub driver: OutputDriver,
    pub inverted: bool,
}

impl OutputMode {
    fn mode2(&self) -> u8 {
        let mut mode2 = 0;
        if self.driver == OutputDriver::TotemPole {
            mode2 |= MODE2_OUTDRV;
        }
        if self.inverted {
            mode2 |= MODE2_INVRT;
        }
        mode2
    }
}

///Prescale value for the requested output frequency, clamped to what the chip accepts.
pub fn prescale_for(frequency: f64, oscillator_hz: f64) -> DeviceResult<u8> {
    check_oscillator(oscillator_hz)?;
    if !frequency.is_finite() || frequency <= 0.0 {
        return Err(DeviceError::InvalidFrequency(frequency));
    }
    let raw = (oscillator_hz / (4096.0 * frequency)).round() - 1.0;
    Ok(raw.clamp(PRESCALE_MIN as f64, PRESCALE_MAX as f64) as u8)
}

///The clock feeding the prescaler must be a finite, positive frequency.
pub fn check_oscillator(oscillator_hz: f64) -> DeviceResult<()> {
    if oscillator_hz.is_finite() && oscillator_hz > 0.0 {
        Ok(())
    } else {
        Err(DeviceError::InvalidOscillator(oscillator_hz))
    }
}

///Output frequency produced by a prescale value.
pub fn frequency_for(prescale: u8, oscillator_hz: f64) -> f64 {
    oscillator_hz / (4096.0 * (prescale as f64 + 1.0))
}

///Driver for one PCA9685. Construct it with `setup`, which resets the chip before handing the driver out.
///
/// Register values are never cached: every operation reads or writes the chip. A second driver (in this process or
/// another) talking to the same address will race with this one.
pub struct Pca9685<I2C, D> {
    bus: BusTransport<I2C>,
    delay: D,
    oscillator_hz: f64,
    settle_time: Duration,
}

impl<I2C, D> Pca9685<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    ///Take ownership of an opened bus and reset the chip. The bus is dropped if the reset fails.
    pub fn setup(bus: BusTransport<I2C>, delay: D) -> DeviceResult<Self> {
        let mut device = Self {
            bus,
            delay,
            oscillator_hz: INTERNAL_OSCILLATOR_HZ,
            settle_time: MIN_SETTLE_TIME,
        };
        device.reset()?;
        info!("PCA9685 at {} reset", device.bus.address());
        Ok(device)
    }

    ///Use an external clock frequency for prescale calculations. It is checked when a frequency is programmed.
    pub fn with_oscillator(mut self, oscillator_hz: f64) -> Self {
        self.oscillator_hz = oscillator_hz;
        self
    }

    ///Wait this long for the oscillator around sleep transitions. Never shorter than `MIN_SETTLE_TIME`.
    pub fn with_settle_time(mut self, settle_time: Duration) -> Self {
        self.settle_time = settle_time.max(MIN_SETTLE_TIME);
        self
    }

    pub fn address(&self) -> BusAddress {
        self.bus.address()
    }

    ///Write 0 to MODE1: awake, no restart, no auto-increment, no sub/all-call addressing.
    pub fn reset(&mut self) -> DeviceResult<()> {
        self.bus
            .write_register(MODE1, 0x00)
            .map_err(|err| DeviceError::ResetFailed(Box::new(err)))?;
        debug!("MODE1 cleared");
        Ok(())
    }

    ///Program the PWM frequency shared by all channels. Returns the prescale value written.
    ///
    /// PRE_SCALE is only writable while the chip sleeps, so MODE1 is put to sleep first and restored afterwards.
    pub fn set_frequency(&mut self, frequency: f64) -> DeviceResult<u8> {
        let prescale = prescale_for(frequency, self.oscillator_hz)?;
        let actual = frequency_for(prescale, self.oscillator_hz);
        let exact = self.oscillator_hz / (4096.0 * frequency) - 1.0;
        if exact < PRESCALE_MIN as f64 - 0.5 || exact > PRESCALE_MAX as f64 + 0.5 {
            warn!(
                "requested {} Hz is out of range, using {:.1} Hz (prescale {})",
                frequency, actual, prescale
            );
        }

        let old_mode = self.bus.read_register(MODE1)?;
        self.bus
            .write_register(MODE1, (old_mode & !MODE1_RESTART) | MODE1_SLEEP)?;
        self.settle();
        self.bus.write_register(PRE_SCALE, prescale)?;
        self.bus
            .write_register(MODE1, old_mode & !(MODE1_SLEEP | MODE1_RESTART))?;
        self.settle();
        if old_mode & MODE1_RESTART != 0 {
            self.bus
                .write_register(MODE1, (old_mode & !MODE1_SLEEP) | MODE1_RESTART)?;
        }

        debug!("prescale set to {} ({:.1} Hz)", prescale, actual);
        Ok(prescale)
    }

    pub fn prescale(&mut self) -> DeviceResult<u8> {
        self.bus.read_register(PRE_SCALE)
    }

    ///The frequency the chip is currently programmed for.
    pub fn frequency(&mut self) -> DeviceResult<f64> {
        let prescale = self.prescale()?;
        Ok(frequency_for(prescale, self.oscillator_hz))
    }

    ///Write the four registers of one channel. The channel is checked before anything is sent.
    pub fn set_channel(&mut self, channel: u8, duty: DutyCycle) -> DeviceResult<()> {
        if channel >= CHANNEL_COUNT {
            return Err(DeviceError::InvalidChannel(channel));
        }
        self.write_block(Register(LED0_ON_L.0 + 4 * channel), duty)
    }

    ///Write the same duty cycle to every channel through the ALL_LED registers.
    pub fn set_all_channels(&mut self, duty: DutyCycle) -> DeviceResult<()> {
        self.write_block(ALL_LED_ON_L, duty)
    }

    ///Turn every output fully off.
    pub fn release_all(&mut self) -> DeviceResult<()> {
        self.set_all_channels(DutyCycle::FullOff)
    }

    pub fn set_output_mode(&mut self, mode: OutputMode) -> DeviceResult<()> {
        self.bus.write_register(MODE2, mode.mode2())
    }

    ///Stop the oscillator. Outputs are off while asleep.
    pub fn sleep(&mut self) -> DeviceResult<()> {
        let mode = self.bus.read_register(MODE1)?;
        self.bus
            .write_register(MODE1, (mode & !MODE1_RESTART) | MODE1_SLEEP)
    }

    ///Restart the oscillator, resuming PWM if the chip reports it was running before sleep.
    pub fn wake(&mut self) -> DeviceResult<()> {
        let mode = self.bus.read_register(MODE1)?;
        self.bus
            .write_register(MODE1, mode & !(MODE1_SLEEP | MODE1_RESTART))?;
        self.settle();
        if mode & MODE1_RESTART != 0 {
            self.bus
                .write_register(MODE1, (mode & !MODE1_SLEEP) | MODE1_RESTART)?;
        }
        Ok(())
    }

    pub fn read_register(&mut self, register: Register) -> DeviceResult<u8> {
        self.bus.read_register(register)
    }

    pub fn into_parts(self) -> (I2C, D) {
        (self.bus.into_inner(), self.delay)
    }

    fn write_block(&mut self, base: Register, duty: DutyCycle) -> DeviceResult<()> {
        for (offset, value) in duty.register_bytes().into_iter().enumerate() {
            self.bus.write_register(Register(base.0 + offset as u8), value)?;
        }
        Ok(())
    }

    fn settle(&mut self) {
        let micros = u32::try_from(self.settle_time.as_micros()).unwrap_or(u32::MAX);
        self.delay.delay_us(micros);
    }
}

impl<I2C, D> Actuator for Pca9685<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    type Error = DeviceError;

    fn reset(&mut self) -> DeviceResult<()> {
        Pca9685::reset(self)
    }

    fn release(&mut self) -> DeviceResult<()> {
        self.release_all()
    }
}

fn default_i2c_bus() -> u8 {
    1
}

fn default_i2c_address() -> u8 {
    DEFAULT_ADDRESS
}

fn default_frequency() -> Option<f64> {
    Some(1600.0)
}

fn default_oscillator_hz() -> f64 {
    INTERNAL_OSCILLATOR_HZ
}

fn default_settle_micros() -> u64 {
    MIN_SETTLE_TIME.as_micros() as u64
}

fn default_release_steppers() -> bool {
    true
}

//system level config -- corresponds to 1 pwm chip instance
#[derive(Debug, Clone, Deserialize)]
pub struct Pca9685DeviceConfig {
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,
    #[serde(default = "default_i2c_address")]
    pub i2c_address: u8,
    #[serde(default = "default_frequency")]
    pub frequency: Option<f64>,
    #[serde(default = "default_oscillator_hz")]
    pub oscillator_hz: f64,
    #[serde(default = "default_settle_micros")]
    pub settle_micros: u64,
    #[serde(default)]
    pub output_mode: OutputMode,
    #[serde(default = "default_release_steppers")]
    pub release_steppers: bool,
}

impl Default for Pca9685DeviceConfig {
    fn default() -> Self {
        Self {
            i2c_bus: default_i2c_bus(),
            i2c_address: default_i2c_address(),
            frequency: default_frequency(),
            oscillator_hz: default_oscillator_hz(),
            settle_micros: default_settle_micros(),
            output_mode: OutputMode::default(),
            release_steppers: default_release_steppers(),
        }
    }
}

///Opens the bus through `i2c_bus_provider`, resets the chip and applies the configured frequency and output mode.
pub struct Pca9685DeviceBuilder<I2C, D, F, G>
where
    I2C: I2c,
    D: DelayNs,
    F: Fn(u8, BusAddress) -> DeviceResult<I2C>,
    G: Fn() -> D,
{
    i2c_bus_provider: F,
    delay_provider: G,
}

impl<I2C, D, F, G> Pca9685DeviceBuilder<I2C, D, F, G>
where
    I2C: I2c,
    D: DelayNs,
    F: Fn(u8, BusAddress) -> DeviceResult<I2C>,
    G: Fn() -> D,
{
    pub fn new(i2c_bus_provider: F, delay_provider: G) -> Self {
        Pca9685DeviceBuilder {
            i2c_bus_provider,
            delay_provider,
        }
    }

    pub fn build(&self, config: &Pca9685DeviceConfig) -> DeviceResult<Pca9685<I2C, D>> {
        let address = BusAddress::new(config.i2c_address)?;
        check_oscillator(config.oscillator_hz)?;
        let i2c = (self.i2c_bus_provider)(config.i2c_bus, address)?;
        let mut device = Pca9685::setup(BusTransport::new(i2c, address), (self.delay_provider)())?
            .with_oscillator(config.oscillator_hz)
            .with_settle_time(Duration::from_micros(config.settle_micros));

        device.set_output_mode(config.output_mode)?;
        if let Some(frequency) = config.frequency {
            device.set_frequency(frequency)?;
        }

        if config.release_steppers {
            release_steppers(&mut device)?;
        }

        Ok(device)
    }
}

#[cfg(feature = "stepper")]
fn release_steppers<I2C: I2c, D: DelayNs>(device: &mut Pca9685<I2C, D>) -> DeviceResult<()> {
    use crate::devices::stepper::{HatPort, HatStepper};
    for port in [HatPort::Stepper1, HatPort::Stepper2] {
        HatStepper::new(port).release(device)?;
    }
    Ok(())
}

#[cfg(not(feature = "stepper"))]
fn release_steppers<I2C: I2c, D: DelayNs>(device: &mut Pca9685<I2C, D>) -> DeviceResult<()> {
    device.release_all()
}

impl<I2C, D, F, G> ActuatorBuilder for Pca9685DeviceBuilder<I2C, D, F, G>
where
    I2C: I2c,
    D: DelayNs,
    F: Fn(u8, BusAddress) -> DeviceResult<I2C>,
    G: Fn() -> D,
{
    type Config = Pca9685DeviceConfig;
    type Actuator = Pca9685<I2C, D>;

    fn try_build(&self, cfg: &Pca9685DeviceConfig) -> Result<Pca9685<I2C, D>, T2tBuildError> {
        let device = self.build(cfg)?;
        Ok(device)
    }
}

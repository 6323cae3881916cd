//! Stepper primitives for the two stepper ports of an Adafruit-style motor HAT.
//!
//! Each port drives one bipolar motor through two H-bridges. Each bridge uses three PCA9685 channels: a PWM (enable)
//! channel held fully on, and two direction inputs switched fully on or off.

use embedded_hal::{delay::DelayNs, i2c::I2c};
use tracing::debug;

use super::pca9685::{DutyCycle, Pca9685};
use crate::error::DeviceResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HatPort {
    Stepper1,
    Stepper2,
}

struct Pins {
    pwm_a: u8,
    a_in2: u8,
    a_in1: u8,
    pwm_b: u8,
    b_in2: u8,
    b_in1: u8,
}

impl HatPort {
    fn pins(self) -> Pins {
        match self {
            Self::Stepper1 => Pins {
                pwm_a: 8,
                a_in2: 9,
                a_in1: 10,
                pwm_b: 13,
                b_in2: 12,
                b_in1: 11,
            },
            Self::Stepper2 => Pins {
                pwm_a: 2,
                a_in2: 3,
                a_in1: 4,
                pwm_b: 7,
                b_in2: 6,
                b_in1: 5,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStyle {
    ///One coil energized per full step.
    Single,
    ///Two coils energized per full step. More torque, more current.
    Double,
    ///Alternate between single and double: half steps.
    Interleave,
}

//coils in output order [A IN2, B IN1, A IN1, B IN2], one row per half step
const PHASES: [[bool; 4]; 8] = [
    [true, false, false, false],
    [true, true, false, false],
    [false, true, false, false],
    [false, true, true, false],
    [false, false, true, false],
    [false, false, true, true],
    [false, false, false, true],
    [true, false, false, true],
];

///Position and phase of one motor. The driver is passed into each call, so one driver can run both ports.
#[derive(Debug, Clone)]
pub struct HatStepper {
    port: HatPort,
    phase: usize,
    position: i32,
}

impl HatStepper {
    pub fn new(port: HatPort) -> Self {
        Self {
            port,
            phase: 0,
            position: 0,
        }
    }

    pub fn port(&self) -> HatPort {
        self.port
    }

    ///Position in half steps relative to construction.
    pub fn position(&self) -> i32 {
        self.position
    }

    ///Advance one step and energize the coils for the new phase. Returns the new position.
    ///
    /// Single steps sit on even phases and double steps on odd phases; a step taken from the other kind of phase
    /// moves half a step to line up.
    pub fn onestep<I2C, D>(
        &mut self,
        driver: &mut Pca9685<I2C, D>,
        direction: Direction,
        style: StepStyle,
    ) -> DeviceResult<i32>
    where
        I2C: I2c,
        D: DelayNs,
    {
        let aligned = match style {
            StepStyle::Single => self.phase % 2 == 0,
            StepStyle::Double => self.phase % 2 == 1,
            StepStyle::Interleave => true,
        };
        let advance = if style == StepStyle::Interleave || !aligned { 1 } else { 2 };

        let (phase, delta) = match direction {
            Direction::Forward => ((self.phase + advance) % PHASES.len(), advance as i32),
            Direction::Backward => (
                (self.phase + PHASES.len() - advance) % PHASES.len(),
                -(advance as i32),
            ),
        };

        self.energize(driver, PHASES[phase])?;
        self.phase = phase;
        self.position += delta;
        debug!("{:?} at phase {} position {}", self.port, self.phase, self.position);
        Ok(self.position)
    }

    ///Turn off all six channels of the port so the motor holds no current.
    pub fn release<I2C, D>(&self, driver: &mut Pca9685<I2C, D>) -> DeviceResult<()>
    where
        I2C: I2c,
        D: DelayNs,
    {
        let pins = self.port.pins();
        for channel in [pins.pwm_a, pins.pwm_b, pins.a_in2, pins.b_in1, pins.a_in1, pins.b_in2] {
            driver.set_channel(channel, DutyCycle::FullOff)?;
        }
        debug!("{:?} released", self.port);
        Ok(())
    }

    fn energize<I2C, D>(&self, driver: &mut Pca9685<I2C, D>, coils: [bool; 4]) -> DeviceResult<()>
    where
        I2C: I2c,
        D: DelayNs,
    {
        let pins = self.port.pins();
        driver.set_channel(pins.pwm_a, DutyCycle::FullOn)?;
        driver.set_channel(pins.pwm_b, DutyCycle::FullOn)?;
        for (channel, on) in [pins.a_in2, pins.b_in1, pins.a_in1, pins.b_in2]
            .into_iter()
            .zip(coils)
        {
            let duty = if on { DutyCycle::FullOn } else { DutyCycle::FullOff };
            driver.set_channel(channel, duty)?;
        }
        Ok(())
    }
}

use t2t_core::error::T2tBuildError;
use thiserror::Error;

use crate::bus::{BusAddress, Register};

pub type DeviceResult<T> = Result<T, DeviceError>;

///Errors raised while talking to a device on the bus.
///
/// Bus failures are reported, never retried. An operation that fails part way through leaves whatever it already
/// wrote in the device registers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("unable to open i2c bus {bus} for device at {address}: {message}")]
    BusOpenFailed {
        bus: u8,
        address: BusAddress,
        message: String,
    },

    #[error("unable to write to register {register}: {message}")]
    BusWriteFailed { register: Register, message: String },

    #[error("unable to read from register {register}: {message}")]
    BusReadFailed { register: Register, message: String },

    #[error("unable to reset device: {0}")]
    ResetFailed(Box<DeviceError>),

    #[error("invalid PWM frequency {0} Hz")]
    InvalidFrequency(f64),

    #[error("invalid oscillator frequency {0} Hz")]
    InvalidOscillator(f64),

    #[error("invalid channel {0}, expected 0..=15")]
    InvalidChannel(u8),

    #[error("invalid duty cycle on={on} off={off}, expected on <= off <= 4095")]
    InvalidDutyCycle { on: u16, off: u16 },

    #[error("invalid 7-bit bus address 0x{0:02x}")]
    InvalidAddress(u8),
}

impl From<DeviceError> for T2tBuildError {
    fn from(err: DeviceError) -> Self {
        T2tBuildError::new(err.to_string())
    }
}

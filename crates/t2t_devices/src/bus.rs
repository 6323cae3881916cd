//! Single-register transactions over an i2c bus.

use std::fmt;

use embedded_hal::i2c::I2c;
use tracing::trace;

use crate::error::{DeviceError, DeviceResult};

///A 7-bit device address on the i2c bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusAddress(u8);

impl BusAddress {
    pub fn new(address: u8) -> DeviceResult<Self> {
        if address > 0x7F {
            Err(DeviceError::InvalidAddress(address))
        } else {
            Ok(Self(address))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for BusAddress {
    type Error = DeviceError;

    fn try_from(address: u8) -> DeviceResult<Self> {
        Self::new(address)
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("0x{:02x}", self.0))
    }
}

///An 8-bit register index inside a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register(pub u8);

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("0x{:02x}", self.0))
    }
}

///Owns the bus handle for one device address. Every call is one bus transaction; nothing is cached or batched.
pub struct BusTransport<I2C> {
    i2c: I2C,
    address: BusAddress,
}

impl<I2C> BusTransport<I2C>
where
    I2C: I2c,
{
    pub fn new(i2c: I2C, address: BusAddress) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> BusAddress {
        self.address
    }

    pub fn write_register(&mut self, register: Register, value: u8) -> DeviceResult<()> {
        self.i2c
            .write(self.address.value(), &[register.0, value])
            .map_err(|err| DeviceError::BusWriteFailed {
                register,
                message: format!("{:?}", err),
            })?;
        trace!("{} <- 0x{:02x} @ {}", register, value, self.address);
        Ok(())
    }

    pub fn read_register(&mut self, register: Register) -> DeviceResult<u8> {
        let mut buffer = [0u8; 1];
        self.i2c
            .write_read(self.address.value(), &[register.0], &mut buffer)
            .map_err(|err| DeviceError::BusReadFailed {
                register,
                message: format!("{:?}", err),
            })?;
        trace!("{} -> 0x{:02x} @ {}", register, buffer[0], self.address);
        Ok(buffer[0])
    }

    ///Give the bus handle back. Dropping the transport has the same effect on the bus.
    pub fn into_inner(self) -> I2C {
        self.i2c
    }
}

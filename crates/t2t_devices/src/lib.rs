//!Drivers for the i2c hardware driven by the text2type daemon.
//!
//! Everything here is written against the `embedded-hal` 1.0 traits, so drivers can run on a Raspberry Pi through
//! `t2t_rpi` or against a fake bus in tests.

pub mod bus;
pub mod devices;
pub mod error;

pub use bus::{BusAddress, BusTransport, Register};
pub use error::DeviceError;

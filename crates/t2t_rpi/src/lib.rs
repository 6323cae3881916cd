//!This library provides access to the Raspberry Pi I2C buses. It is a wrapper around the rppal library.
//!
//! The `open_bus` function gets an I2C bus handle that can be used to construct devices in `t2t_devices`, and
//! `delay` provides the blocking delay those devices wait with.

//bus handles with a process-wide single-owner registry
pub mod bus;

pub use bus::{open_bus, BusClaim, RpiBus};
pub use rppal;
pub use rppal::hal::Delay;

//blocking delay backed by the OS sleep
pub fn delay() -> Delay {
    Delay::new()
}

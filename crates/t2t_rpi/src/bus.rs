use std::{
    collections::BTreeSet,
    sync::{Mutex, MutexGuard},
};

use embedded_hal::i2c::{ErrorType, I2c as HalI2c, Operation};
use rppal::i2c::I2c;
use t2t_devices::{BusAddress, DeviceError};
use tracing::{debug, info};

static CLAIMED_BUSES: Mutex<BTreeSet<u8>> = Mutex::new(BTreeSet::new());

fn claimed_buses() -> MutexGuard<'static, BTreeSet<u8>> {
    match CLAIMED_BUSES.lock() {
        Ok(claimed) => claimed,
        Err(poisoned) => poisoned.into_inner(),
    }
}

///Exclusive ownership of one bus id within this process. Released on drop.
#[derive(Debug)]
pub struct BusClaim {
    bus: u8,
}

impl BusClaim {
    ///Returns `None` if another handle in this process already owns the bus.
    pub fn acquire(bus: u8) -> Option<Self> {
        if claimed_buses().insert(bus) {
            Some(Self { bus })
        } else {
            None
        }
    }

    pub fn bus(&self) -> u8 {
        self.bus
    }
}

impl Drop for BusClaim {
    fn drop(&mut self) {
        claimed_buses().remove(&self.bus);
        debug!("i2c bus {} released", self.bus);
    }
}

///An open `/dev/i2c-N` handle. Only one may exist per bus in this process.
pub struct RpiBus {
    i2c: I2c,
    claim: BusClaim,
}

impl RpiBus {
    pub fn bus(&self) -> u8 {
        self.claim.bus()
    }
}

///Open an i2c bus by id and point it at `address`.
pub fn open_bus(bus: u8, address: BusAddress) -> Result<RpiBus, DeviceError> {
    let open_failed = |message: String| DeviceError::BusOpenFailed {
        bus,
        address,
        message,
    };

    let claim =
        BusClaim::acquire(bus).ok_or_else(|| open_failed("bus is already open in this process".to_string()))?;
    let mut i2c = I2c::with_bus(bus).map_err(|err| open_failed(err.to_string()))?;
    i2c.set_slave_address(address.value() as u16)
        .map_err(|err| open_failed(err.to_string()))?;

    info!("opened i2c bus {} for device at {}", bus, address);
    Ok(RpiBus { i2c, claim })
}

impl ErrorType for RpiBus {
    type Error = rppal::i2c::Error;
}

impl HalI2c for RpiBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        HalI2c::transaction(&mut self.i2c, address, operations)
    }
}

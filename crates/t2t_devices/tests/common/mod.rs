//! A simulated PCA9685 behind a fake i2c bus.
//!
//! The bus and the delay share one event log so tests can assert the exact order of transactions and waits.

#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use embedded_hal::{
    delay::DelayNs,
    i2c::{self, ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation},
};

pub const MODE1: u8 = 0x00;
pub const MODE2: u8 = 0x01;
pub const PRE_SCALE: u8 = 0xFE;
pub const SLEEP: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Write { register: u8, value: u8 },
    Read { register: u8 },
    Delay { ns: u32 },
}

pub struct Chip {
    pub address: u8,
    pub registers: [u8; 256],
    pub events: Vec<Event>,
    ///Register whose reads and writes fail.
    pub fail_register: Option<u8>,
    ///PRE_SCALE writes the chip ignored because it was awake.
    pub ignored_prescale_writes: usize,
}

impl Chip {
    fn write(&mut self, register: u8, value: u8) -> Result<(), FakeError> {
        if self.fail_register == Some(register) {
            return Err(FakeError(ErrorKind::Bus));
        }
        self.events.push(Event::Write { register, value });
        if register == PRE_SCALE && self.registers[MODE1 as usize] & SLEEP == 0 {
            self.ignored_prescale_writes += 1;
        } else {
            self.registers[register as usize] = value;
        }
        Ok(())
    }

    fn read(&mut self, register: u8) -> Result<u8, FakeError> {
        if self.fail_register == Some(register) {
            return Err(FakeError(ErrorKind::Bus));
        }
        self.events.push(Event::Read { register });
        Ok(self.registers[register as usize])
    }

    ///Transactions only, without delays.
    pub fn transactions(&self) -> Vec<Event> {
        self.events
            .iter()
            .copied()
            .filter(|e| !matches!(e, Event::Delay { .. }))
            .collect()
    }

    ///(on, off) ticks of a channel including the full on/off bit.
    pub fn channel(&self, channel: u8) -> (u16, u16) {
        let base = 0x06 + 4 * channel as usize;
        let r = &self.registers;
        (
            r[base] as u16 | (r[base + 1] as u16) << 8,
            r[base + 2] as u16 | (r[base + 3] as u16) << 8,
        )
    }
}

#[derive(Debug)]
pub struct FakeError(ErrorKind);

impl i2c::Error for FakeError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

#[derive(Clone)]
pub struct FakeBus(pub Rc<RefCell<Chip>>);

#[derive(Clone)]
pub struct FakeDelay(pub Rc<RefCell<Chip>>);

///A chip at `address` with its power-on register values (asleep, all-call enabled, prescale for 200Hz).
pub fn fake_chip(address: u8) -> (FakeBus, FakeDelay, Rc<RefCell<Chip>>) {
    let mut registers = [0u8; 256];
    registers[MODE1 as usize] = 0x11;
    registers[MODE2 as usize] = 0x04;
    registers[PRE_SCALE as usize] = 0x1E;
    let chip = Rc::new(RefCell::new(Chip {
        address,
        registers,
        events: Vec::new(),
        fail_register: None,
        ignored_prescale_writes: 0,
    }));
    (FakeBus(chip.clone()), FakeDelay(chip.clone()), chip)
}

impl ErrorType for FakeBus {
    type Error = FakeError;
}

impl I2c for FakeBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut chip = self.0.borrow_mut();
        if address != chip.address {
            return Err(FakeError(ErrorKind::NoAcknowledge(
                NoAcknowledgeSource::Address,
            )));
        }
        let mut pointer = 0u8;
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    if let Some((register, values)) = bytes.split_first() {
                        pointer = *register;
                        for (i, value) in values.iter().enumerate() {
                            chip.write(pointer.wrapping_add(i as u8), *value)?;
                        }
                    }
                }
                Operation::Read(buffer) => {
                    for (i, byte) in buffer.iter_mut().enumerate() {
                        *byte = chip.read(pointer.wrapping_add(i as u8))?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().events.push(Event::Delay { ns });
    }
}

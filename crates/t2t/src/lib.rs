//!The text2type daemon: reads bytes from a named pipe, forwards them to stdout and keeps the PCA9685 motor HAT in
//!a known state while it does.

pub mod config;
pub mod fifo;

//! The daemon control loop.
//!
//! The loop owns the byte source, the dispatcher and the actuator. It pulls chunks until it is cancelled, the source
//! is exhausted, or a degraded restart fails. Read errors are logged and the loop keeps going; after `reopen_after`
//! consecutive failures the source is reopened and the actuator reset.

use std::io;

use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{dispatch::StreamDispatcher, error::DaemonError, Actuator, ByteChunk, ByteSource};

pub const DEFAULT_REOPEN_AFTER: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    ///Pulling chunks from the source.
    Running,
    ///A degraded restart failed. The process should exit with a failure status.
    Fatal,
    ///Cancelled, or the source reported exhaustion.
    Stopped,
}

pub struct Daemon<S, W, A> {
    source: S,
    dispatcher: StreamDispatcher<W>,
    actuator: A,
    state: DaemonState,
    reopen_after: u32,
    consecutive_errors: u32,
    failure: Option<DaemonError>,
}

impl<S, W, A> Daemon<S, W, A>
where
    S: ByteSource,
    W: AsyncWrite + Unpin,
    A: Actuator,
{
    pub fn new(source: S, dispatcher: StreamDispatcher<W>, actuator: A) -> Self {
        Self {
            source,
            dispatcher,
            actuator,
            state: DaemonState::Running,
            reopen_after: DEFAULT_REOPEN_AFTER,
            consecutive_errors: 0,
            failure: None,
        }
    }

    ///Number of consecutive read errors that trigger a restart of the source and actuator. 0 never restarts.
    pub fn with_reopen_after(mut self, reopen_after: u32) -> Self {
        self.reopen_after = reopen_after;
        self
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn dispatcher(&self) -> &StreamDispatcher<W> {
        &self.dispatcher
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    ///Perform one iteration: a single read and whatever it triggers.
    pub async fn step(&mut self) -> DaemonState {
        if self.state != DaemonState::Running {
            return self.state;
        }
        let read = self.source.read_chunk().await;
        self.on_read(read).await
    }

    ///Iterate until the token is cancelled, the source is exhausted or the loop turns fatal. The actuator is
    ///released on the way out in every case.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<(), DaemonError> {
        info!("control loop running");
        while self.state == DaemonState::Running {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                read = self.source.read_chunk() => Some(read),
            };
            match read {
                Some(read) => {
                    self.on_read(read).await;
                }
                None => {
                    info!("control loop cancelled");
                    self.state = DaemonState::Stopped;
                }
            }
        }

        if let Err(err) = self.actuator.release() {
            warn!("error releasing actuator on shutdown: {}", err);
        }

        match self.failure.take() {
            Some(err) => {
                error!("control loop stopped: {}", err);
                Err(err)
            }
            None => {
                info!("control loop stopped");
                Ok(())
            }
        }
    }

    async fn on_read(&mut self, read: io::Result<Option<ByteChunk>>) -> DaemonState {
        let next = match read {
            Ok(Some(chunk)) => {
                self.consecutive_errors = 0;
                if !chunk.is_empty() {
                    if let Err(err) = self.dispatcher.dispatch(chunk).await {
                        warn!("error writing to output sink: {}", err);
                    }
                }
                DaemonState::Running
            }
            Ok(None) => {
                info!("byte source exhausted");
                DaemonState::Stopped
            }
            Err(err) => {
                self.consecutive_errors += 1;
                error!(
                    "error reading from byte source ({} in a row): {}",
                    self.consecutive_errors, err
                );
                if self.reopen_after > 0 && self.consecutive_errors >= self.reopen_after {
                    self.restart().await
                } else {
                    DaemonState::Running
                }
            }
        };
        if next != self.state {
            debug!("control loop {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        next
    }

    async fn restart(&mut self) -> DaemonState {
        warn!(
            "{} consecutive read errors, reopening source and resetting actuator",
            self.consecutive_errors
        );
        self.consecutive_errors = 0;

        if let Err(err) = self.source.reopen().await {
            self.failure = Some(DaemonError::ChannelSourceUnavailable(err.to_string()));
            return DaemonState::Fatal;
        }
        if let Err(err) = self.actuator.reset() {
            self.failure = Some(DaemonError::ActuatorFailed(err.to_string()));
            return DaemonState::Fatal;
        }
        info!("degraded restart complete");
        DaemonState::Running
    }
}

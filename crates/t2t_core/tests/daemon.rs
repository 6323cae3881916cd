//! Control loop tests against a scripted byte source and a recording actuator.

use std::{
    collections::VecDeque,
    io,
    pin::Pin,
    task::{Context, Poll},
};

use t2t_core::{
    daemon::{Daemon, DaemonState},
    dispatch::StreamDispatcher,
    error::DaemonError,
    Actuator, ByteChunk, ByteSource,
};
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

enum Scripted {
    Data(&'static str),
    Fail,
}

struct ScriptedSource {
    reads: VecDeque<Scripted>,
    reopens: usize,
    fail_reopen: bool,
}

impl ScriptedSource {
    fn new(reads: Vec<Scripted>) -> Self {
        Self {
            reads: reads.into(),
            reopens: 0,
            fail_reopen: false,
        }
    }
}

impl ByteSource for ScriptedSource {
    async fn read_chunk(&mut self) -> io::Result<Option<ByteChunk>> {
        match self.reads.pop_front() {
            Some(Scripted::Data(s)) => Ok(Some(ByteChunk::from(s))),
            Some(Scripted::Fail) => Err(io::Error::new(io::ErrorKind::Other, "scripted failure")),
            None => Ok(None),
        }
    }

    async fn reopen(&mut self) -> io::Result<()> {
        self.reopens += 1;
        if self.fail_reopen {
            Err(io::Error::new(io::ErrorKind::NotFound, "fifo removed"))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct RecordingActuator {
    resets: usize,
    releases: usize,
    fail_reset: bool,
}

impl Actuator for RecordingActuator {
    type Error = String;

    fn reset(&mut self) -> Result<(), String> {
        self.resets += 1;
        if self.fail_reset {
            Err("bus write failed".to_string())
        } else {
            Ok(())
        }
    }

    fn release(&mut self) -> Result<(), String> {
        self.releases += 1;
        Ok(())
    }
}

//rejects the next `failures` writes, then accepts everything
struct FlakySink {
    written: Vec<u8>,
    failures: usize,
}

impl AsyncWrite for FlakySink {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let sink = self.get_mut();
        if sink.failures > 0 {
            sink.failures -= 1;
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader went away")));
        }
        sink.written.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn daemon(
    source: ScriptedSource,
) -> Daemon<ScriptedSource, Vec<u8>, RecordingActuator> {
    Daemon::new(
        source,
        StreamDispatcher::new(Vec::new()),
        RecordingActuator::default(),
    )
}

#[tokio::test]
async fn empty_read_does_not_stop_the_loop() {
    let source = ScriptedSource::new(vec![
        Scripted::Data("he"),
        Scripted::Data(""),
        Scripted::Data("llo"),
    ]);
    let mut daemon = daemon(source);

    assert_eq!(daemon.step().await, DaemonState::Running);
    assert_eq!(daemon.step().await, DaemonState::Running);
    assert_eq!(daemon.step().await, DaemonState::Running);
    assert_eq!(daemon.dispatcher().sink(), &b"hello".to_vec());

    assert_eq!(daemon.step().await, DaemonState::Stopped);
}

#[tokio::test]
async fn run_forwards_everything_and_releases() {
    let source = ScriptedSource::new(vec![
        Scripted::Data("he"),
        Scripted::Data(""),
        Scripted::Data("llo"),
    ]);
    let mut daemon = daemon(source);

    daemon.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(daemon.state(), DaemonState::Stopped);
    assert_eq!(daemon.dispatcher().sink(), &b"hello".to_vec());
    assert_eq!(daemon.actuator().releases, 1);
}

#[tokio::test]
async fn read_errors_are_not_fatal() {
    let source = ScriptedSource::new(vec![
        Scripted::Data("a"),
        Scripted::Fail,
        Scripted::Fail,
        Scripted::Data("b"),
    ]);
    let mut daemon = daemon(source).with_reopen_after(0);

    daemon.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(daemon.dispatcher().sink(), &b"ab".to_vec());
    assert_eq!(daemon.source().reopens, 0);
    assert_eq!(daemon.actuator().resets, 0);
}

#[tokio::test]
async fn successful_read_clears_error_count() {
    let source = ScriptedSource::new(vec![Scripted::Fail, Scripted::Data("x"), Scripted::Fail]);
    let mut daemon = daemon(source).with_reopen_after(2);

    daemon.step().await;
    assert_eq!(daemon.consecutive_errors(), 1);
    daemon.step().await;
    assert_eq!(daemon.consecutive_errors(), 0);
    daemon.step().await;
    assert_eq!(daemon.consecutive_errors(), 1);
    assert_eq!(daemon.source().reopens, 0);
}

#[tokio::test]
async fn repeated_errors_reopen_source_and_reset_actuator() {
    let source = ScriptedSource::new(vec![
        Scripted::Fail,
        Scripted::Fail,
        Scripted::Data("ok"),
    ]);
    let mut daemon = daemon(source).with_reopen_after(2);

    assert_eq!(daemon.step().await, DaemonState::Running);
    assert_eq!(daemon.step().await, DaemonState::Running);
    assert_eq!(daemon.source().reopens, 1);
    assert_eq!(daemon.actuator().resets, 1);
    assert_eq!(daemon.consecutive_errors(), 0);

    assert_eq!(daemon.step().await, DaemonState::Running);
    assert_eq!(daemon.dispatcher().sink(), &b"ok".to_vec());
}

#[tokio::test]
async fn failed_reopen_is_fatal() {
    let mut source = ScriptedSource::new(vec![Scripted::Fail, Scripted::Data("never")]);
    source.fail_reopen = true;
    let mut daemon = daemon(source).with_reopen_after(1);

    let result = daemon.run(&CancellationToken::new()).await;

    assert!(matches!(result, Err(DaemonError::ChannelSourceUnavailable(_))));
    assert_eq!(daemon.state(), DaemonState::Fatal);
    assert_eq!(daemon.actuator().releases, 1);
    assert!(daemon.dispatcher().sink().is_empty());
}

#[tokio::test]
async fn failed_actuator_reset_is_fatal() {
    let source = ScriptedSource::new(vec![Scripted::Fail]);
    let mut daemon = Daemon::new(
        source,
        StreamDispatcher::new(Vec::new()),
        RecordingActuator {
            fail_reset: true,
            ..Default::default()
        },
    )
    .with_reopen_after(1);

    let result = daemon.run(&CancellationToken::new()).await;

    assert!(matches!(result, Err(DaemonError::ActuatorFailed(_))));
    assert_eq!(daemon.state(), DaemonState::Fatal);
}

#[tokio::test]
async fn cancelled_loop_stops_without_reading() {
    let source = ScriptedSource::new(vec![Scripted::Data("unread")]);
    let mut daemon = daemon(source);
    let cancel = CancellationToken::new();
    cancel.cancel();

    daemon.run(&cancel).await.unwrap();

    assert_eq!(daemon.state(), DaemonState::Stopped);
    assert!(daemon.dispatcher().sink().is_empty());
    assert_eq!(daemon.actuator().releases, 1);
}

#[tokio::test]
async fn sink_failure_is_logged_and_the_loop_continues() {
    let source = ScriptedSource::new(vec![Scripted::Data("lost"), Scripted::Data("kept")]);
    let sink = FlakySink {
        written: Vec::new(),
        failures: 1,
    };
    let mut daemon = Daemon::new(
        source,
        StreamDispatcher::new(sink),
        RecordingActuator::default(),
    );

    assert_eq!(daemon.step().await, DaemonState::Running);
    assert_eq!(daemon.consecutive_errors(), 0);
    assert!(daemon.dispatcher().sink().written.is_empty());
    assert_eq!(daemon.dispatcher().forwarded(), 0);

    assert_eq!(daemon.step().await, DaemonState::Running);
    assert_eq!(daemon.dispatcher().sink().written, b"kept".to_vec());
    assert_eq!(daemon.dispatcher().forwarded(), 4);

    assert_eq!(daemon.step().await, DaemonState::Stopped);
    assert_eq!(daemon.actuator().resets, 0);
}

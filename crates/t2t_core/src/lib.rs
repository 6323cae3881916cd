//!This is the core library for the text2type daemon. The other t2t crates depend on this one. It holds the byte
//!stream types, the traits at the seams between the stream plumbing and the actuator, and the control loop.

use bytes::Bytes;
use error::T2tBuildError;
use std::{fmt, future::Future, io, ops::Deref};

pub mod daemon;
pub mod dispatch;
pub mod error;

///An immutable run of bytes delivered by one read from a `ByteSource`.
///
/// Chunks are opaque: embedded NUL bytes are data like any other byte.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteChunk(Bytes);

impl ByteChunk {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(data))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Deref for ByteChunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ByteChunk {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl From<&'static [u8]> for ByteChunk {
    fn from(s: &'static [u8]) -> Self {
        Self(Bytes::from_static(s))
    }
}

impl From<&'static str> for ByteChunk {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

impl fmt::Debug for ByteChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("ByteChunk({:?})", self.0))
    }
}

///An ordered source of bytes, conventionally a named FIFO.
///
/// `read_chunk` waits until data is available. `Ok(Some(chunk))` with an empty chunk means "nothing yet", not end of
/// stream. `Ok(None)` means the source is exhausted and will never produce data again; a FIFO that stays open across
/// writers never returns it, but bounded sources (files, scripted test sources) do.
pub trait ByteSource {
    fn read_chunk(&mut self) -> impl Future<Output = io::Result<Option<ByteChunk>>>;

    ///Drop and re-acquire the underlying channel after repeated read failures.
    fn reopen(&mut self) -> impl Future<Output = io::Result<()>>;
}

///The physical side of the daemon, as seen by the control loop.
///
/// The loop only needs to put the actuator back into a known state after a degraded restart and to make it safe
/// (no holding current, all outputs off) when the loop ends.
pub trait Actuator {
    type Error: fmt::Display;

    fn reset(&mut self) -> Result<(), Self::Error>;

    fn release(&mut self) -> Result<(), Self::Error>;
}

///An entity that opens a bus and brings an `Actuator` into its initial state.
///
/// A builder either returns a fully reset actuator or an error, never a half-initialized one.
pub trait ActuatorBuilder {
    type Config;
    type Actuator: Actuator;

    fn try_build(&self, cfg: &Self::Config) -> Result<Self::Actuator, T2tBuildError>;
}

#[cfg(test)]
mod tests {
    use super::ByteChunk;

    #[test]
    fn chunk_keeps_embedded_nul() {
        let chunk = ByteChunk::from(&b"AB\0C"[..]);
        assert_eq!(chunk.len(), 4);
        assert_eq!(&chunk[..], b"AB\0C");
    }

    #[test]
    fn empty_chunk() {
        let chunk = ByteChunk::copy_from_slice(&[]);
        assert!(chunk.is_empty());
        assert_eq!(chunk, ByteChunk::default());
    }
}

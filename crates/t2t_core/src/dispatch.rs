//! `StreamDispatcher` forwards chunks from a byte source to an output sink.
//!
//! Today every byte is echoed as-is. This is the place where motion commands would be decoded.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::ByteChunk;

pub struct StreamDispatcher<W> {
    sink: W,
    forwarded: u64,
}

impl<W> StreamDispatcher<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(sink: W) -> Self {
        Self { sink, forwarded: 0 }
    }

    ///Write every byte of the chunk to the sink in arrival order, then flush.
    ///
    /// Returns the number of bytes forwarded. A failed write is returned to the caller; bytes already accepted by
    /// the sink are not retracted.
    pub async fn dispatch(&mut self, chunk: ByteChunk) -> io::Result<usize> {
        let len = chunk.len();
        self.sink.write_all(&chunk).await?;
        self.sink.flush().await?;
        self.forwarded += len as u64;
        trace!("dispatched {} bytes ({} total)", len, self.forwarded);
        Ok(len)
    }

    ///Total bytes forwarded since construction.
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn into_sink(self) -> W {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::StreamDispatcher;
    use crate::ByteChunk;

    #[tokio::test]
    async fn forwards_embedded_nul() {
        let mut dispatcher = StreamDispatcher::new(Vec::new());
        let n = dispatcher.dispatch(ByteChunk::from("AB\0C")).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(dispatcher.sink(), &b"AB\0C".to_vec());
    }

    #[tokio::test]
    async fn preserves_order_across_chunks() {
        let mut dispatcher = StreamDispatcher::new(Vec::new());
        for chunk in ["ab", "", "cd", "e"] {
            dispatcher.dispatch(ByteChunk::from(chunk)).await.unwrap();
        }
        assert_eq!(dispatcher.forwarded(), 5);
        assert_eq!(dispatcher.into_sink(), b"abcde".to_vec());
    }

    #[tokio::test]
    async fn write_failure_is_returned() {
        let (writer, reader) = tokio::io::duplex(64);
        drop(reader);
        let mut dispatcher = StreamDispatcher::new(writer);

        let err = dispatcher.dispatch(ByteChunk::from("abc")).await.unwrap_err();

        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
        assert_eq!(dispatcher.forwarded(), 0);
    }
}

use std::{
    fs::Permissions,
    io,
    os::unix::fs::{FileTypeExt, PermissionsExt},
    path::{Path, PathBuf},
};

use nix::{sys::stat::Mode, unistd::mkfifo};
use t2t_core::{error::DaemonError, ByteChunk, ByteSource};
use tokio::{
    io::AsyncReadExt,
    net::unix::pipe::{self, Receiver},
};
use tracing::{debug, info, warn};

use crate::config::FifoConfig;

///Reads the byte stream from a named pipe.
///
/// The pipe is opened read+write, so the read end never sees end-of-file while writers come and go. A read that
/// returns no bytes is reported as an empty chunk.
pub struct FifoSource {
    path: PathBuf,
    create: bool,
    receiver: Receiver,
    buffer: Vec<u8>,
}

impl FifoSource {
    ///Create the fifo if it is missing (and `create` is set) and open it for reading.
    pub async fn open(config: &FifoConfig) -> Result<Self, DaemonError> {
        let unavailable =
            |err: io::Error| DaemonError::ChannelSourceUnavailable(format!("{}: {}", config.path.display(), err));

        ensure_fifo(&config.path, config.create).await.map_err(unavailable)?;
        let receiver = open_receiver(&config.path).map_err(unavailable)?;
        info!("reading from fifo {}", config.path.display());

        Ok(Self {
            path: config.path.clone(),
            create: config.create,
            receiver,
            buffer: vec![0; config.chunk_size.max(1)],
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn chunk_size(&self) -> usize {
        self.buffer.len()
    }
}

impl ByteSource for FifoSource {
    async fn read_chunk(&mut self) -> io::Result<Option<ByteChunk>> {
        let count = self.receiver.read(&mut self.buffer).await?;
        debug!("read {} bytes from fifo", count);
        Ok(Some(ByteChunk::copy_from_slice(&self.buffer[..count])))
    }

    async fn reopen(&mut self) -> io::Result<()> {
        ensure_fifo(&self.path, self.create).await?;
        self.receiver = open_receiver(&self.path)?;
        info!("reopened fifo {}", self.path.display());
        Ok(())
    }
}

fn open_receiver(path: &Path) -> io::Result<Receiver> {
    pipe::OpenOptions::new().read_write(true).open_receiver(path)
}

///Succeeds if `path` is a fifo, creating it with mode 0666 when it is missing and `create` is set.
pub async fn ensure_fifo(path: &Path, create: bool) -> io::Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.file_type().is_fifo() => Ok(()),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a fifo", path.display()),
        )),
        Err(err) if err.kind() == io::ErrorKind::NotFound && create => make_fifo(path).await,
        Err(err) => Err(err),
    }
}

async fn make_fifo(path: &Path) -> io::Result<()> {
    info!("creating fifo {} (mode 0666)", path.display());
    mkfifo(path, Mode::from_bits_truncate(0o666))?;
    //the umask applies to mkfifo, so set the mode explicitly
    tokio::fs::set_permissions(path, Permissions::from_mode(0o666)).await
}

///Remove the fifo at `path`. A missing file is not an error.
pub async fn remove_fifo(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!("removed fifo {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!("fifo {} was already gone", path.display());
            Ok(())
        }
        Err(err) => Err(err),
    }
}

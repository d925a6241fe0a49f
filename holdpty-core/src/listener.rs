//! Platform endpoint: a POSIX filesystem socket or a Windows named pipe,
//! behind a uniform accept/connect surface so `holder.rs` and `peer.rs`
//! don't need `#[cfg]` blocks of their own.

use std::io;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};

/// Anything the framing layer can read from and write to.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

#[cfg(unix)]
pub struct Listener(tokio::net::UnixListener);

#[cfg(unix)]
impl Listener {
    /// Binds the endpoint at `path`, unlinking any leftover socket file
    /// first (best effort — a stale file from a crashed prior holder must
    /// not block startup).
    pub fn bind(path: &Path) -> io::Result<Self> {
        let _ = std::fs::remove_file(path);
        Ok(Self(tokio::net::UnixListener::bind(path)?))
    }

    pub async fn accept(&mut self) -> io::Result<Box<dyn Stream>> {
        let (stream, _addr) = self.0.accept().await?;
        Ok(Box::new(stream))
    }
}

#[cfg(unix)]
pub async fn connect(path: &Path) -> io::Result<Box<dyn Stream>> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(Box::new(stream))
}

#[cfg(windows)]
pub struct Listener {
    name: String,
    next: tokio::net::windows::named_pipe::NamedPipeServer,
}

#[cfg(windows)]
impl Listener {
    /// Creates the first pipe instance at `name`. Each accepted connection
    /// consumes one instance; a fresh instance is created immediately after
    /// so the next `accept` has something to wait on — `ConnectNamedPipe`
    /// cannot be reused post-connect without recreating the handle.
    pub fn bind(name: &str) -> io::Result<Self> {
        let first = tokio::net::windows::named_pipe::ServerOptions::new()
            .first_pipe_instance(true)
            .create(name)?;
        Ok(Self {
            name: name.to_string(),
            next: first,
        })
    }

    pub async fn accept(&mut self) -> io::Result<Box<dyn Stream>> {
        self.next.connect().await?;
        let next = tokio::net::windows::named_pipe::ServerOptions::new().create(&self.name)?;
        let connected = std::mem::replace(&mut self.next, next);
        Ok(Box::new(connected))
    }
}

#[cfg(windows)]
pub async fn connect(name: &str) -> io::Result<Box<dyn Stream>> {
    use std::time::Duration;
    use tokio::net::windows::named_pipe::ClientOptions;

    const ERROR_PIPE_BUSY: i32 = 231;
    loop {
        match ClientOptions::new().open(name) {
            Ok(client) => return Ok(Box::new(client)),
            Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

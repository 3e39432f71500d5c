//! Transport listeners the agent can accept clients on.

use std::fmt;
use std::io;
#[cfg(windows)]
use std::os::windows::io::AsRawHandle;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
use tokio::net::{TcpListener, TcpStream};
#[cfg(windows)]
use tokio::net::windows::named_pipe::{NamedPipeServer, ServerOptions};
#[cfg(windows)]
use windows::{
    Win32::Foundation::HANDLE,
    Win32::System::Pipes::{GetNamedPipeClientProcessId, GetNamedPipeClientSessionId},
};

/// A socket that asynchronously accepts agent client connections.
///
/// Each accept yields the connected stream together with a display string
/// describing the peer (address, credentials or process id, depending on
/// the transport).
#[async_trait]
pub trait ListeningSocket {
    /// Stream type for an accepted connection.
    type Stream: fmt::Debug + AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Wait for a client and return its stream and description.
    async fn accept(&mut self) -> io::Result<(Self::Stream, String)>;
}

#[cfg(unix)]
#[async_trait]
impl ListeningSocket for UnixListener {
    type Stream = UnixStream;

    async fn accept(&mut self) -> io::Result<(Self::Stream, String)> {
        let (stream, addr) = UnixListener::accept(self).await?;
        let client = match stream.peer_cred() {
            Ok(cred) => format!(
                "unix:{addr:?} uid={} gid={} pid={:?}",
                cred.uid(),
                cred.gid(),
                cred.pid()
            ),
            Err(_) => format!("unix:{addr:?}"),
        };
        Ok((stream, client))
    }
}

#[async_trait]
impl ListeningSocket for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(Self::Stream, String)> {
        let (stream, addr) = TcpListener::accept(self).await?;
        Ok((stream, format!("tcp:{addr}")))
    }
}

/// Listener for Windows named pipes.
#[cfg(windows)]
#[derive(Debug)]
pub struct NamedPipeListener(NamedPipeServer, std::ffi::OsString);

#[cfg(windows)]
impl NamedPipeListener {
    /// Bind to a pipe path (e.g. `\\.\pipe\keyhold`).
    pub fn bind(pipe: impl Into<std::ffi::OsString>) -> io::Result<Self> {
        let pipe = pipe.into();
        Ok(NamedPipeListener(
            ServerOptions::new()
                .first_pipe_instance(true)
                .create(&pipe)?,
            pipe,
        ))
    }
}

#[cfg(windows)]
#[async_trait]
impl ListeningSocket for NamedPipeListener {
    type Stream = NamedPipeServer;

    async fn accept(&mut self) -> io::Result<(Self::Stream, String)> {
        self.0.connect().await?;
        let stream = std::mem::replace(&mut self.0, ServerOptions::new().create(&self.1)?);

        let mut pid: u32 = 0;
        let mut session_id: u32 = 0;

        // SAFETY: the handle comes from CreateNamedPipe via tokio's
        // NamedPipeServer, which errors on invalid handles at creation.
        #[allow(unsafe_code)]
        unsafe {
            let _ = GetNamedPipeClientProcessId(HANDLE(stream.as_raw_handle() as isize), &mut pid);
            let _ =
                GetNamedPipeClientSessionId(HANDLE(stream.as_raw_handle() as isize), &mut session_id);
        }

        Ok((stream, format!("pipe: pid={pid} session={session_id}")))
    }
}

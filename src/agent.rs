//! Agent sessions, transport listeners and embedder hooks.

pub mod hooks;
pub mod listener;
pub mod session;

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, info};

pub use self::hooks::{PermissiveHooks, SessionHooks};
pub use self::listener::ListeningSocket;
#[cfg(windows)]
pub use self::listener::NamedPipeListener;
pub use self::session::{Session, SessionBinding, SessionScope};
use crate::error::AgentError;
use crate::key::KeyManager;

/// Accept connections forever, one [`Session`] per client.
///
/// Each accepted stream gets its own task; the session ends when the client
/// disconnects or commits a fatal protocol error. Returns only when the
/// listener itself fails.
pub async fn listen<S: ListeningSocket>(
    mut socket: S,
    manager: Arc<KeyManager>,
    hooks: Arc<dyn SessionHooks>,
) -> Result<(), AgentError> {
    info!("agent listening");
    loop {
        let (mut stream, client) = match socket.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                error!(%error, "failed to accept connection");
                return Err(error.into());
            }
        };

        let manager = manager.clone();
        let hooks = hooks.clone();
        tokio::spawn(async move {
            let mut session = Session::new(manager, hooks, client);
            debug!(session = session.id(), client = session.client(), "client connected");

            let mut chunk = [0u8; 4096];
            loop {
                let read = match stream.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(read) => read,
                    Err(error) => {
                        debug!(session = session.id(), %error, "read failed");
                        break;
                    }
                };

                match session.ingest(&chunk[..read]).await {
                    Ok(replies) => {
                        if !replies.is_empty() && stream.write_all(&replies).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        error!(session = session.id(), %error, "terminating session");
                        break;
                    }
                }
            }

            debug!(session = session.id(), "client disconnected");
        });
    }
}

//! Minimal in-memory agent on a Unix socket.
//!
//! ```sh
//! cargo run --example memory-agent -- /tmp/keyhold.sock
//! SSH_AUTH_SOCK=/tmp/keyhold.sock ssh-add -l
//! ```

#[cfg(unix)]
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::Arc;
    use std::time::Duration;

    use ssh_keyhold::agent::{listen, PermissiveHooks};
    use ssh_keyhold::key::{KeyInfo, KeyManager, KeyManagerObserver, Pbkdf2LockProvider};
    use tracing_subscriber::EnvFilter;

    let colors = std::env::var("SSH_KEYHOLD_LOG_COLORS").map_or(true, |value| value != "0");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SSH_KEYHOLD_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(colors)
        .init();

    struct PrintKeys;

    impl KeyManagerObserver for PrintKeys {
        fn key_added(&self, key: &KeyInfo) {
            eprintln!("+ {} {} ({})", key.fingerprint, key.comment, key.algorithm);
        }

        fn key_removed(&self, fingerprint: &str) {
            eprintln!("- {fingerprint}");
        }
    }

    let socket_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/tmp/keyhold.sock".into());
    let _ = std::fs::remove_file(&socket_path);

    let manager = Arc::new(KeyManager::new());
    manager.set_lock_provider(Box::new(Pbkdf2LockProvider::new()));
    manager.register_observer(Arc::new(PrintKeys));

    {
        let manager = manager.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            loop {
                tick.tick().await;
                manager.cleanup_expired();
            }
        });
    }

    let listener = tokio::net::UnixListener::bind(&socket_path)?;
    eprintln!("listening on {socket_path}");
    listen(listener, manager, Arc::new(PermissiveHooks)).await?;
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("this demo needs a Unix socket; use NamedPipeListener on Windows");
    std::process::exit(1);
}

//! The typebus broker daemon.
//!
//! Binds the broker socket and serves framed commands. Clients connect,
//! register a name and a reply socket, declare the types they accept, and
//! exchange typed messages through the broker:
//!
//!     $ typebusd --socket /tmp/typebus.sock
//!
//! Replies never travel over the inbound connection; each client receives
//! them on the reply socket it declared at registration.

use std::io::BufReader;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use typebus::broker::Broker;
use typebus::protocol;

/// A broker for structurally-typed local message passing.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// The socket to bind. Defaults to $TYPEBUS_SOCKET, then
    /// $XDG_RUNTIME_DIR/typebus.sock, then /tmp/typebus.sock.
    #[arg(long, value_name = "SOCKET")]
    socket: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let path = args
        .socket
        .or_else(typebus::socket_path_from_env)
        .unwrap_or_else(|| PathBuf::from("/tmp/typebus.sock"));

    // A previous run may have left its socket file behind.
    match std::fs::remove_file(&path) {
        Ok(()) => log::debug!("removed stale socket at {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).context(format!("clearing {}", path.display())),
    }

    let listener =
        UnixListener::bind(&path).with_context(|| format!("binding {}", path.display()))?;
    log::info!("listening on {}", path.display());

    let broker = Arc::new(Broker::new());
    for conn in listener.incoming() {
        let conn = conn.context("accept failed")?;
        let broker = Arc::clone(&broker);
        std::thread::spawn(move || serve(&broker, conn));
    }

    Ok(())
}

/// Reads frames off one inbound connection until it closes.
///
/// Command failures are logged by the dispatcher and never tear the
/// connection down; only a transport-level read error ends the loop early.
fn serve(broker: &Broker, conn: UnixStream) {
    log::debug!("connection open");

    let mut reader = BufReader::new(conn);
    loop {
        match protocol::read_frame(&mut reader) {
            Ok(Some(frame)) => {
                let _ = broker.handle_frame(&frame);
            }
            Ok(None) => break,
            Err(e) => {
                log::warn!("closing connection: {}", e);
                break;
            }
        }
    }

    log::debug!("connection closed");
}

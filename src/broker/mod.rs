//! The in-memory broker core.
//!
//! [`Broker::handle_frame`] is the single entry point for raw command frames
//! (a listener reads them off the inbound socket and hands them over, see
//! [`crate::protocol::read_frame`]). The dispatcher parses the frame header,
//! resolves the issuing client, and holds that client's command-serialisation
//! lock for the whole handler, so at most one command executes per client at
//! a time no matter how many transport connections carry its frames. Clients
//! that are not registered yet run unlocked; Register itself enters the
//! registry under its write lock.

mod client;
mod queue;
mod registry;

pub use client::{Client, ReplySink};
pub use queue::MessageQueue;
pub use registry::ClientMap;

use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::protocol::{
    Command, CommandFrame, ProtocolError, RegisterParams, SendParams, SupertypeCache, TypeDesc,
};

/// An error encountered by the broker while executing a command.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The frame or a command body failed to parse.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The frame's client id is not registered.
    #[error("no client with id {0}")]
    NoSuchClient(Uuid),
    /// Send named a recipient that is not registered.
    #[error("no client named {0:?}")]
    NoSuchRecipient(String),
    /// Register under a name that is already taken.
    #[error("client named {0:?} already exists")]
    DuplicateName(String),
    /// AcceptType for a type the client already accepts.
    #[error("type {0} is already accepted")]
    AlreadyRegistered(String),
    /// Get or Empty for a type the client never accepted.
    #[error("no queue for type {0}")]
    NoSuchQueue(String),
    /// Get against a queue with no messages.
    #[error("queue empty")]
    QueueEmpty,
    /// Send found no accepted supertype to route to.
    #[error("no accepting queue for type {0}")]
    NoAcceptingQueue(String),
    /// A payload's length does not match the relevant type's size.
    #[error("payload size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The size the type calls for.
        expected: u64,
        /// The payload length supplied.
        actual: u64,
    },
    /// Trim was asked to relate non-struct types.
    #[error("only struct types relate by prefix")]
    TypeMismatch,
    /// Trim was asked to truncate towards a type that is not a supertype.
    #[error("type {sub} is not a subtype of {sup}")]
    NotASubtype {
        /// The would-be subtype's name.
        sub: String,
        /// The would-be supertype's name.
        sup: String,
    },
    /// Writing to (or opening) a client's reply channel failed.
    #[error("transport failure: {0}")]
    Transport(#[source] std::io::Error),
}

/// Opens reply channels to the paths clients declare at registration.
///
/// The broker connects one channel per Register command and keeps it for the
/// client's lifetime. The default implementation connects a Unix stream
/// socket; tests (and embedders with another transport) substitute their
/// own.
pub trait ReplyConnector: Send + Sync {
    /// Connects to the reply channel at `path`.
    fn connect(&self, path: &Path) -> std::io::Result<ReplySink>;
}

/// Connects a `SOCK_STREAM` Unix socket at the declared path.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixReplyConnector;

impl ReplyConnector for UnixReplyConnector {
    fn connect(&self, path: &Path) -> std::io::Result<ReplySink> {
        Ok(Box::new(UnixStream::connect(path)?))
    }
}

/// The broker core: the client registry, the supertype-enumeration cache,
/// and the reply-channel connector.
pub struct Broker {
    clients: ClientMap,
    supertypes: SupertypeCache,
    connector: Box<dyn ReplyConnector>,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker").finish_non_exhaustive()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    /// Creates a broker that opens Unix-socket reply channels.
    pub fn new() -> Self {
        Self::with_connector(Box::new(UnixReplyConnector))
    }

    /// Creates a broker with a custom reply-channel connector.
    pub fn with_connector(connector: Box<dyn ReplyConnector>) -> Self {
        Self {
            clients: ClientMap::new(),
            supertypes: SupertypeCache::new(),
            connector,
        }
    }

    /// Looks up a client by identifier.
    pub fn client_by_id(&self, id: Uuid) -> Option<Arc<Client>> {
        self.clients.get_by_id(id)
    }

    /// Looks up a client by name.
    pub fn client_by_name(&self, name: &str) -> Option<Arc<Client>> {
        self.clients.get_by_name(name)
    }

    /// Removes a client record; both registry indices are cleared
    /// atomically. Messages already queued for the client are dropped with
    /// it.
    pub fn remove_client(&self, id: Uuid) -> Result<(), BrokerError> {
        self.clients.remove(id)
    }

    /// Executes one raw command frame.
    ///
    /// Failures are logged with the command tag and client id and returned
    /// to the caller; no failure is fatal to the broker or to any
    /// connection, and no negative reply is written.
    pub fn handle_frame(&self, raw: &[u8]) -> Result<(), BrokerError> {
        let frame = match CommandFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("dropping unparseable frame: {}", e);
                return Err(e.into());
            }
        };

        let result = self.dispatch(&frame);
        if let Err(e) = &result {
            log::warn!(
                "command {:?} from client {} failed: {}",
                frame.tag,
                frame.client_id,
                e
            );
        }
        result
    }

    fn dispatch(&self, frame: &CommandFrame<'_>) -> Result<(), BrokerError> {
        let client = self.clients.get_by_id(frame.client_id);
        // At most one in-flight command per client, reply write included.
        let _serial = client.as_ref().map(|cl| cl.lock_commands());
        let known = || {
            client
                .as_deref()
                .ok_or(BrokerError::NoSuchClient(frame.client_id))
        };

        match Command::parse(frame.tag, frame.payload)? {
            Command::Register(params) => self.register(frame.client_id, params),
            Command::AcceptType(ty) => known()?.accept_type(ty),
            Command::Send(params) => {
                known()?;
                self.send(params)
            }
            Command::Get(ty) => {
                let client = known()?;
                let payload = client.pop(&ty)?;
                client.reply(&payload)
            }
            Command::Empty(ty) => {
                let client = known()?;
                let empty = client.queue_empty(&ty)?;
                client.reply(&[u8::from(empty)])
            }
        }
    }

    fn register(&self, id: Uuid, params: RegisterParams) -> Result<(), BrokerError> {
        let sink = self
            .connector
            .connect(&params.path)
            .map_err(BrokerError::Transport)?;

        let client = Arc::new(Client::new(id, params.name, params.path, sink));
        let name = client.name().to_owned();
        self.clients.add(client)?;

        log::info!("registered client {:?} ({})", name, id);
        Ok(())
    }

    fn send(&self, params: SendParams) -> Result<(), BrokerError> {
        let SendParams {
            recipient,
            ty,
            message,
        } = params;

        let recipient = self
            .clients
            .get_by_name(&recipient)
            .ok_or(BrokerError::NoSuchRecipient(recipient))?;

        recipient.deliver(&ty, message, &self.supertypes)
    }
}

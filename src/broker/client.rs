//! Per-client state and routing.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use uuid::Uuid;

use crate::protocol::{SupertypeCache, TypeDesc};

use super::{BrokerError, MessageQueue};

/// A client's outbound reply channel.
pub type ReplySink = Box<dyn Write + Send>;

/// A registered client.
///
/// Three locks guard a record, acquired in this order when combined:
/// the command-serialisation mutex (held by the dispatcher for the whole of
/// each command, reply write included), the structural mutex over the
/// accepted-types list and queue map, and the route-cache lock. Individual
/// queues synchronise themselves; touching one requires none of the above.
pub struct Client {
    id: Uuid,
    name: String,
    path: PathBuf,
    exec: Mutex<()>,
    shape: Mutex<Shape>,
    // Maps a sender-asserted type to the accepted supertype it routes to.
    // Pure memoisation: always reconstructible from the queue map, cleared
    // wholesale whenever the accepted set changes.
    routes: RwLock<HashMap<TypeDesc, TypeDesc>>,
    sink: Mutex<ReplySink>,
}

#[derive(Default)]
struct Shape {
    accepted: Vec<TypeDesc>,
    queues: HashMap<TypeDesc, Arc<MessageQueue>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a record for a client reachable through `sink`.
    pub fn new(
        id: Uuid,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        sink: ReplySink,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            path: path.into(),
            exec: Mutex::new(()),
            shape: Mutex::new(Shape::default()),
            routes: RwLock::new(HashMap::new()),
            sink: Mutex::new(sink),
        }
    }

    /// The client's identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The client's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The path of the client's reply socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A snapshot of the accepted types, in registration order.
    pub fn accepted_types(&self) -> Vec<TypeDesc> {
        self.shape.lock().unwrap().accepted.clone()
    }

    /// Holds off every other command for this client while the guard lives.
    pub(crate) fn lock_commands(&self) -> MutexGuard<'_, ()> {
        self.exec.lock().unwrap()
    }

    /// Declares a new accepted type and creates its queue.
    ///
    /// Fails with [`BrokerError::AlreadyRegistered`] if the type was
    /// accepted before. The route cache is invalidated wholesale: the new
    /// type may shadow any previously resolved route.
    pub fn accept_type(&self, ty: TypeDesc) -> Result<(), BrokerError> {
        let elem_size = ty.size()?;

        {
            let mut shape = self.shape.lock().unwrap();
            if shape.queues.contains_key(&ty) {
                return Err(BrokerError::AlreadyRegistered(ty.name()));
            }
            shape.accepted.push(ty.clone());
            shape
                .queues
                .insert(ty, Arc::new(MessageQueue::new(elem_size)));
        }

        self.routes.write().unwrap().clear();
        Ok(())
    }

    /// Routes a message of sender-asserted type `ty` into the best accepted
    /// queue.
    ///
    /// The first entry of `ty`'s supertype list (self first, then shrinking
    /// prefixes) with an accepted queue wins, so the longest accepted prefix
    /// is selected. The resolution is memoised per recipient. A message
    /// routed to a proper supertype is trimmed to that supertype's size
    /// before enqueueing.
    pub fn deliver(
        &self,
        ty: &TypeDesc,
        payload: Vec<u8>,
        supertypes: &SupertypeCache,
    ) -> Result<(), BrokerError> {
        if let Some(accepted) = self.cached_route(ty) {
            return self.enqueue_as(ty, &accepted, payload);
        }

        let list = supertypes.supertypes(ty);
        let accepted = {
            let shape = self.shape.lock().unwrap();
            match list.iter().find(|sup| shape.queues.contains_key(*sup)) {
                Some(sup) => sup.clone(),
                None => return Err(BrokerError::NoAcceptingQueue(ty.name())),
            }
        };

        log::debug!(
            "client {:?}: routing {} as {}",
            self.name,
            ty.name(),
            accepted.name()
        );
        self.routes
            .write()
            .unwrap()
            .insert(ty.clone(), accepted.clone());

        self.enqueue_as(ty, &accepted, payload)
    }

    fn cached_route(&self, ty: &TypeDesc) -> Option<TypeDesc> {
        self.routes.read().unwrap().get(ty).cloned()
    }

    fn enqueue_as(
        &self,
        ty: &TypeDesc,
        accepted: &TypeDesc,
        payload: Vec<u8>,
    ) -> Result<(), BrokerError> {
        let queue = self
            .queue(accepted)
            .ok_or_else(|| BrokerError::NoSuchQueue(accepted.name()))?;

        let payload = if accepted == ty {
            payload
        } else {
            trim(ty, accepted, &payload)?
        };

        queue.push(payload)
    }

    fn queue(&self, ty: &TypeDesc) -> Option<Arc<MessageQueue>> {
        self.shape.lock().unwrap().queues.get(ty).cloned()
    }

    /// Pops one message from the queue for exactly `ty`; no supertype walk.
    pub fn pop(&self, ty: &TypeDesc) -> Result<Vec<u8>, BrokerError> {
        let queue = self
            .queue(ty)
            .ok_or_else(|| BrokerError::NoSuchQueue(ty.name()))?;
        queue.pop()
    }

    /// Whether the queue for exactly `ty` is empty.
    ///
    /// Fails with [`BrokerError::NoSuchQueue`] if the type was never
    /// accepted.
    pub fn queue_empty(&self, ty: &TypeDesc) -> Result<bool, BrokerError> {
        let queue = self
            .queue(ty)
            .ok_or_else(|| BrokerError::NoSuchQueue(ty.name()))?;
        Ok(queue.is_empty())
    }

    /// Writes `bytes` to the client's reply channel.
    pub fn reply(&self, bytes: &[u8]) -> Result<(), BrokerError> {
        let mut sink = self.sink.lock().unwrap();
        sink.write_all(bytes)
            .and_then(|()| sink.flush())
            .map_err(BrokerError::Transport)
    }

    #[cfg(test)]
    pub(crate) fn cached_route_count(&self) -> usize {
        self.routes.read().unwrap().len()
    }
}

/// Truncates a payload of type `from` for acceptance under `to`.
///
/// Requires both types to be structs, `to` to be a strict prefix supertype
/// of `from`, and the payload to be exactly `from`'s size; the result keeps
/// the leading `to.size()` bytes.
pub(crate) fn trim(
    from: &TypeDesc,
    to: &TypeDesc,
    payload: &[u8],
) -> Result<Vec<u8>, BrokerError> {
    if !matches!(from, TypeDesc::Struct(_)) || !matches!(to, TypeDesc::Struct(_)) {
        return Err(BrokerError::TypeMismatch);
    }
    if !from.is_subtype_of(to) {
        return Err(BrokerError::NotASubtype {
            sub: from.name(),
            sup: to.name(),
        });
    }

    let full = from.size()?;
    if payload.len() as u64 != full {
        return Err(BrokerError::SizeMismatch {
            expected: full,
            actual: payload.len() as u64,
        });
    }

    let keep = to.size()? as usize;
    Ok(payload[..keep].to_vec())
}

//! The client directory.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use super::{BrokerError, Client};

/// The registry of live clients, indexed by identifier and by name.
///
/// Both indices live behind a single readers-writer lock and always refer to
/// the same set of records; lookups return shared, long-lived handles.
#[derive(Debug, Default)]
pub struct ClientMap {
    inner: RwLock<Indices>,
}

#[derive(Debug, Default)]
struct Indices {
    by_id: HashMap<Uuid, Arc<Client>>,
    by_name: HashMap<String, Arc<Client>>,
}

impl ClientMap {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a client record.
    ///
    /// Fails with [`BrokerError::DuplicateName`] if the name is taken; the
    /// existing record is left untouched.
    pub fn add(&self, client: Arc<Client>) -> Result<(), BrokerError> {
        let mut indices = self.inner.write().unwrap();
        if indices.by_name.contains_key(client.name()) {
            return Err(BrokerError::DuplicateName(client.name().to_owned()));
        }

        indices
            .by_name
            .insert(client.name().to_owned(), Arc::clone(&client));
        indices.by_id.insert(client.id(), client);
        Ok(())
    }

    /// Looks up a client by identifier.
    pub fn get_by_id(&self, id: Uuid) -> Option<Arc<Client>> {
        self.inner.read().unwrap().by_id.get(&id).cloned()
    }

    /// Looks up a client by name.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<Client>> {
        self.inner.read().unwrap().by_name.get(name).cloned()
    }

    /// Removes a client record, clearing both indices in one critical
    /// section.
    pub fn remove(&self, id: Uuid) -> Result<(), BrokerError> {
        let mut indices = self.inner.write().unwrap();
        let client = indices
            .by_id
            .remove(&id)
            .ok_or(BrokerError::NoSuchClient(id))?;
        indices.by_name.remove(client.name());
        Ok(())
    }
}

//! Persisted client identity
//!
//! A client's UUID is stable across restarts: the registry stores one UUID
//! per role in a JSON file and hands it back on every lease. The registry
//! is an explicit object shared between the clients of one process, never
//! process-global state; it is safe to dial and close concurrently from
//! several client handles.

use crate::ClientError;
use corral_trust::Role;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Process-shared store of persisted client UUIDs
pub struct UuidRegistry {
    path: Option<PathBuf>,
    leased: Mutex<HashMap<String, Uuid>>,
}

impl UuidRegistry {
    /// A registry backed by a JSON file; parent directories are created on
    /// first persist
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            leased: Mutex::new(HashMap::new()),
        }
    }

    /// A registry without persistence; every lease generates a fresh UUID
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            leased: Mutex::new(HashMap::new()),
        }
    }

    /// Lease the UUID for `role`
    ///
    /// The first lease per role loads the stored UUID (generating and
    /// persisting one if absent). While that lease is held, further leases
    /// for the same role get fresh, unpersisted UUIDs so two live clients
    /// never share an identity.
    pub fn lease(&self, role: Role) -> Result<Uuid, ClientError> {
        let key = role.to_string();
        let mut leased = self.leased.lock().unwrap();

        if leased.contains_key(&key) {
            let uuid = Uuid::new_v4();
            debug!(%role, %uuid, "role identity already leased, using ephemeral uuid");
            return Ok(uuid);
        }

        let mut store = self.load_store()?;
        let uuid = match store.get(&key) {
            Some(uuid) => *uuid,
            None => {
                let uuid = Uuid::new_v4();
                store.insert(key.clone(), uuid);
                self.persist_store(&store)?;
                uuid
            }
        };

        leased.insert(key, uuid);
        Ok(uuid)
    }

    /// Release a leased UUID; no-op for ephemeral leases
    pub fn release(&self, role: Role, uuid: Uuid) {
        let key = role.to_string();
        let mut leased = self.leased.lock().unwrap();
        if leased.get(&key) == Some(&uuid) {
            leased.remove(&key);
        }
    }

    fn load_store(&self) -> Result<HashMap<String, Uuid>, ClientError> {
        let Some(path) = &self.path else {
            return Ok(HashMap::new());
        };
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ClientError::Configuration(format!("corrupt uuid store {path:?}: {e}"))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(ClientError::Configuration(format!(
                "cannot read uuid store {path:?}: {e}"
            ))),
        }
    }

    fn persist_store(&self, store: &HashMap<String, Uuid>) -> Result<(), ClientError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ClientError::Configuration(format!("cannot create uuid store dir: {e}"))
            })?;
        }
        let bytes = serde_json::to_vec_pretty(store).map_err(|e| {
            ClientError::Configuration(format!("cannot encode uuid store: {e}"))
        })?;
        std::fs::write(path, bytes).map_err(|e| {
            ClientError::Configuration(format!("cannot write uuid store {path:?}: {e}"))
        })
    }
}

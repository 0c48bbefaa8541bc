//! The process registry (C1): a concurrent map from structured keys to
//! worker handles, plus a `dispatch` operator that fans out to every entry
//! registered under a dispatch group.
//!
//! Implemented as a [`DashMap`] keyed on [`RegistryKey`], with values
//! type-erased behind `Arc<dyn Any + Send + Sync>` so the registry stays
//! generic over whatever worker handle a caller registers (buffers,
//! caches, adaptor ingest handles, ...).

use crate::error::LifecycleError;
use crate::event::SourceId;
use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;

/// Per-source role a worker is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Buffer,
    Cache,
    Supervisor,
    Pipeline,
}

impl RegistryKey {
    /// The source a key belongs to, for error reporting on collision.
    fn source_id(&self) -> SourceId {
        match self {
            RegistryKey::Worker(source_id, _) => *source_id,
            RegistryKey::Backend { source_id, .. } => *source_id,
        }
    }
}

/// The unique name a handle is registered under. Registration is
/// idempotent: a second `register` under the same name fails with
/// `already_started`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegistryKey {
    /// `(source_id, role)`.
    Worker(SourceId, Role),
    /// `(source_id, backend_marker, backend_id, sub_role)`.
    Backend {
        source_id: SourceId,
        backend_id: u64,
        sub_role: &'static str,
    },
}

/// An entry stored in the registry: a type-erased handle plus the
/// dispatch group it should be visible under (if any). Backend entries
/// use `source_id` as their dispatch group so [`Registry::dispatch`] can
/// find every adaptor subscribed to a source.
#[derive(Clone)]
pub struct Entry {
    pub handle: Arc<dyn Any + Send + Sync>,
    pub dispatch_group: Option<SourceId>,
}

impl Entry {
    pub fn new<T: Any + Send + Sync>(handle: Arc<T>, dispatch_group: Option<SourceId>) -> Self {
        Self {
            handle,
            dispatch_group,
        }
    }
}

#[derive(Default)]
pub struct Registry {
    entries: DashMap<RegistryKey, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` under `name`. Fails with `AlreadyStarted` if the
    /// name is already taken — names are unique cluster-locally, and
    /// collision reporting is the only thing callers use to detect a
    /// racing concurrent start.
    pub fn register(
        &self,
        name: RegistryKey,
        entry: Entry,
    ) -> Result<(), LifecycleError> {
        let source_id = name.source_id();
        match self.entries.entry(name) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(LifecycleError::AlreadyStarted(source_id))
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(entry);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, name: &RegistryKey) -> Option<Entry> {
        self.entries.get(name).map(|e| e.clone())
    }

    pub fn unregister(&self, name: &RegistryKey) -> Option<Entry> {
        self.entries.remove(name).map(|(_, e)| e)
    }

    pub fn contains(&self, name: &RegistryKey) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns a consistent snapshot of every entry whose dispatch group
    /// equals `group`, taken at call time. Entries unregistered after the
    /// snapshot is taken are not visited by the caller.
    pub fn dispatch_snapshot(&self, group: SourceId) -> Vec<Entry> {
        self.entries
            .iter()
            .filter(|e| e.dispatch_group == Some(group))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Removes every entry whose dispatch group is `group`. Used by the
    /// source supervisor on `stop` to tear down every backend registered
    /// for a source without tracking their individual names.
    pub fn unregister_group(&self, group: SourceId) {
        self.entries.retain(|_, e| e.dispatch_group != Some(group));
    }
}

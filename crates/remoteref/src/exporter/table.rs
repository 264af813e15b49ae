//! Export table
//!
//! Maps object identities to export entries. Lookups and call accounting
//! take the read lock; registration and removal take the write lock, so a
//! non-forced removal cannot race with a call that is just beginning.

use super::method_table::{MethodTable, Skeleton};
use super::object::RemoteObject;
use crate::error::{RemoteError, Result};
use crate::stub::StubKind;
use crate::types::{InterfaceDef, ObjectIdentity};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One exported object
pub struct ExportEntry {
    pub identity: ObjectIdentity,
    pub implementation: Arc<dyn RemoteObject>,
    pub interfaces: &'static [&'static InterfaceDef],
    pub methods: MethodTable,
    /// Present only for objects exported with an indexed static stub
    pub skeleton: Option<Skeleton>,
    pub stub: StubKind,
    /// Runtime-internal object
    pub system: bool,
    in_flight: AtomicUsize,
}

impl ExportEntry {
    pub fn new(
        identity: ObjectIdentity,
        implementation: Arc<dyn RemoteObject>,
        methods: MethodTable,
        skeleton: Option<Skeleton>,
        stub: StubKind,
        system: bool,
    ) -> Self {
        Self {
            identity,
            interfaces: implementation.interfaces(),
            implementation,
            methods,
            skeleton,
            stub,
            system,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Calls currently dispatched against this entry
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn instance_key(&self) -> usize {
        instance_key(&self.implementation)
    }
}

fn instance_key(implementation: &Arc<dyn RemoteObject>) -> usize {
    Arc::as_ptr(implementation) as *const () as usize
}

/// Keeps an entry counted as busy until dropped
pub struct CallGuard {
    entry: Arc<ExportEntry>,
}

impl CallGuard {
    pub fn entry(&self) -> &Arc<ExportEntry> {
        &self.entry
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.entry.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Default)]
struct Tables {
    entries: HashMap<ObjectIdentity, Arc<ExportEntry>>,
    /// Live implementation allocations -> identity
    instances: HashMap<usize, ObjectIdentity>,
}

/// Per-runtime map of exported objects
#[derive(Default)]
pub struct ExportTable {
    tables: RwLock<Tables>,
}

impl ExportTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; fails if the identity or implementation is already live
    pub fn register(&self, entry: ExportEntry) -> Result<Arc<ExportEntry>> {
        let mut tables = self.tables.write();
        if tables.entries.contains_key(&entry.identity) {
            return Err(RemoteError::Export(format!(
                "identity {} already exported",
                entry.identity
            )));
        }
        let key = entry.instance_key();
        if let Some(existing) = tables.instances.get(&key) {
            return Err(RemoteError::Export(format!(
                "implementation already exported as {}",
                existing
            )));
        }

        let entry = Arc::new(entry);
        tables.instances.insert(key, entry.identity);
        tables.entries.insert(entry.identity, Arc::clone(&entry));
        Ok(entry)
    }

    pub fn lookup(&self, identity: &ObjectIdentity) -> Option<Arc<ExportEntry>> {
        self.tables.read().entries.get(identity).cloned()
    }

    /// Identity under which `implementation` is exported, if any
    pub fn identity_of(&self, implementation: &Arc<dyn RemoteObject>) -> Option<ObjectIdentity> {
        self.tables
            .read()
            .instances
            .get(&instance_key(implementation))
            .copied()
    }

    /// Look up an entry and count a call against it
    pub fn begin_call(&self, identity: &ObjectIdentity) -> Option<CallGuard> {
        let tables = self.tables.read();
        let entry = tables.entries.get(identity)?;
        entry.in_flight.fetch_add(1, Ordering::AcqRel);
        Some(CallGuard {
            entry: Arc::clone(entry),
        })
    }

    /// Remove an entry.
    ///
    /// Returns `Ok(false)` without removing when `force` is false and calls
    /// are in flight. Calls already dispatched keep their entry alive and
    /// complete normally.
    pub fn remove(&self, identity: &ObjectIdentity, force: bool) -> Result<bool> {
        let mut tables = self.tables.write();
        let Some(entry) = tables.entries.get(identity) else {
            return Err(RemoteError::NoSuchObject(*identity));
        };
        if !force && entry.in_flight() > 0 {
            return Ok(false);
        }
        let key = entry.instance_key();
        tables.entries.remove(identity);
        tables.instances.remove(&key);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.tables.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().entries.is_empty()
    }

    pub fn identities(&self) -> Vec<ObjectIdentity> {
        self.tables.read().entries.keys().copied().collect()
    }

    /// Remove every non-system entry
    pub fn clear_user_objects(&self) -> usize {
        let mut tables = self.tables.write();
        let doomed: Vec<_> = tables
            .entries
            .values()
            .filter(|entry| !entry.system)
            .map(|entry| (entry.identity, entry.instance_key()))
            .collect();
        for (identity, key) in &doomed {
            tables.entries.remove(identity);
            tables.instances.remove(key);
        }
        doomed.len()
    }
}

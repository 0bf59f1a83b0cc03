//! Namespaced variable store shared by scripts and conditions.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Namespace used by the unqualified accessors.
pub const DEFAULT_NAMESPACE: &str = "game";

/// Persistent game variables, grouped by namespace.
///
/// Values are kept as JSON so the whole store is always serializable. Writes of
/// values that cannot be represented as JSON are dropped with a warning.
///
/// # Examples
///
/// ```
/// use libretto_core::Store;
///
/// let mut store = Store::default();
/// store.set("met_alice", true);
/// assert_eq!(store.get::<bool>("met_alice"), Some(true));
/// assert_eq!(store.get::<bool>("unknown"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Store {
    namespaces: BTreeMap<String, BTreeMap<String, JsonValue>>,
}

impl Store {
    /// Read a value from the default namespace.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_in(DEFAULT_NAMESPACE, key)
    }

    /// Write a value into the default namespace, returning the previous raw value.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Option<JsonValue> {
        self.set_in(DEFAULT_NAMESPACE, key, value)
    }

    /// Read a value from a namespace.
    ///
    /// Returns `None` when the key is missing or holds a value of another type.
    pub fn get_in<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<T> {
        let raw = self.raw(namespace, key)?;
        serde_json::from_value(raw.clone()).ok()
    }

    /// Write a value into a namespace, returning the previous raw value.
    pub fn set_in<T: Serialize>(&mut self, namespace: &str, key: &str, value: T) -> Option<JsonValue> {
        match serde_json::to_value(value) {
            Ok(json) => {
                debug!(namespace, key, "Setting store value");
                self.namespaces
                    .entry(namespace.to_string())
                    .or_default()
                    .insert(key.to_string(), json)
            }
            Err(e) => {
                warn!(namespace, key, error = %e, "Store value is not serializable; write ignored");
                self.raw(namespace, key).cloned()
            }
        }
    }

    /// Remove a value from a namespace.
    pub fn remove_in(&mut self, namespace: &str, key: &str) -> Option<JsonValue> {
        let values = self.namespaces.get_mut(namespace)?;
        let removed = values.remove(key);
        if values.is_empty() {
            self.namespaces.remove(namespace);
        }
        removed
    }

    /// Raw JSON value stored under a key.
    pub fn raw(&self, namespace: &str, key: &str) -> Option<&JsonValue> {
        self.namespaces.get(namespace)?.get(key)
    }

    /// Put a raw value back, or remove the key when `value` is `None`.
    pub fn restore_raw(&mut self, namespace: &str, key: &str, value: Option<JsonValue>) {
        match value {
            Some(value) => {
                self.namespaces
                    .entry(namespace.to_string())
                    .or_default()
                    .insert(key.to_string(), value);
            }
            None => {
                self.remove_in(namespace, key);
            }
        }
    }

    /// Names of all non-empty namespaces.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    /// Whether the store holds no values.
    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// Remove every value.
    pub fn clear(&mut self) {
        self.namespaces.clear();
    }
}

/// A store write recorded by a script so it can be reverted.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreWrite {
    /// Namespace written to
    pub namespace: String,
    /// Key written to
    pub key: String,
    /// Value before the write
    pub previous: Option<JsonValue>,
}

/// Mutable view handed to script actions.
///
/// Every write is journaled so the history can undo it without help from the script.
pub struct ScriptCtx<'a> {
    store: &'a mut Store,
    writes: Vec<StoreWrite>,
}

impl<'a> ScriptCtx<'a> {
    /// Wrap a store for one script invocation.
    pub fn new(store: &'a mut Store) -> Self {
        Self {
            store,
            writes: Vec::new(),
        }
    }

    /// Read a value from the default namespace.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.store.get(key)
    }

    /// Read a value from a namespace.
    pub fn get_in<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<T> {
        self.store.get_in(namespace, key)
    }

    /// Write a value into the default namespace.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) {
        self.set_in(DEFAULT_NAMESPACE, key, value);
    }

    /// Write a value into a namespace.
    pub fn set_in<T: Serialize>(&mut self, namespace: &str, key: &str, value: T) {
        let previous = self.store.raw(namespace, key).cloned();
        self.store.set_in(namespace, key, value);
        self.writes.push(StoreWrite {
            namespace: namespace.to_string(),
            key: key.to_string(),
            previous,
        });
    }

    /// Remove a value from a namespace.
    pub fn remove_in(&mut self, namespace: &str, key: &str) {
        let previous = self.store.remove_in(namespace, key);
        self.writes.push(StoreWrite {
            namespace: namespace.to_string(),
            key: key.to_string(),
            previous,
        });
    }

    /// Read-only access to the underlying store.
    pub fn store(&self) -> &Store {
        self.store
    }

    /// Writes performed so far, oldest first.
    pub fn into_writes(self) -> Vec<StoreWrite> {
        self.writes
    }
}

/// Read-only view handed to condition lambdas and choice guards.
#[derive(Clone, Copy)]
pub struct LambdaCtx<'a> {
    store: &'a Store,
}

impl<'a> LambdaCtx<'a> {
    /// Wrap a store for one evaluation.
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Read a value from the default namespace.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.store.get(key)
    }

    /// Read a value from a namespace.
    pub fn get_in<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<T> {
        self.store.get_in(namespace, key)
    }

    /// The underlying store.
    pub fn store(&self) -> &Store {
        self.store
    }
}

/// Revert journaled writes, newest first.
pub fn revert_writes(store: &mut Store, writes: Vec<StoreWrite>) {
    for write in writes.into_iter().rev() {
        store.restore_raw(&write.namespace, &write.key, write.previous);
    }
}

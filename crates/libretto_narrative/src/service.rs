//! Pluggable services persisted with every snapshot.

use libretto_error::{LibrettoResult, RuntimeGameError, RuntimeGameErrorKind};
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

/// Host-provided state that travels with saved games.
///
/// # Examples
///
/// ```
/// use libretto_narrative::Service;
/// use libretto_error::LibrettoResult;
/// use serde_json::{json, Value};
///
/// struct Achievements(Vec<String>);
///
/// impl Service for Achievements {
///     fn name(&self) -> &str {
///         "achievements"
///     }
///
///     fn serialize(&self) -> LibrettoResult<Value> {
///         Ok(json!(self.0))
///     }
///
///     fn deserialize(&mut self, data: Value) -> LibrettoResult<()> {
///         self.0 = serde_json::from_value(data).map_err(libretto_error::JsonError::from)?;
///         Ok(())
///     }
/// }
/// ```
pub trait Service {
    /// Key the service state is saved under.
    fn name(&self) -> &str;

    /// Snapshot the service state.
    fn serialize(&self) -> LibrettoResult<JsonValue>;

    /// Restore a snapshot produced by [`serialize`](Self::serialize).
    fn deserialize(&mut self, data: JsonValue) -> LibrettoResult<()>;
}

/// Shared handle to a registered service.
pub type ServiceHandle = Rc<RefCell<dyn Service>>;

/// Services registered on a game, keyed by name.
#[derive(Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, ServiceHandle>,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ServiceRegistry {
    /// Register a service, replacing any service with the same name.
    pub fn register(&mut self, service: ServiceHandle) {
        let name = service.borrow().name().to_string();
        debug!(%name, "Registering service");
        if self.services.insert(name.clone(), service).is_some() {
            warn!(%name, "Service replaced");
        }
    }

    /// Service registered under `name`.
    pub fn get(&self, name: &str) -> Option<ServiceHandle> {
        self.services.get(name).cloned()
    }

    /// Names of the registered services.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Snapshot every service.
    ///
    /// # Errors
    ///
    /// Returns the first service failure.
    pub fn serialize_all(&self) -> LibrettoResult<BTreeMap<String, JsonValue>> {
        let mut out = BTreeMap::new();
        for (name, service) in &self.services {
            let data = service
                .borrow()
                .serialize()
                .map_err(|e| service_error(name, e))?;
            out.insert(name.clone(), data);
        }
        Ok(out)
    }

    /// Restore every saved service state. Unknown names are skipped.
    ///
    /// Either every service takes its saved state or none does: when one
    /// fails, the services restored before it get their previous state back.
    ///
    /// # Errors
    ///
    /// Returns the first service failure.
    pub fn restore_all(&self, saved: &BTreeMap<String, JsonValue>) -> LibrettoResult<()> {
        let previous = self.serialize_all()?;
        let mut restored: Vec<&str> = Vec::new();
        for (name, data) in saved {
            let Some(service) = self.services.get(name) else {
                warn!(%name, "Saved state for unregistered service ignored");
                continue;
            };
            let outcome = service.borrow_mut().deserialize(data.clone());
            if let Err(e) = outcome {
                self.roll_back(&restored, &previous);
                return Err(service_error(name, e).into());
            }
            restored.push(name);
        }
        Ok(())
    }

    fn roll_back(&self, names: &[&str], previous: &BTreeMap<String, JsonValue>) {
        for name in names {
            let (Some(service), Some(data)) = (self.services.get(*name), previous.get(*name)) else {
                continue;
            };
            if let Err(e) = service.borrow_mut().deserialize(data.clone()) {
                warn!(%name, error = %e, "Service could not be rolled back");
            } else {
                debug!(%name, "Service rolled back");
            }
        }
    }
}

#[track_caller]
fn service_error(name: &str, err: impl fmt::Display) -> RuntimeGameError {
    RuntimeGameError::new(RuntimeGameErrorKind::Service {
        name: name.to_string(),
        reason: err.to_string(),
    })
}

//! The mutable, queryable index of component registrations.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::error::ResolveError;
use crate::registration::{ComponentRegistration, RegistrationId};
use crate::service::ServiceKey;

/// Read access to the current registration set, handed to sources so
/// adapters can enumerate what they adapt. Looking up a key may itself
/// trigger lazy synthesis for that key.
pub trait RegistrationLookup {
  fn registrations_for_service(&mut self, service: &ServiceKey) -> Vec<Arc<ComponentRegistration>>;
}

/// A pluggable provider that synthesizes registrations for services with no
/// direct match (open generics, collections, decorators, ...).
///
/// A source never mutates shared state: it only returns registrations, and
/// the registry decides whether to cache them. Returning an empty vec is a
/// silent decline; the registry tries the next source.
pub trait RegistrationSource: Send + Sync {
  fn registrations_for(
    &self,
    service: &ServiceKey,
    lookup: &mut dyn RegistrationLookup,
  ) -> Vec<Arc<ComponentRegistration>>;

  /// True when the source's output depends on the current registration set
  /// for other services ("all implementations of X" adapters). Such sources
  /// are re-queried whenever a new direct registration appears.
  fn is_adapter_for_individual_components(&self) -> bool {
    false
  }
}

struct SynthesizedEntry {
  adapter: bool,
  ids: Vec<RegistrationId>,
}

struct RegistryInner {
  /// Registration lists per key, in registration order; the last entry wins
  /// direct lookups.
  by_service: HashMap<ServiceKey, Vec<Arc<ComponentRegistration>>>,
  sources: Vec<Arc<dyn RegistrationSource>>,
  /// Keys whose source chain has been consulted, successfully or not.
  initialized: HashSet<ServiceKey>,
  /// Keys whose source query is in flight; blocks infinite source re-entry.
  initializing: HashSet<ServiceKey>,
  /// Provenance of memoized source output, for adapter invalidation.
  synthesized: HashMap<ServiceKey, SynthesizedEntry>,
}

impl RegistryInner {
  fn new() -> Self {
    Self {
      by_service: HashMap::new(),
      sources: Vec::new(),
      initialized: HashSet::new(),
      initializing: HashSet::new(),
      synthesized: HashMap::new(),
    }
  }

  fn index(&mut self, registration: Arc<ComponentRegistration>) {
    for service in registration.services().to_vec() {
      self
        .by_service
        .entry(service)
        .or_default()
        .push(registration.clone());
    }
  }

  fn register(&mut self, registration: Arc<ComponentRegistration>) {
    debug!("registering {:?}", registration);
    self.index(registration);
    self.invalidate_adapter_backed();
  }

  fn add_source(&mut self, source: Arc<dyn RegistrationSource>) {
    self.sources.push(source);
    // A key that previously missed may be satisfiable by the new source, so
    // its negative memo is dropped. Keys with indexed registrations keep
    // theirs; re-consulting them would duplicate synthesized entries.
    let by_service = &self.by_service;
    self
      .initialized
      .retain(|key| by_service.get(key).map_or(false, |list| !list.is_empty()));
  }

  /// Un-memoizes every key whose cached entries came from an adapter source.
  /// Their next query re-synthesizes against the now-larger registration set.
  fn invalidate_adapter_backed(&mut self) {
    let stale: Vec<ServiceKey> = self
      .synthesized
      .iter()
      .filter(|(_, entry)| entry.adapter)
      .map(|(key, _)| key.clone())
      .collect();
    for key in stale {
      if let Some(entry) = self.synthesized.remove(&key) {
        trace!("invalidating adapter-backed registrations for {}", key);
        if let Some(list) = self.by_service.get_mut(&key) {
          list.retain(|reg| !entry.ids.contains(&reg.id()));
        }
        self.initialized.remove(&key);
      }
    }
  }

  /// Consults the source chain for `key` once, memoizing the outcome. The
  /// first source that yields registrations wins; later sources are not
  /// asked. A source returning a registration that does not provide `key`
  /// is a contract violation and fails the whole query; nothing from that
  /// source is indexed.
  fn ensure_initialized(&mut self, key: &ServiceKey) -> Result<(), ResolveError> {
    if self.initialized.contains(key) || self.initializing.contains(key) {
      return Ok(());
    }
    self.initializing.insert(key.clone());
    let sources = self.sources.clone();
    let mut result = Ok(());
    for source in sources {
      let synthesized = source.registrations_for(key, self);
      if synthesized.is_empty() {
        continue;
      }
      if let Some(bad) = synthesized.iter().find(|reg| !reg.provides(key)) {
        result = Err(ResolveError::InvalidRegistration {
          service: key.clone(),
          detail: format!(
            "source returned {:?}, which does not provide the requested service",
            bad.id()
          ),
        });
        break;
      }
      let ids = synthesized.iter().map(|reg| reg.id()).collect();
      debug!("synthesized {} registration(s) for {}", synthesized.len(), key);
      for registration in synthesized {
        self.index(registration);
      }
      self.synthesized.insert(
        key.clone(),
        SynthesizedEntry {
          adapter: source.is_adapter_for_individual_components(),
          ids,
        },
      );
      break;
    }
    self.initializing.remove(key);
    if result.is_ok() {
      self.initialized.insert(key.clone());
    }
    result
  }

  fn try_get(&mut self, key: &ServiceKey) -> Result<Option<Arc<ComponentRegistration>>, ResolveError> {
    if let Some(list) = self.by_service.get(key) {
      if let Some(last) = list.last() {
        return Ok(Some(last.clone()));
      }
    }
    self.ensure_initialized(key)?;
    Ok(self.by_service.get(key).and_then(|list| list.last()).cloned())
  }

  fn all_for(&mut self, key: &ServiceKey) -> Result<Vec<Arc<ComponentRegistration>>, ResolveError> {
    self.ensure_initialized(key)?;
    Ok(self.by_service.get(key).cloned().unwrap_or_default())
  }
}

impl RegistrationLookup for RegistryInner {
  fn registrations_for_service(&mut self, service: &ServiceKey) -> Vec<Arc<ComponentRegistration>> {
    match self.all_for(service) {
      Ok(list) => list,
      Err(err) => {
        warn!("lookup of {} during synthesis failed: {}", service, err);
        Vec::new()
      }
    }
  }
}

/// The component registry: direct registrations plus the ordered chain of
/// dynamic registration sources.
///
/// A single lock guards the whole index. Registration handles are cloned out
/// and the lock released before any activator or handler runs, so resolution
/// never blocks on this lock while user code executes.
pub struct ComponentRegistry {
  inner: Mutex<RegistryInner>,
}

impl ComponentRegistry {
  pub fn new() -> Self {
    Self {
      inner: Mutex::new(RegistryInner::new()),
    }
  }

  /// Inserts a registration, indexing it under every declared service key.
  /// The last registration for a key wins direct lookups.
  pub fn register(&self, registration: Arc<ComponentRegistration>) {
    self.inner.lock().register(registration);
  }

  /// Appends a dynamic source. Sources are consulted in the order added,
  /// only when a key has no direct registration. Keys that previously
  /// resolved to nothing are re-queried on their next lookup.
  pub fn add_source(&self, source: Arc<dyn RegistrationSource>) {
    self.inner.lock().add_source(source);
  }

  /// Direct index first; on a miss the source chain is consulted once and
  /// its output memoized. `Ok(None)` means "not found", which is not an
  /// error here; the caller decides whether that is fatal.
  pub fn try_get_registration(
    &self,
    key: &ServiceKey,
  ) -> Result<Option<Arc<ComponentRegistration>>, ResolveError> {
    self.inner.lock().try_get(key)
  }

  /// Every registration for `key`, in registration order.
  pub fn registrations_for(
    &self,
    key: &ServiceKey,
  ) -> Result<Vec<Arc<ComponentRegistration>>, ResolveError> {
    self.inner.lock().all_for(key)
  }

  /// Whether a direct registration exists, without consulting sources.
  pub fn is_registered(&self, key: &ServiceKey) -> bool {
    self
      .inner
      .lock()
      .by_service
      .get(key)
      .map(|list| !list.is_empty())
      .unwrap_or(false)
  }
}

impl Default for ComponentRegistry {
  fn default() -> Self {
    Self::new()
  }
}

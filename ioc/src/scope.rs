//! The hierarchical lifetime-scope tree and the public `Container` face.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use log::{debug, trace};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::activator::{downcast_instance, Instance, Parameters};
use crate::error::{DisposeError, ResolveError};
use crate::registration::{ComponentRegistration, RegistrationId};
use crate::registry::{ComponentRegistry, RegistrationSource};
use crate::resolve::ResolutionContext;
use crate::service::ServiceKey;

fn next_scope_id() -> u64 {
  static COUNTER: AtomicU64 = AtomicU64::new(0);
  COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A node in the container tree, bounding instance sharing and disposal.
///
/// Each scope has its own registry view, disposer and shared-instance cache.
/// Lookups fall back to the parent when nothing local matches; a child's
/// local registrations stay invisible to its parent. The parent link is weak,
/// so a scope is torn down by whoever created it, and disposing a scope tears
/// down its live descendants first.
pub struct LifetimeScope {
  id: u64,
  tag: Option<Arc<str>>,
  parent: Option<Weak<LifetimeScope>>,
  registry: ComponentRegistry,
  disposer: crate::disposer::Disposer,
  /// One cell per shared registration materialized in this scope.
  shared: DashMap<u64, Arc<OnceCell<Instance>>>,
  children: Mutex<Vec<Weak<LifetimeScope>>>,
}

impl LifetimeScope {
  /// Creates a root scope with no parent.
  pub fn root() -> Arc<Self> {
    Arc::new(Self {
      id: next_scope_id(),
      tag: None,
      parent: None,
      registry: ComponentRegistry::new(),
      disposer: crate::disposer::Disposer::new(),
      shared: DashMap::new(),
      children: Mutex::new(Vec::new()),
    })
  }

  /// Creates a child scope. Fails if this scope is already disposed.
  pub fn begin_child(self: &Arc<Self>, tag: Option<&str>) -> Result<Arc<Self>, ResolveError> {
    let child = Arc::new(Self {
      id: next_scope_id(),
      tag: tag.map(Arc::from),
      parent: Some(Arc::downgrade(self)),
      registry: ComponentRegistry::new(),
      disposer: crate::disposer::Disposer::new(),
      shared: DashMap::new(),
      children: Mutex::new(Vec::new()),
    });
    {
      // The disposed check and the push share the critical section that
      // `dispose` drains under, so a new child either fails here or lands
      // in the list the teardown takes.
      let mut children = self.children.lock();
      if self.is_disposed() {
        return Err(ResolveError::ScopeDisposed);
      }
      children.push(Arc::downgrade(&child));
    }
    debug!("scope {} began child scope {} (tag {:?})", self.id, child.id, tag);
    Ok(child)
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn tag(&self) -> Option<&str> {
    self.tag.as_deref()
  }

  pub fn parent(&self) -> Option<Arc<LifetimeScope>> {
    self.parent.as_ref().and_then(Weak::upgrade)
  }

  pub fn registry(&self) -> &ComponentRegistry {
    &self.registry
  }

  pub(crate) fn disposer(&self) -> &crate::disposer::Disposer {
    &self.disposer
  }

  pub fn is_disposed(&self) -> bool {
    self.disposer.is_disposed()
  }

  /// Registers a finished registration into this scope's local registry.
  pub fn register(&self, registration: Arc<ComponentRegistration>) {
    self.registry.register(registration);
  }

  /// Appends a dynamic registration source to this scope's local registry.
  pub fn add_source(&self, source: Arc<dyn RegistrationSource>) {
    self.registry.add_source(source);
  }

  /// The outermost ancestor (self, for a root).
  pub fn root_scope(self: &Arc<Self>) -> Arc<Self> {
    let mut current = self.clone();
    while let Some(parent) = current.parent() {
      current = parent;
    }
    current
  }

  /// The nearest scope (self or ancestor) carrying `tag`.
  pub fn find_tagged(self: &Arc<Self>, tag: &str) -> Option<Arc<Self>> {
    let mut current = Some(self.clone());
    while let Some(scope) = current {
      if scope.tag.as_deref() == Some(tag) {
        return Some(scope);
      }
      current = scope.parent();
    }
    None
  }

  pub(crate) fn shared_cell(&self, id: RegistrationId) -> Arc<OnceCell<Instance>> {
    self
      .shared
      .entry(id.raw())
      .or_insert_with(|| Arc::new(OnceCell::new()))
      .clone()
  }

  /// Resolves the unqualified service `T`.
  pub fn resolve<T: ?Sized + Any + Send + Sync>(self: &Arc<Self>) -> Result<Arc<T>, ResolveError>
  where
    Arc<T>: Any + Send + Sync,
  {
    self.resolve_key(&ServiceKey::of::<T>(), Parameters::new())
  }

  /// Resolves `T` qualified by a name.
  pub fn resolve_named<T: ?Sized + Any + Send + Sync>(
    self: &Arc<Self>,
    name: &str,
  ) -> Result<Arc<T>, ResolveError>
  where
    Arc<T>: Any + Send + Sync,
  {
    self.resolve_key(&ServiceKey::named::<T>(name), Parameters::new())
  }

  /// Resolves `T` qualified by the marker type `K`.
  pub fn resolve_keyed<T: ?Sized + Any + Send + Sync, K: Any>(
    self: &Arc<Self>,
  ) -> Result<Arc<T>, ResolveError>
  where
    Arc<T>: Any + Send + Sync,
  {
    self.resolve_key(&ServiceKey::keyed::<T, K>(), Parameters::new())
  }

  /// Resolves `T` with explicit parameters.
  pub fn resolve_with<T: ?Sized + Any + Send + Sync>(
    self: &Arc<Self>,
    params: Parameters,
  ) -> Result<Arc<T>, ResolveError>
  where
    Arc<T>: Any + Send + Sync,
  {
    self.resolve_key(&ServiceKey::of::<T>(), params)
  }

  /// Optional resolve: `Ok(None)` when nothing is registered, errors for
  /// everything else.
  pub fn try_resolve<T: ?Sized + Any + Send + Sync>(
    self: &Arc<Self>,
  ) -> Result<Option<Arc<T>>, ResolveError>
  where
    Arc<T>: Any + Send + Sync,
  {
    match self.resolve::<T>() {
      Ok(instance) => Ok(Some(instance)),
      Err(ResolveError::ServiceNotRegistered(_)) => Ok(None),
      Err(err) => Err(err),
    }
  }

  /// Typed resolve for an explicit key.
  pub fn resolve_key<T: ?Sized + Any + Send + Sync>(
    self: &Arc<Self>,
    key: &ServiceKey,
    params: Parameters,
  ) -> Result<Arc<T>, ResolveError>
  where
    Arc<T>: Any + Send + Sync,
  {
    let instance = self.resolve_service(key, params)?;
    downcast_instance::<T>(&instance).ok_or_else(|| ResolveError::InvalidRegistration {
      service: key.clone(),
      detail: "activated instance does not match the requested service type".to_owned(),
    })
  }

  /// One top-level resolve: spins up a fresh resolution context whose
  /// activation stack lives for exactly this call.
  pub fn resolve_service(
    self: &Arc<Self>,
    key: &ServiceKey,
    params: Parameters,
  ) -> Result<Instance, ResolveError> {
    if self.is_disposed() {
      return Err(ResolveError::ScopeDisposed);
    }
    let mut ctx = ResolutionContext::new(self.clone());
    ctx.resolve_service(key, params)
  }

  /// Tears this scope down: live descendants first (depth-first, children
  /// before parent), then the shared cache, then this scope's own disposer.
  /// Idempotent; errors are aggregated, never short-circuiting siblings.
  pub fn dispose(&self) -> Result<(), DisposeError> {
    let children = {
      let mut children = self.children.lock();
      if !self.disposer.begin_dispose() {
        return Ok(());
      }
      std::mem::take(&mut *children)
    };
    let mut failures = Vec::new();
    for child in children.iter().rev() {
      if let Some(child) = child.upgrade() {
        trace!("scope {} disposing child scope {}", self.id, child.id);
        if let Err(err) = child.dispose() {
          failures.push(err);
        }
      }
    }
    self.shared.clear();
    match self.disposer.drain() {
      Ok(()) => {}
      Err(err) => failures.push(err),
    }
    debug!("scope {} disposed", self.id);
    if failures.is_empty() {
      Ok(())
    } else {
      Err(DisposeError::Aggregate(failures))
    }
  }
}

impl std::fmt::Debug for LifetimeScope {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LifetimeScope")
      .field("id", &self.id)
      .field("tag", &self.tag)
      .field("disposed", &self.is_disposed())
      .finish()
  }
}

impl Drop for LifetimeScope {
  fn drop(&mut self) {
    if !self.is_disposed() {
      let _ = self.dispose();
    }
  }
}

/// The container: a thin owner of the root lifetime scope.
///
/// There is deliberately no process-wide container; the root handle is
/// threaded explicitly through whatever integration layer hosts it.
pub struct Container {
  root: Arc<LifetimeScope>,
}

impl Container {
  pub fn new() -> Self {
    Self {
      root: LifetimeScope::root(),
    }
  }

  pub fn root(&self) -> &Arc<LifetimeScope> {
    &self.root
  }

  pub fn register(&self, registration: Arc<ComponentRegistration>) {
    self.root.register(registration);
  }

  pub fn add_source(&self, source: Arc<dyn RegistrationSource>) {
    self.root.add_source(source);
  }

  /// Creates a child scope of the root, one per unit of work.
  pub fn begin_scope(&self, tag: Option<&str>) -> Result<Arc<LifetimeScope>, ResolveError> {
    self.root.begin_child(tag)
  }

  pub fn resolve<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>, ResolveError>
  where
    Arc<T>: Any + Send + Sync,
  {
    self.root.resolve::<T>()
  }

  pub fn resolve_named<T: ?Sized + Any + Send + Sync>(
    &self,
    name: &str,
  ) -> Result<Arc<T>, ResolveError>
  where
    Arc<T>: Any + Send + Sync,
  {
    self.root.resolve_named::<T>(name)
  }

  pub fn try_resolve<T: ?Sized + Any + Send + Sync>(&self) -> Result<Option<Arc<T>>, ResolveError>
  where
    Arc<T>: Any + Send + Sync,
  {
    self.root.try_resolve::<T>()
  }

  pub fn dispose(&self) -> Result<(), DisposeError> {
    self.root.dispose()
  }
}

impl Default for Container {
  fn default() -> Self {
    Self::new()
  }
}

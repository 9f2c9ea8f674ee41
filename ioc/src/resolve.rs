//! The resolution context: one top-level resolve and its dependency walk.

use std::any::Any;
use std::mem;
use std::sync::Arc;

use log::trace;

use crate::activator::{downcast_instance, Instance, Parameters};
use crate::disposer::instance_handle;
use crate::error::{ResolveError, MAX_RESOLVE_DEPTH};
use crate::registration::{ComponentRegistration, Lifetime, Ownership, Sharing};
use crate::scope::LifetimeScope;
use crate::service::ServiceKey;

/// Orchestrates a single top-level resolve.
///
/// Holds the activation stack (for cycle detection and error trails) and the
/// scope currently servicing the request. Activators receive the context
/// mutably and resolve their dependencies through it, which keeps the whole
/// dependency walk on one stack: sub-resolutions are fully ordered,
/// depth-first, left-to-right.
pub struct ResolutionContext {
  scope: Arc<LifetimeScope>,
  stack: Vec<ServiceKey>,
}

impl ResolutionContext {
  pub(crate) fn new(scope: Arc<LifetimeScope>) -> Self {
    Self {
      scope,
      stack: Vec::new(),
    }
  }

  /// The scope the in-flight activation resolves against.
  pub fn scope(&self) -> &Arc<LifetimeScope> {
    &self.scope
  }

  /// The in-flight chain of service keys, outermost first.
  pub fn activation_stack(&self) -> &[ServiceKey] {
    &self.stack
  }

  pub fn resolve<T: ?Sized + Any + Send + Sync>(&mut self) -> Result<Arc<T>, ResolveError>
  where
    Arc<T>: Any + Send + Sync,
  {
    self.resolve_key(&ServiceKey::of::<T>(), Parameters::new())
  }

  pub fn resolve_named<T: ?Sized + Any + Send + Sync>(
    &mut self,
    name: &str,
  ) -> Result<Arc<T>, ResolveError>
  where
    Arc<T>: Any + Send + Sync,
  {
    self.resolve_key(&ServiceKey::named::<T>(name), Parameters::new())
  }

  pub fn resolve_keyed<T: ?Sized + Any + Send + Sync, K: Any>(
    &mut self,
  ) -> Result<Arc<T>, ResolveError>
  where
    Arc<T>: Any + Send + Sync,
  {
    self.resolve_key(&ServiceKey::keyed::<T, K>(), Parameters::new())
  }

  /// Optional dependency: `Ok(None)` when nothing is registered.
  pub fn try_resolve<T: ?Sized + Any + Send + Sync>(
    &mut self,
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

  pub fn resolve_key<T: ?Sized + Any + Send + Sync>(
    &mut self,
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

  /// Resolves one service key: the full push-lookup-activate-pop cycle.
  pub fn resolve_service(
    &mut self,
    key: &ServiceKey,
    params: Parameters,
  ) -> Result<Instance, ResolveError> {
    self.enter(key)?;
    let result = self
      .locate_registration(key)
      .and_then(|registration| self.activate_in_lifetime(key, &registration, params));
    self.stack.pop();
    result
  }

  /// Activates a specific registration, bypassing key lookup. Used by
  /// adapter sources (collections) that enumerate registrations themselves.
  pub fn resolve_registration(
    &mut self,
    registration: &Arc<ComponentRegistration>,
    params: Parameters,
  ) -> Result<Instance, ResolveError> {
    let key = registration
      .services()
      .first()
      .cloned()
      .ok_or_else(|| ResolveError::InvalidRegistration {
        service: ServiceKey::of::<()>(),
        detail: format!("{:?} declares no service keys", registration.id()),
      })?;
    self.enter(&key)?;
    let result = self.activate_in_lifetime(&key, registration, params);
    self.stack.pop();
    result
  }

  fn enter(&mut self, key: &ServiceKey) -> Result<(), ResolveError> {
    if let Some(position) = self.stack.iter().position(|frame| frame == key) {
      let mut cycle = self.stack[position..].to_vec();
      cycle.push(key.clone());
      return Err(ResolveError::CircularDependency { cycle });
    }
    if self.stack.len() >= MAX_RESOLVE_DEPTH {
      return Err(ResolveError::MaxDepthExceeded {
        service: key.clone(),
      });
    }
    self.stack.push(key.clone());
    Ok(())
  }

  /// Walks the scope chain looking for a registration, acquiring each
  /// scope's registry lock one level at a time and releasing it before
  /// ascending further.
  fn locate_registration(
    &self,
    key: &ServiceKey,
  ) -> Result<Arc<ComponentRegistration>, ResolveError> {
    let mut current = Some(self.scope.clone());
    while let Some(scope) = current {
      if let Some(registration) = scope.registry().try_get_registration(key)? {
        return Ok(registration);
      }
      current = scope.parent();
    }
    Err(ResolveError::ServiceNotRegistered(key.clone()))
  }

  /// Picks the instantiation scope per the lifetime policy, then either
  /// reuses the cached shared instance or activates a fresh one.
  fn activate_in_lifetime(
    &mut self,
    key: &ServiceKey,
    registration: &Arc<ComponentRegistration>,
    params: Parameters,
  ) -> Result<Instance, ResolveError> {
    let target = match registration.lifetime() {
      Lifetime::CurrentScope => self.scope.clone(),
      Lifetime::RootScope => self.scope.root_scope(),
      Lifetime::MatchingScope(tag) => {
        self
          .scope
          .find_tagged(tag)
          .ok_or_else(|| ResolveError::MatchingScopeNotFound {
            tag: tag.to_string(),
            service: key.clone(),
          })?
      }
    };

    match registration.sharing() {
      Sharing::None => {
        let instance = self.activate(key, registration, &target, params)?;
        for handler in registration.activated() {
          handler(key, &instance);
        }
        Ok(instance)
      }
      Sharing::Shared => {
        let cell = target.shared_cell(registration.id());
        if let Some(existing) = cell.get() {
          trace!("shared cache hit for {} in scope {}", key, target.id());
          return Ok(existing.clone());
        }
        let mut created = false;
        let instance = cell
          .get_or_try_init(|| {
            created = true;
            self.activate(key, registration, &target, params)
          })?
          .clone();
        // Activated fires once, on the creating call, after the cache insert.
        if created {
          for handler in registration.activated() {
            handler(key, &instance);
          }
        }
        Ok(instance)
      }
    }
  }

  /// Preparing handlers, activator, disposer handoff, activating handlers —
  /// in that order. Activator failures come back wrapped with the partial
  /// activation stack; cycle errors pass through untouched.
  fn activate(
    &mut self,
    key: &ServiceKey,
    registration: &Arc<ComponentRegistration>,
    target: &Arc<LifetimeScope>,
    mut params: Parameters,
  ) -> Result<Instance, ResolveError> {
    if target.is_disposed() {
      return Err(ResolveError::ScopeDisposed);
    }
    for handler in registration.preparing() {
      handler(key, &mut params);
    }
    trace!(
      "activating {} via {:?} (limit type {})",
      key,
      registration.id(),
      registration.activator().limit_type()
    );

    // A component's dependencies resolve from the scope that instantiates
    // and caches it, not from wherever the request entered the tree.
    let previous = mem::replace(&mut self.scope, target.clone());
    let produced = registration.activator().produce(self, &params);
    self.scope = previous;

    let mut instance = produced.map_err(|err| self.wrap_failure(key, err))?;

    if registration.ownership() == Ownership::OwnedByScope {
      target
        .disposer()
        .add(instance_handle(
          registration.release().cloned(),
          instance.clone(),
        ))
        .map_err(ResolveError::other)?;
    }

    for handler in registration.activating() {
      instance = handler(key, instance);
    }
    Ok(instance)
  }

  fn wrap_failure(&self, key: &ServiceKey, err: ResolveError) -> ResolveError {
    match err {
      cycle @ ResolveError::CircularDependency { .. } => cycle,
      other => ResolveError::DependencyResolutionFailed {
        service: key.clone(),
        stack: self.stack.clone(),
        source: Box::new(other),
      },
    }
  }
}

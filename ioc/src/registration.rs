//! Component registrations: the bound recipe for producing service instances.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::activator::{Activator, Instance, Parameters, Value};
use crate::error::DisposeError;
use crate::service::ServiceKey;

/// Who tears the instance down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
  /// The scope that created the instance releases it on teardown.
  OwnedByScope,
  /// The caller keeps responsibility; the disposer never touches it.
  ExternallyOwned,
}

/// Whether instances are cached and reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sharing {
  /// A fresh instance per resolve.
  None,
  /// One instance per instantiation scope, determined by [`Lifetime`].
  Shared,
}

/// Which scope in the ancestor chain instantiates and caches a shared
/// registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lifetime {
  /// The scope servicing the request.
  CurrentScope,
  /// The outermost ancestor, regardless of where the request originated.
  RootScope,
  /// The nearest ancestor (or self) carrying this tag. Resolution fails if
  /// no such scope exists.
  MatchingScope(Arc<str>),
}

/// Handler invoked before activation; may substitute or augment parameters.
pub type PreparingHandler = Arc<dyn Fn(&ServiceKey, &mut Parameters) + Send + Sync>;

/// Handler invoked on the freshly produced instance; may wrap or replace it.
pub type ActivatingHandler = Arc<dyn Fn(&ServiceKey, Instance) -> Instance + Send + Sync>;

/// Handler invoked after the instance is cached and about to be returned.
pub type ActivatedHandler = Arc<dyn Fn(&ServiceKey, &Instance) + Send + Sync>;

/// Release hook run by the disposer for `OwnedByScope` instances.
pub type ReleaseFn = Arc<dyn Fn(&Instance) -> Result<(), DisposeError> + Send + Sync>;

/// A release hook calling `f` on the typed payload. Instances of another type
/// are ignored, which only happens if an `Activating` handler replaced the
/// payload type.
pub fn release_with<T, F>(f: F) -> ReleaseFn
where
  T: Any + Send + Sync,
  F: Fn(&T) -> Result<(), DisposeError> + Send + Sync + 'static,
{
  Arc::new(move |instance: &Instance| match instance.downcast_ref::<Arc<T>>() {
    Some(value) => f(value),
    None => Ok(()),
  })
}

/// An explicitly releasable resource.
///
/// `dispose` takes `&self` because instances are shared behind `Arc`; use
/// interior mutability for state that must change on release.
pub trait Disposable: Send + Sync {
  fn dispose(&self) -> Result<(), DisposeError>;
}

/// A release hook delegating to [`Disposable::dispose`].
pub fn release_disposable<T: Disposable + Any>() -> ReleaseFn {
  release_with::<T, _>(|value| value.dispose())
}

/// Mutable builder state for a registration.
///
/// Constructed from its first service key, so a finalized registration always
/// provides at least one service. Defaults: owned by scope, not shared,
/// current-scope lifetime.
pub struct RegistrationData {
  services: Vec<ServiceKey>,
  ownership: Ownership,
  sharing: Sharing,
  lifetime: Lifetime,
  metadata: HashMap<String, Value>,
  preparing: Vec<PreparingHandler>,
  activating: Vec<ActivatingHandler>,
  activated: Vec<ActivatedHandler>,
  release: Option<ReleaseFn>,
}

impl RegistrationData {
  pub fn new(first_service: ServiceKey) -> Self {
    Self {
      services: vec![first_service],
      ownership: Ownership::OwnedByScope,
      sharing: Sharing::None,
      lifetime: Lifetime::CurrentScope,
      metadata: HashMap::new(),
      preparing: Vec::new(),
      activating: Vec::new(),
      activated: Vec::new(),
      release: None,
    }
  }

  /// Adds another service key this registration satisfies. Duplicates are
  /// ignored.
  pub fn add_service(&mut self, key: ServiceKey) {
    if !self.services.contains(&key) {
      self.services.push(key);
    }
  }

  pub fn also_as(mut self, key: ServiceKey) -> Self {
    self.add_service(key);
    self
  }

  pub fn shared(mut self) -> Self {
    self.sharing = Sharing::Shared;
    self
  }

  pub fn with_sharing(mut self, sharing: Sharing) -> Self {
    self.sharing = sharing;
    self
  }

  pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
    self.lifetime = lifetime;
    self
  }

  /// Shared, instantiated and cached at the root scope.
  pub fn singleton(mut self) -> Self {
    self.sharing = Sharing::Shared;
    self.lifetime = Lifetime::RootScope;
    self
  }

  /// Shared, instantiated and cached at the nearest scope tagged `tag`.
  pub fn per_matching_scope(mut self, tag: &str) -> Self {
    self.sharing = Sharing::Shared;
    self.lifetime = Lifetime::MatchingScope(Arc::from(tag));
    self
  }

  pub fn externally_owned(mut self) -> Self {
    self.ownership = Ownership::ExternallyOwned;
    self
  }

  pub fn with_ownership(mut self, ownership: Ownership) -> Self {
    self.ownership = ownership;
    self
  }

  pub fn with_metadata<T: Any + Send + Sync>(mut self, name: &str, value: T) -> Self {
    self.metadata.insert(name.to_owned(), Arc::new(value));
    self
  }

  pub fn on_preparing(
    mut self,
    handler: impl Fn(&ServiceKey, &mut Parameters) + Send + Sync + 'static,
  ) -> Self {
    self.preparing.push(Arc::new(handler));
    self
  }

  pub fn on_activating(
    mut self,
    handler: impl Fn(&ServiceKey, Instance) -> Instance + Send + Sync + 'static,
  ) -> Self {
    self.activating.push(Arc::new(handler));
    self
  }

  pub fn on_activated(
    mut self,
    handler: impl Fn(&ServiceKey, &Instance) + Send + Sync + 'static,
  ) -> Self {
    self.activated.push(Arc::new(handler));
    self
  }

  pub fn with_release(mut self, release: ReleaseFn) -> Self {
    self.release = Some(release);
    self
  }

  pub fn services(&self) -> &[ServiceKey] {
    &self.services
  }
}

/// Unique token identifying a registration across the whole process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
  fn next() -> Self {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    RegistrationId(COUNTER.fetch_add(1, Ordering::Relaxed))
  }

  pub(crate) fn raw(&self) -> u64 {
    self.0
  }
}

impl fmt::Debug for RegistrationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Registration#{}", self.0)
  }
}

/// An immutable, finished registration.
///
/// Built once from [`RegistrationData`] plus an activator; registries never
/// mutate a registration after construction.
pub struct ComponentRegistration {
  id: RegistrationId,
  services: Vec<ServiceKey>,
  activator: Arc<dyn Activator>,
  lifetime: Lifetime,
  sharing: Sharing,
  ownership: Ownership,
  metadata: HashMap<String, Value>,
  preparing: Vec<PreparingHandler>,
  activating: Vec<ActivatingHandler>,
  activated: Vec<ActivatedHandler>,
  release: Option<ReleaseFn>,
}

impl ComponentRegistration {
  pub fn new(data: RegistrationData, activator: Arc<dyn Activator>) -> Arc<Self> {
    Arc::new(Self {
      id: RegistrationId::next(),
      services: data.services,
      activator,
      lifetime: data.lifetime,
      sharing: data.sharing,
      ownership: data.ownership,
      metadata: data.metadata,
      preparing: data.preparing,
      activating: data.activating,
      activated: data.activated,
      release: data.release,
    })
  }

  pub fn id(&self) -> RegistrationId {
    self.id
  }

  pub fn services(&self) -> &[ServiceKey] {
    &self.services
  }

  pub fn provides(&self, key: &ServiceKey) -> bool {
    self.services.contains(key)
  }

  pub fn activator(&self) -> &Arc<dyn Activator> {
    &self.activator
  }

  pub fn lifetime(&self) -> &Lifetime {
    &self.lifetime
  }

  pub fn sharing(&self) -> Sharing {
    self.sharing
  }

  pub fn ownership(&self) -> Ownership {
    self.ownership
  }

  pub fn metadata<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
    self.metadata.get(name).cloned().and_then(|v| v.downcast::<T>().ok())
  }

  pub(crate) fn preparing(&self) -> &[PreparingHandler] {
    &self.preparing
  }

  pub(crate) fn activating(&self) -> &[ActivatingHandler] {
    &self.activating
  }

  pub(crate) fn activated(&self) -> &[ActivatedHandler] {
    &self.activated
  }

  pub(crate) fn release(&self) -> Option<&ReleaseFn> {
    self.release.as_ref()
  }
}

impl fmt::Debug for ComponentRegistration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ComponentRegistration")
      .field("id", &self.id)
      .field("services", &self.services)
      .field("limit_type", &self.activator.limit_type())
      .field("lifetime", &self.lifetime)
      .field("sharing", &self.sharing)
      .field("ownership", &self.ownership)
      .finish()
  }
}

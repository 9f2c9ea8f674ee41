//! The activator capability: producing instances from resolved parameters.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ResolveError;
use crate::resolve::ResolutionContext;
use crate::service::TypeKey;

/// A type-erased value passed to or produced by an activator.
pub type Value = Arc<dyn Any + Send + Sync>;

/// A type-erased service instance.
///
/// The payload is always the `Arc<T>` under which the service was registered;
/// `T` may be a trait object. Storing the `Arc` itself behind the erasure is
/// what lets a single `downcast_ref::<Arc<T>>` path serve both sized and
/// `dyn` services.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Wraps a concrete value into the [`Instance`] representation for `T`.
pub fn instance_of<T: Any + Send + Sync>(value: T) -> Instance {
  Arc::new(Arc::new(value)) as Instance
}

/// Wraps an already-shared handle (typically `Arc<dyn Trait>`) into the
/// [`Instance`] representation for `T`.
pub fn instance_from_arc<T: ?Sized + Any + Send + Sync>(value: Arc<T>) -> Instance
where
  Arc<T>: Any + Send + Sync,
{
  Arc::new(value) as Instance
}

/// Extracts the `Arc<T>` payload from an instance, if it was registered as `T`.
pub fn downcast_instance<T: ?Sized + Any + Send + Sync>(instance: &Instance) -> Option<Arc<T>>
where
  Arc<T>: Any,
{
  instance.downcast_ref::<Arc<T>>().cloned()
}

/// Explicit parameters for one resolve call, bound by name or by position.
///
/// `Preparing` handlers receive these mutably and may substitute or augment
/// them before the activator runs.
#[derive(Default, Clone)]
pub struct Parameters {
  named: HashMap<String, Value>,
  positional: Vec<Value>,
}

impl Parameters {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_named<T: Any + Send + Sync>(mut self, name: &str, value: T) -> Self {
    self.insert_named(name, value);
    self
  }

  pub fn with_positional<T: Any + Send + Sync>(mut self, value: T) -> Self {
    self.push_positional(value);
    self
  }

  pub fn insert_named<T: Any + Send + Sync>(&mut self, name: &str, value: T) {
    self.named.insert(name.to_owned(), Arc::new(value));
  }

  pub fn push_positional<T: Any + Send + Sync>(&mut self, value: T) {
    self.positional.push(Arc::new(value));
  }

  /// Typed access to a named parameter. `None` if absent or of another type.
  pub fn named<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
    self.named.get(name).cloned().and_then(|v| v.downcast::<T>().ok())
  }

  /// Typed access to a positional parameter.
  pub fn positional<T: Any + Send + Sync>(&self, index: usize) -> Option<Arc<T>> {
    self.positional.get(index).cloned().and_then(|v| v.downcast::<T>().ok())
  }

  pub fn is_empty(&self) -> bool {
    self.named.is_empty() && self.positional.is_empty()
  }

  pub fn len(&self) -> usize {
    self.named.len() + self.positional.len()
  }
}

/// The abstract instance-construction capability.
///
/// The core never constructs activators itself; it consumes finished
/// registrations carrying one. An activator resolves its own dependencies
/// through the [`ResolutionContext`] it is handed, which keeps every nested
/// resolve on the same activation stack.
pub trait Activator: Send + Sync {
  /// Produces a new instance.
  fn produce(
    &self,
    ctx: &mut ResolutionContext,
    params: &Parameters,
  ) -> Result<Instance, ResolveError>;

  /// The most specific type this activator can produce. Used by adapter
  /// sources to test what a registration actually yields, and in diagnostics.
  fn limit_type(&self) -> TypeKey;
}

/// An activator backed by a closure. The workhorse for delegate-style
/// registrations and for sources that close open generics.
pub struct DelegateActivator {
  limit: TypeKey,
  produce: Box<
    dyn Fn(&mut ResolutionContext, &Parameters) -> Result<Instance, ResolveError> + Send + Sync,
  >,
}

impl DelegateActivator {
  /// An activator producing the concrete type `T`.
  pub fn new<T, F>(factory: F) -> Self
  where
    T: Any + Send + Sync,
    F: Fn(&mut ResolutionContext, &Parameters) -> Result<T, ResolveError> + Send + Sync + 'static,
  {
    Self {
      limit: TypeKey::of::<T>(),
      produce: Box::new(move |ctx, params| Ok(instance_of(factory(ctx, params)?))),
    }
  }

  /// An activator producing `Arc<T>` directly, for trait-object services.
  pub fn from_arc<T, F>(factory: F) -> Self
  where
    T: ?Sized + Any + Send + Sync,
    Arc<T>: Any + Send + Sync,
    F: Fn(&mut ResolutionContext, &Parameters) -> Result<Arc<T>, ResolveError>
      + Send
      + Sync
      + 'static,
  {
    Self {
      limit: TypeKey::of::<T>(),
      produce: Box::new(move |ctx, params| Ok(instance_from_arc(factory(ctx, params)?))),
    }
  }

  /// An activator with an explicit limit type, for synthesized registrations
  /// whose produced shape is structural (closed generics).
  pub fn with_limit<F>(limit: TypeKey, produce: F) -> Self
  where
    F: Fn(&mut ResolutionContext, &Parameters) -> Result<Instance, ResolveError>
      + Send
      + Sync
      + 'static,
  {
    Self {
      limit,
      produce: Box::new(produce),
    }
  }
}

impl Activator for DelegateActivator {
  fn produce(
    &self,
    ctx: &mut ResolutionContext,
    params: &Parameters,
  ) -> Result<Instance, ResolveError> {
    (self.produce)(ctx, params)
  }

  fn limit_type(&self) -> TypeKey {
    self.limit.clone()
  }
}

/// An activator that hands out a pre-built instance.
///
/// The instance is shared as-is on every activation; pair it with
/// `Ownership::ExternallyOwned` when the caller keeps responsibility for
/// cleanup.
pub struct ProvidedInstance {
  limit: TypeKey,
  instance: Instance,
}

impl ProvidedInstance {
  pub fn new<T: Any + Send + Sync>(value: T) -> Self {
    Self {
      limit: TypeKey::of::<T>(),
      instance: instance_of(value),
    }
  }

  pub fn from_arc<T: ?Sized + Any + Send + Sync>(value: Arc<T>) -> Self
  where
    Arc<T>: Any + Send + Sync,
  {
    Self {
      limit: TypeKey::of::<T>(),
      instance: instance_from_arc(value),
    }
  }
}

impl Activator for ProvidedInstance {
  fn produce(
    &self,
    _ctx: &mut ResolutionContext,
    _params: &Parameters,
  ) -> Result<Instance, ResolveError> {
    Ok(self.instance.clone())
  }

  fn limit_type(&self) -> TypeKey {
    self.limit.clone()
  }
}

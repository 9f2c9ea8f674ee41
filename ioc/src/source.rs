//! Dynamic registration sources: open-generic synthesis and collections.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use log::{debug, trace};

use crate::activator::{downcast_instance, Activator, DelegateActivator, Parameters};
use crate::error::ResolveError;
use crate::registration::{
  ComponentRegistration, Lifetime, Ownership, RegistrationData, Sharing,
};
use crate::registry::{RegistrationLookup, RegistrationSource};
use crate::service::{GenericDef, Qualifier, ServiceKey, TypeKey};

/// Recursion ceiling for the structural matcher. Shapes nested deeper than
/// this make the source decline rather than recurse unbounded.
pub const MAX_MATCH_DEPTH: usize = 32;

/// The open shape of a generic service or implementation: a type with holes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeTemplate {
  /// A generic parameter position of the open implementation.
  Param(usize),
  /// An exact type, matched verbatim.
  Exact(TypeKey),
  /// A generic shape whose arguments may themselves contain parameters.
  Generic { def: GenericDef, args: Vec<TypeTemplate> },
}

impl TypeTemplate {
  pub fn generic(def: GenericDef, args: Vec<TypeTemplate>) -> Self {
    TypeTemplate::Generic { def, args }
  }

  pub fn exact<T: ?Sized + Any>() -> Self {
    TypeTemplate::Exact(TypeKey::of::<T>())
  }
}

/// Structurally unifies `template` against a requested closed `key`, binding
/// parameter positions into `bindings`. A parameter already bound must rebind
/// to an equal key. Returns false (no partial effects the caller cares about)
/// when the shapes diverge, a template names a position beyond the binding
/// arity, or the depth guard trips.
fn bind(
  template: &TypeTemplate,
  key: &TypeKey,
  bindings: &mut [Option<TypeKey>],
  depth: usize,
) -> bool {
  if depth > MAX_MATCH_DEPTH {
    trace!("structural match aborted at depth {}", depth);
    return false;
  }
  match (template, key) {
    // An out-of-range position is a misconfigured template; decline.
    (TypeTemplate::Param(index), bound) => {
      let Some(slot) = bindings.get_mut(*index) else {
        return false;
      };
      match slot {
        None => {
          *slot = Some(bound.clone());
          true
        }
        Some(existing) => *existing == *bound,
      }
    }
    (TypeTemplate::Exact(expected), actual) => expected == actual,
    (
      TypeTemplate::Generic { def, args },
      TypeKey::Generic {
        def: key_def,
        args: key_args,
      },
    ) => {
      def == key_def
        && args.len() == key_args.len()
        && args
          .iter()
          .zip(key_args)
          .all(|(template_arg, key_arg)| bind(template_arg, key_arg, bindings, depth + 1))
    }
    _ => false,
  }
}

/// Substitutes bindings into a template, producing a fully closed key.
/// `None` when any parameter position is unresolved or the depth guard trips.
fn substitute(
  template: &TypeTemplate,
  bindings: &[Option<TypeKey>],
  depth: usize,
) -> Option<TypeKey> {
  if depth > MAX_MATCH_DEPTH {
    return None;
  }
  match template {
    TypeTemplate::Param(index) => bindings.get(*index).cloned().flatten(),
    TypeTemplate::Exact(key) => Some(key.clone()),
    TypeTemplate::Generic { def, args } => {
      let mut closed = Vec::with_capacity(args.len());
      for arg in args {
        closed.push(substitute(arg, bindings, depth + 1)?);
      }
      Some(TypeKey::generic(*def, closed))
    }
  }
}

/// Supplies the activator for a closed implementation. Receives the resolved
/// generic arguments and the closed implementation key; returning `None`
/// declines the synthesis (the reflection-free rendition of a constraint or
/// arity incompatibility).
pub type CloseFn = Box<dyn Fn(&[TypeKey], &TypeKey) -> Option<Arc<dyn Activator>> + Send + Sync>;

/// Per-parameter constraint predicate: position and candidate argument.
pub type ConstraintFn = Box<dyn Fn(usize, &TypeKey) -> bool + Send + Sync>;

/// Synthesizes registrations by closing an open generic implementation over
/// the arguments of a requested closed generic service.
///
/// Configure the open implementation shape, the generic service templates it
/// provides, and a closer callback that builds the activator for a concrete
/// closing. Every failure mode is a silent decline; the registry then tries
/// the next source.
pub struct OpenGenericSource {
  services: Vec<TypeTemplate>,
  implementation: TypeTemplate,
  arity: usize,
  qualifier: Option<Qualifier>,
  constraint: Option<ConstraintFn>,
  sharing: Sharing,
  lifetime: Lifetime,
  ownership: Ownership,
  close: CloseFn,
}

impl OpenGenericSource {
  pub fn new<F>(implementation: TypeTemplate, arity: usize, close: F) -> Self
  where
    F: Fn(&[TypeKey], &TypeKey) -> Option<Arc<dyn Activator>> + Send + Sync + 'static,
  {
    Self {
      services: Vec::new(),
      implementation,
      arity,
      qualifier: None,
      constraint: None,
      sharing: Sharing::None,
      lifetime: Lifetime::CurrentScope,
      ownership: Ownership::OwnedByScope,
      close: Box::new(close),
    }
  }

  /// Adds a generic service template this implementation provides.
  pub fn provide_as(mut self, template: TypeTemplate) -> Self {
    self.services.push(template);
    self
  }

  /// Only satisfy requests carrying this qualifier.
  pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
    self.qualifier = Some(qualifier);
    self
  }

  /// Restricts which arguments each parameter position accepts.
  pub fn with_constraint<F>(mut self, constraint: F) -> Self
  where
    F: Fn(usize, &TypeKey) -> bool + Send + Sync + 'static,
  {
    self.constraint = Some(Box::new(constraint));
    self
  }

  /// Policies stamped onto every synthesized registration.
  pub fn shared(mut self) -> Self {
    self.sharing = Sharing::Shared;
    self
  }

  pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
    self.lifetime = lifetime;
    self
  }

  pub fn externally_owned(mut self) -> Self {
    self.ownership = Ownership::ExternallyOwned;
    self
  }
}

impl RegistrationSource for OpenGenericSource {
  fn registrations_for(
    &self,
    service: &ServiceKey,
    _lookup: &mut dyn RegistrationLookup,
  ) -> Vec<Arc<ComponentRegistration>> {
    // The requested service must be a closed generic shape.
    let requested = service.type_key();
    if requested.generic_def().is_none() {
      return Vec::new();
    }
    if service.qualifier() != self.qualifier.as_ref() {
      return Vec::new();
    }

    // Bind the implementation's parameter positions by structurally matching
    // a configured service template against the requested shape.
    let mut bindings: Vec<Option<TypeKey>> = Vec::new();
    let mut matched = false;
    for template in &self.services {
      let mut attempt = vec![None; self.arity];
      if bind(template, requested, &mut attempt, 0) {
        bindings = attempt;
        matched = true;
        break;
      }
    }
    if !matched {
      trace!("open generic source declines {}: no template matches", service);
      return Vec::new();
    }

    // Every parameter position must have resolved, and pass the constraint.
    let mut args = Vec::with_capacity(self.arity);
    for (position, binding) in bindings.iter().enumerate() {
      let Some(argument) = binding else {
        trace!(
          "open generic source declines {}: parameter {} unresolved",
          service,
          position
        );
        return Vec::new();
      };
      if let Some(constraint) = &self.constraint {
        if !constraint(position, argument) {
          trace!(
            "open generic source declines {}: parameter {} fails constraint",
            service,
            position
          );
          return Vec::new();
        }
      }
      args.push(argument.clone());
    }

    // Close the implementation, then ask the closer for its activator.
    let Some(implementation) = substitute(&self.implementation, &bindings, 0) else {
      return Vec::new();
    };
    let Some(activator) = (self.close)(&args, &implementation) else {
      trace!("open generic source declines {}: closer declined", service);
      return Vec::new();
    };

    // Re-derive the full service list: every configured template that closes
    // completely under these bindings is provided by the registration.
    let mut data: Option<RegistrationData> = None;
    for template in &self.services {
      if let Some(closed) = substitute(template, &bindings, 0) {
        let key = match &self.qualifier {
          Some(qualifier) => ServiceKey::with_qualifier(closed, qualifier.clone()),
          None => ServiceKey::for_type(closed),
        };
        match &mut data {
          None => data = Some(RegistrationData::new(key)),
          Some(existing) => existing.add_service(key),
        }
      }
    }
    let Some(data) = data else {
      return Vec::new();
    };
    let data = data
      .with_sharing(self.sharing)
      .with_lifetime(self.lifetime.clone())
      .with_ownership(self.ownership);

    debug!("closed open generic for {} as {}", service, implementation);
    vec![ComponentRegistration::new(data, activator)]
  }
}

/// Synthesizes a `Vec<Arc<T>>` registration aggregating every current direct
/// registration of `T`, in registration order.
///
/// This is the canonical adapter source: its output depends on the current
/// registration set, so it declares `is_adapter_for_individual_components`
/// and the registry re-queries it whenever a new registration of `T` lands.
/// The collection is non-shared so every resolve reflects the live set; an
/// empty set yields an empty collection, not an error.
pub struct CollectionSource<T: ?Sized> {
  element: ServiceKey,
  collection: ServiceKey,
  _marker: PhantomData<fn() -> T>,
}

impl<T> CollectionSource<T>
where
  T: ?Sized + Any + Send + Sync,
  Arc<T>: Any + Send + Sync,
{
  pub fn new() -> Self {
    Self {
      element: ServiceKey::of::<T>(),
      collection: ServiceKey::of::<Vec<Arc<T>>>(),
      _marker: PhantomData,
    }
  }
}

impl<T> Default for CollectionSource<T>
where
  T: ?Sized + Any + Send + Sync,
  Arc<T>: Any + Send + Sync,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<T> RegistrationSource for CollectionSource<T>
where
  T: ?Sized + Any + Send + Sync,
  Arc<T>: Any + Send + Sync,
{
  fn registrations_for(
    &self,
    service: &ServiceKey,
    lookup: &mut dyn RegistrationLookup,
  ) -> Vec<Arc<ComponentRegistration>> {
    if service != &self.collection {
      return Vec::new();
    }
    let elements = lookup.registrations_for_service(&self.element);
    debug!(
      "collection source adapting {} registration(s) of {}",
      elements.len(),
      self.element
    );
    let element_key = self.element.clone();
    let activator = DelegateActivator::new::<Vec<Arc<T>>, _>(move |ctx, _params| {
      let mut collected = Vec::with_capacity(elements.len());
      for registration in &elements {
        let instance = ctx.resolve_registration(registration, Parameters::new())?;
        let element = downcast_instance::<T>(&instance).ok_or_else(|| {
          ResolveError::InvalidRegistration {
            service: element_key.clone(),
            detail: format!("{:?} produced an instance of another type", registration.id()),
          }
        })?;
        collected.push(element);
      }
      Ok(collected)
    });
    let data = RegistrationData::new(self.collection.clone());
    vec![ComponentRegistration::new(data, Arc::new(activator))]
  }

  fn is_adapter_for_individual_components(&self) -> bool {
    true
  }
}

//! Service identity: the keys under which components are indexed and resolved.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Identity of an open generic definition, e.g. the `Repository<_>` shape
/// shared by every closed `Repository<T>`.
///
/// A definition is introduced by a marker type: `GenericDef::of::<RepositoryDef>()`.
/// Two defs are equal exactly when they come from the same marker.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericDef {
  id: TypeId,
  name: &'static str,
}

impl GenericDef {
  pub fn of<M: Any>() -> Self {
    Self {
      id: TypeId::of::<M>(),
      name: type_name::<M>(),
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }
}

impl fmt::Debug for GenericDef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "GenericDef({})", self.name)
  }
}

/// The type half of a [`ServiceKey`].
///
/// Most services are identified by a plain `TypeId` (`TypeKey::of::<T>()`).
/// Services that participate in open-generic synthesis are described
/// structurally instead, so a registration source can take the shape apart
/// and match it against an open template.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum TypeKey {
  /// A plain Rust type, identified by its `TypeId`.
  Id { id: TypeId, name: &'static str },
  /// A closed generic service shape, e.g. `Repository<Customer>`.
  Generic { def: GenericDef, args: Vec<TypeKey> },
}

impl TypeKey {
  pub fn of<T: ?Sized + Any>() -> Self {
    TypeKey::Id {
      id: TypeId::of::<T>(),
      name: type_name::<T>(),
    }
  }

  pub fn generic(def: GenericDef, args: Vec<TypeKey>) -> Self {
    TypeKey::Generic { def, args }
  }

  /// The open definition of a generic shape, if this key is one.
  pub fn generic_def(&self) -> Option<&GenericDef> {
    match self {
      TypeKey::Generic { def, .. } => Some(def),
      TypeKey::Id { .. } => None,
    }
  }

  pub fn generic_args(&self) -> &[TypeKey] {
    match self {
      TypeKey::Generic { args, .. } => args,
      TypeKey::Id { .. } => &[],
    }
  }
}

impl fmt::Display for TypeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TypeKey::Id { name, .. } => write!(f, "{}", name),
      TypeKey::Generic { def, args } => {
        write!(f, "{}<", def.name())?;
        for (i, arg) in args.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{}", arg)?;
        }
        write!(f, ">")
      }
    }
  }
}

impl fmt::Debug for TypeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "TypeKey({})", self)
  }
}

/// Optional qualifier distinguishing multiple registrations of the same type.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Qualifier {
  /// A human-readable name, as in "the `reporting` connection".
  Name(Arc<str>),
  /// An opaque marker type used as a key. Hashable without carrying a value.
  Keyed { id: TypeId, name: &'static str },
}

impl Qualifier {
  pub fn name(name: &str) -> Self {
    Qualifier::Name(Arc::from(name))
  }

  pub fn keyed<K: Any>() -> Self {
    Qualifier::Keyed {
      id: TypeId::of::<K>(),
      name: type_name::<K>(),
    }
  }
}

impl fmt::Debug for Qualifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Qualifier::Name(n) => write!(f, "Name({})", n),
      Qualifier::Keyed { name, .. } => write!(f, "Keyed({})", name),
    }
  }
}

/// The immutable identity under which a component is looked up.
///
/// Equality and hashing are over all fields; the key is the map key
/// throughout the registry and the activation stack.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
  ty: TypeKey,
  qualifier: Option<Qualifier>,
}

impl ServiceKey {
  /// A key for the plain type `T` with no qualifier.
  pub fn of<T: ?Sized + Any>() -> Self {
    Self {
      ty: TypeKey::of::<T>(),
      qualifier: None,
    }
  }

  /// A key for `T` qualified by a name.
  pub fn named<T: ?Sized + Any>(name: &str) -> Self {
    Self {
      ty: TypeKey::of::<T>(),
      qualifier: Some(Qualifier::name(name)),
    }
  }

  /// A key for `T` qualified by the marker type `K`.
  pub fn keyed<T: ?Sized + Any, K: Any>() -> Self {
    Self {
      ty: TypeKey::of::<T>(),
      qualifier: Some(Qualifier::keyed::<K>()),
    }
  }

  /// A key for an arbitrary (possibly structural) type key.
  pub fn for_type(ty: TypeKey) -> Self {
    Self { ty, qualifier: None }
  }

  pub fn with_qualifier(ty: TypeKey, qualifier: Qualifier) -> Self {
    Self {
      ty,
      qualifier: Some(qualifier),
    }
  }

  pub fn type_key(&self) -> &TypeKey {
    &self.ty
  }

  pub fn qualifier(&self) -> Option<&Qualifier> {
    self.qualifier.as_ref()
  }
}

impl fmt::Display for ServiceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.ty)?;
    match &self.qualifier {
      Some(Qualifier::Name(n)) => write!(f, " (named \"{}\")", n),
      Some(Qualifier::Keyed { name, .. }) => write!(f, " (keyed by {})", name),
      None => Ok(()),
    }
  }
}

impl fmt::Debug for ServiceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.qualifier {
      Some(q) => write!(f, "Key({}, {:?})", self.ty, q),
      None => write!(f, "Key({})", self.ty),
    }
  }
}

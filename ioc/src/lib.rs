//! # Trellis IoC
//!
//! A hierarchical, thread-safe dependency-injection runtime for Rust.
//!
//! Trellis resolves object graphs on demand from a mutable registry of
//! component registrations, manages per-scope instance lifetimes in a tree of
//! lifetime scopes, and guarantees deterministic, ownership-correct disposal
//! when scopes are torn down.
//!
//! ## Core Concepts
//!
//! - **Container**: owns the root lifetime scope. There is no process-wide
//!   container; the root handle is passed explicitly.
//! - **ServiceKey**: the identity a component is looked up under — a type,
//!   optionally qualified by a name or a marker type.
//! - **ComponentRegistration**: an immutable recipe binding service keys to
//!   an activator plus lifetime, sharing and ownership policies.
//! - **LifetimeScope**: a node in the container tree. Child lookups fall back
//!   to the parent; disposing a scope releases everything it owns, children
//!   first, in reverse creation order.
//! - **RegistrationSource**: synthesizes registrations on demand for services
//!   with no direct match (open generics, collections).
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use trellis_ioc::{
//!   ComponentRegistration, Container, DelegateActivator, RegistrationData, ServiceKey,
//! };
//!
//! struct Config {
//!   url: String,
//! }
//!
//! struct Db {
//!   url: String,
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let container = Container::new();
//!
//!   // A shared configuration object, one per scope that uses it.
//!   container.register(ComponentRegistration::new(
//!     RegistrationData::new(ServiceKey::of::<Config>()).shared(),
//!     Arc::new(DelegateActivator::new(|_, _| {
//!       Ok(Config { url: "postgres://localhost".to_owned() })
//!     })),
//!   ));
//!
//!   // A component whose factory resolves its own dependencies.
//!   container.register(ComponentRegistration::new(
//!     RegistrationData::new(ServiceKey::of::<Db>()),
//!     Arc::new(DelegateActivator::new(|ctx, _| {
//!       let config = ctx.resolve::<Config>()?;
//!       Ok(Db { url: config.url.clone() })
//!     })),
//!   ));
//!
//!   // One child scope per unit of work; dispose it when the work is done.
//!   let request = container.begin_scope(Some("request"))?;
//!   let db = request.resolve::<Db>()?;
//!   assert_eq!(db.url, "postgres://localhost");
//!   request.dispose()?;
//!   Ok(())
//! }
//! ```

mod activator;
mod disposer;
mod error;
mod registration;
mod registry;
mod resolve;
mod scope;
mod service;
mod source;

pub use activator::{
  downcast_instance, instance_from_arc, instance_of, Activator, DelegateActivator, Instance,
  Parameters, ProvidedInstance, Value,
};
pub use disposer::{instance_handle, DisposalHandle, Disposer};
pub use error::{DisposeError, ResolveError, MAX_RESOLVE_DEPTH};
pub use registration::{
  release_disposable, release_with, ActivatedHandler, ActivatingHandler, ComponentRegistration,
  Disposable, Lifetime, Ownership, PreparingHandler, RegistrationData, RegistrationId, ReleaseFn,
  Sharing,
};
pub use registry::{ComponentRegistry, RegistrationLookup, RegistrationSource};
pub use resolve::ResolutionContext;
pub use scope::{Container, LifetimeScope};
pub use service::{GenericDef, Qualifier, ServiceKey, TypeKey};
pub use source::{
  CloseFn, CollectionSource, ConstraintFn, OpenGenericSource, TypeTemplate, MAX_MATCH_DEPTH,
};

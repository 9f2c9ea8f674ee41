//! Error types for resolution and disposal.

use std::error::Error;

use thiserror::Error;

use crate::service::ServiceKey;

/// Hard ceiling on the activation-stack depth of a single top-level resolve.
/// Graphs deeper than this are treated as a resolution failure rather than
/// allowed to exhaust the call stack.
pub const MAX_RESOLVE_DEPTH: usize = 100;

fn format_trail(keys: &[ServiceKey]) -> String {
  keys
    .iter()
    .map(|k| k.to_string())
    .collect::<Vec<_>>()
    .join(" -> ")
}

/// Everything that can go wrong during a resolve call.
///
/// Lookups that simply find nothing report [`ResolveError::ServiceNotRegistered`];
/// callers treating the service as optional can match on it and substitute a
/// default. All other variants are contract or activation failures.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// No direct registration matched and no source could synthesize one.
  #[error("no registration found for service {0}")]
  ServiceNotRegistered(ServiceKey),

  /// The activation stack revisited a key. `cycle` names the full loop,
  /// starting and ending at the revisited service.
  #[error("circular dependency detected: {}", format_trail(cycle))]
  CircularDependency { cycle: Vec<ServiceKey> },

  /// A `Lifetime::MatchingScope` registration was resolved but no ancestor
  /// scope carries the requested tag. This is a configuration error; there is
  /// no implicit fallback to the root.
  #[error("no lifetime scope tagged \"{tag}\" found while resolving {service}")]
  MatchingScopeNotFound { tag: String, service: ServiceKey },

  /// An activator, lifecycle handler or nested resolve failed. Carries the
  /// partial activation stack for diagnostics and the original cause.
  #[error("resolution of {service} failed (activation stack: {})", format_trail(stack))]
  DependencyResolutionFailed {
    service: ServiceKey,
    stack: Vec<ServiceKey>,
    #[source]
    source: Box<ResolveError>,
  },

  /// A registration source returned a registration that does not provide the
  /// service it was asked to satisfy, or an activator produced an instance of
  /// the wrong type. A programming error in the source or activator.
  #[error("invalid registration for service {service}: {detail}")]
  InvalidRegistration { service: ServiceKey, detail: String },

  /// The scope servicing the request has already been disposed.
  #[error("lifetime scope is already disposed")]
  ScopeDisposed,

  /// The activation stack exceeded [`MAX_RESOLVE_DEPTH`].
  #[error("maximum resolve depth {MAX_RESOLVE_DEPTH} exceeded while resolving {service}")]
  MaxDepthExceeded { service: ServiceKey },

  /// A failure raised inside a user-supplied activator or handler.
  #[error("activation failed: {0}")]
  Other(#[source] Box<dyn Error + Send + Sync>),
}

impl ResolveError {
  /// Wraps an arbitrary error raised by user code in an activator.
  pub fn other(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
    ResolveError::Other(err.into())
  }
}

/// Errors raised while releasing owned instances.
#[derive(Debug, Error)]
pub enum DisposeError {
  /// A single release hook failed.
  #[error("instance release failed: {0}")]
  Release(#[source] Box<dyn Error + Send + Sync>),

  /// One or more releases failed during a teardown. Every handle was still
  /// invoked; the individual failures are collected here.
  #[error("{} release failure(s) during scope teardown", .0.len())]
  Aggregate(Vec<DisposeError>),
}

impl DisposeError {
  pub fn release(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
    DisposeError::Release(err.into())
  }
}

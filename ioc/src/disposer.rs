//! Tracks owned instances and releases them in reverse-registration order.

use std::sync::atomic::{AtomicBool, Ordering};

use log::warn;
use parking_lot::Mutex;

use crate::activator::Instance;
use crate::error::DisposeError;
use crate::registration::ReleaseFn;

/// A single deferred teardown action. Runs at most once.
pub type DisposalHandle = Box<dyn FnOnce() -> Result<(), DisposeError> + Send>;

/// Builds the handle registered for an `OwnedByScope` instance.
///
/// The handle keeps its own clone of the instance, so even without a release
/// hook the payload's `Drop` is pinned to scope teardown rather than to the
/// last outstanding caller reference.
pub fn instance_handle(release: Option<ReleaseFn>, instance: Instance) -> DisposalHandle {
  Box::new(move || {
    let result = match &release {
      Some(f) => f(&instance),
      None => Ok(()),
    };
    drop(instance);
    result
  })
}

/// The per-scope disposal tracker.
///
/// Handles run in reverse-registration order (last registered, first
/// released), so instances never outlive the dependencies they were built
/// from. `dispose_all` is idempotent.
pub struct Disposer {
  items: Mutex<Vec<DisposalHandle>>,
  disposed: AtomicBool,
}

impl Disposer {
  pub fn new() -> Self {
    Self {
      items: Mutex::new(Vec::new()),
      disposed: AtomicBool::new(false),
    }
  }

  pub fn is_disposed(&self) -> bool {
    self.disposed.load(Ordering::Acquire)
  }

  /// Appends a handle. If the disposer was already drained, the handle runs
  /// immediately so the instance is never silently leaked.
  pub fn add(&self, handle: DisposalHandle) -> Result<(), DisposeError> {
    if self.is_disposed() {
      return handle();
    }
    let mut items = self.items.lock();
    // Teardown may have started between the check and the lock.
    if self.is_disposed() {
      drop(items);
      return handle();
    }
    items.push(handle);
    Ok(())
  }

  /// Flips the disposed flag. True on the call that performed the flip;
  /// the caller owning that flip must follow up with [`Disposer::drain`].
  pub(crate) fn begin_dispose(&self) -> bool {
    !self.disposed.swap(true, Ordering::AcqRel)
  }

  /// Drains every handle in reverse order, aggregating failures so one bad
  /// release never prevents the rest from running. A second call is a no-op.
  pub fn dispose_all(&self) -> Result<(), DisposeError> {
    if !self.begin_dispose() {
      return Ok(());
    }
    self.drain()
  }

  pub(crate) fn drain(&self) -> Result<(), DisposeError> {
    // Take the handles out before running them; user release hooks must not
    // run under the disposer lock.
    let items = std::mem::take(&mut *self.items.lock());
    let mut failures = Vec::new();
    for handle in items.into_iter().rev() {
      if let Err(err) = handle() {
        warn!("release failed during teardown: {}", err);
        failures.push(err);
      }
    }
    if failures.is_empty() {
      Ok(())
    } else {
      Err(DisposeError::Aggregate(failures))
    }
  }

  /// Number of pending handles. Diagnostic only.
  pub fn pending(&self) -> usize {
    self.items.lock().len()
  }
}

impl Default for Disposer {
  fn default() -> Self {
    Self::new()
  }
}

impl Drop for Disposer {
  fn drop(&mut self) {
    if !self.is_disposed() {
      let _ = self.dispose_all();
    }
  }
}

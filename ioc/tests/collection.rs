use std::sync::Arc;

use trellis_ioc::{
  CollectionSource, ComponentRegistration, Container, DelegateActivator, RegistrationData,
  ServiceKey,
};

// --- Test Fixtures ---

trait Handler: Send + Sync {
  fn name(&self) -> &'static str;
}

struct AuthHandler;
impl Handler for AuthHandler {
  fn name(&self) -> &'static str {
    "auth"
  }
}

struct LoggingHandler;
impl Handler for LoggingHandler {
  fn name(&self) -> &'static str {
    "logging"
  }
}

struct RoutingHandler;
impl Handler for RoutingHandler {
  fn name(&self) -> &'static str {
    "routing"
  }
}

fn register_handler<H: Handler + 'static>(container: &Container, build: fn() -> H) {
  container.register(ComponentRegistration::new(
    RegistrationData::new(ServiceKey::of::<dyn Handler>()),
    Arc::new(DelegateActivator::from_arc::<dyn Handler, _>(move |_, _| {
      Ok(Arc::new(build()))
    })),
  ));
}

fn names(handlers: &[Arc<dyn Handler>]) -> Vec<&'static str> {
  handlers.iter().map(|h| h.name()).collect()
}

// --- Collection Tests ---

#[test]
fn test_collection_aggregates_all_registrations_in_order() {
  // Arrange
  let container = Container::new();
  container.add_source(Arc::new(CollectionSource::<dyn Handler>::new()));
  register_handler(&container, || AuthHandler);
  register_handler(&container, || LoggingHandler);

  // Act
  let pipeline = container.resolve::<Vec<Arc<dyn Handler>>>().unwrap();

  // Assert: registration order is preserved.
  assert_eq!(names(&pipeline), vec!["auth", "logging"]);
}

#[test]
fn test_collection_reflects_registrations_added_after_first_resolve() {
  // Arrange
  let container = Container::new();
  container.add_source(Arc::new(CollectionSource::<dyn Handler>::new()));
  register_handler(&container, || AuthHandler);
  register_handler(&container, || LoggingHandler);

  // Act: first resolve memoizes the synthesized collection.
  let before = container.resolve::<Vec<Arc<dyn Handler>>>().unwrap();
  assert_eq!(before.len(), 2);

  // A later registration must invalidate the memoized adapter output.
  register_handler(&container, || RoutingHandler);
  let after = container.resolve::<Vec<Arc<dyn Handler>>>().unwrap();

  // Assert
  assert_eq!(names(&after), vec!["auth", "logging", "routing"]);
}

#[test]
fn test_source_added_after_a_miss_is_consulted_on_the_next_resolve() {
  // Arrange: the first resolve misses and memoizes the miss.
  let container = Container::new();
  assert!(container.resolve::<Vec<Arc<dyn Handler>>>().is_err());

  // Act: a source arriving later must drop that negative memo.
  container.add_source(Arc::new(CollectionSource::<dyn Handler>::new()));
  register_handler(&container, || AuthHandler);
  let pipeline = container.resolve::<Vec<Arc<dyn Handler>>>().unwrap();

  // Assert
  assert_eq!(names(&pipeline), vec!["auth"]);
}

#[test]
fn test_empty_collection_resolves_to_an_empty_vec() {
  // Arrange: the source is present but nothing implements the trait.
  let container = Container::new();
  container.add_source(Arc::new(CollectionSource::<dyn Handler>::new()));

  // Act
  let pipeline = container.resolve::<Vec<Arc<dyn Handler>>>().unwrap();

  // Assert: an empty set is an empty collection, not an error.
  assert!(pipeline.is_empty());
}

#[test]
fn test_single_service_resolution_still_yields_the_last_registration() {
  // Arrange: the collection source must not disturb direct lookups.
  let container = Container::new();
  container.add_source(Arc::new(CollectionSource::<dyn Handler>::new()));
  register_handler(&container, || AuthHandler);
  register_handler(&container, || LoggingHandler);

  // Act
  let single = container.resolve::<dyn Handler>().unwrap();

  // Assert
  assert_eq!(single.name(), "logging");
}

#[test]
fn test_each_collection_resolve_activates_fresh_elements() {
  // Non-shared elements are re-activated per collection resolve.
  let container = Container::new();
  container.add_source(Arc::new(CollectionSource::<dyn Handler>::new()));
  register_handler(&container, || AuthHandler);

  let first = container.resolve::<Vec<Arc<dyn Handler>>>().unwrap();
  let second = container.resolve::<Vec<Arc<dyn Handler>>>().unwrap();

  assert!(!Arc::ptr_eq(&first[0], &second[0]));
}

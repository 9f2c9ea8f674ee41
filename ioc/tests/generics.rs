use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use trellis_ioc::{
  instance_of, Container, DelegateActivator, GenericDef, ResolveError, ServiceKey, TypeKey,
  TypeTemplate,
};

// --- Test Fixtures ---

// Open definitions are introduced by marker types; the closed implementation
// is an ordinary generic struct.
struct IRepositoryDef;
struct RepositoryDef;
struct ListDef;

#[derive(Debug)]
struct Customer;
#[derive(Debug)]
struct Order;

struct Repository<T> {
  _marker: PhantomData<fn() -> T>,
}

impl<T> Repository<T> {
  fn new() -> Self {
    Self {
      _marker: PhantomData,
    }
  }
}

fn i_repository_of(arg: TypeKey) -> ServiceKey {
  ServiceKey::for_type(TypeKey::generic(GenericDef::of::<IRepositoryDef>(), vec![arg]))
}

/// A source closing `Repository<T>` over `IRepository<T>` requests, able to
/// close over Customer and Order only.
fn repository_source(closer_calls: &'static AtomicUsize) -> trellis_ioc::OpenGenericSource {
  trellis_ioc::OpenGenericSource::new(
    TypeTemplate::generic(GenericDef::of::<RepositoryDef>(), vec![TypeTemplate::Param(0)]),
    1,
    move |args, implementation| {
      closer_calls.fetch_add(1, Ordering::SeqCst);
      let implementation = implementation.clone();
      if args[0] == TypeKey::of::<Customer>() {
        Some(Arc::new(DelegateActivator::with_limit(
          implementation,
          |_, _| Ok(instance_of(Repository::<Customer>::new())),
        )))
      } else if args[0] == TypeKey::of::<Order>() {
        Some(Arc::new(DelegateActivator::with_limit(
          implementation,
          |_, _| Ok(instance_of(Repository::<Order>::new())),
        )))
      } else {
        None
      }
    },
  )
  .provide_as(TypeTemplate::generic(
    GenericDef::of::<IRepositoryDef>(),
    vec![TypeTemplate::Param(0)],
  ))
}

// --- Open Generic Tests ---

#[test]
fn test_closed_generic_request_synthesizes_the_implementation() {
  static CLOSER_CALLS: AtomicUsize = AtomicUsize::new(0);

  // Arrange
  let container = Container::new();
  container.add_source(Arc::new(repository_source(&CLOSER_CALLS)));

  // Act
  let repo = container
    .root()
    .resolve_key::<Repository<Customer>>(
      &i_repository_of(TypeKey::of::<Customer>()),
      trellis_ioc::Parameters::new(),
    )
    .unwrap();

  // Assert: the runtime type is the correctly-closed implementation.
  let _typed: Arc<Repository<Customer>> = repo;
}

#[test]
fn test_synthesis_is_memoized_per_service_key() {
  static CLOSER_CALLS: AtomicUsize = AtomicUsize::new(0);

  // Arrange
  let container = Container::new();
  container.add_source(Arc::new(repository_source(&CLOSER_CALLS)));
  let key = i_repository_of(TypeKey::of::<Customer>());

  // Act: three resolves of the same closed service.
  for _ in 0..3 {
    container
      .root()
      .resolve_key::<Repository<Customer>>(&key, trellis_ioc::Parameters::new())
      .unwrap();
  }

  // Assert: the synthesized registration was cached after the first hit.
  assert_eq!(CLOSER_CALLS.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unclosable_generic_request_is_not_found() {
  static CLOSER_CALLS: AtomicUsize = AtomicUsize::new(0);

  // Arrange: the closer cannot produce Repository<u32>.
  let container = Container::new();
  container.add_source(Arc::new(repository_source(&CLOSER_CALLS)));

  // Act
  let err = container
    .root()
    .resolve_service(
      &i_repository_of(TypeKey::of::<u32>()),
      trellis_ioc::Parameters::new(),
    )
    .err()
    .expect("synthesis should decline");

  // Assert: a silent decline surfaces as "not registered", not a failure.
  assert!(matches!(err, ResolveError::ServiceNotRegistered(_)));
}

#[test]
fn test_plain_type_requests_never_reach_the_generic_source() {
  static CLOSER_CALLS: AtomicUsize = AtomicUsize::new(0);

  // Arrange
  let container = Container::new();
  container.add_source(Arc::new(repository_source(&CLOSER_CALLS)));

  // Act
  let err = container.resolve::<Customer>().unwrap_err();

  // Assert
  assert!(matches!(err, ResolveError::ServiceNotRegistered(_)));
  assert_eq!(CLOSER_CALLS.load(Ordering::SeqCst), 0);
}

#[test]
fn test_implementation_parameter_binds_nested_inside_a_service_argument() {
  // The configured service is IRepository<List<T>>; the implementation
  // parameter sits one level down inside the service's generic argument.

  struct BatchRepository<T> {
    _marker: PhantomData<fn() -> T>,
  }

  static CLOSER_CALLS: AtomicUsize = AtomicUsize::new(0);

  // Arrange
  let container = Container::new();
  let source = trellis_ioc::OpenGenericSource::new(
    TypeTemplate::generic(GenericDef::of::<RepositoryDef>(), vec![TypeTemplate::Param(0)]),
    1,
    |args, implementation| {
      CLOSER_CALLS.fetch_add(1, Ordering::SeqCst);
      if args[0] == TypeKey::of::<Order>() {
        Some(Arc::new(DelegateActivator::with_limit(
          implementation.clone(),
          |_, _| {
            Ok(instance_of(BatchRepository::<Order> {
              _marker: PhantomData,
            }))
          },
        )))
      } else {
        None
      }
    },
  )
  .provide_as(TypeTemplate::generic(
    GenericDef::of::<IRepositoryDef>(),
    vec![TypeTemplate::generic(
      GenericDef::of::<ListDef>(),
      vec![TypeTemplate::Param(0)],
    )],
  ));
  container.add_source(Arc::new(source));

  // Act: request IRepository<List<Order>>; T must bind to Order.
  let requested = ServiceKey::for_type(TypeKey::generic(
    GenericDef::of::<IRepositoryDef>(),
    vec![TypeKey::generic(
      GenericDef::of::<ListDef>(),
      vec![TypeKey::of::<Order>()],
    )],
  ));
  let repo = container
    .root()
    .resolve_key::<BatchRepository<Order>>(&requested, trellis_ioc::Parameters::new());

  // Assert
  assert!(repo.is_ok());
  assert_eq!(CLOSER_CALLS.load(Ordering::SeqCst), 1);
}

#[test]
fn test_synthesized_registration_provides_every_closed_service() {
  // A shared synthesized registration is reachable through both of its
  // configured service shapes, yielding the same cached instance.

  struct IReadRepositoryDef;

  static CLOSER_CALLS: AtomicUsize = AtomicUsize::new(0);

  // Arrange
  let container = Container::new();
  let source = trellis_ioc::OpenGenericSource::new(
    TypeTemplate::generic(GenericDef::of::<RepositoryDef>(), vec![TypeTemplate::Param(0)]),
    1,
    |args, implementation| {
      CLOSER_CALLS.fetch_add(1, Ordering::SeqCst);
      if args[0] == TypeKey::of::<Customer>() {
        Some(Arc::new(DelegateActivator::with_limit(
          implementation.clone(),
          |_, _| Ok(instance_of(Repository::<Customer>::new())),
        )))
      } else {
        None
      }
    },
  )
  .provide_as(TypeTemplate::generic(
    GenericDef::of::<IRepositoryDef>(),
    vec![TypeTemplate::Param(0)],
  ))
  .provide_as(TypeTemplate::generic(
    GenericDef::of::<IReadRepositoryDef>(),
    vec![TypeTemplate::Param(0)],
  ))
  .shared();
  container.add_source(Arc::new(source));

  // Act
  let via_write = container
    .root()
    .resolve_key::<Repository<Customer>>(
      &i_repository_of(TypeKey::of::<Customer>()),
      trellis_ioc::Parameters::new(),
    )
    .unwrap();
  let read_key = ServiceKey::for_type(TypeKey::generic(
    GenericDef::of::<IReadRepositoryDef>(),
    vec![TypeKey::of::<Customer>()],
  ));
  let via_read = container
    .root()
    .resolve_key::<Repository<Customer>>(&read_key, trellis_ioc::Parameters::new())
    .unwrap();

  // Assert: one registration, one shared instance, both shapes.
  assert!(Arc::ptr_eq(&via_write, &via_read));
}

#[test]
fn test_template_naming_a_position_beyond_the_arity_declines() {
  // Arrange: arity 1, but the service template references position 1. The
  // misconfigured source must decline the request, not fail it.
  let container = Container::new();
  let source = trellis_ioc::OpenGenericSource::new(
    TypeTemplate::generic(GenericDef::of::<RepositoryDef>(), vec![TypeTemplate::Param(0)]),
    1,
    |_, _| None,
  )
  .provide_as(TypeTemplate::generic(
    GenericDef::of::<IRepositoryDef>(),
    vec![TypeTemplate::Param(1)],
  ));
  container.add_source(Arc::new(source));

  // Act
  let err = container
    .root()
    .resolve_service(
      &i_repository_of(TypeKey::of::<Customer>()),
      trellis_ioc::Parameters::new(),
    )
    .err()
    .expect("out-of-range template should decline");

  // Assert
  assert!(matches!(err, ResolveError::ServiceNotRegistered(_)));
}

#[test]
fn test_constraint_predicate_filters_closings() {
  static CLOSER_CALLS: AtomicUsize = AtomicUsize::new(0);

  // Arrange: the constraint only admits Customer.
  let container = Container::new();
  let source = repository_source(&CLOSER_CALLS)
    .with_constraint(|_, arg| *arg == TypeKey::of::<Customer>());
  container.add_source(Arc::new(source));

  // Act & Assert: Order is closable by the closer but rejected up front.
  let err = container
    .root()
    .resolve_service(
      &i_repository_of(TypeKey::of::<Order>()),
      trellis_ioc::Parameters::new(),
    )
    .err()
    .expect("constraint should reject the closing");
  assert!(matches!(err, ResolveError::ServiceNotRegistered(_)));
  assert_eq!(CLOSER_CALLS.load(Ordering::SeqCst), 0);
}

// --- Source Contract Tests ---

#[test]
fn test_source_returning_wrong_registration_is_a_contract_violation() {
  use trellis_ioc::{
    ComponentRegistration, RegistrationData, RegistrationLookup, RegistrationSource,
  };

  #[derive(Debug)]
  struct Requested;
  struct Unrelated;

  // A misbehaving source: returns a registration for a different service.
  struct BadSource;
  impl RegistrationSource for BadSource {
    fn registrations_for(
      &self,
      _service: &ServiceKey,
      _lookup: &mut dyn RegistrationLookup,
    ) -> Vec<Arc<ComponentRegistration>> {
      vec![ComponentRegistration::new(
        RegistrationData::new(ServiceKey::of::<Unrelated>()),
        Arc::new(DelegateActivator::new(|_, _| Ok(Unrelated))),
      )]
    }
  }

  // Arrange
  let container = Container::new();
  container.add_source(Arc::new(BadSource));

  // Act
  let err = container.resolve::<Requested>().unwrap_err();

  // Assert: fatal, not a silent miss.
  assert!(matches!(err, ResolveError::InvalidRegistration { .. }));
}

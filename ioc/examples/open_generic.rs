use std::marker::PhantomData;
use std::sync::Arc;

use trellis_ioc::{
  instance_of, Container, DelegateActivator, GenericDef, OpenGenericSource, Parameters,
  ServiceKey, TypeKey, TypeTemplate,
};

// 1. Marker types name the open generic shapes.
struct IRepositoryDef;
struct RepositoryDef;

// 2. The entities the repositories are closed over.
struct Customer;
struct Order;

// 3. The concrete open implementation.
struct Repository<T> {
  _marker: PhantomData<fn() -> T>,
}

fn main() {
  let container = Container::new();

  // --- Registration ---
  // One source closes Repository<T> for any IRepository<T> request it can
  // satisfy; the closer builds the activator for each concrete closing.
  let source = OpenGenericSource::new(
    TypeTemplate::generic(GenericDef::of::<RepositoryDef>(), vec![TypeTemplate::Param(0)]),
    1,
    |args, implementation| {
      println!("Closing repository over {}", args[0]);
      let implementation = implementation.clone();
      if args[0] == TypeKey::of::<Customer>() {
        Some(Arc::new(DelegateActivator::with_limit(
          implementation,
          |_, _| {
            Ok(instance_of(Repository::<Customer> {
              _marker: PhantomData,
            }))
          },
        )))
      } else if args[0] == TypeKey::of::<Order>() {
        Some(Arc::new(DelegateActivator::with_limit(
          implementation,
          |_, _| {
            Ok(instance_of(Repository::<Order> {
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
    vec![TypeTemplate::Param(0)],
  ));
  container.add_source(Arc::new(source));

  // --- Resolution ---
  // Request IRepository<Customer>: the source synthesizes the registration.
  let customer_key = ServiceKey::for_type(TypeKey::generic(
    GenericDef::of::<IRepositoryDef>(),
    vec![TypeKey::of::<Customer>()],
  ));
  let _customers = container
    .root()
    .resolve_key::<Repository<Customer>>(&customer_key, Parameters::new())
    .unwrap();
  println!("Resolved IRepository<Customer>.");

  // The synthesized registration is memoized: no second closing happens.
  let _again = container
    .root()
    .resolve_key::<Repository<Customer>>(&customer_key, Parameters::new())
    .unwrap();
  println!("Resolved it again from the memoized registration.");

  // A closed shape the closer declines is simply not registered.
  let unknown_key = ServiceKey::for_type(TypeKey::generic(
    GenericDef::of::<IRepositoryDef>(),
    vec![TypeKey::of::<String>()],
  ));
  let missing = container.root().resolve_service(&unknown_key, Parameters::new());
  assert!(missing.is_err());
  println!("IRepository<String> is declined, as expected.");
}

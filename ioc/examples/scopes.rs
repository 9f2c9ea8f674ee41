use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use trellis_ioc::{
  ComponentRegistration, Container, DelegateActivator, RegistrationData, ServiceKey,
};

// A per-request unit of work that gets a unique ID upon creation.
struct UnitOfWork {
  id: usize,
}

// A thread-safe counter to generate unique IDs.
static ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn main() {
  let container = Container::new();

  // --- Registration ---
  // Shared with the default CurrentScope lifetime: one instance per scope.
  container.register(ComponentRegistration::new(
    RegistrationData::new(ServiceKey::of::<UnitOfWork>()).shared(),
    Arc::new(DelegateActivator::new(|_, _| {
      println!("Creating UnitOfWork...");
      Ok(UnitOfWork {
        id: ID_COUNTER.fetch_add(1, Ordering::SeqCst),
      })
    })),
  ));

  // --- Two independent request scopes ---
  let request_a = container.begin_scope(Some("request")).unwrap();
  let request_b = container.begin_scope(Some("request")).unwrap();

  println!("--- Resolving within request A ---");
  let a1 = request_a.resolve::<UnitOfWork>().unwrap();
  let a2 = request_a.resolve::<UnitOfWork>().unwrap();
  println!("A1 ID: {}, A2 ID: {}", a1.id, a2.id);
  assert!(
    Arc::ptr_eq(&a1, &a2),
    "one shared instance per scope expected"
  );

  println!("--- Resolving within request B ---");
  let b1 = request_b.resolve::<UnitOfWork>().unwrap();
  println!("B1 ID: {}", b1.id);
  assert!(
    !Arc::ptr_eq(&a1, &b1),
    "sibling scopes should not share instances"
  );

  // --- Teardown ---
  // Each scope releases the instances it owns; the sibling is unaffected.
  request_a.dispose().unwrap();
  assert!(request_a.is_disposed());
  assert!(!request_b.is_disposed());
  println!("Request A disposed; request B still live.");
}

use std::sync::Arc;

use trellis_ioc::{
  release_with, ComponentRegistration, Container, DelegateActivator, RegistrationData, ServiceKey,
};

// 1. A connection that must be closed when its scope ends.
struct Connection {
  url: String,
}

// 2. A repository built on top of the connection.
struct Repository {
  connection: Arc<Connection>,
}

fn main() {
  let container = Container::new();

  // --- Registration ---
  // The release hook runs at scope teardown, in reverse creation order.
  container.register(ComponentRegistration::new(
    RegistrationData::new(ServiceKey::of::<Connection>()).with_release(release_with::<
      Connection,
      _,
    >(|connection| {
      println!("Closing connection to {}", connection.url);
      Ok(())
    })),
    Arc::new(DelegateActivator::new(|_, _| {
      println!("Opening connection...");
      Ok(Connection {
        url: "postgres://localhost".to_owned(),
      })
    })),
  ));

  // The repository's factory resolves its own dependency through the context.
  container.register(ComponentRegistration::new(
    RegistrationData::new(ServiceKey::of::<Repository>()).with_release(release_with::<
      Repository,
      _,
    >(|_| {
      println!("Flushing repository");
      Ok(())
    })),
    Arc::new(DelegateActivator::new(|ctx, _| {
      Ok(Repository {
        connection: ctx.resolve::<Connection>()?,
      })
    })),
  ));

  // --- Usage ---
  let scope = container.begin_scope(None).unwrap();
  let repository = scope.resolve::<Repository>().unwrap();
  println!("Repository uses {}", repository.connection.url);

  // --- Teardown ---
  // Prints "Flushing repository" before "Closing connection ...": the
  // repository was created last, so it is released first.
  scope.dispose().unwrap();
  println!("Scope disposed.");
}

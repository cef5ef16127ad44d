//! Application wiring
//!
//! Route table, container bootstrap and the kernel the binary serves.

pub mod artes;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::container::Container;
use crate::dispatch::closure;
use crate::error::{DispatchError, RouteError};
use crate::http::{MemorySessionStore, Request, Response};
use crate::routing::{RouteParams, Router};
use crate::server::Kernel;

pub use artes::{Arte, ArteController, ArteRepository, MemoryArteRepository};

/// Register every application route
pub fn routes(router: &mut Router) -> Result<(), RouteError> {
    router.get(
        "/",
        closure(|request: &Request, _: &RouteParams| {
            Ok::<_, DispatchError>(Response::redirect(&request.url("/artes"), 302))
        }),
    )?;
    router.resource::<ArteController>("/artes")?;
    Ok(())
}

/// Per-transaction container factory.
///
/// The repository is created once and captured, so every transaction's
/// container hands out the same instance.
pub fn bootstrap() -> impl Fn() -> Container + Send + Sync + 'static {
    let repository: Arc<dyn ArteRepository> = Arc::new(MemoryArteRepository::new());
    move || {
        let mut container = Container::new();
        container.instance(Arc::clone(&repository));
        container
    }
}

/// Kernel for `config`, with a process-local session store
pub fn kernel(config: Config) -> Result<Kernel, RouteError> {
    let mut router = Router::new();
    routes(&mut router)?;
    let store = MemorySessionStore::with_idle_timeout(Duration::from_secs(config.session.idle_timeout));
    Ok(Kernel::new(config, router, Arc::new(store), bootstrap()))
}

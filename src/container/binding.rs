// Binding definitions
// A binding pairs a construction strategy with a lifetime policy

use std::any::Any;
use std::sync::Arc;

use super::Container;
use crate::error::ContainerError;

/// Type-erased value held by the container.
///
/// Always wraps an `Arc<T>` for the bound `T`, so trait objects and sized
/// types share one representation and cached values keep their identity.
pub type Shared = Arc<dyn Any + Send + Sync>;

pub(crate) type BuildFn = Arc<dyn Fn(&Container) -> Result<Shared, ContainerError> + Send + Sync>;

/// How long a produced value lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// A new value on every resolution
    Transient,
    /// Built once, then reused for the lifetime of the container
    Singleton,
}

/// Construction strategy of a binding
#[derive(Clone)]
pub(crate) enum Strategy {
    /// Closure receiving the container so it can resolve its own dependencies
    Factory(BuildFn),
    /// Delegate to another (concrete) type's resolution
    Concrete {
        concrete: &'static str,
        build: BuildFn,
    },
    /// Pre-built value handed out as is
    Instance(Shared),
}

#[derive(Clone)]
pub(crate) struct Binding {
    /// Name of the bound (abstract) type
    pub name: &'static str,
    pub strategy: Strategy,
    pub lifetime: Lifetime,
}

impl Binding {
    pub fn build(&self, container: &Container) -> Result<Shared, ContainerError> {
        match &self.strategy {
            Strategy::Factory(build) | Strategy::Concrete { build, .. } => build(container),
            Strategy::Instance(shared) => Ok(Arc::clone(shared)),
        }
    }

    /// Short description used in diagnostics
    pub fn describe(&self) -> String {
        let strategy = match &self.strategy {
            Strategy::Factory(_) => "factory".to_string(),
            Strategy::Concrete { concrete, .. } => format!("concrete {concrete}"),
            Strategy::Instance(_) => "instance".to_string(),
        };
        let lifetime = match self.lifetime {
            Lifetime::Transient => "transient",
            Lifetime::Singleton => "singleton",
        };
        format!("{}: {lifetime} {strategy}", self.name)
    }
}

/// Wrap a typed value so it can live in the container
pub(crate) fn share<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Shared {
    Arc::new(value)
}

/// Recover a typed value from its erased form
pub(crate) fn unshare<T: ?Sized + Send + Sync + 'static>(
    shared: &Shared,
) -> Result<Arc<T>, ContainerError> {
    shared
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or(ContainerError::TypeMismatch {
            type_name: std::any::type_name::<T>(),
        })
}

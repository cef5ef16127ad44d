//! Binding registry
//!
//! Maps a type identity to a construction strategy and a lifetime:
//! - Factories: closures that receive the container and build a value
//! - Concrete bindings: resolve an abstraction through another type
//! - Instances: pre-built values, returned as-is forever
//! - Self-constructing types: anything implementing [`Injectable`] can be
//!   built without a binding, pulling its own dependencies from the container
//!
//! Resolution order for `T`: cached instance, then binding, then the type's
//! own constructor. Re-registering a type replaces the previous binding.

mod binding;

pub use binding::{Lifetime, Shared};

use binding::{share, unshare, Binding, BuildFn, Strategy};
use std::any::{type_name, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::ContainerError;

/// A type the container can build without an explicit binding.
///
/// Implementors declare their dependencies by resolving them from the
/// container, in the order their constructor needs them.
///
/// ```rust,ignore
/// impl Injectable for ArteController {
///     fn inject(container: &Container) -> Result<Self, ContainerError> {
///         Ok(Self { repository: container.make()? })
///     }
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    fn inject(container: &Container) -> Result<Self, ContainerError>;
}

// Types currently being built on this thread, innermost last
thread_local! {
    static RESOLVING: RefCell<Vec<(TypeId, &'static str)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a type as "under construction" until dropped
struct ResolutionGuard;

impl ResolutionGuard {
    fn enter(id: TypeId, name: &'static str) -> Result<Self, ContainerError> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|(seen, _)| *seen == id) {
                let mut chain: Vec<&str> = stack.iter().map(|(_, n)| *n).collect();
                chain.push(name);
                return Err(ContainerError::CircularDependency {
                    chain: chain.join(" -> "),
                });
            }
            stack.push((id, name));
            Ok(Self)
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Dependency-injection container
#[derive(Default)]
pub struct Container {
    bindings: HashMap<TypeId, Binding>,
    /// Pre-built instances and cached singletons
    instances: RwLock<HashMap<TypeId, Shared>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transient factory for `T`.
    ///
    /// `T` may be a trait object, e.g. `container.bind::<dyn Clock, _>(...)`.
    pub fn bind<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Self) -> Result<Arc<T>, ContainerError> + Send + Sync + 'static,
    {
        self.register::<T>(Strategy::Factory(erase(factory)), Lifetime::Transient)
    }

    /// Register a factory whose first result is cached
    pub fn singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Self) -> Result<Arc<T>, ContainerError> + Send + Sync + 'static,
    {
        self.register::<T>(Strategy::Factory(erase(factory)), Lifetime::Singleton)
    }

    /// Bind `T` to its own constructor
    pub fn bind_self<T: Injectable>(&mut self, lifetime: Lifetime) -> &mut Self {
        self.bind_type::<T, T>(lifetime, |concrete| concrete)
    }

    /// Bind abstraction `A` to concrete type `C`.
    ///
    /// `upcast` converts the built concrete value; for trait objects `|c| c`
    /// is enough.
    pub fn bind_type<A, C>(&mut self, lifetime: Lifetime, upcast: fn(Arc<C>) -> Arc<A>) -> &mut Self
    where
        A: ?Sized + Send + Sync + 'static,
        C: Injectable,
    {
        let build: BuildFn = Arc::new(move |container: &Self| {
            let concrete = if TypeId::of::<A>() == TypeId::of::<C>() {
                Self::construct::<C>(container)?
            } else {
                container.make::<C>()?
            };
            Ok(share(upcast(concrete)))
        });
        self.register::<A>(
            Strategy::Concrete {
                concrete: type_name::<C>(),
                build,
            },
            lifetime,
        )
    }

    /// Register a pre-built value as the permanent resolution for `T`
    pub fn instance<T: ?Sized + Send + Sync + 'static>(&mut self, value: Arc<T>) -> &mut Self {
        self.register::<T>(Strategy::Instance(share(value)), Lifetime::Singleton)
    }

    fn register<T: ?Sized + 'static>(&mut self, strategy: Strategy, lifetime: Lifetime) -> &mut Self {
        let id = TypeId::of::<T>();
        // A stale cached value would shadow the new binding
        self.instances_mut().remove(&id);
        self.bindings.insert(
            id,
            Binding {
                name: type_name::<T>(),
                strategy,
                lifetime,
            },
        );
        self
    }

    /// Resolve a concrete type, building it from its constructor when unbound
    pub fn make<T: Injectable>(&self) -> Result<Arc<T>, ContainerError> {
        self.resolve_with::<T>(Self::construct::<T>)
    }

    /// Resolve a type that can only come from a binding or an instance.
    ///
    /// Trait objects have no constructor; asking for an unbound one fails
    /// with [`ContainerError::Unresolvable`].
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        self.resolve_with::<T>(Self::unbound::<T>)
    }

    /// Value for a primitive constructor parameter.
    ///
    /// Primitives cannot be resolved from the container; only a declared
    /// default is usable.
    pub fn primitive<T>(
        owner: &'static str,
        parameter: &'static str,
        default: Option<T>,
    ) -> Result<T, ContainerError> {
        default.ok_or(ContainerError::UnresolvableParameter { owner, parameter })
    }

    fn construct<T: Injectable>(container: &Self) -> Result<Arc<T>, ContainerError> {
        T::inject(container).map(Arc::new)
    }

    fn unbound<T: ?Sized>(_: &Self) -> Result<Arc<T>, ContainerError> {
        Err(ContainerError::Unresolvable {
            type_name: type_name::<T>(),
        })
    }

    fn resolve_with<T: ?Sized + Send + Sync + 'static>(
        &self,
        fallback: fn(&Self) -> Result<Arc<T>, ContainerError>,
    ) -> Result<Arc<T>, ContainerError> {
        let id = TypeId::of::<T>();
        let name = type_name::<T>();

        if let Some(shared) = self.cached(id) {
            return unshare::<T>(&shared);
        }

        let _guard = ResolutionGuard::enter(id, name)?;

        match self.bindings.get(&id) {
            Some(binding) => {
                let shared = binding.build(self)?;
                let shared = match binding.lifetime {
                    Lifetime::Singleton => self.remember(id, shared),
                    Lifetime::Transient => shared,
                };
                unshare::<T>(&shared)
            }
            None => fallback(self),
        }
    }

    fn cached(&self, id: TypeId) -> Option<Shared> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Cache a singleton; if another thread got there first keep its value
    fn remember(&self, id: TypeId, shared: Shared) -> Shared {
        let mut instances = self.instances.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(instances.entry(id).or_insert(shared))
    }

    fn instances_mut(&mut self) -> &mut HashMap<TypeId, Shared> {
        self.instances.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `T` has a binding or an instance
    pub fn has<T: ?Sized + 'static>(&self) -> bool {
        let id = TypeId::of::<T>();
        self.bindings.contains_key(&id) || self.cached(id).is_some()
    }

    /// Drop the binding and any cached value for `T`
    pub fn forget<T: ?Sized + 'static>(&mut self) {
        let id = TypeId::of::<T>();
        self.bindings.remove(&id);
        self.instances_mut().remove(&id);
    }

    /// Drop cached singletons and instances, keeping bindings
    pub fn forget_instances(&mut self) {
        self.instances_mut().clear();
    }

    /// Drop everything
    pub fn flush(&mut self) {
        self.bindings.clear();
        self.instances_mut().clear();
    }

    /// Human-readable binding descriptions, for debug logging
    pub fn describe(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.bindings.values().map(Binding::describe).collect();
        lines.sort();
        lines
    }
}

fn erase<T, F>(factory: F) -> BuildFn
where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(&Container) -> Result<Arc<T>, ContainerError> + Send + Sync + 'static,
{
    Arc::new(move |container: &Container| factory(container).map(share))
}

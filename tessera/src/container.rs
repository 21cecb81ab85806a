//! Minimal type-keyed service container.
//!
//! Values are stored as `Arc<T>` under `TypeId::of::<T>()`. Singletons are
//! built lazily on first `get` and cached. String aliases point at a type.
//!
//! [`Container::scoped`] layers bindings over the container for the length
//! of one future. They live in a task-local, so concurrent requests each see
//! their own values and nothing is left behind when the future is dropped.

use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

type Shared = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&Container) -> Shared + Send + Sync>;

tokio::task_local! {
    static SCOPE: Arc<Frame>;
}

/// One level of scoped bindings, chained to the enclosing one.
struct Frame {
    owner: usize,
    values: HashMap<TypeId, Shared>,
    parent: Option<Arc<Frame>>,
}

impl Frame {
    fn lookup(&self, owner: usize, id: TypeId) -> Option<Shared> {
        let mut frame = Some(self);
        while let Some(current) = frame {
            if current.owner == owner {
                if let Some(value) = current.values.get(&id) {
                    return Some(Arc::clone(value));
                }
            }
            frame = current.parent.as_deref();
        }
        None
    }
}

/// Bindings handed to [`Container::scoped`].
#[derive(Default)]
pub struct Scope {
    values: HashMap<TypeId, Shared>,
}

impl Scope {
    /// No bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` as the scoped binding of `T`.
    pub fn with<T: Send + Sync + 'static>(mut self, value: Arc<T>) -> Self {
        self.values.insert(TypeId::of::<T>(), value);
        self
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("bindings", &self.values.len())
            .finish()
    }
}

enum Binding {
    Instance(Shared),
    Singleton(Factory),
}

#[derive(Default)]
struct Bindings {
    values: HashMap<TypeId, Binding>,
    names: HashMap<TypeId, &'static str>,
    aliases: HashMap<String, TypeId>,
}

/// Service container shared by the application and its providers.
#[derive(Default)]
pub struct Container {
    bindings: RwLock<Bindings>,
}

impl Container {
    /// An empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an existing value, replacing any previous binding of `T`.
    pub fn instance<T: Send + Sync + 'static>(&self, value: Arc<T>) {
        let mut bindings = self.bindings.write().unwrap_or_else(PoisonError::into_inner);
        bindings.values.insert(TypeId::of::<T>(), Binding::Instance(value));
        bindings.names.insert(TypeId::of::<T>(), type_name::<T>());
    }

    /// Bind a lazily built value. `factory` runs at most once per binding.
    pub fn singleton<T, F>(&self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        let factory: Factory =
            Arc::new(move |container: &Container| Arc::new(factory(container)) as Shared);
        let mut bindings = self.bindings.write().unwrap_or_else(PoisonError::into_inner);
        bindings.values.insert(TypeId::of::<T>(), Binding::Singleton(factory));
        bindings.names.insert(TypeId::of::<T>(), type_name::<T>());
    }

    /// Resolve `T`.
    ///
    /// The lock is released while a singleton factory runs, so factories may
    /// resolve other bindings.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.resolve(TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// Run `future` with `scope` layered over this container.
    ///
    /// Scoped bindings shadow regular ones and are visible to every lookup
    /// made while `future` is polled. Tasks spawned from it do not inherit
    /// them.
    pub async fn scoped<F: Future>(&self, scope: Scope, future: F) -> F::Output {
        let frame = Frame {
            owner: self.id(),
            values: scope.values,
            parent: SCOPE.try_with(Arc::clone).ok(),
        };
        SCOPE.scope(Arc::new(frame), future).await
    }

    fn id(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }

    fn scoped_value(&self, id: TypeId) -> Option<Shared> {
        SCOPE
            .try_with(|frame| frame.lookup(self.id(), id))
            .ok()
            .flatten()
    }

    fn resolve(&self, id: TypeId) -> Option<Shared> {
        if let Some(value) = self.scoped_value(id) {
            return Some(value);
        }

        let factory = {
            let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
            match bindings.values.get(&id)? {
                Binding::Instance(value) => return Some(Arc::clone(value)),
                Binding::Singleton(factory) => Arc::clone(factory),
            }
        };

        let built = factory(self);
        let mut bindings = self.bindings.write().unwrap_or_else(PoisonError::into_inner);
        match bindings.values.get(&id) {
            // Another caller finished first.
            Some(Binding::Instance(value)) => Some(Arc::clone(value)),
            _ => {
                bindings
                    .values
                    .insert(id, Binding::Instance(Arc::clone(&built)));
                Some(built)
            }
        }
    }

    /// Whether `T` is bound.
    pub fn has<T: 'static>(&self) -> bool {
        let id = TypeId::of::<T>();
        if self.scoped_value(id).is_some() {
            return true;
        }
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .contains_key(&id)
    }

    /// Remove the binding of `T` and any alias pointing at it.
    ///
    /// Scoped bindings are untouched.
    pub fn forget<T: 'static>(&self) -> bool {
        let id = TypeId::of::<T>();
        let mut bindings = self.bindings.write().unwrap_or_else(PoisonError::into_inner);
        bindings.aliases.retain(|_, target| *target != id);
        bindings.names.remove(&id);
        bindings.values.remove(&id).is_some()
    }

    /// Make `name` resolve to the binding of `T`.
    pub fn alias<T: 'static>(&self, name: impl Into<String>) {
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .aliases
            .insert(name.into(), TypeId::of::<T>());
    }

    /// Resolve `T` through an alias.
    ///
    /// Returns `None` if the alias is unknown or points at another type.
    pub fn get_by_alias<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let id = *self
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .aliases
            .get(name)?;
        if id != TypeId::of::<T>() {
            return None;
        }
        self.get::<T>()
    }

    /// Whether `name` is a registered alias.
    pub fn has_alias(&self, name: &str) -> bool {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .aliases
            .contains_key(name)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&str> = bindings.names.values().copied().collect();
        names.sort_unstable();
        f.debug_struct("Container")
            .field("bindings", &names)
            .field("aliases", &bindings.aliases.len())
            .finish()
    }
}

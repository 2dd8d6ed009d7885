//! Per-request components and the context store that memoises them.
//!
//! A component is a typed value that units share during one request, such
//! as the resolved caller profile or the trace record. Units never look
//! components up through ambient state: they ask the [`ContextStore`] carried
//! by the request, which constructs each type at most once.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use http::Method;
//! use strata_core::{Component, ComponentId, ContextStore, Request, StrataResult};
//!
//! struct Locale(String);
//!
//! impl Component for Locale {
//!     const ID: ComponentId = ComponentId::new("Locale");
//!
//!     fn create(request: &Request) -> StrataResult<Self> {
//!         Ok(Self(request.header("accept-language").unwrap_or("en").to_string()))
//!     }
//! }
//!
//! let request = Request::new(Method::GET, "/");
//! let mut store = ContextStore::new();
//!
//! let a = store.resolve::<Locale>(&request).unwrap();
//! let b = store.resolve::<Locale>(&request).unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//! assert_eq!(a.0, "en");
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{StrataError, StrataResult};
use crate::request::Request;

/// Explicit, statically assigned identity of a component.
///
/// Used as the key of trace attachments and in diagnostics, so two types
/// that happen to share a Rust name in different modules never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ComponentId(&'static str);

impl ComponentId {
    /// Creates an identifier.
    #[must_use]
    pub const fn new(id: &'static str) -> Self {
        Self(id)
    }

    /// The identifier text.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A value resolved at most once per request.
///
/// Components that later units update hold their mutable state behind
/// interior mutability, since the store hands out shared `Arc`s.
pub trait Component: Send + Sync + Sized + 'static {
    /// Stable identifier, unique across the application.
    const ID: ComponentId;

    /// Builds the component on first use within a request.
    fn create(request: &Request) -> StrataResult<Self>;
}

struct Slot {
    id: ComponentId,
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

/// Per-request map from component type to its single instance.
///
/// Created fresh for every request and dropped with it. It is never shared
/// across requests, so it needs no synchronisation.
#[derive(Default)]
pub struct ContextStore {
    slots: HashMap<TypeId, Slot>,
    owners: HashMap<ComponentId, (TypeId, &'static str)>,
}

impl ContextStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the instance of `T`, constructing it on first use.
    ///
    /// Every later call within the same store returns the same `Arc`.
    pub fn resolve<T: Component>(&mut self, request: &Request) -> StrataResult<Arc<T>> {
        if let Some(existing) = self.get::<T>() {
            return Ok(existing);
        }
        self.claim::<T>()?;
        let value = Arc::new(T::create(request)?);
        tracing::trace!(component = %T::ID, "component constructed");
        self.insert(value.clone());
        Ok(value)
    }

    /// Eagerly stores `value` unless `T` was already resolved.
    ///
    /// Returns the instance that is now current, which is the earlier one if
    /// `T` was already present.
    pub fn provide<T: Component>(&mut self, value: T) -> StrataResult<Arc<T>> {
        if let Some(existing) = self.get::<T>() {
            return Ok(existing);
        }
        self.claim::<T>()?;
        let value = Arc::new(value);
        self.insert(value.clone());
        Ok(value)
    }

    /// Returns the instance of `T` without constructing it.
    #[must_use]
    pub fn get<T: Component>(&self) -> Option<Arc<T>> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.value.clone().downcast::<T>().ok())
    }

    /// Returns `true` if `T` has been resolved or provided.
    #[must_use]
    pub fn contains<T: Component>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<T>())
    }

    /// Number of resolved components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if nothing has been resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Identifiers of the resolved components, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<ComponentId> {
        let mut ids: Vec<_> = self.slots.values().map(|slot| slot.id).collect();
        ids.sort_unstable();
        ids
    }

    fn claim<T: Component>(&mut self) -> StrataResult<()> {
        let type_id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();
        match self.owners.get(&T::ID) {
            Some((owner, owner_name)) if *owner != type_id => Err(StrataError::configuration(
                format!(
                    "component id `{}` is claimed by both {owner_name} and {type_name}",
                    T::ID
                ),
            )),
            _ => {
                self.owners.insert(T::ID, (type_id, type_name));
                Ok(())
            }
        }
    }

    fn insert<T: Component>(&mut self, value: Arc<T>) {
        self.slots.insert(
            TypeId::of::<T>(),
            Slot {
                id: T::ID,
                type_name: std::any::type_name::<T>(),
                value,
            },
        );
    }
}

impl fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.slots.values().map(|slot| slot.type_name).collect();
        names.sort_unstable();
        f.debug_struct("ContextStore")
            .field("components", &names)
            .finish()
    }
}

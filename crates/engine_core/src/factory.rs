//! Factories: component-type descriptors with add/remove lifecycle hooks.
//!
//! A factory is defined once per [`World`] from a [`FactoryDef`] and is
//! referred to afterwards through a cheap, copyable [`Factory`] handle. The
//! handle carries the component type `C`, the constructor argument type `A`
//! and the destructor argument type `R`, so every call through it is typed:
//!
//! ```rust
//! use engine_core::{Entity, FactoryDef, World};
//!
//! #[derive(Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! let mut world = World::new();
//! let position = world.factory(
//!     FactoryDef::new(|_entity: Entity, (x, y): (f32, f32)| Position { x, y })
//!         .named("position"),
//! );
//!
//! let e = Entity::from_raw(1);
//! position.add(&mut world, e, (5.0, 7.0)).unwrap();
//! assert_eq!(position.get(&world, e), Some(&Position { x: 5.0, y: 7.0 }));
//! position.remove(&mut world, e, ()).unwrap();
//! ```

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{HookResult, Result};
use crate::world::{World, WorldId};

/// Identity of a factory within its world. Assigned sequentially from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactoryId(pub u32);

impl FactoryId {
    /// Returns the id as a slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for FactoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Factory({})", self.0)
    }
}

pub(crate) type Constructor<C, A> = Arc<dyn Fn(Entity, A) -> C + Send + Sync>;
pub(crate) type Destructor<C, R> = Arc<dyn Fn(&mut World, Entity, C, R) -> HookResult + Send + Sync>;
pub(crate) type RemovedObserver<C> = Arc<dyn Fn(&mut World, Entity, &C) -> HookResult + Send + Sync>;
pub(crate) type Remover = Arc<dyn Fn(&mut World, Entity, &dyn Any) -> Result<()> + Send + Sync>;

/// Observer invoked with the world and an entity.
///
/// Used for the factory `added` observer and the world `spawned` observer.
pub type EntityObserver = Arc<dyn Fn(&mut World, Entity) -> HookResult + Send + Sync>;

/// Observer invoked once per kill with the world, the entity, and the
/// context passed to [`World::kill_with`].
pub type KillObserver = Arc<dyn Fn(&mut World, Entity, &dyn Any) -> HookResult + Send + Sync>;

/// Definition of a factory, consumed by [`World::factory`].
pub struct FactoryDef<C, A = (), R = ()> {
    pub(crate) name: Option<String>,
    pub(crate) add: Constructor<C, A>,
    pub(crate) remove: Option<Destructor<C, R>>,
    pub(crate) data: Option<Box<dyn Any + Send + Sync>>,
}

impl<C, A> FactoryDef<C, A> {
    /// Start a definition from its constructor.
    ///
    /// The constructor must not touch world storage; it only builds the
    /// component value.
    #[must_use]
    pub fn new(add: impl Fn(Entity, A) -> C + Send + Sync + 'static) -> Self {
        Self {
            name: None,
            add: Arc::new(add),
            remove: None,
            data: None,
        }
    }
}

impl<C, A, R> FactoryDef<C, A, R> {
    /// Set the destructor, called with the detached component after the
    /// entity's storage no longer holds it. `R` is the destructor argument
    /// passed to `remove`. During [`World::kill_with`] it is a clone of the
    /// kill context when that context is an `R`, and `R::default()`
    /// otherwise.
    #[must_use]
    pub fn with_remove<R2>(
        self,
        remove: impl Fn(&mut World, Entity, C, R2) -> HookResult + Send + Sync + 'static,
    ) -> FactoryDef<C, A, R2> {
        FactoryDef {
            name: self.name,
            add: self.add,
            remove: Some(Arc::new(remove)),
            data: self.data,
        }
    }

    /// Attach arbitrary metadata, readable later via [`Factory::data`].
    #[must_use]
    pub fn with_data<D: Any + Send + Sync>(mut self, data: D) -> Self {
        self.data = Some(Box::new(data));
        self
    }

    /// Give the factory a human-readable name for logs and errors.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl<C, A, R> std::fmt::Debug for FactoryDef<C, A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryDef")
            .field("name", &self.name)
            .field("has_remove", &self.remove.is_some())
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

/// Typed hooks of one factory, stored type-erased in its [`FactoryEntry`].
pub(crate) struct FactoryHooks<C, A, R> {
    pub(crate) add: Constructor<C, A>,
    pub(crate) remove: Option<Destructor<C, R>>,
}

impl<C, A, R> Clone for FactoryHooks<C, A, R> {
    fn clone(&self) -> Self {
        Self {
            add: Arc::clone(&self.add),
            remove: self.remove.clone(),
        }
    }
}

/// Everything a world knows about one factory.
pub(crate) struct FactoryEntry {
    pub(crate) name: String,
    pub(crate) data: Option<Box<dyn Any + Send + Sync>>,
    /// `FactoryHooks<C, A, R>`.
    pub(crate) hooks: Box<dyn Any + Send + Sync>,
    /// Removes this factory's component with default destructor arguments.
    pub(crate) remover: Remover,
    pub(crate) added: Option<EntityObserver>,
    /// `RemovedObserver<C>`.
    pub(crate) removed: Option<Box<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for FactoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryEntry")
            .field("name", &self.name)
            .field("has_added", &self.added.is_some())
            .field("has_removed", &self.removed.is_some())
            .finish_non_exhaustive()
    }
}

/// Handle to a factory defined in a [`World`].
///
/// `C` is the component type, `A` the constructor argument, `R` the
/// destructor argument. Handles are `Copy` and compare by identity.
pub struct Factory<C, A = (), R = ()> {
    id: FactoryId,
    world: WorldId,
    _marker: PhantomData<fn(A, R) -> C>,
}

impl<C, A, R> Factory<C, A, R> {
    pub(crate) fn new(id: FactoryId, world: WorldId) -> Self {
        Self {
            id,
            world,
            _marker: PhantomData,
        }
    }

    /// Returns the factory's identity.
    #[must_use]
    pub fn id(&self) -> FactoryId {
        self.id
    }

    pub(crate) fn world_id(&self) -> WorldId {
        self.world
    }
}

impl<C: Send + 'static, A: 'static, R: Clone + Default + 'static> Factory<C, A, R> {
    /// Constructs a component for `entity`, registering the entity first if
    /// needed. See [`World::add`].
    ///
    /// # Errors
    ///
    /// See [`World::add`].
    pub fn add<'w>(&self, world: &'w mut World, entity: Entity, args: A) -> Result<&'w mut C> {
        world.add(self, entity, args)
    }

    /// Detaches and destroys this factory's component on `entity`. See
    /// [`World::remove`].
    ///
    /// # Errors
    ///
    /// See [`World::remove`].
    pub fn remove(&self, world: &mut World, entity: Entity, args: R) -> Result<()> {
        world.remove(self, entity, args)
    }

    /// Returns this factory's component on `entity`, if held.
    #[must_use]
    pub fn get<'w>(&self, world: &'w World, entity: Entity) -> Option<&'w C> {
        world.get(entity).ok()?.get(self)
    }

    /// Returns this factory's component on `entity` mutably, if held.
    #[must_use]
    pub fn get_mut<'w>(&self, world: &'w mut World, entity: Entity) -> Option<&'w mut C> {
        world.component_mut(self, entity)
    }

    /// Returns `true` if `entity` holds this factory's component.
    #[must_use]
    pub fn has(&self, world: &World, entity: Entity) -> bool {
        world.has(self.id, entity)
    }

    /// Returns the metadata attached at definition, if it is a `D`.
    #[must_use]
    pub fn data<'w, D: Any>(&self, world: &'w World) -> Option<&'w D> {
        world.factory_data::<D>(self.id)
    }

    /// Returns the factory's name.
    #[must_use]
    pub fn name<'w>(&self, world: &'w World) -> &'w str {
        world.factory_name(self.id)
    }

    /// Set the observer fired after a component is added and stored.
    ///
    /// The observer can read the new component through the world.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ForeignFactory`](crate::EcsError::ForeignFactory)
    /// if this handle belongs to another world.
    pub fn set_added(
        &self,
        world: &mut World,
        observer: impl Fn(&mut World, Entity) -> HookResult + Send + Sync + 'static,
    ) -> Result<()> {
        world.set_added(self, Arc::new(observer))
    }

    /// Set the observer fired after a component is detached and before its
    /// destructor runs.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ForeignFactory`](crate::EcsError::ForeignFactory)
    /// if this handle belongs to another world.
    pub fn set_removed(
        &self,
        world: &mut World,
        observer: impl Fn(&mut World, Entity, &C) -> HookResult + Send + Sync + 'static,
    ) -> Result<()> {
        let observer: RemovedObserver<C> = Arc::new(observer);
        world.set_removed(self, observer)
    }
}

impl<C, A, R> Clone for Factory<C, A, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C, A, R> Copy for Factory<C, A, R> {}

impl<C, A, R> PartialEq for Factory<C, A, R> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.world == other.world
    }
}

impl<C, A, R> Eq for Factory<C, A, R> {}

impl<C, A, R> std::hash::Hash for Factory<C, A, R> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.world.hash(state);
    }
}

impl<C, A, R> std::fmt::Debug for Factory<C, A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("id", &self.id)
            .field("component", &std::any::type_name::<C>())
            .finish()
    }
}

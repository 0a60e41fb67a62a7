//! The [`World`]: entity registry, factories, component storage, signature
//! index, and query cache behind one facade.
//!
//! Every mutation is applied in the same order (store, then signature index,
//! then query cache) before any host hook runs, so hooks always observe a
//! consistent world and may themselves call back into it.
//!
//! A world is single-threaded: nothing inside it locks. It is `Send`, so a
//! host that needs shared access can wrap it in a `Mutex`.

use std::any::Any;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::config::{MissingComponentPolicy, WorldConfig};
use crate::entity::{Entity, EntityRegistry};
use crate::error::{EcsError, HookResult, Result};
use crate::factory::{
    EntityObserver, Factory, FactoryDef, FactoryEntry, FactoryHooks, FactoryId, KillObserver,
    RemovedObserver, Remover,
};
use crate::query::{Query, QueryEngine, QueryView, QueryViewMut};
use crate::signature::{ArchetypeId, Signature, SignatureIndex};
use crate::store::{BoxedComponent, ComponentStore, ComponentsMut, ComponentsTable};

/// Unique identity of a world, used to reject handles from other worlds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldId(Uuid);

/// Name reported for errors raised by world-level observers.
const WORLD_HOOK: &str = "world";

/// An isolated container for entities, factories, and their components.
pub struct World {
    id: WorldId,
    config: WorldConfig,
    registry: EntityRegistry,
    factories: Vec<FactoryEntry>,
    store: ComponentStore,
    index: SignatureIndex,
    queries: QueryEngine,
    spawned: Option<EntityObserver>,
    killed: Option<KillObserver>,
}

impl World {
    /// Create a world with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Create a world with the given configuration.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            id: WorldId(Uuid::new_v4()),
            queries: QueryEngine::new(config.query_cache_capacity),
            config,
            registry: EntityRegistry::new(),
            factories: Vec::new(),
            store: ComponentStore::new(),
            index: SignatureIndex::new(),
            spawned: None,
            killed: None,
        }
    }

    /// Returns this world's identity.
    #[must_use]
    pub fn id(&self) -> WorldId {
        self.id
    }

    /// Returns the configuration this world was created with.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    // -- Factories --

    /// Define a new factory and return its handle.
    pub fn factory<C, A, R>(&mut self, def: FactoryDef<C, A, R>) -> Factory<C, A, R>
    where
        C: Send + 'static,
        A: 'static,
        R: Clone + Default + 'static,
    {
        let id = FactoryId(self.factories.len() as u32);
        let handle = Factory::new(id, self.id);
        let remover: Remover = Arc::new(move |world: &mut World, entity: Entity, context: &dyn Any| {
            let args = context.downcast_ref::<R>().cloned().unwrap_or_default();
            world.remove(&handle, entity, args)
        });

        let name = def.name.unwrap_or_else(|| id.to_string());
        debug!(factory = %id, name = %name, "defined factory");
        self.factories.push(FactoryEntry {
            name,
            data: def.data,
            hooks: Box::new(FactoryHooks {
                add: def.add,
                remove: def.remove,
            }),
            remover,
            added: None,
            removed: None,
        });
        handle
    }

    /// Define a tag: a factory whose component is `true`, used only to mark
    /// membership for queries.
    pub fn tag(&mut self) -> Factory<bool> {
        self.factory(FactoryDef::new(|_: Entity, ()| true))
    }

    /// Returns the name of a factory.
    #[must_use]
    pub fn factory_name(&self, factory: FactoryId) -> &str {
        self.factories
            .get(factory.index())
            .map_or("unknown", |entry| entry.name.as_str())
    }

    /// Returns the metadata of a factory, if it is a `D`.
    #[must_use]
    pub fn factory_data<D: Any>(&self, factory: FactoryId) -> Option<&D> {
        self.factories
            .get(factory.index())?
            .data
            .as_deref()?
            .downcast_ref::<D>()
    }

    /// Returns the number of defined factories.
    #[must_use]
    pub fn factory_count(&self) -> usize {
        self.factories.len()
    }

    pub(crate) fn set_added<C, A, R>(
        &mut self,
        factory: &Factory<C, A, R>,
        observer: EntityObserver,
    ) -> Result<()> {
        self.entry_mut(factory)?.added = Some(observer);
        Ok(())
    }

    pub(crate) fn set_removed<C: 'static, A, R>(
        &mut self,
        factory: &Factory<C, A, R>,
        observer: RemovedObserver<C>,
    ) -> Result<()> {
        self.entry_mut(factory)?.removed = Some(Box::new(observer));
        Ok(())
    }

    // -- World observers --

    /// Set the observer fired after an entity becomes registered.
    pub fn set_spawned(
        &mut self,
        observer: impl Fn(&mut World, Entity) -> HookResult + Send + Sync + 'static,
    ) {
        self.spawned = Some(Arc::new(observer));
    }

    /// Set the observer fired once per [`World::kill_with`], after every
    /// component has been removed and the entity unregistered. It receives
    /// the kill context (`&()` for [`World::kill`]).
    pub fn set_killed(
        &mut self,
        observer: impl Fn(&mut World, Entity, &dyn Any) -> HookResult + Send + Sync + 'static,
    ) {
        self.killed = Some(Arc::new(observer));
    }

    // -- Entity lifecycle --

    /// Register a host-supplied entity with an empty component table.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateEntity`] if the entity is already
    /// registered, or [`EcsError::Hook`] if the `spawned` observer fails.
    pub fn register(&mut self, entity: Entity) -> Result<()> {
        self.registry.register(entity)?;
        self.admit(entity)
    }

    /// Create, register, and return a fresh unique entity.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::Hook`] if the `spawned` observer fails; the entity
    /// stays registered.
    pub fn entity(&mut self) -> Result<Entity> {
        let entity = self.registry.create_unique();
        self.admit(entity)?;
        Ok(entity)
    }

    /// Remove every component from `entity` (running each destructor once)
    /// and unregister it, then fire the `killed` observer.
    ///
    /// Equivalent to [`World::kill_with`] with an empty context, so every
    /// destructor receives `R::default()`.
    ///
    /// # Errors
    ///
    /// See [`World::kill_with`].
    pub fn kill(&mut self, entity: Entity) -> Result<()> {
        self.kill_with(entity, &())
    }

    /// Like [`World::kill`], forwarding `context` to the destructors and the
    /// `killed` observer. A destructor whose argument type is the context's
    /// type receives a clone of it; the others receive `R::default()`.
    ///
    /// Destructors may add, remove, or kill freely; components they add to
    /// this entity are removed in turn. If a hook kills the entity itself,
    /// that nested kill finishes the job and this call returns as soon as
    /// control comes back, even if the entity was registered again.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownEntity`] if the entity is not registered,
    /// or the first error raised by a destructor or observer. Removals
    /// completed before the error stay applied.
    pub fn kill_with(&mut self, entity: Entity, context: &dyn Any) -> Result<()> {
        let Some(life) = self.registry.epoch(entity) else {
            return Err(EcsError::UnknownEntity(entity));
        };

        while let Some(factory) = self
            .store
            .table(entity)
            .and_then(|table| table.factories().next())
        {
            let Some(remover) = self
                .factories
                .get(factory.index())
                .map(|entry| Arc::clone(&entry.remover))
            else {
                break;
            };
            remover(self, entity, context)?;

            if self.registry.epoch(entity) != Some(life) {
                return Ok(());
            }
        }

        self.registry.unregister(entity)?;
        self.store.close(entity);
        self.index.untrack(entity);
        self.queries.on_unregister(entity);
        debug!(%entity, "killed entity");

        if let Some(observer) = self.killed.clone() {
            observer(self, entity, context).map_err(|source| EcsError::hook(WORLD_HOOK, source))?;
        }
        Ok(())
    }

    /// Returns `true` if the entity is registered.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.registry.contains(entity)
    }

    /// Returns the number of registered entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.registry.len()
    }

    /// Iterates over the registered entities in unspecified order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.registry.iter()
    }

    // -- Components --

    /// Construct a component for `entity` with `factory`, registering the
    /// entity first if needed, and return it.
    ///
    /// The `added` observer fires after the component is stored and every
    /// query reflects it.
    ///
    /// # Errors
    ///
    /// - [`EcsError::DuplicateComponent`] if the entity already holds one.
    /// - [`EcsError::ForeignFactory`] if the handle belongs to another world.
    /// - [`EcsError::Hook`] if the `spawned` observer fails while
    ///   auto-registering; the entity stays registered and no component is
    ///   constructed.
    /// - [`EcsError::Hook`] if the `added` observer fails; the component
    ///   stays stored.
    /// - [`EcsError::MissingComponent`] if the `added` observer removed the
    ///   component before it could be returned.
    pub fn add<C, A, R>(&mut self, factory: &Factory<C, A, R>, entity: Entity, args: A) -> Result<&mut C>
    where
        C: Send + 'static,
        A: 'static,
        R: 'static,
    {
        let hooks = self.hooks(factory)?;
        let id = factory.id();

        if !self.registry.contains(entity) {
            self.register(entity)?;
        }
        if self.index.holds(entity, id) {
            return Err(EcsError::DuplicateComponent {
                entity,
                factory: self.factory_name(id).to_string(),
            });
        }

        let component = (hooks.add)(entity, args);
        self.attach(entity, id, Box::new(component))?;
        debug!(%entity, factory = self.factory_name(id), "added component");

        let observer = self
            .factories
            .get(id.index())
            .and_then(|entry| entry.added.clone());
        if let Some(observer) = observer {
            observer(self, entity).map_err(|source| EcsError::hook(self.factory_name(id), source))?;
        }

        if !self.index.holds(entity, id) {
            return Err(EcsError::MissingComponent {
                entity,
                factory: self.factory_name(id).to_string(),
            });
        }
        self.store
            .table_mut(entity)
            .and_then(|table| table.get_mut::<C>(id))
            .ok_or(EcsError::UnknownEntity(entity))
    }

    /// Detach `factory`'s component from `entity`, fire the `removed`
    /// observer, then run the destructor with `args`.
    ///
    /// Storage and queries are updated before either hook runs, so the
    /// destructor runs exactly once per stored component even if hooks
    /// re-enter the world.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnknownEntity`] if the entity is not registered.
    /// - [`EcsError::MissingComponent`] if it holds no such component and the
    ///   policy is [`MissingComponentPolicy::Error`].
    /// - [`EcsError::ForeignFactory`] if the handle belongs to another world.
    /// - [`EcsError::Hook`] if the observer or destructor fails. The
    ///   destructor still runs when the observer fails.
    pub fn remove<C, A, R>(&mut self, factory: &Factory<C, A, R>, entity: Entity, args: R) -> Result<()>
    where
        C: Send + 'static,
        A: 'static,
        R: 'static,
    {
        let hooks = self.hooks(factory)?;
        let id = factory.id();

        if !self.registry.contains(entity) {
            return Err(EcsError::UnknownEntity(entity));
        }
        let Some(component) = self.detach(entity, id) else {
            return match self.config.missing_component {
                MissingComponentPolicy::Error => Err(EcsError::MissingComponent {
                    entity,
                    factory: self.factory_name(id).to_string(),
                }),
                MissingComponentPolicy::Ignore => Ok(()),
            };
        };
        debug!(%entity, factory = self.factory_name(id), "removed component");

        let component = component
            .downcast::<C>()
            .map_err(|_| EcsError::ForeignFactory(id))?;

        let observed = match self.removed_observer::<C>(id) {
            Some(observer) => observer(self, entity, &*component),
            None => Ok(()),
        };
        let destroyed = match hooks.remove {
            Some(destructor) => destructor(self, entity, *component, args),
            None => Ok(()),
        };
        observed
            .and(destroyed)
            .map_err(|source| EcsError::hook(self.factory_name(id), source))
    }

    /// Returns the live component table of `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownEntity`] if the entity is not registered.
    pub fn get(&self, entity: Entity) -> Result<&ComponentsTable> {
        self.store
            .table(entity)
            .ok_or(EcsError::UnknownEntity(entity))
    }

    /// Returns mutable access to the component values of `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownEntity`] if the entity is not registered.
    pub fn get_mut(&mut self, entity: Entity) -> Result<ComponentsMut<'_>> {
        self.store
            .table_mut(entity)
            .map(ComponentsMut::new)
            .ok_or(EcsError::UnknownEntity(entity))
    }

    /// Returns `factory`'s component on `entity` mutably, if held.
    #[must_use]
    pub fn component_mut<C: 'static, A, R>(
        &mut self,
        factory: &Factory<C, A, R>,
        entity: Entity,
    ) -> Option<&mut C> {
        if factory.world_id() != self.id {
            return None;
        }
        self.store.table_mut(entity)?.get_mut::<C>(factory.id())
    }

    /// Returns `true` if `entity` holds a component from `factory`.
    #[must_use]
    pub fn has(&self, factory: FactoryId, entity: Entity) -> bool {
        self.index.holds(entity, factory)
    }

    /// Returns the signature of a registered entity.
    #[must_use]
    pub fn signature(&self, entity: Entity) -> Option<&Signature> {
        self.index.signature(entity)
    }

    /// Returns the archetype of a registered entity.
    #[must_use]
    pub fn archetype_of(&self, entity: Entity) -> Option<ArchetypeId> {
        self.index.archetype_of(entity)
    }

    /// Returns the number of distinct signatures currently populated.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.index.archetype_count()
    }

    // -- Queries --

    /// Returns the entities matching `query` with their live tables.
    ///
    /// The first call with a given predicate evaluates it; later calls with
    /// an equivalent predicate reuse the incrementally maintained result.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ForeignFactory`] if the query was built from a
    /// handle minted by another world.
    pub fn query(&mut self, query: &Query) -> Result<QueryView<'_>> {
        self.check_query(query)?;
        let matches = self.queries.resolve(query, &self.index, &self.registry);
        Ok(QueryView::new(matches, &self.store))
    }

    /// Like [`World::query`], with mutable access to component values.
    ///
    /// # Errors
    ///
    /// See [`World::query`].
    pub fn query_mut(&mut self, query: &Query) -> Result<QueryViewMut<'_>> {
        self.check_query(query)?;
        let matches = self.queries.resolve(query, &self.index, &self.registry);
        Ok(QueryViewMut::new(matches, &mut self.store))
    }

    /// Snapshot of the entities matching `query`, for loops that add,
    /// remove, or kill while walking the result.
    ///
    /// # Errors
    ///
    /// See [`World::query`].
    pub fn query_entities(&mut self, query: &Query) -> Result<Vec<Entity>> {
        Ok(self.query(query)?.entities())
    }

    /// Drop the cached handle for `query`. Returns `true` if one existed.
    pub fn release_query(&mut self, query: &Query) -> bool {
        self.queries.release(query)
    }

    /// Returns the number of cached query handles.
    #[must_use]
    pub fn cached_query_count(&self) -> usize {
        self.queries.len()
    }

    // -- Internals --

    fn admit(&mut self, entity: Entity) -> Result<()> {
        self.store.open(entity);
        self.index.track(entity);
        self.queries.on_register(entity);
        debug!(%entity, "registered entity");

        if let Some(observer) = self.spawned.clone() {
            observer(self, entity).map_err(|source| EcsError::hook(WORLD_HOOK, source))?;
        }
        Ok(())
    }

    fn check_query(&self, query: &Query) -> Result<()> {
        match query.foreign_to(self.id) {
            Some(factory) => Err(EcsError::ForeignFactory(factory)),
            None => Ok(()),
        }
    }

    fn attach(&mut self, entity: Entity, factory: FactoryId, component: BoxedComponent) -> Result<()> {
        let table = self
            .store
            .table_mut(entity)
            .ok_or(EcsError::UnknownEntity(entity))?;
        table.insert(factory, component);
        if let Some(signature) = self.index.insert(entity, factory) {
            self.queries.refresh(entity, factory, signature);
        }
        Ok(())
    }

    fn detach(&mut self, entity: Entity, factory: FactoryId) -> Option<BoxedComponent> {
        let component = self.store.table_mut(entity)?.take(factory)?;
        if let Some(signature) = self.index.remove(entity, factory) {
            self.queries.refresh(entity, factory, signature);
        }
        Some(component)
    }

    fn entry<C, A, R>(&self, factory: &Factory<C, A, R>) -> Result<&FactoryEntry> {
        if factory.world_id() != self.id {
            return Err(EcsError::ForeignFactory(factory.id()));
        }
        self.factories
            .get(factory.id().index())
            .ok_or(EcsError::ForeignFactory(factory.id()))
    }

    fn entry_mut<C, A, R>(&mut self, factory: &Factory<C, A, R>) -> Result<&mut FactoryEntry> {
        if factory.world_id() != self.id {
            return Err(EcsError::ForeignFactory(factory.id()));
        }
        self.factories
            .get_mut(factory.id().index())
            .ok_or(EcsError::ForeignFactory(factory.id()))
    }

    fn hooks<C: 'static, A: 'static, R: 'static>(
        &self,
        factory: &Factory<C, A, R>,
    ) -> Result<FactoryHooks<C, A, R>> {
        self.entry(factory)?
            .hooks
            .downcast_ref::<FactoryHooks<C, A, R>>()
            .cloned()
            .ok_or(EcsError::ForeignFactory(factory.id()))
    }

    fn removed_observer<C: 'static>(&self, factory: FactoryId) -> Option<RemovedObserver<C>> {
        self.factories
            .get(factory.index())?
            .removed
            .as_deref()?
            .downcast_ref::<RemovedObserver<C>>()
            .cloned()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("entities", &self.registry.len())
            .field("factories", &self.factories)
            .field("cached_queries", &self.queries.len())
            .finish_non_exhaustive()
    }
}

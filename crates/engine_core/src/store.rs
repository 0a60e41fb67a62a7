//! Per-entity component tables.
//!
//! The [`ComponentStore`] is the source of truth for which components an
//! entity holds. Tables are handed out as [`ComponentsTable`] (read-only) or
//! [`ComponentsMut`] (component fields mutable, slots fixed), so callers can
//! never add or drop a slot behind the signature index's back.

use std::any::Any;
use std::collections::HashMap;

use crate::entity::Entity;
use crate::factory::{Factory, FactoryId};

/// Type-erased component value.
pub(crate) type BoxedComponent = Box<dyn Any + Send>;

/// The components held by one entity, keyed by factory.
#[derive(Debug, Default)]
pub struct ComponentsTable {
    slots: HashMap<FactoryId, BoxedComponent>,
}

impl ComponentsTable {
    /// Returns the component produced by `factory`, if held.
    #[must_use]
    pub fn get<C: 'static, A, R>(&self, factory: &Factory<C, A, R>) -> Option<&C> {
        self.slots.get(&factory.id())?.downcast_ref::<C>()
    }

    /// Returns `true` if a component from the given factory is held.
    #[must_use]
    pub fn contains(&self, factory: FactoryId) -> bool {
        self.slots.contains_key(&factory)
    }

    /// Returns the number of components held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no component is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over the factories with a component in this table.
    pub fn factories(&self) -> impl Iterator<Item = FactoryId> + '_ {
        self.slots.keys().copied()
    }

    /// Iterates over `(factory, component)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (FactoryId, &(dyn Any + Send))> + '_ {
        self.slots.iter().map(|(&id, value)| (id, value.as_ref()))
    }

    pub(crate) fn insert(&mut self, factory: FactoryId, component: BoxedComponent) {
        self.slots.insert(factory, component);
    }

    pub(crate) fn take(&mut self, factory: FactoryId) -> Option<BoxedComponent> {
        self.slots.remove(&factory)
    }

    pub(crate) fn get_mut<C: 'static>(&mut self, factory: FactoryId) -> Option<&mut C> {
        self.slots.get_mut(&factory)?.downcast_mut::<C>()
    }
}

/// Mutable access to the components of one entity.
///
/// Component values can be changed in place; slots cannot be added or
/// removed. Use the factory's `add`/`remove` for that.
#[derive(Debug)]
pub struct ComponentsMut<'a> {
    table: &'a mut ComponentsTable,
}

impl<'a> ComponentsMut<'a> {
    pub(crate) fn new(table: &'a mut ComponentsTable) -> Self {
        Self { table }
    }

    /// Returns the component produced by `factory`, if held.
    #[must_use]
    pub fn get<C: 'static, A, R>(&self, factory: &Factory<C, A, R>) -> Option<&C> {
        self.table.get(factory)
    }

    /// Returns the component produced by `factory` mutably, if held.
    #[must_use]
    pub fn get_mut<C: 'static, A, R>(&mut self, factory: &Factory<C, A, R>) -> Option<&mut C> {
        self.table.get_mut::<C>(factory.id())
    }

    /// Read-only view of the whole table.
    #[must_use]
    pub fn table(&self) -> &ComponentsTable {
        self.table
    }
}

/// Component tables for every registered entity.
#[derive(Debug, Default)]
pub struct ComponentStore {
    tables: HashMap<Entity, ComponentsTable>,
}

impl ComponentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table for `entity`.
    pub fn open(&mut self, entity: Entity) {
        self.tables.entry(entity).or_default();
    }

    /// Drops the table of `entity`, returning whatever it still held.
    pub fn close(&mut self, entity: Entity) -> Option<ComponentsTable> {
        self.tables.remove(&entity)
    }

    /// Returns the table of `entity`.
    #[must_use]
    pub fn table(&self, entity: Entity) -> Option<&ComponentsTable> {
        self.tables.get(&entity)
    }

    pub(crate) fn table_mut(&mut self, entity: Entity) -> Option<&mut ComponentsTable> {
        self.tables.get_mut(&entity)
    }

    /// Returns the number of tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` if the store holds no tables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

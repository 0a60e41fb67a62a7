//! Include/exclude queries and the incrementally maintained query cache.
//!
//! A [`Query`] is a pair of signatures: factories an entity must hold and
//! factories it must not hold. Because [`Signature`] is canonical, two
//! queries built from the same factories in any order are equal and share
//! one cached handle.
//!
//! The [`QueryEngine`] evaluates a query once, seeding from the smallest
//! include bucket of the [`SignatureIndex`], and from then on keeps the
//! result current by re-testing only the entities whose signature changed
//! in a factory the query mentions.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::entity::{Entity, EntityRegistry};
use crate::factory::{Factory, FactoryId};
use crate::signature::{Signature, SignatureIndex};
use crate::store::{ComponentStore, ComponentsMut, ComponentsTable};
use crate::world::WorldId;

/// An include/exclude predicate over factories.
///
/// An empty include set matches every registered entity that holds none of
/// the excluded factories, including entities with no components at all.
///
/// A query built from typed handles remembers which world minted them, and
/// a world refuses to run a query built from another world's handles.
/// Equality and hashing only look at the two factory sets.
#[derive(Debug, Clone, Default)]
pub struct Query {
    include: Signature,
    exclude: Signature,
    /// World of the first typed handle, with that handle's id.
    origin: Option<(WorldId, FactoryId)>,
    /// First typed handle whose world differs from `origin`.
    stray: Option<FactoryId>,
}

impl Query {
    /// Create a query matching every registered entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require entities to hold `factory`.
    #[must_use]
    pub fn with<C, A, R>(self, factory: &Factory<C, A, R>) -> Self {
        self.bind(factory).with_id(factory.id())
    }

    /// Require entities not to hold `factory`.
    #[must_use]
    pub fn without<C, A, R>(self, factory: &Factory<C, A, R>) -> Self {
        self.bind(factory).without_id(factory.id())
    }

    /// Require entities to hold the factory with this id.
    #[must_use]
    pub fn with_id(mut self, factory: FactoryId) -> Self {
        self.include.insert(factory);
        self
    }

    /// Require entities not to hold the factory with this id.
    #[must_use]
    pub fn without_id(mut self, factory: FactoryId) -> Self {
        self.exclude.insert(factory);
        self
    }

    /// Factories an entity must hold.
    #[must_use]
    pub fn include(&self) -> &Signature {
        &self.include
    }

    /// Factories an entity must not hold.
    #[must_use]
    pub fn exclude(&self) -> &Signature {
        &self.exclude
    }

    /// Returns `true` if an entity with this signature satisfies the query.
    #[must_use]
    pub fn matches(&self, signature: &Signature) -> bool {
        signature.is_superset(&self.include) && signature.is_disjoint(&self.exclude)
    }

    /// Returns a factory in this query that `world` did not mint, if any.
    pub(crate) fn foreign_to(&self, world: WorldId) -> Option<FactoryId> {
        match (self.stray, self.origin) {
            (Some(stray), _) => Some(stray),
            (None, Some((origin, factory))) if origin != world => Some(factory),
            _ => None,
        }
    }

    fn bind<C, A, R>(mut self, factory: &Factory<C, A, R>) -> Self {
        match self.origin {
            None => self.origin = Some((factory.world_id(), factory.id())),
            Some((world, _)) if world != factory.world_id() => {
                self.stray.get_or_insert(factory.id());
            }
            Some(_) => {}
        }
        self
    }

    fn mentions(&self) -> impl Iterator<Item = FactoryId> + '_ {
        self.include.iter().chain(self.exclude.iter())
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.include == other.include && self.exclude == other.exclude
    }
}

impl Eq for Query {}

impl std::hash::Hash for Query {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.include.hash(state);
        self.exclude.hash(state);
    }
}

/// The entities currently matching one query.
///
/// Entities are kept in a dense vector with a row lookup so membership
/// changes are O(1) (swap-remove) and iteration is a linear walk.
#[derive(Debug, Default)]
pub struct QueryMatches {
    entities: Vec<Entity>,
    rows: HashMap<Entity, usize>,
}

impl QueryMatches {
    fn insert(&mut self, entity: Entity) {
        if self.rows.contains_key(&entity) {
            return;
        }
        self.rows.insert(entity, self.entities.len());
        self.entities.push(entity);
    }

    fn remove(&mut self, entity: Entity) {
        let Some(row) = self.rows.remove(&entity) else {
            return;
        };
        self.entities.swap_remove(row);
        if let Some(&moved) = self.entities.get(row) {
            self.rows.insert(moved, row);
        }
    }

    /// Returns `true` if the entity matches.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.rows.contains_key(&entity)
    }

    /// Returns the number of matching entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if nothing matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The matching entities, in unspecified order.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }
}

#[derive(Debug)]
struct CachedQuery {
    query: Query,
    matches: QueryMatches,
    last_used: u64,
}

/// Slot index of a cached query.
type Slot = usize;

/// Cache of live query handles, kept current as signatures change.
#[derive(Debug, Default)]
pub struct QueryEngine {
    /// Vacated slots keep their last query until reused; only slots reachable
    /// from `lookup` are live.
    slots: Vec<CachedQuery>,
    free: Vec<Slot>,
    lookup: HashMap<Query, Slot>,
    /// Queries mentioning each factory, indexed by factory id.
    watchers: Vec<HashSet<Slot>>,
    /// Queries with an empty include set; these track registration itself.
    universal: HashSet<Slot>,
    clock: u64,
    /// Maximum number of cached queries; 0 means unbounded.
    capacity: usize,
}

impl QueryEngine {
    /// Creates an engine caching at most `capacity` queries (0 = unbounded).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Returns the number of cached queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    /// Returns `true` if no query is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// Returns `true` if an equivalent query is cached.
    #[must_use]
    pub fn is_cached(&self, query: &Query) -> bool {
        self.lookup.contains_key(query)
    }

    /// Returns the up-to-date matches for `query`, evaluating and caching it
    /// on first use.
    pub fn resolve(
        &mut self,
        query: &Query,
        index: &SignatureIndex,
        registry: &EntityRegistry,
    ) -> &QueryMatches {
        self.clock += 1;
        let clock = self.clock;
        let cached = match self.lookup.get(query) {
            Some(&slot) => {
                trace!(slot, "query cache hit");
                &mut self.slots[slot]
            }
            None => {
                trace!(
                    include = query.include.len(),
                    exclude = query.exclude.len(),
                    "query cache miss"
                );
                self.admit(query.clone(), index, registry)
            }
        };
        cached.last_used = clock;
        &cached.matches
    }

    /// Drops the cached handle for `query`. Returns `true` if one existed.
    pub fn release(&mut self, query: &Query) -> bool {
        let Some(slot) = self.lookup.remove(query) else {
            return false;
        };
        self.vacate(slot);
        true
    }

    /// Re-tests `entity` against every query mentioning `factory` after its
    /// signature changed in that factory.
    pub fn refresh(&mut self, entity: Entity, factory: FactoryId, signature: &Signature) {
        let Some(watching) = self.watchers.get(factory.index()) else {
            return;
        };
        for &slot in watching {
            let cached = &mut self.slots[slot];
            if cached.query.matches(signature) {
                cached.matches.insert(entity);
            } else {
                cached.matches.remove(entity);
            }
        }
    }

    /// Adds a newly registered (empty-signature) entity to every query with
    /// an empty include set.
    pub fn on_register(&mut self, entity: Entity) {
        for &slot in &self.universal {
            self.slots[slot].matches.insert(entity);
        }
    }

    /// Drops an unregistered entity from every query that may hold it.
    pub fn on_unregister(&mut self, entity: Entity) {
        for &slot in &self.universal {
            self.slots[slot].matches.remove(entity);
        }
    }

    fn admit(
        &mut self,
        query: Query,
        index: &SignatureIndex,
        registry: &EntityRegistry,
    ) -> &mut CachedQuery {
        if self.capacity > 0 && self.lookup.len() >= self.capacity {
            self.evict_least_recent();
        }

        let cached = CachedQuery {
            matches: evaluate(&query, index, registry),
            query: query.clone(),
            last_used: self.clock,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = cached;
                slot
            }
            None => {
                self.slots.push(cached);
                self.slots.len() - 1
            }
        };

        for factory in query.mentions() {
            if self.watchers.len() <= factory.index() {
                self.watchers.resize_with(factory.index() + 1, HashSet::new);
            }
            self.watchers[factory.index()].insert(slot);
        }
        if query.include.is_empty() {
            self.universal.insert(slot);
        }
        self.lookup.insert(query, slot);
        &mut self.slots[slot]
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .lookup
            .values()
            .copied()
            .min_by_key(|&slot| self.slots[slot].last_used);
        if let Some(slot) = oldest {
            trace!(slot, "evicting least recently used query");
            let query = self.slots[slot].query.clone();
            self.lookup.remove(&query);
            self.vacate(slot);
        }
    }

    /// Unhooks a slot that `lookup` no longer points at.
    fn vacate(&mut self, slot: Slot) {
        let cached = &mut self.slots[slot];
        cached.matches = QueryMatches::default();
        for factory in cached.query.mentions() {
            if let Some(watching) = self.watchers.get_mut(factory.index()) {
                watching.remove(&slot);
            }
        }
        self.universal.remove(&slot);
        self.free.push(slot);
    }
}

/// Evaluates a query from scratch.
///
/// With a non-empty include set, the smallest include bucket seeds the scan,
/// so the cost is proportional to the rarest required factory rather than to
/// the number of entities.
fn evaluate(query: &Query, index: &SignatureIndex, registry: &EntityRegistry) -> QueryMatches {
    let mut matches = QueryMatches::default();
    let passes = |entity: Entity| {
        index
            .signature(entity)
            .is_some_and(|signature| query.matches(signature))
    };

    match query.include.iter().min_by_key(|&f| index.bucket_len(f)) {
        Some(seed) => {
            for entity in index.bucket(seed).filter(|&e| passes(e)) {
                matches.insert(entity);
            }
        }
        None => {
            for entity in registry.iter().filter(|&e| passes(e)) {
                matches.insert(entity);
            }
        }
    }
    matches
}

/// Read-only view of a query's matches together with their live tables.
#[derive(Debug, Clone, Copy)]
pub struct QueryView<'w> {
    matches: &'w QueryMatches,
    store: &'w ComponentStore,
}

impl<'w> QueryView<'w> {
    pub(crate) fn new(matches: &'w QueryMatches, store: &'w ComponentStore) -> Self {
        Self { matches, store }
    }

    /// Returns the number of matching entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Returns `true` if nothing matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Returns `true` if `entity` matches.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.matches.contains(entity)
    }

    /// Returns the table of `entity` if it matches.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&'w ComponentsTable> {
        if !self.matches.contains(entity) {
            return None;
        }
        self.store.table(entity)
    }

    /// Iterates over `(entity, table)` pairs in unspecified order.
    pub fn iter(self) -> impl Iterator<Item = (Entity, &'w ComponentsTable)> + 'w {
        let store = self.store;
        self.matches
            .entities()
            .iter()
            .filter_map(move |&e| store.table(e).map(|table| (e, table)))
    }

    /// Snapshot of the matching entities, safe to walk while mutating the
    /// world.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.matches.entities().to_vec()
    }
}

impl<'w> IntoIterator for QueryView<'w> {
    type Item = (Entity, &'w ComponentsTable);
    type IntoIter = Box<dyn Iterator<Item = Self::Item> + 'w>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// View of a query's matches with mutable access to component values.
#[derive(Debug)]
pub struct QueryViewMut<'w> {
    matches: &'w QueryMatches,
    store: &'w mut ComponentStore,
}

impl<'w> QueryViewMut<'w> {
    pub(crate) fn new(matches: &'w QueryMatches, store: &'w mut ComponentStore) -> Self {
        Self { matches, store }
    }

    /// Returns the number of matching entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Returns `true` if nothing matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Calls `f` once per matching entity with mutable access to its
    /// components.
    pub fn for_each(&mut self, mut f: impl FnMut(Entity, ComponentsMut<'_>)) {
        for &entity in self.matches.entities() {
            if let Some(table) = self.store.table_mut(entity) {
                f(entity, ComponentsMut::new(table));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(entities: &[(u64, &[u32])]) -> (SignatureIndex, EntityRegistry) {
        let mut index = SignatureIndex::new();
        let mut registry = EntityRegistry::new();
        for &(id, factories) in entities {
            let e = Entity::from_raw(id);
            registry.register(e).unwrap();
            index.track(e);
            for &f in factories {
                index.insert(e, FactoryId(f));
            }
        }
        (index, registry)
    }

    fn sorted(matches: &QueryMatches) -> Vec<Entity> {
        let mut v = matches.entities().to_vec();
        v.sort();
        v
    }

    #[test]
    fn test_query_equality_ignores_order() {
        let a = Query::new().with_id(FactoryId(1)).with_id(FactoryId(2)).without_id(FactoryId(3));
        let b = Query::new().without_id(FactoryId(3)).with_id(FactoryId(2)).with_id(FactoryId(1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_matches_swap_remove_keeps_rows() {
        let mut m = QueryMatches::default();
        for id in 1..=3 {
            m.insert(Entity::from_raw(id));
        }
        m.remove(Entity::from_raw(1));
        assert!(m.contains(Entity::from_raw(3)));
        m.remove(Entity::from_raw(3));
        assert_eq!(m.entities(), &[Entity::from_raw(2)]);
        m.insert(Entity::from_raw(2));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_evaluate_include_exclude() {
        let (index, registry) = setup(&[(1, &[0, 1]), (2, &[0]), (3, &[1])]);
        let mut engine = QueryEngine::new(0);
        let q = Query::new().with_id(FactoryId(0)).without_id(FactoryId(1));
        let matches = engine.resolve(&q, &index, &registry);
        assert_eq!(sorted(matches), vec![Entity::from_raw(2)]);
    }

    #[test]
    fn test_empty_include_matches_all_registered() {
        let (index, registry) = setup(&[(1, &[]), (2, &[0]), (3, &[1])]);
        let mut engine = QueryEngine::new(0);
        let all = engine.resolve(&Query::new(), &index, &registry);
        assert_eq!(all.len(), 3);
        let q = Query::new().without_id(FactoryId(1));
        let some = engine.resolve(&q, &index, &registry);
        assert_eq!(sorted(some), vec![Entity::from_raw(1), Entity::from_raw(2)]);
    }

    #[test]
    fn test_refresh_tracks_boundary_crossings() {
        let (mut index, registry) = setup(&[(1, &[0])]);
        let mut engine = QueryEngine::new(0);
        let q = Query::new().with_id(FactoryId(0)).without_id(FactoryId(1));
        assert_eq!(engine.resolve(&q, &index, &registry).len(), 1);

        let e = Entity::from_raw(1);
        let sig = index.insert(e, FactoryId(1)).unwrap().clone();
        engine.refresh(e, FactoryId(1), &sig);
        assert!(engine.resolve(&q, &index, &registry).is_empty());

        let sig = index.remove(e, FactoryId(1)).unwrap().clone();
        engine.refresh(e, FactoryId(1), &sig);
        assert!(engine.resolve(&q, &index, &registry).contains(e));
    }

    #[test]
    fn test_equivalent_queries_share_a_handle() {
        let (index, registry) = setup(&[(1, &[0, 1])]);
        let mut engine = QueryEngine::new(0);
        engine.resolve(&Query::new().with_id(FactoryId(0)).with_id(FactoryId(1)), &index, &registry);
        engine.resolve(&Query::new().with_id(FactoryId(1)).with_id(FactoryId(0)), &index, &registry);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let (index, registry) = setup(&[(1, &[0, 1, 2])]);
        let mut engine = QueryEngine::new(2);
        let q0 = Query::new().with_id(FactoryId(0));
        let q1 = Query::new().with_id(FactoryId(1));
        let q2 = Query::new().with_id(FactoryId(2));

        engine.resolve(&q0, &index, &registry);
        engine.resolve(&q1, &index, &registry);
        engine.resolve(&q0, &index, &registry);
        engine.resolve(&q2, &index, &registry);

        assert_eq!(engine.len(), 2);
        assert!(engine.is_cached(&q0));
        assert!(!engine.is_cached(&q1));
        assert!(engine.is_cached(&q2));
        // The evicted slot was reused and no longer watches factory 1.
        assert!(engine.watchers[1].is_empty());
    }

    #[test]
    fn test_release_frees_slot() {
        let (index, registry) = setup(&[(1, &[0])]);
        let mut engine = QueryEngine::new(0);
        let q = Query::new().with_id(FactoryId(0));
        engine.resolve(&q, &index, &registry);
        assert!(engine.release(&q));
        assert!(!engine.release(&q));
        assert!(engine.is_empty());
        assert_eq!(engine.free, vec![0]);
    }

    #[test]
    fn test_reused_slot_starts_fresh() {
        let (index, registry) = setup(&[(1, &[0]), (2, &[1])]);
        let mut engine = QueryEngine::new(0);
        let q0 = Query::new().with_id(FactoryId(0));
        let q1 = Query::new().with_id(FactoryId(1));
        engine.resolve(&q0, &index, &registry);
        engine.release(&q0);

        let matches = engine.resolve(&q1, &index, &registry);
        assert_eq!(sorted(matches), vec![Entity::from_raw(2)]);
        assert!(engine.free.is_empty());
        assert!(engine.watchers[0].is_empty());
    }

    #[test]
    fn test_register_and_unregister_update_universal_queries() {
        let (index, mut registry) = setup(&[]);
        let mut engine = QueryEngine::new(0);
        engine.resolve(&Query::new(), &index, &registry);

        let e = Entity::from_raw(8);
        registry.register(e).unwrap();
        engine.on_register(e);
        assert!(engine.resolve(&Query::new(), &index, &registry).contains(e));

        engine.on_unregister(e);
        assert!(engine.resolve(&Query::new(), &index, &registry).is_empty());
    }
}

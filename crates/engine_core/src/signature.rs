//! Entity signatures and the factory membership index.
//!
//! A [`Signature`] is the set of factories an entity currently holds, stored
//! as a growable bitset indexed by [`FactoryId`]. The [`SignatureIndex`]
//! keeps one signature per registered entity plus the inverse mapping
//! (factory → holders) so queries can seed from the smallest bucket instead
//! of scanning every entity.
//!
//! Entities sharing an identical signature form an *archetype*; the index
//! keeps a population count per archetype.

use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::entity::Entity;
use crate::factory::FactoryId;

const WORD_BITS: usize = 64;

/// A set of factories, stored as a bitset.
///
/// Trailing zero words are always trimmed, so two signatures holding the same
/// factories compare and hash equal regardless of how they were built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    words: Vec<u64>,
}

impl Signature {
    /// Creates an empty signature.
    #[must_use]
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Adds a factory. Returns `true` if it was not already present.
    pub fn insert(&mut self, factory: FactoryId) -> bool {
        let (word, bit) = Self::locate(factory);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let fresh = self.words[word] & bit == 0;
        self.words[word] |= bit;
        fresh
    }

    /// Removes a factory. Returns `true` if it was present.
    pub fn remove(&mut self, factory: FactoryId) -> bool {
        let (word, bit) = Self::locate(factory);
        let Some(slot) = self.words.get_mut(word) else {
            return false;
        };
        let present = *slot & bit != 0;
        *slot &= !bit;
        self.trim();
        present
    }

    /// Returns `true` if the factory is present.
    #[must_use]
    pub fn contains(&self, factory: FactoryId) -> bool {
        let (word, bit) = Self::locate(factory);
        self.words.get(word).is_some_and(|w| w & bit != 0)
    }

    /// Returns `true` if no factory is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Returns the number of factories present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if every factory in `other` is also in `self`.
    #[must_use]
    pub fn is_superset(&self, other: &Signature) -> bool {
        other.words.iter().enumerate().all(|(i, &theirs)| {
            let ours = self.words.get(i).copied().unwrap_or(0);
            ours & theirs == theirs
        })
    }

    /// Returns `true` if `self` and `other` share no factory.
    #[must_use]
    pub fn is_disjoint(&self, other: &Signature) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == 0)
    }

    /// Iterates over the factories present, in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = FactoryId> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..WORD_BITS)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| FactoryId((i * WORD_BITS + bit) as u32))
        })
    }

    fn locate(factory: FactoryId) -> (usize, u64) {
        let index = factory.index();
        (index / WORD_BITS, 1u64 << (index % WORD_BITS))
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl FromIterator<FactoryId> for Signature {
    fn from_iter<I: IntoIterator<Item = FactoryId>>(iter: I) -> Self {
        let mut signature = Signature::new();
        for factory in iter {
            signature.insert(factory);
        }
        signature
    }
}

/// Identifies an archetype: the class of entities sharing one signature.
///
/// The id is a hash of the signature, so it is stable for the lifetime of the
/// process regardless of the order factories were added in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchetypeId(pub u64);

impl ArchetypeId {
    /// Compute the archetype id for a signature.
    #[must_use]
    pub fn of(signature: &Signature) -> Self {
        let mut hasher = DefaultHasher::new();
        signature.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// Per-entity signatures plus the factory → holders inverse index.
#[derive(Debug, Default)]
pub struct SignatureIndex {
    signatures: HashMap<Entity, Signature>,
    /// `buckets[f]` holds every entity whose signature contains factory `f`.
    buckets: Vec<HashSet<Entity>>,
    /// Population per distinct signature.
    archetypes: HashMap<Signature, usize>,
}

impl SignatureIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking an entity with an empty signature.
    pub fn track(&mut self, entity: Entity) {
        let signature = Signature::new();
        *self.archetypes.entry(signature.clone()).or_insert(0) += 1;
        self.signatures.insert(entity, signature);
    }

    /// Stops tracking an entity, dropping it from every bucket it was in.
    pub fn untrack(&mut self, entity: Entity) {
        let Some(signature) = self.signatures.remove(&entity) else {
            return;
        };
        for factory in signature.iter() {
            if let Some(bucket) = self.buckets.get_mut(factory.index()) {
                bucket.remove(&entity);
            }
        }
        self.leave_archetype(&signature);
    }

    /// Records that `entity` now holds `factory` and returns its new
    /// signature. Returns `None` if the entity is not tracked.
    pub fn insert(&mut self, entity: Entity, factory: FactoryId) -> Option<&Signature> {
        let signature = self.signatures.get_mut(&entity)?;
        let before = signature.clone();
        if signature.insert(factory) {
            let after = signature.clone();
            if self.buckets.len() <= factory.index() {
                self.buckets.resize_with(factory.index() + 1, HashSet::new);
            }
            self.buckets[factory.index()].insert(entity);
            self.leave_archetype(&before);
            *self.archetypes.entry(after).or_insert(0) += 1;
        }
        self.signatures.get(&entity)
    }

    /// Records that `entity` no longer holds `factory` and returns its new
    /// signature. Returns `None` if the entity is not tracked.
    pub fn remove(&mut self, entity: Entity, factory: FactoryId) -> Option<&Signature> {
        let signature = self.signatures.get_mut(&entity)?;
        let before = signature.clone();
        if signature.remove(factory) {
            let after = signature.clone();
            if let Some(bucket) = self.buckets.get_mut(factory.index()) {
                bucket.remove(&entity);
            }
            self.leave_archetype(&before);
            *self.archetypes.entry(after).or_insert(0) += 1;
        }
        self.signatures.get(&entity)
    }

    /// Returns the signature of a tracked entity.
    #[must_use]
    pub fn signature(&self, entity: Entity) -> Option<&Signature> {
        self.signatures.get(&entity)
    }

    /// Returns `true` if `entity` currently holds `factory`.
    #[must_use]
    pub fn holds(&self, entity: Entity, factory: FactoryId) -> bool {
        self.buckets
            .get(factory.index())
            .is_some_and(|bucket| bucket.contains(&entity))
    }

    /// Iterates over every entity holding `factory`.
    pub fn bucket(&self, factory: FactoryId) -> impl Iterator<Item = Entity> + '_ {
        self.buckets
            .get(factory.index())
            .into_iter()
            .flat_map(|bucket| bucket.iter().copied())
    }

    /// Returns the number of entities holding `factory`.
    #[must_use]
    pub fn bucket_len(&self, factory: FactoryId) -> usize {
        self.buckets.get(factory.index()).map_or(0, HashSet::len)
    }

    /// Returns the archetype of a tracked entity.
    #[must_use]
    pub fn archetype_of(&self, entity: Entity) -> Option<ArchetypeId> {
        self.signatures.get(&entity).map(ArchetypeId::of)
    }

    /// Returns the number of distinct signatures with at least one entity.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    fn leave_archetype(&mut self, signature: &Signature) {
        if let Some(count) = self.archetypes.get_mut(signature) {
            *count -= 1;
            if *count == 0 {
                self.archetypes.remove(signature);
            }
        }
    }
}

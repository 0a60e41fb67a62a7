//! Entity identifiers and the live-entity registry.
//!
//! An [`Entity`] is an opaque, comparable identifier with no data of its
//! own. The host may supply its own keys ([`Entity::from_raw`],
//! [`Entity::from_name`]) or ask the registry for a fresh UUID-backed one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EcsError, Result};

/// An opaque entity identifier.
///
/// Host keys and registry-issued keys never compare equal to each other, so
/// the two kinds can be mixed freely in one world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Entity {
    /// A host-supplied key.
    Raw(u64),
    /// A registry-issued key, unique across worlds.
    Unique(Uuid),
}

impl Entity {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Create an entity from a raw host key.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self::Raw(id)
    }

    /// Create an entity from a host name by hashing it with FNV-1a 64.
    ///
    /// The same name always yields the same entity, in any world.
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self::Raw(hash)
    }

    /// Returns `true` if this entity was issued by a registry.
    #[must_use]
    pub const fn is_unique(self) -> bool {
        matches!(self, Self::Unique(_))
    }

    /// Encode this entity as an opaque MessagePack token.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::Encode`] if serialisation fails.
    pub fn to_token(self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(&self)?)
    }

    /// Decode an entity from a token produced by [`Entity::to_token`].
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::Decode`] if the bytes are not a valid token.
    pub fn from_token(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

impl From<u64> for Entity {
    fn from(id: u64) -> Self {
        Self::Raw(id)
    }
}

impl From<Uuid> for Entity {
    fn from(id: Uuid) -> Self {
        Self::Unique(id)
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw(id) => write!(f, "Entity({id})"),
            Self::Unique(id) => write!(f, "Entity({id})"),
        }
    }
}

/// Tracks which entities are currently live.
///
/// Each registration is stamped with a fresh epoch, so a caller can tell an
/// entity that was unregistered and registered again from one that never
/// left.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    live: HashMap<Entity, u64>,
    epoch: u64,
}

impl EntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an entity as live.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateEntity`] if it is already live.
    pub fn register(&mut self, entity: Entity) -> Result<()> {
        if self.live.contains_key(&entity) {
            return Err(EcsError::DuplicateEntity(entity));
        }
        self.stamp(entity);
        Ok(())
    }

    /// Removes an entity from the live set.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownEntity`] if it is not live.
    pub fn unregister(&mut self, entity: Entity) -> Result<()> {
        self.live
            .remove(&entity)
            .map(|_| ())
            .ok_or(EcsError::UnknownEntity(entity))
    }

    /// Issues a fresh UUID-backed entity and registers it.
    pub fn create_unique(&mut self) -> Entity {
        loop {
            let entity = Entity::Unique(Uuid::new_v4());
            if !self.live.contains_key(&entity) {
                self.stamp(entity);
                return entity;
            }
        }
    }

    /// Returns `true` if the entity is live.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.live.contains_key(&entity)
    }

    /// Returns the epoch of the entity's current registration.
    #[must_use]
    pub fn epoch(&self, entity: Entity) -> Option<u64> {
        self.live.get(&entity).copied()
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` if no entity is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Iterates over the live entities in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.live.keys().copied()
    }

    fn stamp(&mut self, entity: Entity) {
        self.epoch += 1;
        self.live.insert(entity, self.epoch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_from_raw() {
        let e = Entity::from_raw(42);
        assert_eq!(e, Entity::Raw(42));
        assert!(!e.is_unique());
        assert_eq!(e.to_string(), "Entity(42)");
    }

    #[test]
    fn test_entity_from_name_is_deterministic() {
        assert_eq!(Entity::from_name("player"), Entity::from_name("player"));
        assert_ne!(Entity::from_name("player"), Entity::from_name("enemy"));
        // FNV-1a of the empty string is the offset basis.
        assert_eq!(Entity::from_name(""), Entity::Raw(0xcbf2_9ce4_8422_2325));
    }

    #[test]
    fn test_register_twice_fails() {
        let mut registry = EntityRegistry::new();
        let e = Entity::from_raw(1);
        registry.register(e).unwrap();
        assert!(matches!(
            registry.register(e),
            Err(EcsError::DuplicateEntity(dup)) if dup == e
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_unknown_fails() {
        let mut registry = EntityRegistry::new();
        assert!(matches!(
            registry.unregister(Entity::from_raw(9)),
            Err(EcsError::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_register_after_unregister() {
        let mut registry = EntityRegistry::new();
        let e = Entity::from_raw(5);
        registry.register(e).unwrap();
        registry.unregister(e).unwrap();
        assert!(!registry.contains(e));
        registry.register(e).unwrap();
        assert!(registry.contains(e));
    }

    #[test]
    fn test_reregistration_gets_new_epoch() {
        let mut registry = EntityRegistry::new();
        let e = Entity::from_raw(5);
        registry.register(e).unwrap();
        let first = registry.epoch(e).unwrap();
        registry.unregister(e).unwrap();
        assert_eq!(registry.epoch(e), None);
        registry.register(e).unwrap();
        assert!(registry.epoch(e).unwrap() > first);
    }

    #[test]
    fn test_create_unique_registers_distinct_ids() {
        let mut registry = EntityRegistry::new();
        let a = registry.create_unique();
        let b = registry.create_unique();
        assert_ne!(a, b);
        assert!(a.is_unique());
        assert!(registry.contains(a));
        assert!(registry.contains(b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_entity_token_roundtrip() {
        let mut registry = EntityRegistry::new();
        let unique = registry.create_unique();
        let bytes = unique.to_token().unwrap();
        assert_eq!(Entity::from_token(&bytes).unwrap(), unique);

        let raw = Entity::from_raw(999);
        let bytes = raw.to_token().unwrap();
        assert_eq!(Entity::from_token(&bytes).unwrap(), raw);
    }

    #[test]
    fn test_entity_tokens_differ_by_kind() {
        let raw = Entity::from_raw(7).to_token().unwrap();
        let named = Entity::from_name("seven").to_token().unwrap();
        assert_ne!(raw, named);
        assert_eq!(Entity::from_token(&named).unwrap(), Entity::from_name("seven"));
    }

    #[test]
    fn test_entity_token_rejects_garbage() {
        assert!(matches!(
            Entity::from_token(&[0xFF, 0xFF]),
            Err(EcsError::Decode(_))
        ));
    }
}

//! Error types for world operations.
//!
//! Every variant except [`EcsError::Hook`] and the token encoding variants is a
//! programmer error: the call violated a storage invariant and nothing was
//! changed. None of them are retried internally.

use crate::entity::Entity;
use crate::factory::FactoryId;

/// Boxed error returned by host hooks (destructors and observers).
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by host hooks.
pub type HookResult = Result<(), HookError>;

/// Errors raised by [`World`](crate::World) and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// `register` was called on an entity that is already live.
    #[error("{0} is already registered")]
    DuplicateEntity(Entity),

    /// `add` was called for a factory the entity already holds.
    #[error("{entity} already holds a '{factory}' component")]
    DuplicateComponent {
        /// The entity that already holds the component.
        entity: Entity,
        /// Name of the factory.
        factory: String,
    },

    /// The entity is not registered with this world.
    #[error("{0} is not registered")]
    UnknownEntity(Entity),

    /// `remove` was called for a factory the entity does not hold.
    #[error("{entity} holds no '{factory}' component")]
    MissingComponent {
        /// The entity that was expected to hold the component.
        entity: Entity,
        /// Name of the factory.
        factory: String,
    },

    /// The factory handle was defined by a different world.
    #[error("{0} was not defined by this world")]
    ForeignFactory(FactoryId),

    /// A host hook returned an error.
    #[error("hook on '{factory}' failed: {source}")]
    Hook {
        /// Name of the factory (or `"world"` for world-level observers).
        factory: String,
        /// The error returned by the hook.
        #[source]
        source: HookError,
    },

    /// Failed to encode an entity token to MessagePack.
    #[error("failed to encode entity token: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode an entity token from MessagePack.
    #[error("failed to decode entity token: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl EcsError {
    pub(crate) fn hook(factory: impl Into<String>, source: HookError) -> Self {
        Self::Hook {
            factory: factory.into(),
            source,
        }
    }
}

/// Shorthand result type for world operations.
pub type Result<T, E = EcsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_entity_and_factory() {
        let err = EcsError::DuplicateComponent {
            entity: Entity::from_raw(7),
            factory: "health".to_string(),
        };
        assert_eq!(err.to_string(), "Entity(7) already holds a 'health' component");

        let err = EcsError::UnknownEntity(Entity::from_raw(3));
        assert_eq!(err.to_string(), "Entity(3) is not registered");
    }

    #[test]
    fn test_hook_error_keeps_source() {
        let source: HookError = "boom".into();
        let err = EcsError::hook("model", source);
        assert!(err.to_string().contains("boom"));
        assert!(std::error::Error::source(&err).is_some());
    }
}

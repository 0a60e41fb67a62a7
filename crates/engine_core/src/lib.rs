//! # engine_core
//!
//! Entity-component storage and query engine. The host drives its own loop
//! and asks the [`World`] for query results; nothing here schedules systems.
//!
//! This crate provides:
//!
//! - [`Entity`] and [`EntityRegistry`] — opaque identifiers and the live set.
//! - [`FactoryDef`] / [`Factory`] — component types with add/remove hooks.
//! - [`ComponentStore`] — per-entity [`ComponentsTable`]s.
//! - [`SignatureIndex`] — per-entity [`Signature`]s and factory buckets.
//! - [`QueryEngine`] — cached include/exclude [`Query`] results, kept
//!   current incrementally.
//! - [`World`] — the facade tying them together.
//!
//! ```rust
//! use engine_core::{Entity, Query, World};
//!
//! let mut world = World::new();
//! let a = world.tag();
//! let b = world.tag();
//!
//! let e1 = Entity::from_raw(1);
//! let e2 = Entity::from_raw(2);
//! a.add(&mut world, e1, ()).unwrap();
//! b.add(&mut world, e1, ()).unwrap();
//! a.add(&mut world, e2, ()).unwrap();
//!
//! let only_a = world.query(&Query::new().with(&a).without(&b)).unwrap();
//! assert_eq!(only_a.entities(), vec![e2]);
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod factory;
pub mod query;
pub mod signature;
pub mod store;
pub mod world;

pub use config::{MissingComponentPolicy, WorldConfig};
pub use entity::{Entity, EntityRegistry};
pub use error::{EcsError, HookError, HookResult, Result};
pub use factory::{EntityObserver, Factory, FactoryDef, FactoryId, KillObserver};
pub use query::{Query, QueryEngine, QueryMatches, QueryView, QueryViewMut};
pub use signature::{ArchetypeId, Signature, SignatureIndex};
pub use store::{ComponentStore, ComponentsMut, ComponentsTable};
pub use world::{World, WorldId};

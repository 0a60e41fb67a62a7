//! Host tick loop.
//!
//! Each tick runs three passes over the world, in order:
//!
//! 1. Poison damages every poisoned, non-invincible entity and counts down.
//! 2. Poison that has run its course is removed.
//! 3. Entities at or below zero health are killed.
//!
//! Passes that change membership walk a snapshot of the query result.

use std::time::{Duration, Instant};

use engine_core::{Entity, Factory, FactoryDef, Query, Result, World};
use tracing::{debug, info, warn};

/// Configuration for the host tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

/// Hit points of a mortal entity. At zero or below the entity is killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health(pub i32);

/// Damage over time applied once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poison {
    /// Health lost per tick.
    pub damage: i32,
    /// Ticks left before the poison wears off.
    pub remaining: u32,
}

/// Factories and queries the simulation runs on.
#[derive(Debug, Clone)]
struct Simulation {
    health: Factory<Health, i32>,
    poisoned: Factory<Poison, (i32, u32)>,
    invincible: Factory<bool>,
    suffering: Query,
    poisoned_any: Query,
    mortal: Query,
}

impl Simulation {
    fn define(world: &mut World) -> Self {
        let health = world.factory(FactoryDef::new(|_: Entity, hp: i32| Health(hp)).named("health"));
        let poisoned = world.factory(
            FactoryDef::new(|_: Entity, (damage, remaining): (i32, u32)| Poison { damage, remaining })
                .named("poisoned")
                .with_remove(|_: &mut World, entity: Entity, poison: Poison, ()| {
                    debug!(%entity, left = poison.remaining, "poison wore off");
                    Ok(())
                }),
        );
        let invincible = world.factory(FactoryDef::new(|_: Entity, ()| true).named("invincible"));

        Self {
            suffering: Query::new().with(&poisoned).with(&health).without(&invincible),
            poisoned_any: Query::new().with(&poisoned),
            mortal: Query::new().with(&health).without(&invincible),
            health,
            poisoned,
            invincible,
        }
    }
}

/// The host's tick loop state.
#[derive(Debug)]
pub struct TickLoop {
    /// Current tick counter.
    tick_id: u64,
    /// Tick configuration.
    config: TickConfig,
    world: World,
    sim: Simulation,
}

impl TickLoop {
    /// Create a new tick loop with the given configuration.
    ///
    /// # Errors
    ///
    /// Fails only if the world rejects its own factory handles.
    pub fn new(config: TickConfig) -> Result<Self> {
        let mut world = World::new();
        let sim = Simulation::define(&mut world);
        world.set_killed(|_, entity, _| {
            info!(%entity, "entity died");
            Ok(())
        });
        sim.invincible.set_added(&mut world, |_, entity| {
            debug!(%entity, "entity became invincible");
            Ok(())
        })?;

        Ok(Self {
            tick_id: 0,
            config,
            world,
            sim,
        })
    }

    /// Returns the current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Returns a reference to the world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Spawn `count` fresh entities. Every other one starts poisoned and
    /// every third one is invincible.
    ///
    /// # Errors
    ///
    /// Propagates any world error.
    pub fn spawn_wave(&mut self, count: usize) -> Result<Vec<Entity>> {
        let mut spawned = Vec::with_capacity(count);
        for i in 0..count {
            let entity = self.world.entity()?;
            self.sim.health.add(&mut self.world, entity, 6 + 3 * i as i32)?;
            if i % 2 == 0 {
                self.sim.poisoned.add(&mut self.world, entity, (4, 3))?;
            }
            if i % 3 == 0 {
                self.sim.invincible.add(&mut self.world, entity, ())?;
            }
            spawned.push(entity);
        }
        info!(count, total = self.world.entity_count(), "spawned wave");
        Ok(spawned)
    }

    /// Poison `entity` for `ticks` ticks.
    ///
    /// # Errors
    ///
    /// Fails if the entity is already poisoned.
    pub fn poison(&mut self, entity: Entity, damage: i32, ticks: u32) -> Result<()> {
        self.sim.poisoned.add(&mut self.world, entity, (damage, ticks))?;
        Ok(())
    }

    /// Returns the health of `entity`, if it has any.
    #[must_use]
    pub fn health(&self, entity: Entity) -> Option<i32> {
        self.sim.health.get(&self.world, entity).map(|h| h.0)
    }

    /// Run one tick of the simulation.
    ///
    /// # Errors
    ///
    /// Propagates the first world error raised by a pass.
    pub fn tick(&mut self, dt: f64) -> Result<()> {
        self.tick_id += 1;
        let sim = &self.sim;

        let mut damaged = 0usize;
        self.world.query_mut(&sim.suffering)?.for_each(|_, mut components| {
            let Some(damage) = components.get(&sim.poisoned).map(|p| p.damage) else {
                return;
            };
            if let Some(health) = components.get_mut(&sim.health) {
                health.0 -= damage;
                damaged += 1;
            }
        });
        self.world.query_mut(&sim.poisoned_any)?.for_each(|_, mut components| {
            if let Some(poison) = components.get_mut(&sim.poisoned) {
                poison.remaining = poison.remaining.saturating_sub(1);
            }
        });

        let mut cured = 0usize;
        for entity in self.world.query_entities(&sim.poisoned_any)? {
            if sim.poisoned.get(&self.world, entity).is_some_and(|p| p.remaining == 0) {
                sim.poisoned.remove(&mut self.world, entity, ())?;
                cured += 1;
            }
        }

        let mut died = 0usize;
        for entity in self.world.query_entities(&sim.mortal)? {
            if sim.health.get(&self.world, entity).is_some_and(|h| h.0 <= 0) {
                self.world.kill(entity)?;
                died += 1;
            }
        }

        debug!(
            tick_id = self.tick_id,
            dt,
            damaged,
            cured,
            died,
            alive = self.world.entity_count(),
            "tick complete"
        );
        Ok(())
    }

    /// Run the tick loop for the configured number of ticks, or indefinitely.
    ///
    /// # Errors
    ///
    /// Stops at the first tick that fails.
    pub fn run(&mut self) -> Result<()> {
        let tick_duration = Duration::from_secs_f64(1.0 / self.config.tick_rate);
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();

            let dt = tick_duration.as_secs_f64();
            self.tick(dt)?;

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 60.0;

    #[test]
    fn test_tick_advances_counter() {
        let mut tick_loop = TickLoop::new(TickConfig::default()).unwrap();
        assert_eq!(tick_loop.tick_id(), 0);
        tick_loop.tick(DT).unwrap();
        assert_eq!(tick_loop.tick_id(), 1);
        tick_loop.tick(DT).unwrap();
        assert_eq!(tick_loop.tick_id(), 2);
    }

    #[test]
    fn test_poison_damages_then_wears_off() {
        let mut tick_loop = TickLoop::new(TickConfig::default()).unwrap();
        let e = tick_loop.world.entity().unwrap();
        let health = tick_loop.sim.health;
        health.add(&mut tick_loop.world, e, 20).unwrap();
        tick_loop.poison(e, 5, 2).unwrap();

        tick_loop.tick(DT).unwrap();
        assert_eq!(tick_loop.health(e), Some(15));
        tick_loop.tick(DT).unwrap();
        assert_eq!(tick_loop.health(e), Some(10));
        assert!(!tick_loop.sim.poisoned.has(tick_loop.world(), e));

        tick_loop.tick(DT).unwrap();
        assert_eq!(tick_loop.health(e), Some(10));
        assert!(tick_loop.poison(e, 1, 1).is_ok());
    }

    #[test]
    fn test_lethal_poison_kills() {
        let mut tick_loop = TickLoop::new(TickConfig::default()).unwrap();
        let e = tick_loop.world.entity().unwrap();
        let health = tick_loop.sim.health;
        health.add(&mut tick_loop.world, e, 3).unwrap();
        tick_loop.poison(e, 5, 10).unwrap();

        tick_loop.tick(DT).unwrap();
        assert!(!tick_loop.world().contains(e));
        assert_eq!(tick_loop.health(e), None);
    }

    #[test]
    fn test_invincible_entities_survive() {
        let mut tick_loop = TickLoop::new(TickConfig::default()).unwrap();
        let spawned = tick_loop.spawn_wave(6).unwrap();
        // Entity 0 is poisoned and invincible, entity 2 poisoned and mortal.
        for _ in 0..3 {
            tick_loop.tick(DT).unwrap();
        }
        assert_eq!(tick_loop.health(spawned[0]), Some(6));
        assert!(tick_loop.world().contains(spawned[0]));
        assert!(!tick_loop.world().contains(spawned[2]));
        assert_eq!(tick_loop.health(spawned[2]), None);
    }

    #[test]
    fn test_run_limited_ticks() {
        let config = TickConfig {
            tick_rate: 1000.0,
            max_ticks: 5,
        };
        let mut tick_loop = TickLoop::new(config).unwrap();
        tick_loop.spawn_wave(4).unwrap();
        tick_loop.run().unwrap();
        assert_eq!(tick_loop.tick_id(), 5);
    }
}

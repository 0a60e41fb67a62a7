//! # engine_app — Host loop
//!
//! Drives a small poison/health simulation over an [`engine_core::World`].
//! The core never schedules anything; every tick here asks the world for
//! query results and acts on them.

mod tick;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tick::{TickConfig, TickLoop};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("engine_app=info".parse()?))
        .init();

    info!("engine host starting");

    let config = TickConfig {
        tick_rate: 20.0,
        max_ticks: 40,
    };

    let mut tick_loop = TickLoop::new(config)?;
    let wave = tick_loop.spawn_wave(8)?;
    if let Some(&late) = wave.get(1) {
        tick_loop.poison(late, 2, 5)?;
    }
    tick_loop.run()?;

    info!(
        survivors = tick_loop.world().entity_count(),
        "engine host shut down"
    );
    Ok(())
}

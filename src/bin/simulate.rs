//! Headless map simulation driver.
//!
//! ```bash
//! cargo run --bin simulate -- --entities 64 --tics 600
//! cargo run --bin simulate -- --map arena.mgrd --tics 300
//! ```
//!
//! Builds (or loads) a walled map, fills it with wandering entities and
//! runs the tick loop flat out, printing collision statistics per window.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use glam::Vec2;
use rand::Rng;

use mapcore::defs;
use mapcore::mapfile::SolidWalls;
use mapcore::sim::{Behavior, DT, EntityDef, EntityId, Map, MapId, TickPump};
use mapcore::world::{Aabb, MonotonicClock, WorldConfig};

/// CLI options handled via `clap` derive.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Opts {
    /// Map file to load; a bordered arena is generated when omitted
    #[arg(long, value_name = "FILE")]
    map: Option<PathBuf>,

    /// Number of wandering entities to spawn
    #[arg(long, default_value_t = 64)]
    entities: usize,

    /// Tics to simulate
    #[arg(long, default_value_t = 600)]
    tics: u32,

    /// Pace the simulation to wall-clock tick rate instead of flat out
    #[arg(long)]
    realtime: bool,

    /// Arena size (pixels) when generating a map
    #[arg(long, default_value_t = 1280.0)]
    width: f32,
    #[arg(long, default_value_t = 960.0)]
    height: f32,
}

/// Picks a random heading, walks until it bumps into something, then
/// bounces off along the separation axis.
struct Wanderer;

impl Behavior for Wanderer {
    fn collide_into(&mut self, map: &mut Map, me: EntityId, _other: EntityId, d: Vec2) {
        map.translate(me, d);
        if let Some(v) = map.velocity(me) {
            let flipped = Vec2::new(
                if d.x != 0.0 { -v.x } else { v.x },
                if d.y != 0.0 { -v.y } else { v.y },
            );
            map.set_velocity(me, flipped);
        }
    }
}

fn generate_arena(width: f32, height: f32) -> Map {
    let config = WorldConfig {
        gravity: Vec2::ZERO, // top-down arena
        ..WorldConfig::default()
    };
    let mut map = Map::new(
        MapId(1),
        "arena",
        Vec2::new(width, height),
        config,
        Box::new(MonotonicClock::new()),
    );

    // Border walls.
    let t = 16.0;
    for b in [
        Aabb::new(Vec2::ZERO, Vec2::new(width, t)),
        Aabb::new(Vec2::new(0.0, height - t), Vec2::new(width, t)),
        Aabb::new(Vec2::new(0.0, t), Vec2::new(t, height - 2.0 * t)),
        Aabb::new(Vec2::new(width - t, t), Vec2::new(t, height - 2.0 * t)),
    ] {
        map.add_entity(EntityDef::wall(b));
    }
    map
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();

    let mut map = match &opts.map {
        Some(path) => Map::load_from(
            path,
            MapId(1),
            WorldConfig {
                gravity: Vec2::ZERO,
                ..WorldConfig::default()
            },
            Box::new(MonotonicClock::new()),
            &SolidWalls,
        )?,
        None => generate_arena(opts.width, opts.height),
    };
    println!(
        "map '{}': {}x{}, {} walls",
        map.name(),
        map.width(),
        map.height(),
        map.entity_count()
    );

    /* --------------- populate ----------------------------------------- */
    let info = defs::by_id("WANDERER").expect("WANDERER archetype");
    let mut rng = rand::thread_rng();
    for _ in 0..opts.entities {
        let pos = Vec2::new(
            rng.gen_range(32.0..map.width() - 64.0),
            rng.gen_range(32.0..map.height() - 64.0),
        );
        let speed = rng.gen_range(40.0..160.0);
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let velocity = Vec2::new(angle.cos(), angle.sin()) * speed;

        let def = EntityDef::from_archetype(info, pos)
            .with_velocity(velocity)
            .with_brain(Box::new(Wanderer));
        let ent = map.add_entity(def);

        // Spawn-searching: never start inside a wall or a neighbour.
        if let Some(b) = map.bounds(ent) {
            let others = map.entities_in_where(&b, |e| e != ent);
            if !others.is_empty() {
                match map.closest_valid_placement(&b) {
                    Ok(p) => map.teleport(ent, p),
                    Err(e) => println!("spawn rejected: {e}"),
                }
            }
        }
    }
    println!("spawned {} wanderers", map.dynamic_entities().count());

    /* --------------- run ---------------------------------------------- */
    let mut collisions = 0usize;
    let started = Instant::now();
    let mut window = Instant::now();
    let mut window_tics = 0u32;
    let mut pump = TickPump::new();

    let mut tic = 0u32;
    while tic < opts.tics {
        let ran = if opts.realtime {
            pump.pump(&mut map)
        } else {
            map.update(DT);
            1
        };
        tic += ran;
        window_tics += ran;

        // Collision census on top of the tick's own checks.
        let movers: Vec<EntityId> = map.dynamic_entities().map(|(_, e)| e).collect();
        for e in movers {
            collisions += map.check_collisions(e);
        }

        if window.elapsed().as_secs() >= 1 || tic >= opts.tics {
            println!(
                "t={:5}  entities={:4}  collisions={:6}  {:.1} tics/s",
                tic,
                map.entity_count(),
                collisions,
                window_tics as f64 / window.elapsed().as_secs_f64(),
            );
            window = Instant::now();
            window_tics = 0;
        }
    }

    println!(
        "{} tics in {:.2?} ({} collisions, game time {} ms)",
        tic,
        started.elapsed(),
        collisions,
        map.time_ms()
    );
    Ok(())
}

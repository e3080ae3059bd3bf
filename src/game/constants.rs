//! Gameplay constants, grouped by concern.

/// Core timing constants
pub mod tick {
    /// Physics ticks per second
    pub const TICK_RATE: u32 = 60;
    /// State broadcasts per second
    pub const BROADCAST_RATE: u32 = 30;
    /// Broadcast every Nth tick
    pub const BROADCAST_EVERY: u64 = (TICK_RATE / BROADCAST_RATE) as u64;
    /// Delta time per tick in seconds
    pub const DT: f32 = 1.0 / TICK_RATE as f32;
    /// Tick duration in microseconds (for the loop timer)
    pub const TICK_DURATION_US: u64 = 1_000_000 / TICK_RATE as u64;
}

/// World defaults (per-match values live in MatchConfig)
pub mod world {
    pub const WIDTH: f32 = 4000.0;
    pub const HEIGHT: f32 = 4000.0;
}

/// Player movement and lifecycle constants shared across ship classes
pub mod player {
    /// Aim dead zone: inside this distance the ship stops accelerating
    pub const DEAD_ZONE: f32 = 50.0;
    /// Heavy braking friction used when the pointer is near the ship
    pub const BRAKE_FRICTION: f32 = 0.95;
    /// Minimum allowed slow-down threshold
    pub const SLOW_THRESH_FLOOR: f32 = 20.0;
    /// Client threshold clamp range
    pub const SLOW_THRESH_MIN: f32 = 50.0;
    pub const SLOW_THRESH_MAX: f32 = 400.0;
    /// Seconds before respawn
    pub const RESPAWN_TIME: f32 = 3.0;
    /// Post-respawn invulnerability window in seconds
    pub const SPAWN_PROTECTION: f32 = 2.0;
    /// Aim point must be this far from the ship to update target heading
    /// (squared distance; avoids angle flicker when idle on mobile)
    pub const MIN_AIM_DIST_SQ: f32 = 25.0;
    /// Largest class radius, used for broad-phase query sizing
    pub const MAX_RADIUS: f32 = 25.0;
    /// Seconds an attacker stays eligible for an assist
    pub const ASSIST_WINDOW: f32 = 5.0;
    /// Recent-damager ring capacity
    pub const DAMAGER_RING: usize = 8;
}

/// Projectile constants
pub mod projectile {
    pub const SPEED: f32 = 800.0;
    pub const LIFETIME: f32 = 2.0;
    pub const RADIUS: f32 = 4.0;
    /// Spawn distance from the ship center
    pub const OFFSET: f32 = 30.0;
    /// Fraction of the shooter's velocity inherited by the shot
    pub const VEL_INHERIT: f32 = 0.3;
}

/// Mob (AI enemy) constants
pub mod mob {
    use crate::util::vec2::Vec2;

    pub const RAIDER_RADIUS: f32 = 20.0;
    pub const RAIDER_HP: i32 = 60;
    pub const RAIDER_SPEED: f32 = 180.0;
    pub const RAIDER_ACCEL: f32 = 200.0;
    pub const RAIDER_TURN_SPEED: f32 = 4.0;
    pub const RAIDER_COLLISION_DMG: i32 = 30;
    pub const RAIDER_PROJ_DMG: i32 = 10;

    /// Dreadnought: slow capital ship with a triangular hull
    pub const DREADNOUGHT_HP: i32 = 180;
    pub const DREADNOUGHT_SPEED: f32 = 120.0;
    pub const DREADNOUGHT_ACCEL: f32 = 140.0;
    pub const DREADNOUGHT_TURN_SPEED: f32 = 2.5;
    pub const DREADNOUGHT_COLLISION_DMG: i32 = 60;
    pub const DREADNOUGHT_PROJ_DMG: i32 = 15;
    /// Local-space hull vertices: nose forward along +x
    pub const DREADNOUGHT_VERTS: [Vec2; 3] = [
        Vec2 { x: 60.0, y: 0.0 },
        Vec2 { x: -40.0, y: -38.0 },
        Vec2 { x: -40.0, y: 38.0 },
    ];
    /// Broad-phase radius for the largest mob hull
    pub const MAX_RADIUS: f32 = 60.0;
    /// Chance a spawned mob is a Dreadnought
    pub const DREADNOUGHT_CHANCE: f32 = 0.2;

    pub const FRICTION: f32 = 0.96;
    pub const DETECT_RANGE: f32 = 1200.0;
    /// Start shooting when this close
    pub const SHOOT_RANGE: f32 = 900.0;
    /// Preferred combat distance while tracking
    pub const OPTIMAL_DIST: f32 = 450.0;
    /// Radial approach/retreat steering weight clamp
    pub const RADIAL_CLAMP: f32 = 1.0;
    /// Strafe direction flip interval bounds (seconds)
    pub const STRAFE_MIN: f32 = 1.5;
    pub const STRAFE_MAX: f32 = 3.5;
    /// Wander heading re-roll interval bounds (seconds)
    pub const WANDER_MIN: f32 = 2.0;
    pub const WANDER_MAX: f32 = 4.0;

    /// Seconds between dodge attempts
    pub const DODGE_COOLDOWN: f32 = 0.8;
    /// Extra margin around the hull that counts as a threatened zone
    pub const DODGE_MARGIN: f32 = 30.0;
    /// Sideways velocity kick applied when dodging
    pub const DODGE_IMPULSE: f32 = 220.0;
    /// Only dodge projectiles closer than this
    pub const DODGE_SCAN_RANGE: f32 = 500.0;

    pub const BURST_SIZE: u32 = 5;
    /// Seconds between shots within a burst
    pub const BURST_FIRE_RATE: f32 = 0.15;
    /// Seconds between bursts
    pub const BURST_COOLDOWN: f32 = 5.0;

    /// Mob-mob interaction
    pub const REPEL_FORCE: f32 = 120.0;
    pub const REPEL_MARGIN: f32 = 10.0;
    /// Closing speed above which overlapping mobs explode
    pub const EXPLODE_REL_V: f32 = 250.0;

    /// HP fraction below which the low-HP line fires (once)
    pub const LOW_HP_FRACTION: f32 = 0.3;
}

/// Asteroid constants
pub mod asteroid {
    pub const RADIUS: f32 = 50.0;
    pub const MIN_SPEED: f32 = 60.0;
    pub const MAX_SPEED: f32 = 150.0;
    pub const SPIN_MIN: f32 = 0.5;
    pub const SPIN_MAX: f32 = 2.0;
    /// Despawn once fully outside the world plus this margin
    pub const DESPAWN_MARGIN: f32 = RADIUS * 2.0;
}

/// Pickup (health orb) constants
pub mod pickup {
    pub const RADIUS: f32 = 15.0;
    pub const HEAL: i32 = 20;
    pub const TIMEOUT: f32 = 30.0;
    /// Keep-away distance from the world edge when spawning
    pub const EDGE_MARGIN: f32 = 50.0;
}

/// Ability cooldowns and effect parameters
pub mod ability {
    pub const MISSILE_BARRAGE_COOLDOWN: f32 = 12.0;
    pub const MISSILE_BARRAGE_COUNT: u32 = 5;
    pub const MISSILE_BARRAGE_DAMAGE: i32 = 25;
    pub const MISSILE_BARRAGE_SPEED: f32 = 500.0;
    pub const MISSILE_BARRAGE_LIFETIME: f32 = 3.0;
    pub const MISSILE_BARRAGE_TURN_RATE: f32 = 6.0;
    /// Fan spread between missiles (radians)
    pub const MISSILE_BARRAGE_SPREAD: f32 = 0.15;

    pub const SHIELD_COOLDOWN: f32 = 15.0;
    pub const SHIELD_DURATION: f32 = 3.0;
    pub const SHIELD_ABSORB: i32 = 50;

    pub const BLINK_COOLDOWN: f32 = 8.0;
    pub const BLINK_DISTANCE: f32 = 200.0;

    pub const HEAL_AURA_COOLDOWN: f32 = 18.0;
    pub const HEAL_AURA_DURATION: f32 = 5.0;
    pub const HEAL_AURA_RADIUS: f32 = 150.0;
    /// HP/s restored to each ally in range
    pub const HEAL_AURA_RATE: f32 = 10.0;
}

/// Per-session entity caps, spawn timers, and scoring
pub mod session {
    pub const MAX_PLAYERS: usize = 20;
    pub const MAX_PROJECTILES: usize = 500;
    pub const MAX_MOBS: usize = 8;
    pub const MAX_ASTEROIDS: usize = 5;
    pub const MAX_PICKUPS: usize = 4;

    pub const MOB_SPAWN_INTERVAL: f32 = 7.0;
    /// Quick respawn while the mob population refills to the cap
    pub const MOB_REFILL_INTERVAL: f32 = 0.5;
    pub const ASTEROID_SPAWN_INTERVAL: f32 = 10.0;
    pub const PICKUP_SPAWN_INTERVAL: f32 = 20.0;

    pub const DEATH_SCORE_PENALTY: i32 = 10;
    pub const MOB_KILL_SCORE: i32 = 5;

    /// Seconds of countdown before a match starts
    pub const COUNTDOWN_DURATION: f32 = 3.0;
    /// Seconds to show results before returning to lobby
    pub const RESULT_DURATION: f32 = 10.0;
}

/// Spatial grid constants
pub mod spatial {
    /// ~2x the largest entity radius (asteroid = 50)
    pub const CELL_SIZE: f32 = 80.0;
}

/// Broadcast shaping constants
pub mod net {
    /// Per-client viewport culling half-extent (world units)
    pub const CULL_DIST: f32 = 1200.0;
    /// Velocity change below which the field is omitted from the snapshot
    pub const VEL_DELTA: f32 = 5.0;
    /// Bounded per-client outbound queue length
    pub const CLIENT_QUEUE: usize = 64;
    /// Display name length cap
    pub const MAX_NAME_LEN: usize = 16;
}

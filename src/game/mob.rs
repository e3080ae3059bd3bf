//! AI-controlled enemy ships.
//!
//! Movement is a two-state machine: **Wandering** (no player in detection
//! range) and **Tracking** (nearest living player). While tracking, the aim
//! heading (lead-aim intercept) and the movement heading (radial approach to
//! an optimal combat distance plus a tangential strafe) are decoupled. A
//! separate cooldown-gated dodge check sidesteps incoming projectiles.
//! State transitions and one-way HP thresholds emit chatter lines, at most
//! once per triggering condition per mob lifetime.

use hashbrown::HashMap;
use rand::rngs::SmallRng;
use rand::Rng;

use crate::game::collision::Hitbox;
use crate::game::constants::{mob, projectile};
use crate::game::state::{generate_id, EntityId, Player, PlayerId, Projectile, WorldRect};
use crate::util::vec2::{turn_toward, Vec2};

/// Mob chatter lines, grouped by the condition that triggers them
pub mod chatter {
    use rand::rngs::SmallRng;
    use rand::Rng;

    pub const NOTICE: &[&str] = &[
        "Target acquired.",
        "There you are!",
        "Fresh meat on the scanner.",
        "I see you, pilot.",
    ];
    pub const LOST: &[&str] = &[
        "Where'd you go?",
        "Lost the signal...",
        "Coward.",
    ];
    pub const BURST_FIRE: &[&str] = &[
        "Eat plasma!",
        "Firing!",
        "Say goodnight.",
    ];
    pub const LOW_HP: &[&str] = &[
        "Hull integrity critical!",
        "I'm hit, I'm hit!",
        "Not like this...",
    ];
    pub const CRASH: &[&str] = &[
        "Watch where you're flying!",
        "Mayday, mayday!",
    ];
    pub const ASTEROID_DEATH: &[&str] = &[
        "Rock! ROCK!",
        "Should've watched the radar...",
    ];
    pub const KILL_PLAYER: &[&str] = &[
        "Another one down.",
        "Too easy.",
        "Scratch one pilot.",
    ];

    /// Pick a random line from a table
    pub fn pick(rng: &mut SmallRng, table: &'static [&'static str]) -> &'static str {
        table[rng.gen_range(0..table.len())]
    }

    /// Pick a line with the given probability, None otherwise
    pub fn pick_chance(
        rng: &mut SmallRng,
        table: &'static [&'static str],
        chance: f32,
    ) -> Option<&'static str> {
        if rng.gen::<f32>() < chance {
            Some(pick(rng, table))
        } else {
            None
        }
    }

    /// Probability of a "notice" line on acquiring a target
    pub const NOTICE_CHANCE: f32 = 0.4;
    /// Probability of a "lost" line on losing a target
    pub const LOST_CHANCE: f32 = 0.3;
    /// Probability of a callout when opening a new burst
    pub const FIRE_CHANCE: f32 = 0.25;
}

/// Hull variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobKind {
    /// Standard circular raider
    Raider,
    /// Capital ship with a triangular hull hitbox
    Dreadnought,
}

/// An AI-controlled enemy ship
#[derive(Debug, Clone)]
pub struct Mob {
    pub id: EntityId,
    pub kind: MobKind,
    pub pos: Vec2,
    pub vel: Vec2,
    pub rotation: f32,
    pub hp: i32,
    pub max_hp: i32,
    pub alive: bool,
    pub hitbox: Hitbox,
    pub proj_damage: i32,
    pub collision_damage: i32,

    // Burst fire
    burst_left: u32,
    fire_cooldown: f32,
    burst_cooldown: f32,

    // Wandering
    wander_heading: f32,
    wander_timer: f32,

    // Strafe (tracking movement)
    strafe_dir: f32,
    strafe_timer: f32,

    // Dodge
    dodge_cooldown: f32,

    // Chatter state
    was_tracking: bool,
    said_low_hp: bool,
    /// Line waiting to be broadcast by the Game (drained each tick)
    pub pending_phrase: Option<&'static str>,
}

impl Mob {
    /// Spawn a mob at a random arena edge, facing the center
    pub fn spawn(rng: &mut SmallRng, world: WorldRect) -> Self {
        let id = generate_id(rng, 4);
        let kind = if rng.gen::<f32>() < mob::DREADNOUGHT_CHANCE {
            MobKind::Dreadnought
        } else {
            MobKind::Raider
        };

        let (hp, hitbox, proj_damage, collision_damage) = match kind {
            MobKind::Raider => (
                mob::RAIDER_HP,
                Hitbox::circle(mob::RAIDER_RADIUS),
                mob::RAIDER_PROJ_DMG,
                mob::RAIDER_COLLISION_DMG,
            ),
            MobKind::Dreadnought => (
                mob::DREADNOUGHT_HP,
                Hitbox::triangle(mob::DREADNOUGHT_VERTS),
                mob::DREADNOUGHT_PROJ_DMG,
                mob::DREADNOUGHT_COLLISION_DMG,
            ),
        };

        // Pick a random edge: 0=left, 1=right, 2=top, 3=bottom
        let edge = (rng.gen::<f32>() * 4.0) as u32;
        let pos = match edge {
            0 => Vec2::new(0.0, rng.gen::<f32>() * world.h),
            1 => Vec2::new(world.w, rng.gen::<f32>() * world.h),
            2 => Vec2::new(rng.gen::<f32>() * world.w, 0.0),
            _ => Vec2::new(rng.gen::<f32>() * world.w, world.h),
        };
        let rotation = (world.center() - pos).angle();

        Self {
            id,
            kind,
            pos,
            vel: Vec2::ZERO,
            rotation,
            hp,
            max_hp: hp,
            alive: true,
            hitbox,
            proj_damage,
            collision_damage,
            burst_left: 0,
            fire_cooldown: 0.0,
            burst_cooldown: 0.0,
            wander_heading: rotation,
            wander_timer: 0.0,
            strafe_dir: if rng.gen::<f32>() < 0.5 { 1.0 } else { -1.0 },
            strafe_timer: mob::STRAFE_MIN + rng.gen::<f32>() * (mob::STRAFE_MAX - mob::STRAFE_MIN),
            dodge_cooldown: 0.0,
            was_tracking: false,
            said_low_hp: false,
            pending_phrase: None,
        }
    }

    pub fn radius(&self) -> f32 {
        self.hitbox.bounding_radius()
    }

    fn max_speed(&self) -> f32 {
        match self.kind {
            MobKind::Raider => mob::RAIDER_SPEED,
            MobKind::Dreadnought => mob::DREADNOUGHT_SPEED,
        }
    }

    fn accel(&self) -> f32 {
        match self.kind {
            MobKind::Raider => mob::RAIDER_ACCEL,
            MobKind::Dreadnought => mob::DREADNOUGHT_ACCEL,
        }
    }

    fn turn_speed(&self) -> f32 {
        match self.kind {
            MobKind::Raider => mob::RAIDER_TURN_SPEED,
            MobKind::Dreadnought => mob::DREADNOUGHT_TURN_SPEED,
        }
    }

    /// Advance one tick. Returns true if the mob wants to fire a projectile.
    pub fn update(
        &mut self,
        dt: f32,
        players: &HashMap<PlayerId, Player>,
        projectiles: &HashMap<EntityId, Projectile>,
        world: WorldRect,
        rng: &mut SmallRng,
    ) -> bool {
        if !self.alive {
            return false;
        }

        if self.fire_cooldown > 0.0 {
            self.fire_cooldown -= dt;
        }
        if self.burst_cooldown > 0.0 {
            self.burst_cooldown -= dt;
        }
        if self.dodge_cooldown > 0.0 {
            self.dodge_cooldown -= dt;
        }

        // Target acquisition: nearest living player within detection range
        let mut best_d2 = mob::DETECT_RANGE * mob::DETECT_RANGE;
        let mut target: Option<(Vec2, Vec2)> = None; // (pos, vel)
        for p in players.values() {
            if !p.alive {
                continue;
            }
            let d2 = self.pos.distance_sq_to(p.pos);
            if d2 < best_d2 {
                best_d2 = d2;
                target = Some((p.pos, p.vel));
            }
        }
        let tracking = target.is_some();

        // Transition chatter, at most one pending line at a time
        if tracking != self.was_tracking && self.pending_phrase.is_none() {
            let line = if tracking {
                chatter::pick_chance(rng, chatter::NOTICE, chatter::NOTICE_CHANCE)
            } else {
                chatter::pick_chance(rng, chatter::LOST, chatter::LOST_CHANCE)
            };
            self.pending_phrase = line;
        }
        self.was_tracking = tracking;

        // Exactly one movement mode drives the mob per tick
        let move_dir = if let Some((target_pos, target_vel)) = target {
            self.steer_tracking(dt, target_pos, target_vel, rng)
        } else {
            self.steer_wandering(dt, world, rng)
        };

        // Dodge check runs independently of the movement mode
        self.try_dodge(projectiles);

        self.vel += move_dir * (self.accel() * dt);
        self.vel = self.vel * mob::FRICTION;
        self.vel = self.vel.clamp_length(self.max_speed());
        self.pos = world.wrap(self.pos + self.vel * dt);

        // Burst fire gating
        let mut want_fire = false;
        if tracking && best_d2 < mob::SHOOT_RANGE * mob::SHOOT_RANGE {
            if self.burst_left > 0 && self.fire_cooldown <= 0.0 {
                want_fire = true;
                self.advance_burst();
            } else if self.burst_left == 0 && self.burst_cooldown <= 0.0 {
                // Open a new burst
                self.burst_left = mob::BURST_SIZE;
                if self.pending_phrase.is_none() {
                    self.pending_phrase =
                        chatter::pick_chance(rng, chatter::BURST_FIRE, chatter::FIRE_CHANCE);
                }
                want_fire = true;
                self.advance_burst();
            }
        }

        want_fire
    }

    fn advance_burst(&mut self) {
        self.burst_left -= 1;
        self.fire_cooldown = mob::BURST_FIRE_RATE;
        if self.burst_left == 0 {
            self.burst_cooldown = mob::BURST_COOLDOWN;
        }
    }

    /// Tracking: lead-aim for the guns, decoupled radial+strafe movement
    fn steer_tracking(&mut self, dt: f32, target_pos: Vec2, target_vel: Vec2, rng: &mut SmallRng) -> Vec2 {
        let to_target = target_pos - self.pos;
        let dist = to_target.length();

        // Lead-aim: point the nose at the predicted intercept
        let travel_time = dist / projectile::SPEED;
        let aim_point = target_pos + target_vel * travel_time;
        let desired = (aim_point - self.pos).angle();
        self.rotation = turn_toward(self.rotation, desired, self.turn_speed() * dt);

        // Movement: radial term seeks the optimal combat distance
        let radial_w = if dist > mob::OPTIMAL_DIST {
            ((dist - mob::OPTIMAL_DIST) / mob::OPTIMAL_DIST).min(mob::RADIAL_CLAMP)
        } else {
            -((mob::OPTIMAL_DIST - dist) / mob::OPTIMAL_DIST).min(mob::RADIAL_CLAMP)
        };
        let radial = to_target.normalize() * radial_w;

        // Tangential strafe, sign flips on a randomized interval
        self.strafe_timer -= dt;
        if self.strafe_timer <= 0.0 {
            self.strafe_dir = -self.strafe_dir;
            self.strafe_timer =
                mob::STRAFE_MIN + rng.gen::<f32>() * (mob::STRAFE_MAX - mob::STRAFE_MIN);
        }
        let tangent = to_target.normalize().perpendicular() * self.strafe_dir;

        (radial + tangent).normalize()
    }

    /// Wandering: follow a periodically re-rolled heading, biased back
    /// toward the center when near the arena edge
    fn steer_wandering(&mut self, dt: f32, world: WorldRect, rng: &mut SmallRng) -> Vec2 {
        self.wander_timer -= dt;
        if self.wander_timer <= 0.0 {
            let to_center = (world.center() - self.pos).angle();
            let edge_dist = self
                .pos
                .x
                .min(world.w - self.pos.x)
                .min(self.pos.y)
                .min(world.h - self.pos.y);
            self.wander_heading = if edge_dist < 400.0 {
                // Near an edge: head inward with some scatter
                to_center + (rng.gen::<f32>() - 0.5) * 1.0
            } else {
                rng.gen::<f32>() * std::f32::consts::TAU
            };
            self.wander_timer =
                mob::WANDER_MIN + rng.gen::<f32>() * (mob::WANDER_MAX - mob::WANDER_MIN);
        }

        self.rotation = turn_toward(self.rotation, self.wander_heading, self.turn_speed() * dt);
        Vec2::from_angle(self.rotation)
    }

    /// Scan nearby projectiles and sidestep the first threatening one.
    /// A projectile threatens when it is moving toward the mob and its
    /// closest approach to the mob's position falls inside the hit zone.
    fn try_dodge(&mut self, projectiles: &HashMap<EntityId, Projectile>) {
        if self.dodge_cooldown > 0.0 {
            return;
        }
        let hit_zone = self.radius() + mob::DODGE_MARGIN;

        for proj in projectiles.values() {
            if !proj.alive || proj.owner_id == self.id {
                continue;
            }
            let to_mob = self.pos - proj.pos;
            if to_mob.length_sq() > mob::DODGE_SCAN_RANGE * mob::DODGE_SCAN_RANGE {
                continue;
            }
            // Must be closing on us
            if proj.vel.dot(to_mob) <= 0.0 {
                continue;
            }
            // Closest approach of the projectile's path to our position
            let dir = proj.vel.normalize();
            let along = to_mob.dot(dir);
            let closest = proj.pos + dir * along;
            if closest.distance_sq_to(self.pos) > hit_zone * hit_zone {
                continue;
            }

            // Impulse perpendicular to the incoming path, away from the
            // line: the cross sign tells which side we are on
            let side = dir.cross(to_mob);
            let sign = if side >= 0.0 { 1.0 } else { -1.0 };
            self.vel += dir.perpendicular() * (mob::DODGE_IMPULSE * sign);
            self.dodge_cooldown = mob::DODGE_COOLDOWN;
            break;
        }
    }

    /// Apply damage. Returns true if this damage killed the mob.
    /// Crossing the low-HP threshold queues a chatter line exactly once.
    pub fn take_damage(&mut self, dmg: i32, rng: &mut SmallRng) -> bool {
        if !self.alive {
            return false;
        }
        self.hp -= dmg;
        if self.hp <= 0 {
            self.hp = 0;
            self.alive = false;
            return true;
        }
        if !self.said_low_hp && (self.hp as f32) < self.max_hp as f32 * mob::LOW_HP_FRACTION {
            self.said_low_hp = true;
            if self.pending_phrase.is_none() {
                self.pending_phrase = Some(chatter::pick(rng, chatter::LOW_HP));
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::tick::DT;
    use crate::game::shipclass::ShipClass;
    use rand::SeedableRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    fn world() -> WorldRect {
        WorldRect::new(4000.0, 4000.0)
    }

    fn raider(r: &mut SmallRng) -> Mob {
        let mut m = Mob::spawn(r, world());
        m.kind = MobKind::Raider;
        m.hp = mob::RAIDER_HP;
        m.max_hp = mob::RAIDER_HP;
        m.hitbox = Hitbox::circle(mob::RAIDER_RADIUS);
        m
    }

    fn player_at(r: &mut SmallRng, pos: Vec2) -> Player {
        let mut p = Player::new("p1".into(), "P".into(), ShipClass::Fighter, r, world());
        p.pos = pos;
        p
    }

    #[test]
    fn test_spawns_on_edge_facing_inward() {
        let mut r = rng();
        for _ in 0..20 {
            let m = Mob::spawn(&mut r, world());
            let on_edge = m.pos.x == 0.0 || m.pos.x == 4000.0 || m.pos.y == 0.0 || m.pos.y == 4000.0;
            assert!(on_edge, "mob should spawn on an edge: {:?}", m.pos);
            assert!(m.alive);
        }
    }

    #[test]
    fn test_take_damage_to_death() {
        let mut r = rng();
        let mut m = raider(&mut r);

        assert!(!m.take_damage(20, &mut r));
        assert_eq!(m.hp, 40);
        assert!(!m.take_damage(20, &mut r));
        assert!(m.take_damage(20, &mut r));
        assert!(!m.alive);
        assert_eq!(m.hp, 0);
    }

    #[test]
    fn test_take_damage_when_dead_is_noop() {
        let mut r = rng();
        let mut m = raider(&mut r);
        m.alive = false;
        m.hp = 0;
        assert!(!m.take_damage(100, &mut r));
        assert_eq!(m.hp, 0);
    }

    #[test]
    fn test_low_hp_line_fires_once() {
        let mut r = rng();
        let mut m = raider(&mut r);

        // Drop below 30% of 60 HP (18)
        m.take_damage(45, &mut r);
        assert!(m.pending_phrase.is_some());
        m.pending_phrase = None;

        m.take_damage(1, &mut r);
        assert!(m.pending_phrase.is_none());
    }

    #[test]
    fn test_steers_toward_player() {
        let mut r = rng();
        let mut m = raider(&mut r);
        m.pos = Vec2::new(2000.0, 2000.0);
        m.vel = Vec2::ZERO;
        m.rotation = 0.0;

        let mut players = HashMap::new();
        let p = player_at(&mut r, Vec2::new(3000.0, 2000.0));
        players.insert(p.id.clone(), p);
        let projectiles = HashMap::new();

        let start_dist = 1000.0f32;
        for _ in 0..120 {
            m.update(DT, &players, &projectiles, world(), &mut r);
        }
        // Tracking movement seeks the optimal distance, well inside 1000
        let dist = m.pos.distance_to(Vec2::new(3000.0, 2000.0));
        assert!(dist < start_dist, "mob should close distance, at {dist}");
    }

    #[test]
    fn test_wanders_when_no_players() {
        let mut r = rng();
        let mut m = raider(&mut r);
        m.pos = Vec2::new(2000.0, 2000.0);
        let players = HashMap::new();
        let projectiles = HashMap::new();

        for _ in 0..60 {
            m.update(DT, &players, &projectiles, world(), &mut r);
        }
        // Moving somewhere under wander steering
        assert!(m.vel.length() > 1.0);
    }

    #[test]
    fn test_burst_fire_cadence() {
        let mut r = rng();
        let mut m = raider(&mut r);
        m.pos = Vec2::new(2000.0, 2000.0);

        let mut players = HashMap::new();
        // In shoot range, stationary
        let p = player_at(&mut r, Vec2::new(2400.0, 2000.0));
        players.insert(p.id.clone(), p);
        let projectiles = HashMap::new();

        // Run long enough for exactly one full burst plus its cooldown gap
        let mut shots = 0;
        let ticks = ((mob::BURST_COOLDOWN / DT) as u32).saturating_sub(10);
        for _ in 0..ticks {
            if m.update(DT, &players, &projectiles, world(), &mut r) {
                shots += 1;
            }
        }
        assert_eq!(shots, mob::BURST_SIZE, "one full burst before cooldown expires");
    }

    #[test]
    fn test_notice_transition_tracked() {
        let mut r = rng();
        let mut m = raider(&mut r);
        m.pos = Vec2::new(2000.0, 2000.0);
        let projectiles = HashMap::new();

        // No players: wandering
        let empty = HashMap::new();
        m.update(DT, &empty, &projectiles, world(), &mut r);
        assert!(!m.was_tracking);

        // Player appears in range: transition to tracking
        let mut players = HashMap::new();
        let p = player_at(&mut r, Vec2::new(2300.0, 2000.0));
        players.insert(p.id.clone(), p);
        m.update(DT, &players, &projectiles, world(), &mut r);
        assert!(m.was_tracking);
    }

    #[test]
    fn test_dodge_impulse_perpendicular() {
        let mut r = rng();
        let mut m = raider(&mut r);
        m.pos = Vec2::new(2000.0, 2010.0);
        m.vel = Vec2::ZERO;
        m.dodge_cooldown = 0.0;

        // Projectile flying +x, path passing just below the mob
        let mut projectiles = HashMap::new();
        let owner = player_at(&mut r, Vec2::new(1800.0, 2000.0));
        let mut proj = Projectile::from_player("j1".into(), &owner, 0.0);
        proj.pos = Vec2::new(1900.0, 2000.0);
        proj.vel = Vec2::new(800.0, 0.0);
        projectiles.insert(proj.id.clone(), proj);

        m.try_dodge(&projectiles);

        // Mob is above the path (cross > 0): impulse pushes further +y
        assert!(m.vel.y > 0.0, "dodge should push away from the path, vy={}", m.vel.y);
        assert!(m.dodge_cooldown > 0.0);
    }

    #[test]
    fn test_dodge_ignores_receding_projectiles() {
        let mut r = rng();
        let mut m = raider(&mut r);
        m.pos = Vec2::new(2000.0, 2000.0);
        m.vel = Vec2::ZERO;

        let mut projectiles = HashMap::new();
        let owner = player_at(&mut r, Vec2::new(1800.0, 2000.0));
        let mut proj = Projectile::from_player("j1".into(), &owner, 0.0);
        proj.pos = Vec2::new(1900.0, 2000.0);
        proj.vel = Vec2::new(-800.0, 0.0); // flying away
        projectiles.insert(proj.id.clone(), proj);

        m.try_dodge(&projectiles);
        assert_eq!(m.vel, Vec2::ZERO);
    }

    #[test]
    fn test_dreadnought_uses_triangle_hitbox() {
        let mut r = rng();
        let mut found = false;
        for _ in 0..100 {
            let m = Mob::spawn(&mut r, world());
            if m.kind == MobKind::Dreadnought {
                assert!(matches!(m.hitbox, Hitbox::Triangle { .. }));
                assert_eq!(m.max_hp, mob::DREADNOUGHT_HP);
                found = true;
                break;
            }
        }
        assert!(found, "expected at least one dreadnought in 100 spawns");
    }
}

//! Core entity models: players, projectiles, asteroids, pickups.
//!
//! Entities are plain aggregates owned by exactly one Game. No entity holds
//! a reference to another; interactions are resolved by id lookup each
//! tick, so removing an entity mid-tick can never dangle.

use rand::rngs::SmallRng;
use rand::Rng;
use smallvec::SmallVec;

use crate::game::ability::Ability;
use crate::game::constants::{asteroid, pickup, player, projectile};
use crate::game::match_state::Team;
use crate::game::mob::Mob;
use crate::game::shipclass::ShipClass;
use crate::util::vec2::{turn_toward, Vec2};

/// Player identifier (short hex, unique within a session)
pub type PlayerId = String;
/// Identifier for non-player entities
pub type EntityId = String;

/// Generate a random hex id of the given byte length from the game's RNG
pub fn generate_id(rng: &mut SmallRng, byte_len: usize) -> String {
    let mut s = String::with_capacity(byte_len * 2);
    for _ in 0..byte_len {
        let b: u8 = rng.gen();
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// Arena bounds for one match
#[derive(Debug, Clone, Copy)]
pub struct WorldRect {
    pub w: f32,
    pub h: f32,
}

impl WorldRect {
    pub fn new(w: f32, h: f32) -> Self {
        Self { w, h }
    }

    /// Teleport a coordinate pair back inside the arena (toroidal wrap)
    pub fn wrap(&self, mut pos: Vec2) -> Vec2 {
        if pos.x < 0.0 {
            pos.x += self.w;
        } else if pos.x > self.w {
            pos.x -= self.w;
        }
        if pos.y < 0.0 {
            pos.y += self.h;
        } else if pos.y > self.h {
            pos.y -= self.h;
        }
        pos
    }

    /// True once a point is outside the arena by more than `margin`
    pub fn outside_by(&self, pos: Vec2, margin: f32) -> bool {
        pos.x < -margin || pos.x > self.w + margin || pos.y < -margin || pos.y > self.h + margin
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.w / 2.0, self.h / 2.0)
    }
}

/// One entry in the recent-damager ring, used for assist attribution
#[derive(Debug, Clone)]
pub struct DamageRecord {
    pub attacker_id: PlayerId,
    pub time: f64,
}

/// A connected player's ship
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Persisted account id from the identity collaborator (0 = guest)
    pub auth_id: i64,
    pub pos: Vec2,
    pub vel: Vec2,
    pub rotation: f32,
    pub hp: i32,
    pub max_hp: i32,
    pub class: ShipClass,
    pub ability: Ability,
    pub team: Team,
    pub score: i32,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub damage_dealt: i32,
    pub alive: bool,
    pub ready: bool,
    /// Fire cooldown remaining
    pub fire_cooldown: f32,
    /// Respawn timer remaining (only meaningful while dead)
    pub respawn_timer: f32,
    /// Remaining invulnerability after a respawn
    pub spawn_protection: f32,
    /// Desired heading (toward the aim point)
    pub target_rotation: f32,
    /// Aim point in world coordinates
    pub target_point: Vec2,
    /// Distance threshold for pointer-seek speed modulation
    pub slow_threshold: f32,
    pub firing: bool,
    pub boosting: bool,
    /// Ability button edge, consumed by the Game on activation
    pub ability_pressed: bool,
    recent_damagers: SmallVec<[DamageRecord; player::DAMAGER_RING]>,
}

impl Player {
    pub fn new(id: PlayerId, name: String, class: ShipClass, rng: &mut SmallRng, world: WorldRect) -> Self {
        let def = class.def();
        let pos = Vec2::new(
            world.w / 4.0 + rng.gen::<f32>() * world.w / 2.0,
            world.h / 4.0 + rng.gen::<f32>() * world.h / 2.0,
        );
        Self {
            id,
            name,
            auth_id: 0,
            pos,
            vel: Vec2::ZERO,
            rotation: 0.0,
            hp: def.max_hp,
            max_hp: def.max_hp,
            class,
            ability: Ability::for_class(class),
            team: Team::None,
            score: 0,
            kills: 0,
            deaths: 0,
            assists: 0,
            damage_dealt: 0,
            alive: true,
            ready: false,
            fire_cooldown: 0.0,
            respawn_timer: 0.0,
            spawn_protection: 0.0,
            target_rotation: 0.0,
            target_point: pos,
            slow_threshold: 200.0,
            firing: false,
            boosting: false,
            ability_pressed: false,
            recent_damagers: SmallVec::new(),
        }
    }

    pub fn radius(&self) -> f32 {
        self.class.def().radius
    }

    /// Advance the ship one tick. Dead players only count down to respawn.
    pub fn update(&mut self, dt: f32, world: WorldRect, rng: &mut SmallRng) {
        self.ability.update(dt);

        if !self.alive {
            self.respawn_timer -= dt;
            if self.respawn_timer <= 0.0 {
                self.respawn(world, rng);
            }
            return;
        }

        let def = self.class.def();

        // Rotate toward the aim point at a bounded rate
        self.rotation = turn_toward(self.rotation, self.target_rotation, def.turn_speed * dt);

        // Accelerate along the current heading
        let mut accel = def.accel * dt;
        if self.boosting {
            accel *= def.boost_mul;
        }

        // Distance-based speed modulation: ramp from 0 inside the dead zone
        // up to 1 at the slow threshold, producing a soft stop at the pointer
        let dist = self.pos.distance_to(self.target_point);
        let thresh = self.slow_threshold.max(player::SLOW_THRESH_FLOOR);
        let mut speed_factor = 1.0f32;
        if dist <= player::DEAD_ZONE {
            accel = 0.0;
            speed_factor = 0.0;
        } else if dist < thresh {
            speed_factor = (dist - player::DEAD_ZONE) / (thresh - player::DEAD_ZONE);
            accel *= speed_factor;
        }

        self.vel += Vec2::from_angle(self.rotation) * accel;

        // Blend toward heavy braking when the pointer is near the ship so it
        // actually stops instead of coasting forever
        let friction = if speed_factor < 1.0 {
            player::BRAKE_FRICTION + speed_factor * (def.friction - player::BRAKE_FRICTION)
        } else {
            def.friction
        };
        self.vel = self.vel * friction;

        let mut max_speed = def.max_speed;
        if self.boosting {
            max_speed *= def.boost_mul;
        }
        self.vel = self.vel.clamp_length(max_speed);

        self.pos = world.wrap(self.pos + self.vel * dt);

        if self.fire_cooldown > 0.0 {
            self.fire_cooldown -= dt;
        }
        if self.spawn_protection > 0.0 {
            self.spawn_protection = (self.spawn_protection - dt).max(0.0);
        }
    }

    /// Reset the ship after death at a fresh random position
    pub fn respawn(&mut self, world: WorldRect, rng: &mut SmallRng) {
        self.pos = Vec2::new(
            world.w / 4.0 + rng.gen::<f32>() * world.w / 2.0,
            world.h / 4.0 + rng.gen::<f32>() * world.h / 2.0,
        );
        self.finish_spawn();
    }

    /// Place the ship at a specific spawn point (team spawns at match start)
    pub fn spawn_at(&mut self, pos: Vec2) {
        self.pos = pos;
        self.finish_spawn();
    }

    fn finish_spawn(&mut self) {
        self.vel = Vec2::ZERO;
        self.hp = self.max_hp;
        self.alive = true;
        self.fire_cooldown = 0.0;
        self.respawn_timer = 0.0;
        self.spawn_protection = player::SPAWN_PROTECTION;
        self.target_point = self.pos;
    }

    /// Apply damage, routing through the shield ability first. Returns true
    /// if this damage killed the player. No-op while dead or protected.
    pub fn take_damage(&mut self, dmg: i32) -> bool {
        if !self.alive || self.spawn_protection > 0.0 {
            return false;
        }
        let dmg = self.ability.absorb_damage(dmg);
        self.hp -= dmg;
        if self.hp <= 0 {
            self.hp = 0;
            self.alive = false;
            self.deaths += 1;
            self.respawn_timer = player::RESPAWN_TIME;
            return true;
        }
        false
    }

    pub fn can_fire(&self) -> bool {
        self.alive && self.firing && self.fire_cooldown <= 0.0
    }

    /// Note an attacker for assist attribution. An attacker already in the
    /// ring just gets its timestamp refreshed; the ring overwrites oldest.
    pub fn record_damage(&mut self, attacker_id: &str, now: f64) {
        if attacker_id == self.id {
            return;
        }
        if let Some(rec) = self
            .recent_damagers
            .iter_mut()
            .find(|r| r.attacker_id == attacker_id)
        {
            rec.time = now;
            return;
        }
        if self.recent_damagers.len() >= player::DAMAGER_RING {
            // Drop the stalest record
            if let Some(oldest) = self
                .recent_damagers
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.time.partial_cmp(&b.1.time).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(i, _)| i)
            {
                self.recent_damagers.remove(oldest);
            }
        }
        self.recent_damagers.push(DamageRecord {
            attacker_id: attacker_id.to_string(),
            time: now,
        });
    }

    /// Attackers within the assist window, excluding the killer
    pub fn assist_ids(&self, killer_id: &str, now: f64) -> Vec<PlayerId> {
        self.recent_damagers
            .iter()
            .filter(|r| {
                r.attacker_id != killer_id && now - r.time <= player::ASSIST_WINDOW as f64
            })
            .map(|r| r.attacker_id.clone())
            .collect()
    }

    /// Clear assist history (match start / reset)
    pub fn clear_damagers(&mut self) {
        self.recent_damagers.clear();
    }
}

/// A laser shot. The owner is a player or a mob, identified uniformly by
/// id so hit resolution looks the owner up the same way for both.
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: EntityId,
    pub owner_id: String,
    pub pos: Vec2,
    pub vel: Vec2,
    pub rotation: f32,
    pub life: f32,
    pub damage: i32,
    pub alive: bool,
}

impl Projectile {
    /// Fire from a player ship, offset forward from its center.
    /// `angle_offset` fans out the individual shots of a spread volley.
    pub fn from_player(id: EntityId, owner: &Player, angle_offset: f32) -> Self {
        let def = owner.class.def();
        let heading = owner.rotation + angle_offset;
        let dir = Vec2::from_angle(heading);
        Self {
            id,
            owner_id: owner.id.clone(),
            pos: owner.pos + dir * projectile::OFFSET,
            vel: dir * def.proj_speed + owner.vel * projectile::VEL_INHERIT,
            rotation: heading,
            life: projectile::LIFETIME,
            damage: def.proj_damage,
            alive: true,
        }
    }

    /// Fire from a mob along its current heading
    pub fn from_mob(id: EntityId, mob: &Mob) -> Self {
        let dir = Vec2::from_angle(mob.rotation);
        Self {
            id,
            owner_id: mob.id.clone(),
            pos: mob.pos + dir * projectile::OFFSET,
            vel: dir * projectile::SPEED + mob.vel * projectile::VEL_INHERIT,
            rotation: mob.rotation,
            life: projectile::LIFETIME,
            damage: mob.proj_damage,
            alive: true,
        }
    }

    pub fn update(&mut self, dt: f32, world: WorldRect) {
        if !self.alive {
            return;
        }
        self.pos = world.wrap(self.pos + self.vel * dt);
        self.life -= dt;
        if self.life <= 0.0 {
            self.alive = false;
        }
    }
}

/// Ballistic rock: straight line, spins, never wraps
#[derive(Debug, Clone)]
pub struct Asteroid {
    pub id: EntityId,
    pub pos: Vec2,
    pub vel: Vec2,
    pub rotation: f32,
    pub spin: f32,
    pub alive: bool,
}

impl Asteroid {
    /// Spawn at a random edge, aimed at the opposite half of the arena
    pub fn spawn(rng: &mut SmallRng, world: WorldRect) -> Self {
        let id = generate_id(rng, 4);
        let speed = asteroid::MIN_SPEED + rng.gen::<f32>() * (asteroid::MAX_SPEED - asteroid::MIN_SPEED);
        let mut spin = asteroid::SPIN_MIN + rng.gen::<f32>() * (asteroid::SPIN_MAX - asteroid::SPIN_MIN);
        if rng.gen::<f32>() < 0.5 {
            spin = -spin;
        }

        let edge = (rng.gen::<f32>() * 4.0) as u32;
        let (pos, target) = match edge {
            0 => (
                Vec2::new(-asteroid::RADIUS, rng.gen::<f32>() * world.h),
                Vec2::new(world.w / 2.0 + rng.gen::<f32>() * world.w / 2.0, rng.gen::<f32>() * world.h),
            ),
            1 => (
                Vec2::new(world.w + asteroid::RADIUS, rng.gen::<f32>() * world.h),
                Vec2::new(rng.gen::<f32>() * world.w / 2.0, rng.gen::<f32>() * world.h),
            ),
            2 => (
                Vec2::new(rng.gen::<f32>() * world.w, -asteroid::RADIUS),
                Vec2::new(rng.gen::<f32>() * world.w, world.h / 2.0 + rng.gen::<f32>() * world.h / 2.0),
            ),
            _ => (
                Vec2::new(rng.gen::<f32>() * world.w, world.h + asteroid::RADIUS),
                Vec2::new(rng.gen::<f32>() * world.w, rng.gen::<f32>() * world.h / 2.0),
            ),
        };

        let angle = (target - pos).angle();
        Self {
            id,
            pos,
            vel: Vec2::from_angle(angle) * speed,
            rotation: rng.gen::<f32>() * std::f32::consts::TAU,
            spin,
            alive: true,
        }
    }

    pub fn update(&mut self, dt: f32, world: WorldRect) {
        if !self.alive {
            return;
        }
        self.pos += self.vel * dt;
        self.rotation += self.spin * dt;

        // Ballistic trajectory: dies off-map instead of wrapping
        if world.outside_by(self.pos, asteroid::DESPAWN_MARGIN) {
            self.alive = false;
        }
    }
}

/// Health orb that heals on contact
#[derive(Debug, Clone)]
pub struct Pickup {
    pub id: EntityId,
    pub pos: Vec2,
    pub life: f32,
    pub alive: bool,
}

impl Pickup {
    pub fn spawn(rng: &mut SmallRng, world: WorldRect) -> Self {
        let m = pickup::EDGE_MARGIN;
        Self {
            id: generate_id(rng, 4),
            pos: Vec2::new(
                m + rng.gen::<f32>() * (world.w - 2.0 * m),
                m + rng.gen::<f32>() * (world.h - 2.0 * m),
            ),
            life: pickup::TIMEOUT,
            alive: true,
        }
    }

    pub fn update(&mut self, dt: f32) {
        if !self.alive {
            return;
        }
        self.life -= dt;
        if self.life <= 0.0 {
            self.alive = false;
        }
    }
}

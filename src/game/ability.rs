//! Per-class active abilities and the entities they spawn.
//!
//! The `Ability` struct only tracks timing state (cooldown, active window,
//! shield pool). Battlefield effects (spawning heal zones, homing missiles,
//! the blink teleport) are orchestrated by the Game.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::game::collision::wrap_delta;
use crate::game::constants::ability::*;
use crate::game::mob::Mob;
use crate::game::shipclass::ShipClass;
use crate::game::state::{EntityId, Player, PlayerId, WorldRect};
use crate::util::vec2::{turn_toward, Vec2};

/// Which ability a ship carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityType {
    /// Fighter: fan of homing missiles
    MissileBarrage,
    /// Tank: damage-absorbing shield
    Shield,
    /// Scout: short forward teleport
    Blink,
    /// Support: area-of-effect heal zone
    HealAura,
}

/// Timing state machine for one player's ability
#[derive(Debug, Clone)]
pub struct Ability {
    pub kind: AbilityType,
    /// Remaining cooldown
    pub cooldown: f32,
    /// Currently active (duration-based abilities)
    pub active: bool,
    /// Remaining active duration
    pub timer: f32,
    /// Remaining absorbable HP (shield only)
    pub shield_hp: i32,
}

impl Ability {
    pub fn new(kind: AbilityType) -> Self {
        Self {
            kind,
            cooldown: 0.0,
            active: false,
            timer: 0.0,
            shield_hp: 0,
        }
    }

    /// Default ability for a ship class
    pub fn for_class(class: ShipClass) -> Self {
        let kind = match class {
            ShipClass::Tank => AbilityType::Shield,
            ShipClass::Scout => AbilityType::Blink,
            ShipClass::Support => AbilityType::HealAura,
            ShipClass::Fighter => AbilityType::MissileBarrage,
        };
        Self::new(kind)
    }

    pub fn can_activate(&self) -> bool {
        self.cooldown <= 0.0 && !self.active
    }

    /// Start the ability. Returns false (no state change) when gated.
    pub fn activate(&mut self) -> bool {
        if !self.can_activate() {
            return false;
        }
        match self.kind {
            AbilityType::MissileBarrage => {
                // Missiles spawned by the Game
                self.cooldown = MISSILE_BARRAGE_COOLDOWN;
            }
            AbilityType::Shield => {
                self.active = true;
                self.timer = SHIELD_DURATION;
                self.shield_hp = SHIELD_ABSORB;
                self.cooldown = SHIELD_COOLDOWN;
            }
            AbilityType::Blink => {
                // Teleport applied by the Game
                self.cooldown = BLINK_COOLDOWN;
            }
            AbilityType::HealAura => {
                self.active = true;
                self.timer = HEAL_AURA_DURATION;
                self.cooldown = HEAL_AURA_COOLDOWN;
            }
        }
        true
    }

    pub fn update(&mut self, dt: f32) {
        if self.cooldown > 0.0 {
            self.cooldown = (self.cooldown - dt).max(0.0);
        }
        if self.active {
            self.timer -= dt;
            if self.timer <= 0.0 {
                self.active = false;
                self.timer = 0.0;
                self.shield_hp = 0;
            }
        }
    }

    /// Shield absorption: soaks damage up to the remaining pool and returns
    /// what passes through. Exhausting the pool deactivates the shield.
    pub fn absorb_damage(&mut self, dmg: i32) -> i32 {
        if !self.active || self.kind != AbilityType::Shield || self.shield_hp <= 0 {
            return dmg;
        }
        if dmg <= self.shield_hp {
            self.shield_hp -= dmg;
            return 0;
        }
        let remaining = dmg - self.shield_hp;
        self.shield_hp = 0;
        self.active = false;
        self.timer = 0.0;
        remaining
    }
}

/// Ephemeral area-of-effect heal placed by the Support ability
#[derive(Debug, Clone)]
pub struct HealZone {
    pub id: EntityId,
    pub pos: Vec2,
    pub radius: f32,
    pub owner_id: PlayerId,
    pub team: crate::game::match_state::Team,
    pub life: f32,
    /// HP/s restored to allies in range
    pub rate: f32,
}

impl HealZone {
    pub fn new(id: EntityId, pos: Vec2, owner_id: PlayerId, team: crate::game::match_state::Team) -> Self {
        Self {
            id,
            pos,
            radius: HEAL_AURA_RADIUS,
            owner_id,
            team,
            life: HEAL_AURA_DURATION,
            rate: HEAL_AURA_RATE,
        }
    }

    /// Tick lifetime; false once expired
    pub fn update(&mut self, dt: f32) -> bool {
        self.life -= dt;
        self.life > 0.0
    }
}

/// Missile that re-aims toward the nearest valid target every tick
#[derive(Debug, Clone)]
pub struct HomingProjectile {
    pub id: EntityId,
    pub owner_id: PlayerId,
    pub pos: Vec2,
    pub vel: Vec2,
    pub rotation: f32,
    pub life: f32,
    pub damage: i32,
    pub alive: bool,
}

impl HomingProjectile {
    pub fn new(id: EntityId, pos: Vec2, rotation: f32, owner_id: PlayerId) -> Self {
        Self {
            id,
            owner_id,
            pos,
            vel: Vec2::from_angle(rotation) * MISSILE_BARRAGE_SPEED,
            rotation,
            life: MISSILE_BARRAGE_LIFETIME,
            damage: MISSILE_BARRAGE_DAMAGE,
            alive: true,
        }
    }

    /// Steer toward the nearest living target (players other than the owner,
    /// or mobs) using wrap-aware deltas, then advance.
    pub fn update(
        &mut self,
        dt: f32,
        players: &HashMap<PlayerId, Player>,
        mobs: &HashMap<EntityId, Mob>,
        world: WorldRect,
    ) {
        if !self.alive {
            return;
        }
        self.life -= dt;
        if self.life <= 0.0 {
            self.alive = false;
            return;
        }

        let mut best_d2 = f32::MAX;
        let mut target_delta: Option<Vec2> = None;

        for p in players.values() {
            if !p.alive || p.id == self.owner_id {
                continue;
            }
            let d = Vec2::new(
                wrap_delta(p.pos.x - self.pos.x, world.w),
                wrap_delta(p.pos.y - self.pos.y, world.h),
            );
            let d2 = d.length_sq();
            if d2 < best_d2 {
                best_d2 = d2;
                target_delta = Some(d);
            }
        }
        for m in mobs.values() {
            if !m.alive {
                continue;
            }
            let d = Vec2::new(
                wrap_delta(m.pos.x - self.pos.x, world.w),
                wrap_delta(m.pos.y - self.pos.y, world.h),
            );
            let d2 = d.length_sq();
            if d2 < best_d2 {
                best_d2 = d2;
                target_delta = Some(d);
            }
        }

        if let Some(delta) = target_delta {
            self.rotation = turn_toward(self.rotation, delta.angle(), MISSILE_BARRAGE_TURN_RATE * dt);
        }

        self.vel = Vec2::from_angle(self.rotation) * MISSILE_BARRAGE_SPEED;
        self.pos = world.wrap(self.pos + self.vel * dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::tick::DT;

    #[test]
    fn test_activate_gated_by_cooldown() {
        let mut a = Ability::new(AbilityType::Blink);
        assert!(a.activate());
        assert!(!a.can_activate());
        assert!(!a.activate());

        // Wait out the cooldown
        for _ in 0..((BLINK_COOLDOWN / DT) as u32 + 1) {
            a.update(DT);
        }
        assert!(a.activate());
    }

    #[test]
    fn test_shield_cycle() {
        let mut a = Ability::new(AbilityType::Shield);
        assert!(a.activate());
        assert!(a.active);
        assert_eq!(a.shield_hp, SHIELD_ABSORB);

        // Cannot re-activate while active
        assert!(!a.activate());

        // Expires after its duration
        for _ in 0..((SHIELD_DURATION / DT) as u32 + 1) {
            a.update(DT);
        }
        assert!(!a.active);
        assert_eq!(a.shield_hp, 0);
    }

    #[test]
    fn test_shield_absorbs_then_passes_through() {
        let mut a = Ability::new(AbilityType::Shield);
        a.activate();

        // Fully absorbed
        assert_eq!(a.absorb_damage(20), 0);
        assert_eq!(a.shield_hp, SHIELD_ABSORB - 20);

        // Pool exhausted: remainder passes through, shield drops
        let overflow = a.absorb_damage(SHIELD_ABSORB);
        assert_eq!(overflow, 20);
        assert_eq!(a.shield_hp, 0);
        assert!(!a.active);

        // Inactive shield passes damage untouched
        assert_eq!(a.absorb_damage(15), 15);
    }

    #[test]
    fn test_non_shield_never_absorbs() {
        let mut a = Ability::new(AbilityType::HealAura);
        a.activate();
        assert_eq!(a.absorb_damage(40), 40);
    }

    #[test]
    fn test_heal_zone_expires() {
        let mut hz = HealZone::new(
            "h1".into(),
            Vec2::ZERO,
            "p1".into(),
            crate::game::match_state::Team::None,
        );
        assert!(hz.update(1.0));
        assert!(!hz.update(HEAL_AURA_DURATION));
    }

    #[test]
    fn test_homing_expires() {
        let mut hm = HomingProjectile::new("m1".into(), Vec2::ZERO, 0.0, "p1".into());
        let players = HashMap::new();
        let mobs = HashMap::new();
        let world = WorldRect::new(4000.0, 4000.0);
        for _ in 0..((MISSILE_BARRAGE_LIFETIME / DT) as u32 + 2) {
            hm.update(DT, &players, &mobs, world);
        }
        assert!(!hm.alive);
    }

    #[test]
    fn test_homing_turns_toward_target() {
        use crate::game::shipclass::ShipClass;
        use rand::SeedableRng;

        let world = WorldRect::new(4000.0, 4000.0);
        let mut rng = rand::rngs::SmallRng::seed_from_u64(1);
        let mut players = HashMap::new();
        let mut target = Player::new("t".into(), "T".into(), ShipClass::Fighter, &mut rng, world);
        // Target sits above the missile; missile starts heading +x
        target.pos = Vec2::new(1000.0, 1200.0);
        players.insert(target.id.clone(), target);

        let mut hm = HomingProjectile::new("m1".into(), Vec2::new(1000.0, 1000.0), 0.0, "owner".into());
        let mobs = HashMap::new();
        let r0 = hm.rotation;
        hm.update(DT, &players, &mobs, world);
        // Turned toward +y (positive rotation delta)
        assert!(hm.rotation > r0);
    }

    #[test]
    fn test_homing_targets_across_wrap() {
        use crate::game::shipclass::ShipClass;
        use rand::SeedableRng;

        let world = WorldRect::new(4000.0, 4000.0);
        let mut rng = rand::rngs::SmallRng::seed_from_u64(1);
        let mut players = HashMap::new();
        // Target near the left edge; missile near the right edge facing away
        let mut target = Player::new("t".into(), "T".into(), ShipClass::Fighter, &mut rng, world);
        target.pos = Vec2::new(10.0, 2000.0);
        players.insert(target.id.clone(), target);

        let mut hm = HomingProjectile::new(
            "m1".into(),
            Vec2::new(3990.0, 2000.0),
            std::f32::consts::PI,
            "owner".into(),
        );
        let mobs = HashMap::new();
        // Wrap-aware delta points right through the seam (dx = +20), so the
        // missile turns back toward heading 0 instead of chasing the long way
        let before = hm.rotation;
        hm.update(DT, &players, &mobs, world);
        assert!(hm.rotation < before);
    }
}

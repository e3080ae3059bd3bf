//! Ship class definitions.

use serde::{Deserialize, Serialize};

/// Playable ship class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ShipClass {
    Fighter = 0,
    Tank = 1,
    Scout = 2,
    Support = 3,
}

impl ShipClass {
    pub const COUNT: usize = 4;

    /// Class assigned to the Nth joining player (cycles the roster)
    pub fn for_index(index: usize) -> Self {
        match index % Self::COUNT {
            0 => ShipClass::Fighter,
            1 => ShipClass::Tank,
            2 => ShipClass::Scout,
            _ => ShipClass::Support,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Stat block for a ship class
#[derive(Debug, Clone, Copy)]
pub struct ShipClassDef {
    pub max_hp: i32,
    pub accel: f32,
    pub max_speed: f32,
    pub boost_mul: f32,
    pub friction: f32,
    pub fire_cooldown: f32,
    pub proj_damage: i32,
    pub proj_speed: f32,
    /// Projectiles per shot (Tank fires a spread)
    pub proj_count: u32,
    /// Spread angle in radians across the whole fan
    pub proj_spread: f32,
    pub radius: f32,
    pub turn_speed: f32,
}

/// Fighter: balanced, standard stats
const FIGHTER: ShipClassDef = ShipClassDef {
    max_hp: 100,
    accel: 600.0,
    max_speed: 350.0,
    boost_mul: 1.6,
    friction: 0.97,
    fire_cooldown: 0.15,
    proj_damage: 20,
    proj_speed: 800.0,
    proj_count: 1,
    proj_spread: 0.0,
    radius: 20.0,
    turn_speed: 8.0,
};

/// Tank: slow, tanky, shotgun spread
const TANK: ShipClassDef = ShipClassDef {
    max_hp: 200,
    accel: 350.0,
    max_speed: 220.0,
    boost_mul: 1.4,
    friction: 0.97,
    fire_cooldown: 0.4,
    proj_damage: 15,
    proj_speed: 700.0,
    proj_count: 5,
    proj_spread: 0.3,
    radius: 25.0,
    turn_speed: 6.0,
};

/// Scout: fast, fragile, rapid fire
const SCOUT: ShipClassDef = ShipClassDef {
    max_hp: 60,
    accel: 800.0,
    max_speed: 480.0,
    boost_mul: 1.8,
    friction: 0.97,
    fire_cooldown: 0.1,
    proj_damage: 12,
    proj_speed: 900.0,
    proj_count: 1,
    proj_spread: 0.0,
    radius: 16.0,
    turn_speed: 10.0,
};

/// Support: medium stats, heal ability
const SUPPORT: ShipClassDef = ShipClassDef {
    max_hp: 120,
    accel: 500.0,
    max_speed: 300.0,
    boost_mul: 1.5,
    friction: 0.97,
    fire_cooldown: 0.2,
    proj_damage: 15,
    proj_speed: 800.0,
    proj_count: 1,
    proj_spread: 0.0,
    radius: 20.0,
    turn_speed: 8.0,
};

impl ShipClass {
    /// Stat block for this class
    pub fn def(self) -> &'static ShipClassDef {
        match self {
            ShipClass::Fighter => &FIGHTER,
            ShipClass::Tank => &TANK,
            ShipClass::Scout => &SCOUT,
            ShipClass::Support => &SUPPORT,
        }
    }
}

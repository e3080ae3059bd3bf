//! The match simulation. One `Game` owns every entity collection for one
//! session, runs the fixed-tick loop body, resolves all collision passes,
//! spawns environmental entities, and emits broadcasts.
//!
//! All mutation happens through `&mut self` under the session's lock; the
//! tick loop task is the sole driver. Nothing here may abort the tick: a
//! missing id is treated as "already removed" and skipped.

use std::sync::Arc;

use hashbrown::HashMap;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::game::ability::{AbilityType, HealZone, HomingProjectile};
use crate::game::collision::circles_collide_wrapped;
use crate::game::constants::{net, player as player_c, projectile as proj_c, session as limits, tick};
use crate::game::match_state::{GameMode, MatchConfig, MatchPhase, MatchState, Team};
use crate::game::mob::{chatter, Mob};
use crate::game::shipclass::ShipClass;
use crate::game::spatial::{EntityKind, EntityRef, SpatialGrid};
use crate::game::state::{
    generate_id, Asteroid, EntityId, Pickup, Player, PlayerId, Projectile, WorldRect,
};
use crate::net::broadcaster::Broadcaster;
use crate::net::protocol::{
    encode_message, encode_snapshot, phase_message, AsteroidSnapshot, ClientInput, DeathMsg,
    GameSnapshot, HealZoneSnapshot, HitMsg, KillMsg, MatchResultMsg, MobSnapshot, PickupSnapshot,
    PlayerMatchResult, PlayerSnapshot, ProjectileSnapshot, ServerMessage, TeamPlayerInfo,
    XpUpdateMsg,
};
use crate::store::{self, MatchStore};
use crate::util::{clamp, round1};
use crate::util::vec2::Vec2;

/// Join result handed back to the transport layer
#[derive(Debug, Clone)]
pub struct JoinedPlayer {
    pub id: PlayerId,
    pub ship: ShipClass,
    pub team: Team,
}

/// State for one running match
pub struct Game {
    players: HashMap<PlayerId, Player>,
    projectiles: HashMap<EntityId, Projectile>,
    mobs: HashMap<EntityId, Mob>,
    asteroids: HashMap<EntityId, Asteroid>,
    pickups: HashMap<EntityId, Pickup>,
    homing_missiles: HashMap<EntityId, HomingProjectile>,
    heal_zones: HashMap<EntityId, HealZone>,

    /// Primary connection per player
    clients: HashMap<PlayerId, Arc<dyn Broadcaster>>,
    /// Auxiliary phone-controller connections per player
    controllers: HashMap<PlayerId, Arc<dyn Broadcaster>>,

    tick: u64,
    game_time: f64,
    next_ship: usize,
    match_state: MatchState,
    rng: SmallRng,

    grid: SpatialGrid,
    // Flat id lists rebuilt each tick; grid refs index into these
    flat_players: Vec<PlayerId>,
    flat_projectiles: Vec<EntityId>,
    flat_mobs: Vec<EntityId>,
    flat_asteroids: Vec<EntityId>,
    flat_pickups: Vec<EntityId>,
    query_buf: Vec<EntityRef>,

    /// Last broadcast velocity per entity, for delta suppression
    last_vel: HashMap<String, (f32, f32)>,

    mob_spawn_cd: f32,
    asteroid_spawn_cd: f32,
    pickup_spawn_cd: f32,

    store: Option<Arc<dyn MatchStore>>,
}

impl Game {
    pub fn new(config: MatchConfig) -> Self {
        Self::with_seed(config, rand::thread_rng().gen())
    }

    /// Deterministic construction for tests: every random draw in the
    /// simulation comes from this seed
    pub fn with_seed(config: MatchConfig, seed: u64) -> Self {
        let world = config.world;
        Self {
            players: HashMap::new(),
            projectiles: HashMap::new(),
            mobs: HashMap::new(),
            asteroids: HashMap::new(),
            pickups: HashMap::new(),
            homing_missiles: HashMap::new(),
            heal_zones: HashMap::new(),
            clients: HashMap::new(),
            controllers: HashMap::new(),
            tick: 0,
            game_time: 0.0,
            next_ship: 0,
            match_state: MatchState::new(config),
            rng: SmallRng::seed_from_u64(seed),
            grid: SpatialGrid::new(world.w, world.h),
            flat_players: Vec::with_capacity(limits::MAX_PLAYERS),
            flat_projectiles: Vec::with_capacity(64),
            flat_mobs: Vec::with_capacity(limits::MAX_MOBS),
            flat_asteroids: Vec::with_capacity(limits::MAX_ASTEROIDS),
            flat_pickups: Vec::with_capacity(limits::MAX_PICKUPS),
            query_buf: Vec::with_capacity(64),
            last_vel: HashMap::new(),
            mob_spawn_cd: limits::MOB_SPAWN_INTERVAL,
            asteroid_spawn_cd: limits::ASTEROID_SPAWN_INTERVAL,
            pickup_spawn_cd: limits::PICKUP_SPAWN_INTERVAL,
            store: None,
        }
    }

    // ========================================================================
    // External operations (invoked by the transport under the session lock)
    // ========================================================================

    /// Add a player. None when the session is at capacity.
    pub fn add_player(&mut self, name: &str) -> Option<JoinedPlayer> {
        if self.players.len() >= self.match_state.config.max_players {
            return None;
        }
        let id = generate_id(&mut self.rng, 4);
        let class = ShipClass::for_index(self.next_ship);
        self.next_ship += 1;

        let mut player = Player::new(
            id.clone(),
            name.to_string(),
            class,
            &mut self.rng,
            self.match_state.config.world,
        );
        player.team = self.match_state.assign_team(&self.players);
        let joined = JoinedPlayer {
            id: id.clone(),
            ship: class,
            team: player.team,
        };
        self.players.insert(id, player);
        Some(joined)
    }

    pub fn remove_player(&mut self, id: &str) {
        self.players.remove(id);
        self.clients.remove(id);
        self.controllers.remove(id);
    }

    pub fn has_player(&self, id: &str) -> bool {
        self.players.contains_key(id)
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    /// Link the identity collaborator's persisted account id to a player
    pub fn set_auth_id(&mut self, player_id: &str, auth_id: i64) {
        if let Some(p) = self.players.get_mut(player_id) {
            p.auth_id = auth_id;
        }
    }

    pub fn set_client(&mut self, player_id: &str, client: Arc<dyn Broadcaster>) {
        self.clients.insert(player_id.to_string(), client);
    }

    /// Attach an auxiliary controller; the primary client is notified
    pub fn set_controller(&mut self, player_id: &str, client: Arc<dyn Broadcaster>) {
        self.controllers.insert(player_id.to_string(), client);
        if let Some(main) = self.clients.get(player_id) {
            main.send_message(&ServerMessage::CtrlOn);
        }
    }

    pub fn remove_controller(&mut self, player_id: &str) {
        self.controllers.remove(player_id);
        if let Some(main) = self.clients.get(player_id) {
            main.send_message(&ServerMessage::CtrlOff);
        }
    }

    pub fn set_store(&mut self, store: Arc<dyn MatchStore>) {
        self.store = Some(store);
    }

    /// Apply a player intent. O(1); unknown ids are ignored.
    pub fn handle_input(&mut self, player_id: &str, input: &ClientInput) {
        let Some(p) = self.players.get_mut(player_id) else {
            return;
        };
        // Only update the target heading when the aim point is far enough
        // from the ship to produce a stable angle
        let dx = input.aim_x - p.pos.x;
        let dy = input.aim_y - p.pos.y;
        if dx * dx + dy * dy > player_c::MIN_AIM_DIST_SQ {
            p.target_rotation = dy.atan2(dx);
        }
        p.firing = input.fire;
        p.boosting = input.boost;
        p.target_point = Vec2::new(input.aim_x, input.aim_y);
        p.slow_threshold = clamp(
            input.thresh,
            player_c::SLOW_THRESH_MIN,
            player_c::SLOW_THRESH_MAX,
        );
        p.ability_pressed = input.ability;
    }

    /// Toggle a player's ready flag (lobby)
    pub fn handle_ready(&mut self, player_id: &str) {
        let Some(p) = self.players.get_mut(player_id) else {
            return;
        };
        p.ready = !p.ready;
        self.broadcast_team_update();
    }

    /// Pick a team while in the lobby
    pub fn handle_team_pick(&mut self, player_id: &str, team: u8) {
        if self.match_state.phase != MatchPhase::Lobby {
            return;
        }
        let Some(team) = Team::from_u8(team) else {
            return;
        };
        let Some(p) = self.players.get_mut(player_id) else {
            return;
        };
        p.team = team;
        self.broadcast_team_update();
    }

    /// Request a rematch during the result phase
    pub fn handle_rematch(&mut self, _player_id: &str) {
        if self.match_state.phase != MatchPhase::Result {
            return;
        }
        self.reset_to_lobby();
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn match_phase(&self) -> MatchPhase {
        self.match_state.phase
    }

    pub fn mode(&self) -> GameMode {
        self.match_state.config.mode
    }

    pub fn match_state(&self) -> &MatchState {
        &self.match_state
    }

    pub fn match_state_mut(&mut self) -> &mut MatchState {
        &mut self.match_state
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    pub fn mob_count(&self) -> usize {
        self.mobs.len()
    }

    pub fn asteroid_count(&self) -> usize {
        self.asteroids.len()
    }

    pub fn pickup_count(&self) -> usize {
        self.pickups.len()
    }

    pub fn heal_zone_count(&self) -> usize {
        self.heal_zones.len()
    }

    pub fn homing_missile_count(&self) -> usize {
        self.homing_missiles.len()
    }

    fn is_team_mode(&self) -> bool {
        self.match_state.config.is_team_mode()
    }

    fn world(&self) -> WorldRect {
        self.match_state.config.world
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Run one fixed tick. Dispatches on the match phase.
    pub fn update(&mut self) {
        let dt = tick::DT;
        self.tick += 1;
        self.game_time += dt as f64;

        match self.match_state.phase {
            MatchPhase::Lobby => self.update_lobby(),
            MatchPhase::Countdown => self.update_countdown(dt),
            MatchPhase::Playing => self.update_playing(dt),
            MatchPhase::Result => self.update_result(dt),
        }
    }

    fn update_lobby(&mut self) {
        if self.check_all_ready() {
            self.start_countdown();
        }
        if self.tick % tick::BROADCAST_EVERY == 0 {
            self.broadcast_state();
        }
    }

    fn update_countdown(&mut self, dt: f32) {
        self.match_state.countdown -= dt;
        if self.match_state.countdown <= 0.0 {
            self.start_match();
            return;
        }
        if self.tick % tick::BROADCAST_EVERY == 0 {
            self.broadcast_state();
        }
    }

    fn update_result(&mut self, dt: f32) {
        self.match_state.result_timer -= dt;
        if self.match_state.result_timer <= 0.0 {
            self.reset_to_lobby();
            return;
        }
        if self.tick % tick::BROADCAST_EVERY == 0 {
            self.broadcast_state();
        }
    }

    fn update_playing(&mut self, dt: f32) {
        // Match timer
        if self.match_state.config.time_limit > 0.0 {
            self.match_state.time_left -= dt;
            if self.match_state.time_left <= 0.0 {
                self.match_state.time_left = 0.0;
                self.end_match();
                return;
            }
        }
        if self.check_score_limit() {
            self.end_match();
            return;
        }

        let world = self.world();

        // Advance players
        for p in self.players.values_mut() {
            p.update(dt, world, &mut self.rng);
        }

        self.fire_player_weapons();
        self.activate_pressed_abilities();

        // Homing missiles
        for hm in self.homing_missiles.values_mut() {
            hm.update(dt, &self.players, &self.mobs, world);
        }
        self.homing_missiles.retain(|_, hm| hm.alive);

        self.update_heal_zones(dt);

        // Projectiles
        for proj in self.projectiles.values_mut() {
            proj.update(dt, world);
        }
        self.projectiles.retain(|_, p| p.alive);

        self.update_mobs(dt);

        // Asteroids
        for ast in self.asteroids.values_mut() {
            ast.update(dt, world);
        }
        self.asteroids.retain(|_, a| a.alive);

        // Pickups
        for pk in self.pickups.values_mut() {
            pk.update(dt);
        }
        self.pickups.retain(|_, p| p.alive);

        // Broad-phase index, then all collision passes in fixed order
        self.build_spatial_grid();
        self.check_projectile_player_collisions();
        self.check_player_player_collisions();
        self.check_mob_mob_collisions();
        self.check_projectile_mob_collisions();
        self.check_asteroid_player_collisions();
        self.check_asteroid_mob_collisions();
        self.check_projectile_asteroid_collisions();
        self.check_player_pickup_collisions();
        self.check_player_mob_collisions();
        self.check_homing_missile_collisions();

        self.spawn_entities(dt);

        if self.tick % tick::BROADCAST_EVERY == 0 {
            self.broadcast_state();
        }
    }

    /// Class-based firing for every player whose trigger and cooldown allow
    fn fire_player_weapons(&mut self) {
        let firing: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| p.can_fire())
            .map(|p| p.id.clone())
            .collect();

        for pid in firing {
            if self.projectiles.len() >= limits::MAX_PROJECTILES {
                break;
            }
            let Some(player) = self.players.get(&pid) else {
                continue;
            };
            let def = player.class.def();

            let mut volley = Vec::with_capacity(def.proj_count as usize);
            if def.proj_count <= 1 {
                let id = generate_id(&mut self.rng, 3);
                volley.push(Projectile::from_player(id, player, 0.0));
            } else {
                // Spread volley fanned around the nose
                let half = def.proj_spread / 2.0;
                let step = def.proj_spread / (def.proj_count - 1) as f32;
                for i in 0..def.proj_count {
                    if self.projectiles.len() + volley.len() >= limits::MAX_PROJECTILES {
                        break;
                    }
                    let offset = -half + step * i as f32;
                    let id = generate_id(&mut self.rng, 3);
                    volley.push(Projectile::from_player(id, player, offset));
                }
            }

            for proj in volley {
                self.projectiles.insert(proj.id.clone(), proj);
            }
            if let Some(p) = self.players.get_mut(&pid) {
                p.fire_cooldown = def.fire_cooldown;
            }
        }
    }

    /// The ability button stays latched until the ability is actually usable
    fn activate_pressed_abilities(&mut self) {
        let pressed: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| p.ability_pressed && p.alive && p.ability.can_activate())
            .map(|p| p.id.clone())
            .collect();
        for pid in pressed {
            self.activate_ability(&pid);
            if let Some(p) = self.players.get_mut(&pid) {
                p.ability_pressed = false;
            }
        }
    }

    fn activate_ability(&mut self, player_id: &str) {
        let world = self.world();
        let Some(p) = self.players.get_mut(player_id) else {
            return;
        };
        if !p.ability.activate() {
            return;
        }
        let kind = p.ability.kind;
        let (pos, rotation, team) = (p.pos, p.rotation, p.team);

        match kind {
            AbilityType::MissileBarrage => {
                use crate::game::constants::ability::*;
                for i in 0..MISSILE_BARRAGE_COUNT {
                    let offset =
                        (i as f32 - (MISSILE_BARRAGE_COUNT - 1) as f32 / 2.0) * MISSILE_BARRAGE_SPREAD;
                    let heading = rotation + offset;
                    let id = generate_id(&mut self.rng, 4);
                    let hm = HomingProjectile::new(
                        id.clone(),
                        pos + Vec2::from_angle(rotation) * proj_c::OFFSET,
                        heading,
                        player_id.to_string(),
                    );
                    self.homing_missiles.insert(id, hm);
                }
            }
            AbilityType::Shield => {
                // Passive: absorption happens inside Player::take_damage
            }
            AbilityType::Blink => {
                use crate::game::constants::ability::BLINK_DISTANCE;
                if let Some(p) = self.players.get_mut(player_id) {
                    p.pos = world.wrap(pos + Vec2::from_angle(rotation) * BLINK_DISTANCE);
                }
            }
            AbilityType::HealAura => {
                let id = generate_id(&mut self.rng, 4);
                let hz = HealZone::new(id.clone(), pos, player_id.to_string(), team);
                self.heal_zones.insert(id, hz);
            }
        }

        let name = match kind {
            AbilityType::MissileBarrage => "missile_barrage",
            AbilityType::Shield => "shield",
            AbilityType::Blink => "blink",
            AbilityType::HealAura => "heal_aura",
        };
        self.broadcast_msg(&ServerMessage::AbilityActivated {
            pid: player_id.to_string(),
            ability: name.to_string(),
        });
    }

    fn update_heal_zones(&mut self, dt: f32) {
        let mut expired = Vec::new();
        for (id, hz) in self.heal_zones.iter_mut() {
            if !hz.update(dt) {
                expired.push(id.clone());
                continue;
            }
            // Heal the owner and teammates in radius
            for p in self.players.values_mut() {
                if !p.alive || p.hp >= p.max_hp {
                    continue;
                }
                if p.id != hz.owner_id && (hz.team == Team::None || p.team != hz.team) {
                    continue;
                }
                if p.pos.distance_sq_to(hz.pos) <= hz.radius * hz.radius {
                    let heal = ((hz.rate * dt) as i32).max(1);
                    p.hp = (p.hp + heal).min(p.max_hp);
                }
            }
        }
        for id in expired {
            self.heal_zones.remove(&id);
        }
    }

    fn update_mobs(&mut self, dt: f32) {
        let world = self.world();
        let mut phrases: Vec<(EntityId, &'static str)> = Vec::new();
        let mut shooters: Vec<EntityId> = Vec::new();

        for (id, mob) in self.mobs.iter_mut() {
            let want_fire = mob.update(dt, &self.players, &self.projectiles, world, &mut self.rng);
            if let Some(phrase) = mob.pending_phrase.take() {
                phrases.push((id.clone(), phrase));
            }
            if want_fire {
                shooters.push(id.clone());
            }
        }
        self.mobs.retain(|_, m| m.alive);

        for (mob_id, text) in phrases {
            self.broadcast_msg(&ServerMessage::MobSay {
                mob_id,
                text: text.to_string(),
            });
        }
        for mob_id in shooters {
            if self.projectiles.len() >= limits::MAX_PROJECTILES {
                break;
            }
            if let Some(mob) = self.mobs.get(&mob_id) {
                let id = generate_id(&mut self.rng, 3);
                let proj = Projectile::from_mob(id.clone(), mob);
                self.projectiles.insert(id, proj);
            }
        }
    }

    // ========================================================================
    // Match phase transitions
    // ========================================================================

    fn check_all_ready(&self) -> bool {
        let count = self.players.len();
        if count == 0 {
            return false;
        }
        // Team modes need someone to shoot at
        if self.is_team_mode() && count < 2 {
            return false;
        }
        self.players.values().all(|p| p.ready)
    }

    fn start_countdown(&mut self) {
        self.match_state.phase = MatchPhase::Countdown;
        self.match_state.countdown = limits::COUNTDOWN_DURATION;

        let msg = phase_message(
            MatchPhase::Countdown,
            self.mode() as u8,
            Some(limits::COUNTDOWN_DURATION),
            None,
        );
        self.broadcast_msg(&msg);
    }

    fn start_match(&mut self) {
        self.match_state.phase = MatchPhase::Playing;
        self.match_state.time_left = self.match_state.config.time_limit;
        self.match_state.team_mut(Team::Red).score = 0;
        self.match_state.team_mut(Team::Blue).score = 0;

        // Reset stats and place everyone at team spawns
        let ids: Vec<PlayerId> = self.players.keys().cloned().collect();
        for id in ids {
            let team = self.players.get(&id).map(|p| p.team).unwrap_or(Team::None);
            let spawn = self.match_state.spawn_position(team, &mut self.rng);
            if let Some(p) = self.players.get_mut(&id) {
                p.kills = 0;
                p.deaths = 0;
                p.assists = 0;
                p.damage_dealt = 0;
                p.score = 0;
                p.clear_damagers();
                p.spawn_at(spawn);
            }
        }

        self.clear_entities();

        let msg = phase_message(
            MatchPhase::Playing,
            self.mode() as u8,
            None,
            Some(self.match_state.time_left),
        );
        self.broadcast_msg(&msg);
    }

    fn end_match(&mut self) {
        self.match_state.phase = MatchPhase::Result;
        self.match_state.result_timer = limits::RESULT_DURATION;

        let duration = self.match_state.config.time_limit - self.match_state.time_left;

        // Per-player results with the MVP marked
        let mut results: Vec<PlayerMatchResult> = self
            .players
            .values()
            .map(|p| PlayerMatchResult {
                id: p.id.clone(),
                name: p.name.clone(),
                team: p.team as u8,
                kills: p.kills,
                deaths: p.deaths,
                assists: p.assists,
                score: p.score,
                mvp: false,
            })
            .collect();
        if let Some(mvp_idx) = results
            .iter()
            .enumerate()
            .max_by_key(|(_, r)| r.kills)
            .map(|(i, _)| i)
        {
            results[mvp_idx].mvp = true;
        }

        let winner = if self.is_team_mode() {
            let red = self.match_state.team(Team::Red).score;
            let blue = self.match_state.team(Team::Blue).score;
            if red > blue {
                Team::Red
            } else if blue > red {
                Team::Blue
            } else {
                Team::None
            }
        } else {
            // FFA has no team winner; the MVP flag carries the honors
            Team::None
        };

        let result_msg = MatchResultMsg {
            winner_team: winner as u8,
            players: results.clone(),
            duration,
        };
        self.broadcast_msg(&ServerMessage::MatchResult(result_msg));
        let msg = phase_message(MatchPhase::Result, self.mode() as u8, None, None);
        self.broadcast_msg(&msg);

        self.persist_match_results(duration, winner, results);
    }

    /// Hand the finished match to the persistence collaborator off the tick
    /// path. Failures are logged and swallowed; the match goes on.
    fn persist_match_results(
        &self,
        duration: f32,
        winner: Team,
        results: Vec<PlayerMatchResult>,
    ) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let mode = self.mode();

        // Snapshot everything the task needs; the Game lock is not held there
        let lines: Vec<(PlayerMatchResult, i64, Team, Option<Arc<dyn Broadcaster>>)> = results
            .into_iter()
            .filter_map(|r| {
                let p = self.players.get(&r.id)?;
                if p.auth_id == 0 {
                    return None; // guests are not persisted
                }
                let client = self.clients.get(&r.id).cloned();
                Some((r, p.auth_id, p.team, client))
            })
            .collect();

        let task = move || {
            let match_id = match store.record_match(mode, duration, winner) {
                Ok(id) => id,
                Err(e) => {
                    warn!("store: failed to record match: {e}");
                    return;
                }
            };

            for (r, auth_id, team, client) in lines {
                let prev_level = store
                    .get_stats(auth_id)
                    .ok()
                    .flatten()
                    .map(|s| s.level)
                    .unwrap_or(1);

                let won = (winner != Team::None && team == winner)
                    || (winner == Team::None && r.mvp);
                let xp = store::match_xp(r.kills, r.assists, won);

                if let Err(e) = store.record_match_player(
                    match_id, auth_id, team, r.kills, r.deaths, r.assists, r.score, xp,
                ) {
                    warn!("store: failed to record match player: {e}");
                }
                let (total_xp, level) = match store.update_stats_after_match(
                    auth_id, r.kills, r.deaths, r.assists, won, duration, xp,
                ) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("store: failed to update stats: {e}");
                        continue;
                    }
                };

                if let Some(client) = &client {
                    client.send_message(&ServerMessage::XpUpdate(XpUpdateMsg {
                        xp_gained: xp,
                        total_xp,
                        level,
                        prev_level,
                        xp_next: store::xp_to_next_level(level),
                        leveled_up: level > prev_level,
                    }));
                }

                for ach in store::check_achievements(&*store, auth_id, r.kills, r.deaths, won) {
                    if let Some(client) = &client {
                        client.send_message(&ServerMessage::AchievementUnlock {
                            id: ach.id.to_string(),
                            name: ach.name.to_string(),
                            description: ach.description.to_string(),
                        });
                    }
                }
            }
        };

        // Never block the tick path on storage
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(task);
            }
            Err(_) => task(),
        }
    }

    fn reset_to_lobby(&mut self) {
        self.match_state.phase = MatchPhase::Lobby;
        self.match_state.time_left = 0.0;
        self.match_state.countdown = 0.0;
        self.match_state.result_timer = 0.0;
        self.match_state.team_mut(Team::Red).score = 0;
        self.match_state.team_mut(Team::Blue).score = 0;

        let world = self.world();
        for p in self.players.values_mut() {
            p.ready = false;
            p.kills = 0;
            p.deaths = 0;
            p.assists = 0;
            p.damage_dealt = 0;
            p.score = 0;
            p.clear_damagers();
            p.respawn(world, &mut self.rng);
            p.spawn_protection = 0.0;
        }

        self.clear_entities();

        let msg = phase_message(MatchPhase::Lobby, self.mode() as u8, None, None);
        self.broadcast_msg(&msg);
    }

    fn clear_entities(&mut self) {
        self.projectiles.clear();
        self.mobs.clear();
        self.asteroids.clear();
        self.pickups.clear();
        self.homing_missiles.clear();
        self.heal_zones.clear();
        self.mob_spawn_cd = limits::MOB_SPAWN_INTERVAL;
        self.asteroid_spawn_cd = limits::ASTEROID_SPAWN_INTERVAL;
        self.pickup_spawn_cd = limits::PICKUP_SPAWN_INTERVAL;
    }

    fn check_score_limit(&self) -> bool {
        let limit = self.match_state.config.score_limit;
        if limit <= 0 {
            return false;
        }
        if self.is_team_mode() {
            self.match_state.team(Team::Red).score >= limit
                || self.match_state.team(Team::Blue).score >= limit
        } else {
            self.players.values().any(|p| p.score >= limit)
        }
    }

    // ========================================================================
    // Spawning
    // ========================================================================

    fn spawn_entities(&mut self, dt: f32) {
        // An empty arena stays empty
        if self.players.is_empty() {
            return;
        }
        let world = self.world();

        self.mob_spawn_cd -= dt;
        if self.mob_spawn_cd <= 0.0 && self.mobs.len() < limits::MAX_MOBS {
            let mob = Mob::spawn(&mut self.rng, world);
            self.mobs.insert(mob.id.clone(), mob);
            // Refill quickly until the population is back at the cap
            self.mob_spawn_cd = if self.mobs.len() < limits::MAX_MOBS {
                limits::MOB_REFILL_INTERVAL
            } else {
                limits::MOB_SPAWN_INTERVAL
            };
        }

        self.asteroid_spawn_cd -= dt;
        if self.asteroid_spawn_cd <= 0.0 && self.asteroids.len() < limits::MAX_ASTEROIDS {
            let ast = Asteroid::spawn(&mut self.rng, world);
            self.asteroids.insert(ast.id.clone(), ast);
            self.asteroid_spawn_cd = limits::ASTEROID_SPAWN_INTERVAL;
        }

        self.pickup_spawn_cd -= dt;
        if self.pickup_spawn_cd <= 0.0 && self.pickups.len() < limits::MAX_PICKUPS {
            let pk = Pickup::spawn(&mut self.rng, world);
            self.pickups.insert(pk.id.clone(), pk);
            self.pickup_spawn_cd = limits::PICKUP_SPAWN_INTERVAL;
        }
    }

    // ========================================================================
    // Collision passes
    // ========================================================================

    fn build_spatial_grid(&mut self) {
        self.grid.clear();

        self.flat_players.clear();
        for p in self.players.values() {
            if p.alive {
                let idx = self.flat_players.len();
                self.flat_players.push(p.id.clone());
                self.grid.insert_circle(
                    p.pos.x,
                    p.pos.y,
                    p.radius(),
                    EntityRef { kind: EntityKind::Player, idx },
                );
            }
        }

        self.flat_projectiles.clear();
        for proj in self.projectiles.values() {
            if proj.alive {
                let idx = self.flat_projectiles.len();
                self.flat_projectiles.push(proj.id.clone());
                self.grid.insert(
                    proj.pos.x,
                    proj.pos.y,
                    EntityRef { kind: EntityKind::Projectile, idx },
                );
            }
        }

        self.flat_mobs.clear();
        for mob in self.mobs.values() {
            if mob.alive {
                let idx = self.flat_mobs.len();
                self.flat_mobs.push(mob.id.clone());
                self.grid.insert_circle(
                    mob.pos.x,
                    mob.pos.y,
                    mob.radius(),
                    EntityRef { kind: EntityKind::Mob, idx },
                );
            }
        }

        self.flat_asteroids.clear();
        for ast in self.asteroids.values() {
            if ast.alive {
                let idx = self.flat_asteroids.len();
                self.flat_asteroids.push(ast.id.clone());
                self.grid.insert_circle(
                    ast.pos.x,
                    ast.pos.y,
                    crate::game::constants::asteroid::RADIUS,
                    EntityRef { kind: EntityKind::Asteroid, idx },
                );
            }
        }

        self.flat_pickups.clear();
        for pk in self.pickups.values() {
            if pk.alive {
                let idx = self.flat_pickups.len();
                self.flat_pickups.push(pk.id.clone());
                self.grid.insert_circle(
                    pk.pos.x,
                    pk.pos.y,
                    crate::game::constants::pickup::RADIUS,
                    EntityRef { kind: EntityKind::Pickup, idx },
                );
            }
        }
    }

    /// Are these two players on the same (non-neutral) team?
    fn same_team(&self, a: &str, b: &str) -> bool {
        if !self.is_team_mode() {
            return false;
        }
        let ta = self.players.get(a).map(|p| p.team);
        let tb = self.players.get(b).map(|p| p.team);
        matches!((ta, tb), (Some(x), Some(y)) if x == y && x != Team::None)
    }

    /// Record damage on a player, broadcast the hit, and report death
    fn damage_player(&mut self, victim_id: &str, attacker_id: &str, dmg: i32) -> bool {
        let now = self.game_time;
        let (died, hit_pos) = {
            let Some(victim) = self.players.get_mut(victim_id) else {
                return false;
            };
            victim.record_damage(attacker_id, now);
            (victim.take_damage(dmg), victim.pos)
        };
        if attacker_id != victim_id {
            if let Some(attacker) = self.players.get_mut(attacker_id) {
                attacker.damage_dealt += dmg;
            }
        }
        self.broadcast_msg(&ServerMessage::Hit(HitMsg {
            x: round1(hit_pos.x),
            y: round1(hit_pos.y),
            damage: dmg,
            victim_id: victim_id.to_string(),
            attacker_id: attacker_id.to_string(),
        }));
        died
    }

    fn player_name(&self, id: &str) -> String {
        self.players
            .get(id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Kill bookkeeping after a player death: scoring, assists, events.
    /// The killer may be a player, a mob, or the environment.
    fn on_player_killed(&mut self, victim_id: &str, killer_id: &str, killer_label: &str) {
        if let Some(v) = self.players.get_mut(victim_id) {
            v.score -= limits::DEATH_SCORE_PENALTY;
        }
        let victim_name = self.player_name(victim_id);
        let now = self.game_time;

        let killer_name;
        if self.players.contains_key(killer_id) {
            // Player kill: score, team score, assists
            let assist_ids = self
                .players
                .get(victim_id)
                .map(|v| v.assist_ids(killer_id, now))
                .unwrap_or_default();

            let mut killer_team = Team::None;
            if let Some(killer) = self.players.get_mut(killer_id) {
                killer.score += 1;
                killer.kills += 1;
                killer_team = killer.team;
            }
            if self.is_team_mode() && killer_team != Team::None {
                self.match_state.team_mut(killer_team).score += 1;
            }
            for aid in assist_ids {
                if let Some(a) = self.players.get_mut(&aid) {
                    a.assists += 1;
                }
            }
            killer_name = self.player_name(killer_id);
        } else {
            // Mob or environment kill; a surviving mob gloats
            if let Some(mob) = self.mobs.get(killer_id) {
                if mob.alive {
                    let phrase = chatter::pick(&mut self.rng, chatter::KILL_PLAYER);
                    self.broadcast_msg(&ServerMessage::MobSay {
                        mob_id: killer_id.to_string(),
                        text: phrase.to_string(),
                    });
                }
            }
            killer_name = killer_label.to_string();
        }

        self.broadcast_msg(&ServerMessage::Kill(KillMsg {
            killer_id: killer_id.to_string(),
            killer_name: killer_name.clone(),
            victim_id: victim_id.to_string(),
            victim_name,
        }));
        self.send_to(
            victim_id,
            &ServerMessage::Death(DeathMsg {
                killer_id: killer_id.to_string(),
                killer_name,
            }),
        );
    }

    fn check_projectile_player_collisions(&mut self) {
        let world = self.world();
        let query_r = proj_c::RADIUS + player_c::MAX_RADIUS;

        for pi in 0..self.flat_projectiles.len() {
            let proj_id = self.flat_projectiles[pi].clone();
            let (ppos, owner_id, dmg) = match self.projectiles.get(&proj_id) {
                Some(p) if p.alive => (p.pos, p.owner_id.clone(), p.damage),
                _ => continue,
            };

            let mut buf = std::mem::take(&mut self.query_buf);
            buf.clear();
            self.grid.query_into(ppos.x, ppos.y, query_r, &mut buf);

            for r in &buf {
                if r.kind != EntityKind::Player {
                    continue;
                }
                let target_id = self.flat_players[r.idx].clone();
                let (tpos, tradius) = match self.players.get(&target_id) {
                    Some(t) if t.alive && t.spawn_protection <= 0.0 => (t.pos, t.radius()),
                    _ => continue,
                };
                if target_id == owner_id || self.same_team(&owner_id, &target_id) {
                    continue;
                }
                if !circles_collide_wrapped(
                    ppos.x, ppos.y, proj_c::RADIUS, tpos.x, tpos.y, tradius, world.w, world.h,
                ) {
                    continue;
                }

                if let Some(p) = self.projectiles.get_mut(&proj_id) {
                    p.alive = false;
                }
                let died = self.damage_player(&target_id, &owner_id, dmg);
                if died {
                    self.on_player_killed(&target_id, &owner_id, "Mob");
                }
                break;
            }

            self.query_buf = buf;
        }
    }

    /// Mutual ship-vs-ship collisions kill both instantly
    fn check_player_player_collisions(&mut self) {
        let world = self.world();
        for i in 0..self.flat_players.len() {
            for j in (i + 1)..self.flat_players.len() {
                let a_id = self.flat_players[i].clone();
                let b_id = self.flat_players[j].clone();

                let (a_pos, a_r, a_hp) = match self.players.get(&a_id) {
                    Some(p) if p.alive && p.spawn_protection <= 0.0 => (p.pos, p.radius(), p.hp),
                    _ => continue,
                };
                let (b_pos, b_r, b_hp) = match self.players.get(&b_id) {
                    Some(p) if p.alive && p.spawn_protection <= 0.0 => (p.pos, p.radius(), p.hp),
                    _ => continue,
                };
                if self.same_team(&a_id, &b_id) {
                    continue;
                }
                if !circles_collide_wrapped(
                    a_pos.x, a_pos.y, a_r, b_pos.x, b_pos.y, b_r, world.w, world.h,
                ) {
                    continue;
                }

                // Damage equal to current HP: both die
                let a_died = self
                    .players
                    .get_mut(&a_id)
                    .map(|p| p.take_damage(a_hp))
                    .unwrap_or(false);
                let b_died = self
                    .players
                    .get_mut(&b_id)
                    .map(|p| p.take_damage(b_hp))
                    .unwrap_or(false);
                if a_died {
                    self.on_player_killed(&a_id, &b_id, "Unknown");
                }
                if b_died {
                    self.on_player_killed(&b_id, &a_id, "Unknown");
                }
            }
        }
    }

    /// Soft repulsion when overlapping slowly; mutual destruction when the
    /// closing speed exceeds the explosion threshold
    fn check_mob_mob_collisions(&mut self) {
        use crate::game::constants::mob as mob_c;

        for i in 0..self.flat_mobs.len() {
            for j in (i + 1)..self.flat_mobs.len() {
                let a_id = self.flat_mobs[i].clone();
                let b_id = self.flat_mobs[j].clone();

                let (a_pos, a_vel, a_r, a_alive) = match self.mobs.get(&a_id) {
                    Some(m) => (m.pos, m.vel, m.radius(), m.alive),
                    None => continue,
                };
                let (b_pos, b_vel, b_r, b_alive) = match self.mobs.get(&b_id) {
                    Some(m) => (m.pos, m.vel, m.radius(), m.alive),
                    None => continue,
                };
                if !a_alive || !b_alive {
                    continue;
                }

                let delta = b_pos - a_pos;
                let dist = delta.length();
                let repel_dist = a_r + b_r + mob_c::REPEL_MARGIN;
                if dist >= repel_dist || dist <= 0.1 {
                    continue;
                }

                let rel_v = (a_vel - b_vel).length();
                if rel_v > mob_c::EXPLODE_REL_V {
                    // Head-on crash: both explode with a parting word
                    for id in [&a_id, &b_id] {
                        let phrase = chatter::pick(&mut self.rng, chatter::CRASH);
                        self.broadcast_msg(&ServerMessage::MobSay {
                            mob_id: id.to_string(),
                            text: phrase.to_string(),
                        });
                    }
                    if let Some(m) = self.mobs.get_mut(&a_id) {
                        m.alive = false;
                    }
                    if let Some(m) = self.mobs.get_mut(&b_id) {
                        m.alive = false;
                    }
                    for (killer, victim) in [(&a_id, &b_id), (&b_id, &a_id)] {
                        self.broadcast_msg(&ServerMessage::Kill(KillMsg {
                            killer_id: killer.to_string(),
                            killer_name: "Mob".to_string(),
                            victim_id: victim.to_string(),
                            victim_name: "Mob".to_string(),
                        }));
                    }
                    continue;
                }

                // Gentle nudge apart
                let n = delta * (1.0 / dist);
                let force = mob_c::REPEL_FORCE * (1.0 - dist / repel_dist) * tick::DT;
                if let Some(m) = self.mobs.get_mut(&a_id) {
                    m.vel -= n * force;
                }
                if let Some(m) = self.mobs.get_mut(&b_id) {
                    m.vel += n * force;
                }
            }
        }
        self.mobs.retain(|_, m| m.alive);
        // The flat list may now hold dead ids; later passes re-check liveness
    }

    fn check_projectile_mob_collisions(&mut self) {
        use crate::game::constants::mob as mob_c;
        let query_r = proj_c::RADIUS + mob_c::MAX_RADIUS;

        for pi in 0..self.flat_projectiles.len() {
            let proj_id = self.flat_projectiles[pi].clone();
            let (ppos, owner_id, dmg) = match self.projectiles.get(&proj_id) {
                Some(p) if p.alive => (p.pos, p.owner_id.clone(), p.damage),
                _ => continue,
            };

            let mut buf = std::mem::take(&mut self.query_buf);
            buf.clear();
            self.grid.query_into(ppos.x, ppos.y, query_r, &mut buf);

            for r in &buf {
                if r.kind != EntityKind::Mob {
                    continue;
                }
                let mob_id = self.flat_mobs[r.idx].clone();
                let hit = match self.mobs.get(&mob_id) {
                    Some(m) if m.alive && m.id != owner_id => {
                        m.hitbox.hits_circle(m.pos, m.rotation, ppos, proj_c::RADIUS)
                    }
                    _ => false,
                };
                if !hit {
                    continue;
                }

                if let Some(p) = self.projectiles.get_mut(&proj_id) {
                    p.alive = false;
                }
                let (died, mob_pos) = match self.mobs.get_mut(&mob_id) {
                    Some(m) => (m.take_damage(dmg, &mut self.rng), m.pos),
                    None => continue,
                };
                self.broadcast_msg(&ServerMessage::Hit(HitMsg {
                    x: round1(mob_pos.x),
                    y: round1(mob_pos.y),
                    damage: dmg,
                    victim_id: mob_id.clone(),
                    attacker_id: owner_id.clone(),
                }));

                if died {
                    if let Some(killer) = self.players.get_mut(&owner_id) {
                        killer.score += limits::MOB_KILL_SCORE;
                    }
                    let mut killer_name = self.player_name(&owner_id);
                    if killer_name == "Unknown" {
                        killer_name = "Mob".to_string();
                    }
                    self.broadcast_msg(&ServerMessage::Kill(KillMsg {
                        killer_id: owner_id.clone(),
                        killer_name,
                        victim_id: mob_id.clone(),
                        victim_name: "Mob".to_string(),
                    }));
                    self.mobs.remove(&mob_id);
                }
                break;
            }

            self.query_buf = buf;
        }
    }

    /// Asteroid contact strips the victim's full current HP (always lethal),
    /// and the asteroid sails on unharmed
    fn check_asteroid_player_collisions(&mut self) {
        use crate::game::constants::asteroid as ast_c;
        let query_r = ast_c::RADIUS + player_c::MAX_RADIUS;

        for ai in 0..self.flat_asteroids.len() {
            let ast_id = self.flat_asteroids[ai].clone();
            let apos = match self.asteroids.get(&ast_id) {
                Some(a) if a.alive => a.pos,
                _ => continue,
            };

            let mut buf = std::mem::take(&mut self.query_buf);
            buf.clear();
            self.grid.query_into(apos.x, apos.y, query_r, &mut buf);

            for r in &buf {
                if r.kind != EntityKind::Player {
                    continue;
                }
                let pid = self.flat_players[r.idx].clone();
                let (ppos, pradius, php) = match self.players.get(&pid) {
                    Some(p) if p.alive && p.spawn_protection <= 0.0 => (p.pos, p.radius(), p.hp),
                    _ => continue,
                };
                if !crate::game::collision::circles_collide(
                    apos.x, apos.y, ast_c::RADIUS, ppos.x, ppos.y, pradius,
                ) {
                    continue;
                }

                let died = self.damage_player(&pid, "asteroid", php);
                if died {
                    self.on_player_killed(&pid, "asteroid", "Asteroid");
                }
            }

            self.query_buf = buf;
        }
    }

    fn check_asteroid_mob_collisions(&mut self) {
        use crate::game::constants::{asteroid as ast_c, mob as mob_c};
        let query_r = ast_c::RADIUS + mob_c::MAX_RADIUS;

        for ai in 0..self.flat_asteroids.len() {
            let ast_id = self.flat_asteroids[ai].clone();
            let apos = match self.asteroids.get(&ast_id) {
                Some(a) if a.alive => a.pos,
                _ => continue,
            };

            let mut buf = std::mem::take(&mut self.query_buf);
            buf.clear();
            self.grid.query_into(apos.x, apos.y, query_r, &mut buf);

            for r in &buf {
                if r.kind != EntityKind::Mob {
                    continue;
                }
                let mob_id = self.flat_mobs[r.idx].clone();
                let hit = match self.mobs.get(&mob_id) {
                    Some(m) if m.alive => {
                        m.hitbox.hits_circle(m.pos, m.rotation, apos, ast_c::RADIUS)
                    }
                    _ => false,
                };
                if !hit {
                    continue;
                }

                // A last word on the way out
                let phrase = chatter::pick(&mut self.rng, chatter::ASTEROID_DEATH);
                self.broadcast_msg(&ServerMessage::MobSay {
                    mob_id: mob_id.clone(),
                    text: phrase.to_string(),
                });
                self.mobs.remove(&mob_id);
                self.broadcast_msg(&ServerMessage::Kill(KillMsg {
                    killer_id: "asteroid".to_string(),
                    killer_name: "Asteroid".to_string(),
                    victim_id: mob_id,
                    victim_name: "Mob".to_string(),
                }));
            }

            self.query_buf = buf;
        }
    }

    fn check_projectile_asteroid_collisions(&mut self) {
        use crate::game::constants::asteroid as ast_c;
        let query_r = proj_c::RADIUS + ast_c::RADIUS;

        for pi in 0..self.flat_projectiles.len() {
            let proj_id = self.flat_projectiles[pi].clone();
            let ppos = match self.projectiles.get(&proj_id) {
                Some(p) if p.alive => p.pos,
                _ => continue,
            };

            let mut buf = std::mem::take(&mut self.query_buf);
            buf.clear();
            self.grid.query_into(ppos.x, ppos.y, query_r, &mut buf);

            for r in &buf {
                if r.kind != EntityKind::Asteroid {
                    continue;
                }
                let ast_id = self.flat_asteroids[r.idx].clone();
                let hit = match self.asteroids.get(&ast_id) {
                    Some(a) if a.alive => crate::game::collision::circles_collide(
                        ppos.x,
                        ppos.y,
                        proj_c::RADIUS,
                        a.pos.x,
                        a.pos.y,
                        ast_c::RADIUS,
                    ),
                    _ => false,
                };
                if hit {
                    if let Some(p) = self.projectiles.get_mut(&proj_id) {
                        p.alive = false;
                    }
                    break;
                }
            }

            self.query_buf = buf;
        }
    }

    fn check_player_pickup_collisions(&mut self) {
        use crate::game::constants::pickup as pk_c;
        let query_r = pk_c::RADIUS + player_c::MAX_RADIUS;

        for ki in 0..self.flat_pickups.len() {
            let pk_id = self.flat_pickups[ki].clone();
            let kpos = match self.pickups.get(&pk_id) {
                Some(k) if k.alive => k.pos,
                _ => continue,
            };

            let mut buf = std::mem::take(&mut self.query_buf);
            buf.clear();
            self.grid.query_into(kpos.x, kpos.y, query_r, &mut buf);

            for r in &buf {
                if r.kind != EntityKind::Player {
                    continue;
                }
                let pid = self.flat_players[r.idx].clone();
                let hit = match self.players.get(&pid) {
                    Some(p) if p.alive => crate::game::collision::circles_collide(
                        kpos.x,
                        kpos.y,
                        pk_c::RADIUS,
                        p.pos.x,
                        p.pos.y,
                        p.radius(),
                    ),
                    _ => false,
                };
                if hit {
                    self.pickups.remove(&pk_id);
                    if let Some(p) = self.players.get_mut(&pid) {
                        p.hp = (p.hp + pk_c::HEAL).min(p.max_hp);
                    }
                    break;
                }
            }

            self.query_buf = buf;
        }
    }

    /// Ramming a mob destroys it and hurts the player; the player still
    /// banks the kill
    fn check_player_mob_collisions(&mut self) {
        let world = self.world();

        for mi in 0..self.flat_mobs.len() {
            let mob_id = self.flat_mobs[mi].clone();
            let (mpos, mradius) = match self.mobs.get(&mob_id) {
                Some(m) if m.alive => (m.pos, m.radius()),
                _ => continue,
            };
            let query_r = mradius + player_c::MAX_RADIUS;

            let mut buf = std::mem::take(&mut self.query_buf);
            buf.clear();
            self.grid.query_into(mpos.x, mpos.y, query_r, &mut buf);

            for r in &buf {
                if r.kind != EntityKind::Player {
                    continue;
                }
                let pid = self.flat_players[r.idx].clone();
                let (ppos, pradius) = match self.players.get(&pid) {
                    Some(p) if p.alive && p.spawn_protection <= 0.0 => (p.pos, p.radius()),
                    _ => continue,
                };
                let hit = match self.mobs.get(&mob_id) {
                    Some(m) if m.alive => {
                        // Wrap-aware coarse gate, exact hull test after
                        circles_collide_wrapped(
                            mpos.x, mpos.y, mradius, ppos.x, ppos.y, pradius, world.w, world.h,
                        ) && m.hitbox.hits_circle(m.pos, m.rotation, ppos, pradius)
                    }
                    _ => false,
                };
                if !hit {
                    continue;
                }

                let collision_dmg = self
                    .mobs
                    .get(&mob_id)
                    .map(|m| m.collision_damage)
                    .unwrap_or(0);
                self.mobs.remove(&mob_id);

                let died = self.damage_player(&pid, &mob_id, collision_dmg);

                // Kill credit for the ram
                if let Some(p) = self.players.get_mut(&pid) {
                    p.score += limits::MOB_KILL_SCORE;
                }
                self.broadcast_msg(&ServerMessage::Kill(KillMsg {
                    killer_id: pid.clone(),
                    killer_name: self.player_name(&pid),
                    victim_id: mob_id.clone(),
                    victim_name: "Mob".to_string(),
                }));

                if died {
                    self.on_player_killed(&pid, &mob_id, "Mob");
                }
                break; // this mob is gone
            }

            self.query_buf = buf;
        }
    }

    fn check_homing_missile_collisions(&mut self) {
        let world = self.world();
        let missile_ids: Vec<EntityId> = self.homing_missiles.keys().cloned().collect();

        for hm_id in missile_ids {
            let (hpos, owner_id, dmg) = match self.homing_missiles.get(&hm_id) {
                Some(h) if h.alive => (h.pos, h.owner_id.clone(), h.damage),
                _ => continue,
            };

            // Players first
            let mut hit_player: Option<PlayerId> = None;
            for pid in &self.flat_players {
                let Some(p) = self.players.get(pid) else {
                    continue;
                };
                if !p.alive || p.id == owner_id || p.spawn_protection > 0.0 {
                    continue;
                }
                if self.is_team_mode() && self.same_team(&owner_id, pid) {
                    continue;
                }
                if circles_collide_wrapped(
                    hpos.x,
                    hpos.y,
                    proj_c::RADIUS,
                    p.pos.x,
                    p.pos.y,
                    p.radius(),
                    world.w,
                    world.h,
                ) {
                    hit_player = Some(pid.clone());
                    break;
                }
            }
            if let Some(pid) = hit_player {
                if let Some(h) = self.homing_missiles.get_mut(&hm_id) {
                    h.alive = false;
                }
                let died = self.damage_player(&pid, &owner_id, dmg);
                if died {
                    self.on_player_killed(&pid, &owner_id, "Unknown");
                }
                continue;
            }

            // Then mobs
            let mut hit_mob: Option<EntityId> = None;
            for mid in &self.flat_mobs {
                let Some(m) = self.mobs.get(mid) else {
                    continue;
                };
                if m.alive && m.hitbox.hits_circle(m.pos, m.rotation, hpos, proj_c::RADIUS) {
                    hit_mob = Some(mid.clone());
                    break;
                }
            }
            if let Some(mid) = hit_mob {
                if let Some(h) = self.homing_missiles.get_mut(&hm_id) {
                    h.alive = false;
                }
                let (died, mob_pos) = match self.mobs.get_mut(&mid) {
                    Some(m) => (m.take_damage(dmg, &mut self.rng), m.pos),
                    None => continue,
                };
                self.broadcast_msg(&ServerMessage::Hit(HitMsg {
                    x: round1(mob_pos.x),
                    y: round1(mob_pos.y),
                    damage: dmg,
                    victim_id: mid.clone(),
                    attacker_id: owner_id.clone(),
                }));
                if died {
                    if let Some(owner) = self.players.get_mut(&owner_id) {
                        owner.score += limits::MOB_KILL_SCORE;
                    }
                    self.broadcast_msg(&ServerMessage::Kill(KillMsg {
                        killer_id: owner_id.clone(),
                        killer_name: self.player_name(&owner_id),
                        victim_id: mid.clone(),
                        victim_name: "Mob".to_string(),
                    }));
                    self.mobs.remove(&mid);
                }
            }
        }
        self.homing_missiles.retain(|_, h| h.alive);
    }

    // ========================================================================
    // Broadcast
    // ========================================================================

    /// Send one event to every client and controller in the session
    fn broadcast_msg(&self, msg: &ServerMessage) {
        let data = encode_message(msg);
        for client in self.clients.values() {
            client.send_raw(&data);
        }
        for client in self.controllers.values() {
            client.send_raw(&data);
        }
    }

    fn send_to(&self, player_id: &str, msg: &ServerMessage) {
        if let Some(client) = self.clients.get(player_id) {
            client.send_message(msg);
        }
    }

    fn broadcast_team_update(&self) {
        let mut red = Vec::new();
        let mut blue = Vec::new();
        for p in self.players.values() {
            let info = TeamPlayerInfo {
                id: p.id.clone(),
                name: p.name.clone(),
                ready: p.ready,
            };
            match p.team {
                Team::Red => red.push(info),
                Team::Blue => blue.push(info),
                Team::None => {}
            }
        }
        self.broadcast_msg(&ServerMessage::TeamUpdate { red, blue });
    }

    /// Suppress a velocity pair that barely changed since the last broadcast
    fn dedup_velocity(
        last_vel: &mut HashMap<String, (f32, f32)>,
        id: &str,
        vx: f32,
        vy: f32,
    ) -> (Option<f32>, Option<f32>) {
        let (prev_x, prev_y) = last_vel.get(id).copied().unwrap_or((0.0, 0.0));
        if (vx - prev_x).abs() < net::VEL_DELTA && (vy - prev_y).abs() < net::VEL_DELTA {
            (None, None)
        } else {
            last_vel.insert(id.to_string(), (vx, vy));
            (Some(round1(vx)), Some(round1(vy)))
        }
    }

    /// Build the 30 Hz snapshot and fan it out with per-client viewport
    /// culling. Controllers reuse their linked player's payload.
    fn broadcast_state(&mut self) {
        struct Entry<T> {
            snap: T,
            x: f32,
            y: f32,
        }

        // Convert every entity once, keeping raw positions for culling
        let mut players: Vec<Entry<PlayerSnapshot>> = Vec::with_capacity(self.players.len());
        for p in self.players.values() {
            let mut snap = PlayerSnapshot::from_player(p);
            let (vx, vy) = Self::dedup_velocity(&mut self.last_vel, &p.id, p.vel.x, p.vel.y);
            snap.vx = vx;
            snap.vy = vy;
            players.push(Entry { snap, x: p.pos.x, y: p.pos.y });
        }
        let mut mobs: Vec<Entry<MobSnapshot>> = Vec::with_capacity(self.mobs.len());
        for m in self.mobs.values() {
            if !m.alive {
                continue;
            }
            let mut snap = MobSnapshot::from_mob(m);
            let (vx, vy) = Self::dedup_velocity(&mut self.last_vel, &m.id, m.vel.x, m.vel.y);
            snap.vx = vx;
            snap.vy = vy;
            mobs.push(Entry { snap, x: m.pos.x, y: m.pos.y });
        }
        let projectiles: Vec<Entry<ProjectileSnapshot>> = self
            .projectiles
            .values()
            .map(|p| Entry {
                snap: ProjectileSnapshot::from_projectile(p),
                x: p.pos.x,
                y: p.pos.y,
            })
            .collect();
        let asteroids: Vec<Entry<AsteroidSnapshot>> = self
            .asteroids
            .values()
            .filter(|a| a.alive)
            .map(|a| Entry {
                snap: AsteroidSnapshot::from_asteroid(a),
                x: a.pos.x,
                y: a.pos.y,
            })
            .collect();
        let pickups: Vec<Entry<PickupSnapshot>> = self
            .pickups
            .values()
            .filter(|p| p.alive)
            .map(|p| Entry {
                snap: PickupSnapshot::from_pickup(p),
                x: p.pos.x,
                y: p.pos.y,
            })
            .collect();
        let heal_zones: Vec<HealZoneSnapshot> = self
            .heal_zones
            .values()
            .map(HealZoneSnapshot::from_heal_zone)
            .collect();

        // Drop stale delta-compression entries for removed entities
        let live: hashbrown::HashSet<&String> = self
            .players
            .keys()
            .chain(self.mobs.keys())
            .collect();
        self.last_vel.retain(|k, _| live.contains(k));

        let base = GameSnapshot {
            players: vec![],
            projectiles: vec![],
            mobs: vec![],
            asteroids: vec![],
            pickups: vec![],
            heal_zones,
            tick: self.tick,
            match_phase: self.match_state.phase as u8,
            time_left: round1(self.match_state.time_left),
            team_red_score: self.match_state.team(Team::Red).score,
            team_blue_score: self.match_state.team(Team::Blue).score,
        };

        let cull = |entries_x: f32, entries_y: f32, px: f32, py: f32| -> bool {
            (entries_x - px).abs() <= net::CULL_DIST && (entries_y - py).abs() <= net::CULL_DIST
        };

        // Per-client culled payloads, cached for controller reuse
        let mut payloads: HashMap<PlayerId, Vec<u8>> = HashMap::with_capacity(self.clients.len());
        for (player_id, client) in &self.clients {
            let Some(viewer) = self.players.get(player_id) else {
                continue;
            };
            let (px, py) = (viewer.pos.x, viewer.pos.y);

            let mut snapshot = base.clone();
            snapshot.players = players
                .iter()
                .filter(|e| cull(e.x, e.y, px, py))
                .map(|e| e.snap.clone())
                .collect();
            snapshot.projectiles = projectiles
                .iter()
                .filter(|e| cull(e.x, e.y, px, py))
                .map(|e| e.snap.clone())
                .collect();
            snapshot.mobs = mobs
                .iter()
                .filter(|e| cull(e.x, e.y, px, py))
                .map(|e| e.snap.clone())
                .collect();
            snapshot.asteroids = asteroids
                .iter()
                .filter(|e| cull(e.x, e.y, px, py))
                .map(|e| e.snap.clone())
                .collect();
            snapshot.pickups = pickups
                .iter()
                .filter(|e| cull(e.x, e.y, px, py))
                .map(|e| e.snap.clone())
                .collect();

            match encode_snapshot(&snapshot) {
                Ok(data) => {
                    client.send_binary(&data);
                    payloads.insert(player_id.clone(), data);
                }
                Err(e) => warn!("snapshot encode failed: {e}"),
            }
        }

        // Controllers ride along on their player's payload; detached ones
        // get the unfiltered scene
        let mut fallback: Option<Vec<u8>> = None;
        for (player_id, client) in &self.controllers {
            if let Some(data) = payloads.get(player_id) {
                client.send_binary(data);
                continue;
            }
            if fallback.is_none() {
                let mut snapshot = base.clone();
                snapshot.players = players.iter().map(|e| e.snap.clone()).collect();
                snapshot.projectiles = projectiles.iter().map(|e| e.snap.clone()).collect();
                snapshot.mobs = mobs.iter().map(|e| e.snap.clone()).collect();
                snapshot.asteroids = asteroids.iter().map(|e| e.snap.clone()).collect();
                snapshot.pickups = pickups.iter().map(|e| e.snap.clone()).collect();
                match encode_snapshot(&snapshot) {
                    Ok(data) => fallback = Some(data),
                    Err(e) => {
                        warn!("snapshot encode failed: {e}");
                        continue;
                    }
                }
            }
            if let Some(data) = &fallback {
                client.send_binary(data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::broadcaster::{ChannelClient, OutboundFrame};

    fn playing_game() -> Game {
        let mut game = Game::with_seed(MatchConfig::default(), 99);
        game.match_state_mut().phase = MatchPhase::Playing;
        game
    }

    fn drain_text(rx: &crossbeam_channel::Receiver<OutboundFrame>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let OutboundFrame::Text(data) = frame {
                out.push(serde_json::from_slice(&data).unwrap());
            }
        }
        out
    }

    #[test]
    fn test_add_remove_player() {
        let mut game = Game::with_seed(MatchConfig::default(), 1);
        let joined = game.add_player("TestPilot").unwrap();
        assert_eq!(game.player_count(), 1);
        assert_eq!(game.player(&joined.id).unwrap().name, "TestPilot");

        game.remove_player(&joined.id);
        assert_eq!(game.player_count(), 0);
    }

    #[test]
    fn test_player_capacity() {
        let mut game = Game::with_seed(MatchConfig::default(), 1);
        for i in 0..limits::MAX_PLAYERS {
            assert!(game.add_player(&format!("p{i}")).is_some());
        }
        assert!(game.add_player("overflow").is_none());
    }

    #[test]
    fn test_ship_class_rotation() {
        let mut game = Game::with_seed(MatchConfig::default(), 1);
        let classes: Vec<ShipClass> = (0..5)
            .map(|i| game.add_player(&format!("p{i}")).unwrap().ship)
            .collect();
        assert_eq!(classes[0], ShipClass::Fighter);
        assert_eq!(classes[1], ShipClass::Tank);
        assert_eq!(classes[2], ShipClass::Scout);
        assert_eq!(classes[3], ShipClass::Support);
        assert_eq!(classes[4], ShipClass::Fighter);
    }

    #[test]
    fn test_handle_input_updates_targeting() {
        let mut game = Game::with_seed(MatchConfig::default(), 1);
        let joined = game.add_player("P").unwrap();
        let pos = game.player(&joined.id).unwrap().pos;

        game.handle_input(
            &joined.id,
            &ClientInput {
                aim_x: pos.x + 100.0,
                aim_y: pos.y,
                fire: true,
                boost: true,
                ability: false,
                thresh: 9999.0,
            },
        );

        let p = game.player(&joined.id).unwrap();
        assert!(p.firing);
        assert!(p.boosting);
        // Threshold clamped into the accepted range
        assert_eq!(p.slow_threshold, player_c::SLOW_THRESH_MAX);
    }

    #[test]
    fn test_handle_input_ignores_near_aim_rotation() {
        let mut game = Game::with_seed(MatchConfig::default(), 1);
        let joined = game.add_player("P").unwrap();
        let pos = game.player(&joined.id).unwrap().pos;

        // Establish a known target rotation
        game.handle_input(
            &joined.id,
            &ClientInput {
                aim_x: pos.x + 100.0,
                aim_y: pos.y,
                ..Default::default()
            },
        );
        let r1 = game.player(&joined.id).unwrap().target_rotation;

        // Aim point within 5 units: heading unchanged
        game.handle_input(
            &joined.id,
            &ClientInput {
                aim_x: pos.x + 2.0,
                aim_y: pos.y + 2.0,
                ..Default::default()
            },
        );
        assert_eq!(game.player(&joined.id).unwrap().target_rotation, r1);
    }

    #[test]
    fn test_unknown_player_input_is_noop() {
        let mut game = Game::with_seed(MatchConfig::default(), 1);
        game.handle_input("ghost", &ClientInput::default());
        assert_eq!(game.player_count(), 0);
    }

    #[test]
    fn test_tick_counter_advances() {
        let mut game = playing_game();
        game.add_player("P").unwrap();
        for _ in 0..10 {
            game.update();
        }
        assert_eq!(game.tick_count(), 10);
    }

    #[test]
    fn test_always_firing_player_spawns_projectiles() {
        let mut game = playing_game();
        let joined = game.add_player("Shooter").unwrap();
        {
            let p = game.player_mut(&joined.id).unwrap();
            p.firing = true;
            p.fire_cooldown = 0.0;
        }

        game.update();
        assert_eq!(game.projectile_count(), 1);
    }

    #[test]
    fn test_tank_fires_spread_volley() {
        let mut game = playing_game();
        game.add_player("A").unwrap(); // Fighter
        let tank = game.add_player("B").unwrap(); // Tank
        assert_eq!(tank.ship, ShipClass::Tank);
        {
            let p = game.player_mut(&tank.id).unwrap();
            p.firing = true;
            p.fire_cooldown = 0.0;
        }

        game.update();
        assert_eq!(
            game.projectile_count(),
            ShipClass::Tank.def().proj_count as usize
        );
    }

    #[test]
    fn test_fire_cooldown_blocks_next_tick() {
        let mut game = playing_game();
        let joined = game.add_player("Shooter").unwrap();
        {
            let p = game.player_mut(&joined.id).unwrap();
            p.firing = true;
            p.fire_cooldown = 0.0;
        }
        game.update();
        game.update();
        // Fighter cooldown (0.15s) spans several ticks
        assert_eq!(game.projectile_count(), 1);
    }

    #[test]
    fn test_ready_starts_countdown_then_match() {
        let mut game = Game::with_seed(MatchConfig::default(), 3);
        let joined = game.add_player("P").unwrap();
        game.handle_ready(&joined.id);

        game.update();
        assert_eq!(game.match_phase(), MatchPhase::Countdown);

        // Run past the countdown
        let ticks = (limits::COUNTDOWN_DURATION / tick::DT) as u32 + 2;
        for _ in 0..ticks {
            game.update();
        }
        assert_eq!(game.match_phase(), MatchPhase::Playing);
    }

    #[test]
    fn test_team_mode_needs_two_players() {
        let mut game = Game::with_seed(MatchConfig::default_for(GameMode::Tdm), 3);
        let a = game.add_player("A").unwrap();
        game.handle_ready(&a.id);
        game.update();
        assert_eq!(game.match_phase(), MatchPhase::Lobby);

        let b = game.add_player("B").unwrap();
        game.handle_ready(&b.id);
        game.update();
        assert_eq!(game.match_phase(), MatchPhase::Countdown);
    }

    #[test]
    fn test_team_pick_only_in_lobby() {
        let mut game = Game::with_seed(MatchConfig::default_for(GameMode::Tdm), 3);
        let a = game.add_player("A").unwrap();

        game.handle_team_pick(&a.id, Team::Blue as u8);
        assert_eq!(game.player(&a.id).unwrap().team, Team::Blue);

        game.match_state_mut().phase = MatchPhase::Playing;
        game.handle_team_pick(&a.id, Team::Red as u8);
        assert_eq!(game.player(&a.id).unwrap().team, Team::Blue);
    }

    #[test]
    fn test_auto_team_assignment_balances() {
        let mut game = Game::with_seed(MatchConfig::default_for(GameMode::Tdm), 3);
        let a = game.add_player("A").unwrap();
        let b = game.add_player("B").unwrap();
        assert_ne!(a.team, b.team);
    }

    #[test]
    fn test_score_limit_ends_match() {
        let mut game = playing_game();
        let joined = game.add_player("P").unwrap();
        game.match_state_mut().config.score_limit = 5;
        game.player_mut(&joined.id).unwrap().score = 5;

        game.update();
        assert_eq!(game.match_phase(), MatchPhase::Result);
    }

    #[test]
    fn test_time_limit_ends_match() {
        let mut game = playing_game();
        game.add_player("P").unwrap();
        game.match_state_mut().time_left = tick::DT / 2.0;

        game.update();
        assert_eq!(game.match_phase(), MatchPhase::Result);
    }

    #[test]
    fn test_result_phase_returns_to_lobby() {
        let mut game = playing_game();
        let joined = game.add_player("P").unwrap();
        game.player_mut(&joined.id).unwrap().kills = 7;
        game.match_state_mut().time_left = tick::DT / 2.0;
        game.update();
        assert_eq!(game.match_phase(), MatchPhase::Result);

        let ticks = (limits::RESULT_DURATION / tick::DT) as u32 + 2;
        for _ in 0..ticks {
            game.update();
        }
        assert_eq!(game.match_phase(), MatchPhase::Lobby);
        // Stats reset on the way back
        assert_eq!(game.player(&joined.id).unwrap().kills, 0);
        assert!(!game.player(&joined.id).unwrap().ready);
    }

    #[test]
    fn test_rematch_from_result_phase() {
        let mut game = playing_game();
        let joined = game.add_player("P").unwrap();
        game.match_state_mut().time_left = tick::DT / 2.0;
        game.update();
        assert_eq!(game.match_phase(), MatchPhase::Result);

        game.handle_rematch(&joined.id);
        assert_eq!(game.match_phase(), MatchPhase::Lobby);
    }

    #[test]
    fn test_no_spawns_without_players() {
        let mut game = playing_game();
        // Push every spawn timer past due
        for _ in 0..(20.0 / tick::DT) as u32 {
            game.update();
        }
        assert_eq!(game.mob_count(), 0);
        assert_eq!(game.asteroid_count(), 0);
        assert_eq!(game.pickup_count(), 0);
    }

    #[test]
    fn test_spawn_timers_fill_up_to_caps() {
        let mut game = playing_game();
        game.add_player("P").unwrap();

        // 30 simulated seconds covers every spawn interval with refill
        let mut peak_mobs = 0;
        let mut peak_asteroids = 0;
        let mut peak_pickups = 0;
        for _ in 0..(30.0 / tick::DT) as u32 {
            game.update();
            peak_mobs = peak_mobs.max(game.mob_count());
            peak_asteroids = peak_asteroids.max(game.asteroid_count());
            peak_pickups = peak_pickups.max(game.pickup_count());
        }
        assert!(peak_mobs > 0, "mobs should have spawned");
        assert!(peak_mobs <= limits::MAX_MOBS);
        assert!(peak_asteroids >= 1 && peak_asteroids <= limits::MAX_ASTEROIDS);
        assert!(peak_pickups >= 1 && peak_pickups <= limits::MAX_PICKUPS);
    }

    #[test]
    fn test_broadcast_cadence() {
        let mut game = playing_game();
        let joined = game.add_player("P").unwrap();
        let (client, rx) = ChannelClient::new();
        game.set_client(&joined.id, client);

        for _ in 0..4 {
            game.update();
        }

        let mut binary_frames = 0;
        while let Ok(frame) = rx.try_recv() {
            if matches!(frame, OutboundFrame::Binary(_)) {
                binary_frames += 1;
            }
        }
        // 4 ticks at broadcast-every-2 = 2 snapshots
        assert_eq!(binary_frames, 2);
    }

    #[test]
    fn test_snapshot_contents() {
        use crate::net::protocol::decode_snapshot;

        let mut game = playing_game();
        let joined = game.add_player("P").unwrap();
        let (client, rx) = ChannelClient::new();
        game.set_client(&joined.id, client);

        game.update();
        game.update();

        let mut snapshot = None;
        while let Ok(frame) = rx.try_recv() {
            if let OutboundFrame::Binary(data) = frame {
                snapshot = Some(decode_snapshot(&data).unwrap());
            }
        }
        let snapshot = snapshot.expect("expected a snapshot");
        assert_eq!(snapshot.tick, 2);
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.players[0].id, joined.id);
        assert_eq!(snapshot.match_phase, MatchPhase::Playing as u8);
    }

    #[test]
    fn test_ability_activation_spawns_heal_zone() {
        let mut game = playing_game();
        // Fourth class in rotation is Support
        game.add_player("A").unwrap();
        game.add_player("B").unwrap();
        game.add_player("C").unwrap();
        let support = game.add_player("D").unwrap();
        assert_eq!(support.ship, ShipClass::Support);

        game.player_mut(&support.id).unwrap().ability_pressed = true;
        game.update();

        assert_eq!(game.heal_zone_count(), 1);
        // Consumed and on cooldown
        let p = game.player(&support.id).unwrap();
        assert!(!p.ability_pressed);
        assert!(p.ability.cooldown > 0.0);
    }

    #[test]
    fn test_missile_barrage_spawns_homing_missiles() {
        use crate::game::constants::ability::MISSILE_BARRAGE_COUNT;

        let mut game = playing_game();
        let fighter = game.add_player("A").unwrap();
        assert_eq!(fighter.ship, ShipClass::Fighter);

        game.player_mut(&fighter.id).unwrap().ability_pressed = true;
        game.update();

        assert_eq!(game.homing_missile_count(), MISSILE_BARRAGE_COUNT as usize);
    }

    #[test]
    fn test_blink_teleports_forward() {
        use crate::game::constants::ability::BLINK_DISTANCE;

        let mut game = playing_game();
        game.add_player("A").unwrap();
        game.add_player("B").unwrap();
        let scout = game.add_player("C").unwrap();
        assert_eq!(scout.ship, ShipClass::Scout);

        let before = {
            let p = game.player_mut(&scout.id).unwrap();
            p.rotation = 0.0;
            p.target_rotation = 0.0;
            p.ability_pressed = true;
            p.pos
        };
        game.update();

        let after = game.player(&scout.id).unwrap().pos;
        // One tick of drift plus the 200-unit jump
        assert!(after.x - before.x >= BLINK_DISTANCE * 0.9);
    }

    #[test]
    fn test_kill_event_broadcast_on_projectile_kill() {
        let mut game = playing_game();
        let shooter = game.add_player("Shooter").unwrap();
        let victim = game.add_player("Victim").unwrap();
        let (client, rx) = ChannelClient::new();
        game.set_client(&shooter.id, client);

        // Park the victim right in front of the shooter's gun, almost dead
        let spos = game.player(&shooter.id).unwrap().pos;
        {
            let v = game.player_mut(&victim.id).unwrap();
            v.pos = spos + Vec2::new(60.0, 0.0);
            v.target_point = v.pos;
            v.hp = 1;
            v.spawn_protection = 0.0;
        }
        {
            let s = game.player_mut(&shooter.id).unwrap();
            s.rotation = 0.0;
            s.target_rotation = 0.0;
            s.target_point = s.pos; // dead zone: stay put
            s.firing = true;
            s.fire_cooldown = 0.0;
        }

        for _ in 0..10 {
            game.update();
        }

        let events = drain_text(&rx);
        assert!(
            events.iter().any(|v| v["t"] == "kill"),
            "expected a kill event, got {events:?}"
        );
        assert!(events.iter().any(|v| v["t"] == "hit"));

        // Victim respawn pending
        let v = game.player(&victim.id).unwrap();
        assert!(!v.alive);
        assert!(v.respawn_timer > 0.0);
        // Shooter credited
        let s = game.player(&shooter.id).unwrap();
        assert_eq!(s.kills, 1);
        assert_eq!(s.score, 1);
    }

    #[test]
    fn test_pickup_heals_on_contact() {
        let mut game = playing_game();
        let joined = game.add_player("P").unwrap();
        let pos = {
            let p = game.player_mut(&joined.id).unwrap();
            p.hp = 50;
            p.target_point = p.pos;
            p.pos
        };

        // Drop a pickup on the player
        let mut rng = SmallRng::seed_from_u64(1);
        let mut pk = Pickup::spawn(&mut rng, game.world());
        pk.pos = pos;
        game.pickups.insert(pk.id.clone(), pk);

        game.update();

        assert_eq!(game.pickup_count(), 0);
        assert_eq!(
            game.player(&joined.id).unwrap().hp,
            50 + crate::game::constants::pickup::HEAL
        );
    }

    #[test]
    fn test_controller_attach_notifies_client() {
        let mut game = Game::with_seed(MatchConfig::default(), 1);
        let joined = game.add_player("P").unwrap();
        let (client, rx) = ChannelClient::new();
        game.set_client(&joined.id, client);

        let (controller, _ctrl_rx) = ChannelClient::new();
        game.set_controller(&joined.id, controller);

        let events = drain_text(&rx);
        assert!(events.iter().any(|v| v["t"] == "ctrl_on"));

        game.remove_controller(&joined.id);
        let events = drain_text(&rx);
        assert!(events.iter().any(|v| v["t"] == "ctrl_off"));
    }
}

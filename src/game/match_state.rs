//! Match lifecycle: phases, modes, team state, and spawn placement.

use hashbrown::HashMap;
use rand::rngs::SmallRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::game::constants::{session, world};
use crate::game::state::{Player, PlayerId, WorldRect};
use crate::util::vec2::Vec2;

/// Lifecycle phase of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MatchPhase {
    Lobby = 0,
    Countdown = 1,
    Playing = 2,
    Result = 3,
}

/// Game mode for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum GameMode {
    Ffa = 0,
    Tdm = 1,
    Ctf = 2,
    WaveSurvival = 3,
}

impl GameMode {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => GameMode::Tdm,
            2 => GameMode::Ctf,
            3 => GameMode::WaveSurvival,
            _ => GameMode::Ffa,
        }
    }
}

/// Team assignment. `None` outside of team modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Team {
    None = 0,
    Red = 1,
    Blue = 2,
}

impl Team {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Team::None),
            1 => Some(Team::Red),
            2 => Some(Team::Blue),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Settings for one match
#[derive(Debug, Clone, Copy)]
pub struct MatchConfig {
    pub mode: GameMode,
    /// Seconds; 0 = untimed
    pub time_limit: f32,
    /// Kills/captures to win; 0 = no limit
    pub score_limit: i32,
    pub world: WorldRect,
    pub max_players: usize,
}

impl MatchConfig {
    /// Default settings for the given mode
    pub fn default_for(mode: GameMode) -> Self {
        match mode {
            GameMode::Tdm => Self {
                mode,
                time_limit: 240.0,
                score_limit: 30,
                world: WorldRect::new(6000.0, 6000.0),
                max_players: session::MAX_PLAYERS,
            },
            GameMode::Ctf => Self {
                mode,
                time_limit: 300.0,
                score_limit: 3,
                world: WorldRect::new(6000.0, 6000.0),
                max_players: session::MAX_PLAYERS,
            },
            GameMode::WaveSurvival => Self {
                mode,
                time_limit: 0.0,
                score_limit: 0,
                world: WorldRect::new(world::WIDTH, world::HEIGHT),
                max_players: session::MAX_PLAYERS,
            },
            GameMode::Ffa => Self {
                mode,
                time_limit: 300.0,
                score_limit: 0,
                world: WorldRect::new(world::WIDTH, world::HEIGHT),
                max_players: session::MAX_PLAYERS,
            },
        }
    }

    pub fn is_team_mode(&self) -> bool {
        matches!(self.mode, GameMode::Tdm | GameMode::Ctf)
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self::default_for(GameMode::Ffa)
    }
}

/// Per-team score and flag state
#[derive(Debug, Clone)]
pub struct TeamState {
    pub team: Team,
    pub score: i32,
    pub flag_holder: Option<PlayerId>,
    pub flag_at_base: bool,
    pub flag_pos: Vec2,
}

impl TeamState {
    fn new(team: Team) -> Self {
        Self {
            team,
            score: 0,
            flag_holder: None,
            flag_at_base: true,
            flag_pos: Vec2::ZERO,
        }
    }
}

/// The running match's phase and team state
#[derive(Debug, Clone)]
pub struct MatchState {
    pub phase: MatchPhase,
    pub config: MatchConfig,
    pub teams: [TeamState; 3],
    pub time_left: f32,
    pub countdown: f32,
    pub result_timer: f32,
}

impl MatchState {
    pub fn new(config: MatchConfig) -> Self {
        let mut teams = [
            TeamState::new(Team::None),
            TeamState::new(Team::Red),
            TeamState::new(Team::Blue),
        ];
        if config.mode == GameMode::Ctf {
            teams[Team::Red.index()].flag_pos = Vec2::new(500.0, config.world.h / 2.0);
            teams[Team::Blue.index()].flag_pos = Vec2::new(config.world.w - 500.0, config.world.h / 2.0);
        }
        Self {
            phase: MatchPhase::Lobby,
            config,
            teams,
            time_left: config.time_limit,
            countdown: 0.0,
            result_timer: 0.0,
        }
    }

    pub fn team(&self, team: Team) -> &TeamState {
        &self.teams[team.index()]
    }

    pub fn team_mut(&mut self, team: Team) -> &mut TeamState {
        &mut self.teams[team.index()]
    }

    /// Auto-balance a new player onto the smaller team
    pub fn assign_team(&self, players: &HashMap<PlayerId, Player>) -> Team {
        if !self.config.is_team_mode() {
            return Team::None;
        }
        let red = players.values().filter(|p| p.team == Team::Red).count();
        let blue = players.values().filter(|p| p.team == Team::Blue).count();
        if red <= blue {
            Team::Red
        } else {
            Team::Blue
        }
    }

    /// Spawn position for a team (team halves in team modes, central band
    /// otherwise)
    pub fn spawn_position(&self, team: Team, rng: &mut SmallRng) -> Vec2 {
        let w = self.config.world.w;
        let h = self.config.world.h;
        if self.config.is_team_mode() {
            match team {
                Team::Red => {
                    return Vec2::new(
                        200.0 + rng.gen::<f32>() * w * 0.25,
                        h * 0.2 + rng.gen::<f32>() * h * 0.6,
                    )
                }
                Team::Blue => {
                    return Vec2::new(
                        w * 0.75 + rng.gen::<f32>() * w * 0.25 - 200.0,
                        h * 0.2 + rng.gen::<f32>() * h * 0.6,
                    )
                }
                Team::None => {}
            }
        }
        Vec2::new(
            w / 4.0 + rng.gen::<f32>() * w / 2.0,
            h / 4.0 + rng.gen::<f32>() * h / 2.0,
        )
    }
}

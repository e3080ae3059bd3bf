//! Persistence collaborator interface.
//!
//! The engine never blocks on storage: these calls happen at match end (or
//! kill time) on a spawned task, and failures are logged and swallowed; the
//! match continues whether or not stats were durably recorded. The XP/level
//! curve lives here because match-end reporting consumes it.

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::game::match_state::{GameMode, Team};

/// Storage-layer failure, surfaced only to logs
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("unknown player {0}")]
    UnknownPlayer(i64),
}

/// Cumulative stats for one persisted account
#[derive(Debug, Clone, Default)]
pub struct PlayerStats {
    pub kills: u32,
    pub deaths: u32,
    pub wins: u32,
    pub losses: u32,
    /// Seconds played
    pub playtime: f64,
    pub xp: i64,
    pub level: u32,
}

/// Match persistence collaborator. Implementations wrap whatever durable
/// storage the deployment uses; the engine only sees this trait.
pub trait MatchStore: Send + Sync {
    /// Record a finished match, returning its id
    fn record_match(&self, mode: GameMode, duration: f32, winner: Team) -> Result<i64, StoreError>;

    /// Record one player's line in a finished match
    #[allow(clippy::too_many_arguments)]
    fn record_match_player(
        &self,
        match_id: i64,
        player_id: i64,
        team: Team,
        kills: u32,
        deaths: u32,
        assists: u32,
        score: i32,
        xp: i32,
    ) -> Result<(), StoreError>;

    /// Fold a match into cumulative stats; returns (total xp, new level)
    #[allow(clippy::too_many_arguments)]
    fn update_stats_after_match(
        &self,
        player_id: i64,
        kills: u32,
        deaths: u32,
        assists: u32,
        won: bool,
        duration: f32,
        xp: i32,
    ) -> Result<(i64, u32), StoreError>;

    fn get_stats(&self, player_id: i64) -> Result<Option<PlayerStats>, StoreError>;

    /// Returns true when the achievement was newly unlocked
    fn unlock_achievement(&self, player_id: i64, achievement_id: &str) -> Result<bool, StoreError>;

    fn achievements(&self, player_id: i64) -> Result<Vec<String>, StoreError>;
}

/// No-op store for storeless deployments and tests
pub struct NullStore;

impl MatchStore for NullStore {
    fn record_match(&self, _: GameMode, _: f32, _: Team) -> Result<i64, StoreError> {
        Ok(0)
    }

    fn record_match_player(
        &self,
        _: i64,
        _: i64,
        _: Team,
        _: u32,
        _: u32,
        _: u32,
        _: i32,
        _: i32,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    fn update_stats_after_match(
        &self,
        _: i64,
        _: u32,
        _: u32,
        _: u32,
        _: bool,
        _: f32,
        _: i32,
    ) -> Result<(i64, u32), StoreError> {
        Ok((0, 1))
    }

    fn get_stats(&self, _: i64) -> Result<Option<PlayerStats>, StoreError> {
        Ok(None)
    }

    fn unlock_achievement(&self, _: i64, _: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    fn achievements(&self, _: i64) -> Result<Vec<String>, StoreError> {
        Ok(vec![])
    }
}

/// In-memory reference implementation, used by tests and useful for
/// single-process deployments without durable storage
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    next_match_id: i64,
    stats: HashMap<i64, PlayerStats>,
    achievements: HashMap<i64, Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account so stats can accumulate against it
    pub fn register_player(&self, player_id: i64) {
        let mut inner = self.inner.lock();
        inner.stats.entry(player_id).or_insert_with(|| PlayerStats {
            level: 1,
            ..Default::default()
        });
    }
}

impl MatchStore for MemoryStore {
    fn record_match(&self, _mode: GameMode, _duration: f32, _winner: Team) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock();
        inner.next_match_id += 1;
        Ok(inner.next_match_id)
    }

    fn record_match_player(
        &self,
        _match_id: i64,
        player_id: i64,
        _team: Team,
        _kills: u32,
        _deaths: u32,
        _assists: u32,
        _score: i32,
        _xp: i32,
    ) -> Result<(), StoreError> {
        let inner = self.inner.lock();
        if inner.stats.contains_key(&player_id) {
            Ok(())
        } else {
            Err(StoreError::UnknownPlayer(player_id))
        }
    }

    fn update_stats_after_match(
        &self,
        player_id: i64,
        kills: u32,
        deaths: u32,
        _assists: u32,
        won: bool,
        duration: f32,
        xp: i32,
    ) -> Result<(i64, u32), StoreError> {
        let mut inner = self.inner.lock();
        let stats = inner
            .stats
            .get_mut(&player_id)
            .ok_or(StoreError::UnknownPlayer(player_id))?;
        stats.kills += kills;
        stats.deaths += deaths;
        if won {
            stats.wins += 1;
        } else {
            stats.losses += 1;
        }
        stats.playtime += duration as f64;
        stats.xp += xp as i64;
        stats.level = level_for_xp(stats.xp);
        Ok((stats.xp, stats.level))
    }

    fn get_stats(&self, player_id: i64) -> Result<Option<PlayerStats>, StoreError> {
        Ok(self.inner.lock().stats.get(&player_id).cloned())
    }

    fn unlock_achievement(&self, player_id: i64, achievement_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let list = inner.achievements.entry(player_id).or_default();
        if list.iter().any(|a| a == achievement_id) {
            return Ok(false);
        }
        list.push(achievement_id.to_string());
        Ok(true)
    }

    fn achievements(&self, player_id: i64) -> Result<Vec<String>, StoreError> {
        Ok(self
            .inner
            .lock()
            .achievements
            .get(&player_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// XP / level curve
// ============================================================================

/// XP awarded per kill
pub const XP_PER_KILL: i32 = 10;
/// XP awarded per assist
pub const XP_PER_ASSIST: i32 = 5;
/// XP bonus for winning (or being MVP of a drawn FFA)
pub const XP_WIN_BONUS: i32 = 50;
/// Level cap
pub const LEVEL_CAP: u32 = 100;

/// Total XP required to reach a given level (level 1 = 0)
pub fn xp_for_level(level: u32) -> i64 {
    if level <= 1 {
        return 0;
    }
    let mut total = 0.0f64;
    for i in 1..level {
        total += 100.0 * (i as f64).powf(1.5);
    }
    total as i64
}

/// XP needed to go from `level` to `level + 1`
pub fn xp_to_next_level(level: u32) -> i64 {
    xp_for_level(level + 1) - xp_for_level(level)
}

/// Level reached with the given total XP (capped)
pub fn level_for_xp(total_xp: i64) -> u32 {
    let mut level = 1;
    loop {
        if total_xp < xp_for_level(level + 1) {
            return level;
        }
        level += 1;
        if level >= LEVEL_CAP {
            return LEVEL_CAP;
        }
    }
}

/// XP earned in one match
pub fn match_xp(kills: u32, assists: u32, won: bool) -> i32 {
    let mut xp = kills as i32 * XP_PER_KILL + assists as i32 * XP_PER_ASSIST;
    if won {
        xp += XP_WIN_BONUS;
    }
    xp
}

// ============================================================================
// Achievements
// ============================================================================

/// One unlockable achievement
#[derive(Debug, Clone, Copy)]
pub struct AchievementDef {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const ACHIEVEMENTS: &[AchievementDef] = &[
    AchievementDef { id: "first_blood", name: "First Blood", description: "Get your first kill" },
    AchievementDef { id: "sharpshooter", name: "Sharpshooter", description: "Reach 100 total kills" },
    AchievementDef { id: "centurion", name: "Centurion", description: "Reach 1000 total kills" },
    AchievementDef { id: "ace", name: "Ace Pilot", description: "Get 10 kills in a single match" },
    AchievementDef { id: "flawless", name: "Flawless Victory", description: "Win a match without dying" },
    AchievementDef { id: "victor", name: "Victor", description: "Win 10 matches" },
    AchievementDef { id: "veteran", name: "Veteran", description: "Reach level 10" },
    AchievementDef { id: "elite", name: "Elite", description: "Reach level 25" },
    AchievementDef { id: "legend", name: "Legend", description: "Reach level 50" },
    AchievementDef { id: "survivor", name: "Survivor", description: "Play for 1 hour total" },
];

/// Check which achievements newly unlock after a match. Returns the defs
/// that were just unlocked (already-held ones are skipped).
pub fn check_achievements(
    store: &dyn MatchStore,
    player_id: i64,
    match_kills: u32,
    match_deaths: u32,
    won: bool,
) -> Vec<AchievementDef> {
    let stats = match store.get_stats(player_id) {
        Ok(Some(s)) => s,
        _ => return vec![],
    };
    let held = store.achievements(player_id).unwrap_or_default();

    let qualifies = |id: &str| -> bool {
        match id {
            "first_blood" => stats.kills >= 1,
            "sharpshooter" => stats.kills >= 100,
            "centurion" => stats.kills >= 1000,
            "ace" => match_kills >= 10,
            "flawless" => won && match_deaths == 0,
            "victor" => stats.wins >= 10,
            "veteran" => stats.level >= 10,
            "elite" => stats.level >= 25,
            "legend" => stats.level >= 50,
            "survivor" => stats.playtime >= 3600.0,
            _ => false,
        }
    };

    let mut unlocked = Vec::new();
    for def in ACHIEVEMENTS {
        if held.iter().any(|h| h == def.id) || !qualifies(def.id) {
            continue;
        }
        if let Ok(true) = store.unlock_achievement(player_id, def.id) {
            unlocked.push(*def);
        }
    }
    unlocked
}

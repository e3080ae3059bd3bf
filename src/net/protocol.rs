//! Wire protocol: inbound intents, outbound events, and state snapshots.
//!
//! Messages travel as a JSON envelope `{"t": ..., "d": ...}`. State
//! snapshots take the binary path (bincode) since they dominate bandwidth;
//! a compact fixed-width binary encoding of the input intent is also
//! accepted for bandwidth-sensitive delivery.

use serde::{Deserialize, Serialize};

use crate::game::ability::HealZone;
use crate::game::match_state::MatchPhase;
use crate::game::mob::{Mob, MobKind};
use crate::game::state::{Asteroid, Pickup, Player, Projectile};
use crate::util::round1;

/// Protocol-level failures. A malformed frame is discarded and the
/// connection continues; one bad message must not end the match for others.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("bad binary input frame (len {0})")]
    BadFrame(usize),
    #[error("snapshot encode failed: {0}")]
    Encode(String),
}

/// Player intent, applied at the client's send rate
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientInput {
    /// Aim point X in world coordinates
    #[serde(rename = "mx")]
    pub aim_x: f32,
    /// Aim point Y in world coordinates
    #[serde(rename = "my")]
    pub aim_y: f32,
    #[serde(rename = "fire", default)]
    pub fire: bool,
    #[serde(rename = "boost", default)]
    pub boost: bool,
    #[serde(rename = "ability", default)]
    pub ability: bool,
    /// Speed-modulation distance threshold
    #[serde(rename = "thresh", default)]
    pub thresh: f32,
}

/// Messages from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "d", rename_all = "snake_case")]
pub enum ClientMessage {
    Join { name: String, sid: String },
    Create { name: String, sname: String, #[serde(default)] mode: u8 },
    Input(ClientInput),
    Leave,
    List,
    Ready,
    TeamPick { team: u8 },
    Rematch,
    /// Attach as an auxiliary controller for an existing player
    Control { sid: String, pid: String },
}

/// Session info row for the session list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    pub players: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillMsg {
    #[serde(rename = "kid")]
    pub killer_id: String,
    #[serde(rename = "kn")]
    pub killer_name: String,
    #[serde(rename = "vid")]
    pub victim_id: String,
    #[serde(rename = "vn")]
    pub victim_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeathMsg {
    #[serde(rename = "kid")]
    pub killer_id: String,
    #[serde(rename = "kn")]
    pub killer_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitMsg {
    pub x: f32,
    pub y: f32,
    #[serde(rename = "dmg")]
    pub damage: i32,
    #[serde(rename = "vid")]
    pub victim_id: String,
    #[serde(rename = "aid")]
    pub attacker_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPhaseMsg {
    pub phase: u8,
    pub mode: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_left: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerMatchResult {
    pub id: String,
    pub name: String,
    pub team: u8,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub score: i32,
    #[serde(default)]
    pub mvp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResultMsg {
    pub winner_team: u8,
    pub players: Vec<PlayerMatchResult>,
    pub duration: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamPlayerInfo {
    pub id: String,
    pub name: String,
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XpUpdateMsg {
    pub xp_gained: i32,
    pub total_xp: i64,
    pub level: u32,
    pub prev_level: u32,
    pub xp_next: i64,
    pub leveled_up: bool,
}

/// Messages from server to client (discrete events; snapshots go binary)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "d", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome { id: String, ship: u8 },
    Joined { sid: String },
    Created { sid: String },
    Sessions(Vec<SessionInfo>),
    Error { msg: String },
    Kill(KillMsg),
    Death(DeathMsg),
    Hit(HitMsg),
    MobSay { mob_id: String, text: String },
    AbilityActivated { pid: String, ability: String },
    MatchPhase(MatchPhaseMsg),
    MatchResult(MatchResultMsg),
    TeamUpdate { red: Vec<TeamPlayerInfo>, blue: Vec<TeamPlayerInfo> },
    XpUpdate(XpUpdateMsg),
    AchievementUnlock { id: String, name: String, description: String },
    /// A phone controller attached to / detached from this player
    CtrlOn,
    CtrlOff,
}

// ============================================================================
// Snapshots
// ============================================================================

/// Per-player snapshot entry. Velocity fields are `None` when they changed
/// less than the delta threshold since the last broadcast; the binary
/// encoding spends a single byte on an absent velocity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: String,
    #[serde(rename = "n")]
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub r: f32,
    pub vx: Option<f32>,
    pub vy: Option<f32>,
    pub hp: i32,
    #[serde(rename = "mhp")]
    pub max_hp: i32,
    #[serde(rename = "s")]
    pub ship: u8,
    #[serde(rename = "sc")]
    pub score: i32,
    #[serde(rename = "a")]
    pub alive: bool,
    #[serde(rename = "b")]
    pub boost: bool,
    #[serde(rename = "tm")]
    pub team: u8,
}

impl PlayerSnapshot {
    pub fn from_player(p: &Player) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            x: round1(p.pos.x),
            y: round1(p.pos.y),
            r: round1(p.rotation),
            vx: Some(round1(p.vel.x)),
            vy: Some(round1(p.vel.y)),
            hp: p.hp,
            max_hp: p.max_hp,
            ship: p.class.as_u8(),
            score: p.score,
            alive: p.alive,
            boost: p.boosting,
            team: p.team as u8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub r: f32,
    #[serde(rename = "o")]
    pub owner: String,
}

impl ProjectileSnapshot {
    pub fn from_projectile(p: &Projectile) -> Self {
        Self {
            id: p.id.clone(),
            x: round1(p.pos.x),
            y: round1(p.pos.y),
            r: round1(p.rotation),
            owner: p.owner_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobSnapshot {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub r: f32,
    pub vx: Option<f32>,
    pub vy: Option<f32>,
    pub hp: i32,
    #[serde(rename = "mhp")]
    pub max_hp: i32,
    /// 0 = raider, 1 = dreadnought
    #[serde(rename = "k")]
    pub kind: u8,
}

impl MobSnapshot {
    pub fn from_mob(m: &Mob) -> Self {
        Self {
            id: m.id.clone(),
            x: round1(m.pos.x),
            y: round1(m.pos.y),
            r: round1(m.rotation),
            vx: Some(round1(m.vel.x)),
            vy: Some(round1(m.vel.y)),
            hp: m.hp,
            max_hp: m.max_hp,
            kind: match m.kind {
                MobKind::Raider => 0,
                MobKind::Dreadnought => 1,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsteroidSnapshot {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub r: f32,
}

impl AsteroidSnapshot {
    pub fn from_asteroid(a: &Asteroid) -> Self {
        Self {
            id: a.id.clone(),
            x: round1(a.pos.x),
            y: round1(a.pos.y),
            r: (a.rotation * 100.0).round() / 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupSnapshot {
    pub id: String,
    pub x: f32,
    pub y: f32,
}

impl PickupSnapshot {
    pub fn from_pickup(p: &Pickup) -> Self {
        Self {
            id: p.id.clone(),
            x: round1(p.pos.x),
            y: round1(p.pos.y),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealZoneSnapshot {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub r: f32,
}

impl HealZoneSnapshot {
    pub fn from_heal_zone(hz: &HealZone) -> Self {
        Self {
            id: hz.id.clone(),
            x: round1(hz.pos.x),
            y: round1(hz.pos.y),
            r: round1(hz.radius),
        }
    }
}

/// Periodic immutable state snapshot (30 Hz)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    #[serde(rename = "p")]
    pub players: Vec<PlayerSnapshot>,
    #[serde(rename = "pr")]
    pub projectiles: Vec<ProjectileSnapshot>,
    #[serde(rename = "m")]
    pub mobs: Vec<MobSnapshot>,
    #[serde(rename = "as")]
    pub asteroids: Vec<AsteroidSnapshot>,
    #[serde(rename = "pk")]
    pub pickups: Vec<PickupSnapshot>,
    #[serde(rename = "hz", default)]
    pub heal_zones: Vec<HealZoneSnapshot>,
    pub tick: u64,
    #[serde(rename = "mp")]
    pub match_phase: u8,
    #[serde(rename = "tl")]
    pub time_left: f32,
    #[serde(rename = "trs")]
    pub team_red_score: i32,
    #[serde(rename = "tbs")]
    pub team_blue_score: i32,
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a server message as a JSON envelope
pub fn encode_message(msg: &ServerMessage) -> Vec<u8> {
    // Serialization of our own types cannot fail
    serde_json::to_vec(msg).unwrap_or_default()
}

/// Decode a client envelope; malformed input is an error for the caller to
/// discard
pub fn decode_client_message(raw: &[u8]) -> Result<ClientMessage, ProtocolError> {
    Ok(serde_json::from_slice(raw)?)
}

/// Encode a snapshot on the compact binary path
pub fn encode_snapshot(snapshot: &GameSnapshot) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(snapshot, bincode::config::standard())
        .map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decode a binary snapshot (client side / tests)
pub fn decode_snapshot(raw: &[u8]) -> Result<GameSnapshot, ProtocolError> {
    bincode::serde::decode_from_slice(raw, bincode::config::standard())
        .map(|(s, _)| s)
        .map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Marker byte of the binary input frame
pub const INPUT_FRAME_TAG: u8 = 0x01;
/// Binary input frame length
pub const INPUT_FRAME_LEN: usize = 8;

const FLAG_FIRE: u8 = 0x01;
const FLAG_BOOST: u8 = 0x02;
const FLAG_ABILITY: u8 = 0x04;

/// Decode the compact 8-byte input frame:
/// `[0x01, mx:i16be, my:i16be, flags, thresh:u16be]`
pub fn decode_binary_input(frame: &[u8]) -> Result<ClientInput, ProtocolError> {
    if frame.len() != INPUT_FRAME_LEN || frame[0] != INPUT_FRAME_TAG {
        return Err(ProtocolError::BadFrame(frame.len()));
    }
    let mx = i16::from_be_bytes([frame[1], frame[2]]) as f32;
    let my = i16::from_be_bytes([frame[3], frame[4]]) as f32;
    let flags = frame[5];
    let thresh = u16::from_be_bytes([frame[6], frame[7]]) as f32;

    Ok(ClientInput {
        aim_x: mx,
        aim_y: my,
        fire: flags & FLAG_FIRE != 0,
        boost: flags & FLAG_BOOST != 0,
        ability: flags & FLAG_ABILITY != 0,
        thresh,
    })
}

/// Encode an input intent into the compact frame (client side / tests)
pub fn encode_binary_input(input: &ClientInput) -> [u8; INPUT_FRAME_LEN] {
    let mx = (input.aim_x as i16).to_be_bytes();
    let my = (input.aim_y as i16).to_be_bytes();
    let mut flags = 0u8;
    if input.fire {
        flags |= FLAG_FIRE;
    }
    if input.boost {
        flags |= FLAG_BOOST;
    }
    if input.ability {
        flags |= FLAG_ABILITY;
    }
    let thresh = (input.thresh as u16).to_be_bytes();
    [
        INPUT_FRAME_TAG,
        mx[0],
        mx[1],
        my[0],
        my[1],
        flags,
        thresh[0],
        thresh[1],
    ]
}

/// Build a match-phase message for the current phase
pub fn phase_message(phase: MatchPhase, mode: u8, countdown: Option<f32>, time_left: Option<f32>) -> ServerMessage {
    ServerMessage::MatchPhase(MatchPhaseMsg {
        phase: phase as u8,
        mode,
        countdown,
        time_left,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_input_roundtrip() {
        let input = ClientInput {
            aim_x: 1234.0,
            aim_y: -567.0,
            fire: true,
            boost: false,
            ability: true,
            thresh: 250.0,
        };
        let frame = encode_binary_input(&input);
        let decoded = decode_binary_input(&frame).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_binary_input_rejects_short_frame() {
        assert!(decode_binary_input(&[0x01, 0, 0]).is_err());
    }

    #[test]
    fn test_binary_input_rejects_wrong_tag() {
        let frame = [0x02, 0, 0, 0, 0, 0, 0, 0];
        assert!(decode_binary_input(&frame).is_err());
    }

    #[test]
    fn test_client_envelope_decode() {
        let raw = br#"{"t":"input","d":{"mx":100.5,"my":-20.0,"fire":true,"boost":false,"ability":false,"thresh":200.0}}"#;
        let msg = decode_client_message(raw).unwrap();
        match msg {
            ClientMessage::Input(input) => {
                assert_eq!(input.aim_x, 100.5);
                assert!(input.fire);
            }
            other => panic!("expected input, got {other:?}"),
        }
    }

    #[test]
    fn test_client_envelope_join() {
        let raw = br#"{"t":"join","d":{"name":"Pilot","sid":"abc"}}"#;
        match decode_client_message(raw).unwrap() {
            ClientMessage::Join { name, sid } => {
                assert_eq!(name, "Pilot");
                assert_eq!(sid, "abc");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_message_is_error_not_panic() {
        assert!(decode_client_message(b"{not json").is_err());
        assert!(decode_client_message(br#"{"t":"warp_core_breach"}"#).is_err());
    }

    #[test]
    fn test_server_message_envelope_shape() {
        let msg = ServerMessage::Error {
            msg: "session full".into(),
        };
        let encoded = encode_message(&msg);
        let v: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(v["t"], "error");
        assert_eq!(v["d"]["msg"], "session full");
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let snapshot = GameSnapshot {
            players: vec![PlayerSnapshot {
                id: "p1".into(),
                name: "Pilot".into(),
                x: 100.1,
                y: 200.2,
                r: 1.5,
                vx: Some(10.0),
                vy: None,
                hp: 80,
                max_hp: 100,
                ship: 0,
                score: 5,
                alive: true,
                boost: false,
                team: 0,
            }],
            projectiles: vec![],
            mobs: vec![],
            asteroids: vec![],
            pickups: vec![],
            heal_zones: vec![],
            tick: 42,
            match_phase: 2,
            time_left: 120.5,
            team_red_score: 1,
            team_blue_score: 2,
        };

        let encoded = encode_snapshot(&snapshot).unwrap();
        let decoded = decode_snapshot(&encoded).unwrap();
        assert_eq!(decoded.tick, 42);
        assert_eq!(decoded.players.len(), 1);
        assert_eq!(decoded.players[0].vx, Some(10.0));
        assert_eq!(decoded.players[0].vy, None);
    }

    #[test]
    fn test_snapshot_rounds_to_one_decimal() {
        use crate::game::shipclass::ShipClass;
        use crate::game::state::{Player, WorldRect};
        use rand::SeedableRng;

        let mut rng = rand::rngs::SmallRng::seed_from_u64(3);
        let mut p = Player::new(
            "p1".into(),
            "P".into(),
            ShipClass::Fighter,
            &mut rng,
            WorldRect::new(4000.0, 4000.0),
        );
        p.pos.x = 123.456;
        p.pos.y = 789.012;

        let snap = PlayerSnapshot::from_player(&p);
        assert_eq!(snap.x, 123.5);
        assert_eq!(snap.y, 789.0);
    }
}

//! End-to-end simulation tests driving the public crate API the way a
//! transport collaborator would.

use std::time::Duration;

use nebula_arena_server::game::constants::{player as player_c, tick};
use nebula_arena_server::game::game::Game;
use nebula_arena_server::game::match_state::{GameMode, MatchConfig, MatchPhase, Team};
use nebula_arena_server::net::broadcaster::{ChannelClient, OutboundFrame};
use nebula_arena_server::net::protocol::{
    decode_binary_input, decode_snapshot, encode_binary_input, ClientInput,
};
use nebula_arena_server::session::SessionRegistry;

fn playing_game(seed: u64) -> Game {
    let mut game = Game::with_seed(MatchConfig::default(), seed);
    game.match_state_mut().phase = MatchPhase::Playing;
    game
}

#[tokio::test]
async fn session_join_and_tick_loop_end_to_end() {
    let registry = SessionRegistry::with_limits(10, Duration::from_secs(60));
    let session = registry
        .create_session("Battle Arena", GameMode::Ffa)
        .unwrap();

    // Halt the background loop so ticks are driven deterministically
    session.stop();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let joined = {
        let mut game = session.game.write();
        game.match_state_mut().phase = MatchPhase::Playing;
        game.add_player("Pilot").unwrap()
    };

    let base_tick = session.game.read().tick_count();
    for _ in 0..10 {
        let mut game = session.game.write();
        // Zero fire-cooldown, always-firing player
        {
            let p = game.player_mut(&joined.id).unwrap();
            p.firing = true;
            p.fire_cooldown = 0.0;
        }
        game.update();
    }

    let game = session.game.read();
    assert_eq!(game.tick_count(), base_tick + 10);
    // One shot per tick, nothing expires within a sixth of a second
    assert_eq!(game.projectile_count(), 10);
}

#[tokio::test]
async fn idle_session_lifecycle() {
    let registry = SessionRegistry::with_limits(10, Duration::from_millis(40));
    let session = registry.create_session("Arena", GameMode::Ffa).unwrap();
    let joined = session.game.write().add_player("Pilot").unwrap();

    // Leaving schedules deferred cleanup; the session lingers briefly
    registry.remove_player(session.id, &joined.id);
    assert!(registry.get(session.id).is_some());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(registry.get(session.id).is_none());
}

#[test]
fn binary_input_path_reaches_simulation() {
    let mut game = playing_game(11);
    let joined = game.add_player("Pilot").unwrap();
    let pos = game.player(&joined.id).unwrap().pos;

    // Client-side encode, server-side decode, then apply
    let frame = encode_binary_input(&ClientInput {
        aim_x: pos.x + 500.0,
        aim_y: pos.y,
        fire: true,
        boost: true,
        ability: false,
        thresh: 300.0,
    });
    let input = decode_binary_input(&frame).unwrap();
    game.handle_input(&joined.id, &input);

    let p = game.player(&joined.id).unwrap();
    assert!(p.firing);
    assert!(p.boosting);
    assert_eq!(p.slow_threshold, 300.0);

    // The ship starts moving toward the aim point
    for _ in 0..30 {
        game.update();
    }
    let moved = game.player(&joined.id).unwrap().pos;
    assert!(moved.x > pos.x, "ship should chase the aim point");
}

#[test]
fn duel_produces_kill_death_and_respawn() {
    let mut game = playing_game(7);
    let shooter = game.add_player("Shooter").unwrap();
    let victim = game.add_player("Victim").unwrap();

    // Line them up: victim parked dead ahead of the shooter
    let spos = game.player(&shooter.id).unwrap().pos;
    {
        let v = game.player_mut(&victim.id).unwrap();
        v.pos = spos + nebula_arena_server::util::vec2::Vec2::new(300.0, 0.0);
        v.target_point = v.pos;
    }
    {
        let s = game.player_mut(&shooter.id).unwrap();
        s.rotation = 0.0;
        s.target_rotation = 0.0;
        s.target_point = s.pos;
        s.firing = true;
    }

    // Fighter damage 20 vs 100 HP: five hits needed
    let mut victim_died = false;
    for _ in 0..(5.0 / tick::DT) as u32 {
        {
            let s = game.player_mut(&shooter.id).unwrap();
            s.fire_cooldown = 0.0;
        }
        game.update();
        let v = game.player(&victim.id).unwrap();
        assert!(v.hp >= 0 && v.hp <= v.max_hp, "HP stays within [0, max]");
        if !v.alive {
            victim_died = true;
            break;
        }
    }
    assert!(victim_died, "sustained fire should kill the victim");

    let s = game.player(&shooter.id).unwrap();
    assert_eq!(s.kills, 1);
    assert!(s.damage_dealt >= 100);
    let v = game.player(&victim.id).unwrap();
    assert_eq!(v.deaths, 1);
    assert!(v.respawn_timer > 0.0);

    // Run out the respawn timer
    for _ in 0..((player_c::RESPAWN_TIME / tick::DT) as u32 + 5) {
        game.update();
    }
    let v = game.player(&victim.id).unwrap();
    assert!(v.alive, "victim respawns after the timer");
    assert_eq!(v.hp, v.max_hp);
    assert!(v.spawn_protection > 0.0);
}

#[test]
fn team_mode_friendly_fire_is_skipped() {
    let mut game = Game::with_seed(MatchConfig::default_for(GameMode::Tdm), 13);
    game.match_state_mut().phase = MatchPhase::Playing;

    let a = game.add_player("A").unwrap();
    let b = game.add_player("B").unwrap();
    // Force both onto the same team
    game.player_mut(&a.id).unwrap().team = Team::Red;
    game.player_mut(&b.id).unwrap().team = Team::Red;

    let apos = game.player(&a.id).unwrap().pos;
    {
        let p = game.player_mut(&b.id).unwrap();
        p.pos = apos + nebula_arena_server::util::vec2::Vec2::new(200.0, 0.0);
        p.target_point = p.pos;
        p.spawn_protection = 0.0;
    }
    {
        let p = game.player_mut(&a.id).unwrap();
        p.rotation = 0.0;
        p.target_rotation = 0.0;
        p.target_point = p.pos;
        p.firing = true;
    }

    for _ in 0..120 {
        {
            let p = game.player_mut(&a.id).unwrap();
            p.fire_cooldown = 0.0;
        }
        game.update();
    }

    let b_state = game.player(&b.id).unwrap();
    assert_eq!(b_state.hp, b_state.max_hp, "teammates take no projectile damage");
    assert!(b_state.alive);
}

#[test]
fn long_simulation_preserves_invariants() {
    let mut game = playing_game(21);
    let a = game.add_player("A").unwrap();
    let b = game.add_player("B").unwrap();

    // Two live players wandering: mobs, asteroids, and pickups will spawn,
    // fight, and die around them. Nothing may violate core invariants.
    for i in 0..(60.0 / tick::DT) as u32 {
        if i % 30 == 0 {
            // Jitter the aim targets so the ships fly around
            let ax = (i as f32 * 13.7) % 4000.0;
            let ay = (i as f32 * 31.1) % 4000.0;
            game.handle_input(
                &a.id,
                &ClientInput {
                    aim_x: ax,
                    aim_y: ay,
                    fire: true,
                    boost: i % 60 == 0,
                    ability: i % 90 == 0,
                    thresh: 200.0,
                },
            );
            game.handle_input(
                &b.id,
                &ClientInput {
                    aim_x: 4000.0 - ax,
                    aim_y: 4000.0 - ay,
                    fire: true,
                    boost: false,
                    ability: false,
                    thresh: 200.0,
                },
            );
        }
        game.update();

        for id in [&a.id, &b.id] {
            let p = game.player(id).unwrap();
            assert!(p.hp >= 0 && p.hp <= p.max_hp);
            if !p.alive {
                assert_eq!(p.hp, 0);
                assert!(p.respawn_timer > 0.0);
            }
            let world = game.match_state().config.world;
            assert!(p.pos.x >= 0.0 && p.pos.x <= world.w, "players stay wrapped");
            assert!(p.pos.y >= 0.0 && p.pos.y <= world.h);
        }
    }

    assert_eq!(game.tick_count(), (60.0 / tick::DT) as u64);
}

#[test]
fn snapshots_cull_far_entities() {
    let mut game = playing_game(17);
    let near = game.add_player("Near").unwrap();
    let far = game.add_player("Far").unwrap();

    // Pin the viewer to a corner and the other player well outside the
    // 1200-unit cull distance (culling uses plain deltas, not wrapped)
    {
        let p = game.player_mut(&near.id).unwrap();
        p.pos = nebula_arena_server::util::vec2::Vec2::new(500.0, 500.0);
        p.target_point = p.pos;
    }
    {
        let p = game.player_mut(&far.id).unwrap();
        p.pos = nebula_arena_server::util::vec2::Vec2::new(3500.0, 3500.0);
        p.target_point = p.pos;
    }

    let (client, rx) = ChannelClient::new();
    game.set_client(&near.id, client);

    game.update();
    game.update();

    let mut snapshot = None;
    while let Ok(frame) = rx.try_recv() {
        if let OutboundFrame::Binary(data) = frame {
            snapshot = Some(decode_snapshot(&data).unwrap());
        }
    }
    let snapshot = snapshot.expect("expected a snapshot");
    assert_eq!(snapshot.players.len(), 1, "distant player culled from view");
    assert_eq!(snapshot.players[0].id, near.id);
}

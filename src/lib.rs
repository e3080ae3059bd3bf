//! Nebula Arena Server Library
//!
//! Authoritative real-time simulation for a multiplayer arcade space-combat
//! game: fixed-tick physics, grid-pruned collision detection, mob AI, class
//! abilities, and per-session match lifecycle. The wire transport, identity,
//! and durable storage are external collaborators that embed this crate and
//! talk to it through [`net::broadcaster::Broadcaster`],
//! [`store::MatchStore`], and the [`session::SessionRegistry`] operations.

pub mod config;
pub mod game;
pub mod net;
pub mod session;
pub mod store;
pub mod util;

pub mod ability;
pub mod collision;
pub mod constants;
#[allow(clippy::module_inception)]
pub mod game;
pub mod match_state;
pub mod mob;
pub mod shipclass;
pub mod spatial;
pub mod state;

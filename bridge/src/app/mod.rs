//! Application wiring: shared state, zone startup and the server lifecycle.

mod runtime;
mod startup;
mod state;

pub use runtime::spawn_zones;
pub(crate) use startup::start;
pub use state::AppState;

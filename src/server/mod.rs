pub mod listener;
pub mod router;
pub mod state;

pub use state::AppState;

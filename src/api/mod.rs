pub mod handlers;
pub mod middleware;
pub mod routes;
mod state;

pub use state::AppState;

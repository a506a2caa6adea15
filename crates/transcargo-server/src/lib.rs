//! TransCargo Server: HTTP API over the privacy core, site content and
//! the auto-publish queue.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;

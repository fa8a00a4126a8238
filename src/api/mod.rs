//! HTTP surface: JSON endpoints for classification, the knowledge agent,
//! the dealflow agent, and the orchestrated message webhook.

mod routes;

pub use routes::{AppState, build_router};

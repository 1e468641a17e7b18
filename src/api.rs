//! HTTP health API
//!
//! The bot itself talks to Telegram by long polling; this router only
//! exists so a supervisor can probe liveness.

mod handlers;
mod types;

pub use handlers::create_router;

use crate::db::Database;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

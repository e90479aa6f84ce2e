//! Process configuration read from the environment.
//!
//! DESIGN
//! ======
//! Everything is read once at start-up (after `.env` is loaded) into a plain
//! `Config` value that lives in `AppState`. Unset or unparsable values fall
//! back to defaults. `DATABASE_URL` and `BOARD_ROLES` are optional: without
//! them the relay keeps shapes in memory and lets everyone edit.

use std::str::FromStr;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_ROOM_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Postgres URL. `None` runs the relay on the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// `board:user:role` entries for a static role table. `None` lets
    /// everyone edit.
    pub board_roles: Option<String>,
    /// Capacity of each room task's command queue.
    pub room_queue_capacity: usize,
    /// Capacity of each connection's outbound event queue.
    pub client_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            board_roles: None,
            room_queue_capacity: DEFAULT_ROOM_QUEUE_CAPACITY,
            client_queue_capacity: DEFAULT_CLIENT_QUEUE_CAPACITY,
        }
    }
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            database_url: env_string("DATABASE_URL"),
            board_roles: env_string("BOARD_ROLES"),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            room_queue_capacity: env_parse("ROOM_QUEUE_CAPACITY", DEFAULT_ROOM_QUEUE_CAPACITY).max(1),
            client_queue_capacity: env_parse("CLIENT_QUEUE_CAPACITY", DEFAULT_CLIENT_QUEUE_CAPACITY).max(1),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

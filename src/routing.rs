// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Routing Conventions
//!
//! Exchange names, routing keys and queue names shared by every client and
//! server of the game, and the message payloads travelling over them.
//!
//! Routing keys follow `<category>.<identity>`, e.g. `army_moves.alice`.
//! Subscribers interested in every identity bind with `<category>.*`.

use serde::{Deserialize, Serialize};

/// Direct exchange carrying control messages such as pause/resume
pub const EXCHANGE_PERIL_DIRECT: &str = "peril_direct";
/// Topic exchange carrying moves, war recognitions and logs
pub const EXCHANGE_PERIL_TOPIC: &str = "peril_topic";

pub const PAUSE_KEY: &str = "pause";
pub const ARMY_MOVES_PREFIX: &str = "army_moves";
pub const WAR_RECOGNITIONS_PREFIX: &str = "war";
pub const GAME_LOG_SLUG: &str = "game_logs";

/// Pause/resume broadcast, published on [`EXCHANGE_PERIL_DIRECT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayingState {
    #[serde(rename = "IsPaused")]
    pub is_paused: bool,
}

/// Log line published on `game_logs.<identity>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameLog {
    /// Unix timestamp in seconds
    #[serde(rename = "CurrentTime")]
    pub current_time: i64,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Username")]
    pub username: String,
}

/// Builds the routing key `<prefix>.<identity>`.
pub fn routing_key(prefix: &str, identity: &str) -> String {
    format!("{}.{}", prefix, identity)
}

/// Builds the binding key `<prefix>.*` matching every identity of a category.
pub fn wildcard_key(prefix: &str) -> String {
    format!("{}.*", prefix)
}

/// Names the per-identity transient queue of a category, e.g. `pause.alice`.
pub fn transient_queue_name(prefix: &str, identity: &str) -> String {
    routing_key(prefix, identity)
}

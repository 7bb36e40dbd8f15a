//! Error types for MargaNav

use thiserror::Error;

use crate::graph::RoomId;

/// MargaNav error type
#[derive(Error, Debug)]
pub enum NavError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Graph load failed: {0}")]
    Load(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Safety violation: room {room} has danger level {danger} (limit {limit})")]
    SafetyViolation { room: RoomId, danger: u32, limit: u32 },

    #[error("Unknown room: {0}")]
    UnknownRoom(RoomId),

    #[error("Unknown destination: {0}")]
    UnknownDestination(String),

    #[error("Current position unknown (confidence {confidence:.2}, need {required:.2})")]
    PositionUnknown { confidence: f32, required: f32 },

    #[error("Not navigating")]
    NotNavigating,

    #[error("Thread error: {0}")]
    Thread(String),
}

impl From<serde_json::Error> for NavError {
    fn from(e: serde_json::Error) -> Self {
        NavError::Load(e.to_string())
    }
}

impl From<toml::de::Error> for NavError {
    fn from(e: toml::de::Error) -> Self {
        NavError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NavError>;

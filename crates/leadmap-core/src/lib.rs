// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

pub mod backend;
pub mod cache;
pub mod config;
pub mod context;
pub mod debounce;
pub mod filter;
pub mod geo;
pub mod http;
pub mod markers;
pub mod sequencer;
pub mod session;
pub mod territory;
pub mod viewport;
pub mod zoom;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapError {
    #[error("Network failure: {0}")]
    NetworkFailure(String),
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),
    #[error("Backend rejected request (HTTP {status}): {message}")]
    BackendRejection { status: u16, message: String },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for MapError {
    fn from(err: reqwest::Error) -> Self {
        MapError::NetworkFailure(err.to_string())
    }
}

impl MapError {
    /// Whether this error should reach the user as a banner.
    /// Bounds errors mean the map is not ready yet and are only logged.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, MapError::InvalidBounds(_))
    }
}

/// Directory holding `leadmap.json` and any other per-user state.
pub fn get_config_root() -> PathBuf {
    directories::ProjectDirs::from("org", "leadmap", "LeadMap")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".leadmap"))
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Process-wide configuration, initialised once at startup.

use crate::config::Config;
use crate::http::HttpBackend;
use crate::MapError;
use std::sync::OnceLock;

static CONTEXT: OnceLock<AppContext> = OnceLock::new();

#[derive(Debug)]
pub struct AppContext {
    pub config: Config,
}

impl AppContext {
    /// Builds a backend client from the configured URL and key.
    pub fn backend(&self) -> Result<HttpBackend, MapError> {
        HttpBackend::new(&self.config.backend)
    }
}

/// Installs the context. Fails if it was already initialised.
pub fn init(config: Config) -> Result<&'static AppContext, MapError> {
    config.validate()?;
    CONTEXT
        .set(AppContext { config })
        .map_err(|_| MapError::Config("application context already initialised".into()))?;
    get().ok_or_else(|| MapError::Config("application context missing after init".into()))
}

pub fn get() -> Option<&'static AppContext> {
    CONTEXT.get()
}

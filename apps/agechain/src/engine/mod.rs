//! # Engines
//!
//! Turns an [`EngineConfig`] into a boxed [`SimulationEngine`].

mod http;

pub use http::HttpEngine;

use crate::config::EngineConfig;
use crate::error::AppError;
use agechain_core::{SimulationEngine, SurrogateEngine};
use std::time::Duration;

/// Environment variable holding the HTTP engine's bearer token.
pub const API_KEY_ENV: &str = "AGECHAIN_API_KEY";

/// Engine usable from a blocking worker thread.
pub type BoxedEngine = Box<dyn SimulationEngine + Send + Sync>;

/// Build the engine a configuration selects.
///
/// The HTTP engine owns a blocking client; call this from a blocking
/// context, never directly on an async runtime thread.
pub fn build_engine(config: &EngineConfig) -> Result<BoxedEngine, AppError> {
    match config {
        EngineConfig::Surrogate { params } => {
            let engine = SurrogateEngine::new(params.clone())?;
            Ok(Box::new(engine))
        }
        EngineConfig::Http {
            url,
            timeout_secs,
            api_key,
        } => {
            let api_key = api_key
                .clone()
                .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()));
            let engine = HttpEngine::new(url.as_str(), Duration::from_secs(*timeout_secs), api_key)
                .map_err(|e| AppError::Engine(e.to_string()))?;
            tracing::info!(url = %engine.base_url(), "using HTTP engine");
            Ok(Box::new(engine))
        }
    }
}

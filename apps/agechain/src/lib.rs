//! # agechain
//!
//! Library half of the agechain binary: chain configuration, engine
//! selection and the CLI commands. The `agechain` executable is a thin
//! wrapper over [`cli::execute`].

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
mod files;

pub use config::{ChainConfig, ChainPlan, EngineConfig};
pub use error::AppError;

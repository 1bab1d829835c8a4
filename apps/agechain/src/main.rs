//! # agechain - Battery Aging Chain Runner
//!
//! The main binary for agechain.
//!
//! This application provides:
//! - Chain configuration loading (TOML)
//! - Engine selection (built-in surrogate or external HTTP service)
//! - Parallel execution of independent chains
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    apps/agechain (THE BINARY)                   │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────┐   │
//! │  │   CLI       │    │   Config    │    │  Engines         │   │
//! │  │  (clap)     │    │   (toml)    │    │  (surrogate/http)│   │
//! │  └──────┬──────┘    └──────┬──────┘    └────────┬─────────┘   │
//! │         │                  │                    │              │
//! │         └──────────────────┼────────────────────┘              │
//! │                            ▼                                   │
//! │                    ┌───────────────┐                           │
//! │                    │ agechain-core │                           │
//! │                    │ (THE LOGIC)   │                           │
//! │                    └───────────────┘                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Run two chains in parallel
//! agechain run sei_aging.toml plating.toml -o out
//!
//! # Check a configuration
//! agechain validate sei_aging.toml
//!
//! # Re-extract a metric from a saved run
//! agechain metrics out/sei_aging.chain --role aging --step 2
//! ```

use agechain::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // AGECHAIN_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("AGECHAIN_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "agechain=debug,agechain_core=debug"
    } else {
        "agechain=info,agechain_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if cli.shows_banner() {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the agechain startup banner on stderr.
fn print_banner() {
    eprintln!(
        r#"
   __ _  __ _  ___  ___| |__   __ _(_)_ __
  / _` |/ _` |/ _ \/ __| '_ \ / _` | | '_ \
 | (_| | (_| |  __/ (__| | | | (_| | | | | |
  \__,_|\__, |\___|\___|_| |_|\__,_|_|_| |_|
        |___/

  Battery Aging Chain Runner v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}

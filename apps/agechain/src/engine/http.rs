//! # HTTP Engine
//!
//! Delegates solves to an external simulation service.
//!
//! `POST {base}/solve` with body
//! `{"setup": .., "experiment": .., "starting_solution": ..}`.
//! A 2xx reply carries `{"solution": ..}`; any other status may carry
//! `{"error": ..}` with a typed [`SolveError`]. Everything else is reported
//! as [`SolveError::Engine`].
//!
//! The client is blocking. Build and call it outside of async contexts.

use agechain_core::{
    Experiment, SimulationEngine, SimulationSetup, Solution, SolveError, SolveRequest,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request body sent to `/solve`.
#[derive(Serialize)]
struct SolveBody<'a> {
    setup: &'a SimulationSetup,
    experiment: &'a Experiment,
    starting_solution: Option<&'a Solution>,
}

/// Successful reply.
#[derive(Deserialize)]
struct SolveReply {
    solution: Solution,
}

/// Failure reply.
#[derive(Deserialize)]
struct ErrorReply {
    error: SolveError,
}

/// Engine backed by an HTTP simulation service.
pub struct HttpEngine {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpEngine {
    /// Create an engine pointing at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        api_key: Option<String>,
    ) -> Result<Self, SolveError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SolveError::Engine(format!("cannot build HTTP client: {}", e)))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            api_key,
            timeout,
        })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send(&self, body: &SolveBody<'_>) -> Result<reqwest::blocking::Response, SolveError> {
        let url = format!("{}/solve", self.base_url);
        let mut req = self.http.post(&url).json(body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req.send().map_err(|e| {
            if e.is_timeout() {
                SolveError::Timeout(self.timeout.as_millis() as u64)
            } else {
                SolveError::Engine(format!("cannot reach {}: {}", self.base_url, e))
            }
        })
    }

    fn handle_response(&self, resp: reqwest::blocking::Response) -> Result<Solution, SolveError> {
        let status = resp.status();
        let text = resp.text().map_err(|e| {
            if e.is_timeout() {
                SolveError::Timeout(self.timeout.as_millis() as u64)
            } else {
                SolveError::Engine(format!("failed to read response body: {}", e))
            }
        })?;

        if status.is_success() {
            let reply: SolveReply = serde_json::from_str(&text)
                .map_err(|e| SolveError::Engine(format!("malformed solve reply: {}", e)))?;
            reply
                .solution
                .validate()
                .map_err(|e| SolveError::Engine(format!("inconsistent solution: {}", e)))?;
            return Ok(reply.solution);
        }

        match serde_json::from_str::<ErrorReply>(&text) {
            Ok(reply) => Err(reply.error),
            Err(_) => Err(SolveError::Engine(format!(
                "server error ({}): {}",
                status.as_u16(),
                text.trim()
            ))),
        }
    }
}

impl SimulationEngine for HttpEngine {
    fn name(&self) -> &str {
        "http"
    }

    fn solve(&self, request: &SolveRequest<'_>) -> Result<Solution, SolveError> {
        let body = SolveBody {
            setup: request.setup,
            experiment: request.experiment,
            starting_solution: request.starting_solution,
        };
        tracing::debug!(
            url = %self.base_url,
            cycles = request.experiment.cycle_count(),
            continued = request.starting_solution.is_some(),
            "posting solve request"
        );
        let resp = self.send(&body)?;
        self.handle_response(resp)
    }
}

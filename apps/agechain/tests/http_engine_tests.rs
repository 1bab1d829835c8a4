//! Integration tests for the HTTP engine against a local stub service.
//!
//! Each test binds a `TcpListener` on an ephemeral port and answers exactly
//! one request from a background thread.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use agechain::engine::HttpEngine;
use agechain_core::primitives::VOLTAGE;
use agechain_core::{
    Experiment, SimulationEngine, SimulationSetup, Solution, SolveError, SolveRequest,
    StepRecord,
};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

// =============================================================================
// STUB SERVER
// =============================================================================

/// What the stub saw.
struct Captured {
    request_line: String,
    authorization: Option<String>,
    body: String,
}

/// Serve one request, answering with `status` and `body` after `delay`.
fn serve_once(
    status: &'static str,
    body: String,
    delay: Duration,
) -> (String, mpsc::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();

        let mut content_length = 0usize;
        let mut authorization = None;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                let value = value.trim();
                match name.to_ascii_lowercase().as_str() {
                    "content-length" => content_length = value.parse().unwrap(),
                    "authorization" => authorization = Some(value.to_string()),
                    _ => {}
                }
            }
        }
        let mut raw = vec![0u8; content_length];
        reader.read_exact(&mut raw).unwrap();

        let _ = tx.send(Captured {
            request_line: request_line.trim_end().to_string(),
            authorization,
            body: String::from_utf8(raw).unwrap(),
        });

        thread::sleep(delay);
        let mut stream = stream;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.flush();
    });

    (url, rx)
}

fn rest_experiment() -> Experiment {
    Experiment::parse(&[&["Rest for 1 minute"]]).unwrap()
}

fn one_cycle_solution() -> Solution {
    let mut builder = Solution::builder();
    builder.start_cycle().unwrap();
    builder
        .push_step(
            StepRecord::new("Rest for 1 minute")
                .with_time(vec![0.0, 30.0, 60.0])
                .with_series(VOLTAGE, vec![4.1, 4.1, 4.1]),
        )
        .unwrap();
    builder.build().unwrap()
}

fn solve(engine: &HttpEngine) -> Result<Solution, SolveError> {
    let setup = SimulationSetup::default();
    let experiment = rest_experiment();
    engine.solve(&SolveRequest {
        setup: &setup,
        experiment: &experiment,
        starting_solution: None,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[test]
fn test_success_reply_returns_solution() {
    let expected = one_cycle_solution();
    let body = serde_json::json!({ "solution": expected }).to_string();
    let (url, seen) = serve_once("200 OK", body, Duration::ZERO);

    let engine =
        HttpEngine::new(url, Duration::from_secs(10), Some("secret".to_string())).unwrap();
    let solution = solve(&engine).unwrap();
    assert_eq!(solution, expected);
    assert_eq!(solution.cycle_count(), 1);

    let captured = seen.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(captured.request_line.starts_with("POST /solve "));
    assert_eq!(captured.authorization.as_deref(), Some("Bearer secret"));

    let sent: serde_json::Value = serde_json::from_str(&captured.body).unwrap();
    assert!(sent.get("setup").is_some());
    assert!(sent.get("experiment").is_some());
    assert!(sent["starting_solution"].is_null());
}

#[test]
fn test_typed_error_reply_is_preserved() {
    let failure = SolveError::SolverNonConvergence("step 3 failed".to_string());
    let body = serde_json::json!({ "error": failure }).to_string();
    let (url, _seen) = serve_once("422 Unprocessable Entity", body, Duration::ZERO);

    let engine = HttpEngine::new(url, Duration::from_secs(10), None).unwrap();
    assert_eq!(solve(&engine).unwrap_err(), failure);
}

#[test]
fn test_termination_failure_from_server_error() {
    let failure = SolveError::TerminationNotReached("voltage 2.5 V never reached".to_string());
    let body = serde_json::json!({ "error": failure }).to_string();
    let (url, _seen) = serve_once("500 Internal Server Error", body, Duration::ZERO);

    let engine = HttpEngine::new(url, Duration::from_secs(10), None).unwrap();
    assert_eq!(solve(&engine).unwrap_err(), failure);
}

#[test]
fn test_malformed_reply_is_engine_error() {
    let (url, _seen) = serve_once("200 OK", "{\"answer\": 42}".to_string(), Duration::ZERO);

    let engine = HttpEngine::new(url, Duration::from_secs(10), None).unwrap();
    assert!(matches!(solve(&engine), Err(SolveError::Engine(_))));
}

#[test]
fn test_inconsistent_solution_is_engine_error() {
    let mut solution = serde_json::to_value(one_cycle_solution()).unwrap();
    // Drop a sample from the time axis only.
    solution["time"].as_array_mut().unwrap().pop();
    let body = serde_json::json!({ "solution": solution }).to_string();
    let (url, _seen) = serve_once("200 OK", body, Duration::ZERO);

    let engine = HttpEngine::new(url, Duration::from_secs(10), None).unwrap();
    assert!(matches!(solve(&engine), Err(SolveError::Engine(_))));
}

#[test]
fn test_slow_service_times_out() {
    let body = serde_json::json!({ "solution": one_cycle_solution() }).to_string();
    let (url, _seen) = serve_once("200 OK", body, Duration::from_secs(3));

    let engine = HttpEngine::new(url, Duration::from_millis(500), None).unwrap();
    assert_eq!(solve(&engine).unwrap_err(), SolveError::Timeout(500));
}

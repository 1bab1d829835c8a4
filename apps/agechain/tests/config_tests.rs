//! Integration tests for chain configuration loading.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use agechain::{AppError, ChainConfig, EngineConfig};
use agechain_core::primitives::CELL_TEMPERATURE;
use agechain_core::{ChainError, CycleNumbering, RoleLabel};
use std::io::Write;
use std::time::Duration;

const FULL: &str = r#"
repetitions = 3

[setup.model]
name = "SPM"
options = { SEI = "ec reaction limited" }

[setup.parameters]
set = "Mohtat2020"
overrides = { "Ambient temperature [K]" = 308.15 }

[setup.mesh]
x_n = 20
r_p = 30

[engine]
kind = "surrogate"
params = { k_linear = 0.001 }

[[roles]]
label = "aging"
repeat = 4
cycle = [
    "Charge at 1C until 4.2V",
    "Hold at 4.2V until C/50",
    "Discharge at 1C until 3V",
]

[[roles]]
label = "rpt"
cycles = [
    ["Discharge at C/5 until 3V"],
    ["Charge at 1C until 4.2V"],
]

[metric]
role = "aging"
step = 2
numbering = "all-roles"

[summary]
role = "rpt"

[limits]
wall_clock_secs = 600
thermal = { max_temperature_k = 333.15 }
"#;

fn write_config(dir: &tempfile::TempDir, file: &str, text: &str) -> std::path::PathBuf {
    let path = dir.path().join(file);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(text.as_bytes()).unwrap();
    path
}

// =============================================================================
// LOADING
// =============================================================================

#[test]
fn test_name_defaults_to_file_stem() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "sei_aging.toml", FULL);
    let config = ChainConfig::load(&path).unwrap();
    assert_eq!(config.name, "sei_aging");
    assert_eq!(config.setup.model.name, "SPM");
    assert_eq!(config.setup.parameters.set, "Mohtat2020");
    assert_eq!(
        config.setup.mesh.as_ref().and_then(|m| m.get("r_p")).copied(),
        Some(30)
    );
}

#[test]
fn test_full_config_plans() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "full.toml", FULL);
    let plan = ChainConfig::load(&path).unwrap().into_plan().unwrap();

    assert_eq!(plan.chain.repetitions(), 3);
    assert_eq!(plan.chain.solve_count(), 6);
    assert_eq!(plan.chain.roles().len(), 2);
    assert_eq!(plan.chain.roles()[0].expected_cycles(), 4);
    assert_eq!(plan.chain.roles()[1].expected_cycles(), 2);

    let metric = plan.metric.unwrap();
    assert_eq!(metric.role, RoleLabel::new("aging"));
    assert_eq!(metric.step, Some(2));
    assert_eq!(metric.cycles_per_repetition, 4);
    assert_eq!(metric.numbering, CycleNumbering::AllRoles);

    let summary = plan.summary.unwrap();
    assert_eq!(summary.role, RoleLabel::new("rpt"));
    assert_eq!(summary.step, None);

    assert_eq!(plan.limits.wall_clock, Some(Duration::from_secs(600)));
    let thermal = plan.limits.thermal.unwrap();
    assert_eq!(thermal.temperature_series, CELL_TEMPERATURE);
    assert_eq!(thermal.max_temperature_k, Some(333.15));

    match plan.engine {
        EngineConfig::Surrogate { params } => assert_eq!(params.k_linear, 0.001),
        other => panic!("unexpected engine {:?}", other),
    }
}

#[test]
fn test_http_engine_section() {
    let text = r#"
        name = "remote"
        repetitions = 1

        [engine]
        kind = "http"
        url = "http://127.0.0.1:8000"

        [[roles]]
        label = "aging"
        cycle = ["Rest for 1 hour"]
    "#;
    let plan = ChainConfig::from_toml_str(text).unwrap().into_plan().unwrap();
    match plan.engine {
        EngineConfig::Http {
            url,
            timeout_secs,
            api_key,
        } => {
            assert_eq!(url, "http://127.0.0.1:8000");
            assert_eq!(timeout_secs, 300);
            assert_eq!(api_key, None);
        }
        other => panic!("unexpected engine {:?}", other),
    }
}

// =============================================================================
// REJECTIONS
// =============================================================================

#[test]
fn test_unparseable_step_rejected() {
    let text = r#"
        name = "bad"
        repetitions = 1

        [[roles]]
        label = "aging"
        cycle = ["Discharge at lots until empty"]
    "#;
    let err = ChainConfig::from_toml_str(text)
        .unwrap()
        .into_plan()
        .unwrap_err();
    assert!(matches!(err, AppError::Chain(ChainError::InvalidStep { .. })));
}

#[test]
fn test_role_needs_exactly_one_protocol() {
    let neither = r#"
        name = "bad"
        repetitions = 1

        [[roles]]
        label = "aging"
    "#;
    let both = r#"
        name = "bad"
        repetitions = 1

        [[roles]]
        label = "aging"
        cycle = ["Rest for 1 hour"]
        cycles = [["Rest for 1 hour"]]
    "#;
    for text in [neither, both] {
        let err = ChainConfig::from_toml_str(text)
            .unwrap()
            .into_plan()
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)), "got {:?}", err);
    }
}

#[test]
fn test_duplicate_roles_rejected() {
    let text = r#"
        name = "dup"
        repetitions = 1

        [[roles]]
        label = "aging"
        cycle = ["Rest for 1 hour"]

        [[roles]]
        label = "aging"
        cycle = ["Rest for 1 hour"]
    "#;
    let err = ChainConfig::from_toml_str(text)
        .unwrap()
        .into_plan()
        .unwrap_err();
    assert!(matches!(err, AppError::Chain(ChainError::InvalidChain(_))));
}

#[test]
fn test_unknown_field_rejected() {
    let text = r#"
        name = "typo"
        repetitions = 1
        repetition = 2

        [[roles]]
        label = "aging"
        cycle = ["Rest for 1 hour"]
    "#;
    assert!(matches!(
        ChainConfig::from_toml_str(text),
        Err(AppError::Config(_))
    ));
}

#[test]
fn test_metric_cycle_count_must_match_role() {
    let text = FULL.replace(
        "step = 2\nnumbering",
        "step = 2\ncycles_per_repetition = 10\nnumbering",
    );
    let err = ChainConfig::from_toml_str(&text)
        .unwrap()
        .into_plan()
        .unwrap_err();
    assert!(matches!(err, AppError::Config(ref m) if m.contains("cycles_per_repetition")));
}

#[test]
fn test_step_windows_must_exist_in_every_cycle() {
    let metric_past_end = FULL.replace("step = 2\nnumbering", "step = 3\nnumbering");
    let summary_past_end = FULL.replace("role = \"rpt\"\n", "role = \"rpt\"\nstep = 1\n");
    for text in [metric_past_end, summary_past_end] {
        let err = ChainConfig::from_toml_str(&text)
            .unwrap()
            .into_plan()
            .unwrap_err();
        assert!(matches!(err, AppError::Config(ref m) if m.contains("out of range")), "got {:?}", err);
    }
}

#[test]
fn test_oversized_file_rejected_before_parsing() {
    let dir = tempfile::tempdir().unwrap();
    let padding = "#".repeat(1024 * 1024);
    let path = write_config(&dir, "big.toml", &format!("{}\n{}", padding, FULL));
    let err = ChainConfig::load(&path).unwrap_err();
    assert!(matches!(err, AppError::Io(ref m) if m.contains("byte limit")));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ChainConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, AppError::Io(_)));
}

#[test]
fn test_demo_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/sei_aging.toml");
    let plan = ChainConfig::load(&path).unwrap().into_plan().unwrap();
    assert_eq!(plan.name, "sei_aging");
    assert_eq!(plan.chain.solve_count(), 16);
    assert_eq!(plan.metric.unwrap().cycles_per_repetition, 10);
}

//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::{ChainConfig, ChainPlan};
use crate::engine::build_engine;
use crate::error::AppError;
use crate::files::{validate_file_size, validate_output_path, write_file};
use agechain_core::{
    ChainError, ChainReport, ChainRunner, ChainSnapshot, CycleNumbering, MAX_SNAPSHOT_SIZE,
    MetricSeries, MetricSpec, Reduction, RoleLabel, RoleSummary, extract_cycle_metric,
    extract_repetition_metric, parse_step, snapshot_from_bytes, snapshot_to_bytes,
};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Report key of the per-cycle metric.
pub const CYCLE_METRIC_KEY: &str = "cycle";

/// Report key of the per-repetition summary.
pub const REPETITION_SUMMARY_KEY: &str = "repetition";

// =============================================================================
// CSV
// =============================================================================

/// Write a metric series as `cycle,value` records.
pub fn write_metric_rows<W: Write>(
    series: &MetricSeries,
    writer: &mut csv::Writer<W>,
) -> Result<(), AppError> {
    writer.write_record(["cycle", "value"])?;
    for (cycle, value) in series.points() {
        writer.write_record([cycle.to_string(), value.to_string()])?;
    }
    writer
        .flush()
        .map_err(|e| AppError::Io(format!("Failed to flush CSV: {}", e)))
}

fn write_metric_csv(series: &MetricSeries, path: &Path) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::Io(format!("Failed to create '{}': {}", path.display(), e)))?;
    write_metric_rows(series, &mut writer)
}

fn write_metric_stdout(series: &MetricSeries) -> Result<(), AppError> {
    let stdout = std::io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());
    write_metric_rows(series, &mut writer)
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// What one chain run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Chain name.
    pub name: String,
    /// Engine that solved it.
    pub engine: String,
    /// Whether every solve succeeded.
    pub complete: bool,
    /// Stored solutions.
    pub solutions: usize,
    /// Stop marker, when the chain stopped early.
    pub stop: Option<String>,
    /// Files written.
    pub outputs: Vec<PathBuf>,
}

/// Load, run and write out one chain configuration.
///
/// Blocking: builds the engine and solves on the calling thread.
pub fn run_chain_file(
    config_path: &Path,
    out_dir: &Path,
    write_snapshot: bool,
) -> Result<RunSummary, AppError> {
    let plan = ChainConfig::load(config_path)?.into_plan()?;
    run_plan(&plan, out_dir, write_snapshot)
}

/// Run a validated plan and write its outputs into `out_dir`.
///
/// The report and snapshot are written even when metric extraction fails
/// on a completed chain; that failure is returned afterwards.
pub fn run_plan(
    plan: &ChainPlan,
    out_dir: &Path,
    write_snapshot: bool,
) -> Result<RunSummary, AppError> {
    let engine = build_engine(&plan.engine)?;
    tracing::info!(
        chain = %plan.name,
        engine = engine.name(),
        repetitions = plan.chain.repetitions(),
        solves = plan.chain.solve_count(),
        "starting chain"
    );

    let outcome = ChainRunner::new(engine.as_ref(), plan.setup.clone())
        .with_limits(plan.limits.clone())
        .run(&plan.chain);

    let mut report = ChainReport::new(
        plan.name.as_str(),
        engine.name(),
        plan.chain.repetitions(),
        RoleSummary::of_chain(&plan.chain),
        &outcome.store,
        outcome.status.clone(),
    );
    let mut outputs = Vec::new();
    let mut deferred: Option<ChainError> = None;

    if let Some(spec) = &plan.metric {
        match extract_cycle_metric(&outcome.store, spec) {
            Ok(series) => {
                let path = out_dir.join(format!("{}.metrics.csv", plan.name));
                write_metric_csv(&series, &path)?;
                outputs.push(path);
                report = report.with_metric(CYCLE_METRIC_KEY, series);
            }
            Err(e) if !outcome.is_complete() => {
                tracing::warn!(chain = %plan.name, "skipping cycle metric of stopped chain: {}", e);
            }
            Err(e) => {
                tracing::error!(chain = %plan.name, "cycle metric failed: {}", e);
                deferred = deferred.or(Some(e));
            }
        }
    }

    if let Some(summary) = &plan.summary {
        match extract_repetition_metric(
            &outcome.store,
            &summary.role,
            &summary.series,
            summary.step,
            summary.reduction,
        ) {
            Ok(series) => report = report.with_metric(REPETITION_SUMMARY_KEY, series),
            Err(e) if !outcome.is_complete() => {
                tracing::warn!(chain = %plan.name, "skipping repetition summary of stopped chain: {}", e);
            }
            Err(e) => {
                tracing::error!(chain = %plan.name, "repetition summary failed: {}", e);
                deferred = deferred.or(Some(e));
            }
        }
    }

    let report_path = out_dir.join(format!("{}.report.json", plan.name));
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| AppError::Io(format!("Failed to serialize report: {}", e)))?;
    write_file(&report_path, json.as_bytes())?;
    outputs.insert(0, report_path);

    if write_snapshot {
        let snapshot = ChainSnapshot::capture(&plan.name, engine.name(), &plan.chain, &outcome);
        let path = out_dir.join(format!("{}.chain", plan.name));
        write_file(&path, &snapshot_to_bytes(&snapshot)?)?;
        outputs.push(path);
    }

    if let Some(e) = deferred {
        return Err(e.into());
    }

    let stop = outcome.stop().map(ToString::to_string);
    match &stop {
        Some(stop) => tracing::warn!(chain = %plan.name, "chain stopped: {}", stop),
        None => tracing::info!(chain = %plan.name, solutions = outcome.store.len(), "chain complete"),
    }

    Ok(RunSummary {
        name: plan.name.clone(),
        engine: engine.name().to_string(),
        complete: outcome.is_complete(),
        solutions: outcome.store.len(),
        stop,
        outputs,
    })
}

/// Run every configuration on its own blocking task and join them all.
pub async fn cmd_run(
    configs: &[PathBuf],
    out_dir: &Path,
    write_snapshot: bool,
    json_mode: bool,
) -> Result<(), AppError> {
    std::fs::create_dir_all(out_dir).map_err(|e| {
        AppError::Io(format!(
            "Cannot create output directory '{}': {}",
            out_dir.display(),
            e
        ))
    })?;
    let out_dir = out_dir.canonicalize().map_err(|e| {
        AppError::Io(format!(
            "Invalid output directory '{}': {}",
            out_dir.display(),
            e
        ))
    })?;

    let handles: Vec<_> = configs
        .iter()
        .cloned()
        .map(|path| {
            let out_dir = out_dir.clone();
            let task_path = path.clone();
            let handle = tokio::task::spawn_blocking(move || {
                run_chain_file(&task_path, &out_dir, write_snapshot)
            });
            (path, handle)
        })
        .collect();

    let total = handles.len();
    let mut failed = 0;
    let mut summaries = Vec::with_capacity(total);
    for (path, handle) in handles {
        match handle.await {
            Ok(Ok(summary)) => {
                if !summary.complete {
                    failed += 1;
                }
                summaries.push(summary);
            }
            Ok(Err(e)) => {
                failed += 1;
                tracing::error!(config = %path.display(), "chain failed: {}", e);
            }
            Err(e) => {
                failed += 1;
                tracing::error!(config = %path.display(), "chain task aborted: {}", e);
            }
        }
    }

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&summaries).unwrap_or_default()
        );
    } else {
        println!("agechain Run");
        println!("============");
        for summary in &summaries {
            println!();
            println!("Chain:     {}", summary.name);
            println!("Engine:    {}", summary.engine);
            println!("Solutions: {}", summary.solutions);
            match &summary.stop {
                Some(stop) => println!("Status:    {}", stop),
                None => println!("Status:    completed"),
            }
            for output in &summary.outputs {
                println!("  -> {}", output.display());
            }
        }
    }

    if failed > 0 {
        return Err(AppError::Incomplete { failed, total });
    }
    Ok(())
}

// =============================================================================
// VALIDATE COMMAND
// =============================================================================

/// Check a configuration. Never contacts an engine.
pub fn cmd_validate(config_path: &Path, json_mode: bool) -> Result<(), AppError> {
    let plan = ChainConfig::load(config_path)?.into_plan()?;

    if json_mode {
        let roles: Vec<_> = RoleSummary::of_chain(&plan.chain);
        let output = serde_json::json!({
            "name": plan.name,
            "engine": plan.engine.kind(),
            "repetitions": plan.chain.repetitions(),
            "solves": plan.chain.solve_count(),
            "roles": roles,
            "metric": plan.metric,
            "wall_clock_secs": plan.limits.wall_clock.map(|d| d.as_secs()),
            "thermal_guard": plan.limits.thermal.is_some(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Chain '{}' is valid", plan.name);
    println!("Engine:      {}", plan.engine.kind());
    println!("Repetitions: {}", plan.chain.repetitions());
    println!("Solves:      {}", plan.chain.solve_count());
    println!("Roles:");
    for role in plan.chain.roles() {
        println!(
            "  {:<12} {} cycle(s), {} step(s)",
            role.label.as_str(),
            role.expected_cycles(),
            role.experiment.step_count()
        );
    }
    if let Some(metric) = &plan.metric {
        println!(
            "Metric:      '{}' of role '{}' ({} cycles per repetition)",
            metric.series, metric.role, metric.cycles_per_repetition
        );
    }
    Ok(())
}

// =============================================================================
// METRICS COMMAND
// =============================================================================

/// Metric selection for [`cmd_metrics`].
#[derive(Debug, Clone)]
pub struct MetricsArgs {
    /// Role to reduce.
    pub role: String,
    /// Series to reduce.
    pub series: String,
    /// Step within each cycle.
    pub step: Option<usize>,
    /// Numbering name.
    pub numbering: String,
    /// Reduction name.
    pub reduction: String,
    /// Expected cycles per solve.
    pub cycles: Option<usize>,
}

/// Load a snapshot and extract a per-cycle metric from it.
pub fn metrics_from_snapshot(
    snapshot_path: &Path,
    args: &MetricsArgs,
) -> Result<MetricSeries, AppError> {
    validate_file_size(snapshot_path, MAX_SNAPSHOT_SIZE as u64)?;
    let bytes = std::fs::read(snapshot_path)
        .map_err(|e| AppError::Io(format!("Failed to read snapshot: {}", e)))?;
    let snapshot = snapshot_from_bytes(&bytes)?;
    let store = snapshot.to_store()?;

    let role = RoleLabel::new(args.role.as_str());
    let expected = snapshot
        .roles
        .iter()
        .find(|r| r.label == role)
        .map(|r| r.expected_cycles)
        .ok_or_else(|| ChainError::RoleNotFound(role.clone()))?;
    let numbering: CycleNumbering = args.numbering.parse()?;
    let reduction: Reduction = args.reduction.parse()?;

    let spec = MetricSpec {
        role,
        series: args.series.clone(),
        step: args.step,
        cycles_per_repetition: args.cycles.unwrap_or(expected),
        numbering,
        reduction,
    };
    Ok(extract_cycle_metric(&store, &spec)?)
}

/// Extract a metric from a snapshot and print or write it.
pub fn cmd_metrics(
    snapshot_path: &Path,
    args: MetricsArgs,
    output: Option<&Path>,
    json_mode: bool,
) -> Result<(), AppError> {
    let series = metrics_from_snapshot(snapshot_path, &args)?;
    tracing::info!(role = %args.role, points = series.len(), "metric extracted");

    if let Some(path) = output {
        let path = validate_output_path(path)?;
        write_metric_csv(&series, &path)?;
        println!("Wrote {} point(s) to {}", series.len(), path.display());
        return Ok(());
    }

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&series).unwrap_or_default()
        );
        return Ok(());
    }

    write_metric_stdout(&series)
}

// =============================================================================
// PARSE COMMAND
// =============================================================================

/// Parse step strings and print their structure.
pub fn cmd_parse(steps: &[String], json_mode: bool) -> Result<(), AppError> {
    let parsed = steps
        .iter()
        .map(|s| parse_step(s))
        .collect::<Result<Vec<_>, _>>()?;

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&parsed).unwrap_or_default()
        );
        return Ok(());
    }

    for step in &parsed {
        println!("Step: {}", step);
        println!("  Drive:    {:?}", step.drive);
        match step.duration_s {
            Some(d) => println!("  Duration: {} s", d),
            None => println!("  Duration: -"),
        }
        match &step.until {
            Some(until) => println!("  Until:    {:?}", until),
            None => println!("  Until:    -"),
        }
        if let Some(period) = step.period_s {
            println!("  Period:   {} s", period);
        }
        if let Some(temperature) = step.temperature_k {
            println!("  Ambient:  {} K", temperature);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_has_header_and_rows() {
        let series = MetricSeries {
            cycles: vec![1, 2],
            values: vec![-3.0, -2.5],
        };
        let mut writer = csv::Writer::from_writer(Vec::new());
        write_metric_rows(&series, &mut writer).expect("csv");
        let text = String::from_utf8(writer.get_ref().clone()).expect("utf8");
        assert_eq!(text, "cycle,value\n1,-3\n2,-2.5\n");
    }

    #[test]
    fn parse_rejects_bad_step() {
        assert!(cmd_parse(&["Discharge at 1C until 3V".to_string()], true).is_ok());
        assert!(cmd_parse(&["Jump at 3C".to_string()], false).is_err());
    }
}

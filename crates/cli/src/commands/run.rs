//! `stepforge run`: parse and execute a plan.

use std::sync::Arc;
use std::time::Duration;

use stepforge_config::{AppConfig, FailurePolicyKind, ParseMode, SchedulingKind};
use stepforge_engine::{
    ExecutionError, ExecutionLog, Executor, ExecutorOptions, StepStatus, parse_plan,
};
use stepforge_telemetry::engine::TelemetryEngine;

use crate::RunArgs;

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    apply_flags(&mut config, &args);

    let text = super::read_plan(&args.plan)?;
    let tools = Arc::new(stepforge_tools::registry_from_config(&config.tools, None));

    let plan = parse_plan(&text, &tools, config.engine.parse_mode)?;
    for diagnostic in &plan.diagnostics {
        eprintln!("   ⚠️  {diagnostic}");
    }
    plan.require_steps()?;

    let telemetry = config
        .telemetry
        .enabled
        .then(|| Arc::new(TelemetryEngine::with_capacity(config.telemetry.max_traces)));
    let mut executor = Executor::new(tools).with_options(ExecutorOptions::from_config(&config.engine));
    if let Some(telemetry) = &telemetry {
        executor = executor.with_telemetry(telemetry.clone());
    }

    let token = executor.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n   Cancelling...");
            token.cancel();
        }
    });

    let result = executor.execute(&plan).await;
    let log = match &result {
        Ok(log) => Some(log),
        Err(e) => e.log(),
    };

    if let Some(log) = log {
        if args.json {
            println!("{}", serde_json::to_string_pretty(log)?);
        } else {
            print_log(log);
        }
        if let (Some(telemetry), Some(trace_id)) = (&telemetry, &log.trace_id)
            && let Some(trace) = telemetry.get_trace(trace_id)
        {
            tracing::debug!(
                trace_id = %trace.id,
                spans = trace.spans.len(),
                step_ms = trace.total_duration_ms(),
                "Execution trace"
            );
        }
    }

    match result {
        Ok(_) => Ok(()),
        Err(ExecutionError::StepFailed { index, tool, source, .. }) => {
            Err(format!("Step {index} ({tool}) failed: {source}").into())
        }
        Err(e) => Err(e.into()),
    }
}

fn apply_flags(config: &mut AppConfig, args: &RunArgs) {
    let engine = &mut config.engine;
    if args.parallel || args.max_concurrency.is_some() {
        engine.scheduling = SchedulingKind::Parallel;
    }
    if let Some(n) = args.max_concurrency {
        engine.max_concurrency = n.max(1);
    }
    if args.strict {
        engine.parse_mode = ParseMode::Strict;
        engine.strict_references = true;
    }
    if args.continue_on_error {
        engine.failure_policy = FailurePolicyKind::Continue;
    }
    if let Some(secs) = args.timeout {
        engine.step_timeout_secs = Some(secs.max(1));
    }
}

fn print_log(log: &ExecutionLog) {
    println!();
    for entry in &log.entries {
        let icon = match entry.status {
            StepStatus::Done => "✅",
            StepStatus::Failed => "❌",
            _ => "⏭️ ",
        };
        let args = entry.resolved_args.as_deref().unwrap_or(&entry.raw_args);
        println!("   {icon} {}. {}({args})", entry.index, entry.tool);
        if let Some(observation) = &entry.observation {
            println!("      → {}", observation.render());
        }
        if let Some(error) = &entry.error {
            println!("      ✗ {error}");
        }
        for token in &entry.unresolved {
            println!("      ⚠️  unresolved {token}");
        }
    }

    println!();
    println!(
        "   {} done, {} failed, {} skipped in {}",
        log.succeeded(),
        log.failed(),
        log.count(StepStatus::Skipped),
        format_duration(Duration::from_millis(log.duration_ms))
    );
    if let Some(answer) = log.final_observation() {
        println!();
        println!("{}", answer.render());
    }
}

fn format_duration(d: Duration) -> String {
    if d.as_secs() > 0 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        format!("{}ms", d.as_millis())
    }
}

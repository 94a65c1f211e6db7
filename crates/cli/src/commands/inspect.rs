//! `stepforge inspect`: show how a plan parses.

use std::path::Path;

use stepforge_config::AppConfig;
use stepforge_engine::plan::unresolved_references;
use stepforge_engine::{DependencyGraph, Plan, parse_plan};

pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let text = super::read_plan(path)?;
    let tools = stepforge_tools::registry_from_config(&config.tools, None);
    let plan = parse_plan(&text, &tools, config.engine.parse_mode)?;

    print!("{}", render(&plan)?);
    Ok(())
}

fn render(plan: &Plan) -> Result<String, Box<dyn std::error::Error>> {
    let mut out = String::new();

    out.push_str(&format!("📋 Plan: {} step(s)\n\n", plan.len()));
    for step in &plan.steps {
        let deps = if step.dependencies.is_empty() {
            "-".to_string()
        } else {
            step.dependencies
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let marker = if step.tool_known { "" } else { "  ❓ unknown tool" };
        out.push_str(&format!("   {step}   deps: {deps}{marker}\n"));
    }

    let unresolved = unresolved_references(plan);
    if !unresolved.is_empty() {
        out.push_str("\n⚠️  Unresolved references:\n");
        for reference in &unresolved {
            out.push_str(&format!("   {reference}\n"));
        }
    }

    if !plan.diagnostics.is_empty() {
        out.push_str("\n⚠️  Diagnostics:\n");
        for diagnostic in &plan.diagnostics {
            out.push_str(&format!("   {diagnostic}\n"));
        }
    }

    let waves = DependencyGraph::build(plan).index_waves()?;
    out.push_str("\n🌊 Waves:\n");
    for (i, wave) in waves.iter().enumerate() {
        let steps: Vec<String> = wave.iter().map(|idx| idx.to_string()).collect();
        out.push_str(&format!("   {}: [{}]\n", i + 1, steps.join(", ")));
    }

    Ok(out)
}

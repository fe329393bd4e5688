use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use rao_algo::run_rao;
use tracing::info;

use super::case::{load_case, load_parameters};
use super::util::{limit_parallelism, thread_limit};

pub fn handle(case: &Path, params: Option<&Path>, out: &Path, threads: &str) -> Result<()> {
    let start = Instant::now();
    let limit = thread_limit(threads)?;
    let loaded = load_case(case)?;
    let mut parameters = load_parameters(params)?;
    limit_parallelism(&mut parameters, limit);
    let parallelism = &parameters.multithreading;
    info!(
        limit,
        scenarios = parallelism.contingency_scenarios_in_parallel,
        preventive_leaves = parallelism.preventive_leaves_in_parallel,
        curative_leaves = parallelism.curative_leaves_in_parallel,
        "parallelism configured"
    );
    println!(
        "Parallelism: {} contingency scenarios, {} preventive leaves, {} curative leaves",
        parallelism.contingency_scenarios_in_parallel,
        parallelism.preventive_leaves_in_parallel,
        parallelism.curative_leaves_in_parallel
    );

    let result = run_rao(&loaded.catalog, &parameters, &loaded.snapshot, &loaded.provider)
        .context("optimisation failed")?;
    let report = result.report(&loaded.catalog);

    let json = serde_json::to_string_pretty(&report)?;
    fs::write(out, json).with_context(|| format!("writing report {}", out.display()))?;
    info!(
        out = %out.display(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "report written"
    );

    println!(
        "Optimisation {}: cost {:.2} (functional {:.2}, virtual {:.2})",
        report.status.as_str(),
        report.cost,
        report.functional_cost,
        report.cost - report.functional_cost
    );
    if report.second_preventive {
        println!("Second preventive pass kept");
    }
    for perimeter in &report.perimeters {
        let actions: Vec<&str> = perimeter
            .network_actions
            .iter()
            .map(String::as_str)
            .chain(perimeter.range_actions.keys().map(String::as_str))
            .collect();
        println!(
            "  {:<32} {:<16} cost {:>10.2}  actions [{}]",
            perimeter.state,
            perimeter.status.as_str(),
            perimeter.cost,
            actions.join(", ")
        );
    }
    Ok(())
}

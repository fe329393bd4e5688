use anyhow::{bail, Result};
use rao_algo::RaoParameters;

/// Parses `--threads`: a positive count, or `auto` for every core.
pub fn thread_limit(threads: &str) -> Result<usize> {
    if threads.eq_ignore_ascii_case("auto") {
        return Ok(num_cpus::get());
    }
    match threads.parse::<usize>() {
        Ok(count) if count > 0 => Ok(count),
        _ => bail!("invalid thread count '{threads}': expected a positive integer or 'auto'"),
    }
}

/// Caps every parallelism setting at `limit`.
pub fn limit_parallelism(parameters: &mut RaoParameters, limit: usize) {
    let threads = &mut parameters.multithreading;
    threads.contingency_scenarios_in_parallel = threads.contingency_scenarios_in_parallel.min(limit);
    threads.preventive_leaves_in_parallel = threads.preventive_leaves_in_parallel.min(limit);
    threads.curative_leaves_in_parallel = threads.curative_leaves_in_parallel.min(limit);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_limit_accepts_auto_and_counts() {
        assert_eq!(thread_limit("auto").unwrap(), num_cpus::get());
        assert_eq!(thread_limit("AUTO").unwrap(), num_cpus::get());
        assert_eq!(thread_limit("3").unwrap(), 3);
        assert!(thread_limit("0").is_err());
        assert!(thread_limit("many").is_err());
    }

    #[test]
    fn limit_caps_without_raising() {
        let mut params = RaoParameters::default();
        params.multithreading.contingency_scenarios_in_parallel = 8;
        params.multithreading.preventive_leaves_in_parallel = 4;
        limit_parallelism(&mut params, 2);

        assert_eq!(params.multithreading.contingency_scenarios_in_parallel, 2);
        assert_eq!(params.multithreading.preventive_leaves_in_parallel, 2);
        assert_eq!(params.multithreading.curative_leaves_in_parallel, 1);
    }
}

use std::path::Path;

use anyhow::Result;
use rao_algo::StateTree;

use super::case::{load_case, load_parameters};

pub fn handle(case: &Path, params: Option<&Path>) -> Result<()> {
    let loaded = load_case(case)?;
    let parameters = load_parameters(params)?;
    parameters.validate_against(&loaded.catalog)?;

    let catalog = &loaded.catalog;
    let tree = StateTree::build(catalog);
    println!(
        "Case is valid: {} cnecs, {} network actions, {} range actions, {} contingency scenarios",
        catalog.cnec_count(),
        catalog.network_actions().count(),
        catalog.range_actions().count(),
        tree.scenarios.len()
    );
    Ok(())
}

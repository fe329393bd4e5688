use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rao_algo::RaoParameters;
use rao_core::{Catalog, CatalogDefinition, LinearGridModel, LinearGridSnapshot, LinearSensitivityProvider};
use serde::Deserialize;
use tracing::info;

/// On-disk study: the catalog and the grid it is evaluated on.
#[derive(Debug, Deserialize)]
struct CaseFile {
    catalog: CatalogDefinition,
    #[serde(default)]
    grid: LinearGridModel,
}

pub struct LoadedCase {
    pub catalog: Catalog,
    pub snapshot: LinearGridSnapshot,
    pub provider: LinearSensitivityProvider,
}

pub fn load_case(path: &Path) -> Result<LoadedCase> {
    let text = fs::read_to_string(path).with_context(|| format!("reading case {}", path.display()))?;
    let file: CaseFile =
        serde_json::from_str(&text).with_context(|| format!("parsing case {}", path.display()))?;
    let catalog = file
        .catalog
        .build()
        .with_context(|| format!("building catalog from {}", path.display()))?;
    let (snapshot, provider) = file
        .grid
        .build(&catalog)
        .with_context(|| format!("resolving grid data of {}", path.display()))?;
    info!(
        case = %path.display(),
        cnecs = catalog.cnec_count(),
        contingencies = catalog.contingencies().count(),
        "case loaded"
    );
    Ok(LoadedCase {
        catalog,
        snapshot,
        provider,
    })
}

pub fn load_parameters(path: Option<&Path>) -> Result<RaoParameters> {
    match path {
        Some(path) => {
            RaoParameters::from_path(path).with_context(|| format!("loading parameters {}", path.display()))
        }
        None => Ok(RaoParameters::default()),
    }
}

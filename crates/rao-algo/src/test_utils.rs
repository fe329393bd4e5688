//! Fixtures shared by unit and integration tests.

use rao_core::{
    Catalog, CatalogDefinition, FlowResult, LinearGridModel, LinearGridSnapshot, LinearSensitivityProvider,
    RaoResult, SensitivityResult, Side,
};

pub fn catalog_from_json(text: &str) -> RaoResult<Catalog> {
    let definition: CatalogDefinition = serde_json::from_str(text)?;
    definition.build()
}

/// Sensitivity result holding side-one MW flows for the named CNECs.
/// Names missing from the catalog are ignored.
pub fn flows(catalog: &Catalog, values: &[(&str, f64)]) -> SensitivityResult {
    let mut flows = FlowResult::new();
    for (name, flow) in values {
        if let Some(id) = catalog.cnec_id(name) {
            flows.set_flow(id, Side::One, *flow);
        }
    }
    SensitivityResult::new(flows)
}

/// A catalog with its reference grid.
pub struct TestCase {
    pub catalog: Catalog,
    pub snapshot: LinearGridSnapshot,
    pub provider: LinearSensitivityProvider,
}

pub fn case_from_json(catalog: &str, grid: &str) -> RaoResult<TestCase> {
    let catalog = catalog_from_json(catalog)?;
    let model: LinearGridModel = serde_json::from_str(grid)?;
    let (snapshot, provider) = model.build(&catalog)?;
    Ok(TestCase {
        catalog,
        snapshot,
        provider,
    })
}

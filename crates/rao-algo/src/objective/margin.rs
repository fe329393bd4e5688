//! Margin computations on flow results.

use rao_core::{Catalog, CnecId, FlowResult, Side, Unit};

/// Smallest margin over the CNEC's sides that have a flow, in `unit`.
/// `None` when no side was computed.
pub fn cnec_margin(catalog: &Catalog, flows: &FlowResult, id: CnecId, unit: Unit) -> Option<f64> {
    side_margins(catalog, flows, id, unit)
        .map(|(_, margin)| margin)
        .reduce(f64::min)
}

/// Margins of every computed side of a CNEC.
pub fn side_margins<'a>(
    catalog: &'a Catalog,
    flows: &'a FlowResult,
    id: CnecId,
    unit: Unit,
) -> impl Iterator<Item = (Side, f64)> + 'a {
    let cnec = catalog.cnec(id);
    cnec.monitored_sides().into_iter().filter_map(move |side| {
        let flow = flows.flow(id, cnec, side, unit)?;
        Some((side, cnec.margin(flow, side, unit)))
    })
}

/// Positive margins are divided by the zonal PTDF sum (floored at
/// `lower_bound`); negative margins are kept absolute so overloads are never
/// discounted.
pub fn relative_margin(margin: f64, ptdf_zonal_sum: Option<f64>, lower_bound: f64) -> f64 {
    if margin <= 0.0 {
        return margin;
    }
    match ptdf_zonal_sum {
        Some(sum) => margin / sum.max(lower_bound),
        None => margin,
    }
}

/// Margin as seen by the objective: absolute or relative per side, then the
/// minimum over sides.
pub fn objective_margin(
    catalog: &Catalog,
    flows: &FlowResult,
    id: CnecId,
    unit: Unit,
    relative: Option<f64>,
) -> Option<f64> {
    side_margins(catalog, flows, id, unit)
        .map(|(side, margin)| match relative {
            Some(lower_bound) => relative_margin(margin, flows.ptdf_zonal_sum(id, side), lower_bound),
            None => margin,
        })
        .reduce(f64::min)
}

//! Dependency ordering for factor evaluation.
//!
//! Factors form a DAG over arena indices (catalog positions). Evaluation
//! order is computed once per catalog load; among ready nodes, lower catalog
//! index wins, so the order is fully deterministic.

use crate::analysis::factors::catalog::{FactorCatalog, FactorInput};

/// Compute a deterministic topological order of arena indices.
///
/// Returns an error naming the offending factor on a cycle or an unknown
/// factor reference. Layer inputs are external and never constrain the order.
pub fn topo_order(catalog: &FactorCatalog) -> Result<Vec<usize>, String> {
    let n = catalog.len();

    // Dependency edges as arena indices.
    let mut deps: Vec<Vec<usize>> = Vec::with_capacity(n);
    for spec in catalog.specs() {
        let mut spec_deps = Vec::new();
        for input in spec.formula.inputs() {
            if let FactorInput::Factor(dep_id) = input {
                match catalog.index_of(*dep_id) {
                    Some(idx) => spec_deps.push(idx),
                    None => {
                        return Err(format!(
                            "factor {} references unknown factor {}",
                            spec.id, dep_id
                        ))
                    }
                }
            }
        }
        deps.push(spec_deps);
    }

    let mut order = Vec::with_capacity(n);
    let mut placed = vec![false; n];

    // O(n²) ready-scan; n is the catalog size (tens), and scanning in index
    // order gives the deterministic tie-break for free.
    for _ in 0..n {
        let mut progressed = false;
        for idx in 0..n {
            if placed[idx] {
                continue;
            }
            if deps[idx].iter().all(|&d| placed[d]) {
                placed[idx] = true;
                order.push(idx);
                progressed = true;
            }
        }
        if order.len() == n {
            break;
        }
        if !progressed {
            let stuck = (0..n)
                .find(|&idx| !placed[idx])
                .map(|idx| catalog.specs()[idx].id.to_string())
                .unwrap_or_default();
            return Err(format!("factor dependency cycle involving {stuck}"));
        }
    }

    Ok(order)
}

/// Group a topological order into waves of mutually independent factors.
///
/// Factors within one wave share no dependency edge and may be evaluated in
/// parallel; waves run in sequence.
pub fn waves(catalog: &FactorCatalog, order: &[usize]) -> Vec<Vec<usize>> {
    let n = catalog.len();
    let mut depth = vec![0usize; n];

    for &idx in order {
        let spec = &catalog.specs()[idx];
        for input in spec.formula.inputs() {
            if let FactorInput::Factor(dep_id) = input {
                if let Some(dep_idx) = catalog.index_of(*dep_id) {
                    depth[idx] = depth[idx].max(depth[dep_idx] + 1);
                }
            }
        }
    }

    let max_depth = depth.iter().copied().max().unwrap_or(0);
    let mut waves = vec![Vec::new(); max_depth + 1];
    for &idx in order {
        waves[depth[idx]].push(idx);
    }
    waves.retain(|w| !w.is_empty());
    waves
}

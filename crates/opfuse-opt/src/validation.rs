//! Post-fusion partition checks.
//!
//! Verifies that the groups committed during a run form a partition of a
//! subset of the graph per family, and that every member still carries the
//! group id it was committed with. This never modifies the graph.

use std::collections::BTreeMap;

use opfuse_ir::{Graph, GroupId, NodeHandle};

use crate::error::FusionError;
use crate::runner::GroupRecord;

/// Checks `records` against the annotations on `graph`.
pub fn validate_partition(graph: &Graph, records: &[GroupRecord]) -> Result<(), FusionError> {
    let mut owner: BTreeMap<(&str, NodeHandle), GroupId> = BTreeMap::new();

    for record in records {
        for &n in &record.nodes {
            let name = || graph.node(n).name.clone();
            if let Some(first) = owner.insert((record.family.as_str(), n), record.id) {
                log::warn!(
                    "node '{}' committed twice in family '{}'",
                    graph.node(n).name,
                    record.family
                );
                return Err(FusionError::Overlap {
                    rule: record.rule.clone(),
                    graph: graph.name.clone(),
                    family: record.family.clone(),
                    node: name(),
                    first,
                    second: record.id,
                });
            }
            if graph.node(n).group(&record.family) != Some(record.id) {
                return Err(FusionError::GroupMismatch {
                    rule: record.rule.clone(),
                    graph: graph.name.clone(),
                    family: record.family.clone(),
                    node: name(),
                    expected: record.id,
                });
            }
        }
    }
    log::debug!(
        "graph '{}': {} committed group(s) validated",
        graph.name,
        records.len()
    );
    Ok(())
}

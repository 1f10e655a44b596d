use crate::errors::{TrellisError, TrellisResult};
use crate::graph::Graph;
use crate::types::OpId;
use std::collections::BTreeSet;

/// Audits the structural invariants of a graph: membership of every
/// cross-link, bidirectional agreement between tensors and operators,
/// link-set derivation, id uniqueness, and the no-orphan rule.
pub fn check(graph: &Graph) -> TrellisResult<()> {
    for (&id, tensor) in &graph.tensors {
        if tensor.fuid() != id {
            return Err(TrellisError::Malformed(format!(
                "tensor {} keyed under {}",
                tensor.fuid(),
                id
            )));
        }
        if tensor.source().is_none() && tensor.targets().is_empty() {
            return Err(TrellisError::Malformed(format!(
                "tensor {id} has neither source nor targets"
            )));
        }
        if let Some(src) = tensor.source() {
            let op = graph
                .get_op(src)
                .ok_or_else(|| TrellisError::Malformed(format!("tensor {id} sourced by missing {src}")))?;
            if !op.outputs().contains(&id) {
                return Err(TrellisError::Malformed(format!(
                    "tensor {id} claims source {src} but is not among its outputs"
                )));
            }
        }
        for &target in tensor.targets() {
            let op = graph.get_op(target).ok_or_else(|| {
                TrellisError::Malformed(format!("tensor {id} targeted by missing {target}"))
            })?;
            if !op.inputs().contains(&id) {
                return Err(TrellisError::Malformed(format!(
                    "tensor {id} lists consumer {target} that does not read it"
                )));
            }
        }
    }

    for (&id, op) in &graph.ops {
        if op.guid() != id {
            return Err(TrellisError::Malformed(format!(
                "operator {} keyed under {}",
                op.guid(),
                id
            )));
        }
        for &t in op.inputs() {
            let tensor = graph
                .get_tensor(t)
                .ok_or_else(|| TrellisError::Malformed(format!("{id} reads missing tensor {t}")))?;
            if !tensor.targets().contains(&id) {
                return Err(TrellisError::Malformed(format!(
                    "{id} reads {t} but is not among its targets"
                )));
            }
        }
        for &t in op.outputs() {
            let tensor = graph
                .get_tensor(t)
                .ok_or_else(|| TrellisError::Malformed(format!("{id} writes missing tensor {t}")))?;
            if tensor.source() != Some(id) {
                return Err(TrellisError::Malformed(format!(
                    "{id} writes {t} but is not its source"
                )));
            }
        }

        let derived_preds: BTreeSet<OpId> = op
            .inputs()
            .iter()
            .filter_map(|t| graph.get_tensor(*t).and_then(|t| t.source()))
            .collect();
        if *op.predecessors() != derived_preds {
            return Err(TrellisError::Malformed(format!(
                "{id} predecessor set disagrees with its input links"
            )));
        }
        let derived_succs: BTreeSet<OpId> = op
            .outputs()
            .iter()
            .filter_map(|t| graph.get_tensor(*t))
            .flat_map(|t| t.targets().iter().copied())
            .collect();
        if *op.successors() != derived_succs {
            return Err(TrellisError::Malformed(format!(
                "{id} successor set disagrees with its output links"
            )));
        }
        for neighbor in op.predecessors().iter().chain(op.successors()) {
            if graph.get_op(*neighbor).is_none() {
                return Err(TrellisError::Malformed(format!(
                    "{id} linked to missing operator {neighbor}"
                )));
            }
        }
    }

    Ok(())
}

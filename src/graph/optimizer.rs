use crate::errors::TrellisResult;
use crate::graph::node::OpKind;
use crate::graph::Graph;
use crate::types::{OpId, TensorId};

/// Two permutations of equal length whose composition `q[p[i]]` is the
/// identity.
fn is_inverse_pair(p: &[usize], q: &[usize]) -> bool {
    p.len() == q.len() && p.iter().enumerate().all(|(i, &pi)| q[pi] == i)
}

/// A permutation that fixes every position except it swaps the final
/// two.
fn swaps_last_two(permute: &[usize]) -> bool {
    let rank = permute.len();
    rank >= 2
        && permute[rank - 1] == rank - 2
        && permute[rank - 2] == rank - 1
        && permute[..rank - 2].iter().enumerate().all(|(i, &p)| p == i)
}

/// Removes `Transpose -> Transpose` pairs that compose to the identity.
/// Consumers of the second output are reconnected to the first input;
/// both operators and both produced tensors leave the graph. The scan
/// restarts after every change, since a removal can expose a new pair.
pub fn eliminate_inverse_transposes(graph: &mut Graph) -> TrellisResult<bool> {
    let mut changed = false;
    'restart: loop {
        for id in graph.op_ids() {
            let Some(first) = graph.get_op(id) else { continue };
            let OpKind::Transpose { permute: p } = first.kind() else {
                continue;
            };
            if first.inputs().len() != 1 || first.outputs().len() != 1 {
                continue;
            }
            let x = first.inputs()[0];
            let y = first.outputs()[0];
            if graph.tensor(y).targets().len() != 1 {
                continue;
            }
            let second_id = graph.tensor(y).targets()[0];
            if second_id == id {
                continue;
            }
            let second = graph.op(second_id);
            let OpKind::Transpose { permute: q } = second.kind() else {
                continue;
            };
            if second.outputs().len() != 1 || !is_inverse_pair(p, q) {
                continue;
            }
            let z = second.outputs()[0];
            if z == x {
                continue;
            }

            let consumers: Vec<OpId> = graph.tensor(z).targets().to_vec();
            graph.remove_op(id)?;
            graph.remove_op(second_id)?;
            for consumer in consumers {
                graph.rewire_input(consumer, z, x);
            }
            graph.remove_tensor(y)?;
            graph.remove_tensor(z)?;
            tracing::debug!(first = %id, second = %second_id, "eliminated inverse transpose pair");
            changed = true;
            continue 'restart;
        }
        break;
    }
    Ok(changed)
}

/// The transpose operator feeding `tensor`, if it swaps only the last
/// two dimensions.
fn last_two_swap_source(graph: &Graph, tensor: TensorId) -> Option<OpId> {
    let src = graph.tensor(tensor).source()?;
    let op = graph.op(src);
    let OpKind::Transpose { permute } = op.kind() else {
        return None;
    };
    (op.inputs().len() == 1 && swaps_last_two(permute)).then_some(src)
}

/// Folds last-two-dim transposes feeding a MatMul into its `trans_a` /
/// `trans_b` flags. Each rewrite replaces the MatMul with a fresh node
/// reading the transpose's input; the transpose itself is removed only
/// when no other consumer is left on its output. One operand per
/// rewrite, A side preferred; the fixpoint loop picks up the other side.
pub fn fuse_transpose_into_matmul(graph: &mut Graph) -> TrellisResult<bool> {
    let mut changed = false;
    'restart: loop {
        for id in graph.op_ids() {
            let Some(op) = graph.get_op(id) else { continue };
            let &OpKind::MatMul { trans_a, trans_b } = op.kind() else {
                continue;
            };
            if op.inputs().len() != 2 {
                continue;
            }
            let (a, b) = (op.inputs()[0], op.inputs()[1]);
            let outputs = op.outputs().to_vec();

            if let Some(transpose) = last_two_swap_source(graph, a) {
                let folded = graph.op(transpose).inputs()[0];
                graph.remove_op(id)?;
                let fused = graph.add_op(
                    OpKind::MatMul { trans_a: !trans_a, trans_b },
                    vec![folded, b],
                    outputs,
                )?;
                if graph.tensor(a).targets().is_empty() {
                    graph.remove_op(transpose)?;
                    graph.remove_tensor(a)?;
                }
                tracing::debug!(matmul = %id, fused = %fused, side = "a", "folded transpose into matmul");
                changed = true;
                continue 'restart;
            }

            if let Some(transpose) = last_two_swap_source(graph, b) {
                let folded = graph.op(transpose).inputs()[0];
                graph.remove_op(id)?;
                let fused = graph.add_op(
                    OpKind::MatMul { trans_a, trans_b: !trans_b },
                    vec![a, folded],
                    outputs,
                )?;
                if graph.tensor(b).targets().is_empty() {
                    graph.remove_op(transpose)?;
                    graph.remove_tensor(b)?;
                }
                tracing::debug!(matmul = %id, fused = %fused, side = "b", "folded transpose into matmul");
                changed = true;
                continue 'restart;
            }
        }
        break;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_pair_composition() {
        assert!(is_inverse_pair(&[2, 0, 1], &[1, 2, 0]));
        assert!(is_inverse_pair(&[1, 0], &[1, 0]));
        assert!(!is_inverse_pair(&[2, 0, 1], &[2, 0, 1]));
        assert!(!is_inverse_pair(&[1, 0], &[1, 2, 0]));
    }

    #[test]
    fn last_two_swap_detection() {
        assert!(swaps_last_two(&[1, 0]));
        assert!(swaps_last_two(&[0, 2, 1]));
        assert!(!swaps_last_two(&[2, 1, 0]));
        assert!(!swaps_last_two(&[0]));
    }
}

use std::rc::Rc;
use trellis::{CPURuntime, Graph, GraphBuilder, OpKind, Shape};

#[test]
fn test_inverse_transpose_elimination() {
    let mut graph = Graph::new(Rc::new(CPURuntime));
    let mut gb = GraphBuilder::new(&mut graph);

    // x -> T([2,0,1]) -> y -> T([1,2,0]) -> z -> Relu -> w
    let x = gb.tensor(&[2, 3, 4]);
    let y = gb.transpose(x, vec![2, 0, 1]).unwrap();
    let z = gb.transpose(y, vec![1, 2, 0]).unwrap();
    let w = gb.relu(z).unwrap();

    assert_eq!(graph.op_count(), 3);
    graph.optimize().unwrap();

    // Both transposes and their tensors are gone; the relu reads x.
    assert_eq!(graph.op_count(), 1);
    assert!(graph.get_tensor(y).is_none());
    assert!(graph.get_tensor(z).is_none());
    let relu = graph.operators().next().unwrap();
    assert!(matches!(relu.kind(), OpKind::Relu));
    assert_eq!(relu.inputs(), &[x]);
    assert_eq!(graph.tensor(x).targets(), &[relu.guid()]);
    assert_eq!(graph.tensor(w).shape(), &Shape::from([2, 3, 4]));
    graph.check_valid().unwrap();
}

#[test]
fn test_inverse_transpose_requires_identity_composition() {
    let mut graph = Graph::new(Rc::new(CPURuntime));
    let mut gb = GraphBuilder::new(&mut graph);

    let x = gb.tensor(&[2, 3, 4]);
    let y = gb.transpose(x, vec![2, 0, 1]).unwrap();
    let z = gb.transpose(y, vec![2, 0, 1]).unwrap();
    gb.relu(z).unwrap();

    graph.optimize().unwrap();

    // [2,0,1] twice is not the identity, so nothing may change.
    assert_eq!(graph.op_count(), 3);
    graph.check_valid().unwrap();
}

#[test]
fn test_transpose_matmul_fusion_rhs() {
    let mut graph = Graph::new(Rc::new(CPURuntime));
    let mut gb = GraphBuilder::new(&mut graph);

    let a = gb.tensor(&[2, 3]);
    let b0 = gb.tensor(&[4, 3]);
    let b = gb.transpose(b0, vec![1, 0]).unwrap();
    let c = gb.matmul(a, b).unwrap();

    graph.optimize().unwrap();

    assert_eq!(graph.op_count(), 1);
    assert!(graph.get_tensor(b).is_none());
    let matmul = graph.operators().next().unwrap();
    assert_eq!(
        matmul.kind(),
        &OpKind::MatMul {
            trans_a: false,
            trans_b: true,
        }
    );
    assert_eq!(matmul.inputs(), &[a, b0]);
    assert_eq!(matmul.outputs(), &[c]);
    assert_eq!(graph.tensor(c).source(), Some(matmul.guid()));
    assert_eq!(graph.tensor(c).shape(), &Shape::from([2, 4]));
    graph.check_valid().unwrap();
}

#[test]
fn test_transpose_matmul_fusion_lhs() {
    let mut graph = Graph::new(Rc::new(CPURuntime));
    let mut gb = GraphBuilder::new(&mut graph);

    let a0 = gb.tensor(&[3, 2]);
    let a = gb.transpose(a0, vec![1, 0]).unwrap();
    let b = gb.tensor(&[3, 4]);
    let c = gb.matmul(a, b).unwrap();

    graph.optimize().unwrap();

    assert_eq!(graph.op_count(), 1);
    let matmul = graph.operators().next().unwrap();
    assert_eq!(
        matmul.kind(),
        &OpKind::MatMul {
            trans_a: true,
            trans_b: false,
        }
    );
    assert_eq!(matmul.inputs(), &[a0, b]);
    assert_eq!(graph.tensor(c).shape(), &Shape::from([2, 4]));
    graph.check_valid().unwrap();
}

#[test]
fn test_fusion_keeps_shared_transpose() {
    let mut graph = Graph::new(Rc::new(CPURuntime));
    let mut gb = GraphBuilder::new(&mut graph);

    let a = gb.tensor(&[2, 3]);
    let b0 = gb.tensor(&[4, 3]);
    let b = gb.transpose(b0, vec![1, 0]).unwrap();
    let c = gb.matmul(a, b).unwrap();
    let kept = gb.relu(b).unwrap();

    graph.optimize().unwrap();

    // The transpose still feeds the relu, so it and b survive; only the
    // matmul edge was rewritten.
    assert_eq!(graph.op_count(), 3);
    let b_tensor = graph.tensor(b);
    assert!(b_tensor.source().is_some());
    assert_eq!(b_tensor.targets().len(), 1);

    let matmul = graph
        .operators()
        .find(|op| matches!(op.kind(), OpKind::MatMul { .. }))
        .unwrap();
    assert_eq!(
        matmul.kind(),
        &OpKind::MatMul {
            trans_a: false,
            trans_b: true,
        }
    );
    assert_eq!(matmul.inputs(), &[a, b0]);
    assert_eq!(graph.tensor(c).source(), Some(matmul.guid()));
    assert_eq!(graph.tensor(kept).shape(), &Shape::from([3, 4]));
    graph.check_valid().unwrap();
}

#[test]
fn test_fusion_handles_batched_operands() {
    let mut graph = Graph::new(Rc::new(CPURuntime));
    let mut gb = GraphBuilder::new(&mut graph);

    let a = gb.tensor(&[5, 2, 3]);
    let b0 = gb.tensor(&[5, 4, 3]);
    let b = gb.transpose(b0, vec![0, 2, 1]).unwrap();
    let c = gb.matmul(a, b).unwrap();

    graph.optimize().unwrap();

    assert_eq!(graph.op_count(), 1);
    let matmul = graph.operators().next().unwrap();
    assert_eq!(
        matmul.kind(),
        &OpKind::MatMul {
            trans_a: false,
            trans_b: true,
        }
    );
    assert_eq!(graph.tensor(c).shape(), &Shape::from([5, 2, 4]));
    graph.check_valid().unwrap();
}

#[test]
fn test_non_tail_permutation_is_not_fused() {
    let mut graph = Graph::new(Rc::new(CPURuntime));
    let mut gb = GraphBuilder::new(&mut graph);

    let a = gb.tensor(&[5, 2, 3]);
    let b0 = gb.tensor(&[4, 3, 5]);
    // [2,1,0] touches the batch dimension: not foldable.
    let b = gb.transpose(b0, vec![2, 1, 0]).unwrap();
    gb.matmul(a, b).unwrap();

    graph.optimize().unwrap();

    assert_eq!(graph.op_count(), 2);
    graph.check_valid().unwrap();
}

#[test]
fn test_optimize_is_idempotent() {
    let mut graph = Graph::new(Rc::new(CPURuntime));
    let mut gb = GraphBuilder::new(&mut graph);

    let x = gb.tensor(&[2, 3, 4]);
    let y = gb.transpose(x, vec![2, 0, 1]).unwrap();
    let z = gb.transpose(y, vec![1, 2, 0]).unwrap();
    let a = gb.tensor(&[2, 3]);
    let b0 = gb.tensor(&[4, 3]);
    let b = gb.transpose(b0, vec![1, 0]).unwrap();
    gb.matmul(a, b).unwrap();
    gb.relu(z).unwrap();

    graph.optimize().unwrap();
    let once = graph.to_string();
    graph.optimize().unwrap();
    assert_eq!(graph.to_string(), once);
    graph.check_valid().unwrap();
}

#[test]
fn test_optimize_noop_on_empty_graph() {
    let mut graph = Graph::new(Rc::new(CPURuntime));
    graph.optimize().unwrap();
    assert_eq!(graph.op_count(), 0);
    assert_eq!(graph.tensor_count(), 0);
}

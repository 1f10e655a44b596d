use crate::errors::{TrellisError, TrellisResult};
use crate::types::{OpId, Shape, TensorId};
use crate::utils::{broadcast_shapes, normalize_axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Operator kind together with its typed attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    MatMul { trans_a: bool, trans_b: bool },
    Transpose { permute: Vec<usize> },
    Concat { dim: i64 },
    Add,
    Relu,
    Fill { value: f32, shape: Vec<usize> },
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::MatMul { .. } => "MatMul",
            OpKind::Transpose { .. } => "Transpose",
            OpKind::Concat { .. } => "Concat",
            OpKind::Add => "Add",
            OpKind::Relu => "Relu",
            OpKind::Fill { .. } => "Fill",
        }
    }

    /// Output shapes for the given input shapes. Total over well-typed
    /// inputs; rank or dimension disagreement is an error.
    pub fn infer_shape(&self, inputs: &[Shape]) -> TrellisResult<Vec<Shape>> {
        match self {
            OpKind::MatMul { trans_a, trans_b } => {
                self.expect_arity(inputs, 2)?;
                let (a, b) = (&inputs[0], &inputs[1]);
                for side in [a, b] {
                    if side.ndim() < 2 {
                        return Err(TrellisError::RankTooSmall {
                            kind: self.name(),
                            min: 2,
                            found: side.as_slice().to_vec(),
                        });
                    }
                }
                let (ad, bd) = (a.as_slice(), b.as_slice());
                let (ra, rb) = (ad.len(), bd.len());
                let (m, ka) = if *trans_a {
                    (ad[ra - 1], ad[ra - 2])
                } else {
                    (ad[ra - 2], ad[ra - 1])
                };
                let (kb, n) = if *trans_b {
                    (bd[rb - 1], bd[rb - 2])
                } else {
                    (bd[rb - 2], bd[rb - 1])
                };
                if ka != kb {
                    return Err(TrellisError::IncompatibleShapes {
                        expected: vec![ka],
                        found: vec![kb],
                    });
                }
                let mut out = broadcast_shapes(&ad[..ra - 2], &bd[..rb - 2])?;
                out.push(m);
                out.push(n);
                Ok(vec![out.into()])
            }
            OpKind::Transpose { permute } => {
                self.expect_arity(inputs, 1)?;
                let dims = inputs[0].as_slice();
                if !is_permutation(permute, dims.len()) {
                    return Err(TrellisError::BadPermutation {
                        permute: permute.clone(),
                        rank: dims.len(),
                    });
                }
                let out: Vec<usize> = permute.iter().map(|&i| dims[i]).collect();
                Ok(vec![out.into()])
            }
            OpKind::Concat { dim } => {
                if inputs.is_empty() {
                    return Err(TrellisError::WrongArity {
                        kind: self.name(),
                        expected: 1,
                        found: 0,
                    });
                }
                let first = inputs[0].as_slice();
                let axis = normalize_axis(*dim, first.len())?;
                let mut out = first.to_vec();
                for shape in &inputs[1..] {
                    let dims = shape.as_slice();
                    if dims.len() != first.len() {
                        return Err(TrellisError::IncompatibleShapes {
                            expected: first.to_vec(),
                            found: dims.to_vec(),
                        });
                    }
                    for (i, (&d, &f)) in dims.iter().zip(first).enumerate() {
                        if i != axis && d != f {
                            return Err(TrellisError::IncompatibleShapes {
                                expected: first.to_vec(),
                                found: dims.to_vec(),
                            });
                        }
                    }
                    out[axis] += dims[axis];
                }
                Ok(vec![out.into()])
            }
            OpKind::Add => {
                self.expect_arity(inputs, 2)?;
                let out = broadcast_shapes(inputs[0].as_slice(), inputs[1].as_slice())?;
                Ok(vec![out.into()])
            }
            OpKind::Relu => {
                self.expect_arity(inputs, 1)?;
                Ok(vec![inputs[0].clone()])
            }
            OpKind::Fill { shape, .. } => {
                self.expect_arity(inputs, 0)?;
                Ok(vec![shape.clone().into()])
            }
        }
    }

    fn expect_arity(&self, inputs: &[Shape], expected: usize) -> TrellisResult<()> {
        if inputs.len() != expected {
            return Err(TrellisError::WrongArity {
                kind: self.name(),
                expected,
                found: inputs.len(),
            });
        }
        Ok(())
    }
}

fn is_permutation(permute: &[usize], rank: usize) -> bool {
    if permute.len() != rank {
        return false;
    }
    let mut seen = vec![false; rank];
    for &p in permute {
        if p >= rank || seen[p] {
            return false;
        }
        seen[p] = true;
    }
    true
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::MatMul { trans_a, trans_b } => {
                write!(f, "MatMul(trans_a={trans_a}, trans_b={trans_b})")
            }
            OpKind::Transpose { permute } => write!(f, "Transpose(permute={permute:?})"),
            OpKind::Concat { dim } => write!(f, "Concat(dim={dim})"),
            OpKind::Add => write!(f, "Add"),
            OpKind::Relu => write!(f, "Relu"),
            OpKind::Fill { value, shape } => write!(f, "Fill(value={value}, shape={shape:?})"),
        }
    }
}

/// A computation node: consumes and produces tensors, all referenced by
/// id through the owning graph.
#[derive(Debug)]
pub struct Operator {
    guid: OpId,
    kind: OpKind,
    pub(crate) inputs: Vec<TensorId>,
    pub(crate) outputs: Vec<TensorId>,
    pub(crate) predecessors: BTreeSet<OpId>,
    pub(crate) successors: BTreeSet<OpId>,
}

impl Operator {
    pub(crate) fn new(
        guid: OpId,
        kind: OpKind,
        inputs: Vec<TensorId>,
        outputs: Vec<TensorId>,
        predecessors: BTreeSet<OpId>,
        successors: BTreeSet<OpId>,
    ) -> Self {
        Self {
            guid,
            kind,
            inputs,
            outputs,
            predecessors,
            successors,
        }
    }

    pub fn guid(&self) -> OpId {
        self.guid
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    pub fn predecessors(&self) -> &BTreeSet<OpId> {
        &self.predecessors
    }

    pub fn successors(&self) -> &BTreeSet<OpId> {
        &self.successors
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_ops = |ids: &mut dyn Iterator<Item = &OpId>| -> String {
            ids.map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
        };
        let fmt_tensors = |ids: &[TensorId]| -> String {
            ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
        };
        write!(
            f,
            "{} {}, pred=[{}], succ=[{}], in=[{}], out=[{}]",
            self.guid,
            self.kind,
            fmt_ops(&mut self.predecessors.iter()),
            fmt_ops(&mut self.successors.iter()),
            fmt_tensors(&self.inputs),
            fmt_tensors(&self.outputs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matmul_respects_transpose_flags() {
        let kind = OpKind::MatMul {
            trans_a: false,
            trans_b: true,
        };
        let out = kind
            .infer_shape(&[Shape::from([2, 3]), Shape::from([4, 3])])
            .unwrap();
        assert_eq!(out, vec![Shape::from([2, 4])]);
    }

    #[test]
    fn matmul_broadcasts_batch_dims() {
        let kind = OpKind::MatMul {
            trans_a: false,
            trans_b: false,
        };
        let out = kind
            .infer_shape(&[Shape::from([4, 1, 5, 6]), Shape::from([1, 7, 6, 2])])
            .unwrap();
        assert_eq!(out, vec![Shape::from([4, 7, 5, 2])]);
    }

    #[test]
    fn matmul_rejects_inner_mismatch() {
        let kind = OpKind::MatMul {
            trans_a: false,
            trans_b: false,
        };
        assert!(kind
            .infer_shape(&[Shape::from([2, 3]), Shape::from([4, 5])])
            .is_err());
    }

    #[test]
    fn transpose_permutes_dims() {
        let kind = OpKind::Transpose {
            permute: vec![2, 0, 1],
        };
        let out = kind.infer_shape(&[Shape::from([2, 3, 4])]).unwrap();
        assert_eq!(out, vec![Shape::from([4, 2, 3])]);
    }

    #[test]
    fn transpose_rejects_bad_permutation() {
        let kind = OpKind::Transpose {
            permute: vec![0, 0, 1],
        };
        assert!(kind.infer_shape(&[Shape::from([2, 3, 4])]).is_err());
    }

    #[test]
    fn concat_sums_along_normalized_axis() {
        let kind = OpKind::Concat { dim: -1 };
        let out = kind
            .infer_shape(&[Shape::from([2, 3]), Shape::from([2, 5])])
            .unwrap();
        assert_eq!(out, vec![Shape::from([2, 8])]);
    }

    #[test]
    fn concat_rejects_mismatched_other_dims() {
        let kind = OpKind::Concat { dim: 1 };
        assert!(kind
            .infer_shape(&[Shape::from([2, 3]), Shape::from([3, 5])])
            .is_err());
    }
}

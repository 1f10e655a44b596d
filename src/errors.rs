use crate::types::{OpId, TensorId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrellisError {
    #[error("incompatible shapes: expected {expected:?}, found {found:?}")]
    IncompatibleShapes { expected: Vec<usize>, found: Vec<usize> },
    #[error("cannot broadcast {lhs:?} with {rhs:?}")]
    BroadcastMismatch { lhs: Vec<usize>, rhs: Vec<usize> },
    #[error("{kind} expects rank of at least {min}, found shape {found:?}")]
    RankTooSmall { kind: &'static str, min: usize, found: Vec<usize> },
    #[error("{permute:?} is not a permutation of rank {rank}")]
    BadPermutation { permute: Vec<usize>, rank: usize },
    #[error("axis {axis} out of range for rank {rank}")]
    AxisOutOfRange { axis: i64, rank: usize },
    #[error("{kind} expects {expected} inputs, found {found}")]
    WrongArity { kind: &'static str, expected: usize, found: usize },
    #[error("graph contains a cycle")]
    Cycle,
    #[error("tensor {0} is not in this graph")]
    UnknownTensor(TensorId),
    #[error("operator {0} is not in this graph")]
    UnknownOperator(OpId),
    #[error("tensor {0} already has a producing operator")]
    SourceConflict(TensorId),
    #[error("tensor {0} was created by a different runtime")]
    RuntimeMismatch(TensorId),
    #[error("a tensor with id {0} is already in this graph")]
    DuplicateFuid(TensorId),
    #[error("tensor {0} is still linked to an operator")]
    TensorInUse(TensorId),
    #[error("arena is already committed to a device buffer")]
    ArenaCommitted,
    #[error("malformed graph: {0}")]
    Malformed(String),
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

pub type TrellisResult<T> = Result<T, TrellisError>;

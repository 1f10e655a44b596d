pub mod storage;
pub use storage::ArenaBinding;

use crate::runtime::Runtime;
use crate::types::{OpId, Shape, TensorId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DType {
    #[default]
    F32,
    F16,
    I64,
    I32,
    U8,
    Bool,
}

impl DType {
    pub fn size(&self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F16 => 2,
            DType::I64 => 8,
            DType::U8 | DType::Bool => 1,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::I64 => "i64",
            DType::I32 => "i32",
            DType::U8 => "u8",
            DType::Bool => "bool",
        };
        write!(f, "{name}")
    }
}

/// A node in the dataflow graph: shape, element type, identity, and its
/// links to the operator that produces it and the operators that consume
/// it. Carries no data; after planning, `storage` binds it to a slice of
/// the graph's arena.
#[derive(Debug)]
pub struct Tensor {
    fuid: TensorId,
    shape: Shape,
    dtype: DType,
    pub(crate) source: Option<OpId>,
    pub(crate) targets: Vec<OpId>,
    pub(crate) storage: Option<ArenaBinding>,
    pub(crate) runtime: Rc<dyn Runtime>,
}

impl Tensor {
    pub fn new(shape: impl Into<Shape>, dtype: DType, runtime: Rc<dyn Runtime>) -> Self {
        Self {
            fuid: TensorId::fresh(),
            shape: shape.into(),
            dtype,
            source: None,
            targets: Vec::new(),
            storage: None,
            runtime,
        }
    }

    pub fn fuid(&self) -> TensorId {
        self.fuid
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub(crate) fn set_shape(&mut self, shape: Shape) {
        self.shape = shape;
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Total byte size once planned into the arena.
    pub fn bytes(&self) -> usize {
        self.numel() * self.dtype.size()
    }

    /// The producing operator, if any. A tensor without one is a graph
    /// input.
    pub fn source(&self) -> Option<OpId> {
        self.source
    }

    /// Consuming operators, in insertion order.
    pub fn targets(&self) -> &[OpId] {
        &self.targets
    }

    pub fn storage(&self) -> Option<&ArenaBinding> {
        self.storage.as_ref()
    }

    pub fn runtime(&self) -> &Rc<dyn Runtime> {
        &self.runtime
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}{}", self.fuid, self.dtype, self.shape)?;
        match self.source {
            Some(src) => write!(f, ", source={src}")?,
            None => write!(f, ", source=none")?,
        }
        write!(f, ", targets=[")?;
        for (i, t) in self.targets.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{t}")?;
        }
        write!(f, "]")?;
        if let Some(binding) = &self.storage {
            write!(f, ", offset={}", binding.offset)?;
        }
        Ok(())
    }
}

use crate::errors::{TrellisError, TrellisResult};
use crate::graph::node::OpKind;
use crate::graph::Graph;
use crate::tensor::DType;
use crate::types::{Shape, TensorId};

/// Thin operator factories over a graph: each helper infers the output
/// shape up front, declares the output tensor, and cross-links the
/// operator through `add_op`.
pub struct GraphBuilder<'a> {
    graph: &'a mut Graph,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(graph: &'a mut Graph) -> Self {
        Self { graph }
    }

    /// Declares a graph-input tensor with the default element type.
    pub fn tensor(&mut self, dims: &[usize]) -> TensorId {
        self.graph.add_tensor(dims, DType::default())
    }

    pub fn tensor_of(&mut self, dims: &[usize], dtype: DType) -> TensorId {
        self.graph.add_tensor(dims, dtype)
    }

    pub fn matmul(&mut self, a: TensorId, b: TensorId) -> TrellisResult<TensorId> {
        self.apply(
            OpKind::MatMul {
                trans_a: false,
                trans_b: false,
            },
            vec![a, b],
        )
    }

    pub fn matmul_t(
        &mut self,
        a: TensorId,
        b: TensorId,
        trans_a: bool,
        trans_b: bool,
    ) -> TrellisResult<TensorId> {
        self.apply(OpKind::MatMul { trans_a, trans_b }, vec![a, b])
    }

    pub fn transpose(&mut self, x: TensorId, permute: Vec<usize>) -> TrellisResult<TensorId> {
        self.apply(OpKind::Transpose { permute }, vec![x])
    }

    pub fn concat(&mut self, inputs: Vec<TensorId>, dim: i64) -> TrellisResult<TensorId> {
        self.apply(OpKind::Concat { dim }, inputs)
    }

    pub fn add(&mut self, a: TensorId, b: TensorId) -> TrellisResult<TensorId> {
        self.apply(OpKind::Add, vec![a, b])
    }

    pub fn relu(&mut self, x: TensorId) -> TrellisResult<TensorId> {
        self.apply(OpKind::Relu, vec![x])
    }

    pub fn fill(&mut self, value: f32, dims: &[usize]) -> TrellisResult<TensorId> {
        self.apply(
            OpKind::Fill {
                value,
                shape: dims.to_vec(),
            },
            Vec::new(),
        )
    }

    fn apply(&mut self, kind: OpKind, inputs: Vec<TensorId>) -> TrellisResult<TensorId> {
        let mut input_shapes = Vec::with_capacity(inputs.len());
        let mut dtype = DType::default();
        for (i, &t) in inputs.iter().enumerate() {
            let tensor = self
                .graph
                .get_tensor(t)
                .ok_or(TrellisError::UnknownTensor(t))?;
            if i == 0 {
                dtype = tensor.dtype();
            }
            input_shapes.push(tensor.shape().clone());
        }
        let out_shapes: Vec<Shape> = kind.infer_shape(&input_shapes)?;
        let outputs: Vec<TensorId> = out_shapes
            .into_iter()
            .map(|shape| self.graph.add_tensor(shape, dtype))
            .collect();
        let first = outputs[0];
        self.graph.add_op(kind, inputs, outputs)?;
        Ok(first)
    }
}

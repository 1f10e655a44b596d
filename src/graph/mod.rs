pub mod dsl;
pub mod memory_planner;
pub mod node;
pub mod optimizer;
pub mod verifier;

use crate::errors::{TrellisError, TrellisResult};
use crate::runtime::Runtime;
use crate::tensor::{ArenaBinding, DType, Tensor};
use crate::types::{OpId, Shape, TensorId};
use memory_planner::Allocator;
use node::{OpKind, Operator};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

/// The dataflow graph: single owner of all tensors and operators, with
/// every cross-link an id resolved through it.
#[derive(Debug)]
pub struct Graph {
    pub(crate) tensors: BTreeMap<TensorId, Tensor>,
    pub(crate) ops: BTreeMap<OpId, Operator>,
    pub(crate) tensor_order: Vec<TensorId>,
    /// Insertion order until `topo_sort` rewrites it to topological order.
    pub(crate) order: Vec<OpId>,
    pub(crate) sorted: bool,
    allocator: Allocator,
    runtime: Rc<dyn Runtime>,
}

impl Graph {
    pub fn new(runtime: Rc<dyn Runtime>) -> Self {
        Self {
            tensors: BTreeMap::new(),
            ops: BTreeMap::new(),
            tensor_order: Vec::new(),
            order: Vec::new(),
            sorted: false,
            allocator: Allocator::new(runtime.clone()),
            runtime,
        }
    }

    pub fn add_tensor(&mut self, shape: impl Into<Shape>, dtype: DType) -> TensorId {
        let tensor = Tensor::new(shape, dtype, self.runtime.clone());
        let id = tensor.fuid();
        self.tensors.insert(id, tensor);
        self.tensor_order.push(id);
        self.sorted = false;
        id
    }

    pub fn adopt_tensor(&mut self, tensor: Tensor) -> TrellisResult<TensorId> {
        let id = tensor.fuid();
        if !Rc::ptr_eq(tensor.runtime(), &self.runtime) {
            return Err(TrellisError::RuntimeMismatch(id));
        }
        if self.tensors.contains_key(&id) {
            return Err(TrellisError::DuplicateFuid(id));
        }
        if tensor.source().is_some() || !tensor.targets().is_empty() {
            return Err(TrellisError::TensorInUse(id));
        }
        self.tensors.insert(id, tensor);
        self.tensor_order.push(id);
        self.sorted = false;
        Ok(id)
    }

    pub fn add_op(
        &mut self,
        kind: OpKind,
        inputs: Vec<TensorId>,
        outputs: Vec<TensorId>,
    ) -> TrellisResult<OpId> {
        for &t in inputs.iter().chain(outputs.iter()) {
            if !self.tensors.contains_key(&t) {
                return Err(TrellisError::UnknownTensor(t));
            }
        }
        for &t in &outputs {
            if self.tensors[&t].source().is_some() {
                return Err(TrellisError::SourceConflict(t));
            }
        }

        let id = OpId::fresh();
        for &t in &inputs {
            let tensor = self.tensor_mut(t);
            if !tensor.targets.contains(&id) {
                tensor.targets.push(id);
            }
        }
        for &t in &outputs {
            self.tensor_mut(t).source = Some(id);
        }

        let predecessors: BTreeSet<OpId> = inputs
            .iter()
            .filter_map(|t| self.tensors[t].source())
            .collect();
        let successors: BTreeSet<OpId> = outputs
            .iter()
            .flat_map(|t| self.tensors[t].targets().iter().copied())
            .collect();
        for &p in &predecessors {
            if p != id {
                self.op_mut(p).successors.insert(id);
            }
        }
        for &s in &successors {
            if s != id {
                self.op_mut(s).predecessors.insert(id);
            }
        }

        self.ops
            .insert(id, Operator::new(id, kind, inputs, outputs, predecessors, successors));
        self.order.push(id);
        self.sorted = false;
        Ok(id)
    }

    pub fn remove_op(&mut self, id: OpId) -> TrellisResult<()> {
        let op = self.ops.remove(&id).ok_or(TrellisError::UnknownOperator(id))?;
        for &t in &op.inputs {
            self.tensor_mut(t).targets.retain(|&o| o != id);
        }
        for &t in &op.outputs {
            self.tensor_mut(t).source = None;
        }
        self.order.retain(|&o| o != id);
        for &n in op.predecessors.iter().chain(op.successors.iter()) {
            if n != id {
                self.refresh_links(n);
            }
        }
        self.sorted = false;
        Ok(())
    }

    pub fn remove_tensor(&mut self, id: TensorId) -> TrellisResult<()> {
        let tensor = self.tensors.get(&id).ok_or(TrellisError::UnknownTensor(id))?;
        if tensor.source().is_some() || !tensor.targets().is_empty() {
            return Err(TrellisError::TensorInUse(id));
        }
        self.tensors.remove(&id);
        self.tensor_order.retain(|&t| t != id);
        self.sorted = false;
        Ok(())
    }

    pub fn inputs(&self) -> Vec<TensorId> {
        self.tensor_order
            .iter()
            .copied()
            .filter(|t| self.tensors[t].source().is_none())
            .collect()
    }

    pub fn outputs(&self) -> Vec<TensorId> {
        self.tensor_order
            .iter()
            .copied()
            .filter(|t| self.tensors[t].targets().is_empty())
            .collect()
    }

    pub fn tensor(&self, id: TensorId) -> &Tensor {
        &self.tensors[&id]
    }

    pub fn get_tensor(&self, id: TensorId) -> Option<&Tensor> {
        self.tensors.get(&id)
    }

    pub fn op(&self, id: OpId) -> &Operator {
        &self.ops[&id]
    }

    pub fn get_op(&self, id: OpId) -> Option<&Operator> {
        self.ops.get(&id)
    }

    pub fn tensors(&self) -> impl Iterator<Item = &Tensor> {
        self.tensor_order.iter().map(|id| &self.tensors[id])
    }

    pub fn operators(&self) -> impl Iterator<Item = &Operator> {
        self.order.iter().map(|id| &self.ops[id])
    }

    pub fn op_ids(&self) -> Vec<OpId> {
        self.order.clone()
    }

    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    pub fn tensor_count(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    pub fn runtime(&self) -> &Rc<dyn Runtime> {
        &self.runtime
    }

    pub(crate) fn tensor_mut(&mut self, id: TensorId) -> &mut Tensor {
        self.tensors.get_mut(&id).expect("tensor id outside graph")
    }

    pub(crate) fn op_mut(&mut self, id: OpId) -> &mut Operator {
        self.ops.get_mut(&id).expect("operator id outside graph")
    }

    pub(crate) fn refresh_links(&mut self, id: OpId) {
        let Some(op) = self.ops.get(&id) else { return };
        let inputs = op.inputs.clone();
        let outputs = op.outputs.clone();
        let predecessors: BTreeSet<OpId> = inputs
            .iter()
            .filter_map(|t| self.tensors.get(t).and_then(|t| t.source()))
            .collect();
        let successors: BTreeSet<OpId> = outputs
            .iter()
            .filter_map(|t| self.tensors.get(t))
            .flat_map(|t| t.targets().iter().copied())
            .collect();
        let op = self.op_mut(id);
        op.predecessors = predecessors;
        op.successors = successors;
    }

    /// Redirects every use of `from` in `id`'s input list to `to`,
    /// keeping target lists and neighbor link sets consistent.
    pub(crate) fn rewire_input(&mut self, id: OpId, from: TensorId, to: TensorId) {
        let op = self.op_mut(id);
        for t in op.inputs.iter_mut() {
            if *t == from {
                *t = to;
            }
        }
        if let Some(tensor) = self.tensors.get_mut(&from) {
            tensor.targets.retain(|&o| o != id);
        }
        let tensor = self.tensor_mut(to);
        if !tensor.targets.contains(&id) {
            tensor.targets.push(id);
        }
        self.refresh_links(id);
        let from_source = self.tensors.get(&from).and_then(|t| t.source());
        if let Some(src) = from_source {
            self.refresh_links(src);
        }
        let to_source = self.tensors[&to].source();
        if let Some(src) = to_source {
            self.refresh_links(src);
        }
        self.sorted = false;
    }

    /// Kahn-style fixpoint sort of the operator list, stable among ready
    /// operators. Returns `false` on a cycle and leaves the list untouched.
    pub fn topo_sort(&mut self) -> bool {
        let mut emitted: BTreeSet<OpId> = BTreeSet::new();
        let mut new_order: Vec<OpId> = Vec::with_capacity(self.order.len());
        loop {
            let mut progressed = false;
            for &id in &self.order {
                if emitted.contains(&id) {
                    continue;
                }
                let ready = self.ops[&id].inputs().iter().all(|t| {
                    match self.tensors[t].source() {
                        None => true,
                        Some(src) => emitted.contains(&src),
                    }
                });
                if ready {
                    emitted.insert(id);
                    new_order.push(id);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        if new_order.len() != self.order.len() {
            return false;
        }
        self.order = new_order;
        self.sorted = true;
        true
    }

    /// Propagates shapes in topological order, overwriting any output
    /// whose recorded shape disagrees with its operator's inference.
    pub fn shape_infer(&mut self) -> TrellisResult<()> {
        if !self.sorted && !self.topo_sort() {
            return Err(TrellisError::Cycle);
        }
        for id in self.order.clone() {
            let op = &self.ops[&id];
            let input_shapes: Vec<Shape> = op
                .inputs()
                .iter()
                .map(|t| self.tensors[t].shape().clone())
                .collect();
            let inferred = op.kind().infer_shape(&input_shapes)?;
            let outputs = op.outputs().to_vec();
            if inferred.len() != outputs.len() {
                return Err(TrellisError::Malformed(format!(
                    "{} inferred {} shapes for {} outputs",
                    id,
                    inferred.len(),
                    outputs.len()
                )));
            }
            for (tid, shape) in outputs.into_iter().zip(inferred) {
                let tensor = self.tensor_mut(tid);
                if *tensor.shape() != shape {
                    tensor.set_shape(shape);
                }
            }
        }
        Ok(())
    }

    /// Runs the registered rewrite passes until a full iteration reports
    /// no change.
    pub fn optimize(&mut self) -> TrellisResult<()> {
        loop {
            let mut changed = false;
            changed |= optimizer::eliminate_inverse_transposes(self)?;
            changed |= optimizer::fuse_transpose_into_matmul(self)?;
            if !changed {
                return Ok(());
            }
        }
    }

    /// Plans an arena offset for every tensor, commits the single device
    /// buffer, and binds each tensor's storage. Once per graph.
    pub fn data_malloc(&mut self) -> TrellisResult<()> {
        if self.allocator.is_committed() {
            return Err(TrellisError::ArenaCommitted);
        }
        if !self.topo_sort() {
            return Err(TrellisError::Cycle);
        }
        let mut planned = Vec::with_capacity(self.tensor_order.len());
        for &id in &self.tensor_order {
            let bytes = self.tensors[&id].bytes();
            planned.push((id, self.allocator.alloc(bytes), bytes));
        }
        let base = self.allocator.get_ptr()?;
        for (id, offset, bytes) in planned {
            let ptr = unsafe { NonNull::new_unchecked(base.as_ptr().add(offset)) };
            self.tensor_mut(id).storage = Some(ArenaBinding { offset, bytes, ptr });
        }
        Ok(())
    }

    pub fn check_valid(&self) -> TrellisResult<()> {
        verifier::check(self)
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "graph {{ runtime: {}, operators: {}, tensors: {}, sorted: {} }}",
            self.runtime.name(),
            self.ops.len(),
            self.tensors.len(),
            self.sorted
        )?;
        for op in self.operators() {
            writeln!(f, "  {op}")?;
        }
        for tensor in self.tensors() {
            writeln!(f, "  {tensor}")?;
        }
        Ok(())
    }
}

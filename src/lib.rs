pub mod errors;
pub mod graph;
pub mod runtime;
pub mod tensor;
pub mod types;
pub mod utils;

pub use errors::{TrellisError, TrellisResult};
pub use graph::dsl::GraphBuilder;
pub use graph::memory_planner::Allocator;
pub use graph::node::{OpKind, Operator};
pub use graph::Graph;
pub use runtime::cpu::CPURuntime;
pub use runtime::Runtime;
pub use tensor::{ArenaBinding, DType, Tensor};
pub use types::{OpId, Shape, TensorId};

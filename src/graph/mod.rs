//! Foundational abstractions of the execution core: shapes, variables,
//! buffers, per-batch state and the operator table.
//!
//! ## Key Components
//! 1. **Shapes and Variables**:
//!    - [`Shape`] describes dimensions and derives element counts and byte
//!      capacities.
//!    - [`Variable`] names a tensor and binds it onto a [`DataBuffer`]
//!      without copying; [`LocalVariable`] resolves one physical instance
//!      per concurrent execution slot.
//!
//! 2. **Memory Protocol**:
//!    - [`MemoryRequirements`] declares an operator's byte footprint once
//!      at setup, for the external arena allocator.
//!    - [`DataBuffer`] is a shared byte-addressable view with offset-exact
//!      `f32` access.
//!
//! 3. **Execution Model**:
//!    - [`Batch`] carries one pass's input window and produced outputs.
//!    - [`Graph`] owns the operators; peer and upstream links are ids into
//!      the table, never object back-references.
//!    - [`ComputeContext`](operator::ComputeContext) passes all per-call
//!      state into kernels explicitly.

pub mod batch;
pub mod buffer;
pub mod memory;
pub mod model;
pub mod operator;
pub mod shape;
pub mod variable;

pub use batch::{Batch, InputWindow};
pub use buffer::DataBuffer;
pub use memory::MemoryRequirements;
pub use model::Model;
pub use operator::{Graph, GraphError, Operator, OperatorId};
pub use shape::Shape;
pub use variable::{LocalVariable, Variable};

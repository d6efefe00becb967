//! The computation units behind graph operators.
//!
//! One [`Kernel`] implementation exists per operator type and pass
//! direction (e.g. ReLU forward, ReLU gradient). A kernel's configuration
//! is immutable after [`setup`](Kernel::setup); everything mutable during
//! [`compute`](Kernel::compute) flows through the per-invocation context
//! and the slot-indexed [`LocalVariable`](crate::graph::LocalVariable)
//! pools, which is what makes one kernel instance safe to share across
//! concurrently executing batches.

use derive_more::Display;
use thiserror::Error;

use crate::{
    device::{DeviceError, KernelRegistry},
    graph::{model::Model, operator::Operator, shape::Shape},
};

pub use crate::graph::{memory::MemoryRequirements, operator::ComputeContext};
pub use lrn::{LrnConf, LrnGradient};
pub use relu::{Relu, ReluConf, ReluGradient};

pub mod lrn;
pub mod relu;

#[derive(Debug, Error)]
pub enum KernelError {
    /// Invalid configuration: the kernel supports a fixed number of inputs.
    #[error("invalid number of inputs for operator {operator}: {count}")]
    Arity { operator: String, count: usize },
    /// Invalid configuration: a single-input peer is required.
    #[error("peer operator {peer} has {count} inputs, expected one")]
    PeerArity { peer: String, count: usize },
    /// Invalid configuration: the operator has no peer link.
    #[error("operator {operator} has no peer")]
    MissingPeer { operator: String },
    /// The kernel was used before `setup` fixed its shapes.
    #[error("kernel for operator {0} is not set up")]
    Setup(String),
    /// A computed offset reached the declared end pointer. Indicates a
    /// shape/allocation contract violation upstream; never retried.
    #[error("buffer overflow: offset {offset} reaches end pointer {end}")]
    Overflow { offset: usize, end: usize },
    /// An upstream operator has not written its batch output yet; the
    /// external scheduler's ordering guarantee was violated.
    #[error("missing output of upstream operator {previous} for operator {operator}")]
    MissingInput {
        operator: String,
        previous: crate::graph::operator::OperatorId,
    },
    /// The kernel variant has no host-side implementation.
    #[error("operator {0} has no host implementation")]
    Unsupported(String),
}

/// How a kernel touches the trainable-parameter model during `compute`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModelAccess {
    #[default]
    None,
    ReadOnly,
    ReadWrite,
}

/// The forward peer's identity and input shapes, resolved from the operator
/// table for gradient kernels at setup time.
#[derive(Debug, Clone)]
pub struct Peer {
    pub name: String,
    pub input: Vec<Shape>,
}

/// Everything a kernel may inspect while fixing its shapes and memory
/// requirements. Shapes must not be retained beyond the `setup` call.
pub struct SetupContext<'a> {
    /// The owning operator's name, for diagnostics.
    pub name: &'a str,
    /// Shapes of all inputs.
    pub input: &'a [Shape],
    /// The forward peer, if the operator has one.
    pub peer: Option<&'a Peer>,
    /// Number of concurrent execution slots to size variable pools for.
    pub slots: usize,
    /// The trainable-parameter store.
    pub model: &'a Model,
}

/// The kernel contract, uniform across all operator types and directions.
///
/// Call order per operator: [`setup`](Self::setup) exactly once, then
/// [`register`](Self::register) at most once, then any number of
/// [`compute`](Self::compute) calls, concurrently across batches.
pub trait Kernel: std::fmt::Debug + Send + Sync {
    /// The kernel's name in diagnostics and the device kernel table.
    fn name(&self) -> &'static str;

    /// Validate arity, derive the output shape, build the local variable
    /// pools and fill in the memory requirements.
    ///
    /// A repeated call re-validates its arguments and either replaces the
    /// configuration wholesale or fails without leaving stale state.
    fn setup(&mut self, ctx: SetupContext) -> Result<(), KernelError>;

    /// Mirror identity, shapes, capacities and scalar configuration onto
    /// the accelerator's kernel table, keyed by operator id.
    ///
    /// The default is a no-op for kernels with no accelerator counterpart.
    fn register(
        &self,
        _operator: &Operator,
        _registry: &dyn KernelRegistry,
    ) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Perform the computation for one batch and record the output buffer
    /// in the batch under the operator's id.
    fn compute(&self, ctx: &ComputeContext) -> Result<(), KernelError>;

    /// The byte footprint declared at setup; zero before setup.
    fn memory_requirements(&self) -> MemoryRequirements;

    /// The derived output shape; `None` before setup or for kernels that
    /// produce no output.
    fn output_shape(&self) -> Option<&Shape>;

    fn model_access(&self) -> ModelAccess {
        ModelAccess::None
    }

    fn is_loss(&self) -> bool {
        false
    }

    fn is_accuracy(&self) -> bool {
        false
    }

    fn is_data_transformation(&self) -> bool {
        false
    }

    /// Whether downstream operators may write over this kernel's output.
    fn allows_output_overwrite(&self) -> bool {
        false
    }

    /// Whether this kernel may write its output over its own input buffer.
    fn allows_input_overwrite(&self) -> bool {
        false
    }
}

use derive_more::{Display, Into};
use thiserror::Error;

use super::{
    batch::{Batch, InputWindow},
    buffer::DataBuffer,
    model::Model,
    shape::Shape,
};
use crate::{
    device::{DeviceError, KernelRegistry},
    kernel::{Kernel, KernelError, Peer, SetupContext},
};

/// Index of an operator in the [`Graph`] that owns it.
///
/// Peer and upstream links are plain ids into the operator table rather than
/// object references; the table outlives every operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Into)]
pub struct OperatorId(pub(crate) usize);

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("operator {0} is not in the graph")]
    Unknown(OperatorId),
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// A graph node owning one kernel.
///
/// Identity, shapes and links are fixed at construction; the kernel's
/// configuration is fixed after [`Graph::setup`]. Nothing here mutates
/// during `compute`, so one operator instance is shared by all batches.
#[derive(Debug)]
pub struct Operator {
    id: OperatorId,
    name: String,
    kernel: Box<dyn Kernel>,
    input_shape: Vec<Shape>,
    previous: Vec<OperatorId>,
    peer: Option<OperatorId>,
}

impl Operator {
    #[inline]
    pub fn id(&self) -> OperatorId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kernel(&self) -> &dyn Kernel {
        self.kernel.as_ref()
    }

    #[inline]
    pub fn input_shape(&self) -> &[Shape] {
        &self.input_shape
    }

    /// Upstream operators whose outputs this operator consumes.
    #[inline]
    pub fn previous(&self) -> &[OperatorId] {
        &self.previous
    }

    /// The operator's counterpart in the opposite pass direction.
    #[inline]
    pub fn peer(&self) -> Option<OperatorId> {
        self.peer
    }

    /// The byte footprint the kernel declared at setup, for the external
    /// arena allocator.
    #[inline]
    pub fn memory_requirements(&self) -> super::memory::MemoryRequirements {
        self.kernel.memory_requirements()
    }
}

/// The operator table driving setup, device registration and computation.
pub struct Graph {
    operators: Vec<Operator>,
    slots: usize,
}

impl Graph {
    /// Create an empty graph executed by at most `slots` concurrent tasks.
    pub fn new(slots: usize) -> Self {
        let operators = Vec::new();
        Self { operators, slots }
    }

    /// Append an operator to the table. Upstream and peer links must refer
    /// to operators already in the graph.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        kernel: Box<dyn Kernel>,
        input_shape: Vec<Shape>,
        previous: Vec<OperatorId>,
        peer: Option<OperatorId>,
    ) -> Result<OperatorId, GraphError> {
        for &link in previous.iter().chain(&peer) {
            if link.0 >= self.operators.len() {
                return Err(GraphError::Unknown(link));
            }
        }
        let id = OperatorId(self.operators.len());
        let name = name.into();
        self.operators.push(Operator {
            id,
            name,
            kernel,
            input_shape,
            previous,
            peer,
        });
        Ok(id)
    }

    /// Look up an operator.
    ///
    /// # Panics
    /// Panics if `id` was not returned by this graph's [`push`](Self::push).
    #[inline]
    pub fn get(&self, id: OperatorId) -> &Operator {
        &self.operators[id.0]
    }

    #[inline]
    pub fn operators(&self) -> impl Iterator<Item = &Operator> {
        self.operators.iter()
    }

    /// Number of concurrent execution slots.
    #[inline]
    pub fn slots(&self) -> usize {
        self.slots
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Set up every kernel in insertion order, fixing shapes and memory
    /// requirements. Called once, after the graph is fully built.
    pub fn setup(&mut self, model: &Model) -> Result<(), GraphError> {
        let slots = self.slots;
        for index in 0..self.operators.len() {
            let peer = self.operators[index].peer.map(|peer| {
                let peer = &self.operators[peer.0];
                Peer {
                    name: peer.name.clone(),
                    input: peer.input_shape.clone(),
                }
            });
            let Operator {
                name,
                kernel,
                input_shape,
                ..
            } = &mut self.operators[index];
            log::debug!("setup kernel for operator {name}");
            kernel.setup(SetupContext {
                name: name.as_str(),
                input: input_shape.as_slice(),
                peer: peer.as_ref(),
                slots,
                model,
            })?;
        }
        Ok(())
    }

    /// Mirror every kernel's configuration onto the device registry.
    /// Called once, after [`setup`](Self::setup) and before any `compute`.
    pub fn register(&self, registry: &dyn KernelRegistry) -> Result<(), DeviceError> {
        for operator in &self.operators {
            log::debug!("register kernel with device for operator {}", operator.name);
            operator.kernel.register(operator, registry)?;
        }
        Ok(())
    }

    /// Execute one operator's kernel for one batch on an execution slot.
    ///
    /// The external scheduler guarantees all upstream operators have written
    /// their batch outputs before this runs, and that no two concurrent
    /// calls share a slot.
    pub fn compute(
        &self,
        id: OperatorId,
        batch: &Batch,
        model: &Model,
        slot: usize,
    ) -> Result<(), GraphError> {
        let operator = self.get(id);
        log::debug!(
            "compute kernel for operator {} (batch {}, slot {slot})",
            operator.name,
            batch.id(),
        );
        let ctx = ComputeContext {
            graph: self,
            operator,
            batch,
            model,
            slot,
        };
        Ok(operator.kernel.compute(&ctx)?)
    }
}

/// The per-invocation context handed to [`Kernel::compute`].
///
/// All mutable per-call state flows through here and the slot-indexed
/// variable pools; kernels hold no mutable state of their own.
pub struct ComputeContext<'a> {
    graph: &'a Graph,
    operator: &'a Operator,
    batch: &'a Batch,
    model: &'a Model,
    slot: usize,
}

impl ComputeContext<'_> {
    #[inline]
    pub fn operator(&self) -> &Operator {
        self.operator
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.operator.name()
    }

    #[inline]
    pub fn batch(&self) -> &Batch {
        self.batch
    }

    #[inline]
    pub fn model(&self) -> &Model {
        self.model
    }

    /// The execution slot addressing this call's physical variables.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Resolve the operator's current input for this batch: the upstream
    /// operator's output, or the batch's raw input window for the most
    /// upstream operator.
    pub fn current_input(&self) -> Result<InputWindow, KernelError> {
        match self.operator.previous().first() {
            Some(&previous) => {
                let buffer = self
                    .batch
                    .output_of(previous)
                    .ok_or_else(|| KernelError::MissingInput {
                        operator: self.name().into(),
                        previous,
                    })?;
                let end = buffer.len();
                Ok(InputWindow {
                    buffer,
                    start: 0,
                    end,
                })
            }
            None => Ok(self.batch.input()),
        }
    }

    /// Obtain the buffer this call writes its output into.
    ///
    /// Reuses the upstream output buffer in place when the kernel allows
    /// input overwrite; otherwise allocates a fresh buffer sized by the
    /// kernel's output requirement.
    pub fn current_output(&self) -> DataBuffer {
        let kernel = self.operator.kernel();
        if kernel.allows_input_overwrite() {
            if let Some(&previous) = self.operator.previous().first() {
                if let Some(buffer) = self.batch.output_of(previous) {
                    return buffer;
                }
            }
        }
        DataBuffer::zeros(kernel.memory_requirements().output())
    }

    /// Resolve the forward peer's input for this batch: the buffer the peer
    /// consumed, whose values the gradient kernel trusts instead of
    /// recomputing the forward decision.
    ///
    /// For a most-upstream peer this is the raw batch input; reading it at
    /// unshifted offsets assumes the batch window starts at zero.
    pub fn peer_input(&self) -> Result<DataBuffer, KernelError> {
        let peer = self
            .operator
            .peer()
            .ok_or_else(|| KernelError::MissingPeer {
                operator: self.name().into(),
            })?;
        let peer = self.graph.get(peer);
        match peer.previous().first() {
            Some(&previous) => {
                self.batch
                    .output_of(previous)
                    .ok_or_else(|| KernelError::MissingInput {
                        operator: peer.name().into(),
                        previous,
                    })
            }
            None => Ok(self.batch.input().buffer),
        }
    }
}

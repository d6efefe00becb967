//! Kernel execution core for dataflow neural network training.
//!
//! A computation graph is a table of operators, each backed by a kernel
//! computing either a forward value or its gradient. This crate is the
//! kernel contract and its buffer/memory protocol:
//!
//! 1. **Setup**: [`Graph::setup`](graph::Graph::setup) fixes every
//!    kernel's shapes, builds its per-slot variable pools and declares its
//!    byte requirements for the external arena allocator.
//! 2. **Device registration**: [`Graph::register`](graph::Graph::register)
//!    mirrors each kernel's configuration onto the accelerator's kernel
//!    table, once, through the narrow [`KernelRegistry`](device::KernelRegistry)
//!    interface.
//! 3. **Compute**: [`Graph::compute`](graph::Graph::compute) runs one
//!    operator for one batch, reading upstream and peer buffers out of the
//!    shared [`Batch`](graph::Batch) context and writing exactly one
//!    bounds-checked output entry.
//!
//! Kernels are immutable after setup; per-call state lives in the
//! invocation context and slot-indexed variable pools, so one kernel
//! instance serves arbitrarily many concurrent batches. Scheduling, that
//! is, which operator runs when and on which slot, belongs to the caller.

pub mod device;
pub mod graph;
pub mod kernel;
pub mod num;

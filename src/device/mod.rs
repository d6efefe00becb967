//! The narrow interface to the accelerator's kernel table.
//!
//! The host side mirrors each operator's kernel configuration onto the
//! device exactly once, in declaration order: kernel, then inputs, then
//! outputs, then configuration parameters. [`Gpu`] is the host-side mirror
//! of that table; the device driver consuming it is an external
//! collaborator.

use thiserror::Error;

use crate::graph::{operator::OperatorId, shape::Shape};

pub use gpu::{Gpu, KernelEntry};

pub mod gpu;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("kernel for operator {0} is already registered")]
    AlreadyRegistered(OperatorId),
    #[error("no kernel declared for operator {0}")]
    Unregistered(OperatorId),
    #[error("kernel for operator {0} is not set up")]
    Setup(String),
    #[error("input slot {index} out of range for operator {id}: {declared} inputs declared")]
    InputSlot {
        id: OperatorId,
        index: usize,
        declared: usize,
    },
    #[error("extra output for operator {id}: {declared} outputs declared")]
    Output { id: OperatorId, declared: usize },
    #[error("configuration parameter {index} out of range for operator {id}: {declared} declared")]
    Parameter {
        id: OperatorId,
        index: usize,
        declared: usize,
    },
}

/// The accelerator kernel-table registration contract.
///
/// Calls for one operator must arrive in the order: [`set_kernel`]
/// (exactly once) → [`set_kernel_input`] per input slot →
/// [`set_kernel_output`] per output → [`set_configuration_count`] →
/// [`set_configuration_f32`] per parameter. Implementations reject calls
/// out of order.
///
/// [`set_kernel`]: KernelRegistry::set_kernel
/// [`set_kernel_input`]: KernelRegistry::set_kernel_input
/// [`set_kernel_output`]: KernelRegistry::set_kernel_output
/// [`set_configuration_count`]: KernelRegistry::set_configuration_count
/// [`set_configuration_f32`]: KernelRegistry::set_configuration_f32
pub trait KernelRegistry: Send + Sync {
    /// Declare a kernel under an operator id.
    fn set_kernel(
        &self,
        id: OperatorId,
        name: &str,
        inputs: usize,
        locals: usize,
        outputs: usize,
        loss_or_accuracy: bool,
    ) -> Result<(), DeviceError>;

    /// Declare one input slot's shape and byte capacity.
    fn set_kernel_input(
        &self,
        id: OperatorId,
        index: usize,
        shape: &Shape,
        capacity: usize,
    ) -> Result<(), DeviceError>;

    /// Declare the next output's shape and byte capacity.
    fn set_kernel_output(
        &self,
        id: OperatorId,
        shape: &Shape,
        capacity: usize,
    ) -> Result<(), DeviceError>;

    /// Declare how many scalar configuration parameters follow.
    fn set_configuration_count(&self, id: OperatorId, count: usize) -> Result<(), DeviceError>;

    /// Set one scalar configuration parameter by name and value.
    fn set_configuration_f32(
        &self,
        id: OperatorId,
        index: usize,
        name: &str,
        value: f32,
    ) -> Result<(), DeviceError>;
}

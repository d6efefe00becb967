use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap as HashMap;

use super::{DeviceError, KernelRegistry};
use crate::graph::{operator::OperatorId, shape::Shape};

/// One declared input or output slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub shape: Shape,
    pub capacity: usize,
}

/// One scalar configuration parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: f32,
}

/// A kernel's mirrored configuration, keyed by operator id.
#[derive(Debug, Clone)]
pub struct KernelEntry {
    pub name: String,
    pub locals: usize,
    pub loss_or_accuracy: bool,
    inputs: Box<[Option<Binding>]>,
    outputs: Vec<Binding>,
    declared_outputs: usize,
    parameters: Option<Box<[Option<Parameter>]>>,
}

impl KernelEntry {
    /// Declared input slots; unset slots are `None`.
    #[inline]
    pub fn inputs(&self) -> &[Option<Binding>] {
        &self.inputs
    }

    #[inline]
    pub fn outputs(&self) -> &[Binding] {
        &self.outputs
    }

    /// Declared configuration parameters; `None` before the count is set.
    #[inline]
    pub fn parameters(&self) -> Option<&[Option<Parameter>]> {
        self.parameters.as_deref()
    }
}

/// The host-side mirror of the accelerator's kernel table.
///
/// Shares its table across clones, the way one device serves every
/// operator. Enforces the declaration order and at-most-once registration
/// that the device driver assumes.
#[derive(Debug, Default, Clone)]
pub struct Gpu {
    kernels: Arc<RwLock<HashMap<OperatorId, KernelEntry>>>,
}

impl Gpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect a mirrored kernel.
    pub fn kernel(&self, id: OperatorId) -> Option<KernelEntry> {
        self.kernels
            .read()
            .expect("failed to lock")
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.kernels.read().expect("failed to lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KernelRegistry for Gpu {
    fn set_kernel(
        &self,
        id: OperatorId,
        name: &str,
        inputs: usize,
        locals: usize,
        outputs: usize,
        loss_or_accuracy: bool,
    ) -> Result<(), DeviceError> {
        let mut kernels = self.kernels.write().expect("failed to lock");
        if kernels.contains_key(&id) {
            return Err(DeviceError::AlreadyRegistered(id));
        }
        log::debug!("declare kernel {name} for operator {id}");
        kernels.insert(
            id,
            KernelEntry {
                name: name.into(),
                locals,
                loss_or_accuracy,
                inputs: vec![None; inputs].into_boxed_slice(),
                outputs: Vec::with_capacity(outputs),
                declared_outputs: outputs,
                parameters: None,
            },
        );
        Ok(())
    }

    fn set_kernel_input(
        &self,
        id: OperatorId,
        index: usize,
        shape: &Shape,
        capacity: usize,
    ) -> Result<(), DeviceError> {
        let mut kernels = self.kernels.write().expect("failed to lock");
        let entry = kernels.get_mut(&id).ok_or(DeviceError::Unregistered(id))?;
        let declared = entry.inputs.len();
        let slot = entry
            .inputs
            .get_mut(index)
            .ok_or(DeviceError::InputSlot {
                id,
                index,
                declared,
            })?;
        *slot = Some(Binding {
            shape: shape.clone(),
            capacity,
        });
        Ok(())
    }

    fn set_kernel_output(
        &self,
        id: OperatorId,
        shape: &Shape,
        capacity: usize,
    ) -> Result<(), DeviceError> {
        let mut kernels = self.kernels.write().expect("failed to lock");
        let entry = kernels.get_mut(&id).ok_or(DeviceError::Unregistered(id))?;
        if entry.outputs.len() >= entry.declared_outputs {
            return Err(DeviceError::Output {
                id,
                declared: entry.declared_outputs,
            });
        }
        entry.outputs.push(Binding {
            shape: shape.clone(),
            capacity,
        });
        Ok(())
    }

    fn set_configuration_count(&self, id: OperatorId, count: usize) -> Result<(), DeviceError> {
        let mut kernels = self.kernels.write().expect("failed to lock");
        let entry = kernels.get_mut(&id).ok_or(DeviceError::Unregistered(id))?;
        entry.parameters = Some(vec![None; count].into_boxed_slice());
        Ok(())
    }

    fn set_configuration_f32(
        &self,
        id: OperatorId,
        index: usize,
        name: &str,
        value: f32,
    ) -> Result<(), DeviceError> {
        let mut kernels = self.kernels.write().expect("failed to lock");
        let entry = kernels.get_mut(&id).ok_or(DeviceError::Unregistered(id))?;
        let parameters = entry.parameters.as_mut().ok_or(DeviceError::Parameter {
            id,
            index,
            declared: 0,
        })?;
        let declared = parameters.len();
        let slot = parameters.get_mut(index).ok_or(DeviceError::Parameter {
            id,
            index,
            declared,
        })?;
        *slot = Some(Parameter {
            name: name.into(),
            value,
        });
        Ok(())
    }
}

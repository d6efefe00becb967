use std::sync::RwLock;

use rustc_hash::FxHashMap as HashMap;

use super::{buffer::DataBuffer, shape::Shape, variable::Variable};

/// The trainable-parameter store handed to kernels at setup.
///
/// Kernels that carry parameters register their model variables here and
/// receive the backing buffer; activation kernels never touch it and report
/// a no-access model access type.
#[derive(Debug, Default)]
pub struct Model {
    variables: RwLock<HashMap<String, Variable>>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model variable, allocating and binding its buffer.
    /// Returns the buffer so the kernel can initialize the parameters.
    pub fn register(&self, name: &str, shape: Shape) -> DataBuffer {
        let mut variable = Variable::new(name.to_string(), shape, false);
        let buffer = DataBuffer::zeros(variable.capacity());
        variable.wrap(buffer.clone());
        self.variables
            .write()
            .expect("failed to lock")
            .insert(name.to_string(), variable);
        buffer
    }

    /// Look up a registered variable by name.
    pub fn get(&self, name: &str) -> Option<Variable> {
        self.variables
            .read()
            .expect("failed to lock")
            .get(name)
            .cloned()
    }

    /// Total bytes across all registered model variables.
    pub fn capacity(&self) -> usize {
        self.variables
            .read()
            .expect("failed to lock")
            .values()
            .map(Variable::capacity)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.variables.read().expect("failed to lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

use std::{
    borrow::Cow,
    sync::{Mutex, MutexGuard},
};

use super::{buffer::DataBuffer, shape::Shape};
use crate::num::DataType;

/// A named tensor descriptor. Owns no memory: a variable only describes
/// shape and type until [`wrap`](Variable::wrap) binds it onto a buffer.
#[derive(Debug, Clone)]
pub struct Variable {
    name: Cow<'static, str>,
    shape: Shape,
    r#type: DataType,
    local: bool,
    buffer: Option<DataBuffer>,
}

impl Variable {
    pub fn new(name: impl Into<Cow<'static, str>>, shape: Shape, local: bool) -> Self {
        let name = name.into();
        let r#type = DataType::F32;
        let buffer = None;
        Self {
            name,
            shape,
            r#type,
            local,
            buffer,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.r#type
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Number of bytes the variable's contents occupy.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shape.capacity(self.r#type)
    }

    /// Rebind the variable onto a window of `buffer` without copying.
    #[inline]
    pub fn wrap(&mut self, buffer: DataBuffer) {
        self.buffer = Some(buffer);
    }

    /// The currently bound buffer, if any.
    #[inline]
    pub fn buffer(&self) -> Option<&DataBuffer> {
        self.buffer.as_ref()
    }
}

/// A logical variable definition resolving to per-slot physical instances.
///
/// One physical [`Variable`] exists per concurrent execution slot, addressed
/// by the slot id of the calling context. Two computations on distinct slots
/// never observe each other's instance; a slot collision (a scheduler
/// contract violation) serializes on the slot's mutex instead of racing.
#[derive(Debug)]
pub struct LocalVariable {
    def: Variable,
    pool: Box<[Mutex<Variable>]>,
}

impl LocalVariable {
    /// Build a pool of `slots` physical instances of `def`.
    pub fn new(def: Variable, slots: usize) -> Self {
        let pool = (0..slots).map(|_| Mutex::new(def.clone())).collect();
        Self { def, pool }
    }

    /// The logical definition, untouched by any `compute` call. Used for
    /// device registration, where only shape and capacity matter.
    #[inline]
    pub fn initial(&self) -> &Variable {
        &self.def
    }

    /// Resolve the physical instance for an execution slot.
    ///
    /// # Panics
    /// Panics if `slot` is not below the pool size fixed at setup.
    #[inline]
    pub fn get(&self, slot: usize) -> MutexGuard<'_, Variable> {
        assert!(
            slot < self.pool.len(),
            "slot {slot} out of range for {} execution slots",
            self.pool.len(),
        );
        self.pool[slot].lock().expect("failed to lock")
    }

    /// Number of execution slots in the pool.
    #[inline]
    pub fn slots(&self) -> usize {
        self.pool.len()
    }
}

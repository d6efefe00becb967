/// Per-operator byte requirements, consumed once by the arena allocator
/// after setup and never mutated afterward.
///
/// The output requirement equals the output variable's declared capacity;
/// the other three stay zero unless the kernel needs trainable parameters
/// or private scratch space.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryRequirements {
    output: usize,
    model: usize,
    local_cpu: usize,
    local_gpu: usize,
}

impl MemoryRequirements {
    #[inline]
    pub fn set_output(&mut self, bytes: usize) {
        self.output = bytes;
    }

    #[inline]
    pub fn set_model(&mut self, bytes: usize) {
        self.model = bytes;
    }

    #[inline]
    pub fn set_local_cpu(&mut self, bytes: usize) {
        self.local_cpu = bytes;
    }

    #[inline]
    pub fn set_local_gpu(&mut self, bytes: usize) {
        self.local_gpu = bytes;
    }

    #[inline]
    pub fn output(&self) -> usize {
        self.output
    }

    #[inline]
    pub fn model(&self) -> usize {
        self.model
    }

    #[inline]
    pub fn local_cpu(&self) -> usize {
        self.local_cpu
    }

    #[inline]
    pub fn local_gpu(&self) -> usize {
        self.local_gpu
    }
}

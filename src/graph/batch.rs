use std::sync::RwLock;

use rustc_hash::FxHashMap as HashMap;

use super::{buffer::DataBuffer, operator::OperatorId};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId;

/// An input buffer together with the `[start, end)` byte window describing
/// one operator's slice of it. The raw batch input may be shared by several
/// operators, each seeing a different window.
#[derive(Debug, Clone)]
pub struct InputWindow {
    pub buffer: DataBuffer,
    pub start: usize,
    pub end: usize,
}

/// One pass's execution state, shared by all operators processing the same
/// mini-batch.
///
/// Holds the raw input window and the operator-id → output-buffer map.
/// An operator's kernel writes exactly one entry per `compute` call and may
/// read any already-produced upstream entry; the external scheduler
/// guarantees upstream entries exist before downstream kernels run.
#[derive(Debug)]
pub struct Batch {
    id: uid::Id<BatchId>,
    input: InputWindow,
    outputs: RwLock<HashMap<OperatorId, DataBuffer>>,
}

impl Batch {
    /// Create a batch whose input window spans the whole buffer.
    pub fn new(input: DataBuffer) -> Self {
        let end = input.len();
        Self::with_window(input, 0, end)
    }

    /// Create a batch over a window of a larger shared input buffer.
    ///
    /// # Panics
    /// Panics if the window does not fit the buffer.
    pub fn with_window(buffer: DataBuffer, start: usize, end: usize) -> Self {
        assert!(
            start <= end && end <= buffer.len(),
            "window [{start}, {end}) does not fit buffer of {} bytes",
            buffer.len(),
        );
        let id = uid::Id::new();
        let input = InputWindow { buffer, start, end };
        let outputs = RwLock::new(HashMap::default());
        Self { id, input, outputs }
    }

    #[inline]
    pub fn id(&self) -> uid::Id<BatchId> {
        self.id
    }

    /// The raw input buffer and this pass's byte window into it.
    #[inline]
    pub fn input(&self) -> InputWindow {
        self.input.clone()
    }

    /// Record `buffer` as the output `operator` produced for this batch.
    pub fn set_output(&self, operator: OperatorId, buffer: DataBuffer) {
        self.outputs
            .write()
            .expect("failed to lock")
            .insert(operator, buffer);
    }

    /// The output `operator` produced for this batch, if it ran already.
    pub fn output_of(&self, operator: OperatorId) -> Option<DataBuffer> {
        self.outputs
            .read()
            .expect("failed to lock")
            .get(&operator)
            .cloned()
    }

    /// Number of outputs produced so far.
    pub fn len(&self) -> usize {
        self.outputs.read().expect("failed to lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

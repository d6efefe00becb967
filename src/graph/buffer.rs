use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::num::Scalar;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId;

/// A byte-addressable view over shared, externally allocated memory.
///
/// Cloning is cheap and yields another view over the same bytes; the `id`
/// survives cloning, so reuse decisions can be observed by identity. Typed
/// access goes through the read/write guards. Offsets are bytes throughout.
#[derive(Debug, Clone)]
pub struct DataBuffer {
    id: uid::Id<BufferId>,
    data: Arc<RwLock<Box<[u8]>>>,
}

impl DataBuffer {
    /// Create a zero-filled buffer of `capacity` bytes.
    pub fn zeros(capacity: usize) -> Self {
        let id = uid::Id::new();
        let data = Arc::new(RwLock::new(vec![0; capacity].into_boxed_slice()));
        Self { id, data }
    }

    /// Create a buffer holding a copy of `contents`.
    pub fn create<T: Scalar>(contents: &[T]) -> Self {
        let id = uid::Id::new();
        let data: Box<[u8]> = bytemuck::cast_slice(contents).into();
        let data = Arc::new(RwLock::new(data));
        Self { id, data }
    }

    #[inline]
    pub fn id(&self) -> uid::Id<BufferId> {
        self.id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.read().expect("failed to lock").len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Acquire a shared read view of the buffer's bytes.
    #[inline]
    pub fn read(&self) -> BufferRead<'_> {
        BufferRead(self.data.read().expect("failed to lock"))
    }

    /// Acquire an exclusive write view of the buffer's bytes.
    #[inline]
    pub fn write(&self) -> BufferWrite<'_> {
        BufferWrite(self.data.write().expect("failed to lock"))
    }

    /// Read one `f32` at a byte offset.
    #[inline]
    pub fn get_f32(&self, offset: usize) -> f32 {
        self.read().get_f32(offset)
    }

    /// Write one `f32` at a byte offset.
    #[inline]
    pub fn put_f32(&self, offset: usize, value: f32) {
        self.write().put_f32(offset, value)
    }

    /// Copy the buffer's contents out as typed elements.
    ///
    /// The backing allocation is byte-aligned, so this copies instead of
    /// reinterpreting in place.
    pub fn to_vec<T: Scalar>(&self) -> Vec<T> {
        let data = self.read();
        bytemuck::pod_collect_to_vec(&data[..])
    }
}

pub struct BufferRead<'a>(RwLockReadGuard<'a, Box<[u8]>>);

impl BufferRead<'_> {
    /// Read one `f32` at a byte offset.
    ///
    /// # Panics
    /// Panics if `offset + 4` exceeds the buffer length. Kernels bound-check
    /// their offsets against the batch window before reading.
    #[inline]
    pub fn get_f32(&self, offset: usize) -> f32 {
        bytemuck::pod_read_unaligned(&self.0[offset..offset + size_of::<f32>()])
    }
}

impl std::ops::Deref for BufferRead<'_> {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub struct BufferWrite<'a>(RwLockWriteGuard<'a, Box<[u8]>>);

impl BufferWrite<'_> {
    /// Write one `f32` at a byte offset.
    ///
    /// # Panics
    /// Panics if `offset + 4` exceeds the buffer length.
    #[inline]
    pub fn put_f32(&mut self, offset: usize, value: f32) {
        let end = offset + size_of::<f32>();
        self.0[offset..end].copy_from_slice(&value.to_ne_bytes());
    }
}

impl std::ops::Deref for BufferWrite<'_> {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for BufferWrite<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

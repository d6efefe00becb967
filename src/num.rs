use derive_more::Display;

/// Element types that kernels and device registrations agree on.
///
/// The accelerator side keys its buffer layout off this type, so the set is
/// closed and every variant has a fixed byte width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    F32,
    I32,
}

impl DataType {
    /// Returns the byte width of one element of this type.
    pub const fn size(self) -> usize {
        match self {
            DataType::F32 => size_of::<f32>(),
            DataType::I32 => size_of::<i32>(),
        }
    }
}

/// Rust types that can live inside a [`DataBuffer`](crate::graph::buffer::DataBuffer).
pub trait Scalar: bytemuck::Pod + Send + Sync + 'static {
    const DATA_TYPE: DataType;
}

impl Scalar for f32 {
    const DATA_TYPE: DataType = DataType::F32;
}

impl Scalar for i32 {
    const DATA_TYPE: DataType = DataType::I32;
}

use derive_more::{Display, From, Into};
use itertools::Itertools;

use crate::num::DataType;

/// The dimensions of a tensor, outermost first.
///
/// A shape is immutable once constructed; cloning yields an independent copy.
/// The empty shape is a scalar with one element.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Display, From, Into)]
#[display("[{}]", _0.iter().format(", "))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Shape(Vec<usize>);

impl<const N: usize> From<[usize; N]> for Shape {
    #[inline]
    fn from(value: [usize; N]) -> Self {
        Self(value.into())
    }
}

impl From<&[usize]> for Shape {
    #[inline]
    fn from(value: &[usize]) -> Self {
        Self(value.into())
    }
}

impl Shape {
    #[inline]
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    /// The dimension sizes, outermost first.
    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions.
    #[inline]
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.0.iter().product()
    }

    /// Number of bytes needed to store the shape's elements of the given type.
    #[inline]
    pub fn capacity(&self, r#type: DataType) -> usize {
        self.size() * r#type.size()
    }
}

#[cfg(test)]
mod tests {
    use super::Shape;
    use crate::num::DataType;

    #[test]
    fn test_size() {
        let shape = Shape::from([4, 3, 2]);
        assert_eq!(shape.rank(), 3);
        assert_eq!(shape.size(), 24);
        assert_eq!(shape.capacity(DataType::F32), 96);
    }

    #[test]
    fn test_scalar() {
        let shape = Shape::default();
        assert_eq!(shape.rank(), 0);
        assert_eq!(shape.size(), 1);
    }

    #[test]
    fn test_display() {
        let shape = Shape::from([32, 16]);
        assert_eq!(shape.to_string(), "[32, 16]");
    }

    #[test]
    fn test_copies_are_independent() {
        let shape = Shape::from([2, 2]);
        let copy = shape.clone();
        drop(shape);
        assert_eq!(copy.size(), 4);
    }
}
